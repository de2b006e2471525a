//! Job orchestration for Tubeferry.
//!
//! This crate provides:
//! - An admission queue enforcing the global and per-operator caps
//! - A job runner that drives each job from fetch through upload
//! - The `UploadPipeline` facade for submitting, canceling, observing
//!   and recovering jobs
//! - An event bus and a throttled progress reporter for front ends

pub mod bus;
pub mod pipeline;
pub mod progress;
pub mod queue;
mod runner;

pub use bus::{EventBus, EventReceiver};
pub use pipeline::{Collaborators, ShutdownMode, UploadPipeline};
pub use progress::{ProgressReporter, SpeedCalculator};
pub use queue::{AdmissionQueue, CancelOutcome, QueueStats};

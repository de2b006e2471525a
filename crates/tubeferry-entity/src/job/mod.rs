//! Upload job domain entities.

pub mod model;
pub mod record;
pub mod source;
pub mod view;

pub use model::{Job, JobRequest};
pub use record::JobRecord;
pub use source::SourceDescriptor;
pub use view::JobView;

//! Progress reporter: turns raw job events into throttled status updates.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use tubeferry_core::config::progress::ProgressConfig;
use tubeferry_core::events::{JobEvent, TransferPhase};
use tubeferry_core::traits::progress::{ProgressSink, ProgressUpdate};
use tubeferry_core::types::{JobId, JobOutcome, JobState};

use crate::bus::EventReceiver;

/// Cells in the rendered progress bar.
const BAR_CELLS: usize = 10;

/// Upper bound on retained rate samples per job.
const MAX_SAMPLES: usize = 100;

/// Transfer rate over a sliding window of `(instant, offset)` samples.
#[derive(Debug, Clone)]
pub struct SpeedCalculator {
    samples: VecDeque<(Instant, u64)>,
    window: Duration,
}

impl SpeedCalculator {
    /// Create a calculator averaging over `window`.
    pub fn new(window: Duration) -> Self {
        Self {
            samples: VecDeque::new(),
            window,
        }
    }

    /// Record that the transfer reached `offset` at `now`.
    pub fn add_sample(&mut self, now: Instant, offset: u64) {
        self.samples.push_back((now, offset));
        while let Some((at, _)) = self.samples.front() {
            if now.duration_since(*at) > self.window || self.samples.len() > MAX_SAMPLES {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Average bytes per second within the window; 0 with fewer than two samples.
    pub fn bytes_per_second(&self) -> f64 {
        let (Some((t0, o0)), Some((t1, o1))) = (self.samples.front(), self.samples.back()) else {
            return 0.0;
        };
        let elapsed = t1.duration_since(*t0);
        if elapsed.is_zero() || o1 <= o0 {
            return 0.0;
        }
        (o1 - o0) as f64 / elapsed.as_secs_f64()
    }

    /// Time to move `remaining` bytes at the current rate.
    pub fn eta(&self, remaining: u64) -> Option<Duration> {
        let rate = self.bytes_per_second();
        if rate <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining as f64 / rate))
    }

    /// Drop every sample.
    pub fn reset(&mut self) {
        self.samples.clear();
    }
}

#[derive(Debug)]
struct JobProgress {
    title: String,
    state: JobState,
    phase: TransferPhase,
    bytes: u64,
    total: Option<u64>,
    last_emit: Option<Instant>,
    speed: SpeedCalculator,
}

/// Throttles job events into at most one update per interval per job,
/// plus one on every state change.
#[derive(Debug)]
pub struct ProgressReporter {
    interval: Duration,
    window: Duration,
    jobs: HashMap<JobId, JobProgress>,
}

impl ProgressReporter {
    /// Create a reporter.
    pub fn new(config: &ProgressConfig) -> Self {
        Self {
            interval: config.interval(),
            window: config.rate_window(),
            jobs: HashMap::new(),
        }
    }

    /// Consume events until the bus closes, publishing updates to `sink`.
    pub fn spawn(self, events: EventReceiver, sink: Arc<dyn ProgressSink>) -> JoinHandle<()> {
        tokio::spawn(self.run(events, sink))
    }

    /// Event loop behind [`spawn`](Self::spawn).
    pub async fn run(mut self, mut events: EventReceiver, sink: Arc<dyn ProgressSink>) {
        while let Some(event) = events.recv().await {
            let Some(job_event) = event.as_job() else {
                continue;
            };
            if let Some(update) = self.observe(job_event, Instant::now()) {
                let job_id = update.job_id;
                if let Err(e) = sink.publish(update).await {
                    warn!(job_id = %job_id, error = %e, "Failed to publish progress update");
                }
            }
        }
        debug!("Progress reporter stopped");
    }

    /// Fold one event into the job's progress; returns an update when one is due.
    pub fn observe(&mut self, event: &JobEvent, now: Instant) -> Option<ProgressUpdate> {
        let window = self.window;
        let job_id = event.job_id();
        let progress = self.jobs.entry(job_id).or_insert_with(|| JobProgress {
            title: String::new(),
            state: JobState::Pending,
            phase: TransferPhase::Fetch,
            bytes: 0,
            total: None,
            last_emit: None,
            speed: SpeedCalculator::new(window),
        });

        match event {
            JobEvent::Submitted { title, .. } => {
                progress.title = title.clone();
                progress.state = JobState::Pending;
                Some(Self::emit(job_id, progress, now, None))
            }
            JobEvent::StateChanged { to, .. } => {
                progress.state = *to;
                if *to == JobState::SessionOpen && progress.phase == TransferPhase::Fetch {
                    progress.phase = TransferPhase::Upload;
                    progress.bytes = 0;
                    progress.speed.reset();
                }
                Some(Self::emit(job_id, progress, now, None))
            }
            JobEvent::Progress {
                phase,
                bytes,
                total,
                ..
            } => {
                if *phase != progress.phase {
                    progress.phase = *phase;
                    progress.speed.reset();
                }
                progress.bytes = *bytes;
                if total.is_some() {
                    progress.total = *total;
                }
                progress.speed.add_sample(now, *bytes);
                let due = progress
                    .last_emit
                    .is_none_or(|last| now.duration_since(last) >= self.interval);
                due.then(|| Self::emit(job_id, progress, now, None))
            }
            JobEvent::Retrying { .. } => None,
            JobEvent::Finished { outcome, .. } => {
                progress.state = outcome.state();
                if let (JobOutcome::Succeeded { .. }, Some(total)) = (outcome, progress.total) {
                    progress.bytes = total;
                }
                let update = Self::emit(job_id, progress, now, Some(outcome));
                self.jobs.remove(&job_id);
                Some(update)
            }
        }
    }

    fn emit(
        job_id: JobId,
        progress: &mut JobProgress,
        now: Instant,
        outcome: Option<&JobOutcome>,
    ) -> ProgressUpdate {
        progress.last_emit = Some(now);
        let percent = match progress.total {
            Some(0) => Some(100.0),
            Some(total) => Some((progress.bytes as f64 / total as f64 * 100.0).min(100.0)),
            None => None,
        };
        let rate = progress.speed.bytes_per_second();
        let eta = progress
            .total
            .and_then(|t| progress.speed.eta(t.saturating_sub(progress.bytes)));

        let mut update = ProgressUpdate {
            job_id,
            title: progress.title.clone(),
            state: progress.state,
            bytes: progress.bytes,
            total: progress.total,
            percent,
            bytes_per_second: rate,
            eta,
            text: String::new(),
        };
        update.text = render(&update, outcome);
        update
    }
}

/// Render the status text shown to the requester.
pub fn render(update: &ProgressUpdate, outcome: Option<&JobOutcome>) -> String {
    let title = if update.title.is_empty() {
        update.job_id.to_string()
    } else {
        update.title.clone()
    };

    match outcome {
        Some(JobOutcome::Succeeded { video_id }) => {
            return format!("Upload complete: {title}\nVideo: {}", video_id.watch_url());
        }
        Some(JobOutcome::Failed { kind, message }) => {
            return format!("Upload failed: {title}\nError ({kind}): {message}");
        }
        Some(JobOutcome::Canceled) => return format!("Upload canceled: {title}"),
        None => {}
    }

    let label = match update.state {
        JobState::Pending => "Queued",
        JobState::Fetching => "Fetching",
        JobState::Staged => "Staged",
        JobState::SessionOpen => "Opening upload",
        JobState::ChunkUploading => "Uploading",
        JobState::Verifying => "Verifying",
        JobState::Completed => "Completed",
        JobState::Failed => "Failed",
        JobState::Canceled => "Canceled",
    };

    let mut text = format!("{label}: {title}\n{}", progress_bar(update.percent));
    match update.total {
        Some(total) => text.push_str(&format!(
            "\n{} / {}",
            human_bytes(update.bytes),
            human_bytes(total)
        )),
        None => text.push_str(&format!("\n{}", human_bytes(update.bytes))),
    }
    if update.bytes_per_second > 0.0 {
        text.push_str(&format!(" · {}/s", human_bytes(update.bytes_per_second as u64)));
    }
    if let Some(eta) = update.eta {
        text.push_str(&format!(" · ETA {}", clock(eta)));
    }
    text
}

/// `▓▓▓░░░░░░░ 30.0%`, or an empty bar with `unknown%`.
pub fn progress_bar(percent: Option<f64>) -> String {
    match percent {
        Some(p) => {
            let filled = ((p / 10.0).floor() as usize).min(BAR_CELLS);
            format!(
                "{}{} {p:.1}%",
                "▓".repeat(filled),
                "░".repeat(BAR_CELLS - filled)
            )
        }
        None => format!("{} unknown%", "░".repeat(BAR_CELLS)),
    }
}

/// Binary-prefixed size with one decimal.
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

fn clock(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tubeferry_core::ErrorKind;
    use tubeferry_core::types::VideoId;

    fn reporter() -> ProgressReporter {
        ProgressReporter::new(&ProgressConfig {
            interval_seconds: 3,
            rate_window_seconds: 10,
        })
    }

    fn progress(job_id: JobId, bytes: u64, total: Option<u64>) -> JobEvent {
        JobEvent::Progress {
            job_id,
            phase: TransferPhase::Upload,
            bytes,
            total,
        }
    }

    #[test]
    fn updates_are_throttled_per_interval() {
        let mut r = reporter();
        let id = JobId::new();
        let t0 = Instant::now();

        assert!(r.observe(&progress(id, 10, Some(100)), t0).is_some());
        assert!(r.observe(&progress(id, 20, Some(100)), t0 + Duration::from_secs(1)).is_none());
        assert!(r.observe(&progress(id, 30, Some(100)), t0 + Duration::from_secs(2)).is_none());
        let update = r
            .observe(&progress(id, 40, Some(100)), t0 + Duration::from_secs(3))
            .unwrap();
        assert_eq!(update.percent, Some(40.0));
        assert!(update.text.contains("▓▓▓▓░░░░░░ 40.0%"));
    }

    #[test]
    fn state_changes_bypass_throttle() {
        let mut r = reporter();
        let id = JobId::new();
        let t0 = Instant::now();
        r.observe(&progress(id, 10, Some(100)), t0);

        let update = r
            .observe(
                &JobEvent::StateChanged {
                    job_id: id,
                    from: JobState::ChunkUploading,
                    to: JobState::Verifying,
                },
                t0,
            )
            .unwrap();
        assert_eq!(update.state, JobState::Verifying);
    }

    #[test]
    fn unknown_size_renders_unknown_percent() {
        let mut r = reporter();
        let id = JobId::new();
        let update = r.observe(&progress(id, 2048, None), Instant::now()).unwrap();
        assert_eq!(update.percent, None);
        assert!(update.text.contains("unknown%"));
        assert!(update.text.contains("2.0 KiB"));
    }

    #[test]
    fn completion_links_to_video() {
        let mut r = reporter();
        let id = JobId::new();
        let update = r
            .observe(
                &JobEvent::Finished {
                    job_id: id,
                    outcome: JobOutcome::Succeeded {
                        video_id: VideoId::from("abc123"),
                    },
                },
                Instant::now(),
            )
            .unwrap();
        assert_eq!(update.state, JobState::Completed);
        assert!(update.text.contains("https://youtube.com/watch?v=abc123"));
    }

    #[test]
    fn failure_names_error_kind() {
        let mut r = reporter();
        let update = r
            .observe(
                &JobEvent::Finished {
                    job_id: JobId::new(),
                    outcome: JobOutcome::Failed {
                        kind: ErrorKind::SourceTooLarge,
                        message: "3 GiB".into(),
                    },
                },
                Instant::now(),
            )
            .unwrap();
        assert!(update.text.contains("source_too_large"));
    }

    #[test]
    fn speed_from_sliding_window() {
        let mut calc = SpeedCalculator::new(Duration::from_secs(10));
        let t0 = Instant::now();
        assert_eq!(calc.bytes_per_second(), 0.0);
        calc.add_sample(t0, 0);
        calc.add_sample(t0 + Duration::from_secs(2), 2000);
        assert_eq!(calc.bytes_per_second(), 1000.0);
        assert_eq!(calc.eta(5000), Some(Duration::from_secs(5)));

        calc.add_sample(t0 + Duration::from_secs(20), 4000);
        assert_eq!(calc.bytes_per_second(), 0.0);
    }

    #[test]
    fn bar_and_sizes() {
        assert_eq!(progress_bar(Some(100.0)), "▓▓▓▓▓▓▓▓▓▓ 100.0%");
        assert_eq!(progress_bar(Some(5.0)), "░░░░░░░░░░ 5.0%");
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(10 * 1024 * 1024), "10.0 MiB");
        assert_eq!(clock(Duration::from_secs(3725)), "1:02:05");
    }
}

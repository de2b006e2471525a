//! Table and JSON output formatting for CLI commands.

use serde::Serialize;
use tabled::{Table, Tabled};

use tubeferry_core::types::JobOutcome;
use tubeferry_entity::job::JobView;
use tubeferry_worker::progress::human_bytes;

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// JSON output
    Json,
}

/// One job as a table row.
#[derive(Debug, Serialize, Tabled)]
pub struct JobRow {
    /// Job id
    #[tabled(rename = "Job")]
    pub id: String,
    /// Operator
    #[tabled(rename = "Operator")]
    pub operator: String,
    /// Title
    #[tabled(rename = "Title")]
    pub title: String,
    /// Final or current state
    #[tabled(rename = "State")]
    pub state: String,
    /// Acknowledged / total
    #[tabled(rename = "Uploaded")]
    pub uploaded: String,
    /// Retries
    #[tabled(rename = "Retries")]
    pub retries: u32,
    /// Video link or error
    #[tabled(rename = "Result")]
    pub result: String,
}

impl From<&JobView> for JobRow {
    fn from(view: &JobView) -> Self {
        let total = view
            .total_bytes
            .map(human_bytes)
            .unwrap_or_else(|| "?".to_string());
        let result = match &view.outcome {
            Some(JobOutcome::Succeeded { video_id }) => video_id.watch_url(),
            Some(JobOutcome::Failed { kind, message }) => format!("{kind}: {message}"),
            Some(JobOutcome::Canceled) => "canceled".to_string(),
            None => String::new(),
        };
        Self {
            id: view.id.to_string(),
            operator: view.operator_id.to_string(),
            title: view.title.clone(),
            state: view.state.to_string(),
            uploaded: format!("{} / {total}", human_bytes(view.acknowledged_bytes)),
            retries: view.retry_count,
            result,
        }
    }
}

/// Print a list of items in the selected format
pub fn print_list<T: Serialize + Tabled>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("No results found.");
            } else {
                println!("{}", Table::new(items));
            }
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(items).unwrap_or_else(|_| "[]".to_string());
            println!("{json}");
        }
    }
}

/// Print job views as a table or JSON.
pub fn print_jobs(views: &[JobView], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            let rows: Vec<JobRow> = views.iter().map(JobRow::from).collect();
            print_list(&rows, format);
        }
        OutputFormat::Json => print_list_json(views),
    }
}

fn print_list_json<T: Serialize>(items: &[T]) {
    let json = serde_json::to_string_pretty(items).unwrap_or_else(|_| "[]".to_string());
    println!("{json}");
}

/// Print a single item in the selected format
pub fn print_item<T: Serialize + std::fmt::Debug>(item: &T, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            println!("{item:#?}");
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(item).unwrap_or_else(|_| "{}".to_string());
            println!("{json}");
        }
    }
}

/// Print a success message
pub fn print_success(msg: &str) {
    println!("✓ {msg}");
}

/// Print a warning message
pub fn print_warning(msg: &str) {
    println!("⚠ {msg}");
}

/// Print an error message
pub fn print_error(msg: &str) {
    eprintln!("✗ {msg}");
}

/// Print a key-value pair
pub fn print_kv(key: &str, value: &str) {
    println!("  {:<24} {}", format!("{key}:"), value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tubeferry_core::error::ErrorKind;
    use tubeferry_core::types::{JobId, JobState, VideoId};

    fn view(outcome: Option<JobOutcome>) -> JobView {
        JobView {
            id: JobId::new(),
            operator_id: "alice".into(),
            account_id: "main".into(),
            title: "Launch".into(),
            source_kind: "url".into(),
            state: outcome.as_ref().map_or(JobState::Pending, JobOutcome::state),
            acknowledged_bytes: 2048,
            total_bytes: Some(4096),
            percent: Some(50.0),
            retry_count: 1,
            outcome,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn completed_row_links_to_the_video() {
        let row = JobRow::from(&view(Some(JobOutcome::Succeeded {
            video_id: VideoId::from("abc123"),
        })));
        assert_eq!(row.state, "completed");
        assert_eq!(row.result, "https://youtube.com/watch?v=abc123");
        assert!(row.uploaded.contains('/'));
    }

    #[test]
    fn failed_row_shows_kind_and_message() {
        let row = JobRow::from(&view(Some(JobOutcome::Failed {
            kind: ErrorKind::SourceTooLarge,
            message: "too big".into(),
        })));
        assert!(row.result.ends_with("too big"));
        assert!(row.result.contains(&ErrorKind::SourceTooLarge.to_string()));
    }

    #[test]
    fn unknown_total_is_marked() {
        let mut pending = view(None);
        pending.total_bytes = None;
        assert!(JobRow::from(&pending).uploaded.ends_with("/ ?"));
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A shell command leased from the coordinator.
///
/// Coordinators are loose about the id type and may serve it as a JSON
/// number or string; both deserialize to the string form used everywhere
/// in the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    #[serde(default, deserialize_with = "flexible_id")]
    pub id: String,
    #[serde(default)]
    pub command: String,
}

impl WorkItem {
    pub fn new(id: String, command: String) -> Self {
        Self { id, command }
    }

    /// Items missing an id or a command line are skipped by the dispatcher.
    pub fn is_valid(&self) -> bool {
        !self.id.is_empty() && !self.command.is_empty()
    }
}

fn flexible_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Num(i64),
        Text(String),
    }

    Ok(match Option::<Id>::deserialize(deserializer)? {
        Some(Id::Num(n)) => n.to_string(),
        Some(Id::Text(s)) => s,
        None => String::new(),
    })
}

/// Outcome of one executed work item, immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub item_id: String,
    pub command: String,
    /// Wall-clock seconds from spawn to exit (or kill)
    pub duration_secs: f64,
    /// Escaped, size-capped stdout on success or stderr on failure
    pub output: String,
    /// Change in the agent's resident set across the execution, in MB
    pub memory_delta_mb: f64,
    pub success: bool,
    pub completed_at: DateTime<Utc>,
}

/// Wire form of a result accepted by `POST /submit_results`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultUpload {
    pub command_id: String,
    pub command: String,
    pub execution_time: f64,
    pub output: String,
    pub memory_usage: f64,
    pub client_description: String,
}

impl ResultUpload {
    pub fn from_result(result: &ExecutionResult, client_description: &str) -> Self {
        Self {
            command_id: result.item_id.clone(),
            command: result.command.clone(),
            execution_time: result.duration_secs,
            output: result.output.clone(),
            memory_usage: result.memory_delta_mb,
            client_description: client_description.to_string(),
        }
    }
}

/// Acknowledgement returned by `POST /submit_results`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitAck {
    pub status: String,
    #[serde(default)]
    pub count: u64,
}

/// Snapshot reported by `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorHealth {
    pub status: String,
    #[serde(default)]
    pub available_commands: u64,
    #[serde(default)]
    pub total_results: u64,
}

/// Escape line endings so multi-line command output survives line-oriented
/// logs and transport as a single line.
pub fn escape_line_endings(text: &str) -> String {
    text.replace('\n', "\\n").replace('\r', "\\r")
}

/// Cap `text` at `max_bytes`, marking the cut. The cut backs up to a char
/// boundary so the result stays valid UTF-8.
pub fn truncate_output(text: String, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text;
    }
    let mut cut = max_bytes;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut truncated = text[..cut].to_string();
    truncated.push_str(" ...[truncated]");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_item_accepts_integer_id() {
        let item: WorkItem = serde_json::from_str(r#"{"id": 42, "command": "echo hi"}"#).unwrap();
        assert_eq!(item.id, "42");
        assert_eq!(item.command, "echo hi");
        assert!(item.is_valid());
    }

    #[test]
    fn work_item_accepts_string_id() {
        let item: WorkItem =
            serde_json::from_str(r#"{"id": "job-7", "command": "uptime"}"#).unwrap();
        assert_eq!(item.id, "job-7");
        assert!(item.is_valid());
    }

    #[test]
    fn work_item_missing_fields_is_invalid() {
        let item: WorkItem = serde_json::from_str(r#"{"command": "echo hi"}"#).unwrap();
        assert!(!item.is_valid());

        let item: WorkItem = serde_json::from_str(r#"{"id": 1}"#).unwrap();
        assert!(!item.is_valid());

        let item: WorkItem = serde_json::from_str(r#"{"id": null, "command": "echo hi"}"#).unwrap();
        assert!(!item.is_valid());
    }

    #[test]
    fn escape_line_endings_replaces_both() {
        assert_eq!(escape_line_endings("a\nb\rc"), "a\\nb\\rc");
        assert_eq!(escape_line_endings("a\r\nb"), "a\\r\\nb");
        assert_eq!(escape_line_endings("plain"), "plain");
    }

    #[test]
    fn truncate_output_marks_the_cut() {
        let text = "x".repeat(100);
        let capped = truncate_output(text, 10);
        assert_eq!(capped, format!("{} ...[truncated]", "x".repeat(10)));
    }

    #[test]
    fn truncate_output_leaves_short_text_alone() {
        assert_eq!(truncate_output("short".to_string(), 100), "short");
    }

    #[test]
    fn truncate_output_respects_char_boundaries() {
        let text = "ééééé".to_string(); // 2 bytes per char
        let capped = truncate_output(text, 3);
        assert_eq!(capped, "é ...[truncated]");
    }

    #[test]
    fn result_upload_copies_result_fields() {
        let result = ExecutionResult {
            item_id: "9".to_string(),
            command: "echo hi".to_string(),
            duration_secs: 0.25,
            output: "hi\\n".to_string(),
            memory_delta_mb: 1.5,
            success: true,
            completed_at: Utc::now(),
        };
        let upload = ResultUpload::from_result(&result, "test agent");
        assert_eq!(upload.command_id, "9");
        assert_eq!(upload.command, "echo hi");
        assert_eq!(upload.execution_time, 0.25);
        assert_eq!(upload.output, "hi\\n");
        assert_eq!(upload.memory_usage, 1.5);
        assert_eq!(upload.client_description, "test agent");
    }

    #[test]
    fn coordinator_health_tolerates_missing_counts() {
        let health: CoordinatorHealth = serde_json::from_str(r#"{"status": "healthy"}"#).unwrap();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.available_commands, 0);
        assert_eq!(health.total_results, 0);
    }
}

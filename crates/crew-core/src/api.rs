//! Bodies of the crew server's HTTP command API.

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StartCrewRequest {
    pub feature_request: String,
}

/// Reply to start and stop commands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandReply {
    pub message: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_request: Option<String>,
}

fn default_total_tasks() -> u32 {
    4
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CrewStatus {
    pub is_running: bool,
    #[serde(default)]
    pub current_task: Option<String>,
    #[serde(default)]
    pub current_agent: Option<String>,
    #[serde(default)]
    pub progress: u32,
    #[serde(default = "default_total_tasks")]
    pub total_tasks: u32,
    #[serde(default)]
    pub start_time: Option<NaiveDateTime>,
}

impl Default for CrewStatus {
    fn default() -> Self {
        Self {
            is_running: false,
            current_task: None,
            current_agent: None,
            progress: 0,
            total_tasks: default_total_tasks(),
            start_time: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredOutput {
    pub output: String,
    #[serde(default)]
    pub output_type: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// task name -> agent name -> output
pub type OutputsByTask = BTreeMap<String, BTreeMap<String, StoredOutput>>;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutputsReply {
    #[serde(default, deserialize_with = "outputs_by_task")]
    pub outputs: OutputsByTask,
    #[serde(default)]
    pub count: usize,
}

impl OutputsReply {
    /// Flattened `(task, agent, output)` triples in task order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str, &StoredOutput)> {
        self.outputs.iter().flat_map(|(task, by_agent)| {
            by_agent
                .iter()
                .map(move |(agent, output)| (task.as_str(), agent.as_str(), output))
        })
    }
}

// Before the first run the server sends `"outputs": []`, and null is
// treated the same way.
fn outputs_by_task<'de, D>(deserializer: D) -> Result<OutputsByTask, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Shape {
        ByTask(OutputsByTask),
        List(Vec<Value>),
    }

    Ok(match Option::<Shape>::deserialize(deserializer)? {
        Some(Shape::ByTask(outputs)) => outputs,
        Some(Shape::List(_)) | None => BTreeMap::new(),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthReply {
    pub status: String,
    #[serde(default)]
    pub websocket_connections: u32,
    #[serde(default)]
    pub crew_running: bool,
}

/// Error body of a rejected command.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ErrorDetail {
    #[serde(default)]
    pub detail: Option<Value>,
}

impl ErrorDetail {
    pub fn text(&self) -> Option<String> {
        match self.detail.as_ref()? {
            Value::Null => None,
            Value::String(text) => Some(text.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_defaults_match_server_model() {
        let status: CrewStatus = serde_json::from_str(r#"{"is_running":false}"#).expect("status");
        assert_eq!(status, CrewStatus::default());

        let running: CrewStatus = serde_json::from_str(
            r#"{"is_running":true,"current_task":"uiux_design_task","current_agent":"UI/UX Designer","progress":25,"total_tasks":4,"start_time":"2026-10-16T09:15:02.123456"}"#,
        )
        .expect("status");
        assert!(running.is_running);
        assert_eq!(running.progress, 25);
        assert!(running.start_time.is_some());
    }

    #[test]
    fn outputs_accepts_nested_map_and_empty_list() {
        let empty: OutputsReply = serde_json::from_str(r#"{"outputs":[]}"#).expect("empty");
        assert!(empty.outputs.is_empty());
        let null: OutputsReply = serde_json::from_str(r#"{"outputs":null}"#).expect("null");
        assert!(null.outputs.is_empty());

        let reply: OutputsReply = serde_json::from_str(
            r#"{"outputs":{"backend_development_task":{"Backend Engineer":{"output":"{}","output_type":"backend_api","timestamp":"2026-10-16T09:20:00"}}},"count":1}"#,
        )
        .expect("outputs");
        let entries: Vec<_> = reply.entries().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "backend_development_task");
        assert_eq!(entries[0].1, "Backend Engineer");
        assert_eq!(entries[0].2.output_type.as_deref(), Some("backend_api"));
    }

    #[test]
    fn error_detail_text() {
        let detail: ErrorDetail =
            serde_json::from_str(r#"{"detail":"Crew is already running"}"#).expect("detail");
        assert_eq!(detail.text().as_deref(), Some("Crew is already running"));
        let structured: ErrorDetail =
            serde_json::from_str(r#"{"detail":[{"msg":"field required"}]}"#).expect("detail");
        assert_eq!(
            structured.text().as_deref(),
            Some(r#"[{"msg":"field required"}]"#)
        );
        assert_eq!(ErrorDetail::default().text(), None);
    }
}

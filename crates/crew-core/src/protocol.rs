//! Wire format of the crew server's WebSocket feed.
//!
//! Every frame is a JSON object with a `type` field. Workflow frames carry
//! `agent`, `task`, an optional top-level `progress` and a free-form `data`
//! object whose shape depends on the type.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    AgentStart,
    AgentThinking,
    AgentOutput,
    TaskComplete,
    CrewComplete,
    Error,
}

impl WorkflowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowKind::AgentStart => "agent_start",
            WorkflowKind::AgentThinking => "agent_thinking",
            WorkflowKind::AgentOutput => "agent_output",
            WorkflowKind::TaskComplete => "task_complete",
            WorkflowKind::CrewComplete => "crew_complete",
            WorkflowKind::Error => "error",
        }
    }

    pub fn from_type(raw: &str) -> Option<Self> {
        match raw {
            "agent_start" => Some(WorkflowKind::AgentStart),
            "agent_thinking" => Some(WorkflowKind::AgentThinking),
            "agent_output" => Some(WorkflowKind::AgentOutput),
            "task_complete" => Some(WorkflowKind::TaskComplete),
            "crew_complete" => Some(WorkflowKind::CrewComplete),
            "error" => Some(WorkflowKind::Error),
            _ => None,
        }
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrewMessage {
    #[serde(rename = "type")]
    pub kind: WorkflowKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    /// Protocol-level errors from the server put their text here instead of
    /// `data.error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentOutput {
    pub output: String,
    pub output_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CrewOutcome {
    pub success: bool,
    pub execution_time: Option<f64>,
    pub error_message: Option<String>,
    pub final_result: Option<String>,
}

impl CrewMessage {
    pub fn new(kind: WorkflowKind) -> Self {
        Self {
            kind,
            timestamp: None,
            agent: None,
            task: None,
            data: Value::Null,
            progress: None,
            message: None,
        }
    }

    pub fn agent_name(&self) -> &str {
        self.agent.as_deref().unwrap_or("")
    }

    pub fn task_name(&self) -> &str {
        self.task.as_deref().unwrap_or("")
    }

    pub fn thought(&self) -> Option<&str> {
        self.data_str("thought")
    }

    pub fn output(&self) -> Option<AgentOutput> {
        let output = match self.data.get("output")? {
            Value::Null => return None,
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        Some(AgentOutput {
            output,
            output_type: self.data_str("output_type").map(str::to_string),
        })
    }

    /// On failure the server may carry its error text in `final_result`
    /// instead of `error_message`.
    pub fn crew_outcome(&self) -> CrewOutcome {
        let success = self
            .data
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let final_result = self.data_str("final_result").map(str::to_string);
        let error_message = self
            .data_str("error_message")
            .map(str::to_string)
            .or_else(|| (!success).then(|| final_result.clone()).flatten());
        CrewOutcome {
            success,
            execution_time: self.data.get("execution_time").and_then(Value::as_f64),
            error_message,
            final_result,
        }
    }

    pub fn error_text(&self) -> String {
        self.data_str("error")
            .or(self.message.as_deref())
            .or_else(|| self.data_str("message"))
            .unwrap_or("Unknown error")
            .to_string()
    }

    /// Progress sent alongside the event, top-level first.
    pub fn explicit_progress(&self) -> Option<f64> {
        self.progress
            .or_else(|| self.data.get("progress").and_then(Value::as_f64))
    }

    fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Workflow(CrewMessage),
    Status(Value),
    Pong,
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("frame has no type field")]
    MissingType,
    #[error("invalid {kind} payload: {detail}")]
    InvalidPayload { kind: String, detail: String },
    #[error("encode failed: {0}")]
    Encode(String),
}

pub fn decode_inbound(raw: &str) -> Result<Inbound, ProtocolError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|err| ProtocolError::Malformed(err.to_string()))?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)?
        .to_string();
    match kind.as_str() {
        "pong" => Ok(Inbound::Pong),
        "status" => Ok(Inbound::Status(value)),
        other if WorkflowKind::from_type(other).is_some() => serde_json::from_value(value)
            .map(Inbound::Workflow)
            .map_err(|err| ProtocolError::InvalidPayload {
                kind: kind.clone(),
                detail: err.to_string(),
            }),
        _ => Ok(Inbound::Unknown(kind)),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Ping { timestamp: i64 },
    GetStatus { timestamp: i64 },
}

impl OutboundMessage {
    pub fn ping() -> Self {
        OutboundMessage::Ping {
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn status_request() -> Self {
        OutboundMessage::GetStatus {
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|err| ProtocolError::Encode(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_frames_decode_with_payload_accessors() {
        let raw = r#"{
            "type": "agent_output",
            "timestamp": "2026-10-16T09:00:00",
            "agent": "Backend Engineer",
            "task": "backend_development_task",
            "data": {"message": "done", "output": "{\"a\":1}", "output_type": "backend_api"},
            "progress": null
        }"#;
        let Inbound::Workflow(message) = decode_inbound(raw).expect("decode") else {
            panic!("expected workflow frame");
        };
        assert_eq!(message.kind, WorkflowKind::AgentOutput);
        assert_eq!(message.agent_name(), "Backend Engineer");
        assert_eq!(message.task_name(), "backend_development_task");
        let output = message.output().expect("output");
        assert_eq!(output.output, "{\"a\":1}");
        assert_eq!(output.output_type.as_deref(), Some("backend_api"));
        assert_eq!(message.explicit_progress(), None);
    }

    #[test]
    fn non_string_output_is_kept_as_json_text() {
        let raw = r#"{"type":"agent_output","agent":"PM","task":"product_design_task","data":{"output":{"title":"x"}}}"#;
        let Inbound::Workflow(message) = decode_inbound(raw).expect("decode") else {
            panic!("expected workflow frame");
        };
        assert_eq!(message.output().expect("output").output, r#"{"title":"x"}"#);
    }

    #[test]
    fn crew_complete_outcome_fields() {
        let raw = r#"{"type":"crew_complete","data":{"success":false,"execution_time":12.5,"error_message":"boom"},"progress":100}"#;
        let Inbound::Workflow(message) = decode_inbound(raw).expect("decode") else {
            panic!("expected workflow frame");
        };
        let outcome = message.crew_outcome();
        assert!(!outcome.success);
        assert_eq!(outcome.execution_time, Some(12.5));
        assert_eq!(outcome.error_message.as_deref(), Some("boom"));
        assert_eq!(message.explicit_progress(), Some(100.0));
    }

    #[test]
    fn failure_text_falls_back_to_final_result() {
        let raw = r#"{"type":"crew_complete","data":{"success":false,"final_result":"boom"}}"#;
        let Inbound::Workflow(message) = decode_inbound(raw).expect("decode") else {
            panic!("expected workflow frame");
        };
        assert_eq!(message.crew_outcome().error_message.as_deref(), Some("boom"));

        let raw = r#"{"type":"crew_complete","data":{"success":true,"final_result":"shipped"}}"#;
        let Inbound::Workflow(message) = decode_inbound(raw).expect("decode") else {
            panic!("expected workflow frame");
        };
        let outcome = message.crew_outcome();
        assert_eq!(outcome.error_message, None);
        assert_eq!(outcome.final_result.as_deref(), Some("shipped"));
    }

    #[test]
    fn server_protocol_error_uses_top_level_message() {
        let raw = r#"{"type":"error","message":"Invalid JSON format","timestamp":"12.5"}"#;
        let Inbound::Workflow(message) = decode_inbound(raw).expect("decode") else {
            panic!("expected workflow frame");
        };
        assert_eq!(message.error_text(), "Invalid JSON format");
        assert!(message.task.is_none());
    }

    #[test]
    fn status_pong_and_unknown_frames() {
        let status = decode_inbound(r#"{"type":"status","connections":2}"#).expect("status");
        match status {
            Inbound::Status(value) => assert_eq!(value["connections"], 2),
            other => panic!("unexpected frame: {other:?}"),
        }
        assert_eq!(
            decode_inbound(r#"{"type":"pong","timestamp":1}"#),
            Ok(Inbound::Pong)
        );
        assert_eq!(
            decode_inbound(r#"{"type":"telemetry"}"#),
            Ok(Inbound::Unknown("telemetry".to_string()))
        );
    }

    #[test]
    fn malformed_frames_are_errors() {
        assert!(matches!(
            decode_inbound("{not json"),
            Err(ProtocolError::Malformed(_))
        ));
        assert_eq!(
            decode_inbound(r#"{"agent":"PM"}"#),
            Err(ProtocolError::MissingType)
        );
        assert!(matches!(
            decode_inbound(r#"{"type":"agent_start","agent":7}"#),
            Err(ProtocolError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn ping_encodes_with_type_tag() {
        let encoded = OutboundMessage::Ping { timestamp: 42 }.encode().expect("encode");
        assert_eq!(encoded, r#"{"type":"ping","timestamp":42}"#);
        let status = OutboundMessage::GetStatus { timestamp: 7 }.encode().expect("encode");
        assert_eq!(status, r#"{"type":"get_status","timestamp":7}"#);
    }
}

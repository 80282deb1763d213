//! Task progress protocol messages.

use crate::SyncResult;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Kind of generation job a task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Storyboard,
    Image,
    Video,
    Audio,
    Compose,
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// No further progress is expected after a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Position in `pending < queued < running < {completed, failed, cancelled}`.
    pub fn rank(self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Queued => 1,
            TaskStatus::Running => 2,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled => 3,
        }
    }
}

/// Progress update for one task, as pushed by the server.
///
/// On the wire the kind is carried in `type`:
/// `{"task_id":"t1","type":"image","status":"running","progress":40}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub task_id: String,
    #[serde(rename = "type", alias = "kind")]
    pub kind: TaskKind,
    pub status: TaskStatus,
    #[serde(deserialize_with = "clamped_progress")]
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_id: Option<String>,
}

fn clamped_progress<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    Ok(raw.clamp(0.0, 100.0).round() as u8)
}

impl ProgressEvent {
    /// String field from `result`, if present.
    pub fn result_str(&self, key: &str) -> Option<&str> {
        self.result.as_ref()?.get(key)?.as_str()
    }

    /// Scene this task belongs to: `result.scene_id` first, then the
    /// top-level `scene_id`.
    pub fn associated_scene(&self) -> Option<&str> {
        self.result_str("scene_id")
            .or(self.scene_id.as_deref())
            .filter(|id| !id.is_empty())
    }

    fn normalize(mut self) -> Result<Self, MessageError> {
        let trimmed = self.task_id.trim();
        if trimmed.is_empty() {
            return Err(MessageError::EmptyTaskId);
        }
        if trimmed.len() != self.task_id.len() {
            self.task_id = trimmed.to_string();
        }
        // The backend sends "" when there is nothing to say.
        self.message = self.message.filter(|m| !m.is_empty());
        self.error = self.error.filter(|e| !e.is_empty());
        Ok(self)
    }
}

/// Control envelopes identified by `type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlKind {
    /// Reply to our `ping`.
    Pong,
    /// Server-side keepalive sent on idle connections.
    Heartbeat,
    /// Any other control type.
    Other(String),
}

/// A parsed inbound text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Progress(ProgressEvent),
    Control(ControlKind),
}

/// Why an inbound frame could not be understood.
#[derive(Error, Debug)]
pub enum MessageError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message is not a JSON object")]
    NotAnObject,

    #[error("message has neither task_id nor type")]
    Untyped,

    #[error("task_id is empty")]
    EmptyTaskId,
}

impl InboundMessage {
    /// Parse a raw text frame. Anything carrying `task_id` is a progress
    /// envelope; everything else must carry a string `type`.
    pub fn parse(raw: &str) -> Result<Self, MessageError> {
        let value: Value = serde_json::from_str(raw)?;
        let object = value.as_object().ok_or(MessageError::NotAnObject)?;

        if object.contains_key("task_id") {
            let event: ProgressEvent = serde_json::from_value(value)?;
            return event.normalize().map(InboundMessage::Progress);
        }

        let kind = match object.get("type").and_then(Value::as_str) {
            Some("pong") => ControlKind::Pong,
            Some("heartbeat") => ControlKind::Heartbeat,
            Some(other) => ControlKind::Other(other.to_string()),
            None => return Err(MessageError::Untyped),
        };
        Ok(InboundMessage::Control(kind))
    }
}

/// Messages the client sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
}

impl ClientMessage {
    pub fn to_json(&self) -> SyncResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_message() {
        assert_eq!(ClientMessage::Ping.to_json().unwrap(), r#"{"type":"ping"}"#);
    }

    #[test]
    fn test_parse_progress_event() {
        let raw = r#"{"task_id":"t1","type":"image","status":"running","progress":40,"message":"generating"}"#;
        let InboundMessage::Progress(event) = InboundMessage::parse(raw).unwrap() else {
            panic!("expected progress event");
        };

        assert_eq!(event.task_id, "t1");
        assert_eq!(event.kind, TaskKind::Image);
        assert_eq!(event.status, TaskStatus::Running);
        assert_eq!(event.progress, 40);
        assert_eq!(event.message.as_deref(), Some("generating"));
        assert!(event.result.is_none());
    }

    #[test]
    fn test_parse_accepts_kind_alias_and_extra_fields() {
        let raw = r#"{"task_id":"t2","kind":"video","status":"queued","progress":0,"project_id":"p1"}"#;
        let InboundMessage::Progress(event) = InboundMessage::parse(raw).unwrap() else {
            panic!("expected progress event");
        };
        assert_eq!(event.kind, TaskKind::Video);
        assert_eq!(event.status, TaskStatus::Queued);
    }

    #[test]
    fn test_progress_is_clamped() {
        let high = r#"{"task_id":"t","type":"image","status":"running","progress":250}"#;
        let low = r#"{"task_id":"t","type":"image","status":"running","progress":-3}"#;
        let frac = r#"{"task_id":"t","type":"image","status":"running","progress":49.6}"#;

        for (raw, expected) in [(high, 100), (low, 0), (frac, 50)] {
            match InboundMessage::parse(raw).unwrap() {
                InboundMessage::Progress(event) => assert_eq!(event.progress, expected),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_empty_strings_normalize_to_none() {
        let raw = r#"{"task_id":" t3 ","type":"compose","status":"running","progress":10,"message":"","error":""}"#;
        let InboundMessage::Progress(event) = InboundMessage::parse(raw).unwrap() else {
            panic!("expected progress event");
        };
        assert_eq!(event.task_id, "t3");
        assert!(event.message.is_none());
        assert!(event.error.is_none());
    }

    #[test]
    fn test_parse_control_messages() {
        assert_eq!(
            InboundMessage::parse(r#"{"type":"pong"}"#).unwrap(),
            InboundMessage::Control(ControlKind::Pong)
        );
        assert_eq!(
            InboundMessage::parse(r#"{"type":"heartbeat"}"#).unwrap(),
            InboundMessage::Control(ControlKind::Heartbeat)
        );
        assert_eq!(
            InboundMessage::parse(r#"{"type":"maintenance"}"#).unwrap(),
            InboundMessage::Control(ControlKind::Other("maintenance".to_string()))
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(
            InboundMessage::parse("not json"),
            Err(MessageError::Json(_))
        ));
        assert!(matches!(
            InboundMessage::parse("[1,2]"),
            Err(MessageError::NotAnObject)
        ));
        assert!(matches!(
            InboundMessage::parse(r#"{"hello":"world"}"#),
            Err(MessageError::Untyped)
        ));
        assert!(matches!(
            InboundMessage::parse(r#"{"task_id":"t","type":"image","status":"exploded","progress":1}"#),
            Err(MessageError::Json(_))
        ));
        assert!(matches!(
            InboundMessage::parse(r#"{"task_id":"  ","type":"image","status":"running","progress":1}"#),
            Err(MessageError::EmptyTaskId)
        ));
    }

    #[test]
    fn test_associated_scene_prefers_result() {
        let raw = r#"{"task_id":"t","type":"image","status":"completed","progress":100,
                      "scene_id":"outer","result":{"scene_id":"inner","image_url":"x"}}"#;
        let InboundMessage::Progress(event) = InboundMessage::parse(raw).unwrap() else {
            panic!("expected progress event");
        };
        assert_eq!(event.associated_scene(), Some("inner"));
        assert_eq!(event.result_str("image_url"), Some("x"));
    }

    #[test]
    fn test_status_ranking() {
        assert!(TaskStatus::Pending.rank() < TaskStatus::Queued.rank());
        assert!(TaskStatus::Queued.rank() < TaskStatus::Running.rank());
        assert!(TaskStatus::Running.rank() < TaskStatus::Completed.rank());
        assert_eq!(TaskStatus::Failed.rank(), TaskStatus::Completed.rank());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }
}

//! Push channel wire format: one JSON text frame per event, shaped
//! `{"type": <kind>, "data": {...}}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FrameError;
use crate::tasks::TaskPatch;
use crate::types::{Agent, ConversationId, TaskId};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RosterUpdate {
    pub agents: Vec<Agent>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AgentThinking {
    pub agent: String,
    #[serde(default)]
    pub task_id: Option<TaskId>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AgentToken {
    #[serde(default)]
    pub agent: Option<String>,
    pub token: String,
    #[serde(default)]
    pub task_id: Option<TaskId>,
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AgentComplete {
    pub agent: String,
    #[serde(default)]
    pub task_id: Option<TaskId>,
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DelegationNotice {
    pub from_agent: String,
    pub to_agent: String,
    #[serde(default)]
    pub task: String,
    #[serde(default)]
    pub task_id: Option<TaskId>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerError {
    pub message: String,
}

/// An inbound event, classified by kind. The set of kinds is closed;
/// anything else decodes to `Unknown` and is ignored downstream.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    StatusUpdate(RosterUpdate),
    AgentThinking(AgentThinking),
    AgentResponse(AgentToken),
    AgentComplete(AgentComplete),
    Delegation(DelegationNotice),
    TaskUpdate(TaskPatch),
    Error(ServerError),
    Unknown { kind: String },
}

impl PushEvent {
    pub fn kind(&self) -> &str {
        match self {
            Self::StatusUpdate(_) => "status_update",
            Self::AgentThinking(_) => "agent_thinking",
            Self::AgentResponse(_) => "agent_response",
            Self::AgentComplete(_) => "agent_complete",
            Self::Delegation(_) => "delegation",
            Self::TaskUpdate(_) => "task_update",
            Self::Error(_) => "error",
            Self::Unknown { kind } => kind,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Serialize)]
struct OutboundEnvelope<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    data: &'a Value,
}

/// Decode one text frame.
///
/// Frames that are not JSON, lack a `type`, or carry a payload that does not
/// fit their kind are errors; the transport drops them. Unrecognized kinds
/// are not errors.
pub fn parse_frame(text: &str) -> Result<PushEvent, FrameError> {
    let envelope: Envelope = serde_json::from_str(text).map_err(FrameError::Malformed)?;
    let Envelope { kind, data } = envelope;

    fn payload<T: for<'de> Deserialize<'de>>(kind: &str, data: Value) -> Result<T, FrameError> {
        serde_json::from_value(data).map_err(|source| FrameError::InvalidPayload {
            kind: kind.to_string(),
            source,
        })
    }

    let event = match kind.as_str() {
        "status_update" => PushEvent::StatusUpdate(payload(&kind, data)?),
        "agent_thinking" => PushEvent::AgentThinking(payload(&kind, data)?),
        "agent_response" => PushEvent::AgentResponse(payload(&kind, data)?),
        "agent_complete" => PushEvent::AgentComplete(payload(&kind, data)?),
        "delegation" => PushEvent::Delegation(payload(&kind, data)?),
        "task_update" => PushEvent::TaskUpdate(payload(&kind, data)?),
        "error" => PushEvent::Error(payload(&kind, data)?),
        _ => PushEvent::Unknown { kind },
    };
    Ok(event)
}

/// Encode an outbound `(type, data)` frame.
pub fn encode_frame(kind: &str, data: &Value) -> String {
    let envelope = OutboundEnvelope { kind, data };
    // A `&str` and a `Value` always serialize.
    serde_json::to_string(&envelope).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskStatus;

    #[test]
    fn parse_status_update() {
        let ev = parse_frame(
            r#"{"type": "status_update", "data": {"agents": [
                {"name": "Coordinator", "status": "idle", "current_task": null},
                {"name": "Coder", "status": "thinking", "current_task": "12"}]}}"#,
        )
        .unwrap();
        match ev {
            PushEvent::StatusUpdate(update) => {
                assert_eq!(update.agents.len(), 2);
                assert_eq!(update.agents[1].current_task.as_deref(), Some("12"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn parse_thinking_and_tokens() {
        let ev = parse_frame(r#"{"type": "agent_thinking", "data": {"agent": "Coder", "task_id": 4}}"#)
            .unwrap();
        assert_eq!(
            ev,
            PushEvent::AgentThinking(AgentThinking {
                agent: "Coder".into(),
                task_id: Some(4),
            })
        );

        let ev = parse_frame(
            r#"{"type": "agent_response", "data": {"agent": "Coder", "token": "fn ",
                "task_id": 4, "conversation_id": 1}}"#,
        )
        .unwrap();
        match ev {
            PushEvent::AgentResponse(tok) => {
                assert_eq!(tok.token, "fn ");
                assert_eq!(tok.conversation_id, Some(1));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn parse_delegation_and_task_update() {
        let ev = parse_frame(
            r#"{"type": "delegation", "data": {"from_agent": "Coordinator",
                "to_agent": "Researcher", "task": "find sources", "task_id": 8}}"#,
        )
        .unwrap();
        assert_eq!(ev.kind(), "delegation");

        let ev = parse_frame(
            r#"{"type": "task_update", "data": {"task_id": 8, "status": "complete", "agent": "Researcher"}}"#,
        )
        .unwrap();
        match ev {
            PushEvent::TaskUpdate(p) => {
                assert_eq!(p.id, 8);
                assert_eq!(p.status, Some(TaskStatus::Complete));
                assert_eq!(p.assigned_agent, Some(Some("Researcher".to_string())));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_kind_is_not_an_error() {
        let ev = parse_frame(r#"{"type": "pong", "data": {}}"#).unwrap();
        assert_eq!(ev, PushEvent::Unknown { kind: "pong".into() });

        let ev = parse_frame(r#"{"type": "chat_complete"}"#).unwrap();
        assert_eq!(ev.kind(), "chat_complete");
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(matches!(
            parse_frame("this is not valid json {{{"),
            Err(FrameError::Malformed(_))
        ));
        assert!(matches!(
            parse_frame(r#"{"data": {}}"#),
            Err(FrameError::Malformed(_))
        ));
    }

    #[test]
    fn payload_mismatch_is_rejected() {
        let err = parse_frame(r#"{"type": "agent_response", "data": {"agent": "Coder"}}"#)
            .unwrap_err();
        match err {
            FrameError::InvalidPayload { kind, .. } => assert_eq!(kind, "agent_response"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn encode_outbound_frame() {
        let frame = encode_frame("get_status", &serde_json::json!({}));
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "get_status");
        assert!(value["data"].as_object().unwrap().is_empty());
    }
}

//! JSON-RPC 2.0 wire protocol surface (the "Agent-to-Agent" dialect) and the
//! agent-card document published at `.well-known/agent.json`.

use crate::domain_types::{ContextId, MessageId, TaskId, TaskState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single content part of a message. Only text parts are produced or
/// consumed by this orchestrator; other kinds round-trip opaquely.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MessagePart {
    Text { text: String },
    #[serde(other)]
    Other,
}

/// Role of the sender of a wire-level message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Agent,
}

/// A single wire-level message, exchanged both inbound (user request) and
/// outbound (agent reply, task history entries)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: MessageRole,
    pub parts: Vec<MessagePart>,
    #[serde(rename = "messageId")]
    pub message_id: MessageId,
    #[serde(rename = "taskId", skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(rename = "contextId", skip_serializing_if = "Option::is_none")]
    pub context_id: Option<ContextId>,
    pub kind: MessageKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Message,
}

impl WireMessage {
    /// Builds an outbound agent message carrying a single text part
    pub fn agent_text(context_id: ContextId, text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Agent,
            parts: vec![MessagePart::Text { text: text.into() }],
            message_id: MessageId::generate(),
            task_id: None,
            context_id: Some(context_id),
            kind: MessageKind::Message,
        }
    }

    /// Concatenates all text parts, in order, with no separator
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                MessagePart::Text { text } => Some(text.as_str()),
                MessagePart::Other => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Status envelope attached to a `Task`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<WireMessage>,
    pub timestamp: DateTime<Utc>,
}

/// A durable, addressable unit of work returned in place of a plain message
/// when the reply is interrogative or long-running
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    #[serde(rename = "contextId")]
    pub context_id: ContextId,
    pub status: TaskStatus,
    pub history: Vec<WireMessage>,
}

/// The result half of a `message/send` call: either a finished plain
/// message, or a task that must be resumed with `tasks/get`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SendMessageResult {
    Message(WireMessage),
    Task(Task),
}

/// Parameters for the `message/send` method
#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageParams {
    pub message: WireMessage,
    #[serde(default)]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Parameters for `tasks/get` and `tasks/cancel`
#[derive(Debug, Clone, Deserialize)]
pub struct TaskIdParams {
    pub id: TaskId,
}

/// JSON-RPC 2.0 envelope, generic over the method-specific `params`
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest<P> {
    pub jsonrpc: String,
    pub method: String,
    pub params: P,
    #[serde(default)]
    pub id: Option<serde_json::Value>,
}

/// A JSON-RPC 2.0 error object
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    pub const INVALID_PARAMS: i32 = -32602;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INTERNAL_ERROR: i32 = -32603;
    pub const TASK_NOT_FOUND: i32 = -32000;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// A JSON-RPC 2.0 response envelope, success or error
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: serde_json::Value,
}

impl JsonRpcResponse {
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0",
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn failure(id: serde_json::Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0",
            result: None,
            error: Some(error),
            id,
        }
    }
}

/// Transport an agent declares it speaks, published on its agent card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PreferredTransport {
    Jsonrpc,
    HttpJson,
    Grpc,
}

/// Capability flags published on an agent card
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AgentCapabilities {
    pub streaming: bool,
    #[serde(rename = "pushNotifications")]
    pub push_notifications: bool,
    #[serde(rename = "stateTransitionHistory")]
    pub state_transition_history: bool,
}

/// One declared skill on an agent card
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSkill {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// The self-describing document an agent publishes at
/// `.well-known/agent.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCard {
    pub name: String,
    pub description: String,
    pub url: String,
    #[serde(rename = "preferredTransport")]
    pub preferred_transport: PreferredTransport,
    pub capabilities: AgentCapabilities,
    #[serde(rename = "defaultInputModes")]
    pub default_input_modes: Vec<String>,
    #[serde(rename = "defaultOutputModes")]
    pub default_output_modes: Vec<String>,
    pub skills: Vec<AgentSkill>,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_message_text_joins_only_text_parts() {
        let msg = WireMessage {
            role: MessageRole::Agent,
            parts: vec![
                MessagePart::Text {
                    text: "hello".to_string(),
                },
                MessagePart::Other,
                MessagePart::Text {
                    text: " world".to_string(),
                },
            ],
            message_id: MessageId::generate(),
            task_id: None,
            context_id: None,
            kind: MessageKind::Message,
        };
        assert_eq!(msg.text(), "hello world");
    }

    #[test]
    fn send_message_result_serializes_message_variant_untagged() {
        let result = SendMessageResult::Message(WireMessage::agent_text(
            ContextId::generate(),
            "turned on the lights",
        ));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["role"], "agent");
        assert!(json.get("status").is_none());
    }

    #[test]
    fn task_state_round_trips_through_status() {
        let status = TaskStatus {
            state: TaskState::InputRequired,
            message: None,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "input-required");
    }

    #[test]
    fn agent_card_round_trips() {
        let card = AgentCard {
            name: "light".to_string(),
            description: "controls lights".to_string(),
            url: "http://localhost:9001".to_string(),
            preferred_transport: PreferredTransport::Jsonrpc,
            capabilities: AgentCapabilities {
                streaming: false,
                push_notifications: false,
                state_transition_history: true,
            },
            default_input_modes: vec!["text".to_string()],
            default_output_modes: vec!["text".to_string()],
            skills: vec![AgentSkill {
                id: "turn-on".to_string(),
                name: "Turn on".to_string(),
                description: "Turns on a light".to_string(),
            }],
            version: "1.0.0".to_string(),
        };
        let json = serde_json::to_string(&card).unwrap();
        let restored: AgentCard = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.name, card.name);
        assert_eq!(restored.capabilities.state_transition_history, true);
    }
}

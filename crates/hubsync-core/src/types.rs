use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::serde_helpers::opt_string_or_number;

pub type TaskId = i64;
pub type ConversationId = i64;
pub type MessageId = i64;

/// Agent label used for entries and messages produced by the client itself.
pub const SYSTEM_AGENT: &str = "System";

// ─── Agents ───────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Idle,
    Thinking,
    Working,
}

impl AgentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Thinking => "thinking",
            Self::Working => "working",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One member of the agent roster. `name` is the primary key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub name: String,
    /// The push channel's roster payload omits the role.
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub status: AgentStatus,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub current_task: Option<String>,
}

impl Agent {
    pub fn new(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            status: AgentStatus::Idle,
            current_task: None,
        }
    }
}

// ─── Conversations & Messages ─────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// A conversation together with its full message list, as returned by the
/// get-by-id read API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub conversation: Conversation,
    #[serde(default)]
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Server ids are positive; messages created locally before the server
    /// confirms them carry negative ids.
    pub id: MessageId,
    pub role: MessageRole,
    #[serde(default)]
    pub agent_name: Option<String>,
    pub content: String,
    /// Opaque server timestamp; locally created messages use RFC 3339.
    #[serde(default)]
    pub created_at: Option<String>,
}

// ─── Tasks ────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Complete,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delegation {
    pub from_agent: String,
    pub to_agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Reduced task shape used for the children of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtaskSummary {
    pub id: TaskId,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub assigned_agent: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub completed_at: Option<String>,
}

/// A task as held in the task board. Push payloads key the id as `task_id`
/// and the agent as `agent`; the read API uses `id` and `assigned_agent`.
/// Keys this client does not model are kept in `extra` so that merges never
/// drop server data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(alias = "task_id")]
    pub id: TaskId,
    #[serde(default, alias = "agent")]
    pub assigned_agent: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub delegations: Vec<Delegation>,
    #[serde(default)]
    pub subtasks: Vec<SubtaskSummary>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,
    #[serde(default)]
    pub parent_task_id: Option<TaskId>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Task {
    pub fn new(id: TaskId) -> Self {
        Self {
            id,
            assigned_agent: None,
            status: TaskStatus::Pending,
            description: String::new(),
            delegations: Vec::new(),
            subtasks: Vec::new(),
            result: None,
            conversation_id: None,
            parent_task_id: None,
            created_at: None,
            completed_at: None,
            extra: Map::new(),
        }
    }
}

// ─── Connection ───────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }

    pub fn is_open(self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Streaming ────────────────────────────────────────────────────

/// Accumulator for the in-flight, not yet finalized assistant response.
/// At most one exists per session; it is open while `agent` is set.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingBuffer {
    pub agent: Option<String>,
    pub text: String,
}

impl StreamingBuffer {
    pub fn is_open(&self) -> bool {
        self.agent.is_some()
    }

    /// Open a fresh stream for `agent`, discarding whatever was buffered.
    pub fn open(&mut self, agent: impl Into<String>) {
        self.agent = Some(agent.into());
        self.text.clear();
    }

    /// Append a token. Returns `false` (and drops the token) if no stream is open.
    pub fn append(&mut self, token: &str) -> bool {
        if !self.is_open() {
            return false;
        }
        self.text.push_str(token);
        true
    }

    /// Hand the open stream to another agent, keeping the text so far.
    pub fn retarget(&mut self, agent: impl Into<String>) -> bool {
        if !self.is_open() {
            return false;
        }
        self.agent = Some(agent.into());
        true
    }

    pub fn clear(&mut self) {
        self.agent = None;
        self.text.clear();
    }
}

use std::sync::Arc;

use chrono::Utc;

use crate::activity::{ActivityEntry, ActivityKind, ActivityLog};
use crate::tasks::{TaskBoard, TaskPatch, Upsert};
use crate::types::{
    Agent, AgentStatus, ConnectionStatus, Conversation, ConversationDetail, ConversationId,
    Message, MessageId, MessageRole, StreamingBuffer, Task, TaskId, SYSTEM_AGENT,
};

/// The in-memory model of one chat session.
///
/// Every mutation goes through one of the reducers below. Reducers are
/// synchronous and never perform I/O; whoever owns the state triggers any
/// follow-up reads.
///
/// The history collections sit behind `Arc` and are copied on write, so a
/// clone taken for every streamed token only copies the stream itself.
#[derive(Debug, Clone)]
pub struct SessionState {
    agents: Arc<Vec<Agent>>,
    conversations: Arc<Vec<Conversation>>,
    current_conversation: Option<Conversation>,
    messages: Arc<Vec<Message>>,
    selected_agent: Option<String>,
    send_in_flight: bool,
    stream: StreamingBuffer,
    tasks: Arc<TaskBoard>,
    activity: Arc<ActivityLog>,
    connection: ConnectionStatus,
    next_local_id: MessageId,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            agents: Arc::default(),
            conversations: Arc::default(),
            current_conversation: None,
            messages: Arc::default(),
            selected_agent: None,
            send_in_flight: false,
            stream: StreamingBuffer::default(),
            tasks: Arc::default(),
            activity: Arc::default(),
            connection: ConnectionStatus::Disconnected,
            next_local_id: -1,
        }
    }

    // ─── Accessors ────────────────────────────────────────────────

    pub fn agents(&self) -> &[Agent] {
        self.agents.as_slice()
    }

    pub fn agent(&self, name: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.name == name)
    }

    pub fn conversations(&self) -> &[Conversation] {
        self.conversations.as_slice()
    }

    pub fn current_conversation(&self) -> Option<&Conversation> {
        self.current_conversation.as_ref()
    }

    pub fn messages(&self) -> &[Message] {
        self.messages.as_slice()
    }

    pub fn selected_agent(&self) -> Option<&str> {
        self.selected_agent.as_deref()
    }

    pub fn is_sending(&self) -> bool {
        self.send_in_flight
    }

    pub fn stream(&self) -> &StreamingBuffer {
        &self.stream
    }

    pub fn tasks(&self) -> &TaskBoard {
        &self.tasks
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    pub fn connection(&self) -> ConnectionStatus {
        self.connection
    }

    // ─── Push event reducers ──────────────────────────────────────

    pub fn replace_roster(&mut self, agents: Vec<Agent>) {
        self.agents = Arc::new(agents);
    }

    /// An agent started a turn: flag it, open a fresh stream for it and log it.
    pub fn mark_thinking(&mut self, agent: &str, task_id: Option<TaskId>) {
        self.set_agent_status(agent, AgentStatus::Thinking, task_id.map(|id| id.to_string()));
        self.stream.open(agent);
        self.push_activity(ActivityEntry::new(
            ActivityKind::Thinking,
            agent,
            format!("{agent} is thinking..."),
        ));
    }

    /// Returns `false` if the token was dropped because no stream is open.
    pub fn append_token(&mut self, token: &str) -> bool {
        self.stream.append(token)
    }

    /// The agent finished its turn. The stream stays as it is: the final
    /// message only arrives through the reload that follows the send.
    pub fn mark_complete(&mut self, agent: &str) {
        self.set_agent_status(agent, AgentStatus::Idle, None);
        self.push_activity(ActivityEntry::new(
            ActivityKind::Complete,
            agent,
            format!("{agent} completed response"),
        ));
    }

    /// Log the hand-off and give the open stream to the delegate.
    pub fn record_delegation(&mut self, from_agent: &str, to_agent: &str, task: &str) {
        self.push_activity(ActivityEntry::new(
            ActivityKind::Delegation,
            from_agent,
            format!("{from_agent} delegated to {to_agent}: {task}"),
        ));
        self.stream.retarget(to_agent);
    }

    pub fn upsert_task(&mut self, patch: TaskPatch) -> Upsert {
        Arc::make_mut(&mut self.tasks).upsert(patch)
    }

    pub fn seed_tasks(&mut self, tasks: Vec<Task>) {
        Arc::make_mut(&mut self.tasks).seed(tasks);
    }

    pub fn record_error(&mut self, message: &str) {
        self.push_activity(ActivityEntry::new(ActivityKind::Error, SYSTEM_AGENT, message));
    }

    pub fn push_activity(&mut self, entry: ActivityEntry) {
        Arc::make_mut(&mut self.activity).push(entry);
    }

    /// Returns `true` if the status actually changed.
    pub fn set_connection(&mut self, status: ConnectionStatus) -> bool {
        let changed = self.connection != status;
        self.connection = status;
        changed
    }

    // ─── Command reducers ─────────────────────────────────────────

    pub fn select_agent(&mut self, agent: Option<String>) {
        self.selected_agent = agent;
    }

    pub fn set_sending(&mut self, sending: bool) {
        self.send_in_flight = sending;
    }

    /// Append the user's message before the server has seen it.
    pub fn push_user_message(&mut self, content: &str) -> MessageId {
        self.push_local_message(MessageRole::User, None, content.to_string())
    }

    /// Surface a failed command as an assistant message from `System`.
    pub fn push_system_error(&mut self, description: &str) -> MessageId {
        self.push_local_message(
            MessageRole::Assistant,
            Some(SYSTEM_AGENT.to_string()),
            format!("Error: {description}"),
        )
    }

    /// Make `id` the current conversation unless it already is. A new
    /// conversation takes `title` as its provisional title.
    pub fn adopt_conversation(&mut self, id: ConversationId, title: &str) {
        if self.current_conversation.as_ref().is_some_and(|c| c.id == id) {
            return;
        }
        self.current_conversation = Some(Conversation {
            id,
            title: title.to_string(),
            created_at: None,
            updated_at: None,
        });
    }

    /// Open a conversation loaded from the read API.
    pub fn open_conversation(&mut self, detail: ConversationDetail) {
        self.current_conversation = Some(detail.conversation);
        self.messages = Arc::new(detail.messages);
    }

    /// Leave the current conversation without starting a new one.
    pub fn close_conversation(&mut self) {
        self.current_conversation = None;
        self.messages = Arc::default();
    }

    /// Start over: no current conversation, no messages, no stream.
    pub fn reset_conversation(&mut self) {
        self.close_conversation();
        self.stream.clear();
    }

    pub fn replace_messages(&mut self, messages: Vec<Message>) {
        self.messages = Arc::new(messages);
    }

    pub fn replace_conversations(&mut self, conversations: Vec<Conversation>) {
        self.conversations = Arc::new(conversations);
    }

    pub fn clear_stream(&mut self) {
        self.stream.clear();
    }

    // ─── Internals ────────────────────────────────────────────────

    fn set_agent_status(&mut self, name: &str, status: AgentStatus, task: Option<String>) {
        let Some(idx) = self.agents.iter().position(|a| a.name == name) else {
            return;
        };
        let agent = &mut Arc::make_mut(&mut self.agents)[idx];
        agent.status = status;
        agent.current_task = task;
    }

    fn push_local_message(
        &mut self,
        role: MessageRole,
        agent_name: Option<String>,
        content: String,
    ) -> MessageId {
        let id = self.next_local_id;
        self.next_local_id -= 1;
        Arc::make_mut(&mut self.messages).push(Message {
            id,
            role,
            agent_name,
            content,
            created_at: Some(Utc::now().to_rfc3339()),
        });
        id
    }
}

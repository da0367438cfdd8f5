//! Session actor: the single owner of `SessionState`.
//!
//! Channel events, consumer commands and the results of background HTTP
//! calls all arrive as messages and are applied one at a time. After each
//! input that changed something, a snapshot is published on a `watch`
//! channel and the matching notifications on a `broadcast` channel.

use std::sync::Arc;

use hubsync_core::activity::ActivityEntry;
use hubsync_core::dispatch::{SendOutcome, complete_send, prepare_send};
use hubsync_core::error::SendRejected;
use hubsync_core::router::{Routed, route};
use hubsync_core::state::SessionState;
use hubsync_core::tasks::TaskPatch;
use hubsync_core::types::{
    Agent, ConnectionStatus, Conversation, ConversationDetail, ConversationId, Task, TaskId,
};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{ApiError, HubApi, TaskQuery};
use crate::config::{Config, ConfigError};
use crate::dispatch::{CONVERSATION_PAGE, execute_send};
use crate::transport::{ChannelEvent, ChannelOptions, PushChannel};

/// How many recent tasks are loaded when the session starts.
pub const RECENT_TASKS: u32 = 20;

const COMMAND_CAPACITY: usize = 64;
const COMPLETION_CAPACITY: usize = 64;
const NOTIFY_CAPACITY: usize = 256;

/// Sent to subscribers after the snapshot reflecting the change is published.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotification {
    ActivityAdded(ActivityEntry),
    StreamStarted { agent: String },
    StreamDelta { agent: Option<String>, token: String },
    RosterChanged,
    TaskChanged { task_id: TaskId },
    MessagesChanged,
    ConversationsChanged,
    ConnectionChanged(ConnectionStatus),
    SendFinished { ok: bool },
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session is closed")]
    Closed,
    #[error(transparent)]
    Rejected(#[from] SendRejected),
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub channel: ChannelOptions,
    /// Connect the push channel as soon as the session starts.
    pub auto_connect: bool,
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            channel: ChannelOptions {
                url: config.channel_url()?.to_string(),
                backoff: config.backoff_schedule(),
                queue_capacity: config.channel.queue_capacity,
            },
            auto_connect: true,
        })
    }
}

#[derive(Debug)]
enum SessionCommand {
    SendMessage {
        text: String,
        ack: oneshot::Sender<Result<(), SendRejected>>,
    },
    SelectAgent(Option<String>),
    SelectConversation(Option<ConversationId>),
    NewConversation,
    RefreshTask(TaskId),
}

/// Results of background work, fed back into the actor.
#[derive(Debug)]
enum Completion {
    Send(SendOutcome),
    Roster(Result<Vec<Agent>, ApiError>),
    Conversations(Result<Vec<Conversation>, ApiError>),
    Tasks(Result<Vec<Task>, ApiError>),
    Conversation {
        id: ConversationId,
        result: Result<ConversationDetail, ApiError>,
    },
    Task(Result<Task, ApiError>),
}

/// Consumer-side handle. Cheap to clone; every clone talks to the same actor.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    channel: PushChannel,
    snapshot: watch::Receiver<SessionState>,
    notify_tx: broadcast::Sender<SessionNotification>,
    cancel: CancellationToken,
}

impl SessionHandle {
    async fn command(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Send a chat message. Returns once the session has accepted it; blank
    /// input and sends issued while another is in flight come back as
    /// `SessionError::Rejected`. The reply itself is announced by
    /// `SessionNotification::SendFinished`.
    pub async fn send_message(&self, text: impl Into<String>) -> Result<(), SessionError> {
        let (ack, answer) = oneshot::channel();
        self.command(SessionCommand::SendMessage {
            text: text.into(),
            ack,
        })
        .await?;
        answer.await.map_err(|_| SessionError::Closed)??;
        Ok(())
    }

    pub async fn select_agent(&self, agent: Option<String>) -> Result<(), SessionError> {
        self.command(SessionCommand::SelectAgent(agent)).await
    }

    /// Load and open conversation `id`, or leave the current one with `None`.
    pub async fn select_conversation(&self, id: Option<ConversationId>) -> Result<(), SessionError> {
        self.command(SessionCommand::SelectConversation(id)).await
    }

    pub async fn new_conversation(&self) -> Result<(), SessionError> {
        self.command(SessionCommand::NewConversation).await
    }

    /// Fetch the full task (delegations, subtasks) and merge it into the board.
    pub async fn refresh_task(&self, id: TaskId) -> Result<(), SessionError> {
        self.command(SessionCommand::RefreshTask(id)).await
    }

    /// Best-effort outbound frame; `false` if the channel is not open.
    pub fn wire_send(&self, kind: &str, data: &serde_json::Value) -> bool {
        self.channel.send(kind, data)
    }

    pub fn connect(&self) {
        self.channel.connect();
    }

    pub fn disconnect(&self) {
        self.channel.disconnect();
    }

    pub fn snapshot(&self) -> SessionState {
        self.snapshot.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.snapshot.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotification> {
        self.notify_tx.subscribe()
    }

    /// Stop the actor and the channel driver.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

pub struct Session;

impl Session {
    /// Wire up the channel driver and the actor, and start both. The
    /// returned join handle completes once the actor has stopped.
    pub fn spawn(options: SessionOptions, api: Arc<dyn HubApi>) -> (SessionHandle, JoinHandle<()>) {
        let cancel = CancellationToken::new();
        let (events_tx, events_rx) = mpsc::channel(options.channel.queue_capacity.max(1));
        let (channel, channel_task) = PushChannel::spawn(options.channel, events_tx, cancel.child_token());
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (completions_tx, completions_rx) = mpsc::channel(COMPLETION_CAPACITY);
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionState::new());
        let (notify_tx, _) = broadcast::channel(NOTIFY_CAPACITY);

        let actor = SessionActor {
            state: SessionState::new(),
            api,
            events_rx,
            commands_rx,
            completions_tx,
            completions_rx,
            snapshot_tx,
            notify_tx: notify_tx.clone(),
            cancel: cancel.clone(),
            pending: Vec::new(),
            dirty: false,
            awaited_conversation: None,
        };

        if options.auto_connect {
            channel.connect();
        }

        let handle = tokio::spawn(async move {
            actor.run().await;
            let _ = channel_task.await;
        });

        (
            SessionHandle {
                commands: commands_tx,
                channel,
                snapshot: snapshot_rx,
                notify_tx,
                cancel,
            },
            handle,
        )
    }
}

struct SessionActor {
    state: SessionState,
    api: Arc<dyn HubApi>,
    events_rx: mpsc::Receiver<ChannelEvent>,
    commands_rx: mpsc::Receiver<SessionCommand>,
    completions_tx: mpsc::Sender<Completion>,
    completions_rx: mpsc::Receiver<Completion>,
    snapshot_tx: watch::Sender<SessionState>,
    notify_tx: broadcast::Sender<SessionNotification>,
    cancel: CancellationToken,
    /// Notifications produced by the current input, sent after the snapshot.
    pending: Vec<SessionNotification>,
    dirty: bool,
    /// The conversation most recently asked for; older loads are discarded.
    awaited_conversation: Option<ConversationId>,
}

impl SessionActor {
    async fn run(mut self) {
        info!("session: event loop started");
        self.load_initial();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("session: cancellation requested, shutting down");
                    break;
                }
                Some(event) = self.events_rx.recv() => self.on_channel_event(event),
                command = self.commands_rx.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => {
                        info!("session: all handles dropped, shutting down");
                        self.cancel.cancel();
                        break;
                    }
                },
                Some(done) = self.completions_rx.recv() => self.on_completion(done),
            }
            self.publish();
        }
    }

    fn load_initial(&self) {
        self.spawn_call(|api| async move { Completion::Roster(api.list_agents().await) });
        self.spawn_call(|api| async move {
            Completion::Conversations(
                api.list_conversations(CONVERSATION_PAGE, 0)
                    .await
                    .map(|page| page.conversations),
            )
        });
        self.spawn_call(|api| async move {
            Completion::Tasks(
                api.list_tasks(TaskQuery::recent(RECENT_TASKS))
                    .await
                    .map(|page| page.tasks),
            )
        });
    }

    /// Run an API call on its own task and feed the result back as a
    /// completion. Results arriving after shutdown are dropped.
    fn spawn_call<F, Fut>(&self, call: F)
    where
        F: FnOnce(Arc<dyn HubApi>) -> Fut,
        Fut: std::future::Future<Output = Completion> + Send + 'static,
    {
        let fut = call(Arc::clone(&self.api));
        let tx = self.completions_tx.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                done = fut => {
                    let _ = tx.send(done).await;
                }
            }
        });
    }

    fn notify(&mut self, notification: SessionNotification) {
        self.dirty = true;
        self.pending.push(notification);
    }

    fn notify_latest_activity(&mut self) {
        if let Some(entry) = self.state.activity().latest().cloned() {
            self.notify(SessionNotification::ActivityAdded(entry));
        }
    }

    fn publish(&mut self) {
        if !self.dirty {
            return;
        }
        self.dirty = false;
        self.snapshot_tx.send_replace(self.state.clone());
        for notification in self.pending.drain(..) {
            // No subscribers is fine.
            let _ = self.notify_tx.send(notification);
        }
    }

    fn on_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Status(status) => {
                if self.state.set_connection(status) {
                    self.notify(SessionNotification::ConnectionChanged(status));
                }
            }
            ChannelEvent::Frame(event) => {
                let kind = event.kind().to_string();
                let routed = route(&mut self.state, event);
                self.on_routed(&kind, routed);
            }
        }
    }

    fn on_routed(&mut self, kind: &str, routed: Routed) {
        if routed.logs_activity() {
            debug!(kind, "session: activity logged");
            self.notify_latest_activity();
        }
        match routed {
            Routed::Roster => self.notify(SessionNotification::RosterChanged),
            Routed::StreamOpened { agent } => {
                self.notify(SessionNotification::RosterChanged);
                self.notify(SessionNotification::StreamStarted { agent });
            }
            Routed::Token { agent, token } => {
                self.notify(SessionNotification::StreamDelta { agent, token });
            }
            Routed::TokenDropped => debug!("session: token without open stream dropped"),
            Routed::AgentIdle { .. } => self.notify(SessionNotification::RosterChanged),
            Routed::Delegated { from_agent, to_agent } => {
                debug!(from = %from_agent, to = %to_agent, "session: stream handed over");
            }
            Routed::Task { task_id, upsert } => {
                debug!(task_id, ?upsert, "session: task updated");
                self.notify(SessionNotification::TaskChanged { task_id });
            }
            Routed::Error => {}
            Routed::Ignored { kind } => debug!(kind = %kind, "session: ignoring event"),
        }
    }

    fn on_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::SendMessage { text, ack } => {
                let request = match prepare_send(&mut self.state, &text) {
                    Ok(request) => request,
                    Err(reason) => {
                        debug!(%reason, "session: send refused");
                        let _ = ack.send(Err(reason));
                        return;
                    }
                };
                let _ = ack.send(Ok(()));
                info!(agent = ?request.agent, conversation_id = ?request.conversation_id, "session: sending message");
                self.notify(SessionNotification::MessagesChanged);
                self.spawn_call(|api| async move { Completion::Send(execute_send(api.as_ref(), request).await) });
            }
            SessionCommand::SelectAgent(agent) => {
                self.state.select_agent(agent);
                self.dirty = true;
            }
            SessionCommand::SelectConversation(Some(id)) => {
                self.awaited_conversation = Some(id);
                self.spawn_call(move |api| async move {
                    Completion::Conversation {
                        id,
                        result: api.get_conversation(id).await,
                    }
                });
            }
            SessionCommand::SelectConversation(None) => {
                self.awaited_conversation = None;
                self.state.close_conversation();
                self.notify(SessionNotification::MessagesChanged);
            }
            SessionCommand::NewConversation => {
                self.awaited_conversation = None;
                self.state.reset_conversation();
                self.notify(SessionNotification::MessagesChanged);
            }
            SessionCommand::RefreshTask(id) => {
                self.spawn_call(move |api| async move { Completion::Task(api.get_task(id).await) });
            }
        }
    }

    fn on_completion(&mut self, done: Completion) {
        match done {
            Completion::Send(outcome) => {
                let ok = matches!(outcome, SendOutcome::Delivered { .. });
                let reloaded = matches!(outcome, SendOutcome::Delivered { reload: Some(_), .. });
                complete_send(&mut self.state, outcome);
                self.notify(SessionNotification::MessagesChanged);
                if reloaded {
                    self.notify(SessionNotification::ConversationsChanged);
                }
                if !ok {
                    self.notify_latest_activity();
                }
                info!(ok, "session: send finished");
                self.notify(SessionNotification::SendFinished { ok });
            }
            Completion::Roster(Ok(agents)) => {
                info!(count = agents.len(), "session: roster loaded");
                self.state.replace_roster(agents);
                self.notify(SessionNotification::RosterChanged);
            }
            Completion::Conversations(Ok(conversations)) => {
                self.state.replace_conversations(conversations);
                self.notify(SessionNotification::ConversationsChanged);
            }
            Completion::Tasks(Ok(tasks)) => {
                let ids: Vec<TaskId> = tasks.iter().map(|t| t.id).collect();
                self.state.seed_tasks(tasks);
                for task_id in ids {
                    self.notify(SessionNotification::TaskChanged { task_id });
                }
            }
            Completion::Conversation { id, result } => {
                if self.awaited_conversation != Some(id) {
                    debug!(id, "session: discarding stale conversation load");
                    return;
                }
                self.awaited_conversation = None;
                match result {
                    Ok(detail) => {
                        self.state.open_conversation(detail);
                        self.notify(SessionNotification::MessagesChanged);
                    }
                    Err(e) => warn!(id, error = %e, "session: failed to load conversation"),
                }
            }
            Completion::Task(Ok(task)) => {
                let task_id = task.id;
                self.state.upsert_task(TaskPatch::from(task));
                self.notify(SessionNotification::TaskChanged { task_id });
            }
            Completion::Roster(Err(e)) => warn!(error = %e, "session: failed to load roster"),
            Completion::Conversations(Err(e)) => {
                warn!(error = %e, "session: failed to load conversations")
            }
            Completion::Tasks(Err(e)) => warn!(error = %e, "session: failed to load tasks"),
            Completion::Task(Err(e)) => warn!(error = %e, "session: failed to load task"),
        }
    }
}

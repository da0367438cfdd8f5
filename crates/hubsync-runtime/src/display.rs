//! Text rendering for the CLI. Pure functions, separated for testability.

use chrono::Local;
use hubsync_core::activity::{ActivityEntry, ActivityKind};
use hubsync_core::state::SessionState;
use hubsync_core::types::{Agent, AgentStatus, ConnectionStatus, Message, MessageRole, Task, TaskStatus};

use crate::session::SessionNotification;

/// State indicator symbols used across the feed and status output.
pub const INDICATOR_THINKING: &str = "●";
pub const INDICATOR_WORKING: &str = "◉";
pub const INDICATOR_IDLE: &str = "○";
pub const INDICATOR_PENDING: &str = "◌";
pub const INDICATOR_ERROR: &str = "✖";
pub const INDICATOR_DONE: &str = "✔";

const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[2m";
const BOLD: &str = "\x1b[1m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const BLUE: &str = "\x1b[34m";
const MAGENTA: &str = "\x1b[35m";
const CYAN: &str = "\x1b[36m";

pub fn agent_indicator(status: AgentStatus) -> &'static str {
    match status {
        AgentStatus::Thinking => INDICATOR_THINKING,
        AgentStatus::Working => INDICATOR_WORKING,
        AgentStatus::Idle => INDICATOR_IDLE,
    }
}

pub fn task_indicator(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => INDICATOR_PENDING,
        TaskStatus::InProgress => INDICATOR_THINKING,
        TaskStatus::Complete => INDICATOR_DONE,
    }
}

pub fn connection_indicator(status: ConnectionStatus) -> &'static str {
    match status {
        ConnectionStatus::Connected => INDICATOR_THINKING,
        ConnectionStatus::Connecting => INDICATOR_PENDING,
        ConnectionStatus::Disconnected => INDICATOR_IDLE,
        ConnectionStatus::Error => INDICATOR_ERROR,
    }
}

fn paint(text: &str, color: &str, use_color: bool) -> String {
    if use_color {
        format!("{color}{text}{RESET}")
    } else {
        text.to_string()
    }
}

fn kind_color(kind: ActivityKind) -> &'static str {
    match kind {
        ActivityKind::Thinking => YELLOW,
        ActivityKind::Complete => GREEN,
        ActivityKind::Delegation => MAGENTA,
        ActivityKind::Error => RED,
    }
}

/// `HH:MM:SS [kind] text`, timestamp in local time.
pub fn format_activity(entry: &ActivityEntry, use_color: bool) -> String {
    let time = entry.timestamp.with_timezone(&Local).format("%H:%M:%S").to_string();
    let tag = format!("[{}]", entry.kind.as_str());
    format!(
        "{} {} {}",
        paint(&time, DIM, use_color),
        paint(&tag, kind_color(entry.kind), use_color),
        entry.text
    )
}

/// One line per agent: indicator, name, role, current task.
pub fn format_roster(agents: &[Agent], use_color: bool) -> String {
    let width = agents.iter().map(|a| a.name.len()).max().unwrap_or(0);
    agents
        .iter()
        .map(|agent| {
            let indicator = agent_indicator(agent.status);
            let indicator = match agent.status {
                AgentStatus::Idle => paint(indicator, DIM, use_color),
                _ => paint(indicator, YELLOW, use_color),
            };
            let mut line = format!("{indicator} {:<width$}", agent.name);
            if !agent.role.is_empty() {
                line.push_str(&format!("  {}", paint(&agent.role, DIM, use_color)));
            }
            if let Some(task) = &agent.current_task {
                line.push_str(&format!("  (task {task})"));
            }
            line.trim_end().to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `you: text` for the user, `<agent>: text` for assistants.
pub fn format_message(message: &Message, use_color: bool) -> String {
    match message.role {
        MessageRole::User => format!("{} {}", paint("you:", BOLD, use_color), message.content),
        MessageRole::Assistant => {
            let name = message.agent_name.as_deref().unwrap_or("assistant");
            let color = if name == hubsync_core::types::SYSTEM_AGENT {
                RED
            } else {
                CYAN
            };
            format!("{} {}", paint(&format!("{name}:"), color, use_color), message.content)
        }
    }
}

pub fn format_task(task: &Task, use_color: bool) -> String {
    let indicator = task_indicator(task.status);
    let indicator = match task.status {
        TaskStatus::Complete => paint(indicator, GREEN, use_color),
        TaskStatus::InProgress => paint(indicator, YELLOW, use_color),
        TaskStatus::Pending => paint(indicator, DIM, use_color),
    };
    let agent = task.assigned_agent.as_deref().unwrap_or("-");
    let mut line = format!("{indicator} #{} {} [{}]", task.id, agent, task.status);
    if !task.description.is_empty() {
        line.push(' ');
        line.push_str(&task.description);
    }
    line
}

pub fn format_connection(status: ConnectionStatus, use_color: bool) -> String {
    let color = match status {
        ConnectionStatus::Connected => GREEN,
        ConnectionStatus::Connecting => YELLOW,
        ConnectionStatus::Disconnected => DIM,
        ConnectionStatus::Error => RED,
    };
    paint(
        &format!("{} {}", connection_indicator(status), status),
        color,
        use_color,
    )
}

/// Header printed when a stream opens: `<agent> ▸ `.
pub fn format_stream_header(agent: &str, use_color: bool) -> String {
    format!("{} ", paint(&format!("{agent} ▸"), BLUE, use_color))
}

/// Messages after the last user message: the reply to the latest send.
pub fn reply_tail(messages: &[Message]) -> &[Message] {
    match messages.iter().rposition(|m| m.role == MessageRole::User) {
        Some(idx) => &messages[idx + 1..],
        None => messages,
    }
}

/// Turns session notifications into terminal output. Streamed tokens are
/// written inline after a `<agent> ▸` header; any other line first ends the
/// stream line.
#[derive(Debug, Clone)]
pub struct FeedRenderer {
    use_color: bool,
    show_tokens: bool,
    show_tasks: bool,
    mid_stream: bool,
}

impl FeedRenderer {
    pub fn new(use_color: bool) -> Self {
        Self {
            use_color,
            show_tokens: true,
            show_tasks: false,
            mid_stream: false,
        }
    }

    pub fn with_tokens(mut self, show: bool) -> Self {
        self.show_tokens = show;
        self
    }

    pub fn with_tasks(mut self, show: bool) -> Self {
        self.show_tasks = show;
        self
    }

    /// Terminate an open stream line. Empty if none is open.
    pub fn finish_stream(&mut self) -> &'static str {
        if std::mem::take(&mut self.mid_stream) {
            "\n"
        } else {
            ""
        }
    }

    /// Output for `note`, if it has any. `state` is the snapshot published
    /// with it.
    pub fn render(&mut self, note: &SessionNotification, state: &SessionState) -> Option<String> {
        match note {
            SessionNotification::ActivityAdded(entry) => Some(format!(
                "{}{}\n",
                self.finish_stream(),
                format_activity(entry, self.use_color)
            )),
            SessionNotification::StreamStarted { agent } if self.show_tokens => {
                let prefix = self.finish_stream();
                self.mid_stream = true;
                Some(format!("{prefix}{}", format_stream_header(agent, self.use_color)))
            }
            SessionNotification::StreamDelta { agent, token } if self.show_tokens => {
                if self.mid_stream {
                    return Some(token.clone());
                }
                self.mid_stream = true;
                let agent = agent.as_deref().unwrap_or("assistant");
                Some(format!("{}{token}", format_stream_header(agent, self.use_color)))
            }
            SessionNotification::ConnectionChanged(status) => Some(format!(
                "{}connection: {}\n",
                self.finish_stream(),
                format_connection(*status, self.use_color)
            )),
            SessionNotification::TaskChanged { task_id } if self.show_tasks => {
                let task = state.tasks().get(*task_id)?;
                Some(format!(
                    "{}{}\n",
                    self.finish_stream(),
                    format_task(task, self.use_color)
                ))
            }
            _ => None,
        }
    }
}

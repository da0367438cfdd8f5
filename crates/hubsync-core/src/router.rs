//! Event router: applies one push event to the session state.
//!
//! The router assumes nothing about interleaving beyond what the server
//! promises (a thinking event precedes that agent's tokens, and a complete
//! event ends them). Neither promise is checked here.

use crate::event::PushEvent;
use crate::state::SessionState;
use crate::tasks::Upsert;
use crate::types::TaskId;

/// What a routed event changed, so the owner of the state can notify
/// observers without diffing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    Roster,
    StreamOpened { agent: String },
    Token { agent: Option<String>, token: String },
    /// A token arrived with no open stream and was dropped.
    TokenDropped,
    AgentIdle { agent: String },
    Delegated { from_agent: String, to_agent: String },
    Task { task_id: TaskId, upsert: Upsert },
    Error,
    Ignored { kind: String },
}

impl Routed {
    /// Whether routing appended an activity entry.
    pub fn logs_activity(&self) -> bool {
        matches!(
            self,
            Self::StreamOpened { .. } | Self::AgentIdle { .. } | Self::Delegated { .. } | Self::Error
        )
    }
}

pub fn route(state: &mut SessionState, event: PushEvent) -> Routed {
    match event {
        PushEvent::StatusUpdate(update) => {
            state.replace_roster(update.agents);
            Routed::Roster
        }
        PushEvent::AgentThinking(ev) => {
            state.mark_thinking(&ev.agent, ev.task_id);
            Routed::StreamOpened { agent: ev.agent }
        }
        PushEvent::AgentResponse(ev) => {
            if state.append_token(&ev.token) {
                Routed::Token {
                    agent: state.stream().agent.clone(),
                    token: ev.token,
                }
            } else {
                Routed::TokenDropped
            }
        }
        PushEvent::AgentComplete(ev) => {
            state.mark_complete(&ev.agent);
            Routed::AgentIdle { agent: ev.agent }
        }
        PushEvent::Delegation(ev) => {
            state.record_delegation(&ev.from_agent, &ev.to_agent, &ev.task);
            Routed::Delegated {
                from_agent: ev.from_agent,
                to_agent: ev.to_agent,
            }
        }
        PushEvent::TaskUpdate(patch) => {
            let task_id = patch.id;
            let upsert = state.upsert_task(patch);
            Routed::Task { task_id, upsert }
        }
        PushEvent::Error(ev) => {
            state.record_error(&ev.message);
            Routed::Error
        }
        PushEvent::Unknown { kind } => Routed::Ignored { kind },
    }
}

//! Command dispatcher, synchronous halves.
//!
//! A send is split around its network call: [`prepare_send`] validates the
//! input and applies the optimistic update, the caller performs the request,
//! and [`complete_send`] applies the authoritative outcome. State between
//! the two is `sending`; a second prepare is refused until completion.

use serde::{Deserialize, Serialize};

use crate::error::SendRejected;
use crate::state::SessionState;
use crate::types::{Conversation, ConversationId, Message};

/// Titles derived from the first message are cut to this many characters.
pub const TITLE_MAX_CHARS: usize = 80;

/// Body of the authoritative send operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    pub message: String,
    pub agent: Option<String>,
    pub conversation_id: Option<ConversationId>,
}

/// Reply of the authoritative send operation. The server also reports a
/// task id and status, which the client does not need.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatReply {
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub agent: Option<String>,
}

impl ChatReply {
    /// The conversation the reply belongs to. The server reports `0` when
    /// it failed before a conversation existed.
    pub fn conversation(&self) -> Option<ConversationId> {
        self.conversation_id.filter(|id| *id > 0)
    }
}

/// Authoritative state fetched after a successful send.
#[derive(Debug, Clone, PartialEq)]
pub struct Reload {
    pub conversation_id: ConversationId,
    pub messages: Vec<Message>,
    pub conversations: Vec<Conversation>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// The send (and the reload, if the reply named a conversation) worked.
    Delivered {
        request: ChatRequest,
        reload: Option<Reload>,
    },
    /// The send or the reload failed; `description` is user-facing.
    Failed { description: String },
}

/// Split a leading `@name ` mention off `text`.
///
/// The name is one or more ASCII word characters and must be followed by
/// whitespace; exactly that one whitespace character is stripped with it.
pub fn parse_mention(text: &str) -> Option<(&str, &str)> {
    let rest = text.strip_prefix('@')?;
    let name_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    if name_len == 0 {
        return None;
    }
    let (name, after) = rest.split_at(name_len);
    let sep = after.chars().next().filter(|c| c.is_whitespace())?;
    Some((name, &after[sep.len_utf8()..]))
}

/// First [`TITLE_MAX_CHARS`] characters of `text`.
pub fn derive_title(text: &str) -> String {
    text.chars().take(TITLE_MAX_CHARS).collect()
}

/// Start a send. Refuses (changing nothing) if `raw` is blank or another
/// send is still in flight; otherwise marks the session as sending, appends
/// the user's message and returns the request to perform.
pub fn prepare_send(state: &mut SessionState, raw: &str) -> Result<ChatRequest, SendRejected> {
    if raw.trim().is_empty() {
        return Err(SendRejected::Blank);
    }
    if state.is_sending() {
        return Err(SendRejected::Busy);
    }

    let (agent, text) = match parse_mention(raw) {
        Some((name, body)) => (Some(name.to_string()), body),
        None => (state.selected_agent().map(str::to_string), raw),
    };

    state.set_sending(true);
    state.push_user_message(text);

    Ok(ChatRequest {
        message: text.to_string(),
        agent,
        conversation_id: state.current_conversation().map(|c| c.id),
    })
}

/// Finish a send with its authoritative outcome and return to idle.
pub fn complete_send(state: &mut SessionState, outcome: SendOutcome) {
    match outcome {
        SendOutcome::Delivered { request, reload } => {
            if let Some(reload) = reload {
                state.adopt_conversation(reload.conversation_id, &derive_title(&request.message));
                state.replace_messages(reload.messages);
                state.replace_conversations(reload.conversations);
            }
            state.clear_stream();
        }
        SendOutcome::Failed { description } => {
            state.record_error(&description);
            state.push_system_error(&description);
        }
    }
    state.set_sending(false);
}

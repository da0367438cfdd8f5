//! Network half of a send: the authoritative call and the reload after it.

use hubsync_core::dispatch::{ChatRequest, Reload, SendOutcome};

use crate::api::HubApi;

/// Page size used when refreshing the conversation index.
pub const CONVERSATION_PAGE: u32 = 50;

/// Perform `request` and, if the reply names a conversation, fetch that
/// conversation's messages and the conversation index. Any failure along
/// the way becomes `SendOutcome::Failed` with the error's description.
pub async fn execute_send(api: &dyn HubApi, request: ChatRequest) -> SendOutcome {
    let reply = match api.send_chat(&request).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(error = %e, "send: chat request failed");
            return SendOutcome::Failed {
                description: e.to_string(),
            };
        }
    };

    let Some(conversation_id) = reply.conversation() else {
        tracing::debug!(agent = ?reply.agent, "send: reply names no conversation, skipping reload");
        return SendOutcome::Delivered {
            request,
            reload: None,
        };
    };

    let reload = async {
        let detail = api.get_conversation(conversation_id).await?;
        let page = api.list_conversations(CONVERSATION_PAGE, 0).await?;
        Ok::<_, crate::api::ApiError>(Reload {
            conversation_id,
            messages: detail.messages,
            conversations: page.conversations,
        })
    };

    match reload.await {
        Ok(reload) => SendOutcome::Delivered {
            request,
            reload: Some(reload),
        },
        Err(e) => {
            tracing::warn!(conversation_id, error = %e, "send: reload failed");
            SendOutcome::Failed {
                description: e.to_string(),
            }
        }
    }
}

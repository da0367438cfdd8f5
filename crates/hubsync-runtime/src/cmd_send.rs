//! `hubsync send`: one message, one reply.

use std::io::Write;
use std::time::Duration;

use anyhow::{Context as _, bail};
use hubsync_core::types::ConversationId;
use hubsync_runtime::config::Config;
use hubsync_runtime::display::{FeedRenderer, format_message, reply_tail};
use hubsync_runtime::session::{SessionHandle, SessionNotification};
use tokio::sync::broadcast::error::RecvError;

use crate::cli::SendOpts;
use crate::context::{start_session, stop_session};

pub async fn cmd_send(config: &Config, opts: &SendOpts, use_color: bool) -> anyhow::Result<()> {
    let text = opts.text.join(" ");
    if text.trim().is_empty() {
        bail!("message is empty");
    }

    let (handle, task) = start_session(config)?;
    let result = send_and_print(&handle, opts, &text, config.api_timeout(), use_color).await;
    stop_session(handle, task).await;
    result
}

async fn send_and_print(
    handle: &SessionHandle,
    opts: &SendOpts,
    text: &str,
    timeout: Duration,
    use_color: bool,
) -> anyhow::Result<()> {
    if let Some(agent) = &opts.agent {
        handle.select_agent(Some(agent.clone())).await?;
    }
    if let Some(id) = opts.conversation {
        open_conversation(handle, id, timeout).await?;
    }

    let mut notes = handle.subscribe();
    let mut feed = FeedRenderer::new(use_color);
    let mut stdout = std::io::stdout();
    handle.send_message(text).await?;

    let ok = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => bail!("interrupted"),
            note = notes.recv() => match note {
                Ok(SessionNotification::SendFinished { ok }) => break ok,
                Ok(note) => {
                    if let Some(out) = feed.render(&note, &handle.snapshot()) {
                        write!(stdout, "{out}")?;
                        stdout.flush()?;
                    }
                }
                Err(RecvError::Lagged(skipped)) => tracing::debug!(skipped, "send: notifications skipped"),
                Err(RecvError::Closed) => bail!("session closed before the reply arrived"),
            },
        }
    };

    write!(stdout, "{}", feed.finish_stream())?;
    let state = handle.snapshot();
    let tail = reply_tail(state.messages());
    if tail.is_empty() {
        println!("(no reply recorded)");
    }
    for message in tail {
        println!("{}", format_message(message, use_color));
    }
    if !ok {
        bail!("send failed");
    }
    Ok(())
}

async fn open_conversation(handle: &SessionHandle, id: ConversationId, timeout: Duration) -> anyhow::Result<()> {
    handle.select_conversation(Some(id)).await?;
    let mut rx = handle.watch();
    tokio::time::timeout(
        timeout,
        rx.wait_for(|s| s.current_conversation().is_some_and(|c| c.id == id)),
    )
    .await
    .with_context(|| format!("conversation {id} could not be loaded"))?
    .context("session closed while loading conversation")?;
    Ok(())
}

//! `hubsync watch`: follow the live feed until Ctrl-C.

use std::io::Write;

use hubsync_runtime::config::Config;
use hubsync_runtime::display::{FeedRenderer, format_roster};
use hubsync_runtime::session::SessionNotification;
use tokio::sync::broadcast::error::RecvError;

use crate::cli::WatchOpts;
use crate::context::{start_session, stop_session};

pub async fn cmd_watch(config: &Config, opts: &WatchOpts, use_color: bool) -> anyhow::Result<()> {
    let (handle, task) = start_session(config)?;
    let mut notes = handle.subscribe();
    let mut feed = FeedRenderer::new(use_color)
        .with_tokens(!opts.no_stream)
        .with_tasks(opts.tasks);
    let mut roster_shown = false;
    let mut stdout = std::io::stdout();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            note = notes.recv() => match note {
                Ok(note) => {
                    let state = handle.snapshot();
                    if note == SessionNotification::RosterChanged && !roster_shown && !state.agents().is_empty() {
                        roster_shown = true;
                        write!(stdout, "{}{}\n\n", feed.finish_stream(), format_roster(state.agents(), use_color))?;
                    }
                    if let Some(out) = feed.render(&note, &state) {
                        write!(stdout, "{out}")?;
                    }
                    stdout.flush()?;
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "watch: feed fell behind");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    write!(stdout, "{}", feed.finish_stream())?;
    stdout.flush()?;
    stop_session(handle, task).await;
    Ok(())
}

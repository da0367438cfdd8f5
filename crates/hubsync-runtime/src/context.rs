//! Shared setup for the subcommands.

use std::sync::Arc;

use anyhow::Context as _;
use hubsync_runtime::api::HttpHubApi;
use hubsync_runtime::config::Config;
use hubsync_runtime::session::{Session, SessionHandle, SessionOptions};
use tokio::task::JoinHandle;

pub fn resolve_color(color: &str) -> bool {
    use std::io::IsTerminal;
    match color {
        "always" => true,
        "never" => false,
        _ => std::io::stdout().is_terminal(),
    }
}

/// Build the HTTP client and start a session against the configured server.
pub fn start_session(config: &Config) -> anyhow::Result<(SessionHandle, JoinHandle<()>)> {
    let base_url = config.base_url()?;
    let api = HttpHubApi::new(&base_url, config.api_timeout())
        .with_context(|| format!("building API client for {base_url}"))?;
    let options = SessionOptions::from_config(config)?;
    tracing::info!(server = %base_url, channel = %options.channel.url, "starting session");
    Ok(Session::spawn(options, Arc::new(api)))
}

/// Stop the session and wait for its tasks to finish.
pub async fn stop_session(handle: SessionHandle, task: JoinHandle<()>) {
    handle.shutdown();
    if let Err(e) = task.await {
        tracing::warn!(error = %e, "session task ended abnormally");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_color_choices() {
        assert!(resolve_color("always"));
        assert!(!resolve_color("never"));
    }
}

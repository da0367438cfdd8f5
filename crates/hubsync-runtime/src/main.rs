//! hubsync: live session client for an AgentHub server.

use clap::Parser;
use hubsync_runtime::config::{Config, default_config_path};

mod cli;
mod cmd_chat;
mod cmd_send;
mod cmd_watch;
mod context;

fn init_tracing(config: &Config) {
    let filter = std::env::var("HUBSYNC_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .ok()
        .or_else(|| config.log.clone())
        .unwrap_or_else(|| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let path = args.config.clone().unwrap_or_else(default_config_path);
    let mut config = Config::load(&path)?;
    if let Some(server) = &args.server {
        config = config.with_server(server.clone())?;
    }
    init_tracing(&config);
    tracing::debug!(path = %path.display(), server = %config.server.base_url, "config loaded");

    let use_color = context::resolve_color(&args.color);
    match &args.command {
        cli::Command::Watch(opts) => cmd_watch::cmd_watch(&config, opts, use_color).await?,
        cli::Command::Send(opts) => cmd_send::cmd_send(&config, opts, use_color).await?,
        cli::Command::Chat(opts) => cmd_chat::cmd_chat(&config, opts, use_color).await?,
    }

    Ok(())
}

//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "hubsync", about = "Live session client for an AgentHub server")]
pub struct Cli {
    /// Config file (default: ~/.config/hubsync/config.toml)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Server base URL, overrides the config file
    #[arg(long, short = 's', global = true, env = hubsync_runtime::config::SERVER_ENV)]
    pub server: Option<String>,

    /// Color output: auto, always, never
    #[arg(long, global = true, default_value = "auto")]
    pub color: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Follow the live activity feed and agent output
    Watch(WatchOpts),
    /// Send one message and print the reply
    Send(SendOpts),
    /// Interactive chat on stdin
    Chat(ChatOpts),
}

#[derive(clap::Args, Default)]
pub struct WatchOpts {
    /// Do not print streamed tokens
    #[arg(long)]
    pub no_stream: bool,

    /// Print task board changes
    #[arg(long)]
    pub tasks: bool,
}

#[derive(clap::Args)]
pub struct SendOpts {
    /// Target agent (an @mention in the text takes precedence)
    #[arg(long, short = 'a')]
    pub agent: Option<String>,

    /// Continue an existing conversation
    #[arg(long)]
    pub conversation: Option<i64>,

    /// Message text
    #[arg(required = true, trailing_var_arg = true)]
    pub text: Vec<String>,
}

#[derive(clap::Args, Default)]
pub struct ChatOpts {
    /// Agent to address by default
    #[arg(long, short = 'a')]
    pub agent: Option<String>,

    /// Continue an existing conversation
    #[arg(long)]
    pub conversation: Option<i64>,
}

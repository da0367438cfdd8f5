//! `hubsync chat`: interactive session on stdin.
//!
//! Lines are sent as chat messages; lines starting with `/` are commands.
//! The live feed (activity, streamed tokens) is printed as it arrives.

use std::io::Write;

use hubsync_runtime::config::Config;
use hubsync_runtime::display::{FeedRenderer, format_message, format_roster, format_task, reply_tail};
use hubsync_runtime::session::{SessionError, SessionHandle, SessionNotification};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use crate::cli::ChatOpts;
use crate::context::{start_session, stop_session};

const HELP: &str = "\
/agent NAME  address NAME by default (@NAME in a message overrides it)
/agent       clear the default agent
/new         start a new conversation
/agents      show the roster
/tasks       show the task board
/quit        leave";

#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Message(String),
    Agent(Option<String>),
    New,
    Agents,
    Tasks,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

pub fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Message(line.to_string());
    };
    let mut parts = command.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default();
    let arg = parts.next().map(str::trim).filter(|a| !a.is_empty());
    match name {
        "agent" => Input::Agent(arg.map(str::to_string)),
        "new" => Input::New,
        "agents" => Input::Agents,
        "tasks" => Input::Tasks,
        "help" => Input::Help,
        "quit" | "exit" => Input::Quit,
        other => Input::Unknown(other.to_string()),
    }
}

pub async fn cmd_chat(config: &Config, opts: &ChatOpts, use_color: bool) -> anyhow::Result<()> {
    let (handle, task) = start_session(config)?;
    if let Some(agent) = &opts.agent {
        handle.select_agent(Some(agent.clone())).await?;
    }
    if let Some(id) = opts.conversation {
        handle.select_conversation(Some(id)).await?;
    }
    println!("connected to {} (/help for commands)", config.server.base_url);

    let result = chat_loop(&handle, use_color).await;
    stop_session(handle, task).await;
    result
}

async fn chat_loop(handle: &SessionHandle, use_color: bool) -> anyhow::Result<()> {
    let mut notes = handle.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut feed = FeedRenderer::new(use_color);
    let mut stdout = std::io::stdout();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                write!(stdout, "{}", feed.finish_stream())?;
                match parse_input(&line) {
                    Input::Message(text) => match handle.send_message(text).await {
                        Ok(()) => {}
                        Err(SessionError::Rejected(reason)) => writeln!(stdout, "({reason})")?,
                        Err(e) => return Err(e.into()),
                    },
                    Input::Agent(agent) => {
                        match &agent {
                            Some(name) => writeln!(stdout, "addressing {name}")?,
                            None => writeln!(stdout, "addressing the coordinator")?,
                        }
                        handle.select_agent(agent).await?;
                    }
                    Input::New => {
                        handle.new_conversation().await?;
                        writeln!(stdout, "new conversation")?;
                    }
                    Input::Agents => {
                        writeln!(stdout, "{}", format_roster(handle.snapshot().agents(), use_color))?;
                    }
                    Input::Tasks => {
                        let state = handle.snapshot();
                        if state.tasks().is_empty() {
                            writeln!(stdout, "(no tasks)")?;
                        }
                        for task in state.tasks().iter() {
                            writeln!(stdout, "{}", format_task(task, use_color))?;
                        }
                    }
                    Input::Help => writeln!(stdout, "{HELP}")?,
                    Input::Quit => break,
                    Input::Empty => {}
                    Input::Unknown(name) => writeln!(stdout, "unknown command /{name} (try /help)")?,
                }
                stdout.flush()?;
            }
            note = notes.recv() => match note {
                Ok(SessionNotification::SendFinished { .. }) => {
                    write!(stdout, "{}", feed.finish_stream())?;
                    let state = handle.snapshot();
                    for message in reply_tail(state.messages()) {
                        writeln!(stdout, "{}", format_message(message, use_color))?;
                    }
                    stdout.flush()?;
                }
                Ok(note) => {
                    if let Some(out) = feed.render(&note, &handle.snapshot()) {
                        write!(stdout, "{out}")?;
                        stdout.flush()?;
                    }
                }
                Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "chat: feed fell behind"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    write!(stdout, "{}", feed.finish_stream())?;
    stdout.flush()?;
    Ok(())
}

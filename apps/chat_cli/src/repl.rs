//! Line-oriented chat screen: commands, streamed rendering, and the input loop.

use std::{
    io::{self, Write},
    path::PathBuf,
    sync::Arc,
};

use anyhow::Result;
use client_core::{load_images, ChatSession, SessionEvent, SessionState, TurnOutcome};
use shared::domain::{ImageAttachment, Role};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::{self, error::TryRecvError},
};
use tracing::{debug, info};

pub const HELP: &str = "\
Type a prompt and press enter to send it with the staged images.
  /attach <path>...  replace the staged images with these
  /add <path>...     stage more images next to the current ones
  /detach <n>        unstage image number n
  /images            list staged images
  /reset             clear staged images
  /history           print the conversation so far
  /help              show this message
  /quit              leave";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Prompt(String),
    Attach(Vec<PathBuf>),
    Add(Vec<PathBuf>),
    Detach(usize),
    Images,
    Reset,
    History,
    Help,
    Quit,
    Empty,
    Invalid(String),
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Prompt(line.to_string());
    };

    let mut words = rest.split_whitespace();
    let name = words.next().unwrap_or_default();
    let args: Vec<&str> = words.collect();
    match name {
        "attach" | "a" if !args.is_empty() => {
            Command::Attach(args.into_iter().map(PathBuf::from).collect())
        }
        "attach" | "a" => Command::Invalid("usage: /attach <path>...".into()),
        "add" if !args.is_empty() => {
            Command::Add(args.into_iter().map(PathBuf::from).collect())
        }
        "add" => Command::Invalid("usage: /add <path>...".into()),
        "detach" | "d" => match args.as_slice() {
            [index] => match index.parse::<usize>() {
                Ok(index) if index > 0 => Command::Detach(index),
                _ => Command::Invalid(format!("not an image number: {index}")),
            },
            _ => Command::Invalid("usage: /detach <n>".into()),
        },
        "images" | "i" => Command::Images,
        "reset" | "r" => Command::Reset,
        "history" | "h" => Command::History,
        "help" | "?" => Command::Help,
        "quit" | "q" | "exit" => Command::Quit,
        other => Command::Invalid(format!("unknown command: /{other}")),
    }
}

/// Shown while a turn is in flight and nothing has streamed back yet.
pub const WAITING_MARKER: &str = "...";

/// Writes session events as they arrive: fragments inline, failures on their
/// own line.
pub struct Renderer<W: Write> {
    out: W,
    mid_line: bool,
    waiting: bool,
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            mid_line: false,
            waiting: false,
        }
    }

    pub fn handle(&mut self, event: &SessionEvent) -> io::Result<()> {
        match event {
            SessionEvent::TurnStarted { image_count, .. } => {
                if *image_count > 0 {
                    writeln!(self.out, "(sending {image_count} image(s))")?;
                }
                write!(self.out, "{WAITING_MARKER}")?;
                self.waiting = true;
            }
            SessionEvent::Delta { fragment, .. } => {
                self.clear_waiting()?;
                write!(self.out, "{fragment}")?;
                self.mid_line = !fragment.ends_with('\n');
            }
            SessionEvent::TurnCompleted { .. } => {
                self.clear_waiting()?;
                self.end_line()?;
            }
            SessionEvent::TurnFailed { message } => {
                self.clear_waiting()?;
                self.end_line()?;
                writeln!(self.out, "error: {message}")?;
            }
            SessionEvent::AttachmentsChanged { .. } => {}
        }
        self.out.flush()
    }

    /// Overwrites the marker in place so the answer starts at column zero.
    fn clear_waiting(&mut self) -> io::Result<()> {
        if self.waiting {
            write!(self.out, "\r{}\r", " ".repeat(WAITING_MARKER.len()))?;
            self.waiting = false;
        }
        Ok(())
    }

    fn end_line(&mut self) -> io::Result<()> {
        if self.mid_line {
            writeln!(self.out)?;
            self.mid_line = false;
        }
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

pub fn format_history(state: &SessionState) -> String {
    let mut text = String::new();
    for turn in state.transcript.turns() {
        let who = match turn.role() {
            Role::User => "you",
            Role::Assistant => "model",
            Role::Error => "error",
        };
        text.push_str(&format!("[{}] {who}: {}", turn.created_at().format("%H:%M:%S"), turn.text()));
        if !turn.images().is_empty() {
            text.push_str(&format!(" ({} image(s))", turn.images().len()));
        }
        text.push('\n');
    }
    text
}

pub fn format_pending(state: &SessionState) -> String {
    if state.pending.is_empty() {
        return "no images staged\n".to_string();
    }
    state
        .pending
        .iter()
        .enumerate()
        .map(|(i, image)| {
            format!(
                "{}. {} ({}, {} bytes)\n",
                i + 1,
                image.label,
                image.mime_type,
                image.size_bytes()
            )
        })
        .collect()
}

pub struct Repl {
    session: Arc<ChatSession>,
}

impl Repl {
    pub fn new(session: Arc<ChatSession>) -> Self {
        Self { session }
    }

    /// Adds the readable images among `paths` to the staged set.
    pub async fn stage(&self, paths: &[PathBuf]) -> usize {
        let images = load_images(paths).await;
        self.add_loaded(paths.len(), images)
    }

    /// A new pick replaces whatever was staged, even if none of it loads.
    pub async fn replace_staged(&self, paths: &[PathBuf]) -> usize {
        let images = load_images(paths).await;
        self.session.reset();
        self.add_loaded(paths.len(), images)
    }

    fn add_loaded(&self, requested: usize, images: Vec<ImageAttachment>) -> usize {
        let loaded = images.len();
        for image in images {
            self.session.add_image(image);
        }
        if loaded < requested {
            eprintln!("skipped {} file(s) that are not readable images", requested - loaded);
        }
        loaded
    }

    /// Sends the prompt with the staged images and renders every event of
    /// the turn, in order, while the stream is still running.
    pub async fn send_and_render(&self, prompt: &str) -> Result<Option<TurnOutcome>> {
        let mut events = self.session.subscribe_events();
        let mut renderer = Renderer::new(io::stdout());

        let send = self.session.send_pending(prompt);
        tokio::pin!(send);
        let result = loop {
            tokio::select! {
                biased;
                event = events.recv() => match event {
                    Ok(event) => renderer.handle(&event)?,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "renderer lagged behind session events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {}
                },
                result = &mut send => break result,
            }
        };
        loop {
            match events.try_recv() {
                Ok(event) => renderer.handle(&event)?,
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }

        match result {
            Ok(outcome) => Ok(Some(outcome)),
            Err(err) => {
                eprintln!("{err}");
                Ok(None)
            }
        }
    }

    pub async fn run(&self) -> Result<()> {
        println!("vision-chat using {} (/help for commands)", self.session.model_name());
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("> ");
            io::stdout().flush()?;
            let Some(line) = lines.next_line().await? else {
                break;
            };
            match parse_command(&line) {
                Command::Prompt(prompt) => {
                    self.send_and_render(&prompt).await?;
                }
                Command::Attach(paths) => {
                    let loaded = self.replace_staged(&paths).await;
                    println!("staged {loaded} image(s)");
                }
                Command::Add(paths) => {
                    let loaded = self.stage(&paths).await;
                    println!("staged {loaded} more image(s)");
                }
                Command::Detach(index) => {
                    let target = self.session.snapshot().pending.get(index - 1).map(|image| image.id);
                    match target {
                        Some(id) => {
                            self.session.remove_image(id);
                        }
                        None => println!("no staged image number {index}"),
                    }
                }
                Command::Images => print!("{}", format_pending(&self.session.snapshot())),
                Command::Reset => {
                    self.session.reset();
                    println!("staged images cleared");
                }
                Command::History => print!("{}", format_history(&self.session.snapshot())),
                Command::Help => println!("{HELP}"),
                Command::Quit => break,
                Command::Empty => {}
                Command::Invalid(message) => println!("{message}"),
            }
        }
        info!(
            turns = self.session.snapshot().transcript.len(),
            "chat session ended"
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/repl_tests.rs"]
mod tests;

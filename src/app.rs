//! Interactive interview session in the terminal.
//!
//! Wires the real backends together: a WebSocket connector, typed lines as
//! the capture source, and a text-to-speech program for replies.

use crate::config::Config;
use crate::connection::WsConnector;
use crate::error::ParleyError;
use crate::event::{self, SessionCommand};
use crate::output::Renderer;
use crate::session::{SessionHandle, SessionStateMachine, format_elapsed, spawn_session};
use crate::speech::{
    CaptureSettings, CommandSpeaker, LineCapture, LineFeed, PlaybackBackend, SilentSpeaker,
};
use crate::transcript::{TranscriptEntry, render_entries};
use anyhow::Result;
use owo_colors::OwoColorize;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
Type your answer and press Enter while listening.
Commands:
  /mute      stop listening
  /unmute    resume listening
  /clear     clear the transcript
  /dismiss   dismiss the status message and retry a failed microphone
  /end       end the call
  /start     start a new call
  /quit      leave parley
  /help      show this help";

/// One line typed at the prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum PromptInput {
    Utterance(String),
    Command(SessionCommand),
    Help,
    Quit,
    Unknown(String),
    Empty,
}

/// Classify a typed line.
pub fn parse_prompt(line: &str) -> PromptInput {
    let line = line.trim();
    if line.is_empty() {
        return PromptInput::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return PromptInput::Utterance(line.to_string());
    };
    match command.trim().to_ascii_lowercase().as_str() {
        "mute" => PromptInput::Command(SessionCommand::SetMuted(true)),
        "unmute" => PromptInput::Command(SessionCommand::SetMuted(false)),
        "clear" => PromptInput::Command(SessionCommand::ClearTranscript),
        "dismiss" => PromptInput::Command(SessionCommand::ClearError),
        "end" => PromptInput::Command(SessionCommand::End),
        "start" => PromptInput::Command(SessionCommand::Start),
        "help" | "?" => PromptInput::Help,
        "quit" | "exit" => PromptInput::Quit,
        other => PromptInput::Unknown(other.to_string()),
    }
}

/// Choose the playback backend, falling back to text-only when the
/// synthesizer cannot run.
async fn playback_backend(config: &Config, silent: bool) -> Box<dyn PlaybackBackend> {
    if silent {
        return Box::new(SilentSpeaker);
    }
    let speaker = CommandSpeaker::new(config.playback.command.clone());
    match speaker.probe().await {
        Ok(_) => Box::new(speaker),
        Err(ParleyError::PlaybackUnavailable { message }) => {
            eprintln!(
                "{}",
                format!("{}; replies will be shown but not spoken", message).yellow()
            );
            Box::new(SilentSpeaker)
        }
        Err(e) => {
            tracing::warn!(error = %e, "synthesizer probe failed, trying it anyway");
            Box::new(speaker)
        }
    }
}

/// Run an interview until the user quits.
pub async fn run_interview(config: Config, silent: bool) -> Result<()> {
    let capture = LineCapture::new(CaptureSettings::from(&config.capture));
    let feed = capture.feed();
    let playback = playback_backend(&config, silent).await;

    let (tx, rx) = event::channel();
    let machine = SessionStateMachine::new(
        &config,
        Arc::new(WsConnector),
        Box::new(capture),
        playback,
        tx.clone(),
    );
    let handle = spawn_session(machine, tx, rx);

    println!("{} {}", "Interview server:".dimmed(), config.server.url);
    println!("{}", HELP.dimmed());
    handle.start()?;

    let mut renderer = Renderer::new();
    prompt_loop(&handle, &feed, &mut renderer).await?;

    let last = handle.snapshot();
    handle.shutdown().await?;
    renderer.render(&last);
    print_summary(&last.transcript, renderer.call_duration());
    Ok(())
}

async fn prompt_loop(handle: &SessionHandle, feed: &LineFeed, renderer: &mut Renderer) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut updates = handle.subscribe();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    tracing::debug!("stdin closed");
                    return Ok(());
                };
                match parse_prompt(&line) {
                    PromptInput::Utterance(text) => {
                        if !feed.submit(&text) {
                            println!(
                                "{}",
                                "Not listening right now (muted, offline or the interviewer is speaking)"
                                    .dimmed()
                            );
                        }
                    }
                    PromptInput::Command(command) => handle.send(command)?,
                    PromptInput::Help => println!("{}", HELP),
                    PromptInput::Quit => return Ok(()),
                    PromptInput::Unknown(name) => {
                        println!("{}", format!("Unknown command /{} (try /help)", name).yellow());
                    }
                    PromptInput::Empty => {}
                }
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let snapshot = updates.borrow_and_update().clone();
                renderer.render(&snapshot);
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                if handle.snapshot().is_active() {
                    handle.end()?;
                } else {
                    return Ok(());
                }
            }
        }
    }
}

fn print_summary(transcript: &[TranscriptEntry], seconds: u64) {
    println!();
    println!("{} {}", "Call duration:".dimmed(), format_elapsed(seconds));
    if transcript.is_empty() {
        return;
    }
    println!("{}", "Transcript:".bold());
    println!("{}", render_entries(transcript));
}

/// Report whether spoken playback and the configuration are usable.
pub async fn run_check(config: &Config) -> Result<()> {
    println!("Checking parley setup...\n");

    match config.validate() {
        Ok(()) => println!("  {} configuration", "✓".green()),
        Err(e) => println!("  {} configuration: {}", "✗".red(), e),
    }
    println!("  {} server: {}", "•".dimmed(), config.server.url);

    let speaker = CommandSpeaker::new(config.playback.command.clone());
    match speaker.probe().await {
        Ok(version) if version.is_empty() => {
            println!("  {} {}", "✓".green(), speaker.program());
        }
        Ok(version) => println!("  {} {} ({})", "✓".green(), speaker.program(), version),
        Err(e) => {
            println!("  {} {}", "✗".red(), e);
            println!(
                "    {}",
                "Install espeak-ng or run with --silent for text-only replies".dimmed()
            );
        }
    }
    Ok(())
}

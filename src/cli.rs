//! Command-line interface for parley
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// Half-duplex voice interview client
#[derive(Parser, Debug)]
#[command(name = "parley", version, about = "Half-duplex voice interview client")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress log output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose logging (-v: info, -vv: debug, -vvv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Interview server WebSocket URL
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,

    /// Recognition language tag (default: en-US)
    #[arg(long, value_name = "LANG")]
    pub language: Option<String>,

    /// Delay before reconnecting after a dropped connection. Examples: 3s, 500ms
    #[arg(long, value_name = "DURATION", value_parser = parse_delay)]
    pub reconnect_delay: Option<Duration>,

    /// Print replies without speaking them
    #[arg(long)]
    pub silent: bool,

    /// Text-to-speech program for spoken replies (default: espeak-ng)
    #[arg(long, value_name = "PROGRAM")]
    pub tts_command: Option<String>,
}

/// Parse a delay string.
///
/// Supports any duration format accepted by `humantime`; bare numbers are
/// milliseconds.
fn parse_delay(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if let Ok(millis) = s.parse::<u64>() {
        return Ok(Duration::from_millis(millis));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check that spoken playback is available
    Check,

    /// View and create configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration management actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the configuration file path
    Path,
    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use parley::app::{run_check, run_interview};
use parley::cli::{Cli, Commands, ConfigAction};
use parley::config::Config;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    tracing::debug!(version = %parley::version_string(), "parley starting");

    match &cli.command {
        None => {
            let config = apply_cli_overrides(load_config(cli.config.as_deref())?, &cli);
            config.validate()?;
            run_interview(config, cli.silent).await?;
        }
        Some(Commands::Check) => {
            let config = apply_cli_overrides(load_config(cli.config.as_deref())?, &cli);
            run_check(&config).await?;
        }
        Some(Commands::Config { action }) => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(*shell, &mut Cli::command(), "parley", &mut std::io::stdout());
        }
    }

    Ok(())
}

/// Log filter: RUST_LOG wins, otherwise the verbosity flags decide.
fn default_filter(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "parley=error";
    }
    match verbose {
        0 => "parley=warn",
        1 => "parley=info",
        2 => "parley=debug",
        _ => "parley=trace",
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose, quiet)));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        // Load from custom path
        Config::load(path)?
    } else {
        // Try default path, fall back to defaults
        Config::load_or_default(&Config::default_path())?
    };

    // Apply environment variable overrides
    Ok(config.with_env_overrides())
}

/// Command-line flags override both the file and the environment.
fn apply_cli_overrides(mut config: Config, cli: &Cli) -> Config {
    if let Some(url) = &cli.url {
        config.server.url = url.clone();
    }
    if let Some(language) = &cli.language {
        config.capture.language = language.clone();
    }
    if let Some(delay) = cli.reconnect_delay {
        config.server.reconnect_delay_ms = delay.as_millis() as u64;
    }
    if let Some(command) = &cli.tts_command {
        config.playback.command = command.clone();
    }
    config
}

fn handle_config_command(action: &ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    let config_path = custom_path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);

    match action {
        ConfigAction::Show => {
            let config = load_config(custom_path)?;
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Path => {
            println!("{}", config_path.display());
        }
        ConfigAction::Init { force } => {
            if config_path.exists() && !force {
                bail!(
                    "{} already exists (use --force to overwrite)",
                    config_path.display()
                );
            }
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            std::fs::write(&config_path, Config::default().to_toml()?)
                .with_context(|| format!("Failed to write {}", config_path.display()))?;
            println!("{} {}", "Wrote".green(), config_path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_levels() {
        assert_eq!(default_filter(0, false), "parley=warn");
        assert_eq!(default_filter(1, false), "parley=info");
        assert_eq!(default_filter(2, false), "parley=debug");
        assert_eq!(default_filter(5, false), "parley=trace");
        assert_eq!(default_filter(3, true), "parley=error");
    }

    #[test]
    fn test_cli_overrides_win() {
        let cli = Cli::try_parse_from([
            "parley",
            "--url",
            "ws://override/",
            "--reconnect-delay",
            "1s",
            "--tts-command",
            "say",
        ])
        .unwrap();
        let config = apply_cli_overrides(Config::default(), &cli);

        assert_eq!(config.server.url, "ws://override/");
        assert_eq!(config.server.reconnect_delay_ms, 1000);
        assert_eq!(config.playback.command, "say");
        assert_eq!(config.capture.language, "en-US");
    }
}

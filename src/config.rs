use crate::defaults;
use crate::error::{ParleyError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub capture: CaptureConfig,
    pub playback: PlaybackConfig,
}

/// Interview server connection configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub url: String,
    pub reconnect_delay_ms: u64,
}

/// Speech capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureConfig {
    pub language: String,
    pub continuous: bool,
    pub interim_results: bool,
    pub restart_delay_ms: u64,
}

/// Spoken playback configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackConfig {
    pub command: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: defaults::SERVER_URL.to_string(),
            reconnect_delay_ms: defaults::RECONNECT_DELAY_MS,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            language: defaults::CAPTURE_LANGUAGE.to_string(),
            continuous: true,
            interim_results: false,
            restart_delay_ms: defaults::CAPTURE_RESTART_DELAY_MS,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            command: defaults::TTS_COMMAND.to_string(),
            rate: defaults::PLAYBACK_RATE,
            pitch: defaults::PLAYBACK_PITCH,
            volume: defaults::PLAYBACK_VOLUME,
        }
    }
}

impl ServerConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl CaptureConfig {
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file is missing or contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ParleyError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                ParleyError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(ParleyError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - PARLEY_SERVER_URL → server.url
    /// - PARLEY_LANGUAGE → capture.language
    /// - PARLEY_TTS_COMMAND → playback.command
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("PARLEY_SERVER_URL")
            && !url.is_empty()
        {
            self.server.url = url;
        }

        if let Ok(language) = std::env::var("PARLEY_LANGUAGE")
            && !language.is_empty()
        {
            self.capture.language = language;
        }

        if let Ok(command) = std::env::var("PARLEY_TTS_COMMAND")
            && !command.is_empty()
        {
            self.playback.command = command;
        }

        self
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if !(self.server.url.starts_with("ws://") || self.server.url.starts_with("wss://")) {
            return Err(invalid(
                "server.url",
                format!("expected a ws:// or wss:// URL, got '{}'", self.server.url),
            ));
        }
        if self.server.reconnect_delay_ms == 0 {
            return Err(invalid("server.reconnect_delay_ms", "must be positive"));
        }
        if self.capture.restart_delay_ms == 0 {
            return Err(invalid("capture.restart_delay_ms", "must be positive"));
        }
        if self.capture.language.trim().is_empty() {
            return Err(invalid("capture.language", "must not be empty"));
        }
        if !(0.1..=10.0).contains(&self.playback.rate) {
            return Err(invalid("playback.rate", "must be between 0.1 and 10"));
        }
        if !(0.1..=10.0).contains(&self.playback.pitch) {
            return Err(invalid("playback.pitch", "must be between 0.1 and 10"));
        }
        if !(0.0..=1.0).contains(&self.playback.volume) {
            return Err(invalid("playback.volume", "must be between 0 and 1"));
        }
        Ok(())
    }

    /// Serialize to TOML, as written by `parley config init`.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ParleyError::ConfigParse {
            message: e.to_string(),
        })
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/parley/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("parley")
            .join("config.toml")
    }
}

fn invalid(key: &str, message: impl Into<String>) -> ParleyError {
    ParleyError::ConfigInvalidValue {
        key: key.to_string(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_parley_env() {
        remove_env("PARLEY_SERVER_URL");
        remove_env("PARLEY_LANGUAGE");
        remove_env("PARLEY_TTS_COMMAND");
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.server.url, "ws://localhost:8000/ws/interview/");
        assert_eq!(config.server.reconnect_delay_ms, 3000);

        assert_eq!(config.capture.language, "en-US");
        assert!(config.capture.continuous);
        assert!(!config.capture.interim_results);
        assert_eq!(config.capture.restart_delay_ms, 500);

        assert_eq!(config.playback.command, "espeak-ng");
        assert_eq!(config.playback.rate, 1.0);
        assert_eq!(config.playback.pitch, 1.0);
        assert_eq!(config.playback.volume, 1.0);
    }

    #[test]
    fn test_delays_as_durations() {
        let config = Config::default();
        assert_eq!(config.server.reconnect_delay(), Duration::from_secs(3));
        assert_eq!(config.capture.restart_delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_load_from_toml_file() {
        let toml_content = r#"
            [server]
            url = "wss://interview.example.com/ws/interview/"
            reconnect_delay_ms = 5000

            [capture]
            language = "en-GB"
            interim_results = true
            restart_delay_ms = 250

            [playback]
            command = "spd-say"
            rate = 1.5
            volume = 0.8
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.server.url, "wss://interview.example.com/ws/interview/");
        assert_eq!(config.server.reconnect_delay_ms, 5000);
        assert_eq!(config.capture.language, "en-GB");
        assert!(config.capture.interim_results);
        assert_eq!(config.capture.restart_delay_ms, 250);
        assert_eq!(config.playback.command, "spd-say");
        assert_eq!(config.playback.rate, 1.5);
        assert_eq!(config.playback.pitch, 1.0);
        assert_eq!(config.playback.volume, 0.8);
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let toml_content = r#"
            [server]
            url = "ws://127.0.0.1:9000/ws/"
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.server.url, "ws://127.0.0.1:9000/ws/");
        assert_eq!(config.server.reconnect_delay_ms, 3000);
        assert_eq!(config.capture, CaptureConfig::default());
        assert_eq!(config.playback, PlaybackConfig::default());
    }

    #[test]
    fn test_env_override_url() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_parley_env();

        set_env("PARLEY_SERVER_URL", "ws://10.0.0.2:8000/ws/interview/");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.server.url, "ws://10.0.0.2:8000/ws/interview/");
        assert_eq!(config.capture.language, "en-US"); // Not overridden

        clear_parley_env();
    }

    #[test]
    fn test_env_override_all() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_parley_env();

        set_env("PARLEY_SERVER_URL", "wss://remote/ws/");
        set_env("PARLEY_LANGUAGE", "de-DE");
        set_env("PARLEY_TTS_COMMAND", "say");

        let config = Config::default().with_env_overrides();

        assert_eq!(config.server.url, "wss://remote/ws/");
        assert_eq!(config.capture.language, "de-DE");
        assert_eq!(config.playback.command, "say");

        clear_parley_env();
    }

    #[test]
    fn test_env_override_empty_string_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_parley_env();

        set_env("PARLEY_TTS_COMMAND", "");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.playback.command, "espeak-ng");

        clear_parley_env();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let invalid_toml = r#"
            [server
            url = "broken
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(invalid_toml.as_bytes()).unwrap();

        let result = Config::load(temp_file.path());

        assert!(matches!(result, Err(ParleyError::Config(_))));
    }

    #[test]
    fn test_load_missing_file_reports_path() {
        let missing_path = Path::new("/tmp/nonexistent_parley_config_12345.toml");
        match Config::load(missing_path) {
            Err(ParleyError::ConfigFileNotFound { path }) => {
                assert!(path.contains("nonexistent_parley_config_12345"));
            }
            other => panic!("Expected ConfigFileNotFound, got: {:?}", other),
        }
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let missing_path = Path::new("/tmp/nonexistent_parley_config_12345.toml");
        let config = Config::load_or_default(missing_path).unwrap();

        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_or_default_errors_on_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[capture\nlanguage = 3").unwrap();

        assert!(Config::load_or_default(temp_file.path()).is_err());
    }

    #[test]
    fn test_default_path_ends_with_parley_config() {
        let path = Config::default_path();
        let path_str = path.to_string_lossy();

        assert!(path_str.contains("parley"));
        assert!(path_str.ends_with("config.toml"));
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_http_url() {
        let mut config = Config::default();
        config.server.url = "http://localhost:8000/".to_string();

        match config.validate() {
            Err(ParleyError::ConfigInvalidValue { key, .. }) => assert_eq!(key, "server.url"),
            other => panic!("Expected ConfigInvalidValue, got: {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_out_of_range_voice() {
        let mut config = Config::default();
        config.playback.volume = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.playback.rate = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_delays() {
        let mut config = Config::default();
        config.server.reconnect_delay_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.capture.restart_delay_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_to_toml_loads_back_identically() {
        let mut config = Config::default();
        config.playback.command = "spd-say".to_string();

        let text = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();

        assert_eq!(parsed, config);
        assert!(text.contains("[server]"));
    }
}

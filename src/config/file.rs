//! TOML configuration file loading
//!
//! Supports `~/.config/rik/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct RikConfigFile {
    /// Backend user identifier
    #[serde(default)]
    pub user_id: Option<String>,

    /// Backend connection settings
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Assistant session behaviour
    #[serde(default)]
    pub session: SessionFileConfig,

    /// Speech synthesis and recognition
    #[serde(default)]
    pub voice: VoiceFileConfig,
}

/// Backend connection configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Base URL of the coaching backend
    pub base_url: Option<String>,

    /// Per-request timeout in seconds
    pub request_timeout_secs: Option<u64>,
}

/// Session timing and wake word configuration
#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    pub idle_timeout_secs: Option<u64>,
    pub sleep_delay_ms: Option<u64>,
    pub wake_grace_ms: Option<u64>,
    pub auto_listen: Option<bool>,
    pub wake_words: Option<Vec<String>>,
    pub fallback_message: Option<String>,
}

/// Voice configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// `OpenAI` API key for TTS and Whisper
    pub openai_api_key: Option<String>,

    /// Override for the `OpenAI` API base URL
    pub openai_base_url: Option<String>,

    /// TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// TTS voice identifier (e.g. "alloy")
    pub tts_voice: Option<String>,

    /// TTS speed multiplier
    pub tts_speed: Option<f64>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `RikConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> RikConfigFile {
    config_file_path().map_or_else(RikConfigFile::default, |path| load_config_file_from(&path))
}

/// Load a TOML config file from an explicit path
///
/// Missing or malformed files fall back to defaults with a warning.
pub fn load_config_file_from(path: &Path) -> RikConfigFile {
    if !path.exists() {
        return RikConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                RikConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            RikConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/rik/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("rik").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_partial_file_parses() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
user_id = "u-42"

[session]
idle_timeout_secs = 90
wake_words = ["hey rik"]
"#
        )
        .unwrap();

        let fc = load_config_file_from(file.path());
        assert_eq!(fc.user_id.as_deref(), Some("u-42"));
        assert_eq!(fc.session.idle_timeout_secs, Some(90));
        assert_eq!(fc.session.wake_words, Some(vec!["hey rik".to_string()]));
        assert!(fc.server.base_url.is_none());
    }

    #[test]
    fn test_malformed_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "user_id = [not toml").unwrap();

        let fc = load_config_file_from(file.path());
        assert!(fc.user_id.is_none());
    }

    #[test]
    fn test_missing_file_is_default() {
        let fc = load_config_file_from(Path::new("/nonexistent/rik/config.toml"));
        assert!(fc.user_id.is_none());
    }
}

//! Configuration management for the Rik assistant

pub mod file;

use std::time::Duration;

use crate::session::FALLBACK_MESSAGE;
use crate::voice::DEFAULT_WAKE_WORDS;
use crate::{Error, Result};

use self::file::RikConfigFile;

/// Default coaching backend URL
const DEFAULT_BASE_URL: &str = "http://localhost:8001";

/// Default `OpenAI` API base URL for speech endpoints
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Rik assistant configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend user identifier sent with every request
    pub user_id: String,

    /// Backend connection configuration
    pub server: ServerConfig,

    /// Session controller configuration
    pub session: SessionConfig,

    /// Voice configuration
    pub voice: VoiceConfig,
}

/// Backend connection configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Base URL, without a trailing slash
    pub base_url: String,

    /// Bound on every backend request
    pub request_timeout: Duration,
}

/// Session controller configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Idle time in `Active` before the session goes dormant
    pub idle_timeout: Duration,

    /// Window between a deactivation phrase and the dormant transition
    pub sleep_delay: Duration,

    /// Pause before wake listening resumes after going dormant
    pub wake_grace: Duration,

    /// Restart command listening when playback completes
    pub auto_listen: bool,

    /// Phonetic spellings of the wake token
    pub wake_words: Vec<String>,

    /// Assistant message used when a dispatch fails
    pub fallback_message: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
            sleep_delay: Duration::from_millis(1500),
            wake_grace: Duration::from_millis(1200),
            auto_listen: false,
            wake_words: DEFAULT_WAKE_WORDS.iter().map(ToString::to_string).collect(),
            fallback_message: FALLBACK_MESSAGE.to_string(),
        }
    }
}

/// Speech synthesis and recognition configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// `OpenAI` API key (required for audio mode)
    pub openai_api_key: Option<String>,

    /// `OpenAI` API base URL
    pub openai_base_url: String,

    /// TTS model
    pub tts_model: String,

    /// TTS voice identifier
    pub tts_voice: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f64,

    /// STT model
    pub stt_model: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            tts_model: "tts-1".to_string(),
            tts_voice: "alloy".to_string(),
            tts_speed: 1.0,
            stt_model: "whisper-1".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the environment and `~/.config/rik/config.toml`
    ///
    /// # Errors
    ///
    /// Returns error if the resolved values are invalid
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::resolve(fc, &|key| std::env::var(key).ok())
    }

    /// Resolve configuration with priority env > toml > default
    ///
    /// # Errors
    ///
    /// Returns error if the base URL is not a valid URL or a value is out of range
    pub fn resolve(fc: RikConfigFile, env: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let user_id = env("RIK_USER_ID")
            .or(fc.user_id)
            .unwrap_or_else(|| "local-user".to_string());
        if user_id.trim().is_empty() {
            return Err(Error::Config("user id must not be empty".to_string()));
        }

        let base_url = env("RIK_API_URL")
            .or(fc.server.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        reqwest::Url::parse(&base_url)
            .map_err(|e| Error::Config(format!("invalid backend URL {base_url:?}: {e}")))?;

        let request_timeout_secs = env("RIK_REQUEST_TIMEOUT_SECS")
            .and_then(|s| s.parse().ok())
            .or(fc.server.request_timeout_secs)
            .unwrap_or(30);
        if request_timeout_secs == 0 {
            return Err(Error::Config("request timeout must be positive".to_string()));
        }

        let server = ServerConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(request_timeout_secs),
        };

        let defaults = SessionConfig::default();
        let idle_timeout = env("RIK_IDLE_TIMEOUT_SECS")
            .and_then(|s| s.parse().ok())
            .or(fc.session.idle_timeout_secs)
            .map_or(defaults.idle_timeout, Duration::from_secs);
        if idle_timeout.is_zero() {
            return Err(Error::Config("idle timeout must be positive".to_string()));
        }

        let wake_words: Vec<String> = fc
            .session
            .wake_words
            .unwrap_or_default()
            .iter()
            .map(|w| w.trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();
        let wake_words = if wake_words.is_empty() {
            defaults.wake_words
        } else {
            wake_words
        };

        let session = SessionConfig {
            idle_timeout,
            sleep_delay: fc
                .session
                .sleep_delay_ms
                .map_or(defaults.sleep_delay, Duration::from_millis),
            wake_grace: fc
                .session
                .wake_grace_ms
                .map_or(defaults.wake_grace, Duration::from_millis),
            auto_listen: env("RIK_AUTO_LISTEN")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .or(fc.session.auto_listen)
                .unwrap_or(defaults.auto_listen),
            wake_words,
            fallback_message: fc
                .session
                .fallback_message
                .unwrap_or(defaults.fallback_message),
        };

        let voice_defaults = VoiceConfig::default();
        let voice = VoiceConfig {
            openai_api_key: env("OPENAI_API_KEY").or(fc.voice.openai_api_key),
            openai_base_url: fc
                .voice
                .openai_base_url
                .unwrap_or(voice_defaults.openai_base_url),
            tts_model: env("RIK_TTS_MODEL")
                .or(fc.voice.tts_model)
                .unwrap_or(voice_defaults.tts_model),
            tts_voice: fc.voice.tts_voice.unwrap_or(voice_defaults.tts_voice),
            tts_speed: fc
                .voice
                .tts_speed
                .unwrap_or(voice_defaults.tts_speed)
                .clamp(0.25, 4.0),
            stt_model: env("RIK_STT_MODEL")
                .or(fc.voice.stt_model)
                .unwrap_or(voice_defaults.stt_model),
        };

        Ok(Self {
            user_id,
            server,
            session,
            voice,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::file::{ServerFileConfig, SessionFileConfig};
    use super::*;

    fn env_from(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::resolve(RikConfigFile::default(), &env_from(&[])).unwrap();

        assert_eq!(config.user_id, "local-user");
        assert_eq!(config.server.base_url, "http://localhost:8001");
        assert_eq!(config.server.request_timeout, Duration::from_secs(30));
        assert_eq!(config.session.idle_timeout, Duration::from_secs(60));
        assert!(!config.session.auto_listen);
        assert!(config.session.wake_words.iter().any(|w| w == "hey rik"));
        assert_eq!(config.session.fallback_message, FALLBACK_MESSAGE);
    }

    #[test]
    fn test_env_overrides_file() {
        let fc = RikConfigFile {
            user_id: Some("from-file".to_string()),
            server: ServerFileConfig {
                base_url: Some("http://file.example".to_string()),
                request_timeout_secs: Some(5),
            },
            ..RikConfigFile::default()
        };
        let env = env_from(&[
            ("RIK_USER_ID", "from-env"),
            ("RIK_API_URL", "https://api.example.com/"),
        ]);

        let config = Config::resolve(fc, &env).unwrap();
        assert_eq!(config.user_id, "from-env");
        assert_eq!(config.server.base_url, "https://api.example.com");
        assert_eq!(config.server.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let env = env_from(&[("RIK_API_URL", "not a url")]);
        let err = Config::resolve(RikConfigFile::default(), &env).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_empty_wake_words_keep_defaults() {
        let fc = RikConfigFile {
            session: SessionFileConfig {
                wake_words: Some(Vec::new()),
                auto_listen: Some(true),
                ..SessionFileConfig::default()
            },
            ..RikConfigFile::default()
        };

        let config = Config::resolve(fc, &env_from(&[])).unwrap();
        assert!(!config.session.wake_words.is_empty());
        assert!(config.session.auto_listen);
    }

    #[test]
    fn test_blank_wake_words_keep_defaults() {
        let fc = RikConfigFile {
            session: SessionFileConfig {
                wake_words: Some(vec!["  ".to_string(), String::new()]),
                ..SessionFileConfig::default()
            },
            ..RikConfigFile::default()
        };

        let config = Config::resolve(fc, &env_from(&[])).unwrap();
        assert_eq!(config.session.wake_words, SessionConfig::default().wake_words);
    }

    #[test]
    fn test_wake_words_are_normalized() {
        let fc = RikConfigFile {
            session: SessionFileConfig {
                wake_words: Some(vec![" Yo Rik ".to_string(), " ".to_string()]),
                ..SessionFileConfig::default()
            },
            ..RikConfigFile::default()
        };

        let config = Config::resolve(fc, &env_from(&[])).unwrap();
        assert_eq!(config.session.wake_words, ["yo rik"]);
    }

    #[test]
    fn test_zero_request_timeout_rejected() {
        let env = env_from(&[("RIK_REQUEST_TIMEOUT_SECS", "0")]);
        let err = Config::resolve(RikConfigFile::default(), &env).unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("request timeout")));
    }
}

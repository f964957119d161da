//! Voice capabilities
//!
//! The session controller drives speech through two seams: a [`Speaker`]
//! for text-to-speech output and a [`Recognizer`] for speech input. Only one
//! recognition context may hold the microphone at a time, enforced by
//! [`ListeningSlot`]. Hardware-backed implementations live behind the
//! `audio` feature.

mod console;
mod segmenter;
mod slot;
mod stt;
mod tts;
mod wake_word;

#[cfg(feature = "audio")]
mod audio;
#[cfg(feature = "audio")]
mod capture;
#[cfg(feature = "audio")]
mod playback;

use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::Result;

#[cfg(feature = "audio")]
pub use audio::{AudioSpeaker, MicrophoneRecognizer};
#[cfg(feature = "audio")]
pub use capture::{AudioCapture, SAMPLE_RATE, samples_to_wav};
#[cfg(feature = "audio")]
pub use playback::AudioPlayback;
pub use console::ConsoleSpeaker;
pub use segmenter::{SegmenterState, UtteranceSegmenter};
pub use slot::{ListeningLease, ListeningSlot};
pub use stt::SpeechToText;
pub use tts::TextToSpeech;
pub use wake_word::{DEFAULT_WAKE_WORDS, WakeWordDetector};

/// Which listening context holds the recognition channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenContext {
    /// Passive wake-word detection
    Wake,
    /// Capturing a command while the session is awake
    Command,
}

impl fmt::Display for ListenContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wake => f.write_str("wake"),
            Self::Command => f.write_str("command"),
        }
    }
}

/// Device capability that can be refused by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Microphone,
    Speaker,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Microphone => f.write_str("microphone"),
            Self::Speaker => f.write_str("speaker"),
        }
    }
}

/// Recognized speech, partial or final
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub text: String,
    pub is_final: bool,
}

impl Transcript {
    /// Interim transcript of speech still in progress
    #[must_use]
    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    /// Completed utterance
    #[must_use]
    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }
}

/// Text-to-speech output channel
#[async_trait]
pub trait Speaker: Send + Sync {
    /// Speak `text`, resolving when playback completes
    ///
    /// # Errors
    ///
    /// Returns error if synthesis or playback fails; `Error::PermissionDenied`
    /// if the output device is refused
    async fn speak(&self, text: &str) -> Result<()>;

    /// Abort playback in progress, if any
    fn stop(&self);
}

/// Speech recognition input channel
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Stream transcripts into `sink` until the stream ends or the future is dropped
    ///
    /// # Errors
    ///
    /// Returns error if recognition cannot start or breaks down;
    /// `Error::PermissionDenied` if the microphone is refused
    async fn listen(&self, context: ListenContext, sink: mpsc::Sender<Transcript>) -> Result<()>;
}

//! Wake word detection
//!
//! Matches streaming transcripts against phonetic spellings of the
//! assistant's name. The detector disarms itself on the first match so a
//! burst of partial transcripts triggers activation once.

/// Phonetic spellings recognized as "Hey Rik"
pub const DEFAULT_WAKE_WORDS: &[&str] = &[
    "hey rik",
    "hey rick",
    "hey ric",
    "hey reek",
    "hey wreck",
    "hi rik",
    "hi rick",
    "okay rik",
    "okay rick",
];

/// Detects wake words in transcripts
#[derive(Debug, Clone)]
pub struct WakeWordDetector {
    wake_words: Vec<String>,
    armed: bool,
}

impl WakeWordDetector {
    /// Create a new, disarmed wake word detector
    ///
    /// # Arguments
    ///
    /// * `wake_words` - Spellings to detect (e.g., "hey rik"); blank entries are dropped
    #[must_use]
    pub fn new(wake_words: Vec<String>) -> Self {
        let normalized: Vec<String> = wake_words
            .into_iter()
            .map(|w| w.trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();

        tracing::debug!(wake_words = ?normalized, "wake word detector initialized");

        Self {
            wake_words: normalized,
            armed: false,
        }
    }

    /// Start accepting transcripts
    pub const fn arm(&mut self) {
        self.armed = true;
    }

    /// Stop accepting transcripts
    pub const fn disarm(&mut self) {
        self.armed = false;
    }

    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.armed
    }

    /// Check a transcript for a wake word
    ///
    /// Returns the matched wake word and disarms the detector. Always `None`
    /// while disarmed.
    pub fn check(&mut self, transcript: &str) -> Option<&str> {
        if !self.armed {
            return None;
        }

        let matched = find_wake_word(&self.wake_words, transcript)?;
        self.armed = false;
        tracing::info!(wake_word = matched, transcript, "wake word detected");
        Some(matched)
    }

    /// Whether `transcript` contains a wake word, regardless of arming
    #[must_use]
    pub fn contains_wake_word(&self, transcript: &str) -> bool {
        find_wake_word(&self.wake_words, transcript).is_some()
    }

    /// Get the configured wake words
    #[must_use]
    pub fn wake_words(&self) -> &[String] {
        &self.wake_words
    }
}

fn find_wake_word<'a>(wake_words: &'a [String], transcript: &str) -> Option<&'a str> {
    let normalized = transcript.to_lowercase();
    wake_words
        .iter()
        .find(|w| normalized.contains(w.as_str()))
        .map(String::as_str)
}

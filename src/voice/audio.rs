//! Hardware-backed speaker and recognizer

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{
    AudioCapture, AudioPlayback, ListenContext, Recognizer, SAMPLE_RATE, Speaker, SpeechToText,
    TextToSpeech, Transcript, UtteranceSegmenter, samples_to_wav,
};
use crate::config::VoiceConfig;
use crate::{Error, Result};

/// Speaks through `OpenAI` TTS and the default output device
pub struct AudioSpeaker {
    tts: TextToSpeech,
    playback: AudioPlayback,
    current: Mutex<Option<Arc<AtomicBool>>>,
}

impl AudioSpeaker {
    /// Create a speaker from voice configuration
    ///
    /// # Errors
    ///
    /// Returns error if no API key is configured or no output device exists
    pub fn from_config(config: &VoiceConfig) -> Result<Self> {
        Ok(Self {
            tts: TextToSpeech::from_config(config)?,
            playback: AudioPlayback::new()?,
            current: Mutex::new(None),
        })
    }

    fn raise_current(&self) {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(flag) = current.as_ref() {
            flag.store(true, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl Speaker for AudioSpeaker {
    async fn speak(&self, text: &str) -> Result<()> {
        let stop = Arc::new(AtomicBool::new(false));
        {
            let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(previous) = current.replace(Arc::clone(&stop)) {
                previous.store(true, Ordering::SeqCst);
            }
        }

        let mp3 = self.tts.synthesize(text).await?;
        if stop.load(Ordering::SeqCst) {
            return Ok(());
        }

        let playback = self.playback.clone();
        tokio::task::spawn_blocking(move || playback.play_mp3_blocking(&mp3, &stop))
            .await
            .map_err(|e| Error::Audio(format!("playback task failed: {e}")))?
    }

    fn stop(&self) {
        self.raise_current();
    }
}

/// Listens on the default microphone and transcribes each utterance with Whisper
pub struct MicrophoneRecognizer {
    stt: SpeechToText,
}

impl MicrophoneRecognizer {
    /// Create a recognizer from voice configuration
    ///
    /// # Errors
    ///
    /// Returns error if no API key is configured
    pub fn from_config(config: &VoiceConfig) -> Result<Self> {
        Ok(Self {
            stt: SpeechToText::from_config(config)?,
        })
    }
}

#[async_trait]
impl Recognizer for MicrophoneRecognizer {
    async fn listen(&self, context: ListenContext, sink: mpsc::Sender<Transcript>) -> Result<()> {
        let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel();
        let _capture = AudioCapture::start(chunk_tx).await?;
        let mut segmenter = UtteranceSegmenter::new();

        tracing::debug!(%context, "microphone listening");

        while let Some(chunk) = chunk_rx.recv().await {
            let Some(utterance) = segmenter.push(&chunk) else {
                continue;
            };

            let wav = samples_to_wav(&utterance, SAMPLE_RATE)?;
            let text = match self.stt.transcribe(&wav).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(error = %e, %context, "transcription failed, skipping utterance");
                    continue;
                }
            };

            if text.trim().is_empty() {
                continue;
            }

            let transcript = match context {
                // wake detection only needs the running text
                ListenContext::Wake => Transcript::partial(text),
                ListenContext::Command => Transcript::final_text(text),
            };
            let done = transcript.is_final;

            if sink.send(transcript).await.is_err() {
                break;
            }
            if done {
                break;
            }
        }

        Ok(())
    }
}

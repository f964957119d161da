//! Voice pipeline integration tests
//!
//! Tests voice components without requiring audio hardware

use std::sync::Arc;
use std::time::Duration;

use rik_assistant::Error;
use rik_assistant::voice::{
    ConsoleSpeaker, DEFAULT_WAKE_WORDS, ListenContext, ListeningSlot, SegmenterState, Speaker,
    UtteranceSegmenter, WakeWordDetector,
};

mod common;

const SAMPLE_RATE: usize = 16000;

/// Generate sine wave audio samples
#[allow(clippy::cast_precision_loss)]
fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Generate silence
#[allow(clippy::cast_precision_loss)]
fn generate_silence(duration_secs: f32) -> Vec<f32> {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    vec![0.0; num_samples]
}

fn default_detector() -> WakeWordDetector {
    WakeWordDetector::new(DEFAULT_WAKE_WORDS.iter().map(ToString::to_string).collect())
}

#[test]
fn test_default_detector_matches_phonetic_variants() {
    for transcript in [
        "Hey Rik",
        "hey rick, what's up",
        "HEY REEK",
        "so... hey wreck",
        "okay rick",
        "hi rik",
    ] {
        let mut detector = default_detector();
        detector.arm();
        assert!(detector.check(transcript).is_some(), "{transcript}");
        assert!(!detector.is_armed());
    }
}

#[test]
fn test_detector_ignores_ordinary_speech() {
    let mut detector = default_detector();
    detector.arm();

    for transcript in ["hello there", "rick astley", "hey there", ""] {
        assert!(detector.check(transcript).is_none(), "{transcript}");
    }
    assert!(detector.is_armed());
}

#[test]
fn test_detector_first_match_wins() {
    let mut detector = default_detector();
    detector.arm();

    assert!(detector.check("hey rik").is_some());
    assert!(detector.check("hey rik hey rik").is_none());
}

#[test]
fn test_wake_and_command_contexts_are_exclusive() {
    let slot = ListeningSlot::new();

    let wake = slot.acquire(ListenContext::Wake).unwrap();
    assert!(matches!(
        slot.acquire(ListenContext::Command),
        Err(Error::ChannelBusy(_))
    ));

    drop(wake);
    let command = slot.acquire(ListenContext::Command).unwrap();
    assert_eq!(slot.holder(), Some(ListenContext::Command));
    assert_eq!(command.context(), ListenContext::Command);
}

#[test]
fn test_segmenter_emits_utterance_after_silence() {
    let mut segmenter = UtteranceSegmenter::new();
    let speech = generate_sine_samples(440.0, 1.0, 0.5);
    let silence = generate_silence(0.1);

    let mut emitted = None;
    for chunk in speech.chunks(1600) {
        assert!(segmenter.push(chunk).is_none());
    }
    assert_eq!(segmenter.state(), SegmenterState::Speaking);

    for _ in 0..10 {
        if let Some(utterance) = segmenter.push(&silence) {
            emitted = Some(utterance);
            break;
        }
    }

    let utterance = emitted.expect("utterance should be emitted");
    assert!(utterance.len() >= speech.len());
    assert_eq!(segmenter.state(), SegmenterState::Idle);
}

#[test]
fn test_segmenter_discards_short_blips() {
    let mut segmenter = UtteranceSegmenter::new();
    let blip = generate_sine_samples(440.0, 0.1, 0.5);
    let silence = generate_silence(0.1);

    assert!(segmenter.push(&blip).is_none());
    for _ in 0..10 {
        assert!(segmenter.push(&silence).is_none());
    }
    assert_eq!(segmenter.state(), SegmenterState::Idle);
}

#[test]
fn test_segmenter_ignores_quiet_noise() {
    let mut segmenter = UtteranceSegmenter::new();
    let hum = generate_sine_samples(60.0, 2.0, 0.01);

    for chunk in hum.chunks(1600) {
        assert!(segmenter.push(chunk).is_none());
    }
    assert_eq!(segmenter.state(), SegmenterState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_console_speaker_stop_interrupts_playback() {
    let speaker = Arc::new(ConsoleSpeaker::new("Rik").with_pace(Duration::from_secs(1)));

    let playing = {
        let speaker = Arc::clone(&speaker);
        tokio::spawn(async move { speaker.speak("one two three four five").await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    speaker.stop();

    let start = tokio::time::Instant::now();
    playing.await.unwrap().unwrap();
    assert!(start.elapsed() < Duration::from_secs(1));
}

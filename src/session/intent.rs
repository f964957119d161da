//! Keyword-substring intent detection
//!
//! Every check is a case-insensitive substring test.

/// Single words that put the assistant to sleep
const SLEEP_WORDS: &[&str] = &["sleep", "stop", "bye"];

/// Keyword pairs that request schedule generation
const SCHEDULE_PAIRS: &[(&str, &str)] = &[("generate", "schedule"), ("create", "schedule")];

/// Keyword pairs that start the routine-learning flow
const ROUTINE_PAIRS: &[(&str, &str)] = &[("learn", "routine")];

/// Keyword pairs that start the day-planning flow
const PLAN_PAIRS: &[(&str, &str)] = &[("plan", "day")];

/// What a user utterance asks the session to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Put the assistant to sleep
    Deactivate,
    /// Run the schedule-generation action instead of chat
    GenerateSchedule,
    /// Switch to routine learning, then chat
    LearnRoutine,
    /// Switch to day planning, then chat
    PlanDay,
    /// Plain chat in the current mode
    Chat,
}

/// Classify an utterance
///
/// Precedence: deactivation, schedule generation, routine learning, day
/// planning, chat.
#[must_use]
pub fn classify(utterance: &str) -> Intent {
    let text = utterance.to_lowercase();

    if is_deactivation(&text) {
        Intent::Deactivate
    } else if any_pair(&text, SCHEDULE_PAIRS) {
        Intent::GenerateSchedule
    } else if any_pair(&text, ROUTINE_PAIRS) {
        Intent::LearnRoutine
    } else if any_pair(&text, PLAN_PAIRS) {
        Intent::PlanDay
    } else {
        Intent::Chat
    }
}

/// Whether the utterance asks the assistant to go to sleep
#[must_use]
pub fn is_deactivation(utterance: &str) -> bool {
    let text = utterance.to_lowercase();
    SLEEP_WORDS.iter().any(|w| text.contains(w)) || (text.contains("over") && text.contains("out"))
}

fn any_pair(text: &str, pairs: &[(&str, &str)]) -> bool {
    pairs.iter().any(|(a, b)| text.contains(a) && text.contains(b))
}

//! Messages into and out of the session state machine
//!
//! Every callback (recognition result, playback completion, timer expiry,
//! dispatch completion) becomes an [`Event`]. The reducer answers with
//! [`Effect`]s that the controller executes.

use std::time::Duration;

use crate::api::{ChatReply, LearnedRoutine, MorningBriefing, ScheduleSummary, SessionStatus};
use crate::voice::{Capability, ListenContext};

use super::state::{ConversationMessage, Mode, SessionState};

/// Input to the session reducer
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Controller mounted; start passive wake listening if possible
    Start,
    /// Status summary arrived from the backend
    StatusLoaded(SessionStatus),
    /// Streaming transcript from the wake-word listener
    WakeTranscript(String),
    /// Explicit activation (button, `/wake`)
    Activate,
    /// Explicit deactivation (button, `/sleep`)
    Deactivate,
    /// User asked to capture a voice command
    StartVoiceInput,
    /// Transcript from command listening
    VoiceTranscript { text: String, is_final: bool },
    /// A listening context ended without a usable transcript
    ListeningEnded(ListenContext),
    /// A listening context failed to start or broke down
    RecognitionFailed(ListenContext),
    /// Typed user input
    Submit(String),
    /// Explicit "Save Routine" action
    SaveRoutine,
    /// Explicit morning briefing request
    RequestBriefing,
    /// Explicit mode change from the user
    SetMode(Mode),
    /// Remote dispatch settled
    DispatchCompleted {
        turn: u64,
        epoch: u64,
        outcome: Result<Reply, DispatchFailure>,
    },
    /// Playback of an utterance finished
    PlaybackFinished { utterance: u64 },
    /// Playback of an utterance failed
    PlaybackFailed { utterance: u64 },
    /// Inactivity deadline fired
    IdleTimeout { generation: u64 },
    /// Farewell window elapsed after a deactivation phrase
    FarewellElapsed { epoch: u64 },
    /// Grace delay after sleeping elapsed
    WakeGraceElapsed { epoch: u64 },
    /// Access to a capability was refused
    PermissionDenied(Capability),
    /// Controller unmounting
    Shutdown,
}

/// Remote action issued for a turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// General chat dispatch
    Chat { message: String, context: Mode },
    /// Schedule generation for the current date
    GenerateSchedule,
    /// Routine learning ("Save Routine")
    LearnRoutine,
    /// Morning briefing fetch
    MorningBriefing,
}

impl Command {
    /// Short name for logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Chat { .. } => "chat",
            Self::GenerateSchedule => "generate_schedule",
            Self::LearnRoutine => "learn_routine",
            Self::MorningBriefing => "morning_briefing",
        }
    }
}

/// Successful result of a [`Command`]
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Chat(ChatReply),
    Schedule(ScheduleSummary),
    Routine(LearnedRoutine),
    Briefing(MorningBriefing),
}

/// Failed dispatch; the detail is only logged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchFailure(pub String);

/// Observable change published to front ends
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// State or mode changed
    State { state: SessionState, mode: Mode },
    /// A message was appended to the conversation
    ///
    /// `spoken` is set when the message is also handed to the speaker.
    Message {
        message: ConversationMessage,
        spoken: bool,
    },
    /// One-off notice (e.g. permission denied)
    Notice(String),
}

/// Side effect requested by the reducer
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Begin listening in the given context
    StartListening(ListenContext),
    /// Stop listening in the given context
    StopListening(ListenContext),
    /// Stop any playback, then speak `text`
    Speak { utterance: u64, text: String },
    /// Stop any playback
    StopSpeech,
    /// Replace the inactivity deadline
    ArmIdleTimer { generation: u64, after: Duration },
    /// Cancel the inactivity deadline
    CancelIdleTimer,
    /// Issue a remote command
    Dispatch { turn: u64, epoch: u64, command: Command },
    /// Feed `event` back into the reducer after `after`
    Defer { after: Duration, event: Box<Event> },
    /// Publish an update to observers
    Publish(SessionUpdate),
}

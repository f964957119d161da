//! Assistant session state machine
//!
//! [`Session::handle`] is a pure reducer: it applies one [`Event`] to the
//! session and returns the [`Effect`]s the controller must carry out. It
//! never blocks and never touches I/O, so ordering and re-entrancy can be
//! tested without timers or audio.
//!
//! Two counters keep stale callbacks from acting on a newer session:
//!
//! - `epoch` increases on every activation. Dispatches and deferred events
//!   carry the epoch they were issued in; a mismatch means the session has
//!   slept (and maybe woken again) since.
//! - `idle_generation` increases on every deadline arm. Only the timeout
//!   for the currently armed generation can put the session to sleep.

use std::collections::{HashSet, VecDeque};

use crate::config::SessionConfig;
use crate::voice::{Capability, ListenContext, WakeWordDetector};

use super::event::{Command, DispatchFailure, Effect, Event, Reply, SessionUpdate};
use super::intent::{self, Intent};
use super::state::{Conversation, ConversationMessage, Mode, SessionState};

/// Assistant message used when a dispatch fails
pub const FALLBACK_MESSAGE: &str =
    "Sorry, I'm having trouble connecting right now. Please try again in a moment.";

/// Spoken before going to sleep on a deactivation phrase
pub const FAREWELL_MESSAGE: &str = "Going to sleep. Say \"Hey Rik\" whenever you need me.";

/// Which optional capabilities the session may use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Passive wake-word listening is possible
    pub wake_word: bool,
    /// Command listening (voice input) is possible
    pub voice_input: bool,
    /// Speech output is possible
    pub speech_output: bool,
}

impl Capabilities {
    /// Text-only session: no microphone, speech still rendered
    #[must_use]
    pub const fn text_only() -> Self {
        Self {
            wake_word: false,
            voice_input: false,
            speech_output: true,
        }
    }

    /// Full voice session
    #[must_use]
    pub const fn voice() -> Self {
        Self {
            wake_word: true,
            voice_input: true,
            speech_output: true,
        }
    }
}

/// Dispatch awaiting completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InFlight {
    turn: u64,
    epoch: u64,
}

/// The assistant session reducer
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    capabilities: Capabilities,
    detector: WakeWordDetector,
    state: SessionState,
    mode: Mode,
    conversation: Conversation,
    epoch: u64,
    idle_generation: u64,
    idle_armed: Option<u64>,
    next_turn: u64,
    in_flight: Option<InFlight>,
    queued: VecDeque<String>,
    next_utterance: u64,
    speaking: Option<u64>,
    farewell_pending: bool,
    user_name: Option<String>,
    notified: HashSet<Capability>,
}

impl Session {
    /// Create a dormant session
    #[must_use]
    pub fn new(config: SessionConfig, capabilities: Capabilities) -> Self {
        let detector = WakeWordDetector::new(config.wake_words.clone());
        Self {
            config,
            capabilities,
            detector,
            state: SessionState::Dormant,
            mode: Mode::General,
            conversation: Conversation::default(),
            epoch: 0,
            idle_generation: 0,
            idle_armed: None,
            next_turn: 0,
            in_flight: None,
            queued: VecDeque::new(),
            next_utterance: 0,
            speaking: None,
            farewell_pending: false,
            user_name: None,
            notified: HashSet::new(),
        }
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    #[must_use]
    pub const fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    #[must_use]
    pub const fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Whether a remote dispatch is outstanding
    #[must_use]
    pub const fn is_dispatching(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Number of utterances waiting for the outstanding dispatch
    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    /// Whether an inactivity deadline is armed
    #[must_use]
    pub const fn idle_armed(&self) -> bool {
        self.idle_armed.is_some()
    }

    /// Apply one event, returning the effects to execute in order
    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        let mut fx = Vec::new();
        tracing::trace!(state = %self.state, ?event, "session event");

        match event {
            Event::Start => self.on_start(&mut fx),
            Event::StatusLoaded(status) => {
                let name = status.name.trim();
                if !name.is_empty() {
                    self.user_name = Some(name.to_string());
                }
            }
            Event::WakeTranscript(text) => self.on_wake_transcript(&text, &mut fx),
            Event::Activate => self.on_activate(&mut fx),
            Event::Deactivate => {
                if self.state.is_awake() {
                    tracing::info!("deactivated by user");
                    self.sleep(&mut fx);
                }
            }
            Event::StartVoiceInput => self.on_start_voice_input(&mut fx),
            Event::VoiceTranscript { text, is_final } => {
                self.on_voice_transcript(text, is_final, &mut fx);
            }
            Event::ListeningEnded(context) | Event::RecognitionFailed(context) => {
                self.on_listening_stopped(context, &mut fx);
            }
            Event::Submit(text) => self.on_submit(text, &mut fx),
            Event::SaveRoutine => self.on_action(Command::LearnRoutine, &mut fx),
            Event::RequestBriefing => self.on_action(Command::MorningBriefing, &mut fx),
            Event::SetMode(mode) => {
                if self.state.is_awake() {
                    self.set_mode(mode, &mut fx);
                    self.touch(&mut fx);
                }
            }
            Event::DispatchCompleted {
                turn,
                epoch,
                outcome,
            } => self.on_dispatch_completed(turn, epoch, outcome, &mut fx),
            Event::PlaybackFinished { utterance } => self.on_playback_done(utterance, true, &mut fx),
            Event::PlaybackFailed { utterance } => {
                tracing::debug!(utterance, "playback failed, continuing in text mode");
                self.on_playback_done(utterance, false, &mut fx);
            }
            Event::IdleTimeout { generation } => self.on_idle_timeout(generation, &mut fx),
            Event::FarewellElapsed { epoch } => {
                if epoch == self.epoch && self.farewell_pending && self.state.is_awake() {
                    self.sleep(&mut fx);
                }
            }
            Event::WakeGraceElapsed { epoch } => {
                if epoch == self.epoch
                    && self.state == SessionState::Dormant
                    && self.capabilities.wake_word
                {
                    self.start_wake_listening(&mut fx);
                }
            }
            Event::PermissionDenied(capability) => self.on_permission_denied(capability, &mut fx),
            Event::Shutdown => self.on_shutdown(&mut fx),
        }

        fx
    }

    fn on_start(&mut self, fx: &mut Vec<Effect>) {
        if self.state == SessionState::Dormant && self.capabilities.wake_word {
            self.start_wake_listening(fx);
        }
    }

    fn on_wake_transcript(&mut self, text: &str, fx: &mut Vec<Effect>) {
        if self.state != SessionState::WakeListening {
            return;
        }
        if self.detector.check(text).is_some() {
            fx.push(Effect::StopListening(ListenContext::Wake));
            self.activate(fx);
        }
    }

    fn on_activate(&mut self, fx: &mut Vec<Effect>) {
        match self.state {
            SessionState::Dormant => self.activate(fx),
            SessionState::WakeListening => {
                self.detector.disarm();
                fx.push(Effect::StopListening(ListenContext::Wake));
                self.activate(fx);
            }
            _ => self.touch(fx),
        }
    }

    fn on_start_voice_input(&mut self, fx: &mut Vec<Effect>) {
        if self.state != SessionState::Active
            || !self.capabilities.voice_input
            || self.farewell_pending
        {
            return;
        }
        self.stop_speech(fx);
        self.set_state(SessionState::ActiveListening, fx);
        fx.push(Effect::StartListening(ListenContext::Command));
        self.arm_idle(fx);
    }

    fn on_voice_transcript(&mut self, text: String, is_final: bool, fx: &mut Vec<Effect>) {
        if self.state != SessionState::ActiveListening {
            return;
        }
        if !is_final {
            self.arm_idle(fx);
            return;
        }
        fx.push(Effect::StopListening(ListenContext::Command));
        self.set_state(SessionState::Active, fx);
        self.submit(text, fx);
    }

    fn on_listening_stopped(&mut self, context: ListenContext, fx: &mut Vec<Effect>) {
        match (context, self.state) {
            (ListenContext::Wake, SessionState::WakeListening) => {
                self.detector.disarm();
                self.set_state(SessionState::Dormant, fx);
            }
            (ListenContext::Command, SessionState::ActiveListening) => {
                self.set_state(SessionState::Active, fx);
            }
            _ => {}
        }
    }

    fn on_submit(&mut self, text: String, fx: &mut Vec<Effect>) {
        match self.state {
            SessionState::Dormant | SessionState::WakeListening => {
                tracing::debug!("ignoring input while asleep");
            }
            SessionState::ActiveListening => {
                fx.push(Effect::StopListening(ListenContext::Command));
                self.set_state(SessionState::Active, fx);
                self.submit(text, fx);
            }
            SessionState::Active | SessionState::Processing => self.submit(text, fx),
        }
    }

    /// Explicit actions (Save Routine, briefing) need an idle, awake session
    fn on_action(&mut self, command: Command, fx: &mut Vec<Effect>) {
        if !matches!(
            self.state,
            SessionState::Active | SessionState::ActiveListening
        ) {
            tracing::debug!(command = command.name(), state = %self.state, "action ignored");
            return;
        }
        if self.in_flight.is_some() || self.farewell_pending {
            tracing::debug!(command = command.name(), "action ignored, session busy");
            return;
        }
        if self.state == SessionState::ActiveListening {
            fx.push(Effect::StopListening(ListenContext::Command));
        }
        self.dispatch(command, fx);
    }

    fn submit(&mut self, text: String, fx: &mut Vec<Effect>) {
        let text = text.trim().to_string();
        if text.is_empty() {
            return;
        }

        if self.farewell_pending {
            tracing::debug!("input dropped, going to sleep");
            return;
        }

        if intent::is_deactivation(&text) {
            self.begin_farewell(text, fx);
            return;
        }

        if self.in_flight.is_some() {
            tracing::debug!(queued = self.queued.len() + 1, "dispatch outstanding, queueing");
            self.queued.push_back(text);
            if self.state == SessionState::Active {
                self.arm_idle(fx);
            }
            return;
        }

        self.begin_turn(text, fx);
    }

    fn begin_turn(&mut self, text: String, fx: &mut Vec<Effect>) {
        self.append(ConversationMessage::user(text.clone()), fx);

        let command = match intent::classify(&text) {
            Intent::GenerateSchedule => Command::GenerateSchedule,
            Intent::LearnRoutine => {
                self.set_mode(Mode::LearningRoutine, fx);
                Command::Chat {
                    message: text,
                    context: self.mode,
                }
            }
            Intent::PlanDay => {
                self.set_mode(Mode::PlanningDay, fx);
                Command::Chat {
                    message: text,
                    context: self.mode,
                }
            }
            Intent::Chat | Intent::Deactivate => Command::Chat {
                message: text,
                context: self.mode,
            },
        };

        self.dispatch(command, fx);
    }

    fn dispatch(&mut self, command: Command, fx: &mut Vec<Effect>) {
        self.next_turn += 1;
        let turn = self.next_turn;
        self.in_flight = Some(InFlight {
            turn,
            epoch: self.epoch,
        });

        tracing::info!(turn, command = command.name(), mode = %self.mode, "dispatching");

        self.cancel_idle(fx);
        self.set_state(SessionState::Processing, fx);
        fx.push(Effect::Dispatch {
            turn,
            epoch: self.epoch,
            command,
        });
    }

    fn begin_farewell(&mut self, text: String, fx: &mut Vec<Effect>) {
        tracing::info!("deactivation phrase detected");
        self.append(ConversationMessage::user(text), fx);
        self.say(
            ConversationMessage::assistant(FAREWELL_MESSAGE, Some("farewell".to_string())),
            fx,
        );
        self.cancel_idle(fx);
        self.farewell_pending = true;
        fx.push(Effect::Defer {
            after: self.config.sleep_delay,
            event: Box::new(Event::FarewellElapsed { epoch: self.epoch }),
        });
    }

    fn on_dispatch_completed(
        &mut self,
        turn: u64,
        epoch: u64,
        outcome: Result<Reply, DispatchFailure>,
        fx: &mut Vec<Effect>,
    ) {
        match self.in_flight {
            Some(pending) if pending.turn == turn => self.in_flight = None,
            _ => {
                tracing::warn!(turn, "completion for unknown dispatch ignored");
                return;
            }
        }

        let current = epoch == self.epoch;
        let message = match outcome {
            Ok(Reply::Chat(reply)) => {
                ConversationMessage::assistant(reply.response, reply.response_type)
            }
            Ok(Reply::Schedule(summary)) => {
                if current {
                    self.set_mode(Mode::General, fx);
                }
                let items = if summary.count == 1 { "item" } else { "items" };
                ConversationMessage::assistant(
                    format!(
                        "Done! I've generated {} {items} for your schedule today.",
                        summary.count
                    ),
                    Some("schedule".to_string()),
                )
            }
            Ok(Reply::Routine(routine)) => {
                if current {
                    self.set_mode(Mode::General, fx);
                }
                ConversationMessage::assistant(routine.describe(), Some("routine".to_string()))
            }
            Ok(Reply::Briefing(briefing)) => {
                ConversationMessage::assistant(briefing.briefing, Some("briefing".to_string()))
            }
            Err(DispatchFailure(reason)) => {
                tracing::warn!(turn, %reason, "dispatch failed, using fallback reply");
                ConversationMessage::assistant(
                    self.config.fallback_message.clone(),
                    Some("error".to_string()),
                )
            }
        };

        let processing = self.state == SessionState::Processing;
        if current && processing && !self.farewell_pending {
            self.set_state(SessionState::Active, fx);
            self.say(message, fx);
            self.arm_idle(fx);
        } else {
            tracing::debug!(turn, state = %self.state, "late reply logged without playback");
            self.append(message, fx);
            if current && processing {
                // farewell still playing; sleep follows when its window ends
                self.set_state(SessionState::Active, fx);
            }
        }

        if self.state == SessionState::Active
            && !self.farewell_pending
            && let Some(next) = self.queued.pop_front()
        {
            self.submit(next, fx);
        }
    }

    fn on_playback_done(&mut self, utterance: u64, completed: bool, fx: &mut Vec<Effect>) {
        if self.speaking != Some(utterance) {
            return;
        }
        self.speaking = None;

        if self.state != SessionState::Active || self.farewell_pending {
            return;
        }

        if completed && self.config.auto_listen && self.capabilities.voice_input {
            self.set_state(SessionState::ActiveListening, fx);
            fx.push(Effect::StartListening(ListenContext::Command));
        }
        self.arm_idle(fx);
    }

    fn on_idle_timeout(&mut self, generation: u64, fx: &mut Vec<Effect>) {
        if self.idle_armed != Some(generation) {
            tracing::trace!(generation, "stale idle timeout ignored");
            return;
        }
        self.idle_armed = None;

        if matches!(
            self.state,
            SessionState::Active | SessionState::ActiveListening
        ) {
            tracing::info!("idle timeout, going to sleep");
            self.sleep(fx);
        }
    }

    fn on_permission_denied(&mut self, capability: Capability, fx: &mut Vec<Effect>) {
        if self.notified.insert(capability) {
            fx.push(Effect::Publish(SessionUpdate::Notice(format!(
                "Rik needs {capability} access for voice features. Continuing without it."
            ))));
        }

        match capability {
            Capability::Microphone => {
                self.capabilities.wake_word = false;
                self.capabilities.voice_input = false;
                match self.state {
                    SessionState::WakeListening => {
                        self.detector.disarm();
                        self.set_state(SessionState::Dormant, fx);
                    }
                    SessionState::ActiveListening => self.set_state(SessionState::Active, fx),
                    _ => {}
                }
            }
            Capability::Speaker => {
                self.capabilities.speech_output = false;
                self.speaking = None;
            }
        }
    }

    fn on_shutdown(&mut self, fx: &mut Vec<Effect>) {
        match self.state {
            SessionState::WakeListening => fx.push(Effect::StopListening(ListenContext::Wake)),
            SessionState::ActiveListening => {
                fx.push(Effect::StopListening(ListenContext::Command));
            }
            _ => {}
        }
        self.detector.disarm();
        self.stop_speech(fx);
        self.cancel_idle(fx);
        self.queued.clear();
        self.farewell_pending = false;
        self.set_state(SessionState::Dormant, fx);
    }

    fn activate(&mut self, fx: &mut Vec<Effect>) {
        self.epoch += 1;
        self.farewell_pending = false;
        tracing::info!(epoch = self.epoch, "assistant activated");

        self.set_mode(Mode::General, fx);
        self.set_state(SessionState::Active, fx);

        let greeting = self.user_name.as_ref().map_or_else(
            || "Hey! What can I do for you?".to_string(),
            |name| format!("Hey {name}! What can I do for you?"),
        );
        self.say(
            ConversationMessage::assistant(greeting, Some("greeting".to_string())),
            fx,
        );
        self.arm_idle(fx);
    }

    fn sleep(&mut self, fx: &mut Vec<Effect>) {
        if self.state == SessionState::ActiveListening {
            fx.push(Effect::StopListening(ListenContext::Command));
        }
        self.stop_speech(fx);
        self.cancel_idle(fx);
        self.farewell_pending = false;

        if !self.queued.is_empty() {
            tracing::debug!(dropped = self.queued.len(), "dropping queued utterances on sleep");
            self.queued.clear();
        }

        self.set_mode(Mode::General, fx);
        self.set_state(SessionState::Dormant, fx);
        tracing::info!(epoch = self.epoch, "assistant sleeping");

        if self.capabilities.wake_word {
            fx.push(Effect::Defer {
                after: self.config.wake_grace,
                event: Box::new(Event::WakeGraceElapsed { epoch: self.epoch }),
            });
        }
    }

    fn start_wake_listening(&mut self, fx: &mut Vec<Effect>) {
        self.detector.arm();
        self.set_state(SessionState::WakeListening, fx);
        fx.push(Effect::StartListening(ListenContext::Wake));
    }

    fn speak(&mut self, text: String, fx: &mut Vec<Effect>) {
        if !self.capabilities.speech_output || text.trim().is_empty() {
            return;
        }
        self.next_utterance += 1;
        self.speaking = Some(self.next_utterance);
        fx.push(Effect::Speak {
            utterance: self.next_utterance,
            text,
        });
    }

    fn stop_speech(&mut self, fx: &mut Vec<Effect>) {
        self.speaking = None;
        fx.push(Effect::StopSpeech);
    }

    /// Register user interaction: restart the deadline while awake and idle
    fn touch(&mut self, fx: &mut Vec<Effect>) {
        if matches!(
            self.state,
            SessionState::Active | SessionState::ActiveListening
        ) && !self.farewell_pending
        {
            self.arm_idle(fx);
        }
    }

    fn arm_idle(&mut self, fx: &mut Vec<Effect>) {
        self.idle_generation += 1;
        self.idle_armed = Some(self.idle_generation);
        fx.push(Effect::ArmIdleTimer {
            generation: self.idle_generation,
            after: self.config.idle_timeout,
        });
    }

    fn cancel_idle(&mut self, fx: &mut Vec<Effect>) {
        if self.idle_armed.take().is_some() {
            fx.push(Effect::CancelIdleTimer);
        }
    }

    /// Log a message without speaking it
    fn append(&mut self, message: ConversationMessage, fx: &mut Vec<Effect>) {
        self.conversation.push(message.clone());
        fx.push(Effect::Publish(SessionUpdate::Message {
            message,
            spoken: false,
        }));
    }

    /// Log an assistant message and speak it when speech output is available
    fn say(&mut self, message: ConversationMessage, fx: &mut Vec<Effect>) {
        let text = message.content.clone();
        let spoken = self.capabilities.speech_output && !text.trim().is_empty();
        self.conversation.push(message.clone());
        fx.push(Effect::Publish(SessionUpdate::Message { message, spoken }));
        self.speak(text, fx);
    }

    fn set_state(&mut self, state: SessionState, fx: &mut Vec<Effect>) {
        if self.state != state {
            tracing::debug!(from = %self.state, to = %state, "session state");
            self.state = state;
            self.publish_state(fx);
        }
    }

    fn set_mode(&mut self, mode: Mode, fx: &mut Vec<Effect>) {
        if self.mode != mode {
            tracing::debug!(from = %self.mode, to = %mode, "session mode");
            self.mode = mode;
            self.publish_state(fx);
        }
    }

    fn publish_state(&self, fx: &mut Vec<Effect>) {
        fx.push(Effect::Publish(SessionUpdate::State {
            state: self.state,
            mode: self.mode,
        }));
    }
}

//! Async driver for the session reducer
//!
//! One task owns the [`Session`] and consumes a single input channel.
//! Recognition results, playback completion, timers, and remote dispatches
//! all run in their own tasks and report back over that channel, so the
//! reducer only ever sees one event at a time.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};

use crate::api::Backend;
use crate::config::SessionConfig;
use crate::voice::{Capability, ListenContext, ListeningSlot, Recognizer, Speaker, Transcript};
use crate::{Error, Result};

use super::event::{Command, DispatchFailure, Effect, Event, Reply, SessionUpdate};
use super::machine::{Capabilities, Session};
use super::state::{ConversationMessage, Mode, SessionState};
use super::timer::DeadlineTimer;

/// Input channel capacity
const INPUT_BUFFER: usize = 64;

/// Update broadcast capacity
const UPDATE_BUFFER: usize = 128;

/// Transcripts buffered between a recognizer and its forwarding task
const TRANSCRIPT_BUFFER: usize = 16;

/// How long a new listener waits for a cancelled one to release the channel
const SLOT_PATIENCE: Duration = Duration::from_millis(500);

/// Point-in-time view of the session
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub state: SessionState,
    pub mode: Mode,
    pub messages: Vec<ConversationMessage>,
    /// A remote dispatch is outstanding
    pub dispatching: bool,
}

impl Snapshot {
    fn of(session: &Session) -> Self {
        Self {
            state: session.state(),
            mode: session.mode(),
            messages: session.conversation().messages().to_vec(),
            dispatching: session.is_dispatching(),
        }
    }
}

/// Messages into the driver task
#[derive(Debug)]
enum Input {
    Event(Event),
    Transcript {
        listen_id: u64,
        context: ListenContext,
        transcript: Transcript,
    },
    ListenClosed {
        listen_id: u64,
        context: ListenContext,
        outcome: Result<()>,
    },
}

/// Spawns the session driver
pub struct SessionController;

impl SessionController {
    /// Start a session task
    ///
    /// Wake-word and voice input are enabled when a recognizer is supplied;
    /// speech output when a speaker is supplied. Returns the handle and the
    /// driver task, which ends after [`SessionHandle::shutdown`] or once
    /// every handle is dropped.
    pub fn spawn(
        config: SessionConfig,
        backend: Arc<dyn Backend>,
        speaker: Option<Arc<dyn Speaker>>,
        recognizer: Option<Arc<dyn Recognizer>>,
    ) -> (SessionHandle, JoinHandle<()>) {
        let capabilities = Capabilities {
            wake_word: recognizer.is_some(),
            voice_input: recognizer.is_some(),
            speech_output: speaker.is_some(),
        };
        let session = Session::new(config, capabilities);

        let (input_tx, input_rx) = mpsc::channel(INPUT_BUFFER);
        let (updates, _) = broadcast::channel(UPDATE_BUFFER);
        let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot::of(&session));

        let driver = Driver {
            inputs: input_tx.downgrade(),
            session,
            backend,
            speaker,
            recognizer,
            slot: ListeningSlot::new(),
            listening: None,
            next_listen: 0,
            playback: None,
            idle: DeadlineTimer::new(),
            tasks: JoinSet::new(),
            updates: updates.clone(),
            snapshot: snapshot_tx,
        };

        let task = tokio::spawn(driver.run(input_rx));

        let handle = SessionHandle {
            inputs: input_tx,
            updates,
            snapshot: snapshot_rx,
        };

        (handle, task)
    }
}

/// Cloneable handle for feeding user actions into a running session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    inputs: mpsc::Sender<Input>,
    updates: broadcast::Sender<SessionUpdate>,
    snapshot: watch::Receiver<Snapshot>,
}

impl SessionHandle {
    /// Deliver an event to the session
    ///
    /// # Errors
    ///
    /// Returns `Error::SessionClosed` if the session task has ended
    pub async fn send(&self, event: Event) -> Result<()> {
        self.inputs
            .send(Input::Event(event))
            .await
            .map_err(|_| Error::SessionClosed)
    }

    /// Submit typed input
    ///
    /// # Errors
    ///
    /// Returns `Error::SessionClosed` if the session task has ended
    pub async fn submit(&self, text: impl Into<String>) -> Result<()> {
        self.send(Event::Submit(text.into())).await
    }

    /// Wake the assistant without a wake word
    ///
    /// # Errors
    ///
    /// Returns `Error::SessionClosed` if the session task has ended
    pub async fn activate(&self) -> Result<()> {
        self.send(Event::Activate).await
    }

    /// Put the assistant to sleep
    ///
    /// # Errors
    ///
    /// Returns `Error::SessionClosed` if the session task has ended
    pub async fn deactivate(&self) -> Result<()> {
        self.send(Event::Deactivate).await
    }

    /// Start capturing a voice command
    ///
    /// # Errors
    ///
    /// Returns `Error::SessionClosed` if the session task has ended
    pub async fn start_voice_input(&self) -> Result<()> {
        self.send(Event::StartVoiceInput).await
    }

    /// Ask the backend to learn the routine described so far
    ///
    /// # Errors
    ///
    /// Returns `Error::SessionClosed` if the session task has ended
    pub async fn save_routine(&self) -> Result<()> {
        self.send(Event::SaveRoutine).await
    }

    /// Fetch today's morning briefing into the conversation
    ///
    /// # Errors
    ///
    /// Returns `Error::SessionClosed` if the session task has ended
    pub async fn request_briefing(&self) -> Result<()> {
        self.send(Event::RequestBriefing).await
    }

    /// Switch conversation mode
    ///
    /// # Errors
    ///
    /// Returns `Error::SessionClosed` if the session task has ended
    pub async fn set_mode(&self, mode: Mode) -> Result<()> {
        self.send(Event::SetMode(mode)).await
    }

    /// Stop the session task
    ///
    /// # Errors
    ///
    /// Returns `Error::SessionClosed` if the session task has already ended
    pub async fn shutdown(&self) -> Result<()> {
        self.send(Event::Shutdown).await
    }

    /// Subscribe to published updates
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.updates.subscribe()
    }

    /// Current view of the session
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    /// Wait until the session satisfies `predicate`
    ///
    /// # Errors
    ///
    /// Returns `Error::SessionClosed` if the session ends first
    pub async fn wait_for(&self, predicate: impl FnMut(&Snapshot) -> bool) -> Result<Snapshot> {
        let mut snapshot = self.snapshot.clone();
        snapshot
            .wait_for(predicate)
            .await
            .map(|s| s.clone())
            .map_err(|_| Error::SessionClosed)
    }
}

/// Recognition task that owns, or is waiting for, the listening slot
///
/// The lease lives inside the task, so the slot is only released once the
/// recognizer future has actually been dropped.
struct ActiveListen {
    id: u64,
    context: ListenContext,
    task: JoinHandle<()>,
}

impl Drop for ActiveListen {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Driver {
    inputs: mpsc::WeakSender<Input>,
    session: Session,
    backend: Arc<dyn Backend>,
    speaker: Option<Arc<dyn Speaker>>,
    recognizer: Option<Arc<dyn Recognizer>>,
    slot: ListeningSlot,
    listening: Option<ActiveListen>,
    next_listen: u64,
    playback: Option<JoinHandle<()>>,
    idle: DeadlineTimer,
    tasks: JoinSet<()>,
    updates: broadcast::Sender<SessionUpdate>,
    snapshot: watch::Sender<Snapshot>,
}

impl Driver {
    async fn run(mut self, mut inputs: mpsc::Receiver<Input>) {
        tracing::info!(
            wake_word = self.session.capabilities().wake_word,
            speech = self.session.capabilities().speech_output,
            "session started"
        );

        self.fetch_status();
        self.apply(Event::Start);

        let mut shut_down = false;
        while let Some(input) = inputs.recv().await {
            match input {
                Input::Event(event) => {
                    shut_down = matches!(event, Event::Shutdown);
                    self.apply(event);
                }
                Input::Transcript {
                    listen_id,
                    context,
                    transcript,
                } => self.on_transcript(listen_id, context, transcript),
                Input::ListenClosed {
                    listen_id,
                    context,
                    outcome,
                } => self.on_listen_closed(listen_id, context, outcome),
            }

            while let Some(result) = self.tasks.try_join_next() {
                if let Err(e) = result
                    && e.is_panic()
                {
                    tracing::error!(error = %e, "session task panicked");
                }
            }

            if shut_down {
                break;
            }
        }

        if !shut_down {
            self.apply(Event::Shutdown);
        }

        self.listening = None;
        self.stop_playback();
        self.idle.cancel();
        self.tasks.abort_all();
        tracing::info!("session stopped");
    }

    /// Run the reducer on `event` and every event its effects feed back
    fn apply(&mut self, event: Event) {
        let mut pending = VecDeque::from([event]);

        while let Some(event) = pending.pop_front() {
            for effect in self.session.handle(event) {
                self.execute(effect, &mut pending);
            }
        }

        let snapshot = Snapshot::of(&self.session);
        self.snapshot.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    fn execute(&mut self, effect: Effect, pending: &mut VecDeque<Event>) {
        match effect {
            Effect::StartListening(context) => {
                if let Err(e) = self.start_listening(context) {
                    tracing::warn!(error = %e, %context, "could not start listening");
                    pending.push_back(Event::RecognitionFailed(context));
                }
            }
            Effect::StopListening(context) => {
                if self
                    .listening
                    .as_ref()
                    .is_some_and(|l| l.context == context)
                {
                    self.listening = None;
                    tracing::debug!(%context, "listening stopped");
                }
            }
            Effect::Speak { utterance, text } => self.speak(utterance, text),
            Effect::StopSpeech => self.stop_playback(),
            Effect::ArmIdleTimer { generation, after } => {
                self.idle.arm(
                    after,
                    self.inputs.clone(),
                    Input::Event(Event::IdleTimeout { generation }),
                );
            }
            Effect::CancelIdleTimer => self.idle.cancel(),
            Effect::Dispatch {
                turn,
                epoch,
                command,
            } => self.dispatch(turn, epoch, command),
            Effect::Defer { after, event } => self.defer(after, *event),
            Effect::Publish(update) => {
                // no subscribers is fine
                let _ = self.updates.send(update);
            }
        }
    }

    fn start_listening(&mut self, context: ListenContext) -> Result<()> {
        let recognizer = self
            .recognizer
            .clone()
            .ok_or_else(|| Error::Recognition("no recognizer configured".to_string()))?;
        let slot = self.slot.clone();

        self.next_listen += 1;
        let listen_id = self.next_listen;
        let inputs = self.inputs.clone();

        let task = tokio::spawn(async move {
            // declared first so it is dropped after the recognizer future
            let _lease = match slot.acquire_within(context, SLOT_PATIENCE).await {
                Ok(lease) => lease,
                Err(e) => {
                    deliver(
                        &inputs,
                        Input::ListenClosed {
                            listen_id,
                            context,
                            outcome: Err(e),
                        },
                    )
                    .await;
                    return;
                }
            };

            let (sink, mut transcripts) = mpsc::channel(TRANSCRIPT_BUFFER);
            let listen = recognizer.listen(context, sink);
            tokio::pin!(listen);

            let outcome = loop {
                tokio::select! {
                    outcome = &mut listen => break outcome,
                    Some(transcript) = transcripts.recv() => {
                        deliver(&inputs, Input::Transcript { listen_id, context, transcript }).await;
                    }
                }
            };

            while let Ok(transcript) = transcripts.try_recv() {
                deliver(
                    &inputs,
                    Input::Transcript {
                        listen_id,
                        context,
                        transcript,
                    },
                )
                .await;
            }

            deliver(
                &inputs,
                Input::ListenClosed {
                    listen_id,
                    context,
                    outcome,
                },
            )
            .await;
        });

        tracing::debug!(%context, listen_id, "listening started");
        self.listening = Some(ActiveListen {
            id: listen_id,
            context,
            task,
        });

        Ok(())
    }

    fn on_transcript(&mut self, listen_id: u64, context: ListenContext, transcript: Transcript) {
        if self.listening.as_ref().is_none_or(|l| l.id != listen_id) {
            return;
        }

        let event = match context {
            ListenContext::Wake => Event::WakeTranscript(transcript.text),
            ListenContext::Command => Event::VoiceTranscript {
                text: transcript.text,
                is_final: transcript.is_final,
            },
        };
        self.apply(event);
    }

    fn on_listen_closed(&mut self, listen_id: u64, context: ListenContext, outcome: Result<()>) {
        if self.listening.as_ref().is_none_or(|l| l.id != listen_id) {
            return;
        }
        self.listening = None;

        match outcome {
            Ok(()) => self.apply(Event::ListeningEnded(context)),
            Err(Error::PermissionDenied(reason)) => {
                tracing::warn!(%reason, %context, "microphone unavailable");
                self.apply(Event::PermissionDenied(Capability::Microphone));
            }
            Err(e) => {
                tracing::warn!(error = %e, %context, "recognition failed");
                self.apply(Event::RecognitionFailed(context));
            }
        }
    }

    fn speak(&mut self, utterance: u64, text: String) {
        self.stop_playback();

        let Some(speaker) = self.speaker.clone() else {
            return;
        };
        let inputs = self.inputs.clone();

        self.playback = Some(tokio::spawn(async move {
            let event = match speaker.speak(&text).await {
                Ok(()) => Event::PlaybackFinished { utterance },
                Err(Error::PermissionDenied(reason)) => {
                    tracing::warn!(%reason, "speech output unavailable");
                    deliver(
                        &inputs,
                        Input::Event(Event::PermissionDenied(Capability::Speaker)),
                    )
                    .await;
                    Event::PlaybackFailed { utterance }
                }
                Err(e) => {
                    tracing::warn!(error = %e, utterance, "speech playback failed");
                    Event::PlaybackFailed { utterance }
                }
            };
            deliver(&inputs, Input::Event(event)).await;
        }));
    }

    fn stop_playback(&mut self) {
        if let Some(speaker) = &self.speaker {
            speaker.stop();
        }
        if let Some(task) = self.playback.take() {
            task.abort();
        }
    }

    fn dispatch(&mut self, turn: u64, epoch: u64, command: Command) {
        let backend = Arc::clone(&self.backend);
        let inputs = self.inputs.clone();

        self.tasks.spawn(async move {
            let name = command.name();
            let outcome = run_command(backend.as_ref(), command).await.map_err(|e| {
                tracing::warn!(error = %e, turn, command = name, "dispatch failed");
                DispatchFailure(e.to_string())
            });
            deliver(
                &inputs,
                Input::Event(Event::DispatchCompleted {
                    turn,
                    epoch,
                    outcome,
                }),
            )
            .await;
        });
    }

    fn defer(&mut self, after: Duration, event: Event) {
        let inputs = self.inputs.clone();
        self.tasks.spawn(async move {
            tokio::time::sleep(after).await;
            deliver(&inputs, Input::Event(event)).await;
        });
    }

    fn fetch_status(&mut self) {
        let backend = Arc::clone(&self.backend);
        let inputs = self.inputs.clone();

        self.tasks.spawn(async move {
            match backend.status().await {
                Ok(status) => {
                    tracing::debug!(name = %status.name, streak = status.streak, "status loaded");
                    deliver(&inputs, Input::Event(Event::StatusLoaded(status))).await;
                }
                Err(e) => tracing::warn!(error = %e, "could not load status"),
            }
        });
    }
}

/// Execute one remote command against the backend
async fn run_command(backend: &dyn Backend, command: Command) -> Result<Reply> {
    match command {
        Command::Chat { message, context } => backend.chat(&message, context).await.map(Reply::Chat),
        Command::GenerateSchedule => {
            let date = chrono::Local::now().format("%Y-%m-%d").to_string();
            backend
                .generate_schedule(&date)
                .await
                .map(Reply::Schedule)
        }
        Command::LearnRoutine => backend.learn_routine().await.map(Reply::Routine),
        Command::MorningBriefing => backend.morning_briefing().await.map(Reply::Briefing),
    }
}

/// Send to the driver if it is still running
async fn deliver(inputs: &mpsc::WeakSender<Input>, input: Input) {
    if let Some(sender) = inputs.upgrade() {
        let _ = sender.send(input).await;
    }
}

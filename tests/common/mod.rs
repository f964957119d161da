//! Shared test utilities
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::{Notify, mpsc};

use rik_assistant::api::{
    Backend, ChatReply, LearnedRoutine, MorningBriefing, ScheduleSummary, SessionStatus,
};
use rik_assistant::session::Mode;
use rik_assistant::voice::{ListenContext, Recognizer, Speaker, Transcript};
use rik_assistant::{Error, Result};

/// API key the mock speech endpoints accept
pub const TEST_API_KEY: &str = "test-key";

/// Requests seen by the mock backend, plus knobs for its behavior
#[derive(Clone, Default)]
pub struct MockState {
    pub chat_requests: Arc<Mutex<Vec<Value>>>,
    pub schedule_requests: Arc<Mutex<Vec<Value>>>,
    pub routine_users: Arc<Mutex<Vec<String>>>,
    pub speech_requests: Arc<Mutex<Vec<Value>>>,
    /// Status code for chat replies (0 means 200)
    pub chat_status: Arc<AtomicU16>,
    /// Delay before answering chat, in milliseconds
    pub chat_delay_ms: Arc<AtomicU16>,
}

/// In-process HTTP backend serving `/api/rik/*` and the speech endpoints
pub struct MockServer {
    pub base_url: String,
    pub state: MockState,
    task: tokio::task::JoinHandle<()>,
}

impl MockServer {
    /// Base URL for the speech endpoints
    pub fn speech_url(&self) -> String {
        format!("{}/v1", self.base_url)
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Start the mock backend on an ephemeral port
pub async fn spawn_backend() -> MockServer {
    let state = MockState::default();

    let app = Router::new()
        .route("/api/rik/status/{user_id}", get(status))
        .route("/api/rik/chat", post(chat))
        .route("/api/rik/generate-smart-schedule", post(schedule))
        .route("/api/rik/learn-routine", post(learn_routine))
        .route("/api/rik/morning-briefing/{user_id}", get(briefing))
        .route("/v1/audio/speech", post(speech))
        .route("/v1/audio/transcriptions", post(transcription))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind mock backend");
    let addr = listener.local_addr().expect("no local addr");

    let task = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock backend failed");
    });

    MockServer {
        base_url: format!("http://{addr}"),
        state,
        task,
    }
}

async fn status(Path(user_id): Path<String>) -> Json<Value> {
    Json(json!({
        "greeting": format!("Good morning, {user_id}"),
        "name": "Sam",
        "schedule_completed": 2,
        "schedule_total": 5,
        "habits_done": 1,
        "habits_total": 3,
        "points": 120,
        "streak": 4,
    }))
}

async fn chat(State(state): State<MockState>, Json(body): Json<Value>) -> Response {
    state
        .chat_requests
        .lock()
        .expect("lock")
        .push(body.clone());

    let delay = state.chat_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(u64::from(delay))).await;
    }

    match state.chat_status.load(Ordering::SeqCst) {
        0 | 200 => {}
        code => {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return (status, "backend exploded").into_response();
        }
    }

    let message = body["message"].as_str().unwrap_or_default();
    let reply = if message.to_lowercase().contains("routine") {
        "ok".to_string()
    } else {
        format!("You said: {message}")
    };

    Json(json!({ "response": reply, "response_type": "chat" })).into_response()
}

async fn schedule(State(state): State<MockState>, Json(body): Json<Value>) -> Json<Value> {
    state
        .schedule_requests
        .lock()
        .expect("lock")
        .push(body);
    Json(json!({ "count": 3 }))
}

#[derive(Deserialize)]
struct UserQuery {
    user_id: String,
}

async fn learn_routine(
    State(state): State<MockState>,
    Query(query): Query<UserQuery>,
) -> Json<Value> {
    state
        .routine_users
        .lock()
        .expect("lock")
        .push(query.user_id);
    Json(json!({ "routine": ["wake at 6", "gym", "deep work"] }))
}

async fn briefing(Path(user_id): Path<String>) -> Json<Value> {
    Json(json!({ "briefing": format!("Good morning {user_id}, you have 3 tasks today.") }))
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TEST_API_KEY}"))
}

async fn speech(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "bad key").into_response();
    }
    state
        .speech_requests
        .lock()
        .expect("lock")
        .push(body);
    (StatusCode::OK, b"ID3fake-mp3".to_vec()).into_response()
}

async fn transcription(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "bad key").into_response();
    }
    let multipart = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));
    if !multipart {
        return (StatusCode::BAD_REQUEST, "expected multipart").into_response();
    }
    Json(json!({ "text": "hey rik" })).into_response()
}

/// In-memory backend with scripted replies
#[derive(Default)]
pub struct FakeBackend {
    pub name: String,
    pub fail_chat: AtomicBool,
    pub chat_delay: Mutex<Duration>,
    pub replies: Mutex<VecDeque<String>>,
    pub chats: Mutex<Vec<(String, Mode)>>,
    pub schedules: Mutex<Vec<String>>,
    pub routines: AtomicUsize,
    pub briefings: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            name: "Sam".to_string(),
            ..Self::default()
        }
    }

    pub fn reply_with(&self, reply: &str) {
        self.replies
            .lock()
            .expect("lock")
            .push_back(reply.to_string());
    }

    pub fn chats(&self) -> Vec<(String, Mode)> {
        self.chats.lock().expect("lock").clone()
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn status(&self) -> Result<SessionStatus> {
        Ok(SessionStatus {
            name: self.name.clone(),
            ..SessionStatus::default()
        })
    }

    async fn chat(&self, message: &str, context: Mode) -> Result<ChatReply> {
        self.chats
            .lock()
            .expect("lock")
            .push((message.to_string(), context));

        let delay = *self.chat_delay.lock().expect("lock");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.fail_chat.load(Ordering::SeqCst) {
            return Err(Error::Api {
                status: 500,
                body: "boom".to_string(),
            });
        }

        let response = self
            .replies
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| format!("re: {message}"));

        Ok(ChatReply {
            response,
            response_type: None,
            action_required: None,
        })
    }

    async fn generate_schedule(&self, date: &str) -> Result<ScheduleSummary> {
        self.schedules.lock().expect("lock").push(date.to_string());
        Ok(ScheduleSummary { count: 4 })
    }

    async fn learn_routine(&self) -> Result<LearnedRoutine> {
        self.routines.fetch_add(1, Ordering::SeqCst);
        Ok(LearnedRoutine {
            routine: json!("up at 6, stretch, work"),
        })
    }

    async fn morning_briefing(&self) -> Result<MorningBriefing> {
        self.briefings.fetch_add(1, Ordering::SeqCst);
        Ok(MorningBriefing {
            briefing: "Three tasks today, Sam.".to_string(),
        })
    }
}

/// Speaker that records what it was asked to say
pub struct RecordingSpeaker {
    pub spoken: Mutex<Vec<String>>,
    pub stops: AtomicUsize,
    duration: Duration,
    interrupt: Notify,
}

impl RecordingSpeaker {
    pub fn new(duration: Duration) -> Self {
        Self {
            spoken: Mutex::new(Vec::new()),
            stops: AtomicUsize::new(0),
            duration,
            interrupt: Notify::new(),
        }
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().expect("lock").clone()
    }
}

#[async_trait]
impl Speaker for RecordingSpeaker {
    async fn speak(&self, text: &str) -> Result<()> {
        self.spoken.lock().expect("lock").push(text.to_string());
        tokio::select! {
            () = tokio::time::sleep(self.duration) => {}
            () = self.interrupt.notified() => {}
        }
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.interrupt.notify_waiters();
    }
}

/// Recognizer whose transcripts are pushed by the test
#[derive(Default)]
pub struct ScriptedRecognizer {
    active: Mutex<Option<(ListenContext, mpsc::Sender<Transcript>)>>,
    pub starts: Mutex<Vec<ListenContext>>,
    pub deny: AtomicBool,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

/// Counts a listen as running until its future is dropped
struct RunningListen(Arc<AtomicUsize>);

impl Drop for RunningListen {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn denied() -> Self {
        let recognizer = Self::default();
        recognizer.deny.store(true, Ordering::SeqCst);
        recognizer
    }

    /// Context currently listening, if its consumer is still attached
    pub fn listening(&self) -> Option<ListenContext> {
        self.active
            .lock()
            .expect("lock")
            .as_ref()
            .filter(|(_, sink)| !sink.is_closed())
            .map(|(context, _)| *context)
    }

    /// Wait until `context` is listening
    pub async fn wait_listening(&self, context: ListenContext) {
        for _ in 0..500 {
            if self.listening() == Some(context) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("never started listening for {context}");
    }

    /// Feed a transcript to the active listener
    pub async fn say(&self, transcript: Transcript) {
        let sink = self
            .active
            .lock()
            .expect("lock")
            .as_ref()
            .map(|(_, sink)| sink.clone())
            .expect("nobody is listening");
        sink.send(transcript).await.expect("listener went away");
    }

    pub fn starts(&self) -> Vec<ListenContext> {
        self.starts.lock().expect("lock").clone()
    }

    /// Most listens ever running at the same time
    pub fn peak_listeners(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Listens currently running
    pub fn running_listeners(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Recognizer for ScriptedRecognizer {
    async fn listen(&self, context: ListenContext, sink: mpsc::Sender<Transcript>) -> Result<()> {
        self.starts.lock().expect("lock").push(context);

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _running = RunningListen(Arc::clone(&self.running));

        if self.deny.load(Ordering::SeqCst) {
            return Err(Error::PermissionDenied("microphone refused".to_string()));
        }

        *self.active.lock().expect("lock") = Some((context, sink));
        std::future::pending::<()>().await;
        Ok(())
    }
}

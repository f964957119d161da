//! Rik Assistant - Voice-activated session controller for the Rik coaching backend
//!
//! This library provides:
//! - A wake-word driven assistant session (dormant, listening, processing)
//! - Keyword intent detection and conversation modes
//! - A thin client for the `/api/rik` HTTP endpoints
//! - Speech input and output seams, with microphone and speaker
//!   implementations behind the `audio` feature
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │               Front end (REPL, voice)            │
//! └───────────────────────┬──────────────────────────┘
//!                         │ SessionHandle
//! ┌───────────────────────▼──────────────────────────┐
//! │  SessionController ── Session (pure reducer)     │
//! │  timers │ listening slot │ playback │ dispatch   │
//! └──────┬───────────────────────┬───────────────────┘
//!        │                       │
//! ┌──────▼──────┐         ┌──────▼───────────────────┐
//! │  RikClient  │         │  Speaker / Recognizer    │
//! │  /api/rik/* │         │  console, TTS, Whisper   │
//! └─────────────┘         └──────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod session;
pub mod voice;

pub use api::{Backend, RikClient};
pub use config::Config;
pub use error::{Error, Result};
pub use session::{Session, SessionController, SessionHandle};

//! Assistant session
//!
//! The session is split into a pure reducer ([`Session`]) and an async
//! driver ([`SessionController`]) that turns every callback into an
//! [`Event`] and carries out the returned [`Effect`]s.

mod controller;
mod event;
mod intent;
mod machine;
mod state;
mod timer;

pub use controller::{SessionController, SessionHandle, Snapshot};
pub use event::{Command, DispatchFailure, Effect, Event, Reply, SessionUpdate};
pub use intent::{Intent, classify, is_deactivation};
pub use machine::{Capabilities, FALLBACK_MESSAGE, FAREWELL_MESSAGE, Session};
pub use state::{Conversation, ConversationMessage, Mode, Role, SessionState};
pub use timer::DeadlineTimer;

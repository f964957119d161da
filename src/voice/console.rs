//! Terminal speaker for text mode

use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use super::Speaker;
use crate::Result;

/// Approximate reading pace used to simulate playback duration
const MILLIS_PER_WORD: u64 = 60;

/// "Speaks" by printing to stdout, holding playback open briefly so
/// completion callbacks arrive the way they would from real audio
#[derive(Debug)]
pub struct ConsoleSpeaker {
    prefix: String,
    pace: Duration,
    interrupt: Notify,
}

impl ConsoleSpeaker {
    /// Create a console speaker printing lines as `{prefix}: {text}`
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            pace: Duration::from_millis(MILLIS_PER_WORD),
            interrupt: Notify::new(),
        }
    }

    /// Override the simulated per-word playback time
    #[must_use]
    pub const fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = pace;
        self
    }
}

#[async_trait]
impl Speaker for ConsoleSpeaker {
    async fn speak(&self, text: &str) -> Result<()> {
        {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}: {text}", self.prefix)?;
            stdout.flush()?;
        }

        let words = u32::try_from(text.split_whitespace().count()).unwrap_or(u32::MAX);
        let duration = self.pace.saturating_mul(words);

        tokio::select! {
            () = tokio::time::sleep(duration) => {}
            () = self.interrupt.notified() => {
                tracing::trace!("console playback interrupted");
            }
        }
        Ok(())
    }

    fn stop(&self) {
        self.interrupt.notify_waiters();
    }
}

//! Single-shot cancellable deadline

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// At most one pending deadline; arming replaces the previous one
#[derive(Debug, Default)]
pub struct DeadlineTimer {
    handle: Option<JoinHandle<()>>,
}

impl DeadlineTimer {
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Deliver `message` on `sender` after `after`, cancelling any pending deadline
    pub fn arm<T>(&mut self, after: Duration, sender: mpsc::WeakSender<T>, message: T)
    where
        T: Send + 'static,
    {
        self.cancel();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(sender) = sender.upgrade() {
                let _ = sender.send(message).await;
            }
        }));
    }

    /// Drop the pending deadline, if any
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Whether a deadline is pending
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for DeadlineTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_rearm_fires_once() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut timer = DeadlineTimer::new();

        timer.arm(Duration::from_secs(60), tx.downgrade(), 1);
        tokio::time::sleep(Duration::from_secs(30)).await;
        timer.arm(Duration::from_secs(60), tx.downgrade(), 2);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(rx.try_recv().unwrap(), 2);
        assert!(rx.try_recv().is_err());
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_fire() {
        let (tx, mut rx) = mpsc::channel::<u8>(8);
        let mut timer = DeadlineTimer::new();

        timer.arm(Duration::from_secs(5), tx.downgrade(), 1);
        assert!(timer.is_armed());
        timer.cancel();
        assert!(!timer.is_armed());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }
}

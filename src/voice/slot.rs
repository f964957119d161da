//! Exclusive access to the process-wide recognition channel

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;

use super::ListenContext;
use crate::{Error, Result};

/// Single-slot holder for the recognition channel
///
/// At most one [`ListeningLease`] exists at a time. The lease releases the
/// slot when dropped.
#[derive(Debug, Clone, Default)]
pub struct ListeningSlot {
    holder: Arc<Mutex<Option<ListenContext>>>,
    released: Arc<Notify>,
}

impl ListeningSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the channel for `context`
    ///
    /// # Errors
    ///
    /// Returns `Error::ChannelBusy` if another lease is outstanding
    pub fn acquire(&self, context: ListenContext) -> Result<ListeningLease> {
        let mut holder = self.holder.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(current) = *holder {
            return Err(Error::ChannelBusy(current.to_string()));
        }

        *holder = Some(context);
        tracing::trace!(%context, "listening slot acquired");

        Ok(ListeningLease {
            slot: self.clone(),
            context,
        })
    }

    /// Claim the channel, waiting up to `patience` for the current holder
    /// to release it
    ///
    /// # Errors
    ///
    /// Returns `Error::ChannelBusy` if the channel is still held afterwards
    pub async fn acquire_within(
        &self,
        context: ListenContext,
        patience: Duration,
    ) -> Result<ListeningLease> {
        let deadline = tokio::time::Instant::now() + patience;

        loop {
            let released = self.released.notified();
            tokio::pin!(released);
            // register before checking so a release in between is not missed
            released.as_mut().enable();

            match self.acquire(context) {
                Err(Error::ChannelBusy(held)) => {
                    tracing::trace!(%context, %held, "waiting for listening slot");
                    if tokio::time::timeout_at(deadline, released).await.is_err() {
                        return self.acquire(context);
                    }
                }
                other => return other,
            }
        }
    }

    /// Context currently holding the channel
    #[must_use]
    pub fn holder(&self) -> Option<ListenContext> {
        *self.holder.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Proof of exclusive access to the recognition channel
#[derive(Debug)]
pub struct ListeningLease {
    slot: ListeningSlot,
    context: ListenContext,
}

impl ListeningLease {
    #[must_use]
    pub const fn context(&self) -> ListenContext {
        self.context
    }
}

impl Drop for ListeningLease {
    fn drop(&mut self) {
        let mut holder = self.slot.holder.lock().unwrap_or_else(PoisonError::into_inner);
        if *holder == Some(self.context) {
            *holder = None;
            drop(holder);
            tracing::trace!(context = %self.context, "listening slot released");
            self.slot.released.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contexts_are_mutually_exclusive() {
        let slot = ListeningSlot::new();

        let wake = slot.acquire(ListenContext::Wake).unwrap();
        assert_eq!(slot.holder(), Some(ListenContext::Wake));

        let err = slot.acquire(ListenContext::Command).unwrap_err();
        assert!(matches!(err, Error::ChannelBusy(ref held) if held == "wake"));

        drop(wake);
        assert_eq!(slot.holder(), None);

        let command = slot.acquire(ListenContext::Command).unwrap();
        assert_eq!(command.context(), ListenContext::Command);
    }

    #[test]
    fn test_same_context_cannot_double_acquire() {
        let slot = ListeningSlot::new();
        let _lease = slot.acquire(ListenContext::Command).unwrap();
        assert!(slot.acquire(ListenContext::Command).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_within_waits_for_release() {
        let slot = ListeningSlot::new();
        let wake = slot.acquire(ListenContext::Wake).unwrap();

        let waiter = {
            let slot = slot.clone();
            tokio::spawn(async move {
                slot.acquire_within(ListenContext::Command, Duration::from_secs(1))
                    .await
                    .map(|lease| lease.context())
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(slot.holder(), Some(ListenContext::Wake));
        drop(wake);

        assert_eq!(waiter.await.unwrap().unwrap(), ListenContext::Command);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_within_gives_up_when_held() {
        let slot = ListeningSlot::new();
        let _wake = slot.acquire(ListenContext::Wake).unwrap();

        let result = slot
            .acquire_within(ListenContext::Command, Duration::from_millis(200))
            .await;
        assert!(matches!(result, Err(Error::ChannelBusy(_))));
    }
}

use std::time::Duration;

use tokio::{sync::mpsc, task::AbortHandle};

/// A single cancellable timer owned by a session.
///
/// When the timer fires, it sends a message built from its generation. Arming or cancelling the
/// slot bumps the generation, so a message from a superseded timer that is already queued can be
/// recognised with [TimerSlot::fired] and dropped.
#[derive(Debug, Default)]
pub struct TimerSlot {
    handle: Option<AbortHandle>,
    generation: u64,
}

impl TimerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer, replacing any pending one. Returns the generation of the new timer.
    pub fn arm<T, F>(&mut self, delay: Duration, tx: mpsc::Sender<T>, make: F) -> u64
    where
        T: Send + 'static,
        F: FnOnce(u64) -> T + Send + 'static,
    {
        self.cancel();
        let generation = self.generation;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            _ = tx.send(make(generation)).await;
        })
        .abort_handle();
        self.handle = Some(handle);
        generation
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.generation = self.generation.wrapping_add(1);
    }

    /// Consume a fired timer message. Returns false if the message came from a superseded timer.
    pub fn fired(&mut self, generation: u64) -> bool {
        if self.handle.is_none() || generation != self.generation {
            return false;
        }
        self.handle = None;
        true
    }

    pub fn is_armed(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_once() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut slot = TimerSlot::new();
        let generation = slot.arm(Duration::from_secs(1), tx, |g| g);
        assert!(slot.is_armed());
        let fired = rx.recv().await.unwrap();
        assert_eq!(fired, generation);
        assert!(slot.fired(fired));
        assert!(!slot.is_armed());
        assert!(!slot.fired(fired));
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_supersedes() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut slot = TimerSlot::new();
        let first = slot.arm(Duration::from_secs(1), tx.clone(), |g| g);
        let second = slot.arm(Duration::from_secs(2), tx, |g| g);
        assert_ne!(first, second);
        let fired = rx.recv().await.unwrap();
        assert_eq!(fired, second);
        assert!(!slot.fired(first));
        assert!(slot.fired(second));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_firing() {
        let (tx, mut rx) = mpsc::channel::<u64>(4);
        let mut slot = TimerSlot::new();
        let generation = slot.arm(Duration::from_secs(1), tx, |g| g);
        slot.cancel();
        assert!(!slot.fired(generation));
        tokio::time::advance(Duration::from_secs(2)).await;
        // the aborted task dropped the only sender
        assert_eq!(rx.recv().await, None);
    }
}

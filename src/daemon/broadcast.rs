//! Best-effort multicast of timer messages to attached listeners.
//!
//! Each listener owns a small bounded channel. Publishing never blocks and
//! never fails: a full channel skips that message for that listener, and a
//! closed channel is dropped from the listener set.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::types::TimerMessage;

/// Per-listener queue depth.
pub const LISTENER_CAPACITY: usize = 16;

/// Set of attached listeners.
#[derive(Debug, Default)]
pub struct Broadcaster {
    listeners: Vec<mpsc::Sender<TimerMessage>>,
}

impl Broadcaster {
    /// Creates a broadcaster with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a new listener and returns its receiving end.
    pub fn subscribe(&mut self) -> mpsc::Receiver<TimerMessage> {
        self.attach(None)
    }

    /// Attaches a new listener whose queue starts with `initial`.
    pub fn subscribe_with(&mut self, initial: TimerMessage) -> mpsc::Receiver<TimerMessage> {
        self.attach(Some(initial))
    }

    fn attach(&mut self, initial: Option<TimerMessage>) -> mpsc::Receiver<TimerMessage> {
        self.listeners.retain(|tx| !tx.is_closed());

        let (tx, rx) = mpsc::channel(LISTENER_CAPACITY);
        if let Some(message) = initial {
            // Fresh channel, cannot be full.
            let _ = tx.try_send(message);
        }
        self.listeners.push(tx);
        tracing::debug!(listeners = self.listeners.len(), "listener attached");
        rx
    }

    /// Sends `message` to every listener that can take it.
    pub fn publish(&mut self, message: &TimerMessage) {
        let before = self.listeners.len();

        self.listeners
            .retain(|tx| match tx.try_send(message.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    tracing::debug!("listener lagging, update skipped");
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            });

        let dropped = before - self.listeners.len();
        if dropped > 0 {
            tracing::debug!(dropped, "listeners detached");
        }
    }

    /// Number of attached listeners whose receiver is still alive.
    pub fn listener_count(&self) -> usize {
        self.listeners.iter().filter(|tx| !tx.is_closed()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TimerState;

    fn update(elapsed_ms: u64) -> TimerMessage {
        TimerMessage::TimerUpdate(TimerState {
            elapsed_ms,
            ..TimerState::default()
        })
    }

    #[test]
    fn test_publish_without_listeners_is_noop() {
        let mut broadcaster = Broadcaster::new();
        broadcaster.publish(&update(0));
        assert_eq!(broadcaster.listener_count(), 0);
    }

    #[test]
    fn test_publish_reaches_all_listeners() {
        let mut broadcaster = Broadcaster::new();
        let mut first = broadcaster.subscribe();
        let mut second = broadcaster.subscribe();

        broadcaster.publish(&update(1000));

        assert_eq!(first.try_recv().unwrap(), update(1000));
        assert_eq!(second.try_recv().unwrap(), update(1000));
    }

    #[test]
    fn test_subscribe_with_initial_message() {
        let mut broadcaster = Broadcaster::new();
        let mut listener = broadcaster.subscribe_with(update(7));
        assert_eq!(listener.try_recv().unwrap(), update(7));
        assert!(listener.try_recv().is_err());
    }

    #[test]
    fn test_closed_listener_is_dropped() {
        let mut broadcaster = Broadcaster::new();
        let closed = broadcaster.subscribe();
        let mut open = broadcaster.subscribe();
        drop(closed);

        broadcaster.publish(&update(1000));

        assert_eq!(broadcaster.listener_count(), 1);
        assert_eq!(open.try_recv().unwrap(), update(1000));
    }

    #[test]
    fn test_dropped_listener_is_not_counted() {
        let mut broadcaster = Broadcaster::new();
        let gone = broadcaster.subscribe();
        let _kept = broadcaster.subscribe();
        drop(gone);

        assert_eq!(broadcaster.listener_count(), 1);

        // Attaching again prunes the stale sender.
        let _another = broadcaster.subscribe();
        assert_eq!(broadcaster.listeners.len(), 2);
    }

    #[test]
    fn test_full_listener_does_not_block_others() {
        let mut broadcaster = Broadcaster::new();
        let mut slow = broadcaster.subscribe();
        let mut fast = broadcaster.subscribe();

        for i in 0..(LISTENER_CAPACITY as u64 + 5) {
            broadcaster.publish(&update(i));
            assert_eq!(fast.try_recv().unwrap(), update(i));
        }

        // Slow listener stays attached and holds the first messages only.
        assert_eq!(broadcaster.listener_count(), 2);
        let mut received = 0;
        while slow.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, LISTENER_CAPACITY);
    }
}

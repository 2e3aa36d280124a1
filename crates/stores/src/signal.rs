//! Change notification for state containers.

use tokio::sync::watch;

/// A generation counter observers can subscribe to.
///
/// Every mutation bumps the generation; subscribers re-read the store's
/// snapshot when they observe a change. This is the explicit
/// replacement for the subscribe-to-global-store pattern.
#[derive(Debug, Clone)]
pub struct ChangeSignal {
    tx: std::sync::Arc<watch::Sender<u64>>,
}

impl ChangeSignal {
    /// Creates a new signal at generation zero.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            tx: std::sync::Arc::new(tx),
        }
    }

    /// Subscribes to future changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }

    /// Marks the state as changed, waking all subscribers.
    pub fn notify(&self) {
        self.tx.send_modify(|generation| *generation += 1);
    }

    /// Returns the current generation.
    pub fn generation(&self) -> u64 {
        *self.tx.borrow()
    }
}

impl Default for ChangeSignal {
    fn default() -> Self {
        Self::new()
    }
}

//! Queue plumbing shared by the stages.
//!
//! A slot is either a post or the shutdown sentinel. Worker pools share
//! one receiver behind an async mutex; whichever worker holds the lock
//! takes the next slot.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::Mutex;

use prodscout_core::Post;

/// `None` is the sentinel: the receiving worker exits instead of
/// processing.
pub type Slot = Option<Box<Post>>;

pub const QUEUE_CAPACITY: usize = 128;

pub fn channel() -> (mpsc::Sender<Slot>, SharedReceiver) {
    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
    (tx, SharedReceiver::new(rx))
}

#[derive(Clone)]
pub struct SharedReceiver {
    inner: Arc<Mutex<mpsc::Receiver<Slot>>>,
}

impl SharedReceiver {
    pub fn new(rx: mpsc::Receiver<Slot>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(rx)),
        }
    }

    /// Next slot, or `None` when the channel itself is closed (treated
    /// the same as a sentinel by callers).
    pub async fn recv(&self) -> Slot {
        let mut rx = self.inner.lock().await;
        rx.recv().await.flatten()
    }
}

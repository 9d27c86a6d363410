use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

/// Receiving half of a bounded queue that many workers may pull from.
///
/// `tokio::sync::mpsc` has a single consumer; workers share it behind an async
/// mutex held only for the duration of one `recv`. The queue is closed when every
/// `Sender` has been dropped; `recv` then drains what is left and returns `None`.
#[derive(Debug)]
pub struct SharedReceiver<T> {
    inner: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T> Clone for SharedReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> SharedReceiver<T> {
    pub fn new(rx: mpsc::Receiver<T>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(rx)),
        }
    }

    pub async fn recv(&self) -> Option<T> {
        self.inner.lock().await.recv().await
    }
}

/// Bounded queue whose receiver can be shared by a worker pool.
pub fn bounded<T>(capacity: usize) -> (mpsc::Sender<T>, SharedReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (tx, SharedReceiver::new(rx))
}

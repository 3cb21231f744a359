use std::sync::{
    mpsc::{self, Receiver, Sender},
    Arc,
};

/// Called after every successful post so the UI thread wakes up and drains its queue.
pub type Waker = Arc<dyn Fn() + Send + Sync>;

/// Sending half of a queue consumed by the UI thread.
pub struct Mailbox<T> {
    tx: Sender<T>,
    waker: Waker,
}

impl<T> Clone for Mailbox<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            waker: Arc::clone(&self.waker),
        }
    }
}

impl<T> Mailbox<T> {
    pub fn channel(waker: Waker) -> (Self, Receiver<T>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx, waker }, rx)
    }

    /// Returns false once the receiving side is gone.
    pub fn post(&self, message: T) -> bool {
        if self.tx.send(message).is_err() {
            return false;
        }
        (self.waker)();
        true
    }
}

#[cfg(test)]
pub fn noop_waker() -> Waker {
    Arc::new(|| {})
}

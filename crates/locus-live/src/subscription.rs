//! Cancellable subscriptions.
//!
//! A producer holds a [`Feed`]; the consumer holds the matching
//! [`Subscription`]. Cancelling or dropping the subscription stops the
//! producer at its next send; items already buffered can still be read.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Create a connected feed/subscription pair with a bounded buffer.
pub fn subscription<T>(capacity: usize) -> (Feed<T>, Subscription<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let token = CancellationToken::new();

    (
        Feed {
            tx,
            token: token.clone(),
        },
        Subscription { rx, token },
    )
}

/// Producer half of a subscription.
#[derive(Debug)]
pub struct Feed<T> {
    tx: mpsc::Sender<T>,
    token: CancellationToken,
}

impl<T> Clone for Feed<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            token: self.token.clone(),
        }
    }
}

impl<T> Feed<T> {
    /// Deliver `item`. Returns false once the subscriber is gone.
    pub async fn send(&self, item: T) -> bool {
        if self.token.is_cancelled() {
            return false;
        }

        tokio::select! {
            biased;
            _ = self.token.cancelled() => false,
            sent = self.tx.send(item) => sent.is_ok(),
        }
    }

    /// Deliver `item` only if there is room right now.
    pub fn try_send(&self, item: T) -> bool {
        !self.token.is_cancelled() && self.tx.try_send(item).is_ok()
    }

    /// Resolves when the subscriber cancels.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled() || self.tx.is_closed()
    }
}

/// Consumer half of a subscription; cancels on drop.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: mpsc::Receiver<T>,
    token: CancellationToken,
}

impl<T> Subscription<T> {
    /// Next item, or `None` once the producer has finished. After
    /// cancellation only items already buffered are returned.
    pub async fn recv(&mut self) -> Option<T> {
        if self.token.is_cancelled() {
            return self.rx.try_recv().ok();
        }

        tokio::select! {
            biased;
            item = self.rx.recv() => item,
            _ = self.token.cancelled() => self.rx.try_recv().ok(),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token that cancels this subscription from elsewhere.
    pub fn cancel_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// A new feed/subscription pair sharing this subscription's token, for
    /// stages that forward or transform its items. Cancelling either
    /// subscription cancels both.
    pub fn linked<U>(&self, capacity: usize) -> (Feed<U>, Subscription<U>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Feed {
                tx,
                token: self.token.clone(),
            },
            Subscription {
                rx,
                token: self.token.clone(),
            },
        )
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

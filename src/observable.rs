//! Replay-latest observable values
//!
//! An `Observable` holds the latest value of a stream and pushes every new
//! value to all current subscribers, in production order. A new subscriber
//! first receives the latest value, then everything published afterwards.

use futures::stream::{self, Stream};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::warn;

const SUBSCRIBER_BUFFER: usize = 1024;

struct Inner<T> {
    latest: T,
    tx: broadcast::Sender<T>,
}

/// Single-producer, multi-consumer value with replay-latest semantics
pub struct Observable<T: Clone> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T: Clone> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + 'static> Observable<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _) = broadcast::channel(SUBSCRIBER_BUFFER);
        Self {
            inner: Arc::new(Mutex::new(Inner { latest: initial, tx })),
        }
    }

    /// Current value
    pub fn get(&self) -> T {
        self.inner.lock().latest.clone()
    }

    /// Publish a value unconditionally
    pub fn set(&self, value: T) {
        let mut inner = self.inner.lock();
        inner.latest = value.clone();
        // No receivers is not an error: late subscribers replay `latest`.
        let _ = inner.tx.send(value);
    }

    /// Subscribe; the first value received is the current one
    pub fn subscribe(&self) -> Subscription<T> {
        // Snapshot and receiver are taken under the same lock as `set`, so no
        // value can fall between them.
        let inner = self.inner.lock();
        Subscription {
            first: Some(inner.latest.clone()),
            rx: inner.tx.subscribe(),
        }
    }
}

impl<T: Clone + PartialEq + Send + 'static> Observable<T> {
    /// Publish only if the value differs from the current one.
    ///
    /// Returns whether subscribers were notified.
    pub fn set_if_changed(&self, value: T) -> bool {
        let mut inner = self.inner.lock();
        if inner.latest == value {
            return false;
        }
        inner.latest = value.clone();
        let _ = inner.tx.send(value);
        true
    }
}

/// Receiving half of an [`Observable`]
pub struct Subscription<T: Clone> {
    first: Option<T>,
    rx: broadcast::Receiver<T>,
}

impl<T: Clone + Send + 'static> Subscription<T> {
    /// Next value, or `None` once the observable is gone
    pub async fn recv(&mut self) -> Option<T> {
        if let Some(value) = self.first.take() {
            return Some(value);
        }

        loop {
            match self.rx.recv().await {
                Ok(value) => return Some(value),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Observable subscriber lagged, skipped {} values", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next value if one is already queued
    pub fn try_recv(&mut self) -> Option<T> {
        if let Some(value) = self.first.take() {
            return Some(value);
        }

        loop {
            match self.rx.try_recv() {
                Ok(value) => return Some(value),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!("Observable subscriber lagged, skipped {} values", skipped);
                }
                Err(_) => return None,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = T> {
        stream::unfold(self, |mut sub| async move {
            let value = sub.recv().await?;
            Some((value, sub))
        })
    }
}

//! Notification delivery pipeline.
//!
//! A [`NotificationPipeline`] is a single-slot buffer between the transport's
//! notification callback (producer) and a [`NotificationStream`] (consumer).
//! The slot holds at most one undelivered reading. A push while the slot is
//! full evicts the held reading first, so a consumer slower than the
//! notification rate only ever observes the most recent value. The producer
//! never blocks.

use futures::stream::Stream;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::signal::CompletionSignal;

struct Shared<R> {
    slot: Mutex<Option<R>>,
    notify: Notify,
    cancelled: CompletionSignal,
    dropped: AtomicU64,
}

/// Producer side of the pipeline.
pub struct NotificationPipeline<R> {
    shared: Arc<Shared<R>>,
}

impl<R> Clone for NotificationPipeline<R> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<R: Send + 'static> NotificationPipeline<R> {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(None),
                notify: Notify::new(),
                cancelled: CompletionSignal::new(),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Deliver a reading, evicting any undelivered one.
    ///
    /// Returns `false` if the pipeline has been cancelled and the reading was
    /// discarded.
    pub fn push(&self, reading: R) -> bool {
        if self.shared.cancelled.is_fired() {
            return false;
        }

        let evicted = self.shared.slot.lock().replace(reading).is_some();
        if evicted {
            let dropped = self.shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            trace!("Evicted undelivered reading ({} dropped so far)", dropped);
        }

        self.shared.notify.notify_one();
        true
    }

    /// Cancel the pipeline. Pending and future pulls yield end-of-stream.
    pub fn cancel(&self) {
        if self.shared.cancelled.fire() {
            self.shared.slot.lock().take();
            debug!("Notification pipeline cancelled");
        }
    }

    /// Check if the pipeline has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.is_fired()
    }

    /// Number of undelivered readings (0 or 1).
    pub fn len(&self) -> usize {
        usize::from(self.shared.slot.lock().is_some())
    }

    /// Check if no reading is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of readings evicted before delivery.
    pub fn dropped_count(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Create a consumer for this pipeline.
    pub fn stream(&self) -> NotificationStream<R> {
        NotificationStream {
            shared: self.shared.clone(),
        }
    }
}

impl<R: Send + 'static> Default for NotificationPipeline<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer side of the pipeline.
pub struct NotificationStream<R> {
    shared: Arc<Shared<R>>,
}

impl<R: Send + 'static> NotificationStream<R> {
    /// Wait for the next reading.
    ///
    /// Returns `None` once the pipeline is cancelled.
    pub async fn recv(&mut self) -> Option<R> {
        loop {
            if self.shared.cancelled.is_fired() {
                return None;
            }

            let taken = self.shared.slot.lock().take();
            if taken.is_some() {
                return taken;
            }

            tokio::select! {
                _ = self.shared.notify.notified() => {}
                _ = self.shared.cancelled.wait() => return None,
            }
        }
    }

    /// Take the waiting reading without blocking.
    pub fn try_recv(&mut self) -> Option<R> {
        if self.shared.cancelled.is_fired() {
            return None;
        }
        self.shared.slot.lock().take()
    }

    /// Check if the stream has ended.
    pub fn is_closed(&self) -> bool {
        self.shared.cancelled.is_fired()
    }

    /// Convert into a [`Stream`] of readings.
    pub fn into_stream(self) -> impl Stream<Item = R> + Send + 'static {
        futures::stream::unfold(self, |mut stream| async move {
            let reading = stream.recv().await?;
            Some((reading, stream))
        })
    }
}

impl<R> std::fmt::Debug for NotificationStream<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationStream")
            .field("closed", &self.shared.cancelled.is_fired())
            .finish()
    }
}

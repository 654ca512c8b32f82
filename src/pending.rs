//! FIFO registry of outstanding calls.
//!
//! The protocol carries no request identifiers, so the oldest registered
//! slot is always the one the next answer belongs to. Slots are
//! registered by the writer task in the order frames go out and are
//! fulfilled by the reader task in the order answers come in.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::backpressure::BackpressureGuard;
use crate::error::{PineError, Result};
use crate::protocol::Answer;

/// Completion slot for one call.
pub(crate) type Slot = oneshot::Sender<Result<Answer>>;

/// Caller-side handle for one submitted request.
///
/// Resolves exactly once: with the matching answer, or with a terminal
/// error if the connection dies first. Dropping it frees the call's
/// in-flight slot; the answer is still consumed from the stream.
#[must_use = "the answer is lost unless the call is awaited"]
#[derive(Debug)]
pub struct PendingCall {
    rx: oneshot::Receiver<Result<Answer>>,
    _permit: BackpressureGuard,
}

impl PendingCall {
    pub(crate) fn new(rx: oneshot::Receiver<Result<Answer>>, permit: BackpressureGuard) -> Self {
        Self {
            rx,
            _permit: permit,
        }
    }
}

impl Future for PendingCall {
    type Output = Result<Answer>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(PineError::ConnectionClosed)))
    }
}

#[derive(Default)]
struct Inner {
    slots: VecDeque<Slot>,
    closed: bool,
}

/// Ordered queue of completion slots shared by the writer and reader tasks.
///
/// The lock is only held for queue operations, never across I/O.
#[derive(Default)]
pub(crate) struct PendingRegistry {
    inner: Mutex<Inner>,
}

impl PendingRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave the queue half-updated.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a slot at the tail.
    ///
    /// Once the registry is closed the slot is failed immediately with
    /// `ConnectionClosed` and `false` is returned.
    pub(crate) fn register(&self, slot: Slot) -> bool {
        let mut inner = self.lock();
        if inner.closed {
            drop(inner);
            let _ = slot.send(Err(PineError::ConnectionClosed));
            return false;
        }
        inner.slots.push_back(slot);
        true
    }

    /// Resolve the oldest slot with `answer`.
    ///
    /// # Errors
    ///
    /// `ProtocolDesync` if nothing is pending.
    pub(crate) fn fulfill_oldest(&self, answer: Answer) -> Result<()> {
        let slot = self.lock().slots.pop_front();
        match slot {
            Some(slot) => {
                // The caller may have dropped its handle; the answer is still consumed.
                if slot.send(Ok(answer)).is_err() {
                    tracing::debug!("Answer delivered to an abandoned call");
                }
                Ok(())
            }
            None => Err(PineError::ProtocolDesync),
        }
    }

    /// Close the registry and fail every pending slot with a copy of `reason`.
    ///
    /// Returns the number of slots failed. Later `register` calls fail fast.
    pub(crate) fn close(&self, reason: &PineError) -> usize {
        let drained: Vec<Slot> = {
            let mut inner = self.lock();
            inner.closed = true;
            inner.slots.drain(..).collect()
        };

        let count = drained.len();
        for slot in drained {
            let _ = slot.send(Err(reason.fan_out()));
        }
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().slots.len()
    }

    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

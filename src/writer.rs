//! Dedicated writer task for outbound request frames.
//!
//! Callers never touch the socket. They hand encoded frames to the writer
//! task over an mpsc channel, and the task is the only code that writes to
//! the stream.
//!
//! # Architecture
//!
//! ```text
//! Caller 1 ─┐
//! Caller 2 ─┼─► mpsc::Sender<Submission> ─► Writer Task ─► Socket
//! Caller N ─┘                                   │
//!                                               └─► PendingRegistry (FIFO)
//! ```
//!
//! The channel order is the write order, and the write order is the order
//! answers are matched in. Slots are registered before their bytes are
//! written so an answer can never race ahead of its slot.

use std::io::IoSlice;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::backpressure::BackpressureController;
use crate::error::{PineError, Result};
use crate::pending::{PendingCall, PendingRegistry, Slot};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// A request frame together with the slot its answer goes to.
#[derive(Debug)]
pub(crate) struct Submission {
    pub frame: Bytes,
    pub slot: Slot,
}

/// Handle for submitting frames to the writer task.
///
/// This is cheaply cloneable and can be shared across tasks.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<Submission>,
    backpressure: BackpressureController,
    cancel: CancellationToken,
}

impl WriterHandle {
    pub(crate) fn new(
        tx: mpsc::Sender<Submission>,
        backpressure: BackpressureController,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            tx,
            backpressure,
            cancel,
        }
    }

    /// Queue an encoded frame and return the handle its answer arrives on.
    ///
    /// Waits while the in-flight limit is reached or the queue is full.
    /// A wait in progress ends with `ConnectionClosed` once the writer is
    /// cancelled.
    pub async fn submit(&self, frame: Bytes) -> Result<PendingCall> {
        let permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(PineError::ConnectionClosed),
            permit = self.backpressure.reserve() => permit?,
        };
        let (slot, rx) = oneshot::channel();

        self.tx
            .send(Submission { frame, slot })
            .await
            .map_err(|_| PineError::ConnectionClosed)?;

        Ok(PendingCall::new(rx, permit))
    }

    /// Queue an encoded frame without waiting.
    ///
    /// Returns `Err(BackpressureTimeout)` immediately if at capacity.
    pub fn try_submit(&self, frame: Bytes) -> Result<PendingCall> {
        let permit = self.backpressure.try_reserve()?;
        let (slot, rx) = oneshot::channel();

        self.tx
            .try_send(Submission { frame, slot })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => PineError::BackpressureTimeout,
                mpsc::error::TrySendError::Closed(_) => PineError::ConnectionClosed,
            })?;

        Ok(PendingCall::new(rx, permit))
    }

    /// Number of submitted calls still waiting for their answer.
    #[inline]
    pub fn in_flight(&self) -> usize {
        self.backpressure.in_flight()
    }

    #[inline]
    pub fn is_backpressure_active(&self) -> bool {
        self.backpressure.is_active()
    }

    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Main writer loop - receives submissions and writes them to the socket.
///
/// Stops when every `WriterHandle` is gone or `cancel` fires. A batch
/// already taken off the channel is written in full before cancellation is
/// checked again. Submissions still queued on exit are failed with
/// `ConnectionClosed`; slots already registered are left to whoever
/// closes the registry.
pub(crate) async fn writer_loop<W>(
    mut rx: mpsc::Receiver<Submission>,
    mut writer: W,
    registry: Arc<PendingRegistry>,
    cancel: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    tracing::debug!("Writer loop started");

    let result = async {
        loop {
            let first = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                next = rx.recv() => match next {
                    Some(s) => s,
                    None => return Ok(()),
                },
            };

            // Collect additional ready submissions (non-blocking)
            let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
            batch.push(first);
            while batch.len() < MAX_BATCH_SIZE {
                match rx.try_recv() {
                    Ok(s) => batch.push(s),
                    Err(_) => break,
                }
            }

            let mut frames = Vec::with_capacity(batch.len());
            for Submission { frame, slot } in batch {
                if registry.register(slot) {
                    frames.push(frame);
                }
            }
            if frames.is_empty() {
                // Registry closed under us; nothing may be written any more.
                return Ok(());
            }

            // A taken batch is always written whole; cancellation is only
            // observed between batches.
            write_batch(&mut writer, &frames).await?;
        }
    }
    .await;

    rx.close();
    let mut dropped = 0usize;
    while let Ok(Submission { slot, .. }) = rx.try_recv() {
        let _ = slot.send(Err(PineError::ConnectionClosed));
        dropped += 1;
    }
    if dropped > 0 {
        tracing::debug!("Writer loop failed {} queued submissions", dropped);
    }

    tracing::debug!("Writer loop exited");
    result
}

/// Write a batch of frames using scatter/gather I/O (write_vectored).
async fn write_batch<W>(writer: &mut W, batch: &[Bytes]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if batch.is_empty() {
        return Ok(());
    }

    let total_size: usize = batch.iter().map(Bytes::len).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(PineError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build IoSlice array for the data left after `skip_bytes` were written.
fn build_remaining_slices(batch: &[Bytes], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len());
    let mut start = 0;

    for frame in batch {
        let end = start + frame.len();
        if skip_bytes < end && !frame.is_empty() {
            let offset = skip_bytes.saturating_sub(start);
            slices.push(IoSlice::new(&frame[offset..]));
        }
        start = end;
    }

    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_batched_write, Command};
    use std::io::Cursor;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt};

    fn spawn_test_writer<W>(
        writer: W,
        capacity: usize,
    ) -> (
        WriterHandle,
        Arc<PendingRegistry>,
        CancellationToken,
        tokio::task::JoinHandle<Result<()>>,
    )
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity);
        let registry = Arc::new(PendingRegistry::new());
        let cancel = CancellationToken::new();
        let handle = WriterHandle::new(tx, BackpressureController::new(1024), cancel.clone());
        let task = tokio::spawn(writer_loop(rx, writer, registry.clone(), cancel.clone()));
        (handle, registry, cancel, task)
    }

    #[tokio::test]
    async fn test_submit_writes_frame_and_registers_slot() {
        let (client, mut server) = duplex(4096);
        let (handle, registry, _cancel, _task) = spawn_test_writer(client, 16);

        let frame = Command::version().encode();
        let _call = handle.submit(frame.clone()).await.unwrap();

        let mut buf = vec![0u8; frame.len()];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf[..], &frame[..]);
        assert_eq!(registry.len(), 1);
        assert_eq!(handle.in_flight(), 1);
    }

    #[tokio::test]
    async fn test_frames_written_in_submission_order() {
        let (client, mut server) = duplex(64 * 1024);
        let (handle, registry, _cancel, _task) = spawn_test_writer(client, 256);

        let mut expected = Vec::new();
        let mut calls = Vec::new();
        for addr in 0..100u32 {
            let frame = Command::read(4, addr).unwrap().encode();
            expected.extend_from_slice(&frame);
            calls.push(handle.submit(frame).await.unwrap());
        }

        let mut buf = vec![0u8; expected.len()];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, expected);
        assert_eq!(registry.len(), 100);
    }

    #[tokio::test]
    async fn test_writer_exits_when_handles_dropped() {
        let (client, _server) = duplex(4096);
        let (handle, _registry, _cancel, task) = spawn_test_writer(client, 16);

        drop(handle);

        let result = task.await.unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_fails_queued_submissions() {
        // Nobody reads the server side.
        let (client, _server) = duplex(8);
        let (handle, registry, cancel, task) = spawn_test_writer(client, 16);

        let first = handle.submit(Command::version().encode()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        cancel.cancel();
        registry.close(&PineError::ConnectionClosed);
        let exited = tokio::time::timeout(Duration::from_secs(1), task).await;
        assert!(exited.is_ok());

        assert!(matches!(first.await, Err(PineError::ConnectionClosed)));
        assert!(handle.is_closed());
        assert!(matches!(
            handle.submit(Command::status().encode()).await,
            Err(PineError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_cancel_finishes_taken_batch() {
        let (client, mut server) = duplex(16);
        let (handle, registry, cancel, task) = spawn_test_writer(client, 16);

        let data: Vec<u8> = (0..1000u32).map(|i| i as u8).collect();
        let frame = encode_batched_write(0x1000, &data);
        let _call = handle.submit(frame.clone()).await.unwrap();

        // The writer has taken the frame and is stalled on the full pipe.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(registry.len(), 1);
        cancel.cancel();

        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();
        assert_eq!(received.len(), frame.len());
        assert_eq!(&received[..], &frame[..]);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_cancel_releases_submitter_waiting_for_slot() {
        let (tx, _rx) = mpsc::channel::<Submission>(10);
        let cancel = CancellationToken::new();
        let handle = WriterHandle::new(
            tx,
            BackpressureController::with_timeout(1, Duration::from_secs(30)),
            cancel.clone(),
        );

        let _held = handle.try_submit(Command::status().encode()).unwrap();
        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.submit(Command::status().encode()).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiting submitter must be released by cancellation")
            .unwrap();
        assert!(matches!(result, Err(PineError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_try_submit_at_capacity() {
        let (tx, _rx) = mpsc::channel::<Submission>(10);
        let handle = WriterHandle::new(tx, BackpressureController::new(1), CancellationToken::new());

        let _held = handle.try_submit(Command::status().encode()).unwrap();
        let result = handle.try_submit(Command::status().encode());
        assert!(matches!(result, Err(PineError::BackpressureTimeout)));
    }

    #[test]
    fn test_build_remaining_slices() {
        let batch = vec![
            Bytes::from_static(b"hello"),
            Bytes::new(),
            Bytes::from_static(b"world"),
        ];

        let all = build_remaining_slices(&batch, 0);
        assert_eq!(all.len(), 2);

        let partial = build_remaining_slices(&batch, 3);
        assert_eq!(partial.len(), 2);
        assert_eq!(&*partial[0], b"lo");

        let second_only = build_remaining_slices(&batch, 5);
        assert_eq!(second_only.len(), 1);
        assert_eq!(&*second_only[0], b"world");

        assert!(build_remaining_slices(&batch, 10).is_empty());
    }

    #[tokio::test]
    async fn test_write_batch_multiple() {
        let mut buf = Cursor::new(Vec::new());
        let batch: Vec<Bytes> = (0..5).map(|_| Command::title().encode()).collect();

        write_batch(&mut buf, &batch).await.unwrap();

        assert_eq!(buf.into_inner().len(), 5 * 5);
    }
}

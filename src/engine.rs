//! Request pipelining engine.
//!
//! The [`Engine`] owns one ordered byte stream and runs two tasks against it:
//! 1. Writer task: drains the submission queue and writes frames
//! 2. Reader task: reads answers and fulfills the oldest pending call
//!
//! Replies carry no request identifier, so answers are matched to calls
//! purely by order. Whatever order submissions enter the queue is the
//! order their answers are delivered in.
//!
//! # Example
//!
//! ```ignore
//! use pine_client::engine::{Engine, EngineConfig};
//! use pine_client::protocol::Command;
//!
//! let stream = tokio::net::TcpStream::connect(("127.0.0.1", 28011)).await?;
//! let engine = Engine::new(stream, EngineConfig::default());
//!
//! let answer = engine.command(&Command::version()).await?;
//! engine.shutdown().await;
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backpressure::{BackpressureController, DEFAULT_MAX_IN_FLIGHT, DEFAULT_TIMEOUT};
use crate::error::{PineError, Result};
use crate::pending::{PendingCall, PendingRegistry};
use crate::protocol::{
    encode_batched_read, encode_batched_write, Answer, Command, FrameBuffer, ResultCode,
    DEFAULT_MAX_ANSWER_SIZE, MIN_FRAME_SIZE,
};
use crate::writer::{writer_loop, WriterHandle, DEFAULT_CHANNEL_CAPACITY};

/// Size of the reader's socket buffer.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Lifecycle of an [`Engine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineState {
    /// Constructed, tasks not started yet.
    Idle = 0,
    /// Both tasks running, submissions accepted.
    Running = 1,
    /// Shutdown requested, tasks winding down.
    Draining = 2,
    /// Tasks gone, every call resolved.
    Closed = 3,
}

impl EngineState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => EngineState::Idle,
            1 => EngineState::Running,
            2 => EngineState::Draining,
            _ => EngineState::Closed,
        }
    }
}

/// Tuning knobs for an [`Engine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Capacity of the submission queue. Submitters wait when it is full.
    pub channel_capacity: usize,
    /// Maximum calls submitted but not yet answered.
    pub max_in_flight: usize,
    /// How long a submitter waits for a free in-flight slot.
    pub backpressure_timeout: Duration,
    /// Largest accepted answer frame, including its length prefix.
    pub max_answer_size: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            backpressure_timeout: DEFAULT_TIMEOUT,
            max_answer_size: DEFAULT_MAX_ANSWER_SIZE,
        }
    }
}

/// Pipelined request/response engine over one connection.
///
/// All methods take `&self`; share the engine across tasks with `Arc`.
pub struct Engine {
    writer: WriterHandle,
    registry: Arc<PendingRegistry>,
    cancel: CancellationToken,
    state: Arc<AtomicU8>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    max_answer_size: u32,
}

impl Engine {
    /// Start an engine on `stream`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<S>(stream: S, config: EngineConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        Self::from_split(read_half, write_half, config)
    }

    /// Start an engine on separate read and write halves of one connection.
    pub fn from_split<R, W>(reader: R, writer: W, config: EngineConfig) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let backpressure =
            BackpressureController::with_timeout(config.max_in_flight, config.backpressure_timeout);
        let registry = Arc::new(PendingRegistry::new());
        let cancel = CancellationToken::new();
        let state = Arc::new(AtomicU8::new(EngineState::Idle as u8));

        let writer_task = {
            let registry = registry.clone();
            let cancel = cancel.clone();
            let state = state.clone();
            tokio::spawn(async move {
                if let Err(e) = writer_loop(rx, writer, registry.clone(), cancel.clone()).await {
                    tracing::error!("Writer loop error: {}", e);
                    fail_connection(&registry, &cancel, &state, &e);
                }
            })
        };

        let reader_task = {
            let registry = registry.clone();
            let cancel = cancel.clone();
            let state = state.clone();
            let max_answer_size = config.max_answer_size;
            tokio::spawn(async move {
                match read_loop(reader, &registry, &cancel, max_answer_size).await {
                    Ok(()) => {}
                    Err(PineError::ConnectionClosed) => {
                        tracing::debug!("Connection closed by peer");
                        fail_connection(&registry, &cancel, &state, &PineError::ConnectionClosed);
                    }
                    Err(e) => {
                        tracing::error!("Read loop error: {}", e);
                        fail_connection(&registry, &cancel, &state, &e);
                    }
                }
            })
        };

        // A task may already have failed the connection; don't resurrect it.
        let _ = state.compare_exchange(
            EngineState::Idle as u8,
            EngineState::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );

        Self {
            writer: WriterHandle::new(tx, backpressure, cancel.clone()),
            registry,
            cancel,
            state,
            tasks: Mutex::new(vec![writer_task, reader_task]),
            max_answer_size: config.max_answer_size,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether submissions are still accepted.
    pub fn is_running(&self) -> bool {
        self.state() == EngineState::Running
    }

    /// Number of calls submitted but not yet answered.
    pub fn in_flight(&self) -> usize {
        self.writer.in_flight()
    }

    /// Number of calls whose frames are written and whose answers are awaited.
    pub fn awaiting_answer(&self) -> usize {
        self.registry.len()
    }

    /// True while the in-flight limit is reached and `submit` would wait.
    pub fn is_saturated(&self) -> bool {
        self.writer.is_backpressure_active()
    }

    /// Queue an encoded frame; the returned handle resolves with its answer.
    ///
    /// The order in which concurrent callers get through this method is the
    /// order their answers are matched in.
    pub async fn submit(&self, frame: Bytes) -> Result<PendingCall> {
        if !self.is_running() {
            return Err(PineError::ConnectionClosed);
        }
        self.writer.submit(frame).await
    }

    /// Queue an encoded frame without waiting for queue or in-flight space.
    pub fn try_submit(&self, frame: Bytes) -> Result<PendingCall> {
        if !self.is_running() {
            return Err(PineError::ConnectionClosed);
        }
        self.writer.try_submit(frame)
    }

    /// Submit an encoded frame and wait for its answer.
    pub async fn request(&self, frame: Bytes) -> Result<Answer> {
        self.submit(frame).await?.await
    }

    /// Send one command and wait for its answer.
    ///
    /// Non-OK result codes are returned as data, not as errors.
    pub async fn command(&self, command: &Command) -> Result<Answer> {
        self.request(command.encode()).await
    }

    /// Read `len` bytes starting at `address` in one batched frame.
    ///
    /// The answer argument holds the data, zero-padded to a multiple of 4.
    /// A zero-length read is answered locally without a round trip.
    ///
    /// # Errors
    ///
    /// `RequestTooLarge` without sending anything if the answer could not
    /// fit in `max_answer_size`; the connection stays usable.
    pub async fn batched_read(&self, address: u32, len: usize) -> Result<Answer> {
        if len == 0 {
            return Ok(Answer::new(ResultCode::Ok, Bytes::new()));
        }
        let answer_size = MIN_FRAME_SIZE.saturating_add(len);
        if answer_size > self.max_answer_size as usize {
            return Err(PineError::RequestTooLarge(format!(
                "read of {} bytes needs a {} byte answer, limit is {}",
                len, answer_size, self.max_answer_size
            )));
        }
        self.request(encode_batched_read(address, len)).await
    }

    /// Write `data` starting at `address` in one batched frame.
    ///
    /// An empty write is answered locally without a round trip.
    pub async fn batched_write(&self, address: u32, data: &[u8]) -> Result<Answer> {
        if data.is_empty() {
            return Ok(Answer::new(ResultCode::Ok, Bytes::new()));
        }
        self.request(encode_batched_write(address, data)).await
    }

    /// Wait until both tasks have been told to stop, by `shutdown` or by a
    /// connection failure.
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }

    /// Stop both tasks and fail every unresolved call with `ConnectionClosed`.
    ///
    /// Calls still queued or already written are failed; the server may or
    /// may not have executed the latter. Safe to call more than once.
    pub async fn shutdown(&self) {
        let _ = self.state.compare_exchange(
            EngineState::Running as u8,
            EngineState::Draining as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        self.cancel.cancel();

        let tasks: Vec<JoinHandle<()>> = {
            let mut guard = self.tasks.lock().unwrap_or_else(|p| p.into_inner());
            guard.drain(..).collect()
        };
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!("Engine task ended abnormally: {}", e);
            }
        }

        let failed = self.registry.close(&PineError::ConnectionClosed);
        if failed > 0 {
            tracing::debug!("Shutdown failed {} pending calls", failed);
        }
        self.state
            .store(EngineState::Closed as u8, Ordering::Release);
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.registry.close(&PineError::ConnectionClosed);
    }
}

/// Tear the connection down after a fatal error.
fn fail_connection(
    registry: &PendingRegistry,
    cancel: &CancellationToken,
    state: &AtomicU8,
    error: &PineError,
) {
    state.store(EngineState::Closed as u8, Ordering::Release);
    cancel.cancel();
    let failed = registry.close(error);
    if failed > 0 {
        tracing::warn!("Failed {} pending calls: {}", failed, error);
    }
}

/// Main read loop - reads answers and fulfills pending calls in order.
///
/// Returns `Ok(())` only when cancelled. End of stream is reported as
/// `ConnectionClosed`, or `Framing` if it cuts a frame short.
async fn read_loop<R>(
    mut reader: R,
    registry: &PendingRegistry,
    cancel: &CancellationToken,
    max_answer_size: u32,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    tracing::debug!("Read loop started");

    let mut frame_buffer = FrameBuffer::with_max_frame(max_answer_size);
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("Read loop cancelled");
                return Ok(());
            }
            read = reader.read(&mut buf) => read?,
        };

        if n == 0 {
            if frame_buffer.is_mid_frame() {
                return Err(PineError::Framing(format!(
                    "stream ended with {} bytes of an unfinished answer",
                    frame_buffer.len()
                )));
            }
            return Err(PineError::ConnectionClosed);
        }

        for answer in frame_buffer.push(&buf[..n])? {
            registry.fulfill_oldest(answer)?;
        }
    }
}

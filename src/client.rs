//! Client builder and typed memory-access façade.
//!
//! The [`ClientBuilder`] provides a fluent API for configuring the
//! connection. The [`PineClient`] turns typed reads, writes and control
//! commands into frames and runs them through the pipelining [`Engine`].
//!
//! # Example
//!
//! ```ignore
//! use pine_client::PineClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = PineClient::builder().port(28011).connect().await?;
//!
//!     println!("emulator: {}", client.version().await?);
//!     let lives: u32 = client.read(0x0020_1000).await?;
//!     client.write(0x0020_1000, lives + 1).await?;
//!
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::backpressure::{DEFAULT_MAX_IN_FLIGHT, DEFAULT_TIMEOUT};
use crate::codec::{decode_array, encode_array, text, Scalar};
use crate::engine::{Engine, EngineConfig};
use crate::error::{PineError, Result};
use crate::protocol::{Answer, Command, EmulatorStatus, DEFAULT_MAX_ANSWER_SIZE};
use crate::transport::{self, DEFAULT_HOST, DEFAULT_PORT};
use crate::writer::DEFAULT_CHANNEL_CAPACITY;

/// Default number of bytes scanned by string reads.
pub const DEFAULT_STRING_LENGTH: usize = 512;

/// Connection settings.
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use pine_client::ClientConfig;
///
/// let config = ClientConfig::from_json(r#"{ "port": 28012 }"#).unwrap();
/// assert_eq!(config.port, 28012);
/// assert_eq!(config.host, "127.0.0.1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Submission queue capacity.
    pub channel_capacity: usize,
    /// Maximum unanswered calls.
    pub max_in_flight: usize,
    /// Milliseconds a submitter waits for an in-flight slot.
    pub backpressure_timeout_ms: u64,
    /// Largest accepted answer frame in bytes.
    pub max_answer_size: u32,
    /// Drop bytes already buffered on the socket before starting.
    pub discard_stale: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            backpressure_timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
            max_answer_size: DEFAULT_MAX_ANSWER_SIZE,
            discard_stale: true,
        }
    }
}

impl ClientConfig {
    /// Parse a JSON config document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            channel_capacity: self.channel_capacity,
            max_in_flight: self.max_in_flight,
            backpressure_timeout: Duration::from_millis(self.backpressure_timeout_ms),
            max_answer_size: self.max_answer_size,
        }
    }
}

/// Builder for configuring and connecting a [`PineClient`].
#[derive(Debug, Clone, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    /// Create a new client builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Default: 127.0.0.1
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Default: 28011
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the submission queue capacity.
    ///
    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Set the maximum number of unanswered calls.
    ///
    /// Default: 1024
    pub fn max_in_flight(mut self, limit: usize) -> Self {
        self.config.max_in_flight = limit;
        self
    }

    /// Set how long a submitter waits for an in-flight slot.
    ///
    /// Default: 5 seconds
    pub fn backpressure_timeout(mut self, timeout: Duration) -> Self {
        self.config.backpressure_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Default: 650 000 bytes
    pub fn max_answer_size(mut self, size: u32) -> Self {
        self.config.max_answer_size = size;
        self
    }

    /// Whether to drop bytes already waiting on a fresh connection.
    ///
    /// Default: true
    pub fn discard_stale(mut self, enabled: bool) -> Self {
        self.config.discard_stale = enabled;
        self
    }

    /// Open a TCP connection and start the engine.
    pub async fn connect(self) -> Result<PineClient> {
        let stream = transport::connect(&self.config.host, self.config.port).await?;
        if self.config.discard_stale {
            transport::discard_stale(&stream)?;
        }
        let (reader, writer) = stream.into_split();
        let engine = Engine::from_split(reader, writer, self.config.engine_config());
        Ok(PineClient::from_engine(engine))
    }

    /// Start the engine on an already-connected stream.
    pub fn attach<S>(self, stream: S) -> PineClient
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        PineClient::from_engine(Engine::new(stream, self.config.engine_config()))
    }
}

/// Typed access to a PINE server.
///
/// Cheap to clone; clones share one connection. Calls from any number of
/// tasks are pipelined over it.
#[derive(Clone)]
pub struct PineClient {
    engine: Arc<Engine>,
}

impl PineClient {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Connect to the default endpoint with default settings.
    pub async fn connect_default() -> Result<Self> {
        ClientBuilder::new().connect().await
    }

    pub fn from_engine(engine: Engine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    /// The underlying engine, for callers that want result codes as data.
    pub fn raw(&self) -> &Engine {
        &self.engine
    }

    /// Read `len` bytes. Reply padding is stripped.
    pub async fn read_bytes(&self, address: u64, len: usize) -> Result<Bytes> {
        let answer = self
            .engine
            .batched_read(truncate(address), len)
            .await?
            .into_ok()?;

        if answer.argument.len() < len {
            return Err(PineError::InvalidReply(format!(
                "read of {} bytes answered with {}",
                len,
                answer.argument.len()
            )));
        }
        Ok(answer.argument.slice(..len))
    }

    pub async fn write_bytes(&self, address: u64, data: &[u8]) -> Result<()> {
        self.engine
            .batched_write(truncate(address), data)
            .await?
            .into_ok()
            .map(drop)
    }

    pub async fn read<T: Scalar>(&self, address: u64) -> Result<T> {
        let bytes = self.read_bytes(address, T::SIZE).await?;
        T::from_wire(&bytes).ok_or_else(|| short_reply(T::SIZE, bytes.len()))
    }

    pub async fn read_array<T: Scalar>(&self, address: u64, count: usize) -> Result<Vec<T>> {
        let len = count.checked_mul(T::SIZE).ok_or_else(|| {
            PineError::RequestTooLarge(format!(
                "{} elements of {} bytes overflow the address space",
                count,
                T::SIZE
            ))
        })?;
        let bytes = self.read_bytes(address, len).await?;
        decode_array(&bytes, count).ok_or_else(|| short_reply(len, bytes.len()))
    }

    pub async fn write<T: Scalar>(&self, address: u64, value: T) -> Result<()> {
        self.write_bytes(address, &value.to_wire()).await
    }

    pub async fn write_array<T: Scalar>(&self, address: u64, values: &[T]) -> Result<()> {
        self.write_bytes(address, &encode_array(values)).await
    }

    /// Read up to `max_len` bytes and return the text before the first NUL.
    pub async fn read_string(&self, address: u64, max_len: usize) -> Result<String> {
        let bytes = self.read_bytes(address, max_len).await?;
        Ok(text::decode_c_string(&bytes))
    }

    /// Read NUL-separated strings from a `max_len` byte window.
    pub async fn read_string_array(&self, address: u64, max_len: usize) -> Result<Vec<String>> {
        let bytes = self.read_bytes(address, max_len).await?;
        Ok(text::decode_c_string_array(&bytes))
    }

    /// Write `value` followed by a NUL terminator.
    pub async fn write_string(&self, address: u64, value: &str) -> Result<()> {
        self.write_bytes(address, &text::encode_c_string(value))
            .await
    }

    /// Write each entry followed by its NUL terminator, back to back.
    pub async fn write_string_array<S: AsRef<str>>(&self, address: u64, values: &[S]) -> Result<()> {
        self.write_bytes(address, &text::encode_c_string_array(values))
            .await
    }

    /// Emulator version string.
    pub async fn version(&self) -> Result<String> {
        self.string_command(Command::version()).await
    }

    /// Title of the running game.
    pub async fn title(&self) -> Result<String> {
        self.string_command(Command::title()).await
    }

    /// Serial / product id of the running game.
    pub async fn id(&self) -> Result<String> {
        self.string_command(Command::id()).await
    }

    /// Disc UUID of the running game.
    pub async fn uuid(&self) -> Result<String> {
        self.string_command(Command::uuid()).await
    }

    /// Version of the running game.
    pub async fn game_version(&self) -> Result<String> {
        self.string_command(Command::game_version()).await
    }

    pub async fn status(&self) -> Result<EmulatorStatus> {
        let answer = self.ok_command(Command::status()).await?;
        u32::from_wire(&answer.argument)
            .map(EmulatorStatus::from)
            .ok_or_else(|| short_reply(4, answer.argument.len()))
    }

    pub async fn save_state(&self, slot: u8) -> Result<()> {
        self.ok_command(Command::save_state(slot)).await.map(drop)
    }

    pub async fn load_state(&self, slot: u8) -> Result<()> {
        self.ok_command(Command::load_state(slot)).await.map(drop)
    }

    /// Stop the connection; outstanding calls fail with `ConnectionClosed`.
    pub async fn shutdown(&self) {
        self.engine.shutdown().await;
    }

    async fn ok_command(&self, command: Command) -> Result<Answer> {
        self.engine.command(&command).await?.into_ok()
    }

    async fn string_command(&self, command: Command) -> Result<String> {
        let answer = self.ok_command(command).await?;
        text::decode_sized_string(&answer.argument)
    }
}

/// Addresses are 32-bit on the wire; wider values are truncated.
#[inline]
fn truncate(address: u64) -> u32 {
    address as u32
}

fn short_reply(expected: usize, got: usize) -> PineError {
    PineError::InvalidReply(format!("expected {expected} bytes, got {got}"))
}

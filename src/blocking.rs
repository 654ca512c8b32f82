//! Synchronous wrapper around [`PineClient`](crate::PineClient).
//!
//! Owns a small private tokio runtime; the engine's tasks keep running on
//! it between calls. Do not use from inside another async runtime.
//!
//! ```ignore
//! use pine_client::blocking::PineClient;
//!
//! let client = PineClient::connect(pine_client::ClientBuilder::new())?;
//! let frame: u32 = client.read(0x0020_0000)?;
//! ```

use bytes::Bytes;
use tokio::runtime::Runtime;

use crate::client::{ClientBuilder, PineClient as AsyncClient};
use crate::codec::Scalar;
use crate::engine::Engine;
use crate::error::Result;
use crate::protocol::EmulatorStatus;

/// Blocking PINE client.
pub struct PineClient {
    inner: AsyncClient,
    runtime: Runtime,
}

impl PineClient {
    /// Connect using the given builder's settings.
    pub fn connect(builder: ClientBuilder) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("pine-client")
            .enable_io()
            .enable_time()
            .build()?;
        let inner = runtime.block_on(builder.connect())?;
        Ok(Self { inner, runtime })
    }

    /// Connect to the default endpoint with default settings.
    pub fn connect_default() -> Result<Self> {
        Self::connect(ClientBuilder::new())
    }

    /// The async client sharing this connection.
    pub fn as_async(&self) -> &AsyncClient {
        &self.inner
    }

    pub fn raw(&self) -> &Engine {
        self.inner.raw()
    }

    pub fn read_bytes(&self, address: u64, len: usize) -> Result<Bytes> {
        self.runtime.block_on(self.inner.read_bytes(address, len))
    }

    pub fn write_bytes(&self, address: u64, data: &[u8]) -> Result<()> {
        self.runtime.block_on(self.inner.write_bytes(address, data))
    }

    pub fn read<T: Scalar>(&self, address: u64) -> Result<T> {
        self.runtime.block_on(self.inner.read(address))
    }

    pub fn read_array<T: Scalar>(&self, address: u64, count: usize) -> Result<Vec<T>> {
        self.runtime.block_on(self.inner.read_array(address, count))
    }

    pub fn write<T: Scalar>(&self, address: u64, value: T) -> Result<()> {
        self.runtime.block_on(self.inner.write(address, value))
    }

    pub fn write_array<T: Scalar>(&self, address: u64, values: &[T]) -> Result<()> {
        self.runtime.block_on(self.inner.write_array(address, values))
    }

    pub fn read_string(&self, address: u64, max_len: usize) -> Result<String> {
        self.runtime.block_on(self.inner.read_string(address, max_len))
    }

    pub fn read_string_array(&self, address: u64, max_len: usize) -> Result<Vec<String>> {
        self.runtime
            .block_on(self.inner.read_string_array(address, max_len))
    }

    pub fn write_string(&self, address: u64, value: &str) -> Result<()> {
        self.runtime.block_on(self.inner.write_string(address, value))
    }

    pub fn write_string_array<S: AsRef<str>>(&self, address: u64, values: &[S]) -> Result<()> {
        self.runtime
            .block_on(self.inner.write_string_array(address, values))
    }

    pub fn version(&self) -> Result<String> {
        self.runtime.block_on(self.inner.version())
    }

    pub fn title(&self) -> Result<String> {
        self.runtime.block_on(self.inner.title())
    }

    pub fn id(&self) -> Result<String> {
        self.runtime.block_on(self.inner.id())
    }

    pub fn uuid(&self) -> Result<String> {
        self.runtime.block_on(self.inner.uuid())
    }

    pub fn game_version(&self) -> Result<String> {
        self.runtime.block_on(self.inner.game_version())
    }

    pub fn status(&self) -> Result<EmulatorStatus> {
        self.runtime.block_on(self.inner.status())
    }

    pub fn save_state(&self, slot: u8) -> Result<()> {
        self.runtime.block_on(self.inner.save_state(slot))
    }

    pub fn load_state(&self, slot: u8) -> Result<()> {
        self.runtime.block_on(self.inner.load_state(slot))
    }

    /// Stop the connection and wait for both tasks to finish.
    pub fn shutdown(&self) {
        self.runtime.block_on(self.inner.shutdown());
    }
}

impl Drop for PineClient {
    fn drop(&mut self) {
        self.runtime.block_on(self.inner.shutdown());
    }
}

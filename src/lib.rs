//! # pine-client
//!
//! Rust client for the PINE protocol, used to inspect and modify the
//! memory of a running emulator over a local TCP socket.
//!
//! ## Architecture
//!
//! - **Protocol**: frame encoding, greedy 8/4/2/1 batching of arbitrary
//!   length transfers, answer decoding
//! - **Engine**: one writer task and one reader task per connection;
//!   answers are matched to requests strictly by order, since the protocol
//!   carries no request identifiers
//! - **Client**: typed reads/writes, strings and control commands on top
//!   of the engine, plus a [`blocking`] variant
//!
//! ## Example
//!
//! ```ignore
//! use pine_client::PineClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), pine_client::PineError> {
//!     let client = PineClient::connect_default().await?;
//!     let value: u32 = client.read(0x0010_0000).await?;
//!     client.write(0x0010_0000, value ^ 1).await?;
//!     Ok(())
//! }
//! ```

pub mod blocking;
pub mod codec;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod transport;

mod backpressure;
mod client;
mod pending;
mod writer;

pub use client::{ClientBuilder, ClientConfig, PineClient, DEFAULT_STRING_LENGTH};
pub use engine::{Engine, EngineConfig, EngineState};
pub use error::{PineError, Result};
pub use pending::PendingCall;
pub use protocol::{Answer, Command, EmulatorStatus, OpCode, ResultCode};

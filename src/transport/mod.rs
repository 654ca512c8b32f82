//! Transport module - establishing the byte stream the engine runs on.
//!
//! PINE servers listen on a loopback TCP port. The engine itself only needs
//! an ordered, reliable `AsyncRead + AsyncWrite`; this module opens one.

mod tcp;

pub use tcp::{connect, discard_stale, DEFAULT_HOST, DEFAULT_PORT};

//! Codec module - marshalling between Rust values and emulator memory bytes.
//!
//! - [`Scalar`] - fixed-width little-endian values (integers, floats, bool)
//! - [`text`] helpers - NUL-terminated strings and string replies
//!
//! Codecs are plain functions and a marker trait rather than trait objects,
//! so value sizes are known at compile time.

mod scalar;
pub mod text;

pub use scalar::{decode_array, encode_array, Scalar};

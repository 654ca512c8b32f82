//! Wire format encoding and decoding.
//!
//! Every frame starts with a little-endian length that counts itself:
//! ```text
//! request:  ┌──────────┬────────┬────────────────────┐
//!           │ Length   │ OpCode │ Argument           │
//!           │ u32 LE   │ 1 byte │ Length - 5 bytes   │
//!           └──────────┴────────┴────────────────────┘
//! answer:   ┌──────────┬────────┬────────────────────┐
//!           │ Length   │ Result │ Argument           │
//!           │ u32 LE   │ 1 byte │ Length - 5 bytes   │
//!           └──────────┴────────┴────────────────────┘
//! ```
//!
//! Decoded answer arguments are zero-padded up to a multiple of 4 bytes.

use bytes::{BufMut, Bytes, BytesMut};

use super::opcode::{OpCode, ResultCode};
use crate::error::{PineError, Result};

/// Size of the length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Size of the opcode / result-code byte.
pub const OPCODE_SIZE: usize = 1;

/// Size of an address on the wire.
pub const ADDRESS_SIZE: usize = 4;

/// Smallest valid length prefix (prefix + opcode/result byte).
pub const MIN_FRAME_SIZE: usize = LENGTH_PREFIX_SIZE + OPCODE_SIZE;

/// Default upper bound for an inbound frame, matching the emulator's IPC buffer.
pub const DEFAULT_MAX_ANSWER_SIZE: u32 = 650_000;

/// A single request. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub opcode: OpCode,
    pub address: Option<u32>,
    pub payload: Bytes,
}

impl Command {
    /// Build a command with no address and no payload.
    pub fn new(opcode: OpCode) -> Self {
        Self {
            opcode,
            address: None,
            payload: Bytes::new(),
        }
    }

    /// Attach a 32-bit address.
    pub fn with_address(mut self, address: u32) -> Self {
        self.address = Some(address);
        self
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Single scalar read of `width` bytes. Returns `None` for widths other
    /// than 1, 2, 4 or 8.
    pub fn read(width: usize, address: u32) -> Option<Self> {
        OpCode::read_for(width).map(|op| Self::new(op).with_address(address))
    }

    /// Single scalar write; the opcode is picked from `data.len()`.
    pub fn write(address: u32, data: &[u8]) -> Option<Self> {
        OpCode::write_for(data.len()).map(|op| {
            Self::new(op)
                .with_address(address)
                .with_payload(Bytes::copy_from_slice(data))
        })
    }

    pub fn version() -> Self {
        Self::new(OpCode::Version)
    }

    pub fn save_state(slot: u8) -> Self {
        Self::new(OpCode::SaveState).with_payload(vec![slot])
    }

    pub fn load_state(slot: u8) -> Self {
        Self::new(OpCode::LoadState).with_payload(vec![slot])
    }

    pub fn title() -> Self {
        Self::new(OpCode::Title)
    }

    pub fn id() -> Self {
        Self::new(OpCode::Id)
    }

    pub fn uuid() -> Self {
        Self::new(OpCode::Uuid)
    }

    pub fn game_version() -> Self {
        Self::new(OpCode::GameVersion)
    }

    pub fn status() -> Self {
        Self::new(OpCode::Status)
    }

    /// Argument bytes: the address (if any) followed by the payload.
    pub fn argument(&self) -> Bytes {
        match self.address {
            None => self.payload.clone(),
            Some(address) => {
                let mut buf = BytesMut::with_capacity(ADDRESS_SIZE + self.payload.len());
                buf.put_u32_le(address);
                buf.extend_from_slice(&self.payload);
                buf.freeze()
            }
        }
    }

    /// Encode as a single-command frame.
    pub fn encode(&self) -> Bytes {
        encode_command(self.opcode, &self.argument())
    }
}

/// Encode a single-command frame: `[len][opcode][argument]`.
///
/// The argument length is not bounded here.
pub fn encode_command(opcode: OpCode, argument: &[u8]) -> Bytes {
    let total = MIN_FRAME_SIZE + argument.len();
    let mut buf = BytesMut::with_capacity(total);
    buf.put_u32_le(total as u32);
    buf.put_u8(opcode as u8);
    buf.extend_from_slice(argument);
    buf.freeze()
}

/// Decoded reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub result: ResultCode,
    /// Reply argument, zero-padded to a multiple of 4 when non-empty.
    /// Callers that know the true payload length must truncate.
    pub argument: Bytes,
}

impl Answer {
    pub fn new(result: ResultCode, argument: Bytes) -> Self {
        Self { result, argument }
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// Turn a non-OK result code into `PineError::Result`.
    pub fn into_ok(self) -> Result<Self> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(PineError::Result(self.result))
        }
    }
}

/// Round `len` up to the next multiple of 4.
#[inline]
pub fn padded_len(len: usize) -> usize {
    (len + 3) & !3
}

/// Decode an answer body (everything after the length prefix).
pub fn decode_answer(body: &[u8]) -> Result<Answer> {
    let (&code, rest) = body
        .split_first()
        .ok_or_else(|| PineError::Framing("empty answer body".to_string()))?;

    let argument = if rest.is_empty() {
        Bytes::new()
    } else {
        let mut buf = BytesMut::zeroed(padded_len(rest.len()));
        buf[..rest.len()].copy_from_slice(rest);
        buf.freeze()
    };

    Ok(Answer::new(ResultCode::from(code), argument))
}

/// Read the length prefix at the start of `buf`, if present.
#[inline]
pub fn read_length_prefix(buf: &[u8]) -> Option<u32> {
    let prefix: [u8; LENGTH_PREFIX_SIZE] = buf.get(..LENGTH_PREFIX_SIZE)?.try_into().ok()?;
    Some(u32::from_le_bytes(prefix))
}

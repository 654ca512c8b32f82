//! Protocol module - wire format, batching, and answer framing.
//!
//! This module implements the binary PINE protocol:
//! - opcode / result-code enumerations
//! - single-command frame encoding and answer decoding
//! - batch planning for arbitrary-length reads and writes
//! - frame buffer for accumulating partial reads

mod batch;
mod frame_buffer;
mod opcode;
mod wire_format;

pub use batch::{
    encode_batched_read, encode_batched_write, op_count, plan, Direction, SubOp, CHUNK_SIZES,
};
pub use frame_buffer::FrameBuffer;
pub use opcode::{EmulatorStatus, OpCode, ResultCode};
pub use wire_format::{
    decode_answer, encode_command, padded_len, read_length_prefix, Answer, Command, ADDRESS_SIZE,
    DEFAULT_MAX_ANSWER_SIZE, LENGTH_PREFIX_SIZE, MIN_FRAME_SIZE, OPCODE_SIZE,
};

//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for buffer management.
//! Implements a state machine for handling fragmented answers:
//! - `WaitingForLength`: Need at least 4 bytes
//! - `WaitingForBody`: Length parsed, need N more body bytes
//!
//! # Example
//!
//! ```
//! use pine_client::protocol::FrameBuffer;
//!
//! let mut buffer = FrameBuffer::new();
//!
//! // An OK answer carrying two bytes, delivered in two pieces.
//! assert!(buffer.push(&[7, 0, 0]).unwrap().is_empty());
//! let answers = buffer.push(&[0, 0, 0xAB, 0xCD]).unwrap();
//!
//! assert_eq!(answers.len(), 1);
//! assert_eq!(&answers[0].argument[..2], &[0xAB, 0xCD]);
//! ```

use bytes::BytesMut;

use super::wire_format::{
    decode_answer, read_length_prefix, Answer, DEFAULT_MAX_ANSWER_SIZE, LENGTH_PREFIX_SIZE,
    MIN_FRAME_SIZE,
};
use crate::error::{PineError, Result};

/// State machine for frame parsing.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for the 4-byte length prefix.
    WaitingForLength,
    /// Prefix parsed, waiting for the body.
    WaitingForBody { remaining: usize },
}

/// Buffer for accumulating incoming bytes and extracting complete answers.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Largest accepted length prefix.
    max_frame_size: u32,
}

impl FrameBuffer {
    /// Create a new frame buffer with default settings.
    pub fn new() -> Self {
        Self::with_max_frame(DEFAULT_MAX_ANSWER_SIZE)
    }

    /// Create a new frame buffer with a custom frame size limit.
    pub fn with_max_frame(max_frame_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::WaitingForLength,
            max_frame_size,
        }
    }

    /// Push data into the buffer and decode all complete answers.
    ///
    /// Partial data is buffered internally for the next push.
    ///
    /// # Errors
    ///
    /// Returns `Framing` if a length prefix is smaller than 5 or larger than
    /// the configured maximum. The stream is unusable after that.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Answer>> {
        self.buffer.extend_from_slice(data);

        let mut answers = Vec::new();
        while let Some(answer) = self.try_extract_one()? {
            answers.push(answer);
        }
        Ok(answers)
    }

    fn try_extract_one(&mut self) -> Result<Option<Answer>> {
        loop {
            match self.state {
                State::WaitingForLength => {
                    let Some(total) = read_length_prefix(&self.buffer) else {
                        return Ok(None);
                    };

                    if (total as usize) < MIN_FRAME_SIZE {
                        return Err(PineError::Framing(format!(
                            "length prefix {total} leaves no room for a result code"
                        )));
                    }
                    if total > self.max_frame_size {
                        return Err(PineError::Framing(format!(
                            "answer size {} exceeds maximum {}",
                            total, self.max_frame_size
                        )));
                    }

                    let _ = self.buffer.split_to(LENGTH_PREFIX_SIZE);
                    self.state = State::WaitingForBody {
                        remaining: total as usize - LENGTH_PREFIX_SIZE,
                    };
                }

                State::WaitingForBody { remaining } => {
                    if self.buffer.len() < remaining {
                        return Ok(None);
                    }

                    let body = self.buffer.split_to(remaining);
                    self.state = State::WaitingForLength;
                    return decode_answer(&body).map(Some);
                }
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// True when a frame has been started but not completed.
    pub fn is_mid_frame(&self) -> bool {
        matches!(self.state, State::WaitingForBody { .. }) || !self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForLength;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::WaitingForLength => "WaitingForLength",
            State::WaitingForBody { .. } => "WaitingForBody",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

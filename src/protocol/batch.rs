//! Batch planning for arbitrary-length memory transfers.
//!
//! A transfer of `n` bytes is split greedily into 8, 4, 2 and 1 byte
//! sub-operations, each carrying its own opcode and address. All
//! sub-operations share one frame:
//!
//! ```text
//! [len u32 LE] { [opcode][address u32 LE][data (writes only)] }*
//! ```
//!
//! The emulator replies with a single answer whose argument is the
//! concatenated read data.

use bytes::{BufMut, Bytes, BytesMut};

use super::opcode::OpCode;
use super::wire_format::{ADDRESS_SIZE, LENGTH_PREFIX_SIZE, OPCODE_SIZE};

/// Chunk sizes in the order the planner tries them.
pub const CHUNK_SIZES: [usize; 4] = [8, 4, 2, 1];

/// Direction of a batched transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

impl Direction {
    fn opcode(self, chunk: usize) -> Option<OpCode> {
        match self {
            Direction::Read => OpCode::read_for(chunk),
            Direction::Write => OpCode::write_for(chunk),
        }
    }
}

/// One planned sub-operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubOp {
    pub opcode: OpCode,
    pub address: u32,
    /// Offset of this chunk in the caller's buffer.
    pub offset: usize,
    pub size: usize,
}

impl SubOp {
    /// Encoded size of this sub-operation inside a batched frame.
    #[inline]
    pub fn encoded_len(&self, direction: Direction) -> usize {
        let header = OPCODE_SIZE + ADDRESS_SIZE;
        match direction {
            Direction::Read => header,
            Direction::Write => header + self.size,
        }
    }
}

/// Largest chunk size that fits in `remaining`.
#[inline]
fn chunk_for(remaining: usize) -> usize {
    CHUNK_SIZES
        .into_iter()
        .find(|&size| size <= remaining)
        .unwrap_or(1)
}

/// Number of sub-operations needed for `len` bytes.
#[inline]
pub fn op_count(len: usize) -> usize {
    len / 8 + (len % 8) / 4 + (len % 4) / 2 + len % 2
}

/// Plan the sub-operations for a `len` byte transfer starting at `base`.
///
/// `len == 0` yields an empty plan. Addresses wrap at 32 bits.
pub fn plan(direction: Direction, base: u32, len: usize) -> Vec<SubOp> {
    // Single access, no loop needed.
    if let Some(opcode) = direction.opcode(len) {
        return vec![SubOp {
            opcode,
            address: base,
            offset: 0,
            size: len,
        }];
    }

    let mut ops = Vec::with_capacity(op_count(len));
    let mut remaining = len;
    let mut cursor = base;
    let mut offset = 0;

    while remaining > 0 {
        let size = chunk_for(remaining);
        let Some(opcode) = direction.opcode(size) else {
            break;
        };
        ops.push(SubOp {
            opcode,
            address: cursor,
            offset,
            size,
        });
        cursor = cursor.wrapping_add(size as u32);
        offset += size;
        remaining -= size;
    }

    ops
}

/// Encode a batched read of `len` bytes at `base`.
pub fn encode_batched_read(base: u32, len: usize) -> Bytes {
    let ops = plan(Direction::Read, base, len);
    encode_ops(Direction::Read, &ops, &[])
}

/// Encode a batched write of `data` at `base`.
pub fn encode_batched_write(base: u32, data: &[u8]) -> Bytes {
    let ops = plan(Direction::Write, base, data.len());
    encode_ops(Direction::Write, &ops, data)
}

fn encode_ops(direction: Direction, ops: &[SubOp], data: &[u8]) -> Bytes {
    let body: usize = ops.iter().map(|op| op.encoded_len(direction)).sum();
    let total = LENGTH_PREFIX_SIZE + body;

    let mut buf = BytesMut::with_capacity(total);
    buf.put_u32_le(total as u32);
    for op in ops {
        buf.put_u8(op.opcode as u8);
        buf.put_u32_le(op.address);
        if direction == Direction::Write {
            buf.extend_from_slice(&data[op.offset..op.offset + op.size]);
        }
    }
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::wire_format::read_length_prefix;
    use proptest::prelude::*;

    /// Plan through the general loop only, bypassing the single-access path.
    fn plan_by_loop(direction: Direction, base: u32, len: usize) -> Vec<SubOp> {
        let mut ops = Vec::new();
        let mut remaining = len;
        let mut cursor = base;
        let mut offset = 0;
        while remaining > 0 {
            let size = chunk_for(remaining);
            ops.push(SubOp {
                opcode: direction.opcode(size).unwrap(),
                address: cursor,
                offset,
                size,
            });
            cursor = cursor.wrapping_add(size as u32);
            offset += size;
            remaining -= size;
        }
        ops
    }

    fn sizes(ops: &[SubOp]) -> Vec<usize> {
        ops.iter().map(|op| op.size).collect()
    }

    #[test]
    fn test_known_decompositions() {
        assert_eq!(sizes(&plan(Direction::Read, 0, 13)), vec![8, 4, 1]);
        assert_eq!(sizes(&plan(Direction::Read, 0, 7)), vec![4, 2, 1]);
        assert_eq!(sizes(&plan(Direction::Read, 0, 1)), vec![1]);

        let big = plan(Direction::Write, 0, 512);
        assert_eq!(big.len(), 64);
        assert!(big.iter().all(|op| op.size == 8 && op.opcode == OpCode::Write64));
    }

    #[test]
    fn test_zero_length_is_empty() {
        assert!(plan(Direction::Read, 0x1000, 0).is_empty());
        assert!(plan(Direction::Write, 0x1000, 0).is_empty());

        let frame = encode_batched_read(0x1000, 0);
        assert_eq!(&frame[..], &[4, 0, 0, 0]);
    }

    #[test]
    fn test_opcodes_follow_direction() {
        let reads = plan(Direction::Read, 0, 15);
        assert_eq!(
            reads.iter().map(|op| op.opcode).collect::<Vec<_>>(),
            vec![OpCode::Read64, OpCode::Read32, OpCode::Read16, OpCode::Read8]
        );

        let writes = plan(Direction::Write, 0, 15);
        assert_eq!(
            writes.iter().map(|op| op.opcode).collect::<Vec<_>>(),
            vec![OpCode::Write64, OpCode::Write32, OpCode::Write16, OpCode::Write8]
        );
    }

    #[test]
    fn test_batched_read_layout() {
        let frame = encode_batched_read(0x100, 3);
        assert_eq!(
            &frame[..],
            &[
                14, 0, 0, 0, // len
                1, 0x00, 0x01, 0, 0, // read16 @ 0x100
                0, 0x02, 0x01, 0, 0, // read8 @ 0x102
            ]
        );
    }

    #[test]
    fn test_batched_write_slices_data_in_order() {
        let data = [1u8, 2, 3, 4, 5, 6, 7];
        let frame = encode_batched_write(0x20, &data);
        assert_eq!(
            &frame[..],
            &[
                26, 0, 0, 0, // len
                6, 0x20, 0, 0, 0, 1, 2, 3, 4, // write32 @ 0x20
                5, 0x24, 0, 0, 0, 5, 6, // write16 @ 0x24
                4, 0x26, 0, 0, 0, 7, // write8 @ 0x26
            ]
        );
    }

    #[test]
    fn test_single_access_matches_loop_encoding() {
        for len in [1usize, 2, 4, 8] {
            let data: Vec<u8> = (0..len as u8).collect();
            let base = 0xDEAD_BEE0;

            let fast = plan(Direction::Write, base, len);
            let slow = plan_by_loop(Direction::Write, base, len);
            assert_eq!(fast, slow);
            assert_eq!(
                encode_ops(Direction::Write, &fast, &data),
                encode_ops(Direction::Write, &slow, &data)
            );
            assert_eq!(
                encode_batched_read(base, len),
                encode_ops(
                    Direction::Read,
                    &plan_by_loop(Direction::Read, base, len),
                    &[]
                )
            );
        }
    }

    proptest! {
        #[test]
        fn prop_chunks_cover_length(len in 0usize..4096) {
            let ops = plan(Direction::Read, 0, len);
            prop_assert_eq!(ops.iter().map(|op| op.size).sum::<usize>(), len);
            prop_assert_eq!(ops.len(), op_count(len));
        }

        #[test]
        fn prop_addresses_are_cumulative(base in 0u32..0x8000_0000, len in 1usize..2048) {
            let ops = plan(Direction::Write, base, len);
            let mut expected = base;
            let mut offset = 0;
            for op in &ops {
                prop_assert_eq!(op.address, expected);
                prop_assert_eq!(op.offset, offset);
                expected += op.size as u32;
                offset += op.size;
            }
        }

        #[test]
        fn prop_length_field_matches_frame(base in any::<u32>(), data in proptest::collection::vec(any::<u8>(), 0..600)) {
            let read = encode_batched_read(base, data.len());
            prop_assert_eq!(read_length_prefix(&read).unwrap() as usize, read.len());

            let write = encode_batched_write(base, &data);
            prop_assert_eq!(read_length_prefix(&write).unwrap() as usize, write.len());
            prop_assert_eq!(write.len(), 4 + 5 * op_count(data.len()) + data.len());
        }
    }
}

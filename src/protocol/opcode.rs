//! Opcode, result-code and emulator-status enumerations.

use crate::error::PineError;

/// Command tag carried as the first body byte of every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    Read8 = 0,
    Read16 = 1,
    Read32 = 2,
    Read64 = 3,
    Write8 = 4,
    Write16 = 5,
    Write32 = 6,
    Write64 = 7,
    Version = 8,
    SaveState = 9,
    LoadState = 10,
    Title = 11,
    Id = 12,
    Uuid = 13,
    GameVersion = 14,
    Status = 15,
    Unimplemented = 0xFF,
}

impl OpCode {
    /// Read opcode for a 1, 2, 4 or 8 byte access.
    pub fn read_for(width: usize) -> Option<OpCode> {
        match width {
            1 => Some(OpCode::Read8),
            2 => Some(OpCode::Read16),
            4 => Some(OpCode::Read32),
            8 => Some(OpCode::Read64),
            _ => None,
        }
    }

    /// Write opcode for a 1, 2, 4 or 8 byte access.
    pub fn write_for(width: usize) -> Option<OpCode> {
        match width {
            1 => Some(OpCode::Write8),
            2 => Some(OpCode::Write16),
            4 => Some(OpCode::Write32),
            8 => Some(OpCode::Write64),
            _ => None,
        }
    }

    /// Access width in bytes for memory opcodes, `None` for control commands.
    pub fn width(self) -> Option<usize> {
        match self {
            OpCode::Read8 | OpCode::Write8 => Some(1),
            OpCode::Read16 | OpCode::Write16 => Some(2),
            OpCode::Read32 | OpCode::Write32 => Some(4),
            OpCode::Read64 | OpCode::Write64 => Some(8),
            _ => None,
        }
    }

    #[inline]
    pub fn is_read(self) -> bool {
        (self as u8) <= OpCode::Read64 as u8
    }

    #[inline]
    pub fn is_write(self) -> bool {
        (OpCode::Write8 as u8..=OpCode::Write64 as u8).contains(&(self as u8))
    }
}

impl TryFrom<u8> for OpCode {
    type Error = PineError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => OpCode::Read8,
            1 => OpCode::Read16,
            2 => OpCode::Read32,
            3 => OpCode::Read64,
            4 => OpCode::Write8,
            5 => OpCode::Write16,
            6 => OpCode::Write32,
            7 => OpCode::Write64,
            8 => OpCode::Version,
            9 => OpCode::SaveState,
            10 => OpCode::LoadState,
            11 => OpCode::Title,
            12 => OpCode::Id,
            13 => OpCode::Uuid,
            14 => OpCode::GameVersion,
            15 => OpCode::Status,
            0xFF => OpCode::Unimplemented,
            other => {
                return Err(PineError::Framing(format!("unknown opcode {other:#04x}")));
            }
        })
    }
}

/// Status byte at the start of every answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResultCode {
    Ok = 0,
    Fail = 1,
    OutOfMemory = 2,
    NoConnection = 3,
    Unimplemented = 4,
    Unknown = 5,
    Failure = 0xFF,
}

impl ResultCode {
    #[inline]
    pub fn is_ok(self) -> bool {
        self == ResultCode::Ok
    }
}

impl From<u8> for ResultCode {
    /// Bytes outside the defined set are reported as `Failure`.
    fn from(value: u8) -> Self {
        match value {
            0 => ResultCode::Ok,
            1 => ResultCode::Fail,
            2 => ResultCode::OutOfMemory,
            3 => ResultCode::NoConnection,
            4 => ResultCode::Unimplemented,
            5 => ResultCode::Unknown,
            0xFF => ResultCode::Failure,
            other => {
                tracing::warn!("Unrecognized result code {:#04x}, treating as Failure", other);
                ResultCode::Failure
            }
        }
    }
}

/// Emulator run state returned by the status command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum EmulatorStatus {
    Running = 0,
    Paused = 1,
    Shutdown = 2,
    Unknown = 0xFF,
}

impl From<u32> for EmulatorStatus {
    fn from(value: u32) -> Self {
        match value {
            0 => EmulatorStatus::Running,
            1 => EmulatorStatus::Paused,
            2 => EmulatorStatus::Shutdown,
            _ => EmulatorStatus::Unknown,
        }
    }
}

//! Response code table
//!
//! Every message from the display starts with a one-byte code. The device
//! instruction set splits codes into three disjoint ranges:
//!
//! - **Instruction results**: success and error replies to a command
//!   (`0x00`-`0x24`)
//! - **Events**: unsolicited touch and device-state notifications
//! - **Typed responses**: replies carrying data (`get`, `sendme`)
//!
//! The range of a code determines how many bytes complete its message.

use std::fmt;

/// Raw code values as sent by the device
pub mod codes {
    /// Invalid instruction (also the first byte of the startup message)
    pub const INVALID_INSTRUCTION: u8 = 0x00;
    /// Instruction executed successfully
    pub const SUCCESS: u8 = 0x01;
    /// Component touch event: page, component, press/release
    pub const TOUCH_EVENT: u8 = 0x65;
    /// Current page id (reply to `sendme`)
    pub const PAGE_ID: u8 = 0x66;
    /// Touch coordinate while awake
    pub const TOUCH_COORDINATE: u8 = 0x67;
    /// Touch coordinate that woke the display from sleep
    pub const TOUCH_COORDINATE_SLEEP: u8 = 0x68;
    /// String data (reply to `get` on a text attribute)
    pub const STRING_DATA: u8 = 0x70;
    /// Numeric data (reply to `get` on a numeric attribute)
    pub const NUMBER_DATA: u8 = 0x71;
    /// Display entered automatic sleep
    pub const AUTO_SLEEP: u8 = 0x86;
    /// Display woke up automatically
    pub const AUTO_WAKE: u8 = 0x87;
    /// Display finished powering up and is ready
    pub const READY: u8 = 0x88;
    /// Display started a firmware upgrade from storage
    pub const UPGRADING: u8 = 0x89;
    /// Transparent data transfer finished
    pub const TRANSPARENT_FINISHED: u8 = 0xFD;
    /// Display is ready to receive transparent data
    pub const TRANSPARENT_READY: u8 = 0xFE;
}

/// Startup notification, sent once after power-on or reset
pub const STARTUP_MESSAGE: [u8; 6] = [0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF];

/// Which range a leading code belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CodeRange {
    /// Success or error reply to an instruction
    InstructionResult,
    /// Unsolicited event
    Event,
    /// Data-carrying reply
    TypedResponse,
}

impl CodeRange {
    /// Classify a leading code
    pub fn of(code: u8) -> Self {
        use codes::*;

        match code {
            TOUCH_EVENT | TOUCH_COORDINATE | TOUCH_COORDINATE_SLEEP | AUTO_SLEEP | AUTO_WAKE
            | READY | UPGRADING | TRANSPARENT_FINISHED | TRANSPARENT_READY => Self::Event,
            PAGE_ID | STRING_DATA | NUMBER_DATA => Self::TypedResponse,
            _ => Self::InstructionResult,
        }
    }
}

/// Returns true if `code` starts an unsolicited event message
pub fn is_event_code(code: u8) -> bool {
    CodeRange::of(code) == CodeRange::Event
}

/// Returns true if `code` is a success/error reply to an instruction
pub fn is_instruction_result(code: u8) -> bool {
    CodeRange::of(code) == CodeRange::InstructionResult
}

/// Instruction result reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ResultCode {
    /// Instruction not recognised
    InvalidInstruction,
    /// Instruction executed
    Success,
    /// Component id or name does not exist
    InvalidComponent,
    /// Page id or name does not exist
    InvalidPage,
    /// Picture id does not exist
    InvalidPicture,
    /// Font id does not exist
    InvalidFont,
    /// File operation failed
    InvalidFileOperation,
    /// CRC check failed
    InvalidCrc,
    /// Baud rate not supported
    InvalidBaudRate,
    /// Waveform id or channel does not exist
    InvalidWaveform,
    /// Variable name or attribute does not exist
    InvalidVariable,
    /// Operation not valid for the variable type
    InvalidVariableOperation,
    /// Assignment failed
    AssignmentFailed,
    /// EEPROM operation failed
    EepromFailed,
    /// Wrong number of parameters
    InvalidParameterCount,
    /// I/O operation failed
    IoFailed,
    /// Escape character used incorrectly
    InvalidEscape,
    /// Variable name too long
    VariableNameTooLong,
    /// Device serial buffer overflowed
    BufferOverflow,
    /// Code outside the documented table
    Other(u8),
}

impl ResultCode {
    /// Returns true for the success sentinel
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::InvalidInstruction => "invalid instruction",
            Self::Success => "success",
            Self::InvalidComponent => "invalid component",
            Self::InvalidPage => "invalid page",
            Self::InvalidPicture => "invalid picture",
            Self::InvalidFont => "invalid font",
            Self::InvalidFileOperation => "invalid file operation",
            Self::InvalidCrc => "invalid CRC",
            Self::InvalidBaudRate => "invalid baud rate",
            Self::InvalidWaveform => "invalid waveform id or channel",
            Self::InvalidVariable => "invalid variable name or attribute",
            Self::InvalidVariableOperation => "invalid variable operation",
            Self::AssignmentFailed => "assignment failed",
            Self::EepromFailed => "EEPROM operation failed",
            Self::InvalidParameterCount => "invalid quantity of parameters",
            Self::IoFailed => "I/O operation failed",
            Self::InvalidEscape => "invalid escape character",
            Self::VariableNameTooLong => "variable name too long",
            Self::BufferOverflow => "serial buffer overflow",
            Self::Other(_) => "unknown result code",
        }
    }
}

impl From<u8> for ResultCode {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::InvalidInstruction,
            0x01 => Self::Success,
            0x02 => Self::InvalidComponent,
            0x03 => Self::InvalidPage,
            0x04 => Self::InvalidPicture,
            0x05 => Self::InvalidFont,
            0x06 => Self::InvalidFileOperation,
            0x09 => Self::InvalidCrc,
            0x11 => Self::InvalidBaudRate,
            0x12 => Self::InvalidWaveform,
            0x1A => Self::InvalidVariable,
            0x1B => Self::InvalidVariableOperation,
            0x1C => Self::AssignmentFailed,
            0x1D => Self::EepromFailed,
            0x1E => Self::InvalidParameterCount,
            0x1F => Self::IoFailed,
            0x20 => Self::InvalidEscape,
            0x23 => Self::VariableNameTooLong,
            0x24 => Self::BufferOverflow,
            other => Self::Other(other),
        }
    }
}

impl From<ResultCode> for u8 {
    fn from(code: ResultCode) -> Self {
        match code {
            ResultCode::InvalidInstruction => 0x00,
            ResultCode::Success => 0x01,
            ResultCode::InvalidComponent => 0x02,
            ResultCode::InvalidPage => 0x03,
            ResultCode::InvalidPicture => 0x04,
            ResultCode::InvalidFont => 0x05,
            ResultCode::InvalidFileOperation => 0x06,
            ResultCode::InvalidCrc => 0x09,
            ResultCode::InvalidBaudRate => 0x11,
            ResultCode::InvalidWaveform => 0x12,
            ResultCode::InvalidVariable => 0x1A,
            ResultCode::InvalidVariableOperation => 0x1B,
            ResultCode::AssignmentFailed => 0x1C,
            ResultCode::EepromFailed => 0x1D,
            ResultCode::InvalidParameterCount => 0x1E,
            ResultCode::IoFailed => 0x1F,
            ResultCode::InvalidEscape => 0x20,
            ResultCode::VariableNameTooLong => 0x23,
            ResultCode::BufferOverflow => 0x24,
            ResultCode::Other(code) => code,
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.description(), u8::from(*self))
    }
}

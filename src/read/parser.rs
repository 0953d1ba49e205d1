//! Result and error types shared by the table decoder and the unwinder.

use std::error;
use std::fmt;

use crate::constants::DwCfa;

/// An error that occurred while decoding a frame table or unwinding with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The input ended before a complete value could be read.
    UnexpectedEof,
    /// A malformed unsigned LEB128 value.
    BadUnsignedLeb128,
    /// A malformed signed LEB128 value.
    BadSignedLeb128,
    /// A record length that we do not know how to handle.
    UnknownReservedLength,
    /// The record's version is one we do not know how to decode.
    UnknownVersion(u8),
    /// The record carries an augmentation we do not understand.
    UnknownAugmentation,
    /// An address size other than 2, 4, or 8 bytes.
    UnsupportedAddressSize(u8),
    /// Non-zero segment selector sizes are not supported.
    UnsupportedSegmentSize(u8),
    /// A function record's defaults reference does not point at a
    /// defaults record.
    NoEntryAtGivenOffset,
    /// An instruction opcode that we do not recognize.
    UnknownFrameInstruction(DwCfa),
    /// A register number too large for any supported architecture.
    UnsupportedRegister(u64),
    /// An advance moved the running address backwards.
    InvalidAddressRange,
    /// An instruction that updates only part of the CFA rule was replayed
    /// while the CFA rule was not of the register-plus-offset shape.
    CfiInstructionInInvalidContext,
    /// A restore-state instruction with no remembered state to restore.
    PopWithEmptyStack,
    /// A remember-state instruction overflowed the fixed state stack.
    StateStackOverflow,
    /// More register rules than the fixed rule map can hold.
    TooManyRegisterRules,
    /// The target address is outside the function record's address range.
    ///
    /// This indicates a bug in the caller's function lookup, not a malformed
    /// table, so it is surfaced as an error rather than truncating a walk.
    OffsetOutOfRange,
    /// No function record covers the given address.
    UnknownFunction,
    /// A memory read required to recover a saved register targeted an
    /// unmapped or unreadable address.
    UnreadableMemory,
    /// A register rule referred to a register whose value is not known.
    MissingRegisterValue,
    /// A CFA or register rule carries expression bytecode and no expression
    /// evaluator was supplied.
    UnsupportedExpression,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::UnexpectedEof => write!(f, "unexpected end of input"),
            Error::BadUnsignedLeb128 => write!(f, "malformed unsigned LEB128 value"),
            Error::BadSignedLeb128 => write!(f, "malformed signed LEB128 value"),
            Error::UnknownReservedLength => write!(f, "unknown reserved record length"),
            Error::UnknownVersion(v) => write!(f, "unknown frame table version {}", v),
            Error::UnknownAugmentation => write!(f, "unknown augmentation string"),
            Error::UnsupportedAddressSize(size) => {
                write!(f, "unsupported address size {}", size)
            }
            Error::UnsupportedSegmentSize(size) => {
                write!(f, "unsupported segment selector size {}", size)
            }
            Error::NoEntryAtGivenOffset => {
                write!(f, "no defaults record at the referenced offset")
            }
            Error::UnknownFrameInstruction(op) => {
                write!(f, "unknown frame instruction {}", op)
            }
            Error::UnsupportedRegister(r) => write!(f, "unsupported register number {}", r),
            Error::InvalidAddressRange => write!(f, "advance moved the address backwards"),
            Error::CfiInstructionInInvalidContext => {
                write!(f, "partial CFA update without a register-plus-offset CFA rule")
            }
            Error::PopWithEmptyStack => {
                write!(f, "restore-state with no remembered state")
            }
            Error::StateStackOverflow => {
                write!(f, "remember-state overflowed the state stack")
            }
            Error::TooManyRegisterRules => {
                write!(f, "too many register rules for the fixed rule map")
            }
            Error::OffsetOutOfRange => {
                write!(f, "target address is outside the function's address range")
            }
            Error::UnknownFunction => write!(f, "no function record covers the address"),
            Error::UnreadableMemory => write!(f, "memory read targeted an unreadable address"),
            Error::MissingRegisterValue => {
                write!(f, "register rule refers to a register with no known value")
            }
            Error::UnsupportedExpression => {
                write!(f, "expression rule encountered without an evaluator")
            }
        }
    }
}

impl error::Error for Error {}

/// The result of a decode or unwind operation.
pub type Result<T> = core::result::Result<T, Error>;

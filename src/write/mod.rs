//! Building and serializing call frame information tables.

use std::error;
use std::fmt;
use std::result;

mod writer;
pub use self::writer::*;

mod endian_vec;
pub use self::endian_vec::*;

mod cfi;
pub use self::cfi::*;

mod directive;
pub use self::directive::*;

/// An error that occurred while building or serializing a frame table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An authoring event's offset was smaller than an earlier event's.
    OutOfOrderEvent,
    /// Two whole-state events were supplied for the same offset.
    ConflictingRuleAtSameOffset,
    /// A function's rule program was never closed.
    UnterminatedProgram,
    /// A CFA-offset or CFA-register update was authored while the current
    /// CFA rule is not of the register-plus-offset shape.
    InvalidCfaContext,
    /// A restore-state event with no matching remember-state.
    RestoreWithoutRemember,
    /// A code offset that is not a multiple of the code alignment factor,
    /// or that moved backwards.
    InvalidCodeOffset(u32),
    /// A data offset that is not a multiple of the data alignment factor.
    InvalidDataOffset(i64),
    /// The value is too large for its encoding.
    ValueTooLarge,
    /// The given offset is out of bounds for the output buffer.
    OffsetOutOfBounds,
    /// The given length is out of bounds for the output buffer.
    LengthOutOfBounds,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        match *self {
            Error::OutOfOrderEvent => {
                write!(f, "authoring event offsets must not decrease")
            }
            Error::ConflictingRuleAtSameOffset => {
                write!(f, "conflicting rule states supplied for the same offset")
            }
            Error::UnterminatedProgram => {
                write!(f, "the function's rule program was never closed")
            }
            Error::InvalidCfaContext => {
                write!(f, "partial CFA update without a register-plus-offset CFA rule")
            }
            Error::RestoreWithoutRemember => {
                write!(f, "restore-state without a matching remember-state")
            }
            Error::InvalidCodeOffset(offset) => {
                write!(f, "invalid code offset: {}", offset)
            }
            Error::InvalidDataOffset(offset) => {
                write!(f, "invalid data offset: {}", offset)
            }
            Error::ValueTooLarge => write!(f, "the value is too large for its encoding"),
            Error::OffsetOutOfBounds => write!(f, "the given offset is out of bounds"),
            Error::LengthOutOfBounds => write!(f, "the given length is out of bounds"),
        }
    }
}

impl error::Error for Error {}

/// The result of a build or serialize operation.
pub type Result<T> = result::Result<T, Error>;

//! Reading and decoding frame tables.
//!
//! Parsing is lazy and zero-copy: a [`FrameSection`] borrows the section
//! bytes and records hand out sub-slices of them, so decoding allocates
//! nothing and is safe to run from restricted contexts such as signal
//! handlers (pair it with a preallocated [`UnwindContext`]).

mod parser;
pub use self::parser::{Error, Result};

mod reader;
pub use self::reader::Reader;

mod endian_slice;
pub use self::endian_slice::EndianSlice;

mod cfi;
pub use self::cfi::*;

mod unwind;
pub use self::unwind::*;

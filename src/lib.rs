//! `callframe` is a lazy, zero-copy encoder, decoder, and unwinder for
//! call frame information (CFI) tables.
//!
//! A frame table records, for every instruction in a function, how to
//! recover the canonical frame address (CFA) and the caller's register
//! values. Rather than storing one row per instruction, the table stores a
//! compact instruction program per function that is replayed up to the
//! address of interest, plus a shared defaults record holding the rules
//! common to every function.
//!
//! * The [`read`] module decodes persisted tables. Parsing is lazy and
//!   allocation-free: records borrow the section bytes, and replaying a
//!   rule program needs only a preallocated [`UnwindContext`]. The
//!   [`Unwinder`] walks a call stack frame by frame given the table, a
//!   register snapshot, and memory access.
//!
//! * The [`write`] module builds tables. A [`write::RuleTracker`] consumes
//!   authoring events (or textual `.cfi_*` directives) for one function and
//!   emits a minimal instruction program; a [`write::FrameTable`]
//!   deduplicates defaults records and serializes everything with
//!   deterministic, byte-identical output for identical input.
//!
//! ## Cargo features
//!
//! Enabled by default: `read`, `write`, `fallible-iterator`, `log`.
//!
//! * `read`: the decoder and unwinder.
//! * `write`: the encoder; pulls in `indexmap`.
//! * `fallible-iterator`: implement
//!   [`fallible_iterator::FallibleIterator`] for the lazy record and
//!   instruction iterators.
//! * `log`: build-time diagnostics via the `log` facade. The read side
//!   never logs.
#![deny(missing_docs)]
#![deny(missing_debug_implementations)]

pub mod arch;
mod common;
pub mod constants;
pub mod endianity;

pub use crate::common::{FrameSectionOffset, Register};
pub use crate::endianity::{BigEndian, Endianity, LittleEndian, NativeEndian};

#[cfg(feature = "read")]
pub mod read;
#[cfg(feature = "read")]
pub use crate::read::*;

#[cfg(feature = "write")]
pub mod write;

#[cfg(test)]
mod test_util;

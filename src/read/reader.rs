//! A trait for reading the bytes of a persisted frame table.

use std::fmt::Debug;
use std::io;
use std::io::Read;

use crate::endianity::Endianity;
use crate::read::parser::{Error, Result};

/// A trait for reading the data of a persisted frame table.
///
/// All read operations advance the reader past the bytes they consume unless
/// specified otherwise. Readers are cheap to clone; a clone is an independent
/// cursor over the same underlying bytes, which is what lets decoding be a
/// pure function over shared table data.
pub trait Reader: Debug + Clone + Read {
    /// The endianity of the bytes being read.
    type Endian: Endianity;

    /// Return the number of bytes remaining.
    fn len(&self) -> usize;

    /// Return true if no bytes remain.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Set the number of bytes remaining to zero.
    fn empty(&mut self);

    /// Return the offset of this reader's data relative to the start of the
    /// given base reader's data.
    ///
    /// May panic if this reader's data is not contained within the base
    /// reader's data.
    fn offset_from(&self, base: &Self) -> usize;

    /// Find the index of the first occurrence of the given byte without
    /// advancing the reader.
    fn find(&self, byte: u8) -> Option<usize>;

    /// Discard the specified number of bytes.
    fn skip(&mut self, len: usize) -> Result<()>;

    /// Split the reader in two.
    ///
    /// A new reader is returned that covers the next `len` bytes, and `self`
    /// is advanced to read the remainder.
    fn split(&mut self, len: usize) -> Result<Self>;

    /// Read a u8.
    fn read_u8(&mut self) -> Result<u8>;

    /// Read a u16.
    fn read_u16(&mut self) -> Result<u16>;

    /// Read a u32.
    fn read_u32(&mut self) -> Result<u32>;

    /// Read a u64.
    fn read_u64(&mut self) -> Result<u64>;

    /// Read a null-terminated slice, and return it (excluding the null).
    fn read_null_terminated_slice(&mut self) -> Result<Self> {
        if let Some(idx) = self.find(0) {
            let val = self.split(idx)?;
            self.skip(1)?;
            Ok(val)
        } else {
            Err(Error::UnexpectedEof)
        }
    }

    /// Read an unsigned LEB128 encoded integer.
    fn read_uleb128(&mut self) -> Result<u64> {
        match leb128::read::unsigned(self) {
            Ok(val) => Ok(val),
            Err(leb128::read::Error::IoError(ref e))
                if e.kind() == io::ErrorKind::UnexpectedEof =>
            {
                Err(Error::UnexpectedEof)
            }
            Err(_) => Err(Error::BadUnsignedLeb128),
        }
    }

    /// Read a signed LEB128 encoded integer.
    fn read_sleb128(&mut self) -> Result<i64> {
        match leb128::read::signed(self) {
            Ok(val) => Ok(val),
            Err(leb128::read::Error::IoError(ref e))
                if e.kind() == io::ErrorKind::UnexpectedEof =>
            {
                Err(Error::UnexpectedEof)
            }
            Err(_) => Err(Error::BadSignedLeb128),
        }
    }

    /// Read an address-sized integer, and return it as a `u64`.
    fn read_address(&mut self, address_size: u8) -> Result<u64> {
        match address_size {
            2 => self.read_u16().map(u64::from),
            4 => self.read_u32().map(u64::from),
            8 => self.read_u64(),
            otherwise => Err(Error::UnsupportedAddressSize(otherwise)),
        }
    }
}

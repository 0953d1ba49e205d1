//! A growable output buffer with endianity metadata.

use crate::endianity::Endianity;
use crate::write::{Error, Result, Writer};

/// A `Vec<u8>` with endianity metadata.
#[derive(Debug, Clone)]
pub struct EndianVec<Endian>
where
    Endian: Endianity,
{
    vec: Vec<u8>,
    endian: Endian,
}

impl<Endian> EndianVec<Endian>
where
    Endian: Endianity,
{
    /// Construct a new `EndianVec` with the given endianity.
    pub fn new(endian: Endian) -> EndianVec<Endian> {
        EndianVec {
            vec: Vec::new(),
            endian,
        }
    }

    /// Return a reference to the written bytes.
    pub fn slice(&self) -> &[u8] {
        &self.vec
    }

    /// Convert into the written bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.vec
    }

    /// Take the written bytes, leaving an empty buffer behind.
    pub fn take(&mut self) -> Vec<u8> {
        let mut vec = Vec::new();
        std::mem::swap(&mut self.vec, &mut vec);
        vec
    }
}

impl<Endian> Writer for EndianVec<Endian>
where
    Endian: Endianity,
{
    type Endian = Endian;

    fn endian(&self) -> Self::Endian {
        self.endian
    }

    fn len(&self) -> usize {
        self.vec.len()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.vec.extend_from_slice(bytes);
        Ok(())
    }

    fn write_at(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        if offset > self.vec.len() {
            return Err(Error::OffsetOutOfBounds);
        }
        let to = &mut self.vec[offset..];
        if bytes.len() > to.len() {
            return Err(Error::LengthOutOfBounds);
        }
        let to = &mut to[..bytes.len()];
        to.copy_from_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endianity::LittleEndian;

    #[test]
    fn write_and_patch() {
        let mut w = EndianVec::new(LittleEndian);
        w.write_u32(0).unwrap();
        w.write_u8(0xab).unwrap();
        w.write_u32_at(0, 0x0102_0304).unwrap();
        assert_eq!(w.slice(), &[0x04, 0x03, 0x02, 0x01, 0xab]);
        assert_eq!(
            w.write_at(3, &[0, 0, 0]),
            Err(Error::LengthOutOfBounds)
        );
    }

    #[test]
    fn write_leb128() {
        let mut w = EndianVec::new(LittleEndian);
        w.write_uleb128(624_485).unwrap();
        assert_eq!(w.slice(), &[0xe5, 0x8e, 0x26]);

        let mut w = EndianVec::new(LittleEndian);
        w.write_sleb128(-2).unwrap();
        assert_eq!(w.slice(), &[0x7e]);

        let mut w = EndianVec::new(LittleEndian);
        w.write_sleb128(64).unwrap();
        assert_eq!(w.slice(), &[0xc0, 0x00]);
    }
}

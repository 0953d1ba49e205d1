/// A register number.
///
/// The meaning of this value is architecture dependent: each architecture
/// defines its own numbering table (see the [`arch`](crate::arch) module).
/// Register numbers are what gets encoded on the wire; display names are a
/// debugging convenience layered on top of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Register(pub u16);

/// An offset into a frame section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameSectionOffset<T = usize>(pub T);

impl<T> From<T> for FrameSectionOffset<T> {
    #[inline]
    fn from(o: T) -> Self {
        FrameSectionOffset(o)
    }
}

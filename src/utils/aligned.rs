use std::ops::{Deref, DerefMut};

// -------------------------------------------------------------------------------------------------

/// Aligns the wrapped value to a 64 byte cache line.
///
/// Used for the per-slot lanes of the grain and voice pools, so each lane starts on its own
/// cache line and the hot loops walk contiguous, aligned memory.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C, align(64))]
pub struct CacheAligned<T>(pub T);

impl<T> Deref for CacheAligned<T> {
    type Target = T;

    #[inline(always)]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> DerefMut for CacheAligned<T> {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

// -------------------------------------------------------------------------------------------------

use std::sync::atomic::{AtomicU32, Ordering};

// -------------------------------------------------------------------------------------------------

/// A `f32` which can be shared between threads, stored as raw bits in an [`AtomicU32`].
///
/// Loads and stores are torn-free per value. There's no read-modify-write support, as
/// parameter cells only ever get replaced as a whole.
#[derive(Debug, Default)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    pub fn load(&self, order: Ordering) -> f32 {
        f32::from_bits(self.0.load(order))
    }

    #[inline]
    pub fn store(&self, value: f32, order: Ordering) {
        self.0.store(value.to_bits(), order)
    }
}

// -------------------------------------------------------------------------------------------------

//! Fixed capacity, structure-of-arrays storage for in-flight grains.

use crate::utils::{aligned::CacheAligned, bitset::BitSet, panning_factors};

// -------------------------------------------------------------------------------------------------

/// Maximum number of simultaneously playing grains.
pub const GRAIN_POOL_CAPACITY: usize = 4096;

const GRAIN_POOL_WORDS: usize = GRAIN_POOL_CAPACITY / 64;

type Lane<T> = CacheAligned<[T; GRAIN_POOL_CAPACITY]>;

// -------------------------------------------------------------------------------------------------

/// Plain description of a single grain, as stored in one [`GrainPool`] slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grain {
    /// Frames until the grain becomes audible.
    pub delay: u32,
    /// Remaining audible frames.
    pub frames: u32,
    /// Total audible length in frames.
    pub length: u32,
    /// Fractional read position in the source sample.
    pub sample_pos: f64,
    /// Source frames to advance per output frame.
    pub step: f64,
    /// Linear gain.
    pub gain: f32,
    /// Panning in range -1..=1.
    pub pan: f32,
    pub env_attack_frames: u32,
    pub env_release_frames: u32,
    pub env_attack_curve: f32,
    pub env_release_curve: f32,
    /// Index of the voice (note) which spawned the grain.
    pub voice: u8,
}

impl Default for Grain {
    fn default() -> Self {
        Self {
            delay: 0,
            frames: 1,
            length: 1,
            sample_pos: 0.0,
            step: 1.0,
            gain: 1.0,
            pan: 0.0,
            env_attack_frames: 0,
            env_release_frames: 0,
            env_attack_curve: 1.0,
            env_release_curve: 1.0,
            voice: 0,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Arena of up to [`GRAIN_POOL_CAPACITY`] grains.
///
/// Each grain property lives in its own cache-line aligned lane, indexed by slot. An occupancy
/// bitset tracks which slots are in use. The pool never grows: inserting into a full pool fails
/// and the caller drops the grain.
///
/// The pool is large (several hundred KB), so keep it boxed.
pub struct GrainPool {
    pub(crate) active: BitSet<GRAIN_POOL_WORDS>,
    pub(crate) delay: Lane<u32>,
    pub(crate) frames: Lane<u32>,
    pub(crate) length: Lane<u32>,
    pub(crate) sample_pos: Lane<f64>,
    pub(crate) step: Lane<f64>,
    pub(crate) gain: Lane<f32>,
    pub(crate) pan: Lane<f32>,
    pub(crate) pan_left: Lane<f32>,
    pub(crate) pan_right: Lane<f32>,
    pub(crate) env_attack_frames: Lane<u32>,
    pub(crate) env_release_frames: Lane<u32>,
    pub(crate) env_attack_curve: Lane<f32>,
    pub(crate) env_release_curve: Lane<f32>,
    pub(crate) voice: Lane<u8>,
}

impl GrainPool {
    /// Total number of slots in the pool.
    pub const CAPACITY: usize = GRAIN_POOL_CAPACITY;

    /// Create a new, empty, heap allocated pool.
    pub fn new() -> Box<Self> {
        Box::new(Self {
            active: BitSet::new(),
            delay: CacheAligned([0; GRAIN_POOL_CAPACITY]),
            frames: CacheAligned([0; GRAIN_POOL_CAPACITY]),
            length: CacheAligned([0; GRAIN_POOL_CAPACITY]),
            sample_pos: CacheAligned([0.0; GRAIN_POOL_CAPACITY]),
            step: CacheAligned([0.0; GRAIN_POOL_CAPACITY]),
            gain: CacheAligned([0.0; GRAIN_POOL_CAPACITY]),
            pan: CacheAligned([0.0; GRAIN_POOL_CAPACITY]),
            pan_left: CacheAligned([0.0; GRAIN_POOL_CAPACITY]),
            pan_right: CacheAligned([0.0; GRAIN_POOL_CAPACITY]),
            env_attack_frames: CacheAligned([0; GRAIN_POOL_CAPACITY]),
            env_release_frames: CacheAligned([0; GRAIN_POOL_CAPACITY]),
            env_attack_curve: CacheAligned([0.0; GRAIN_POOL_CAPACITY]),
            env_release_curve: CacheAligned([0.0; GRAIN_POOL_CAPACITY]),
            voice: CacheAligned([0; GRAIN_POOL_CAPACITY]),
        })
    }

    /// Release all slots.
    pub fn clear(&mut self) {
        self.active.clear();
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.active.count()
    }

    pub fn is_empty(&self) -> bool {
        !self.active.any()
    }

    pub fn is_full(&self) -> bool {
        self.active.is_full()
    }

    pub fn is_active(&self, slot: usize) -> bool {
        slot < Self::CAPACITY && self.active.test(slot)
    }

    /// Store a grain in the lowest free slot. Returns the slot index, or `None` when the pool
    /// is full.
    ///
    /// A grain's length is at least one frame, and its remaining frames are within 1..=length.
    pub fn insert(&mut self, grain: &Grain) -> Option<usize> {
        let slot = self.active.first_unset()?;
        let (pan_left, pan_right) = panning_factors(grain.pan);
        let length = grain.length.max(1);
        self.delay[slot] = grain.delay;
        self.frames[slot] = grain.frames.clamp(1, length);
        self.length[slot] = length;
        self.sample_pos[slot] = grain.sample_pos;
        self.step[slot] = grain.step;
        self.gain[slot] = grain.gain;
        self.pan[slot] = grain.pan;
        self.pan_left[slot] = pan_left;
        self.pan_right[slot] = pan_right;
        self.env_attack_frames[slot] = grain.env_attack_frames;
        self.env_release_frames[slot] = grain.env_release_frames;
        self.env_attack_curve[slot] = grain.env_attack_curve;
        self.env_release_curve[slot] = grain.env_release_curve;
        self.voice[slot] = grain.voice;
        self.active.set(slot);
        Some(slot)
    }

    /// Copy of the grain in the given slot, if the slot is occupied.
    pub fn get(&self, slot: usize) -> Option<Grain> {
        if !self.is_active(slot) {
            return None;
        }
        Some(Grain {
            delay: self.delay[slot],
            frames: self.frames[slot],
            length: self.length[slot],
            sample_pos: self.sample_pos[slot],
            step: self.step[slot],
            gain: self.gain[slot],
            pan: self.pan[slot],
            env_attack_frames: self.env_attack_frames[slot],
            env_release_frames: self.env_release_frames[slot],
            env_attack_curve: self.env_attack_curve[slot],
            env_release_curve: self.env_release_curve[slot],
            voice: self.voice[slot],
        })
    }

    /// Free the given slot.
    pub fn retire(&mut self, slot: usize) {
        if slot < Self::CAPACITY {
            self.active.reset(slot);
        }
    }

    /// Iterate over all occupied slots and their grains, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, Grain)> + '_ {
        self.active
            .iter()
            .filter_map(|slot| self.get(slot).map(|grain| (slot, grain)))
    }
}

impl std::fmt::Debug for GrainPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrainPool")
            .field("active", &self.len())
            .field("capacity", &Self::CAPACITY)
            .finish()
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_retire() {
        let mut pool = GrainPool::new();
        assert!(pool.is_empty());
        let grain = Grain {
            frames: 100,
            length: 100,
            sample_pos: 12.5,
            step: 0.5,
            voice: 60,
            ..Grain::default()
        };
        assert_eq!(pool.insert(&grain), Some(0));
        assert_eq!(pool.insert(&grain), Some(1));
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.get(1), Some(grain));
        assert_eq!(pool.get(2), None);

        pool.retire(0);
        assert!(!pool.is_active(0));
        assert_eq!(pool.insert(&grain), Some(0));
        assert_eq!(pool.iter().map(|(slot, _)| slot).collect::<Vec<_>>(), vec![0, 1]);

        pool.clear();
        assert!(pool.is_empty());
        assert_eq!(pool.get(0), None);
    }

    #[test]
    fn capacity_is_a_hard_limit() {
        let mut pool = GrainPool::new();
        for _ in 0..GrainPool::CAPACITY {
            assert!(pool.insert(&Grain::default()).is_some());
        }
        assert!(pool.is_full());
        assert_eq!(pool.insert(&Grain::default()), None);
        assert_eq!(pool.len(), GrainPool::CAPACITY);
        assert!(!pool.is_active(GrainPool::CAPACITY));
    }

    #[test]
    fn degenerate_grain_lengths() {
        let mut pool = GrainPool::new();
        let empty = pool.insert(&Grain {
            frames: 0,
            length: 0,
            ..Grain::default()
        });
        let overlong = pool.insert(&Grain {
            frames: 500,
            length: 100,
            ..Grain::default()
        });
        let unstarted = pool.insert(&Grain {
            frames: 0,
            length: 100,
            ..Grain::default()
        });
        let frames_and_length = |slot: Option<usize>| {
            slot.and_then(|slot| pool.get(slot))
                .map(|grain| (grain.frames, grain.length))
        };
        assert_eq!(frames_and_length(empty), Some((1, 1)));
        assert_eq!(frames_and_length(overlong), Some((100, 100)));
        assert_eq!(frames_and_length(unstarted), Some((1, 100)));
    }

    #[test]
    fn lanes_are_aligned() {
        let pool = GrainPool::new();
        assert_eq!(pool.sample_pos.as_ptr() as usize % 64, 0);
        assert_eq!(pool.gain.as_ptr() as usize % 64, 0);
        assert_eq!(pool.voice.as_ptr() as usize % 64, 0);
    }
}

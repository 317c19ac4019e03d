//! Publishing spawned grains to visualizers running on other threads.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use crate::utils::{atomic::AtomicF32, time::SampleTime};

// -------------------------------------------------------------------------------------------------

/// Properties of a spawned grain, as published to a [`GrainVisualSink`].
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct GrainVisual {
    /// Start position in the source sample, in source frames.
    pub source_start: f64,
    /// Absolute render clock time at which the grain becomes audible.
    pub start_time: SampleTime,
    /// Audible length in output frames.
    pub length: u32,
    pub attack_frames: u32,
    pub release_frames: u32,
    pub attack_curve: f32,
    pub release_curve: f32,
    /// Source frames per output frame.
    pub step: f64,
    /// Linear peak gain.
    pub peak_gain: f32,
}

// -------------------------------------------------------------------------------------------------

/// Receives all grains the engine spawns.
///
/// `publish` gets called from the audio thread, once for each spawned grain, with the grain's
/// pool slot. Implementations must not block or allocate.
pub trait GrainVisualSink: Send + Sync {
    fn publish(&self, slot: usize, grain: &GrainVisual);
}

// -------------------------------------------------------------------------------------------------

/// Shared count of frames the engine has rendered so far.
///
/// Written by the audio thread only, after each processed block. Readers on other threads use
/// it to relate [`GrainVisual::start_time`] to "now".
#[derive(Debug, Default)]
pub struct RenderClock {
    frames: AtomicU64,
}

impl RenderClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of rendered frames.
    pub fn now(&self) -> SampleTime {
        self.frames.load(Ordering::Relaxed)
    }

    pub(crate) fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::Relaxed);
    }
}

// -------------------------------------------------------------------------------------------------

/// Lock free grain visualization state with one record per grain pool slot.
///
/// Publishing follows a single writer, single reader discipline: the audio thread writes all
/// fields of a slot, then sets the slot's `active` flag with release ordering. A reader only
/// reads a slot's fields after it observed the flag with acquire ordering. A slot which gets
/// republished while a reader reads it may show a mix of both grains, which is acceptable for
/// visualization.
pub struct GrainVisualData {
    active: Box<[AtomicBool]>,
    source_start: Box<[AtomicU64]>,
    start_time: Box<[AtomicU64]>,
    length: Box<[AtomicU32]>,
    attack_frames: Box<[AtomicU32]>,
    release_frames: Box<[AtomicU32]>,
    attack_curve: Box<[AtomicF32]>,
    release_curve: Box<[AtomicF32]>,
    step: Box<[AtomicU64]>,
    peak_gain: Box<[AtomicF32]>,
}

impl GrainVisualData {
    /// Create visual data for the given number of grain slots.
    pub fn new(capacity: usize) -> Self {
        fn lane<T: Default>(capacity: usize) -> Box<[T]> {
            (0..capacity).map(|_| T::default()).collect()
        }
        Self {
            active: lane(capacity),
            source_start: lane(capacity),
            start_time: lane(capacity),
            length: lane(capacity),
            attack_frames: lane(capacity),
            release_frames: lane(capacity),
            attack_curve: lane(capacity),
            release_curve: lane(capacity),
            step: lane(capacity),
            peak_gain: lane(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.active.len()
    }

    /// Read the grain of the given slot, if the slot is published.
    pub fn read(&self, slot: usize) -> Option<GrainVisual> {
        if !self.active.get(slot)?.load(Ordering::Acquire) {
            return None;
        }
        Some(GrainVisual {
            source_start: f64::from_bits(self.source_start[slot].load(Ordering::Relaxed)),
            start_time: self.start_time[slot].load(Ordering::Relaxed),
            length: self.length[slot].load(Ordering::Relaxed),
            attack_frames: self.attack_frames[slot].load(Ordering::Relaxed),
            release_frames: self.release_frames[slot].load(Ordering::Relaxed),
            attack_curve: self.attack_curve[slot].load(Ordering::Relaxed),
            release_curve: self.release_curve[slot].load(Ordering::Relaxed),
            step: f64::from_bits(self.step[slot].load(Ordering::Relaxed)),
            peak_gain: self.peak_gain[slot].load(Ordering::Relaxed),
        })
    }

    /// Iterate over all published grains.
    pub fn active_grains(&self) -> impl Iterator<Item = (usize, GrainVisual)> + '_ {
        (0..self.capacity()).filter_map(|slot| self.read(slot).map(|grain| (slot, grain)))
    }

    /// Unpublish all grains which finished playing before the given render clock time.
    /// Returns the number of grains that got retired.
    pub fn retire_finished(&self, now: SampleTime) -> usize {
        let mut retired = 0;
        for (slot, grain) in self.active_grains() {
            if grain.start_time + grain.length as u64 <= now {
                self.active[slot].store(false, Ordering::Release);
                retired += 1;
            }
        }
        retired
    }
}

impl GrainVisualSink for GrainVisualData {
    fn publish(&self, slot: usize, grain: &GrainVisual) {
        if slot >= self.capacity() {
            return;
        }
        self.source_start[slot].store(grain.source_start.to_bits(), Ordering::Relaxed);
        self.start_time[slot].store(grain.start_time, Ordering::Relaxed);
        self.length[slot].store(grain.length, Ordering::Relaxed);
        self.attack_frames[slot].store(grain.attack_frames, Ordering::Relaxed);
        self.release_frames[slot].store(grain.release_frames, Ordering::Relaxed);
        self.attack_curve[slot].store(grain.attack_curve, Ordering::Relaxed);
        self.release_curve[slot].store(grain.release_curve, Ordering::Relaxed);
        self.step[slot].store(grain.step.to_bits(), Ordering::Relaxed);
        self.peak_gain[slot].store(grain.peak_gain, Ordering::Relaxed);
        self.active[slot].store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for GrainVisualData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrainVisualData")
            .field("capacity", &self.capacity())
            .finish()
    }
}

// -------------------------------------------------------------------------------------------------

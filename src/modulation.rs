//! External modulation input (sensor or network controlled intensity and rotation values) and
//! its routing into grain parameters.

use std::sync::atomic::Ordering;

use strum::IntoEnumIterator;

use crate::utils::atomic::AtomicF32;

// -------------------------------------------------------------------------------------------------

/// Continuous modulation sources, supplied from outside the engine.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumCount, strum::EnumIter,
)]
#[repr(usize)]
pub enum ModulationSource {
    /// Intensity of a movement or gesture.
    Intensity,
    /// Rotation around a single axis.
    Rotation,
}

/// Grain parameters a [`ModulationSource`] can be routed to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumCount, strum::EnumIter,
)]
#[repr(usize)]
pub enum ModulationDestination {
    /// Grain rate in Hz.
    Rate,
    /// Grain pitch in semitones.
    Pitch,
    /// Grain gain in dB.
    Gain,
    /// Grain panning.
    Pan,
    /// Grain source start position in percent.
    Position,
}

// -------------------------------------------------------------------------------------------------

/// Shared modulation input values.
///
/// Written by an external sensor or network layer at any time, read by the engine once per
/// audio block. Both values are normalized to range 0..=1.
#[derive(Debug, Default)]
pub struct ModulationInput {
    intensity: AtomicF32,
    rotation: AtomicF32,
}

impl ModulationInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intensity(&self) -> f32 {
        self.intensity.load(Ordering::Relaxed)
    }

    /// Set a new intensity value. Values are clamped to 0..=1, NaN is treated as 0.
    pub fn set_intensity(&self, value: f32) {
        self.intensity.store(Self::sanitize(value), Ordering::Relaxed);
    }

    pub fn rotation(&self) -> f32 {
        self.rotation.load(Ordering::Relaxed)
    }

    /// Set a new rotation value. Values are clamped to 0..=1, NaN is treated as 0.
    pub fn set_rotation(&self, value: f32) {
        self.rotation.store(Self::sanitize(value), Ordering::Relaxed);
    }

    /// Read both values at once.
    pub fn values(&self) -> ModulationValues {
        ModulationValues {
            intensity: self.intensity(),
            rotation: self.rotation(),
        }
    }

    fn sanitize(value: f32) -> f32 {
        if value.is_nan() {
            0.0
        } else {
            value.clamp(0.0, 1.0)
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Plain copy of the [`ModulationInput`] values.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ModulationValues {
    pub intensity: f32,
    pub rotation: f32,
}

impl ModulationValues {
    pub fn get(&self, source: ModulationSource) -> f32 {
        match source {
            ModulationSource::Intensity => self.intensity,
            ModulationSource::Rotation => self.rotation,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Additive offsets for all modulation destinations, in the destination parameter's unit.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ModulationOffsets {
    pub rate: f32,
    pub pitch: f32,
    pub gain: f32,
    pub pan: f32,
    pub position: f32,
}

impl ModulationOffsets {
    /// Sum up `value(source) * depth(source, destination)` over all sources for each destination.
    pub fn from_depths(
        values: ModulationValues,
        depth: impl Fn(ModulationSource, ModulationDestination) -> f32,
    ) -> Self {
        let mut offsets = Self::default();
        for destination in ModulationDestination::iter() {
            let offset = ModulationSource::iter()
                .map(|source| values.get(source) * depth(source, destination))
                .sum::<f32>();
            *offsets.get_mut(destination) = offset;
        }
        offsets
    }

    pub fn get(&self, destination: ModulationDestination) -> f32 {
        match destination {
            ModulationDestination::Rate => self.rate,
            ModulationDestination::Pitch => self.pitch,
            ModulationDestination::Gain => self.gain,
            ModulationDestination::Pan => self.pan,
            ModulationDestination::Position => self.position,
        }
    }

    fn get_mut(&mut self, destination: ModulationDestination) -> &mut f32 {
        match destination {
            ModulationDestination::Rate => &mut self.rate,
            ModulationDestination::Pitch => &mut self.pitch,
            ModulationDestination::Gain => &mut self.gain,
            ModulationDestination::Pan => &mut self.pan,
            ModulationDestination::Position => &mut self.position,
        }
    }
}

// -------------------------------------------------------------------------------------------------

use rand::Rng;

use crate::modulation::ModulationOffsets;

// -------------------------------------------------------------------------------------------------

/// A min/max parameter range, sampled uniformly for each spawned grain.
///
/// `min` may be larger than `max`: sampling then simply runs from `max` to `min`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Span {
    pub min: f32,
    pub max: f32,
}

impl Span {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// A span without randomization.
    pub const fn fixed(value: f32) -> Self {
        Self::new(value, value)
    }

    /// Draw a uniformly distributed value from the span. Always consumes one random number, so
    /// fixed spans leave the random sequence of other spans unchanged.
    #[inline]
    pub fn sample<R: Rng>(&self, rng: &mut R) -> f32 {
        self.min + (self.max - self.min) * rng.random::<f32>()
    }
}

// -------------------------------------------------------------------------------------------------

/// Shape of the micro envelope every grain gets, in seconds and curve powers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrainEnvelopeShape {
    pub attack: f32,
    pub sustain: f32,
    pub release: f32,
    pub attack_curve: f32,
    pub release_curve: f32,
}

// -------------------------------------------------------------------------------------------------

/// Immutable copy of all grain parameters, taken once at the start of each audio block.
///
/// All grains spawned within one block see this one configuration, even when the control
/// thread changes parameters while the block renders.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSnapshot {
    pub(crate) version: u64,
    /// Grain pitch offset in semitones.
    pub pitch: Span,
    /// Grain gain in dB.
    pub gain: Span,
    /// Grain panning in range -1..=1.
    pub pan: Span,
    /// Grain source start position in percent of the sample length.
    pub position: Span,
    /// Grains per second each active voice emits.
    pub grain_rate: f32,
    /// Maximum random start delay of grains in seconds.
    pub delay_random_range: f32,
    /// Note number at which the sample plays back unpitched.
    pub root_note: f32,
    pub envelope: GrainEnvelopeShape,
    /// Modulation, added to the parameters above before randomization.
    pub modulation: ModulationOffsets,
}

impl ParameterSnapshot {
    /// Lowest allowed (modulated) grain rate in Hz.
    pub const MIN_GRAIN_RATE: f32 = 1.0;
    /// Highest allowed (modulated) grain rate in Hz.
    pub const MAX_GRAIN_RATE: f32 = 6000.0;

    /// Generation of the parameter store at the time the snapshot was taken.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Grain rate with rate modulation applied, clamped to the valid grain rate range.
    pub fn modulated_grain_rate(&self) -> f32 {
        let rate = self.grain_rate + self.modulation.rate;
        if rate.is_nan() {
            return Self::MIN_GRAIN_RATE;
        }
        rate.clamp(Self::MIN_GRAIN_RATE, Self::MAX_GRAIN_RATE)
    }
}

// -------------------------------------------------------------------------------------------------

/// Voice ADSR settings, captured once per note-on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceTiming {
    /// Attack time in seconds.
    pub attack: f32,
    /// Decay time in seconds.
    pub decay: f32,
    /// Sustain level in range 0..=1.
    pub sustain_level: f32,
    /// Release time in seconds.
    pub release: f32,
    pub attack_power: f32,
    pub decay_power: f32,
    pub release_power: f32,
}

// -------------------------------------------------------------------------------------------------

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use four_cc::FourCC;
use strum::{EnumCount, IntoEnumIterator};

use super::{
    FloatParameter, GrainEnvelopeShape, ParameterScaling, ParameterSnapshot, ParameterStore, Span,
    VoiceTiming,
};
use crate::{
    modulation::{ModulationDestination, ModulationOffsets, ModulationSource, ModulationValues},
    utils::atomic::AtomicF32,
    Error,
};

// -------------------------------------------------------------------------------------------------

/// Index of a bound, non modulation depth parameter cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumCount, strum::EnumIter)]
#[repr(usize)]
enum Slot {
    GrainPitchMin,
    GrainPitchMax,
    GrainGainMin,
    GrainGainMax,
    GrainPanMin,
    GrainPanMax,
    GrainPositionMin,
    GrainPositionMax,
    GrainRate,
    DelayRandomRange,
    RootNote,
    GrainAttack,
    GrainSustain,
    GrainRelease,
    GrainAttackCurve,
    GrainReleaseCurve,
    VoiceAttack,
    VoiceDecay,
    VoiceSustain,
    VoiceRelease,
    VoiceAttackPower,
    VoiceDecayPower,
    VoiceReleasePower,
}

impl Slot {
    const fn descriptor(self) -> FloatParameter {
        match self {
            Slot::GrainPitchMin => ParameterBank::GRAIN_PITCH_MIN,
            Slot::GrainPitchMax => ParameterBank::GRAIN_PITCH_MAX,
            Slot::GrainGainMin => ParameterBank::GRAIN_GAIN_MIN,
            Slot::GrainGainMax => ParameterBank::GRAIN_GAIN_MAX,
            Slot::GrainPanMin => ParameterBank::GRAIN_PAN_MIN,
            Slot::GrainPanMax => ParameterBank::GRAIN_PAN_MAX,
            Slot::GrainPositionMin => ParameterBank::GRAIN_POSITION_MIN,
            Slot::GrainPositionMax => ParameterBank::GRAIN_POSITION_MAX,
            Slot::GrainRate => ParameterBank::GRAIN_RATE,
            Slot::DelayRandomRange => ParameterBank::DELAY_RANDOM_RANGE,
            Slot::RootNote => ParameterBank::ROOT_NOTE,
            Slot::GrainAttack => ParameterBank::GRAIN_ATTACK,
            Slot::GrainSustain => ParameterBank::GRAIN_SUSTAIN,
            Slot::GrainRelease => ParameterBank::GRAIN_RELEASE,
            Slot::GrainAttackCurve => ParameterBank::GRAIN_ATTACK_CURVE,
            Slot::GrainReleaseCurve => ParameterBank::GRAIN_RELEASE_CURVE,
            Slot::VoiceAttack => ParameterBank::VOICE_ATTACK,
            Slot::VoiceDecay => ParameterBank::VOICE_DECAY,
            Slot::VoiceSustain => ParameterBank::VOICE_SUSTAIN,
            Slot::VoiceRelease => ParameterBank::VOICE_RELEASE,
            Slot::VoiceAttackPower => ParameterBank::VOICE_ATTACK_POWER,
            Slot::VoiceDecayPower => ParameterBank::VOICE_DECAY_POWER,
            Slot::VoiceReleasePower => ParameterBank::VOICE_RELEASE_POWER,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Read-only view into the cells of a [`ParameterStore`], bound once on the control thread and
/// then moved into the engine.
///
/// The bank produces the per-block [`ParameterSnapshot`] and the per-note [`VoiceTiming`] by
/// reading each cell once with a relaxed load: values are torn-free per field, and consistent
/// for everything that uses the same snapshot.
#[derive(Clone)]
pub struct ParameterBank {
    cells: Box<[Arc<AtomicF32>]>,
    generation: Arc<AtomicU64>,
}

impl ParameterBank {
    pub const GRAIN_PITCH_MIN: FloatParameter = FloatParameter::new(
        FourCC(*b"GPCN"),
        "Grain Pitch Min",
        -24.0..=24.0,
        0.0,
    )
    .with_unit("st");
    pub const GRAIN_PITCH_MAX: FloatParameter = FloatParameter::new(
        FourCC(*b"GPCX"),
        "Grain Pitch Max",
        -24.0..=24.0,
        0.0,
    )
    .with_unit("st");
    pub const GRAIN_GAIN_MIN: FloatParameter =
        FloatParameter::new(FourCC(*b"GGNN"), "Grain Gain Min", -48.0..=0.0, 0.0).with_unit("dB");
    pub const GRAIN_GAIN_MAX: FloatParameter =
        FloatParameter::new(FourCC(*b"GGNX"), "Grain Gain Max", -48.0..=0.0, 0.0).with_unit("dB");
    pub const GRAIN_PAN_MIN: FloatParameter =
        FloatParameter::new(FourCC(*b"GPNN"), "Grain Pan Min", -1.0..=1.0, 0.0);
    pub const GRAIN_PAN_MAX: FloatParameter =
        FloatParameter::new(FourCC(*b"GPNX"), "Grain Pan Max", -1.0..=1.0, 0.0);
    pub const GRAIN_POSITION_MIN: FloatParameter = FloatParameter::new(
        FourCC(*b"GPSN"),
        "Grain Position Min",
        0.0..=100.0,
        0.0,
    )
    .with_unit("%");
    pub const GRAIN_POSITION_MAX: FloatParameter = FloatParameter::new(
        FourCC(*b"GPSX"),
        "Grain Position Max",
        0.0..=100.0,
        0.0,
    )
    .with_unit("%");
    pub const GRAIN_RATE: FloatParameter =
        FloatParameter::new(FourCC(*b"GRAT"), "Grain Rate", 1.0..=6000.0, 50.0)
            .with_scaling(ParameterScaling::Exponential(2.0))
            .with_unit("Hz");
    pub const DELAY_RANDOM_RANGE: FloatParameter =
        FloatParameter::new(FourCC(*b"GDLY"), "Delay Random Range", 0.0..=1.0, 0.0)
            .with_unit("s");
    pub const ROOT_NOTE: FloatParameter =
        FloatParameter::new(FourCC(*b"ROOT"), "Root Note", 0.0..=127.0, 60.0);

    pub const GRAIN_ATTACK: FloatParameter =
        FloatParameter::new(FourCC(*b"GEAT"), "Grain Attack", 0.01..=1.0, 0.01).with_unit("s");
    pub const GRAIN_SUSTAIN: FloatParameter =
        FloatParameter::new(FourCC(*b"GESU"), "Grain Sustain", 0.01..=1.0, 0.01).with_unit("s");
    pub const GRAIN_RELEASE: FloatParameter =
        FloatParameter::new(FourCC(*b"GERL"), "Grain Release", 0.01..=1.0, 0.01).with_unit("s");
    pub const GRAIN_ATTACK_CURVE: FloatParameter =
        FloatParameter::new(FourCC(*b"GEAC"), "Grain Attack Curve", 0.1..=10.0, 1.0);
    pub const GRAIN_RELEASE_CURVE: FloatParameter =
        FloatParameter::new(FourCC(*b"GERC"), "Grain Release Curve", 0.1..=10.0, 1.0);

    pub const VOICE_ATTACK: FloatParameter =
        FloatParameter::new(FourCC(*b"VATK"), "Voice Attack", 0.0..=10.0, 0.01)
            .with_scaling(ParameterScaling::Exponential(3.0))
            .with_unit("s");
    pub const VOICE_DECAY: FloatParameter =
        FloatParameter::new(FourCC(*b"VDCY"), "Voice Decay", 0.0..=10.0, 0.1)
            .with_scaling(ParameterScaling::Exponential(3.0))
            .with_unit("s");
    pub const VOICE_SUSTAIN: FloatParameter =
        FloatParameter::new(FourCC(*b"VSUS"), "Voice Sustain", 0.0..=1.0, 1.0);
    pub const VOICE_RELEASE: FloatParameter =
        FloatParameter::new(FourCC(*b"VREL"), "Voice Release", 0.0..=10.0, 0.3)
            .with_scaling(ParameterScaling::Exponential(3.0))
            .with_unit("s");
    pub const VOICE_ATTACK_POWER: FloatParameter =
        FloatParameter::new(FourCC(*b"VATC"), "Voice Attack Curve", 0.1..=10.0, 1.0);
    pub const VOICE_DECAY_POWER: FloatParameter =
        FloatParameter::new(FourCC(*b"VDCC"), "Voice Decay Curve", 0.1..=10.0, 1.0);
    pub const VOICE_RELEASE_POWER: FloatParameter =
        FloatParameter::new(FourCC(*b"VRLC"), "Voice Release Curve", 0.1..=10.0, 1.0);

    pub const MOD_INTENSITY_RATE: FloatParameter =
        FloatParameter::new(FourCC(*b"MIRT"), "Intensity > Rate", -200.0..=200.0, 0.0)
            .with_unit("Hz");
    pub const MOD_INTENSITY_PITCH: FloatParameter =
        FloatParameter::new(FourCC(*b"MIPT"), "Intensity > Pitch", -24.0..=24.0, 0.0)
            .with_unit("st");
    pub const MOD_INTENSITY_GAIN: FloatParameter =
        FloatParameter::new(FourCC(*b"MIGN"), "Intensity > Gain", -48.0..=64.0, 0.0)
            .with_unit("dB");
    pub const MOD_INTENSITY_PAN: FloatParameter =
        FloatParameter::new(FourCC(*b"MIPN"), "Intensity > Pan", -1.0..=1.0, 0.0);
    pub const MOD_INTENSITY_POSITION: FloatParameter =
        FloatParameter::new(FourCC(*b"MIPS"), "Intensity > Position", -100.0..=100.0, 0.0)
            .with_unit("%");
    pub const MOD_ROTATION_RATE: FloatParameter =
        FloatParameter::new(FourCC(*b"MRRT"), "Rotation > Rate", -200.0..=200.0, 0.0)
            .with_unit("Hz");
    pub const MOD_ROTATION_PITCH: FloatParameter =
        FloatParameter::new(FourCC(*b"MRPT"), "Rotation > Pitch", -24.0..=24.0, 0.0)
            .with_unit("st");
    pub const MOD_ROTATION_GAIN: FloatParameter =
        FloatParameter::new(FourCC(*b"MRGN"), "Rotation > Gain", -48.0..=64.0, 0.0)
            .with_unit("dB");
    pub const MOD_ROTATION_PAN: FloatParameter =
        FloatParameter::new(FourCC(*b"MRPN"), "Rotation > Pan", -1.0..=1.0, 0.0);
    pub const MOD_ROTATION_POSITION: FloatParameter =
        FloatParameter::new(FourCC(*b"MRPS"), "Rotation > Position", -100.0..=100.0, 0.0)
            .with_unit("%");

    /// Descriptor of the depth parameter which routes `source` into `destination`.
    pub const fn modulation_depth(
        source: ModulationSource,
        destination: ModulationDestination,
    ) -> FloatParameter {
        use ModulationDestination as D;
        use ModulationSource as S;
        match (source, destination) {
            (S::Intensity, D::Rate) => Self::MOD_INTENSITY_RATE,
            (S::Intensity, D::Pitch) => Self::MOD_INTENSITY_PITCH,
            (S::Intensity, D::Gain) => Self::MOD_INTENSITY_GAIN,
            (S::Intensity, D::Pan) => Self::MOD_INTENSITY_PAN,
            (S::Intensity, D::Position) => Self::MOD_INTENSITY_POSITION,
            (S::Rotation, D::Rate) => Self::MOD_ROTATION_RATE,
            (S::Rotation, D::Pitch) => Self::MOD_ROTATION_PITCH,
            (S::Rotation, D::Gain) => Self::MOD_ROTATION_GAIN,
            (S::Rotation, D::Pan) => Self::MOD_ROTATION_PAN,
            (S::Rotation, D::Position) => Self::MOD_ROTATION_POSITION,
        }
    }

    /// All parameter descriptors a bank binds to, in binding order.
    pub fn descriptors() -> Vec<FloatParameter> {
        Slot::iter()
            .map(Slot::descriptor)
            .chain(ModulationSource::iter().flat_map(|source| {
                ModulationDestination::iter()
                    .map(move |destination| Self::modulation_depth(source, destination))
            }))
            .collect()
    }

    /// Bind to the cells of the given store. Fails when the store lacks one of the
    /// [`Self::descriptors`].
    pub fn bind(store: &ParameterStore) -> Result<Self, Error> {
        let cells = Self::descriptors()
            .iter()
            .map(|descriptor| {
                store.cell(descriptor.id()).ok_or_else(|| {
                    Error::ParameterError(format!(
                        "Parameter '{}' ({}) is missing in the parameter store",
                        descriptor.name(),
                        descriptor.id()
                    ))
                })
            })
            .collect::<Result<Box<[_]>, _>>()?;
        let generation = store.generation_handle();
        Ok(Self { cells, generation })
    }

    /// Capture all grain parameters, plus the modulation offsets of the given modulation
    /// input values, into an immutable snapshot.
    pub fn snapshot(&self, modulation: ModulationValues) -> ParameterSnapshot {
        let version = self.generation.load(Ordering::Acquire);
        build_snapshot(
            version,
            |slot| self.cells[slot as usize].load(Ordering::Relaxed),
            |source, destination| self.cells[depth_index(source, destination)].load(Ordering::Relaxed),
            modulation,
        )
    }

    /// Capture the voice envelope parameters a note-on applies.
    pub fn voice_timing(&self) -> VoiceTiming {
        build_voice_timing(|slot| self.cells[slot as usize].load(Ordering::Relaxed))
    }
}

impl std::fmt::Debug for ParameterBank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterBank")
            .field("cells", &self.cells.len())
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish()
    }
}

// -------------------------------------------------------------------------------------------------

impl Default for ParameterSnapshot {
    /// A snapshot with all parameters at their default values and no modulation.
    fn default() -> Self {
        build_snapshot(
            0,
            |slot| slot.descriptor().default_value(),
            |source, destination| {
                ParameterBank::modulation_depth(source, destination).default_value()
            },
            ModulationValues::default(),
        )
    }
}

impl Default for VoiceTiming {
    fn default() -> Self {
        build_voice_timing(|slot| slot.descriptor().default_value())
    }
}

// -------------------------------------------------------------------------------------------------

fn depth_index(source: ModulationSource, destination: ModulationDestination) -> usize {
    Slot::COUNT + source as usize * ModulationDestination::COUNT + destination as usize
}

fn build_snapshot(
    version: u64,
    value: impl Fn(Slot) -> f32,
    depth: impl Fn(ModulationSource, ModulationDestination) -> f32,
    modulation: ModulationValues,
) -> ParameterSnapshot {
    let span = |min, max| Span::new(value(min), value(max));
    ParameterSnapshot {
        version,
        pitch: span(Slot::GrainPitchMin, Slot::GrainPitchMax),
        gain: span(Slot::GrainGainMin, Slot::GrainGainMax),
        pan: span(Slot::GrainPanMin, Slot::GrainPanMax),
        position: span(Slot::GrainPositionMin, Slot::GrainPositionMax),
        grain_rate: value(Slot::GrainRate),
        delay_random_range: value(Slot::DelayRandomRange),
        root_note: value(Slot::RootNote),
        envelope: GrainEnvelopeShape {
            attack: value(Slot::GrainAttack),
            sustain: value(Slot::GrainSustain),
            release: value(Slot::GrainRelease),
            attack_curve: value(Slot::GrainAttackCurve),
            release_curve: value(Slot::GrainReleaseCurve),
        },
        modulation: ModulationOffsets::from_depths(modulation, depth),
    }
}

fn build_voice_timing(value: impl Fn(Slot) -> f32) -> VoiceTiming {
    VoiceTiming {
        attack: value(Slot::VoiceAttack),
        decay: value(Slot::VoiceDecay),
        sustain_level: value(Slot::VoiceSustain),
        release: value(Slot::VoiceRelease),
        attack_power: value(Slot::VoiceAttackPower),
        decay_power: value(Slot::VoiceDecayPower),
        release_power: value(Slot::VoiceReleasePower),
    }
}

// -------------------------------------------------------------------------------------------------

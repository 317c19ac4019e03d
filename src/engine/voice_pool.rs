//! Fixed size, structure-of-arrays storage for voices: one slot per MIDI note.

use crate::utils::{aligned::CacheAligned, bitset::BitSet};

// -------------------------------------------------------------------------------------------------

/// Number of voices: one for each MIDI note number.
pub const VOICE_POOL_CAPACITY: usize = 128;

const VOICE_POOL_WORDS: usize = VOICE_POOL_CAPACITY / 64;

type Lane<T> = CacheAligned<[T; VOICE_POOL_CAPACITY]>;

// -------------------------------------------------------------------------------------------------

/// Processing stage of a voice's ADSR envelope.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum VoiceStage {
    Attack,
    Decay,
    Sustain,
    Release,
    #[default]
    /// Before the first note-on and after the release finished.
    Idle,
}

// -------------------------------------------------------------------------------------------------

/// Envelope and grain scheduling state of all voices.
///
/// Voices are addressed by note number. A repeated note-on for a sounding note retriggers that
/// note's voice instead of stacking a second one.
pub struct VoicePool {
    pub(crate) active: BitSet<VOICE_POOL_WORDS>,
    pub(crate) stage: Lane<VoiceStage>,
    pub(crate) level: Lane<f32>,
    pub(crate) level_step: Lane<f32>,
    pub(crate) stage_samples_left: Lane<u32>,
    pub(crate) spawn_cursor: Lane<f64>,
    pub(crate) attack_samples: Lane<u32>,
    pub(crate) decay_samples: Lane<u32>,
    pub(crate) release_samples: Lane<u32>,
    pub(crate) sustain_level: Lane<f32>,
    pub(crate) release_start: Lane<f32>,
    pub(crate) attack_power: Lane<f32>,
    pub(crate) decay_power: Lane<f32>,
    pub(crate) release_power: Lane<f32>,
}

impl VoicePool {
    /// Total number of voices.
    pub const CAPACITY: usize = VOICE_POOL_CAPACITY;

    pub fn new() -> Box<Self> {
        Box::new(Self {
            active: BitSet::new(),
            stage: CacheAligned([VoiceStage::Idle; VOICE_POOL_CAPACITY]),
            level: CacheAligned([0.0; VOICE_POOL_CAPACITY]),
            level_step: CacheAligned([0.0; VOICE_POOL_CAPACITY]),
            stage_samples_left: CacheAligned([0; VOICE_POOL_CAPACITY]),
            spawn_cursor: CacheAligned([0.0; VOICE_POOL_CAPACITY]),
            attack_samples: CacheAligned([0; VOICE_POOL_CAPACITY]),
            decay_samples: CacheAligned([0; VOICE_POOL_CAPACITY]),
            release_samples: CacheAligned([0; VOICE_POOL_CAPACITY]),
            sustain_level: CacheAligned([0.0; VOICE_POOL_CAPACITY]),
            release_start: CacheAligned([0.0; VOICE_POOL_CAPACITY]),
            attack_power: CacheAligned([1.0; VOICE_POOL_CAPACITY]),
            decay_power: CacheAligned([1.0; VOICE_POOL_CAPACITY]),
            release_power: CacheAligned([1.0; VOICE_POOL_CAPACITY]),
        })
    }

    /// Silence and deactivate all voices.
    pub fn clear(&mut self) {
        self.active.clear();
        self.stage.fill(VoiceStage::Idle);
        self.level.fill(0.0);
        self.spawn_cursor.fill(0.0);
    }

    /// Number of sounding voices.
    pub fn active_count(&self) -> usize {
        self.active.count()
    }

    pub fn is_active(&self, voice: usize) -> bool {
        voice < Self::CAPACITY && self.active.test(voice)
    }

    /// Current envelope stage of the given voice.
    pub fn stage(&self, voice: usize) -> VoiceStage {
        self.stage.get(voice).copied().unwrap_or_default()
    }

    /// Current envelope level of the given voice.
    pub fn level(&self, voice: usize) -> f32 {
        self.level.get(voice).copied().unwrap_or(0.0)
    }

    /// True for voices which are held and thus emit grains.
    pub fn is_spawning(&self, voice: usize) -> bool {
        self.is_active(voice)
            && matches!(
                self.stage[voice],
                VoiceStage::Attack | VoiceStage::Decay | VoiceStage::Sustain
            )
    }
}

impl std::fmt::Debug for VoicePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoicePool")
            .field("active", &self.active_count())
            .field("capacity", &Self::CAPACITY)
            .finish()
    }
}

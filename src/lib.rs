#![doc = include_str!("../README.md")]

// private mods (will be partly re-exported)
mod engine;
mod error;
mod modulation;
mod parameter;

// public, flat re-exports
pub use error::Error;

pub use engine::{
    Grain, GrainEngine, GrainEngineOptions, GrainPool, GrainProcessor, GrainSpawner, GrainVisual,
    GrainVisualData, GrainVisualSink, LoadedSample, NoteEvent, NoteEventKind, RenderClock,
    VoicePool, VoiceStage, GRAIN_POOL_CAPACITY, VOICE_POOL_CAPACITY,
};

pub use modulation::{
    ModulationDestination, ModulationInput, ModulationOffsets, ModulationSource,
    ModulationValues,
};

pub use parameter::{
    FloatParameter, GrainEnvelopeShape, ParameterBank, ParameterScaling, ParameterSnapshot,
    ParameterStore, Span, VoiceTiming,
};

// public mods
pub mod utils;

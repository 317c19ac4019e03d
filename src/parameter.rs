//! Parameter descriptors, the shared parameter store, and the per-block snapshots the audio
//! thread reads from it.

// -------------------------------------------------------------------------------------------------

mod bank;
mod float;
mod scaling;
mod snapshot;
mod store;

// -------------------------------------------------------------------------------------------------

pub use bank::ParameterBank;
pub use float::FloatParameter;
pub use scaling::ParameterScaling;
pub use snapshot::{GrainEnvelopeShape, ParameterSnapshot, Span, VoiceTiming};
pub use store::ParameterStore;

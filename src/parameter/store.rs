use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use four_cc::FourCC;

use super::{FloatParameter, ParameterBank};
use crate::{utils::atomic::AtomicF32, Error};

// -------------------------------------------------------------------------------------------------

struct ParameterEntry {
    descriptor: FloatParameter,
    cell: Arc<AtomicF32>,
}

// -------------------------------------------------------------------------------------------------

/// Owns the shared parameter values of an engine.
///
/// Each parameter lives in its own atomic cell, so the control thread can change values at any
/// time via `&self` while the audio thread reads them through a bound [`ParameterBank`].
/// Every successful write bumps a generation counter, which shows up as
/// [`ParameterSnapshot::version`](super::ParameterSnapshot::version).
pub struct ParameterStore {
    entries: Vec<ParameterEntry>,
    generation: Arc<AtomicU64>,
}

impl ParameterStore {
    /// Create a store with all parameters an engine needs, set to their default values.
    pub fn new() -> Self {
        Self::from_descriptors(ParameterBank::descriptors())
    }

    /// Create a store with a custom set of parameters. Fails when ids are not unique.
    ///
    /// Note that a [`ParameterBank`] can only be bound to stores which contain all
    /// [`ParameterBank::descriptors`].
    pub fn with_descriptors(
        descriptors: impl IntoIterator<Item = FloatParameter>,
    ) -> Result<Self, Error> {
        let descriptors = descriptors.into_iter().collect::<Vec<_>>();
        for (index, descriptor) in descriptors.iter().enumerate() {
            if descriptors[..index]
                .iter()
                .any(|other| other.id() == descriptor.id())
            {
                return Err(Error::ParameterError(format!(
                    "Duplicate parameter id '{}'",
                    descriptor.id()
                )));
            }
        }
        Ok(Self::from_descriptors(descriptors))
    }

    fn from_descriptors(descriptors: impl IntoIterator<Item = FloatParameter>) -> Self {
        let entries = descriptors
            .into_iter()
            .map(|descriptor| {
                let cell = Arc::new(AtomicF32::new(descriptor.default_value()));
                ParameterEntry { descriptor, cell }
            })
            .collect();
        let generation = Arc::new(AtomicU64::new(0));
        Self {
            entries,
            generation,
        }
    }

    /// All parameter descriptors in this store.
    pub fn descriptors(&self) -> impl Iterator<Item = &FloatParameter> {
        self.entries.iter().map(|entry| &entry.descriptor)
    }

    /// Descriptor of the parameter with the given id.
    pub fn descriptor(&self, id: FourCC) -> Option<&FloatParameter> {
        self.entry(id).map(|entry| &entry.descriptor)
    }

    /// Current plain value of the parameter with the given id.
    pub fn value(&self, id: FourCC) -> Option<f32> {
        self.entry(id)
            .map(|entry| entry.cell.load(Ordering::Relaxed))
    }

    /// Set a plain parameter value. Values get clamped to the parameter's range.
    pub fn set_value(&self, id: FourCC, value: f32) -> Result<(), Error> {
        let entry = self.entry_or_error(id)?;
        if value.is_nan() {
            log::warn!("Ignoring NaN value for parameter '{id}'");
            return Err(Error::ParameterError(format!(
                "Invalid NaN value for parameter '{id}'"
            )));
        }
        let value = entry.descriptor.clamp_value(value);
        entry.cell.store(value, Ordering::Relaxed);
        self.generation.fetch_add(1, Ordering::Release);
        Ok(())
    }

    /// Set a parameter from a normalized 0.0-1.0 value, applying the parameter's scaling.
    pub fn set_normalized(&self, id: FourCC, normalized: f32) -> Result<(), Error> {
        let entry = self.entry_or_error(id)?;
        if normalized.is_nan() {
            log::warn!("Ignoring NaN normalized value for parameter '{id}'");
            return Err(Error::ParameterError(format!(
                "Invalid NaN value for parameter '{id}'"
            )));
        }
        let value = entry.descriptor.denormalize_value(normalized);
        entry.cell.store(value, Ordering::Relaxed);
        self.generation.fetch_add(1, Ordering::Release);
        Ok(())
    }

    /// Reset all parameters to their default values.
    pub fn reset_to_defaults(&self) {
        for entry in &self.entries {
            entry
                .cell
                .store(entry.descriptor.default_value(), Ordering::Relaxed);
        }
        self.generation.fetch_add(1, Ordering::Release);
    }

    /// Number of writes applied to this store so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub(crate) fn cell(&self, id: FourCC) -> Option<Arc<AtomicF32>> {
        self.entry(id).map(|entry| Arc::clone(&entry.cell))
    }

    pub(crate) fn generation_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.generation)
    }

    fn entry(&self, id: FourCC) -> Option<&ParameterEntry> {
        self.entries.iter().find(|entry| entry.descriptor.id() == id)
    }

    fn entry_or_error(&self, id: FourCC) -> Result<&ParameterEntry, Error> {
        self.entry(id).ok_or_else(|| {
            log::warn!("Trying to set unknown parameter '{id}'");
            Error::ParameterError(format!("Unknown parameter '{id}'"))
        })
    }
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ParameterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterStore")
            .field("parameters", &self.entries.len())
            .field("generation", &self.generation())
            .finish()
    }
}

// -------------------------------------------------------------------------------------------------

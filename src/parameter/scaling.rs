use std::fmt::Debug;

// -------------------------------------------------------------------------------------------------

/// Float parameter scaling, applied to convert normalized host or UI values to plain values.
#[derive(Default, Debug, Clone, Copy, PartialEq)]
pub enum ParameterScaling {
    #[default]
    /// Linear scaling: `y = x` (no transformation applied)
    Linear,

    /// Exponential scaling: `y = x^factor`
    /// Factor must be > 0.0.
    ///
    /// Values > 1.0 spend more of the normalized range on small plain values, which is what
    /// grain rates and envelope times want.
    Exponential(f32),
}

impl ParameterScaling {
    /// Apply scaling to a normalized value.
    pub fn scale(&self, value: f32) -> f32 {
        debug_assert!(
            (0.0..=1.0).contains(&value),
            "Expecting a normalized value here"
        );
        match self {
            ParameterScaling::Linear => value,
            ParameterScaling::Exponential(factor) => value.powf(*factor),
        }
    }

    /// Apply inverse scaling to a normalized value.
    pub fn unscale(&self, value: f32) -> f32 {
        debug_assert!(
            (0.0..=1.0).contains(&value),
            "Expecting a normalized value here"
        );
        match self {
            ParameterScaling::Linear => value,
            ParameterScaling::Exponential(factor) => {
                let factor = factor.abs().max(0.001);
                value.powf(1.0 / factor)
            }
        }
    }

    pub(crate) const fn validate(&self) {
        match self {
            ParameterScaling::Linear => {}
            ParameterScaling::Exponential(factor) => {
                assert!(
                    *factor > 0.0,
                    "Invalid exponential parameter scaling factor (must be > 0)"
                );
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

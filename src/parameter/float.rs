use std::ops::RangeInclusive;

use four_cc::FourCC;

use super::ParameterScaling;

// -------------------------------------------------------------------------------------------------

/// A continuous (float) parameter descriptor: identity, display name, plain value range,
/// default value, optional unit and scaling for normalized values.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatParameter {
    id: FourCC,
    name: &'static str,
    range: RangeInclusive<f32>,
    default: f32,
    unit: &'static str,
    scaling: ParameterScaling,
}

impl FloatParameter {
    /// Create a new float parameter descriptor.
    pub const fn new(
        id: FourCC,
        name: &'static str,
        range: RangeInclusive<f32>,
        default: f32,
    ) -> Self {
        assert!(
            default >= *range.start() && default <= *range.end(),
            "Invalid parameter default value"
        );
        Self {
            id,
            name,
            range,
            default,
            unit: "",
            scaling: ParameterScaling::Linear,
        }
    }

    /// Optional unit for string displays.
    pub const fn with_unit(mut self, unit: &'static str) -> Self {
        self.unit = unit;
        self
    }

    /// Optional scaling, applied when converting normalized values to plain values.
    pub const fn with_scaling(mut self, scaling: ParameterScaling) -> Self {
        scaling.validate();
        self.scaling = scaling;
        self
    }

    /// The parameter's unique id.
    pub const fn id(&self) -> FourCC {
        self.id
    }

    /// The parameter's display name.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// The parameter's unit, or an empty string.
    pub const fn unit(&self) -> &'static str {
        self.unit
    }

    /// The parameter's value range.
    pub fn range(&self) -> &RangeInclusive<f32> {
        &self.range
    }

    /// The parameter's default value.
    pub const fn default_value(&self) -> f32 {
        self.default
    }

    /// The parameter's normalized value scaling.
    pub const fn scaling(&self) -> ParameterScaling {
        self.scaling
    }

    /// Clamp the given plain value to the parameter's range.
    pub fn clamp_value(&self, value: f32) -> f32 {
        value.clamp(*self.range.start(), *self.range.end())
    }

    /// Normalize the given plain value to a 0.0-1.0 range, applying the inverse scaling.
    pub fn normalize_value(&self, value: f32) -> f32 {
        let (start, end) = (*self.range.start(), *self.range.end());
        let linear = ((self.clamp_value(value) - start) / (end - start)).clamp(0.0, 1.0);
        self.scaling.unscale(linear)
    }

    /// Denormalize a 0.0-1.0 ranged value to the corresponding plain value, applying the scaling.
    pub fn denormalize_value(&self, normalized: f32) -> f32 {
        let (start, end) = (*self.range.start(), *self.range.end());
        start + self.scaling.scale(normalized.clamp(0.0, 1.0)) * (end - start)
    }

    /// Convert the given plain value to a string, optionally including the unit.
    pub fn value_to_string(&self, value: f32, include_unit: bool) -> String {
        if include_unit && !self.unit.is_empty() {
            format!("{:.2} {}", value, self.unit)
        } else {
            format!("{:.2}", value)
        }
    }
}

// -------------------------------------------------------------------------------------------------

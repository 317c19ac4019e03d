/// Amplitude above which the soft limiter starts compressing.
const KNEE: f32 = 1.0;
/// Hard ceiling of the soft limiter's input.
const CEILING: f32 = 2.0;

// -------------------------------------------------------------------------------------------------

/// Soft limit a single sample: transparent up to 0dBFS, 2:1 compression above, with the input
/// hard clipped at +/-2.0 so the output never exceeds +/-1.5.
#[inline]
pub fn soft_limit(value: f32) -> f32 {
    let clamped = value.clamp(-CEILING, CEILING);
    let magnitude = clamped.abs();
    if magnitude <= KNEE {
        clamped
    } else {
        (KNEE + (magnitude - KNEE) * 0.5).copysign(clamped)
    }
}

/// Apply [`soft_limit`] to all samples in the given buffer.
pub fn soft_limit_buffer(buffer: &mut [f32]) {
    for sample in buffer.iter_mut() {
        *sample = soft_limit(*sample);
    }
}

// -------------------------------------------------------------------------------------------------

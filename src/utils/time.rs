/// Sample frame time in the engine's render clock.
pub type SampleTime = u64;

// -------------------------------------------------------------------------------------------------

/// Convert a duration in seconds to a number of sample frames at the given rate, rounding to
/// the nearest frame. Negative or NaN durations are 0 frames.
#[inline]
pub fn seconds_to_frames(seconds: f32, sample_rate: f64) -> u32 {
    let frames = (seconds as f64 * sample_rate).round();
    if frames > 0.0 {
        frames.min(u32::MAX as f64) as u32
    } else {
        0
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames() {
        assert_eq!(seconds_to_frames(1.0, 48000.0), 48000);
        assert_eq!(seconds_to_frames(0.01, 44100.0), 441);
        assert_eq!(seconds_to_frames(0.0, 48000.0), 0);
        assert_eq!(seconds_to_frames(-1.0, 48000.0), 0);
        assert_eq!(seconds_to_frames(f32::NAN, 48000.0), 0);
    }
}

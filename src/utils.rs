//! Gain, pitch and panning conversions plus small real-time safe building blocks.

pub mod aligned;
pub mod atomic;
pub mod bitset;
pub mod buffer;
pub mod limiter;
pub mod time;

// -------------------------------------------------------------------------------------------------

const MINUS_INF_IN_DB: f32 = -200.0f32;

const LIN_TO_DB_FACTOR: f32 = 20.0f32 / std::f32::consts::LN_10;
const DB_TO_LIN_FACTOR: f32 = std::f32::consts::LN_10 / 20.0f32;

// -------------------------------------------------------------------------------------------------

/// Convert a linear gain factor to decibels. Values at or below ~-240dB map to -200dB.
pub fn linear_to_db(value: f32) -> f32 {
    if value == 1.0 {
        return 0.0; // avoid rounding errors at exactly 0 dB
    } else if value > 1e-12f32 {
        return value.ln() * LIN_TO_DB_FACTOR;
    }
    MINUS_INF_IN_DB
}

/// Convert decibels to a linear gain factor. Values at or below -200dB map to 0.0.
pub fn db_to_linear(value: f32) -> f32 {
    if value == 0.0f32 {
        return 1.0f32; // avoid rounding errors at exactly 0 dB
    } else if value > MINUS_INF_IN_DB {
        return (value * DB_TO_LIN_FACTOR).exp();
    }
    0.0f32
}

// -------------------------------------------------------------------------------------------------

/// Frequency ratio of the given transposition in semitones.
#[inline]
pub fn semitones_to_ratio(semitones: f64) -> f64 {
    (semitones / 12.0).exp2()
}

/// Playback step of a sample recorded at `source_rate`, played on a host running at `host_rate`
/// with the given note, root note and additional pitch offset in semitones.
#[inline]
pub fn pitch_step(
    source_rate: f64,
    host_rate: f64,
    note: u8,
    root_note: f32,
    pitch_offset: f32,
) -> f64 {
    let transpose = note as f64 - root_note.round() as f64;
    (source_rate / host_rate) * semitones_to_ratio(transpose) * semitones_to_ratio(pitch_offset as f64)
}

// -------------------------------------------------------------------------------------------------

/// Constant power pan law. Returns (left, right) gain factors for a panning value in range
/// -1.0 (left) ..= 1.0 (right). Center pans both sides by -3dB.
#[inline]
pub fn panning_factors(panning: f32) -> (f32, f32) {
    let angle = (panning.clamp(-1.0, 1.0) + 1.0) * std::f32::consts::FRAC_PI_4;
    (angle.cos(), angle.sin())
}

// -------------------------------------------------------------------------------------------------

//! Allocation free helpers for interleaved audio buffers.

// -------------------------------------------------------------------------------------------------

/// Fill the given buffer with zeros.
#[inline]
pub fn clear_buffer(buffer: &mut [f32]) {
    buffer.fill(0.0);
}

/// Multiply all samples in the given buffer by `gain`. Unity gain is a no-op.
#[inline]
pub fn scale_buffer(buffer: &mut [f32], gain: f32) {
    if gain != 1.0 {
        for sample in buffer.iter_mut() {
            *sample *= gain;
        }
    }
}

/// Copy an interleaved buffer into pre-allocated planar channel buffers.
///
/// `planar` must hold `channel_count` buffers with at least `interleaved.len() / channel_count`
/// samples each.
pub fn interleaved_to_planar(interleaved: &[f32], planar: &mut [Vec<f32>]) {
    let channel_count = planar.len();
    if channel_count == 0 {
        return;
    }
    debug_assert!(
        interleaved.len() % channel_count == 0,
        "Invalid interleaved buffer layout"
    );
    for (frame_index, frame) in interleaved.chunks_exact(channel_count).enumerate() {
        for (channel, sample) in planar.iter_mut().zip(frame) {
            channel[frame_index] = *sample;
        }
    }
}

// -------------------------------------------------------------------------------------------------

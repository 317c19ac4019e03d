//! Renders all active grains into an output buffer.

use super::{
    envelope::pow_curve,
    grain_pool::GrainPool,
    sample::LoadedSample,
    voice_pool::{VoicePool, VOICE_POOL_CAPACITY},
};
use crate::utils::bitset::BitSet;

// -------------------------------------------------------------------------------------------------

/// Gain of a grain's micro envelope at `elapsed` frames into a grain of `length` frames.
///
/// The attack ramps from 0.0 at frame 0 towards 1.0 at frame `attack`, and the release ramps
/// from 1.0 down to 0.0 at the grain's last frame. Where attack and release overlap, the lower
/// gain wins.
#[inline]
pub(crate) fn grain_envelope(
    elapsed: u32,
    length: u32,
    attack: u32,
    release: u32,
    attack_curve: f32,
    release_curve: f32,
) -> f32 {
    let attack_gain = if elapsed < attack {
        pow_curve(elapsed as f32 / attack as f32, attack_curve)
    } else {
        1.0
    };
    let release_gain = if release > 0 && elapsed >= length.saturating_sub(release) {
        let remaining = length.saturating_sub(elapsed + 1);
        pow_curve(remaining as f32 / release as f32, release_curve)
    } else {
        1.0
    };
    attack_gain.min(release_gain)
}

// -------------------------------------------------------------------------------------------------

/// Renders grains frame by frame, mixing them through per voice busses which are scaled by the
/// voice's envelope level.
pub struct GrainProcessor {
    bus_left: [f32; VOICE_POOL_CAPACITY],
    bus_right: [f32; VOICE_POOL_CAPACITY],
}

impl GrainProcessor {
    pub fn new() -> Self {
        Self {
            bus_left: [0.0; VOICE_POOL_CAPACITY],
            bus_right: [0.0; VOICE_POOL_CAPACITY],
        }
    }

    /// Render and add all active grains into the given interleaved stereo `output` buffer,
    /// advancing voice envelopes once per frame. Grains are retired when they finished.
    ///
    /// Mono sources play on both channels. Of multi channel sources, only the first two channels
    /// are used.
    pub fn process(
        &mut self,
        output: &mut [f32],
        sample: &LoadedSample,
        grains: &mut GrainPool,
        voices: &mut VoicePool,
    ) {
        debug_assert!(output.len() % 2 == 0, "Expecting an interleaved stereo buffer");
        if grains.is_empty() && voices.active_count() == 0 {
            return;
        }
        let right_channel = if sample.channel_count() > 1 { 1 } else { 0 };
        for frame in output.chunks_exact_mut(2) {
            voices.advance_envelopes();

            let mut used_busses = BitSet::<2>::new();
            for slot in grains.active {
                let delay = grains.delay[slot];
                if delay > 0 {
                    grains.delay[slot] = delay - 1;
                    continue;
                }
                let length = grains.length[slot];
                let remaining = grains.frames[slot];
                let envelope = grain_envelope(
                    length - remaining,
                    length,
                    grains.env_attack_frames[slot],
                    grains.env_release_frames[slot],
                    grains.env_attack_curve[slot],
                    grains.env_release_curve[slot],
                );
                let position = grains.sample_pos[slot];
                let left = sample.read_interpolated(0, position);
                let right = sample.read_interpolated(right_channel, position);
                let amplitude = envelope * grains.gain[slot];

                let voice = grains.voice[slot] as usize;
                self.bus_left[voice] += left * amplitude * grains.pan_left[slot];
                self.bus_right[voice] += right * amplitude * grains.pan_right[slot];
                used_busses.set(voice);

                grains.sample_pos[slot] = position + grains.step[slot];
                grains.frames[slot] = remaining - 1;
                if remaining <= 1 {
                    grains.retire(slot);
                }
            }

            for voice in used_busses {
                let level = voices.level[voice];
                frame[0] += self.bus_left[voice] * level;
                frame[1] += self.bus_right[voice] * level;
                self.bus_left[voice] = 0.0;
                self.bus_right[voice] = 0.0;
            }
        }
    }
}

impl Default for GrainProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GrainProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrainProcessor").finish()
    }
}

// -------------------------------------------------------------------------------------------------

//! Per-sample ADSR state machine for the voices of a [`VoicePool`].

use super::voice_pool::{VoicePool, VoiceStage};
use crate::{parameter::VoiceTiming, utils::time::seconds_to_frames};

// -------------------------------------------------------------------------------------------------

/// Decay levels below this are treated as silent: the voice stops early.
const DECAY_SILENCE: f32 = 0.0001; // -80dB
/// Release levels below this are treated as silent: the voice stops early.
const RELEASE_SILENCE: f32 = 0.001; // -60dB

// -------------------------------------------------------------------------------------------------

/// Evaluate `x^power` with `x` clamped to 0..=1.
#[inline]
pub(crate) fn pow_curve(x: f32, power: f32) -> f32 {
    x.clamp(0.0, 1.0).powf(power)
}

// -------------------------------------------------------------------------------------------------

impl VoicePool {
    /// Start or retrigger the given voice with the given envelope timing.
    pub fn note_on(&mut self, voice: usize, timing: &VoiceTiming, sample_rate: f64) {
        if voice >= Self::CAPACITY {
            return;
        }
        self.attack_samples[voice] = seconds_to_frames(timing.attack, sample_rate);
        self.decay_samples[voice] = seconds_to_frames(timing.decay, sample_rate);
        self.release_samples[voice] = seconds_to_frames(timing.release, sample_rate);
        self.sustain_level[voice] = timing.sustain_level.clamp(0.0, 1.0);
        self.attack_power[voice] = timing.attack_power;
        self.decay_power[voice] = timing.decay_power;
        self.release_power[voice] = timing.release_power;
        self.active.set(voice);
        self.enter_stage(voice, VoiceStage::Attack);
    }

    /// Move the given voice into its release stage. Inactive voices are ignored.
    pub fn note_off(&mut self, voice: usize) {
        if self.is_active(voice) {
            self.enter_stage(voice, VoiceStage::Release);
        }
    }

    /// Advance the envelopes of all active voices by one sample.
    pub fn advance_envelopes(&mut self) {
        for voice in self.active {
            self.advance_envelope(voice);
        }
    }

    fn enter_stage(&mut self, voice: usize, stage: VoiceStage) {
        self.stage[voice] = stage;
        match stage {
            VoiceStage::Attack => {
                let samples = self.attack_samples[voice].max(1);
                self.level[voice] = 0.0;
                self.stage_samples_left[voice] = samples;
                self.level_step[voice] = 1.0 / samples as f32;
            }
            VoiceStage::Decay => {
                let samples = self.decay_samples[voice].max(1);
                self.level[voice] = 1.0;
                self.stage_samples_left[voice] = samples;
                self.level_step[voice] = 1.0 / samples as f32;
            }
            VoiceStage::Sustain => {
                self.level[voice] = self.sustain_level[voice];
                self.stage_samples_left[voice] = u32::MAX;
                self.level_step[voice] = 0.0;
            }
            VoiceStage::Release => {
                let samples = self.release_samples[voice].max(1);
                self.release_start[voice] = self.level[voice];
                self.stage_samples_left[voice] = samples;
                self.level_step[voice] = 1.0 / samples as f32;
            }
            VoiceStage::Idle => {
                self.level[voice] = 0.0;
                self.stage_samples_left[voice] = 0;
                self.level_step[voice] = 0.0;
                self.active.reset(voice);
            }
        }
    }

    fn advance_envelope(&mut self, voice: usize) {
        match self.stage[voice] {
            VoiceStage::Attack => {
                let left = self.stage_samples_left[voice].saturating_sub(1);
                self.stage_samples_left[voice] = left;
                let progress = 1.0 - left as f32 * self.level_step[voice];
                self.level[voice] = pow_curve(progress, self.attack_power[voice]);
                if left == 0 {
                    self.enter_stage(voice, VoiceStage::Decay);
                }
            }
            VoiceStage::Decay => {
                let left = self.stage_samples_left[voice].saturating_sub(1);
                self.stage_samples_left[voice] = left;
                let progress = 1.0 - left as f32 * self.level_step[voice];
                let fade = pow_curve(1.0 - progress, self.decay_power[voice]);
                let sustain = self.sustain_level[voice];
                let level = sustain + (1.0 - sustain) * fade;
                self.level[voice] = level;
                if level < DECAY_SILENCE {
                    self.enter_stage(voice, VoiceStage::Idle);
                } else if left == 0 {
                    self.enter_stage(voice, VoiceStage::Sustain);
                }
            }
            VoiceStage::Sustain => {
                self.level[voice] = self.sustain_level[voice];
            }
            VoiceStage::Release => {
                let left = self.stage_samples_left[voice].saturating_sub(1);
                self.stage_samples_left[voice] = left;
                let progress = left as f32 * self.level_step[voice];
                let level = self.release_start[voice] * pow_curve(progress, self.release_power[voice]);
                self.level[voice] = level;
                if left == 0 || level < RELEASE_SILENCE {
                    self.enter_stage(voice, VoiceStage::Idle);
                }
            }
            VoiceStage::Idle => {
                self.active.reset(voice);
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

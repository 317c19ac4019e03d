use std::{fmt::Debug, sync::Arc};

use assume::assume;

use crate::{utils::buffer::interleaved_to_planar, Error};

// -------------------------------------------------------------------------------------------------

/// A decoded, planar source sample the engine reads grains from.
///
/// Cloning is cheap: the sample data is shared. Loading and decoding happens elsewhere; the
/// engine only ever reads from it.
#[derive(Clone)]
pub struct LoadedSample {
    channels: Arc<[Box<[f32]>]>,
    frame_count: usize,
    sample_rate: f64,
}

impl LoadedSample {
    /// Create a new sample from planar channel buffers. All channels must have the same length,
    /// and the sample rate must be > 0. Empty samples are valid, but render silence.
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: f64) -> Result<Self, Error> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(Error::SampleError(format!(
                "Invalid sample rate: {sample_rate}"
            )));
        }
        if channels.is_empty() {
            return Err(Error::SampleError(
                "A sample needs at least one channel".to_string(),
            ));
        }
        let frame_count = channels[0].len();
        if channels.iter().any(|channel| channel.len() != frame_count) {
            return Err(Error::SampleError(
                "All sample channels must have the same length".to_string(),
            ));
        }
        let channels = channels
            .into_iter()
            .map(Vec::into_boxed_slice)
            .collect::<Arc<[_]>>();
        Ok(Self {
            channels,
            frame_count,
            sample_rate,
        })
    }

    /// Create a new sample from an interleaved buffer with the given channel layout.
    pub fn from_interleaved(
        samples: &[f32],
        channel_count: usize,
        sample_rate: f64,
    ) -> Result<Self, Error> {
        if channel_count == 0 || samples.len() % channel_count != 0 {
            return Err(Error::SampleError(format!(
                "Invalid interleaved buffer layout: {} samples with {channel_count} channels",
                samples.len()
            )));
        }
        let mut planar = vec![vec![0.0; samples.len() / channel_count]; channel_count];
        interleaved_to_planar(samples, &mut planar);
        Self::new(planar, sample_rate)
    }

    /// Sample rate the sample was recorded at.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Length of the sample in frames.
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn is_empty(&self) -> bool {
        self.frame_count == 0
    }

    /// Read a channel at a fractional frame position, using linear interpolation.
    ///
    /// Positions before the start read the first frame, positions at or past the last frame
    /// read the last frame. Empty samples and invalid channels read 0.0.
    #[inline]
    pub fn read_interpolated(&self, channel: usize, position: f64) -> f32 {
        let Some(data) = self.channels.get(channel) else {
            return 0.0;
        };
        let len = data.len();
        if len == 0 {
            return 0.0;
        }
        if position.is_nan() || position <= 0.0 {
            return data[0];
        }
        let last = len - 1;
        let index = position as usize;
        if index >= last {
            return data[last];
        }
        assume!(unsafe: index + 1 < len, "Sample index out of bounds");
        let fraction = (position - index as f64) as f32;
        let current = data[index];
        let next = data[index + 1];
        current + (next - current) * fraction
    }
}

impl Debug for LoadedSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedSample")
            .field("channels", &self.channels.len())
            .field("frame_count", &self.frame_count)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction() {
        assert!(LoadedSample::new(vec![vec![0.0; 4]], 0.0).is_err());
        assert!(LoadedSample::new(vec![vec![0.0; 4]], f64::NAN).is_err());
        assert!(LoadedSample::new(vec![], 44100.0).is_err());
        assert!(LoadedSample::new(vec![vec![0.0; 4], vec![0.0; 3]], 44100.0).is_err());
        assert!(LoadedSample::from_interleaved(&[0.0; 5], 2, 44100.0).is_err());

        let sample = LoadedSample::from_interleaved(&[1.0, 2.0, 3.0, 4.0], 2, 44100.0).unwrap();
        assert_eq!(sample.channel_count(), 2);
        assert_eq!(sample.frame_count(), 2);
        assert_eq!(sample.sample_rate(), 44100.0);
        assert_eq!(sample.read_interpolated(1, 1.0), 4.0);

        let empty = LoadedSample::new(vec![vec![]], 48000.0).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.read_interpolated(0, 0.5), 0.0);
    }

    #[test]
    fn interpolation() {
        let sample = LoadedSample::new(vec![vec![0.0, 1.0, 3.0]], 48000.0).unwrap();
        assert_eq!(sample.read_interpolated(0, 0.0), 0.0);
        assert_eq!(sample.read_interpolated(0, 0.5), 0.5);
        assert_eq!(sample.read_interpolated(0, 1.0), 1.0);
        assert_eq!(sample.read_interpolated(0, 1.25), 1.5);
        assert_eq!(sample.read_interpolated(0, -3.0), 0.0);
        assert_eq!(sample.read_interpolated(5, 1.0), 0.0);
    }

    #[test]
    fn clamps_at_end() {
        let sample = LoadedSample::new(vec![vec![0.0, 1.0, 3.0]], 48000.0).unwrap();
        assert_eq!(sample.read_interpolated(0, 2.0), 3.0);
        assert_eq!(sample.read_interpolated(0, 2.5), 3.0);
        assert_eq!(sample.read_interpolated(0, 1e9), 3.0);
    }
}

//! The grain engine: wires parameters, voices, grain spawning and rendering together.

use std::sync::Arc;

use crate::{
    modulation::ModulationInput,
    parameter::ParameterBank,
    utils::{
        buffer::{clear_buffer, scale_buffer},
        limiter::soft_limit_buffer,
    },
    Error,
};

// -------------------------------------------------------------------------------------------------

mod envelope;
mod event;
mod grain_pool;
mod processor;
mod sample;
mod spawner;
mod visual;
mod voice_pool;

// -------------------------------------------------------------------------------------------------

pub use event::{NoteEvent, NoteEventKind};
pub use grain_pool::{Grain, GrainPool, GRAIN_POOL_CAPACITY};
pub use processor::GrainProcessor;
pub use sample::LoadedSample;
pub use spawner::GrainSpawner;
pub use visual::{GrainVisual, GrainVisualData, GrainVisualSink, RenderClock};
pub use voice_pool::{VoicePool, VoiceStage, VOICE_POOL_CAPACITY};

// -------------------------------------------------------------------------------------------------

/// Options to configure a [`GrainEngine`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrainEngineOptions {
    /// By default None. When set, grain randomization uses a random generator with the given
    /// seed, so renders with identical inputs are identical.
    pub seed: Option<u64>,

    /// By default true. Apply a soft limiter to the output, which compresses everything above
    /// 0dBFS and never exceeds +/-1.5.
    pub output_limiter: bool,

    /// By default 1.0f32. Linear gain applied to the output before limiting.
    pub output_gain: f32,
}

impl Default for GrainEngineOptions {
    fn default() -> Self {
        Self {
            seed: None,
            output_limiter: true,
            output_gain: 1.0,
        }
    }
}

impl GrainEngineOptions {
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn output_limiter(mut self, enabled: bool) -> Self {
        self.output_limiter = enabled;
        self
    }

    pub fn output_gain(mut self, gain: f32) -> Self {
        self.output_gain = gain;
        self
    }

    /// Validate all options. Returns Error::ConfigError on errors.
    pub fn validate(&self) -> Result<(), Error> {
        if !self.output_gain.is_finite() || self.output_gain < 0.0 {
            return Err(Error::ConfigError(format!(
                "engine options 'output_gain' value is '{}'",
                self.output_gain
            )));
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

/// Real-time granular synthesizer.
///
/// Control thread setup: configure the engine via the `set_XXX` functions and [`Self::prepare`]
/// it. Then call [`Self::process`] from the audio thread for each block. Processing never
/// allocates, locks or fails: without a loaded sample, or before the engine got prepared, it
/// renders silence.
///
/// Parameters are read from a [`ParameterBank`] once per block, so all grains spawned in a
/// block see the same parameter values.
pub struct GrainEngine {
    options: GrainEngineOptions,
    sample_rate: f64,
    max_block_size: usize,
    prepared: bool,
    sample: Option<LoadedSample>,
    grains: Box<GrainPool>,
    voices: Box<VoicePool>,
    spawner: GrainSpawner,
    processor: GrainProcessor,
    clock: Arc<RenderClock>,
}

impl GrainEngine {
    /// Create a new engine with default options.
    pub fn new() -> Self {
        Self::create(GrainEngineOptions::default())
    }

    /// Create a new engine with the given options.
    pub fn with_options(options: GrainEngineOptions) -> Result<Self, Error> {
        options.validate()?;
        Ok(Self::create(options))
    }

    fn create(options: GrainEngineOptions) -> Self {
        Self {
            options,
            sample_rate: 0.0,
            max_block_size: 0,
            prepared: false,
            sample: None,
            grains: GrainPool::new(),
            voices: VoicePool::new(),
            spawner: GrainSpawner::new(options.seed),
            processor: GrainProcessor::new(),
            clock: Arc::new(RenderClock::new()),
        }
    }

    pub fn options(&self) -> &GrainEngineOptions {
        &self.options
    }

    /// Output sample rate, as set in [`Self::prepare`].
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Largest block size [`Self::process`] expects, as set in [`Self::prepare`].
    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    /// Set up the engine for the given output sample rate and block size. Silences all voices
    /// and grains.
    pub fn prepare(&mut self, sample_rate: f64, max_block_size: usize) -> Result<(), Error> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(Error::ConfigError(format!(
                "Invalid sample rate: {sample_rate}"
            )));
        }
        if max_block_size == 0 {
            return Err(Error::ConfigError("Invalid block size: 0".to_string()));
        }
        log::info!(
            "Preparing grain engine: {sample_rate} Hz, {max_block_size} frames per block"
        );
        self.sample_rate = sample_rate;
        self.max_block_size = max_block_size;
        self.spawner.set_sample_rate(sample_rate);
        self.reset();
        self.prepared = true;
        Ok(())
    }

    /// Silence all voices and drop all playing grains.
    pub fn reset(&mut self) {
        self.grains.clear();
        self.voices.clear();
    }

    /// Set the source sample grains are read from.
    pub fn set_loaded_sample(&mut self, sample: LoadedSample) {
        if sample.is_empty() {
            log::warn!("Loaded an empty sample: the grain engine will output silence");
        } else {
            log::debug!(
                "Loaded sample with {} channels, {} frames at {} Hz",
                sample.channel_count(),
                sample.frame_count(),
                sample.sample_rate()
            );
        }
        self.sample = Some(sample);
    }

    /// Remove the source sample. Running grains are dropped.
    pub fn clear_loaded_sample(&mut self) {
        self.sample = None;
        self.grains.clear();
    }

    pub fn loaded_sample(&self) -> Option<&LoadedSample> {
        self.sample.as_ref()
    }

    /// Set the parameters the engine reads from.
    pub fn set_parameter_bank(&mut self, bank: ParameterBank) {
        log::debug!("Binding grain engine parameters: {bank:?}");
        self.spawner.set_parameter_bank(Some(bank));
    }

    /// Set a modulation input, which modulates grain parameters via the bank's modulation
    /// depth parameters.
    pub fn set_modulation_input(&mut self, input: Arc<ModulationInput>) {
        self.spawner.set_modulation_input(Some(input));
    }

    /// Set or remove a sink which receives all spawned grains.
    pub fn set_visual_sink(&mut self, sink: Option<Arc<dyn GrainVisualSink>>) {
        self.spawner.set_visual_sink(sink);
    }

    /// Shared clock with the number of frames the engine rendered so far.
    pub fn render_clock(&self) -> Arc<RenderClock> {
        Arc::clone(&self.clock)
    }

    pub fn grains(&self) -> &GrainPool {
        &self.grains
    }

    pub fn voices(&self) -> &VoicePool {
        &self.voices
    }

    pub fn spawner(&self) -> &GrainSpawner {
        &self.spawner
    }

    /// Render one block of interleaved stereo frames into `output`, applying the given note
    /// events, which must be sorted by their sample offsets.
    ///
    /// The output buffer gets overwritten. Blocks larger than the prepared maximum block size
    /// are rendered in chunks.
    pub fn process(&mut self, output: &mut [f32], events: &[NoteEvent]) {
        Self::assert_no_alloc(|| self.process_block(output, events));
    }

    fn process_block(&mut self, output: &mut [f32], events: &[NoteEvent]) {
        debug_assert!(output.len() % 2 == 0, "Expecting an interleaved stereo buffer");
        clear_buffer(output);
        let frame_count = output.len() / 2;
        let Some(sample) = self.sample.as_ref().filter(|sample| !sample.is_empty()) else {
            self.clock.advance(frame_count as u64);
            return;
        };
        if !self.prepared {
            self.clock.advance(frame_count as u64);
            return;
        }
        let mut events = events;
        let mut chunk_start = 0;
        for chunk in output.chunks_mut(self.max_block_size * 2) {
            let chunk_frames = chunk.len() / 2;
            let chunk_end = chunk_start + chunk_frames;
            let split = events.partition_point(|event| event.sample_offset < chunk_end);
            let (chunk_events, pending_events) = events.split_at(split);
            let processor = &mut self.processor;
            self.spawner.process_events(
                chunk_events.iter().map(|event| NoteEvent {
                    sample_offset: event.sample_offset.saturating_sub(chunk_start),
                    ..*event
                }),
                chunk_frames,
                self.clock.now(),
                sample,
                &mut self.voices,
                &mut self.grains,
                |segment, voices, grains| {
                    let output = &mut chunk[segment.start * 2..segment.end * 2];
                    processor.process(output, sample, grains, voices);
                },
            );
            self.clock.advance(chunk_frames as u64);
            events = pending_events;
            chunk_start = chunk_end;
        }
        scale_buffer(output, self.options.output_gain);
        if self.options.output_limiter {
            soft_limit_buffer(output);
        }
    }

    fn assert_no_alloc<T, F: FnOnce() -> T>(func: F) -> T {
        #[cfg(feature = "assert-allocs")]
        return assert_no_alloc::assert_no_alloc::<T, F>(func);

        #[cfg(not(feature = "assert-allocs"))]
        return func();
    }
}

impl Default for GrainEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GrainEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrainEngine")
            .field("options", &self.options)
            .field("sample_rate", &self.sample_rate)
            .field("max_block_size", &self.max_block_size)
            .field("sample", &self.sample)
            .field("grains", &self.grains)
            .field("voices", &self.voices)
            .finish()
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::ParameterStore;

    const SAMPLE_RATE: f64 = 48000.0;
    const BLOCK_SIZE: usize = 512;

    fn sine_sample() -> LoadedSample {
        let frames = (0..48000)
            .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / 48000.0).sin() * 0.5)
            .collect();
        LoadedSample::new(vec![frames], SAMPLE_RATE).unwrap()
    }

    fn prepared_engine(store: &ParameterStore) -> Result<GrainEngine, Error> {
        let mut engine = GrainEngine::with_options(GrainEngineOptions::default().seed(1234))?;
        engine.set_parameter_bank(ParameterBank::bind(store)?);
        engine.set_loaded_sample(sine_sample());
        engine.prepare(SAMPLE_RATE, BLOCK_SIZE)?;
        Ok(engine)
    }

    fn render(engine: &mut GrainEngine, blocks: usize, events: &[NoteEvent]) -> Vec<f32> {
        let mut output = Vec::new();
        let mut block = vec![0.0; BLOCK_SIZE * 2];
        for index in 0..blocks {
            engine.process(&mut block, if index == 0 { events } else { &[] });
            output.extend_from_slice(&block);
        }
        output
    }

    #[test]
    fn options() {
        assert!(GrainEngineOptions::default().validate().is_ok());
        assert!(GrainEngineOptions::default()
            .output_gain(-1.0)
            .validate()
            .is_err());
        assert!(GrainEngine::with_options(GrainEngineOptions::default().output_gain(f32::NAN))
            .is_err());
    }

    #[test]
    fn prepare_validation() {
        let mut engine = GrainEngine::new();
        assert!(matches!(
            engine.prepare(0.0, 512),
            Err(Error::ConfigError(_))
        ));
        assert!(engine.prepare(48000.0, 0).is_err());
        assert!(engine.prepare(48000.0, 512).is_ok());
        assert_eq!(engine.sample_rate(), 48000.0);
        assert_eq!(engine.max_block_size(), 512);
    }

    #[test]
    fn silence_without_sample() -> Result<(), Error> {
        let mut engine = GrainEngine::new();
        engine.prepare(SAMPLE_RATE, BLOCK_SIZE)?;
        let mut output = vec![1.0; BLOCK_SIZE * 2];
        engine.process(&mut output, &[NoteEvent::note_on(0, 60)]);
        assert!(output.iter().all(|s| *s == 0.0));
        assert!(engine.grains().is_empty());
        assert_eq!(engine.render_clock().now(), BLOCK_SIZE as u64);

        engine.set_loaded_sample(LoadedSample::new(vec![vec![]], SAMPLE_RATE)?);
        engine.process(&mut output, &[NoteEvent::note_on(0, 60)]);
        assert!(output.iter().all(|s| *s == 0.0));
        assert!(engine.grains().is_empty());
        Ok(())
    }

    #[test]
    fn renders_held_notes() -> Result<(), Error> {
        let store = ParameterStore::new();
        store.set_value(ParameterBank::GRAIN_POSITION_MAX.id(), 50.0)?;
        let mut engine = prepared_engine(&store)?;

        let output = render(&mut engine, 20, &[NoteEvent::note_on(0, 60)]);
        assert!(output.iter().any(|s| s.abs() > 0.01));
        assert!(output.iter().all(|s| s.abs() <= 1.5));
        assert!(!engine.grains().is_empty());
        assert_eq!(engine.voices().stage(60), VoiceStage::Sustain);
        assert_eq!(engine.render_clock().now(), 20 * BLOCK_SIZE as u64);

        // after note-off and release, the engine falls silent again
        let _ = render(&mut engine, 200, &[NoteEvent::note_off(0, 60)]);
        assert!(engine.grains().is_empty());
        assert_eq!(engine.voices().active_count(), 0);
        let output = render(&mut engine, 1, &[]);
        assert!(output.iter().all(|s| *s == 0.0));
        Ok(())
    }

    #[test]
    fn short_notes_within_one_block() -> Result<(), Error> {
        let store = ParameterStore::new();
        let mut engine = prepared_engine(&store)?;

        // 480 frames attack: released after 256 frames, at ~53% of the attack
        let output = render(
            &mut engine,
            1,
            &[NoteEvent::note_on(0, 60), NoteEvent::note_off(256, 60)],
        );
        assert!(output.iter().any(|s| s.abs() > 0.01));
        assert_eq!(engine.voices().stage(60), VoiceStage::Release);
        let level = engine.voices().level(60);
        assert!(level > 0.5 && level < 256.0 / 480.0, "level is {level}");

        // the grain spawned at note-on keeps playing through the voice's release
        let output = render(&mut engine, 1, &[]);
        assert!(output.iter().any(|s| s.abs() > 0.01));
        Ok(())
    }

    #[test]
    fn note_events_apply_at_their_offset() -> Result<(), Error> {
        let store = ParameterStore::new();
        let mut engine = prepared_engine(&store)?;

        let output = render(&mut engine, 1, &[NoteEvent::note_on(400, 60)]);
        assert!(output[..400 * 2].iter().all(|s| *s == 0.0));
        // 112 of 480 attack frames passed
        assert_eq!(engine.voices().stage(60), VoiceStage::Attack);
        let level = engine.voices().level(60);
        assert!((level - 112.0 / 480.0).abs() < 1e-4, "level is {level}");
        Ok(())
    }

    #[test]
    fn seeded_engines_render_identically() -> Result<(), Error> {
        let store = ParameterStore::new();
        store.set_value(ParameterBank::GRAIN_PITCH_MIN.id(), -7.0)?;
        store.set_value(ParameterBank::GRAIN_PITCH_MAX.id(), 7.0)?;
        store.set_value(ParameterBank::GRAIN_PAN_MIN.id(), -1.0)?;
        store.set_value(ParameterBank::GRAIN_PAN_MAX.id(), 1.0)?;
        store.set_value(ParameterBank::GRAIN_POSITION_MAX.id(), 100.0)?;
        store.set_value(ParameterBank::DELAY_RANDOM_RANGE.id(), 0.1)?;
        let events = [NoteEvent::note_on(0, 60), NoteEvent::note_on(100, 67)];

        let mut first = prepared_engine(&store)?;
        let mut second = prepared_engine(&store)?;
        assert_eq!(
            render(&mut first, 30, &events),
            render(&mut second, 30, &events)
        );
        Ok(())
    }

    #[test]
    fn oversized_blocks_are_chunked() -> Result<(), Error> {
        let store = ParameterStore::new();
        let mut engine = prepared_engine(&store)?;
        let visuals = Arc::new(GrainVisualData::new(GRAIN_POOL_CAPACITY));
        engine.set_visual_sink(Some(Arc::clone(&visuals) as Arc<dyn GrainVisualSink>));

        let mut output = vec![0.0; BLOCK_SIZE * 2 * 4];
        engine.process(
            &mut output,
            &[NoteEvent::note_on(0, 60), NoteEvent::note_on(1300, 72)],
        );
        // 2048 frames at 50 Hz: note 60 spawns at 0, 960 and 1920, note 72 at 1300
        assert_eq!(engine.spawner().spawned_grains(), 4);
        assert_eq!(engine.render_clock().now(), 2048);
        let mut start_times = visuals
            .active_grains()
            .map(|(_, grain)| grain.start_time)
            .collect::<Vec<_>>();
        start_times.sort();
        assert_eq!(start_times.last(), Some(&1920));
        assert!(start_times.contains(&1300));
        Ok(())
    }

    #[test]
    fn output_gain_and_limiter() -> Result<(), Error> {
        let store = ParameterStore::new();
        store.set_value(ParameterBank::GRAIN_RATE.id(), 2000.0)?;
        store.set_value(ParameterBank::GRAIN_SUSTAIN.id(), 0.5)?;
        let events = [NoteEvent::note_on(0, 60)];

        let dc_sample = LoadedSample::new(vec![vec![0.5; 48000]], SAMPLE_RATE)?;
        let mut limited = prepared_engine(&store)?;
        limited.set_loaded_sample(dc_sample.clone());
        limited.options.output_gain = 4.0;
        let output = render(&mut limited, 20, &events);
        assert!(output.iter().all(|s| s.abs() <= 1.5));
        assert!(output.iter().any(|s| s.abs() > 1.0));

        let mut unlimited = prepared_engine(&store)?;
        unlimited.set_loaded_sample(dc_sample);
        unlimited.options = unlimited.options.output_limiter(false).output_gain(4.0);
        let output = render(&mut unlimited, 20, &events);
        assert!(output.iter().any(|s| s.abs() > 1.5));
        Ok(())
    }

    #[test]
    fn publishes_grains() -> Result<(), Error> {
        let store = ParameterStore::new();
        let mut engine = prepared_engine(&store)?;
        let visuals = Arc::new(GrainVisualData::new(GRAIN_POOL_CAPACITY));
        engine.set_visual_sink(Some(Arc::clone(&visuals) as Arc<dyn GrainVisualSink>));

        let _ = render(&mut engine, 2, &[NoteEvent::note_on(0, 60)]);
        let mut start_times = visuals
            .active_grains()
            .map(|(_, grain)| grain.start_time)
            .collect::<Vec<_>>();
        start_times.sort();
        assert_eq!(start_times, vec![0, 960]);
        assert_eq!(visuals.retire_finished(engine.render_clock().now()), 0);

        // default grains are 30ms (1440 frames) long
        let _ = render(&mut engine, 1, &[]);
        assert_eq!(visuals.retire_finished(engine.render_clock().now()), 1);
        assert_eq!(visuals.active_grains().count(), 1);
        Ok(())
    }

    #[test]
    fn reset_silences_everything() -> Result<(), Error> {
        let store = ParameterStore::new();
        let mut engine = prepared_engine(&store)?;
        let _ = render(&mut engine, 4, &[NoteEvent::note_on(0, 60)]);
        assert!(!engine.grains().is_empty());
        engine.reset();
        assert!(engine.grains().is_empty());
        assert_eq!(engine.voices().active_count(), 0);
        let output = render(&mut engine, 1, &[]);
        assert!(output.iter().all(|s| *s == 0.0));
        Ok(())
    }

    #[test]
    fn modulation_input() -> Result<(), Error> {
        let store = ParameterStore::new();
        store.set_value(ParameterBank::MOD_ROTATION_RATE.id(), 150.0)?;
        let mut engine = prepared_engine(&store)?;
        let input = Arc::new(ModulationInput::new());
        engine.set_modulation_input(Arc::clone(&input));
        input.set_rotation(1.0);

        let _ = render(&mut engine, 4, &[NoteEvent::note_on(0, 60)]);
        // 200 Hz: one grain every 240 frames within 2048 frames
        assert_eq!(engine.spawner().spawned_grains(), 9);
        Ok(())
    }
}

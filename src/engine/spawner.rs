//! Converts note events and elapsed time into new grains.

use std::{ops::Range, sync::Arc};

use rand::{rngs::SmallRng, Rng, SeedableRng};

use super::{
    event::{NoteEvent, NoteEventKind},
    grain_pool::{Grain, GrainPool},
    sample::LoadedSample,
    visual::{GrainVisual, GrainVisualSink},
    voice_pool::VoicePool,
};
use crate::{
    modulation::ModulationInput,
    parameter::{ParameterBank, ParameterSnapshot, VoiceTiming},
    utils::{
        db_to_linear, pitch_step,
        time::{seconds_to_frames, SampleTime},
    },
};

// -------------------------------------------------------------------------------------------------

/// Everything a grain spawn needs which stays constant within one block.
struct SpawnContext<'a> {
    snapshot: &'a ParameterSnapshot,
    sample: &'a LoadedSample,
    block_start: SampleTime,
    /// Frames between two grains of the same voice.
    period: f64,
}

// -------------------------------------------------------------------------------------------------

/// Schedules grains for all held voices.
///
/// Each held voice emits one grain every `sample_rate / grain_rate` frames. The voice's spawn
/// cursor carries the fractional phase across events and blocks, so grain spacing stays exact
/// no matter how blocks are sized. When the grain pool is full, grains are dropped.
pub struct GrainSpawner {
    sample_rate: f64,
    bank: Option<ParameterBank>,
    modulation: Option<Arc<ModulationInput>>,
    visual_sink: Option<Arc<dyn GrainVisualSink>>,
    rng: SmallRng,
    spawned_grains: u64,
    dropped_grains: u64,
}

impl GrainSpawner {
    /// Create a new spawner. With a seed, grain randomization is reproducible, else the random
    /// generator is seeded from the OS.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        };
        Self {
            sample_rate: 44100.0,
            bank: None,
            modulation: None,
            visual_sink: None,
            rng,
            spawned_grains: 0,
            dropped_grains: 0,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Set the host's output sample rate.
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        debug_assert!(sample_rate > 0.0, "Invalid sample rate");
        self.sample_rate = sample_rate;
    }

    /// Set the parameters to read from. Without a bank, all parameters use their defaults.
    pub fn set_parameter_bank(&mut self, bank: Option<ParameterBank>) {
        self.bank = bank;
    }

    pub fn set_modulation_input(&mut self, modulation: Option<Arc<ModulationInput>>) {
        self.modulation = modulation;
    }

    pub fn set_visual_sink(&mut self, sink: Option<Arc<dyn GrainVisualSink>>) {
        self.visual_sink = sink;
    }

    /// Total number of grains spawned so far.
    pub fn spawned_grains(&self) -> u64 {
        self.spawned_grains
    }

    /// Total number of grains which got dropped because the grain pool was full.
    pub fn dropped_grains(&self) -> u64 {
        self.dropped_grains
    }

    /// Capture the current grain parameters.
    pub fn snapshot(&self) -> ParameterSnapshot {
        match &self.bank {
            Some(bank) => {
                let modulation = self
                    .modulation
                    .as_ref()
                    .map(|input| input.values())
                    .unwrap_or_default();
                bank.snapshot(modulation)
            }
            None => ParameterSnapshot::default(),
        }
    }

    /// Capture the current voice envelope parameters.
    pub fn voice_timing(&self) -> VoiceTiming {
        match &self.bank {
            Some(bank) => bank.voice_timing(),
            None => VoiceTiming::default(),
        }
    }

    /// Apply the given block's note events to the voices and spawn all grains that are due
    /// within the block's `block_len` frames.
    ///
    /// Events must be ordered by their sample offset. The block is split into segments at the
    /// event offsets: for each segment, grains are spawned first, then `render` gets called with
    /// the segment's frame range, so voice envelopes advance sample accurately between events.
    /// Grain delays are relative to the start of the segment they got spawned in. The block
    /// starts at `block_start` in the render clock.
    #[allow(clippy::too_many_arguments)]
    pub fn process_events<R>(
        &mut self,
        events: impl IntoIterator<Item = NoteEvent>,
        block_len: usize,
        block_start: SampleTime,
        sample: &LoadedSample,
        voices: &mut VoicePool,
        grains: &mut GrainPool,
        mut render: R,
    ) where
        R: FnMut(Range<usize>, &mut VoicePool, &mut GrainPool),
    {
        let snapshot = self.snapshot();
        let timing = self.voice_timing();
        let context = SpawnContext {
            snapshot: &snapshot,
            sample,
            block_start,
            period: self.sample_rate / snapshot.modulated_grain_rate() as f64,
        };

        let mut segment_start = 0;
        for event in events {
            debug_assert!(
                event.sample_offset >= segment_start,
                "Note events must be sorted by sample offset"
            );
            let offset = event.sample_offset.clamp(segment_start, block_len);
            if offset > segment_start {
                self.advance_time(&context, segment_start, offset - segment_start, voices, grains);
                render(segment_start..offset, voices, grains);
                segment_start = offset;
            }

            let voice = event.note as usize;
            debug_assert!(voice < VoicePool::CAPACITY, "Invalid note number");
            if voice >= VoicePool::CAPACITY {
                continue;
            }
            match event.kind {
                NoteEventKind::NoteOn => {
                    voices.note_on(voice, &timing, self.sample_rate);
                    // fire the first grain right away
                    voices.spawn_cursor[voice] = context.period;
                }
                NoteEventKind::NoteOff => {
                    voices.note_off(voice);
                }
            }
        }
        if block_len > segment_start {
            self.advance_time(
                &context,
                segment_start,
                block_len - segment_start,
                voices,
                grains,
            );
            render(segment_start..block_len, voices, grains);
        }
    }

    /// Let `frames` frames pass for all held voices, starting at frame `segment_start` in the
    /// current block, spawning grains whenever a voice's cursor completes a period.
    fn advance_time(
        &mut self,
        context: &SpawnContext,
        segment_start: usize,
        frames: usize,
        voices: &mut VoicePool,
        grains: &mut GrainPool,
    ) {
        if frames == 0 {
            return;
        }
        let frames = frames as f64;
        for voice in voices.active {
            if !voices.is_spawning(voice) {
                continue;
            }
            let mut next = (context.period - voices.spawn_cursor[voice]).max(0.0);
            while next < frames {
                self.spawn_grain(context, voice, segment_start, next as usize, grains);
                next += context.period;
            }
            voices.spawn_cursor[voice] = frames + context.period - next;
        }
    }

    /// Initialize a new grain for the given voice, delayed by `offset` frames from the segment
    /// start plus a random delay. Drops the grain when the pool is full.
    fn spawn_grain(
        &mut self,
        context: &SpawnContext,
        voice: usize,
        segment_start: usize,
        offset: usize,
        grains: &mut GrainPool,
    ) {
        if grains.is_full() {
            self.dropped_grains += 1;
            return;
        }
        let snapshot = context.snapshot;
        let modulation = &snapshot.modulation;
        let rng = &mut self.rng;

        let gain_db = snapshot.gain.sample(rng) + modulation.gain;
        let pan = (snapshot.pan.sample(rng) + modulation.pan).clamp(-1.0, 1.0);
        let pitch = snapshot.pitch.sample(rng) + modulation.pitch;
        let position = (snapshot.position.sample(rng) + modulation.position).clamp(0.0, 100.0);
        let random_delay = rng.random::<f32>() * snapshot.delay_random_range;

        let step = pitch_step(
            context.sample.sample_rate(),
            self.sample_rate,
            voice as u8,
            snapshot.root_note,
            pitch,
        );
        let sample_pos = context.sample.frame_count() as f64 * position as f64 / 100.0;
        let delay = (offset as u64 + seconds_to_frames(random_delay, self.sample_rate) as u64)
            .min(u32::MAX as u64) as u32;

        let envelope = &snapshot.envelope;
        let attack = seconds_to_frames(envelope.attack, self.sample_rate);
        let sustain = seconds_to_frames(envelope.sustain, self.sample_rate);
        let release = seconds_to_frames(envelope.release, self.sample_rate);
        let length = attack.saturating_add(sustain).saturating_add(release).max(1);

        let grain = Grain {
            delay,
            frames: length,
            length,
            sample_pos,
            step,
            gain: db_to_linear(gain_db),
            pan,
            env_attack_frames: attack,
            env_release_frames: release,
            env_attack_curve: envelope.attack_curve,
            env_release_curve: envelope.release_curve,
            voice: voice as u8,
        };
        let Some(slot) = grains.insert(&grain) else {
            self.dropped_grains += 1;
            return;
        };
        self.spawned_grains += 1;

        if let Some(sink) = &self.visual_sink {
            sink.publish(
                slot,
                &GrainVisual {
                    source_start: sample_pos,
                    start_time: context.block_start + segment_start as u64 + delay as u64,
                    length,
                    attack_frames: attack,
                    release_frames: release,
                    attack_curve: envelope.attack_curve,
                    release_curve: envelope.release_curve,
                    step,
                    peak_gain: grain.gain,
                },
            );
        }
    }
}

impl std::fmt::Debug for GrainSpawner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrainSpawner")
            .field("sample_rate", &self.sample_rate)
            .field("bank", &self.bank.is_some())
            .field("spawned_grains", &self.spawned_grains)
            .field("dropped_grains", &self.dropped_grains)
            .finish()
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{parameter::ParameterStore, Error};

    const SAMPLE_RATE: f64 = 48000.0;

    #[derive(Default)]
    struct CollectingSink {
        grains: Mutex<Vec<GrainVisual>>,
    }

    impl CollectingSink {
        fn start_times(&self) -> Vec<SampleTime> {
            let grains = self.grains.lock().unwrap();
            grains.iter().map(|grain| grain.start_time).collect()
        }
    }

    impl GrainVisualSink for CollectingSink {
        fn publish(&self, _slot: usize, grain: &GrainVisual) {
            self.grains.lock().unwrap().push(*grain);
        }
    }

    struct Fixture {
        store: ParameterStore,
        modulation: Arc<ModulationInput>,
        sink: Arc<CollectingSink>,
        spawner: GrainSpawner,
        sample: LoadedSample,
        voices: Box<VoicePool>,
        grains: Box<GrainPool>,
        clock: SampleTime,
    }

    impl Fixture {
        fn new() -> Result<Self, Error> {
            let store = ParameterStore::new();
            let modulation = Arc::new(ModulationInput::new());
            let sink = Arc::new(CollectingSink::default());
            let mut spawner = GrainSpawner::new(Some(0x5eed));
            spawner.set_sample_rate(SAMPLE_RATE);
            spawner.set_parameter_bank(Some(ParameterBank::bind(&store)?));
            spawner.set_modulation_input(Some(Arc::clone(&modulation)));
            spawner.set_visual_sink(Some(Arc::clone(&sink) as Arc<dyn GrainVisualSink>));
            let sample = LoadedSample::new(vec![vec![0.0; 48000]], SAMPLE_RATE)?;
            Ok(Self {
                store,
                modulation,
                sink,
                spawner,
                sample,
                voices: VoicePool::new(),
                grains: GrainPool::new(),
                clock: 0,
            })
        }

        fn set(&self, parameter: crate::FloatParameter, value: f32) -> Result<(), Error> {
            self.store.set_value(parameter.id(), value)
        }

        /// Process a block without rendering. Returns the rendered segments.
        fn run(&mut self, events: &[NoteEvent], block_len: usize) -> Vec<Range<usize>> {
            let mut segments = Vec::new();
            self.spawner.process_events(
                events.iter().copied(),
                block_len,
                self.clock,
                &self.sample,
                &mut self.voices,
                &mut self.grains,
                |segment, _, _| segments.push(segment),
            );
            self.clock += block_len as u64;
            segments
        }

        fn delays(&self) -> Vec<u32> {
            let mut delays = self
                .grains
                .iter()
                .map(|(_, grain)| grain.delay)
                .collect::<Vec<_>>();
            delays.sort();
            delays
        }
    }

    #[test]
    fn spawns_periodically_within_a_block() -> Result<(), Error> {
        let mut fixture = Fixture::new()?;
        fixture.run(&[NoteEvent::note_on(0, 60)], 4096);
        assert_eq!(fixture.delays(), vec![0, 960, 1920, 2880, 3840]);
        assert_eq!(fixture.spawner.spawned_grains(), 5);
        Ok(())
    }

    #[test]
    fn spawns_periodically_across_blocks() -> Result<(), Error> {
        let mut fixture = Fixture::new()?;
        fixture.run(&[NoteEvent::note_on(0, 60)], 512);
        for _ in 0..40 {
            fixture.run(&[], 512);
        }
        let start_times = fixture.sink.start_times();
        assert_eq!(start_times.len(), 22);
        assert_eq!(start_times[0], 0);
        for pair in start_times.windows(2) {
            assert_eq!(pair[1] - pair[0], 960);
        }
        Ok(())
    }

    #[test]
    fn fractional_periods_carry_over() -> Result<(), Error> {
        let mut fixture = Fixture::new()?;
        fixture.set(ParameterBank::GRAIN_RATE, 70.0)?; // 685.714... frames
        fixture.run(&[NoteEvent::note_on(17, 60)], 300);
        for _ in 0..200 {
            fixture.run(&[], 333);
        }
        let start_times = fixture.sink.start_times();
        assert!(start_times.len() > 90);
        let period = SAMPLE_RATE / 70.0;
        for (index, time) in start_times.iter().enumerate() {
            let expected = 17.0 + index as f64 * period;
            assert!(
                (*time as f64 - expected).abs() <= 1.0,
                "grain {index} at {time}, expected {expected}"
            );
        }
        Ok(())
    }

    #[test]
    fn note_on_within_block() -> Result<(), Error> {
        let mut fixture = Fixture::new()?;
        fixture.run(&[NoteEvent::note_on(100, 60)], 2048);
        // delays count from the event's segment start
        assert_eq!(fixture.delays(), vec![0, 960, 1920]);
        assert_eq!(fixture.sink.start_times(), vec![100, 1060, 2020]);
        Ok(())
    }

    #[test]
    fn blocks_are_split_at_event_offsets() -> Result<(), Error> {
        let mut fixture = Fixture::new()?;
        let segments = fixture.run(
            &[
                NoteEvent::note_on(0, 60),
                NoteEvent::note_on(100, 62),
                NoteEvent::note_off(300, 60),
                NoteEvent::note_on(300, 64),
                NoteEvent::note_off(512, 62),
            ],
            512,
        );
        assert_eq!(segments, vec![0..100, 100..300, 300..512]);
        // the trailing note-off still applies
        assert!(!fixture.voices.is_spawning(62));
        assert!(fixture.voices.is_spawning(64));

        let segments = fixture.run(&[], 256);
        assert_eq!(segments, vec![0..256]);
        assert!(fixture.run(&[], 0).is_empty());
        Ok(())
    }

    #[test]
    fn note_off_stops_spawning() -> Result<(), Error> {
        let mut fixture = Fixture::new()?;
        fixture.run(
            &[NoteEvent::note_on(0, 60), NoteEvent::note_off(1000, 60)],
            4096,
        );
        // already spawned grains keep playing
        assert_eq!(fixture.delays(), vec![0, 960]);
        fixture.run(&[], 4096);
        assert_eq!(fixture.spawner.spawned_grains(), 2);
        Ok(())
    }

    #[test]
    fn pool_exhaustion_drops_grains() -> Result<(), Error> {
        let mut fixture = Fixture::new()?;
        fixture.run(&[NoteEvent::note_on(0, 60)], 512);
        assert_eq!(fixture.grains.len(), 1);
        while fixture.grains.insert(&Grain::default()).is_some() {}
        assert!(fixture.grains.is_full());

        fixture.run(&[NoteEvent::note_off(0, 60), NoteEvent::note_on(0, 64)], 512);
        assert_eq!(fixture.grains.len(), GrainPool::CAPACITY);
        assert_eq!(fixture.spawner.spawned_grains(), 1);
        assert_eq!(fixture.spawner.dropped_grains(), 1);
        Ok(())
    }

    #[test]
    fn grain_count_never_exceeds_capacity() -> Result<(), Error> {
        let mut fixture = Fixture::new()?;
        fixture.set(ParameterBank::GRAIN_RATE, 6000.0)?;
        fixture.set(ParameterBank::GRAIN_SUSTAIN, 1.0)?;
        let events = (0..128)
            .map(|note| NoteEvent::note_on(0, note))
            .collect::<Vec<_>>();
        fixture.run(&events, 1024);
        for _ in 0..8 {
            fixture.run(&[], 1024);
            assert!(fixture.grains.len() <= GrainPool::CAPACITY);
        }
        assert!(fixture.grains.is_full());
        assert_eq!(fixture.voices.active_count(), VoicePool::CAPACITY);
        assert!(fixture.spawner.dropped_grains() > 0);
        Ok(())
    }

    #[test]
    fn pitch_identity() -> Result<(), Error> {
        let mut fixture = Fixture::new()?;
        fixture.run(&[NoteEvent::note_on(0, 60)], 64);
        let (_, grain) = fixture.grains.iter().next().unwrap();
        assert_eq!(grain.step, 1.0);
        Ok(())
    }

    #[test]
    fn pitch_follows_note_and_source_rate() -> Result<(), Error> {
        let mut fixture = Fixture::new()?;
        fixture.sample = LoadedSample::new(vec![vec![0.0; 1000]], 24000.0)?;
        fixture.set(ParameterBank::ROOT_NOTE, 48.0)?;
        fixture.run(&[NoteEvent::note_on(0, 60)], 64);
        let (_, grain) = fixture.grains.iter().next().unwrap();
        assert_eq!(grain.step, 1.0);

        fixture.set(ParameterBank::GRAIN_PITCH_MIN, -12.0)?;
        fixture.set(ParameterBank::GRAIN_PITCH_MAX, -12.0)?;
        fixture.grains.clear();
        fixture.run(&[NoteEvent::note_on(0, 60)], 64);
        let (_, grain) = fixture.grains.iter().next().unwrap();
        assert_eq!(grain.step, 0.5);
        Ok(())
    }

    #[test]
    fn grains_are_deterministic_without_randomization() -> Result<(), Error> {
        let mut fixture = Fixture::new()?;
        fixture.set(ParameterBank::GRAIN_GAIN_MIN, -6.0)?;
        fixture.set(ParameterBank::GRAIN_GAIN_MAX, -6.0)?;
        fixture.set(ParameterBank::GRAIN_PAN_MIN, 0.25)?;
        fixture.set(ParameterBank::GRAIN_PAN_MAX, 0.25)?;
        fixture.set(ParameterBank::GRAIN_POSITION_MIN, 50.0)?;
        fixture.set(ParameterBank::GRAIN_POSITION_MAX, 50.0)?;

        fixture.run(&[NoteEvent::note_on(0, 62)], 64);
        let (_, first) = fixture.grains.iter().next().unwrap();
        fixture.grains.clear();
        fixture.run(&[NoteEvent::note_off(0, 62), NoteEvent::note_on(10, 62)], 64);
        let (_, second) = fixture.grains.iter().next().unwrap();

        assert_eq!(second, first);
        assert_eq!(fixture.sink.start_times(), vec![0, 64 + 10]);
        assert_eq!(first.sample_pos, 24000.0);
        assert_eq!(first.pan, 0.25);
        assert_eq!(first.gain, db_to_linear(-6.0));
        Ok(())
    }

    #[test]
    fn randomized_grains_stay_in_range() -> Result<(), Error> {
        let mut fixture = Fixture::new()?;
        fixture.set(ParameterBank::GRAIN_GAIN_MIN, -24.0)?;
        fixture.set(ParameterBank::GRAIN_PAN_MIN, -1.0)?;
        fixture.set(ParameterBank::GRAIN_PAN_MAX, 1.0)?;
        fixture.set(ParameterBank::GRAIN_POSITION_MAX, 100.0)?;
        fixture.set(ParameterBank::DELAY_RANDOM_RANGE, 0.5)?;
        fixture.run(&[NoteEvent::note_on(0, 60)], 48000);
        assert_eq!(fixture.grains.len(), 50);
        for (_, grain) in fixture.grains.iter() {
            assert!(grain.gain >= db_to_linear(-24.0) && grain.gain <= 1.0);
            assert!((-1.0..=1.0).contains(&grain.pan));
            assert!((0.0..=48000.0).contains(&grain.sample_pos));
            assert!(grain.delay < 48000 + 24001);
        }
        Ok(())
    }

    #[test]
    fn position_is_clamped() -> Result<(), Error> {
        let mut fixture = Fixture::new()?;
        fixture.set(ParameterBank::GRAIN_POSITION_MIN, 90.0)?;
        fixture.set(ParameterBank::GRAIN_POSITION_MAX, 100.0)?;
        fixture.set(ParameterBank::MOD_ROTATION_POSITION, 100.0)?;
        fixture.modulation.set_rotation(1.0);
        fixture.run(&[NoteEvent::note_on(0, 60)], 48000);
        for (_, grain) in fixture.grains.iter() {
            assert_eq!(grain.sample_pos, 48000.0);
        }

        fixture.grains.clear();
        fixture.set(ParameterBank::GRAIN_POSITION_MIN, 0.0)?;
        fixture.set(ParameterBank::GRAIN_POSITION_MAX, 10.0)?;
        fixture.set(ParameterBank::MOD_ROTATION_POSITION, -100.0)?;
        fixture.run(&[NoteEvent::note_on(0, 61)], 48000);
        assert!(!fixture.grains.is_empty());
        for (_, grain) in fixture.grains.iter() {
            assert_eq!(grain.sample_pos, 0.0);
        }
        Ok(())
    }

    #[test]
    fn rate_modulation() -> Result<(), Error> {
        let mut fixture = Fixture::new()?;
        fixture.set(ParameterBank::MOD_INTENSITY_RATE, 100.0)?;
        fixture.modulation.set_intensity(0.5);
        fixture.run(&[NoteEvent::note_on(0, 60)], 2048);
        // 50 Hz + 0.5 * 100 Hz
        assert_eq!(fixture.delays(), vec![0, 480, 960, 1440, 1920]);
        Ok(())
    }

    #[test]
    fn grain_envelope_from_parameters() -> Result<(), Error> {
        let mut fixture = Fixture::new()?;
        fixture.set(ParameterBank::GRAIN_ATTACK, 0.02)?;
        fixture.set(ParameterBank::GRAIN_SUSTAIN, 0.1)?;
        fixture.set(ParameterBank::GRAIN_RELEASE, 0.05)?;
        fixture.set(ParameterBank::GRAIN_RELEASE_CURVE, 3.0)?;
        fixture.run(&[NoteEvent::note_on(0, 60)], 64);
        let (_, grain) = fixture.grains.iter().next().unwrap();
        assert_eq!(grain.env_attack_frames, 960);
        assert_eq!(grain.env_release_frames, 2400);
        assert_eq!(grain.length, 960 + 4800 + 2400);
        assert_eq!(grain.frames, grain.length);
        assert_eq!(grain.env_attack_curve, 1.0);
        assert_eq!(grain.env_release_curve, 3.0);
        Ok(())
    }

    #[test]
    fn snapshot_without_bank_uses_defaults() {
        let spawner = GrainSpawner::new(None);
        assert_eq!(spawner.snapshot(), ParameterSnapshot::default());
        assert_eq!(spawner.voice_timing(), VoiceTiming::default());
    }
}

//! An example rendering a granular chord with modulation into a wav file.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use arg::{parse_args, Args};

use drizzle::{
    GrainEngine, GrainEngineOptions, GrainVisualData, GrainVisualSink, LoadedSample,
    ModulationInput, NoteEvent, ParameterBank, ParameterStore, GRAIN_POOL_CAPACITY,
};

// -------------------------------------------------------------------------------------------------

#[cfg(all(debug_assertions, feature = "assert-allocs"))]
#[global_allocator]
static A: assert_no_alloc::AllocDisabler = assert_no_alloc::AllocDisabler;

// -------------------------------------------------------------------------------------------------

const DEFAULT_LOG_LEVEL: log::Level = if cfg!(debug_assertions) {
    log::Level::Debug
} else {
    log::Level::Warn
};

// -------------------------------------------------------------------------------------------------

// Render parameter consts (tweak as needed!)

const SAMPLE_RATE: u32 = 48000;
const BLOCK_SIZE: usize = 512;
const RENDER_SECONDS: f32 = 8.0;
const RELEASE_AT_SECONDS: f32 = 5.0;

const CHORD: [u8; 3] = [57, 60, 64];

const GRAIN_RATE: f32 = 40.0;
const GRAIN_PITCH: (f32, f32) = (-0.1, 0.1);
const GRAIN_PAN: (f32, f32) = (-0.6, 0.6);
const GRAIN_POSITION: (f32, f32) = (10.0, 60.0);
const GRAIN_ATTACK: f32 = 0.05;
const GRAIN_SUSTAIN: f32 = 0.05;
const GRAIN_RELEASE: f32 = 0.1;

const VOICE_ATTACK: f32 = 0.5;
const VOICE_RELEASE: f32 = 2.0;

// -------------------------------------------------------------------------------------------------

#[derive(Args, Debug, Default)]
struct Arguments {
    #[arg(short = "i", long = "input")]
    /// Granulate the given wav file instead of a generated test tone.
    input_path: Option<PathBuf>,
    #[arg(short = "o", long = "output")]
    /// Write the rendered audio into the given wav file. By default \"render-grains.wav\".
    output_path: Option<PathBuf>,
    #[arg(short = "s", long = "seed")]
    /// Seed for the grain randomization. Renders are reproducible when set.
    seed: Option<u64>,
    #[arg(short = "l", long = "log-level")]
    /// Set logging level to \"debug\", \"info\", \"warn\" or \"error\".
    log_level: Option<log::Level>,
}

// -------------------------------------------------------------------------------------------------

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = parse_args::<Arguments>();

    simple_logger::SimpleLogger::new()
        .with_level(args.log_level.unwrap_or(DEFAULT_LOG_LEVEL).to_level_filter())
        .init()?;

    // Load or create the source sample
    let sample = match &args.input_path {
        Some(path) => load_sample(path)?,
        None => test_tone(SAMPLE_RATE as f64, 4.0)?,
    };

    // Set up parameters
    let store = ParameterStore::new();
    let set = |parameter: drizzle::FloatParameter, value: f32| {
        store.set_value(parameter.id(), value)
    };
    set(ParameterBank::GRAIN_RATE, GRAIN_RATE)?;
    set(ParameterBank::GRAIN_PITCH_MIN, GRAIN_PITCH.0)?;
    set(ParameterBank::GRAIN_PITCH_MAX, GRAIN_PITCH.1)?;
    set(ParameterBank::GRAIN_PAN_MIN, GRAIN_PAN.0)?;
    set(ParameterBank::GRAIN_PAN_MAX, GRAIN_PAN.1)?;
    set(ParameterBank::GRAIN_POSITION_MIN, GRAIN_POSITION.0)?;
    set(ParameterBank::GRAIN_POSITION_MAX, GRAIN_POSITION.1)?;
    set(ParameterBank::GRAIN_GAIN_MIN, -12.0)?;
    set(ParameterBank::GRAIN_GAIN_MAX, -6.0)?;
    set(ParameterBank::GRAIN_ATTACK, GRAIN_ATTACK)?;
    set(ParameterBank::GRAIN_SUSTAIN, GRAIN_SUSTAIN)?;
    set(ParameterBank::GRAIN_RELEASE, GRAIN_RELEASE)?;
    set(ParameterBank::VOICE_ATTACK, VOICE_ATTACK)?;
    set(ParameterBank::VOICE_RELEASE, VOICE_RELEASE)?;
    set(ParameterBank::MOD_ROTATION_POSITION, 30.0)?;
    set(ParameterBank::MOD_INTENSITY_RATE, 60.0)?;

    for descriptor in store.descriptors() {
        if let Some(value) = store.value(descriptor.id()) {
            if value != descriptor.default_value() {
                println!(
                    "{}: {}",
                    descriptor.name(),
                    descriptor.value_to_string(value, true)
                );
            }
        }
    }

    // Set up the engine
    let mut options = GrainEngineOptions::default();
    if let Some(seed) = args.seed {
        options = options.seed(seed);
    }
    let mut engine = GrainEngine::with_options(options)?;
    engine.prepare(SAMPLE_RATE as f64, BLOCK_SIZE)?;
    engine.set_loaded_sample(sample);
    engine.set_parameter_bank(ParameterBank::bind(&store)?);

    let modulation = Arc::new(ModulationInput::new());
    engine.set_modulation_input(Arc::clone(&modulation));

    let visuals = Arc::new(GrainVisualData::new(GRAIN_POOL_CAPACITY));
    engine.set_visual_sink(Some(Arc::clone(&visuals) as Arc<dyn GrainVisualSink>));
    let clock = engine.render_clock();

    // Render
    let total_frames = (RENDER_SECONDS * SAMPLE_RATE as f32) as usize;
    let release_frame = (RELEASE_AT_SECONDS * SAMPLE_RATE as f32) as usize;

    let mut rendered = Vec::with_capacity(total_frames * 2);
    let mut block = vec![0.0; BLOCK_SIZE * 2];
    let mut events = Vec::with_capacity(CHORD.len());
    let mut frame = 0;
    while frame < total_frames {
        let block_frames = BLOCK_SIZE.min(total_frames - frame);
        events.clear();
        if frame == 0 {
            events.extend(CHORD.iter().map(|note| NoteEvent::note_on(0, *note)));
        }
        if (frame..frame + block_frames).contains(&release_frame) {
            let offset = release_frame - frame;
            events.extend(CHORD.iter().map(|note| NoteEvent::note_off(offset, *note)));
        }

        // slowly sweep the modulation sources
        let time = frame as f32 / SAMPLE_RATE as f32;
        modulation.set_rotation(0.5 + 0.5 * (time * 0.5).sin());
        modulation.set_intensity(time / RENDER_SECONDS);

        let output = &mut block[..block_frames * 2];
        engine.process(output, &events);
        rendered.extend_from_slice(output);

        let now = clock.now();
        visuals.retire_finished(now);
        if now % (SAMPLE_RATE as u64) < block_frames as u64 {
            log::info!(
                "{:.1}s: {} grains in flight, {} visible",
                time,
                engine.grains().len(),
                visuals.active_grains().count()
            );
        }
        frame += block_frames;
    }

    println!(
        "Spawned {} grains ({} dropped)",
        engine.spawner().spawned_grains(),
        engine.spawner().dropped_grains()
    );

    // Write
    let output_path = args
        .output_path
        .unwrap_or_else(|| PathBuf::from("render-grains.wav"));
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&output_path, spec)?;
    for value in rendered {
        writer.write_sample(value)?;
    }
    writer.finalize()?;
    println!("Wrote '{}'", output_path.display());

    Ok(())
}

// -------------------------------------------------------------------------------------------------

fn load_sample(path: &Path) -> Result<LoadedSample, Box<dyn std::error::Error>> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|value| value.map(|value| value as f32 * scale))
                .collect::<Result<Vec<_>, _>>()?
        }
    };
    Ok(LoadedSample::from_interleaved(
        &samples,
        spec.channels as usize,
        spec.sample_rate as f64,
    )?)
}

fn test_tone(sample_rate: f64, seconds: f64) -> Result<LoadedSample, drizzle::Error> {
    // a detuned saw pair at middle C, slowly fading out
    let frame_count = (sample_rate * seconds) as usize;
    let frequency = 261.6256;
    let channel = |detune: f64| {
        (0..frame_count)
            .map(|frame| {
                let time = frame as f64 / sample_rate;
                let phase = (time * frequency * detune).fract();
                let fade = 1.0 - time / seconds;
                ((2.0 * phase - 1.0) * 0.5 * fade) as f32
            })
            .collect::<Vec<_>>()
    };
    LoadedSample::new(vec![channel(1.0), channel(1.003)], sample_rate)
}

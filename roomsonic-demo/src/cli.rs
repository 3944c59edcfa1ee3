use anyhow::{Context, Result, bail};
use roomsonic::audio_data::RoomSonicAudioData;
use roomsonic::math::{Quat, Vec3};
use roomsonic::scene::{NodeId, SceneGraph};
use roomsonic::{Backend, EmitterId, RoomSonicDesc, RoomSonicEngine};
use std::f32::consts::TAU;

const SAMPLE_RATE: u32 = 48000;
const BLOCK_SIZE: usize = 1024;
const ORBIT_RADIUS: f32 = 2.0;

pub fn print_usage() {
    println!("roomsonic-demo [--seconds N] [--backend NAME] [--hrtf FILE.json] [--play] [AUDIO_FILE]");
    println!();
    println!("Renders an emitter orbiting the listener through each backend and prints");
    println!("per-channel RMS. --play sends the selected backend to the output device");
    println!("(requires the `device` feature).");
}

#[derive(Debug, Default)]
pub struct DemoOptions {
    pub seconds: f32,
    pub backend: Option<Backend>,
    pub hrtf_path: Option<String>,
    pub audio_path: Option<String>,
    pub play: bool,
}

impl DemoOptions {
    pub fn parse(args: &[String]) -> Result<Self> {
        let mut options = Self {
            seconds: 4.0,
            ..Default::default()
        };

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--play" => options.play = true,
                "--seconds" => {
                    let value = iter.next().context("--seconds needs a value")?;
                    options.seconds = value
                        .parse()
                        .with_context(|| format!("invalid duration '{}'", value))?;
                }
                "--backend" => {
                    let value = iter.next().context("--backend needs a value")?;
                    options.backend = Some(value.parse()?);
                }
                "--hrtf" => {
                    options.hrtf_path = Some(iter.next().context("--hrtf needs a path")?.clone());
                }
                other if other.starts_with("--") => bail!("unknown option '{}'", other),
                path => options.audio_path = Some(path.to_string()),
            }
        }

        if !(options.seconds > 0.0) {
            bail!("duration must be positive");
        }
        Ok(options)
    }
}

/// A two-node scene: the camera at the origin and a speaker orbiting it.
struct DemoScene {
    graph: SceneGraph,
    speaker: NodeId,
    emitter: EmitterId,
}

impl DemoScene {
    fn new(engine: &mut RoomSonicEngine, audio: RoomSonicAudioData) -> Result<Self> {
        let mut graph = SceneGraph::new();
        let camera = graph.add_node("camera");
        let speaker = graph.add_node("speaker");
        // face -Z like a typical camera
        graph.set_rotation(camera, Quat::from_rotation_y(std::f32::consts::PI))?;

        let emitter = engine.create_emitter()?;
        engine.attach_listener(&mut graph, camera)?;
        engine.attach_emitter(&mut graph, speaker, emitter)?;
        engine.set_buffer(emitter, audio)?;
        engine.set_loop(emitter, true)?;
        engine.play(emitter)?;

        Ok(Self {
            graph,
            speaker,
            emitter,
        })
    }

    /// Moves the speaker to its orbit position at `t` seconds and ticks the engine.
    fn tick(&mut self, engine: &mut RoomSonicEngine, t: f32, period: f32) -> Result<()> {
        let angle = TAU * t / period;
        let position = Vec3::new(
            ORBIT_RADIUS * angle.sin(),
            0.0,
            -ORBIT_RADIUS * angle.cos(),
        );
        self.graph.set_position(self.speaker, position)?;
        engine.update(&mut self.graph);
        Ok(())
    }
}

fn load_audio(options: &DemoOptions) -> Result<RoomSonicAudioData> {
    match &options.audio_path {
        Some(path) => {
            log::info!("Loading audio file: {}", path);
            Ok(RoomSonicAudioData::from_path(path)?)
        }
        None => {
            // one second of a 440 Hz tone with a slow tremolo, so motion is audible
            let samples = (0..SAMPLE_RATE as usize)
                .map(|i| {
                    let t = i as f32 / SAMPLE_RATE as f32;
                    0.4 * (TAU * 440.0 * t).sin() * (0.75 + 0.25 * (TAU * 3.0 * t).sin())
                })
                .collect();
            Ok(RoomSonicAudioData::from_samples(samples, SAMPLE_RATE, 1)?)
        }
    }
}

fn create_engine(options: &DemoOptions, backend: Backend) -> Result<RoomSonicEngine> {
    let desc = RoomSonicDesc::new()
        .sample_rate(SAMPLE_RATE)
        .block_size(BLOCK_SIZE)
        .default_backend(backend);
    let mut engine = RoomSonicEngine::with_fallback_hrtf(desc)?;

    if let Some(path) = &options.hrtf_path {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path))?;
        engine.load_hrtf_json(&bytes)?;
    }
    Ok(engine)
}

fn rms(samples: impl Iterator<Item = f32>) -> f32 {
    let (sum, count) = samples.fold((0.0f64, 0usize), |(sum, n), s| {
        (sum + (s as f64) * (s as f64), n + 1)
    });
    if count == 0 {
        0.0
    } else {
        (sum / count as f64).sqrt() as f32
    }
}

/// Renders the orbit through every backend (or the selected one) without a device.
pub fn run_offline(options: &DemoOptions) -> Result<()> {
    let audio = load_audio(options)?;
    let backends: Vec<Backend> = match options.backend {
        Some(backend) => vec![backend],
        None => Backend::ALL.to_vec(),
    };

    let total_frames = (options.seconds * SAMPLE_RATE as f32) as usize;
    println!("{:<16} {:>10} {:>10}", "backend", "rms left", "rms right");

    for backend in backends {
        let mut engine = create_engine(options, backend)?;
        let mut scene = DemoScene::new(&mut engine, audio.clone())?;

        let mut rendered = Vec::with_capacity(total_frames * 2);
        let mut block = vec![0.0f32; BLOCK_SIZE * 2];
        let mut frame = 0;
        while frame < total_frames {
            scene.tick(&mut engine, frame as f32 / SAMPLE_RATE as f32, options.seconds)?;
            let frames = engine.render(&mut block);
            rendered.extend_from_slice(&block[..frames * 2]);
            frame += frames;
        }

        for event in engine.poll_events() {
            log::debug!("{}: {:?}", backend, event);
        }
        let left = rms(rendered.iter().step_by(2).copied());
        let right = rms(rendered.iter().skip(1).step_by(2).copied());
        println!("{:<16} {:>10.4} {:>10.4}", backend.name(), left, right);
        log::info!(
            "{}: {} frames rendered for {}",
            backend,
            engine.frames_rendered(),
            scene.emitter
        );
    }
    Ok(())
}

#[cfg(feature = "device")]
pub fn run_live(options: &DemoOptions) -> Result<()> {
    use roomsonic::RoomSonicDevice;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    let audio = load_audio(options)?;
    let backend = options.backend.unwrap_or(Backend::BinauralFir);
    let mut engine = create_engine(options, backend)?;
    let mut scene = DemoScene::new(&mut engine, audio)?;

    let engine = Arc::new(Mutex::new(engine));
    let mut device = RoomSonicDevice::new(Arc::clone(&engine));
    device.start()?;
    log::info!("Playing through {} for {:.1}s", backend, options.seconds);

    let started = Instant::now();
    while started.elapsed().as_secs_f32() < options.seconds {
        {
            let mut engine = engine
                .lock()
                .map_err(|_| anyhow::anyhow!("engine lock poisoned"))?;
            scene.tick(&mut engine, started.elapsed().as_secs_f32(), options.seconds)?;
            for event in engine.poll_events() {
                if event.is_error() {
                    log::warn!("{:?}", event);
                }
            }
        }
        std::thread::sleep(Duration::from_millis(16));
    }

    device.stop();
    log::info!(
        "Played {} frames, {} blocks of silence while the engine was busy",
        device.frames_played(),
        device.missed_blocks()
    );
    Ok(())
}

#[cfg(not(feature = "device"))]
pub fn run_live(_options: &DemoOptions) -> Result<()> {
    bail!("live playback needs the `device` feature: cargo run -p roomsonic-demo --features device -- --play")
}

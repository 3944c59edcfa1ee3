//! Spatialization backends.
//!
//! Every emitter owns one [`SourceAdapter`] per [`Backend`] and the listener owns
//! one [`ListenerAdapter`] per backend. All of them receive every transform update;
//! only the live backend's output reaches the mix.

mod ambisonic;
mod binaural;
mod direct;

pub use ambisonic::{AmbisonicListener, AmbisonicRoomSource};
pub use binaural::{BinauralDirection, BinauralFirSource, BinauralListener, binaural_direction};
pub use direct::{DirectPannerListener, DirectPannerSource};

use crate::audio_data::RoomSonicAudioData;
use crate::error::RoomSonicError;
use crate::listener::Listener;
use crate::math::{TransformSample, Vec3};
use crate::playback::{ChannelRouting, PlaybackState, PlaybackUnit, UnitPull};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Equal-power stereo panner.
    DirectPanner,
    /// Per-ear FIR convolution with measured head-related impulse responses.
    BinauralFir,
    /// Shoebox room with first-order reflections, rendered through first-order
    /// ambisonics.
    AmbisonicRoom,
}

impl Backend {
    pub const ALL: [Backend; 3] = [
        Backend::DirectPanner,
        Backend::BinauralFir,
        Backend::AmbisonicRoom,
    ];

    pub fn index(self) -> usize {
        match self {
            Backend::DirectPanner => 0,
            Backend::BinauralFir => 1,
            Backend::AmbisonicRoom => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Backend::DirectPanner => "direct-panner",
            Backend::BinauralFir => "binaural-fir",
            Backend::AmbisonicRoom => "ambisonic-room",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Backend {
    type Err = RoomSonicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "direct" | "direct-panner" | "panner" => Ok(Backend::DirectPanner),
            "binaural" | "binaural-fir" | "hrtf" => Ok(Backend::BinauralFir),
            "ambisonic" | "ambisonic-room" | "room" => Ok(Backend::AmbisonicRoom),
            other => Err(RoomSonicError::Configuration(format!(
                "Unknown backend '{}'",
                other
            ))),
        }
    }
}

/// Per-block mixing buffers shared by every source of one render pass.
///
/// Stereo backends add straight into `left`/`right`. The ambisonic backend encodes
/// into the four B-format channels, which its listener decodes into `left`/`right`
/// once at the end of the block.
#[derive(Debug)]
pub struct MixBus {
    frames: usize,
    pub left: Vec<f32>,
    pub right: Vec<f32>,
    /// First-order B-format: W, X (front), Y (left), Z (up).
    pub ambisonic: [Vec<f32>; 4],
}

impl MixBus {
    pub fn new(max_frames: usize) -> Self {
        Self {
            frames: 0,
            left: vec![0.0; max_frames],
            right: vec![0.0; max_frames],
            ambisonic: std::array::from_fn(|_| vec![0.0; max_frames]),
        }
    }

    /// Clears the bus for a block of `frames` frames.
    pub fn begin(&mut self, frames: usize) {
        self.frames = frames;
        for channel in [&mut self.left, &mut self.right]
            .into_iter()
            .chain(self.ambisonic.iter_mut())
        {
            channel.resize(frames.max(channel.len()), 0.0);
            channel[..frames].fill(0.0);
        }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn stereo(&self) -> (&[f32], &[f32]) {
        (&self.left[..self.frames], &self.right[..self.frames])
    }
}

/// State every source adapter shares: the playback unit plus what is needed to
/// rebuild it.
#[derive(Debug)]
pub struct SourceCore {
    unit: PlaybackUnit,
    buffer: Option<RoomSonicAudioData>,
    looping: bool,
    gain: f32,
    has_started: bool,
    state: PlaybackState,
    /// Unit output for the current block.
    scratch: Vec<f32>,
    /// Frames of spatializer tail still to flush after the unit went quiet.
    tail_remaining: usize,
    /// Set while the spatializer did not see the frames the unit advanced over.
    stale: bool,
}

impl SourceCore {
    pub fn new(routing: ChannelRouting) -> Self {
        Self {
            unit: PlaybackUnit::new(routing),
            buffer: None,
            looping: false,
            gain: 1.0,
            has_started: false,
            state: PlaybackState::Idle,
            scratch: Vec::new(),
            tail_remaining: 0,
            stale: false,
        }
    }

    pub fn unit(&self) -> &PlaybackUnit {
        &self.unit
    }

    pub fn buffer(&self) -> Option<&RoomSonicAudioData> {
        self.buffer.as_ref()
    }

    pub fn looping(&self) -> bool {
        self.looping
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn has_started(&self) -> bool {
        self.has_started
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Replaces a unit that has been started with a fresh one carrying the current
    /// buffer, loop flag and gain, connected with `routing`.
    ///
    /// Returns true when a new unit was built.
    pub fn ensure_fresh_unit(&mut self, routing: ChannelRouting) -> bool {
        if !self.unit.is_started() {
            return false;
        }

        if let Err(e) = self.unit.stop() {
            log::trace!("Discarded unit refused stop: {}", e);
        }

        let mut unit = PlaybackUnit::new(routing);
        unit.set_loop(self.looping);
        unit.set_gain(self.gain);
        if let Some(buffer) = &self.buffer {
            if let Err(e) = unit.set_buffer(buffer.clone()) {
                log::warn!("Fresh playback unit rejected its buffer: {}", e);
            }
        }
        self.unit = unit;
        true
    }
}

/// One backend's view of an emitter.
///
/// Implementors provide the spatializer; the playback contract (`set_buffer`,
/// `set_loop`, `play`, `stop`) is shared and lives in the provided methods.
pub trait SourceAdapter: Send {
    fn backend(&self) -> Backend;

    fn core(&self) -> &SourceCore;

    fn core_mut(&mut self) -> &mut SourceCore;

    /// How the unit's channels are connected to this backend's spatializer.
    fn routing(&self) -> ChannelRouting;

    /// Forgets filter history, delay lines and interpolation state.
    fn reset_spatializer(&mut self);

    /// Frames of output a spatializer keeps producing after its input goes silent.
    fn tail_frames(&self) -> usize {
        0
    }

    /// Emitter position as last seen by this backend.
    fn position(&self) -> Vec3;

    /// Listener-relative direction, for backends that keep one between updates.
    fn listener_direction(&self) -> Option<BinauralDirection> {
        None
    }

    /// Receives a fresh world transform for the emitter.
    fn update_transform(&mut self, sample: &TransformSample, listener: &Listener);

    /// Spatializes one block of unit output into the bus.
    ///
    /// `input` holds `bus.frames()` frames with `channels` interleaved channels.
    fn spatialize(
        &mut self,
        input: &[f32],
        channels: usize,
        listener: &Listener,
        bus: &mut MixBus,
    );

    /// Called after the listener moved; backends with listener-relative state
    /// refresh it here.
    fn listener_moved(&mut self, _listener: &Listener) {}

    fn set_buffer(&mut self, buffer: RoomSonicAudioData) {
        let backend = self.backend();
        let routing = self.routing();
        let core = self.core_mut();

        core.buffer = Some(buffer.clone());
        if core.ensure_fresh_unit(routing) {
            log::debug!("{}: playback unit recreated for new buffer", backend);
        } else if let Err(e) = core.unit.set_buffer(buffer) {
            log::warn!("{}: buffer assignment failed: {}", backend, e);
        }
        core.has_started = false;
        core.state = PlaybackState::Idle;
        core.tail_remaining = 0;

        self.reset_spatializer();
    }

    fn set_loop(&mut self, looping: bool) {
        let core = self.core_mut();
        core.looping = looping;
        core.unit.set_loop(looping);
    }

    fn set_gain(&mut self, gain: f32) {
        let core = self.core_mut();
        core.gain = gain;
        core.unit.set_gain(gain);
    }

    /// Starts playback. Returns false when the call was ignored.
    fn play(&mut self) -> bool {
        let backend = self.backend();
        let routing = self.routing();
        let core = self.core_mut();

        if core.buffer.is_none() {
            log::warn!("{}: play ignored, no buffer set", backend);
            return false;
        }
        if core.state == PlaybackState::Started {
            log::warn!(
                "{}: play ignored, already started (assign the buffer again to restart)",
                backend
            );
            return false;
        }

        if core.ensure_fresh_unit(routing) {
            log::debug!("{}: playback unit recreated for replay", backend);
        }
        if let Err(e) = core.unit.start() {
            log::warn!("{}: unit failed to start: {}", backend, e);
            return false;
        }
        core.has_started = true;
        core.state = PlaybackState::Started;
        true
    }

    /// Stops playback. Safe to call any number of times.
    fn stop(&mut self) {
        let backend = self.backend();
        let core = self.core_mut();

        if !core.has_started {
            return;
        }
        if let Err(e) = core.unit.stop() {
            log::debug!("{}: stop ignored: {}", backend, e);
        }
        core.state = PlaybackState::Idle;
    }

    fn state(&self) -> PlaybackState {
        self.core().state
    }

    /// Pulls one block from the unit and spatializes it into `bus`.
    fn render(&mut self, listener: &Listener, bus: &mut MixBus) -> UnitPull {
        let frames = bus.frames();
        let tail = self.tail_frames();
        let core = self.core_mut();

        let playing = core.unit.is_playing();
        if !playing && core.tail_remaining == 0 {
            return UnitPull::default();
        }

        let mut scratch = std::mem::take(&mut core.scratch);
        scratch.resize(frames * 2, 0.0);
        let channels = core.unit.output_channels();
        let pull = core.unit.pull(&mut scratch, frames);

        if pull.frames > 0 {
            core.tail_remaining = tail;
        } else {
            core.tail_remaining = core.tail_remaining.saturating_sub(frames);
        }
        if pull.ended {
            core.state = PlaybackState::Ended;
        }
        let stale = std::mem::take(&mut core.stale);

        if stale {
            self.reset_spatializer();
        }
        self.spatialize(&scratch[..frames * channels], channels, listener, bus);
        self.core_mut().scratch = scratch;
        pull
    }

    /// Moves the unit forward without producing audio.
    fn advance(&mut self, frames: usize) -> UnitPull {
        let core = self.core_mut();
        let pull = core.unit.advance(frames);
        if pull.frames > 0 {
            core.stale = true;
        }
        core.tail_remaining = 0;
        if pull.ended {
            core.state = PlaybackState::Ended;
        }
        pull
    }
}

/// One backend's view of the listener.
pub trait ListenerAdapter: Send {
    fn backend(&self) -> Backend;

    fn update_transform(&mut self, sample: &TransformSample);

    /// Runs once per block after all sources were spatialized.
    fn finish_block(&self, _bus: &mut MixBus) {}
}

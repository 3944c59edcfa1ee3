use crate::audio_data::RoomSonicAudioData;
use crate::backend::{
    AmbisonicRoomSource, Backend, BinauralFirSource, DirectPannerSource, MixBus, SourceAdapter,
};
use crate::config::RoomSonicDesc;
use crate::hrtf::HrtfHandle;
use crate::listener::Listener;
use crate::math::TransformSample;
use crate::playback::{PlaybackState, UnitPull};
use std::fmt;

/// Handle of an emitter inside a [`RoomSonicEngine`](crate::RoomSonicEngine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EmitterId(pub u64);

impl fmt::Display for EmitterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "emitter#{}", self.0)
    }
}

/// A sound-emitting object with one source adapter per backend.
///
/// Every playback call is applied to all three adapters so whichever backend
/// becomes live is already primed.
pub struct Emitter {
    id: EmitterId,
    adapters: [Box<dyn SourceAdapter>; 3],
    sample: TransformSample,
    buffer: Option<RoomSonicAudioData>,
    gain: f32,
    looping: bool,
    state: PlaybackState,
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("id", &self.id)
            .field("position", &self.sample.position)
            .field("gain", &self.gain)
            .field("looping", &self.looping)
            .field("state", &self.state)
            .field("has_buffer", &self.buffer.is_some())
            .finish()
    }
}

impl Emitter {
    pub(crate) fn new(id: EmitterId, desc: &RoomSonicDesc, hrtf: HrtfHandle) -> Self {
        let adapters: [Box<dyn SourceAdapter>; 3] = [
            Box::new(DirectPannerSource::new(desc.distance, desc.cone)),
            Box::new(BinauralFirSource::new(
                hrtf,
                desc.distance,
                desc.hrtf_crossfade,
            )),
            Box::new(AmbisonicRoomSource::new(
                desc.room.clone(),
                desc.distance,
                desc.sample_rate,
            )),
        ];

        Self {
            id,
            adapters,
            sample: TransformSample::default(),
            buffer: None,
            gain: 1.0,
            looping: false,
            state: PlaybackState::Idle,
        }
    }

    pub fn id(&self) -> EmitterId {
        self.id
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn looping(&self) -> bool {
        self.looping
    }

    pub fn buffer(&self) -> Option<&RoomSonicAudioData> {
        self.buffer.as_ref()
    }

    pub fn transform(&self) -> &TransformSample {
        &self.sample
    }

    pub fn adapter(&self, backend: Backend) -> &dyn SourceAdapter {
        self.adapters[backend.index()].as_ref()
    }

    pub fn adapter_mut(&mut self, backend: Backend) -> &mut dyn SourceAdapter {
        self.adapters[backend.index()].as_mut()
    }

    pub fn set_buffer(&mut self, buffer: RoomSonicAudioData) {
        for adapter in &mut self.adapters {
            adapter.set_buffer(buffer.clone());
        }
        self.buffer = Some(buffer);
        self.state = PlaybackState::Idle;
    }

    pub fn set_loop(&mut self, looping: bool) {
        self.looping = looping;
        for adapter in &mut self.adapters {
            adapter.set_loop(looping);
        }
    }

    /// Sets the emitter gain; negative and non-finite values are treated as 0.
    pub fn set_gain(&mut self, gain: f32) {
        self.gain = if gain.is_finite() { gain.max(0.0) } else { 0.0 };
        for adapter in &mut self.adapters {
            adapter.set_gain(self.gain);
        }
    }

    /// Returns true when playback started.
    pub fn play(&mut self) -> bool {
        let mut started = false;
        for adapter in &mut self.adapters {
            started |= adapter.play();
        }
        if started {
            self.state = PlaybackState::Started;
        }
        started
    }

    /// Returns true when the emitter was playing.
    pub fn stop(&mut self) -> bool {
        let was_started = self.state == PlaybackState::Started;
        for adapter in &mut self.adapters {
            adapter.stop();
        }
        self.state = PlaybackState::Idle;
        was_started
    }

    pub fn update_transform(&mut self, sample: &TransformSample, listener: &Listener) {
        self.sample = *sample;
        for adapter in &mut self.adapters {
            adapter.update_transform(sample, listener);
        }
    }

    pub fn listener_moved(&mut self, listener: &Listener) {
        for adapter in &mut self.adapters {
            adapter.listener_moved(listener);
        }
    }

    /// Renders the live backend into the bus and keeps the others in step.
    ///
    /// Returns the live unit's pull; `ended` is only ever reported for it.
    pub(crate) fn render(&mut self, live: Backend, listener: &Listener, bus: &mut MixBus) -> UnitPull {
        let frames = bus.frames();
        let mut live_pull = UnitPull::default();
        for adapter in &mut self.adapters {
            if adapter.backend() == live {
                live_pull = adapter.render(listener, bus);
            } else {
                adapter.advance(frames);
            }
        }
        if live_pull.ended {
            self.state = PlaybackState::Ended;
        }
        live_pull
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hrtf::HrtfDataset;
    use std::sync::Arc;

    fn emitter() -> Emitter {
        let hrtf = HrtfHandle::new(Arc::new(HrtfDataset::fallback(48000)));
        Emitter::new(EmitterId(1), &RoomSonicDesc::default(), hrtf)
    }

    fn tone(frames: usize) -> RoomSonicAudioData {
        RoomSonicAudioData::from_samples(vec![0.5; frames], 48000, 1).unwrap()
    }

    #[test]
    fn test_fan_out() {
        let mut emitter = emitter();
        emitter.set_buffer(tone(64));
        emitter.set_loop(true);
        emitter.set_gain(0.5);
        assert!(emitter.play());

        for backend in Backend::ALL {
            let adapter = emitter.adapter(backend);
            assert_eq!(adapter.state(), PlaybackState::Started);
            assert!(adapter.core().unit().looping());
            assert_eq!(adapter.core().gain(), 0.5);
        }
        assert_eq!(emitter.state(), PlaybackState::Started);
    }

    #[test]
    fn test_play_without_buffer_is_ignored() {
        let mut emitter = emitter();
        assert!(!emitter.play());
        assert_eq!(emitter.state(), PlaybackState::Idle);
    }

    #[test]
    fn test_negative_gain_clamped() {
        let mut emitter = emitter();
        emitter.set_gain(-2.0);
        assert_eq!(emitter.gain(), 0.0);
        emitter.set_gain(f32::NAN);
        assert_eq!(emitter.gain(), 0.0);
    }

    #[test]
    fn test_transform_reaches_every_backend() {
        let mut emitter = emitter();
        let listener = Listener::new();
        let sample = TransformSample::from_vectors(
            crate::math::Vec3::new(1.0, 0.0, 2.0),
            crate::math::Vec3::Z,
            crate::math::Vec3::Y,
        );
        emitter.update_transform(&sample, &listener);
        assert_eq!(emitter.transform().position, sample.position);
    }
}

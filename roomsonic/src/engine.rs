use crate::audio_data::{AudioDataLoader, DefaultAudioLoader, RoomSonicAudioData};
use crate::backend::{Backend, BinauralDirection, MixBus};
use crate::config::RoomSonicDesc;
use crate::emitter::{Emitter, EmitterId};
use crate::error::{Result, RoomSonicError};
use crate::events::RoomSonicEvent;
use crate::hrtf::{HrtfDataset, HrtfHandle};
use crate::listener::Listener;
use crate::loader::DecodeJobs;
use crate::math::{Mat4, TransformSample};
use crate::playback::PlaybackState;
use crate::scene::{BindingTarget, NodeId, SceneBindings, SceneGraph, WorldMatrixHook};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::collections::BTreeMap;
use std::sync::Arc;

/// The spatial audio engine.
///
/// `RoomSonicEngine` owns every emitter, the listener and the three rendering
/// backends. Each emitter carries one source adapter per backend and every
/// playback or transform call reaches all of them, but only the *active* backend
/// is mixed into the output. Switching backends therefore never needs a new
/// transform or a new buffer.
///
/// # Frame loop
///
/// - Call [`update`](Self::update) once per animation frame with the host's
///   [`SceneGraph`]. It recomputes world matrices, pushes the transforms of bound
///   nodes into the engine and applies finished background decodes.
/// - Call [`render`](Self::render) whenever the output needs more audio.
/// - Drain notifications with [`poll_events`](Self::poll_events).
pub struct RoomSonicEngine {
    desc: RoomSonicDesc,
    active_backend: Backend,
    master_volume: f32,
    emitters: BTreeMap<EmitterId, Emitter>,
    next_emitter_id: u64,
    listener: Listener,
    hrtf: HrtfHandle,
    bus: MixBus,
    bindings: SceneBindings,
    decode_jobs: DecodeJobs,
    event_sender: Sender<RoomSonicEvent>,
    event_receiver: Receiver<RoomSonicEvent>,
    frames_rendered: u64,
}

impl std::fmt::Debug for RoomSonicEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomSonicEngine")
            .field("sample_rate", &self.desc.sample_rate)
            .field("channels", &self.desc.channels)
            .field("active_backend", &self.active_backend)
            .field("master_volume", &self.master_volume)
            .field("emitters", &self.emitters.len())
            .field("frames_rendered", &self.frames_rendered)
            .finish()
    }
}

impl RoomSonicEngine {
    /// Creates an engine rendering with the given HRTF dataset.
    pub fn new(desc: RoomSonicDesc, hrtf: Arc<HrtfDataset>) -> Result<Self> {
        desc.validate()?;
        if hrtf.is_empty() {
            return Err(RoomSonicError::Hrtf(
                "HRTF dataset contains no measurements".to_string(),
            ));
        }

        let (event_sender, event_receiver) = unbounded();
        log::info!(
            "RoomSonic engine created: {} Hz, {} channels, block {} frames, backend {}",
            desc.sample_rate,
            desc.channels,
            desc.block_size,
            desc.default_backend
        );

        Ok(Self {
            active_backend: desc.default_backend,
            master_volume: desc.master_volume,
            emitters: BTreeMap::new(),
            next_emitter_id: 1,
            listener: Listener::new(),
            hrtf: HrtfHandle::new(hrtf),
            bus: MixBus::new(desc.block_size),
            bindings: SceneBindings::new(),
            decode_jobs: DecodeJobs::new(Arc::new(DefaultAudioLoader), desc.sample_rate),
            event_sender,
            event_receiver,
            frames_rendered: 0,
            desc,
        })
    }

    /// Creates an engine with the built-in spherical-head HRTF set.
    pub fn with_fallback_hrtf(desc: RoomSonicDesc) -> Result<Self> {
        let dataset = Arc::new(HrtfDataset::fallback(desc.sample_rate));
        Self::new(desc, dataset)
    }

    pub fn desc(&self) -> &RoomSonicDesc {
        &self.desc
    }

    pub fn sample_rate(&self) -> u32 {
        self.desc.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.desc.channels
    }

    /// Frames written by [`render`](Self::render) since the engine was created.
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    fn emit(&self, event: RoomSonicEvent) {
        if let Err(e) = self.event_sender.send(event) {
            log::warn!("Dropping engine event: {}", e);
        }
    }

    fn emitter_mut(&mut self, id: EmitterId) -> Result<&mut Emitter> {
        self.emitters
            .get_mut(&id)
            .ok_or(RoomSonicError::UnknownEmitter(id))
    }

    // Emitters

    pub fn create_emitter(&mut self) -> Result<EmitterId> {
        if self.emitters.len() >= self.desc.max_emitters {
            return Err(RoomSonicError::Engine(format!(
                "Emitter limit of {} reached",
                self.desc.max_emitters
            )));
        }

        let id = EmitterId(self.next_emitter_id);
        self.next_emitter_id += 1;

        let mut emitter = Emitter::new(id, &self.desc, self.hrtf.clone());
        emitter.listener_moved(&self.listener);
        self.emitters.insert(id, emitter);
        log::debug!("{} created", id);
        Ok(id)
    }

    /// Removes an emitter together with its scene bindings and pending decodes.
    ///
    /// Returns the nodes that were bound to the emitter. Their hooks are still
    /// registered on the host graph: pass them to
    /// [`SceneGraph::unregister_hook`], or use
    /// [`remove_bound_emitter`](Self::remove_bound_emitter) instead.
    pub fn remove_emitter(&mut self, id: EmitterId) -> Result<Vec<NodeId>> {
        let mut emitter = self
            .emitters
            .remove(&id)
            .ok_or(RoomSonicError::UnknownEmitter(id))?;
        emitter.stop();

        let nodes = self.bindings.forget_target(BindingTarget::Emitter(id));
        if self.decode_jobs.cancel(id) {
            log::debug!("{} removed with a decode in flight", id);
        }
        log::debug!("{} removed ({} scene bindings dropped)", id, nodes.len());
        Ok(nodes)
    }

    /// Removes an emitter and unregisters the hooks of every node bound to it.
    pub fn remove_bound_emitter(&mut self, graph: &mut SceneGraph, id: EmitterId) -> Result<()> {
        if !self.emitters.contains_key(&id) {
            return Err(RoomSonicError::UnknownEmitter(id));
        }
        self.bindings
            .detach_target(graph, BindingTarget::Emitter(id));
        self.remove_emitter(id)?;
        Ok(())
    }

    pub fn emitter(&self, id: EmitterId) -> Option<&Emitter> {
        self.emitters.get(&id)
    }

    pub fn emitter_ids(&self) -> Vec<EmitterId> {
        self.emitters.keys().copied().collect()
    }

    pub fn contains_emitter(&self, id: EmitterId) -> bool {
        self.emitters.contains_key(&id)
    }

    pub fn emitter_count(&self) -> usize {
        self.emitters.len()
    }

    // Playback

    /// Assigns decoded audio to every backend of the emitter, resampling it to
    /// the engine rate first when needed.
    pub fn set_buffer(&mut self, id: EmitterId, buffer: RoomSonicAudioData) -> Result<()> {
        let sample_rate = self.desc.sample_rate;
        let emitter = self.emitter_mut(id)?;
        let buffer = if buffer.sample_rate() != sample_rate {
            buffer.resample(sample_rate)?
        } else {
            buffer
        };
        emitter.set_buffer(buffer);
        Ok(())
    }

    pub fn set_loop(&mut self, id: EmitterId, looping: bool) -> Result<()> {
        self.emitter_mut(id)?.set_loop(looping);
        Ok(())
    }

    /// Sets the emitter gain, applied identically in every backend.
    pub fn set_volume(&mut self, id: EmitterId, volume: f32) -> Result<()> {
        self.emitter_mut(id)?.set_gain(volume);
        Ok(())
    }

    /// Starts playback. Without a buffer, or while already playing, the call is
    /// ignored with a warning.
    pub fn play(&mut self, id: EmitterId) -> Result<()> {
        if self.emitter_mut(id)?.play() {
            log::debug!("{} started", id);
            self.emit(RoomSonicEvent::EmitterStarted { emitter_id: id });
        }
        Ok(())
    }

    /// Stops playback. Stopping an emitter that is not playing has no effect.
    pub fn stop(&mut self, id: EmitterId) -> Result<()> {
        if self.emitter_mut(id)?.stop() {
            log::debug!("{} stopped", id);
            self.emit(RoomSonicEvent::EmitterStopped { emitter_id: id });
        }
        Ok(())
    }

    pub fn playback_state(&self, id: EmitterId) -> Result<PlaybackState> {
        self.emitters
            .get(&id)
            .map(Emitter::state)
            .ok_or(RoomSonicError::UnknownEmitter(id))
    }

    // Backends

    /// Routes the mix through `backend`. Playback is not restarted.
    pub fn set_active_backend(&mut self, backend: Backend) {
        if backend == self.active_backend {
            return;
        }
        let from = std::mem::replace(&mut self.active_backend, backend);
        log::info!("Active backend switched from {} to {}", from, backend);
        self.emit(RoomSonicEvent::BackendChanged { from, to: backend });
    }

    pub fn active_backend(&self) -> Backend {
        self.active_backend
    }

    /// Sets the gain of the final mix; negative and non-finite values mute.
    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = if volume.is_finite() {
            volume.max(0.0)
        } else {
            0.0
        };
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    // Transforms

    pub fn update_emitter_transform(&mut self, id: EmitterId, sample: &TransformSample) -> Result<()> {
        let emitter = self
            .emitters
            .get_mut(&id)
            .ok_or(RoomSonicError::UnknownEmitter(id))?;
        emitter.update_transform(sample, &self.listener);
        Ok(())
    }

    pub fn update_listener_transform(&mut self, sample: &TransformSample) {
        self.listener.update_transform(sample);
        for emitter in self.emitters.values_mut() {
            emitter.listener_moved(&self.listener);
        }
    }

    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    /// Direction of the emitter as the binaural backend renders it. A source on
    /// the listener's vertical axis reports the azimuth held from before.
    pub fn binaural_direction(&self, id: EmitterId) -> Option<BinauralDirection> {
        self.emitters
            .get(&id)?
            .adapter(Backend::BinauralFir)
            .listener_direction()
    }

    // Rendering

    /// Renders interleaved audio for [`channels`](Self::channels) channels into
    /// `out` and returns the number of frames written.
    ///
    /// Mono output averages the stereo mix; channels beyond the second are silent.
    pub fn render(&mut self, out: &mut [f32]) -> usize {
        let channels = self.desc.channels as usize;
        let total = out.len() / channels;
        let live = self.active_backend;

        let mut written = 0;
        while written < total {
            let frames = (total - written).min(self.desc.block_size);

            self.bus.begin(frames);
            for emitter in self.emitters.values_mut() {
                let pull = emitter.render(live, &self.listener, &mut self.bus);
                if pull.ended {
                    log::debug!("{} ended", emitter.id());
                    if let Err(e) = self.event_sender.send(RoomSonicEvent::EmitterEnded {
                        emitter_id: emitter.id(),
                    }) {
                        log::warn!("Dropping engine event: {}", e);
                    }
                }
            }
            self.listener.adapter(live).finish_block(&mut self.bus);

            let (left, right) = self.bus.stereo();
            let block = &mut out[written * channels..(written + frames) * channels];
            for (i, frame) in block.chunks_exact_mut(channels).enumerate() {
                if channels == 1 {
                    frame[0] = 0.5 * (left[i] + right[i]) * self.master_volume;
                } else {
                    frame[0] = left[i] * self.master_volume;
                    frame[1] = right[i] * self.master_volume;
                    frame[2..].fill(0.0);
                }
            }
            written += frames;
        }

        self.frames_rendered += total as u64;
        total
    }

    /// Drains the events produced since the last call.
    pub fn poll_events(&self) -> Vec<RoomSonicEvent> {
        self.event_receiver.try_iter().collect()
    }

    // HRTF

    /// Swaps the dataset for every binaural source; each picks it up on its next block.
    pub fn set_hrtf_dataset(&mut self, dataset: Arc<HrtfDataset>) -> Result<()> {
        if dataset.is_empty() {
            return Err(RoomSonicError::Hrtf(
                "HRTF dataset contains no measurements".to_string(),
            ));
        }
        let measurements = dataset.len();
        self.hrtf.swap(dataset);
        log::info!("HRTF dataset replaced ({} measurements)", measurements);
        self.emit(RoomSonicEvent::HrtfDatasetChanged { measurements });
        Ok(())
    }

    /// Parses a fetched HRTF JSON document and makes it the active dataset.
    pub fn load_hrtf_json(&mut self, bytes: &[u8]) -> Result<()> {
        let dataset = HrtfDataset::from_json_slice(bytes)?;
        self.set_hrtf_dataset(Arc::new(dataset))
    }

    pub fn hrtf_handle(&self) -> &HrtfHandle {
        &self.hrtf
    }

    pub fn hrtf_dataset(&self) -> Arc<HrtfDataset> {
        self.hrtf.load()
    }

    // Decoding

    pub fn set_audio_loader(&mut self, loader: Arc<dyn AudioDataLoader>) {
        self.decode_jobs.set_loader(loader);
    }

    /// Decodes `bytes` in the background; the result is applied by
    /// [`poll_loads`](Self::poll_loads). A newer request for the same emitter
    /// supersedes this one.
    ///
    /// Returns the request generation.
    pub fn load_audio(&mut self, id: EmitterId, bytes: Vec<u8>, buffer_id: u32) -> Result<u64> {
        if !self.emitters.contains_key(&id) {
            return Err(RoomSonicError::UnknownEmitter(id));
        }
        self.decode_jobs.submit(id, bytes, buffer_id)
    }

    /// Decodes on the calling thread and assigns the buffer. A decode still in
    /// flight for the emitter is superseded. On failure the emitter is untouched.
    pub fn load_audio_blocking(&mut self, id: EmitterId, bytes: &[u8], buffer_id: u32) -> Result<()> {
        if !self.emitters.contains_key(&id) {
            return Err(RoomSonicError::UnknownEmitter(id));
        }
        self.decode_jobs.cancel(id);

        let audio = self.decode_jobs.decode_blocking(bytes)?;
        self.set_buffer(id, audio)?;
        self.emit(RoomSonicEvent::BufferLoaded {
            emitter_id: id,
            buffer_id,
        });
        Ok(())
    }

    pub fn is_loading(&self, id: EmitterId) -> bool {
        self.decode_jobs.is_pending(id)
    }

    /// Applies finished background decodes. Returns how many were applied.
    pub fn poll_loads(&mut self) -> usize {
        let mut applied = 0;
        for outcome in self.decode_jobs.drain() {
            let id = outcome.emitter_id;
            if !self.emitters.contains_key(&id) {
                log::debug!("Decode finished for removed {}", id);
                continue;
            }

            let result = outcome
                .result
                .and_then(|audio| self.set_buffer(id, audio));
            match result {
                Ok(()) => {
                    log::debug!("{} loaded buffer {}", id, outcome.buffer_id);
                    self.emit(RoomSonicEvent::BufferLoaded {
                        emitter_id: id,
                        buffer_id: outcome.buffer_id,
                    });
                }
                Err(e) => {
                    log::warn!("{} failed to load buffer {}: {}", id, outcome.buffer_id, e);
                    self.emit(RoomSonicEvent::DecodeFailed {
                        emitter_id: id,
                        buffer_id: outcome.buffer_id,
                        error: e.to_string(),
                    });
                }
            }
            applied += 1;
        }
        applied
    }

    // Scene graph

    /// Drives the emitter from `node`'s world transform. The node's current
    /// transform is applied immediately.
    pub fn attach_emitter(&mut self, graph: &mut SceneGraph, node: NodeId, id: EmitterId) -> Result<()> {
        if !self.emitters.contains_key(&id) {
            return Err(RoomSonicError::UnknownEmitter(id));
        }
        self.bindings
            .attach(graph, node, BindingTarget::Emitter(id))?;
        graph.force_update(node, self)
    }

    /// Drives the listener from `node`'s world transform, typically the camera.
    pub fn attach_listener(&mut self, graph: &mut SceneGraph, node: NodeId) -> Result<()> {
        self.bindings.attach(graph, node, BindingTarget::Listener)?;
        graph.force_update(node, self)
    }

    /// Unbinds `node`. Returns false when it was not bound.
    pub fn detach(&mut self, graph: &mut SceneGraph, node: NodeId) -> bool {
        self.bindings.detach(graph, node).is_some()
    }

    pub fn bindings(&self) -> &SceneBindings {
        &self.bindings
    }

    /// Per-frame tick: recomputes the graph's world matrices, dispatching bound
    /// transforms, then applies finished decodes.
    ///
    /// Returns the number of nodes recomputed.
    pub fn update(&mut self, graph: &mut SceneGraph) -> usize {
        let recomputed = graph.update_world_matrices(&mut *self);
        self.poll_loads();
        recomputed
    }
}

impl WorldMatrixHook for RoomSonicEngine {
    fn world_matrix_updated(&mut self, node: NodeId, world: &Mat4) {
        match self.bindings.target_of(node) {
            Some(BindingTarget::Emitter(id)) => {
                let sample = TransformSample::from_matrix(world);
                if let Some(emitter) = self.emitters.get_mut(&id) {
                    emitter.update_transform(&sample, &self.listener);
                }
            }
            Some(BindingTarget::Listener) => {
                let sample = TransformSample::from_matrix(world);
                self.update_listener_transform(&sample);
            }
            None => log::trace!("Dropping transform of unbound {}", node),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_data::tests::wav_bytes;
    use crate::math::{Quat, Vec3};
    use std::f32::consts::FRAC_1_SQRT_2;
    use std::time::{Duration, Instant};

    fn engine() -> RoomSonicEngine {
        let _ = env_logger::builder().is_test(true).try_init();
        RoomSonicEngine::with_fallback_hrtf(RoomSonicDesc::default().block_size(256)).unwrap()
    }

    fn tone(value: f32, frames: usize) -> RoomSonicAudioData {
        RoomSonicAudioData::from_samples(vec![value; frames], 48000, 1).unwrap()
    }

    fn count(events: &[RoomSonicEvent], pred: impl Fn(&RoomSonicEvent) -> bool) -> usize {
        events.iter().filter(|e| pred(e)).count()
    }

    fn wait_for_loads(engine: &mut RoomSonicEngine, id: EmitterId) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while engine.is_loading(id) && Instant::now() < deadline {
            engine.poll_loads();
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut engine = engine();
        let id = engine.create_emitter().unwrap();

        // never started
        engine.stop(id).unwrap();
        assert_eq!(engine.playback_state(id).unwrap(), PlaybackState::Idle);

        engine.set_buffer(id, tone(0.5, 4800)).unwrap();
        engine.play(id).unwrap();
        engine.stop(id).unwrap();
        engine.stop(id).unwrap();
        assert_eq!(engine.playback_state(id).unwrap(), PlaybackState::Idle);

        let events = engine.poll_events();
        assert_eq!(
            count(&events, |e| matches!(e, RoomSonicEvent::EmitterStopped { .. })),
            1
        );
    }

    #[test]
    fn test_new_buffer_after_end_plays() {
        let mut engine = engine();
        let id = engine.create_emitter().unwrap();
        let mut out = vec![0.0; 2 * 128];

        engine.set_buffer(id, tone(0.25, 64)).unwrap();
        engine.play(id).unwrap();
        engine.render(&mut out);
        assert_eq!(engine.playback_state(id).unwrap(), PlaybackState::Ended);

        engine.set_buffer(id, tone(0.75, 4800)).unwrap();
        engine.play(id).unwrap();
        assert_eq!(engine.playback_state(id).unwrap(), PlaybackState::Started);

        engine.render(&mut out);
        // emitter and listener share the origin: centered equal-power pan
        let expected = 0.75 * FRAC_1_SQRT_2;
        assert!((out[0] - expected).abs() < 1e-5, "{}", out[0]);
        assert!((out[1] - expected).abs() < 1e-5, "{}", out[1]);
    }

    #[test]
    fn test_inactive_backends_track_transform() {
        let mut engine = engine();
        let id = engine.create_emitter().unwrap();
        let position = Vec3::new(1.5, 0.5, -2.0);
        engine
            .update_emitter_transform(id, &TransformSample::from_vectors(position, Vec3::Z, Vec3::Y))
            .unwrap();

        for backend in Backend::ALL {
            engine.set_active_backend(backend);
            let emitter = engine.emitter(id).unwrap();
            assert_eq!(emitter.adapter(backend).position(), position);
        }
    }

    #[test]
    fn test_switch_needs_no_new_transform() {
        let listener = TransformSample::from_matrix(&Mat4::from_rotation_translation(
            Quat::from_rotation_y(0.7),
            Vec3::new(0.3, 0.0, -0.4),
        ));
        let source = TransformSample::from_vectors(Vec3::new(2.0, 0.5, 1.0), Vec3::NEG_X, Vec3::Y);

        for target in Backend::ALL {
            let other = Backend::ALL[(target.index() + 1) % Backend::ALL.len()];
            // transforms arrive while `active` is live, then `target` takes over
            let render = |active: Backend| {
                let mut engine = engine();
                engine.set_active_backend(active);
                engine.update_listener_transform(&listener);
                let id = engine.create_emitter().unwrap();
                engine.update_emitter_transform(id, &source).unwrap();
                engine.set_active_backend(target);

                engine.set_buffer(id, tone(0.5, 2048)).unwrap();
                engine.play(id).unwrap();
                let mut out = vec![0.0; 2 * 1024];
                engine.render(&mut out);
                out
            };

            let primed = render(target);
            let switched = render(other);
            assert!(
                primed.iter().any(|s| s.abs() > 1e-4),
                "{} rendered silence",
                target
            );
            assert_eq!(primed, switched, "{} changed after switching from {}", target, other);
        }
    }

    #[test]
    fn test_loop_survives_unit_recreation() {
        let mut engine = engine();
        let id = engine.create_emitter().unwrap();
        engine.set_loop(id, true).unwrap();
        engine.set_buffer(id, tone(0.5, 100)).unwrap();
        engine.play(id).unwrap();

        let mut out = vec![0.0; 2 * 64];
        engine.render(&mut out);

        // buffer change after start rebuilds every unit
        engine.set_buffer(id, tone(0.5, 100)).unwrap();
        engine.play(id).unwrap();
        let emitter = engine.emitter(id).unwrap();
        for backend in Backend::ALL {
            assert!(emitter.adapter(backend).core().unit().looping());
        }

        let mut out = vec![0.0; 2 * 1000];
        engine.render(&mut out);
        assert_eq!(engine.playback_state(id).unwrap(), PlaybackState::Started);
        assert!(out[2 * 900].abs() > 1e-4);
    }

    #[test]
    fn test_source_behind_listener() {
        let mut engine = engine();
        let id = engine.create_emitter().unwrap();
        engine.update_listener_transform(&TransformSample::from_vectors(
            Vec3::ZERO,
            Vec3::NEG_Z,
            Vec3::Y,
        ));
        engine
            .update_emitter_transform(
                id,
                &TransformSample::from_vectors(Vec3::new(0.0, 0.0, 3.0), Vec3::Z, Vec3::Y),
            )
            .unwrap();

        let direction = engine.binaural_direction(id).unwrap();
        assert!((direction.azimuth - 180.0).abs() < 1e-3, "{:?}", direction);
        assert!(direction.elevation.abs() < 1e-3);
        assert!((direction.distance - 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_direction_holds_azimuth_overhead() {
        let mut engine = engine();
        let id = engine.create_emitter().unwrap();
        let at = |position: Vec3| TransformSample::from_vectors(position, Vec3::Z, Vec3::Y);

        engine
            .update_emitter_transform(id, &at(Vec3::new(1.0, 0.0, 1.0)))
            .unwrap();
        let direction = engine.binaural_direction(id).unwrap();
        assert!((direction.azimuth - 45.0).abs() < 1e-3, "{:?}", direction);

        // straight above the listener there is no bearing to take
        engine
            .update_emitter_transform(id, &at(Vec3::new(0.0, 2.0, 0.0)))
            .unwrap();
        let direction = engine.binaural_direction(id).unwrap();
        assert!((direction.azimuth - 45.0).abs() < 1e-3, "{:?}", direction);
        assert!((direction.elevation - 90.0).abs() < 1e-3);
        assert_eq!(
            Some(direction),
            engine
                .emitter(id)
                .unwrap()
                .adapter(Backend::BinauralFir)
                .listener_direction()
        );
        assert_eq!(engine.binaural_direction(EmitterId(999)), None);
    }

    #[test]
    fn test_ended_reported_once_for_live_backend() {
        let mut engine = engine();
        let id = engine.create_emitter().unwrap();
        engine.set_buffer(id, tone(0.5, 100)).unwrap();
        engine.play(id).unwrap();

        let mut out = vec![0.0; 2 * 1024];
        engine.render(&mut out);
        engine.render(&mut out);

        let events = engine.poll_events();
        assert_eq!(
            count(&events, |e| matches!(e, RoomSonicEvent::EmitterEnded { .. })),
            1
        );
        assert_eq!(engine.playback_state(id).unwrap(), PlaybackState::Ended);
    }

    #[test]
    fn test_master_volume_and_mono_output() {
        let desc = RoomSonicDesc::default().channels(1).block_size(128);
        let mut engine = RoomSonicEngine::with_fallback_hrtf(desc).unwrap();
        let id = engine.create_emitter().unwrap();
        engine.set_buffer(id, tone(1.0, 4800)).unwrap();
        engine.play(id).unwrap();
        engine.set_master_volume(0.5);

        let mut out = vec![0.0; 300];
        assert_eq!(engine.render(&mut out), 300);
        assert!((out[0] - 0.5 * FRAC_1_SQRT_2).abs() < 1e-5, "{}", out[0]);
        assert_eq!(engine.frames_rendered(), 300);

        engine.set_master_volume(-1.0);
        assert_eq!(engine.master_volume(), 0.0);
    }

    #[test]
    fn test_hrtf_swap_reaches_live_emitters() {
        let mut engine = engine();
        engine.set_active_backend(Backend::BinauralFir);
        // +X is the listener's left
        let left = TransformSample::from_vectors(Vec3::X, Vec3::Z, Vec3::Y);
        let ids: Vec<EmitterId> = (0..2)
            .map(|_| {
                let id = engine.create_emitter().unwrap();
                engine.update_emitter_transform(id, &left).unwrap();
                engine.set_buffer(id, tone(0.25, 48000)).unwrap();
                engine.play(id).unwrap();
                id
            })
            .collect();

        let mut out = vec![0.0; 2 * 256];
        engine.render(&mut out);
        // the spherical head lets the far ear hear a shadowed copy
        assert!(out.chunks_exact(2).any(|frame| frame[1].abs() > 1e-4));

        let mut left_only = vec![0.0f32; 101];
        left_only[0] = 1.0;
        let json = serde_json::json!([{
            "azimuth": 90.0,
            "elevation": 0.0,
            "distance": 1.0,
            "fir_coeffs_left": left_only,
            "fir_coeffs_right": vec![0.0f32; 101],
        }]);
        engine.load_hrtf_json(json.to_string().as_bytes()).unwrap();
        assert_eq!(engine.hrtf_dataset().ir_length(), 101);

        // sources pick the dataset up on their next block
        for &id in &ids {
            let adapter = engine.emitter(id).unwrap().adapter(Backend::BinauralFir);
            assert_eq!(adapter.tail_frames(), 64);
        }

        engine.render(&mut out);
        for frame in out.chunks_exact(2) {
            assert!((frame[0] - 0.5).abs() < 1e-6, "{}", frame[0]);
            assert_eq!(frame[1], 0.0);
        }
        for &id in &ids {
            let adapter = engine.emitter(id).unwrap().adapter(Backend::BinauralFir);
            assert_eq!(adapter.tail_frames(), 101);
        }

        // a rejected document leaves the current dataset in place
        assert!(engine.load_hrtf_json(b"[]").is_err());
        assert_eq!(engine.hrtf_dataset().len(), 1);

        let events = engine.poll_events();
        assert_eq!(
            count(&events, |e| matches!(e, RoomSonicEvent::HrtfDatasetChanged { .. })),
            1
        );
        assert!(events.contains(&RoomSonicEvent::HrtfDatasetChanged { measurements: 1 }));
    }

    #[test]
    fn test_backend_change_event() {
        let mut engine = engine();
        engine.set_active_backend(Backend::AmbisonicRoom);
        engine.set_active_backend(Backend::AmbisonicRoom);
        let events = engine.poll_events();
        assert_eq!(
            events,
            vec![RoomSonicEvent::BackendChanged {
                from: Backend::DirectPanner,
                to: Backend::AmbisonicRoom,
            }]
        );
    }

    #[test]
    fn test_emitter_limit() {
        let desc = RoomSonicDesc::default().max_emitters(1);
        let mut engine = RoomSonicEngine::with_fallback_hrtf(desc).unwrap();
        let id = engine.create_emitter().unwrap();
        assert!(engine.create_emitter().is_err());
        engine.remove_emitter(id).unwrap();
        assert!(engine.create_emitter().is_ok());
        assert!(matches!(
            engine.remove_emitter(id),
            Err(RoomSonicError::UnknownEmitter(_))
        ));
    }

    #[test]
    fn test_async_load_applies_buffer() {
        let mut engine = engine();
        let id = engine.create_emitter().unwrap();
        engine
            .load_audio(id, wav_bytes(&[0.25; 2400], 24000, 1), 9)
            .unwrap();
        wait_for_loads(&mut engine, id);

        let buffer = engine.emitter(id).unwrap().buffer().unwrap();
        assert_eq!(buffer.sample_rate(), 48000);
        assert_eq!(
            engine.poll_events(),
            vec![RoomSonicEvent::BufferLoaded {
                emitter_id: id,
                buffer_id: 9,
            }]
        );
    }

    #[test]
    fn test_latest_load_wins() {
        let mut engine = engine();
        let id = engine.create_emitter().unwrap();
        engine
            .load_audio(id, wav_bytes(&[0.1; 48000], 48000, 1), 1)
            .unwrap();
        engine
            .load_audio(id, wav_bytes(&[0.2; 480], 48000, 1), 2)
            .unwrap();
        wait_for_loads(&mut engine, id);
        // let the superseded decode finish and get discarded
        std::thread::sleep(Duration::from_millis(200));
        engine.poll_loads();

        assert_eq!(engine.emitter(id).unwrap().buffer().unwrap().total_frames(), 480);
        let events = engine.poll_events();
        assert_eq!(
            events,
            vec![RoomSonicEvent::BufferLoaded {
                emitter_id: id,
                buffer_id: 2,
            }]
        );
    }

    #[test]
    fn test_decode_failure_leaves_emitter_untouched() {
        let mut engine = engine();
        let id = engine.create_emitter().unwrap();
        engine.set_buffer(id, tone(0.5, 100)).unwrap();

        engine.load_audio(id, vec![1, 2, 3, 4], 5).unwrap();
        wait_for_loads(&mut engine, id);

        let events = engine.poll_events();
        assert_eq!(events.len(), 1);
        assert!(events[0].is_error());
        assert_eq!(events[0].emitter_id(), Some(id));
        assert_eq!(engine.emitter(id).unwrap().buffer().unwrap().total_frames(), 100);

        assert!(engine.load_audio_blocking(id, &[0, 0, 0], 6).is_err());
        assert_eq!(engine.playback_state(id).unwrap(), PlaybackState::Idle);
    }

    #[test]
    fn test_blocking_load() {
        let mut engine = engine();
        let id = engine.create_emitter().unwrap();
        engine
            .load_audio_blocking(id, &wav_bytes(&[0.5; 960], 48000, 1), 3)
            .unwrap();
        assert_eq!(engine.emitter(id).unwrap().buffer().unwrap().total_frames(), 960);
    }

    #[test]
    fn test_scene_binding_drives_emitter_and_listener() {
        let mut engine = engine();
        let mut graph = SceneGraph::new();
        let camera = graph.add_node("camera");
        let speaker = graph.add_node("speaker");
        let id = engine.create_emitter().unwrap();

        graph.set_position(camera, Vec3::new(0.0, 1.0, 0.0)).unwrap();
        engine.attach_listener(&mut graph, camera).unwrap();
        engine.attach_emitter(&mut graph, speaker, id).unwrap();
        assert_eq!(engine.listener().transform().position, Vec3::new(0.0, 1.0, 0.0));

        graph.set_position(speaker, Vec3::new(4.0, 0.0, 0.0)).unwrap();
        engine.update(&mut graph);
        assert_eq!(
            engine.emitter(id).unwrap().transform().position,
            Vec3::new(4.0, 0.0, 0.0)
        );

        assert!(engine.detach(&mut graph, speaker));
        assert!(!engine.detach(&mut graph, speaker));
        graph.set_position(speaker, Vec3::new(-4.0, 0.0, 0.0)).unwrap();
        engine.update(&mut graph);
        assert_eq!(
            engine.emitter(id).unwrap().transform().position,
            Vec3::new(4.0, 0.0, 0.0)
        );
    }

    #[test]
    fn test_removed_emitter_bindings_are_dropped() {
        let mut engine = engine();
        let mut graph = SceneGraph::new();
        let speaker = graph.add_node("speaker");
        let id = engine.create_emitter().unwrap();
        engine.attach_emitter(&mut graph, speaker, id).unwrap();

        assert_eq!(engine.remove_emitter(id).unwrap(), vec![speaker]);
        assert!(engine.bindings().is_empty());

        graph.set_position(speaker, Vec3::ONE).unwrap();
        assert_eq!(engine.update(&mut graph), 1);
        assert!(matches!(
            engine.attach_emitter(&mut graph, speaker, id),
            Err(RoomSonicError::UnknownEmitter(_))
        ));
    }

    #[test]
    fn test_remove_bound_emitter_unregisters_hooks() {
        let mut engine = engine();
        let mut graph = SceneGraph::new();
        let camera = graph.add_node("camera");
        let speaker = graph.add_node("speaker");
        let id = engine.create_emitter().unwrap();
        engine.attach_listener(&mut graph, camera).unwrap();
        engine.attach_emitter(&mut graph, speaker, id).unwrap();

        engine.remove_bound_emitter(&mut graph, id).unwrap();
        assert!(!engine.contains_emitter(id));
        assert!(!graph.is_hooked(speaker));
        assert!(graph.is_hooked(camera));
        assert_eq!(engine.bindings().len(), 1);

        assert!(matches!(
            engine.remove_bound_emitter(&mut graph, id),
            Err(RoomSonicError::UnknownEmitter(_))
        ));
    }
}

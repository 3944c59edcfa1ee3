use super::{Backend, ListenerAdapter, MixBus, SourceAdapter, SourceCore};
use crate::config::DistanceDesc;
use crate::hrtf::{HrtfDataset, HrtfHandle};
use crate::listener::Listener;
use crate::math::{TransformSample, Vec3};
use crate::playback::ChannelRouting;
use std::sync::Arc;

/// Listener-relative direction of a source, in the degree units the HRTF lookup
/// expects.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BinauralDirection {
    /// Degrees in (-180, 180], counter-clockwise positive: +90 is the listener's left.
    pub azimuth: f32,
    /// Degrees in [-90, 90], positive above the listener.
    pub elevation: f32,
    pub distance: f32,
}

/// Computes the direction of `source` as heard by a listener at `listener`
/// facing `forward`.
///
/// The source bearing `atan2(dx, dz)` is taken relative to the listener heading
/// `atan2(forward.x, forward.z)`. When the source lies exactly abeam (`dz == 0`)
/// the bearing is ±90° by the sign of `dx`. A source on the listener's vertical
/// axis has no bearing and keeps `previous_azimuth`. At zero distance the
/// elevation is 0.
pub fn binaural_direction(
    source: Vec3,
    listener: Vec3,
    forward: Vec3,
    previous_azimuth: f32,
) -> BinauralDirection {
    let delta = source - listener;
    let distance = delta.length();

    let heading = forward.x.atan2(forward.z).to_degrees();
    let azimuth = if delta.z != 0.0 {
        wrap_degrees(delta.x.atan2(delta.z).to_degrees() - heading)
    } else if delta.x != 0.0 {
        wrap_degrees(90.0f32.copysign(delta.x) - heading)
    } else {
        previous_azimuth
    };

    let elevation = if distance > 0.0 {
        (delta.y / distance).clamp(-1.0, 1.0).asin().to_degrees()
    } else {
        0.0
    };

    BinauralDirection {
        azimuth,
        elevation,
        distance,
    }
}

/// Wraps an angle in degrees into (-180, 180].
fn wrap_degrees(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(360.0);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

#[derive(Debug, Clone)]
pub struct BinauralListener {
    position: Vec3,
    forward: Vec3,
}

impl BinauralListener {
    pub fn new() -> Self {
        Self {
            position: Vec3::ZERO,
            forward: Vec3::Z,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn forward(&self) -> Vec3 {
        self.forward
    }
}

impl Default for BinauralListener {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerAdapter for BinauralListener {
    fn backend(&self) -> Backend {
        Backend::BinauralFir
    }

    fn update_transform(&mut self, sample: &TransformSample) {
        self.position = sample.position;
        self.forward = sample.forward;
    }
}

/// Convolves the downmixed unit output with the left/right impulse responses of
/// the measurement nearest to the source direction.
#[derive(Debug)]
pub struct BinauralFirSource {
    core: SourceCore,
    hrtf: HrtfHandle,
    dataset: Arc<HrtfDataset>,
    distance_model: DistanceDesc,
    crossfade: bool,
    position: Vec3,
    direction: BinauralDirection,
    /// Measurement used for the previous block.
    current: Option<usize>,
    /// Last `ir_length - 1` input samples.
    history: Vec<f32>,
    /// History followed by the current block.
    work: Vec<f32>,
}

impl BinauralFirSource {
    pub fn new(hrtf: HrtfHandle, distance_model: DistanceDesc, crossfade: bool) -> Self {
        let dataset = hrtf.load();
        let history = vec![0.0; dataset.ir_length().saturating_sub(1)];
        Self {
            core: SourceCore::new(ChannelRouting::Downmix),
            hrtf,
            dataset,
            distance_model,
            crossfade,
            position: Vec3::ZERO,
            direction: BinauralDirection::default(),
            current: None,
            history,
            work: Vec::new(),
        }
    }

    pub fn direction(&self) -> BinauralDirection {
        self.direction
    }

    /// The dataset snapshot this source renders with.
    pub fn dataset(&self) -> &Arc<HrtfDataset> {
        &self.dataset
    }

    fn refresh_direction(&mut self, listener: &Listener) {
        let l = listener.binaural();
        self.direction = binaural_direction(
            self.position,
            l.position(),
            l.forward(),
            self.direction.azimuth,
        );
    }

    /// Picks up a dataset swapped in through the shared handle.
    fn sync_dataset(&mut self) {
        let latest = self.hrtf.load();
        if Arc::ptr_eq(&latest, &self.dataset) {
            return;
        }
        log::debug!(
            "Binaural source switching to dataset with {} measurements",
            latest.len()
        );
        self.dataset = latest;
        self.reset_spatializer();
    }
}

/// `out[i] += Σ ir[k] * work[offset + i - k]`, scaled by `gain(i)`.
fn convolve(work: &[f32], ir: &[f32], out: &mut [f32], gain: impl Fn(usize) -> f32) {
    let offset = ir.len() - 1;
    for (i, o) in out.iter_mut().enumerate() {
        let end = offset + i;
        let acc: f32 = ir
            .iter()
            .enumerate()
            .map(|(k, &h)| h * work[end - k])
            .sum();
        *o += acc * gain(i);
    }
}

impl SourceAdapter for BinauralFirSource {
    fn backend(&self) -> Backend {
        Backend::BinauralFir
    }

    fn core(&self) -> &SourceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SourceCore {
        &mut self.core
    }

    fn routing(&self) -> ChannelRouting {
        ChannelRouting::Downmix
    }

    fn reset_spatializer(&mut self) {
        self.history.clear();
        self.history
            .resize(self.dataset.ir_length().saturating_sub(1), 0.0);
        self.current = None;
    }

    fn tail_frames(&self) -> usize {
        self.dataset.ir_length()
    }

    fn position(&self) -> Vec3 {
        self.position
    }

    fn listener_direction(&self) -> Option<BinauralDirection> {
        Some(self.direction)
    }

    fn update_transform(&mut self, sample: &TransformSample, listener: &Listener) {
        self.position = sample.position;
        self.refresh_direction(listener);
    }

    fn listener_moved(&mut self, listener: &Listener) {
        self.refresh_direction(listener);
    }

    fn spatialize(
        &mut self,
        input: &[f32],
        _channels: usize,
        _listener: &Listener,
        bus: &mut MixBus,
    ) {
        self.sync_dataset();

        let frames = bus.frames();
        let d = self.direction;
        let index = self.dataset.nearest(d.azimuth, d.elevation, d.distance);
        let gain = self.distance_model.gain(d.distance);

        self.work.clear();
        self.work.extend_from_slice(&self.history);
        self.work.extend_from_slice(&input[..frames.min(input.len())]);
        self.work.resize(self.history.len() + frames, 0.0);

        let dataset = Arc::clone(&self.dataset);
        let Some(target) = dataset.get(index) else {
            return;
        };

        match self.current.and_then(|prev| dataset.get(prev).map(|m| (prev, m))) {
            Some((prev, previous)) if prev != index && self.crossfade => {
                let ramp = |i: usize| (i as f32 + 1.0) / frames as f32;
                let left = &mut bus.left[..frames];
                convolve(&self.work, &previous.fir_coeffs_left, left, |i| {
                    gain * (1.0 - ramp(i))
                });
                convolve(&self.work, &target.fir_coeffs_left, left, |i| gain * ramp(i));
                let right = &mut bus.right[..frames];
                convolve(&self.work, &previous.fir_coeffs_right, right, |i| {
                    gain * (1.0 - ramp(i))
                });
                convolve(&self.work, &target.fir_coeffs_right, right, |i| gain * ramp(i));
            }
            _ => {
                convolve(&self.work, &target.fir_coeffs_left, &mut bus.left[..frames], |_| gain);
                convolve(&self.work, &target.fir_coeffs_right, &mut bus.right[..frames], |_| {
                    gain
                });
            }
        }
        self.current = Some(index);

        let keep = self.history.len();
        let start = self.work.len() - keep;
        self.history.copy_from_slice(&self.work[start..]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn test_source_in_front() {
        let d = binaural_direction(Vec3::new(0.0, 0.0, -4.0), Vec3::ZERO, Vec3::NEG_Z, 0.0);
        assert!(close(d.azimuth, 0.0), "{:?}", d);
        assert!(close(d.elevation, 0.0));
        assert!(close(d.distance, 4.0));
    }

    #[test]
    fn test_source_behind_listener_facing_negative_z() {
        let d = binaural_direction(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO, Vec3::NEG_Z, 0.0);
        assert!(close(d.azimuth, 180.0), "{:?}", d);
        assert!(close(d.distance, 3.0));
    }

    #[test]
    fn test_left_is_positive() {
        // facing +Z, the left hand is +X
        let d = binaural_direction(Vec3::new(2.0, 0.0, 2.0), Vec3::ZERO, Vec3::Z, 0.0);
        assert!(close(d.azimuth, 45.0), "{:?}", d);

        // facing -Z, the left hand is -X
        let d = binaural_direction(Vec3::new(-2.0, 0.0, -2.0), Vec3::ZERO, Vec3::NEG_Z, 0.0);
        assert!(close(d.azimuth, 45.0), "{:?}", d);
    }

    #[test]
    fn test_rotated_listener() {
        // heading +X; a source on +X is straight ahead
        let d = binaural_direction(Vec3::new(5.0, 0.0, 0.1), Vec3::ZERO, Vec3::X, 0.0);
        assert!(d.azimuth.abs() < 2.0, "{:?}", d);
    }

    #[test]
    fn test_abeam_source() {
        let d = binaural_direction(Vec3::new(3.0, 0.0, 0.0), Vec3::ZERO, Vec3::Z, 0.0);
        assert!(close(d.azimuth, 90.0));
        let d = binaural_direction(Vec3::new(-3.0, 0.0, 0.0), Vec3::ZERO, Vec3::Z, 0.0);
        assert!(close(d.azimuth, -90.0));
        assert!(d.azimuth.is_finite());
    }

    #[test]
    fn test_source_above() {
        let d = binaural_direction(Vec3::new(0.0, 2.0, 0.0), Vec3::ZERO, Vec3::NEG_Z, 33.0);
        assert!(close(d.elevation, 90.0));
        assert_eq!(d.azimuth, 33.0);
    }

    #[test]
    fn test_colocated_source() {
        let d = binaural_direction(Vec3::ONE, Vec3::ONE, Vec3::NEG_Z, 12.0);
        assert_eq!(d.distance, 0.0);
        assert_eq!(d.elevation, 0.0);
        assert_eq!(d.azimuth, 12.0);
        assert!(!d.elevation.is_nan());
    }

    #[test]
    fn test_wrap_degrees() {
        assert_eq!(wrap_degrees(-180.0), 180.0);
        assert_eq!(wrap_degrees(190.0), -170.0);
        assert_eq!(wrap_degrees(-190.0), 170.0);
        assert_eq!(wrap_degrees(45.0), 45.0);
    }

    #[test]
    fn test_convolve_with_history() {
        let ir = [1.0, 0.5];
        // history [2.0], block [1.0, 0.0]
        let work = [2.0, 1.0, 0.0];
        let mut out = [0.0; 2];
        convolve(&work, &ir, &mut out, |_| 1.0);
        assert_eq!(out, [1.0 + 0.5 * 2.0, 0.5]);
    }
}

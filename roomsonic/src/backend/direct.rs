use super::{Backend, ListenerAdapter, MixBus, SourceAdapter, SourceCore};
use crate::config::{ConeDesc, DistanceDesc};
use crate::listener::Listener;
use crate::math::{TransformSample, Vec3, unit_or};
use crate::playback::ChannelRouting;
use std::f32::consts::FRAC_PI_2;

/// Listener state for the panner: raw position plus forward/up vectors.
#[derive(Debug, Clone)]
pub struct DirectPannerListener {
    position: Vec3,
    forward: Vec3,
    up: Vec3,
}

impl DirectPannerListener {
    pub fn new() -> Self {
        Self {
            position: Vec3::ZERO,
            forward: Vec3::Z,
            up: Vec3::Y,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn forward(&self) -> Vec3 {
        self.forward
    }

    pub fn up(&self) -> Vec3 {
        self.up
    }
}

impl Default for DirectPannerListener {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerAdapter for DirectPannerListener {
    fn backend(&self) -> Backend {
        Backend::DirectPanner
    }

    fn update_transform(&mut self, sample: &TransformSample) {
        self.position = sample.position;
        self.forward = sample.forward;
        self.up = sample.up;
    }
}

/// Equal-power panner with distance attenuation and an optional sound cone.
#[derive(Debug)]
pub struct DirectPannerSource {
    core: SourceCore,
    distance: DistanceDesc,
    cone: ConeDesc,
    position: Vec3,
    orientation: Vec3,
}

impl DirectPannerSource {
    pub fn new(distance: DistanceDesc, cone: ConeDesc) -> Self {
        Self {
            core: SourceCore::new(ChannelRouting::Preserve),
            distance,
            cone,
            position: Vec3::ZERO,
            orientation: Vec3::Z,
        }
    }

    pub fn orientation(&self) -> Vec3 {
        self.orientation
    }

    fn cone_gain(&self, listener_position: Vec3) -> f32 {
        let inner = self.cone.inner_angle.abs() / 2.0;
        let outer = self.cone.outer_angle.abs() / 2.0;
        if inner >= 180.0 && outer >= 180.0 {
            return 1.0;
        }

        let to_listener = listener_position - self.position;
        if to_listener.length_squared() == 0.0 {
            return 1.0;
        }
        let angle = self.orientation.angle_between(to_listener).to_degrees();

        if angle < inner {
            1.0
        } else if angle >= outer {
            self.cone.outer_gain
        } else {
            let x = (angle - inner) / (outer - inner);
            (1.0 - x) + self.cone.outer_gain * x
        }
    }
}

/// Azimuth of `source` around the listener in degrees, positive to the right,
/// in [-180, 180].
pub(crate) fn panner_azimuth(source: Vec3, position: Vec3, forward: Vec3, up: Vec3) -> f32 {
    let to_source = source - position;
    if to_source.length_squared() == 0.0 {
        return 0.0;
    }
    let to_source = to_source.normalize();

    let forward = unit_or(forward, Vec3::Z);
    let right = unit_or(forward.cross(up), Vec3::NEG_X);
    let up = right.cross(forward);

    let projected = to_source - up * to_source.dot(up);
    if projected.length_squared() < 1.0e-12 {
        // straight above or below
        return 0.0;
    }
    let projected = projected.normalize();

    let mut azimuth = projected.dot(right).clamp(-1.0, 1.0).acos().to_degrees();
    if projected.dot(forward) < 0.0 {
        azimuth = 360.0 - azimuth;
    }
    // measured from the right, make it relative to forward
    if (0.0..=270.0).contains(&azimuth) {
        90.0 - azimuth
    } else {
        450.0 - azimuth
    }
}

/// Left and right gains of the equal-power pan law for an azimuth folded into
/// [-90, 90].
fn equal_power(azimuth: f32, stereo: bool) -> (f32, f32) {
    let x = if stereo {
        if azimuth <= 0.0 {
            (azimuth + 90.0) / 90.0
        } else {
            azimuth / 90.0
        }
    } else {
        (azimuth + 90.0) / 180.0
    };
    ((x * FRAC_PI_2).cos(), (x * FRAC_PI_2).sin())
}

fn fold_front(azimuth: f32) -> f32 {
    let azimuth = azimuth.clamp(-180.0, 180.0);
    if azimuth < -90.0 {
        -180.0 - azimuth
    } else if azimuth > 90.0 {
        180.0 - azimuth
    } else {
        azimuth
    }
}

impl SourceAdapter for DirectPannerSource {
    fn backend(&self) -> Backend {
        Backend::DirectPanner
    }

    fn core(&self) -> &SourceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SourceCore {
        &mut self.core
    }

    fn routing(&self) -> ChannelRouting {
        ChannelRouting::Preserve
    }

    fn reset_spatializer(&mut self) {}

    fn position(&self) -> Vec3 {
        self.position
    }

    fn update_transform(&mut self, sample: &TransformSample, _listener: &Listener) {
        self.position = sample.position;
        self.orientation = sample.forward;
    }

    fn spatialize(
        &mut self,
        input: &[f32],
        channels: usize,
        listener: &Listener,
        bus: &mut MixBus,
    ) {
        let l = listener.direct();
        let azimuth = fold_front(panner_azimuth(
            self.position,
            l.position(),
            l.forward(),
            l.up(),
        ));
        let gain = self
            .distance
            .gain(self.position.distance(l.position()))
            * self.cone_gain(l.position());

        let frames = bus.frames();
        if channels == 2 {
            let (gain_l, gain_r) = equal_power(azimuth, true);
            for (i, frame) in input.chunks_exact(2).take(frames).enumerate() {
                let (in_l, in_r) = (frame[0], frame[1]);
                let (out_l, out_r) = if azimuth <= 0.0 {
                    (in_l + in_r * gain_l, in_r * gain_r)
                } else {
                    (in_l * gain_l, in_r + in_l * gain_r)
                };
                bus.left[i] += out_l * gain;
                bus.right[i] += out_r * gain;
            }
        } else {
            let (gain_l, gain_r) = equal_power(azimuth, false);
            for (i, &sample) in input.iter().take(frames).enumerate() {
                bus.left[i] += sample * gain_l * gain;
                bus.right[i] += sample * gain_r * gain;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_azimuth_convention() {
        let (pos, fwd, up) = (Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        assert!(panner_azimuth(Vec3::new(0.0, 0.0, -2.0), pos, fwd, up).abs() < 1e-3);
        // facing -Z the right hand points along +X
        assert!((panner_azimuth(Vec3::new(2.0, 0.0, 0.0), pos, fwd, up) - 90.0).abs() < 1e-3);
        assert!((panner_azimuth(Vec3::new(-2.0, 0.0, 0.0), pos, fwd, up) + 90.0).abs() < 1e-3);
        let behind = panner_azimuth(Vec3::new(0.0, 0.0, 2.0), pos, fwd, up);
        assert!((behind.abs() - 180.0).abs() < 1e-3);
        assert_eq!(panner_azimuth(pos, pos, fwd, up), 0.0);
    }

    #[test]
    fn test_equal_power_is_power_preserving() {
        for azimuth in [-90.0, -45.0, 0.0, 30.0, 90.0] {
            let (l, r) = equal_power(azimuth, false);
            assert!((l * l + r * r - 1.0).abs() < 1e-5);
        }
        let (l, r) = equal_power(90.0, false);
        assert!(l.abs() < 1e-6 && (r - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_fold_front() {
        assert_eq!(fold_front(135.0), 45.0);
        assert_eq!(fold_front(-135.0), -45.0);
        assert_eq!(fold_front(180.0), 0.0);
    }

    #[test]
    fn test_cone_gain() {
        let mut source = DirectPannerSource::new(
            DistanceDesc::default(),
            ConeDesc {
                inner_angle: 60.0,
                outer_angle: 120.0,
                outer_gain: 0.1,
            },
        );
        source.orientation = Vec3::Z;
        assert_eq!(source.cone_gain(Vec3::new(0.0, 0.0, 5.0)), 1.0);
        assert!((source.cone_gain(Vec3::new(0.0, 0.0, -5.0)) - 0.1).abs() < 1e-6);
        let edge = source.cone_gain(Vec3::new(5.0, 0.0, 5.0)); // 45 degrees off axis
        assert!(edge < 1.0 && edge > 0.1);
    }
}

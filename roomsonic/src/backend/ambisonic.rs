use super::{Backend, ListenerAdapter, MixBus, SourceAdapter, SourceCore};
use crate::config::DistanceDesc;
use crate::listener::Listener;
use crate::math::{Mat4, TransformSample, Vec3, unit_or};
use crate::playback::ChannelRouting;
use crate::room::RoomDesc;
use std::f32::consts::FRAC_1_SQRT_2;

/// Listener driven by the full world matrix.
#[derive(Debug, Clone)]
pub struct AmbisonicListener {
    matrix: Mat4,
    position: Vec3,
    forward: Vec3,
    up: Vec3,
    left: Vec3,
}

impl AmbisonicListener {
    pub fn new() -> Self {
        let mut listener = Self {
            matrix: Mat4::IDENTITY,
            position: Vec3::ZERO,
            forward: Vec3::Z,
            up: Vec3::Y,
            left: Vec3::X,
        };
        listener.set_matrix(&Mat4::IDENTITY);
        listener
    }

    /// Takes position from the translation column and orientation from the +Z and
    /// +Y basis columns.
    pub fn set_matrix(&mut self, matrix: &Mat4) {
        self.matrix = *matrix;
        let position = matrix.w_axis.truncate();
        let forward = unit_or(matrix.z_axis.truncate(), Vec3::Z);
        let up = unit_or(matrix.y_axis.truncate(), Vec3::Y);
        self.set_vectors(position, forward, up);
    }

    fn set_vectors(&mut self, position: Vec3, forward: Vec3, up: Vec3) {
        self.position = if position.is_finite() {
            position
        } else {
            Vec3::ZERO
        };
        self.forward = forward;
        self.up = up;
        self.left = unit_or(up.cross(forward), Vec3::X);
    }

    pub fn matrix(&self) -> Mat4 {
        self.matrix
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Direction of `point` in the listener's ambisonic frame: (front, left, up).
    pub fn local_direction(&self, point: Vec3) -> Vec3 {
        let d = unit_or(point - self.position, self.forward);
        Vec3::new(d.dot(self.forward), d.dot(self.left), d.dot(self.up))
    }
}

impl Default for AmbisonicListener {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerAdapter for AmbisonicListener {
    fn backend(&self) -> Backend {
        Backend::AmbisonicRoom
    }

    fn update_transform(&mut self, sample: &TransformSample) {
        match &sample.matrix {
            Some(matrix) => self.set_matrix(matrix),
            None => {
                self.matrix = Mat4::IDENTITY;
                self.set_vectors(sample.position, sample.forward, sample.up);
            }
        }
    }

    /// Decodes the B-format bus with two virtual cardioids facing left and right.
    fn finish_block(&self, bus: &mut MixBus) {
        let frames = bus.frames();
        let [w, _, y, _] = &bus.ambisonic;
        for i in 0..frames {
            let omni = w[i] * std::f32::consts::SQRT_2;
            bus.left[i] += 0.5 * (omni + y[i]);
            bus.right[i] += 0.5 * (omni - y[i]);
        }
    }
}

/// One propagation path of the current block.
#[derive(Debug, Clone, Copy)]
struct Tap {
    /// Delay relative to the direct path, in frames.
    delay: f32,
    gain: f32,
    /// W, X, Y, Z encoding coefficients.
    encode: [f32; 4],
}

/// Simulates the direct path and six first-order wall reflections of a shoebox
/// room, encoded to first-order ambisonics.
#[derive(Debug)]
pub struct AmbisonicRoomSource {
    core: SourceCore,
    room: RoomDesc,
    distance_model: DistanceDesc,
    sample_rate: u32,
    position: Vec3,
    delay_line: Vec<f32>,
    write: usize,
    taps: Vec<Tap>,
}

impl AmbisonicRoomSource {
    pub fn new(room: RoomDesc, distance_model: DistanceDesc, sample_rate: u32) -> Self {
        let max_delay = (room.max_reflection_delay() * sample_rate as f32).ceil() as usize;
        Self {
            core: SourceCore::new(ChannelRouting::Downmix),
            room,
            distance_model,
            sample_rate,
            position: Vec3::ZERO,
            delay_line: vec![0.0; max_delay + 2],
            write: 0,
            taps: Vec::with_capacity(7),
        }
    }

    fn compute_taps(&mut self, listener: &AmbisonicListener) {
        self.taps.clear();
        let listener_position = listener.position();
        let direct_distance = self.position.distance(listener_position);
        let max_delay = (self.delay_line.len() - 2) as f32;

        let encode = |point: Vec3| {
            let dir = listener.local_direction(point);
            [FRAC_1_SQRT_2, dir.x, dir.y, dir.z]
        };

        self.taps.push(Tap {
            delay: 0.0,
            gain: self.distance_model.gain(direct_distance),
            encode: encode(self.position),
        });

        for image in self.room.image_sources(self.position) {
            if image.gain <= 0.0 {
                continue;
            }
            let path = image.position.distance(listener_position);
            let delay = (path - direct_distance) / self.room.speed_of_sound * self.sample_rate as f32;
            self.taps.push(Tap {
                delay: delay.clamp(0.0, max_delay),
                gain: image.gain * self.distance_model.gain(path),
                encode: encode(image.position),
            });
        }
    }
}

impl SourceAdapter for AmbisonicRoomSource {
    fn backend(&self) -> Backend {
        Backend::AmbisonicRoom
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
        self.delay_line.fill(0.0);
        self.write = 0;
    }

    fn tail_frames(&self) -> usize {
        self.delay_line.len()
    }

    fn position(&self) -> Vec3 {
        self.position
    }

    fn update_transform(&mut self, sample: &TransformSample, _listener: &Listener) {
        self.position = sample.position;
    }

    fn spatialize(
        &mut self,
        input: &[f32],
        _channels: usize,
        listener: &Listener,
        bus: &mut MixBus,
    ) {
        self.compute_taps(listener.ambisonic());

        let len = self.delay_line.len();
        let frames = bus.frames();
        for i in 0..frames {
            self.delay_line[self.write] = input.get(i).copied().unwrap_or(0.0);

            for tap in &self.taps {
                let whole = tap.delay.floor();
                let frac = tap.delay - whole;
                let a = (self.write + len - whole as usize) % len;
                let b = (a + len - 1) % len;
                let s = self.delay_line[a] * (1.0 - frac) + self.delay_line[b] * frac;
                let s = s * tap.gain;
                for (channel, coeff) in bus.ambisonic.iter_mut().zip(tap.encode) {
                    channel[i] += s * coeff;
                }
            }

            self.write = (self.write + 1) % len;
        }
    }
}

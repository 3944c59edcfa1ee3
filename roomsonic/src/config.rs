//! Configuration for RoomSonic

use crate::backend::Backend;
use crate::error::{Result, RoomSonicError};
use crate::room::RoomDesc;

/// How the gain of a source falls off with its distance from the listener.
///
/// The formulas follow the Web Audio `PannerNode` distance models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceModel {
    /// `ref / (ref + rolloff * (max(d, ref) - ref))`
    #[default]
    Inverse,
    /// `1 - rolloff * (clamp(d, ref, max) - ref) / (max - ref)`
    Linear,
    /// `(max(d, ref) / ref) ^ -rolloff`
    Exponential,
}

/// Distance attenuation shared by all three backends, so a source has the same
/// loudness whichever backend is live.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceDesc {
    pub model: DistanceModel,
    pub ref_distance: f32,
    pub max_distance: f32,
    pub rolloff_factor: f32,
}

impl Default for DistanceDesc {
    fn default() -> Self {
        Self {
            model: DistanceModel::Inverse,
            ref_distance: 1.0,
            max_distance: 10_000.0,
            rolloff_factor: 1.0,
        }
    }
}

impl DistanceDesc {
    pub fn gain(&self, distance: f32) -> f32 {
        if !distance.is_finite() {
            return 0.0;
        }

        let reference = self.ref_distance;
        match self.model {
            DistanceModel::Inverse => {
                let d = distance.max(reference);
                reference / (reference + self.rolloff_factor * (d - reference))
            }
            DistanceModel::Linear => {
                if self.max_distance <= reference {
                    return 1.0;
                }
                let d = distance.clamp(reference, self.max_distance);
                (1.0 - self.rolloff_factor * (d - reference) / (self.max_distance - reference))
                    .clamp(0.0, 1.0)
            }
            DistanceModel::Exponential => {
                let d = distance.max(reference);
                (d / reference).powf(-self.rolloff_factor)
            }
        }
    }
}

/// Directional sound cone of a source, in degrees. The defaults make sources
/// omnidirectional.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConeDesc {
    pub inner_angle: f32,
    pub outer_angle: f32,
    pub outer_gain: f32,
}

impl Default for ConeDesc {
    fn default() -> Self {
        Self {
            inner_angle: 360.0,
            outer_angle: 360.0,
            outer_gain: 0.0,
        }
    }
}

impl ConeDesc {
    /// Checks that both angles lie in [0, 360] and that `outer_gain` is in [0, 1].
    pub fn validate(&self) -> Result<()> {
        for (name, angle) in [("inner", self.inner_angle), ("outer", self.outer_angle)] {
            if !(0.0..=360.0).contains(&angle) {
                return Err(RoomSonicError::Configuration(format!(
                    "Cone {} angle must be between 0 and 360 degrees (got {})",
                    name, angle
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.outer_gain) {
            return Err(RoomSonicError::Configuration(format!(
                "Cone outer gain must be between 0.0 and 1.0 (got {})",
                self.outer_gain
            )));
        }
        Ok(())
    }
}

/// Configuration descriptor for a RoomSonic engine
#[derive(Debug, Clone)]
pub struct RoomSonicDesc {
    /// Sample rate of the rendered mix; decoded buffers are resampled to it.
    pub sample_rate: u32,
    /// Largest number of frames rendered in one internal pass.
    pub block_size: usize,
    /// Number of interleaved output channels (typically 2 for stereo)
    pub channels: u16,
    /// Backend connected to the output when the engine is created
    pub default_backend: Backend,
    /// Gain applied to the final mix
    pub master_volume: f32,
    /// Maximum number of emitters alive at once
    pub max_emitters: usize,
    pub distance: DistanceDesc,
    pub cone: ConeDesc,
    /// Shoebox room simulated by the ambisonic backend
    pub room: RoomDesc,
    /// Crossfade over one block when the binaural backend switches impulse responses
    pub hrtf_crossfade: bool,
}

impl Default for RoomSonicDesc {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            block_size: 1024,
            channels: 2,
            default_backend: Backend::DirectPanner,
            master_volume: 1.0,
            max_emitters: 64,
            distance: DistanceDesc::default(),
            cone: ConeDesc::default(),
            room: RoomDesc::default(),
            hrtf_crossfade: true,
        }
    }
}

impl RoomSonicDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    pub fn channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    pub fn default_backend(mut self, backend: Backend) -> Self {
        self.default_backend = backend;
        self
    }

    pub fn master_volume(mut self, volume: f32) -> Self {
        self.master_volume = volume;
        self
    }

    pub fn max_emitters(mut self, max: usize) -> Self {
        self.max_emitters = max;
        self
    }

    pub fn distance(mut self, distance: DistanceDesc) -> Self {
        self.distance = distance;
        self
    }

    pub fn cone(mut self, cone: ConeDesc) -> Self {
        self.cone = cone;
        self
    }

    pub fn room(mut self, room: RoomDesc) -> Self {
        self.room = room;
        self
    }

    pub fn hrtf_crossfade(mut self, enable: bool) -> Self {
        self.hrtf_crossfade = enable;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(RoomSonicError::Configuration(
                "Sample rate must be greater than 0".to_string(),
            ));
        }
        if self.block_size == 0 {
            return Err(RoomSonicError::Configuration(
                "Block size must be greater than 0".to_string(),
            ));
        }
        if self.channels == 0 {
            return Err(RoomSonicError::Configuration(
                "Channel count must be greater than 0".to_string(),
            ));
        }
        if !(self.master_volume >= 0.0) {
            return Err(RoomSonicError::Configuration(format!(
                "Master volume must be >= 0 (got {})",
                self.master_volume
            )));
        }
        if !(self.distance.ref_distance > 0.0) {
            return Err(RoomSonicError::Configuration(format!(
                "Reference distance must be > 0 (got {})",
                self.distance.ref_distance
            )));
        }
        if self.distance.rolloff_factor < 0.0 {
            return Err(RoomSonicError::Configuration(format!(
                "Rolloff factor must be >= 0 (got {})",
                self.distance.rolloff_factor
            )));
        }
        self.cone.validate()?;
        self.room.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_desc_is_valid() {
        assert!(RoomSonicDesc::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_desc() {
        assert!(RoomSonicDesc::new().sample_rate(0).validate().is_err());
        assert!(RoomSonicDesc::new().channels(0).validate().is_err());
        assert!(RoomSonicDesc::new().master_volume(-1.0).validate().is_err());
        assert!(
            RoomSonicDesc::new()
                .distance(DistanceDesc {
                    ref_distance: 0.0,
                    ..Default::default()
                })
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_invalid_cone() {
        let with_cone = |cone: ConeDesc| RoomSonicDesc::new().cone(cone).validate();
        let cone = ConeDesc {
            inner_angle: 60.0,
            outer_angle: 120.0,
            outer_gain: 0.25,
        };
        assert!(with_cone(cone).is_ok());

        for outer_gain in [-0.1, 1.5, f32::NAN] {
            assert!(matches!(
                with_cone(ConeDesc { outer_gain, ..cone }),
                Err(RoomSonicError::Configuration(_))
            ));
        }
        for angle in [-10.0, 400.0, f32::NAN, f32::INFINITY] {
            assert!(with_cone(ConeDesc { inner_angle: angle, ..cone }).is_err());
            assert!(with_cone(ConeDesc { outer_angle: angle, ..cone }).is_err());
        }
        assert!(ConeDesc::default().validate().is_ok());
    }

    #[test]
    fn test_inverse_distance_gain() {
        let desc = DistanceDesc::default();
        assert_eq!(desc.gain(0.0), 1.0);
        assert_eq!(desc.gain(1.0), 1.0);
        assert!((desc.gain(2.0) - 0.5).abs() < 1e-6);
        assert!((desc.gain(4.0) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_linear_and_exponential_gain() {
        let linear = DistanceDesc {
            model: DistanceModel::Linear,
            max_distance: 11.0,
            ..Default::default()
        };
        assert!((linear.gain(6.0) - 0.5).abs() < 1e-6);
        assert_eq!(linear.gain(100.0), 0.0);

        let exponential = DistanceDesc {
            model: DistanceModel::Exponential,
            rolloff_factor: 2.0,
            ..Default::default()
        };
        assert!((exponential.gain(2.0) - 0.25).abs() < 1e-6);
    }
}

//! Acoustic room description for the ambisonic backend.
//!
//! The room is an axis-aligned shoebox. Each of its six walls carries an
//! [`AudioMaterial`] whose absorption is given over three frequency bands
//! (400 Hz, 2.5 kHz, 15 kHz).

use crate::error::{Result, RoomSonicError};
use crate::math::Vec3;

/// Acoustic properties of a wall surface.
///
/// # Example
///
/// ```
/// use roomsonic::room::AudioMaterial;
///
/// let wall = AudioMaterial::CONCRETE;
/// let custom = AudioMaterial {
///     absorption: [0.10, 0.20, 0.30],
///     scattering: 0.05,
/// };
/// assert!(custom.validate().is_ok());
/// assert!(wall.reflection_gain() > custom.reflection_gain());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioMaterial {
    /// Fraction of sound energy absorbed at [low, mid, high] frequencies (0.0 - 1.0)
    pub absorption: [f32; 3],

    /// Fraction of reflected energy scattered diffusely (0.0 - 1.0).
    /// Only the specular remainder feeds the early reflections.
    pub scattering: f32,
}

impl AudioMaterial {
    pub const GENERIC: Self = Self {
        absorption: [0.10, 0.20, 0.30],
        scattering: 0.05,
    };

    pub const BRICK: Self = Self {
        absorption: [0.03, 0.04, 0.07],
        scattering: 0.05,
    };

    pub const CONCRETE: Self = Self {
        absorption: [0.05, 0.07, 0.08],
        scattering: 0.05,
    };

    pub const CARPET: Self = Self {
        absorption: [0.24, 0.69, 0.73],
        scattering: 0.05,
    };

    pub const GLASS: Self = Self {
        absorption: [0.06, 0.03, 0.02],
        scattering: 0.05,
    };

    pub const PLASTER: Self = Self {
        absorption: [0.12, 0.06, 0.04],
        scattering: 0.05,
    };

    pub const WOOD: Self = Self {
        absorption: [0.11, 0.07, 0.06],
        scattering: 0.05,
    };

    /// Fully absorbing surface; disables reflections from that wall.
    pub const TRANSPARENT: Self = Self {
        absorption: [1.0, 1.0, 1.0],
        scattering: 0.0,
    };

    /// Validates that all material properties are within valid range [0.0, 1.0]
    pub fn validate(&self) -> Result<()> {
        for &val in &self.absorption {
            if !(0.0..=1.0).contains(&val) {
                return Err(RoomSonicError::Configuration(format!(
                    "Absorption values must be between 0.0 and 1.0 (got {})",
                    val
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.scattering) {
            return Err(RoomSonicError::Configuration(format!(
                "Scattering value must be between 0.0 and 1.0 (got {})",
                self.scattering
            )));
        }

        Ok(())
    }

    /// Broadband pressure gain of a specular reflection off this material.
    pub fn reflection_gain(&self) -> f32 {
        let mean_absorption = self.absorption.iter().sum::<f32>() / 3.0;
        ((1.0 - mean_absorption) * (1.0 - self.scattering))
            .max(0.0)
            .sqrt()
    }
}

impl Default for AudioMaterial {
    fn default() -> Self {
        Self::GENERIC
    }
}

/// The six walls of the shoebox, in the order used by [`RoomDesc::walls`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wall {
    Left,
    Right,
    Floor,
    Ceiling,
    Back,
    Front,
}

impl Wall {
    pub const ALL: [Wall; 6] = [
        Wall::Left,
        Wall::Right,
        Wall::Floor,
        Wall::Ceiling,
        Wall::Back,
        Wall::Front,
    ];
}

/// A shoebox room in world coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomDesc {
    pub center: Vec3,
    /// Width (x), height (y) and depth (z) in meters
    pub dimensions: Vec3,
    /// Materials for left (-x), right (+x), floor (-y), ceiling (+y), back (-z), front (+z)
    pub walls: [AudioMaterial; 6],
    /// Meters per second
    pub speed_of_sound: f32,
}

impl Default for RoomDesc {
    fn default() -> Self {
        Self {
            center: Vec3::ZERO,
            dimensions: Vec3::new(8.0, 3.0, 8.0),
            walls: [
                AudioMaterial::PLASTER,
                AudioMaterial::PLASTER,
                AudioMaterial::WOOD,
                AudioMaterial::PLASTER,
                AudioMaterial::PLASTER,
                AudioMaterial::GLASS,
            ],
            speed_of_sound: 343.0,
        }
    }
}

/// One mirrored copy of a source across a wall.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageSource {
    pub wall: Wall,
    pub position: Vec3,
    pub gain: f32,
}

impl RoomDesc {
    pub fn validate(&self) -> Result<()> {
        if !(self.dimensions.min_element() > 0.0) || !self.dimensions.is_finite() {
            return Err(RoomSonicError::Configuration(format!(
                "Room dimensions must be positive (got {:?})",
                self.dimensions
            )));
        }
        if !(self.speed_of_sound > 0.0) {
            return Err(RoomSonicError::Configuration(format!(
                "Speed of sound must be positive (got {})",
                self.speed_of_sound
            )));
        }
        for material in &self.walls {
            material.validate()?;
        }
        Ok(())
    }

    pub fn min_corner(&self) -> Vec3 {
        self.center - self.dimensions * 0.5
    }

    pub fn max_corner(&self) -> Vec3 {
        self.center + self.dimensions * 0.5
    }

    pub fn material(&self, wall: Wall) -> &AudioMaterial {
        &self.walls[wall as usize]
    }

    /// First-order image sources of `source`, one per wall.
    pub fn image_sources(&self, source: Vec3) -> [ImageSource; 6] {
        let min = self.min_corner();
        let max = self.max_corner();

        Wall::ALL.map(|wall| {
            let position = match wall {
                Wall::Left => Vec3::new(2.0 * min.x - source.x, source.y, source.z),
                Wall::Right => Vec3::new(2.0 * max.x - source.x, source.y, source.z),
                Wall::Floor => Vec3::new(source.x, 2.0 * min.y - source.y, source.z),
                Wall::Ceiling => Vec3::new(source.x, 2.0 * max.y - source.y, source.z),
                Wall::Back => Vec3::new(source.x, source.y, 2.0 * min.z - source.z),
                Wall::Front => Vec3::new(source.x, source.y, 2.0 * max.z - source.z),
            };
            ImageSource {
                wall,
                position,
                gain: self.material(wall).reflection_gain(),
            }
        })
    }

    /// Longest path a first-order reflection can travel inside the room, in seconds.
    pub fn max_reflection_delay(&self) -> f32 {
        // an image source is at most one room diagonal beyond the far wall
        2.0 * self.dimensions.length() / self.speed_of_sound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_material_validation() {
        assert!(AudioMaterial::CONCRETE.validate().is_ok());

        let invalid_absorption = AudioMaterial {
            absorption: [0.5, 1.5, 0.3],
            scattering: 0.05,
        };
        assert!(invalid_absorption.validate().is_err());

        let invalid_scattering = AudioMaterial {
            absorption: [0.5, 0.5, 0.3],
            scattering: 1.5,
        };
        assert!(invalid_scattering.validate().is_err());
    }

    #[test]
    fn test_reflection_gain_range() {
        assert_eq!(AudioMaterial::TRANSPARENT.reflection_gain(), 0.0);
        let hard = AudioMaterial {
            absorption: [0.0; 3],
            scattering: 0.0,
        };
        assert_eq!(hard.reflection_gain(), 1.0);
        assert!(AudioMaterial::CARPET.reflection_gain() < AudioMaterial::BRICK.reflection_gain());
    }

    #[test]
    fn test_image_sources_mirror_across_walls() {
        let room = RoomDesc {
            dimensions: Vec3::new(10.0, 4.0, 6.0),
            ..Default::default()
        };
        let images = room.image_sources(Vec3::new(1.0, 0.5, -1.0));

        assert_eq!(images[Wall::Left as usize].position, Vec3::new(-11.0, 0.5, -1.0));
        assert_eq!(images[Wall::Right as usize].position, Vec3::new(9.0, 0.5, -1.0));
        assert_eq!(images[Wall::Floor as usize].position, Vec3::new(1.0, -4.5, -1.0));
        assert_eq!(images[Wall::Ceiling as usize].position, Vec3::new(1.0, 3.5, -1.0));
        assert_eq!(images[Wall::Back as usize].position, Vec3::new(1.0, 0.5, -5.0));
        assert_eq!(images[Wall::Front as usize].position, Vec3::new(1.0, 0.5, 7.0));
    }

    #[test]
    fn test_room_validation() {
        assert!(RoomDesc::default().validate().is_ok());
        let flat = RoomDesc {
            dimensions: Vec3::new(4.0, 0.0, 4.0),
            ..Default::default()
        };
        assert!(flat.validate().is_err());
    }
}

//! HRTF datasets for the binaural backend.
//!
//! A dataset is a list of measurements, each pairing a direction and distance with
//! a left and right FIR impulse response. Directions use the listener frame of the
//! crate: azimuth in degrees, counter-clockwise positive (+90 is the listener's
//! left), elevation in degrees above the horizontal plane.
//!
//! The JSON form is an array of objects:
//!
//! ```json
//! [{"azimuth": 0, "elevation": 0, "distance": 1.0,
//!   "fir_coeffs_left": [1.0, 0.0], "fir_coeffs_right": [1.0, 0.0]}]
//! ```

use crate::error::{Result, RoomSonicError};
use crate::math::Vec3;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::sync::{Arc, RwLock};

/// Average human head radius in meters, used by the fallback dataset.
const HEAD_RADIUS: f32 = 0.0875;
const SPEED_OF_SOUND: f32 = 343.0;
/// Impulse response length of the fallback dataset.
const FALLBACK_IR_LENGTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HrtfMeasurement {
    pub azimuth: f32,
    pub elevation: f32,
    pub distance: f32,
    pub fir_coeffs_left: Vec<f32>,
    pub fir_coeffs_right: Vec<f32>,
}

impl HrtfMeasurement {
    /// Unit vector of the measurement direction in the listener frame
    /// (+Z forward, +X left, +Y up).
    pub fn direction(&self) -> Vec3 {
        direction_vector(self.azimuth, self.elevation)
    }
}

pub(crate) fn direction_vector(azimuth_deg: f32, elevation_deg: f32) -> Vec3 {
    let (az, el) = (azimuth_deg.to_radians(), elevation_deg.to_radians());
    Vec3::new(az.sin() * el.cos(), el.sin(), az.cos() * el.cos())
}

/// A validated, immutable set of HRTF measurements.
#[derive(Debug, Clone)]
pub struct HrtfDataset {
    measurements: Vec<HrtfMeasurement>,
    directions: Vec<Vec3>,
    ir_length: usize,
}

impl HrtfDataset {
    pub fn from_measurements(measurements: Vec<HrtfMeasurement>) -> Result<Self> {
        let ir_length = validate(&measurements)?;
        let directions = measurements.iter().map(HrtfMeasurement::direction).collect();
        Ok(Self {
            measurements,
            directions,
            ir_length,
        })
    }

    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        let measurements: Vec<HrtfMeasurement> = serde_json::from_slice(bytes)?;
        Self::from_measurements(measurements)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Self::from_json_slice(json.as_bytes())
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let measurements: Vec<HrtfMeasurement> = serde_json::from_reader(reader)?;
        Self::from_measurements(measurements)
    }

    pub fn from_path(path: &str) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// Small synthetic dataset built from a spherical-head model.
    ///
    /// Each impulse response is a single (fractionally interpolated) tap: the far ear
    /// is delayed by the Woodworth interaural time difference and attenuated by a
    /// head-shadow factor. Directions cover every 15° of azimuth at elevations of
    /// -45°, 0°, 45° and 90°, all at a distance of 1 m.
    pub fn fallback(sample_rate: u32) -> Self {
        let mut measurements = Vec::new();
        for elevation in [-45.0f32, 0.0, 45.0, 90.0] {
            let azimuths: Vec<f32> = if elevation >= 90.0 {
                vec![0.0]
            } else {
                (-11..=12).map(|i| i as f32 * 15.0).collect()
            };
            for azimuth in azimuths {
                measurements.push(spherical_head_measurement(azimuth, elevation, sample_rate));
            }
        }

        let directions = measurements.iter().map(HrtfMeasurement::direction).collect();
        Self {
            measurements,
            directions,
            ir_length: FALLBACK_IR_LENGTH,
        }
    }

    pub fn measurements(&self) -> &[HrtfMeasurement] {
        &self.measurements
    }

    pub fn get(&self, index: usize) -> Option<&HrtfMeasurement> {
        self.measurements.get(index)
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    /// Taps per ear, identical for every measurement.
    pub fn ir_length(&self) -> usize {
        self.ir_length
    }

    /// Index of the measurement closest to the requested direction.
    ///
    /// The closest distance shell is chosen first, then the measurement in that
    /// shell with the smallest angle to the direction.
    pub fn nearest(&self, azimuth: f32, elevation: f32, distance: f32) -> usize {
        let target = direction_vector(azimuth, elevation);

        let shell = self
            .measurements
            .iter()
            .map(|m| m.distance)
            .min_by(|a, b| (a - distance).abs().total_cmp(&(b - distance).abs()))
            .unwrap_or(0.0);

        let mut best = 0;
        let mut best_dot = f32::NEG_INFINITY;
        for (index, (m, dir)) in self.measurements.iter().zip(&self.directions).enumerate() {
            if (m.distance - shell).abs() > 1.0e-4 {
                continue;
            }
            let dot = dir.dot(target);
            if dot > best_dot {
                best_dot = dot;
                best = index;
            }
        }
        best
    }
}

fn validate(measurements: &[HrtfMeasurement]) -> Result<usize> {
    let first = measurements
        .first()
        .ok_or_else(|| RoomSonicError::Hrtf("Dataset contains no measurements".to_string()))?;
    let ir_length = first.fir_coeffs_left.len();
    if ir_length == 0 {
        return Err(RoomSonicError::Hrtf(
            "Impulse responses must not be empty".to_string(),
        ));
    }

    for (index, m) in measurements.iter().enumerate() {
        if m.fir_coeffs_left.len() != ir_length || m.fir_coeffs_right.len() != ir_length {
            return Err(RoomSonicError::Hrtf(format!(
                "Measurement {} has impulse responses of {}/{} taps, expected {}",
                index,
                m.fir_coeffs_left.len(),
                m.fir_coeffs_right.len(),
                ir_length
            )));
        }
        let finite = [m.azimuth, m.elevation, m.distance]
            .iter()
            .chain(&m.fir_coeffs_left)
            .chain(&m.fir_coeffs_right)
            .all(|v| v.is_finite());
        if !finite {
            return Err(RoomSonicError::Hrtf(format!(
                "Measurement {} contains non-finite values",
                index
            )));
        }
        if m.distance < 0.0 {
            return Err(RoomSonicError::Hrtf(format!(
                "Measurement {} has negative distance {}",
                index, m.distance
            )));
        }
    }
    Ok(ir_length)
}

fn spherical_head_measurement(azimuth: f32, elevation: f32, sample_rate: u32) -> HrtfMeasurement {
    let lateral = azimuth.to_radians().sin() * elevation.to_radians().cos();
    let theta = lateral.abs().clamp(0.0, 1.0).asin();

    // Woodworth: ITD = (r / c) * (θ + sin θ)
    let itd = HEAD_RADIUS / SPEED_OF_SOUND * (theta + theta.sin());
    let delay = (itd * sample_rate as f32).min((FALLBACK_IR_LENGTH - 2) as f32);
    let shadow = 1.0 - 0.5 * lateral.abs();

    let near = impulse(0.0, 1.0);
    let far = impulse(delay, shadow);
    // positive azimuth is to the left, so the left ear is the near one
    let (left, right) = if lateral >= 0.0 {
        (near, far)
    } else {
        (far, near)
    };

    HrtfMeasurement {
        azimuth,
        elevation,
        distance: 1.0,
        fir_coeffs_left: left,
        fir_coeffs_right: right,
    }
}

fn impulse(delay: f32, gain: f32) -> Vec<f32> {
    let mut ir = vec![0.0; FALLBACK_IR_LENGTH];
    let index = delay.floor() as usize;
    let frac = delay - index as f32;
    ir[index] = gain * (1.0 - frac);
    ir[index + 1] = gain * frac;
    ir
}

/// Shared, atomically replaceable reference to the current dataset.
///
/// Readers take a snapshot with [`load`](Self::load); a swap replaces the whole
/// dataset at once, so a reader sees either the old dataset or the new one.
#[derive(Debug, Clone)]
pub struct HrtfHandle {
    current: Arc<RwLock<Arc<HrtfDataset>>>,
}

impl HrtfHandle {
    pub fn new(dataset: Arc<HrtfDataset>) -> Self {
        Self {
            current: Arc::new(RwLock::new(dataset)),
        }
    }

    pub fn load(&self) -> Arc<HrtfDataset> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    /// Installs `dataset` and returns the one it replaced.
    pub fn swap(&self, dataset: Arc<HrtfDataset>) -> Arc<HrtfDataset> {
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_POINT_JSON: &str = r#"[
        {"azimuth": 0, "elevation": 0, "distance": 1.0,
         "fir_coeffs_left": [1.0, 0.0, 0.0], "fir_coeffs_right": [1.0, 0.0, 0.0]},
        {"azimuth": 90, "elevation": 0, "distance": 1.0,
         "fir_coeffs_left": [1.0, 0.0, 0.0], "fir_coeffs_right": [0.0, 0.0, 0.5]}
    ]"#;

    #[test]
    fn test_parse_json() {
        let dataset = HrtfDataset::from_json_str(TWO_POINT_JSON).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.ir_length(), 3);
        assert_eq!(dataset.get(1).unwrap().fir_coeffs_right[2], 0.5);
    }

    #[test]
    fn test_rejects_invalid_data() {
        assert!(matches!(
            HrtfDataset::from_json_str("[]"),
            Err(RoomSonicError::Hrtf(_))
        ));
        assert!(matches!(
            HrtfDataset::from_json_str("{not json"),
            Err(RoomSonicError::HrtfParse(_))
        ));

        let mismatched = r#"[{"azimuth": 0, "elevation": 0, "distance": 1.0,
            "fir_coeffs_left": [1.0, 0.0], "fir_coeffs_right": [1.0]}]"#;
        assert!(HrtfDataset::from_json_str(mismatched).is_err());
    }

    #[test]
    fn test_nearest_direction() {
        let dataset = HrtfDataset::from_json_str(TWO_POINT_JSON).unwrap();
        assert_eq!(dataset.nearest(10.0, 0.0, 1.0), 0);
        assert_eq!(dataset.nearest(70.0, 10.0, 2.0), 1);
        assert_eq!(dataset.nearest(-20.0, 0.0, 0.5), 0);
    }

    #[test]
    fn test_nearest_prefers_distance_shell() {
        let json = r#"[
            {"azimuth": 0, "elevation": 0, "distance": 0.5,
             "fir_coeffs_left": [1.0], "fir_coeffs_right": [1.0]},
            {"azimuth": 90, "elevation": 0, "distance": 2.0,
             "fir_coeffs_left": [1.0], "fir_coeffs_right": [0.5]}
        ]"#;
        let dataset = HrtfDataset::from_json_str(json).unwrap();
        // closer in angle to the 0.5 m point, but at the 2 m shell
        assert_eq!(dataset.nearest(0.0, 0.0, 3.0), 1);
    }

    #[test]
    fn test_fallback_is_lateralized() {
        let dataset = HrtfDataset::fallback(48000);
        assert!(!dataset.is_empty());
        assert!(validate(dataset.measurements()).is_ok());

        let left = dataset.get(dataset.nearest(90.0, 0.0, 1.0)).unwrap();
        let energy = |ir: &[f32]| ir.iter().map(|v| v * v).sum::<f32>();
        assert!(energy(&left.fir_coeffs_left) > energy(&left.fir_coeffs_right));

        let right = dataset.get(dataset.nearest(-90.0, 0.0, 1.0)).unwrap();
        assert!(energy(&right.fir_coeffs_right) > energy(&right.fir_coeffs_left));
    }

    #[test]
    fn test_handle_swap() {
        let handle = HrtfHandle::new(Arc::new(HrtfDataset::fallback(48000)));
        let before = handle.load();
        let replacement = Arc::new(HrtfDataset::from_json_str(TWO_POINT_JSON).unwrap());

        let old = handle.swap(Arc::clone(&replacement));
        assert!(Arc::ptr_eq(&old, &before));
        assert!(Arc::ptr_eq(&handle.load(), &replacement));
        assert!(Arc::ptr_eq(&handle.clone().load(), &replacement));
    }
}

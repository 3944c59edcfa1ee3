mod default_loader;
mod load_options;
mod loader;
mod resampler;

use crate::error::{Result, RoomSonicError};
pub use default_loader::DefaultAudioLoader;
pub use load_options::{ConvertToMono, LoadOptions};
pub use loader::AudioDataLoader;
pub use resampler::AudioResampler;
use std::sync::Arc;
use std::time::Duration;

/// Decoded PCM shared between emitters and backends.
///
/// Cloning is cheap: every clone points at the same sample storage, which is how
/// one decoded buffer feeds the three per-backend playback units of an emitter
/// without being copied.
///
/// Samples are stored **interleaved** (`[L0, R0, L1, R1, ...]` for stereo).
#[derive(Debug, Clone)]
pub struct RoomSonicAudioData {
    inner: Arc<AudioDataInner>,
}

#[derive(Debug)]
struct AudioDataInner {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
    duration: Duration,
    /// `samples.len() / channels`
    total_frames: usize,
}

impl RoomSonicAudioData {
    pub(crate) fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        let channels = channels.max(1);
        let total_frames = samples.len() / channels as usize;
        let duration = if sample_rate > 0 {
            Duration::from_secs_f64(total_frames as f64 / sample_rate as f64)
        } else {
            Duration::ZERO
        };

        Self {
            inner: Arc::new(AudioDataInner {
                samples,
                sample_rate,
                channels,
                duration,
                total_frames,
            }),
        }
    }

    /// Wraps interleaved PCM produced by the host.
    ///
    /// # Errors
    ///
    /// Returns `RoomSonicError::AudioFormat` for a zero sample rate or channel count,
    /// or when the sample count is not a whole number of frames.
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Result<Self> {
        if sample_rate == 0 {
            return Err(RoomSonicError::AudioFormat(
                "Sample rate must be greater than 0".to_string(),
            ));
        }
        if channels == 0 {
            return Err(RoomSonicError::AudioFormat(
                "Channel count must be greater than 0".to_string(),
            ));
        }
        if samples.len() % channels as usize != 0 {
            return Err(RoomSonicError::AudioFormat(format!(
                "{} samples do not divide into {} channels",
                samples.len(),
                channels
            )));
        }
        Ok(Self::new(samples, sample_rate, channels))
    }

    /// Decodes an in-memory encoded file with the default Symphonia loader.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        DefaultAudioLoader.decode(bytes, &LoadOptions::default())
    }

    pub fn decode_with_options(bytes: &[u8], options: &LoadOptions) -> Result<Self> {
        DefaultAudioLoader.decode(bytes, options)
    }

    /// Load audio data from a file path using the default loader.
    ///
    /// # Errors
    ///
    /// Returns a `RoomSonicError` if the file cannot be read or decoded.
    pub fn from_path(path: &str) -> Result<Self> {
        DefaultAudioLoader.load(path, &LoadOptions::default())
    }

    pub fn from_path_with_options(path: &str, options: &LoadOptions) -> Result<Self> {
        DefaultAudioLoader.load(path, options)
    }

    /// Load audio data from a file path using a custom loader.
    pub fn from_path_with_loader<L: AudioDataLoader>(
        path: &str,
        loader: &L,
        options: &LoadOptions,
    ) -> Result<Self> {
        loader.load(path, options)
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.inner.channels
    }

    pub fn duration(&self) -> Duration {
        self.inner.duration
    }

    pub fn samples(&self) -> &[f32] {
        &self.inner.samples
    }

    pub fn total_frames(&self) -> usize {
        self.inner.total_frames
    }

    pub fn is_empty(&self) -> bool {
        self.inner.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.samples.len()
    }

    /// True when both handles share the same sample storage.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Get samples for a specific channel (0-indexed)
    pub fn channel_samples(&self, channel: usize) -> Result<Vec<f32>> {
        if channel >= self.inner.channels as usize {
            return Err(RoomSonicError::AudioFormat(format!(
                "Channel {} out of range (max: {})",
                channel,
                self.inner.channels - 1
            )));
        }

        Ok(self
            .inner
            .samples
            .chunks_exact(self.inner.channels as usize)
            .map(|frame| frame[channel])
            .collect())
    }

    /// Get interleaved samples for a specific frame range
    pub fn frame_range(&self, start_frame: usize, end_frame: usize) -> Result<Vec<f32>> {
        if start_frame > end_frame || end_frame > self.inner.total_frames {
            return Err(RoomSonicError::AudioFormat(format!(
                "Frame range {}-{} out of bounds (max: {})",
                start_frame, end_frame, self.inner.total_frames
            )));
        }

        let channels = self.inner.channels as usize;
        Ok(self.inner.samples[start_frame * channels..end_frame * channels].to_vec())
    }

    /// Downmix all channels to one by averaging.
    pub fn to_mono(&self) -> Self {
        if self.inner.channels == 1 {
            return self.clone();
        }

        let channels = self.inner.channels as usize;
        let mono_samples: Vec<f32> = self
            .inner
            .samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();

        Self::new(mono_samples, self.inner.sample_rate, 1)
    }

    /// Resample to a different sample rate using rubato.
    pub fn resample(&self, target_sample_rate: u32) -> Result<Self> {
        if target_sample_rate == self.inner.sample_rate {
            return Ok(self.clone());
        }

        let resampler = AudioResampler::new(
            self.inner.sample_rate,
            target_sample_rate,
            self.inner.channels,
            Some(1024),
        )?;

        let resampled = resampler.resample_interleaved(&self.inner.samples)?;
        Ok(Self::new(resampled, target_sample_rate, self.inner.channels))
    }
}

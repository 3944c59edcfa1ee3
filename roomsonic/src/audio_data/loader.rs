use crate::audio_data::{LoadOptions, RoomSonicAudioData};
use crate::error::Result;
use std::path::Path;

/// Trait for turning encoded audio bytes into PCM.
///
/// The engine only ever needs `decode(bytes) -> PCM`; where the bytes come from
/// (a file, a project archive, a network fetch) is up to the host. RoomSonic ships
/// [`DefaultAudioLoader`](super::DefaultAudioLoader) built on Symphonia, but any
/// decoder can be plugged in.
///
/// Loaders run on decode worker threads, hence the `Send + Sync` bound.
///
/// # Example
///
/// ```ignore
/// use roomsonic::audio_data::{AudioDataLoader, LoadOptions, RoomSonicAudioData};
/// use roomsonic::error::Result;
///
/// struct SilenceLoader;
///
/// impl AudioDataLoader for SilenceLoader {
///     fn decode(&self, _bytes: &[u8], _options: &LoadOptions) -> Result<RoomSonicAudioData> {
///         RoomSonicAudioData::from_samples(vec![0.0; 48000], 48000, 1)
///     }
/// }
/// ```
pub trait AudioDataLoader: Send + Sync {
    /// Decodes a complete encoded audio file held in memory.
    ///
    /// # Errors
    ///
    /// Returns a `RoomSonicError::AudioLoading` if the bytes cannot be decoded.
    fn decode(&self, bytes: &[u8], options: &LoadOptions) -> Result<RoomSonicAudioData>;

    /// Reads and decodes a file, using its extension as a probing hint.
    fn load(&self, path: &str, options: &LoadOptions) -> Result<RoomSonicAudioData> {
        let bytes = std::fs::read(path)?;

        let mut options = options.clone();
        if options.extension_hint.is_none() {
            options.extension_hint = Path::new(path)
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_string);
        }

        self.decode(&bytes, &options)
    }
}

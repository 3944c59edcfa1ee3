use crate::{
    audio_data::{AudioDataLoader, ConvertToMono, LoadOptions, RoomSonicAudioData},
    error::{Result, RoomSonicError},
};
use std::io::Cursor;
use symphonia::{
    core::{
        audio::SampleBuffer, codecs::DecoderOptions, errors::Error, formats::FormatOptions,
        io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
    },
    default::{get_codecs, get_probe},
};

/// Default decoder implementation using the Symphonia library.
///
/// Supports the formats enabled in Symphonia's default feature set (WAV, FLAC,
/// OGG/Vorbis, ...) and decodes them into interleaved f32 PCM.
///
/// # Examples
///
/// ```ignore
/// use roomsonic::audio_data::{AudioDataLoader, DefaultAudioLoader, LoadOptions};
///
/// let bytes = std::fs::read("footsteps.wav")?;
/// let audio = DefaultAudioLoader.decode(&bytes, &LoadOptions::default())?;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAudioLoader;

impl AudioDataLoader for DefaultAudioLoader {
    fn decode(&self, bytes: &[u8], options: &LoadOptions) -> Result<RoomSonicAudioData> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = options.extension_hint.as_deref() {
            hint.with_extension(ext);
        }

        let probed = get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| {
                RoomSonicError::AudioLoading(format!("Failed to probe audio format: {:?}", e))
            })?;

        let mut format = probed.format;

        let track = format.default_track().ok_or_else(|| {
            RoomSonicError::AudioLoading("No default audio track found".to_string())
        })?;
        let track_id = track.id;

        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| RoomSonicError::AudioLoading("Sample rate not found".to_string()))?;

        let channels = track
            .codec_params
            .channels
            .ok_or_else(|| RoomSonicError::AudioLoading("Channel count not found".to_string()))?
            .count() as u16;

        if channels == 0 {
            return Err(RoomSonicError::AudioLoading(
                "Audio track has no channels".to_string(),
            ));
        }

        let mut decoder = get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| {
                RoomSonicError::AudioLoading(format!("Failed to create decoder: {:?}", e))
            })?;

        let mut samples: Vec<f32> = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(Error::IoError(_)) => break, // end of stream
                Err(Error::ResetRequired) => break,
                Err(e) => {
                    return Err(RoomSonicError::AudioLoading(format!(
                        "Error reading packet: {:?}",
                        e
                    )));
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(Error::IoError(_)) => break,
                Err(Error::DecodeError(e)) => {
                    log::debug!("Skipping corrupt packet: {}", e);
                    continue;
                }
                Err(e) => {
                    return Err(RoomSonicError::AudioLoading(format!(
                        "Error decoding packet: {:?}",
                        e
                    )));
                }
            };

            let spec = *decoded.spec();
            let capacity = decoded.capacity();

            let mut tmp = SampleBuffer::<f32>::new(capacity as u64, spec);
            tmp.copy_interleaved_ref(decoded);

            samples.extend_from_slice(tmp.samples());
        }

        if samples.is_empty() {
            return Err(RoomSonicError::AudioLoading(
                "Decoded stream contains no audio frames".to_string(),
            ));
        }

        let mut audio_data = RoomSonicAudioData::new(samples, sample_rate, channels);

        if options.convert_to_mono == ConvertToMono::ForceMono {
            audio_data = audio_data.to_mono();
        }

        if let Some(target_rate) = options.target_sample_rate {
            audio_data = audio_data.resample(target_rate)?;
        }

        log::debug!(
            "Decoded {} frames ({} ch @ {} Hz, {:.2}s)",
            audio_data.total_frames(),
            audio_data.channels(),
            audio_data.sample_rate(),
            audio_data.duration().as_secs_f64()
        );

        Ok(audio_data)
    }
}

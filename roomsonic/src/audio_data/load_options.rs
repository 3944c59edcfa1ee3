/// Defines how to handle channel conversion during audio loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConvertToMono {
    /// Keep original channels: stereo if input is stereo, mono if input is mono.
    #[default]
    Original,

    /// Force mono: if input is stereo, channels are averaged together.
    ///
    /// The binaural and ambisonic backends downmix anyway; forcing mono at load time
    /// saves the per-block downmix.
    ForceMono,
}

/// Options for controlling audio decoding.
///
/// # Examples
///
/// ```
/// # use roomsonic::audio_data::{LoadOptions, ConvertToMono};
/// let options = LoadOptions::new()
///     .convert_to_mono(ConvertToMono::ForceMono)
///     .target_sample_rate(48000)
///     .extension_hint("ogg");
/// assert_eq!(options.target_sample_rate, Some(48000));
/// ```
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// How to handle mono conversion during audio loading.
    pub convert_to_mono: ConvertToMono,
    /// Resample the decoded audio to this rate (None = keep original)
    pub target_sample_rate: Option<u32>,
    /// File extension used to speed up format probing (e.g. "wav", "mp3")
    pub extension_hint: Option<String>,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn convert_to_mono(mut self, convert: ConvertToMono) -> Self {
        self.convert_to_mono = convert;
        self
    }

    pub fn target_sample_rate(mut self, rate: u32) -> Self {
        self.target_sample_rate = Some(rate);
        self
    }

    pub fn extension_hint(mut self, extension: impl Into<String>) -> Self {
        self.extension_hint = Some(extension.into());
        self
    }
}

use crate::backend::{
    AmbisonicListener, Backend, BinauralListener, DirectPannerListener, ListenerAdapter,
};
use crate::math::TransformSample;

/// The single receiver of a session, mirrored into every backend.
#[derive(Debug, Clone, Default)]
pub struct Listener {
    sample: TransformSample,
    direct: DirectPannerListener,
    binaural: BinauralListener,
    ambisonic: AmbisonicListener,
}

impl Listener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forwards the sample to all three backends.
    pub fn update_transform(&mut self, sample: &TransformSample) {
        self.sample = *sample;
        self.direct.update_transform(sample);
        self.binaural.update_transform(sample);
        self.ambisonic.update_transform(sample);
    }

    pub fn transform(&self) -> &TransformSample {
        &self.sample
    }

    pub fn adapter(&self, backend: Backend) -> &dyn ListenerAdapter {
        match backend {
            Backend::DirectPanner => &self.direct,
            Backend::BinauralFir => &self.binaural,
            Backend::AmbisonicRoom => &self.ambisonic,
        }
    }

    pub fn direct(&self) -> &DirectPannerListener {
        &self.direct
    }

    pub fn binaural(&self) -> &BinauralListener {
        &self.binaural
    }

    pub fn ambisonic(&self) -> &AmbisonicListener {
        &self.ambisonic
    }
}

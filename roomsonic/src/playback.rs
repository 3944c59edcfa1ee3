//! Buffer-playing units.
//!
//! A [`PlaybackUnit`] behaves like a native one-shot buffer source: the buffer can
//! only be assigned before the unit is started, the unit can be started once, and
//! stopping it twice is an error. Adapters hide these rules behind
//! [`SourceCore`](crate::backend::SourceCore), which throws exhausted units away
//! and builds fresh ones.

use crate::audio_data::RoomSonicAudioData;
use thiserror::Error;

/// Observable playback state of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Started,
    Ended,
}

/// Misuse of a one-shot playback unit.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitError {
    #[error("playback unit has already been started")]
    AlreadyStarted,

    #[error("playback unit was never started")]
    NotStarted,

    #[error("playback unit is already stopped")]
    AlreadyStopped,

    #[error("buffer cannot be replaced after the unit has started")]
    BufferLocked,
}

/// How a unit's buffer channels are routed into its spatializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRouting {
    /// Mono stays mono, anything wider is delivered as stereo (first two channels).
    Preserve,
    /// All channels are averaged to one.
    Downmix,
}

/// Outcome of pulling or advancing a unit for one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnitPull {
    /// Frames taken from the buffer; the rest of the block is silence.
    pub frames: usize,
    /// Set on the one pull during which a non-looping buffer ran out.
    pub ended: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnitPhase {
    Fresh,
    Running,
    Stopped,
    Finished,
}

#[derive(Debug)]
pub struct PlaybackUnit {
    buffer: Option<RoomSonicAudioData>,
    looping: bool,
    gain: f32,
    routing: ChannelRouting,
    phase: UnitPhase,
    /// Next frame to read.
    cursor: usize,
}

impl PlaybackUnit {
    pub fn new(routing: ChannelRouting) -> Self {
        Self {
            buffer: None,
            looping: false,
            gain: 1.0,
            routing,
            phase: UnitPhase::Fresh,
            cursor: 0,
        }
    }

    pub fn set_buffer(&mut self, buffer: RoomSonicAudioData) -> Result<(), UnitError> {
        if self.phase != UnitPhase::Fresh {
            return Err(UnitError::BufferLocked);
        }
        self.buffer = Some(buffer);
        Ok(())
    }

    pub fn buffer(&self) -> Option<&RoomSonicAudioData> {
        self.buffer.as_ref()
    }

    pub fn set_loop(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn looping(&self) -> bool {
        self.looping
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn routing(&self) -> ChannelRouting {
        self.routing
    }

    pub fn start(&mut self) -> Result<(), UnitError> {
        if self.phase != UnitPhase::Fresh {
            return Err(UnitError::AlreadyStarted);
        }
        self.phase = UnitPhase::Running;
        self.cursor = 0;
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), UnitError> {
        match self.phase {
            UnitPhase::Fresh => Err(UnitError::NotStarted),
            UnitPhase::Stopped => Err(UnitError::AlreadyStopped),
            UnitPhase::Running | UnitPhase::Finished => {
                self.phase = UnitPhase::Stopped;
                Ok(())
            }
        }
    }

    /// True once `start` has succeeded, whatever happened afterwards.
    pub fn is_started(&self) -> bool {
        self.phase != UnitPhase::Fresh
    }

    pub fn is_playing(&self) -> bool {
        self.phase == UnitPhase::Running
    }

    pub fn has_ended(&self) -> bool {
        self.phase == UnitPhase::Finished
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Channels written per frame by [`pull`](Self::pull).
    pub fn output_channels(&self) -> usize {
        match (self.routing, &self.buffer) {
            (ChannelRouting::Preserve, Some(buffer)) if buffer.channels() > 1 => 2,
            _ => 1,
        }
    }

    /// Renders `frames` frames of gained audio into `out`, interleaved with
    /// [`output_channels`](Self::output_channels) channels. Frames the unit cannot
    /// supply are left silent.
    pub fn pull(&mut self, out: &mut [f32], frames: usize) -> UnitPull {
        let out_channels = self.output_channels();
        let len = (frames * out_channels).min(out.len());
        let out = &mut out[..len];
        out.fill(0.0);

        let gain = self.gain;
        let routing = self.routing;
        self.run(frames, |i, frame| match (routing, out_channels) {
            (ChannelRouting::Preserve, 2) => {
                if let Some(dst) = out.get_mut(i * 2..i * 2 + 2) {
                    dst[0] = frame[0] * gain;
                    dst[1] = frame[1] * gain;
                }
            }
            _ => {
                if let Some(dst) = out.get_mut(i) {
                    *dst = frame.iter().sum::<f32>() / frame.len() as f32 * gain;
                }
            }
        })
    }

    /// Moves the read position as if `frames` frames had been rendered.
    pub fn advance(&mut self, frames: usize) -> UnitPull {
        self.run(frames, |_, _| {})
    }

    fn run(&mut self, frames: usize, mut sink: impl FnMut(usize, &[f32])) -> UnitPull {
        let mut pull = UnitPull::default();
        if self.phase != UnitPhase::Running {
            return pull;
        }
        let Some(buffer) = self.buffer.clone() else {
            return pull;
        };

        let total = buffer.total_frames();
        let channels = buffer.channels() as usize;
        let samples = buffer.samples();

        for i in 0..frames {
            if self.cursor >= total {
                if self.looping && total > 0 {
                    self.cursor = 0;
                } else {
                    break;
                }
            }
            let start = self.cursor * channels;
            sink(i, &samples[start..start + channels]);
            self.cursor += 1;
            pull.frames += 1;
        }

        if !self.looping && self.cursor >= total {
            self.phase = UnitPhase::Finished;
            pull.ended = true;
        }
        pull
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize, channels: u16) -> RoomSonicAudioData {
        let samples = (0..frames * channels as usize)
            .map(|i| (i / channels as usize) as f32)
            .collect();
        RoomSonicAudioData::from_samples(samples, 48000, channels).unwrap()
    }

    #[test]
    fn test_unit_is_one_shot() {
        let mut unit = PlaybackUnit::new(ChannelRouting::Downmix);
        unit.set_buffer(ramp(4, 1)).unwrap();
        unit.start().unwrap();

        assert_eq!(unit.start(), Err(UnitError::AlreadyStarted));
        assert_eq!(unit.set_buffer(ramp(4, 1)), Err(UnitError::BufferLocked));
        assert!(unit.stop().is_ok());
        assert_eq!(unit.stop(), Err(UnitError::AlreadyStopped));
        assert_eq!(unit.start(), Err(UnitError::AlreadyStarted));
    }

    #[test]
    fn test_stop_before_start() {
        let mut unit = PlaybackUnit::new(ChannelRouting::Downmix);
        assert_eq!(unit.stop(), Err(UnitError::NotStarted));
        assert!(!unit.is_started());
    }

    #[test]
    fn test_pull_reports_end_once() {
        let mut unit = PlaybackUnit::new(ChannelRouting::Downmix);
        unit.set_buffer(ramp(5, 1)).unwrap();
        unit.start().unwrap();

        let mut out = [9.0f32; 4];
        let pull = unit.pull(&mut out, 4);
        assert_eq!(pull, UnitPull { frames: 4, ended: false });
        assert_eq!(out, [0.0, 1.0, 2.0, 3.0]);

        let pull = unit.pull(&mut out, 4);
        assert_eq!(pull, UnitPull { frames: 1, ended: true });
        assert_eq!(out, [4.0, 0.0, 0.0, 0.0]);
        assert!(unit.has_ended());

        let pull = unit.pull(&mut out, 4);
        assert_eq!(pull, UnitPull::default());
        assert_eq!(out, [0.0; 4]);
    }

    #[test]
    fn test_looping_wraps() {
        let mut unit = PlaybackUnit::new(ChannelRouting::Downmix);
        unit.set_buffer(ramp(3, 1)).unwrap();
        unit.set_loop(true);
        unit.start().unwrap();

        let mut out = [0.0f32; 7];
        let pull = unit.pull(&mut out, 7);
        assert_eq!(pull.frames, 7);
        assert!(!pull.ended);
        assert_eq!(out, [0.0, 1.0, 2.0, 0.0, 1.0, 2.0, 0.0]);
    }

    #[test]
    fn test_routing() {
        let stereo = RoomSonicAudioData::from_samples(vec![1.0, 0.0, 1.0, 0.0], 48000, 2).unwrap();

        let mut preserve = PlaybackUnit::new(ChannelRouting::Preserve);
        preserve.set_buffer(stereo.clone()).unwrap();
        preserve.set_gain(0.5);
        preserve.start().unwrap();
        assert_eq!(preserve.output_channels(), 2);
        let mut out = [0.0f32; 4];
        preserve.pull(&mut out, 2);
        assert_eq!(out, [0.5, 0.0, 0.5, 0.0]);

        let mut downmix = PlaybackUnit::new(ChannelRouting::Downmix);
        downmix.set_buffer(stereo).unwrap();
        downmix.start().unwrap();
        assert_eq!(downmix.output_channels(), 1);
        let mut out = [0.0f32; 2];
        downmix.pull(&mut out, 2);
        assert_eq!(out, [0.5, 0.5]);
    }

    #[test]
    fn test_advance_matches_pull() {
        let mut rendered = PlaybackUnit::new(ChannelRouting::Downmix);
        let mut skipped = PlaybackUnit::new(ChannelRouting::Downmix);
        for unit in [&mut rendered, &mut skipped] {
            unit.set_buffer(ramp(10, 1)).unwrap();
            unit.start().unwrap();
        }

        let mut out = [0.0f32; 6];
        let a = rendered.pull(&mut out, 6);
        let b = skipped.advance(6);
        assert_eq!(a, b);
        assert_eq!(rendered.position(), skipped.position());
    }
}

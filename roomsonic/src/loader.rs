//! Background decoding of emitter buffers.
//!
//! Each request runs on its own worker thread and reports back through a channel.
//! Requests are numbered; when results are collected only the most recent request
//! of each emitter is kept, so a slow early decode can never overwrite a newer one.

use crate::audio_data::{AudioDataLoader, LoadOptions, RoomSonicAudioData};
use crate::emitter::EmitterId;
use crate::error::{Result, RoomSonicError};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::collections::HashMap;
use std::sync::Arc;

/// A finished decode, still tagged with the request that produced it.
#[derive(Debug)]
pub struct DecodeOutcome {
    pub emitter_id: EmitterId,
    pub buffer_id: u32,
    pub generation: u64,
    pub result: Result<RoomSonicAudioData>,
}

pub struct DecodeJobs {
    loader: Arc<dyn AudioDataLoader>,
    options: LoadOptions,
    latest: HashMap<EmitterId, u64>,
    next_generation: u64,
    sender: Sender<DecodeOutcome>,
    receiver: Receiver<DecodeOutcome>,
}

impl std::fmt::Debug for DecodeJobs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeJobs")
            .field("options", &self.options)
            .field("pending", &self.latest.len())
            .finish()
    }
}

impl DecodeJobs {
    /// Decoded buffers are resampled to `sample_rate`.
    pub fn new(loader: Arc<dyn AudioDataLoader>, sample_rate: u32) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            loader,
            options: LoadOptions::new().target_sample_rate(sample_rate),
            latest: HashMap::new(),
            next_generation: 0,
            sender,
            receiver,
        }
    }

    pub fn set_loader(&mut self, loader: Arc<dyn AudioDataLoader>) {
        self.loader = loader;
    }

    /// Starts decoding `bytes` for `emitter_id` and returns the request generation.
    pub fn submit(&mut self, emitter_id: EmitterId, bytes: Vec<u8>, buffer_id: u32) -> Result<u64> {
        self.next_generation += 1;
        let generation = self.next_generation;

        let loader = Arc::clone(&self.loader);
        let options = self.options.clone();
        let sender = self.sender.clone();

        std::thread::Builder::new()
            .name(format!("roomsonic-decode-{}", generation))
            .spawn(move || {
                let result = loader.decode(&bytes, &options);
                let outcome = DecodeOutcome {
                    emitter_id,
                    buffer_id,
                    generation,
                    result,
                };
                if sender.send(outcome).is_err() {
                    log::debug!("Decode {} finished after the engine was dropped", generation);
                }
            })
            .map_err(|e| RoomSonicError::Engine(format!("Failed to spawn decode thread: {}", e)))?;

        if let Some(previous) = self.latest.insert(emitter_id, generation) {
            log::debug!(
                "Decode {} for {} supersedes decode {}",
                generation,
                emitter_id,
                previous
            );
        }
        Ok(generation)
    }

    /// Decodes on the calling thread.
    pub fn decode_blocking(&self, bytes: &[u8]) -> Result<RoomSonicAudioData> {
        self.loader.decode(bytes, &self.options)
    }

    /// Forgets the outstanding request of `emitter_id`; its result will be dropped.
    pub fn cancel(&mut self, emitter_id: EmitterId) -> bool {
        self.latest.remove(&emitter_id).is_some()
    }

    pub fn is_pending(&self, emitter_id: EmitterId) -> bool {
        self.latest.contains_key(&emitter_id)
    }

    pub fn pending(&self) -> usize {
        self.latest.len()
    }

    /// Collects finished decodes, keeping only each emitter's latest request.
    pub fn drain(&mut self) -> Vec<DecodeOutcome> {
        let mut current = Vec::new();
        for outcome in self.receiver.try_iter() {
            match self.latest.get(&outcome.emitter_id) {
                Some(&latest) if latest == outcome.generation => {
                    self.latest.remove(&outcome.emitter_id);
                    current.push(outcome);
                }
                _ => log::warn!(
                    "Dropping stale decode {} (buffer {}) for {}",
                    outcome.generation,
                    outcome.buffer_id,
                    outcome.emitter_id
                ),
            }
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_data::DefaultAudioLoader;
    use crate::audio_data::tests::wav_bytes;
    use std::time::{Duration, Instant};

    fn wait_for(jobs: &mut DecodeJobs, emitter: EmitterId) -> Vec<DecodeOutcome> {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut outcomes = Vec::new();
        while jobs.is_pending(emitter) && Instant::now() < deadline {
            outcomes.extend(jobs.drain());
            std::thread::sleep(Duration::from_millis(5));
        }
        outcomes
    }

    #[test]
    fn test_latest_request_wins() {
        let mut jobs = DecodeJobs::new(Arc::new(DefaultAudioLoader), 48000);
        let emitter = EmitterId(7);

        let first = jobs
            .submit(emitter, wav_bytes(&[0.1; 480], 48000, 1), 1)
            .unwrap();
        let second = jobs
            .submit(emitter, wav_bytes(&[0.2; 960], 48000, 1), 2)
            .unwrap();
        assert!(second > first);

        let outcomes = wait_for(&mut jobs, emitter);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].buffer_id, 2);
        assert_eq!(outcomes[0].result.as_ref().unwrap().total_frames(), 960);
    }

    #[test]
    fn test_cancelled_request_is_dropped() {
        let mut jobs = DecodeJobs::new(Arc::new(DefaultAudioLoader), 48000);
        let emitter = EmitterId(3);
        jobs.submit(emitter, wav_bytes(&[0.1; 64], 48000, 1), 1)
            .unwrap();
        assert!(jobs.cancel(emitter));

        std::thread::sleep(Duration::from_millis(100));
        assert!(jobs.drain().is_empty());
    }

    #[test]
    fn test_blocking_decode_resamples() {
        let jobs = DecodeJobs::new(Arc::new(DefaultAudioLoader), 48000);
        let audio = jobs
            .decode_blocking(&wav_bytes(&[0.3; 2400], 24000, 1))
            .unwrap();
        assert_eq!(audio.sample_rate(), 48000);
        assert_eq!(audio.total_frames(), 4800);
    }
}

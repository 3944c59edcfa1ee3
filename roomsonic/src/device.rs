use crate::engine::RoomSonicEngine;
use crate::error::{Result, RoomSonicError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, TryLockError};

/// Plays a shared [`RoomSonicEngine`] through the default output device.
///
/// The stream callback only ever `try_lock`s the engine: while the host thread
/// holds it the device gets a block of silence instead of waiting.
pub struct RoomSonicDevice {
    engine: Arc<Mutex<RoomSonicEngine>>,
    stream: Option<cpal::Stream>,
    is_running: Arc<AtomicBool>,
    frames_played: Arc<AtomicU64>,
    missed_blocks: Arc<AtomicU64>,
}

impl RoomSonicDevice {
    pub fn new(engine: Arc<Mutex<RoomSonicEngine>>) -> Self {
        Self {
            engine,
            stream: None,
            is_running: Arc::new(AtomicBool::new(false)),
            frames_played: Arc::new(AtomicU64::new(0)),
            missed_blocks: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn engine(&self) -> &Arc<Mutex<RoomSonicEngine>> {
        &self.engine
    }

    /// Opens the default output device and starts pulling from the engine.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running.load(Ordering::Relaxed) {
            return Ok(());
        }

        let (sample_rate, channels, block_size) = {
            let engine = match self.engine.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let desc = engine.desc();
            (desc.sample_rate, desc.channels, desc.block_size)
        };

        let host = cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| {
            RoomSonicError::AudioDevice("No default output device available".into())
        })?;

        let config = cpal::StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Fixed(block_size as u32),
        };

        let default_config = device.default_output_config().map_err(|e| {
            RoomSonicError::AudioDevice(format!("Failed to get default config: {}", e))
        })?;

        let stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => self.create_stream::<f32>(&device, &config)?,
            cpal::SampleFormat::I16 => self.create_stream::<i16>(&device, &config)?,
            cpal::SampleFormat::U16 => self.create_stream::<u16>(&device, &config)?,
            format => {
                return Err(RoomSonicError::AudioFormat(format!(
                    "Unsupported sample format {:?}",
                    format
                )));
            }
        };

        stream.play().map_err(|e| {
            RoomSonicError::AudioDevice(format!("Failed to start stream: {}", e))
        })?;

        log::info!(
            "Output device started: {} Hz, {} channels",
            sample_rate,
            channels
        );
        self.stream = Some(stream);
        self.is_running.store(true, Ordering::Relaxed);
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            self.is_running.store(false, Ordering::Relaxed);
            drop(stream);
            log::info!("Output device stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    pub fn frames_played(&self) -> u64 {
        self.frames_played.load(Ordering::Relaxed)
    }

    /// Callbacks that found the engine locked and played silence.
    pub fn missed_blocks(&self) -> u64 {
        self.missed_blocks.load(Ordering::Relaxed)
    }

    fn create_stream<T>(
        &self,
        device: &cpal::Device,
        config: &cpal::StreamConfig,
    ) -> Result<cpal::Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let engine = Arc::clone(&self.engine);
        let is_running = Arc::clone(&self.is_running);
        let frames_played = Arc::clone(&self.frames_played);
        let missed_blocks = Arc::clone(&self.missed_blocks);
        let mut scratch: Vec<f32> = Vec::new();

        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    scratch.clear();
                    scratch.resize(data.len(), 0.0);

                    if is_running.load(Ordering::Relaxed) {
                        let guard = match engine.try_lock() {
                            Ok(guard) => Some(guard),
                            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
                            Err(TryLockError::WouldBlock) => None,
                        };
                        match guard {
                            Some(mut engine) => {
                                let frames = engine.render(&mut scratch);
                                frames_played.fetch_add(frames as u64, Ordering::Relaxed);
                            }
                            None => {
                                missed_blocks.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    }

                    for (out, &sample) in data.iter_mut().zip(scratch.iter()) {
                        *out = T::from_sample(sample);
                    }
                },
                move |err| {
                    log::error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| RoomSonicError::AudioDevice(format!("Failed to build stream: {}", e)))
    }
}

impl Drop for RoomSonicDevice {
    fn drop(&mut self) {
        self.stop();
    }
}

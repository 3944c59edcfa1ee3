//! RoomSonic: one playback contract over three interchangeable spatial audio
//! backends.
//!
//! Every emitter is rendered by an equal-power panner, a binaural FIR convolver
//! and an ambisonic shoebox-room simulator at the same time as far as state is
//! concerned: buffers, loop flags, gains and transforms reach all three. Only the
//! active [`Backend`] is mixed into the output, so switching costs nothing but an
//! audible cut.
//!
//! ```
//! use roomsonic::{Backend, RoomSonicDesc, RoomSonicEngine};
//! use roomsonic::audio_data::RoomSonicAudioData;
//! use roomsonic::math::{TransformSample, Vec3};
//!
//! let mut engine = RoomSonicEngine::with_fallback_hrtf(RoomSonicDesc::default())?;
//! let emitter = engine.create_emitter()?;
//!
//! let tone = RoomSonicAudioData::from_samples(vec![0.5; 4800], 48000, 1)?;
//! engine.set_buffer(emitter, tone)?;
//! engine.update_emitter_transform(
//!     emitter,
//!     &TransformSample::from_vectors(Vec3::new(1.0, 0.0, 2.0), Vec3::Z, Vec3::Y),
//! )?;
//! engine.set_active_backend(Backend::BinauralFir);
//! engine.play(emitter)?;
//!
//! let mut out = vec![0.0; 2 * 512];
//! assert_eq!(engine.render(&mut out), 512);
//! # Ok::<(), roomsonic::RoomSonicError>(())
//! ```

pub mod audio_data;
pub mod backend;
pub mod config;
#[cfg(feature = "device")]
pub mod device;
pub mod emitter;
mod engine;
pub mod error;
pub mod events;
pub mod hrtf;
pub mod listener;
pub mod loader;
pub mod math;
pub mod playback;
pub mod room;
pub mod scene;

pub use backend::{Backend, BinauralDirection};
pub use config::{ConeDesc, DistanceDesc, DistanceModel, RoomSonicDesc};
#[cfg(feature = "device")]
pub use device::RoomSonicDevice;
pub use emitter::{Emitter, EmitterId};
pub use engine::RoomSonicEngine;
pub use error::{Result, RoomSonicError};
pub use events::RoomSonicEvent;
pub use hrtf::{HrtfDataset, HrtfHandle, HrtfMeasurement};
pub use listener::Listener;
pub use playback::PlaybackState;
pub use room::{AudioMaterial, RoomDesc};

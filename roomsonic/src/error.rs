//! Error types for RoomSonic

use crate::emitter::EmitterId;
use crate::scene::NodeId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RoomSonicError {
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio format error: {0}")]
    AudioFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audio loading error: {0}")]
    AudioLoading(String),

    #[error("HRTF dataset error: {0}")]
    Hrtf(String),

    #[error("HRTF dataset parse error: {0}")]
    HrtfParse(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Unknown emitter: {0}")]
    UnknownEmitter(EmitterId),

    #[error("Unknown scene node: {0}")]
    UnknownNode(NodeId),

    #[error("Scene error: {0}")]
    Scene(String),
}

pub type Result<T> = std::result::Result<T, RoomSonicError>;

//! Event types for RoomSonic

use crate::backend::Backend;
use crate::emitter::EmitterId;

/// Notifications produced by the engine, drained with
/// [`RoomSonicEngine::poll_events`](crate::RoomSonicEngine::poll_events).
#[derive(Debug, Clone, PartialEq)]
pub enum RoomSonicEvent {
    EmitterStarted {
        emitter_id: EmitterId,
    },
    EmitterStopped {
        emitter_id: EmitterId,
    },
    /// The live backend's playback unit ran out of buffer.
    EmitterEnded {
        emitter_id: EmitterId,
    },
    BufferLoaded {
        emitter_id: EmitterId,
        buffer_id: u32,
    },
    DecodeFailed {
        emitter_id: EmitterId,
        buffer_id: u32,
        error: String,
    },
    BackendChanged {
        from: Backend,
        to: Backend,
    },
    HrtfDatasetChanged {
        measurements: usize,
    },
}

impl RoomSonicEvent {
    pub fn emitter_id(&self) -> Option<EmitterId> {
        match self {
            Self::EmitterStarted { emitter_id }
            | Self::EmitterStopped { emitter_id }
            | Self::EmitterEnded { emitter_id }
            | Self::BufferLoaded { emitter_id, .. }
            | Self::DecodeFailed { emitter_id, .. } => Some(*emitter_id),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::DecodeFailed { .. })
    }
}

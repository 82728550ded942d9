//! Cross-thread event payloads
//!
//! Every unit of consumer-thread work travels through the
//! [`EventQueue`](crate::queue::EventQueue) as one [`VideoEvent`]. The same
//! mechanism carries frame lifecycle events, out-of-band player-state changes
//! and decoder log lines; their relative order is exactly the enqueue order.
//!
//! Events are a sum type dispatched by a single `process` operation per
//! variant (see `output`); payloads are immutable once enqueued.

use std::sync::Arc;

use crate::frame::VideoFrame;
use crate::plan::FrameGeometry;

/// Media player state change forwarded from the decoder engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerEvent {
    MediaChanged,
    NothingSpecial,
    Opening,
    Buffering { percent: f32 },
    Playing,
    Paused,
    Stopped,
    Forward,
    Backward,
    EndReached,
    EncounteredError,
    TimeChanged { time_ms: i64 },
    PositionChanged { position: f64 },
    SeekableChanged { seekable: bool },
    PausableChanged { pausable: bool },
    LengthChanged { length_ms: i64 },
}

/// Severity of a decoder engine log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Notice,
    Warning,
    Error,
}

/// One log line forwarded from the decoder engine.
#[derive(Debug, Clone)]
pub struct LogMessage {
    pub level: LogLevel,
    pub message: String,
    /// Engine-specific origin, e.g. the emitting module
    pub context: Option<String>,
}

/// One unit of consumer-thread work.
#[derive(Debug)]
pub(crate) enum VideoEvent {
    /// A fresh negotiation happened; the consumer may supply a buffer.
    ///
    /// Carries the generation it was issued for so that a frame superseded
    /// before this event is processed makes it inert.
    FrameSetup {
        geometry: FrameGeometry,
        generation: u64,
        frame: Arc<VideoFrame>,
    },
    /// The most recent completed frame is ready for display
    FrameReady,
    /// The decoder tore the current frame down
    FrameCleanup,
    Player(PlayerEvent),
    Log(LogMessage),
}

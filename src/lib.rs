#![deny(clippy::all)]

//! Cross-thread video frame pipeline
//!
//! Bridges a native media decoder that produces video frames on its own
//! thread with a single-threaded consumer that must observe completed frames
//! without tearing or data races, while never blocking the decoder on the
//! consumer's pace.
//!
//! The decoder-facing half ([`DecoderHooks`]) maps onto the engine's callback
//! surface; the consumer-facing half ([`VideoOutput`]) drains a shared event
//! queue in response to a wake signal and invokes the [`OutputHandler`]
//! extension points. Frame-ready notifications are coalesced: a burst of
//! completed frames while the consumer is busy collapses to a single "latest
//! frame is ready".

// Pixel layout negotiation (pure geometry)
pub mod plan;

// Per-frame buffer state machine
pub mod frame;

// Generic cross-thread event queue and wake primitives
pub mod queue;

// Event payloads carried through the queue
pub mod events;

// Controller: decoder hooks, consumer half, coalescer
pub mod output;

// Error types
pub mod error;

pub use error::{OutputError, OutputResult};
pub use events::{LogLevel, LogMessage, PlayerEvent};
pub use frame::{ExternalBuffer, FrameState, VideoFrame};
pub use output::{
    DecoderHooks, FrameReadyCoalescer, NegotiatedLayout, OutputHandler, VideoOutput,
};
pub use plan::{negotiate, FrameGeometry, PixelFormat, MAX_PLANES};
pub use queue::{ChannelWaker, EventQueue, NoopWaker, NotifyWaker, Waker};

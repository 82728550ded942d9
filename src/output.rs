//! Video output controller
//!
//! Orchestrates the frame pipeline: decoder callbacks come in on the engine's
//! thread, get turned into queued events, and a single-threaded consumer
//! drains them in response to the wake primitive. [`VideoOutput::open`]
//! splits the controller into its two thread-affine halves:
//!
//! - [`DecoderHooks`] lives with the decoder engine and maps one-to-one onto
//!   its callback surface (format negotiation, plane acquisition, write
//!   completion, display, cleanup). Nothing here ever blocks on the consumer.
//! - [`VideoOutput`] lives on the consumer thread, owns the
//!   [`OutputHandler`] and drains the queue.
//!
//! Frames flow decoder → queue → consumer; buffer pointers flow the other
//! way, consumer → decoder, through the frame's thread-safe setter.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{OutputError, OutputResult};
use crate::events::{LogMessage, PlayerEvent, VideoEvent};
use crate::frame::{ExternalBuffer, VideoFrame};
use crate::plan::{negotiate, FrameGeometry, PixelFormat, MAX_PLANES};
use crate::queue::{EventQueue, Waker};

/// Consumer-facing extension points, invoked only from
/// [`VideoOutput::drain_and_process`], never from the decoder thread.
pub trait OutputHandler {
    /// A fresh frame was negotiated; return the externally-visible buffer the
    /// decoder should render into, or `None` to keep the frame on its
    /// internal scratch buffer (decoding continues, nothing is exposed).
    ///
    /// A zero-size geometry means negotiation is not yet usable and should be
    /// treated as "ignore", not as an error.
    fn on_frame_setup(&mut self, geometry: &FrameGeometry) -> Option<ExternalBuffer>;

    /// The most recently completed frame is ready for display
    fn on_frame_ready(&mut self);

    /// The decoder tore the current frame down; the buffer now holds black
    fn on_frame_cleanup(&mut self);

    /// Out-of-band player state change (default: ignored)
    fn on_player_event(&mut self, _event: PlayerEvent) {}

    /// Decoder engine log line (default: ignored)
    fn on_log(&mut self, _message: LogMessage) {}
}

/// Single-slot dirty flag for frame-ready notifications.
///
/// At most one FrameReady notification is in flight regardless of how many
/// frames the decoder completes while the consumer is busy; a burst collapses
/// to "latest frame is ready". Intentionally lossy for intermediate frames,
/// never lossy for the fact that a frame was produced.
#[derive(Debug, Default)]
pub struct FrameReadyCoalescer {
    pending: AtomicBool,
}

impl FrameReadyCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder side: test-and-set. True only on the clear→set transition,
    /// which is the caller's cue to enqueue exactly one FrameReady event.
    pub fn arm(&self) -> bool {
        self.pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Consumer side: clear the flag, reporting whether it was set.
    ///
    /// Runs before the consumer callback so a display signal arriving during
    /// callback execution schedules a fresh notification instead of being
    /// silently dropped.
    pub fn disarm(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    pub fn is_armed(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}

/// State shared by the two controller halves
struct Shared {
    queue: EventQueue<VideoEvent>,
    ready: FrameReadyCoalescer,
    /// Bumped on every negotiation; setup events for older generations are inert
    generation: AtomicU64,
    pixel_format: Mutex<PixelFormat>,
    closed: AtomicBool,
}

impl Shared {
    fn pixel_format(&self) -> PixelFormat {
        *self
            .pixel_format
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Pixel layout description returned to the decoder engine from format
/// negotiation: a 4-character format tag plus stride/line arrays.
#[derive(Debug, Clone, Copy)]
pub struct NegotiatedLayout {
    pub chroma: [u8; 4],
    pub plane_count: usize,
    pub pitches: [u32; MAX_PLANES],
    pub lines: [u32; MAX_PLANES],
}

/// Decoder-facing half of the controller.
///
/// Every method is invoked synchronously on the decoder engine's thread and
/// returns promptly; none of them waits on the consumer. `post_*` may be
/// called from any engine thread.
pub struct DecoderHooks {
    shared: Arc<Shared>,
    /// Active frame; decoder-thread side only
    frame: Option<Arc<VideoFrame>>,
}

impl DecoderHooks {
    /// Format negotiation callback.
    ///
    /// Builds a fresh [`VideoFrame`] for the requested dimensions (the
    /// previous one is discarded entirely, stale setup events for it become
    /// no-ops) and enqueues a FrameSetup event for the consumer. Zero
    /// dimensions are propagated as a zero-size geometry, not an error.
    pub fn format_negotiation(&mut self, width: u32, height: u32) -> NegotiatedLayout {
        let format = self.shared.pixel_format();
        let geometry = negotiate(format, width, height);
        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;

        tracing::debug!(
            ?format,
            width,
            height,
            generation,
            size = geometry.size,
            "format negotiation"
        );

        let frame = Arc::new(VideoFrame::new(format, geometry));
        self.frame = Some(frame.clone());
        self.shared.queue.push(VideoEvent::FrameSetup {
            geometry,
            generation,
            frame,
        });

        NegotiatedLayout {
            chroma: *format.chroma_tag(),
            plane_count: geometry.plane_count,
            pitches: geometry.pitches,
            lines: geometry.lines,
        }
    }

    /// Write-pointer acquisition callback: one pointer per plane, into
    /// whichever buffer is currently active. Never blocks; the scratch buffer
    /// stands in while the consumer buffer does not exist yet.
    pub fn acquire_write_planes(
        &self,
        planes: &mut [*mut u8; MAX_PLANES],
    ) -> OutputResult<usize> {
        match &self.frame {
            Some(frame) => Ok(frame.acquire_planes(planes)),
            None => {
                *planes = [std::ptr::null_mut(); MAX_PLANES];
                Err(OutputError::NoActiveFrame)
            }
        }
    }

    /// Write-completion callback; bookkeeping only, present for symmetry with
    /// the engine's lock/unlock protocol.
    pub fn write_complete(&self, planes: &[*mut u8; MAX_PLANES]) {
        if let Some(frame) = &self.frame {
            frame.write_complete(planes);
        }
    }

    /// Display callback: arm the coalescer and schedule at most one pending
    /// FrameReady notification. A display with no completed write since
    /// negotiation is ignored.
    pub fn display(&self) {
        let Some(frame) = &self.frame else {
            return;
        };
        if frame.written() && self.shared.ready.arm() {
            self.shared.queue.push(VideoEvent::FrameReady);
        }
    }

    /// Cleanup callback: black out the active frame (terminal), let the
    /// consumer display it one last time, then tell it to tear down.
    pub fn cleanup(&mut self) {
        let Some(frame) = &self.frame else {
            return;
        };
        frame.cleanup();

        if frame.written() && self.shared.ready.arm() {
            self.shared.queue.push(VideoEvent::FrameReady);
        }
        self.shared.queue.push(VideoEvent::FrameCleanup);
    }

    /// Forward a player state change through the event queue, FIFO with the
    /// frame events. Callable from any engine thread.
    pub fn post_player_event(&self, event: PlayerEvent) -> OutputResult<()> {
        if self.shared.queue.push(VideoEvent::Player(event)) {
            Ok(())
        } else {
            Err(OutputError::Closed)
        }
    }

    /// Forward an engine log line through the event queue.
    pub fn post_log(&self, message: LogMessage) -> OutputResult<()> {
        if self.shared.queue.push(VideoEvent::Log(message)) {
            Ok(())
        } else {
            Err(OutputError::Closed)
        }
    }

    /// The frame currently targeted by decoder writes, if negotiated
    pub fn active_frame(&self) -> Option<&Arc<VideoFrame>> {
        self.frame.as_ref()
    }

    /// True once the consumer half closed the output; the engine should be
    /// torn down and no further callbacks forwarded.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

/// Consumer-facing half of the controller: owns the handler, drains the
/// queue, and is the only place consumer callbacks ever run.
pub struct VideoOutput<H> {
    shared: Arc<Shared>,
    handler: H,
    /// Frame the consumer last accepted via FrameSetup; consumer-thread side
    current_frame: Option<Arc<VideoFrame>>,
    closed: bool,
}

impl<H: OutputHandler> VideoOutput<H> {
    /// Open a video output, splitting it into its decoder-facing and
    /// consumer-facing halves. The waker is signalled whenever the queue
    /// becomes nonempty; the consumer should respond by calling
    /// [`drain_and_process`](VideoOutput::drain_and_process).
    pub fn open(
        format: PixelFormat,
        handler: H,
        waker: Arc<dyn Waker>,
    ) -> (DecoderHooks, VideoOutput<H>) {
        let shared = Arc::new(Shared {
            queue: EventQueue::new(waker),
            ready: FrameReadyCoalescer::new(),
            generation: AtomicU64::new(0),
            pixel_format: Mutex::new(format),
            closed: AtomicBool::new(false),
        });

        (
            DecoderHooks {
                shared: shared.clone(),
                frame: None,
            },
            VideoOutput {
                shared,
                handler,
                current_frame: None,
                closed: false,
            },
        )
    }

    /// Drain every pending event and run the matching handler callbacks.
    ///
    /// Call only from the consumer thread, in response to the wake signal.
    /// Loops until producers stop refilling the queue, so no work is left
    /// pending on return. No-op once closed.
    pub fn drain_and_process(&mut self) {
        if self.closed {
            return;
        }
        let shared = self.shared.clone();
        shared.queue.drain(|event| event.process(self));
    }

    /// Pixel format used for the next negotiation
    pub fn pixel_format(&self) -> PixelFormat {
        self.shared.pixel_format()
    }

    /// Change the pixel format; takes effect at the next format negotiation.
    pub fn set_pixel_format(&self, format: PixelFormat) {
        *self
            .shared
            .pixel_format
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = format;
    }

    /// Frame the consumer last accepted, if any
    pub fn current_frame(&self) -> Option<&Arc<VideoFrame>> {
        self.current_frame.as_ref()
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Close the output: refuse further decoder events, discard the pending
    /// backlog and release the wake primitive. The external decoder must be
    /// stopped first; no consumer callback runs after close begins.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.shared.closed.store(true, Ordering::Release);
        self.shared.queue.close();
        self.current_frame = None;
        tracing::debug!("video output closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<H> Drop for VideoOutput<H> {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            self.shared.closed.store(true, Ordering::Release);
            self.shared.queue.close();
        }
    }
}

impl VideoEvent {
    /// Perform this event's unit of consumer-thread work.
    pub(crate) fn process<H: OutputHandler>(self, output: &mut VideoOutput<H>) {
        match self {
            VideoEvent::FrameSetup {
                geometry,
                generation,
                frame,
            } => {
                // A negotiation that happened after this event was queued
                // supersedes it entirely
                if generation != output.shared.generation.load(Ordering::Acquire) {
                    tracing::trace!(generation, "discarding superseded frame setup");
                    return;
                }
                frame.mark_awaiting();
                output.current_frame = Some(frame.clone());
                if let Some(buffer) = output.handler.on_frame_setup(&geometry) {
                    frame.set_frame_buffer(buffer);
                }
            }
            VideoEvent::FrameReady => {
                if output.shared.ready.disarm() {
                    output.handler.on_frame_ready();
                }
            }
            VideoEvent::FrameCleanup => {
                if output.current_frame.take().is_some() {
                    output.handler.on_frame_cleanup();
                }
            }
            VideoEvent::Player(event) => output.handler.on_player_event(event),
            VideoEvent::Log(message) => output.handler.on_log(message),
        }
    }
}

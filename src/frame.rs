//! Per-frame pixel buffer state machine
//!
//! A [`VideoFrame`] exists once per format negotiation and owns the write
//! target the decoder fills. Until the consumer supplies its own buffer, a
//! component-owned scratch buffer stands in so the decoder is never stalled;
//! once the consumer buffer is bound, writes target it directly and the
//! scratch allocation is released on the decoder side.
//!
//! Two threads touch a frame: the decoder thread (plane acquisition, write
//! completion, cleanup) and the consumer thread (buffer binding). A single
//! short-lived mutex makes the buffer-pointer handoff atomic; it is never held
//! across decoder writes or consumer callbacks.

use std::ptr::NonNull;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::plan::{FrameGeometry, PixelFormat, MAX_PLANES};

/// Neutral chroma value for black YUV frames
const CHROMA_NEUTRAL: u8 = 0x80;

/// A non-owning view of a consumer-allocated pixel buffer.
///
/// The consumer allocates and owns the memory; this type only carries the
/// pointer across the thread boundary so the decoder can write into it.
#[derive(Debug)]
pub struct ExternalBuffer {
    ptr: NonNull<u8>,
    len: usize,
}

// The buffer is handed from the consumer thread to the decoder thread exactly
// once, through the frame's mutex.
unsafe impl Send for ExternalBuffer {}

impl ExternalBuffer {
    /// Wrap a consumer-owned allocation.
    ///
    /// Returns `None` for a null pointer.
    ///
    /// # Safety
    /// `ptr` must point to at least `len` writable bytes that stay valid (and
    /// are not written by anyone else) until the owning [`VideoFrame`] is
    /// dropped or superseded by a later negotiation.
    pub unsafe fn from_raw_parts(ptr: *mut u8, len: usize) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self { ptr, len })
    }

    /// Buffer capacity in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }
}

/// Lifecycle of one negotiated frame.
///
/// `Negotiated → AwaitingConsumerBuffer → BufferBound → CleanedUp`.
/// `CleanedUp` is terminal; a cleaned-up frame is never written again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Constructed on the decoder thread, setup event not yet processed
    Negotiated,
    /// Setup event reached the consumer; writes go to the scratch buffer
    AwaitingConsumerBuffer,
    /// Consumer buffer bound; writes go to it directly
    BufferBound,
    /// Decoder signalled teardown; frame holds black pixels, terminal
    CleanedUp,
}

/// Buffer state behind the frame's mutex
struct Backing {
    /// Component-owned fallback write target, present until the first write
    /// completes into the consumer buffer (or forever if none is ever bound)
    scratch: Option<Box<[u8]>>,
    /// Consumer-owned buffer, bound from the consumer thread
    external: Option<ExternalBuffer>,
    /// A write completed into the active buffer since negotiation
    filled: bool,
    /// Cleanup happened; late write completions must re-black the pixels
    force_black: bool,
    state: FrameState,
}

impl Backing {
    /// Base pointer of whichever buffer is currently active
    fn active_ptr(&mut self) -> Option<*mut u8> {
        if let Some(external) = &self.external {
            Some(external.as_ptr())
        } else {
            self.scratch.as_mut().map(|scratch| scratch.as_mut_ptr())
        }
    }
}

/// One negotiated video frame and its write target.
///
/// Created on every format negotiation, replacing the previous instance
/// entirely; a resolution change is a fresh frame, never a mutation.
pub struct VideoFrame {
    format: PixelFormat,
    geometry: FrameGeometry,
    inner: Mutex<Backing>,
}

impl VideoFrame {
    /// Create a frame for one negotiated geometry.
    ///
    /// The scratch buffer is sized to `geometry.size`; a zero-size geometry
    /// allocates nothing and yields null planes from [`acquire_planes`].
    ///
    /// [`acquire_planes`]: VideoFrame::acquire_planes
    pub fn new(format: PixelFormat, geometry: FrameGeometry) -> Self {
        let scratch = if geometry.size > 0 {
            Some(vec![0u8; geometry.size].into_boxed_slice())
        } else {
            None
        };

        Self {
            format,
            geometry,
            inner: Mutex::new(Backing {
                scratch,
                external: None,
                filled: false,
                force_black: false,
                state: FrameState::Negotiated,
            }),
        }
    }

    /// Pixel format this frame was negotiated for
    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Negotiated geometry
    #[inline]
    pub fn geometry(&self) -> &FrameGeometry {
        &self.geometry
    }

    /// Current lifecycle state
    pub fn state(&self) -> FrameState {
        self.lock().state
    }

    /// True once a decoder write has completed into the active buffer
    pub fn written(&self) -> bool {
        self.lock().filled
    }

    fn lock(&self) -> MutexGuard<'_, Backing> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark that the setup event reached the consumer thread.
    pub(crate) fn mark_awaiting(&self) {
        let mut inner = self.lock();
        if inner.state == FrameState::Negotiated {
            inner.state = FrameState::AwaitingConsumerBuffer;
        }
    }

    /// Bind the consumer-owned buffer as the write target. Consumer thread.
    ///
    /// Pixels already written to the scratch buffer are carried over so the
    /// most recently completed frame survives the swap. Returns `false` if the
    /// frame is already cleaned up or the buffer is too small for the
    /// negotiated geometry (the frame then stays on its scratch buffer).
    pub fn set_frame_buffer(&self, buffer: ExternalBuffer) -> bool {
        let mut inner = self.lock();

        if inner.state == FrameState::CleanedUp {
            return false;
        }
        if buffer.len() < self.geometry.size {
            debug_assert!(false, "consumer buffer smaller than negotiated frame size");
            return false;
        }

        if let Some(scratch) = &inner.scratch {
            // Preserve the latest completed pixels across the handoff
            unsafe {
                std::ptr::copy_nonoverlapping(scratch.as_ptr(), buffer.as_ptr(), scratch.len());
            }
        }

        inner.external = Some(buffer);
        inner.state = FrameState::BufferBound;
        true
    }

    /// Fill `planes` with one write pointer per plane. Decoder thread.
    ///
    /// Pointers target whichever buffer is currently active. A cleaned-up or
    /// zero-size frame yields null pointers; the decoder engine tolerates
    /// that and simply has nowhere to write. Returns the plane count.
    pub fn acquire_planes(&self, planes: &mut [*mut u8; MAX_PLANES]) -> usize {
        *planes = [std::ptr::null_mut(); MAX_PLANES];

        let mut inner = self.lock();
        if inner.state == FrameState::CleanedUp {
            return self.geometry.plane_count;
        }

        if let Some(base) = inner.active_ptr() {
            for plane in 0..self.geometry.plane_count {
                planes[plane] = unsafe { base.add(self.geometry.plane_offsets[plane]) };
            }
        }

        self.geometry.plane_count
    }

    /// Note a completed decoder write. Decoder thread.
    ///
    /// Only a write that targeted the currently active buffer counts; a write
    /// that raced a buffer handoff (its pointers still target the scratch
    /// buffer) is ignored, as is one that raced cleanup, which gets re-blacked
    /// so stale pixels never resurface.
    pub fn write_complete(&self, planes: &[*mut u8; MAX_PLANES]) {
        let mut inner = self.lock();

        let Some(base) = inner.active_ptr() else {
            return;
        };
        if planes[0].is_null() || planes[0] != base {
            return;
        }

        if inner.force_black {
            self.fill_black_locked(&mut inner);
        }
        inner.filled = true;

        // The completed write targeted the consumer buffer, so no pointer
        // into the scratch allocation can still be outstanding.
        if inner.external.is_some() {
            inner.scratch = None;
        }
    }

    /// Fill the active buffer with black pixels.
    ///
    /// Format-specific: packed RGBA is zero-filled; planar YUV gets 0x00 luma
    /// and neutral 0x80 chroma.
    pub fn fill_black(&self) {
        let mut inner = self.lock();
        self.fill_black_locked(&mut inner);
    }

    fn fill_black_locked(&self, inner: &mut Backing) {
        let Some(base) = inner.active_ptr() else {
            return;
        };

        match self.format {
            PixelFormat::PackedRgba => unsafe {
                std::ptr::write_bytes(base, 0x00, self.geometry.size);
            },
            PixelFormat::PlanarYuv420 => {
                let u_offset = self.geometry.u_plane_offset();
                unsafe {
                    std::ptr::write_bytes(base, 0x00, u_offset);
                    std::ptr::write_bytes(
                        base.add(u_offset),
                        CHROMA_NEUTRAL,
                        self.geometry.size - u_offset,
                    );
                }
            }
        }
    }

    /// Decoder teardown signal: black out the frame and stop accepting writes.
    ///
    /// Terminal; later plane acquisitions yield null pointers.
    pub fn cleanup(&self) {
        let mut inner = self.lock();
        inner.force_black = true;
        self.fill_black_locked(&mut inner);
        inner.state = FrameState::CleanedUp;
    }
}

impl std::fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoFrame")
            .field("format", &self.format)
            .field("width", &self.geometry.width)
            .field("height", &self.geometry.height)
            .field("size", &self.geometry.size)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::negotiate;

    fn planar_frame(width: u32, height: u32) -> VideoFrame {
        VideoFrame::new(
            PixelFormat::PlanarYuv420,
            negotiate(PixelFormat::PlanarYuv420, width, height),
        )
    }

    #[test]
    fn test_scratch_planes_follow_offsets() {
        let frame = planar_frame(64, 48);
        let mut planes = [std::ptr::null_mut(); MAX_PLANES];
        assert_eq!(frame.acquire_planes(&mut planes), 3);

        let base = planes[0] as usize;
        assert_eq!(planes[1] as usize - base, frame.geometry().u_plane_offset());
        assert_eq!(planes[2] as usize - base, frame.geometry().v_plane_offset());
    }

    #[test]
    fn test_fill_black_planar_ranges() {
        let frame = planar_frame(6, 4);
        frame.fill_black();

        let geometry = *frame.geometry();
        let mut planes = [std::ptr::null_mut(); MAX_PLANES];
        frame.acquire_planes(&mut planes);
        let pixels = unsafe { std::slice::from_raw_parts(planes[0], geometry.size) };

        let u_offset = geometry.u_plane_offset();
        assert!(pixels[..u_offset].iter().all(|&b| b == 0x00));
        assert!(pixels[u_offset..].iter().all(|&b| b == 0x80));
    }

    #[test]
    fn test_fill_black_packed_zeroes() {
        let frame = VideoFrame::new(
            PixelFormat::PackedRgba,
            negotiate(PixelFormat::PackedRgba, 8, 8),
        );
        let mut planes = [std::ptr::null_mut(); MAX_PLANES];
        frame.acquire_planes(&mut planes);
        unsafe { std::ptr::write_bytes(planes[0], 0xff, frame.geometry().size) };

        frame.fill_black();
        let pixels = unsafe { std::slice::from_raw_parts(planes[0], frame.geometry().size) };
        assert!(pixels.iter().all(|&b| b == 0x00));
    }

    #[test]
    fn test_bind_copies_scratch_contents() {
        let frame = planar_frame(16, 16);
        let size = frame.geometry().size;

        // Decoder writes into the scratch buffer first
        let mut planes = [std::ptr::null_mut(); MAX_PLANES];
        frame.acquire_planes(&mut planes);
        unsafe { std::ptr::write_bytes(planes[0], 0xab, size) };
        frame.write_complete(&planes);
        assert!(frame.written());

        let mut backing = vec![0u8; size].into_boxed_slice();
        let buffer =
            unsafe { ExternalBuffer::from_raw_parts(backing.as_mut_ptr(), backing.len()) }.unwrap();
        assert!(frame.set_frame_buffer(buffer));
        assert_eq!(frame.state(), FrameState::BufferBound);
        assert!(backing.iter().all(|&b| b == 0xab));

        // Subsequent acquisitions target the consumer buffer
        frame.acquire_planes(&mut planes);
        assert_eq!(planes[0], backing.as_mut_ptr());
    }

    #[test]
    fn test_undersized_buffer_rejected() {
        let frame = planar_frame(16, 16);
        let mut backing = vec![0u8; 4].into_boxed_slice();
        let buffer =
            unsafe { ExternalBuffer::from_raw_parts(backing.as_mut_ptr(), backing.len()) }.unwrap();

        // Keep the frame on its scratch buffer rather than overrun
        let bind = std::panic::AssertUnwindSafe(|| frame.set_frame_buffer(buffer));
        if cfg!(debug_assertions) {
            assert!(std::panic::catch_unwind(bind).is_err());
        } else {
            assert!(!std::panic::catch_unwind(bind).unwrap());
        }
        let mut planes = [std::ptr::null_mut(); MAX_PLANES];
        frame.acquire_planes(&mut planes);
        assert_ne!(planes[0], backing.as_mut_ptr());
    }

    #[test]
    fn test_stale_write_after_rebind_ignored() {
        let frame = planar_frame(16, 16);
        let size = frame.geometry().size;

        let mut scratch_planes = [std::ptr::null_mut(); MAX_PLANES];
        frame.acquire_planes(&mut scratch_planes);

        let mut backing = vec![0u8; size].into_boxed_slice();
        let buffer =
            unsafe { ExternalBuffer::from_raw_parts(backing.as_mut_ptr(), backing.len()) }.unwrap();
        frame.set_frame_buffer(buffer);

        // Completion for the pre-handoff write still points at the scratch
        // buffer and must not count as a frame in the consumer buffer
        frame.write_complete(&scratch_planes);
        assert!(!frame.written());
    }

    #[test]
    fn test_cleanup_is_terminal() {
        let frame = planar_frame(8, 8);
        frame.cleanup();
        assert_eq!(frame.state(), FrameState::CleanedUp);

        let mut planes = [std::ptr::null_mut(); MAX_PLANES];
        assert_eq!(frame.acquire_planes(&mut planes), 3);
        assert!(planes.iter().all(|p| p.is_null()));

        let mut backing = vec![0u8; frame.geometry().size].into_boxed_slice();
        let buffer =
            unsafe { ExternalBuffer::from_raw_parts(backing.as_mut_ptr(), backing.len()) }.unwrap();
        assert!(!frame.set_frame_buffer(buffer));
    }

    #[test]
    fn test_write_racing_cleanup_is_reblacked() {
        let frame = planar_frame(8, 8);
        let size = frame.geometry().size;

        let mut planes = [std::ptr::null_mut(); MAX_PLANES];
        frame.acquire_planes(&mut planes);

        // Cleanup lands while the decoder is mid-write
        frame.cleanup();
        unsafe { std::ptr::write_bytes(planes[0], 0x55, size) };
        frame.write_complete(&planes);

        let pixels = unsafe { std::slice::from_raw_parts(planes[0], size) };
        let u_offset = frame.geometry().u_plane_offset();
        assert!(pixels[..u_offset].iter().all(|&b| b == 0x00));
        assert!(pixels[u_offset..].iter().all(|&b| b == 0x80));
    }

    #[test]
    fn test_zero_size_frame_yields_null_planes() {
        let frame = VideoFrame::new(
            PixelFormat::PlanarYuv420,
            negotiate(PixelFormat::PlanarYuv420, 0, 0),
        );
        let mut planes = [std::ptr::null_mut(); MAX_PLANES];
        assert_eq!(frame.acquire_planes(&mut planes), 3);
        assert!(planes.iter().all(|p| p.is_null()));
    }
}

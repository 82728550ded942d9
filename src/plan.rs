//! Pixel layout negotiation
//!
//! Pure geometry calculators for the two supported frame layouts. The decoder
//! engine hands us a requested width/height and expects back a chroma tag plus
//! per-plane pitch/line arrays; everything here is derived from those two
//! numbers and the configured [`PixelFormat`].

/// Maximum number of planes any supported layout uses (3 for planar YUV).
pub const MAX_PLANES: usize = 3;

/// Pixel layout of the frames handed to the consumer.
///
/// Fixed for the lifetime of one negotiated frame; a different format takes
/// effect at the next format negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Packed 32-bit RGBA-like, single plane, 4 bytes per pixel
    PackedRgba,
    /// Planar YUV 4:2:0, three planes (Y, U, V)
    PlanarYuv420,
}

impl PixelFormat {
    /// The 4-character chroma tag the decoder engine expects back from
    /// format negotiation.
    pub fn chroma_tag(&self) -> &'static [u8; 4] {
        match self {
            PixelFormat::PackedRgba => b"RV32",
            PixelFormat::PlanarYuv420 => b"I420",
        }
    }

    /// Number of planes for this layout
    pub fn plane_count(&self) -> usize {
        match self {
            PixelFormat::PackedRgba => 1,
            PixelFormat::PlanarYuv420 => 3,
        }
    }
}

/// Byte-level geometry of one negotiated frame.
///
/// Computed once per format negotiation and immutable afterwards. Unused plane
/// slots hold zeros. Invariants: `size` equals the sum of `pitches[i] *
/// lines[i]` over the active planes, `plane_offsets[0]` is always 0 and the
/// remaining offsets are cumulative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    /// Requested frame width in pixels
    pub width: u32,
    /// Requested frame height in pixels
    pub height: u32,
    /// Number of active planes (1 or 3)
    pub plane_count: usize,
    /// Bytes per row, per plane
    pub pitches: [u32; MAX_PLANES],
    /// Row count, per plane
    pub lines: [u32; MAX_PLANES],
    /// Byte offset of each plane from the buffer start
    pub plane_offsets: [usize; MAX_PLANES],
    /// Total buffer size in bytes
    pub size: usize,
}

impl FrameGeometry {
    /// True when negotiation produced nothing writable (zero width or height).
    ///
    /// A zero-size geometry is a valid outcome, not an error; callers treat it
    /// as "negotiation not yet usable".
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Byte offset of the U plane (planar layouts only)
    pub fn u_plane_offset(&self) -> usize {
        self.plane_offsets[1]
    }

    /// Byte offset of the V plane (planar layouts only)
    pub fn v_plane_offset(&self) -> usize {
        self.plane_offsets[2]
    }
}

/// Round up to the next multiple of 4 bytes
fn align4(value: u32) -> u32 {
    (value + 3) & !3
}

/// Compute the frame geometry for `format` at the requested dimensions.
///
/// Pure and infallible. For [`PixelFormat::PlanarYuv420`] the luma plane is
/// padded to even width/height, every pitch is rounded up to a 4-byte
/// boundary and the chroma planes are half the luma dimensions with the same
/// rounding. Zero width or height yields a zero-size geometry.
pub fn negotiate(format: PixelFormat, width: u32, height: u32) -> FrameGeometry {
    let mut pitches = [0u32; MAX_PLANES];
    let mut lines = [0u32; MAX_PLANES];
    let mut plane_offsets = [0usize; MAX_PLANES];

    if width == 0 || height == 0 {
        return FrameGeometry {
            width,
            height,
            plane_count: format.plane_count(),
            pitches,
            lines,
            plane_offsets,
            size: 0,
        };
    }

    match format {
        PixelFormat::PackedRgba => {
            pitches[0] = width * 4;
            lines[0] = height;
        }
        PixelFormat::PlanarYuv420 => {
            let even_width = width + (width & 1);
            let even_height = height + (height & 1);

            pitches[0] = align4(even_width);
            pitches[1] = align4(even_width / 2);
            pitches[2] = pitches[1];

            lines[0] = even_height;
            lines[1] = even_height / 2;
            lines[2] = lines[1];
        }
    }

    let plane_count = format.plane_count();
    let mut size = 0usize;
    for plane in 0..plane_count {
        plane_offsets[plane] = size;
        size += pitches[plane] as usize * lines[plane] as usize;
    }

    FrameGeometry {
        width,
        height,
        plane_count,
        pitches,
        lines,
        plane_offsets,
        size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_rgba_geometry() {
        let geometry = negotiate(PixelFormat::PackedRgba, 640, 480);
        assert_eq!(geometry.plane_count, 1);
        assert_eq!(geometry.pitches[0], 640 * 4);
        assert_eq!(geometry.lines[0], 480);
        assert_eq!(geometry.size, 640 * 480 * 4);
        assert_eq!(geometry.plane_offsets, [0, 0, 0]);
    }

    #[test]
    fn test_planar_yuv_odd_dimensions() {
        let geometry = negotiate(PixelFormat::PlanarYuv420, 641, 481);

        // 641 is padded to 642, then each pitch rounds up to a 4-byte boundary
        assert_eq!(geometry.pitches[0], 644);
        assert_eq!(geometry.pitches[1], 324);
        assert_eq!(geometry.pitches[2], 324);
        assert_eq!(geometry.lines[0], 482);
        assert_eq!(geometry.lines[1], 241);
        assert_eq!(geometry.lines[2], 241);

        let expected: usize = (644 * 482) + (324 * 241) * 2;
        assert_eq!(geometry.size, expected);
    }

    #[test]
    fn test_planar_yuv_invariants() {
        for (width, height) in [(1, 1), (2, 2), (17, 13), (640, 480), (1919, 1079)] {
            let geometry = negotiate(PixelFormat::PlanarYuv420, width, height);

            for plane in 0..geometry.plane_count {
                assert_eq!(geometry.pitches[plane] % 4, 0, "{width}x{height}");
            }

            let sum: usize = (0..geometry.plane_count)
                .map(|p| geometry.pitches[p] as usize * geometry.lines[p] as usize)
                .sum();
            assert_eq!(geometry.size, sum);

            assert_eq!(geometry.plane_offsets[0], 0);
            assert_eq!(
                geometry.u_plane_offset(),
                geometry.pitches[0] as usize * geometry.lines[0] as usize
            );
            assert_eq!(
                geometry.v_plane_offset(),
                geometry.u_plane_offset()
                    + geometry.pitches[1] as usize * geometry.lines[1] as usize
            );
        }
    }

    #[test]
    fn test_zero_dimensions() {
        let geometry = negotiate(PixelFormat::PlanarYuv420, 0, 480);
        assert!(geometry.is_empty());
        assert_eq!(geometry.size, 0);
        assert_eq!(geometry.pitches, [0, 0, 0]);

        let geometry = negotiate(PixelFormat::PackedRgba, 640, 0);
        assert!(geometry.is_empty());
    }

    #[test]
    fn test_chroma_tags() {
        assert_eq!(PixelFormat::PackedRgba.chroma_tag(), b"RV32");
        assert_eq!(PixelFormat::PlanarYuv420.chroma_tag(), b"I420");
    }
}

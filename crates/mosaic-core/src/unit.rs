use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Kind of source material flowing through the pipeline.
///
/// Selected once at setup and threaded through router and compositor as a
/// tagged value; it determines the per-frame transform the router applies
/// before fan-out and the shape of the cached lane resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// Decoded frames arriving from a capture source, fanned out as
    /// shallow per-lane duplicates.
    OpaqueFrame,
    /// A fixed image served by each lane on every composite round.
    StillImage,
    /// Lane-locally generated planar color data.
    PlanarChunk,
}

/// Planar pixel layout of a [`PlanarFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanarFormat {
    /// 4:2:0 subsampled Y/U/V, U and V at half resolution.
    I420,
}

/// A single-surface RGBA frame.
///
/// Pixel bytes are behind an `Arc` so the router's per-lane duplicates are
/// shallow: cloning shares the allocation, and the last drop releases it.
#[derive(Debug, Clone)]
pub struct OpaqueFrame {
    pub width: u32,
    pub height: u32,
    pub timestamp_us: u64,
    pub bytes: Arc<Vec<u8>>,
}

impl OpaqueFrame {
    /// Wrap raw RGBA bytes. `bytes.len()` must be `width * height * 4`.
    pub fn new(width: u32, height: u32, timestamp_us: u64, bytes: Vec<u8>) -> Self {
        debug_assert_eq!(bytes.len(), (width as usize) * (height as usize) * 4);
        Self {
            width,
            height,
            timestamp_us,
            bytes: Arc::new(bytes),
        }
    }

    /// A frame filled with a solid RGBA color.
    pub fn solid(width: u32, height: u32, timestamp_us: u64, rgba: [u8; 4]) -> Self {
        let pixel_count = (width as usize) * (height as usize);
        let mut bytes = Vec::with_capacity(pixel_count * 4);
        for _ in 0..pixel_count {
            bytes.extend_from_slice(&rgba);
        }
        Self::new(width, height, timestamp_us, bytes)
    }

    /// Shallow duplicate for fan-out: shares the underlying pixel bytes.
    pub fn duplicate(&self) -> Self {
        self.clone()
    }

    /// Total byte size of the pixel data.
    pub fn byte_size(&self) -> usize {
        self.bytes.len()
    }
}

/// An I420 frame described by plane offsets and strides over one
/// contiguous byte buffer.
#[derive(Debug, Clone)]
pub struct PlanarFrame {
    pub width: u32,
    pub height: u32,
    pub timestamp_us: u64,
    pub format: PlanarFormat,
    /// Byte offset of each plane within `bytes`.
    pub plane_offsets: [usize; 3],
    /// Row stride in bytes of each plane.
    pub plane_strides: [usize; 3],
    pub bytes: Arc<Vec<u8>>,
}

impl PlanarFrame {
    /// Describe a tightly packed I420 buffer: Y plane followed by U and V
    /// at half resolution.
    pub fn i420(width: u32, height: u32, timestamp_us: u64, bytes: Vec<u8>) -> Self {
        let w = width as usize;
        let h = height as usize;
        debug_assert_eq!(bytes.len(), w * h + 2 * (w / 2) * (h / 2));
        Self {
            width,
            height,
            timestamp_us,
            format: PlanarFormat::I420,
            plane_offsets: [0, w * h, w * h + (w / 2) * (h / 2)],
            plane_strides: [w, w / 2, w / 2],
            bytes: Arc::new(bytes),
        }
    }

    /// Width and height of plane `index` (0 = Y, 1 = U, 2 = V).
    pub fn plane_dimensions(&self, index: usize) -> (u32, u32) {
        match index {
            0 => (self.width, self.height),
            _ => (self.width / 2, self.height / 2),
        }
    }

    /// Borrow the bytes of plane `index`.
    pub fn plane(&self, index: usize) -> &[u8] {
        let (_, rows) = self.plane_dimensions(index);
        let start = self.plane_offsets[index];
        let len = self.plane_strides[index] * rows as usize;
        &self.bytes[start..start + len]
    }
}

/// Three separately owned planes, U and V at half resolution (4:2:0).
#[derive(Debug, Clone)]
pub struct PlanarBuffers {
    pub width: u32,
    pub height: u32,
    pub y: Vec<u8>,
    pub u: Vec<u8>,
    pub v: Vec<u8>,
}

impl PlanarBuffers {
    /// Allocate planes for a `width x height` frame.
    pub fn new(width: u32, height: u32) -> Self {
        let w = width as usize;
        let h = height as usize;
        Self {
            width,
            height,
            y: vec![0; w * h],
            u: vec![0; (w / 2) * (h / 2)],
            v: vec![0; (w / 2) * (h / 2)],
        }
    }
}

/// One unit of visual data delivered to a lane.
#[derive(Debug, Clone)]
pub enum VisualUnit {
    Opaque(OpaqueFrame),
    Planar(PlanarFrame),
    Buffers(PlanarBuffers),
}

impl VisualUnit {
    /// Source dimensions of this unit.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            VisualUnit::Opaque(f) => (f.width, f.height),
            VisualUnit::Planar(f) => (f.width, f.height),
            VisualUnit::Buffers(b) => (b.width, b.height),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opaque_solid() {
        let frame = OpaqueFrame::solid(2, 2, 0, [255, 0, 0, 255]);
        assert_eq!(frame.byte_size(), 16);
        assert_eq!(&frame.bytes[0..4], &[255, 0, 0, 255]);
    }

    #[test]
    fn test_opaque_duplicate_is_shallow() {
        let frame = OpaqueFrame::solid(4, 4, 0, [1, 2, 3, 4]);
        let dup = frame.duplicate();
        assert!(Arc::ptr_eq(&frame.bytes, &dup.bytes));
    }

    #[test]
    fn test_i420_layout() {
        let frame = PlanarFrame::i420(4, 4, 0, vec![0; 24]);
        assert_eq!(frame.plane_offsets, [0, 16, 20]);
        assert_eq!(frame.plane_strides, [4, 2, 2]);
        assert_eq!(frame.plane_dimensions(0), (4, 4));
        assert_eq!(frame.plane_dimensions(1), (2, 2));
        assert_eq!(frame.plane(0).len(), 16);
        assert_eq!(frame.plane(1).len(), 4);
        assert_eq!(frame.plane(2).len(), 4);
    }

    #[test]
    fn test_plane_views_disjoint() {
        let mut bytes = vec![0u8; 24];
        bytes[16] = 0xaa; // first U byte
        bytes[20] = 0xbb; // first V byte
        let frame = PlanarFrame::i420(4, 4, 0, bytes);
        assert_eq!(frame.plane(1)[0], 0xaa);
        assert_eq!(frame.plane(2)[0], 0xbb);
    }

    #[test]
    fn test_planar_buffers_half_res_chroma() {
        let b = PlanarBuffers::new(320, 240);
        assert_eq!(b.y.len(), 320 * 240);
        assert_eq!(b.u.len(), 160 * 120);
        assert_eq!(b.v.len(), 160 * 120);
    }

    #[test]
    fn test_source_kind_serde_names() {
        let json = serde_json::to_string(&SourceKind::PlanarChunk).unwrap();
        assert_eq!(json, "\"planar-chunk\"");
        let kind: SourceKind = serde_json::from_str("\"opaque-frame\"").unwrap();
        assert_eq!(kind, SourceKind::OpaqueFrame);
    }
}

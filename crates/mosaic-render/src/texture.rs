//! Lane texture resources and the two plane-upload paths.

use wgpu::{Device, Extent3d, Queue, Texture, TextureDescriptor, TextureFormat, TextureUsages};

/// Destination row stride for a texture copy: the byte width rounded up to
/// the driver's copy alignment (256). Padding bytes are undefined; source
/// rows are copied unpadded, row by row.
pub fn aligned_bytes_per_row(row_bytes: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    row_bytes.div_ceil(align) * align
}

fn create_plane_texture(device: &Device, label: &str, width: u32, height: u32) -> Texture {
    device.create_texture(&TextureDescriptor {
        label: Some(label),
        size: Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TextureFormat::R8Unorm,
        usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
        view_formats: &[],
    })
}

/// A sampleable RGBA texture for single-surface lane frames.
pub fn create_rgba_texture(device: &Device, label: &str, width: u32, height: u32) -> Texture {
    device.create_texture(&TextureDescriptor {
        label: Some(label),
        size: Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TextureFormat::Rgba8Unorm,
        usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
        view_formats: &[],
    })
}

/// Three singly-owned plane textures: Y at full resolution, U and V at
/// half resolution (4:2:0). Owned by the lane slot that created them;
/// contents are replaced in place on update.
pub struct TextureGroup {
    pub y: Texture,
    pub u: Texture,
    pub v: Texture,
    pub width: u32,
    pub height: u32,
}

impl TextureGroup {
    pub fn new(device: &Device, lane_id: u32, width: u32, height: u32) -> Self {
        Self {
            y: create_plane_texture(device, &format!("lane{lane_id}_y"), width, height),
            u: create_plane_texture(device, &format!("lane{lane_id}_u"), width / 2, height / 2),
            v: create_plane_texture(device, &format!("lane{lane_id}_v"), width / 2, height / 2),
            width,
            height,
        }
    }

    /// Plane texture and dimensions by index (0 = Y, 1 = U, 2 = V).
    pub fn plane(&self, index: usize) -> (&Texture, u32, u32) {
        match index {
            0 => (&self.y, self.width, self.height),
            1 => (&self.u, self.width / 2, self.height / 2),
            _ => (&self.v, self.width / 2, self.height / 2),
        }
    }

    pub fn destroy(&self) {
        self.y.destroy();
        self.u.destroy();
        self.v.destroy();
    }
}

/// Direct-write upload: overwrite texture contents in one driver call.
/// `bytes_per_pixel` is 1 for planes, 4 for RGBA.
pub fn write_direct(
    queue: &Queue,
    texture: &Texture,
    data: &[u8],
    width: u32,
    height: u32,
    bytes_per_pixel: u32,
) {
    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        data,
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(width * bytes_per_pixel),
            rows_per_image: Some(height),
        },
        Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
}

/// Staged-copy upload: fill `scratch` with row-padded source bytes, then
/// encode a buffer-to-texture copy. `scratch` must hold at least
/// `aligned_bytes_per_row(width * bpp) * height` bytes.
pub fn copy_staged(
    queue: &Queue,
    encoder: &mut wgpu::CommandEncoder,
    scratch: &wgpu::Buffer,
    texture: &Texture,
    data: &[u8],
    width: u32,
    height: u32,
    bytes_per_pixel: u32,
) {
    let row_bytes = (width * bytes_per_pixel) as usize;
    let padded = aligned_bytes_per_row(width * bytes_per_pixel) as usize;

    let mut staged = vec![0u8; padded * height as usize];
    for (row, chunk) in data.chunks_exact(row_bytes).enumerate().take(height as usize) {
        staged[row * padded..row * padded + row_bytes].copy_from_slice(chunk);
    }
    queue.write_buffer(scratch, 0, &staged);

    encoder.copy_buffer_to_texture(
        wgpu::ImageCopyBuffer {
            buffer: scratch,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(padded as u32),
                rows_per_image: Some(height),
            },
        },
        wgpu::ImageCopyTexture {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aligned_bytes_per_row() {
        assert_eq!(aligned_bytes_per_row(9), 256);
        assert_eq!(aligned_bytes_per_row(300), 512);
        assert_eq!(aligned_bytes_per_row(256), 256);
        assert_eq!(aligned_bytes_per_row(257), 512);
        assert_eq!(aligned_bytes_per_row(1), 256);
    }
}

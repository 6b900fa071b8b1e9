//! Multi-lane grid compositor.
//!
//! Caches one visual unit per lane as GPU textures and draws every lane
//! into its grid cell on the composite surface. Drawing is gated on full
//! population: no output is produced until every expected lane has a
//! cached unit.

use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use mosaic_core::{
    CompositorConfig, MosaicError, MosaicResult, PlanarFrame, SubmissionStrategy, UploadStrategy,
    Viewport, VisualUnit,
};
use tracing::{debug, warn};

use crate::gpu::GpuContext;
use crate::pool::{BufferPool, PoolStats};
use crate::texture::{self, TextureGroup};

const PLANE_NAMES: [&str; 3] = ["y", "u", "v"];

const SCRATCH_USAGE: wgpu::BufferUsages = wgpu::BufferUsages::COPY_SRC
    .union(wgpu::BufferUsages::COPY_DST);

/// Cached per-lane GPU resources.
pub enum LaneSlot {
    /// One sampleable RGBA surface.
    Single(wgpu::Texture),
    /// Y/U/V plane group.
    Planar(TextureGroup),
}

fn destroy_slot(slot: &LaneSlot) {
    match slot {
        LaneSlot::Single(tex) => tex.destroy(),
        LaneSlot::Planar(group) => group.destroy(),
    }
}

/// Lane id to cached slot. The draw gate consults its population.
pub struct LaneCache<S = LaneSlot> {
    slots: HashMap<u32, S>,
}

impl<S> LaneCache<S> {
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, lane_id: u32) -> Option<&S> {
        self.slots.get(&lane_id)
    }

    /// Cache a slot for `lane_id`, returning the replaced one so the
    /// caller can destroy it.
    pub fn insert(&mut self, lane_id: u32, slot: S) -> Option<S> {
        self.slots.insert(lane_id, slot)
    }

    pub fn drain(&mut self) -> impl Iterator<Item = (u32, S)> + '_ {
        self.slots.drain()
    }

    /// The draw gate: every expected lane has a cached unit.
    pub fn is_complete(&self, expected: u32) -> bool {
        self.slots.len() == expected as usize
    }
}

impl<S> Default for LaneCache<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// What a `draw` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOutcome {
    /// The gate was not satisfied; no commands were encoded.
    Gated { cached: u32, expected: u32 },
    /// Commands were flushed, with the number of queue submissions used.
    Submitted { submissions: u32 },
}

/// Grid compositor over a headless composite surface.
pub struct LaneCompositor {
    gpu: Arc<GpuContext>,
    pool: BufferPool<Arc<GpuContext>>,
    viewport: Viewport,
    upload: UploadStrategy,
    submission: SubmissionStrategy,
    cache: LaneCache,
    scratch_tags: BTreeSet<String>,
    single_pipeline: wgpu::RenderPipeline,
    single_layout: wgpu::BindGroupLayout,
    planar_pipeline: wgpu::RenderPipeline,
    planar_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    target: wgpu::Texture,
    target_view: wgpu::TextureView,
    torn_down: bool,
}

impl LaneCompositor {
    /// Build pipelines and the composite surface for `config`.
    ///
    /// Fails with `ConfigUnsupported` before any frame is processed when
    /// the grid exceeds the device's texture limits.
    pub fn new(gpu: Arc<GpuContext>, config: &CompositorConfig) -> MosaicResult<Self> {
        let viewport = config.viewport();
        let max_dim = gpu.max_surface_dimension();
        if viewport.surface_width > max_dim || viewport.surface_height > max_dim {
            return Err(MosaicError::unsupported(format!(
                "composite surface {}x{} exceeds device limit {}",
                viewport.surface_width, viewport.surface_height, max_dim
            )));
        }

        let blit_shader = gpu
            .device
            .create_shader_module(wgpu::include_wgsl!("blit.wgsl"));
        let yuv_shader = gpu
            .device
            .create_shader_module(wgpu::include_wgsl!("yuv.wgsl"));

        let single_layout = gpu
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("mosaic_single_bind_group_layout"),
                entries: &[
                    sampler_layout_entry(0),
                    texture_layout_entry(1),
                ],
            });

        let planar_layout = gpu
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("mosaic_planar_bind_group_layout"),
                entries: &[
                    sampler_layout_entry(0),
                    texture_layout_entry(1),
                    texture_layout_entry(2),
                    texture_layout_entry(3),
                ],
            });

        let single_pipeline = create_cell_pipeline(
            &gpu.device,
            "mosaic_single_pipeline",
            &blit_shader,
            &single_layout,
        );
        let planar_pipeline = create_cell_pipeline(
            &gpu.device,
            "mosaic_planar_pipeline",
            &yuv_shader,
            &planar_layout,
        );

        let sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let target = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("mosaic_composite_surface"),
            size: wgpu::Extent3d {
                width: viewport.surface_width,
                height: viewport.surface_height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let target_view = target.create_view(&wgpu::TextureViewDescriptor::default());

        let pool = BufferPool::new(gpu.clone());

        Ok(Self {
            gpu,
            pool,
            viewport,
            upload: config.upload_strategy,
            submission: config.submission_strategy,
            cache: LaneCache::new(),
            scratch_tags: BTreeSet::new(),
            single_pipeline,
            single_layout,
            planar_pipeline,
            planar_layout,
            sampler,
            target,
            target_view,
            torn_down: false,
        })
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn cached_lane_count(&self) -> u32 {
        self.cache.len() as u32
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Cache or update the visual unit for `lane_id`.
    ///
    /// The first unit for a lane creates its textures; later units replace
    /// the texture contents in place. The delivered unit's source bytes are
    /// dropped once uploaded.
    pub fn on_lane_unit(&mut self, lane_id: u32, unit: VisualUnit) -> MosaicResult<()> {
        if self.torn_down {
            return Err(MosaicError::render("lane unit after teardown"));
        }
        if !self.viewport.contains_lane(lane_id) {
            return Err(MosaicError::InvalidArgument(format!(
                "lane {lane_id} outside grid of {} streams",
                self.viewport.stream_count
            )));
        }

        self.ensure_slot(lane_id, &unit);
        let slot = self
            .cache
            .get(lane_id)
            .ok_or_else(|| MosaicError::invariant(format!("missing slot for lane {lane_id}")))?;
        upload_unit(
            &self.gpu,
            &mut self.pool,
            self.upload,
            lane_id,
            slot,
            &unit,
            &mut self.scratch_tags,
        )
    }

    /// Draw every lane into its grid cell.
    ///
    /// No-op unless the cached lane count equals the expected stream count;
    /// the compositor never draws a partial grid.
    pub fn draw(&mut self) -> MosaicResult<DrawOutcome> {
        if self.torn_down {
            return Err(MosaicError::render("draw after teardown"));
        }
        let cached = self.cache.len() as u32;
        let expected = self.viewport.stream_count;
        if !self.cache.is_complete(expected) {
            debug!(cached, expected, "draw gated on lane readiness");
            return Ok(DrawOutcome::Gated { cached, expected });
        }

        match self.submission {
            SubmissionStrategy::Single => self.draw_single_submission(),
            SubmissionStrategy::PerLane => self.draw_per_lane_submission(),
        }
    }

    fn bind_lane(&self, slot: &LaneSlot) -> (wgpu::BindGroup, bool) {
        match slot {
            LaneSlot::Single(tex) => {
                let view = tex.create_view(&wgpu::TextureViewDescriptor::default());
                let bind_group = self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: None,
                    layout: &self.single_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::Sampler(&self.sampler),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::TextureView(&view),
                        },
                    ],
                });
                (bind_group, false)
            }
            LaneSlot::Planar(group) => {
                let y = group.y.create_view(&wgpu::TextureViewDescriptor::default());
                let u = group.u.create_view(&wgpu::TextureViewDescriptor::default());
                let v = group.v.create_view(&wgpu::TextureViewDescriptor::default());
                let bind_group = self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: None,
                    layout: &self.planar_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::Sampler(&self.sampler),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::TextureView(&y),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: wgpu::BindingResource::TextureView(&u),
                        },
                        wgpu::BindGroupEntry {
                            binding: 3,
                            resource: wgpu::BindingResource::TextureView(&v),
                        },
                    ],
                });
                (bind_group, true)
            }
        }
    }

    fn draw_single_submission(&mut self) -> MosaicResult<DrawOutcome> {
        let bind_groups: Vec<(u32, wgpu::BindGroup, bool)> = (0..self.viewport.stream_count)
            .filter_map(|lane| {
                let slot = self.cache.get(lane)?;
                let (bind_group, planar) = self.bind_lane(slot);
                Some((lane, bind_group, planar))
            })
            .collect();

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("mosaic_composite_encoder"),
            });
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("mosaic_composite_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            for (lane, bind_group, planar) in &bind_groups {
                let (x, y) = self.viewport.cell_origin(*lane);
                rpass.set_pipeline(if *planar {
                    &self.planar_pipeline
                } else {
                    &self.single_pipeline
                });
                rpass.set_bind_group(0, bind_group, &[]);
                rpass.set_viewport(
                    x as f32,
                    y as f32,
                    self.viewport.tile_width as f32,
                    self.viewport.tile_height as f32,
                    0.0,
                    1.0,
                );
                rpass.draw(0..6, 0..1);
            }
        }
        self.gpu.queue.submit(Some(encoder.finish()));
        Ok(DrawOutcome::Submitted { submissions: 1 })
    }

    fn draw_per_lane_submission(&mut self) -> MosaicResult<DrawOutcome> {
        let mut submissions = 0;
        for lane in 0..self.viewport.stream_count {
            let Some(slot) = self.cache.get(lane) else {
                continue;
            };
            let (bind_group, planar) = self.bind_lane(slot);
            let (x, y) = self.viewport.cell_origin(lane);

            let mut encoder =
                self.gpu
                    .device
                    .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                        label: Some("mosaic_lane_encoder"),
                    });
            {
                let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("mosaic_lane_pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &self.target_view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            // The first lane clears the frame; the rest
                            // accumulate over it.
                            load: if lane == 0 {
                                wgpu::LoadOp::Clear(wgpu::Color::BLACK)
                            } else {
                                wgpu::LoadOp::Load
                            },
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });

                rpass.set_pipeline(if planar {
                    &self.planar_pipeline
                } else {
                    &self.single_pipeline
                });
                rpass.set_bind_group(0, &bind_group, &[]);
                rpass.set_viewport(
                    x as f32,
                    y as f32,
                    self.viewport.tile_width as f32,
                    self.viewport.tile_height as f32,
                    0.0,
                    1.0,
                );
                rpass.draw(0..6, 0..1);
            }
            self.gpu.queue.submit(Some(encoder.finish()));
            submissions += 1;
        }
        Ok(DrawOutcome::Submitted { submissions })
    }

    /// Destroy every cached lane resource and every retained scratch
    /// buffer, then reset the pool. Idempotent.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        for (_, slot) in self.cache.drain() {
            destroy_slot(&slot);
        }
        let tags = std::mem::take(&mut self.scratch_tags);
        for tag in tags {
            if let Err(err) = self.pool.release(&tag, false) {
                warn!(%tag, %err, "scratch release failed during teardown");
            }
        }
        self.pool.teardown();
        self.target.destroy();
        self.torn_down = true;
    }

    fn ensure_slot(&mut self, lane_id: u32, unit: &VisualUnit) {
        let (width, height) = unit.dimensions();
        let reusable = match (self.cache.get(lane_id), unit) {
            (Some(LaneSlot::Single(tex)), VisualUnit::Opaque(_)) => {
                tex.width() == width && tex.height() == height
            }
            (Some(LaneSlot::Planar(group)), VisualUnit::Planar(_) | VisualUnit::Buffers(_)) => {
                group.width == width && group.height == height
            }
            _ => false,
        };
        if reusable {
            return;
        }

        let slot = match unit {
            VisualUnit::Opaque(_) => LaneSlot::Single(texture::create_rgba_texture(
                &self.gpu.device,
                &format!("lane{lane_id}_rgba"),
                width,
                height,
            )),
            VisualUnit::Planar(_) | VisualUnit::Buffers(_) => {
                LaneSlot::Planar(TextureGroup::new(&self.gpu.device, lane_id, width, height))
            }
        };
        if let Some(previous) = self.cache.insert(lane_id, slot) {
            destroy_slot(&previous);
        }
    }
}

impl Drop for LaneCompositor {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn sampler_layout_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

fn texture_layout_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn create_cell_pipeline(
    device: &wgpu::Device,
    label: &str,
    shader: &wgpu::ShaderModule,
    layout: &wgpu::BindGroupLayout,
) -> wgpu::RenderPipeline {
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: "vs_main",
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: "fs_main",
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: wgpu::TextureFormat::Rgba8Unorm,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
    })
}

/// Plane bytes for upload; repacks only when the source stride is padded.
fn packed_plane<'a>(frame: &'a PlanarFrame, index: usize) -> Cow<'a, [u8]> {
    let (width, height) = frame.plane_dimensions(index);
    let stride = frame.plane_strides[index];
    let plane = frame.plane(index);
    if stride == width as usize {
        return Cow::Borrowed(plane);
    }
    let mut packed = Vec::with_capacity((width * height) as usize);
    for row in plane.chunks_exact(stride) {
        packed.extend_from_slice(&row[..width as usize]);
    }
    Cow::Owned(packed)
}

fn upload_unit(
    gpu: &GpuContext,
    pool: &mut BufferPool<Arc<GpuContext>>,
    upload: UploadStrategy,
    lane_id: u32,
    slot: &LaneSlot,
    unit: &VisualUnit,
    scratch_tags: &mut BTreeSet<String>,
) -> MosaicResult<()> {
    // (texture, bytes, width, height, bytes per pixel, plane name)
    let planes: Vec<(&wgpu::Texture, Cow<'_, [u8]>, u32, u32, u32, &str)> = match (slot, unit) {
        (LaneSlot::Single(tex), VisualUnit::Opaque(frame)) => vec![(
            tex,
            Cow::Borrowed(frame.bytes.as_slice()),
            frame.width,
            frame.height,
            4,
            "rgba",
        )],
        (LaneSlot::Planar(group), VisualUnit::Planar(frame)) => (0..3)
            .map(|i| {
                let (tex, w, h) = group.plane(i);
                (tex, packed_plane(frame, i), w, h, 1, PLANE_NAMES[i])
            })
            .collect(),
        (LaneSlot::Planar(group), VisualUnit::Buffers(buffers)) => {
            let data = [&buffers.y, &buffers.u, &buffers.v];
            (0..3)
                .map(|i| {
                    let (tex, w, h) = group.plane(i);
                    (tex, Cow::Borrowed(data[i].as_slice()), w, h, 1, PLANE_NAMES[i])
                })
                .collect()
        }
        _ => {
            return Err(MosaicError::invariant(format!(
                "lane {lane_id} slot shape does not match delivered unit"
            )))
        }
    };

    match upload {
        UploadStrategy::DirectWrite => {
            for (tex, data, width, height, bpp, _) in &planes {
                texture::write_direct(&gpu.queue, tex, data, *width, *height, *bpp);
            }
        }
        UploadStrategy::StagedCopy => {
            let mut encoder = gpu
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("mosaic_staged_upload_encoder"),
                });
            for (tex, data, width, height, bpp, name) in &planes {
                let tag = format!("{lane_id}_{name}");
                let size =
                    texture::aligned_bytes_per_row(width * bpp) as u64 * u64::from(*height);
                // Same tag across frames keeps the same scratch buffer
                // in use; it is only returned to the driver at teardown.
                let scratch = pool.acquire(&tag, size, SCRATCH_USAGE, true)?.clone();
                scratch_tags.insert(tag);
                texture::copy_staged(
                    &gpu.queue,
                    &mut encoder,
                    &scratch,
                    tex,
                    data,
                    *width,
                    *height,
                    *bpp,
                );
            }
            gpu.queue.submit(Some(encoder.finish()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lane_cache_gate() {
        let mut cache: LaneCache<&'static str> = LaneCache::new();
        assert!(!cache.is_complete(4));
        for (lane, slot) in [(0, "a"), (1, "b"), (2, "c")] {
            cache.insert(lane, slot);
        }
        // Three of four lanes populated: the gate stays closed.
        assert!(!cache.is_complete(4));
        cache.insert(3, "d");
        assert!(cache.is_complete(4));
    }

    #[test]
    fn test_lane_cache_insert_returns_replaced() {
        let mut cache: LaneCache<u32> = LaneCache::new();
        assert_eq!(cache.insert(0, 10), None);
        assert_eq!(cache.insert(0, 20), Some(10));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_lane_cache_drain_empties() {
        let mut cache: LaneCache<u32> = LaneCache::new();
        cache.insert(0, 1);
        cache.insert(1, 2);
        let drained: Vec<_> = cache.drain().collect();
        assert_eq!(drained.len(), 2);
        assert!(cache.is_empty());
    }
}

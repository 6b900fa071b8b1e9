use anyhow::Result;
use std::sync::Arc;
use wgpu::{Adapter, Device, Instance, Queue};

use mosaic_core::MosaicResult;

/// The buffer-allocating contract the pool expects from a driver.
///
/// The real driver is [`GpuContext`]; tests substitute a counting fake.
pub trait BufferAllocator {
    type Handle;

    /// Allocate a buffer of `size` bytes with the given usage, or fail with
    /// `ResourceUnavailable`.
    fn allocate(&self, size: u64, usage: wgpu::BufferUsages) -> MosaicResult<Self::Handle>;

    /// Return a buffer's memory to the driver.
    fn deallocate(&self, handle: &Self::Handle);
}

impl<A: BufferAllocator> BufferAllocator for Arc<A> {
    type Handle = A::Handle;

    fn allocate(&self, size: u64, usage: wgpu::BufferUsages) -> MosaicResult<Self::Handle> {
        (**self).allocate(size, usage)
    }

    fn deallocate(&self, handle: &Self::Handle) {
        (**self).deallocate(handle)
    }
}

/// A shared context for all GPU operations.
pub struct GpuContext {
    pub instance: Instance,
    pub adapter: Adapter,
    pub device: Device,
    pub queue: Queue,
}

impl GpuContext {
    /// Initializes WGPU headless, selecting the best available backend
    /// (Metal, Vulkan, DX12, etc.). Adapter and device acquisition are
    /// asynchronous; callers stay `Uninitialized` until this resolves.
    pub async fn init() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None, // Headless rendering
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| anyhow::anyhow!("Failed to find suitable wgpu adapter"))?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Mosaic Headless GPU Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults(),
                },
                None,
            )
            .await?;

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }

    /// Blocking variant of [`GpuContext::init`] for synchronous callers.
    pub fn init_blocking() -> Result<Self> {
        pollster::block_on(Self::init())
    }

    /// Largest square texture dimension the device supports.
    pub fn max_surface_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }
}

impl BufferAllocator for GpuContext {
    type Handle = Arc<wgpu::Buffer>;

    fn allocate(&self, size: u64, usage: wgpu::BufferUsages) -> MosaicResult<Self::Handle> {
        Ok(Arc::new(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: None,
            size,
            usage,
            mapped_at_creation: false,
        })))
    }

    fn deallocate(&self, handle: &Self::Handle) {
        handle.destroy();
    }
}

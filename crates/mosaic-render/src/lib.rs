//! # mosaic-render
//!
//! The Mosaic rendering engine: a headless WGPU context, a keyed buffer
//! pool with at-most-one-writer reuse, per-lane texture caches, the grid
//! compositor, and the animation-frame driver.

pub mod compositor;
pub mod driver;
pub mod gpu;
pub mod pool;
pub mod texture;

pub use compositor::{DrawOutcome, LaneCompositor};
pub use driver::{AnimationDriver, DriverState, DriverStats};
pub use gpu::{BufferAllocator, GpuContext};
pub use pool::{BufferPool, PoolKey, PoolStats};
pub use texture::TextureGroup;

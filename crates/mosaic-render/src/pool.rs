//! Keyed GPU-buffer pool with at-most-one-writer reuse semantics.
//!
//! Buffers sized and typed identically are fungible: a released buffer can
//! serve any later acquire with the same `(size, usage)` key, which avoids
//! per-frame allocation churn for fixed-resolution streaming. In-use buffers
//! are tracked under a caller-supplied tag; acquiring an already-in-use tag
//! returns the same handle, so a lane-plane writer keeps its scratch buffer
//! across frames without round-tripping it through the free state.

use std::collections::HashMap;

use mosaic_core::{MosaicError, MosaicResult};
use serde::Serialize;

use crate::gpu::BufferAllocator;

/// Equivalence class of interchangeable free buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub size: u64,
    pub usage: wgpu::BufferUsages,
}

struct PooledBuffer<H> {
    handle: H,
    size: u64,
    usage: wgpu::BufferUsages,
}

/// Live pool counters. Diagnostic only; reported in the session summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub in_use: usize,
    pub free: usize,
    pub used_bytes: u64,
    pub allocated_bytes: u64,
}

/// Keyed cache of GPU buffer handles with acquire/release reuse.
pub struct BufferPool<A: BufferAllocator> {
    allocator: A,
    free: HashMap<PoolKey, Vec<PooledBuffer<A::Handle>>>,
    in_use: HashMap<String, PooledBuffer<A::Handle>>,
    used_bytes: u64,
    allocated_bytes: u64,
}

impl<A: BufferAllocator> BufferPool<A> {
    pub fn new(allocator: A) -> Self {
        Self {
            allocator,
            free: HashMap::new(),
            in_use: HashMap::new(),
            used_bytes: 0,
            allocated_bytes: 0,
        }
    }

    /// Acquire a buffer for `tag`.
    ///
    /// With `reuse`, a tag that is already in use returns its existing
    /// handle unchanged, and a free buffer matching `(size, usage)` is
    /// preferred over a fresh allocation. Without `reuse` a new buffer is
    /// always allocated; it is still tracked under `tag` so release can
    /// find it.
    pub fn acquire(
        &mut self,
        tag: &str,
        size: u64,
        usage: wgpu::BufferUsages,
        reuse: bool,
    ) -> MosaicResult<&A::Handle> {
        if self.in_use.contains_key(tag) {
            if !reuse {
                return Err(MosaicError::invariant(format!(
                    "buffer tag already in use: {tag}"
                )));
            }
            return Ok(&self.in_use[tag].handle);
        }

        let entry = if reuse {
            match self.pop_free(size, usage) {
                Some(entry) => entry,
                None => self.allocate_new(size, usage)?,
            }
        } else {
            self.allocate_new(size, usage)?
        };

        self.used_bytes += entry.size;
        let slot = self.in_use.entry(tag.to_string()).or_insert(entry);
        Ok(&slot.handle)
    }

    /// Release the buffer held under `tag`.
    ///
    /// With `reuse` the buffer moves to its key's free bucket; otherwise it
    /// is returned to the driver. Releasing an unknown tag is an
    /// `InvariantViolation` and leaves all counters untouched.
    pub fn release(&mut self, tag: &str, reuse: bool) -> MosaicResult<()> {
        let entry = self
            .in_use
            .remove(tag)
            .ok_or_else(|| MosaicError::invariant(format!("unknown buffer released: {tag}")))?;

        self.used_bytes -= entry.size;
        if reuse {
            self.free
                .entry(PoolKey {
                    size: entry.size,
                    usage: entry.usage,
                })
                .or_default()
                .push(entry);
        } else {
            self.allocator.deallocate(&entry.handle);
            self.allocated_bytes -= entry.size;
        }
        Ok(())
    }

    /// Borrow the handle currently held under `tag`, if any.
    pub fn handle(&self, tag: &str) -> Option<&A::Handle> {
        self.in_use.get(tag).map(|entry| &entry.handle)
    }

    /// Destroy every buffer, free and in-use, and reset all counters.
    /// Idempotent.
    pub fn teardown(&mut self) {
        for (_, bucket) in self.free.drain() {
            for entry in &bucket {
                self.allocator.deallocate(&entry.handle);
            }
        }
        for (_, entry) in self.in_use.drain() {
            self.allocator.deallocate(&entry.handle);
        }
        self.used_bytes = 0;
        self.allocated_bytes = 0;
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            in_use: self.in_use.len(),
            free: self.free.values().map(Vec::len).sum(),
            used_bytes: self.used_bytes,
            allocated_bytes: self.allocated_bytes,
        }
    }

    fn pop_free(&mut self, size: u64, usage: wgpu::BufferUsages) -> Option<PooledBuffer<A::Handle>> {
        let key = PoolKey { size, usage };
        let bucket = self.free.get_mut(&key)?;
        let entry = bucket.pop();
        if bucket.is_empty() {
            self.free.remove(&key);
        }
        entry
    }

    fn allocate_new(
        &mut self,
        size: u64,
        usage: wgpu::BufferUsages,
    ) -> MosaicResult<PooledBuffer<A::Handle>> {
        let handle = self.allocator.allocate(size, usage)?;
        self.allocated_bytes += size;
        Ok(PooledBuffer {
            handle,
            size,
            usage,
        })
    }
}

impl<A: BufferAllocator> Drop for BufferPool<A> {
    fn drop(&mut self) {
        self.teardown();
    }
}

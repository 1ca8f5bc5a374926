// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// SharedMemoryManager: per-process handle that creates or attaches a
// segment, initializes the ControlBlock on first-creator, and hands out
// typed views into the three fixed-offset regions (control block, queue
// array, chunk pool). Built on `ShmHandle::acquire` (src/shm.rs) for the
// actual POSIX/Win32 mapping, generalized with the geometry validation
// from iceoryx2's `SharedMemoryCreateError`/`SharedMemoryOpenError`
// (examples/other_examples/.../iceoryx2-cal-.../shared_memory/mod.rs).

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, instrument, warn};

use crate::chunk::{self, ChunkPool};
use crate::channel_queue::{self, ChannelQueue};
use crate::config::SegmentConfig;
use crate::control_block::{ControlBlockRaw, LAYOUT_VERSION};
use crate::error::{IpcError, Result};
use crate::hooks::EventHooks;
use crate::shm::{ShmHandle, ShmOpenMode};
use crate::spin_lock::adaptive_yield_pub;
use crate::wait_set::WaitSet;

fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

fn queues_offset() -> usize {
    align_up(ControlBlockRaw::size(), chunk::CACHE_LINE)
}

fn chunk_pool_offset(cfg: &SegmentConfig) -> usize {
    align_up(
        queues_offset() + channel_queue::queues_region_size(cfg.queue_capacity, cfg.max_subscribers),
        chunk::CACHE_LINE,
    )
}

pub fn total_size(cfg: &SegmentConfig) -> usize {
    chunk_pool_offset(cfg) + chunk::region_size(cfg.chunk_size, cfg.max_chunks)
}

pub(crate) fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Owns the mmap for one process's participation in a segment and hands
/// out typed views (`control()`, `chunk_pool()`, `queue(i)`).
pub struct SharedMemoryManager {
    shm: ShmHandle,
    path: String,
    config: SegmentConfig,
    hooks: Arc<dyn EventHooks>,
}

impl SharedMemoryManager {
    /// Create a new segment. Fails if one already exists at `path`.
    #[instrument(skip(hooks), fields(path = %path))]
    pub fn create(path: &str, config: SegmentConfig, hooks: Arc<dyn EventHooks>) -> Result<Self> {
        config.validate()?;
        let size = total_size(&config);
        let shm = match ShmHandle::acquire(path, size, ShmOpenMode::Create) {
            Ok(h) => h,
            Err(e) => {
                hooks.on_shared_memory_error(path, e.raw_os_error().unwrap_or(-1), &e.to_string());
                return Err(IpcError::ShmError(e));
            }
        };

        unsafe { ControlBlockRaw::init_at(shm.as_mut_ptr(), &config) };
        let mgr = Self {
            shm,
            path: path.to_string(),
            config,
            hooks: hooks.clone(),
        };

        mgr.chunk_pool()?.initialize();
        for i in 0..config.max_subscribers {
            mgr.queue_raw(i, config.queue_capacity)?.initialize(config.queue_capacity);
        }

        mgr.control().initialized.store(1, Ordering::Release);
        debug!(size, "segment created");
        hooks.on_shared_memory_created(path, size as u64);
        Ok(mgr)
    }

    /// Attach to an existing segment. Waits (bounded) for the creator to
    /// finish initializing, then validates geometry against `config`.
    #[instrument(skip(hooks), fields(path = %path))]
    pub fn attach(path: &str, config: SegmentConfig, hooks: Arc<dyn EventHooks>) -> Result<Self> {
        config.validate()?;
        let size = total_size(&config);
        let shm = match ShmHandle::acquire(path, size, ShmOpenMode::Open) {
            Ok(h) => h,
            Err(e) => {
                hooks.on_shared_memory_error(path, e.raw_os_error().unwrap_or(-1), &e.to_string());
                return Err(IpcError::ShmNotFound(path.to_string()));
            }
        };

        let mgr = Self {
            shm,
            path: path.to_string(),
            config,
            hooks: hooks.clone(),
        };

        // Bounded spin + yield for the creator to finish initializing.
        let mut spins = 0u32;
        while mgr.control().initialized.load(Ordering::Acquire) == 0 {
            spins += 1;
            if spins > 10_000 {
                return Err(IpcError::Timeout);
            }
            adaptive_yield_pub(&mut spins);
        }

        let ctrl = mgr.control();
        if ctrl.layout_version != LAYOUT_VERSION {
            return Err(IpcError::ShmVersionMismatch {
                path: path.to_string(),
                expected: LAYOUT_VERSION,
                found: ctrl.layout_version,
            });
        }
        if ctrl.chunk_size as usize != config.chunk_size
            || ctrl.max_chunks != config.max_chunks
            || ctrl.max_subscribers != config.max_subscribers
            || ctrl.queue_capacity != config.queue_capacity
        {
            warn!("geometry mismatch attaching to {path}");
            return Err(IpcError::ShmSizeMismatch {
                path: path.to_string(),
                expected: size,
                found: chunk::chunk_stride(ctrl.chunk_size as usize) * ctrl.max_chunks as usize
                    + queues_offset(),
            });
        }

        debug!(size, "segment attached");
        hooks.on_shared_memory_opened(path, size as u64);
        Ok(mgr)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn config(&self) -> SegmentConfig {
        self.config
    }

    pub fn hooks(&self) -> Arc<dyn EventHooks> {
        self.hooks.clone()
    }

    pub fn control(&self) -> &ControlBlockRaw {
        unsafe { ControlBlockRaw::view(self.shm.as_mut_ptr()) }
    }

    pub fn chunk_pool(&self) -> Result<ChunkPool> {
        let offset = chunk_pool_offset(&self.config);
        let base = unsafe { self.shm.as_mut_ptr().add(offset) };
        let wait_set = WaitSet::open(&format!("{}__pool", self.path))?;
        Ok(unsafe { ChunkPool::new(base, self.config.chunk_size, self.config.max_chunks, wait_set) })
    }

    fn queue_raw(&self, index: u32, capacity: u32) -> Result<ChannelQueue> {
        let stride = channel_queue::queue_stride(capacity);
        let base = unsafe {
            self.shm
                .as_mut_ptr()
                .add(queues_offset())
                .add(index as usize * stride)
        };
        let wait_set = WaitSet::open(&format!("{}__q{index}", self.path))?;
        Ok(unsafe { ChannelQueue::new(base, capacity, wait_set) })
    }

    /// Typed view of subscriber queue `index`. Callers must first validate
    /// `index < max_subscribers`.
    pub fn queue(&self, index: u32) -> Result<ChannelQueue> {
        if index >= self.config.max_subscribers {
            return Err(IpcError::InvalidChunkIndex(index));
        }
        self.queue_raw(index, self.config.queue_capacity)
    }
}

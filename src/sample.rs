// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Sample: RAII handle for a single chunk. Grounded in the
// `ScopedAccess` Drop-unlock idiom (src/scoped_access.rs, now removed)
// and in the `PublisherSample`/`ConsumerSample` naming from
// examples/other_examples/.../horus_core-.../shm_topic.rs. The explicit
// "send path vs receive path" split (see DESIGN.md) uses a dedicated
// consuming method rather than a boolean flag with two meanings.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::chunk::ChunkPool;
use crate::control_block::ControlBlockRaw;
use crate::error::{IpcError, Result};
use crate::shared_memory_manager::SharedMemoryManager;

/// An owning handle to one chunk. Dropping a `Sample` decrements the
/// chunk's reference count and, on the 1→0 transition, returns it to the
/// pool. Moving transfers ownership (this is a plain Rust move); there is
/// no `Clone` — copying a `Sample` would double-release its chunk.
pub struct Sample {
    mgr: Arc<SharedMemoryManager>,
    pool: Arc<ChunkPool>,
    index: u32,
    release_on_drop: bool,
}

impl Sample {
    pub(crate) fn new(mgr: Arc<SharedMemoryManager>, pool: Arc<ChunkPool>, index: u32) -> Self {
        Self {
            mgr,
            pool,
            index,
            release_on_drop: true,
        }
    }

    fn control(&self) -> &ControlBlockRaw {
        self.mgr.control()
    }

    pub fn chunk_index(&self) -> u32 {
        self.index
    }

    /// The channel that produced this chunk (discriminates origin in
    /// multi-producer topologies).
    pub fn channel_id(&self) -> u32 {
        self.pool
            .header(self.index)
            .map(|h| h.owner_channel.load(std::sync::atomic::Ordering::Relaxed))
            .unwrap_or(crate::control_block::INVALID_INDEX)
    }

    pub(crate) fn set_channel_id(&self, channel_id: u32) {
        if let Ok(h) = self.pool.header(self.index) {
            h.owner_channel
                .store(channel_id, std::sync::atomic::Ordering::Relaxed);
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        let ptr = self
            .pool
            .payload(self.index)
            .expect("Sample always holds a valid chunk index");
        unsafe { std::slice::from_raw_parts(ptr, self.pool.chunk_size()) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        let ptr = self
            .pool
            .payload(self.index)
            .expect("Sample always holds a valid chunk index");
        unsafe { std::slice::from_raw_parts_mut(ptr, self.pool.chunk_size()) }
    }

    /// Copy `bytes` into the payload region, bounded by `chunk_size`.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.pool.chunk_size() {
            return Err(IpcError::InvalidArgument(format!(
                "payload of {} bytes exceeds chunk_size {}",
                bytes.len(),
                self.pool.chunk_size()
            )));
        }
        self.as_mut_slice()[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Clear the release-on-drop flag. Used on the producer/send path:
    /// `Publisher::send` has already set `ref_count` to the subscriber
    /// count, so the producer's own share must not be separately
    /// decremented on drop.
    pub fn release_as_sent(mut self) {
        self.release_on_drop = false;
    }

    pub(crate) fn pool(&self) -> &Arc<ChunkPool> {
        &self.pool
    }
}

impl Drop for Sample {
    fn drop(&mut self) {
        if self.release_on_drop {
            self.pool.decrement_ref(self.control(), self.index);
        }
    }
}

impl std::fmt::Debug for Sample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sample")
            .field("chunk_index", &self.index)
            .field("release_on_drop", &self.release_on_drop)
            .finish()
    }
}

/// Thin typed facade over `Sample` for in-place construction of a
/// `Copy` payload type. Core pool/queue/channel types stay
/// byte-oriented; this is the only typed layer.
pub struct TypedSample<T: Copy> {
    sample: Sample,
    _marker: PhantomData<T>,
}

impl<T: Copy> TypedSample<T> {
    pub fn new(sample: Sample) -> Result<Self> {
        if std::mem::size_of::<T>() > sample.pool.chunk_size() {
            return Err(IpcError::InvalidArgument(format!(
                "type of size {} does not fit in chunk_size {}",
                std::mem::size_of::<T>(),
                sample.pool.chunk_size()
            )));
        }
        Ok(Self {
            sample,
            _marker: PhantomData,
        })
    }

    pub fn write(&mut self, value: T) {
        unsafe {
            std::ptr::write_unaligned(self.sample.as_mut_slice().as_mut_ptr() as *mut T, value);
        }
    }

    pub fn read(&self) -> T {
        unsafe { std::ptr::read_unaligned(self.sample.as_slice().as_ptr() as *const T) }
    }

    pub fn into_inner(self) -> Sample {
        self.sample
    }
}

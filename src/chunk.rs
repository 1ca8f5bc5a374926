// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// ChunkHeader + ChunkPool: lock-free CAS-on-head-index LIFO free list.
// Ported from original_source/source/src/ipc/ChunkPoolAllocator.cpp and
// original_source/source/inc/CMemory.hpp's chunk layout, generalized from
// the C++ pointer-indexed pool to Rust atomics over a raw mmap region.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::control_block::{ControlBlockRaw, INVALID_INDEX};
use crate::error::{IpcError, Result};
use crate::wait_set::{WaitSet, FREE_CHUNK_AVAILABLE};

/// Chunk lifecycle states: `Free -> Loaned -> Sent -> Received -> Free`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ChunkState {
    Free = 0,
    Loaned = 1,
    Sent = 2,
    Received = 3,
}

impl ChunkState {
    fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(ChunkState::Free),
            1 => Some(ChunkState::Loaned),
            2 => Some(ChunkState::Sent),
            3 => Some(ChunkState::Received),
            _ => None,
        }
    }
}

/// Fixed-size header prefixing every chunk payload.
#[repr(C)]
pub struct ChunkHeaderRaw {
    pub state: AtomicU32,
    pub ref_count: AtomicU32,
    pub owner_channel: AtomicU32,
    pub next_free_index: AtomicU32,
    pub self_index: u32,
    pub seq: AtomicU64,
    pub timestamp: AtomicU64,
}

impl ChunkHeaderRaw {
    pub const fn header_size() -> usize {
        std::mem::size_of::<ChunkHeaderRaw>()
    }

    fn state(&self) -> ChunkState {
        ChunkState::from_u32(self.state.load(Ordering::Acquire)).unwrap_or(ChunkState::Free)
    }
}

/// Round `n` up to a multiple of `align` (align must be a power of two).
fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

pub const CACHE_LINE: usize = 64;

/// Byte distance between consecutive chunks (header + payload, cache-line aligned).
pub fn chunk_stride(chunk_size: usize) -> usize {
    align_up(ChunkHeaderRaw::header_size() + chunk_size, CACHE_LINE)
}

pub fn region_size(chunk_size: usize, max_chunks: u32) -> usize {
    chunk_stride(chunk_size) * max_chunks as usize
}

/// A non-owning view over the chunk-pool region of a mapped segment.
/// Mirrors `ChunkPoolAllocator` in the original source, minus the
/// pool-local `Initialize` step (done once by `SharedMemoryManager` on
/// creation).
pub struct ChunkPool {
    base: *mut u8,
    chunk_size: usize,
    max_chunks: u32,
    wait_set: WaitSet,
}

unsafe impl Send for ChunkPool {}
unsafe impl Sync for ChunkPool {}

impl ChunkPool {
    /// # Safety
    /// `base` must point to a region of at least `region_size(chunk_size,
    /// max_chunks)` bytes, valid for the lifetime of this `ChunkPool`.
    pub unsafe fn new(base: *mut u8, chunk_size: usize, max_chunks: u32, wait_set: WaitSet) -> Self {
        Self {
            base,
            chunk_size,
            max_chunks,
            wait_set,
        }
    }

    /// Lace the free list in index order and zero every header. Only the
    /// segment creator calls this.
    pub fn initialize(&self) {
        for i in 0..self.max_chunks {
            let header = self.header_at(i);
            header.state.store(ChunkState::Free as u32, Ordering::Relaxed);
            header.ref_count.store(0, Ordering::Relaxed);
            header.owner_channel.store(INVALID_INDEX, Ordering::Relaxed);
            let next = if i + 1 < self.max_chunks {
                i + 1
            } else {
                INVALID_INDEX
            };
            header.next_free_index.store(next, Ordering::Relaxed);
            header.seq.store(0, Ordering::Relaxed);
            header.timestamp.store(0, Ordering::Relaxed);
        }
    }

    fn header_at(&self, index: u32) -> &ChunkHeaderRaw {
        assert!(index < self.max_chunks);
        let stride = chunk_stride(self.chunk_size);
        unsafe { &*(self.base.add(index as usize * stride) as *const ChunkHeaderRaw) }
    }

    pub fn header(&self, index: u32) -> Result<&ChunkHeaderRaw> {
        if index >= self.max_chunks {
            return Err(IpcError::InvalidChunkIndex(index));
        }
        Ok(self.header_at(index))
    }

    /// Pointer to the `chunk_size`-byte payload region following the header.
    pub fn payload(&self, index: u32) -> Result<*mut u8> {
        if index >= self.max_chunks {
            return Err(IpcError::InvalidChunkIndex(index));
        }
        let stride = chunk_stride(self.chunk_size);
        Ok(unsafe {
            self.base
                .add(index as usize * stride)
                .add(ChunkHeaderRaw::header_size())
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn max_chunks(&self) -> u32 {
        self.max_chunks
    }

    /// CAS-pop the free-list head.
    pub fn allocate(&self, control: &ControlBlockRaw) -> Option<u32> {
        loop {
            let head = control.free_list_head.load(Ordering::Acquire);
            if head == INVALID_INDEX {
                return None;
            }
            let header = self.header_at(head);
            let next = header.next_free_index.load(Ordering::Acquire);
            if control
                .free_list_head
                .compare_exchange_weak(head, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                header.state.store(ChunkState::Loaned as u32, Ordering::Release);
                header.ref_count.store(1, Ordering::Release);
                header.next_free_index.store(INVALID_INDEX, Ordering::Release);
                control.allocated_count.fetch_add(1, Ordering::Relaxed);
                control.total_allocations.fetch_add(1, Ordering::Relaxed);
                return Some(head);
            }
        }
    }

    /// CAS-push `index` back onto the free list; signals the pool
    /// wait-set so parked loaners may resume.
    pub fn release(&self, control: &ControlBlockRaw, index: u32) {
        let header = self.header_at(index);
        header.state.store(ChunkState::Free as u32, Ordering::Release);
        header.ref_count.store(0, Ordering::Release);
        loop {
            let head = control.free_list_head.load(Ordering::Acquire);
            header.next_free_index.store(head, Ordering::Release);
            if control
                .free_list_head
                .compare_exchange_weak(head, index, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                control.allocated_count.fetch_sub(1, Ordering::Relaxed);
                control.total_deallocations.fetch_add(1, Ordering::Relaxed);
                self.wait_set.signal(&control.pool_wait_flags, FREE_CHUNK_AVAILABLE);
                return;
            }
        }
    }

    /// Decrement `ref_count`; on the 1->0 transition, release the chunk
    /// back to the pool. Called by `Sample::drop` and `Publisher::send`'s
    /// per-subscriber failure path.
    pub fn decrement_ref(&self, control: &ControlBlockRaw, index: u32) {
        let header = self.header_at(index);
        let prev = header.ref_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev >= 1, "ref_count underflow on chunk {index}");
        if prev == 1 {
            self.release(control, index);
        }
    }

    pub fn wait_for_free_chunk(&self, control: &ControlBlockRaw, timeout_ms: Option<u64>) -> bool {
        self.wait_set
            .wait_for(&control.pool_wait_flags, FREE_CHUNK_AVAILABLE, timeout_ms)
    }

    /// Clear the sticky free-chunk flag before parking, so a stale signal
    /// from an unrelated release doesn't cause an immediate spurious wake.
    pub fn clear_free_chunk_flag(&self, control: &ControlBlockRaw) {
        WaitSet::clear(&control.pool_wait_flags, FREE_CHUNK_AVAILABLE);
    }

    pub fn state_of(&self, index: u32) -> Result<ChunkState> {
        Ok(self.header(index)?.state())
    }

    /// Informational state transition: a publisher has handed the chunk
    /// to at least one subscriber. Monitoring only, does not gate
    /// correctness (ref_count does that).
    pub fn mark_sent(&self, index: u32) {
        if let Ok(h) = self.header(index) {
            h.state.store(ChunkState::Sent as u32, Ordering::Relaxed);
        }
    }

    /// Informational state transition: a subscriber has dequeued the
    /// chunk. Monitoring only.
    pub fn mark_received(&self, index: u32) {
        if let Ok(h) = self.header(index) {
            h.state.store(ChunkState::Received as u32, Ordering::Relaxed);
        }
    }
}

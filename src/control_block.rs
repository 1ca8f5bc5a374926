// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// ControlBlock: the process-agnostic header at the start of every
// segment. Ported from the layout described in
// original_source/source/inc/ipc/SubscriberRegistryOps.hpp (the
// double-buffered SubscriberSnapshot) plus the counters maintained by
// original_source/source/src/ipc/ChunkPoolAllocator.cpp.

use std::sync::atomic::{AtomicU32, AtomicU64};

use crate::config::IpcType;

/// Compile-time cap on registered subscribers. `SegmentConfig::max_subscribers`
/// must not exceed this; validated in `SegmentConfig::validate`.
pub const MAX_SUBSCRIBERS: usize = 64;

pub const LAYOUT_VERSION: u32 = 1;
pub const MAGIC: [u8; 8] = *b"LAPSHMIP";

pub const INVALID_INDEX: u32 = u32::MAX;

/// A double-buffered snapshot of active receiver channel indices. Two of
/// these live in `ControlBlockRaw::snapshots`; `active_snapshot_index`
/// selects which one readers should copy.
#[repr(C)]
pub struct SubscriberSnapshotRaw {
    pub count: u32,
    pub version: u64,
    pub queue_indices: [u32; MAX_SUBSCRIBERS],
}

impl SubscriberSnapshotRaw {
    pub fn zeroed() -> Self {
        Self {
            count: 0,
            version: 0,
            queue_indices: [INVALID_INDEX; MAX_SUBSCRIBERS],
        }
    }
}

/// A plain-data copy of one snapshot, returned to callers that need to
/// iterate it (publishers fanning out, subscriber scanners).
#[derive(Debug, Clone)]
pub struct SubscriberSnapshot {
    pub version: u64,
    pub queue_indices: Vec<u32>,
}

/// The fixed-size header placed at offset 0 of every segment.
///
/// All counters beyond `free_list_head`/`allocated_count` are monitoring
/// aids, used for monitoring and back-pressure hints; they do not gate
/// correctness.
#[repr(C)]
pub struct ControlBlockRaw {
    pub magic: [u8; 8],
    pub layout_version: u32,
    pub ipc_type: u32,
    pub chunk_size: u32,
    pub max_chunks: u32,
    pub max_subscribers: u32,
    pub queue_capacity: u32,
    pub initialized: AtomicU32,

    pub free_list_head: AtomicU32,
    pub allocated_count: AtomicU32,
    pub total_allocations: AtomicU64,
    pub total_deallocations: AtomicU64,

    pub scan_sequence: AtomicU64,
    pub subscriber_count: AtomicU32,
    pub publisher_count: AtomicU32,
    pub next_queue_index: AtomicU32,
    pub next_subscriber_id: AtomicU64,

    /// Bitmask of active publisher slots (MPSC/MPMC topologies); bit 0
    /// doubles as the single-producer-claimed flag in SPMC topologies.
    pub publisher_write_mask: AtomicU32,
    pub publisher_write_seq: AtomicU64,

    /// Free-chunk-available bit lives here; parked loaners wait on it.
    pub pool_wait_flags: AtomicU64,

    pub active_snapshot_index: AtomicU32,
    pub write_index: AtomicU32,
    pub registry_version: AtomicU64,

    pub snapshots: [SubscriberSnapshotRaw; 2],
}

impl ControlBlockRaw {
    pub const fn size() -> usize {
        std::mem::size_of::<ControlBlockRaw>()
    }

    /// Zero-initialize in place and lace geometry/free-list state. Only
    /// the creator calls this, before publishing `initialized`.
    ///
    /// # Safety
    /// `ptr` must point to at least `ControlBlockRaw::size()` writable
    /// bytes, and no other thread/process may observe it yet.
    pub unsafe fn init_at(ptr: *mut u8, cfg: &crate::config::SegmentConfig) {
        let cb = ptr as *mut ControlBlockRaw;
        std::ptr::write_bytes(ptr, 0, Self::size());
        (*cb).magic = MAGIC;
        (*cb).layout_version = LAYOUT_VERSION;
        (*cb).ipc_type = cfg.ipc_type.encode();
        (*cb).chunk_size = cfg.chunk_size as u32;
        (*cb).max_chunks = cfg.max_chunks;
        (*cb).max_subscribers = cfg.max_subscribers;
        (*cb).queue_capacity = cfg.queue_capacity;
        (*cb).free_list_head = AtomicU32::new(0);
        (*cb).snapshots[0] = SubscriberSnapshotRaw::zeroed();
        (*cb).snapshots[1] = SubscriberSnapshotRaw::zeroed();
        (*cb).active_snapshot_index = AtomicU32::new(0);
        (*cb).write_index = AtomicU32::new(1);
    }

    /// View an already-mapped region as a `ControlBlockRaw`.
    ///
    /// # Safety
    /// `ptr` must point to a region at least `ControlBlockRaw::size()`
    /// bytes long, already initialized (by the creator) or about to be.
    pub unsafe fn view<'a>(ptr: *mut u8) -> &'a ControlBlockRaw {
        &*(ptr as *const ControlBlockRaw)
    }

    pub fn ipc_type(&self) -> Option<IpcType> {
        IpcType::decode(self.ipc_type)
    }
}

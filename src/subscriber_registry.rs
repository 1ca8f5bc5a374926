// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Lock-free double-buffered subscriber registry. Ported verbatim (in
// spirit) from original_source/source/inc/ipc/SubscriberRegistryOps.hpp:
// `AllocateQueueIndex`, `GetSubscriberSnapshot`, `RegisterSubscriber`,
// `UnregisterSubscriber`.

use std::sync::atomic::{fence, Ordering};

use crate::control_block::{ControlBlockRaw, SubscriberSnapshot, INVALID_INDEX};

/// Round-robin allocation of a queue slot index for a new subscriber.
pub fn allocate_queue_index(ctrl: &ControlBlockRaw) -> u32 {
    let index = ctrl.next_queue_index.fetch_add(1, Ordering::Relaxed);
    index % ctrl.max_subscribers
}

/// Lock-free read of the currently-active snapshot.
pub fn get_subscriber_snapshot(ctrl: &ControlBlockRaw) -> SubscriberSnapshot {
    let active_idx = ctrl.active_snapshot_index.load(Ordering::Acquire) as usize;
    let snap = &ctrl.snapshots[active_idx];
    let count = snap.count as usize;
    let version = snap.version;
    let queue_indices = snap.queue_indices[..count].to_vec();
    fence(Ordering::Acquire);
    SubscriberSnapshot {
        version,
        queue_indices,
    }
}

/// Register `queue_index` into the write buffer and flip it live.
/// Returns `false` if the registry is full or `queue_index` is already
/// present.
pub fn register_subscriber(ctrl: &ControlBlockRaw, queue_index: u32) -> bool {
    let current_write = ctrl.write_index.load(Ordering::Acquire) as usize;
    let max = ctrl.max_subscribers as usize;

    // SAFETY: snapshots are only ever mutated by the single writer that
    // currently owns `write_index`; readers only ever copy the *other*
    // (active) buffer. Concurrent register/unregister calls serialize
    // through this same write-buffer handoff, matching the C++ original.
    let write_snap = unsafe {
        &mut *(&ctrl.snapshots[current_write] as *const _
            as *mut crate::control_block::SubscriberSnapshotRaw)
    };

    if write_snap.count as usize >= max {
        return false;
    }
    for i in 0..write_snap.count as usize {
        if write_snap.queue_indices[i] == queue_index {
            return false;
        }
    }

    write_snap.queue_indices[write_snap.count as usize] = queue_index;
    write_snap.count += 1;
    write_snap.version += 1;

    fence(Ordering::Release);
    ctrl.active_snapshot_index
        .store(current_write as u32, Ordering::Release);

    let new_write = 1 - current_write;
    ctrl.write_index.store(new_write as u32, Ordering::Release);

    let other = unsafe {
        &mut *(&ctrl.snapshots[new_write] as *const _
            as *mut crate::control_block::SubscriberSnapshotRaw)
    };
    other.count = write_snap.count;
    other.version = write_snap.version;
    other.queue_indices = write_snap.queue_indices;

    ctrl.subscriber_count.fetch_add(1, Ordering::Release);
    ctrl.scan_sequence.fetch_add(1, Ordering::Release);
    true
}

/// Remove `queue_index` from the write buffer (compacting the array) and
/// flip it live. Returns `false` if not found.
pub fn unregister_subscriber(ctrl: &ControlBlockRaw, queue_index: u32) -> bool {
    let current_write = ctrl.write_index.load(Ordering::Acquire) as usize;

    let write_snap = unsafe {
        &mut *(&ctrl.snapshots[current_write] as *const _
            as *mut crate::control_block::SubscriberSnapshotRaw)
    };

    let mut found = false;
    let count = write_snap.count as usize;
    for i in 0..count {
        if write_snap.queue_indices[i] == queue_index {
            for j in i..count - 1 {
                write_snap.queue_indices[j] = write_snap.queue_indices[j + 1];
            }
            write_snap.queue_indices[count - 1] = INVALID_INDEX;
            write_snap.count -= 1;
            write_snap.version += 1;
            found = true;
            break;
        }
    }
    if !found {
        return false;
    }

    fence(Ordering::Release);
    ctrl.active_snapshot_index
        .store(current_write as u32, Ordering::Release);

    let new_write = 1 - current_write;
    ctrl.write_index.store(new_write as u32, Ordering::Release);

    let other = unsafe {
        &mut *(&ctrl.snapshots[new_write] as *const _
            as *mut crate::control_block::SubscriberSnapshotRaw)
    };
    other.count = write_snap.count;
    other.version = write_snap.version;
    other.queue_indices = write_snap.queue_indices;

    ctrl.subscriber_count.fetch_sub(1, Ordering::Release);
    ctrl.scan_sequence.fetch_add(1, Ordering::Release);
    true
}

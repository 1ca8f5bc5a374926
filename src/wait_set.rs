// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// The busy-wait concentration point called for by the design notes: a
// single 64-bit word of event flags, backed by a named inter-process
// condition variable for the actual parking. Generalizes `Waiter` (one
// implicit condition) to an explicit bitmask so pool and per-queue
// wait-sets can share the same plumbing.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::waiter::Waiter;

/// Bit assigned to "a chunk was released back to the pool".
pub const FREE_CHUNK_AVAILABLE: u64 = 1 << 0;
/// Bit assigned to "a consumer advanced head, making room in a queue".
pub const ROOM_AVAILABLE: u64 = 1 << 1;
/// Bit assigned to "a producer advanced tail, queue has data".
pub const DATA_AVAILABLE: u64 = 1 << 2;

/// Flags word plus a named condition variable used to park blocking
/// waiters. The flags word itself lives in shared memory (embedded in
/// `ControlBlockRaw` or a per-queue header); the `Waiter` is opened
/// per-process against a derived name so any process sharing the segment
/// can wake any other.
pub struct WaitSet {
    waiter: Waiter,
}

impl WaitSet {
    pub fn open(name: &str) -> io::Result<Self> {
        Ok(Self {
            waiter: Waiter::open(name)?,
        })
    }

    pub fn clear_storage(name: &str) {
        Waiter::clear_storage(name);
    }

    /// Set `mask` bits in `flags` (release) and wake every parked waiter.
    pub fn signal(&self, flags: &AtomicU64, mask: u64) {
        flags.fetch_or(mask, Ordering::Release);
        let _ = self.waiter.broadcast();
    }

    /// Clear `mask` bits in `flags`.
    pub fn clear(flags: &AtomicU64, mask: u64) {
        flags.fetch_and(!mask, Ordering::Release);
    }

    /// True if any bit in `mask` is currently set.
    pub fn poll(flags: &AtomicU64, mask: u64) -> bool {
        flags.load(Ordering::Acquire) & mask != 0
    }

    /// Park until any bit in `mask` is set or `timeout_ms` elapses.
    /// `None` blocks indefinitely. Returns `true` if woken by a signal
    /// (bit observed set), `false` on timeout.
    pub fn wait_for(&self, flags: &AtomicU64, mask: u64, timeout_ms: Option<u64>) -> bool {
        self.waiter
            .wait_if(|| flags.load(Ordering::Acquire) & mask == 0, timeout_ms)
            .unwrap_or(false)
    }
}

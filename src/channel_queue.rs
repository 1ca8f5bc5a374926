// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// ChannelQueue: fixed-capacity ring buffer of (chunk_index, seq) slots,
// one per registered subscriber slot. The claim-slot CAS idiom is
// grounded in channel.rs's (now removed) `RingSlot`/`send` claim loop;
// head/tail are tracked mod capacity rather than as monotonic counters
// packed with an epoch, unlike that file's `rc` field.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::config::QueueFullPolicy;
use crate::error::{IpcError, Result};
use crate::wait_set::{WaitSet, DATA_AVAILABLE, ROOM_AVAILABLE};

#[repr(C)]
struct QueueSlotRaw {
    chunk_index: AtomicU32,
    seq: AtomicU32,
}

/// Fixed header placed at the start of each subscriber's queue region,
/// immediately followed by `capacity` `QueueSlotRaw` entries.
#[repr(C)]
pub struct QueueHeaderRaw {
    pub head: AtomicU32,
    pub tail: AtomicU32,
    pub capacity: u32,
    pub active: AtomicU32,
    pub subscriber_id: AtomicU64,
    pub queue_full_policy: AtomicU32,
    pub empty_policy: AtomicU32,
    pub stmin_ns: AtomicU64,
    pub last_send_ns: AtomicU64,
    pub overrun_count: AtomicU64,
    pub wait_flags: AtomicU64,
}

impl QueueHeaderRaw {
    pub const fn header_size() -> usize {
        std::mem::size_of::<QueueHeaderRaw>()
    }
}

fn slot_region_size(capacity: u32) -> usize {
    capacity as usize * std::mem::size_of::<QueueSlotRaw>()
}

pub fn queue_stride(capacity: u32) -> usize {
    let raw = QueueHeaderRaw::header_size() + slot_region_size(capacity);
    (raw + crate::chunk::CACHE_LINE - 1) & !(crate::chunk::CACHE_LINE - 1)
}

pub fn queues_region_size(capacity: u32, max_subscribers: u32) -> usize {
    queue_stride(capacity) * max_subscribers as usize
}

/// Result of `ChannelQueue::enqueue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The message was written. `evicted` is the `(chunk_index, seq)` of
    /// the slot `Overwrite` clobbered to make room, if any.
    Enqueued { evicted: Option<(u32, u32)> },
    /// The message was dropped (`QueueFullPolicy::Drop`, queue full).
    Dropped,
}

/// A non-owning view over one subscriber's ring buffer.
pub struct ChannelQueue {
    header: *mut QueueHeaderRaw,
    slots: *mut QueueSlotRaw,
    capacity: u32,
    wait_set: WaitSet,
}

unsafe impl Send for ChannelQueue {}
unsafe impl Sync for ChannelQueue {}

impl ChannelQueue {
    /// # Safety
    /// `base` must point to at least `queue_stride(capacity)` writable
    /// bytes reserved exclusively for this queue slot.
    pub unsafe fn new(base: *mut u8, capacity: u32, wait_set: WaitSet) -> Self {
        let header = base as *mut QueueHeaderRaw;
        let slots = base.add(QueueHeaderRaw::header_size()) as *mut QueueSlotRaw;
        Self {
            header,
            slots,
            capacity,
            wait_set,
        }
    }

    fn header(&self) -> &QueueHeaderRaw {
        unsafe { &*self.header }
    }

    fn slot(&self, index: u32) -> &QueueSlotRaw {
        assert!(index < self.capacity);
        unsafe { &*self.slots.add(index as usize) }
    }

    /// Zero the header and mark the slot free. Called by
    /// `SharedMemoryManager` at creation for every subscriber slot.
    pub fn initialize(&self, capacity: u32) {
        unsafe { std::ptr::write(self.header, QueueHeaderRaw {
            head: AtomicU32::new(0),
            tail: AtomicU32::new(0),
            capacity,
            active: AtomicU32::new(0),
            subscriber_id: AtomicU64::new(0),
            queue_full_policy: AtomicU32::new(QueueFullPolicy::Drop.encode()),
            empty_policy: AtomicU32::new(0),
            stmin_ns: AtomicU64::new(0),
            last_send_ns: AtomicU64::new(0),
            overrun_count: AtomicU64::new(0),
            wait_flags: AtomicU64::new(0),
        }) };
        for i in 0..capacity {
            let s = self.slot(i);
            s.chunk_index.store(crate::control_block::INVALID_INDEX, Ordering::Relaxed);
            s.seq.store(0, Ordering::Relaxed);
        }
    }

    pub fn is_active(&self) -> bool {
        self.header().active.load(Ordering::Acquire) != 0
    }

    /// CAS-claim this (currently-inactive) slot for a new subscriber.
    pub fn try_activate(&self) -> bool {
        self.header()
            .active
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn deactivate(&self) {
        self.header().active.store(0, Ordering::Release);
    }

    pub fn set_subscriber_id(&self, id: u64) {
        self.header().subscriber_id.store(id, Ordering::Relaxed);
    }

    pub fn subscriber_id(&self) -> u64 {
        self.header().subscriber_id.load(Ordering::Relaxed)
    }

    pub fn set_queue_full_policy(&self, p: QueueFullPolicy) {
        self.header().queue_full_policy.store(p.encode(), Ordering::Relaxed);
    }

    pub fn queue_full_policy(&self) -> QueueFullPolicy {
        QueueFullPolicy::decode(self.header().queue_full_policy.load(Ordering::Relaxed))
    }

    pub fn set_empty_policy(&self, p: crate::config::EmptyPolicy) {
        self.header().empty_policy.store(p.encode(), Ordering::Relaxed);
    }

    pub fn empty_policy(&self) -> crate::config::EmptyPolicy {
        crate::config::EmptyPolicy::decode(self.header().empty_policy.load(Ordering::Relaxed))
    }

    pub fn set_stmin_ns(&self, ns: u64) {
        self.header().stmin_ns.store(ns, Ordering::Relaxed);
    }

    pub fn overrun_count(&self) -> u64 {
        self.header().overrun_count.load(Ordering::Relaxed)
    }

    /// Clear the sticky room-available flag before parking on a full queue.
    pub fn clear_room_flag(&self) {
        WaitSet::clear(&self.header().wait_flags, ROOM_AVAILABLE);
    }

    /// Clear the sticky data-available flag before parking on an empty queue.
    pub fn clear_data_flag(&self) {
        WaitSet::clear(&self.header().wait_flags, DATA_AVAILABLE);
    }

    pub fn depth(&self) -> u32 {
        let head = self.header().head.load(Ordering::Acquire);
        let tail = self.header().tail.load(Ordering::Acquire);
        tail.wrapping_sub(head) % self.capacity
    }

    /// STmin gate: returns `true` if a send to this queue right now would
    /// violate the configured minimum inter-send interval.
    pub fn stmin_blocks(&self, now_ns: u64) -> bool {
        let stmin = self.header().stmin_ns.load(Ordering::Relaxed);
        if stmin == 0 {
            return false;
        }
        let last = self.header().last_send_ns.load(Ordering::Relaxed);
        now_ns.saturating_sub(last) < stmin
    }

    fn record_send(&self, now_ns: u64) {
        self.header().last_send_ns.store(now_ns, Ordering::Relaxed);
    }

    /// Attempt to enqueue `chunk_index` under the queue's configured
    /// `QueueFullPolicy`. Returns `Ok(EnqueueOutcome::Enqueued { evicted })`
    /// if the slot was written, where `evicted` carries the
    /// `(chunk_index, seq)` of whatever `Overwrite` clobbered to make
    /// room — the caller must decrement that chunk's ref_count, the same
    /// as it would for a dropped message. Returns
    /// `Ok(EnqueueOutcome::Dropped)` if the message was dropped without
    /// error (caller must still decrement `chunk_index`'s ref_count).
    /// `Err` for `Error`-surfacing policies or the already-consumed
    /// `Wait`/`Block` timeout case.
    pub fn enqueue(&self, chunk_index: u32, seq: u32, now_ns: u64) -> Result<EnqueueOutcome> {
        let mut evicted = None;
        loop {
            let tail = self.header().tail.load(Ordering::Relaxed);
            let next_tail = (tail + 1) % self.capacity;
            let head = self.header().head.load(Ordering::Acquire);
            if next_tail != head {
                let slot = self.slot(tail);
                slot.chunk_index.store(chunk_index, Ordering::Relaxed);
                slot.seq.store(seq, Ordering::Relaxed);
                self.header().tail.store(next_tail, Ordering::Release);
                self.record_send(now_ns);
                self.wait_set.signal(&self.header().wait_flags, DATA_AVAILABLE);
                return Ok(EnqueueOutcome::Enqueued { evicted });
            }

            match self.queue_full_policy() {
                QueueFullPolicy::Drop => {
                    self.header().overrun_count.fetch_add(1, Ordering::Relaxed);
                    return Ok(EnqueueOutcome::Dropped);
                }
                QueueFullPolicy::Overwrite => {
                    // Advance head past the oldest entry, carrying its
                    // (chunk_index, seq) back to the caller so its
                    // ref-share gets reclaimed instead of leaked.
                    let head_slot = self.slot(head);
                    let evicted_chunk = head_slot.chunk_index.load(Ordering::Relaxed);
                    let evicted_seq = head_slot.seq.load(Ordering::Relaxed);
                    let new_head = (head + 1) % self.capacity;
                    if self
                        .header()
                        .head
                        .compare_exchange(head, new_head, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        self.header().overrun_count.fetch_add(1, Ordering::Relaxed);
                        self.wait_set.signal(&self.header().wait_flags, ROOM_AVAILABLE);
                        evicted = Some((evicted_chunk, evicted_seq));
                        continue;
                    }
                    continue;
                }
                QueueFullPolicy::Wait => {
                    self.clear_room_flag();
                    if !self.wait_set.wait_for(
                        &self.header().wait_flags,
                        ROOM_AVAILABLE,
                        Some(crate::config::DEFAULT_WAIT_TIMEOUT_MS),
                    ) {
                        return Err(IpcError::QueueFull);
                    }
                    continue;
                }
                QueueFullPolicy::Block => {
                    self.clear_room_flag();
                    if !self.wait_set.wait_for(
                        &self.header().wait_flags,
                        ROOM_AVAILABLE,
                        Some(crate::config::DEFAULT_BLOCK_TIMEOUT_MS),
                    ) {
                        return Err(IpcError::Timeout);
                    }
                    continue;
                }
            }
        }
    }

    /// Dequeue under `policy`. Returns the popped `(chunk_index, seq)`.
    pub fn dequeue(&self, policy: crate::config::EmptyPolicy, timeout_ms: Option<u64>) -> Result<Option<(u32, u32)>> {
        loop {
            let head = self.header().head.load(Ordering::Relaxed);
            let tail = self.header().tail.load(Ordering::Acquire);
            if head != tail {
                let slot = self.slot(head);
                let chunk_index = slot.chunk_index.load(Ordering::Relaxed);
                let seq = slot.seq.load(Ordering::Relaxed);
                let new_head = (head + 1) % self.capacity;
                self.header().head.store(new_head, Ordering::Release);
                self.wait_set.signal(&self.header().wait_flags, ROOM_AVAILABLE);
                return Ok(Some((chunk_index, seq)));
            }

            match policy {
                crate::config::EmptyPolicy::Skip => return Ok(None),
                crate::config::EmptyPolicy::Error => return Err(IpcError::QueueEmpty),
                crate::config::EmptyPolicy::Wait => {
                    self.clear_data_flag();
                    let bound = timeout_ms.unwrap_or(crate::config::DEFAULT_WAIT_TIMEOUT_MS);
                    if !self
                        .wait_set
                        .wait_for(&self.header().wait_flags, DATA_AVAILABLE, Some(bound))
                    {
                        return Ok(None);
                    }
                    continue;
                }
                crate::config::EmptyPolicy::Block => {
                    self.clear_data_flag();
                    let bound = timeout_ms.unwrap_or(crate::config::DEFAULT_BLOCK_TIMEOUT_MS);
                    if !self
                        .wait_set
                        .wait_for(&self.header().wait_flags, DATA_AVAILABLE, Some(bound))
                    {
                        return Err(IpcError::Timeout);
                    }
                    continue;
                }
            }
        }
    }
}

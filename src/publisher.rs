// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{instrument, trace, warn};

use crate::channel_queue::EnqueueOutcome;
use crate::chunk::ChunkPool;
use crate::config::{IpcType, LoanPolicy, PublisherConfig, QueueFullPolicy, SegmentConfig};
use crate::control_block::ControlBlockRaw;
use crate::error::{IpcError, Result};
use crate::hooks::EventHooks;
use crate::sample::Sample;
use crate::shared_memory_manager::{now_ns, SharedMemoryManager};
use crate::subscriber_registry::get_subscriber_snapshot;

const MAX_PUBLISHER_SLOTS: u32 = 32;

/// A single producer's handle onto a topic. Loans a chunk, fills it, and
/// hands it to every currently-registered subscriber.
pub struct Publisher {
    mgr: Arc<SharedMemoryManager>,
    pool: Arc<ChunkPool>,
    hooks: Arc<dyn EventHooks>,
    config: PublisherConfig,
    path: String,
    channel_id: u32,
    send_seq: std::sync::atomic::AtomicU64,
}

impl Publisher {
    /// Create (or attach to) the segment at `path` and claim a producer
    /// slot. For `IpcType::Spmc` only one `Publisher` may ever claim the
    /// segment; `Mpsc`/`Mpmc` allow up to `MAX_PUBLISHER_SLOTS` concurrent
    /// producers, each assigned a distinct `channel_id`.
    #[instrument(skip(hooks), fields(path = %path))]
    pub fn create(
        path: &str,
        segment_config: SegmentConfig,
        publisher_config: PublisherConfig,
        hooks: Arc<dyn EventHooks>,
    ) -> Result<Self> {
        let mgr = match SharedMemoryManager::create(path, segment_config, hooks.clone()) {
            Ok(m) => m,
            Err(IpcError::ShmError(_)) => {
                SharedMemoryManager::attach(path, segment_config, hooks.clone())?
            }
            Err(e) => return Err(e),
        };

        let channel_id = claim_producer_slot(mgr.control(), segment_config.ipc_type)?;
        mgr.control().publisher_count.fetch_add(1, Ordering::Relaxed);

        let pool = Arc::new(mgr.chunk_pool()?);
        let publisher = Self {
            mgr: Arc::new(mgr),
            pool,
            hooks,
            config: publisher_config,
            path: path.to_string(),
            channel_id,
            send_seq: std::sync::atomic::AtomicU64::new(0),
        };
        publisher.set_queue_full_policy(publisher_config.default_queue_full_policy)?;
        Ok(publisher)
    }

    pub fn channel_id(&self) -> u32 {
        self.channel_id
    }

    fn control(&self) -> &ControlBlockRaw {
        self.mgr.control()
    }

    /// Borrow a chunk from the pool, governed by `PublisherConfig::loan_policy`.
    #[instrument(skip(self), fields(path = %self.path))]
    pub fn loan(&self) -> Result<Sample> {
        loop {
            if let Some(index) = self.pool.allocate(self.control()) {
                let sample = Sample::new(self.mgr.clone(), self.pool.clone(), index);
                sample.set_channel_id(self.channel_id);
                return Ok(sample);
            }

            let allocated = self.control().allocated_count.load(Ordering::Relaxed);
            let max_chunks = self.pool.max_chunks();
            self.hooks.on_chunk_pool_exhausted(&self.path, max_chunks);

            match self.config.loan_policy {
                LoanPolicy::Error => {
                    self.hooks
                        .on_loan_failed(&self.path, LoanPolicy::Error, allocated, max_chunks);
                    return Err(IpcError::ChunkPoolExhausted {
                        allocated,
                        max_chunks,
                    });
                }
                LoanPolicy::Wait => {
                    self.pool.clear_free_chunk_flag(self.control());
                    if !self.pool.wait_for_free_chunk(
                        self.control(),
                        Some(crate::config::DEFAULT_WAIT_TIMEOUT_MS),
                    ) {
                        self.hooks
                            .on_loan_failed(&self.path, LoanPolicy::Wait, allocated, max_chunks);
                        return Err(IpcError::ChunkPoolExhausted {
                            allocated,
                            max_chunks,
                        });
                    }
                }
                LoanPolicy::Block => {
                    self.pool.clear_free_chunk_flag(self.control());
                    if !self.pool.wait_for_free_chunk(
                        self.control(),
                        Some(crate::config::DEFAULT_BLOCK_TIMEOUT_MS),
                    ) {
                        self.hooks
                            .on_loan_failed(&self.path, LoanPolicy::Block, allocated, max_chunks);
                        return Err(IpcError::Timeout);
                    }
                }
            }
        }
    }

    /// Loan a chunk, fill it via `writer`, and send it in one step.
    pub fn publish(&self, writer: impl FnOnce(&mut [u8]) -> usize) -> Result<()> {
        let mut sample = self.loan()?;
        let n = writer(sample.as_mut_slice());
        debug_assert!(n <= self.pool.chunk_size());
        self.send(sample)
    }

    /// Fan a loaned, filled `sample` out to every registered subscriber.
    ///
    /// Sets `ref_count` to the subscriber snapshot count before iterating
    /// (the canonical resolution for the snapshot-vs-fan-out race: a
    /// subscriber that disconnects mid-fan-out is simply not found and its
    /// share is reclaimed immediately rather than ever handed out).
    #[instrument(skip(self, sample), fields(path = %self.path))]
    pub fn send(&self, sample: Sample) -> Result<()> {
        let index = sample.chunk_index();
        let snapshot = get_subscriber_snapshot(self.control());
        let count = snapshot.queue_indices.len() as u32;
        let seq = self.send_seq.fetch_add(1, Ordering::Relaxed);
        let now = now_ns();

        if count == 0 {
            sample.release_as_sent();
            self.pool.decrement_ref(self.control(), index);
            return Ok(());
        }

        if let Ok(h) = self.pool.header(index) {
            h.ref_count.store(count, Ordering::Release);
        }
        self.pool.mark_sent(index);

        for queue_index in &snapshot.queue_indices {
            let queue = match self.mgr.queue(*queue_index) {
                Ok(q) => q,
                Err(_) => {
                    self.pool.decrement_ref(self.control(), index);
                    continue;
                }
            };
            if !queue.is_active() {
                self.pool.decrement_ref(self.control(), index);
                continue;
            }

            if queue.stmin_blocks(now) {
                trace!(subscriber = queue.subscriber_id(), "stmin limited, skipping send");
                self.pool.decrement_ref(self.control(), index);
                continue;
            }

            match queue.enqueue(index, seq, now) {
                Ok(EnqueueOutcome::Enqueued { evicted }) => {
                    self.hooks.on_message_sent(&self.path, index, count);
                    if let Some((evicted_index, _evicted_seq)) = evicted {
                        self.hooks.on_queue_overrun(
                            &self.path,
                            queue.subscriber_id(),
                            queue.overrun_count(),
                        );
                        self.pool.decrement_ref(self.control(), evicted_index);
                    }
                }
                Ok(EnqueueOutcome::Dropped) => {
                    self.hooks
                        .on_queue_full(&self.path, queue.subscriber_id(), queue.queue_full_policy());
                    self.hooks.on_queue_overrun(
                        &self.path,
                        queue.subscriber_id(),
                        queue.overrun_count(),
                    );
                    self.pool.decrement_ref(self.control(), index);
                }
                Err(e) => {
                    warn!(error = %e, "enqueue failed, reclaiming share");
                    self.pool.decrement_ref(self.control(), index);
                }
            }
        }

        sample.release_as_sent();

        let allocated = self.control().allocated_count.load(Ordering::Relaxed);
        let max_chunks = self.pool.max_chunks();
        self.hooks.on_chunk_pool_stats(
            &self.path,
            allocated,
            max_chunks,
            allocated as f32 / max_chunks as f32,
        );
        Ok(())
    }

    /// Override `QueueFullPolicy` for every currently-registered
    /// subscriber's queue (per-queue policy otherwise sticks at whatever
    /// the subscriber configured for itself).
    pub fn set_queue_full_policy(&self, policy: QueueFullPolicy) -> Result<()> {
        let snapshot = get_subscriber_snapshot(self.control());
        for queue_index in snapshot.queue_indices {
            self.mgr.queue(queue_index)?.set_queue_full_policy(policy);
        }
        Ok(())
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        release_producer_slot(self.control(), self.channel_id);
        self.control().publisher_count.fetch_sub(1, Ordering::Relaxed);
    }
}

fn claim_producer_slot(ctrl: &ControlBlockRaw, ipc_type: IpcType) -> Result<u32> {
    if !ipc_type.allows_multi_producer() {
        return ctrl
            .publisher_write_mask
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| 0)
            .map_err(|_| IpcError::InvalidState);
    }

    loop {
        let mask = ctrl.publisher_write_mask.load(Ordering::Acquire);
        let free_bit = (0..MAX_PUBLISHER_SLOTS).find(|b| mask & (1 << b) == 0);
        let bit = match free_bit {
            Some(b) => b,
            None => return Err(IpcError::ResourceExhausted("no free publisher slot".into())),
        };
        let new_mask = mask | (1 << bit);
        if ctrl
            .publisher_write_mask
            .compare_exchange(mask, new_mask, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            ctrl.publisher_write_seq.fetch_add(1, Ordering::Release);
            return Ok(bit);
        }
    }
}

fn release_producer_slot(ctrl: &ControlBlockRaw, channel_id: u32) {
    ctrl.publisher_write_mask
        .fetch_and(!(1 << channel_id), Ordering::AcqRel);
}

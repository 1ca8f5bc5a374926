// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, instrument};

use crate::chunk::ChunkPool;
use crate::config::{EmptyPolicy, SegmentConfig, SubscriberConfig};
use crate::control_block::ControlBlockRaw;
use crate::error::{IpcError, Result};
use crate::hooks::EventHooks;
use crate::sample::Sample;
use crate::shared_memory_manager::SharedMemoryManager;
use crate::subscriber_registry::{allocate_queue_index, register_subscriber, unregister_subscriber};

const ALLOCATE_ATTEMPTS_LIMIT: u32 = 256;

/// A single consumer's handle onto a topic. Owns one slot in the
/// segment's fixed-size queue array for the lifetime of the connection.
pub struct Subscriber {
    mgr: Arc<SharedMemoryManager>,
    pool: Arc<ChunkPool>,
    hooks: Arc<dyn EventHooks>,
    config: SubscriberConfig,
    path: String,
    queue_index: u32,
    subscriber_id: u64,
    connected: AtomicBool,
    scanner: std::sync::Mutex<Option<ScannerHandle>>,
}

struct ScannerHandle {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Subscriber {
    /// Attach to the segment at `path` (creating it if this is the first
    /// participant) and claim a free queue slot.
    #[instrument(skip(hooks), fields(path = %path))]
    pub fn create(
        path: &str,
        segment_config: SegmentConfig,
        subscriber_config: SubscriberConfig,
        hooks: Arc<dyn EventHooks>,
    ) -> Result<Self> {
        let mgr = match SharedMemoryManager::create(path, segment_config, hooks.clone()) {
            Ok(m) => m,
            Err(IpcError::ShmError(_)) => {
                SharedMemoryManager::attach(path, segment_config, hooks.clone())?
            }
            Err(e) => return Err(e),
        };

        let mut claimed = None;
        for _ in 0..ALLOCATE_ATTEMPTS_LIMIT {
            let candidate = allocate_queue_index(mgr.control());
            let queue = mgr.queue(candidate)?;
            if queue.try_activate() {
                claimed = Some(candidate);
                break;
            }
        }
        let queue_index = claimed.ok_or_else(|| {
            IpcError::ResourceExhausted("no free subscriber slot".into())
        })?;

        let subscriber_id = mgr.control().next_subscriber_id.fetch_add(1, Ordering::Relaxed) + 1;
        let queue = mgr.queue(queue_index)?;
        queue.set_subscriber_id(subscriber_id);
        queue.set_empty_policy(subscriber_config.empty_policy);
        queue.set_stmin_ns(subscriber_config.stmin_ns);

        if !register_subscriber(mgr.control(), queue_index) {
            queue.deactivate();
            return Err(IpcError::ResourceExhausted(
                "subscriber registry full".into(),
            ));
        }

        let pool = Arc::new(mgr.chunk_pool()?);
        debug!(subscriber_id, queue_index, "subscriber connected");
        Ok(Self {
            mgr: Arc::new(mgr),
            pool,
            hooks,
            config: subscriber_config,
            path: path.to_string(),
            queue_index,
            subscriber_id,
            connected: AtomicBool::new(true),
            scanner: std::sync::Mutex::new(None),
        })
    }

    pub fn subscriber_id(&self) -> u64 {
        self.subscriber_id
    }

    fn control(&self) -> &ControlBlockRaw {
        self.mgr.control()
    }

    fn queue(&self) -> Result<crate::channel_queue::ChannelQueue> {
        self.mgr.queue(self.queue_index)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Re-affirm this subscriber's presence in the registry. Idempotent
    /// and safe to call repeatedly: `create()` already registers the
    /// claimed slot, so the common call is a no-op
    /// (`register_subscriber` returns `false` for an already-present
    /// `queue_index`, which this ignores); it exists for callers that
    /// want to defend against a registry entry lost to a race with
    /// concurrent register/unregister churn on other slots.
    pub fn connect(&self) -> Result<()> {
        register_subscriber(self.control(), self.queue_index);
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    /// Pop the next message under the configured (or overridden) empty
    /// policy. `Ok(None)` means "nothing available" under a
    /// non-blocking/timed-out policy; it is not an error.
    #[instrument(skip(self), fields(path = %self.path))]
    pub fn receive(&self) -> Result<Option<Sample>> {
        self.receive_with_policy(self.config.empty_policy, None)
    }

    pub fn receive_with_timeout(&self, timeout: Duration) -> Result<Option<Sample>> {
        self.receive_with_policy(EmptyPolicy::Wait, Some(timeout.as_millis() as u64))
    }

    fn receive_with_policy(
        &self,
        policy: EmptyPolicy,
        timeout_ms: Option<u64>,
    ) -> Result<Option<Sample>> {
        let queue = self.queue()?;
        match queue.dequeue(policy, timeout_ms) {
            Ok(Some((chunk_index, _seq))) => {
                self.pool.mark_received(chunk_index);
                self.hooks.on_message_received(&self.path, chunk_index);
                Ok(Some(Sample::new(self.mgr.clone(), self.pool.clone(), chunk_index)))
            }
            Ok(None) => {
                if policy == EmptyPolicy::Wait {
                    self.hooks.on_receive_timeout(
                        &self.path,
                        timeout_ms.unwrap_or(crate::config::DEFAULT_WAIT_TIMEOUT_MS) * 1_000_000,
                    );
                }
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub fn overrun_count(&self) -> Result<u64> {
        Ok(self.queue()?.overrun_count())
    }

    pub fn pending_count(&self) -> Result<u32> {
        Ok(self.queue()?.depth())
    }

    /// Start a background thread that watches `scan_sequence` for
    /// topology changes (new/departed publishers in multi-producer
    /// configurations) and invokes `on_topology_changed` after each
    /// observed bump. No-op if already running.
    pub fn start_scanner(self: &Arc<Self>, poll_interval: Duration) {
        let mut guard = self.scanner.lock().unwrap();
        if guard.is_some() {
            return;
        }
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = stop.clone();
        let this = self.clone();
        let handle = std::thread::spawn(move || {
            let mut last_seen = this.control().scan_sequence.load(Ordering::Acquire);
            while !stop_clone.load(Ordering::Relaxed) {
                std::thread::sleep(poll_interval);
                let current = this.control().scan_sequence.load(Ordering::Acquire);
                if current != last_seen {
                    debug!(
                        subscriber_id = this.subscriber_id,
                        current, "topology change observed"
                    );
                    last_seen = current;
                }
            }
        });
        *guard = Some(ScannerHandle {
            stop,
            handle,
        });
    }

    fn stop_scanner(&self) {
        if let Some(s) = self.scanner.lock().unwrap().take() {
            s.stop.store(true, Ordering::Relaxed);
            let _ = s.handle.join();
        }
    }

    /// Drain and discard any messages still queued, unregister from the
    /// registry, and release the slot. Idempotent; also run on `Drop`.
    #[instrument(skip(self), fields(path = %self.path))]
    pub fn disconnect(&self) {
        if !self.connected.swap(false, Ordering::AcqRel) {
            return;
        }
        self.stop_scanner();

        if let Ok(queue) = self.queue() {
            while let Ok(Some((chunk_index, _))) = queue.dequeue(EmptyPolicy::Skip, None) {
                self.pool.decrement_ref(self.control(), chunk_index);
            }
            unregister_subscriber(self.control(), self.queue_index);
            queue.deactivate();
        }
        debug!(subscriber_id = self.subscriber_id, "subscriber disconnected");
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.disconnect();
    }
}

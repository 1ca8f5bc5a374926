// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Event hook trait, translated from the virtual-dispatch
// `IPCEventHooks`/`NullEventHooks` pair in
// original_source/source/inc/ipc/IPCEventHooks.hpp into a Rust trait
// object with default no-op methods. Implementations must not allocate
// on the fast paths.

use crate::config::{LoanPolicy, QueueFullPolicy};

/// Callback interface for IPC lifecycle and back-pressure events. All
/// methods default to no-ops; override only the ones you care about.
/// Invoked synchronously on the caller's thread — keep implementations
/// cheap and non-blocking.
pub trait EventHooks: Send + Sync {
    // -- Publisher events ---------------------------------------------
    fn on_loan_failed(&self, _topic: &str, _policy: LoanPolicy, _allocated: u32, _max_chunks: u32) {}
    fn on_chunk_pool_exhausted(&self, _topic: &str, _total_chunks: u32) {}
    fn on_queue_full(&self, _topic: &str, _subscriber_id: u64, _policy: QueueFullPolicy) {}
    fn on_message_sent(&self, _topic: &str, _chunk_index: u32, _subscriber_count: u32) {}
    fn on_loan_count_warning(&self, _topic: &str, _current_count: u32, _threshold: u32) {}

    // -- Subscriber events ----------------------------------------------
    fn on_receive_timeout(&self, _topic: &str, _timeout_ns: u64) {}
    fn on_queue_overrun(&self, _topic: &str, _subscriber_id: u64, _dropped_count: u64) {}
    fn on_message_received(&self, _topic: &str, _chunk_index: u32) {}

    // -- Shared-memory events -------------------------------------------
    fn on_shared_memory_created(&self, _path: &str, _size: u64) {}
    fn on_shared_memory_opened(&self, _path: &str, _size: u64) {}
    fn on_shared_memory_error(&self, _path: &str, _error_code: i32, _error_msg: &str) {}

    // -- ChunkPool events -------------------------------------------------
    fn on_chunk_pool_initialized(&self, _topic: &str, _max_chunks: u32, _chunk_size: u64) {}
    fn on_chunk_pool_stats(&self, _topic: &str, _allocated: u32, _max_chunks: u32, _utilization: f32) {}
}

/// No-op hook implementation, used when no hooks are attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHooks;

impl EventHooks for NullHooks {}

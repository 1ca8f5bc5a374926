// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Geometry and policy inputs. Only the *shape* of these values is
// contractual — the JSON/HMAC-backed store that produces them in a full
// deployment is an external collaborator and out of scope here.

use crate::error::{IpcError, Result};

/// Intended producer/consumer multiplicity of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpcType {
    /// Single producer, multiple consumers.
    Spmc,
    /// Multiple producers, single consumer.
    Mpsc,
    /// Multiple producers, multiple consumers.
    Mpmc,
}

impl IpcType {
    pub(crate) fn encode(self) -> u32 {
        match self {
            IpcType::Spmc => 0,
            IpcType::Mpsc => 1,
            IpcType::Mpmc => 2,
        }
    }

    pub(crate) fn decode(v: u32) -> Option<Self> {
        match v {
            0 => Some(IpcType::Spmc),
            1 => Some(IpcType::Mpsc),
            2 => Some(IpcType::Mpmc),
            _ => None,
        }
    }

    pub(crate) fn allows_multi_producer(self) -> bool {
        matches!(self, IpcType::Mpsc | IpcType::Mpmc)
    }
}

/// What `Publisher::loan` does when the chunk pool is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanPolicy {
    Error,
    Wait,
    Block,
}

/// What a publisher does when a subscriber's queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueFullPolicy {
    Drop,
    Overwrite,
    Wait,
    Block,
}

impl QueueFullPolicy {
    pub(crate) fn encode(self) -> u32 {
        match self {
            QueueFullPolicy::Drop => 0,
            QueueFullPolicy::Overwrite => 1,
            QueueFullPolicy::Wait => 2,
            QueueFullPolicy::Block => 3,
        }
    }

    pub(crate) fn decode(v: u32) -> Self {
        match v {
            1 => QueueFullPolicy::Overwrite,
            2 => QueueFullPolicy::Wait,
            3 => QueueFullPolicy::Block,
            _ => QueueFullPolicy::Drop,
        }
    }
}

/// What `Subscriber::receive` does when its queue is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyPolicy {
    Skip,
    Wait,
    Block,
    Error,
}

impl EmptyPolicy {
    pub(crate) fn encode(self) -> u32 {
        match self {
            EmptyPolicy::Skip => 0,
            EmptyPolicy::Wait => 1,
            EmptyPolicy::Block => 2,
            EmptyPolicy::Error => 3,
        }
    }

    pub(crate) fn decode(v: u32) -> Self {
        match v {
            1 => EmptyPolicy::Wait,
            2 => EmptyPolicy::Block,
            3 => EmptyPolicy::Error,
            _ => EmptyPolicy::Skip,
        }
    }
}

/// Default bounded-wait durations: 10ms for `Wait`, 100ms for `Block`,
/// unless overridden by configuration.
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 10;
pub const DEFAULT_BLOCK_TIMEOUT_MS: u64 = 100;

/// Segment geometry, fixed by the creator and an implicit contract for
/// every attacher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentConfig {
    pub chunk_size: usize,
    pub max_chunks: u32,
    pub max_subscribers: u32,
    pub queue_capacity: u32,
    pub ipc_type: IpcType,
}

impl SegmentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(IpcError::InvalidArgument("chunk_size must be > 0".into()));
        }
        if self.max_chunks == 0 {
            return Err(IpcError::InvalidArgument("max_chunks must be > 0".into()));
        }
        if self.max_subscribers == 0 {
            return Err(IpcError::InvalidArgument(
                "max_subscribers must be > 0".into(),
            ));
        }
        if self.max_subscribers as usize > crate::control_block::MAX_SUBSCRIBERS {
            return Err(IpcError::InvalidArgument(format!(
                "max_subscribers {} exceeds compiled-in cap {}",
                self.max_subscribers,
                crate::control_block::MAX_SUBSCRIBERS
            )));
        }
        if self.queue_capacity == 0 || !self.queue_capacity.is_power_of_two() {
            return Err(IpcError::InvalidArgument(
                "queue_capacity must be a power of two".into(),
            ));
        }
        Ok(())
    }
}

/// Per-publisher policy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublisherConfig {
    pub loan_policy: LoanPolicy,
    pub default_queue_full_policy: QueueFullPolicy,
    pub auto_cleanup: bool,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            loan_policy: LoanPolicy::Error,
            default_queue_full_policy: QueueFullPolicy::Drop,
            auto_cleanup: true,
        }
    }
}

/// Per-subscriber policy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberConfig {
    pub queue_capacity: u32,
    pub empty_policy: EmptyPolicy,
    pub stmin_ns: u64,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            empty_policy: EmptyPolicy::Skip,
            stmin_ns: 0,
        }
    }
}

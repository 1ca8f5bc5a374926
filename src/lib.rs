// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Zero-copy shared-memory publish/subscribe transport for single-host
// multi-process systems. Producers loan a chunk from a shared pool, fill
// it in place, and fan it out by reference to every registered
// subscriber; a chunk is returned to the pool only once its last
// reader (or the producer, on an empty fan-out) has released it.
//
// Binary-compatible atoms (`ShmHandle`, `IpcMutex`, `IpcCondition`,
// `Waiter`) are the same POSIX/Win32 primitives used throughout; the
// pub/sub layer on top (`ControlBlockRaw`, `ChunkPool`, `ChannelQueue`,
// `Publisher`, `Subscriber`) is what turns them into a topic transport.

pub mod shm_name;

mod platform;

mod shm;
pub use shm::{ShmHandle, ShmOpenMode};

mod mutex;
pub use mutex::IpcMutex;

mod condition;
pub use condition::IpcCondition;

mod waiter;
pub use waiter::Waiter;

mod spin_lock;
pub use spin_lock::SpinLock;

mod error;
pub use error::{IpcError, Result};

mod config;
pub use config::{
    EmptyPolicy, IpcType, LoanPolicy, PublisherConfig, QueueFullPolicy, SegmentConfig,
    SubscriberConfig, DEFAULT_BLOCK_TIMEOUT_MS, DEFAULT_WAIT_TIMEOUT_MS,
};

mod wait_set;

mod control_block;
pub use control_block::{SubscriberSnapshot, MAX_SUBSCRIBERS};

mod chunk;
pub use chunk::ChunkState;

mod channel_queue;

mod subscriber_registry;

mod shared_memory_manager;
pub use shared_memory_manager::SharedMemoryManager;

mod hooks;
pub use hooks::{EventHooks, NullHooks};

mod sample;
pub use sample::{Sample, TypedSample};

mod publisher;
pub use publisher::Publisher;

mod subscriber;
pub use subscriber::Subscriber;

mod factory;
pub use factory::IpcFactory;

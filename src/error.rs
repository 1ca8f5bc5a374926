// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Error taxonomy for the shared-memory pub/sub transport.

use thiserror::Error;

/// Every fallible operation in this crate returns this error type.
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid state for requested transition")]
    InvalidState,

    #[error("shared memory segment not found: {0}")]
    ShmNotFound(String),

    #[error("shared memory segment size mismatch for {path}: expected {expected}, found {found}")]
    ShmSizeMismatch {
        path: String,
        expected: usize,
        found: usize,
    },

    #[error("shared memory segment layout version mismatch for {path}: expected {expected}, found {found}")]
    ShmVersionMismatch {
        path: String,
        expected: u32,
        found: u32,
    },

    #[error("chunk pool exhausted ({allocated}/{max_chunks} chunks in use)")]
    ChunkPoolExhausted { allocated: u32, max_chunks: u32 },

    #[error("invalid chunk index {0}")]
    InvalidChunkIndex(u32),

    #[error("subscriber queue is full")]
    QueueFull,

    #[error("subscriber queue is empty")]
    QueueEmpty,

    #[error("operation would block")]
    WouldBlock,

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("operation timed out")]
    Timeout,

    #[error("underlying OS error: {0}")]
    ShmError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IpcError>;

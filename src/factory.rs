// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Topic-level construction helper: guarantees every Publisher/Subscriber
// opened against the same path agrees on chunk geometry, the way the
// teacher's `ScopedAccess` callers always go through a single
// `ShmHandle::acquire` rather than hand-rolling size arithmetic at each
// call site.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::{PublisherConfig, SegmentConfig, SubscriberConfig};
use crate::error::{IpcError, Result};
use crate::hooks::{EventHooks, NullHooks};
use crate::publisher::Publisher;
use crate::subscriber::Subscriber;

/// Remembers the `SegmentConfig` each topic path was first opened with,
/// so a later call with a mismatched geometry fails fast instead of
/// racing `SharedMemoryManager::attach`'s own validation.
pub struct IpcFactory {
    hooks: Arc<dyn EventHooks>,
    known: Mutex<HashMap<String, SegmentConfig>>,
}

impl Default for IpcFactory {
    fn default() -> Self {
        Self::new(Arc::new(NullHooks))
    }
}

impl IpcFactory {
    pub fn new(hooks: Arc<dyn EventHooks>) -> Self {
        Self {
            hooks,
            known: Mutex::new(HashMap::new()),
        }
    }

    fn check_geometry(&self, path: &str, config: SegmentConfig) -> Result<()> {
        let mut known = self.known.lock().unwrap();
        match known.get(path) {
            Some(existing) if *existing != config => Err(IpcError::InvalidArgument(format!(
                "topic '{path}' already opened with a different SegmentConfig"
            ))),
            Some(_) => Ok(()),
            None => {
                known.insert(path.to_string(), config);
                Ok(())
            }
        }
    }

    pub fn publisher(
        &self,
        path: &str,
        config: SegmentConfig,
        publisher_config: PublisherConfig,
    ) -> Result<Publisher> {
        self.check_geometry(path, config)?;
        Publisher::create(path, config, publisher_config, self.hooks.clone())
    }

    pub fn subscriber(
        &self,
        path: &str,
        config: SegmentConfig,
        subscriber_config: SubscriberConfig,
    ) -> Result<Subscriber> {
        self.check_geometry(path, config)?;
        Subscriber::create(path, config, subscriber_config, self.hooks.clone())
    }
}

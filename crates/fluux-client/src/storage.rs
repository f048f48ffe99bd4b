// fluux-core/fluux-client
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::collections::HashMap;

use parking_lot::RwLock;

/// XEP-0198 session, `{"id": …, "inbound": …}`.
pub const SM_STATE_KEY: &str = "fluux:sm-state";
/// Presence machine snapshot with ISO-formatted dates.
pub const PRESENCE_MACHINE_KEY: &str = "fluux:presence-machine";
/// Cached server disco result.
pub const SERVER_INFO_KEY: &str = "fluux:server-info";
/// The endpoint that last completed a stream handshake.
pub const LAST_ENDPOINT_KEY: &str = "fluux:last-endpoint";

/// Pluggable persistence for the handful of blobs the runtime keeps
/// across restarts. Deliberately synchronous: the stream-management
/// counter is persisted from the unload path where asynchronous writes
/// may never complete.
pub trait StorageAdapter: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove(&self, key: &str) -> anyhow::Result<()>;
}

/// Storage for tests and for callers that don't care about restarts.
#[derive(Default)]
pub struct InMemoryStorage {
    values: RwLock<HashMap<String, String>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageAdapter for InMemoryStorage {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.values
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.values.write().remove(key);
        Ok(())
    }
}

/// Persistence is best-effort across the whole runtime: a failing
/// adapter is logged and life goes on.
pub(crate) fn set_or_log(storage: &dyn StorageAdapter, key: &str, value: &str) {
    if let Err(err) = storage.set(key, value) {
        tracing::warn!("Failed to persist '{key}': {err}");
    }
}

pub(crate) fn remove_or_log(storage: &dyn StorageAdapter, key: &str) {
    if let Err(err) = storage.remove(key) {
        tracing::warn!("Failed to clear '{key}': {err}");
    }
}

pub(crate) fn get_or_log(storage: &dyn StorageAdapter, key: &str) -> Option<String> {
    match storage.get(key) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!("Failed to read '{key}': {err}");
            None
        }
    }
}

//! Session-scoped memo of backend reads.
//!
//! One entry per (resource kind, user type). Entries live until logout or an
//! explicit invalidation; there is no capacity bound and nothing is written
//! to disk. Readers treat a hit as a hint and may always refetch.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::UserType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Profile,
    PostedJobs,
    SavedJobs,
    AppliedJobs,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Profile => "profile",
            ResourceKind::PostedJobs => "posted-jobs",
            ResourceKind::SavedJobs => "saved-jobs",
            ResourceKind::AppliedJobs => "applied-jobs",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: ResourceKind,
    pub user_type: UserType,
}

impl CacheKey {
    pub fn new(kind: ResourceKind, user_type: UserType) -> Self {
        Self { kind, user_type }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind.as_str(), self.user_type)
    }
}

#[derive(Debug, Default)]
pub struct SessionCache {
    entries: Mutex<HashMap<CacheKey, Value>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, Value>> {
        // A panic while holding the lock cannot leave a half-written entry.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get_value(&self, key: CacheKey) -> Option<Value> {
        self.lock().get(&key).cloned()
    }

    pub fn set_value(&self, key: CacheKey, value: Value) {
        debug!(%key, "cache set");
        self.lock().insert(key, value);
    }

    /// Typed read. An entry that no longer decodes is dropped.
    pub fn get<T: DeserializeOwned>(&self, key: CacheKey) -> Option<T> {
        let value = self.get_value(key)?;
        match serde_json::from_value(value) {
            Ok(v) => {
                debug!(%key, "cache hit");
                Some(v)
            }
            Err(e) => {
                warn!(%key, error = %e, "discarding undecodable cache entry");
                self.remove(key);
                None
            }
        }
    }

    pub fn set<T: Serialize>(&self, key: CacheKey, value: &T) {
        match serde_json::to_value(value) {
            Ok(v) => self.set_value(key, v),
            Err(e) => warn!(%key, error = %e, "value not cacheable"),
        }
    }

    pub fn remove(&self, key: CacheKey) {
        if self.lock().remove(&key).is_some() {
            debug!(%key, "cache invalidated");
        }
    }

    /// Drop every entry belonging to one user type.
    pub fn invalidate(&self, user_type: UserType) {
        self.lock().retain(|key, _| key.user_type != user_type);
    }

    pub fn clear(&self) {
        let mut entries = self.lock();
        debug!(count = entries.len(), "cache cleared");
        entries.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

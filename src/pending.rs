//! Messages a front-end has forwarded and not yet answered.

use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

use crate::error::{Error, Result};

/// Maps a capsule identifier to whatever a binding needs to reach the sender
/// again (`T`).
///
/// `std::sync::Mutex` because every operation is a plain map lookup and the
/// lock is never held across an `.await`.
#[derive(Debug)]
pub struct PendingMessages<T> {
    entries: Mutex<HashMap<Uuid, T>>,
}

impl<T> Default for PendingMessages<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PendingMessages<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Record a message. Must happen before the message is handed to the
    /// manager, otherwise a fast reply could miss it.
    pub fn insert(&self, id: Uuid, address: T) {
        self.lock().insert(id, address);
    }

    /// Remove and return the entry for `id`. Each entry can be taken once.
    pub fn take(&self, id: &Uuid) -> Result<T> {
        self.lock()
            .remove(id)
            .ok_or(Error::PendingMessageNotFound { id: *id })
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A poisoned map is still a valid map.
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, T>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

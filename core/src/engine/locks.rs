// Device lock table - at most one active job per physical device
//
// The table is owned by whoever runs engines; clones share the same set.
// A lease releases its device when dropped.

use crate::{SanitizeError, SanitizeResult};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default)]
pub struct DeviceLockTable {
    active: Arc<Mutex<HashSet<String>>>,
}

impl DeviceLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a device; fails if another job already holds it
    pub fn try_acquire(&self, device_path: &str) -> SanitizeResult<DeviceLease> {
        let key = Self::key_for(device_path);
        let mut active = self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if !active.insert(key.clone()) {
            return Err(SanitizeError::DeviceBusy(format!(
                "{} already has an active sanitization job",
                device_path
            )));
        }

        Ok(DeviceLease {
            table: Arc::clone(&self.active),
            key,
        })
    }

    pub fn is_locked(&self, device_path: &str) -> bool {
        let key = Self::key_for(device_path);
        self.active
            .lock()
            .map(|active| active.contains(&key))
            .unwrap_or(true)
    }

    /// Symlinks such as /dev/disk/by-id/* resolve to the same key as the node
    fn key_for(device_path: &str) -> String {
        std::fs::canonicalize(device_path)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| device_path.to_string())
    }
}

#[derive(Debug)]
pub struct DeviceLease {
    table: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        let mut active = self
            .table
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        active.remove(&self.key);
    }
}

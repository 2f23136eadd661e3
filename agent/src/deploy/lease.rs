//! Single-flight guards for the processor and the chat pollers

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Process-wide single-flight guard for deployment passes.
///
/// Cloning shares the same underlying lease.
#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    inner: Arc<Mutex<()>>,
}

/// Held while a pass runs; dropping it releases the flight
#[derive(Debug)]
pub struct JobLease {
    _guard: OwnedMutexGuard<()>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lease if nobody holds it
    pub fn try_acquire(&self) -> Option<JobLease> {
        self.inner
            .clone()
            .try_lock_owned()
            .ok()
            .map(|guard| JobLease { _guard: guard })
    }

    pub fn is_in_flight(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

/// Per-key single-flight, one flight per trigger source
#[derive(Debug, Clone, Default)]
pub struct KeyedFlight {
    keys: Arc<StdMutex<HashSet<String>>>,
}

/// Releases its key on drop
#[derive(Debug)]
pub struct FlightGuard {
    key: String,
    keys: Arc<StdMutex<HashSet<String>>>,
}

impl KeyedFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`; `None` while another holder has it
    pub fn try_acquire(&self, key: &str) -> Option<FlightGuard> {
        let mut keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        if !keys.insert(key.to_string()) {
            return None;
        }
        Some(FlightGuard {
            key: key.to_string(),
            keys: self.keys.clone(),
        })
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(key)
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let mut keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        keys.remove(&self.key);
    }
}

//! Per-client registry of abortable requests.
//!
//! # Design
//! Callers tag a request with a `CancelKey`. The first request to use a key
//! creates an `AbortSignal` for it; requests that reuse the key while it is
//! registered share that same signal. Each request holds an `AbortLease`
//! and the entry is dropped once the last lease is released, whether the
//! request succeeded, failed, or its future was dropped mid-flight.
//! `abort` fires the signal and removes the entry in one step, so the next
//! request with that key starts from a fresh signal.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::debug;

/// Caller-chosen identifier for an abortable request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CancelKey(String);

impl CancelKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CancelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CancelKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for CancelKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Cancellation signal shared by every request using one key.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    token: Arc<CancellationToken>,
}

impl AbortSignal {
    fn new() -> Self {
        Self {
            token: Arc::new(CancellationToken::new()),
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the signal fires.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// `true` if both signals are the same registry handle.
    pub fn same_handle(&self, other: &AbortSignal) -> bool {
        Arc::ptr_eq(&self.token, &other.token)
    }

    fn fire(&self) {
        self.token.cancel();
    }
}

#[derive(Debug)]
struct Entry {
    signal: AbortSignal,
    leases: usize,
}

#[derive(Debug, Default)]
pub struct AbortRegistry {
    entries: Mutex<HashMap<CancelKey, Entry>>,
}

impl AbortRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a lease on `key`, creating its signal if none is registered.
    pub fn acquire(&self, key: &CancelKey) -> AbortLease<'_> {
        let mut entries = self.lock();
        let entry = entries.entry(key.clone()).or_insert_with(|| Entry {
            signal: AbortSignal::new(),
            leases: 0,
        });
        entry.leases += 1;
        AbortLease {
            registry: self,
            key: key.clone(),
            signal: entry.signal.clone(),
        }
    }

    /// Fire the signal registered under `key` and forget it. Returns
    /// `false` for an unknown key.
    pub fn abort(&self, key: &CancelKey) -> bool {
        let removed = self.lock().remove(key);
        match removed {
            Some(entry) => {
                debug!(key = %key, leases = entry.leases, "aborting request");
                entry.signal.fire();
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, key: &CancelKey) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn release(&self, key: &CancelKey, signal: &AbortSignal) {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(key) else {
            return;
        };
        // A newer handle may sit under the key after an abort.
        if !entry.signal.same_handle(signal) {
            return;
        }
        entry.leases -= 1;
        if entry.leases == 0 {
            entries.remove(key);
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CancelKey, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registration of one in-flight request under a key. Released on drop.
#[derive(Debug)]
pub struct AbortLease<'a> {
    registry: &'a AbortRegistry,
    key: CancelKey,
    signal: AbortSignal,
}

impl AbortLease<'_> {
    pub fn signal(&self) -> &AbortSignal {
        &self.signal
    }

    pub fn key(&self) -> &CancelKey {
        &self.key
    }
}

impl Drop for AbortLease<'_> {
    fn drop(&mut self) {
        self.registry.release(&self.key, &self.signal);
    }
}

//! Exactly-once lazy verification guard
//!
//! The first caller runs the (expensive) check under an exclusive lock; once it
//! succeeds every later caller returns from a single atomic load. A failed
//! check leaves the gate closed so the next caller retries.

use async_lock::{RwLock, RwLockUpgradableReadGuard};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

#[derive(Debug, Default)]
pub struct BucketGate {
    verified: AtomicBool,
    lock: RwLock<()>,
}

impl BucketGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_verified(&self) -> bool {
        self.verified.load(Ordering::Acquire)
    }

    /// Run `check` unless a previous call already succeeded.
    pub async fn ensure<F, Fut, E>(&self, check: F) -> Result<(), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        // Optimistic path: the flag only ever goes false -> true
        if self.verified.load(Ordering::Acquire) {
            return Ok(());
        }

        let read = self.lock.upgradable_read().await;
        if self.verified.load(Ordering::Acquire) {
            return Ok(());
        }

        let _write = match RwLockUpgradableReadGuard::try_upgrade(read) {
            Ok(write) => write,
            Err(read) => {
                debug!("Bucket gate upgrade contended; waiting for exclusive lock");
                drop(read);
                let write = self.lock.write().await;
                if self.verified.load(Ordering::Acquire) {
                    return Ok(());
                }
                write
            }
        };

        check().await?;
        self.verified.store(true, Ordering::Release);
        Ok(())
    }
}

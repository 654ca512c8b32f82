//! In-flight call limiting.
//!
//! Every submitted call holds one slot from the time it is submitted until
//! its handle is dropped, which normally happens right after the answer is
//! observed. When all slots are taken, `submit` waits for one to free up,
//! giving up after the configured timeout.
//!
//! # Configuration
//!
//! - `max_in_flight`: Maximum number of unanswered calls (default: 1024)
//! - Timeout: How long `submit` waits for a slot (default: 5s)

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{PineError, Result};

/// Default maximum unanswered calls before submitters wait.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 1024;

/// Default time a submitter waits for a free slot.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between slot checks while waiting.
const CHECK_INTERVAL: Duration = Duration::from_micros(100);

/// Lock-free counter of in-flight calls, shared by every submitter.
#[derive(Debug, Clone)]
pub struct BackpressureController {
    in_flight: Arc<AtomicUsize>,
    max_in_flight: usize,
    timeout: Duration,
}

impl BackpressureController {
    /// Create a controller with the default timeout.
    pub fn new(max_in_flight: usize) -> Self {
        Self::with_timeout(max_in_flight, DEFAULT_TIMEOUT)
    }

    /// Create a controller with a custom timeout.
    pub fn with_timeout(max_in_flight: usize, timeout: Duration) -> Self {
        Self {
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: max_in_flight.max(1),
            timeout,
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.in_flight.load(Ordering::Acquire) >= self.max_in_flight
    }

    #[inline]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Claim a slot if one is free right now.
    fn try_claim(&self) -> bool {
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < self.max_in_flight).then_some(current + 1)
            })
            .is_ok()
    }

    /// Try to reserve a slot without waiting.
    ///
    /// Returns `Err(BackpressureTimeout)` if at capacity.
    pub fn try_reserve(&self) -> Result<BackpressureGuard> {
        if self.try_claim() {
            Ok(BackpressureGuard::new(self.clone()))
        } else {
            Err(PineError::BackpressureTimeout)
        }
    }

    /// Reserve a slot, waiting up to the timeout.
    pub async fn reserve(&self) -> Result<BackpressureGuard> {
        if self.try_claim() {
            return Ok(BackpressureGuard::new(self.clone()));
        }

        let start = Instant::now();
        loop {
            if self.try_claim() {
                return Ok(BackpressureGuard::new(self.clone()));
            }
            if start.elapsed() > self.timeout {
                tracing::warn!(
                    "In-flight limit of {} not released within {:?}",
                    self.max_in_flight,
                    self.timeout
                );
                return Err(PineError::BackpressureTimeout);
            }
            tokio::time::sleep(CHECK_INTERVAL).await;
        }
    }

    #[inline]
    fn release(&self) {
        self.in_flight.fetch_sub(1, Ordering::Release);
    }
}

impl Default for BackpressureController {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IN_FLIGHT)
    }
}

/// Releases its in-flight slot on drop.
#[derive(Debug)]
pub struct BackpressureGuard {
    controller: BackpressureController,
}

impl BackpressureGuard {
    fn new(controller: BackpressureController) -> Self {
        Self { controller }
    }
}

impl Drop for BackpressureGuard {
    fn drop(&mut self) {
        self.controller.release();
    }
}

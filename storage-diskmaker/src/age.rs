// SPDX-License-Identifier: GPL-3.0-only

//! Minimum dwell time before a newly observed device may be claimed

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// First-observation time per kernel name. Entries live for the whole process.
pub struct DeviceAgeMap {
    clock: Arc<dyn Clock>,
    first_seen: Mutex<HashMap<String, Instant>>,
}

impl DeviceAgeMap {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            first_seen: Mutex::new(HashMap::new()),
        }
    }

    /// Record `kernel_name` if unseen and return how long it has been visible.
    pub fn observe(&self, kernel_name: &str) -> Duration {
        let now = self.clock.now();
        let mut first_seen = self
            .first_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let seen = *first_seen.entry(kernel_name.to_string()).or_insert(now);
        now.saturating_duration_since(seen)
    }

    pub fn is_old_enough(&self, kernel_name: &str, min_age: Duration) -> bool {
        self.observe(kernel_name) >= min_age
    }
}

impl Default for DeviceAgeMap {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

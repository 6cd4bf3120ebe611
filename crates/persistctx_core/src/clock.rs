//! UTC time source for audit timestamps.
//!
//! # Invariants
//! - `SystemClock` never returns a value lower than one it already returned
//!   in this process, even if the wall clock steps backwards.

use crate::model::audit::EpochMillis;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current UTC time in epoch milliseconds.
pub trait Clock {
    fn utc_now_ms(&self) -> EpochMillis;
}

static LAST_ISSUED_MS: AtomicI64 = AtomicI64::new(0);

/// Wall clock clamped to be non-decreasing process-wide.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn utc_now_ms(&self) -> EpochMillis {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        let previous = LAST_ISSUED_MS.fetch_max(wall, Ordering::SeqCst);
        previous.max(wall)
    }
}

impl<F: Fn() -> EpochMillis> Clock for F {
    fn utc_now_ms(&self) -> EpochMillis {
        self()
    }
}

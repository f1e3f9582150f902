use std::fmt::Display;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// Call-count and wall-clock cap for one scan invocation.
///
/// The limits are fixed at construction; only the call counter moves. Every
/// RPC attempt (retries included) is recorded here, so a scan that checks
/// `is_exhausted` before each unit of work cannot overrun its caps by more
/// than the unit in flight.
#[derive(Debug)]
pub struct ScanBudget {
    max_rpc_calls: u32,
    max_time: Duration,
    started_at: Instant,
    calls_used: AtomicU32,
}

impl ScanBudget {
    pub fn start(max_rpc_calls: u32, max_time: Duration) -> Self {
        Self {
            max_rpc_calls,
            max_time,
            started_at: Instant::now(),
            calls_used: AtomicU32::new(0),
        }
    }

    /// Budget bounded by time only (signature and parse caps are tracked by the caller).
    pub fn time_only(max_time: Duration) -> Self {
        Self::start(u32::MAX, max_time)
    }

    pub fn record_call(&self) {
        self.calls_used.fetch_add(1, Ordering::Relaxed);
    }

    pub fn calls_used(&self) -> u32 {
        self.calls_used.load(Ordering::Relaxed)
    }

    pub fn max_rpc_calls(&self) -> u32 {
        self.max_rpc_calls
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn time_exceeded(&self) -> bool {
        self.elapsed() > self.max_time
    }

    pub fn calls_exhausted(&self) -> bool {
        self.calls_used() >= self.max_rpc_calls
    }

    pub fn is_exhausted(&self) -> bool {
        self.calls_exhausted() || self.time_exceeded()
    }

    /// True when another call fits and waiting `delay` first would still end
    /// before the deadline.
    pub fn can_retry_after(&self, delay: Duration) -> bool {
        !self.calls_exhausted() && self.elapsed() + delay <= self.max_time
    }

    /// True when `n` more calls fit and the deadline has not passed.
    pub fn has_room_for(&self, n: u32) -> bool {
        !self.time_exceeded() && self.calls_used().saturating_add(n) <= self.max_rpc_calls
    }
}

/// Result of one unit of scan work (a chunk, an account, a transaction).
#[derive(Debug, Clone, PartialEq)]
pub enum UnitOutcome<T> {
    Done(T),
    Skipped(String),
}

impl<T> UnitOutcome<T> {
    pub fn capture<E: Display>(result: Result<T, E>, unit: &str) -> Self {
        match result {
            Ok(value) => UnitOutcome::Done(value),
            Err(e) => {
                warn!(unit, error = %e, "scan unit skipped");
                UnitOutcome::Skipped(e.to_string())
            }
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, UnitOutcome::Skipped(_))
    }
}

/// Work counters reported alongside every scan result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub rpc_calls: u32,
    pub blocks_scanned: u64,
    pub signatures_scanned: u64,
    pub tx_parsed: u32,
    pub units_skipped: u32,
}

impl ScanStats {
    pub fn note_outcome<T>(&mut self, outcome: &UnitOutcome<T>) {
        if outcome.is_skipped() {
            self.units_skipped += 1;
        }
    }
}

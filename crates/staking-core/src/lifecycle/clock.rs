//! Time sources for transaction timestamps.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::Instant;

/// Source of wall-clock timestamps in milliseconds since the UNIX epoch.
pub trait Clock: Send + Sync {
	fn now_millis(&self) -> u64;
}

/// Wall clock anchored once and advanced with tokio's monotonic clock.
///
/// Timestamps never go backwards, and they follow tokio's paused clock in
/// tests, so timer-driven progressions produce matching timestamps.
#[derive(Debug, Clone)]
pub struct TokioClock {
	origin_ms: u64,
	origin: Instant,
}

impl TokioClock {
	pub fn new() -> Self {
		Self {
			origin_ms: chrono::Utc::now().timestamp_millis().max(0) as u64,
			origin: Instant::now(),
		}
	}
}

impl Default for TokioClock {
	fn default() -> Self {
		Self::new()
	}
}

impl Clock for TokioClock {
	fn now_millis(&self) -> u64 {
		self.origin_ms + self.origin.elapsed().as_millis() as u64
	}
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
	now_ms: AtomicU64,
}

impl ManualClock {
	pub fn new(now_ms: u64) -> Self {
		Self {
			now_ms: AtomicU64::new(now_ms),
		}
	}

	/// Moves the clock forward by `millis`.
	pub fn advance(&self, millis: u64) {
		self.now_ms.fetch_add(millis, Ordering::SeqCst);
	}

	pub fn set(&self, now_ms: u64) {
		self.now_ms.store(now_ms, Ordering::SeqCst);
	}
}

impl Clock for ManualClock {
	fn now_millis(&self) -> u64 {
		self.now_ms.load(Ordering::SeqCst)
	}
}

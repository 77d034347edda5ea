//! Lease time base.
//!
//! Lease timestamps are signed 64-bit tick counts (100ns resolution) relative
//! to the epoch of the owning lease agent's [`Clock`]. `Ticks::MAX` stands
//! for "never" and is preserved by all arithmetic helpers.

use {
	core::time::Duration,
	derive_more::{Display, From, Into},
	serde::{Deserialize, Serialize},
	tokio::time::Instant,
};

/// Number of ticks in one millisecond.
pub const TICKS_PER_MILLISECOND: i64 = 10_000;

#[derive(
	Debug,
	Clone,
	Copy,
	Default,
	PartialEq,
	Eq,
	PartialOrd,
	Ord,
	Hash,
	Display,
	From,
	Into,
	Serialize,
	Deserialize,
)]
pub struct Ticks(i64);

impl Ticks {
	pub const MAX: Self = Self(i64::MAX);
	pub const ZERO: Self = Self(0);

	pub const fn from_raw(raw: i64) -> Self {
		Self(raw)
	}

	pub const fn raw(self) -> i64 {
		self.0
	}

	pub const fn from_millis(millis: i64) -> Self {
		Self(millis.saturating_mul(TICKS_PER_MILLISECOND))
	}

	pub const fn as_millis(self) -> i64 {
		self.0 / TICKS_PER_MILLISECOND
	}

	pub const fn is_max(self) -> bool {
		self.0 == i64::MAX
	}

	/// Adds a millisecond offset. `MAX` stays `MAX`.
	#[must_use]
	pub const fn plus_millis(self, millis: i64) -> Self {
		if self.is_max() {
			return self;
		}
		Self(self.0.saturating_add(millis.saturating_mul(TICKS_PER_MILLISECOND)))
	}

	/// Subtracts a millisecond offset. `MAX` stays `MAX`.
	#[must_use]
	pub const fn minus_millis(self, millis: i64) -> Self {
		self.plus_millis(millis.saturating_neg())
	}

	/// Signed distance `self - earlier` in ticks.
	#[must_use]
	pub const fn since(self, earlier: Self) -> Self {
		Self(self.0.saturating_sub(earlier.0))
	}

	#[must_use]
	pub const fn plus(self, other: Self) -> Self {
		if self.is_max() || other.is_max() {
			return Self::MAX;
		}
		Self(self.0.saturating_add(other.0))
	}
}

/// Monotonic lease clock anchored at the creation of a lease agent.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
	epoch: Instant,
}

impl Default for Clock {
	fn default() -> Self {
		Self::new()
	}
}

impl Clock {
	pub fn new() -> Self {
		Self {
			epoch: Instant::now(),
		}
	}

	/// Current time in ticks since the epoch.
	pub fn now(&self) -> Ticks {
		let elapsed = self.epoch.elapsed();
		Ticks(i64::try_from(elapsed.as_nanos() / 100).unwrap_or(i64::MAX - 1))
	}

	/// Converts a tick deadline back to a runtime instant for timer arming.
	/// Deadlines in the past resolve to the epoch and fire immediately.
	pub fn instant_at(&self, deadline: Ticks) -> Instant {
		let nanos = u64::try_from(deadline.raw().max(0))
			.unwrap_or_default()
			.saturating_mul(100);
		self.epoch + Duration::from_nanos(nanos)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn max_is_sticky() {
		assert_eq!(Ticks::MAX.plus_millis(10), Ticks::MAX);
		assert_eq!(Ticks::MAX.minus_millis(10), Ticks::MAX);
		assert_eq!(Ticks::MAX.plus(Ticks::from_millis(1)), Ticks::MAX);
	}

	#[test]
	fn millisecond_conversion() {
		let t = Ticks::from_millis(1500);
		assert_eq!(t.raw(), 15_000_000);
		assert_eq!(t.as_millis(), 1500);
		assert_eq!(t.plus_millis(500).as_millis(), 2000);
		assert_eq!(t.minus_millis(2000).as_millis(), -500);
	}

	#[tokio::test(start_paused = true)]
	async fn clock_tracks_runtime_time() {
		let clock = Clock::new();
		tokio::time::sleep(Duration::from_millis(250)).await;
		assert_eq!(clock.now().as_millis(), 250);
		let at = clock.instant_at(Ticks::from_millis(1000));
		assert_eq!(at.duration_since(clock.instant_at(Ticks::ZERO)).as_millis(), 1000);
	}
}

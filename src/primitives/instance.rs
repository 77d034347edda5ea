use {
	core::sync::atomic::{AtomicI64, Ordering},
	std::time::{SystemTime, UNIX_EPOCH},
};

static LAST_INSTANCE: AtomicI64 = AtomicI64::new(0);

/// Returns a fresh instance number.
///
/// Instances are seeded from wall-clock time in 100ns units and strictly
/// increase within the process, so an agent restarted on the same address
/// always presents a larger instance than its previous incarnation.
pub fn next_instance() -> i64 {
	let now = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| i64::try_from(d.as_nanos() / 100).unwrap_or(i64::MAX / 2))
		.unwrap_or_default();

	let previous = LAST_INSTANCE
		.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
			Some(last.saturating_add(1).max(now))
		})
		.unwrap_or_else(|last| last);

	previous.saturating_add(1).max(now)
}

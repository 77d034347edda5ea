//! Periodic sweep reclaiming remote lease agents that are done, and failing
//! an agent nobody uses anymore.

use {
	super::super::worker::WorkerLoop,
	crate::primitives::{Short, Ticks},
	core::time::Duration,
};

impl WorkerLoop {
	pub(in crate::agent) fn do_maintenance(&mut self) {
		let now = self.now();
		tracing::trace!(agent = %self.local, "maintenance sweep");

		// A neutral verdict is superseded once a new lease with the peer is up
		for handle in self.remotes.handles() {
			let superseded = self.remote(handle).is_some_and(|rla| {
				rla.is_failed()
					&& rla.arbitration_neutral
					&& self
						.remotes
						.iter()
						.any(|(_, other)| other.peer == rla.peer && other.is_open_two_way())
			});
			if superseded && let Some(rla) = self.remotes.get_mut(handle) {
				rla.arbitration_neutral = false;
			}
		}

		for handle in self.remotes.handles() {
			if self.remote(handle).is_some_and(|rla| rla.is_orphaned(now)) {
				self.fail_remote(handle);
			}
		}

		for handle in self.remotes.handles() {
			let Some(rla) = self.remotes.get_mut(handle) else {
				continue;
			};
			if !rla.is_failed() {
				continue;
			}

			if rla.time_to_be_failed == Ticks::ZERO {
				let arbitration = if rla.lease.durations.has_sentinel() {
					self.config.arbitration_duration
				} else {
					rla.lease.durations.arbitration
				};
				rla.time_to_be_failed = now.plus_millis(i64::from(arbitration));
				continue;
			}

			if now >= rla.time_to_be_failed && !rla.arbitration_neutral {
				tracing::debug!(
					agent = %self.local,
					peer = %rla.peer,
					instance = %Short(rla.instance),
					"reclaiming remote lease agent"
				);
				self.disconnect_remote(handle);
				self.remotes.remove(handle);
			}
		}

		if self.is_failed() {
			return;
		}

		let idle = self.applications.is_empty()
			&& self.remotes.iter().all(|(_, rla)| rla.is_failed());
		if !idle {
			self.time_to_be_failed = Ticks::ZERO;
			return;
		}

		if self.time_to_be_failed == Ticks::ZERO {
			let grace = self
				.config
				.maintenance_interval
				.saturating_sub(Duration::from_secs(1));
			let millis = i64::try_from(grace.as_millis()).unwrap_or(i64::MAX);
			self.time_to_be_failed = now.plus_millis(millis);
		} else if now >= self.time_to_be_failed {
			tracing::info!(
				agent = %self.local,
				"no applications or leases left"
			);
			self.uninitialize(false);
		}
	}
}

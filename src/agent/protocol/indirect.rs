//! Indirect leases: renewing through neighbours when the direct path to a
//! peer stops answering.

use {
	super::super::worker::WorkerLoop,
	crate::{
		lease::{Durations, OneWayLeaseState},
		primitives::{Handle, Ticks},
		wire::MessageType,
	},
};

impl WorkerLoop {
	/// Neighbours a forward request can travel through: every other open
	/// remote lease agent holding a two-way lease.
	pub(in crate::agent) fn relay_candidates(&self, direct: Handle) -> Vec<Handle> {
		let candidates = self.remotes.iter().filter(|(handle, rla)| {
			*handle != direct
				&& !rla.is_failed()
				&& !rla.is_suspended()
				&& rla.is_active
				&& rla.lease.subject_state != OneWayLeaseState::Inactive
				&& rla.lease.monitor_state != OneWayLeaseState::Inactive
		});

		match self.config.max_indirect_fanout {
			Some(limit) => candidates.take(limit).map(|(handle, _)| handle).collect(),
			None => candidates.map(|(handle, _)| handle).collect(),
		}
	}

	/// Sends the pending renewal, or termination, of the lease with
	/// `direct`'s peer to it through every relay candidate.
	pub(in crate::agent) fn send_indirect(&mut self, direct: Handle) {
		let now = self.now();
		let Some(rla) = self.remote(direct) else {
			return;
		};

		let (durations, expiration) = if rla.table.has_subjects() {
			let durations = rla.lease.durations;
			(durations, now.plus_millis(i64::from(durations.lease)))
		} else {
			(Durations::TERMINATION, Ticks::MAX)
		};
		let lease_instance = rla.lease.subject_identifier;
		let lists = self.request_lists(direct);

		let Some(request) = self.outgoing(
			direct,
			MessageType::ForwardRequest,
			lease_instance,
			durations,
			expiration,
			lists,
		) else {
			return;
		};

		let relays = self.relay_candidates(direct);
		tracing::debug!(
			agent = %self.local,
			to = ?request.lease_endpoint,
			relays = relays.len(),
			"sending indirect lease request"
		);

		for relay in relays {
			self.send_message(relay, &request);
		}
	}
}

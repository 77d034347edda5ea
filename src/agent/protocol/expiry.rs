//! Timer handlers for the per-peer lease timers.

use {
	super::super::{LeaseEvent, timers::TimerKind, worker::WorkerLoop},
	crate::{
		lease::{
			AgentState,
			Durations,
			OneWayLeaseState,
			Perspective,
			durations_for_request,
		},
		primitives::{Handle, Short, Ticks},
		wire::{LEGACY_VERSION, MessageType},
	},
};

impl WorkerLoop {
	/// The subject lease ran out without the monitor side keeping it alive.
	pub(in crate::agent) fn on_subject_expired(&mut self, handle: Handle) {
		let Some(rla) = self.remotes.get_mut(handle) else {
			return;
		};
		if rla.is_failed() {
			return;
		}

		if rla.lease.subject_state == OneWayLeaseState::Inactive {
			// Ping probe or terminated subject lease timing out
			if rla.lease.monitor_state == OneWayLeaseState::Active {
				rla.in_ping = false;
				rla.lease.reset_subject_times();
			} else {
				self.fail_remote(handle);
			}
			return;
		}

		if rla.lease.monitor_state != OneWayLeaseState::Active && !rla.message_sent {
			tracing::debug!(
				agent = %self.local,
				peer = %rla.peer,
				"peer never reached, dropping subject lease"
			);
			rla.lease.subject_state = OneWayLeaseState::Inactive;
			self.fail_remote(handle);
			return;
		}

		tracing::warn!(
			agent = %self.local,
			peer = %rla.peer,
			subject = %Short(rla.lease.subject_identifier),
			"subject lease expired"
		);

		if rla.remote_version == LEGACY_VERSION {
			rla.lease.subject_state = OneWayLeaseState::Failed;
			rla.lease.monitor_state = OneWayLeaseState::Inactive;
			self.on_lease_failure();
			return;
		}

		rla.lease.subject_state = OneWayLeaseState::Expired;
		rla.lease.monitor_state = OneWayLeaseState::Expired;
		self.create_arbitration_request(handle);
	}

	/// The peer stopped renewing the lease this node monitors.
	pub(in crate::agent) fn on_monitor_expired(&mut self, handle: Handle) {
		if self.is_failed() {
			return;
		}
		let Some(rla) = self.remotes.get_mut(handle) else {
			return;
		};
		if rla.lease.monitor_state != OneWayLeaseState::Active
			|| rla.lease.subject_state >= OneWayLeaseState::Expired
		{
			return;
		}

		tracing::warn!(
			agent = %self.local,
			peer = %rla.peer,
			monitor = %Short(rla.lease.monitor_identifier),
			"monitor lease expired"
		);

		if rla.lease.subject_state == OneWayLeaseState::Inactive {
			rla.lease.monitor_state = OneWayLeaseState::Inactive;
			self.fail_remote(handle);
			return;
		}

		rla.lease.subject_state = OneWayLeaseState::Expired;
		rla.lease.monitor_state = OneWayLeaseState::Expired;
		self.cancel(handle, TimerKind::RenewOrArbitrate);
		self.cancel(handle, TimerKind::PreArbitrationSubject);
		self.cancel(handle, TimerKind::PingRetry);
		self.create_arbitration_request(handle);
	}

	/// Renewal timer. Renews directly, falls back to indirect rounds when
	/// retries run out, and starts arbitration once the lease has expired.
	pub(in crate::agent) fn on_renew_or_arbitrate(&mut self, handle: Handle) {
		let now = self.now();
		let agent_failed = self.is_failed();
		let Some(rla) = self.remotes.get_mut(handle) else {
			return;
		};

		if agent_failed {
			if now >= rla.lease.subject_fail_time {
				self.fail_expired_subject(handle);
			}
			return;
		}

		if rla.lease.subject_state != OneWayLeaseState::Active
			|| rla.lease.monitor_state >= OneWayLeaseState::Expired
		{
			// Arbitration timed out without a result
			if rla.is_suspended()
				&& rla.lease.both_expired()
				&& now >= rla.lease.subject_fail_time
			{
				tracing::warn!(
					agent = %self.local,
					peer = %rla.peer,
					"arbitration timed out"
				);
				self.fail_expired_subject(handle);
			}
			return;
		}

		if now >= rla.lease.subject_expire_time {
			if rla.lease.monitor_state == OneWayLeaseState::Inactive {
				return;
			}
			rla.lease.subject_state = OneWayLeaseState::Expired;
			rla.lease.monitor_state = OneWayLeaseState::Expired;
			let never_sent = !rla.message_sent;
			self.cancel(handle, TimerKind::Monitor);
			if never_sent {
				if let Some(rla) = self.remotes.get_mut(handle) {
					rla.lease.subject_state = OneWayLeaseState::Inactive;
				}
				self.fail_remote(handle);
			} else {
				self.create_arbitration_request(handle);
			}
			return;
		}

		if rla.is_failed() {
			return;
		}

		if rla.lease.is_renew_retry {
			self.renew_indirectly(handle);
		} else {
			self.renew_directly(handle);
		}
	}

	/// A direct renewal went unanswered: relay it through neighbours and
	/// wait for expiration.
	fn renew_indirectly(&mut self, handle: Handle) {
		let Some(rla) = self.remotes.get_mut(handle) else {
			return;
		};
		rla.indirect_count += 1;
		let count = rla.indirect_count;
		let peer = rla.peer.clone();
		let expire = rla.lease.subject_expire_time;

		self.arm(handle, TimerKind::RenewOrArbitrate, expire);
		let pre_arbitration =
			expire.minus_millis(i64::from(self.config.pre_arbitration_time));
		self.arm(handle, TimerKind::PreArbitrationSubject, pre_arbitration);

		if self.indirect_limit == 0 || count >= self.indirect_limit {
			return;
		}

		tracing::info!(
			agent = %self.local,
			%peer,
			round = count,
			"renewing lease through neighbours"
		);

		self.send_indirect(handle);
		for app in self.applications.values() {
			app.notify(LeaseEvent::HealthReport { peer: peer.clone() });
		}
	}

	fn renew_directly(&mut self, handle: Handle) {
		let now = self.now();
		let Some(rla) = self.remotes.get_mut(handle) else {
			return;
		};

		let durations = durations_for_request(
			self.config.durations(rla.lease.duration_type),
			&rla.lease,
			false,
		);
		let expiration = now.plus_millis(i64::from(durations.lease));

		if rla.lease.subject_expire_time > expiration {
			// Lease got shorter: renew on the new schedule
			let updated = rla.lease.is_duration_updated;
			self.set_renew_timer(handle, false, durations.lease);
			if let Some(rla) = self.remotes.get_mut(handle) {
				rla.lease.is_duration_updated = updated;
			}
			return;
		}

		self.set_renew_timer(handle, true, durations.lease);

		let Some(rla) = self.remotes.get_mut(handle) else {
			return;
		};
		let lease_instance = rla.lease.subject_identifier;

		let request = if rla.table.has_subjects() {
			let lists = self.request_lists(handle);
			self.outgoing(
				handle,
				MessageType::LeaseRequest,
				lease_instance,
				durations,
				expiration,
				lists,
			)
		} else {
			rla.state = AgentState::Suspended;
			let lists = self.request_lists(handle);
			self.outgoing(
				handle,
				MessageType::LeaseRequest,
				lease_instance,
				Durations::TERMINATION,
				Ticks::MAX,
				lists,
			)
		};

		if let Some(rla) = self.remotes.get_mut(handle) {
			rla.lease.is_duration_updated = false;
		}
		if let Some(request) = request {
			self.send_message(handle, &request);
		}
	}

	/// Early warning that arbitration is near.
	pub(in crate::agent) fn on_pre_arbitration(&mut self, handle: Handle) {
		if self.is_failed() {
			return;
		}
		let Some(rla) = self.remote(handle) else {
			return;
		};
		if rla.is_expired_or_failed() {
			return;
		}

		let Some(app) = self.arbitration_application() else {
			return;
		};
		let request = self.arbitration_request(handle, None, 0, 0);
		if let Some(request) = request {
			tracing::debug!(
				agent = %self.local,
				peer = %request.peer,
				"lease close to expiring"
			);
			self.notify(&app, LeaseEvent::Arbitrate(request));
		}
	}

	/// This node won arbitration and the peer's grace period is over.
	pub(in crate::agent) fn on_post_arbitration(&mut self, handle: Handle) {
		if self.is_failed() {
			return;
		}
		let Some(rla) = self.remotes.get_mut(handle) else {
			return;
		};
		if rla.is_failed() {
			return;
		}

		rla.lease.subject_state = OneWayLeaseState::Inactive;
		rla.lease.monitor_state = OneWayLeaseState::Failed;
		let peer = rla.peer.clone();
		let subjects = rla.table.subject_set();
		let monitors = rla.table.monitors_where(|_| true);

		tracing::info!(
			agent = %self.local,
			%peer,
			"remote lease agent expired"
		);

		self.fail_remote(handle);
		for id in &subjects {
			self.notify_remote_expired(&peer, id, Perspective::Local);
		}
		for id in &monitors {
			self.notify_remote_expired(&peer, id, Perspective::Remote);
		}
	}

	/// The subject lease failed for good and takes the whole agent with it.
	pub(in crate::agent) fn fail_expired_subject(&mut self, handle: Handle) {
		if let Some(rla) = self.remotes.get_mut(handle) {
			rla.lease.subject_state = OneWayLeaseState::Failed;
			rla.lease.monitor_state = OneWayLeaseState::Inactive;
		}
		self.on_lease_failure();
	}
}

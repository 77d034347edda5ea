//! Graceful and failure-driven termination of lease relationships.

use {
	super::super::{timers::TimerKind, worker::WorkerLoop},
	crate::{
		lease::{
			AgentState,
			ApplicationId,
			Durations,
			MonitorSlot,
			OneWayLeaseState,
			RelationshipIdentifier,
			SubjectSlot,
		},
		primitives::{Handle, Ticks},
		wire::MessageType,
	},
};

impl WorkerLoop {
	/// Moves a subject relationship to the failed or terminate pending
	/// list. Without an active subject lease there is no one to tell, so the
	/// relationship is dropped right away.
	pub(in crate::agent) fn terminate_subject_lease(
		&mut self,
		handle: Handle,
		id: &RelationshipIdentifier,
		failed: bool,
	) {
		let Some(rla) = self.remotes.get_mut(handle) else {
			return;
		};

		if rla.lease.subject_state == OneWayLeaseState::Inactive {
			rla.table.set_subject(id.clone(), None);
			return;
		}

		let slot = if failed {
			SubjectSlot::FailedPending
		} else {
			SubjectSlot::TerminatePending
		};
		rla.table.set_subject(id.clone(), Some(slot));
	}

	/// Tells the peer about terminated subject relationships. Once the last
	/// one is gone the subject lease itself is terminated.
	pub(in crate::agent) fn terminate_subject_send_message(
		&mut self,
		handle: Handle,
		two_way: bool,
	) {
		let now = self.now();
		let Some(rla) = self.remotes.get_mut(handle) else {
			return;
		};

		if rla.lease.subject_state == OneWayLeaseState::Inactive {
			if rla.is_in_ping() {
				// Terminated before the probe finished
				self.fail_remote(handle);
			} else {
				self.abort_ping(handle);
			}
			return;
		}

		let last = !rla.table.has_subjects();
		if last {
			if rla.is_open() {
				rla.state = AgentState::Suspended;
			}
			if two_way {
				rla.in_two_way_termination = true;
			}
		}

		let (durations, expiration) = if last {
			(Durations::TERMINATION, Ticks::MAX)
		} else {
			let durations = rla.lease.durations;
			(durations, now.plus_millis(i64::from(durations.lease)))
		};
		let lease_instance = rla.lease.subject_identifier;
		let pending = rla.pending_response.take();

		let lists = self.request_lists(handle);
		let request = self.outgoing(
			handle,
			MessageType::LeaseRequest,
			lease_instance,
			durations,
			expiration,
			lists,
		);

		if let Some(frame) = pending {
			self.send_frame(handle, frame);
		}
		if let Some(mut request) = request {
			request.two_way_termination = two_way;
			self.send_message(handle, &request);
		}
	}

	/// The peer is terminating its last subject relationship with us; end
	/// ours in the other direction as well.
	pub(in crate::agent) fn terminate_reverse_lease(
		&mut self,
		handle: Handle,
		terminating: &[RelationshipIdentifier],
	) {
		let Some(rla) = self.remote(handle) else {
			return;
		};
		let reversed: Vec<_> = terminating
			.iter()
			.map(RelationshipIdentifier::reversed)
			.filter(|id| rla.table.is_subject(id))
			.collect();

		for id in &reversed {
			self.terminate_subject_lease(handle, id, false);
		}
	}

	/// Ends every relationship `app` has with the peer.
	///
	/// A failed application marks its monitored relationships failed as
	/// well, so the peer reports them as expired. Otherwise the
	/// relationships are terminated gracefully and both directions of the
	/// lease are released at once.
	pub(in crate::agent) fn terminate_all(
		&mut self,
		handle: Handle,
		app: &ApplicationId,
		failed: bool,
	) {
		let Some(rla) = self.remote(handle) else {
			return;
		};
		if rla.is_in_ping() {
			self.abort_ping(handle);
		}

		let Some(rla) = self.remotes.get_mut(handle) else {
			return;
		};
		if failed {
			for id in rla.table.monitors_where(|slot| slot == MonitorSlot::Active) {
				if &id.remote == app {
					rla.table.set_monitor(id, Some(MonitorSlot::FailedPending));
				}
			}
		}

		let subjects: Vec<_> = rla
			.table
			.subject_set()
			.into_iter()
			.filter(|id| &id.local == app)
			.collect();

		let mut send = false;
		for id in &subjects {
			self.terminate_subject_lease(handle, id, failed);
			send |= self
				.remote(handle)
				.is_some_and(|rla| rla.lease.subject_state == OneWayLeaseState::Active);
		}

		if !send {
			return;
		}

		let two_way = self.remote(handle).is_some_and(|rla| {
			!rla.table.has_subjects() && !rla.table.has_monitors()
		}) || !failed;
		self.terminate_subject_send_message(handle, two_way);

		let monitor_active = self
			.remote(handle)
			.is_some_and(|rla| rla.lease.monitor_state == OneWayLeaseState::Active);
		if two_way && monitor_active {
			self.update_monitor_timer_for_termination(handle);
			let Some(rla) = self.remotes.get_mut(handle) else {
				return;
			};
			let expire = rla.lease.subject_expire_time;
			let durations = rla.lease.durations;
			rla.lease.set_subject_expire_time(
				expire,
				durations.suspend,
				durations.arbitration,
			);
			self.arm(handle, TimerKind::Subject, expire);
		}
	}

	/// The subject lease was released by the peer.
	pub(in crate::agent) fn update_subject_timer_for_termination(
		&mut self,
		handle: Handle,
	) {
		let Some(rla) = self.remotes.get_mut(handle) else {
			return;
		};
		rla.lease.subject_state = OneWayLeaseState::Inactive;
		rla.lease.reset_subject_times();

		for kind in [
			TimerKind::RenewOrArbitrate,
			TimerKind::PreArbitrationMonitor,
			TimerKind::PreArbitrationSubject,
			TimerKind::Subject,
			TimerKind::PingRetry,
		] {
			self.cancel(handle, kind);
		}

		let Some(rla) = self.remotes.get_mut(handle) else {
			return;
		};
		if rla.lease.monitor_state != OneWayLeaseState::Active {
			self.fail_remote(handle);
		} else if rla.is_suspended() {
			rla.state = AgentState::Open;
			rla.in_two_way_termination = false;
		}
	}

	/// The monitor lease is released; this node no longer watches the peer.
	pub(in crate::agent) fn update_monitor_timer_for_termination(&mut self, handle: Handle) {
		if let Some(rla) = self.remotes.get_mut(handle) {
			rla.lease.monitor_state = OneWayLeaseState::Inactive;
		}
		self.cancel(handle, TimerKind::Monitor);
	}
}

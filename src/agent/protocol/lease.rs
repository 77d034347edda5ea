//! Establishing and renewing the subject lease, and probing new peers.

use {
	super::super::{timers::TimerKind, worker::WorkerLoop},
	crate::{
		lease::{
			Durations,
			MonitorSlot,
			OneWayLeaseState,
			RelationshipIdentifier,
			SubjectSlot,
			durations_for_request,
		},
		primitives::{Handle, Short, Ticks, next_instance},
		wire::{LeaseLists, ListKind, MessageType},
	},
};

impl WorkerLoop {
	/// Schedules the next renewal.
	///
	/// Renewal starts once `1 / lease_renew_begin_ratio` of the lease has run
	/// and is retried `lease_retry_count` times over the rest of it. A timer
	/// armed `by_timer` is a retry and moves one interval further each time.
	/// When too little time is left for another retry the timer is armed at
	/// expiration, where it turns into arbitration.
	pub(in crate::agent) fn set_renew_timer(
		&mut self,
		handle: Handle,
		by_timer: bool,
		renew_duration: i32,
	) {
		let now = self.now();
		let ratio = i64::from(self.config.lease_renew_begin_ratio.max(1));
		let retries = i64::from(self.config.lease_retry_count.max(1));

		let Some(rla) = self.remotes.get_mut(handle) else {
			return;
		};

		let duration = if renew_duration == 0 {
			rla.lease.durations.lease
		} else {
			renew_duration
		};
		let duration = i64::from(duration);
		let remain = duration - duration / ratio;
		let interval = remain / retries;

		rla.lease.is_renew_retry = by_timer;
		if !by_timer {
			rla.lease.renew_retry_count = 0;
		}

		let expire = rla.lease.subject_expire_time;
		let deadline = if expire.since(now).as_millis() >= interval {
			let mut deadline = expire.minus_millis(remain);
			if by_timer {
				rla.lease.renew_retry_count += 1;
				deadline = deadline
					.plus_millis(interval * i64::from(rla.lease.renew_retry_count));
			}
			deadline
		} else if rla.lease.monitor_state == OneWayLeaseState::Inactive {
			return;
		} else {
			expire
		};

		self.arm(handle, TimerKind::RenewOrArbitrate, deadline);
	}

	/// Sends a lease request carrying every pending relationship change,
	/// activating the subject lease first if needed.
	pub(in crate::agent) fn establish_lease(&mut self, handle: Handle) {
		let now = self.now();
		let Some(rla) = self.remotes.get(handle) else {
			return;
		};

		let subject_inactive = rla.lease.subject_state == OneWayLeaseState::Inactive;
		let durations = durations_for_request(
			self.config.durations(rla.lease.duration_type),
			&rla.lease,
			subject_inactive,
		);
		let expiration = now.plus_millis(i64::from(durations.lease));

		if subject_inactive {
			let Some(rla) = self.remotes.get_mut(handle) else {
				return;
			};
			rla.lease.subject_state = OneWayLeaseState::Active;
			rla.lease.subject_identifier = next_instance();
			rla.lease.set_durations(durations);
			rla.lease.set_subject_expire_time(
				expiration,
				durations.suspend,
				durations.arbitration,
			);
			let monitor_inactive = rla.lease.monitor_state == OneWayLeaseState::Inactive;

			tracing::debug!(
				agent = %self.local,
				peer = %rla.peer,
				subject = %Short(rla.lease.subject_identifier),
				"subject lease activated"
			);

			if monitor_inactive {
				self.arm(handle, TimerKind::Subject, expiration);
			}
			self.set_renew_timer(handle, false, 0);
		}

		let Some(rla) = self.remotes.get_mut(handle) else {
			return;
		};
		rla.lease.is_duration_updated = false;
		let lease_instance = rla.lease.subject_identifier;
		let lists = self.request_lists(handle);

		let request = self.outgoing(
			handle,
			MessageType::LeaseRequest,
			lease_instance,
			durations,
			expiration,
			lists,
		);
		if let Some(request) = request {
			self.send_message(handle, &request);
		}
	}

	/// Lists announcing every relationship change this node still needs the
	/// peer to acknowledge.
	pub(in crate::agent) fn request_lists(&self, handle: Handle) -> LeaseLists {
		let Some(rla) = self.remote(handle) else {
			return LeaseLists::default();
		};
		let table = &rla.table;
		LeaseLists::default()
			.with(ListKind::SubjectPending, table.subjects_in(SubjectSlot::Pending))
			.with(
				ListKind::SubjectFailedPending,
				table.subjects_in(SubjectSlot::FailedPending),
			)
			.with(
				ListKind::SubjectTerminatePending,
				table.subjects_in(SubjectSlot::TerminatePending),
			)
			.with(
				ListKind::MonitorFailedPending,
				table.monitors_in(MonitorSlot::FailedPending),
			)
	}

	/// Starts the lease in the other direction after the peer asked us to
	/// monitor `id`'s remote side.
	pub(in crate::agent) fn establish_reverse_lease(
		&mut self,
		handle: Handle,
		id: RelationshipIdentifier,
	) {
		let Some(rla) = self.remote(handle) else {
			return;
		};
		if rla.is_suspended() {
			return;
		}
		self.abort_ping(handle);

		let Some(rla) = self.remotes.get_mut(handle) else {
			return;
		};
		match rla.table.subject(&id) {
			Some(SubjectSlot::Pending) => {}
			Some(_) => return,
			None => {
				if !self.applications.contains_key(&id.local) {
					return;
				}
				rla.table.set_subject(id, Some(SubjectSlot::Pending));
			}
		}

		self.establish_lease(handle);
	}

	/// Starts probing the peer before any lease exists.
	pub(in crate::agent) fn start_ping(&mut self, handle: Handle) {
		let now = self.now();
		let Some(rla) = self.remotes.get_mut(handle) else {
			return;
		};
		if rla.is_in_ping() {
			return;
		}
		rla.in_ping = true;
		self.arm(handle, TimerKind::PingRetry, now);
	}

	pub(in crate::agent) fn abort_ping(&mut self, handle: Handle) {
		let Some(rla) = self.remotes.get_mut(handle) else {
			return;
		};
		rla.in_ping = false;
		rla.lease.reset_subject_times();
		self.cancel(handle, TimerKind::Subject);
		self.cancel(handle, TimerKind::PingRetry);
	}

	/// Sends the next ping request. Probing continues until the peer answers
	/// or the probe is aborted.
	pub(in crate::agent) fn on_ping_retry(&mut self, handle: Handle) {
		let now = self.now();
		let Some(rla) = self.remotes.get_mut(handle) else {
			return;
		};
		if !rla.in_ping {
			return;
		}
		if rla.ping_send_time == Ticks::ZERO {
			rla.ping_send_time = now;
		}

		let lease_instance = rla.lease.subject_identifier;
		let expiration = rla.lease.subject_expire_time;
		let request = self.outgoing(
			handle,
			MessageType::PingRequest,
			lease_instance,
			Durations::new(0, 0, 0),
			expiration,
			LeaseLists::default(),
		);
		if let Some(request) = request {
			self.send_message(handle, &request);
		}

		let next = now.plus_millis(i64::from(self.config.ping_retry_interval));
		self.arm(handle, TimerKind::PingRetry, next);
	}
}

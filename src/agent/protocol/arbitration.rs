//! Handing broken leases to the arbitrator and applying its verdict.

use {
	super::super::{
		ArbitrationRequest,
		ArbitrationResult,
		Error,
		LeaseEvent,
		timers::TimerKind,
		worker::WorkerLoop,
	},
	crate::{
		lease::{AgentState, ApplicationId, OneWayLeaseState, Perspective, TTL_INFINITE},
		primitives::{Handle, Short, Ticks},
	},
};

impl WorkerLoop {
	/// The first registered application that takes part in arbitration.
	pub(in crate::agent) fn arbitration_application(&self) -> Option<ApplicationId> {
		self
			.applications
			.iter()
			.find(|(_, app)| app.arbitration_enabled && !app.is_being_unregistered())
			.map(|(id, _)| id.clone())
	}

	/// Describes the lease held with `handle`'s peer for the arbitrator.
	pub(in crate::agent) fn arbitration_request(
		&self,
		handle: Handle,
		remote_app: Option<ApplicationId>,
		monitor_ttl: i64,
		subject_ttl: i64,
	) -> Option<ArbitrationRequest> {
		let now = self.now();
		let rla = self.remote(handle)?;

		let last_heard_upper_bound = if rla.renewed_before {
			let renewed_at = rla
				.lease
				.subject_expire_time
				.minus_millis(i64::from(self.config.lease_duration));
			now.since(renewed_at).as_millis()
		} else {
			now.since(rla.ping_send_time).as_millis()
		};

		Some(ArbitrationRequest {
			remote_app,
			peer: rla.peer.clone(),
			monitor_ttl,
			subject_ttl,
			local_instance: self.instance,
			remote_instance: rla.remote_instance,
			remote_version: rla.remote_version,
			monitor_identifier: rla.lease.monitor_identifier,
			subject_identifier: rla.lease.subject_identifier,
			last_heard_upper_bound,
		})
	}

	/// Both leases with the peer expired. Suspends the remote lease agent and
	/// asks an arbitration-enabled application to decide who survives.
	pub(in crate::agent) fn create_arbitration_request(&mut self, handle: Handle) {
		let now = self.now();
		let Some(rla) = self.remotes.get_mut(handle) else {
			return;
		};

		let fail_time = rla.lease.subject_fail_time;
		if now >= fail_time {
			tracing::warn!(
				agent = %self.local,
				peer = %rla.peer,
				"arbitration window already closed"
			);
			self.fail_arbitration(handle);
			return;
		}

		if rla.is_open() {
			rla.state = AgentState::Suspended;
		}
		self.arm(handle, TimerKind::RenewOrArbitrate, fail_time);

		let Some(app) = self.arbitration_application() else {
			tracing::warn!(
				agent = %self.local,
				"no application left to arbitrate"
			);
			self.fail_arbitration(handle);
			return;
		};

		let Some(rla) = self.remotes.get_mut(handle) else {
			return;
		};
		let suspend = if rla.lease.durations.has_sentinel() {
			self.config.lease_suspend_duration
		} else {
			rla.lease.durations.suspend
		};
		let suspend = i64::from(suspend);
		let monitor_ttl = rla.lease.monitor_expire_time.since(now).as_millis() + suspend;
		let subject_ttl = rla.lease.subject_expire_time.since(now).as_millis() + suspend;

		rla.arbitration_app = Some(app.clone());

		let remote_app = rla
			.table
			.monitors_where(|_| true)
			.first()
			.map(|id| id.local.clone())
			.or_else(|| {
				rla.table
					.subjects_where(|_| true)
					.first()
					.map(|id| id.remote.clone())
			});

		let request = self.arbitration_request(handle, remote_app, monitor_ttl, subject_ttl);
		if let Some(request) = request {
			tracing::info!(
				agent = %self.local,
				peer = %request.peer,
				arbitrator = %app,
				monitor_ttl,
				subject_ttl,
				"requesting arbitration"
			);
			self.notify(&app, LeaseEvent::Arbitrate(request));
		}
	}

	/// Arbitration cannot happen; the subject lease fails.
	fn fail_arbitration(&mut self, handle: Handle) {
		if let Some(rla) = self.remotes.get_mut(handle) {
			rla.lease.subject_state = OneWayLeaseState::Failed;
			rla.lease.monitor_state = OneWayLeaseState::Inactive;
		}
		self.fail_remote(handle);
		self.on_lease_failure();
	}

	/// Applies an arbitration verdict to one remote lease agent.
	///
	/// A finite local TTL means this node lost, a finite remote TTL means the
	/// peer lost and is given that long to shut down. Both infinite is a
	/// neutral verdict.
	pub(in crate::agent) fn arbitrate_lease(
		&mut self,
		handle: Handle,
		local_ttl: i32,
		remote_ttl: i32,
		is_delayed: bool,
	) {
		let now = self.now();
		self.cancel(handle, TimerKind::RenewOrArbitrate);
		let Some(rla) = self.remotes.get_mut(handle) else {
			return;
		};

		tracing::info!(
			agent = %self.local,
			peer = %rla.peer,
			instance = %Short(rla.instance),
			local_ttl,
			remote_ttl,
			is_delayed,
			"arbitration result"
		);

		if local_ttl != TTL_INFINITE {
			rla.lease.subject_state = OneWayLeaseState::Failed;
			rla.lease.monitor_state = OneWayLeaseState::Inactive;
			rla.arbitration_neutral = false;
			self.on_lease_failure();
		} else if remote_ttl != TTL_INFINITE {
			rla.lease.subject_suspend_time = Ticks::MAX;
			rla.arbitration_neutral = false;
			if is_delayed {
				self.notify_all_remote_expired(handle);
			} else if remote_ttl == 0 {
				self.on_post_arbitration(handle);
			} else {
				let deadline = now.plus_millis(i64::from(remote_ttl));
				self.arm(handle, TimerKind::PostArbitration, deadline);
			}
		} else {
			rla.lease.subject_state = OneWayLeaseState::Inactive;
			rla.lease.monitor_state = OneWayLeaseState::Failed;
			rla.arbitration_neutral = true;
			self.fail_remote(handle);
		}
	}

	/// Tells every application on either side of the peer's relationships
	/// that they ended.
	pub(in crate::agent) fn notify_all_remote_expired(&self, handle: Handle) {
		let Some(rla) = self.remote(handle) else {
			return;
		};
		for id in rla.table.subject_set() {
			self.notify_remote_expired(&rla.peer, &id, Perspective::Local);
		}
		for id in rla.table.monitors_where(|_| true) {
			self.notify_remote_expired(&rla.peer, &id, Perspective::Remote);
		}
	}

	/// Result reported by the arbitrating application.
	pub(in crate::agent) fn complete_arbitration(
		&mut self,
		result: &ArbitrationResult,
	) -> Result<(), Error> {
		if !self.applications.contains_key(&result.app) {
			return Err(Error::ApplicationNotFound(result.app.clone()));
		}
		if result.local_instance != self.instance {
			tracing::debug!(
				agent = %self.local,
				instance = %Short(result.local_instance),
				"arbitration result for a previous incarnation"
			);
			return Err(Error::RemoteNotFound(result.peer.clone()));
		}

		let handle = self
			.remotes
			.iter()
			.find(|(_, rla)| {
				!rla.is_failed()
					&& rla.peer == result.peer
					&& rla.remote_instance == result.remote_instance
			})
			.map(|(handle, _)| handle)
			.ok_or_else(|| Error::RemoteNotFound(result.peer.clone()))?;

		let fail_time = self
			.remote(handle)
			.map_or(Ticks::MAX, |rla| rla.lease.subject_fail_time);
		if self.now() >= fail_time {
			tracing::warn!(
				agent = %self.local,
				peer = %result.peer,
				"arbitration result arrived too late"
			);
			self.fail_expired_subject(handle);
			return Ok(());
		}

		self.arbitrate_lease(
			handle,
			result.local_ttl,
			result.remote_ttl,
			result.is_delayed,
		);
		Ok(())
	}
}

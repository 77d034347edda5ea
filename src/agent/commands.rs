//! Worker-side handlers for requests made through a
//! [`LeaseAgent`](super::LeaseAgent) handle.

use {
	super::{
		AgentSnapshot,
		Application,
		Error,
		Establishment,
		RemoteExpiration,
		application::ApplicationState,
		timers::TimerEntry,
		worker::WorkerLoop,
	},
	crate::{
		lease::{
			ApplicationId,
			DURATION_MAX_VALUE,
			DurationType,
			OneWayLeaseState,
			RelationshipIdentifier,
			SubjectSlot,
		},
		primitives::{Handle, Short, Ticks},
		wire::ListenEndpoint,
	},
};

impl WorkerLoop {
	pub(super) fn register_application(
		&mut self,
		id: ApplicationId,
		arbitration_enabled: bool,
	) -> Result<Application, Error> {
		if self.is_failed() {
			return Err(Error::AgentFailed);
		}
		if self.applications.contains_key(&id) {
			return Err(Error::ApplicationExists(id));
		}

		let (state, handle) = ApplicationState::new(id.clone(), arbitration_enabled);
		self.applications.insert(id.clone(), state);
		self.time_to_be_failed = Ticks::ZERO;

		tracing::info!(
			agent = %self.local,
			app = %id,
			arbitration_enabled,
			"leasing application registered"
		);
		Ok(handle)
	}

	/// Starts unregistering an application. A delayed unregister keeps its
	/// relationships until every TTL granted to it has run out.
	pub(super) fn unregister_application(
		&mut self,
		id: &ApplicationId,
		delayed: bool,
	) -> Result<(), Error> {
		let Some(app) = self.applications.get(id) else {
			return Err(Error::ApplicationNotFound(id.clone()));
		};
		if app.is_being_unregistered() {
			return Ok(());
		}

		let ttl = if delayed { self.application_ttl(id, 0) } else { 0 };
		let ttl = if ttl == i32::MAX || ttl <= 0 { 0 } else { ttl };

		tracing::info!(
			agent = %self.local,
			app = %id,
			delay_ms = ttl,
			"unregistering leasing application"
		);

		let deadline = self.now().plus_millis(i64::from(ttl));
		let key = self.timers.insert(TimerEntry::Unregister(id.clone()), deadline);
		if let Some(app) = self.applications.get_mut(id) {
			app.unregister = Some(key);
		}
		Ok(())
	}

	pub(super) fn on_unregister_timer(&mut self, id: &ApplicationId) {
		for handle in self.remotes.handles() {
			let Some(rla) = self.remote(handle) else {
				continue;
			};

			if rla.is_suspended()
				&& rla.lease.both_expired()
				&& rla.arbitration_app.as_ref() == Some(id)
			{
				// The arbitrator is leaving mid-arbitration
				tracing::warn!(
					agent = %self.local,
					app = %id,
					peer = %rla.peer,
					"arbitrating application unregistered"
				);
				self.on_lease_failure();
				return;
			}

			if rla.is_failed() || rla.is_suspended() {
				continue;
			}
			self.terminate_all(handle, id, false);
		}

		self.applications.remove(id);
		tracing::info!(
			agent = %self.local,
			app = %id,
			"leasing application unregistered"
		);
	}

	/// Asks the agent at `peer` to monitor `app` on behalf of `remote_app`.
	pub(super) fn establish(
		&mut self,
		app: ApplicationId,
		remote_app: ApplicationId,
		peer: &ListenEndpoint,
		duration_type: DurationType,
	) -> Result<Establishment, Error> {
		if self.is_failed() {
			return Err(Error::AgentFailed);
		}
		if !self
			.applications
			.get(&app)
			.is_some_and(|state| !state.is_being_unregistered())
		{
			return Err(Error::ApplicationNotFound(app));
		}

		let id = RelationshipIdentifier::new(app, remote_app);
		let handle = self.remote_for_establish(peer)?;

		let Some(rla) = self.remotes.get_mut(handle) else {
			return Err(Error::RemoteNotFound(peer.clone()));
		};
		rla.lease.duration_type = duration_type;

		match rla.table.subject(&id) {
			Some(SubjectSlot::FailedPending | SubjectSlot::TerminatePending) => {
				return Err(Error::TerminationPending(id));
			}
			Some(SubjectSlot::Active) => return Ok(Establishment::Established(id)),
			Some(SubjectSlot::Pending) => return Ok(Establishment::Pending(id)),
			None => {}
		}

		rla.table.set_subject(id.clone(), Some(SubjectSlot::Pending));
		let probe = rla.lease.both_inactive();

		tracing::debug!(
			agent = %self.local,
			%peer,
			relationship = %id,
			instance = %Short(rla.instance),
			"establishing lease relationship"
		);

		if probe {
			self.start_ping(handle);
		} else {
			self.establish_lease(handle);
		}
		Ok(Establishment::Pending(id))
	}

	/// The remote lease agent a new relationship with `peer` goes through,
	/// replacing one that can no longer carry it.
	fn remote_for_establish(&mut self, peer: &ListenEndpoint) -> Result<Handle, Error> {
		let now = self.now();
		let mut ping_send_time = Ticks::ZERO;

		if let Some(handle) = self.find_active(peer) {
			let Some(rla) = self.remote(handle) else {
				return Err(Error::RemoteNotFound(peer.clone()));
			};
			if rla.is_suspended() {
				return Err(Error::Retry(peer.clone()));
			}
			if rla.is_failed() {
				self.disconnect_remote(handle);
			} else if rla.is_orphaned(now) {
				ping_send_time = rla.ping_send_time;
				self.disconnect_remote(handle);
			} else {
				return Ok(handle);
			}
		}

		let handle = self.create_remote(peer);
		if let Some(rla) = self.remotes.get_mut(handle) {
			rla.ping_send_time = ping_send_time;
		}
		Ok(handle)
	}

	/// Gracefully ends the relationship in which `app` is monitored by
	/// `remote_app` at `peer`.
	pub(super) fn terminate(
		&mut self,
		app: ApplicationId,
		remote_app: ApplicationId,
		peer: &ListenEndpoint,
	) -> Result<(), Error> {
		if self.is_failed() {
			return Err(Error::AgentFailed);
		}

		let id = RelationshipIdentifier::new(app, remote_app);
		let handle = self
			.remotes
			.iter()
			.find(|(_, rla)| &rla.peer == peer && rla.table.is_subject(&id))
			.map(|(handle, _)| handle)
			.ok_or_else(|| Error::RelationshipNotFound(id.clone()))?;

		if self
			.remote(handle)
			.is_some_and(|rla| rla.is_failed() || rla.is_suspended())
		{
			return Ok(());
		}

		tracing::debug!(
			agent = %self.local,
			%peer,
			relationship = %id,
			"terminating lease relationship"
		);

		self.terminate_subject_lease(handle, &id, false);
		self.terminate_subject_send_message(handle, false);
		Ok(())
	}

	/// Changes the configured lease durations. Relationships of the changed
	/// type request the new values on their next renewal.
	pub(super) fn update_lease_duration(
		&mut self,
		regular: i32,
		across_fault_domain: i32,
	) -> Result<(), Error> {
		for duration in [regular, across_fault_domain] {
			if duration <= 0 || duration >= DURATION_MAX_VALUE {
				return Err(Error::InvalidDurations(format!(
					"invalid lease duration {duration}"
				)));
			}
		}

		let mut changed = Vec::with_capacity(2);
		if self.config.lease_duration != regular {
			self.config.lease_duration = regular;
			changed.push(DurationType::Regular);
		}
		if self.config.lease_duration_across_fault_domain != across_fault_domain {
			self.config.lease_duration_across_fault_domain = across_fault_domain;
			changed.push(DurationType::AcrossFaultDomain);
		}
		if changed.is_empty() {
			return Ok(());
		}

		self.indirect_limit = self.config.indirect_limit();
		for handle in self.remotes.handles() {
			if let Some(rla) = self.remotes.get_mut(handle)
				&& changed.contains(&rla.lease.duration_type)
			{
				rla.lease.is_duration_updated = true;
			}
		}

		tracing::info!(
			agent = %self.local,
			regular,
			across_fault_domain,
			"lease durations updated"
		);
		Ok(())
	}

	/// Remaining lifetime of the leases `app` holds with `remote_app`.
	pub(super) fn remote_lease_expiration(
		&self,
		app: &ApplicationId,
		remote_app: &ApplicationId,
	) -> Result<RemoteExpiration, Error> {
		if !self.applications.contains_key(app) {
			return Err(Error::ApplicationNotFound(app.clone()));
		}

		let now = self.now();
		let id = RelationshipIdentifier::new(app.clone(), remote_app.clone());
		let remaining = |deadline: Ticks| {
			(!deadline.is_max()).then(|| deadline.since(now).as_millis().max(0))
		};

		let mut found = false;
		let mut expiration = RemoteExpiration {
			monitor_ttl: None,
			subject_ttl: None,
		};

		for (_, rla) in self.remotes.iter() {
			if rla.is_in_ping() || rla.table.subject(&id).is_none() {
				continue;
			}
			found = true;

			if rla.lease.monitor_state == OneWayLeaseState::Active
				&& let Some(ttl) = remaining(rla.lease.monitor_expire_time)
			{
				expiration.monitor_ttl = expiration.monitor_ttl.max(Some(ttl));
			}
			if let Some(ttl) = remaining(rla.lease.subject_expire_time) {
				expiration.subject_ttl = expiration.subject_ttl.max(Some(ttl));
			}
		}

		if found {
			Ok(expiration)
		} else {
			Err(Error::RelationshipNotFound(id))
		}
	}

	pub(super) fn application_ttl_query(
		&mut self,
		app: &ApplicationId,
		request_ttl: i32,
	) -> Result<i32, Error> {
		if !self.applications.contains_key(app) {
			return Err(Error::ApplicationNotFound(app.clone()));
		}
		Ok(self.application_ttl(app, request_ttl))
	}

	/// Caps the TTLs granted to `app` at `ttl` milliseconds from now.
	pub(super) fn set_global_lease_expiration(
		&mut self,
		app: &ApplicationId,
		ttl: i32,
	) -> Result<(), Error> {
		let now = self.now();
		let Some(state) = self.applications.get_mut(app) else {
			return Err(Error::ApplicationNotFound(app.clone()));
		};
		state.global_lease_expire_time = now.plus_millis(i64::from(ttl));
		Ok(())
	}

	pub(super) fn snapshot(&self) -> AgentSnapshot {
		AgentSnapshot {
			listen: self.local.clone(),
			instance: self.instance,
			state: self.state,
			applications: self.applications.keys().cloned().collect(),
			remotes: self.remotes.iter().map(|(_, rla)| rla.snapshot()).collect(),
		}
	}

	/// Shuts the agent down. Faulting the leases first reports the failure
	/// to every application and peer the way an expired lease would.
	pub(super) fn close(&mut self, fault_leases: bool) {
		if fault_leases {
			self.on_lease_failure();
		} else {
			self.uninitialize(false);
		}
	}
}

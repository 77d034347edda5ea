//! Inbound frame handling: routing, staleness filtering and the message
//! state machine.

use {
	super::super::{remote::RemoteLeaseAgent, timers::TimerKind, worker::WorkerLoop},
	crate::{
		lease::{Durations, OneWayLeaseState, RelationshipIdentifier, grant_larger_durations},
		primitives::{Handle, Short, Ticks},
		wire::{LeaseLists, LeaseMessage, ListKind, ListenEndpoint, MessageType},
	},
};

impl WorkerLoop {
	pub(in crate::agent) fn on_frame(&mut self, frame: &[u8]) {
		let message = match LeaseMessage::decode(frame) {
			Ok(message) => message,
			Err(error) => {
				tracing::warn!(
					agent = %self.local,
					len = frame.len(),
					%error,
					"dropping malformed lease message"
				);
				return;
			}
		};

		tracing::trace!(
			agent = %self.local,
			from = %message.message_endpoint,
			message_type = %message.message_type,
			lease_instance = %Short(message.lease_instance),
			"received lease message"
		);

		if self.is_failed() {
			tracing::debug!(
				agent = %self.local,
				"lease agent failed, rejecting lease message"
			);
			return;
		}

		if message.message_type.is_forward() {
			self.relay_forward(message);
			return;
		}

		if message.extension != 0 && message.extension < self.instance {
			tracing::debug!(
				agent = %self.local,
				from = %message.message_endpoint,
				addressed_to = %Short(message.extension),
				"dropping message for a previous incarnation"
			);
			return;
		}

		let (lease, route) = if message.message_type.is_relay() {
			let Some(route) = self.find_usable(&message.message_endpoint) else {
				tracing::debug!(
					agent = %self.local,
					relay = %message.message_endpoint,
					"no open lease with relaying peer, dropping relay message"
				);
				return;
			};
			let Some(lease_endpoint) = message.lease_endpoint.clone() else {
				return;
			};
			let Some(lease) = self.get_or_create(&lease_endpoint, &message) else {
				return;
			};
			(lease, route)
		} else {
			let peer = message.message_endpoint.clone();
			let Some(lease) = self.get_or_create(&peer, &message) else {
				return;
			};
			(lease, lease)
		};

		self.process_message(lease, route, &message);
	}

	/// Passes a forward message on to the agent it is about.
	fn relay_forward(&mut self, message: LeaseMessage) {
		let Some(destination) = message.lease_endpoint.clone() else {
			return;
		};

		let Some(handle) = self.find_usable(&destination) else {
			tracing::debug!(
				agent = %self.local,
				from = %message.message_endpoint,
				to = %destination,
				"no open lease with forward destination, dropping"
			);
			return;
		};

		match message.into_relay(self.local.clone()) {
			Ok(relay) => {
				tracing::trace!(
					agent = %self.local,
					to = %destination,
					message_type = %relay.message_type,
					"relaying forward message"
				);
				self.send_message(handle, &relay);
			}
			Err(error) => tracing::warn!(
				agent = %self.local,
				%error,
				"failed to relay forward message"
			),
		}
	}

	/// The active remote lease agent for `peer` that holds a lease in either
	/// direction.
	pub(in crate::agent) fn find_usable(&self, peer: &ListenEndpoint) -> Option<Handle> {
		self
			.remotes
			.iter()
			.find(|(_, rla)| &rla.peer == peer && rla.is_usable())
			.map(|(handle, _)| handle)
	}

	/// The remote lease agent new traffic for `peer` goes to.
	pub(in crate::agent) fn find_active(&self, peer: &ListenEndpoint) -> Option<Handle> {
		self
			.remotes
			.iter()
			.filter(|(_, rla)| &rla.peer == peer && rla.is_active)
			.max_by_key(|(_, rla)| rla.instance)
			.map(|(handle, _)| handle)
	}

	/// Creates the remote lease agent for `peer` and retires the one that was
	/// active before it.
	pub(in crate::agent) fn create_remote(&mut self, peer: &ListenEndpoint) -> Handle {
		for handle in self.remotes.handles() {
			let retire = self
				.remotes
				.get_mut(handle)
				.filter(|rla| &rla.peer == peer && rla.is_active)
				.map(|rla| rla.is_active = false)
				.is_some();
			if retire {
				self.fail_remote(handle);
			}
		}

		let mut rla = RemoteLeaseAgent::new(peer.clone());
		rla.target = self.transport.resolve(&self.local, peer).ok();
		let instance = rla.instance;
		let handle = self.remotes.insert(rla);

		tracing::debug!(
			agent = %self.local,
			%peer,
			instance = %Short(instance),
			"remote lease agent created"
		);
		handle
	}

	/// Finds the remote lease agent a message applies to, superseding the
	/// existing one when the peer restarted or it can no longer be used.
	/// Returns `None` when the message must be dropped.
	fn get_or_create(
		&mut self,
		peer: &ListenEndpoint,
		message: &LeaseMessage,
	) -> Option<Handle> {
		let now = self.now();

		let Some(existing) = self.find_active(peer) else {
			let handle = self.create_remote(peer);
			self.remote_mut(handle)?.remote_version = message.version;
			return Some(handle);
		};

		if message.message_type.is_received_lease_request()
			&& self.remotes.iter().any(|(_, rla)| {
				&rla.peer == peer
					&& rla.arbitration_neutral
					&& rla.lease.monitor_identifier == message.lease_instance
			}) {
			tracing::debug!(
				agent = %self.local,
				%peer,
				"dropping request for a lease in neutral arbitration"
			);
			return None;
		}

		let rla = self.remotes.get_mut(existing)?;
		if rla.remote_instance == 0 {
			rla.remote_instance = message.sender_instance;
		}

		if is_stale(rla, message, now) {
			tracing::debug!(
				agent = %self.local,
				%peer,
				message_type = %message.message_type,
				sender = %Short(message.sender_instance),
				known = %Short(rla.remote_instance),
				"dropping stale lease message"
			);
			return None;
		}

		let handle = if message.sender_instance > rla.remote_instance {
			if rla.is_suspended() && rla.lease.both_expired() {
				tracing::debug!(
					agent = %self.local,
					%peer,
					"peer restarted during arbitration, dropping message"
				);
				return None;
			}
			tracing::info!(
				agent = %self.local,
				%peer,
				previous = %Short(rla.remote_instance),
				current = %Short(message.sender_instance),
				"peer restarted"
			);
			self.disconnect_remote(existing);
			self.create_remote(peer)
		} else if rla.is_orphaned(now) {
			let ping_send_time = rla.ping_send_time;
			self.disconnect_remote(existing);
			let handle = self.create_remote(peer);
			self.remote_mut(handle)?.ping_send_time = ping_send_time;
			handle
		} else if rla.is_failed() {
			self.create_remote(peer)
		} else {
			existing
		};

		self.remote_mut(handle)?.remote_version = message.version;
		Some(handle)
	}

	/// Runs one message against the remote lease agent it concerns. `route`
	/// is the agent responses travel through: the same one for direct
	/// messages, the relaying neighbour for relayed ones.
	fn process_message(&mut self, lease: Handle, route: Handle, message: &LeaseMessage) {
		let Some(rla) = self.remote_mut(lease) else {
			return;
		};
		if rla.remote_instance == 0 {
			rla.remote_instance = message.sender_instance;
		}

		match message.message_type {
			MessageType::PingRequest => self.on_ping_request(lease),
			MessageType::PingResponse => self.on_ping_response(lease),
			ty if ty.is_received_lease_request() => {
				self.on_lease_request(lease, route, message);
			}
			ty if ty.is_received_lease_response() => {
				self.on_lease_response(lease, message);
			}
			_ => {}
		}
	}

	fn on_ping_request(&mut self, handle: Handle) {
		let now = self.now();
		let Some(rla) = self.remote_mut(handle) else {
			return;
		};
		if rla.is_expired_or_failed() {
			return;
		}
		if rla.ping_send_time == Ticks::ZERO {
			rla.ping_send_time = now;
		}

		let lease_instance = rla.lease.monitor_identifier;
		let response = self.outgoing(
			handle,
			MessageType::PingResponse,
			lease_instance,
			Durations::new(0, 0, 0),
			Ticks::ZERO,
			LeaseLists::default(),
		);
		if let Some(response) = response {
			self.send_message(handle, &response);
		}
	}

	fn on_ping_response(&mut self, handle: Handle) {
		let Some(rla) = self.remotes.get_mut(handle) else {
			return;
		};

		if rla.lease.subject_state == OneWayLeaseState::Active {
			if rla.lease.monitor_state == OneWayLeaseState::Active {
				rla.in_ping = false;
				self.cancel(handle, TimerKind::Subject);
			}
			return;
		}

		tracing::debug!(
			agent = %self.local,
			peer = %rla.peer,
			"ping answered"
		);

		self.abort_ping(handle);
		let Some(rla) = self.remote(handle) else {
			return;
		};
		if rla.table.has_subjects() {
			self.establish_lease(handle);
		} else if rla.lease.monitor_state == OneWayLeaseState::Inactive {
			self.fail_remote(handle);
		}
	}

	fn on_lease_request(&mut self, lease: Handle, route: Handle, message: &LeaseMessage) {
		let now = self.now();
		let Some(rla) = self.remote(lease) else {
			return;
		};

		if rla.is_expired_or_failed() {
			tracing::debug!(
				agent = %self.local,
				peer = %rla.peer,
				"ignoring request on an expired lease"
			);
			return;
		}

		if message.message_type == MessageType::RelayRequest && rla.is_in_ping() {
			return;
		}

		let response_type = if message.message_type == MessageType::RelayRequest {
			MessageType::ForwardResponse
		} else {
			MessageType::LeaseResponse
		};

		let granted = if rla.lease.monitor_state == OneWayLeaseState::Inactive {
			if message.durations.is_termination() {
				self.answer_termination_without_monitor(lease, route, response_type, message);
				return;
			}
			let Some(granted) = self.accept_new_monitor(lease, route, response_type, message)
			else {
				return;
			};
			granted
		} else {
			if message.lease_instance < rla.lease.monitor_identifier {
				return;
			}
			self.renew_monitor(lease, route, response_type, message)
		};

		let Some(rla) = self.remote(lease) else {
			return;
		};
		if rla.lease.monitor_state != OneWayLeaseState::Active {
			return;
		}

		if message.durations.is_termination() {
			self.update_monitor_timer_for_termination(lease);
			let Some(rla) = self.remote_mut(lease) else {
				return;
			};
			if rla.lease.subject_state == OneWayLeaseState::Active {
				if message.two_way_termination && !rla.table.has_subjects() {
					self.update_subject_timer_for_termination(lease);
					self.fail_remote(lease);
				} else {
					let expire = rla.lease.subject_expire_time;
					let durations = rla.lease.durations;
					rla.lease.set_subject_expire_time(
						expire,
						durations.suspend,
						durations.arbitration,
					);
					self.arm(lease, TimerKind::Subject, expire);
				}
			} else {
				self.fail_remote(lease);
			}
		} else {
			let expire = now.plus_millis(i64::from(granted.lease));
			let pre_arbitration = expire.minus_millis(i64::from(self.config.pre_arbitration_time));
			if let Some(rla) = self.remote_mut(lease) {
				rla.lease.monitor_expire_time = expire;
			}
			self.arm(lease, TimerKind::Monitor, expire);
			self.arm(lease, TimerKind::PreArbitrationMonitor, pre_arbitration);
		}
	}

	/// A termination request for a lease this node never monitored. Echoed
	/// so the peer can finish terminating.
	fn answer_termination_without_monitor(
		&mut self,
		lease: Handle,
		route: Handle,
		response_type: MessageType,
		message: &LeaseMessage,
	) {
		let Some(rla) = self.remote_mut(lease) else {
			return;
		};
		rla.lease.monitor_identifier = message.lease_instance;
		let subject_active = rla.lease.subject_state == OneWayLeaseState::Active;

		let response = self.outgoing(
			lease,
			response_type,
			message.lease_instance,
			Durations::TERMINATION,
			Ticks::MAX,
			LeaseLists::default(),
		);
		if let Some(response) = response {
			self.send_message(route, &response);
		}

		if !subject_active {
			self.fail_remote(lease);
		}
	}

	/// First request on a lease this node is not yet monitoring. Returns the
	/// granted durations, or `None` when no response is due.
	fn accept_new_monitor(
		&mut self,
		lease: Handle,
		route: Handle,
		response_type: MessageType,
		message: &LeaseMessage,
	) -> Option<Durations> {
		let pending = &message.lists[ListKind::SubjectPending];
		let is_renew = pending.is_empty();
		let subject_active =
			self.remote(lease)?.lease.subject_state == OneWayLeaseState::Active;
		let reverse = (!subject_active)
			.then(|| pending.first().map(RelationshipIdentifier::reversed))
			.flatten();

		let lists = self.request_change_state(lease, &message.lists);

		let config = self.config.durations(self.remote(lease)?.lease.duration_type);
		let rla = self.remote_mut(lease)?;
		if rla.is_suspended() && rla.in_two_way_termination && is_renew {
			return None;
		}

		rla.lease.monitor_state = OneWayLeaseState::Active;
		rla.lease.monitor_identifier = message.lease_instance;

		let grant = grant_larger_durations(
			config,
			rla.lease.durations,
			message.durations,
			message.expiration,
		);
		if let Some(preference) = grant.remote_preference {
			rla.lease.remote_durations = preference;
		}

		if subject_active {
			let expire = rla.lease.subject_expire_time;
			rla.lease.set_subject_expire_time(
				expire,
				grant.durations.suspend,
				grant.durations.arbitration,
			);
			self.cancel(lease, TimerKind::Subject);
			self.cancel(lease, TimerKind::PreArbitrationSubject);
			self.set_renew_timer(lease, false, 0);
		}

		let response = self.lease_response(
			lease,
			response_type,
			message.lease_instance,
			grant.durations,
			grant.expiration,
			lists,
		)?;
		self.send_message(route, &response);

		if let Some(reverse) = reverse
			&& self.remote(lease)?.lease.subject_state == OneWayLeaseState::Inactive
		{
			self.establish_reverse_lease(lease, reverse);
		}

		Some(grant.durations)
	}

	/// Renewal or termination of a lease this node already monitors.
	fn renew_monitor(
		&mut self,
		lease: Handle,
		route: Handle,
		response_type: MessageType,
		message: &LeaseMessage,
	) -> Durations {
		let terminating = &message.lists[ListKind::SubjectTerminatePending];
		let terminate_reverse = self.remote(lease).is_some_and(|rla| {
			rla.lease.subject_state == OneWayLeaseState::Active
				&& !terminating.is_empty()
				&& message.durations.is_termination()
		});

		if terminate_reverse {
			self.terminate_reverse_lease(lease, terminating);
		}

		let lists = self.request_change_state(lease, &message.lists);

		let Some(rla) = self.remotes.get_mut(lease) else {
			return message.durations;
		};
		rla.lease.monitor_identifier = message.lease_instance;
		let config = self.config.durations(rla.lease.duration_type);
		let grant = grant_larger_durations(
			config,
			rla.lease.durations,
			message.durations,
			message.expiration,
		);
		if let Some(preference) = grant.remote_preference {
			rla.lease.remote_durations = preference;
		}

		let response = self.lease_response(
			lease,
			response_type,
			message.lease_instance,
			grant.durations,
			grant.expiration,
			lists,
		);

		if let Some(response) = response {
			if terminate_reverse {
				let frame = self.encode(&response);
				if let Some(rla) = self.remote_mut(lease) {
					rla.pending_response = frame;
				}
				self.terminate_subject_send_message(lease, false);
			} else {
				self.send_message(route, &response);
			}
		}

		grant.durations
	}

	fn on_lease_response(&mut self, handle: Handle, message: &LeaseMessage) {
		let Some(rla) = self.remotes.get_mut(handle) else {
			return;
		};

		if message.lease_instance != rla.lease.subject_identifier
			|| rla.lease.subject_expire_time > message.expiration
		{
			return;
		}

		rla.renewed_before = true;
		if rla.lease.subject_state != OneWayLeaseState::Active {
			return;
		}

		if rla.indirect_count != 0 && message.message_type == MessageType::LeaseResponse {
			tracing::debug!(
				agent = %self.local,
				peer = %rla.peer,
				"direct lease restored"
			);
			rla.indirect_count = 0;
		}

		self.response_change_state(handle, &message.lists);

		if message.durations.is_termination() {
			self.update_subject_timer_for_termination(handle);
			return;
		}

		let Some(rla) = self.remote_mut(handle) else {
			return;
		};
		rla.lease.set_durations(message.durations);
		rla.lease.set_subject_expire_time(
			message.expiration,
			message.durations.suspend,
			message.durations.arbitration,
		);
		let monitor_inactive = rla.lease.monitor_state == OneWayLeaseState::Inactive;

		if monitor_inactive {
			self.arm(handle, TimerKind::Subject, message.expiration);
		}
		self.set_renew_timer(handle, false, 0);
		self.cancel(handle, TimerKind::PreArbitrationSubject);
	}

	/// Builds a message about the lease held with `handle`'s peer.
	pub(in crate::agent) fn outgoing(
		&self,
		handle: Handle,
		message_type: MessageType,
		lease_instance: i64,
		durations: Durations,
		expiration: Ticks,
		lists: LeaseLists,
	) -> Option<LeaseMessage> {
		let rla = self.remote(handle)?;
		let mut message =
			self.message(message_type, lease_instance, durations, expiration, lists);
		message.extension = rla.remote_instance;
		if message_type.is_indirect() {
			message.lease_endpoint = Some(rla.peer.clone());
		}
		Some(message)
	}

	/// A response carrying the outcome of the request lists along with the
	/// monitor failures this node still needs acknowledged.
	fn lease_response(
		&self,
		handle: Handle,
		response_type: MessageType,
		lease_instance: i64,
		durations: Durations,
		expiration: Ticks,
		mut lists: LeaseLists,
	) -> Option<LeaseMessage> {
		let rla = self.remote(handle)?;
		lists[ListKind::MonitorFailedPending] =
			rla.table.monitors_in(crate::lease::MonitorSlot::FailedPending);
		self.outgoing(
			handle,
			response_type,
			lease_instance,
			durations,
			expiration,
			lists,
		)
	}
}

/// Whether a message is older than what is already known about the peer.
fn is_stale(rla: &RemoteLeaseAgent, message: &LeaseMessage, now: Ticks) -> bool {
	if message.sender_instance < rla.remote_instance {
		return true;
	}
	if message.sender_instance > rla.remote_instance {
		return false;
	}

	let ty = message.message_type;
	if ty.is_received_lease_request() {
		if message.lease_instance < rla.lease.monitor_identifier {
			return true;
		}
		if message.lease_instance > rla.lease.monitor_identifier {
			return false;
		}
		if rla.is_expired_or_failed() {
			return true;
		}
		!message.durations.is_termination() && (rla.is_orphaned(now) || rla.is_failed())
	} else if ty.is_received_lease_response() {
		message.lease_instance != rla.lease.subject_identifier
			|| rla.lease.subject_state != OneWayLeaseState::Active
	} else {
		false
	}
}

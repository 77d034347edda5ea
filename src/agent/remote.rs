use {
	super::{RemoteSnapshot, timers::TimerSlots},
	crate::{
		lease::{
			AgentState,
			ApplicationId,
			LeaseRelationship,
			OneWayLeaseState,
			RelationshipTable,
		},
		primitives::{Ticks, next_instance},
		transport::SendTarget,
		wire::ListenEndpoint,
	},
	bytes::Bytes,
};

/// This node's view of one peer incarnation.
///
/// A remote lease agent owns the lease relationship with the peer and the
/// relationship identifiers carried over it. Several of them may exist for
/// one peer address while an older incarnation winds down, but only one is
/// active at a time.
pub(super) struct RemoteLeaseAgent {
	pub peer: ListenEndpoint,
	pub target: Option<SendTarget>,
	pub instance: i64,

	/// Instance of the peer's lease agent, zero until first heard from.
	pub remote_instance: i64,
	pub remote_version: u16,

	pub state: AgentState,
	pub lease: LeaseRelationship,
	pub table: RelationshipTable,

	/// Whether this is the agent new traffic for the peer is routed to.
	pub is_active: bool,
	pub in_ping: bool,
	pub in_two_way_termination: bool,

	/// The arbitrator could not decide. Kept around so a late result still
	/// finds it.
	pub arbitration_neutral: bool,

	/// At least one renewal response has been received.
	pub renewed_before: bool,

	/// At least one lease message reached the transport.
	pub message_sent: bool,

	pub ping_send_time: Ticks,
	pub indirect_count: u32,

	/// Deadline after which a failed or orphaned agent may be reclaimed.
	/// Zero while unset.
	pub time_to_be_failed: Ticks,

	/// Application the pending arbitration was handed to.
	pub arbitration_app: Option<ApplicationId>,

	/// Response to a termination request, held back so it goes out right
	/// before our own reverse termination request.
	pub pending_response: Option<Bytes>,

	pub timers: TimerSlots,
}

impl RemoteLeaseAgent {
	pub fn new(peer: ListenEndpoint) -> Self {
		Self {
			peer,
			target: None,
			instance: next_instance(),
			remote_instance: 0,
			remote_version: 0,
			state: AgentState::Open,
			lease: LeaseRelationship::default(),
			table: RelationshipTable::default(),
			is_active: true,
			in_ping: false,
			in_two_way_termination: false,
			arbitration_neutral: false,
			renewed_before: false,
			message_sent: false,
			ping_send_time: Ticks::ZERO,
			indirect_count: 0,
			time_to_be_failed: Ticks::ZERO,
			arbitration_app: None,
			pending_response: None,
			timers: TimerSlots::default(),
		}
	}

	pub const fn is_failed(&self) -> bool {
		matches!(self.state, AgentState::Failed)
	}

	pub const fn is_suspended(&self) -> bool {
		matches!(self.state, AgentState::Suspended)
	}

	pub const fn is_open(&self) -> bool {
		matches!(self.state, AgentState::Open)
	}

	/// Probing the peer before any lease exists.
	pub const fn is_in_ping(&self) -> bool {
		self.is_open() && self.lease.both_inactive() && self.in_ping
	}

	/// Open but carrying no lease and no probe once its grace period is over.
	pub fn is_orphaned(&self, now: Ticks) -> bool {
		self.is_open()
			&& self.lease.both_inactive()
			&& !self.in_ping
			&& now >= self.time_to_be_failed
	}

	/// Open with both one-way leases active.
	pub const fn is_open_two_way(&self) -> bool {
		self.is_open() && self.lease.is_two_way_active()
	}

	/// Holds a lease in either direction and can carry traffic.
	pub const fn is_usable(&self) -> bool {
		self.is_open()
			&& self.is_active
			&& (matches!(self.lease.subject_state, OneWayLeaseState::Active)
				|| matches!(self.lease.monitor_state, OneWayLeaseState::Active))
	}

	/// Either one-way lease has expired or failed.
	pub fn is_expired_or_failed(&self) -> bool {
		self.lease.subject_state >= OneWayLeaseState::Expired
			|| self.lease.monitor_state >= OneWayLeaseState::Expired
	}

	pub fn snapshot(&self) -> RemoteSnapshot {
		let mut subjects = Vec::new();
		let mut monitors = Vec::new();
		for (id, subject, monitor) in self.table.iter() {
			if let Some(slot) = subject {
				subjects.push((id.clone(), slot));
			}
			if let Some(slot) = monitor {
				monitors.push((id.clone(), slot));
			}
		}

		RemoteSnapshot {
			peer: self.peer.clone(),
			instance: self.instance,
			remote_instance: self.remote_instance,
			state: self.state,
			is_active: self.is_active,
			in_ping: self.is_in_ping(),
			arbitration_neutral: self.arbitration_neutral,
			subject_state: self.lease.subject_state,
			monitor_state: self.lease.monitor_state,
			subject_identifier: self.lease.subject_identifier,
			monitor_identifier: self.lease.monitor_identifier,
			durations: self.lease.durations,
			indirect_count: self.indirect_count,
			subjects,
			monitors,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn remote() -> RemoteLeaseAgent {
		RemoteLeaseAgent::new(ListenEndpoint::new("peer", 7).unwrap())
	}

	#[test]
	fn fresh_agent_without_probe_is_orphaned() {
		let mut rla = remote();
		assert!(rla.is_orphaned(Ticks::ZERO));
		rla.in_ping = true;
		assert!(!rla.is_orphaned(Ticks::ZERO));
		assert!(rla.is_in_ping());

		rla.in_ping = false;
		rla.time_to_be_failed = Ticks::from_millis(10);
		assert!(!rla.is_orphaned(Ticks::from_millis(5)));
		assert!(rla.is_orphaned(Ticks::from_millis(10)));
	}

	#[test]
	fn usability_follows_lease_state() {
		let mut rla = remote();
		assert!(!rla.is_usable());
		rla.lease.monitor_state = OneWayLeaseState::Active;
		assert!(rla.is_usable());
		assert!(!rla.is_open_two_way());
		rla.lease.subject_state = OneWayLeaseState::Active;
		assert!(rla.is_open_two_way());
		rla.is_active = false;
		assert!(!rla.is_usable());
		rla.lease.subject_state = OneWayLeaseState::Expired;
		assert!(rla.is_expired_or_failed());
	}
}

use {
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
		wire::ListenEndpoint,
	},
	serde::{Deserialize, Serialize},
};

/// Notifications delivered to a leasing application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaseEvent {
	/// The peer accepted a relationship this application asked for.
	Established {
		remote_app: ApplicationId,
		peer: ListenEndpoint,
	},

	/// A relationship with a remote application ended without a graceful
	/// termination.
	RemoteExpired {
		remote_app: ApplicationId,
		peer: ListenEndpoint,
	},

	/// The local lease agent failed. No further events follow.
	Expired,

	/// The arbitrator must decide which side of a broken lease survives.
	Arbitrate(ArbitrationRequest),

	/// Direct renewal with `peer` is failing and leases are being relayed
	/// through neighbours.
	HealthReport { peer: ListenEndpoint },
}

/// Everything an arbitrator needs to decide a suspected partition.
///
/// The early warning sent ahead of expiration has no `remote_app` and zero
/// TTLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbitrationRequest {
	pub remote_app: Option<ApplicationId>,
	pub peer: ListenEndpoint,

	/// Remaining life of the lease under which this node monitors the peer,
	/// in milliseconds.
	pub monitor_ttl: i64,

	/// Remaining life of the lease under which the peer monitors this node,
	/// in milliseconds.
	pub subject_ttl: i64,

	pub local_instance: i64,
	pub remote_instance: i64,
	pub remote_version: u16,
	pub monitor_identifier: i64,
	pub subject_identifier: i64,

	/// Upper bound, in milliseconds, on how long ago the peer was last heard
	/// from.
	pub last_heard_upper_bound: i64,
}

impl ArbitrationRequest {
	pub const fn is_early_warning(&self) -> bool {
		self.remote_app.is_none()
	}
}

/// The arbitrator's verdict for one remote lease agent.
///
/// A time-to-live of [`TTL_INFINITE`](crate::lease::TTL_INFINITE) means the
/// side survives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbitrationResult {
	pub app: ApplicationId,
	pub peer: ListenEndpoint,
	pub local_instance: i64,
	pub remote_instance: i64,
	pub local_ttl: i32,
	pub remote_ttl: i32,
	pub is_delayed: bool,
}

/// Outcome of [`LeaseAgent::establish`](super::LeaseAgent::establish).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Establishment {
	/// The request is on its way. [`LeaseEvent::Established`] follows once
	/// the peer accepts it.
	Pending(RelationshipIdentifier),

	/// The relationship was already established.
	Established(RelationshipIdentifier),
}

impl Establishment {
	pub const fn relationship(&self) -> &RelationshipIdentifier {
		match self {
			Self::Pending(id) | Self::Established(id) => id,
		}
	}

	pub const fn is_established(&self) -> bool {
		matches!(self, Self::Established(_))
	}
}

/// Largest remaining TTLs, in milliseconds, of the leases held with a remote
/// application. `None` when no lease has a known expiration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteExpiration {
	pub monitor_ttl: Option<i64>,
	pub subject_ttl: Option<i64>,
}

/// Point-in-time view of a lease agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSnapshot {
	pub listen: ListenEndpoint,
	pub instance: i64,
	pub state: AgentState,
	pub applications: Vec<ApplicationId>,
	pub remotes: Vec<RemoteSnapshot>,
}

impl AgentSnapshot {
	/// The remote lease agent currently used for `peer`.
	pub fn active_remote(&self, peer: &ListenEndpoint) -> Option<&RemoteSnapshot> {
		self
			.remotes
			.iter()
			.find(|remote| remote.is_active && &remote.peer == peer)
	}
}

/// Point-in-time view of one remote lease agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSnapshot {
	pub peer: ListenEndpoint,
	pub instance: i64,
	pub remote_instance: i64,
	pub state: AgentState,
	pub is_active: bool,
	pub in_ping: bool,
	pub arbitration_neutral: bool,
	pub subject_state: OneWayLeaseState,
	pub monitor_state: OneWayLeaseState,
	pub subject_identifier: i64,
	pub monitor_identifier: i64,
	pub durations: Durations,
	pub indirect_count: u32,
	pub subjects: Vec<(RelationshipIdentifier, SubjectSlot)>,
	pub monitors: Vec<(RelationshipIdentifier, MonitorSlot)>,
}

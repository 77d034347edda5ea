use {
	super::Durations,
	crate::primitives::Ticks,
	derive_more::Display,
	serde::{Deserialize, Serialize},
};

/// State of one direction of a lease.
///
/// Variants are ordered so that `state >= Expired` reads as "no longer
/// usable".
#[derive(
	Debug,
	Clone,
	Copy,
	PartialEq,
	Eq,
	PartialOrd,
	Ord,
	Hash,
	Display,
	Serialize,
	Deserialize,
)]
pub enum OneWayLeaseState {
	Inactive,
	Active,
	Expired,
	Failed,
}

/// Lifecycle of a lease agent or a remote lease agent.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
pub enum AgentState {
	Open,
	Suspended,
	Failed,
}

/// Which configured lease duration a relationship was established with.
#[derive(
	Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum DurationType {
	#[default]
	Regular,
	AcrossFaultDomain,
}

/// The two one-way leases held between this node and one peer.
///
/// The subject lease is the one under which the peer monitors this node, the
/// monitor lease is the one under which this node monitors the peer.
#[derive(Debug, Clone)]
pub struct LeaseRelationship {
	pub subject_state: OneWayLeaseState,
	pub subject_identifier: i64,
	pub subject_expire_time: Ticks,
	pub subject_suspend_time: Ticks,
	pub subject_fail_time: Ticks,

	pub monitor_state: OneWayLeaseState,
	pub monitor_identifier: i64,
	pub monitor_expire_time: Ticks,

	/// Durations currently in force for this relationship.
	pub durations: Durations,

	/// Durations the peer last asked for, when they differed from ours.
	pub remote_durations: Durations,

	pub duration_type: DurationType,

	/// Set when the configured durations change, so the next request uses the
	/// new values instead of the negotiated ones.
	pub is_duration_updated: bool,

	pub is_renew_retry: bool,
	pub renew_retry_count: u32,
}

impl Default for LeaseRelationship {
	fn default() -> Self {
		Self {
			subject_state: OneWayLeaseState::Inactive,
			subject_identifier: 0,
			subject_expire_time: Ticks::MAX,
			subject_suspend_time: Ticks::MAX,
			subject_fail_time: Ticks::MAX,
			monitor_state: OneWayLeaseState::Inactive,
			monitor_identifier: 0,
			monitor_expire_time: Ticks::MAX,
			durations: Durations::TERMINATION,
			remote_durations: Durations::TERMINATION,
			duration_type: DurationType::Regular,
			is_duration_updated: false,
			is_renew_retry: false,
			renew_retry_count: 0,
		}
	}
}

impl LeaseRelationship {
	/// Sets the subject expiration along with the derived suspend and fail
	/// times. A `MAX` expiration resets all three.
	pub fn set_subject_expire_time(
		&mut self,
		expiration: Ticks,
		suspend_duration: i32,
		arbitration_duration: i32,
	) {
		if expiration.is_max() {
			self.reset_subject_times();
		} else {
			self.subject_expire_time = expiration;
			self.subject_fail_time =
				expiration.plus_millis(i64::from(arbitration_duration));
			self.subject_suspend_time =
				expiration.plus_millis(i64::from(suspend_duration));
		}
	}

	pub const fn reset_subject_times(&mut self) {
		self.subject_expire_time = Ticks::MAX;
		self.subject_suspend_time = Ticks::MAX;
		self.subject_fail_time = Ticks::MAX;
	}

	/// Records negotiated durations unless any of them is the termination
	/// sentinel.
	pub const fn set_durations(&mut self, durations: Durations) {
		if !durations.has_sentinel() {
			self.durations = durations;
		}
	}

	pub const fn is_two_way_active(&self) -> bool {
		matches!(self.subject_state, OneWayLeaseState::Active)
			&& matches!(self.monitor_state, OneWayLeaseState::Active)
	}

	pub const fn both_inactive(&self) -> bool {
		matches!(self.subject_state, OneWayLeaseState::Inactive)
			&& matches!(self.monitor_state, OneWayLeaseState::Inactive)
	}

	pub const fn both_expired(&self) -> bool {
		matches!(self.subject_state, OneWayLeaseState::Expired)
			&& matches!(self.monitor_state, OneWayLeaseState::Expired)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn state_ordering_marks_unusable_leases() {
		assert!(OneWayLeaseState::Expired >= OneWayLeaseState::Expired);
		assert!(OneWayLeaseState::Failed >= OneWayLeaseState::Expired);
		assert!(OneWayLeaseState::Active < OneWayLeaseState::Expired);
		assert!(OneWayLeaseState::Inactive < OneWayLeaseState::Active);
	}

	#[test]
	fn subject_times_follow_expiration() {
		let mut lease = LeaseRelationship::default();
		let exp = Ticks::from_millis(10_000);
		lease.set_subject_expire_time(exp, 2_000, 30_000);
		assert_eq!(lease.subject_expire_time, exp);
		assert_eq!(lease.subject_suspend_time.as_millis(), 12_000);
		assert_eq!(lease.subject_fail_time.as_millis(), 40_000);

		lease.set_subject_expire_time(Ticks::MAX, 2_000, 30_000);
		assert!(lease.subject_expire_time.is_max());
		assert!(lease.subject_suspend_time.is_max());
		assert!(lease.subject_fail_time.is_max());
	}

	#[test]
	fn sentinel_durations_are_not_recorded() {
		let mut lease = LeaseRelationship::default();
		let negotiated = Durations::new(10_000, 2_000, 5_000);
		lease.set_durations(negotiated);
		assert_eq!(lease.durations, negotiated);

		lease.set_durations(Durations::TERMINATION);
		assert_eq!(lease.durations, negotiated);
	}
}

//! Lease duration negotiation.
//!
//! A node never lets a peer shorten the lease, suspend or arbitration
//! durations it is configured with. Both directions of negotiation live here
//! as pure functions over plain values so they can be reasoned about (and
//! tested) independently of any remote lease agent.

use {
	super::LeaseRelationship,
	crate::primitives::Ticks,
	serde::{Deserialize, Serialize},
};

/// Duration value that signals lease termination on the wire.
pub const DURATION_MAX_VALUE: i32 = i32::MAX - 1;

/// Arbitration time-to-live meaning "this side does not fail".
pub const TTL_INFINITE: i32 = i32::MAX;

/// Any strictly positive duration up to and including the termination
/// sentinel.
pub const fn is_valid_duration(duration: i32) -> bool {
	duration > 0 && duration <= DURATION_MAX_VALUE
}

/// Lease, suspend and arbitration durations in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Durations {
	pub lease: i32,
	pub suspend: i32,
	pub arbitration: i32,
}

impl Durations {
	pub const TERMINATION: Self = Self {
		lease: DURATION_MAX_VALUE,
		suspend: DURATION_MAX_VALUE,
		arbitration: DURATION_MAX_VALUE,
	};

	pub const fn new(lease: i32, suspend: i32, arbitration: i32) -> Self {
		Self {
			lease,
			suspend,
			arbitration,
		}
	}

	/// A lease duration equal to the sentinel requests termination.
	pub const fn is_termination(&self) -> bool {
		self.lease == DURATION_MAX_VALUE
	}

	pub const fn has_sentinel(&self) -> bool {
		self.lease == DURATION_MAX_VALUE
			|| self.suspend == DURATION_MAX_VALUE
			|| self.arbitration == DURATION_MAX_VALUE
	}
}

/// Result of granting an incoming request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grant {
	/// Durations to echo back to the requester.
	pub durations: Durations,

	/// Expiration to echo back, extended by however much the lease duration
	/// was raised.
	pub expiration: Ticks,

	/// Set when the requested durations differ from the ones in force and
	/// should be remembered as the peer's preference.
	pub remote_preference: Option<Durations>,
}

/// Grants the larger of the configured and requested durations.
///
/// `current` are the durations in force for the relationship. Termination
/// requests and requests carrying any sentinel pass through unchanged.
pub fn grant_larger_durations(
	config: Durations,
	current: Durations,
	requested: Durations,
	expiration: Ticks,
) -> Grant {
	if requested.has_sentinel() {
		return Grant {
			durations: requested,
			expiration,
			remote_preference: None,
		};
	}

	let remote_preference = (requested != current).then_some(requested);

	let mut granted = requested;
	let mut expiration = expiration;
	if config.lease > granted.lease {
		expiration =
			expiration.plus_millis(i64::from(config.lease) - i64::from(granted.lease));
		granted.lease = config.lease;
	}

	granted.suspend = granted.suspend.max(config.suspend);
	granted.arbitration = granted.arbitration.max(config.arbitration);

	Grant {
		durations: granted,
		expiration,
		remote_preference,
	}
}

/// Picks the durations for an outgoing request.
///
/// Establish requests and requests after a configuration change use the
/// configured values as-is; the monitor may grant more. Otherwise each value
/// is the larger of the configured one and the peer's last preference, so a
/// peer that lowered its own request is not undercut by ours.
pub fn durations_for_request(
	config: Durations,
	lease: &LeaseRelationship,
	subject_inactive: bool,
) -> Durations {
	if lease.is_duration_updated || subject_inactive {
		return config;
	}

	let pick = |remote: i32, local: i32| {
		if remote != DURATION_MAX_VALUE && remote > local {
			remote
		} else {
			local
		}
	};

	Durations {
		lease: pick(lease.remote_durations.lease, config.lease),
		suspend: pick(lease.remote_durations.suspend, config.suspend),
		arbitration: pick(lease.remote_durations.arbitration, config.arbitration),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const CONFIG: Durations = Durations::new(30_000, 2_000, 30_000);

	#[test]
	fn grant_never_shortens_configured_durations() {
		let samples = [1, 500, 2_000, 29_999, 30_000, 30_001, 120_000];
		for lease in samples {
			for suspend in samples {
				for arbitration in samples {
					let requested = Durations::new(lease, suspend, arbitration);
					let grant = grant_larger_durations(
						CONFIG,
						CONFIG,
						requested,
						Ticks::from_millis(1_000),
					);
					assert!(grant.durations.lease >= lease.max(CONFIG.lease));
					assert!(grant.durations.suspend >= suspend.max(CONFIG.suspend));
					assert!(
						grant.durations.arbitration
							>= arbitration.max(CONFIG.arbitration)
					);
				}
			}
		}
	}

	#[test]
	fn shorter_request_extends_expiration_by_delta() {
		let requested = Durations::new(10_000, 2_000, 30_000);
		let grant =
			grant_larger_durations(CONFIG, CONFIG, requested, Ticks::from_millis(50_000));
		assert_eq!(grant.durations.lease, 30_000);
		assert_eq!(grant.expiration.as_millis(), 70_000);
		assert_eq!(grant.remote_preference, Some(requested));
	}

	#[test]
	fn longer_request_is_echoed() {
		let requested = Durations::new(45_000, 5_000, 60_000);
		let grant =
			grant_larger_durations(CONFIG, requested, requested, Ticks::from_millis(7));
		assert_eq!(grant.durations, requested);
		assert_eq!(grant.expiration.as_millis(), 7);
		assert_eq!(grant.remote_preference, None);
	}

	#[test]
	fn termination_passes_through() {
		let grant = grant_larger_durations(
			CONFIG,
			CONFIG,
			Durations::TERMINATION,
			Ticks::MAX,
		);
		assert_eq!(grant.durations, Durations::TERMINATION);
		assert_eq!(grant.expiration, Ticks::MAX);
		assert_eq!(grant.remote_preference, None);
	}

	#[test]
	fn request_durations_honor_remote_preference() {
		let mut lease = LeaseRelationship::default();
		assert_eq!(durations_for_request(CONFIG, &lease, true), CONFIG);

		lease.remote_durations = Durations::new(60_000, 1_000, DURATION_MAX_VALUE);
		assert_eq!(
			durations_for_request(CONFIG, &lease, false),
			Durations::new(60_000, 2_000, 30_000)
		);

		lease.is_duration_updated = true;
		assert_eq!(durations_for_request(CONFIG, &lease, false), CONFIG);
	}

	#[test]
	fn duration_validity() {
		assert!(is_valid_duration(1));
		assert!(is_valid_duration(DURATION_MAX_VALUE));
		assert!(!is_valid_duration(0));
		assert!(!is_valid_duration(-5));
		assert!(!is_valid_duration(i32::MAX));
	}
}

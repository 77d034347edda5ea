//! Lease relationship model: identifiers, per-peer lease state and duration
//! negotiation.

mod durations;
mod identifier;
mod state;

pub use {
	durations::{
		DURATION_MAX_VALUE,
		Durations,
		Grant,
		TTL_INFINITE,
		durations_for_request,
		grant_larger_durations,
		is_valid_duration,
	},
	identifier::{
		ApplicationId,
		InvalidIdentifier,
		MonitorSlot,
		Perspective,
		RelationshipIdentifier,
		RelationshipTable,
		SubjectSlot,
	},
	state::{AgentState, DurationType, LeaseRelationship, OneWayLeaseState},
};

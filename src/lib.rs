//! # Lease Agent
//!
//! Peer-to-peer failure detection through mutual leases.
//!
//! Every node runs a [`LeaseAgent`]. Applications registered with it form
//! relationships with applications on other nodes, in which one side (the
//! subject) is kept alive by leases the other side (the monitor) grants and
//! renews. When a lease cannot be renewed, directly or through neighbours,
//! the decision of which side survives is handed to an arbitrating
//! application.

pub mod agent;
pub mod lease;
pub mod primitives;
pub mod transport;
pub mod wire;

pub use {
	agent::{
		Application,
		ArbitrationRequest,
		ArbitrationResult,
		Config,
		Error,
		Establishment,
		LeaseAgent,
		LeaseEvent,
	},
	bytes::Bytes,
	lease::{ApplicationId, DurationType, RelationshipIdentifier},
	transport::{LoopbackNetwork, Transport},
	wire::ListenEndpoint,
};

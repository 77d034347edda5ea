use crate::{
	lease::{ApplicationId, InvalidIdentifier, RelationshipIdentifier},
	transport::TransportError,
	wire::ListenEndpoint,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
	#[error("Lease agent has failed")]
	AgentFailed,

	#[error("Leasing application {0} is not registered")]
	ApplicationNotFound(ApplicationId),

	#[error("Leasing application {0} is already registered")]
	ApplicationExists(ApplicationId),

	#[error("No lease relationship {0}")]
	RelationshipNotFound(RelationshipIdentifier),

	#[error("No matching remote lease agent for {0}")]
	RemoteNotFound(ListenEndpoint),

	#[error("Remote lease agent for {0} is suspended, retry later")]
	Retry(ListenEndpoint),

	#[error("Lease relationship {0} is still being terminated")]
	TerminationPending(RelationshipIdentifier),

	#[error("Invalid identifier: {0}")]
	InvalidIdentifier(#[from] InvalidIdentifier),

	#[error("Invalid lease durations: {0}")]
	InvalidDurations(String),

	#[error("Transport error: {0}")]
	Transport(#[from] TransportError),

	#[error("Operation Cancelled")]
	Cancelled,
}

//! Transport seam.
//!
//! Lease agents exchange opaque frames with their peers through a
//! [`Transport`]. Framing, connection management and security live below
//! this boundary; the agent only needs to resolve a peer, send a frame to it
//! without blocking, and receive the frames addressed to its own endpoint.

mod loopback;

use {
	crate::wire::ListenEndpoint,
	bytes::Bytes,
	tokio::sync::mpsc::UnboundedReceiver,
};

pub use loopback::LoopbackNetwork;

/// Frames received on a bound listen endpoint.
pub type Inbound = UnboundedReceiver<Bytes>;

/// A resolved route from a local listener to a peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SendTarget {
	pub local: ListenEndpoint,
	pub peer: ListenEndpoint,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
	#[error("listen endpoint {0} is already bound")]
	AddressInUse(ListenEndpoint),

	#[error("no listener at {0}")]
	Unreachable(ListenEndpoint),

	#[error("listener {0} is closed")]
	Closed(ListenEndpoint),
}

pub trait Transport: Send + Sync + 'static {
	/// Starts listening on `local` and returns the stream of frames sent to
	/// it.
	fn bind(&self, local: &ListenEndpoint) -> Result<Inbound, TransportError>;

	/// Prepares a route from `local` to `peer`.
	fn resolve(
		&self,
		local: &ListenEndpoint,
		peer: &ListenEndpoint,
	) -> Result<SendTarget, TransportError>;

	/// Queues a frame for delivery. `Ok` means the frame left this node, not
	/// that it arrived.
	fn send(&self, target: &SendTarget, frame: Bytes) -> Result<(), TransportError>;

	/// Drops the connection behind `target`. Later sends reconnect.
	fn abort(&self, target: &SendTarget);

	/// Stops the listener on `local`.
	fn close(&self, local: &ListenEndpoint);

	fn is_closed(&self, local: &ListenEndpoint) -> bool;
}

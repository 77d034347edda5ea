//! In-process transport used by tests and single-process deployments.

use {
	super::{Inbound, SendTarget, Transport, TransportError},
	crate::wire::ListenEndpoint,
	bytes::Bytes,
	parking_lot::RwLock,
	std::{
		collections::{HashMap, HashSet},
		sync::Arc,
	},
	tokio::sync::mpsc::{UnboundedSender, unbounded_channel},
};

#[derive(Default)]
struct State {
	listeners: HashMap<ListenEndpoint, UnboundedSender<Bytes>>,
	closed: HashSet<ListenEndpoint>,
	blocked: HashSet<(ListenEndpoint, ListenEndpoint)>,
	delivered: u64,
	dropped: u64,
}

/// A set of listeners in one process that deliver frames to each other
/// through channels.
///
/// Links can be blocked per direction to simulate partitions. Frames sent
/// over a blocked link are silently lost, the same way a broken network path
/// loses them.
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
	state: Arc<RwLock<State>>,
}

impl LoopbackNetwork {
	pub fn new() -> Self {
		Self::default()
	}

	/// Drops every frame sent from `from` to `to` until unblocked.
	pub fn block(&self, from: &ListenEndpoint, to: &ListenEndpoint) {
		tracing::debug!(%from, %to, "loopback link blocked");
		self.state.write().blocked.insert((from.clone(), to.clone()));
	}

	pub fn unblock(&self, from: &ListenEndpoint, to: &ListenEndpoint) {
		tracing::debug!(%from, %to, "loopback link unblocked");
		self
			.state
			.write()
			.blocked
			.remove(&(from.clone(), to.clone()));
	}

	/// Blocks both directions between two endpoints.
	pub fn partition(&self, a: &ListenEndpoint, b: &ListenEndpoint) {
		self.block(a, b);
		self.block(b, a);
	}

	pub fn heal(&self, a: &ListenEndpoint, b: &ListenEndpoint) {
		self.unblock(a, b);
		self.unblock(b, a);
	}

	/// Frames handed to a listener so far.
	pub fn delivered(&self) -> u64 {
		self.state.read().delivered
	}

	/// Frames lost to blocked links so far.
	pub fn dropped(&self) -> u64 {
		self.state.read().dropped
	}

	/// Delivers a raw frame to `to` as if a peer had sent it.
	pub fn inject(&self, to: &ListenEndpoint, frame: Bytes) -> Result<(), TransportError> {
		let mut state = self.state.write();
		let listener = state
			.listeners
			.get(to)
			.ok_or_else(|| TransportError::Unreachable(to.clone()))?;
		if listener.send(frame).is_err() {
			return Err(TransportError::Closed(to.clone()));
		}
		state.delivered += 1;
		Ok(())
	}
}

impl Transport for LoopbackNetwork {
	fn bind(&self, local: &ListenEndpoint) -> Result<Inbound, TransportError> {
		let mut state = self.state.write();
		if let Some(existing) = state.listeners.get(local)
			&& !existing.is_closed()
		{
			return Err(TransportError::AddressInUse(local.clone()));
		}

		let (sender, receiver) = unbounded_channel();
		state.listeners.insert(local.clone(), sender);
		state.closed.remove(local);
		Ok(receiver)
	}

	fn resolve(
		&self,
		local: &ListenEndpoint,
		peer: &ListenEndpoint,
	) -> Result<SendTarget, TransportError> {
		if self.state.read().closed.contains(local) {
			return Err(TransportError::Closed(local.clone()));
		}

		Ok(SendTarget {
			local: local.clone(),
			peer: peer.clone(),
		})
	}

	fn send(&self, target: &SendTarget, frame: Bytes) -> Result<(), TransportError> {
		let mut state = self.state.write();
		if state.closed.contains(&target.local) {
			return Err(TransportError::Closed(target.local.clone()));
		}

		if state
			.blocked
			.contains(&(target.local.clone(), target.peer.clone()))
		{
			state.dropped += 1;
			tracing::trace!(
				from = %target.local,
				to = %target.peer,
				"loopback frame dropped"
			);
			return Ok(());
		}

		let delivered = state
			.listeners
			.get(&target.peer)
			.is_some_and(|listener| listener.send(frame).is_ok());

		if delivered {
			state.delivered += 1;
			Ok(())
		} else {
			Err(TransportError::Unreachable(target.peer.clone()))
		}
	}

	fn abort(&self, target: &SendTarget) {
		tracing::trace!(
			from = %target.local,
			to = %target.peer,
			"loopback connection aborted"
		);
	}

	fn close(&self, local: &ListenEndpoint) {
		let mut state = self.state.write();
		state.listeners.remove(local);
		state.closed.insert(local.clone());
	}

	fn is_closed(&self, local: &ListenEndpoint) -> bool {
		self.state.read().closed.contains(local)
	}
}

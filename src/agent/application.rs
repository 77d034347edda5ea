use {
	super::LeaseEvent,
	crate::{lease::ApplicationId, primitives::Ticks},
	core::{
		pin::Pin,
		task::{Context, Poll},
	},
	futures::Stream,
	tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
	tokio_util::time::delay_queue::Key,
};

/// A leasing application registered with a lease agent.
///
/// Receives the [`LeaseEvent`]s for every relationship the application takes
/// part in. The stream ends when the application is unregistered or the
/// agent goes away.
pub struct Application {
	id: ApplicationId,
	arbitration_enabled: bool,
	events: UnboundedReceiver<LeaseEvent>,
}

impl Application {
	pub const fn id(&self) -> &ApplicationId {
		&self.id
	}

	pub const fn arbitration_enabled(&self) -> bool {
		self.arbitration_enabled
	}

	/// Waits for the next event.
	pub async fn next_event(&mut self) -> Option<LeaseEvent> {
		self.events.recv().await
	}

	/// Returns an event that is already queued, if any.
	pub fn try_next_event(&mut self) -> Option<LeaseEvent> {
		self.events.try_recv().ok()
	}
}

impl Stream for Application {
	type Item = LeaseEvent;

	fn poll_next(
		mut self: Pin<&mut Self>,
		cx: &mut Context<'_>,
	) -> Poll<Option<Self::Item>> {
		self.events.poll_recv(cx)
	}
}

impl core::fmt::Debug for Application {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_struct("Application")
			.field("id", &self.id)
			.field("arbitration_enabled", &self.arbitration_enabled)
			.finish_non_exhaustive()
	}
}

/// Worker-side record of a registered application.
pub(super) struct ApplicationState {
	pub arbitration_enabled: bool,
	events: UnboundedSender<LeaseEvent>,

	/// Caps the TTL reported to the application. `MAX` when unset.
	pub global_lease_expire_time: Ticks,

	/// Furthest point in time a TTL query has promised the application.
	pub last_grant_expire_time: Ticks,

	/// Pending unregister timer, set once unregistering has started.
	pub unregister: Option<Key>,
}

impl ApplicationState {
	pub fn new(id: ApplicationId, arbitration_enabled: bool) -> (Self, Application) {
		let (tx, rx) = unbounded_channel();
		let state = Self {
			arbitration_enabled,
			events: tx,
			global_lease_expire_time: Ticks::MAX,
			last_grant_expire_time: Ticks::MAX,
			unregister: None,
		};
		let handle = Application {
			id,
			arbitration_enabled,
			events: rx,
		};
		(state, handle)
	}

	pub const fn is_being_unregistered(&self) -> bool {
		self.unregister.is_some()
	}

	/// Delivers an event. An application that dropped its handle simply
	/// stops hearing about its leases.
	pub fn notify(&self, event: LeaseEvent) {
		if self.events.send(event).is_err() {
			tracing::trace!("leasing application handle dropped, event discarded");
		}
	}
}

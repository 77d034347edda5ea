//! Lease agents.
//!
//! A [`LeaseAgent`] listens on one endpoint and maintains leases with the
//! agents of its peers on behalf of the applications registered with it. All
//! protocol state lives in a single background worker task. The handle
//! returned by [`LeaseAgent::open`] only forwards requests to it.
//!
//! Notes:
//!
//! - [`LeaseAgent`] is cheap to clone. All clones refer to the same worker.
//!
//! - The worker is cancelled when the last clone is dropped.
//!
//! - Applications receive lease notifications through the [`Application`]
//!   returned by [`LeaseAgent::register`].

mod application;
mod commands;
mod config;
mod error;
mod event;
mod protocol;
mod remote;
mod timers;
mod worker;

use {
	crate::{
		lease::{ApplicationId, DurationType, Durations},
		primitives::Short,
		transport::Transport,
		wire::ListenEndpoint,
	},
	core::fmt,
	std::sync::Arc,
	tokio::sync::{mpsc::UnboundedSender, oneshot},
	tokio_util::sync::DropGuard,
	worker::{Reply, WorkerCommand, WorkerLoop},
};

pub use {
	application::Application,
	config::{Config, ConfigBuilder},
	error::Error,
	event::{
		AgentSnapshot,
		ArbitrationRequest,
		ArbitrationResult,
		Establishment,
		LeaseEvent,
		RemoteExpiration,
		RemoteSnapshot,
	},
};

/// Handle to a running lease agent.
pub struct LeaseAgent(Arc<Inner>);

impl Clone for LeaseAgent {
	fn clone(&self) -> Self {
		Self(Arc::clone(&self.0))
	}
}

struct Inner {
	listen: ListenEndpoint,
	instance: i64,
	commands: UnboundedSender<WorkerCommand>,
	_abort: DropGuard,
}

impl LeaseAgent {
	/// Binds `config.listen` on `transport` and starts the agent.
	pub fn open(config: Config, transport: Arc<dyn Transport>) -> Result<Self, Error> {
		config.check().map_err(Error::InvalidDurations)?;

		let listen = config.listen.clone();
		let worker = WorkerLoop::spawn(config, transport)?;

		Ok(Self(Arc::new(Inner {
			listen,
			instance: worker.instance,
			commands: worker.commands,
			_abort: worker.cancel.drop_guard(),
		})))
	}

	/// The endpoint this agent listens on.
	pub fn listen(&self) -> &ListenEndpoint {
		&self.0.listen
	}

	/// Identifies this incarnation of the agent to its peers.
	pub fn instance(&self) -> i64 {
		self.0.instance
	}

	/// Registers a leasing application.
	///
	/// Only applications with `arbitration_enabled` are asked to arbitrate
	/// suspected partitions.
	pub async fn register(
		&self,
		id: ApplicationId,
		arbitration_enabled: bool,
	) -> Result<Application, Error> {
		self
			.request(|reply| WorkerCommand::Register {
				id,
				arbitration_enabled,
				reply,
			})
			.await
	}

	/// Unregisters an application and terminates its relationships.
	///
	/// With `delayed` the relationships are kept until the TTLs already
	/// granted to the application have run out.
	pub async fn unregister(&self, id: ApplicationId, delayed: bool) -> Result<(), Error> {
		self
			.request(|reply| WorkerCommand::Unregister { id, delayed, reply })
			.await
	}

	/// Asks the agent at `peer` to have `remote_app` monitor `app`.
	pub async fn establish(
		&self,
		app: ApplicationId,
		remote_app: ApplicationId,
		peer: ListenEndpoint,
		duration_type: DurationType,
	) -> Result<Establishment, Error> {
		self
			.request(|reply| WorkerCommand::Establish {
				app,
				remote_app,
				peer,
				duration_type,
				reply,
			})
			.await
	}

	/// Gracefully ends the relationship in which `remote_app` at `peer`
	/// monitors `app`.
	pub async fn terminate(
		&self,
		app: ApplicationId,
		remote_app: ApplicationId,
		peer: ListenEndpoint,
	) -> Result<(), Error> {
		self
			.request(|reply| WorkerCommand::Terminate {
				app,
				remote_app,
				peer,
				reply,
			})
			.await
	}

	/// Delivers the verdict for an [`ArbitrationRequest`].
	pub async fn complete_arbitration(&self, result: ArbitrationResult) -> Result<(), Error> {
		self
			.request(|reply| WorkerCommand::CompleteArbitration { result, reply })
			.await
	}

	/// Changes the lease durations, in milliseconds, requested on the next
	/// renewals.
	pub async fn update_lease_duration(
		&self,
		regular: i32,
		across_fault_domain: i32,
	) -> Result<(), Error> {
		self
			.request(|reply| WorkerCommand::UpdateDurations {
				regular,
				across_fault_domain,
				reply,
			})
			.await
	}

	pub async fn remote_lease_expiration(
		&self,
		app: ApplicationId,
		remote_app: ApplicationId,
	) -> Result<RemoteExpiration, Error> {
		self
			.request(|reply| WorkerCommand::RemoteExpiration {
				app,
				remote_app,
				reply,
			})
			.await
	}

	/// Time, in milliseconds, `app` may assume its leases hold.
	///
	/// A positive `request_ttl` grants up to that much and the agent will
	/// not report a failure before the grant runs out.
	pub async fn application_ttl(
		&self,
		app: ApplicationId,
		request_ttl: i32,
	) -> Result<i32, Error> {
		self
			.request(|reply| WorkerCommand::ApplicationTtl {
				app,
				request_ttl,
				reply,
			})
			.await
	}

	/// Caps every TTL granted to `app` at `ttl` milliseconds from now.
	pub async fn set_global_lease_expiration(
		&self,
		app: ApplicationId,
		ttl: i32,
	) -> Result<(), Error> {
		self
			.request(|reply| WorkerCommand::SetGlobalExpiration { app, ttl, reply })
			.await
	}

	/// The durations this agent currently requests for `duration_type`.
	pub async fn lease_durations(&self, duration_type: DurationType) -> Result<Durations, Error> {
		self
			.request(|reply| WorkerCommand::LeaseDurations {
				duration_type,
				reply,
			})
			.await
	}

	pub async fn snapshot(&self) -> Result<AgentSnapshot, Error> {
		self
			.request(|reply| WorkerCommand::Snapshot { reply })
			.await
	}

	/// Shuts the agent down.
	///
	/// With `fault_leases` applications and peers observe the shutdown as a
	/// lease failure. Otherwise the listener closes right away.
	pub async fn close(&self, fault_leases: bool) -> Result<(), Error> {
		self
			.request(|reply| WorkerCommand::Close {
				fault_leases,
				reply,
			})
			.await
	}

	async fn request<T>(
		&self,
		command: impl FnOnce(Reply<T>) -> WorkerCommand,
	) -> Result<T, Error> {
		let (tx, rx) = oneshot::channel();
		self
			.0
			.commands
			.send(command(tx))
			.map_err(|_| Error::Cancelled)?;
		rx.await.map_err(|_| Error::Cancelled)?
	}
}

impl fmt::Debug for LeaseAgent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("LeaseAgent")
			.field("listen", &self.0.listen)
			.field("instance", &Short(self.0.instance))
			.finish_non_exhaustive()
	}
}

use {
	super::{
		AgentSnapshot,
		Application,
		ArbitrationResult,
		Config,
		Error,
		Establishment,
		LeaseEvent,
		RemoteExpiration,
		application::ApplicationState,
		remote::RemoteLeaseAgent,
		timers::{TimerEntry, TimerKind, Timers},
	},
	crate::{
		lease::{
			AgentState,
			ApplicationId,
			DurationType,
			Durations,
			Perspective,
			RelationshipIdentifier,
		},
		primitives::{Arena, Clock, Handle, Short, Ticks, next_instance},
		transport::{Inbound, Transport},
		wire::{LeaseLists, LeaseMessage, ListenEndpoint, MessageType, current_version},
	},
	bytes::Bytes,
	futures::StreamExt,
	rand::Rng,
	std::{collections::BTreeMap, sync::Arc},
	tokio::sync::{
		mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
		oneshot,
	},
	tokio_util::{sync::CancellationToken, time::delay_queue::Key},
};

pub(super) type Reply<T> = oneshot::Sender<Result<T, Error>>;

/// Requests from [`LeaseAgent`](super::LeaseAgent) handles to the worker.
pub(super) enum WorkerCommand {
	Register {
		id: ApplicationId,
		arbitration_enabled: bool,
		reply: Reply<Application>,
	},
	Unregister {
		id: ApplicationId,
		delayed: bool,
		reply: Reply<()>,
	},
	Establish {
		app: ApplicationId,
		remote_app: ApplicationId,
		peer: ListenEndpoint,
		duration_type: DurationType,
		reply: Reply<Establishment>,
	},
	Terminate {
		app: ApplicationId,
		remote_app: ApplicationId,
		peer: ListenEndpoint,
		reply: Reply<()>,
	},
	CompleteArbitration {
		result: ArbitrationResult,
		reply: Reply<()>,
	},
	UpdateDurations {
		regular: i32,
		across_fault_domain: i32,
		reply: Reply<()>,
	},
	RemoteExpiration {
		app: ApplicationId,
		remote_app: ApplicationId,
		reply: Reply<RemoteExpiration>,
	},
	ApplicationTtl {
		app: ApplicationId,
		request_ttl: i32,
		reply: Reply<i32>,
	},
	SetGlobalExpiration {
		app: ApplicationId,
		ttl: i32,
		reply: Reply<()>,
	},
	LeaseDurations {
		duration_type: DurationType,
		reply: Reply<Durations>,
	},
	Snapshot {
		reply: Reply<AgentSnapshot>,
	},
	Close {
		fault_leases: bool,
		reply: Reply<()>,
	},
}

/// Handle to a spawned worker loop.
pub(super) struct WorkerHandle {
	pub commands: UnboundedSender<WorkerCommand>,
	pub cancel: CancellationToken,
	pub instance: i64,
}

/// Lease agent worker loop.
///
/// Owns every piece of mutable state of one lease agent: the remote lease
/// agents, the registered applications and the timer wheel. Inbound frames,
/// handle commands and expired timers are handled one at a time, so protocol
/// code never needs a lock.
pub(super) struct WorkerLoop {
	pub(super) config: Config,
	pub(super) local: ListenEndpoint,
	pub(super) instance: i64,
	pub(super) state: AgentState,
	pub(super) clock: Clock,
	pub(super) transport: Arc<dyn Transport>,
	pub(super) remotes: Arena<RemoteLeaseAgent>,
	pub(super) applications: BTreeMap<ApplicationId, ApplicationState>,
	pub(super) timers: Timers,

	/// Pending delayed lease failure.
	pub(super) delayed_failure: Option<Key>,

	/// Pending delayed listener close.
	pub(super) delayed_close: Option<Key>,

	/// Deadline for failing an idle agent, zero while unset.
	pub(super) time_to_be_failed: Ticks,

	/// Consecutive indirect rounds allowed per renewal.
	pub(super) indirect_limit: u32,

	inbound: Option<Inbound>,
	commands: UnboundedReceiver<WorkerCommand>,
	cancel: CancellationToken,
}

impl WorkerLoop {
	/// Binds the listen endpoint and spawns the worker loop as a background
	/// task.
	pub(super) fn spawn(
		config: Config,
		transport: Arc<dyn Transport>,
	) -> Result<WorkerHandle, Error> {
		let inbound = transport.bind(&config.listen)?;
		let (commands_tx, commands_rx) = unbounded_channel();
		let cancel = CancellationToken::new();
		let clock = Clock::new();
		let instance = next_instance();

		let worker = Self {
			local: config.listen.clone(),
			indirect_limit: config.indirect_limit(),
			config,
			instance,
			state: AgentState::Open,
			clock,
			transport,
			remotes: Arena::new(),
			applications: BTreeMap::new(),
			timers: Timers::new(clock),
			delayed_failure: None,
			delayed_close: None,
			time_to_be_failed: Ticks::ZERO,
			inbound: Some(inbound),
			commands: commands_rx,
			cancel: cancel.clone(),
		};

		tracing::info!(
			agent = %worker.local,
			instance = %Short(instance),
			"lease agent opened"
		);

		tokio::spawn(worker.run());

		Ok(WorkerHandle {
			commands: commands_tx,
			cancel,
			instance,
		})
	}

	async fn run(mut self) {
		self.arm_maintenance();

		loop {
			tokio::select! {
				() = self.cancel.cancelled() => {
					self.on_terminated();
					break;
				}

				// Requests from lease agent handles
				command = self.commands.recv() => match command {
					Some(command) => self.on_command(command),
					None => {
						self.on_terminated();
						break;
					}
				},

				// Lease messages from peers
				Some(frame) = recv_frame(&mut self.inbound) => {
					self.on_frame(&frame);
				}

				// Expired timers
				Some((entry, key)) = self.timers.next() => {
					self.on_timer(entry, key);
				}
			}
		}
	}

	/// Stops accepting lease messages.
	pub(super) fn close_listener(&mut self) {
		tracing::debug!(agent = %self.local, "closing listener");
		self.transport.close(&self.local);
		self.inbound = None;
	}

	fn on_terminated(&mut self) {
		tracing::debug!(agent = %self.local, "lease agent worker terminating");
		if !self.transport.is_closed(&self.local) {
			self.transport.close(&self.local);
		}
	}

	fn on_command(&mut self, command: WorkerCommand) {
		match command {
			WorkerCommand::Register {
				id,
				arbitration_enabled,
				reply,
			} => {
				let _ = reply.send(self.register_application(id, arbitration_enabled));
			}
			WorkerCommand::Unregister { id, delayed, reply } => {
				let _ = reply.send(self.unregister_application(&id, delayed));
			}
			WorkerCommand::Establish {
				app,
				remote_app,
				peer,
				duration_type,
				reply,
			} => {
				let result = self.establish(app, remote_app, &peer, duration_type);
				let _ = reply.send(result);
			}
			WorkerCommand::Terminate {
				app,
				remote_app,
				peer,
				reply,
			} => {
				let _ = reply.send(self.terminate(app, remote_app, &peer));
			}
			WorkerCommand::CompleteArbitration { result, reply } => {
				let _ = reply.send(self.complete_arbitration(&result));
			}
			WorkerCommand::UpdateDurations {
				regular,
				across_fault_domain,
				reply,
			} => {
				let result = self.update_lease_duration(regular, across_fault_domain);
				let _ = reply.send(result);
			}
			WorkerCommand::RemoteExpiration {
				app,
				remote_app,
				reply,
			} => {
				let _ = reply.send(self.remote_lease_expiration(&app, &remote_app));
			}
			WorkerCommand::ApplicationTtl {
				app,
				request_ttl,
				reply,
			} => {
				let result = self.application_ttl_query(&app, request_ttl);
				let _ = reply.send(result);
			}
			WorkerCommand::SetGlobalExpiration { app, ttl, reply } => {
				let _ = reply.send(self.set_global_lease_expiration(&app, ttl));
			}
			WorkerCommand::LeaseDurations {
				duration_type,
				reply,
			} => {
				let _ = reply.send(Ok(self.config.durations(duration_type)));
			}
			WorkerCommand::Snapshot { reply } => {
				let _ = reply.send(Ok(self.snapshot()));
			}
			WorkerCommand::Close {
				fault_leases,
				reply,
			} => {
				self.close(fault_leases);
				let _ = reply.send(Ok(()));
			}
		}
	}

	fn on_timer(&mut self, entry: TimerEntry, key: Key) {
		match entry {
			TimerEntry::Remote(handle, kind) => {
				let Some(rla) = self.remotes.get_mut(handle) else {
					return;
				};
				if !rla.timers.fired(kind, key) {
					return;
				}
				tracing::trace!(
					agent = %self.local,
					peer = %rla.peer,
					timer = %kind,
					"timer fired"
				);
				self.on_remote_timer(handle, kind);
			}
			TimerEntry::DelayedFailure => {
				if self.delayed_failure == Some(key) {
					self.delayed_failure = None;
					self.on_delayed_lease_failure();
				}
			}
			TimerEntry::DelayedClose => {
				if self.delayed_close == Some(key) {
					self.delayed_close = None;
					self.close_listener();
				}
			}
			TimerEntry::Unregister(id) => {
				let current = self
					.applications
					.get(&id)
					.is_some_and(|app| app.unregister == Some(key));
				if current {
					self.on_unregister_timer(&id);
				}
			}
			TimerEntry::Maintenance => {
				self.do_maintenance();
				self.arm_maintenance();
			}
		}
	}

	fn on_remote_timer(&mut self, handle: Handle, kind: TimerKind) {
		match kind {
			TimerKind::Subject => self.on_subject_expired(handle),
			TimerKind::Monitor => self.on_monitor_expired(handle),
			TimerKind::RenewOrArbitrate => self.on_renew_or_arbitrate(handle),
			TimerKind::PreArbitrationSubject | TimerKind::PreArbitrationMonitor => {
				self.on_pre_arbitration(handle);
			}
			TimerKind::PostArbitration => self.on_post_arbitration(handle),
			TimerKind::PingRetry => self.on_ping_retry(handle),
		}
	}

	/// Schedules the next maintenance sweep, spread by up to a tenth of the
	/// interval so agents opened together do not sweep in lockstep.
	fn arm_maintenance(&mut self) {
		let interval = self.config.maintenance_interval;
		let millis = i64::try_from(interval.as_millis()).unwrap_or(i64::MAX);
		let jitter = rand::rng().random_range(0..=millis / 10);
		let deadline = self.clock.now().plus_millis(millis + jitter);
		self.timers.insert(TimerEntry::Maintenance, deadline);
	}
}

/// Receives the next inbound frame. Never resolves once the listener is
/// gone.
async fn recv_frame(inbound: &mut Option<Inbound>) -> Option<Bytes> {
	match inbound {
		Some(receiver) => receiver.recv().await,
		None => core::future::pending().await,
	}
}

// Shared helpers used across the protocol modules.
impl WorkerLoop {
	pub(super) fn now(&self) -> Ticks {
		self.clock.now()
	}

	pub(super) const fn is_failed(&self) -> bool {
		matches!(self.state, AgentState::Failed)
	}

	pub(super) fn remote(&self, handle: Handle) -> Option<&RemoteLeaseAgent> {
		self.remotes.get(handle)
	}

	pub(super) fn remote_mut(
		&mut self,
		handle: Handle,
	) -> Option<&mut RemoteLeaseAgent> {
		self.remotes.get_mut(handle)
	}

	pub(super) fn arm(&mut self, handle: Handle, kind: TimerKind, deadline: Ticks) {
		if let Some(rla) = self.remotes.get_mut(handle) {
			self.timers.arm(&mut rla.timers, handle, kind, deadline);
		}
	}

	pub(super) fn cancel(&mut self, handle: Handle, kind: TimerKind) {
		if let Some(rla) = self.remotes.get_mut(handle) {
			self.timers.cancel(&mut rla.timers, kind);
		}
	}

	/// Fails a remote lease agent. Cancels its timers and forgets its
	/// relationships. Failing twice is a no-op.
	pub(super) fn fail_remote(&mut self, handle: Handle) {
		let Some(rla) = self.remotes.get_mut(handle) else {
			return;
		};
		if rla.is_failed() {
			return;
		}

		self.timers.cancel_all(&mut rla.timers);
		rla.state = AgentState::Failed;
		rla.in_ping = false;
		rla.pending_response = None;
		rla.table.clear();

		tracing::debug!(
			agent = %self.local,
			peer = %rla.peer,
			instance = %Short(rla.instance),
			"remote lease agent failed"
		);
	}

	/// Fails a remote lease agent and drops its connection.
	pub(super) fn disconnect_remote(&mut self, handle: Handle) {
		self.fail_remote(handle);
		if let Some(rla) = self.remotes.get_mut(handle)
			&& let Some(target) = rla.target.take()
		{
			self.transport.abort(&target);
		}
	}

	/// Builds a message originating from this agent.
	pub(super) fn message(
		&self,
		message_type: MessageType,
		lease_instance: i64,
		durations: Durations,
		expiration: Ticks,
		lists: LeaseLists,
	) -> LeaseMessage {
		LeaseMessage {
			version: current_version(),
			message_type,
			message_id: next_instance(),
			lease_instance,
			sender_instance: self.instance,
			durations,
			expiration,
			two_way_termination: false,
			lists,
			message_endpoint: self.local.clone(),
			lease_endpoint: None,
			extension: 0,
		}
	}

	/// Encodes a message, logging and discarding it when it cannot be.
	pub(super) fn encode(&self, message: &LeaseMessage) -> Option<Bytes> {
		match message.encode() {
			Ok(frame) => Some(frame),
			Err(error) => {
				tracing::warn!(
					agent = %self.local,
					message_type = %message.message_type,
					%error,
					"failed to encode lease message"
				);
				None
			}
		}
	}

	/// Hands a frame to the transport on the route of a remote lease agent.
	/// Returns whether the frame left this node.
	pub(super) fn send_frame(&mut self, handle: Handle, frame: Bytes) -> bool {
		let Some(rla) = self.remotes.get_mut(handle) else {
			return false;
		};

		if rla.target.is_none() {
			match self.transport.resolve(&self.local, &rla.peer) {
				Ok(target) => rla.target = Some(target),
				Err(error) => {
					tracing::debug!(
						agent = %self.local,
						peer = %rla.peer,
						%error,
						"failed to resolve peer"
					);
					return false;
				}
			}
		}

		let Some(target) = rla.target.as_ref() else {
			return false;
		};

		match self.transport.send(target, frame) {
			Ok(()) => {
				rla.message_sent = true;
				true
			}
			Err(error) => {
				tracing::debug!(
					agent = %self.local,
					peer = %rla.peer,
					%error,
					"failed to send lease message"
				);
				false
			}
		}
	}

	pub(super) fn send_message(&mut self, handle: Handle, message: &LeaseMessage) -> bool {
		tracing::trace!(
			agent = %self.local,
			message_type = %message.message_type,
			lease_instance = %Short(message.lease_instance),
			"sending lease message"
		);
		self
			.encode(message)
			.is_some_and(|frame| self.send_frame(handle, frame))
	}

	pub(super) fn notify(&self, app: &ApplicationId, event: LeaseEvent) {
		match self.applications.get(app) {
			Some(state) => state.notify(event),
			None => tracing::trace!(
				agent = %self.local,
				app = %app,
				"event for unregistered application dropped"
			),
		}
	}

	/// Tells the local side of `id` that the relationship with the remote
	/// application has ended.
	pub(super) fn notify_remote_expired(
		&self,
		peer: &ListenEndpoint,
		id: &RelationshipIdentifier,
		perspective: Perspective,
	) {
		tracing::info!(
			agent = %self.local,
			%peer,
			relationship = %id,
			"remote leasing application expired"
		);
		self.notify(id.application(perspective), LeaseEvent::RemoteExpired {
			remote_app: id.remote_application(perspective).clone(),
			peer: peer.clone(),
		});
	}
}

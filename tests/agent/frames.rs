use {
	super::Pair,
	crate::utils::*,
	lease_agent::{
		Bytes,
		DurationType,
		LoopbackNetwork,
		RelationshipIdentifier,
		lease::{AgentState, Durations},
		primitives::Ticks,
		wire::{LeaseLists, LeaseMessage, ListKind, MessageType, current_version},
	},
};

fn ping_from(name: &str, extension: i64) -> LeaseMessage {
	LeaseMessage {
		version: current_version(),
		message_type: MessageType::PingRequest,
		message_id: 1,
		lease_instance: 0,
		sender_instance: 42,
		durations: Durations::new(0, 0, 0),
		expiration: Ticks::ZERO,
		two_way_termination: false,
		lists: LeaseLists::default(),
		message_endpoint: endpoint(name),
		lease_endpoint: None,
		extension,
	}
}

#[tokio::test(start_paused = true)]
async fn malformed_frames_are_dropped() -> anyhow::Result<()> {
	let net = LoopbackNetwork::new();
	let b = open(&net, "b")?;

	net.inject(&endpoint("b"), Bytes::from_static(b"definitely not a lease message"))?;
	net.inject(&endpoint("b"), Bytes::new())?;

	// a request with a zero lease duration does not decode
	let mut request = ping_from("x", 0);
	request.message_type = MessageType::LeaseRequest;
	request.lease_instance = 7;
	net.inject(&endpoint("b"), request.encode()?)?;
	advance_s(1).await;

	assert!(b.snapshot().await?.remotes.is_empty());

	// and the agent keeps working
	let a = open(&net, "a")?;
	Pair::establish(net, a, b, false).await?;
	Ok(())
}

#[tokio::test(start_paused = true)]
async fn messages_for_previous_incarnations_are_dropped() -> anyhow::Result<()> {
	let net = LoopbackNetwork::new();
	let b = open(&net, "b")?;

	net.inject(&endpoint("b"), ping_from("x", b.instance() - 1).encode()?)?;
	advance_s(1).await;
	assert!(b.snapshot().await?.remotes.is_empty());

	net.inject(&endpoint("b"), ping_from("x", b.instance()).encode()?)?;
	advance_s(1).await;
	let snapshot = b.snapshot().await?;
	let remote = snapshot
		.active_remote(&endpoint("x"))
		.expect("remote lease agent for x");
	assert_eq!(remote.remote_instance, 42);
	Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_agent_ignores_messages() -> anyhow::Result<()> {
	let pair = Pair::established(false).await?;
	pair.b.close(true).await?;
	advance_s(1).await;

	let before = pair.b.snapshot().await?.remotes.len();
	pair
		.net
		.inject(&endpoint("b"), ping_from("x", 0).encode()?)
		.ok();
	advance_s(1).await;
	assert_eq!(pair.b.snapshot().await?.remotes.len(), before);
	Ok(())
}

#[tokio::test(start_paused = true)]
async fn requests_from_an_older_peer_instance_are_dropped() -> anyhow::Result<()> {
	let pair = Pair::established(false).await?;

	let before = pair.a.snapshot().await?;
	let remote = before
		.active_remote(&endpoint("b"))
		.expect("remote lease agent for b")
		.clone();
	assert_eq!(remote.remote_instance, pair.b.instance());

	// would add a monitored relationship if it were accepted
	let mut request = ping_from("b", 0);
	request.message_type = MessageType::LeaseRequest;
	request.sender_instance = pair.b.instance() - 1;
	request.lease_instance = remote.monitor_identifier + 1;
	request.durations = Durations::new(30_000, 2_000, 30_000);
	request.expiration = Ticks::from_millis(30_000);
	request.lists[ListKind::SubjectPending].push(RelationshipIdentifier::new(app("c"), app("a")));
	pair.net.inject(&endpoint("a"), request.encode()?)?;
	tokio::time::sleep(millis(100)).await;

	let after = pair.a.snapshot().await?;
	let unchanged = after
		.active_remote(&endpoint("b"))
		.expect("remote lease agent for b");
	assert_eq!(unchanged.instance, remote.instance);
	assert_eq!(unchanged.remote_instance, remote.remote_instance);
	assert_eq!(unchanged.state, remote.state);
	assert_eq!(unchanged.monitor_identifier, remote.monitor_identifier);
	assert_eq!(unchanged.subjects, remote.subjects);
	assert_eq!(unchanged.monitors, remote.monitors);
	assert_eq!(after.remotes.len(), before.remotes.len());
	Ok(())
}

#[tokio::test(start_paused = true)]
async fn restarted_peer_supersedes_its_previous_instance() -> anyhow::Result<()> {
	let Pair { net, a, b, .. } = Pair::established(false).await?;
	let previous = b.instance();
	b.close(false).await?;
	drop(b);

	let b = open(&net, "b")?;
	assert!(b.instance() > previous);
	let mut app_b = b.register(app("b"), false).await?;
	b.establish(app("b"), app("a"), endpoint("a"), DurationType::Regular)
		.await?;
	wait_for(&mut app_b, 30, |event| established_with(event, "a")).await?;

	let snapshot = a.snapshot().await?;
	let live: Vec<_> = snapshot
		.remotes
		.iter()
		.filter(|remote| remote.peer == endpoint("b") && remote.state != AgentState::Failed)
		.collect();
	assert_eq!(live.len(), 1);
	assert_eq!(live[0].remote_instance, b.instance());
	assert!(live[0].is_active);

	let active = snapshot
		.remotes
		.iter()
		.filter(|remote| remote.peer == endpoint("b") && remote.is_active)
		.count();
	assert_eq!(active, 1);
	Ok(())
}

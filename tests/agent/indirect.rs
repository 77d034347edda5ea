use {
	crate::utils::*,
	lease_agent::{
		DurationType,
		LeaseAgent,
		LeaseEvent,
		LoopbackNetwork,
		agent::Application,
		lease::{AgentState, OneWayLeaseState},
	},
};

/// Three agents with relationships between every pair, so each one can
/// relay for the other two.
struct Triangle {
	net: LoopbackNetwork,
	agents: Vec<LeaseAgent>,
	apps: Vec<Application>,
}

impl Triangle {
	async fn new() -> anyhow::Result<Self> {
		let net = LoopbackNetwork::new();
		let names = ["a", "b", "c"];
		let mut agents = Vec::new();
		let mut apps = Vec::new();
		for name in names {
			let agent = open_with(&net, name, |c| c.with_max_indirect_lease_timeout(600_000))?;
			apps.push(agent.register(app(name), false).await?);
			agents.push(agent);
		}

		for (from, to) in [(0, 1), (0, 2), (1, 2)] {
			agents[from]
				.establish(
					app(names[from]),
					app(names[to]),
					endpoint(names[to]),
					DurationType::Regular,
				)
				.await?;
			wait_for(&mut apps[from], 30, is_established).await?;
			wait_for(&mut apps[to], 30, is_established).await?;
		}

		Ok(Self { net, agents, apps })
	}
}

#[tokio::test(start_paused = true)]
async fn leases_survive_through_a_neighbour() -> anyhow::Result<()> {
	let mut triangle = Triangle::new().await?;
	triangle.net.partition(&endpoint("a"), &endpoint("b"));

	// several lease durations without a direct path
	advance_s(120).await;

	let snapshot = triangle.agents[0].snapshot().await?;
	assert_eq!(snapshot.state, AgentState::Open);
	let remote = snapshot
		.active_remote(&endpoint("b"))
		.expect("remote lease agent for b");
	assert_eq!(remote.state, AgentState::Open);
	assert_eq!(remote.subject_state, OneWayLeaseState::Active);
	assert_eq!(remote.monitor_state, OneWayLeaseState::Active);
	assert!(remote.indirect_count > 0);

	let events = drain(&mut triangle.apps[0]);
	assert!(events.contains(&LeaseEvent::HealthReport {
		peer: endpoint("b"),
	}));
	assert!(!events.iter().any(is_remote_expired));
	assert!(!events.contains(&LeaseEvent::Expired));
	assert!(!drain(&mut triangle.apps[1]).iter().any(is_remote_expired));
	Ok(())
}

#[tokio::test(start_paused = true)]
async fn direct_renewal_resumes_after_healing() -> anyhow::Result<()> {
	let triangle = Triangle::new().await?;
	triangle.net.partition(&endpoint("a"), &endpoint("b"));
	advance_s(60).await;

	triangle.net.heal(&endpoint("a"), &endpoint("b"));
	advance_s(60).await;

	let snapshot = triangle.agents[0].snapshot().await?;
	let remote = snapshot
		.active_remote(&endpoint("b"))
		.expect("remote lease agent for b");
	assert_eq!(remote.subject_state, OneWayLeaseState::Active);
	assert_eq!(remote.indirect_count, 0);
	Ok(())
}

#[tokio::test(start_paused = true)]
async fn relaying_is_bounded() -> anyhow::Result<()> {
	let net = LoopbackNetwork::new();
	let a = open(&net, "a")?;
	let b = open(&net, "b")?;
	let c = open(&net, "c")?;
	let mut app_a = a.register(app("a"), false).await?;
	let mut app_b = b.register(app("b"), false).await?;
	let mut app_c = c.register(app("c"), false).await?;

	for peer in ["b", "c"] {
		a.establish(app("a"), app(peer), endpoint(peer), DurationType::Regular)
			.await?;
		wait_for(&mut app_a, 30, is_established).await?;
	}
	b.establish(app("b"), app("c"), endpoint("c"), DurationType::Regular)
		.await?;
	wait_for(&mut app_b, 30, |e| established_with(e, "c")).await?;
	wait_for(&mut app_c, 30, |e| established_with(e, "b")).await?;

	// default settings allow a single indirect round per lease
	net.partition(&endpoint("a"), &endpoint("b"));
	assert_eq!(
		wait_for(&mut app_a, 180, |e| *e == LeaseEvent::Expired).await?,
		LeaseEvent::Expired
	);
	Ok(())
}

use {
	crate::utils::*,
	lease_agent::{
		DurationType,
		LeaseEvent,
		LoopbackNetwork,
		lease::{AgentState, OneWayLeaseState},
	},
};

#[tokio::test(start_paused = true)]
async fn probing_continues_until_the_peer_appears() -> anyhow::Result<()> {
	let net = LoopbackNetwork::new();
	let a = open_with(&net, "a", |c| c.with_ping_retry_interval(2_000))?;
	let mut app_a = a.register(app("a"), false).await?;

	a.establish(app("a"), app("c"), endpoint("c"), DurationType::Regular)
		.await?;
	advance_s(5).await;

	let snapshot = a.snapshot().await?;
	let remote = snapshot
		.active_remote(&endpoint("c"))
		.expect("remote lease agent for c");
	assert!(remote.in_ping);
	assert_eq!(remote.subject_state, OneWayLeaseState::Inactive);

	let c = open(&net, "c")?;
	let _app_c = c.register(app("c"), false).await?;

	assert_eq!(
		wait_for(&mut app_a, 10, is_established).await?,
		LeaseEvent::Established {
			remote_app: app("c"),
			peer: endpoint("c"),
		}
	);
	Ok(())
}

#[tokio::test(start_paused = true)]
async fn terminating_while_probing_drops_the_relationship() -> anyhow::Result<()> {
	let net = LoopbackNetwork::new();
	let a = open(&net, "a")?;
	let _app_a = a.register(app("a"), false).await?;

	a.establish(app("a"), app("c"), endpoint("c"), DurationType::Regular)
		.await?;
	a.terminate(app("a"), app("c"), endpoint("c")).await?;

	let snapshot = a.snapshot().await?;
	let remote = snapshot
		.remotes
		.iter()
		.find(|remote| remote.peer == endpoint("c"))
		.expect("remote lease agent for c");
	assert_eq!(remote.state, AgentState::Failed);
	assert!(remote.subjects.is_empty());
	Ok(())
}

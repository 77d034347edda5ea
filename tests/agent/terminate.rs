use {
	super::Pair,
	crate::utils::*,
	lease_agent::{
		DurationType,
		Error,
		RelationshipIdentifier,
		lease::{AgentState, OneWayLeaseState},
	},
};

#[tokio::test(start_paused = true)]
async fn graceful_termination_releases_both_directions() -> anyhow::Result<()> {
	let mut pair = Pair::established(false).await?;

	pair
		.a
		.terminate(app("a"), app("b"), endpoint("b"))
		.await?;
	advance_s(1).await;

	for (agent, peer) in [(&pair.a, "b"), (&pair.b, "a")] {
		let snapshot = agent.snapshot().await?;
		assert_eq!(snapshot.state, AgentState::Open);

		let remotes: Vec<_> = snapshot
			.remotes
			.iter()
			.filter(|remote| remote.peer == endpoint(peer))
			.collect();
		assert!(!remotes.is_empty(), "no remote lease agent for {peer}");

		for remote in remotes {
			assert_eq!(remote.state, AgentState::Failed);
			assert_eq!(remote.subject_state, OneWayLeaseState::Inactive);
			assert_eq!(remote.monitor_state, OneWayLeaseState::Inactive);
			assert!(remote.subjects.is_empty());
			assert!(remote.monitors.is_empty());
		}
	}

	// nothing expired, the relationship was ended on purpose
	advance_s(60).await;
	assert!(!drain(&mut pair.app_a).iter().any(is_remote_expired));
	assert!(!drain(&mut pair.app_b).iter().any(is_remote_expired));
	Ok(())
}

#[tokio::test(start_paused = true)]
async fn relationship_can_be_established_again() -> anyhow::Result<()> {
	let mut pair = Pair::established(false).await?;
	pair
		.a
		.terminate(app("a"), app("b"), endpoint("b"))
		.await?;
	advance_s(1).await;

	pair
		.a
		.establish(app("a"), app("b"), endpoint("b"), DurationType::Regular)
		.await?;
	wait_for(&mut pair.app_a, 30, is_established).await?;

	let snapshot = pair.a.snapshot().await?;
	let remote = snapshot
		.active_remote(&endpoint("b"))
		.expect("remote lease agent for b");
	assert_eq!(remote.state, AgentState::Open);
	assert_eq!(remote.subject_state, OneWayLeaseState::Active);
	Ok(())
}

#[tokio::test(start_paused = true)]
async fn terminating_unknown_relationship_fails() -> anyhow::Result<()> {
	let pair = Pair::established(false).await?;
	assert_eq!(
		pair
			.a
			.terminate(app("a"), app("c"), endpoint("b"))
			.await
			.unwrap_err(),
		Error::RelationshipNotFound(RelationshipIdentifier::new(app("a"), app("c")))
	);
	Ok(())
}

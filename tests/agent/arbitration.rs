use {
	super::Pair,
	crate::utils::*,
	lease_agent::{
		Error,
		LeaseEvent,
		agent::{ArbitrationRequest, ArbitrationResult},
		lease::{AgentState, TTL_INFINITE},
	},
};

/// Waits for the arbitration request of an expired lease.
async fn arbitration_request(
	app: &mut lease_agent::Application,
) -> anyhow::Result<ArbitrationRequest> {
	match wait_for(app, 120, is_arbitration).await? {
		LeaseEvent::Arbitrate(request) => Ok(request),
		other => anyhow::bail!("unexpected event {other:?}"),
	}
}

fn verdict(
	app: &str,
	request: &ArbitrationRequest,
	local_ttl: i32,
	remote_ttl: i32,
) -> ArbitrationResult {
	ArbitrationResult {
		app: crate::utils::app(app),
		peer: request.peer.clone(),
		local_instance: request.local_instance,
		remote_instance: request.remote_instance,
		local_ttl,
		remote_ttl,
		is_delayed: false,
	}
}

#[tokio::test(start_paused = true)]
async fn partition_is_handed_to_the_arbitrator() -> anyhow::Result<()> {
	let mut pair = Pair::established(true).await?;
	pair.net.partition(&endpoint("a"), &endpoint("b"));

	let request_a = arbitration_request(&mut pair.app_a).await?;
	let request_b = arbitration_request(&mut pair.app_b).await?;

	assert_eq!(request_a.peer, endpoint("b"));
	assert_eq!(request_a.remote_app, Some(app("b")));
	assert_eq!(request_a.local_instance, pair.a.instance());
	assert_eq!(request_a.remote_instance, pair.b.instance());
	assert!(request_a.subject_ttl >= 0);
	assert_eq!(request_b.peer, endpoint("a"));
	assert_eq!(request_b.remote_app, Some(app("a")));

	// both sides wait for the verdict
	let snapshot = pair.a.snapshot().await?;
	let remote = snapshot
		.active_remote(&endpoint("b"))
		.expect("remote lease agent for b");
	assert_eq!(remote.state, AgentState::Suspended);

	// a survives, b loses
	pair
		.a
		.complete_arbitration(verdict("a", &request_a, TTL_INFINITE, 0))
		.await?;
	pair
		.b
		.complete_arbitration(verdict("b", &request_b, 0, TTL_INFINITE))
		.await?;

	assert_eq!(
		wait_for(&mut pair.app_a, 10, is_remote_expired).await?,
		LeaseEvent::RemoteExpired {
			remote_app: app("b"),
			peer: endpoint("b"),
		}
	);
	assert_eq!(
		wait_for(&mut pair.app_b, 10, |e| *e == LeaseEvent::Expired).await?,
		LeaseEvent::Expired
	);

	assert_eq!(pair.a.snapshot().await?.state, AgentState::Open);
	assert_eq!(pair.b.snapshot().await?.state, AgentState::Failed);

	// a failed agent refuses new work
	assert_eq!(
		pair.b.register(app("c"), false).await.unwrap_err(),
		Error::AgentFailed
	);
	Ok(())
}

#[tokio::test(start_paused = true)]
async fn missing_verdict_fails_the_agent() -> anyhow::Result<()> {
	let mut pair = Pair::established(true).await?;
	pair.net.partition(&endpoint("a"), &endpoint("b"));

	arbitration_request(&mut pair.app_a).await?;

	// nobody answers within the arbitration duration
	assert_eq!(
		wait_for(&mut pair.app_a, 60, |e| *e == LeaseEvent::Expired).await?,
		LeaseEvent::Expired
	);
	assert_eq!(pair.a.snapshot().await?.state, AgentState::Failed);
	Ok(())
}

#[tokio::test(start_paused = true)]
async fn expiry_without_arbitrator_fails_the_agent() -> anyhow::Result<()> {
	let mut pair = Pair::established(false).await?;
	pair.net.partition(&endpoint("a"), &endpoint("b"));

	assert_eq!(
		wait_for(&mut pair.app_a, 120, |e| *e == LeaseEvent::Expired).await?,
		LeaseEvent::Expired
	);
	assert!(!drain(&mut pair.app_a).iter().any(|e| matches!(e, LeaseEvent::Arbitrate(_))));
	Ok(())
}

#[tokio::test(start_paused = true)]
async fn neutral_verdict_keeps_both_agents() -> anyhow::Result<()> {
	let mut pair = Pair::established(true).await?;
	pair.net.partition(&endpoint("a"), &endpoint("b"));

	let request = arbitration_request(&mut pair.app_a).await?;
	pair
		.a
		.complete_arbitration(verdict("a", &request, TTL_INFINITE, TTL_INFINITE))
		.await?;

	let snapshot = pair.a.snapshot().await?;
	assert_eq!(snapshot.state, AgentState::Open);
	let remote = snapshot
		.remotes
		.iter()
		.find(|remote| remote.peer == endpoint("b"))
		.expect("remote lease agent for b");
	assert_eq!(remote.state, AgentState::Failed);
	assert!(remote.arbitration_neutral);
	Ok(())
}

#[tokio::test(start_paused = true)]
async fn verdict_for_unknown_lease_is_rejected() -> anyhow::Result<()> {
	let pair = Pair::established(true).await?;
	let request = ArbitrationRequest {
		remote_app: Some(app("b")),
		peer: endpoint("b"),
		monitor_ttl: 0,
		subject_ttl: 0,
		local_instance: pair.a.instance() - 1,
		remote_instance: pair.b.instance(),
		remote_version: 0,
		monitor_identifier: 0,
		subject_identifier: 0,
		last_heard_upper_bound: 0,
	};

	assert_eq!(
		pair
			.a
			.complete_arbitration(verdict("a", &request, TTL_INFINITE, 0))
			.await
			.unwrap_err(),
		Error::RemoteNotFound(endpoint("b"))
	);
	assert_eq!(
		pair
			.a
			.complete_arbitration(verdict("x", &request, TTL_INFINITE, 0))
			.await
			.unwrap_err(),
		Error::ApplicationNotFound(app("x"))
	);
	Ok(())
}

use {
	super::Pair,
	crate::utils::*,
	lease_agent::{Error, LeaseEvent, Transport, lease::AgentState},
};

#[tokio::test(start_paused = true)]
async fn faulting_close_reports_failure_to_both_sides() -> anyhow::Result<()> {
	let mut pair = Pair::established(false).await?;
	pair.a.close(true).await?;

	assert_eq!(
		wait_for(&mut pair.app_a, 10, |e| *e == LeaseEvent::Expired).await?,
		LeaseEvent::Expired
	);
	assert_eq!(
		wait_for(&mut pair.app_b, 10, is_remote_expired).await?,
		LeaseEvent::RemoteExpired {
			remote_app: app("a"),
			peer: endpoint("a"),
		}
	);
	assert_eq!(pair.a.snapshot().await?.state, AgentState::Failed);

	// the listener closes shortly after
	advance_s(2).await;
	assert!(pair.net.inject(&endpoint("a"), lease_agent::Bytes::new()).is_err());
	Ok(())
}

#[tokio::test(start_paused = true)]
async fn plain_close_releases_the_endpoint() -> anyhow::Result<()> {
	let net = lease_agent::LoopbackNetwork::new();
	let a = open(&net, "a")?;
	a.close(false).await?;

	assert_eq!(a.snapshot().await?.state, AgentState::Failed);
	assert_eq!(
		a.register(app("a"), false).await.unwrap_err(),
		Error::AgentFailed
	);

	// a new incarnation can listen on the same endpoint
	let again = open(&net, "a")?;
	assert!(again.instance() > a.instance());
	Ok(())
}

#[tokio::test(start_paused = true)]
async fn dropping_the_last_handle_stops_the_worker() -> anyhow::Result<()> {
	let net = lease_agent::LoopbackNetwork::new();
	let a = open(&net, "a")?;
	let clone = a.clone();
	drop(a);

	// a clone keeps the agent alive
	assert_eq!(clone.snapshot().await?.state, AgentState::Open);
	drop(clone);
	advance_s(1).await;

	assert!(net.is_closed(&endpoint("a")));
	Ok(())
}

#[tokio::test(start_paused = true)]
async fn idle_agent_fails_itself() -> anyhow::Result<()> {
	let net = lease_agent::LoopbackNetwork::new();
	let a = open(&net, "a")?;

	// no applications and no leases for a couple of maintenance rounds
	advance_s(60).await;
	assert_eq!(a.snapshot().await?.state, AgentState::Failed);
	Ok(())
}

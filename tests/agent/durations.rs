use {
	super::Pair,
	crate::utils::*,
	lease_agent::{
		DurationType,
		Error,
		LoopbackNetwork,
		lease::{DURATION_MAX_VALUE, Durations},
	},
};

#[tokio::test(start_paused = true)]
async fn monitor_never_grants_less_than_configured() -> anyhow::Result<()> {
	let net = LoopbackNetwork::new();
	let a = open_with(&net, "a", |c| c.with_lease_duration(10_000))?;
	let b = open_with(&net, "b", |c| c.with_lease_duration(20_000))?;
	let pair = Pair::establish(net, a, b, false).await?;

	// a asked for 10s, b monitors with 20s
	let snapshot = pair.a.snapshot().await?;
	let remote = snapshot
		.active_remote(&endpoint("b"))
		.expect("remote lease agent for b");
	assert_eq!(remote.durations.lease, 20_000);

	// in the other direction a grants what b asked for
	let snapshot = pair.b.snapshot().await?;
	let remote = snapshot
		.active_remote(&endpoint("a"))
		.expect("remote lease agent for a");
	assert_eq!(remote.durations.lease, 20_000);
	Ok(())
}

#[tokio::test(start_paused = true)]
async fn updated_durations_apply_on_renewal() -> anyhow::Result<()> {
	let pair = Pair::established(false).await?;

	pair.a.update_lease_duration(45_000, 60_000).await?;
	assert_eq!(
		pair.a.lease_durations(DurationType::Regular).await?,
		Durations::new(45_000, 2_000, 30_000)
	);
	assert_eq!(
		pair
			.a
			.lease_durations(DurationType::AcrossFaultDomain)
			.await?,
		Durations::new(60_000, 2_000, 30_000)
	);

	// renewal starts a quarter into the 30s lease
	advance_s(10).await;

	let snapshot = pair.a.snapshot().await?;
	let remote = snapshot
		.active_remote(&endpoint("b"))
		.expect("remote lease agent for b");
	assert_eq!(remote.durations.lease, 45_000);
	Ok(())
}

#[tokio::test(start_paused = true)]
async fn invalid_durations_are_rejected() -> anyhow::Result<()> {
	let net = LoopbackNetwork::new();
	let a = open(&net, "a")?;

	for (regular, across) in [(0, 1_000), (1_000, -5), (DURATION_MAX_VALUE, 1_000)] {
		assert!(matches!(
			a.update_lease_duration(regular, across).await,
			Err(Error::InvalidDurations(_))
		));
	}
	assert_eq!(
		a.lease_durations(DurationType::Regular).await?,
		Durations::new(30_000, 2_000, 30_000)
	);
	Ok(())
}

use {
	super::Pair,
	crate::utils::*,
	lease_agent::{DurationType, Error, lease::TTL_INFINITE},
};

#[tokio::test(start_paused = true)]
async fn delayed_unregister_waits_for_granted_ttl() -> anyhow::Result<()> {
	let mut pair = Pair::established(false).await?;

	assert_eq!(pair.a.application_ttl(app("a"), 5_000).await?, 5_000);
	pair.a.unregister(app("a"), true).await?;

	// being unregistered, so no new relationships and no more TTL
	assert_eq!(
		pair
			.a
			.establish(app("a"), app("b"), endpoint("b"), DurationType::Regular)
			.await
			.unwrap_err(),
		Error::ApplicationNotFound(app("a"))
	);
	assert_eq!(pair.a.application_ttl(app("a"), 1_000).await?, 0);

	advance_s(4).await;
	assert!(pair.a.snapshot().await?.applications.contains(&app("a")));

	advance_s(2).await;
	assert!(!pair.a.snapshot().await?.applications.contains(&app("a")));

	// the relationship was terminated, not lost
	advance_s(60).await;
	assert!(!drain(&mut pair.app_b).iter().any(is_remote_expired));
	Ok(())
}

#[tokio::test(start_paused = true)]
async fn immediate_unregister() -> anyhow::Result<()> {
	let pair = Pair::established(false).await?;
	pair.a.unregister(app("a"), false).await?;
	advance_s(1).await;

	let snapshot = pair.a.snapshot().await?;
	assert!(snapshot.applications.is_empty());
	assert!(snapshot.remotes.iter().all(|remote| remote.subjects.is_empty()));
	Ok(())
}

#[tokio::test(start_paused = true)]
async fn application_ttl_without_leases_is_infinite() -> anyhow::Result<()> {
	let net = lease_agent::LoopbackNetwork::new();
	let a = open(&net, "a")?;
	let _app = a.register(app("a"), false).await?;

	assert_eq!(a.application_ttl(app("a"), 0).await?, 0);
	assert_eq!(a.application_ttl(app("a"), 1_000).await?, TTL_INFINITE);

	// a global expiration caps nothing while no lease bounds the TTL
	a.set_global_lease_expiration(app("a"), 500).await?;
	assert_eq!(a.application_ttl(app("a"), 1_000).await?, TTL_INFINITE);
	Ok(())
}

#[tokio::test(start_paused = true)]
async fn global_expiration_caps_granted_ttl() -> anyhow::Result<()> {
	let pair = Pair::established(false).await?;
	pair.a.set_global_lease_expiration(app("a"), 3_000).await?;
	assert_eq!(pair.a.application_ttl(app("a"), 10_000).await?, 3_000);

	// later queries report what was already promised
	advance_s(1).await;
	let remaining = pair.a.application_ttl(app("a"), 0).await?;
	assert!((1_900..=2_000).contains(&remaining));
	Ok(())
}

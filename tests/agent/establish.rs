use {
	super::Pair,
	crate::utils::*,
	lease_agent::{
		DurationType,
		Error,
		LeaseEvent,
		LoopbackNetwork,
		RelationshipIdentifier,
		agent::Establishment,
		lease::{AgentState, MonitorSlot, OneWayLeaseState, SubjectSlot},
	},
};

#[tokio::test(start_paused = true)]
async fn establishes_both_directions() -> anyhow::Result<()> {
	let net = LoopbackNetwork::new();
	let a = open(&net, "a")?;
	let b = open(&net, "b")?;
	let mut app_a = a.register(app("a"), false).await?;
	let mut app_b = b.register(app("b"), false).await?;

	let pending = a
		.establish(app("a"), app("b"), endpoint("b"), DurationType::Regular)
		.await?;
	let id = RelationshipIdentifier::new(app("a"), app("b"));
	assert_eq!(pending, Establishment::Pending(id.clone()));

	assert_eq!(
		wait_for(&mut app_a, 30, is_established).await?,
		LeaseEvent::Established {
			remote_app: app("b"),
			peer: endpoint("b"),
		}
	);

	// the monitor sets up the lease in the other direction on its own
	assert_eq!(
		wait_for(&mut app_b, 30, is_established).await?,
		LeaseEvent::Established {
			remote_app: app("a"),
			peer: endpoint("a"),
		}
	);

	let snapshot = a.snapshot().await?;
	let remote = snapshot
		.active_remote(&endpoint("b"))
		.expect("remote lease agent for b");
	assert_eq!(remote.state, AgentState::Open);
	assert_eq!(remote.subject_state, OneWayLeaseState::Active);
	assert_eq!(remote.monitor_state, OneWayLeaseState::Active);
	assert_eq!(remote.remote_instance, b.instance());
	assert_eq!(remote.subjects, vec![(id.clone(), SubjectSlot::Active)]);
	assert_eq!(remote.monitors, vec![(id.reversed(), MonitorSlot::Active)]);

	// asking again reports the existing relationship
	assert_eq!(
		a.establish(app("a"), app("b"), endpoint("b"), DurationType::Regular)
			.await?,
		Establishment::Established(id)
	);

	Ok(())
}

#[tokio::test(start_paused = true)]
async fn leases_are_renewed() -> anyhow::Result<()> {
	let mut pair = Pair::established(false).await?;
	let before = pair.a.snapshot().await?;
	let before = before.active_remote(&endpoint("b")).cloned();

	// several lease durations go by
	advance_s(150).await;

	let after = pair.a.snapshot().await?;
	let after = after
		.active_remote(&endpoint("b"))
		.expect("remote lease agent for b");
	assert_eq!(Some(after.instance), before.map(|r| r.instance));
	assert_eq!(after.subject_state, OneWayLeaseState::Active);
	assert_eq!(after.monitor_state, OneWayLeaseState::Active);
	assert_eq!(after.indirect_count, 0);

	assert!(!drain(&mut pair.app_a).iter().any(is_remote_expired));
	assert!(!drain(&mut pair.app_b).iter().any(is_remote_expired));
	Ok(())
}

#[tokio::test(start_paused = true)]
async fn unknown_remote_application_is_rejected() -> anyhow::Result<()> {
	let net = LoopbackNetwork::new();
	let a = open(&net, "a")?;
	let b = open(&net, "b")?;
	let mut app_a = a.register(app("a"), false).await?;
	let _app_b = b.register(app("b"), false).await?;

	a.establish(app("a"), app("nobody"), endpoint("b"), DurationType::Regular)
		.await?;

	assert_eq!(
		wait_for(&mut app_a, 30, |_| true).await?,
		LeaseEvent::RemoteExpired {
			remote_app: app("nobody"),
			peer: endpoint("b"),
		}
	);
	Ok(())
}

#[tokio::test(start_paused = true)]
async fn registration_errors() -> anyhow::Result<()> {
	let net = LoopbackNetwork::new();
	let a = open(&net, "a")?;
	let _app = a.register(app("a"), false).await?;

	assert_eq!(
		a.register(app("a"), true).await.unwrap_err(),
		Error::ApplicationExists(app("a"))
	);
	assert_eq!(
		a.establish(app("x"), app("b"), endpoint("b"), DurationType::Regular)
			.await
			.unwrap_err(),
		Error::ApplicationNotFound(app("x"))
	);
	assert_eq!(
		a.unregister(app("x"), false).await.unwrap_err(),
		Error::ApplicationNotFound(app("x"))
	);

	// the endpoint is taken until the agent closes
	assert!(matches!(open(&net, "a"), Err(_)));
	Ok(())
}

use {
	crate::utils::*,
	lease_agent::{LeaseAgent, LoopbackNetwork, agent::Application},
};

mod arbitration;
mod close;
mod durations;
mod establish;
mod frames;
mod indirect;
mod probe;
mod terminate;
mod unregister;

/// Two agents, `a` and `b`, each with one registered application of the
/// same name, and an established relationship in which `a` is monitored by
/// `b`.
struct Pair {
	net: LoopbackNetwork,
	a: LeaseAgent,
	b: LeaseAgent,
	app_a: Application,
	app_b: Application,
}

impl Pair {
	async fn established(arbitration: bool) -> anyhow::Result<Self> {
		let net = LoopbackNetwork::new();
		let a = open(&net, "a")?;
		let b = open(&net, "b")?;
		Self::establish(net, a, b, arbitration).await
	}

	async fn establish(
		net: LoopbackNetwork,
		a: LeaseAgent,
		b: LeaseAgent,
		arbitration: bool,
	) -> anyhow::Result<Self> {
		let mut app_a = a.register(app("a"), arbitration).await?;
		let mut app_b = b.register(app("b"), arbitration).await?;

		a.establish(
			app("a"),
			app("b"),
			endpoint("b"),
			lease_agent::DurationType::Regular,
		)
		.await?;

		wait_for(&mut app_a, 30, is_established).await?;
		wait_for(&mut app_b, 30, is_established).await?;

		Ok(Self {
			net,
			a,
			b,
			app_a,
			app_b,
		})
	}
}

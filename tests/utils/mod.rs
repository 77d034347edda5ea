#![allow(unused)]

mod time;
mod tracing;

use {
	lease_agent::{
		Application,
		ApplicationId,
		LeaseAgent,
		LeaseEvent,
		ListenEndpoint,
		LoopbackNetwork,
		agent::{Config, ConfigBuilder},
	},
	std::sync::Arc,
};

pub use time::*;

pub fn endpoint(name: &str) -> ListenEndpoint {
	ListenEndpoint::new(name, 9000).expect("valid endpoint")
}

pub fn app(name: &str) -> ApplicationId {
	ApplicationId::new(name).expect("valid application id")
}

/// Opens an agent listening on `name` with default settings.
pub fn open(net: &LoopbackNetwork, name: &str) -> anyhow::Result<LeaseAgent> {
	open_with(net, name, |config| config)
}

/// Opens an agent listening on `name`, letting the caller adjust the config.
pub fn open_with(
	net: &LoopbackNetwork,
	name: &str,
	configure: impl FnOnce(ConfigBuilder) -> ConfigBuilder,
) -> anyhow::Result<LeaseAgent> {
	let config = configure(Config::builder().with_listen(endpoint(name))).build()?;
	Ok(LeaseAgent::open(config, Arc::new(net.clone()))?)
}

/// Waits up to `secs` for the first event matching `pred`, skipping the
/// others.
pub async fn wait_for(
	app: &mut Application,
	secs: u64,
	pred: impl Fn(&LeaseEvent) -> bool,
) -> anyhow::Result<LeaseEvent> {
	let found = timeout_s(secs, async {
		while let Some(event) = app.next_event().await {
			if pred(&event) {
				return Some(event);
			}
		}
		None
	})
	.await?;
	found.ok_or_else(|| anyhow::anyhow!("event stream of {} ended", app.id()))
}

/// Drains the events already queued for `app`.
pub fn drain(app: &mut Application) -> Vec<LeaseEvent> {
	let mut events = Vec::new();
	while let Some(event) = app.try_next_event() {
		events.push(event);
	}
	events
}

pub fn is_established(event: &LeaseEvent) -> bool {
	matches!(event, LeaseEvent::Established { .. })
}

pub fn established_with(event: &LeaseEvent, remote: &str) -> bool {
	matches!(event, LeaseEvent::Established { remote_app, .. } if remote_app.as_str() == remote)
}

pub fn is_remote_expired(event: &LeaseEvent) -> bool {
	matches!(event, LeaseEvent::RemoteExpired { .. })
}

/// An arbitration request for an expired lease, as opposed to the early
/// warning that precedes it.
pub fn is_arbitration(event: &LeaseEvent) -> bool {
	matches!(event, LeaseEvent::Arbitrate(request) if !request.is_early_warning())
}

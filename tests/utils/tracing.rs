use tracing_subscriber::{EnvFilter, prelude::*};

/// Turns on logging for test runs when `TEST_TRACE` names a level.
///
/// Frame-level logs of the loopback transport stay off unless
/// `TEST_TRACE_TRANSPORT` is set.
#[ctor::ctor]
fn init_test_logging() {
	if tracing::dispatcher::has_been_set() {
		return;
	}

	let Ok(level) = std::env::var("TEST_TRACE") else {
		return;
	};
	let level = match level.as_str() {
		"true" | "on" => "debug",
		"trace" | "debug" | "info" | "warn" | "error" => level.as_str(),
		_ => return,
	};

	let mut filter = EnvFilter::new(level);
	if std::env::var_os("TEST_TRACE_TRANSPORT").is_none()
		&& let Ok(directive) = "lease_agent::transport=off".parse()
	{
		filter = filter.add_directive(directive);
	}

	let _ = tracing_subscriber::registry()
		.with(tracing_subscriber::fmt::layer().with_test_writer())
		.with(filter)
		.try_init();
}

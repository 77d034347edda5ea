use {
	crate::{
		lease::{DURATION_MAX_VALUE, DurationType, Durations},
		wire::ListenEndpoint,
	},
	core::time::Duration,
	derive_builder::Builder,
	serde::{Deserialize, Serialize},
};

/// Configuration of one lease agent.
///
/// Durations are in milliseconds, matching the wire format.
#[derive(Debug, Clone, Builder, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[builder(
	pattern = "owned",
	setter(prefix = "with"),
	derive(Debug, Clone),
	build_fn(validate = "Self::validate")
)]
#[builder_struct_attr(doc(hidden))]
pub struct Config {
	/// The endpoint this agent listens on and advertises to its peers.
	pub listen: ListenEndpoint,

	/// Lease duration requested for relationships of
	/// [`DurationType::Regular`].
	#[builder(default = "30_000")]
	pub lease_duration: i32,

	/// Lease duration requested for relationships of
	/// [`DurationType::AcrossFaultDomain`].
	#[builder(default = "30_000")]
	pub lease_duration_across_fault_domain: i32,

	/// Grace period after subject expiration before applications are told
	/// their lease is suspended.
	#[builder(default = "2_000")]
	pub lease_suspend_duration: i32,

	/// How long past expiration the arbitrator has to decide.
	#[builder(default = "30_000")]
	pub arbitration_duration: i32,

	/// Number of direct renew attempts before falling back to indirect
	/// leases.
	#[builder(default = "3")]
	pub lease_retry_count: u32,

	/// Renewing starts once `1 / ratio` of the lease duration has elapsed.
	#[builder(default = "4")]
	pub lease_renew_begin_ratio: i32,

	/// Upper bound on the time spent renewing through neighbours. Divided by
	/// the lease duration it gives the number of indirect rounds.
	#[builder(default = "60_000")]
	pub max_indirect_lease_timeout: i32,

	/// How many neighbours one indirect round relays through. `None` relays
	/// through every eligible neighbour.
	#[builder(default = "None")]
	pub max_indirect_fanout: Option<usize>,

	/// Lead time of the early arbitration warning.
	#[builder(default = "2_000")]
	pub pre_arbitration_time: i32,

	/// Interval between ping requests while probing a new peer.
	#[builder(default = "10_000")]
	pub ping_retry_interval: i32,

	/// Period of the sweep that reclaims failed remote lease agents.
	#[builder(default = "Duration::from_secs(15)")]
	pub maintenance_interval: Duration,

	/// How long a delayed close keeps the listener open.
	#[builder(default = "Duration::from_secs(1)")]
	pub delayed_close_interval: Duration,
}

impl Config {
	/// Creates a new config builder with default values.
	pub fn builder() -> ConfigBuilder {
		ConfigBuilder::default()
	}

	/// Durations requested for a relationship of the given type.
	pub const fn durations(&self, duration_type: DurationType) -> Durations {
		let lease = match duration_type {
			DurationType::Regular => self.lease_duration,
			DurationType::AcrossFaultDomain => self.lease_duration_across_fault_domain,
		};
		Durations::new(lease, self.lease_suspend_duration, self.arbitration_duration)
	}

	/// Number of consecutive indirect rounds allowed before a renewal is left
	/// to expire.
	pub fn indirect_limit(&self) -> u32 {
		if self.lease_duration <= 0 {
			return 0;
		}
		u32::try_from(self.max_indirect_lease_timeout / self.lease_duration)
			.unwrap_or_default()
	}

	pub(crate) fn check(&self) -> Result<(), String> {
		check_lease_duration(self.lease_duration)?;
		check_lease_duration(self.lease_duration_across_fault_domain)?;
		check_positive("lease suspend duration", self.lease_suspend_duration)?;
		check_positive("arbitration duration", self.arbitration_duration)?;
		if self.lease_retry_count == 0 {
			return Err("lease retry count must be positive".into());
		}
		if self.lease_renew_begin_ratio < 2 {
			return Err(format!(
				"lease renew begin ratio must be at least 2, got {}",
				self.lease_renew_begin_ratio
			));
		}
		Ok(())
	}
}

fn check_lease_duration(duration: i32) -> Result<(), String> {
	if duration <= 0 || duration >= DURATION_MAX_VALUE {
		return Err(format!("invalid lease duration {duration}"));
	}
	Ok(())
}

fn check_positive(what: &str, value: i32) -> Result<(), String> {
	if value <= 0 || value >= DURATION_MAX_VALUE {
		return Err(format!("invalid {what} {value}"));
	}
	Ok(())
}

impl ConfigBuilder {
	fn validate(&self) -> Result<(), String> {
		if let Some(lease) = self.lease_duration {
			check_lease_duration(lease)?;
		}
		if let Some(lease) = self.lease_duration_across_fault_domain {
			check_lease_duration(lease)?;
		}
		if let Some(suspend) = self.lease_suspend_duration {
			check_positive("lease suspend duration", suspend)?;
		}
		if let Some(arbitration) = self.arbitration_duration {
			check_positive("arbitration duration", arbitration)?;
		}
		if self.lease_retry_count == Some(0) {
			return Err("lease retry count must be positive".into());
		}
		if let Some(ratio) = self.lease_renew_begin_ratio
			&& ratio < 2
		{
			return Err(format!(
				"lease renew begin ratio must be at least 2, got {ratio}"
			));
		}
		Ok(())
	}
}

//! Lease agent failure: delayed failure reporting, shutdown and the
//! application time-to-live that bounds both.

use {
	super::super::{LeaseEvent, timers::TimerEntry, worker::WorkerLoop},
	crate::{
		lease::{AgentState, ApplicationId, TTL_INFINITE},
		primitives::{Short, Ticks},
	},
};

impl WorkerLoop {
	/// A subject lease failed. Applications are told once every TTL they
	/// were granted has run out, capped at the suspend duration.
	pub(in crate::agent) fn on_lease_failure(&mut self) {
		if self.is_failed() || self.delayed_failure.is_some() {
			tracing::debug!(
				agent = %self.local,
				"lease agent already failing"
			);
			return;
		}

		let ids: Vec<_> = self.applications.keys().cloned().collect();
		let max_ttl = ids
			.iter()
			.map(|id| self.application_ttl(id, 0))
			.max()
			.unwrap_or(0)
			.clamp(0, self.config.lease_suspend_duration);

		tracing::warn!(
			agent = %self.local,
			instance = %Short(self.instance),
			delay_ms = max_ttl,
			"lease failure, failing lease agent"
		);

		let deadline = self.now().plus_millis(i64::from(max_ttl));
		self.delayed_failure = Some(self.timers.insert(TimerEntry::DelayedFailure, deadline));
	}

	/// The delay after a lease failure elapsed: expire every application and
	/// release what they still hold before shutting the agent down.
	pub(in crate::agent) fn on_delayed_lease_failure(&mut self) {
		let ids: Vec<ApplicationId> = self.applications.keys().cloned().collect();
		for id in &ids {
			self.notify(id, LeaseEvent::Expired);
			for handle in self.remotes.handles() {
				self.terminate_all(handle, id, true);
			}
		}
		self.uninitialize(true);
	}

	/// Fails the agent and every remote lease agent. A delayed close keeps
	/// the listener up for a moment so the last failure notices go out.
	pub(in crate::agent) fn uninitialize(&mut self, delayed: bool) {
		if self.is_failed() {
			return;
		}

		tracing::info!(
			agent = %self.local,
			instance = %Short(self.instance),
			"lease agent failed"
		);

		self.state = AgentState::Failed;
		for handle in self.remotes.handles() {
			self.fail_remote(handle);
		}

		if delayed {
			let millis =
				i64::try_from(self.config.delayed_close_interval.as_millis()).unwrap_or(i64::MAX);
			let deadline = self.now().plus_millis(millis);
			self.delayed_close = Some(self.timers.insert(TimerEntry::DelayedClose, deadline));
		} else {
			self.close_listener();
		}
	}

	/// Remaining time, in milliseconds, the application may assume its
	/// leases hold.
	///
	/// A non-positive `request_ttl` asks for what was already promised. A
	/// positive one is a new grant, clipped to what the leases support, and
	/// is remembered so a later failure waits for it.
	pub(in crate::agent) fn application_ttl(&mut self, id: &ApplicationId, request_ttl: i32) -> i32 {
		let now = self.now();
		let failed = self.is_failed() || self.delayed_failure.is_some();

		let min_suspend = self
			.remotes
			.iter()
			.filter(|(_, rla)| !rla.is_failed())
			.map(|(_, rla)| rla.lease.subject_suspend_time)
			.min()
			.unwrap_or(Ticks::MAX);

		let Some(app) = self.applications.get_mut(id) else {
			return 0;
		};
		if failed || app.is_being_unregistered() {
			return 0;
		}

		if request_ttl <= 0 {
			let last = app.last_grant_expire_time;
			if last.is_max() || last < now {
				return 0;
			}
			return millis_until(last, now);
		}

		let mut min = min_suspend;
		if !min.is_max() && min >= app.global_lease_expire_time {
			min = app.global_lease_expire_time;
		}

		if min.is_max() {
			return TTL_INFINITE;
		}
		if now >= min {
			return 0;
		}

		let ttl = millis_until(min, now).min(request_ttl);
		let granted = now.plus_millis(i64::from(ttl));
		if app.last_grant_expire_time.is_max() || granted > app.last_grant_expire_time {
			app.last_grant_expire_time = granted;
		}
		ttl
	}
}

fn millis_until(deadline: Ticks, now: Ticks) -> i32 {
	i32::try_from(deadline.since(now).as_millis()).unwrap_or(i32::MAX - 1)
}

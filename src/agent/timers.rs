//! The agent's single timer wheel.
//!
//! Every timer an agent needs, per remote lease agent or agent wide, is an
//! entry in one [`DelayQueue`] polled by the worker loop, so a firing timer
//! is just another message handled by the actor.

use {
	crate::{
		lease::ApplicationId,
		primitives::{Clock, Handle, Ticks},
	},
	core::{
		pin::Pin,
		task::{Context, Poll},
	},
	derive_more::Display,
	futures::Stream,
	tokio_util::time::{DelayQueue, delay_queue::Key},
};

/// Furthest a timer is ever armed, one year. The wheel cannot hold deadlines
/// much beyond two.
const HORIZON_MILLIS: i64 = 365 * 24 * 60 * 60 * 1000;

/// Timers armed on a remote lease agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub(super) enum TimerKind {
	Subject,
	Monitor,
	RenewOrArbitrate,
	PreArbitrationSubject,
	PreArbitrationMonitor,
	PostArbitration,
	PingRetry,
}

impl TimerKind {
	pub const ALL: [Self; 7] = [
		Self::Subject,
		Self::Monitor,
		Self::RenewOrArbitrate,
		Self::PreArbitrationSubject,
		Self::PreArbitrationMonitor,
		Self::PostArbitration,
		Self::PingRetry,
	];

	const fn index(self) -> usize {
		self as usize
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum TimerEntry {
	Remote(Handle, TimerKind),
	DelayedFailure,
	DelayedClose,
	Unregister(ApplicationId),
	Maintenance,
}

/// Keys of the timers currently armed on one remote lease agent.
#[derive(Debug, Default)]
pub(super) struct TimerSlots([Option<Key>; TimerKind::ALL.len()]);

impl TimerSlots {
	/// Clears the slot if `key` is the one it holds. Returns whether the
	/// firing timer is still current.
	pub fn fired(&mut self, kind: TimerKind, key: Key) -> bool {
		let slot = &mut self.0[kind.index()];
		if *slot == Some(key) {
			*slot = None;
			true
		} else {
			false
		}
	}
}

pub(super) struct Timers {
	queue: DelayQueue<TimerEntry>,
	clock: Clock,
}

impl Timers {
	pub fn new(clock: Clock) -> Self {
		Self {
			queue: DelayQueue::new(),
			clock,
		}
	}

	/// Schedules an entry at an absolute tick deadline. Deadlines further
	/// out than [`HORIZON_MILLIS`] are clamped to it.
	pub fn insert(&mut self, entry: TimerEntry, deadline: Ticks) -> Key {
		let horizon = self.clock.now().plus_millis(HORIZON_MILLIS);
		let deadline = self.clock.instant_at(deadline.min(horizon));
		self.queue.insert_at(entry, deadline)
	}

	pub fn remove(&mut self, key: &Key) {
		self.queue.try_remove(key);
	}

	/// Arms a remote lease agent timer, replacing the one of the same kind.
	pub fn arm(
		&mut self,
		slots: &mut TimerSlots,
		handle: Handle,
		kind: TimerKind,
		deadline: Ticks,
	) {
		self.cancel(slots, kind);
		let key = self.insert(TimerEntry::Remote(handle, kind), deadline);
		slots.0[kind.index()] = Some(key);
	}

	pub fn cancel(&mut self, slots: &mut TimerSlots, kind: TimerKind) {
		if let Some(key) = slots.0[kind.index()].take() {
			self.remove(&key);
		}
	}

	pub fn cancel_all(&mut self, slots: &mut TimerSlots) {
		for kind in TimerKind::ALL {
			self.cancel(slots, kind);
		}
	}
}

impl Stream for Timers {
	type Item = (TimerEntry, Key);

	fn poll_next(
		mut self: Pin<&mut Self>,
		cx: &mut Context<'_>,
	) -> Poll<Option<Self::Item>> {
		self.queue.poll_expired(cx).map(|expired| {
			expired.map(|expired| {
				let key = expired.key();
				(expired.into_inner(), key)
			})
		})
	}
}

//! Relationship list processing for incoming requests and responses.
//!
//! Requests carry identifiers in the sender's perspective: the subject lists
//! name relationships this node monitors, the monitor failure list names
//! relationships this node is the subject of.

use {
	super::super::{LeaseEvent, remote::RemoteLeaseAgent, worker::WorkerLoop},
	crate::{
		lease::{MonitorSlot, Perspective, RelationshipIdentifier, SubjectSlot},
		primitives::{Handle, Pretty},
		wire::{LeaseLists, ListKind},
	},
};

impl WorkerLoop {
	/// Applies the lists of an incoming request and returns the lists of
	/// the response.
	pub(in crate::agent) fn request_change_state(
		&mut self,
		handle: Handle,
		incoming: &LeaseLists,
	) -> LeaseLists {
		let mut outgoing = LeaseLists::default();
		let Some(rla) = self.remotes.get_mut(handle) else {
			return outgoing;
		};
		let peer = rla.peer.clone();

		for id in &incoming[ListKind::SubjectPending] {
			if self.applications.contains_key(&id.remote) {
				if rla.table.monitor(id).is_none() {
					rla.table.set_monitor(id.clone(), Some(MonitorSlot::Active));
				}
				outgoing[ListKind::SubjectPendingAccepted].push(id.clone());
			} else {
				tracing::debug!(
					agent = %self.local,
					%peer,
					relationship = %id,
					"rejecting relationship for unknown application"
				);
				outgoing[ListKind::SubjectPendingRejected].push(id.clone());
			}
		}

		for id in &incoming[ListKind::SubjectTerminatePending] {
			rla.table.set_monitor(id.clone(), None);
			outgoing[ListKind::SubjectTerminateAccepted].push(id.clone());
		}

		let mut expired = Vec::new();
		for id in &incoming[ListKind::SubjectFailedPending] {
			if rla.table.set_monitor(id.clone(), None).is_some() {
				expired.push(id.clone());
			}
			outgoing[ListKind::SubjectFailedAccepted].push(id.clone());
		}

		let failed_subjects = self.monitor_failed(handle, incoming);
		outgoing[ListKind::MonitorFailedAccepted] = failed_subjects;

		for id in &expired {
			self.notify_remote_expired(&peer, id, Perspective::Remote);
		}

		outgoing
	}

	/// Applies the lists of an incoming response.
	pub(in crate::agent) fn response_change_state(
		&mut self,
		handle: Handle,
		incoming: &LeaseLists,
	) {
		let Some(rla) = self.remotes.get_mut(handle) else {
			return;
		};
		let peer = rla.peer.clone();

		let mut established = Vec::new();
		for id in &incoming[ListKind::SubjectPendingAccepted] {
			if rla.table.subject(id) == Some(SubjectSlot::Pending) {
				rla.table.set_subject(id.clone(), Some(SubjectSlot::Active));
				established.push(id.clone());
			}
		}

		let mut rejected = Vec::new();
		for id in &incoming[ListKind::SubjectPendingRejected] {
			if rla.table.subject(id) == Some(SubjectSlot::Pending) {
				rla.table.set_subject(id.clone(), None);
				rejected.push(id.clone());
			}
		}

		remove_subjects(
			rla,
			&incoming[ListKind::SubjectFailedAccepted],
			SubjectSlot::FailedPending,
		);
		remove_subjects(
			rla,
			&incoming[ListKind::SubjectTerminateAccepted],
			SubjectSlot::TerminatePending,
		);

		for id in &incoming[ListKind::MonitorFailedAccepted] {
			if rla.table.monitor(id) == Some(MonitorSlot::FailedPending) {
				rla.table.set_monitor(id.clone(), None);
			}
		}

		// Failures reported on a response are acknowledged with the next
		// request's state, not with a list of their own.
		let failed = self.monitor_failed(handle, incoming);
		if !failed.is_empty() {
			tracing::debug!(
				agent = %self.local,
				%peer,
				failed = %Pretty::iter(&failed),
				"peer reported monitor failures on a response"
			);
		}

		for id in established {
			tracing::info!(
				agent = %self.local,
				%peer,
				relationship = %id,
				"lease relationship established"
			);
			self.notify(&id.local, LeaseEvent::Established {
				remote_app: id.remote.clone(),
				peer: peer.clone(),
			});
		}

		if !rejected.is_empty() {
			tracing::debug!(
				agent = %self.local,
				%peer,
				rejected = %Pretty::iter(&rejected),
				"peer rejected lease relationships"
			);
		}
		for id in &rejected {
			self.notify_remote_expired(&peer, id, Perspective::Local);
		}
	}

	/// The peer gave up monitoring some of our subjects. Returns the
	/// identifiers to acknowledge.
	fn monitor_failed(
		&mut self,
		handle: Handle,
		incoming: &LeaseLists,
	) -> Vec<RelationshipIdentifier> {
		let Some(rla) = self.remotes.get_mut(handle) else {
			return Vec::new();
		};
		let peer = rla.peer.clone();

		let mut accepted = Vec::new();
		for id in &incoming[ListKind::MonitorFailedPending] {
			if rla.table.is_subject(id) {
				rla.table.set_subject(id.clone(), Some(SubjectSlot::FailedPending));
				accepted.push(id.clone());
			}
		}

		for id in &accepted {
			self.notify_remote_expired(&peer, id, Perspective::Local);
		}
		accepted
	}
}

fn remove_subjects(
	rla: &mut RemoteLeaseAgent,
	ids: &[RelationshipIdentifier],
	slot: SubjectSlot,
) {
	for id in ids {
		if rla.table.subject(id) == Some(slot) {
			rla.table.set_subject(id.clone(), None);
		}
	}
}

use {
	crate::wire::MAX_PATH,
	core::fmt,
	derive_more::{Deref, Display},
	serde::{Deserialize, Serialize},
	std::collections::BTreeMap,
};

/// Errors raised when constructing identifiers from untrusted strings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidIdentifier {
	#[error("application identifier is empty")]
	Empty,

	#[error("application identifier exceeds {MAX_PATH} UTF-16 units: {0}")]
	TooLong(usize),

	#[error("application identifier contains a NUL character")]
	InteriorNul,
}

/// Name of a leasing application, unique within one lease agent.
#[derive(
	Debug,
	Clone,
	PartialEq,
	Eq,
	PartialOrd,
	Ord,
	Hash,
	Display,
	Deref,
	Serialize,
	Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct ApplicationId(String);

impl ApplicationId {
	pub fn new(id: impl Into<String>) -> Result<Self, InvalidIdentifier> {
		let id = id.into();
		if id.is_empty() {
			return Err(InvalidIdentifier::Empty);
		}

		if id.contains('\0') {
			return Err(InvalidIdentifier::InteriorNul);
		}

		let units = id.encode_utf16().count();
		if units > MAX_PATH {
			return Err(InvalidIdentifier::TooLong(units));
		}

		Ok(Self(id))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl TryFrom<String> for ApplicationId {
	type Error = InvalidIdentifier;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}

impl TryFrom<&str> for ApplicationId {
	type Error = InvalidIdentifier;

	fn try_from(value: &str) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}

impl From<ApplicationId> for String {
	fn from(value: ApplicationId) -> Self {
		value.0
	}
}

/// Which node's point of view an identifier pair is expressed in.
///
/// Subject entries are stored as seen by this node. Monitor entries and all
/// identifiers decoded off the wire are stored as the peer sent them, so their
/// `local` half names the peer's application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Perspective {
	Local,
	Remote,
}

/// The (local application, remote application) pair naming one lease
/// relationship.
#[derive(
	Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct RelationshipIdentifier {
	pub local: ApplicationId,
	pub remote: ApplicationId,
}

impl fmt::Display for RelationshipIdentifier {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}->{}", self.local, self.remote)
	}
}

impl RelationshipIdentifier {
	pub const fn new(local: ApplicationId, remote: ApplicationId) -> Self {
		Self { local, remote }
	}

	/// The same relationship as seen from the other node.
	#[must_use]
	pub fn reversed(&self) -> Self {
		Self {
			local: self.remote.clone(),
			remote: self.local.clone(),
		}
	}

	/// The application hosted on this node for an identifier stored in the
	/// given perspective.
	pub const fn application(&self, perspective: Perspective) -> &ApplicationId {
		match perspective {
			Perspective::Local => &self.local,
			Perspective::Remote => &self.remote,
		}
	}

	/// The application hosted on the peer for an identifier stored in the
	/// given perspective.
	pub const fn remote_application(
		&self,
		perspective: Perspective,
	) -> &ApplicationId {
		match perspective {
			Perspective::Local => &self.remote,
			Perspective::Remote => &self.local,
		}
	}

	/// Re-expresses an identifier held in `from` as seen in `to`.
	#[must_use]
	pub fn in_perspective(&self, from: Perspective, to: Perspective) -> Self {
		if from == to {
			self.clone()
		} else {
			self.reversed()
		}
	}
}

/// Where a relationship stands on the subject side of a remote lease agent.
///
/// `Pending` and `Active` together form the subject set. `Pending` entries
/// are still waiting for the monitor to accept them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubjectSlot {
	Pending,
	Active,
	FailedPending,
	TerminatePending,
}

/// Where a relationship stands on the monitor side of a remote lease agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MonitorSlot {
	Active,
	FailedPending,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Entry {
	subject: Option<SubjectSlot>,
	monitor: Option<MonitorSlot>,
}

impl Entry {
	const fn is_empty(&self) -> bool {
		self.subject.is_none() && self.monitor.is_none()
	}
}

/// All relationship identifiers known to one remote lease agent.
///
/// Each identifier carries at most one subject-side slot and at most one
/// monitor-side slot, so moving a relationship between pending, established
/// and failed states is a single slot update and an identifier can never be
/// listed twice on the same side.
#[derive(Debug, Clone, Default)]
pub struct RelationshipTable {
	entries: BTreeMap<RelationshipIdentifier, Entry>,
}

impl RelationshipTable {
	pub fn subject(&self, id: &RelationshipIdentifier) -> Option<SubjectSlot> {
		self.entries.get(id).and_then(|e| e.subject)
	}

	pub fn monitor(&self, id: &RelationshipIdentifier) -> Option<MonitorSlot> {
		self.entries.get(id).and_then(|e| e.monitor)
	}

	/// Member of the subject set (pending or active).
	pub fn is_subject(&self, id: &RelationshipIdentifier) -> bool {
		matches!(
			self.subject(id),
			Some(SubjectSlot::Pending | SubjectSlot::Active)
		)
	}

	pub fn set_subject(
		&mut self,
		id: RelationshipIdentifier,
		slot: Option<SubjectSlot>,
	) -> Option<SubjectSlot> {
		self.update(id, |entry| core::mem::replace(&mut entry.subject, slot))
	}

	pub fn set_monitor(
		&mut self,
		id: RelationshipIdentifier,
		slot: Option<MonitorSlot>,
	) -> Option<MonitorSlot> {
		self.update(id, |entry| core::mem::replace(&mut entry.monitor, slot))
	}

	fn update<R>(
		&mut self,
		id: RelationshipIdentifier,
		f: impl FnOnce(&mut Entry) -> R,
	) -> R {
		let entry = self.entries.entry(id.clone()).or_default();
		let result = f(entry);
		if entry.is_empty() {
			self.entries.remove(&id);
		}
		result
	}

	/// Identifiers on the subject side whose slot matches `filter`.
	pub fn subjects_where(
		&self,
		filter: impl Fn(SubjectSlot) -> bool,
	) -> Vec<RelationshipIdentifier> {
		self
			.entries
			.iter()
			.filter(|(_, e)| e.subject.is_some_and(&filter))
			.map(|(id, _)| id.clone())
			.collect()
	}

	/// Identifiers on the monitor side whose slot matches `filter`.
	pub fn monitors_where(
		&self,
		filter: impl Fn(MonitorSlot) -> bool,
	) -> Vec<RelationshipIdentifier> {
		self
			.entries
			.iter()
			.filter(|(_, e)| e.monitor.is_some_and(&filter))
			.map(|(id, _)| id.clone())
			.collect()
	}

	pub fn subjects_in(&self, slot: SubjectSlot) -> Vec<RelationshipIdentifier> {
		self.subjects_where(|s| s == slot)
	}

	pub fn monitors_in(&self, slot: MonitorSlot) -> Vec<RelationshipIdentifier> {
		self.monitors_where(|s| s == slot)
	}

	/// Pending and active subjects.
	pub fn subject_set(&self) -> Vec<RelationshipIdentifier> {
		self.subjects_where(|s| matches!(s, SubjectSlot::Pending | SubjectSlot::Active))
	}

	pub fn has_subjects(&self) -> bool {
		self.entries.values().any(|e| {
			matches!(e.subject, Some(SubjectSlot::Pending | SubjectSlot::Active))
		})
	}

	pub fn has_monitors(&self) -> bool {
		self
			.entries
			.values()
			.any(|e| e.monitor == Some(MonitorSlot::Active))
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn clear(&mut self) {
		self.entries.clear();
	}

	pub fn iter(
		&self,
	) -> impl Iterator<
		Item = (&RelationshipIdentifier, Option<SubjectSlot>, Option<MonitorSlot>),
	> {
		self
			.entries
			.iter()
			.map(|(id, entry)| (id, entry.subject, entry.monitor))
	}
}

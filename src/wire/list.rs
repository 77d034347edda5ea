use {
	super::{
		CodecError,
		MAX_PATH,
		endpoint::{put_utf16z, read_utf16z, utf16z_len},
	},
	crate::lease::{ApplicationId, RelationshipIdentifier},
	bytes::{Buf, BufMut, BytesMut},
	core::ops::{Index, IndexMut},
	std::collections::BTreeSet,
};

/// The nine relationship identifier lists a lease message carries, in wire
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ListKind {
	SubjectPending,
	SubjectFailedPending,
	MonitorFailedPending,
	SubjectPendingAccepted,
	SubjectFailedAccepted,
	MonitorFailedAccepted,
	SubjectPendingRejected,
	SubjectTerminatePending,
	SubjectTerminateAccepted,
}

impl ListKind {
	pub const ALL: [Self; LIST_COUNT] = [
		Self::SubjectPending,
		Self::SubjectFailedPending,
		Self::MonitorFailedPending,
		Self::SubjectPendingAccepted,
		Self::SubjectFailedAccepted,
		Self::MonitorFailedAccepted,
		Self::SubjectPendingRejected,
		Self::SubjectTerminatePending,
		Self::SubjectTerminateAccepted,
	];

	pub const fn index(self) -> usize {
		self as usize
	}
}

pub const LIST_COUNT: usize = 9;

/// Per-element byte count limit for one application identifier, NUL
/// included.
const MAX_IDENTIFIER_BYTES: u32 = 2 * (MAX_PATH as u32 + 1);

/// Relationship identifiers carried by one message, as the sender sees
/// them: `local` names the sender's application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaseLists {
	lists: [Vec<RelationshipIdentifier>; LIST_COUNT],
}

impl Index<ListKind> for LeaseLists {
	type Output = Vec<RelationshipIdentifier>;

	fn index(&self, kind: ListKind) -> &Self::Output {
		&self.lists[kind.index()]
	}
}

impl IndexMut<ListKind> for LeaseLists {
	fn index_mut(&mut self, kind: ListKind) -> &mut Self::Output {
		&mut self.lists[kind.index()]
	}
}

impl LeaseLists {
	pub fn with(mut self, kind: ListKind, ids: Vec<RelationshipIdentifier>) -> Self {
		self[kind] = ids;
		self
	}

	pub fn is_empty(&self) -> bool {
		self.lists.iter().all(Vec::is_empty)
	}

	pub fn iter(&self) -> impl Iterator<Item = (ListKind, &[RelationshipIdentifier])> {
		ListKind::ALL
			.into_iter()
			.map(|kind| (kind, self[kind].as_slice()))
	}
}

/// Encoded size of one list, including its size and count prefix.
pub(crate) fn list_len(ids: &[RelationshipIdentifier]) -> usize {
	8 + ids
		.iter()
		.map(|id| 8 + utf16z_len(id.local.as_str()) + utf16z_len(id.remote.as_str()))
		.sum::<usize>()
}

pub(crate) fn encode_list(
	buf: &mut BytesMut,
	ids: &[RelationshipIdentifier],
) -> Result<(), CodecError> {
	let size = u32::try_from(list_len(ids)).map_err(|_| CodecError::TooLarge)?;
	let count = u32::try_from(ids.len()).map_err(|_| CodecError::TooLarge)?;
	buf.put_u32_le(size);
	buf.put_u32_le(count);

	for id in ids {
		for app in [&id.local, &id.remote] {
			let len = u32::try_from(utf16z_len(app.as_str()))
				.map_err(|_| CodecError::TooLarge)?;
			buf.put_u32_le(len);
			put_utf16z(buf, app.as_str());
		}
	}

	Ok(())
}

/// Decodes one list occupying `bytes` exactly.
pub(crate) fn decode_list(
	kind: ListKind,
	mut bytes: &[u8],
) -> Result<Vec<RelationshipIdentifier>, CodecError> {
	let fail = |reason| CodecError::List { kind, reason };
	let total = bytes.len();

	if bytes.remaining() < 8 {
		return Err(fail("shorter than its size and count"));
	}

	let size = bytes.get_u32_le() as usize;
	let count = bytes.get_u32_le();
	if size != total {
		return Err(fail("size does not match its descriptor"));
	}

	let mut seen = BTreeSet::new();
	let mut ids = Vec::new();
	for _ in 0..count {
		let local = read_application(&mut bytes).map_err(fail)?;
		let remote = read_application(&mut bytes).map_err(fail)?;
		let id = RelationshipIdentifier::new(local, remote);
		if !seen.insert(id.clone()) {
			return Err(fail("duplicate identifier"));
		}
		ids.push(id);
	}

	if bytes.has_remaining() {
		return Err(fail("trailing bytes"));
	}

	Ok(ids)
}

fn read_application(bytes: &mut &[u8]) -> Result<ApplicationId, &'static str> {
	if bytes.remaining() < 4 {
		return Err("truncated byte count");
	}

	let byte_count = bytes.get_u32_le();
	if byte_count == 0 || byte_count % 2 != 0 || byte_count > MAX_IDENTIFIER_BYTES {
		return Err("invalid byte count");
	}

	let byte_count = byte_count as usize;
	if bytes.remaining() < byte_count {
		return Err("truncated identifier");
	}

	let value = read_utf16z(&bytes[..byte_count]).ok_or("invalid identifier string")?;
	bytes.advance(byte_count);
	ApplicationId::new(value).map_err(|_| "invalid application identifier")
}

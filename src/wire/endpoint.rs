use {
	super::{CodecError, ENDPOINT_ADDR_CCH_MAX},
	bytes::{Buf, BufMut, BytesMut},
	core::fmt,
	serde::{Deserialize, Serialize},
};

/// Address a lease agent listens on.
///
/// The address is an opaque host string; the transport decides how to reach
/// it. On the wire it is a NUL-terminated UTF-16LE string followed by the
/// resolve type and the port.
#[derive(
	Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ListenEndpoint {
	address: String,
	resolve_type: u16,
	port: u16,
}

impl fmt::Display for ListenEndpoint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.address, self.port)
	}
}

impl ListenEndpoint {
	pub fn new(address: impl Into<String>, port: u16) -> Result<Self, CodecError> {
		Self::with_resolve_type(address, 0, port)
	}

	pub fn with_resolve_type(
		address: impl Into<String>,
		resolve_type: u16,
		port: u16,
	) -> Result<Self, CodecError> {
		let address = address.into();
		if address.is_empty() {
			return Err(CodecError::Endpoint("empty address"));
		}
		if address.contains('\0') {
			return Err(CodecError::Endpoint("address contains NUL"));
		}
		if address.encode_utf16().count() >= ENDPOINT_ADDR_CCH_MAX {
			return Err(CodecError::Endpoint("address too long"));
		}

		Ok(Self {
			address,
			resolve_type,
			port,
		})
	}

	pub fn address(&self) -> &str {
		&self.address
	}

	pub const fn port(&self) -> u16 {
		self.port
	}

	pub const fn resolve_type(&self) -> u16 {
		self.resolve_type
	}

	/// Bytes this endpoint occupies in a message body.
	pub(crate) fn encoded_len(&self) -> usize {
		utf16z_len(&self.address) + 4
	}

	pub(crate) fn encode(&self, buf: &mut BytesMut) {
		put_utf16z(buf, &self.address);
		buf.put_u16_le(self.resolve_type);
		buf.put_u16_le(self.port);
	}

	pub(crate) fn decode(mut bytes: &[u8]) -> Result<Self, CodecError> {
		let Some(address_len) = bytes.len().checked_sub(4) else {
			return Err(CodecError::Endpoint("shorter than resolve type and port"));
		};

		if address_len > ENDPOINT_ADDR_CCH_MAX * 2 {
			return Err(CodecError::Endpoint("address too long"));
		}

		let address = read_utf16z(&bytes[..address_len])
			.ok_or(CodecError::Endpoint("address is not a valid string"))?;
		bytes.advance(address_len);

		let resolve_type = bytes.get_u16_le();
		let port = bytes.get_u16_le();
		Self::with_resolve_type(address, resolve_type, port)
	}
}

/// Encoded size of a NUL-terminated UTF-16 string.
pub(crate) fn utf16z_len(value: &str) -> usize {
	(value.encode_utf16().count() + 1) * 2
}

pub(crate) fn put_utf16z(buf: &mut BytesMut, value: &str) {
	for unit in value.encode_utf16() {
		buf.put_u16_le(unit);
	}
	buf.put_u16_le(0);
}

/// Reads a UTF-16LE string that occupies `bytes` exactly and ends with its
/// only NUL.
pub(crate) fn read_utf16z(bytes: &[u8]) -> Option<String> {
	if bytes.len() < 2 || bytes.len() % 2 != 0 {
		return None;
	}

	let units: Vec<u16> = bytes
		.chunks_exact(2)
		.map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
		.collect();

	let (last, body) = units.split_last()?;
	if *last != 0 || body.contains(&0) {
		return None;
	}

	String::from_utf16(body).ok()
}

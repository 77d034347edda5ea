use {
	super::{CodecError, LIST_COUNT, ListKind, MessageType},
	crate::lease::is_valid_duration,
	bytes::{Buf, BufMut, BytesMut},
};

/// Fixed header fields before the body descriptors.
const FIXED_LEN: usize = 59;

/// Header of a direct lease or ping message.
pub const HEADER_SIZE_REGULAR: u32 = (FIXED_LEN + LIST_COUNT * 12 + 8) as u32;

/// Header of a forward or relay message, which also describes the lease
/// listen endpoint.
pub const HEADER_SIZE_INDIRECT: u32 = HEADER_SIZE_REGULAR + 8;

/// Location of one identifier list inside the message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListDescriptor {
	pub count: u32,
	pub start: u32,
	pub size: u32,
}

/// Location of one listen endpoint inside the message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndpointDescriptor {
	pub start: u32,
	pub size: u32,
}

impl EndpointDescriptor {
	pub const fn is_present(&self) -> bool {
		self.start != 0 && self.size != 0
	}

	pub const fn end(&self) -> u32 {
		self.start.saturating_add(self.size)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
	pub major: u8,
	pub minor: u8,
	pub header_size: u32,
	pub message_size: u32,
	pub message_id: i64,
	pub message_type: MessageType,
	pub lease_instance: i64,
	pub remote_instance: i64,
	pub duration: i32,
	pub expiration: i64,
	pub suspend_duration: i32,
	pub arbitration_duration: i32,
	pub two_way_termination: bool,
	pub lists: [ListDescriptor; LIST_COUNT],
	pub message_endpoint: EndpointDescriptor,
	pub lease_endpoint: EndpointDescriptor,
}

impl Header {
	pub const fn version(&self) -> u16 {
		((self.major as u16) << 8) | self.minor as u16
	}

	pub const fn header_size_for(message_type: MessageType) -> u32 {
		if message_type.is_indirect() {
			HEADER_SIZE_INDIRECT
		} else {
			HEADER_SIZE_REGULAR
		}
	}

	pub(crate) fn encode(&self, buf: &mut BytesMut) {
		buf.put_u8(self.major);
		buf.put_u8(self.minor);
		buf.put_u32_le(self.header_size);
		buf.put_u32_le(self.message_size);
		buf.put_i64_le(self.message_id);
		buf.put_u32_le(self.message_type as u32);
		buf.put_i64_le(self.lease_instance);
		buf.put_i64_le(self.remote_instance);
		buf.put_i32_le(self.duration);
		buf.put_i64_le(self.expiration);
		buf.put_i32_le(self.suspend_duration);
		buf.put_i32_le(self.arbitration_duration);
		buf.put_u8(u8::from(self.two_way_termination));

		for list in &self.lists {
			buf.put_u32_le(list.count);
			buf.put_u32_le(list.start);
			buf.put_u32_le(list.size);
		}

		buf.put_u32_le(self.message_endpoint.start);
		buf.put_u32_le(self.message_endpoint.size);

		if self.header_size >= HEADER_SIZE_INDIRECT {
			buf.put_u32_le(self.lease_endpoint.start);
			buf.put_u32_le(self.lease_endpoint.size);
		}
	}

	/// Parses and validates the header at the start of `buffer`.
	///
	/// Only the header is checked here; list contents, endpoints and the
	/// extension are validated while decoding the body.
	pub fn parse(buffer: &[u8]) -> Result<Self, CodecError> {
		if buffer.len() < HEADER_SIZE_REGULAR as usize {
			return Err(CodecError::ShortBuffer(buffer.len()));
		}

		let mut bytes = buffer;
		let major = bytes.get_u8();
		let minor = bytes.get_u8();
		let header_size = bytes.get_u32_le();
		let message_size = bytes.get_u32_le();

		if message_size as usize > buffer.len() {
			return Err(CodecError::Truncated {
				message: message_size,
				buffer: buffer.len(),
			});
		}

		if header_size == 0 || header_size >= message_size {
			return Err(CodecError::HeaderSize {
				header: header_size,
				message: message_size,
			});
		}

		let message_id = bytes.get_i64_le();
		let raw_type = bytes.get_u32_le();
		let message_type = MessageType::try_from(raw_type)?;

		if header_size < Self::header_size_for(message_type) {
			return Err(CodecError::HeaderSize {
				header: header_size,
				message: message_size,
			});
		}

		let lease_instance = bytes.get_i64_le();
		let remote_instance = bytes.get_i64_le();
		let duration = bytes.get_i32_le();
		let expiration = bytes.get_i64_le();
		let suspend_duration = bytes.get_i32_le();
		let arbitration_duration = bytes.get_i32_le();
		let two_way_termination = bytes.get_u8() != 0;

		if !message_type.is_ping() {
			if !is_valid_duration(duration) {
				return Err(CodecError::InvalidDuration(duration));
			}
			if lease_instance <= 0 {
				return Err(CodecError::InvalidLeaseInstance(lease_instance));
			}
		}

		let mut lists = [ListDescriptor::default(); LIST_COUNT];
		for list in &mut lists {
			list.count = bytes.get_u32_le();
			list.start = bytes.get_u32_le();
			list.size = bytes.get_u32_le();
		}

		let message_endpoint = EndpointDescriptor {
			start: bytes.get_u32_le(),
			size: bytes.get_u32_le(),
		};

		let lease_endpoint = if message_type.is_indirect() {
			EndpointDescriptor {
				start: bytes.get_u32_le(),
				size: bytes.get_u32_le(),
			}
		} else {
			EndpointDescriptor::default()
		};

		let header = Self {
			major,
			minor,
			header_size,
			message_size,
			message_id,
			message_type,
			lease_instance,
			remote_instance,
			duration,
			expiration,
			suspend_duration,
			arbitration_duration,
			two_way_termination,
			lists,
			message_endpoint,
			lease_endpoint,
		};

		for kind in ListKind::ALL {
			let list = header.lists[kind.index()];
			if !header.fits(list.start, list.size) {
				return Err(CodecError::Descriptor(kind));
			}
		}

		if !header.fits(message_endpoint.start, message_endpoint.size) {
			return Err(CodecError::EndpointDescriptor);
		}

		if lease_endpoint.is_present()
			&& !header.fits(lease_endpoint.start, lease_endpoint.size)
		{
			return Err(CodecError::EndpointDescriptor);
		}

		Ok(header)
	}

	/// A body region must start after the header, end inside the message and
	/// be smaller than the whole body.
	const fn fits(&self, start: u32, size: u32) -> bool {
		let end = start as u64 + size as u64;
		start >= self.header_size
			&& start < self.message_size
			&& end <= self.message_size as u64
			&& size < self.message_size - self.header_size
	}
}

use {
	super::{
		CodecError,
		EndpointDescriptor,
		Header,
		LIST_COUNT,
		LeaseLists,
		ListDescriptor,
		ListKind,
		ListenEndpoint,
		MessageType,
		PROTOCOL_MAJOR_VERSION,
		PROTOCOL_MINOR_VERSION,
		list::{decode_list, encode_list, list_len},
	},
	crate::{lease::Durations, primitives::Ticks},
	bytes::{BufMut, Bytes, BytesMut},
};

/// Size of the trailing extension block.
const EXTENSION_LEN: usize = 8;

/// A decoded lease message.
///
/// `sender_instance` is the instance of the lease agent that built the
/// message. `extension` is the instance the sender has on record for the
/// receiving agent, or zero when it has none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseMessage {
	pub version: u16,
	pub message_type: MessageType,
	pub message_id: i64,
	pub lease_instance: i64,
	pub sender_instance: i64,
	pub durations: Durations,
	pub expiration: Ticks,
	pub two_way_termination: bool,
	pub lists: LeaseLists,
	pub message_endpoint: ListenEndpoint,
	pub lease_endpoint: Option<ListenEndpoint>,
	pub extension: i64,
}

impl LeaseMessage {
	pub const fn is_legacy(&self) -> bool {
		self.version == super::LEGACY_VERSION
	}

	/// Serializes the message.
	///
	/// Offsets are laid out in list order directly after the header, then
	/// the message endpoint, the lease endpoint for indirect messages and
	/// finally the extension.
	pub fn encode(&self) -> Result<Bytes, CodecError> {
		let header_size = Header::header_size_for(self.message_type);
		let lease_endpoint = if self.message_type.is_indirect() {
			Some(
				self
					.lease_endpoint
					.as_ref()
					.ok_or(CodecError::MissingLeaseEndpoint)?,
			)
		} else {
			None
		};

		let to_u32 = |value: usize| u32::try_from(value).map_err(|_| CodecError::TooLarge);

		let mut offset = header_size;
		let mut lists = [ListDescriptor::default(); LIST_COUNT];
		for (kind, ids) in self.lists.iter() {
			let size = to_u32(list_len(ids))?;
			lists[kind.index()] = ListDescriptor {
				count: to_u32(ids.len())?,
				start: offset,
				size,
			};
			offset = offset.checked_add(size).ok_or(CodecError::TooLarge)?;
		}

		let message_endpoint = EndpointDescriptor {
			start: offset,
			size: to_u32(self.message_endpoint.encoded_len())?,
		};
		offset = message_endpoint.end();

		let lease_endpoint_descriptor = match lease_endpoint {
			Some(endpoint) => {
				let descriptor = EndpointDescriptor {
					start: offset,
					size: to_u32(endpoint.encoded_len())?,
				};
				offset = descriptor.end();
				descriptor
			}
			None => EndpointDescriptor::default(),
		};

		let message_size = offset
			.checked_add(to_u32(EXTENSION_LEN)?)
			.ok_or(CodecError::TooLarge)?;

		let header = Header {
			major: (self.version >> 8) as u8,
			minor: (self.version & 0xff) as u8,
			header_size,
			message_size,
			message_id: self.message_id,
			message_type: self.message_type,
			lease_instance: self.lease_instance,
			remote_instance: self.sender_instance,
			duration: self.durations.lease,
			expiration: self.expiration.raw(),
			suspend_duration: self.durations.suspend,
			arbitration_duration: self.durations.arbitration,
			two_way_termination: self.two_way_termination,
			lists,
			message_endpoint,
			lease_endpoint: lease_endpoint_descriptor,
		};

		let mut buf = BytesMut::with_capacity(message_size as usize);
		header.encode(&mut buf);
		for (_, ids) in self.lists.iter() {
			encode_list(&mut buf, ids)?;
		}
		self.message_endpoint.encode(&mut buf);
		if let Some(endpoint) = lease_endpoint {
			endpoint.encode(&mut buf);
		}
		buf.put_i64_le(self.extension);

		debug_assert_eq!(buf.len(), message_size as usize);
		Ok(buf.freeze())
	}

	/// Validates and decodes a received buffer.
	///
	/// Direct and relay messages must fill the buffer exactly. Forward
	/// messages are only required to fit in it, since they are re-emitted
	/// rather than processed.
	pub fn decode(buffer: &[u8]) -> Result<Self, CodecError> {
		let header = Header::parse(buffer)?;

		if !header.message_type.is_forward()
			&& header.message_size as usize != buffer.len()
		{
			return Err(CodecError::SizeMismatch {
				message: header.message_size,
				buffer: buffer.len(),
			});
		}

		let frame = &buffer[..header.message_size as usize];

		let mut lists = LeaseLists::default();
		for kind in ListKind::ALL {
			let descriptor = header.lists[kind.index()];
			lists[kind] = decode_list(kind, region(frame, descriptor.start, descriptor.size))?;
		}

		let message_endpoint = ListenEndpoint::decode(region(
			frame,
			header.message_endpoint.start,
			header.message_endpoint.size,
		))?;
		let mut body_end = header.message_endpoint.end();

		let lease_endpoint = if header.message_type.is_indirect()
			&& header.lease_endpoint.is_present()
		{
			body_end = header.lease_endpoint.end();
			Some(ListenEndpoint::decode(region(
				frame,
				header.lease_endpoint.start,
				header.lease_endpoint.size,
			))?)
		} else {
			None
		};

		if header.message_type.is_forward() && lease_endpoint.is_none() {
			return Err(CodecError::MissingLeaseEndpoint);
		}

		let extension = if body_end < header.message_size {
			let remaining = &frame[body_end as usize..];
			let bytes: [u8; EXTENSION_LEN] = remaining
				.get(..EXTENSION_LEN)
				.and_then(|bytes| bytes.try_into().ok())
				.ok_or(CodecError::Extension(remaining.len()))?;
			i64::from_le_bytes(bytes)
		} else {
			0
		};

		Ok(Self {
			version: header.version(),
			message_type: header.message_type,
			message_id: header.message_id,
			lease_instance: header.lease_instance,
			sender_instance: header.remote_instance,
			durations: Durations::new(
				header.duration,
				header.suspend_duration,
				header.arbitration_duration,
			),
			expiration: Ticks::from_raw(header.expiration),
			two_way_termination: header.two_way_termination,
			lists,
			message_endpoint,
			lease_endpoint,
			extension,
		})
	}

	/// Turns a forward message received from its originator into the relay
	/// message for the final destination.
	///
	/// The originator becomes the lease endpoint and `local` the message
	/// endpoint. The extension is cleared: the originator's record of the
	/// relaying agent says nothing about the destination.
	pub fn into_relay(mut self, local: ListenEndpoint) -> Result<Self, CodecError> {
		self.message_type = match self.message_type {
			MessageType::ForwardRequest => MessageType::RelayRequest,
			MessageType::ForwardResponse => MessageType::RelayResponse,
			_ => return Err(CodecError::NotForward),
		};

		let source = core::mem::replace(&mut self.message_endpoint, local);
		self.lease_endpoint = Some(source);
		self.extension = 0;
		Ok(self)
	}
}

/// Body bytes described by a descriptor already checked by [`Header::parse`].
fn region(frame: &[u8], start: u32, size: u32) -> &[u8] {
	&frame[start as usize..start as usize + size as usize]
}

/// Protocol version this crate speaks.
pub const fn current_version() -> u16 {
	((PROTOCOL_MAJOR_VERSION as u16) << 8) | PROTOCOL_MINOR_VERSION as u16
}

//! Binary lease message format.
//!
//! A message is a fixed header followed by nine relationship identifier
//! lists, the sender's listen endpoint, a second endpoint for forward and
//! relay messages, and an eight byte extension. All integers are
//! little-endian and all strings are NUL-terminated UTF-16LE.
//!
//! Decoding is all-or-nothing: a message that fails any check is rejected as
//! a whole with a [`CodecError`].

mod endpoint;
mod error;
mod header;
mod list;
mod message;

use derive_more::Display;

pub use {
	endpoint::ListenEndpoint,
	error::CodecError,
	header::{
		EndpointDescriptor,
		HEADER_SIZE_INDIRECT,
		HEADER_SIZE_REGULAR,
		Header,
		ListDescriptor,
	},
	list::{LIST_COUNT, LeaseLists, ListKind},
	message::{LeaseMessage, current_version},
};

/// Longest application identifier, in UTF-16 units without the NUL.
pub const MAX_PATH: usize = 260;

/// Longest listen endpoint address, in UTF-16 units with the NUL.
pub const ENDPOINT_ADDR_CCH_MAX: usize = 256;

pub const PROTOCOL_MAJOR_VERSION: u8 = 2;
pub const PROTOCOL_MINOR_VERSION: u8 = 1;

/// Version 1.1 peers predate one-way arbitration.
pub const LEGACY_VERSION: u16 = 0x0101;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[repr(u32)]
pub enum MessageType {
	LeaseRequest = 0,
	LeaseResponse = 1,
	PingRequest = 2,
	PingResponse = 3,
	ForwardRequest = 4,
	ForwardResponse = 5,
	RelayRequest = 6,
	RelayResponse = 7,
}

impl TryFrom<u32> for MessageType {
	type Error = CodecError;

	fn try_from(value: u32) -> Result<Self, Self::Error> {
		Ok(match value {
			0 => Self::LeaseRequest,
			1 => Self::LeaseResponse,
			2 => Self::PingRequest,
			3 => Self::PingResponse,
			4 => Self::ForwardRequest,
			5 => Self::ForwardResponse,
			6 => Self::RelayRequest,
			7 => Self::RelayResponse,
			other => return Err(CodecError::UnknownType(other)),
		})
	}
}

impl MessageType {
	pub const fn is_request(self) -> bool {
		matches!(
			self,
			Self::LeaseRequest
				| Self::PingRequest
				| Self::ForwardRequest
				| Self::RelayRequest
		)
	}

	pub const fn is_response(self) -> bool {
		!self.is_request()
	}

	pub const fn is_ping(self) -> bool {
		matches!(self, Self::PingRequest | Self::PingResponse)
	}

	pub const fn is_forward(self) -> bool {
		matches!(self, Self::ForwardRequest | Self::ForwardResponse)
	}

	pub const fn is_relay(self) -> bool {
		matches!(self, Self::RelayRequest | Self::RelayResponse)
	}

	/// Forward and relay messages carry a second listen endpoint.
	pub const fn is_indirect(self) -> bool {
		self.is_forward() || self.is_relay()
	}

	/// Whether the lease-instance header field carries the subject identifier
	/// of the sender.
	pub const fn carries_subject_identifier(self) -> bool {
		matches!(
			self,
			Self::LeaseRequest | Self::ForwardRequest | Self::PingRequest
		)
	}

	/// Whether the lease-instance header field carries the monitor identifier
	/// of the sender.
	pub const fn carries_monitor_identifier(self) -> bool {
		matches!(
			self,
			Self::LeaseResponse | Self::ForwardResponse | Self::PingResponse
		)
	}

	/// A lease request arriving directly or through a relay.
	pub const fn is_received_lease_request(self) -> bool {
		matches!(self, Self::LeaseRequest | Self::RelayRequest)
	}

	/// A lease response arriving directly or through a relay.
	pub const fn is_received_lease_response(self) -> bool {
		matches!(self, Self::LeaseResponse | Self::RelayResponse)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn message_types_map_to_wire_values() {
		for raw in 0..8 {
			let ty = MessageType::try_from(raw).unwrap();
			assert_eq!(ty as u32, raw);
		}
		assert_eq!(MessageType::try_from(8), Err(CodecError::UnknownType(8)));
		assert_eq!(current_version(), 0x0201);
	}

	#[test]
	fn message_type_classes() {
		assert!(MessageType::RelayRequest.is_request());
		assert!(MessageType::RelayRequest.is_indirect());
		assert!(!MessageType::RelayRequest.is_forward());
		assert!(MessageType::PingResponse.is_response());
		assert!(MessageType::PingResponse.is_ping());
		assert!(MessageType::ForwardRequest.carries_subject_identifier());
		assert!(!MessageType::RelayRequest.carries_subject_identifier());
		assert!(MessageType::ForwardResponse.carries_monitor_identifier());
		assert!(MessageType::PingResponse.carries_monitor_identifier());
		assert!(MessageType::RelayResponse.is_received_lease_response());
		assert!(!MessageType::ForwardRequest.is_received_lease_request());
	}
}

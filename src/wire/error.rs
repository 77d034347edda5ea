use super::ListKind;

/// Reasons a lease message is rejected by the codec.
///
/// Any of these drops the whole message. Nothing decoded before the failure
/// is handed to the protocol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
	#[error("buffer of {0} bytes is shorter than the message header")]
	ShortBuffer(usize),

	#[error("message size {message} exceeds the {buffer} bytes received")]
	Truncated { message: u32, buffer: usize },

	#[error("message size {message} does not match the {buffer} bytes received")]
	SizeMismatch { message: u32, buffer: usize },

	#[error("header size {header} is not valid for message size {message}")]
	HeaderSize { header: u32, message: u32 },

	#[error("unknown message type {0}")]
	UnknownType(u32),

	#[error("invalid lease duration {0}")]
	InvalidDuration(i32),

	#[error("invalid lease instance {0}")]
	InvalidLeaseInstance(i64),

	#[error("{0:?} descriptor is outside the message body")]
	Descriptor(ListKind),

	#[error("listen endpoint descriptor is outside the message body")]
	EndpointDescriptor,

	#[error("malformed {kind:?} list: {reason}")]
	List {
		kind: ListKind,
		reason: &'static str,
	},

	#[error("malformed listen endpoint: {0}")]
	Endpoint(&'static str),

	#[error("message extension is truncated ({0} bytes)")]
	Extension(usize),

	#[error("indirect message without a lease listen endpoint")]
	MissingLeaseEndpoint,

	#[error("only forward messages can be relayed")]
	NotForward,

	#[error("message does not fit the 32-bit size fields")]
	TooLarge,
}

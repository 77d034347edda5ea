//! Formatting utilities for log fields.

use core::fmt;

/// Trait for wrapper types that format a value.
trait FmtWrapper<T> {
	fn wrap(value: T) -> Self;
}

/// Values that have a compact hex rendering for log lines.
pub trait ShortFormat {
	fn fmt_short(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

impl ShortFormat for i64 {
	/// Instances are wall-clock seeded, so the low bytes are the ones that
	/// tell two of them apart.
	fn fmt_short(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		const LEN: usize = 5;
		let bytes = self.to_be_bytes();
		write!(f, "{}", hex::encode(&bytes[bytes.len() - LEN..]))
	}
}

/// Renders an instance number as a short hex string.
pub struct Short<T>(pub T);

impl<T: ShortFormat> fmt::Display for Short<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt_short(f)
	}
}

impl<T: ShortFormat> fmt::Debug for Short<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt_short(f)
	}
}

/// Lets a list of displayable items go into a log field through [`Pretty::iter`].
pub struct Pretty<T>(pub T);

impl<T: fmt::Display> fmt::Display for Pretty<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

impl<T> FmtWrapper<T> for Pretty<T> {
	fn wrap(value: T) -> Self {
		Self(value)
	}
}

impl<T> Pretty<T> {
	pub const fn iter<I: IntoIterator<Item = T>>(iter: I) -> FmtIter<Self, I> {
		FmtIter::new(iter)
	}
}

/// A wrapper type that formats an iterator of items using a specified wrapper.
///
/// # Example
/// ```ignore
/// let ids: Vec<RelationshipIdentifier> = vec![...];
/// tracing::trace!(ids = %Pretty::iter(&ids), "accepted");
/// ```
pub struct FmtIter<W, I>(pub I, core::marker::PhantomData<W>);

impl<I, W> FmtIter<W, I> {
	pub const fn new(iter: I) -> Self {
		Self(iter, core::marker::PhantomData)
	}
}

impl<I, T, W> fmt::Display for FmtIter<W, I>
where
	I: IntoIterator<Item = T> + Clone,
	W: FmtWrapper<T> + fmt::Display,
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "[")?;
		for (i, item) in self.0.clone().into_iter().enumerate() {
			if i > 0 {
				write!(f, ", ")?;
			}
			write!(f, "{}", W::wrap(item))?;
		}
		write!(f, "]")
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn short_instance_keeps_low_bytes() {
		let value: i64 = 0x0102_0304_0506_0708;
		assert_eq!(Short(value).to_string(), "0405060708");
		assert_eq!(format!("{:?}", Short(value)), "0405060708");
	}

	#[test]
	fn iter_formats_all_items() {
		let items = ["a", "b", "c"];
		assert_eq!(Pretty::iter(items).to_string(), "[a, b, c]");
	}
}

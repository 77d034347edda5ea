//! Generational arena used to own remote lease agents.
//!
//! Timers and pending work refer to arena entries through a [`Handle`]. A
//! handle whose entry has been removed never resolves again, even when the
//! slot is reused by a later insertion.

use core::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle {
	index: u32,
	generation: u32,
}

impl fmt::Debug for Handle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}v{}", self.index, self.generation)
	}
}

impl fmt::Display for Handle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(self, f)
	}
}

enum Slot<T> {
	Occupied { generation: u32, value: T },
	Vacant { generation: u32 },
}

pub struct Arena<T> {
	slots: Vec<Slot<T>>,
	free: Vec<u32>,
	len: usize,
}

impl<T> Default for Arena<T> {
	fn default() -> Self {
		Self {
			slots: Vec::new(),
			free: Vec::new(),
			len: 0,
		}
	}
}

impl<T> Arena<T> {
	pub fn new() -> Self {
		Self::default()
	}

	pub const fn len(&self) -> usize {
		self.len
	}

	pub const fn is_empty(&self) -> bool {
		self.len == 0
	}

	pub fn insert(&mut self, value: T) -> Handle {
		self.len += 1;
		if let Some(index) = self.free.pop() {
			if let Some(Slot::Vacant { generation }) = self.slots.get(index as usize)
			{
				let generation = generation.wrapping_add(1);
				self.slots[index as usize] = Slot::Occupied { generation, value };
				return Handle { index, generation };
			}
		}

		let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
		self.slots.push(Slot::Occupied {
			generation: 0,
			value,
		});
		Handle {
			index,
			generation: 0,
		}
	}

	pub fn get(&self, handle: Handle) -> Option<&T> {
		match self.slots.get(handle.index as usize)? {
			Slot::Occupied { generation, value } if *generation == handle.generation => {
				Some(value)
			}
			_ => None,
		}
	}

	pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
		match self.slots.get_mut(handle.index as usize)? {
			Slot::Occupied { generation, value } if *generation == handle.generation => {
				Some(value)
			}
			_ => None,
		}
	}

	pub fn contains(&self, handle: Handle) -> bool {
		self.get(handle).is_some()
	}

	pub fn remove(&mut self, handle: Handle) -> Option<T> {
		if !self.contains(handle) {
			return None;
		}

		let vacant = Slot::Vacant {
			generation: handle.generation,
		};
		match core::mem::replace(&mut self.slots[handle.index as usize], vacant) {
			Slot::Occupied { value, .. } => {
				self.free.push(handle.index);
				self.len -= 1;
				Some(value)
			}
			Slot::Vacant { .. } => None,
		}
	}

	pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
		self.slots.iter().enumerate().filter_map(|(index, slot)| match slot {
			Slot::Occupied { generation, value } => Some((
				Handle {
					index: u32::try_from(index).unwrap_or(u32::MAX),
					generation: *generation,
				},
				value,
			)),
			Slot::Vacant { .. } => None,
		})
	}

	/// Snapshot of live handles, for loops that mutate the arena.
	pub fn handles(&self) -> Vec<Handle> {
		self.iter().map(|(handle, _)| handle).collect()
	}
}

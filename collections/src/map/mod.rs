mod inner;

use core::hash::{BuildHasher, BuildHasherDefault, Hash};
use core::ops::{Deref, DerefMut};

use ahash::AHasher;
use inner::Core;

pub trait Key {
	type Type: Hash + Eq;

	/// Get the contained key.
	fn key(&self) -> &Self::Type;
}

/// A stable handle to a filled slot, returned by `find_entry`/`insert_unique`
/// and valid until that slot is removed.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub struct Index(usize);

impl Index {
	pub fn get(self) -> usize {
		self.0
	}
}

pub struct Map<T, S = BuildHasherDefault<AHasher>> {
	core: Core<T>,
	hash: S,
}

impl<T, S: Default> Default for Map<T, S> {
	fn default() -> Self {
		Self { core: Core::default(), hash: S::default() }
	}
}

impl<T: Key, S: BuildHasher> Map<T, S> {
	#[must_use]
	pub fn new(hash: S) -> Self {
		Self { core: Core::default(), hash }
	}

	#[must_use]
	pub fn with_capacity(cap: usize, hash: S) -> Self {
		Self { core: Core::with_capacity(cap), hash }
	}

	pub fn len(&self) -> usize {
		self.core.len()
	}

	pub fn is_empty(&self) -> bool {
		self.core.len() == 0
	}

	#[must_use]
	pub fn find(&self, k: &T::Type) -> Option<&T> {
		let hash = self.hash.hash_one(k);
		let idx = self.core.find(hash, |i| i.key() == k)?;
		Some(self.core.get(idx))
	}

	#[must_use]
	pub fn find_mut(&mut self, k: &T::Type) -> Option<&mut T> {
		let hash = self.hash.hash_one(k);
		let idx = self.core.find(hash, |i| i.key() == k)?;
		Some(self.core.get_mut(idx))
	}

	#[must_use]
	pub fn find_entry(&mut self, k: &T::Type) -> Entry<T> {
		let hash = self.hash.hash_one(k);
		match self.core.find_or_find_insert(hash, |i| i.key() == k) {
			Ok(idx) => Entry::Filled(Filled { map: &mut self.core, idx: Index(idx) }),
			Err(idx) => Entry::Empty(Empty { map: &mut self.core, idx: Index(idx), hash }),
		}
	}

	#[inline]
	pub fn insert_unique(&mut self, k: &T::Type) -> Empty<T> {
		let hash = self.hash.hash_one(k);
		let idx = self.core.find_insert(hash);

		Empty { map: &mut self.core, idx: Index(idx), hash }
	}

	pub fn remove(&mut self, k: &T::Type) -> Option<T> {
		self.find_entry(k).remove()
	}

	pub fn iter(&self) -> impl Iterator<Item = (Index, &T)> {
		self.core.iter().map(|(i, t)| (Index(i), t))
	}

	pub fn iter_mut(&mut self) -> impl Iterator<Item = (Index, &mut T)> {
		self.core.iter_mut().map(|(i, t)| (Index(i), t))
	}
}

impl<T: Key, S: BuildHasher> std::ops::Index<Index> for Map<T, S> {
	type Output = T;

	fn index(&self, index: Index) -> &Self::Output {
		assert!(self.core.contains(index.0), "entry at index {} does not exist", index.0);
		self.core.get(index.0)
	}
}

impl<T: Key, S: BuildHasher> std::ops::IndexMut<Index> for Map<T, S> {
	fn index_mut(&mut self, index: Index) -> &mut Self::Output {
		assert!(self.core.contains(index.0), "entry at index {} does not exist", index.0);
		self.core.get_mut(index.0)
	}
}

pub enum Entry<'a, T> {
	Filled(Filled<'a, T>),
	Empty(Empty<'a, T>),
}

impl<'a, T> Entry<'a, T> {
	pub fn filled(self) -> Option<Filled<'a, T>> {
		match self {
			Self::Filled(f) => Some(f),
			Self::Empty(_) => None,
		}
	}

	pub fn remove(self) -> Option<T> {
		match self {
			Self::Filled(f) => Some(f.remove()),
			Self::Empty(_) => None,
		}
	}
}

pub struct Filled<'a, T> {
	map: &'a mut Core<T>,
	idx: Index,
}

impl<'a, T> Filled<'a, T> {
	#[inline]
	pub fn index(&self) -> Index {
		self.idx
	}

	#[inline]
	pub fn into_ref(self) -> &'a mut T {
		self.map.get_mut(self.idx.0)
	}

	#[inline]
	pub fn remove(self) -> T {
		self.map.remove(self.idx.0)
	}
}

impl<'a, T> Deref for Filled<'a, T> {
	type Target = T;

	fn deref(&self) -> &Self::Target {
		self.map.get(self.idx.0)
	}
}

impl<'a, T> DerefMut for Filled<'a, T> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		self.map.get_mut(self.idx.0)
	}
}

pub struct Empty<'a, T> {
	map: &'a mut Core<T>,
	idx: Index,
	hash: u64,
}

impl<'a, T: Key> Empty<'a, T> {
	#[inline]
	pub fn insert(self, t: T) -> Filled<'a, T> {
		self.map.insert(self.idx.0, self.hash, t);
		Filled { map: self.map, idx: self.idx }
	}

	#[inline]
	pub fn index(&self) -> Index {
		self.idx
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[derive(Debug, PartialEq, Eq)]
	struct Entry_ {
		addr: (u32, u16),
		value: &'static str,
	}

	impl Key for Entry_ {
		type Type = (u32, u16);

		fn key(&self) -> &Self::Type {
			&self.addr
		}
	}

	#[test]
	fn insert_find_remove() {
		let mut map: Map<Entry_> = Map::default();
		let key = (0x7f000001, 4000);

		map.insert_unique(&key).insert(Entry_ { addr: key, value: "a" });
		assert_eq!(map.find(&key).unwrap().value, "a");

		let removed = map.remove(&key).unwrap();
		assert_eq!(removed.value, "a");
		assert!(map.find(&key).is_none());
	}

	#[test]
	fn find_entry_reuses_existing_slot() {
		let mut map: Map<Entry_> = Map::default();
		let key = (10, 1);

		map.insert_unique(&key).insert(Entry_ { addr: key, value: "first" });
		let idx_before = map.find_entry(&key).filled().unwrap().index();

		map.find_entry(&key).filled().unwrap().into_ref().value = "second";

		assert_eq!(map.find(&key).unwrap().value, "second");
		assert_eq!(map.find_entry(&key).filled().unwrap().index(), idx_before);
	}

	#[test]
	fn iterates_all_entries() {
		let mut map: Map<Entry_> = Map::default();

		for i in 0..5u16 {
			let key = (1, i);
			map.insert_unique(&key).insert(Entry_ { addr: key, value: "x" });
		}

		assert_eq!(map.iter().count(), 5);
	}
}

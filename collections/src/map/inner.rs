use hashbrown::HashTable;
use slab::Slab;

/// Owns the entries (`slot`) and a hash index into them (`dict`). Splitting
/// the two lets removal drop an entry from `slot` without touching every
/// other slot's index, unlike a straight `HashMap`.
pub struct Core<T> {
	slot: Slab<(T, u64)>,
	dict: HashTable<usize>,
}

impl<T> Default for Core<T> {
	fn default() -> Self {
		Self { slot: Slab::new(), dict: HashTable::new() }
	}
}

impl<T> Core<T> {
	pub fn with_capacity(cap: usize) -> Self {
		Self { slot: Slab::with_capacity(cap), dict: HashTable::with_capacity(cap) }
	}

	/// search for exact match of item, return None if none found
	pub fn find(&self, hash: u64, mut eq: impl FnMut(&T) -> bool) -> Option<usize> {
		self.dict.find(hash, |&i| eq(&self.slot[i].0)).copied()
	}

	/// search for exact match of item, return Err with insert index for hash if none found
	pub fn find_or_find_insert(&self, hash: u64, mut eq: impl FnMut(&T) -> bool) -> Result<usize, usize> {
		self.dict.find(hash, |&i| eq(&self.slot[i].0)).copied().ok_or_else(|| self.slot.vacant_key())
	}

	/// return insert index for hash
	pub fn find_insert(&self, _hash: u64) -> usize {
		self.slot.vacant_key()
	}

	/// insert to slot, overwriting previous values
	pub fn insert(&mut self, i: usize, hash: u64, t: T) {
		let k = self.slot.insert((t, hash));
		self.dict.insert_unique(hash, k, |i| self.slot[*i].1);
		assert!(k == i);
	}

	/// read from slot, marking as removed
	pub fn remove(&mut self, i: usize) -> T {
		let (t, hash) = self.slot.remove(i);
		self.dict.find_entry(hash, |j| i == *j).expect("should be present").remove();
		t
	}

	/// check whether index is filled. must be in bounds
	pub fn contains(&self, i: usize) -> bool {
		self.slot.contains(i)
	}

	/// panics if `i` is not filled
	pub fn get(&self, i: usize) -> &T {
		&self.slot[i].0
	}

	/// panics if `i` is not filled
	pub fn get_mut(&mut self, i: usize) -> &mut T {
		&mut self.slot[i].0
	}

	pub fn len(&self) -> usize {
		self.slot.len()
	}

	pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
		self.slot.iter().map(|(i, (t, _))| (i, t))
	}

	pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> {
		self.slot.iter_mut().map(|(i, (t, _))| (i, t))
	}
}

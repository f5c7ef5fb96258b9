//! The 2Q admission and eviction policy (Johnson & Shasha, 1994): pages
//! enter on a probationary FIFO (A1in), graduate to an LRU main queue (Am)
//! only on a second reference, and a ghost FIFO of evicted A1in page
//! numbers (A1out) is what lets a re-fault be recognized as that second
//! reference without having to keep the page's data around.

use log::{error, trace, warn};
use static_assertions::assert_impl_all;

use super::{
	buffer::AlignedPage,
	entry::{GhostEntry, Queue, ResidentEntry},
	hash_index::HashIndex,
	list::{IntrusiveList, LinkNode},
	source::PageSource,
};
use crate::{
	error::{Error, Result},
	page_store::PageStore,
};

fn capacities(capacity: usize) -> (usize, usize, usize) {
	let mut kin = capacity / 4;
	if kin < 1 {
		kin = 1;
	}
	if kin >= capacity {
		kin = capacity / 2;
	}

	let mut am_cap = capacity.saturating_sub(kin);
	if am_cap < 1 {
		am_cap = 1;
	}

	let mut kout = capacity / 2;
	if kout < 1 {
		kout = 1;
	}

	(kin, am_cap, kout)
}

enum ListId {
	A1in,
	Am,
}

pub struct PageCache<S> {
	source: S,
	page_size: usize,
	capacity: usize,
	kin: usize,
	am_cap: usize,
	kout: usize,
	/// The file's current logical length, as last reported by the I/O path.
	/// Reasserted on the underlying source after every writeback, since a
	/// full page write can pad the physical file past this point.
	file_size: u64,

	resident: Vec<Option<ResidentEntry>>,
	resident_free: Vec<usize>,
	resident_index: HashIndex,
	a1in: IntrusiveList<ResidentEntry>,
	am: IntrusiveList<ResidentEntry>,

	ghost: Vec<Option<GhostEntry>>,
	ghost_free: Vec<usize>,
	ghost_index: HashIndex,
	a1out: IntrusiveList<GhostEntry>,
}

assert_impl_all!(PageCache<PageStore>: Send, Sync);

impl<S: PageSource> PageCache<S> {
	pub fn new(source: S, capacity: usize) -> Self {
		let page_size = source.page_size();
		let (kin, am_cap, kout) = capacities(capacity);
		Self {
			source,
			page_size,
			capacity,
			kin,
			am_cap,
			kout,
			file_size: 0,
			resident: Vec::new(),
			resident_free: Vec::new(),
			resident_index: HashIndex::with_capacity(capacity),
			a1in: IntrusiveList::new(),
			am: IntrusiveList::new(),
			ghost: Vec::new(),
			ghost_free: Vec::new(),
			ghost_index: HashIndex::with_capacity(kout.max(1)),
			a1out: IntrusiveList::new(),
		}
	}

	#[inline]
	pub fn page_size(&self) -> usize {
		self.page_size
	}

	/// Tells the cache the file's current logical length, so that a
	/// writeback triggered during this call re-truncates the physical file
	/// back down to it. The I/O path calls this before every `access`.
	pub fn set_file_size(&mut self, len: u64) {
		self.file_size = len;
	}

	pub fn resident_count(&self) -> usize {
		self.a1in.len() + self.am.len()
	}

	pub fn source(&self) -> &S {
		&self.source
	}

	pub fn into_source(self) -> S {
		self.source
	}

	pub fn entry(&self, slot: usize) -> &ResidentEntry {
		self.resident[slot].as_ref().expect("dangling resident slot")
	}

	pub fn entry_mut(&mut self, slot: usize) -> &mut ResidentEntry {
		self.resident[slot].as_mut().expect("dangling resident slot")
	}

	/// Brings `page_no` into residence, returning the slab slot it now
	/// occupies. Handles cold misses, ghost-hit promotion to Am, and
	/// ordinary resident hits (A1in -> Am promotion on second reference, or
	/// LRU touch within Am).
	pub fn access(&mut self, page_no: u64) -> Result<usize> {
		if let Some(slot) = self.resident_index.get(page_no) {
			let queue = self.entry(slot).queue;
			match queue {
				Queue::A1in => {
					trace!("page {page_no} re-referenced in A1in, promoting to Am");
					self.a1in.remove(&mut self.resident, slot);
					self.ensure_space_for_am()?;
					self.entry_mut(slot).queue = Queue::Am;
					self.am.push_front(&mut self.resident, slot);
				}
				Queue::Am => {
					self.am.move_to_front(&mut self.resident, slot);
				}
			}
			return Ok(slot);
		}

		if let Some(ghost_slot) = self.ghost_index.get(page_no) {
			trace!("page {page_no} hit in A1out, admitting directly to Am");
			self.a1out.remove(&mut self.ghost, ghost_slot);
			self.ghost_index.delete(page_no);
			self.free_ghost(ghost_slot);

			self.ensure_space_for_am()?;
			let slot = self.load_page(page_no, Queue::Am)?;
			self.am.push_front(&mut self.resident, slot);
			self.resident_index.put(page_no, slot);
			return Ok(slot);
		}

		trace!("page {page_no} cold miss, admitting to A1in");
		self.ensure_space_for_a1in()?;
		let slot = self.load_page(page_no, Queue::A1in)?;
		self.a1in.push_front(&mut self.resident, slot);
		self.resident_index.put(page_no, slot);
		Ok(slot)
	}

	/// Writes back every dirty resident page, walking A1in then Am from
	/// most- to least-recently-touched, fsyncs the underlying source, and
	/// re-asserts the file's logical length. Stops and returns at the first
	/// writeback or fsync failure, leaving any further dirty pages dirty.
	pub fn flush_all(&mut self) -> Result<()> {
		self.flush_list(ListId::A1in)?;
		self.flush_list(ListId::Am)?;
		self.source.sync()?;
		self.source.set_len(self.file_size)?;
		Ok(())
	}

	fn flush_list(&mut self, which: ListId) -> Result<()> {
		let mut cur = match which {
			ListId::A1in => self.a1in.head(),
			ListId::Am => self.am.head(),
		};
		while let Some(slot) = cur {
			let next = self.entry(slot).next();
			if self.entry(slot).dirty {
				self.writeback(slot)?;
			}
			cur = next;
		}
		Ok(())
	}

	fn writeback(&mut self, slot: usize) -> Result<()> {
		let entry = self.entry(slot);
		let page_no = entry.page_no;
		self.source.write_page(&entry.buf, page_no).map_err(|err| {
			error!("writeback of page {page_no} failed: {err}");
			Error::Io(err)
		})?;
		self.entry_mut(slot).dirty = false;
		// A full-page write can pad the physical file past the logical end
		// when only a prefix of the victim page was ever valid.
		self.source.set_len(self.file_size)?;
		Ok(())
	}

	fn load_page(&mut self, page_no: u64, queue: Queue) -> Result<usize> {
		let mut buf = AlignedPage::try_new(self.page_size).ok_or(Error::OutOfMemory("page buffer"))?;
		let valid_len = self.source.read_page(&mut buf, page_no)?;
		let entry = ResidentEntry::new(page_no, buf, valid_len, queue);
		Ok(self.alloc_resident(entry))
	}

	fn alloc_resident(&mut self, entry: ResidentEntry) -> usize {
		if let Some(slot) = self.resident_free.pop() {
			self.resident[slot] = Some(entry);
			slot
		} else {
			self.resident.push(Some(entry));
			self.resident.len() - 1
		}
	}

	fn free_resident(&mut self, slot: usize) {
		self.resident[slot] = None;
		self.resident_free.push(slot);
	}

	fn alloc_ghost(&mut self, page_no: u64) -> Option<usize> {
		let entry = GhostEntry::new(page_no);
		if let Some(slot) = self.ghost_free.pop() {
			self.ghost[slot] = Some(entry);
			Some(slot)
		} else {
			if self.ghost.try_reserve(1).is_err() {
				return None;
			}
			self.ghost.push(Some(entry));
			Some(self.ghost.len() - 1)
		}
	}

	fn free_ghost(&mut self, slot: usize) {
		self.ghost[slot] = None;
		self.ghost_free.push(slot);
	}

	/// Evicts the A1in tail. If it's dirty, writes it back first; on
	/// writeback failure the victim is restored to the front of A1in (the
	/// most-recently-touched end) rather than lost, and the error propagates.
	fn evict_from_a1in(&mut self) -> Result<bool> {
		let Some(slot) = self.a1in.pop_back(&mut self.resident) else {
			return Ok(false);
		};
		let page_no = self.entry(slot).page_no;
		if self.entry(slot).dirty {
			if let Err(err) = self.writeback(slot) {
				self.a1in.push_front(&mut self.resident, slot);
				return Err(err);
			}
		}
		self.resident_index.delete(page_no);
		self.free_resident(slot);
		self.add_ghost(page_no);
		Ok(true)
	}

	fn evict_from_am(&mut self) -> Result<bool> {
		let Some(slot) = self.am.pop_back(&mut self.resident) else {
			return Ok(false);
		};
		let page_no = self.entry(slot).page_no;
		if self.entry(slot).dirty {
			if let Err(err) = self.writeback(slot) {
				self.am.push_front(&mut self.resident, slot);
				return Err(err);
			}
		}
		self.resident_index.delete(page_no);
		self.free_resident(slot);
		Ok(true)
	}

	fn ensure_space_for_a1in(&mut self) -> Result<()> {
		if self.a1in.len() >= self.kin && !self.evict_from_a1in()? {
			self.evict_from_am()?;
		}
		while self.resident_count() >= self.capacity {
			if self.am.len() > 0 {
				if !self.evict_from_am()? {
					break;
				}
			} else if !self.evict_from_a1in()? {
				break;
			}
		}
		Ok(())
	}

	fn ensure_space_for_am(&mut self) -> Result<()> {
		while self.am.len() >= self.am_cap {
			if !self.evict_from_am()? {
				break;
			}
		}
		while self.resident_count() >= self.capacity {
			if self.a1in.len() > 0 {
				if !self.evict_from_a1in()? {
					break;
				}
			} else if !self.evict_from_am()? {
				break;
			}
		}
		Ok(())
	}

	/// Records `page_no` as a recently evicted A1in page, trimming A1out
	/// back to `kout` entries. Allocation failure here degrades gracefully:
	/// the page simply won't be recognized on re-fault and will re-enter
	/// A1in as a cold miss, which is correct, just suboptimal.
	fn add_ghost(&mut self, page_no: u64) {
		if let Some(existing) = self.ghost_index.get(page_no) {
			self.a1out.move_to_front(&mut self.ghost, existing);
			return;
		}
		let Some(slot) = self.alloc_ghost(page_no) else {
			warn!("out of memory recording ghost entry for page {page_no}, dropping it");
			return;
		};
		self.a1out.push_front(&mut self.ghost, slot);
		self.ghost_index.put(page_no, slot);

		while self.a1out.len() > self.kout {
			let Some(old_slot) = self.a1out.pop_back(&mut self.ghost) else {
				break;
			};
			let old_page_no = self.ghost[old_slot].as_ref().expect("dangling ghost slot").page_no;
			self.ghost_index.delete(old_page_no);
			self.free_ghost(old_slot);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cache::source::MockPageSource;

	fn mock_source(page_size: usize) -> MockPageSource {
		let mut source = MockPageSource::new();
		source.expect_page_size().return_const(page_size);
		source.expect_read_page().returning(|buf, _| {
			buf.fill(0);
			Ok(buf.len())
		});
		source.expect_write_page().returning(|_, _| Ok(()));
		source.expect_set_len().returning(|_| Ok(()));
		source.expect_sync().returning(|| Ok(()));
		source
	}

	#[test]
	fn cold_miss_admits_to_a1in() {
		let mut cache = PageCache::new(mock_source(64), 8);
		let slot = cache.access(1).unwrap();
		assert_eq!(cache.entry(slot).page_no, 1);
		assert_eq!(cache.entry(slot).queue, Queue::A1in);
		assert_eq!(cache.a1in.len(), 1);
		assert_eq!(cache.am.len(), 0);
	}

	#[test]
	fn second_reference_promotes_to_am() {
		let mut cache = PageCache::new(mock_source(64), 8);
		cache.access(1).unwrap();
		let slot = cache.access(1).unwrap();
		assert_eq!(cache.entry(slot).queue, Queue::Am);
		assert_eq!(cache.a1in.len(), 0);
		assert_eq!(cache.am.len(), 1);
	}

	#[test]
	fn eviction_from_a1in_creates_ghost_then_promotes_on_refault() {
		let mut cache = PageCache::new(mock_source(64), 4);
		// kin = max(1, 4/4) = 1, so a second distinct cold page evicts the first.
		cache.access(1).unwrap();
		cache.access(2).unwrap();

		assert!(cache.resident_index.get(1).is_none());
		assert!(cache.ghost_index.contains(1));

		let slot = cache.access(1).unwrap();
		assert_eq!(cache.entry(slot).queue, Queue::Am);
		assert!(!cache.ghost_index.contains(1));
	}

	#[test]
	fn dirty_eviction_writes_back_before_dropping() {
		let mut cache = PageCache::new(mock_source(64), 4);

		let slot = cache.access(1).unwrap();
		cache.entry_mut(slot).dirty = true;
		cache.access(2).unwrap();

		assert!(cache.resident_index.get(1).is_none());
	}

	#[test]
	fn flush_all_clears_dirty_flags() {
		let mut cache = PageCache::new(mock_source(64), 8);
		let slot = cache.access(1).unwrap();
		cache.entry_mut(slot).dirty = true;
		cache.flush_all().unwrap();
		assert!(!cache.entry(slot).dirty);
	}

	#[test]
	fn failed_writeback_restores_victim_instead_of_losing_it() {
		let mut source = MockPageSource::new();
		source.expect_page_size().return_const(64usize);
		source.expect_read_page().returning(|buf, _| {
			buf.fill(0);
			Ok(buf.len())
		});
		source
			.expect_write_page()
			.returning(|_, _| Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full")));
		source.expect_set_len().returning(|_| Ok(()));
		source.expect_sync().returning(|| Ok(()));
		let mut cache = PageCache::new(source, 4);

		let slot = cache.access(1).unwrap();
		cache.entry_mut(slot).dirty = true;

		let err = cache.access(2);
		assert!(err.is_err());
		assert!(cache.resident_index.contains(1));
	}
}

//! Node types stored in the resident and ghost slabs. Each implements
//! `LinkNode` so the same `IntrusiveList` machinery can order both the
//! A1in/Am resident queues and the A1out ghost queue.

use super::{buffer::AlignedPage, list::LinkNode};

/// Which of the two resident queues a page currently sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Queue {
	A1in,
	Am,
}

/// A page physically held in memory, either probationary (A1in) or having
/// earned its way into the main LRU queue (Am).
pub struct ResidentEntry {
	pub page_no: u64,
	pub buf: AlignedPage,
	/// Leading bytes of `buf` that hold real file content; the remainder is
	/// zero-filled past end of file.
	pub valid_len: usize,
	pub dirty: bool,
	pub queue: Queue,
	prev: Option<usize>,
	next: Option<usize>,
}

impl ResidentEntry {
	pub fn new(page_no: u64, buf: AlignedPage, valid_len: usize, queue: Queue) -> Self {
		Self {
			page_no,
			buf,
			valid_len,
			dirty: false,
			queue,
			prev: None,
			next: None,
		}
	}
}

impl LinkNode for ResidentEntry {
	fn prev(&self) -> Option<usize> {
		self.prev
	}
	fn next(&self) -> Option<usize> {
		self.next
	}
	fn set_prev(&mut self, prev: Option<usize>) {
		self.prev = prev;
	}
	fn set_next(&mut self, next: Option<usize>) {
		self.next = next;
	}
}

/// A ghost record: the number of a page recently evicted from A1in, kept
/// only so a re-fault can be recognized as a second reference and promoted
/// straight to Am instead of re-entering A1in.
pub struct GhostEntry {
	pub page_no: u64,
	prev: Option<usize>,
	next: Option<usize>,
}

impl GhostEntry {
	pub fn new(page_no: u64) -> Self {
		Self {
			page_no,
			prev: None,
			next: None,
		}
	}
}

impl LinkNode for GhostEntry {
	fn prev(&self) -> Option<usize> {
		self.prev
	}
	fn next(&self) -> Option<usize> {
		self.next
	}
	fn set_prev(&mut self, prev: Option<usize>) {
		self.prev = prev;
	}
	fn set_next(&mut self, next: Option<usize>) {
		self.next = next;
	}
}

//! The narrow interface the 2Q engine needs from whatever backs a page on
//! disk. Kept as a trait, rather than a concrete `PageStore`, so the policy
//! logic can be exercised against a mock without touching the filesystem.

use std::io;

#[cfg_attr(test, mockall::automock)]
pub trait PageSource {
	fn page_size(&self) -> usize;
	fn read_page(&self, buf: &mut [u8], page_no: u64) -> io::Result<usize>;
	fn write_page(&self, buf: &[u8], page_no: u64) -> io::Result<()>;
	/// Re-asserts the file's logical length. Called after every writeback
	/// (not just at fsync) since a full-page write can pad the physical
	/// file past the logical end when the last page is only partially
	/// valid.
	fn set_len(&self, len: u64) -> io::Result<()>;
	fn sync(&self) -> io::Result<()>;
}

impl PageSource for crate::page_store::PageStore {
	fn page_size(&self) -> usize {
		self.page_size()
	}

	fn read_page(&self, buf: &mut [u8], page_no: u64) -> io::Result<usize> {
		self.read_page(buf, page_no)
	}

	fn write_page(&self, buf: &[u8], page_no: u64) -> io::Result<()> {
		self.write_page(buf, page_no)
	}

	fn set_len(&self, len: u64) -> io::Result<()> {
		self.set_len(len)
	}

	fn sync(&self) -> io::Result<()> {
		self.sync()
	}
}

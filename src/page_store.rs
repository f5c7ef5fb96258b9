//! Reads and writes full, page-aligned pages to the backing file, issuing
//! the OS drop-cache advisory in fallback (non-direct) mode. This is the
//! only place in the crate that talks to the kernel's file I/O syscalls.

use std::{fs::File, io};

use crate::platform;

pub struct PageStore {
	file: File,
	direct: bool,
	page_size: usize,
}

impl PageStore {
	pub fn new(file: File, direct: bool, page_size: usize) -> Self {
		Self {
			file,
			direct,
			page_size,
		}
	}

	#[inline]
	pub fn page_size(&self) -> usize {
		self.page_size
	}

	#[inline]
	pub fn is_direct(&self) -> bool {
		self.direct
	}

	/// Reads the page at `page_no` into `buf`, which must be exactly
	/// `page_size` bytes. Returns the number of valid leading bytes: a
	/// short read at EOF yields fewer than `page_size`, and the tail of
	/// `buf` is zero-filled to match.
	pub fn read_page(&self, buf: &mut [u8], page_no: u64) -> io::Result<usize> {
		debug_assert_eq!(buf.len(), self.page_size);
		let offset = page_no * self.page_size as u64;
		let n = platform::read_at(&self.file, buf, offset)?;
		if n < buf.len() {
			buf[n..].fill(0);
		}
		if !self.direct {
			platform::drop_cache(&self.file, offset, self.page_size as u64);
		}
		Ok(n)
	}

	/// Writes the full, page-sized `buf` at `page_no`. Never issues a
	/// partial write: a short positioned write is itself an I/O error, the
	/// same way a `pwrite` returning less than the requested length would
	/// be a fault for a fixed-size page write.
	pub fn write_page(&self, buf: &[u8], page_no: u64) -> io::Result<()> {
		debug_assert_eq!(buf.len(), self.page_size);
		let offset = page_no * self.page_size as u64;
		let n = platform::write_at(&self.file, buf, offset)?;
		if n != buf.len() {
			return Err(io::Error::new(
				io::ErrorKind::WriteZero,
				"short write of a page-aligned page",
			));
		}
		if !self.direct {
			platform::drop_cache(&self.file, offset, self.page_size as u64);
		}
		Ok(())
	}

	pub fn set_len(&self, len: u64) -> io::Result<()> {
		self.file.set_len(len)
	}

	pub fn sync(&self) -> io::Result<()> {
		self.file.sync_all()
	}

	/// Closes the underlying descriptor, surfacing the close(2) error
	/// instead of letting it vanish into an ignored `Drop`.
	pub fn close(self) -> io::Result<()> {
		platform::close(self.file)
	}
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use tempfile::NamedTempFile;

	use super::*;

	fn open_store(page_size: usize) -> (PageStore, NamedTempFile) {
		let tmp = NamedTempFile::new().unwrap();
		let file = tmp.reopen().unwrap();
		(PageStore::new(file, false, page_size), tmp)
	}

	#[test]
	fn read_past_eof_yields_short_valid_len() {
		let (store, _tmp) = open_store(16);
		let mut buf = vec![0xaa; 16];
		let n = store.read_page(&mut buf, 0).unwrap();
		assert_eq!(n, 0);
		assert!(buf.iter().all(|b| *b == 0));
	}

	#[test]
	fn write_then_read_round_trips() {
		let (store, _tmp) = open_store(8);
		let data = [1, 2, 3, 4, 5, 6, 7, 8];
		store.write_page(&data, 2).unwrap();

		let mut buf = [0u8; 8];
		let n = store.read_page(&mut buf, 2).unwrap();
		assert_eq!(n, 8);
		assert_eq!(buf, data);
	}

	#[test]
	fn short_read_zero_fills_tail() {
		let mut tmp = NamedTempFile::new().unwrap();
		tmp.write_all(&[1, 2, 3]).unwrap();
		tmp.flush().unwrap();
		let file = tmp.reopen().unwrap();
		let store = PageStore::new(file, false, 8);

		let mut buf = [0xffu8; 8];
		let n = store.read_page(&mut buf, 0).unwrap();
		assert_eq!(n, 3);
		assert_eq!(buf, [1, 2, 3, 0, 0, 0, 0, 0]);
	}
}

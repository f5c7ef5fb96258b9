//! Per-descriptor state: the 2Q cache, the access-mode flags the handle was
//! opened with, and the logical cursor/file-size pair the I/O path advances.

use std::path::Path;

use log::debug;

use crate::{
	cache::PageCache,
	error::{Error, Result},
	page_store::PageStore,
	platform::{self, AccessMode, OpenFlags},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
	Set,
	Cur,
	End,
}

pub struct Handle {
	cache: PageCache<PageStore>,
	access_mode: AccessMode,
	append: bool,
	pos: u64,
	file_size: u64,
}

impl Handle {
	pub fn open(path: &Path, flags: OpenFlags, cache_pages: usize) -> Result<Self> {
		let opened = platform::open(path, flags)?;
		let file_size = opened.file.metadata()?.len();
		let page_size = page_size();

		let store = PageStore::new(opened.file, opened.direct, page_size);
		debug!(
			"opened {} ({} pages cache, direct={})",
			path.display(),
			cache_pages,
			opened.direct
		);

		Ok(Self {
			cache: PageCache::new(store, cache_pages),
			access_mode: flags.access_mode(),
			append: flags.append,
			pos: 0,
			file_size,
		})
	}

	fn page_size(&self) -> u64 {
		self.cache.page_size() as u64
	}

	pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
		if self.access_mode == AccessMode::WriteOnly {
			return Err(Error::BadDescriptor("handle is write-only"));
		}
		if buf.is_empty() {
			return Ok(0);
		}

		let page_size = self.page_size();
		let mut delivered = 0usize;

		while delivered < buf.len() {
			let page_no = self.pos / page_size;
			let in_page = (self.pos % page_size) as usize;
			let want = (buf.len() - delivered).min(page_size as usize - in_page);

			self.cache.set_file_size(self.file_size);
			let slot = match self.cache.access(page_no) {
				Ok(slot) => slot,
				Err(err) => {
					return if delivered > 0 { Ok(delivered) } else { Err(err) };
				}
			};
			let entry = self.cache.entry(slot);

			if in_page >= entry.valid_len {
				break;
			}
			let avail = entry.valid_len - in_page;
			let take = want.min(avail);

			buf[delivered..delivered + take].copy_from_slice(&entry.buf[in_page..in_page + take]);
			delivered += take;
			self.pos += take as u64;

			if take < want {
				break;
			}
		}

		Ok(delivered)
	}

	pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
		if self.access_mode == AccessMode::ReadOnly {
			return Err(Error::BadDescriptor("handle is read-only"));
		}
		if buf.is_empty() {
			return Ok(0);
		}
		if self.append {
			self.pos = self.file_size;
		}

		let page_size = self.page_size();
		let mut written = 0usize;

		while written < buf.len() {
			let page_no = self.pos / page_size;
			let in_page = (self.pos % page_size) as usize;
			let chunk = (buf.len() - written).min(page_size as usize - in_page);

			self.cache.set_file_size(self.file_size);
			let slot = match self.cache.access(page_no) {
				Ok(slot) => slot,
				Err(err) => {
					return if written > 0 { Ok(written) } else { Err(err) };
				}
			};
			let entry = self.cache.entry_mut(slot);

			if in_page > entry.valid_len {
				entry.buf[entry.valid_len..in_page].fill(0);
			}
			entry.buf[in_page..in_page + chunk].copy_from_slice(&buf[written..written + chunk]);
			entry.valid_len = entry.valid_len.max(in_page + chunk);
			entry.dirty = true;

			written += chunk;
			self.pos += chunk as u64;

			if self.pos > self.file_size {
				self.file_size = self.pos;
				if let Err(err) = self.cache.source().set_len(self.file_size) {
					return if written > 0 {
						Ok(written)
					} else {
						Err(Error::Io(err))
					};
				}
			}
		}

		Ok(written)
	}

	pub fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
		let base: i64 = match whence {
			Whence::Set => 0,
			Whence::Cur => self
				.pos
				.try_into()
				.map_err(|_| Error::InvalidArgument("current position overflows a signed offset"))?,
			Whence::End => self
				.file_size
				.try_into()
				.map_err(|_| Error::InvalidArgument("file size overflows a signed offset"))?,
		};
		let new_pos = base
			.checked_add(offset)
			.ok_or(Error::InvalidArgument("seek overflow"))?;
		if new_pos < 0 {
			return Err(Error::InvalidArgument("seek would move before start of file"));
		}
		self.pos = new_pos as u64;
		Ok(self.pos)
	}

	pub fn fsync(&mut self) -> Result<()> {
		self.cache.set_file_size(self.file_size);
		self.cache.flush_all()
	}

	/// Flush-then-close, continuing to close even if the flush failed. The
	/// first of (flush error, close error) is what's reported.
	pub fn close(mut self) -> Result<()> {
		let flush_result = self.fsync();
		let close_result = self
			.cache
			.into_source()
			.close()
			.map_err(Error::Io);

		flush_result.and(close_result)
	}
}

fn page_size() -> usize {
	#[cfg(unix)]
	{
		let ps = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
		if ps > 0 {
			return ps as usize;
		}
	}
	4096
}

#[cfg(test)]
mod tests {
	use tempfile::NamedTempFile;

	use super::*;

	fn rw_flags() -> OpenFlags {
		OpenFlags {
			read: true,
			write: true,
			create: true,
			append: false,
			mode: 0o644,
		}
	}

	fn append_flags() -> OpenFlags {
		OpenFlags {
			append: true,
			..rw_flags()
		}
	}

	fn open_with_capacity(path: &std::path::Path, flags: OpenFlags, cache_pages: usize) -> Handle {
		Handle::open(path, flags, cache_pages).unwrap()
	}

	#[test]
	fn unaligned_read_spans_two_pages() {
		let ps = page_size();
		let tmp = NamedTempFile::new().unwrap();
		let mut h = open_with_capacity(tmp.path(), rw_flags(), 8);

		// Fill 3 pages, page i holding byte i throughout.
		for page in 0..3u8 {
			let buf = vec![page; ps];
			h.seek((page as i64) * ps as i64, Whence::Set).unwrap();
			assert_eq!(h.write(&buf).unwrap(), ps);
		}

		h.seek(ps as i64 - 96, Whence::Set).unwrap();
		let mut out = vec![0xffu8; 200];
		let n = h.read(&mut out).unwrap();
		assert_eq!(n, 200);
		assert!(out[..96].iter().all(|b| *b == 0));
		assert!(out[96..].iter().all(|b| *b == 1));
	}

	#[test]
	fn append_mode_ignores_prior_seeks() {
		let tmp = NamedTempFile::new().unwrap();
		let mut h = open_with_capacity(tmp.path(), append_flags(), 8);

		h.write(b"A").unwrap();
		h.seek(0, Whence::Set).unwrap();
		h.write(b"B").unwrap();

		h.seek(0, Whence::Set).unwrap();
		let mut buf = [0u8; 2];
		let n = h.read(&mut buf).unwrap();
		assert_eq!(n, 2);
		assert_eq!(&buf, b"AB");
	}

	#[test]
	fn idempotent_fsync_after_no_writes() {
		let tmp = NamedTempFile::new().unwrap();
		let mut h = open_with_capacity(tmp.path(), rw_flags(), 8);

		h.write(b"hello").unwrap();
		h.fsync().unwrap();
		h.fsync().unwrap();
	}

	#[test]
	fn partial_write_at_eof_extends_file() {
		let tmp = NamedTempFile::new().unwrap();
		let mut h = open_with_capacity(tmp.path(), rw_flags(), 8);

		let written = h.write(b"hello").unwrap();
		assert_eq!(written, 5);
		assert_eq!(h.file_size, 5);

		h.seek(0, Whence::Set).unwrap();
		let mut buf = [0u8; 10];
		let n = h.read(&mut buf).unwrap();
		assert_eq!(n, 5);
		assert_eq!(&buf[..5], b"hello");
	}

	#[test]
	fn dirty_page_evicted_from_a1in_writes_back() {
		let tmp = NamedTempFile::new().unwrap();
		let ps = page_size();

		{
			// kin = max(1, 4/4) = 1: page 0 never earns a second reference, so
			// it stays on A1in and is the first thing evicted once other
			// distinct pages are touched.
			let mut h = open_with_capacity(tmp.path(), rw_flags(), 4);
			h.write(&[0x42]).unwrap();

			for page in 1..6u64 {
				h.seek((page * ps as u64) as i64, Whence::Set).unwrap();
				let mut buf = vec![0u8; ps];
				h.read(&mut buf).unwrap();
			}
			h.close().unwrap();
		}

		let mut h2 = open_with_capacity(tmp.path(), rw_flags(), 4);
		let mut byte = [0u8; 1];
		h2.read(&mut byte).unwrap();
		assert_eq!(byte[0], 0x42);
	}

	#[test]
	fn read_only_handle_rejects_write() {
		let tmp = NamedTempFile::new().unwrap();
		let flags = OpenFlags {
			read: true,
			write: false,
			create: true,
			append: false,
			mode: 0o644,
		};
		let mut h = open_with_capacity(tmp.path(), flags, 8);
		let err = h.write(b"x").unwrap_err();
		assert!(matches!(err, Error::BadDescriptor(_)));
	}

	#[test]
	fn write_only_handle_rejects_read() {
		let tmp = NamedTempFile::new().unwrap();
		let flags = OpenFlags {
			write: true,
			read: false,
			create: true,
			append: false,
			mode: 0o644,
		};
		let mut h = open_with_capacity(tmp.path(), flags, 8);
		let mut buf = [0u8; 1];
		let err = h.read(&mut buf).unwrap_err();
		assert!(matches!(err, Error::BadDescriptor(_)));
	}
}

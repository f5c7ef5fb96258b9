//! A user-space page cache implementing the 2Q replacement policy (Johnson
//! & Shasha, 1994) in front of a file descriptor, exposed through a small
//! POSIX-flavored integer-descriptor API: [`open`], [`close`], [`lseek`],
//! [`read`], [`write`], [`fsync`].
//!
//! The library is single-threaded and cooperative: it makes no locking or
//! atomicity guarantees to callers. See the crate's design notes for the
//! concurrency model if you need to share a descriptor across threads.

mod cache;
mod config;
mod consts;
mod error;
mod handle;
mod handle_table;
mod page_store;
mod platform;

use std::path::Path;

pub use error::{Error, Result};
pub use handle::Whence;
pub use platform::OpenFlags;

/// Opens `path` under `flags`, returning a small non-negative integer
/// descriptor. The library first attempts a direct-I/O (cache-bypassing)
/// open; if the OS rejects that, it transparently falls back to a buffered
/// open plus manual drop-cache advisories on every physical read/write.
///
/// Reads the `VTPC_CACHE_PAGES` environment variable on first call across
/// the process to size every handle's cache.
pub fn open(path: &Path, flags: OpenFlags) -> Result<i32> {
	handle_table::open(path, flags)
}

/// Flushes dirty pages (best-effort) and closes `fd`. The first error
/// observed, flush or close, is returned.
pub fn close(fd: i32) -> Result<()> {
	handle_table::close(fd)
}

/// Moves `fd`'s cursor and returns the new absolute position. Does no I/O.
pub fn lseek(fd: i32, offset: i64, whence: Whence) -> Result<u64> {
	handle_table::lseek(fd, offset, whence)
}

/// Reads up to `buf.len()` bytes at the current cursor, advancing it by the
/// amount actually read. A short read only ever means EOF.
pub fn read(fd: i32, buf: &mut [u8]) -> Result<usize> {
	handle_table::read(fd, buf)
}

/// Writes `buf` at the current cursor (or at end-of-file, if opened in
/// append mode), advancing the cursor and extending the file as needed. A
/// short write only ever means a mid-operation I/O failure.
pub fn write(fd: i32, buf: &[u8]) -> Result<usize> {
	handle_table::write(fd, buf)
}

/// Writes back every dirty page through the page store, then fsyncs the
/// underlying descriptor.
pub fn fsync(fd: i32) -> Result<()> {
	handle_table::fsync(fd)
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

	#[test]
	fn write_then_read_back_through_public_api() {
		let tmp = NamedTempFile::new().unwrap();
		let fd = open(tmp.path(), rw_flags()).unwrap();

		let written = write(fd, b"hello, vtpc").unwrap();
		assert_eq!(written, 11);

		lseek(fd, 0, Whence::Set).unwrap();
		let mut buf = [0u8; 11];
		let n = read(fd, &mut buf).unwrap();
		assert_eq!(n, 11);
		assert_eq!(&buf, b"hello, vtpc");

		close(fd).unwrap();
	}

	#[test]
	fn read_at_eof_returns_zero() {
		let tmp = NamedTempFile::new().unwrap();
		let fd = open(tmp.path(), rw_flags()).unwrap();

		let mut buf = [0u8; 4];
		let n = read(fd, &mut buf).unwrap();
		assert_eq!(n, 0);
		close(fd).unwrap();
	}

	#[test]
	fn unknown_descriptor_is_bad_descriptor() {
		let err = read(1, &mut [0u8; 1]).unwrap_err();
		assert!(matches!(err, Error::BadDescriptor(_)));
	}

	#[test]
	fn reopen_after_close_round_trips() {
		let tmp = NamedTempFile::new().unwrap();
		let fd = open(tmp.path(), rw_flags()).unwrap();
		write(fd, b"durable").unwrap();
		close(fd).unwrap();

		let fd2 = open(tmp.path(), rw_flags()).unwrap();
		let mut buf = [0u8; 7];
		let n = read(fd2, &mut buf).unwrap();
		assert_eq!(n, 7);
		assert_eq!(&buf, b"durable");
		close(fd2).unwrap();
	}
}

//! The process-wide table of open handles: a fixed array of slots, guarded
//! by a mutex purely for Rust's aliasing rules (`&mut Handle` access must be
//! exclusive), not as a concurrency guarantee; callers from more than one
//! thread are still responsible for their own external synchronization.

use std::{path::Path, sync::OnceLock};

use parking_lot::Mutex;
use static_assertions::assert_impl_all;

use crate::{
	config::config,
	consts::{MAX_HANDLES, MIN_CACHE_CAPACITY, RESERVED_HANDLES},
	error::{Error, Result},
	handle::{Handle, Whence},
	platform::OpenFlags,
};

struct HandleTable {
	slots: Mutex<Vec<Option<Handle>>>,
}

assert_impl_all!(HandleTable: Send, Sync);

fn empty_slots() -> Vec<Option<Handle>> {
	let mut slots = Vec::with_capacity(MAX_HANDLES);
	slots.resize_with(MAX_HANDLES, || None);
	slots
}

static TABLE: OnceLock<HandleTable> = OnceLock::new();

fn table() -> &'static HandleTable {
	TABLE.get_or_init(|| HandleTable {
		slots: Mutex::new(empty_slots()),
	})
}

fn validate(fd: i32) -> Result<usize> {
	if fd < RESERVED_HANDLES as i32 || fd >= MAX_HANDLES as i32 {
		return Err(Error::BadDescriptor("descriptor out of range"));
	}
	Ok(fd as usize)
}

pub fn open(path: &Path, flags: OpenFlags) -> Result<i32> {
	let capacity = config().cache_pages.max(MIN_CACHE_CAPACITY);
	let handle = Handle::open(path, flags, capacity)?;

	let mut slots = table().slots.lock();
	for (i, slot) in slots.iter_mut().enumerate().skip(RESERVED_HANDLES) {
		if slot.is_none() {
			*slot = Some(handle);
			return Ok(i as i32);
		}
	}
	Err(Error::TooManyOpenFiles(MAX_HANDLES))
}

pub fn close(fd: i32) -> Result<()> {
	let idx = validate(fd)?;
	let handle = {
		let mut slots = table().slots.lock();
		slots[idx]
			.take()
			.ok_or(Error::BadDescriptor("descriptor is not open"))?
	};
	handle.close()
}

pub fn read(fd: i32, buf: &mut [u8]) -> Result<usize> {
	with_handle(fd, |h| h.read(buf))
}

pub fn write(fd: i32, buf: &[u8]) -> Result<usize> {
	with_handle(fd, |h| h.write(buf))
}

pub fn lseek(fd: i32, offset: i64, whence: Whence) -> Result<u64> {
	with_handle(fd, |h| h.seek(offset, whence))
}

pub fn fsync(fd: i32) -> Result<()> {
	with_handle(fd, |h| h.fsync())
}

fn with_handle<R>(fd: i32, f: impl FnOnce(&mut Handle) -> Result<R>) -> Result<R> {
	let idx = validate(fd)?;
	let mut slots = table().slots.lock();
	let handle = slots[idx]
		.as_mut()
		.ok_or(Error::BadDescriptor("descriptor is not open"))?;
	f(handle)
}

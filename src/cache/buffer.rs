//! A single page-size-aligned, page-size-length buffer, owned by exactly
//! one resident entry for its lifetime. Page alignment matters here: it's
//! what lets the page store hand these buffers straight to a direct-I/O
//! file descriptor without the kernel rejecting the request.

use std::{
	alloc::{alloc_zeroed, dealloc, Layout},
	fmt,
	ops::{Deref, DerefMut},
	ptr::NonNull,
	slice,
};

use static_assertions::assert_impl_all;

pub struct AlignedPage {
	ptr: NonNull<u8>,
	layout: Layout,
}

// Safety: `AlignedPage` owns its allocation uniquely; access to the bytes is
// gated by ordinary Rust borrowing, same as a `Box<[u8]>`.
unsafe impl Send for AlignedPage {}
unsafe impl Sync for AlignedPage {}

assert_impl_all!(AlignedPage: Send, Sync);

impl AlignedPage {
	/// Allocates a zero-filled buffer of `page_size` bytes, aligned to
	/// `page_size`. Returns `None` on allocation failure rather than
	/// aborting, so callers can surface it as an out-of-memory error.
	pub fn try_new(page_size: usize) -> Option<Self> {
		let layout = Layout::from_size_align(page_size, page_size).ok()?;
		// Safety: layout has non-zero size, since `page_size` is always a real
		// OS page size.
		let raw = unsafe { alloc_zeroed(layout) };
		let ptr = NonNull::new(raw)?;
		Some(Self { ptr, layout })
	}
}

impl Deref for AlignedPage {
	type Target = [u8];

	fn deref(&self) -> &[u8] {
		// Safety: `ptr` was allocated with `layout` and is never reallocated.
		unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.layout.size()) }
	}
}

impl DerefMut for AlignedPage {
	fn deref_mut(&mut self) -> &mut [u8] {
		// Safety: see `Deref`; unique access is guaranteed by `&mut self`.
		unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.layout.size()) }
	}
}

impl fmt::Debug for AlignedPage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AlignedPage")
			.field("len", &self.layout.size())
			.finish_non_exhaustive()
	}
}

impl Drop for AlignedPage {
	fn drop(&mut self) {
		// Safety: `ptr`/`layout` match the allocation made in `try_new`.
		unsafe { dealloc(self.ptr.as_ptr(), self.layout) }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn allocates_zeroed_and_aligned() {
		let page = AlignedPage::try_new(4096).unwrap();
		assert_eq!(page.len(), 4096);
		assert!(page.iter().all(|b| *b == 0));
		assert_eq!(page.as_ptr() as usize % 4096, 0);
	}

	#[test]
	fn is_writable() {
		let mut page = AlignedPage::try_new(64).unwrap();
		page[0] = 0x42;
		page[63] = 0x69;
		assert_eq!(page[0], 0x42);
		assert_eq!(page[63], 0x69);
	}
}

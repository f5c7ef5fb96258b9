//! Platform-specific pieces of the I/O path: opening a file with the kernel
//! page cache bypassed where possible, positioned reads/writes, and the
//! "drop this range from the OS cache" advisory used in fallback mode.

use std::{
	fs::{File, OpenOptions},
	io,
	path::Path,
};

use log::{debug, warn};

/// Mirrors the subset of POSIX open(2) semantics the library exposes.
#[derive(Debug, Clone, Copy)]
pub struct OpenFlags {
	pub read: bool,
	pub write: bool,
	pub create: bool,
	pub append: bool,
	/// Permission bits used when `create` causes a new file to be made.
	/// Ignored on platforms without a POSIX permission model.
	pub mode: u32,
}

impl Default for OpenFlags {
	fn default() -> Self {
		Self {
			read: false,
			write: false,
			create: false,
			append: false,
			mode: 0o644,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
	ReadOnly,
	WriteOnly,
	ReadWrite,
}

impl OpenFlags {
	pub fn access_mode(&self) -> AccessMode {
		match (self.read, self.write) {
			(true, true) => AccessMode::ReadWrite,
			(true, false) => AccessMode::ReadOnly,
			(false, true) => AccessMode::WriteOnly,
			// Mirrors open(2): requesting neither is a degenerate write-only request
			// in the flag encoding this library models (O_RDONLY == 0).
			(false, false) => AccessMode::ReadOnly,
		}
	}

	fn to_options(self) -> OpenOptions {
		let mut opts = OpenOptions::new();
		opts.read(self.read || !self.write)
			.write(self.write)
			.create(self.create)
			.append(self.append);
		#[cfg(unix)]
		{
			use std::os::unix::fs::OpenOptionsExt;
			opts.mode(self.mode);
		}
		opts
	}
}

pub struct OpenedFile {
	pub file: File,
	/// Whether the OS actually granted a cache-bypassing open. When false,
	/// every physical read/write must be followed by [`drop_cache`].
	pub direct: bool,
}

/// Opens `path` attempting to bypass the kernel page cache, falling back to
/// a buffered open plus manual drop-cache advisories when the platform or
/// this particular file doesn't support it.
pub fn open(path: &Path, flags: OpenFlags) -> io::Result<OpenedFile> {
	#[cfg(target_os = "linux")]
	{
		open_linux(path, flags)
	}
	#[cfg(target_os = "macos")]
	{
		open_macos(path, flags)
	}
	#[cfg(target_os = "windows")]
	{
		open_windows(path, flags)
	}
	#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
	{
		debug!("direct I/O is not implemented for this platform, falling back to buffered I/O");
		let file = flags.to_options().open(path)?;
		Ok(OpenedFile {
			file,
			direct: false,
		})
	}
}

#[cfg(target_os = "linux")]
fn open_linux(path: &Path, flags: OpenFlags) -> io::Result<OpenedFile> {
	use std::os::unix::fs::OpenOptionsExt;

	let direct_result = flags.to_options().custom_flags(libc::O_DIRECT).open(path);
	match direct_result {
		Ok(file) => {
			debug!("opened {} with O_DIRECT", path.display());
			Ok(OpenedFile { file, direct: true })
		}
		Err(err) if err.kind() == io::ErrorKind::InvalidInput || err.raw_os_error() == Some(libc::EINVAL) => {
			warn!(
				"O_DIRECT rejected for {}, falling back to buffered I/O with manual cache drops",
				path.display()
			);
			let file = flags.to_options().open(path)?;
			Ok(OpenedFile {
				file,
				direct: false,
			})
		}
		Err(err) => Err(err),
	}
}

#[cfg(target_os = "macos")]
fn open_macos(path: &Path, flags: OpenFlags) -> io::Result<OpenedFile> {
	use std::os::unix::io::AsRawFd;

	// macOS has no O_DIRECT; the closest equivalent is the per-descriptor
	// F_NOCACHE hint applied after a normal open.
	let file = flags.to_options().open(path)?;
	let rc = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_NOCACHE, 1) };
	let direct = rc == 0;
	if !direct {
		warn!(
			"F_NOCACHE rejected for {}, relying on manual cache drops",
			path.display()
		);
	}
	Ok(OpenedFile { file, direct })
}

#[cfg(target_os = "windows")]
fn open_windows(path: &Path, flags: OpenFlags) -> io::Result<OpenedFile> {
	use std::os::windows::fs::OpenOptionsExt;

	const FILE_FLAG_NO_BUFFERING: u32 = 0x2000_0000;

	let direct_result = flags
		.to_options()
		.custom_flags(FILE_FLAG_NO_BUFFERING)
		.open(path);
	match direct_result {
		Ok(file) => Ok(OpenedFile { file, direct: true }),
		Err(err) if err.kind() == io::ErrorKind::InvalidInput => {
			warn!(
				"unbuffered open rejected for {}, falling back to buffered I/O",
				path.display()
			);
			let file = flags.to_options().open(path)?;
			Ok(OpenedFile {
				file,
				direct: false,
			})
		}
		Err(err) => Err(err),
	}
}

/// Positioned read, identical across platforms but behind one name so the
/// rest of the crate doesn't need `cfg`.
pub fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
	#[cfg(unix)]
	{
		use std::os::unix::fs::FileExt;
		file.read_at(buf, offset)
	}
	#[cfg(windows)]
	{
		use std::os::windows::fs::FileExt;
		file.seek_read(buf, offset)
	}
}

/// Positioned write, identical across platforms but behind one name so the
/// rest of the crate doesn't need `cfg`.
pub fn write_at(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
	#[cfg(unix)]
	{
		use std::os::unix::fs::FileExt;
		file.write_at(buf, offset)
	}
	#[cfg(windows)]
	{
		use std::os::windows::fs::FileExt;
		file.seek_write(buf, offset)
	}
}

/// Closes `file` and surfaces the close(2) result. `std::fs::File`'s `Drop`
/// swallows this error, which matters here: the I/O path reports it as the
/// close error when no earlier flush error pre-empts it.
#[cfg(unix)]
pub fn close(file: File) -> io::Result<()> {
	use std::os::unix::io::IntoRawFd;
	let fd = file.into_raw_fd();
	let rc = unsafe { libc::close(fd) };
	if rc != 0 {
		Err(io::Error::last_os_error())
	} else {
		Ok(())
	}
}

/// No portable way to observe close() failures on this platform; falls back
/// to the ordinary (error-swallowing) `Drop`.
#[cfg(not(unix))]
pub fn close(file: File) -> io::Result<()> {
	drop(file);
	Ok(())
}

/// Advises the OS that `[offset, offset + len)` of `file` will not be
/// accessed soon, so it can be dropped from the kernel page cache. This is
/// advisory only; failures are ignored, the drop is best-effort.
pub fn drop_cache(file: &File, offset: u64, len: u64) {
	#[cfg(any(target_os = "linux", target_os = "android"))]
	{
		use std::os::unix::io::AsRawFd;
		unsafe {
			libc::posix_fadvise(
				file.as_raw_fd(),
				offset as libc::off_t,
				len as libc::off_t,
				libc::POSIX_FADV_DONTNEED,
			);
		}
	}
	// macOS applies its drop-cache equivalent (F_NOCACHE) once at open time
	// via `open_macos`, not per I/O; other platforms have no advisory to
	// issue here at all.
	#[cfg(not(any(target_os = "linux", target_os = "android")))]
	{
		let _ = (file, offset, len);
	}
}

use std::io;

use thiserror::Error;

/// The error kinds a `vtpc` call can fail with, mirroring the POSIX errno
/// taxonomy the library's C ancestor surfaced directly.
#[derive(Debug, Error)]
pub enum Error {
	#[error("Bad descriptor: {0}")]
	BadDescriptor(&'static str),

	#[error("Invalid argument: {0}")]
	InvalidArgument(&'static str),

	#[error("Out of memory: {0}")]
	OutOfMemory(&'static str),

	#[error("Too many open files (limit is {0})")]
	TooManyOpenFiles(usize),

	#[error("I/O error: {0}")]
	Io(#[from] io::Error),
}

impl Error {
	/// The `io::ErrorKind` a caller composing with ordinary `std::io` code
	/// would expect to see for this error.
	pub fn kind(&self) -> io::ErrorKind {
		match self {
			Error::BadDescriptor(_) => io::ErrorKind::Other,
			Error::InvalidArgument(_) => io::ErrorKind::InvalidInput,
			Error::OutOfMemory(_) => io::ErrorKind::OutOfMemory,
			Error::TooManyOpenFiles(_) => io::ErrorKind::Other,
			Error::Io(err) => err.kind(),
		}
	}
}

impl From<Error> for io::Error {
	fn from(err: Error) -> Self {
		match err {
			Error::Io(err) => err,
			other => io::Error::new(other.kind(), other),
		}
	}
}

pub type Result<T> = std::result::Result<T, Error>;

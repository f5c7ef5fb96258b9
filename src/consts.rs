//! Crate-wide constants, centralized so magic numbers don't spread across
//! the modules that use them.

use std::ops::Range;

/// Name of the environment variable read once, at first library use, to
/// configure the per-handle cache capacity.
pub const CACHE_PAGES_ENV: &str = "VTPC_CACHE_PAGES";

/// Fallback cache capacity when the environment variable is unset, empty,
/// non-numeric, non-positive, or out of range.
pub const DEFAULT_CACHE_PAGES: usize = 256;

/// Values outside this range are rejected and the default is used instead.
pub const CACHE_PAGES_RANGE: Range<usize> = 1..10_000_000;

/// Size of the process-wide handle table.
pub const MAX_HANDLES: usize = 1024;

/// Slots `0..RESERVED_HANDLES` are reserved (mirroring stdin/stdout/stderr)
/// and never handed out by `open`.
pub const RESERVED_HANDLES: usize = 3;

/// The minimum cache capacity a handle is ever constructed with, regardless
/// of configuration, so that Kin/Am_cap/Kout stay well defined.
pub const MIN_CACHE_CAPACITY: usize = 4;

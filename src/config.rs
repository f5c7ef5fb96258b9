//! Process-wide configuration, read once from the environment on first
//! library use.

use log::{debug, warn};
use parking_lot::Mutex;

use crate::consts::{CACHE_PAGES_ENV, CACHE_PAGES_RANGE, DEFAULT_CACHE_PAGES};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
	pub cache_pages: usize,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			cache_pages: DEFAULT_CACHE_PAGES,
		}
	}
}

/// Parses a raw `VTPC_CACHE_PAGES` value, returning `None` for anything
/// that should fall back to the default: empty, non-numeric, non-positive,
/// or out of the accepted range.
fn parse_cache_pages(raw: &str) -> Option<usize> {
	if raw.is_empty() {
		return None;
	}
	match raw.parse::<i64>() {
		Ok(value) if value > 0 && CACHE_PAGES_RANGE.contains(&(value as usize)) => Some(value as usize),
		_ => None,
	}
}

impl Config {
	fn from_env() -> Self {
		let Ok(raw) = std::env::var(CACHE_PAGES_ENV) else {
			return Self::default();
		};
		match parse_cache_pages(&raw) {
			Some(cache_pages) => {
				debug!("{CACHE_PAGES_ENV}={raw}, using configured cache capacity");
				Self { cache_pages }
			}
			None => {
				warn!(
					"{CACHE_PAGES_ENV}={raw:?} is not a valid cache capacity, falling back to default of {DEFAULT_CACHE_PAGES} pages"
				);
				Self::default()
			}
		}
	}
}

static CONFIG: Mutex<Option<Config>> = Mutex::new(None);

/// Returns the process-wide configuration, reading and caching the
/// environment on the first call.
pub fn config() -> Config {
	let mut cached = CONFIG.lock();
	if let Some(config) = *cached {
		return config;
	}
	let config = Config::from_env();
	*cached = Some(config);
	config
}

/// Clears the cached configuration so the next [`config`] call re-reads the
/// environment. The real library only ever reads `VTPC_CACHE_PAGES` once
/// per process, as specified; this exists purely so the many `#[test]`
/// functions sharing this process can each exercise a fresh value instead
/// of whichever one happened to win the race to call `config()` first.
#[cfg(test)]
pub fn reset_for_test() {
	*CONFIG.lock() = None;
}

#[cfg(test)]
mod tests {
	use super::*;

	// `config()` touches a process-wide static and the environment; tests
	// that exercise it must not run concurrently with each other.
	static ENV_LOCK: Mutex<()> = Mutex::new(());

	#[test]
	fn config_reads_env_once_and_reset_forces_reread() {
		let _guard = ENV_LOCK.lock();
		reset_for_test();

		// Safety: serialized by `ENV_LOCK`, so no other thread observes a
		// torn or concurrently-mutated environment.
		unsafe { std::env::set_var(CACHE_PAGES_ENV, "42") };
		assert_eq!(config().cache_pages, 42);

		// Changing the variable without resetting must not be observed: the
		// whole point of the once-only cache is that later calls in the same
		// process see the first value.
		unsafe { std::env::set_var(CACHE_PAGES_ENV, "7") };
		assert_eq!(config().cache_pages, 42);

		reset_for_test();
		assert_eq!(config().cache_pages, 7);

		unsafe { std::env::remove_var(CACHE_PAGES_ENV) };
		reset_for_test();
	}

	#[test]
	fn rejects_non_numeric() {
		assert_eq!(parse_cache_pages("not-a-number"), None);
	}

	#[test]
	fn rejects_non_positive() {
		assert_eq!(parse_cache_pages("0"), None);
		assert_eq!(parse_cache_pages("-5"), None);
	}

	#[test]
	fn rejects_empty() {
		assert_eq!(parse_cache_pages(""), None);
	}

	#[test]
	fn rejects_out_of_range() {
		assert_eq!(parse_cache_pages("50000000"), None);
	}

	#[test]
	fn accepts_in_range_value() {
		assert_eq!(parse_cache_pages("512"), Some(512));
	}
}

//! Benchmark CLI comparing raw direct-I/O `pread` throughput against the
//! `vtpc` 2Q cache over a bounded working set of pages.

use std::{
	fs::OpenOptions,
	os::unix::fs::{FileExt, OpenOptionsExt},
	path::PathBuf,
	process::ExitCode,
	time::Instant,
};

use vtpc::{OpenFlags, Whence};

struct Args {
	mode: String,
	file: PathBuf,
	file_pages: u64,
	ws_pages: u64,
	ops: u64,
	seed: u64,
}

fn usage() -> ! {
	eprintln!(
		"Usage: vtpc-bench --mode=libc|vtpc --file=PATH --file-pages=N --ws-pages=N --ops=N [--seed=N]"
	);
	std::process::exit(1);
}

fn parse_args() -> Args {
	let mut mode = None;
	let mut file = None;
	let mut file_pages = 4096u64;
	let mut ws_pages = 256u64;
	let mut ops = 500_000u64;
	let mut seed = 1u64;

	for arg in std::env::args().skip(1) {
		if let Some(v) = arg.strip_prefix("--mode=") {
			mode = Some(v.to_string());
		} else if let Some(v) = arg.strip_prefix("--file=") {
			file = Some(PathBuf::from(v));
		} else if let Some(v) = arg.strip_prefix("--file-pages=") {
			file_pages = v.parse().unwrap_or_else(|_| usage());
		} else if let Some(v) = arg.strip_prefix("--ws-pages=") {
			ws_pages = v.parse().unwrap_or_else(|_| usage());
		} else if let Some(v) = arg.strip_prefix("--ops=") {
			ops = v.parse().unwrap_or_else(|_| usage());
		} else if let Some(v) = arg.strip_prefix("--seed=") {
			seed = v.parse().unwrap_or_else(|_| usage());
		} else {
			usage();
		}
	}

	let (Some(mode), Some(file)) = (mode, file) else {
		usage();
	};
	if ws_pages == 0 || ops == 0 || file_pages == 0 {
		usage();
	}
	let ws_pages = ws_pages.min(file_pages);

	Args {
		mode,
		file,
		file_pages,
		ws_pages,
		ops,
		seed,
	}
}

fn xorshift64(state: &mut u64) -> u64 {
	let mut x = *state;
	x ^= x << 13;
	x ^= x >> 7;
	x ^= x << 17;
	*state = x;
	x
}

fn page_size() -> usize {
	let ps = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
	if ps > 0 {
		ps as usize
	} else {
		4096
	}
}

fn fill_file_if_needed(path: &PathBuf, file_pages: u64, page_size: usize) -> std::io::Result<()> {
	let file = OpenOptions::new()
		.read(true)
		.write(true)
		.create(true)
		.mode(0o644)
		.open(path)?;

	let want = file_pages * page_size as u64;
	let have = file.metadata()?.len();
	if have >= want {
		return Ok(());
	}

	let page = vec![0xABu8; page_size];
	let mut offset = (have / page_size as u64) * page_size as u64;
	while offset < want {
		file.write_at(&page, offset)?;
		offset += page_size as u64;
	}
	file.set_len(want)?;
	file.sync_all()
}

fn run_libc(args: &Args, page_size: usize) -> std::io::Result<()> {
	let file = OpenOptions::new()
		.read(true)
		.custom_flags(libc::O_DIRECT)
		.open(&args.file)
		.or_else(|_| OpenOptions::new().read(true).open(&args.file))?;

	let mut buf = vec![0u8; page_size];
	let mut seed = args.seed;
	let t0 = Instant::now();

	for _ in 0..args.ops {
		let page = xorshift64(&mut seed) % args.ws_pages;
		let offset = page * page_size as u64;
		let n = file.read_at(&mut buf, offset)?;
		if n == 0 {
			return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "unexpected EOF"));
		}
	}

	report(&args.mode, args, page_size, t0.elapsed());
	Ok(())
}

fn run_vtpc(args: &Args, page_size: usize) -> vtpc::Result<()> {
	let fd = vtpc::open(
		&args.file,
		OpenFlags {
			read: true,
			write: false,
			create: false,
			append: false,
			mode: 0,
		},
	)?;

	let mut buf = vec![0u8; page_size];
	let mut seed = args.seed;
	let t0 = Instant::now();

	for _ in 0..args.ops {
		let page = xorshift64(&mut seed) % args.ws_pages;
		let offset = (page * page_size as u64) as i64;
		vtpc::lseek(fd, offset, Whence::Set)?;
		let n = vtpc::read(fd, &mut buf)?;
		if n != page_size {
			vtpc::close(fd).ok();
			return Err(vtpc::Error::InvalidArgument("short read during benchmark"));
		}
	}

	vtpc::close(fd)?;
	report(&args.mode, args, page_size, t0.elapsed());
	Ok(())
}

fn report(mode: &str, args: &Args, page_size: usize, elapsed: std::time::Duration) {
	let dt = elapsed.as_secs_f64();
	let total_bytes = args.ops as f64 * page_size as f64;
	let mib = total_bytes / (1024.0 * 1024.0);
	println!(
		"mode={mode} file_pages={} ws_pages={} ops={} page_size={page_size}",
		args.file_pages, args.ws_pages, args.ops
	);
	println!(
		"time_sec={dt:.6} throughput_mib_s={:.2} ops_s={:.2}",
		mib / dt,
		args.ops as f64 / dt
	);
}

fn main() -> ExitCode {
	env_logger::init();
	let args = parse_args();
	let page_size = page_size();

	if let Err(err) = fill_file_if_needed(&args.file, args.file_pages, page_size) {
		eprintln!("fatal: failed to prepare {}: {err}", args.file.display());
		return ExitCode::from(2);
	}

	let result = match args.mode.as_str() {
		"libc" => run_libc(&args, page_size).map_err(|err| err.to_string()),
		"vtpc" => run_vtpc(&args, page_size).map_err(|err| err.to_string()),
		_ => {
			usage();
		}
	};

	if let Err(msg) = result {
		eprintln!("fatal: {msg}");
		return ExitCode::from(2);
	}
	ExitCode::SUCCESS
}

use std::io::{IsTerminal, Read};

use poolalloc::{CoalescePolicy, Pool, PoolConfig};
use tracing_subscriber::EnvFilter;

/// Waits until the user presses ENTER.
/// Useful when you want to inspect the mapping with tools like `pmap` or
/// `gdb` between steps. Skipped when stdin is not a terminal.
fn block_until_enter_pressed() {
  if !std::io::stdin().is_terminal() {
    return;
  }

  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn print_pool(
  label: &str,
  pool: &Pool<poolalloc::MmapBacking>,
) {
  println!("[{label}] {}", pool.stat());
  println!("[{label}] {}", pool.dump());
}

fn main() -> Result<(), poolalloc::PoolError> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("poolalloc=trace")))
    .init();

  let config = PoolConfig::default().with_coalesce(CoalescePolicy::Transitive);
  let mut pool = Pool::mapped(config);

  println!(
    "PID = {}, pool capacity = {} bytes, coalescing {:?}",
    std::process::id(),
    pool.capacity(),
    pool.config().coalesce
  );
  pool.init()?;
  print_pool("init", &pool);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) Allocate a u32. The single free block is split in two.
  // --------------------------------------------------------------------
  let first = pool.try_alloc(size_of::<u32>())?;

  unsafe { first.as_ptr().cast::<u32>().write_unaligned(0xDEADBEEF) };
  println!("\n[1] Allocated u32 at {:?}", first);
  print_pool("1", &pool);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Three 1 KiB blocks back to back.
  // --------------------------------------------------------------------
  let kilobytes: Vec<_> = (0..3).filter_map(|_| pool.alloc(1024)).collect();
  for (i, ptr) in kilobytes.iter().enumerate() {
    unsafe { ptr.as_ptr().write_bytes(0xA0 + i as u8, 1024) };
  }
  println!("\n[2] Allocated {} x 1 KiB", kilobytes.len());
  print_pool("2", &pool);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) Requests the pool can never satisfy are refused, not fatal.
  // --------------------------------------------------------------------
  println!("\n[3] alloc(6000) = {:?}", pool.alloc(6000));
  print_pool("3", &pool);

  // --------------------------------------------------------------------
  // 4) Bad frees are ignored: interior pointer, double free.
  // --------------------------------------------------------------------
  pool.free(first.as_ptr().wrapping_add(2));
  pool.free(first.as_ptr());
  pool.free(first.as_ptr());
  println!("\n[4] Freed the u32 (once for real, twice ignored)");
  print_pool("4", &pool);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 5) Free the middle, then its neighbors: the run collapses into one.
  // --------------------------------------------------------------------
  for index in [1, 0, 2] {
    if let Some(ptr) = kilobytes.get(index) {
      pool.free(ptr.as_ptr());
      println!("\n[5] Freed 1 KiB block #{index}");
      print_pool("5", &pool);
    }
  }
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 6) A small request lands in the first hole again.
  // --------------------------------------------------------------------
  let reused = pool.alloc(2);
  println!(
    "\n[6] alloc(2) reused the first block? {}",
    if reused == Some(first) { "yes" } else { "no" }
  );
  print_pool("6", &pool);

  pool.destroy()?;
  println!("\n[7] Destroyed: {}", pool.stat());

  Ok(())
}

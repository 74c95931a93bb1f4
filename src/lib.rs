//! # poolalloc - A Fixed-Capacity Block-Chain Allocator
//!
//! This crate provides a `malloc`/`free` style allocator that carves blocks
//! out of one fixed-size region: either a byte array you own, or a page
//! mapping obtained with `mmap(2)`. It never grows and never falls back to
//! the global allocator.
//!
//! ## Overview
//!
//! The region is a chain of blocks packed back to back. Each block is a
//! header followed by its payload, and the header is all the allocator needs
//! to find the next block:
//!
//! ```text
//!   Pool (capacity C):
//!
//!   offset 0                                                          C
//!   ┌────┬──────────┬────┬──────────────────┬────┬────────────────────┐
//!   │ H  │ payload  │ H  │     payload      │ H  │      payload       │
//!   │used│ (alloc)  │free│                  │used│                    │
//!   └────┴──────────┴────┴──────────────────┴────┴────────────────────┘
//!        ▲
//!        └── pointer handed to the caller
//!
//!   Sum of (header + payload) over the chain is exactly C.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   poolalloc
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── backing    - Where the bytes come from (slice, mmap)
//!   ├── block      - Decoded block descriptor
//!   ├── config     - Pool capacity and coalescing policy
//!   ├── error      - PoolError
//!   ├── header     - Packed and linked header layouts
//!   ├── pool       - Pool: init, alloc, free, stat, validation, dump
//!   └── stats      - Aggregate counters
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use poolalloc::{Pool, PoolConfig, SliceBacking};
//!
//! let mut bytes = [0u8; 4096];
//! let mut pool = Pool::new(SliceBacking::new(&mut bytes), PoolConfig::default());
//!
//! pool.init().unwrap();
//!
//! let ptr = pool.alloc(64).unwrap();
//! unsafe { ptr.as_ptr().write_bytes(0xAB, 64) };
//!
//! assert_eq!(1, pool.stat().active_blocks);
//!
//! pool.free(ptr.as_ptr());
//! assert_eq!(0, pool.stat().active_blocks);
//! ```
//!
//! ## How It Works
//!
//! Allocation is first fit. The first free block large enough is split when
//! the leftover can hold a header plus more than one byte; otherwise the
//! whole block is handed out and the slack stays as internal fragmentation:
//!
//! ```text
//!   alloc(n) on a free block of size S:
//!
//!   before  ┌────┬─────────────────────────────────────┐
//!           │ H  │              S (free)               │
//!           └────┴─────────────────────────────────────┘
//!
//!   after   ┌────┬──────────┬────┬─────────────────────┐
//!           │ H  │ n (used) │ H  │   S - n - H (free)  │
//!           └────┴──────────┴────┴─────────────────────┘
//! ```
//!
//! Freeing marks the block free and merges it with free neighbors, either
//! just its successor or every adjacent free pair in the chain (see
//! [`CoalescePolicy`]). A pointer is only accepted if its header is one of
//! the headers reached by walking the chain from the start, so interior and
//! foreign pointers are ignored.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no synchronization; wrap the pool in a lock
//!   if it has to be shared
//! - **Fixed capacity**: the pool never grows
//! - **Header-width alignment only**: payloads are aligned to nothing more
//!   than the header layout gives them
//!
//! ## Safety
//!
//! Pointers returned by [`Pool::alloc`] are valid until they are freed or
//! the pool is destroyed. The pool never reads or writes payload bytes.

pub mod align;
mod backing;
mod block;
mod config;
mod error;
mod header;
mod pool;
mod stats;

#[cfg(unix)]
pub use backing::MmapBacking;
pub use backing::{Backing, SliceBacking};
pub use block::Block;
pub use config::{CoalescePolicy, PoolConfig};
pub use error::{PoolError, Result};
pub use header::{HeaderLayout, LinkedLayout, PackedLayout};
pub use pool::{Blocks, Dump, Pool};
pub use stats::Stats;

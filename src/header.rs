//! In-place block header encodings.
//!
//! Two layouts are supported. [`PackedLayout`] stores the payload size and the
//! allocated flag in a single word and derives the successor from the size.
//! [`LinkedLayout`] stores an explicit forward link next to the size, so the
//! chain can be walked without address arithmetic.
//!
//! ```text
//!   PackedLayout (4 bytes, little endian)
//!   ┌───────────────────────────────┬───┐
//!   │          size (31 bits)       │ A │
//!   └───────────────────────────────┴───┘
//!
//!   LinkedLayout (word aligned)
//!   ┌──────────────┬──────────────┬───┬─────────┐
//!   │  size (u64)  │  next (u64)  │ A │ padding │
//!   └──────────────┴──────────────┴───┴─────────┘
//! ```

use std::mem;

use crate::{
  align,
  block::Block,
  error::{PoolError, Result},
};

/// A way of storing a [`Block`] header inside the pool bytes.
pub trait HeaderLayout {
  /// Bytes consumed by one header.
  const OVERHEAD: usize;
  /// Largest payload size the header can represent.
  const MAX_SIZE: usize;
  const NAME: &'static str;

  /// Writes `block` into `out`, which is exactly `OVERHEAD` bytes long.
  fn write(
    block: &Block,
    out: &mut [u8],
  ) -> Result<()>;

  /// Reads the header stored at `offset`; `bytes` is exactly `OVERHEAD` long.
  fn read(
    offset: usize,
    bytes: &[u8],
  ) -> Block;

  fn fits(size: usize) -> bool {
    size <= Self::MAX_SIZE
  }
}

fn unrepresentable<L: HeaderLayout>(size: usize) -> PoolError {
  PoolError::InvalidConfig(format!(
    "block size {size} exceeds the {} header limit of {}",
    L::NAME,
    L::MAX_SIZE
  ))
}

/// Bit-packed header: `size << 1 | allocated` in one `u32`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackedLayout;

const PACKED_WIDTH: usize = mem::size_of::<u32>();
const PACKED_MAX: usize = (u32::MAX >> 1) as usize;

impl PackedLayout {
  /// Returns `None` when `size` does not fit in the 31 size bits.
  pub fn encode(
    size: usize,
    allocated: bool,
  ) -> Option<u32> {
    if size > PACKED_MAX {
      return None;
    }

    Some(((size as u32) << 1) | allocated as u32)
  }

  pub fn decode(word: u32) -> (usize, bool) {
    ((word >> 1) as usize, word & 1 == 1)
  }
}

impl HeaderLayout for PackedLayout {
  const OVERHEAD: usize = PACKED_WIDTH;
  const MAX_SIZE: usize = PACKED_MAX;
  const NAME: &'static str = "packed";

  fn write(
    block: &Block,
    out: &mut [u8],
  ) -> Result<()> {
    debug_assert_eq!(block.next, block.end(Self::OVERHEAD));

    let word = Self::encode(block.size, !block.is_free).ok_or_else(|| unrepresentable::<Self>(block.size))?;
    out.copy_from_slice(&word.to_le_bytes());

    Ok(())
  }

  fn read(
    offset: usize,
    bytes: &[u8],
  ) -> Block {
    let mut raw = [0u8; PACKED_WIDTH];
    raw.copy_from_slice(bytes);

    let (size, allocated) = Self::decode(u32::from_le_bytes(raw));

    Block::new(offset, size, !allocated, offset + PACKED_WIDTH + size)
  }
}

/// Multi-field header carrying an explicit link to the next block.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkedLayout;

const LINK_WORD: usize = mem::size_of::<u64>();
const LINKED_OVERHEAD: usize = align!(2 * LINK_WORD + 1);

impl LinkedLayout {
  pub fn encode(
    size: usize,
    allocated: bool,
    next: usize,
  ) -> [u8; LINKED_OVERHEAD] {
    let mut out = [0u8; LINKED_OVERHEAD];

    out[..LINK_WORD].copy_from_slice(&(size as u64).to_le_bytes());
    out[LINK_WORD..2 * LINK_WORD].copy_from_slice(&(next as u64).to_le_bytes());
    out[2 * LINK_WORD] = allocated as u8;

    out
  }

  /// Returns `(size, allocated, next)`.
  pub fn decode(bytes: &[u8]) -> (usize, bool, usize) {
    let mut size = [0u8; LINK_WORD];
    let mut next = [0u8; LINK_WORD];
    size.copy_from_slice(&bytes[..LINK_WORD]);
    next.copy_from_slice(&bytes[LINK_WORD..2 * LINK_WORD]);

    (
      u64::from_le_bytes(size) as usize,
      bytes[2 * LINK_WORD] != 0,
      u64::from_le_bytes(next) as usize,
    )
  }
}

impl HeaderLayout for LinkedLayout {
  const OVERHEAD: usize = LINKED_OVERHEAD;
  const MAX_SIZE: usize = usize::MAX >> 1;
  const NAME: &'static str = "linked";

  fn write(
    block: &Block,
    out: &mut [u8],
  ) -> Result<()> {
    if !Self::fits(block.size) {
      return Err(unrepresentable::<Self>(block.size));
    }

    out.copy_from_slice(&Self::encode(block.size, !block.is_free, block.next));

    Ok(())
  }

  fn read(
    offset: usize,
    bytes: &[u8],
  ) -> Block {
    let (size, allocated, next) = Self::decode(bytes);

    Block::new(offset, size, !allocated, next)
  }
}

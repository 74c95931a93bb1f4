/// Decoded view of one block in the chain.
///
/// Offsets are relative to the start of the pool. `next` is the offset of the
/// successor's header; the last block's `next` equals the pool capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
  pub offset: usize,
  pub size: usize,
  pub is_free: bool,
  pub next: usize,
}

impl Block {
  pub fn new(
    offset: usize,
    size: usize,
    is_free: bool,
    next: usize,
  ) -> Self {
    Self {
      offset,
      size,
      is_free,
      next,
    }
  }

  /// Offset of the first payload byte.
  pub fn payload(
    &self,
    overhead: usize,
  ) -> usize {
    self.offset + overhead
  }

  /// Offset one past the last payload byte.
  pub fn end(
    &self,
    overhead: usize,
  ) -> usize {
    self.offset + overhead + self.size
  }
}

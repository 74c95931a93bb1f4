use std::fmt;

/// Aggregate pool counters.
///
/// `bytes_in_use` counts every header plus the payload of every allocated
/// block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
  pub total_blocks: usize,
  pub active_blocks: usize,
  pub bytes_in_use: usize,
}

impl Stats {
  pub(crate) fn reset(
    &mut self,
    overhead: usize,
  ) {
    *self = Self {
      total_blocks: 1,
      active_blocks: 0,
      bytes_in_use: overhead,
    };
  }

  pub(crate) fn block_created(
    &mut self,
    overhead: usize,
  ) {
    self.total_blocks += 1;
    self.bytes_in_use += overhead;
  }

  pub(crate) fn block_merged(
    &mut self,
    overhead: usize,
  ) {
    self.total_blocks -= 1;
    self.bytes_in_use -= overhead;
  }

  pub(crate) fn block_allocated(
    &mut self,
    size: usize,
  ) {
    self.active_blocks += 1;
    self.bytes_in_use += size;
  }

  pub(crate) fn block_freed(
    &mut self,
    size: usize,
  ) {
    self.active_blocks -= 1;
    self.bytes_in_use -= size;
  }
}

impl fmt::Display for Stats {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(
      f,
      "blocks: {} total, {} active; {} bytes in use",
      self.total_blocks, self.active_blocks, self.bytes_in_use
    )
  }
}

use crate::{
  error::{PoolError, Result},
  header::HeaderLayout,
};

/// How a freed block merges with its free neighbors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoalescePolicy {
  /// Absorb the immediate successor if it is free. A free predecessor is left
  /// alone, so two adjacent free blocks can survive a `free`.
  SuccessorOnly,
  /// Rescan the whole chain after every `free` until no two adjacent blocks
  /// are both free.
  #[default]
  Transitive,
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
  /// Pool size in bytes, headers included.
  pub capacity: usize,
  pub coalesce: CoalescePolicy,
  /// Cross-check the incremental counters against a full traversal after
  /// every mutating operation.
  pub verify: bool,
}

impl Default for PoolConfig {
  fn default() -> Self {
    Self::page()
  }
}

impl PoolConfig {
  pub fn tiny() -> Self {
    Self::default().with_capacity(1024)
  }

  pub fn page() -> Self {
    Self {
      capacity: 4096,
      coalesce: CoalescePolicy::default(),
      verify: cfg!(debug_assertions),
    }
  }

  pub fn with_capacity(
    mut self,
    capacity: usize,
  ) -> Self {
    self.capacity = capacity;
    self
  }

  pub fn with_coalesce(
    mut self,
    coalesce: CoalescePolicy,
  ) -> Self {
    self.coalesce = coalesce;
    self
  }

  pub fn with_verify(
    mut self,
    verify: bool,
  ) -> Self {
    self.verify = verify;
    self
  }

  /// Checks that the initial block spanning the whole pool can be written
  /// with layout `L` and can hold at least one payload byte.
  pub fn validate<L: HeaderLayout>(&self) -> Result<()> {
    if self.capacity <= L::OVERHEAD {
      return Err(PoolError::InvalidConfig(format!(
        "capacity {} cannot hold a {}-byte {} header and a payload",
        self.capacity,
        L::OVERHEAD,
        L::NAME
      )));
    }

    let initial = self.capacity - L::OVERHEAD;
    if !L::fits(initial) {
      return Err(PoolError::InvalidConfig(format!(
        "capacity {} exceeds what a {} header can describe ({} bytes)",
        self.capacity,
        L::NAME,
        L::MAX_SIZE
      )));
    }

    Ok(())
  }
}

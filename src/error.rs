use std::io;

/// Everything that can go wrong while managing a pool.
///
/// Only [`PoolError::BackingStoreFailure`] indicates an environment fault;
/// the rest are expected, recoverable outcomes of caller input.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
  /// The pool has not been initialized, or has been destroyed.
  #[error("pool is not initialized")]
  NotInitialized,

  /// A zero-byte allocation was requested.
  #[error("allocation size must be non-zero")]
  ZeroSize,

  /// The admission check failed or no free block is large enough.
  #[error("out of memory: requested {requested} bytes, {available} unaccounted")]
  OutOfMemory { requested: usize, available: usize },

  /// The address is not the payload of a currently allocated block.
  #[error("invalid pointer {addr:#x}")]
  InvalidPointer { addr: usize },

  /// The backing region could not be acquired or released.
  #[error("backing store failure during {op}: {source}")]
  BackingStoreFailure {
    op: &'static str,
    #[source]
    source: io::Error,
  },

  /// The pool configuration cannot be realized with the chosen header layout.
  #[error("invalid pool configuration: {0}")]
  InvalidConfig(String),
}

impl PoolError {
  pub(crate) fn backing(
    op: &'static str,
    source: io::Error,
  ) -> Self {
    Self::BackingStoreFailure { op, source }
  }

  /// True for the conditions a caller is expected to handle routinely.
  pub fn is_recoverable(&self) -> bool {
    !matches!(self, Self::BackingStoreFailure { .. } | Self::InvalidConfig(_))
  }
}

pub type Result<T> = std::result::Result<T, PoolError>;

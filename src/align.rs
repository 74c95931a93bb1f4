/// Rounds `$value` up to the machine word width.
///
/// Header layouts use this so that a header always occupies a whole number
/// of words.
///
/// # Examples
///
/// ```rust
/// use std::mem;
/// use poolalloc::align;
///
/// match mem::size_of::<usize>() {
///     8 => assert_eq!(align!(17), 24), // 64 bit machine.
///     4 => assert_eq!(align!(17), 20), // 32 bit machine.
///     _ => {},
/// };
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align_to!($value, ::core::mem::size_of::<usize>())
  };
}

/// Rounds `$value` up to the next multiple of `$alignment`, which must be a
/// power of two.
///
/// ```rust
/// use poolalloc::align_to;
///
/// assert_eq!(align_to!(4097, 4096), 8192);
/// assert_eq!(align_to!(4096, 4096), 4096);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $alignment:expr) => {
    ($value + $alignment - 1) & !($alignment - 1)
  };
}

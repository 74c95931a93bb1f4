use std::{io, ptr::NonNull};

use crate::error::{PoolError, Result};

/// Source of the raw bytes a pool carves blocks from.
pub trait Backing {
  /// Hands out a writable region of at least `capacity` bytes.
  fn acquire(
    &mut self,
    capacity: usize,
  ) -> Result<NonNull<u8>>;

  /// Gives the region back. The pointer returned by `acquire` is dangling
  /// afterwards.
  fn release(&mut self) -> Result<()>;

  /// Whether `release` actually returns memory to the system.
  fn is_dynamic(&self) -> bool;
}

/// Caller-owned byte array, the embedded form of a pool.
///
/// Nothing is returned to the system on release; destroying a pool built on
/// it only resets the counters.
pub struct SliceBacking<'a> {
  bytes: &'a mut [u8],
  acquired: bool,
}

impl<'a> SliceBacking<'a> {
  pub fn new(bytes: &'a mut [u8]) -> Self {
    Self {
      bytes,
      acquired: false,
    }
  }
}

impl Backing for SliceBacking<'_> {
  fn acquire(
    &mut self,
    capacity: usize,
  ) -> Result<NonNull<u8>> {
    if self.acquired {
      return Err(PoolError::backing(
        "acquire",
        io::Error::new(io::ErrorKind::AlreadyExists, "slice is already in use"),
      ));
    }

    if self.bytes.len() < capacity {
      return Err(PoolError::backing(
        "acquire",
        io::Error::new(
          io::ErrorKind::InvalidInput,
          format!("slice holds {} bytes, pool needs {capacity}", self.bytes.len()),
        ),
      ));
    }

    self.acquired = true;

    Ok(NonNull::from(&mut *self.bytes).cast::<u8>())
  }

  fn release(&mut self) -> Result<()> {
    self.acquired = false;

    Ok(())
  }

  fn is_dynamic(&self) -> bool {
    false
  }
}

/// Anonymous private mapping obtained from the kernel with `mmap(2)`.
#[cfg(unix)]
#[derive(Default)]
pub struct MmapBacking {
  mapping: Option<(NonNull<u8>, usize)>,
}

#[cfg(unix)]
impl MmapBacking {
  pub fn new() -> Self {
    Self { mapping: None }
  }

  pub fn page_size() -> usize {
    // Safety: FFI call to sysconf.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };

    if size <= 0 { 4096 } else { size as usize }
  }
}

#[cfg(unix)]
impl Backing for MmapBacking {
  fn acquire(
    &mut self,
    capacity: usize,
  ) -> Result<NonNull<u8>> {
    if self.mapping.is_some() {
      return Err(PoolError::backing(
        "mmap",
        io::Error::new(io::ErrorKind::AlreadyExists, "region is already mapped"),
      ));
    }

    if capacity == 0 {
      return Err(PoolError::backing(
        "mmap",
        io::Error::new(io::ErrorKind::InvalidInput, "zero-size mapping"),
      ));
    }

    let length = crate::align_to!(capacity, Self::page_size());

    // Safety: FFI call to mmap.
    let ptr = unsafe {
      libc::mmap(
        std::ptr::null_mut(),
        length,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_PRIVATE | libc::MAP_ANON,
        -1,
        0,
      )
    };

    if ptr == libc::MAP_FAILED {
      return Err(PoolError::backing("mmap", io::Error::last_os_error()));
    }

    let base = NonNull::new(ptr.cast::<u8>())
      .ok_or_else(|| PoolError::backing("mmap", io::Error::other("mmap returned null")))?;
    self.mapping = Some((base, length));

    Ok(base)
  }

  fn release(&mut self) -> Result<()> {
    let Some((base, length)) = self.mapping else {
      return Ok(());
    };

    // Safety: FFI call to munmap on a range we mapped ourselves.
    if unsafe { libc::munmap(base.as_ptr().cast::<libc::c_void>(), length) } != 0 {
      return Err(PoolError::backing("munmap", io::Error::last_os_error()));
    }

    self.mapping = None;

    Ok(())
  }

  fn is_dynamic(&self) -> bool {
    true
  }
}

#[cfg(unix)]
impl Drop for MmapBacking {
  fn drop(&mut self) {
    if let Err(err) = self.release() {
      tracing::error!(%err, "leaking pool mapping");
    }
  }
}

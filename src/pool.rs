use std::{fmt, marker::PhantomData, ptr::NonNull, slice};

use tracing::{debug, error, info, trace};

use crate::{
  backing::Backing,
  block::Block,
  config::{CoalescePolicy, PoolConfig},
  error::{PoolError, Result},
  header::{HeaderLayout, PackedLayout},
  stats::Stats,
};

/// A fixed-capacity pool carved into a chain of header + payload blocks.
///
/// Blocks are packed back to back from offset zero; the chain is rediscovered
/// from the headers on every traversal, there is no separate free list.
pub struct Pool<B: Backing, L: HeaderLayout = PackedLayout> {
  backing: B,
  config: PoolConfig,
  base: Option<NonNull<u8>>,
  stats: Stats,
  _layout: PhantomData<L>,
}

impl<B: Backing> Pool<B> {
  /// Creates an uninitialized pool using the bit-packed header layout.
  pub fn new(
    backing: B,
    config: PoolConfig,
  ) -> Self {
    Self::with_layout(backing, config)
  }
}

#[cfg(unix)]
impl Pool<crate::backing::MmapBacking> {
  /// Creates an uninitialized pool backed by an anonymous mapping.
  pub fn mapped(config: PoolConfig) -> Self {
    Self::new(crate::backing::MmapBacking::new(), config)
  }
}

impl<B: Backing, L: HeaderLayout> Pool<B, L> {
  pub fn with_layout(
    backing: B,
    config: PoolConfig,
  ) -> Self {
    Self {
      backing,
      config,
      base: None,
      stats: Stats::default(),
      _layout: PhantomData,
    }
  }

  pub fn capacity(&self) -> usize {
    self.config.capacity
  }

  /// Bytes of bookkeeping in front of every payload.
  pub fn overhead(&self) -> usize {
    L::OVERHEAD
  }

  pub fn config(&self) -> &PoolConfig {
    &self.config
  }

  pub fn is_initialized(&self) -> bool {
    self.base.is_some()
  }

  /// Acquires the backing region and lays a single free block across it.
  ///
  /// Calling this on an initialized pool does nothing.
  pub fn init(&mut self) -> Result<()> {
    if self.is_initialized() {
      return Ok(());
    }

    self.config.validate::<L>()?;

    let capacity = self.capacity();
    let base = self.backing.acquire(capacity).inspect_err(|err| {
      error!(%err, capacity, "could not acquire pool backing");
    })?;
    self.base = Some(base);

    let initial = Block::new(0, capacity - L::OVERHEAD, true, capacity);
    if let Err(err) = self.write(&initial) {
      self.base = None;
      if let Err(release) = self.backing.release() {
        error!(err = %release, "could not release pool backing after failed init");
      }
      return Err(err);
    }
    self.stats.reset(L::OVERHEAD);

    info!(
      capacity,
      layout = L::NAME,
      dynamic = self.backing.is_dynamic(),
      "pool initialized"
    );

    Ok(())
  }

  /// Releases the backing region and zeroes the counters.
  ///
  /// On failure the pool is left initialized so the call can be retried.
  pub fn destroy(&mut self) -> Result<()> {
    if !self.is_initialized() {
      return Ok(());
    }

    self.backing.release().inspect_err(|err| {
      error!(%err, "could not release pool backing");
    })?;

    self.base = None;
    self.stats = Stats::default();

    info!(capacity = self.capacity(), "pool destroyed");

    Ok(())
  }

  /// Snapshot of the incrementally maintained counters. All zero before
  /// `init` and after `destroy`.
  pub fn stat(&self) -> Stats {
    self.stats
  }

  /// Walks the chain in address order.
  pub fn blocks(&self) -> Blocks<'_, B, L> {
    Blocks {
      pool: self,
      offset: 0,
    }
  }

  /// Allocates `size` bytes, or returns `None` if the pool cannot serve the
  /// request.
  pub fn alloc(
    &mut self,
    size: usize,
  ) -> Option<NonNull<u8>> {
    self
      .try_alloc(size)
      .inspect_err(|err| debug!(%err, size, "allocation rejected"))
      .ok()
  }

  /// First-fit allocation, splitting the chosen block when the remainder is
  /// large enough to hold a useful block of its own.
  pub fn try_alloc(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>> {
    let base = self.base.ok_or(PoolError::NotInitialized)?;

    if size == 0 {
      return Err(PoolError::ZeroSize);
    }

    let available = self.capacity() - self.stats.bytes_in_use;
    let out_of_memory = PoolError::OutOfMemory {
      requested: size,
      available,
    };

    if available < size || !L::fits(size) {
      return Err(out_of_memory);
    }

    let Some(candidate) = self.blocks().find(|block| block.is_free && block.size >= size) else {
      return Err(out_of_memory);
    };

    let block = self.split(candidate, size)?;
    self.verify();

    // Safety: the payload lies inside the acquired region.
    Ok(unsafe { base.add(block.payload(L::OVERHEAD)) })
  }

  fn split(
    &mut self,
    mut block: Block,
    size: usize,
  ) -> Result<Block> {
    let overhead = L::OVERHEAD;

    if block.size == size || block.size - size <= overhead + 1 {
      block.is_free = false;
      self.write(&block)?;
      self.stats.block_allocated(block.size);

      trace!(offset = block.offset, size = block.size, "allocated whole block");

      return Ok(block);
    }

    let sibling = Block::new(
      block.offset + overhead + size,
      block.size - size - overhead,
      true,
      block.next,
    );

    block.size = size;
    block.next = sibling.offset;
    block.is_free = false;

    self.write(&sibling)?;
    self.write(&block)?;
    self.stats.block_created(overhead);
    self.stats.block_allocated(size);

    trace!(
      offset = block.offset,
      size,
      remainder = sibling.size,
      "split block"
    );

    Ok(block)
  }

  /// Frees `ptr`. Anything that is not the payload of a live allocation is
  /// ignored.
  pub fn free(
    &mut self,
    ptr: *mut u8,
  ) {
    if let Err(err) = self.try_free(ptr) {
      debug!(%err, "free ignored");
    }
  }

  /// Frees `ptr` and merges the block with its free neighbors.
  ///
  /// Validation happens before anything is written, so a rejected pointer
  /// leaves the chain and counters untouched.
  pub fn try_free(
    &mut self,
    ptr: *mut u8,
  ) -> Result<()> {
    let mut block = self.validate(ptr)?;

    block.is_free = true;
    self.write(&block)?;
    self.stats.block_freed(block.size);

    let merged = match self.config.coalesce {
      CoalescePolicy::SuccessorOnly => usize::from(self.absorb_successor(block)?),
      CoalescePolicy::Transitive => {
        let mut merged = 0;
        loop {
          match self.merge_pass()? {
            0 => break merged,
            n => merged += n,
          }
        }
      }
    };

    trace!(offset = block.offset, size = block.size, merged, "freed block");
    self.verify();

    Ok(())
  }

  /// Resolves `ptr` to the allocated block whose payload starts there.
  ///
  /// The implied header must sit inside the pool and be exactly one of the
  /// headers reachable from the start of the chain.
  pub fn validate(
    &self,
    ptr: *const u8,
  ) -> Result<Block> {
    let base = self.base.ok_or(PoolError::NotInitialized)?;
    let addr = ptr as usize;
    let invalid = PoolError::InvalidPointer { addr };

    let start = base.as_ptr() as usize;
    if addr < start + L::OVERHEAD || addr >= start + self.capacity() {
      return Err(invalid);
    }

    let offset = addr - start - L::OVERHEAD;

    self
      .blocks()
      .take_while(|block| block.offset <= offset)
      .find(|block| block.offset == offset && !block.is_free)
      .ok_or(invalid)
  }

  /// Whether `ptr` is the payload of a currently allocated block.
  pub fn owns(
    &self,
    ptr: *const u8,
  ) -> bool {
    self.validate(ptr).is_ok()
  }

  fn absorb_successor(
    &mut self,
    block: Block,
  ) -> Result<bool> {
    let Some(base) = self.base else {
      return Ok(false);
    };

    if block.next >= self.capacity() {
      return Ok(false);
    }

    let successor = self.read(base, block.next);
    if !successor.is_free {
      return Ok(false);
    }

    let merged = Block::new(
      block.offset,
      block.size + L::OVERHEAD + successor.size,
      true,
      successor.next,
    );
    self.write(&merged)?;
    self.stats.block_merged(L::OVERHEAD);

    trace!(
      offset = merged.offset,
      absorbed = successor.offset,
      size = merged.size,
      "coalesced"
    );

    Ok(true)
  }

  /// One scan from the chain head merging every free run into its first block.
  fn merge_pass(&mut self) -> Result<usize> {
    let Some(base) = self.base else {
      return Ok(0);
    };

    let mut merged = 0;
    let mut offset = 0;

    while offset < self.capacity() {
      let block = self.read(base, offset);

      if block.is_free && self.absorb_successor(block)? {
        merged += 1;
        continue;
      }

      offset = block.next;
    }

    Ok(merged)
  }

  /// Recomputes the counters from a full traversal of the chain.
  pub fn recount(&self) -> Stats {
    self.blocks().fold(Stats::default(), |mut stats, block| {
      stats.total_blocks += 1;
      stats.bytes_in_use += L::OVERHEAD;

      if !block.is_free {
        stats.active_blocks += 1;
        stats.bytes_in_use += block.size;
      }

      stats
    })
  }

  /// Checks the chain against the pool invariants, describing the first
  /// violation found.
  pub fn check(&self) -> std::result::Result<(), String> {
    if !self.is_initialized() {
      if self.stats != Stats::default() {
        return Err(format!("uninitialized pool reports {}", self.stats));
      }

      return Ok(());
    }

    let mut covered = 0;
    let mut previous: Option<Block> = None;

    for block in self.blocks() {
      if block.offset != covered {
        return Err(format!("block at {} but previous block ends at {covered}", block.offset));
      }

      if block.next != block.end(L::OVERHEAD) {
        return Err(format!(
          "block at {} links to {} instead of {}",
          block.offset,
          block.next,
          block.end(L::OVERHEAD)
        ));
      }

      if let Some(prev) = previous
        && self.config.coalesce == CoalescePolicy::Transitive
        && prev.is_free
        && block.is_free
      {
        return Err(format!("adjacent free blocks at {} and {}", prev.offset, block.offset));
      }

      covered = block.end(L::OVERHEAD);
      previous = Some(block);
    }

    if covered != self.capacity() {
      return Err(format!("chain covers {covered} of {} bytes", self.capacity()));
    }

    let recount = self.recount();
    if recount != self.stats {
      return Err(format!("counters say [{}], traversal says [{recount}]", self.stats));
    }

    if self.stats.active_blocks > self.stats.total_blocks {
      return Err(format!("more active than total blocks: {}", self.stats));
    }

    Ok(())
  }

  fn verify(&self) {
    if !self.config.verify {
      return;
    }

    if let Err(problem) = self.check() {
      error!(%problem, "pool invariant violated");

      if cfg!(debug_assertions) {
        panic!("pool invariant violated: {problem}");
      }
    }
  }

  /// Renders the chain as `[addr](total:size:free)->...[end](END)`.
  pub fn dump(&self) -> Dump<'_, B, L> {
    Dump { pool: self }
  }

  fn read(
    &self,
    base: NonNull<u8>,
    offset: usize,
  ) -> Block {
    debug_assert!(offset + L::OVERHEAD <= self.capacity());

    // Safety: the header lies inside the acquired region.
    let bytes = unsafe { slice::from_raw_parts(base.as_ptr().add(offset), L::OVERHEAD) };

    L::read(offset, bytes)
  }

  fn write(
    &mut self,
    block: &Block,
  ) -> Result<()> {
    let base = self.base.ok_or(PoolError::NotInitialized)?;
    debug_assert!(block.offset + L::OVERHEAD <= self.capacity());

    // Safety: the header lies inside the acquired region and no payload
    // handed out to a caller overlaps it.
    let bytes = unsafe { slice::from_raw_parts_mut(base.as_ptr().add(block.offset), L::OVERHEAD) };

    L::write(block, bytes)
  }
}

impl<B: Backing, L: HeaderLayout> Drop for Pool<B, L> {
  fn drop(&mut self) {
    if let Err(err) = self.destroy() {
      error!(%err, "pool dropped without releasing its backing");
    }
  }
}

/// Iterator over the blocks of a pool in address order.
pub struct Blocks<'a, B: Backing, L: HeaderLayout> {
  pool: &'a Pool<B, L>,
  offset: usize,
}

impl<B: Backing, L: HeaderLayout> Iterator for Blocks<'_, B, L> {
  type Item = Block;

  fn next(&mut self) -> Option<Block> {
    let base = self.pool.base?;
    let capacity = self.pool.capacity();

    if self.offset + L::OVERHEAD > capacity {
      return None;
    }

    let block = self.pool.read(base, self.offset);

    // A link that does not move forward would loop forever.
    self.offset = if block.next > block.offset { block.next } else { capacity };

    Some(block)
  }
}

pub struct Dump<'a, B: Backing, L: HeaderLayout> {
  pool: &'a Pool<B, L>,
}

impl<B: Backing, L: HeaderLayout> fmt::Display for Dump<'_, B, L> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    let Some(base) = self.pool.base else {
      return write!(f, "(uninitialized)");
    };
    let start = base.as_ptr() as usize;

    for block in self.pool.blocks() {
      write!(
        f,
        "[{:#x}]({:x}:{}:{})->",
        start + block.offset,
        block.size + L::OVERHEAD,
        block.size,
        u8::from(block.is_free)
      )?;
    }

    write!(f, "[{:#x}](END)", start + self.pool.capacity())
  }
}

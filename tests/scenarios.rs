use poolalloc::{
  CoalescePolicy, HeaderLayout, LinkedLayout, PackedLayout, Pool, PoolConfig, PoolError, SliceBacking, Stats,
};
use proptest::prelude::*;

const CAPACITY: usize = 4096;

fn init_tracing() {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .with_test_writer()
    .try_init();
}

fn stats(
  total_blocks: usize,
  active_blocks: usize,
  bytes_in_use: usize,
) -> Stats {
  Stats {
    total_blocks,
    active_blocks,
    bytes_in_use,
  }
}

fn small_then_oversized<L: HeaderLayout>() {
  let h = L::OVERHEAD;
  let mut bytes = vec![0u8; CAPACITY];
  let mut pool = Pool::<_, L>::with_layout(SliceBacking::new(&mut bytes), PoolConfig::default());

  pool.init().unwrap();
  assert_eq!(stats(1, 0, h), pool.stat());

  let first = pool.alloc(4).unwrap();
  assert_eq!(stats(2, 1, 2 * h + 4), pool.stat());

  assert!(pool.alloc(6000).is_none());
  assert_eq!(stats(2, 1, 2 * h + 4), pool.stat());

  pool.free(first.as_ptr());
  assert_eq!(stats(1, 0, h), pool.stat());
  assert_eq!(Ok(()), pool.check());
}

#[test]
fn small_then_oversized_packed() {
  init_tracing();
  small_then_oversized::<PackedLayout>();
}

#[test]
fn small_then_oversized_linked() {
  init_tracing();
  small_then_oversized::<LinkedLayout>();
}

fn two_kilobytes_back<L: HeaderLayout>(
  coalesce: CoalescePolicy,
  reverse: bool,
) {
  let h = L::OVERHEAD;
  let mut bytes = vec![0u8; CAPACITY];
  let config = PoolConfig::default().with_coalesce(coalesce);
  let mut pool = Pool::<_, L>::with_layout(SliceBacking::new(&mut bytes), config);
  pool.init().unwrap();

  let a = pool.alloc(1024).unwrap();
  let b = pool.alloc(1024).unwrap();
  assert_eq!(stats(3, 2, 3 * h + 2048), pool.stat());

  let sizes: Vec<_> = pool.blocks().map(|block| (block.size, block.is_free)).collect();
  assert_eq!(
    vec![(1024, false), (1024, false), (CAPACITY - 3 * h - 2048, true)],
    sizes
  );

  let order = if reverse { [b, a] } else { [a, b] };
  for ptr in order {
    pool.free(ptr.as_ptr());
  }

  assert_eq!(stats(1, 0, h), pool.stat());
  assert_eq!(CAPACITY - h, pool.blocks().next().unwrap().size);
}

#[test]
fn two_kilobytes_back_transitive() {
  two_kilobytes_back::<PackedLayout>(CoalescePolicy::Transitive, false);
  two_kilobytes_back::<PackedLayout>(CoalescePolicy::Transitive, true);
  two_kilobytes_back::<LinkedLayout>(CoalescePolicy::Transitive, false);
}

#[test]
fn two_kilobytes_back_successor_only() {
  // Freeing back to front lets every block find a free successor.
  two_kilobytes_back::<PackedLayout>(CoalescePolicy::SuccessorOnly, true);
  two_kilobytes_back::<LinkedLayout>(CoalescePolicy::SuccessorOnly, true);
}

#[test]
fn operations_before_init() {
  let mut bytes = vec![0u8; CAPACITY];
  let mut pool = Pool::new(SliceBacking::new(&mut bytes), PoolConfig::default());

  assert_eq!(Stats::default(), pool.stat());
  assert!(pool.alloc(8).is_none());
  assert!(matches!(pool.try_free(std::ptr::null_mut()), Err(PoolError::NotInitialized)));
  pool.free(std::ptr::null_mut());
  assert!(pool.destroy().is_ok());
  assert_eq!(Stats::default(), pool.stat());
  assert!(!pool.is_initialized());
}

#[test]
fn undersized_slice_is_a_backing_failure() {
  let mut bytes = vec![0u8; 100];
  let mut pool = Pool::new(SliceBacking::new(&mut bytes), PoolConfig::default());

  let err = pool.init().unwrap_err();
  assert!(matches!(err, PoolError::BackingStoreFailure { .. }));
  assert!(!err.is_recoverable());
  assert!(!pool.is_initialized());
}

#[test]
fn capacity_too_small_for_a_header() {
  let mut bytes = vec![0u8; 16];
  let config = PoolConfig::default().with_capacity(16);
  let mut pool = Pool::<_, LinkedLayout>::with_layout(SliceBacking::new(&mut bytes), config);

  assert!(matches!(pool.init(), Err(PoolError::InvalidConfig(_))));
}

#[cfg(unix)]
#[test]
fn mapped_pool_lifecycle() {
  init_tracing();

  let mut pool = Pool::mapped(PoolConfig::default());
  pool.init().unwrap();

  let ptr = pool.alloc(512).unwrap();
  unsafe {
    ptr.as_ptr().write_bytes(0x5A, 512);
    assert_eq!(0x5A, *ptr.as_ptr().add(511));
  }
  assert!(pool.owns(ptr.as_ptr()));
  assert_eq!(1, pool.stat().active_blocks);

  pool.destroy().unwrap();
  assert_eq!(Stats::default(), pool.stat());
  assert!(pool.alloc(1).is_none());

  pool.init().unwrap();
  assert_eq!(stats(1, 0, PackedLayout::OVERHEAD), pool.stat());
}

#[test]
fn fragmented_pool_passes_admission_but_finds_nothing() {
  let mut bytes = vec![0u8; 256];
  let config = PoolConfig::default().with_capacity(256);
  let mut pool = Pool::new(SliceBacking::new(&mut bytes), config);
  pool.init().unwrap();

  let ptrs: Vec<_> = std::iter::from_fn(|| pool.alloc(28)).collect();
  assert!(ptrs.len() >= 4);

  for ptr in ptrs.iter().step_by(2) {
    pool.free(ptr.as_ptr());
  }

  let before = pool.stat();
  let request = 60;
  assert!(pool.capacity() - before.bytes_in_use >= request);
  assert!(matches!(pool.try_alloc(request), Err(PoolError::OutOfMemory { .. })));
  assert_eq!(before, pool.stat());
}

#[derive(Debug, Clone)]
enum Op {
  Alloc(usize),
  Free(usize),
  FreeInterior(usize, usize),
}

fn op() -> impl Strategy<Value = Op> {
  prop_oneof![
    3 => (1usize..700).prop_map(Op::Alloc),
    2 => any::<usize>().prop_map(Op::Free),
    1 => (any::<usize>(), 1usize..16).prop_map(|(index, delta)| Op::FreeInterior(index, delta)),
  ]
}

fn run<L: HeaderLayout>(
  coalesce: CoalescePolicy,
  ops: &[Op],
) -> Result<(), TestCaseError> {
  let mut bytes = vec![0u8; CAPACITY];
  let start = bytes.as_ptr() as usize;
  let config = PoolConfig::default().with_coalesce(coalesce).with_verify(true);
  let mut pool = Pool::<_, L>::with_layout(SliceBacking::new(&mut bytes), config);
  pool.init().unwrap();

  let mut live: Vec<(*mut u8, usize, u8)> = Vec::new();
  let mut tag = 0u8;

  for op in ops {
    let before = pool.stat();

    match *op {
      Op::Alloc(size) => {
        if let Some(ptr) = pool.alloc(size) {
          let addr = ptr.as_ptr() as usize;
          let block = pool.validate(ptr.as_ptr()).unwrap();

          prop_assert!(block.size >= size);
          prop_assert!(addr + block.size <= start + CAPACITY);

          tag = tag.wrapping_add(1);
          unsafe { ptr.as_ptr().write_bytes(tag, size) };
          live.push((ptr.as_ptr(), size, tag));
        } else {
          prop_assert_eq!(before, pool.stat());
        }
      }
      Op::Free(index) if !live.is_empty() => {
        let (ptr, size, tag) = live.swap_remove(index % live.len());
        let payload = unsafe { std::slice::from_raw_parts(ptr, size) };
        prop_assert!(payload.iter().all(|byte| *byte == tag));

        pool.free(ptr);
        prop_assert_eq!(before.active_blocks - 1, pool.stat().active_blocks);

        let after = pool.stat();
        pool.free(ptr);
        prop_assert_eq!(after, pool.stat());
      }
      Op::FreeInterior(index, delta) if !live.is_empty() => {
        let (ptr, size, _) = live[index % live.len()];
        if size > 1 {
          pool.free(ptr.wrapping_add(1 + delta % (size - 1)));
          prop_assert_eq!(before, pool.stat());
        }
      }
      _ => {}
    }

    let now = pool.stat();
    prop_assert!(now.active_blocks <= now.total_blocks);
    prop_assert_eq!(now, pool.recount());
    prop_assert_eq!(
      CAPACITY,
      pool.blocks().map(|block| L::OVERHEAD + block.size).sum::<usize>()
    );
    prop_assert_eq!(Ok(()), pool.check());
  }

  for (ptr, ..) in live.drain(..) {
    pool.free(ptr);
  }
  if coalesce == CoalescePolicy::Transitive {
    prop_assert_eq!(stats(1, 0, L::OVERHEAD), pool.stat());
  }

  Ok(())
}

proptest! {
  #[test]
  fn invariants_hold_packed_transitive(ops in prop::collection::vec(op(), 1..80)) {
    run::<PackedLayout>(CoalescePolicy::Transitive, &ops)?;
  }

  #[test]
  fn invariants_hold_packed_successor_only(ops in prop::collection::vec(op(), 1..80)) {
    run::<PackedLayout>(CoalescePolicy::SuccessorOnly, &ops)?;
  }

  #[test]
  fn invariants_hold_linked_successor_only(ops in prop::collection::vec(op(), 1..80)) {
    run::<LinkedLayout>(CoalescePolicy::SuccessorOnly, &ops)?;
  }

  #[test]
  fn invariants_hold_linked_transitive(ops in prop::collection::vec(op(), 1..80)) {
    run::<LinkedLayout>(CoalescePolicy::Transitive, &ops)?;
  }
}

//! The bounded, zero-copy Sample pool (§4.1).
//!
//! A `Pool` owns `N` [`Sample`](crate::sample::Sample) slots of identical
//! value capacity in one contiguous allocation, so a sample can be
//! compared by pointer/index arithmetic back to its owning pool (the
//! "cyclic pool↔sample back-pointer" redesign note in DESIGN.md: the
//! back-pointer is a plain index, not an owning handle, so samples can
//! never outlive their pool).
//!
//! Free-slot bookkeeping is a lock-free Treiber stack (`FreeList` below),
//! tagged with a generation counter to avoid the ABA problem that a bare
//! index-CAS would suffer from under reuse. This is the one place in the
//! crate that earns hand-rolled atomics, in the spirit of the teacher's
//! `data/ring_buffer.rs`; everywhere else we reach for `crossbeam`/
//! `parking_lot` instead of re-deriving lock-free code.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::sample::{Sample, SlotData};
use crate::signal::SignalDesc;

const NIL: u32 = u32::MAX;

/// Packs a free-list head into a single `AtomicU64`: low 32 bits are the
/// slot index (or `NIL`), high 32 bits are a generation tag bumped on
/// every push/pop so a stale CAS operand can never silently succeed after
/// the same index has been pushed and popped again in between.
fn pack(index: u32, tag: u32) -> u64 {
    (u64::from(tag) << 32) | u64::from(index)
}

fn unpack(word: u64) -> (u32, u32) {
    (word as u32, (word >> 32) as u32)
}

struct FreeList {
    head: AtomicU64,
    /// Intrusive singly-linked list of free indices; `next[i]` is the slot
    /// that follows `i` on the free list (or `NIL`).
    next: Box<[AtomicU32]>,
}

impl FreeList {
    fn new(capacity: usize) -> Self {
        let next: Box<[AtomicU32]> = (0..capacity)
            .map(|i| {
                if i + 1 < capacity {
                    AtomicU32::new((i + 1) as u32)
                } else {
                    AtomicU32::new(NIL)
                }
            })
            .collect();
        let head = if capacity == 0 {
            pack(NIL, 0)
        } else {
            pack(0, 0)
        };
        Self {
            head: AtomicU64::new(head),
            next,
        }
    }

    /// Pop one free index. Wait-free on uncontended hardware: a single
    /// load + CAS with no retry loop beyond contention from other pops.
    fn pop(&self) -> Option<u32> {
        let mut current = self.head.load(Ordering::Acquire);
        loop {
            let (index, tag) = unpack(current);
            if index == NIL {
                return None;
            }
            let next = self.next[index as usize].load(Ordering::Relaxed);
            let new_head = pack(next, tag.wrapping_add(1));
            match self.head.compare_exchange_weak(
                current,
                new_head,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(index),
                Err(observed) => current = observed,
            }
        }
    }

    fn push(&self, index: u32) {
        let mut current = self.head.load(Ordering::Acquire);
        loop {
            let (head_index, tag) = unpack(current);
            self.next[index as usize].store(head_index, Ordering::Relaxed);
            let new_head = pack(index, tag.wrapping_add(1));
            match self.head.compare_exchange_weak(
                current,
                new_head,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }
}

/// Backing storage for `N` samples of identical `capacity`, shared by every
/// outstanding `Sample` handle drawn from this pool.
pub(crate) struct PoolInner {
    pub(crate) capacity: usize,
    pub(crate) sample_capacity: usize,
    pub(crate) slots: Box<[Mutex<SlotData>]>,
    pub(crate) refcounts: Box<[AtomicU32]>,
    free: FreeList,
}

/// A fixed-capacity allocator of uniformly sized [`Sample`](crate::sample::Sample)s.
///
/// Cheap to clone (an `Arc` around the shared backing storage); every Path
/// owns exactly one Pool (§3 Ownership).
#[derive(Clone)]
pub struct Pool {
    pub(crate) inner: Arc<PoolInner>,
}

impl Pool {
    /// Create a pool of `capacity` samples, each able to hold up to
    /// `sample_capacity` values.
    pub fn new(capacity: usize, sample_capacity: usize) -> Self {
        let slots: Box<[Mutex<SlotData>]> = (0..capacity)
            .map(|_| Mutex::new(SlotData::empty(sample_capacity)))
            .collect();
        let refcounts: Box<[AtomicU32]> = (0..capacity).map(|_| AtomicU32::new(0)).collect();
        Self {
            inner: Arc::new(PoolInner {
                capacity,
                sample_capacity,
                slots,
                refcounts,
                free: FreeList::new(capacity),
            }),
        }
    }

    /// Total number of slots owned by this pool.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of value slots each sample can hold.
    pub fn sample_capacity(&self) -> usize {
        self.inner.sample_capacity
    }

    /// Number of slots currently free (best-effort, racy under concurrent use).
    pub fn free_count(&self) -> usize {
        let mut count = 0;
        let mut current = self.inner.free.head.load(Ordering::Acquire);
        loop {
            let (index, _) = unpack(current);
            if index == NIL {
                break;
            }
            count += 1;
            current = pack(
                self.inner.free.next[index as usize].load(Ordering::Relaxed),
                0,
            );
        }
        count
    }

    /// Acquire up to `n` free samples. Returns fewer than `n` (possibly
    /// zero) on exhaustion rather than blocking — back-pressure surfaces
    /// as a pool-underrun warning to the caller, per §4.1.
    pub fn acquire(&self, n: usize, signals: Arc<Vec<SignalDesc>>) -> Vec<Sample> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            match self.inner.free.pop() {
                Some(index) => {
                    self.inner.refcounts[index as usize].store(1, Ordering::Release);
                    {
                        let mut slot = self.inner.slots[index as usize].lock();
                        slot.reset_metadata(signals.clone());
                    }
                    out.push(Sample::from_pool(self.inner.clone(), index));
                }
                None => break,
            }
        }
        out
    }

    /// Return `samples` to this pool. Fails with [`crate::error::GatewayError::ForeignSample`]
    /// if any sample does not belong to this pool's backing storage.
    pub fn release(&self, samples: Vec<Sample>) -> crate::error::Result<()> {
        for sample in samples {
            if !Arc::ptr_eq(&sample.pool, &self.inner) {
                return Err(crate::error::GatewayError::ForeignSample);
            }
            // Dropping the sample runs the refcount-to-zero path, which
            // returns the slot to the free list.
            drop(sample);
        }
        Ok(())
    }
}

pub(crate) fn release_to_pool(pool: &Arc<PoolInner>, index: u32) {
    pool.free.push(index);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_never_exceeds_capacity() {
        let pool = Pool::new(4, 1);
        let signals = Arc::new(vec![]);
        let first = pool.acquire(4, signals.clone());
        assert_eq!(first.len(), 4);
        let second = pool.acquire(1, signals);
        assert_eq!(second.len(), 0, "pool must not block, just return fewer");
    }

    #[test]
    fn released_samples_return_to_free_list() {
        let pool = Pool::new(2, 1);
        let signals = Arc::new(vec![]);
        let samples = pool.acquire(2, signals.clone());
        assert_eq!(pool.free_count(), 0);
        drop(samples);
        assert_eq!(pool.free_count(), 2);
        let more = pool.acquire(2, signals);
        assert_eq!(more.len(), 2);
    }

    #[test]
    fn foreign_sample_release_is_rejected() {
        let pool_a = Pool::new(1, 1);
        let pool_b = Pool::new(1, 1);
        let signals = Arc::new(vec![]);
        let sample = pool_a.acquire(1, signals);
        let err = pool_b.release(sample).unwrap_err();
        assert!(matches!(err, crate::error::GatewayError::ForeignSample));
    }

    #[test]
    fn free_list_survives_acquire_release_churn() {
        let pool = Pool::new(8, 1);
        let signals = Arc::new(vec![]);
        for _ in 0..1000 {
            let samples = pool.acquire(8, signals.clone());
            assert_eq!(samples.len(), 8);
            drop(samples);
        }
        assert_eq!(pool.free_count(), 8);
    }
}

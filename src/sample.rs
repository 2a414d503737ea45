//! The Sample type: a time-stamped, reference-counted value vector (§3).

use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::node::NodeHandle;
use crate::pool::{release_to_pool, PoolInner};
use crate::signal::{SignalDesc, Value};

/// Nanosecond-resolution timestamp pair carried by every sample: when the
/// value was produced at its origin, and when this process received it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamps {
    pub origin_ns: u64,
    pub received_ns: u64,
}

impl Timestamps {
    pub fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0)
    }
}

/// The mutable data backing one pool slot. Reused in place across
/// acquire/release cycles; only metadata is zeroed on reuse (§4.1).
pub(crate) struct SlotData {
    pub sequence: u64,
    pub timestamps: Timestamps,
    pub source: Option<Weak<NodeHandle>>,
    pub signals: Arc<Vec<SignalDesc>>,
    pub values: Vec<Value>,
    pub length: usize,
}

impl SlotData {
    pub fn empty(capacity: usize) -> Self {
        Self {
            sequence: 0,
            timestamps: Timestamps {
                origin_ns: 0,
                received_ns: 0,
            },
            source: None,
            signals: Arc::new(Vec::new()),
            values: vec![Value::Float(0.0); capacity],
            length: 0,
        }
    }

    /// Reset only sequence/length/signals — value storage is left as-is
    /// until the producer writes it (§4.1: "value storage is undefined
    /// until written").
    pub fn reset_metadata(&mut self, signals: Arc<Vec<SignalDesc>>) {
        self.sequence = 0;
        self.length = 0;
        self.signals = signals;
        self.timestamps = Timestamps {
            origin_ns: 0,
            received_ns: 0,
        };
        self.source = None;
    }
}

/// A single time-stamped vector of typed values travelling through a path.
///
/// Cloning a `Sample` increments its reference count rather than copying
/// storage (the "zero-copy" in the pool's name); the underlying slot is
/// returned to its [`Pool`](crate::pool::Pool) only once the last clone is
/// dropped. A producer may freely mutate the sample between acquiring it
/// and its first enqueue; after that point every consumer treats it as
/// read-only, so no internal locking is needed on the hot read path beyond
/// the pool's own slot mutex used for the write itself.
pub struct Sample {
    pub(crate) pool: Arc<PoolInner>,
    pub(crate) index: u32,
}

impl Sample {
    pub(crate) fn from_pool(pool: Arc<PoolInner>, index: u32) -> Self {
        Self { pool, index }
    }

    /// Index into the owning pool's backing array. Two samples compare
    /// equal in identity terms iff they share a pool and this index.
    pub fn pool_index(&self) -> u32 {
        self.index
    }

    pub fn sequence(&self) -> u64 {
        self.pool.slots[self.index as usize].lock().sequence
    }

    pub fn set_sequence(&self, seq: u64) {
        self.pool.slots[self.index as usize].lock().sequence = seq;
    }

    pub fn timestamps(&self) -> Timestamps {
        self.pool.slots[self.index as usize].lock().timestamps
    }

    pub fn set_origin_timestamp(&self, origin_ns: u64) {
        let mut slot = self.pool.slots[self.index as usize].lock();
        slot.timestamps.origin_ns = origin_ns;
        slot.timestamps.received_ns = Timestamps::now();
    }

    pub fn length(&self) -> usize {
        self.pool.slots[self.index as usize].lock().length
    }

    pub fn capacity(&self) -> usize {
        self.pool.sample_capacity
    }

    pub fn signals(&self) -> Arc<Vec<SignalDesc>> {
        self.pool.slots[self.index as usize].lock().signals.clone()
    }

    pub fn set_source(&self, source: Weak<NodeHandle>) {
        self.pool.slots[self.index as usize].lock().source = Some(source);
    }

    pub fn source(&self) -> Option<Weak<NodeHandle>> {
        self.pool.slots[self.index as usize].lock().source.clone()
    }

    /// Overwrite the full value vector. `values.len()` becomes the new
    /// length and must not exceed the sample's capacity.
    pub fn set_values(&self, values: &[Value]) {
        debug_assert!(values.len() <= self.capacity());
        let mut slot = self.pool.slots[self.index as usize].lock();
        let n = values.len().min(slot.values.len());
        slot.values[..n].copy_from_slice(&values[..n]);
        slot.length = n;
    }

    /// Read back the currently populated values (`[0, length)`).
    pub fn values(&self) -> Vec<Value> {
        let slot = self.pool.slots[self.index as usize].lock();
        slot.values[..slot.length].to_vec()
    }

    /// Copy `other`'s metadata and values into `self` in place. Used by
    /// hooks that must materialize a transformed sample without mutating
    /// storage still visible to a trailing reader cursor (§4.3).
    pub fn copy_from(&self, other: &Sample) {
        let src = other.pool.slots[other.index as usize].lock();
        let mut dst = self.pool.slots[self.index as usize].lock();
        dst.sequence = src.sequence;
        dst.timestamps = src.timestamps;
        dst.source = src.source.clone();
        dst.signals = src.signals.clone();
        dst.length = src.length;
        let n = src.values.len().min(dst.values.len());
        dst.values[..n].copy_from_slice(&src.values[..n]);
    }
}

impl Clone for Sample {
    fn clone(&self) -> Self {
        self.pool.refcounts[self.index as usize].fetch_add(1, Ordering::AcqRel);
        Self {
            pool: self.pool.clone(),
            index: self.index,
        }
    }
}

impl Drop for Sample {
    fn drop(&mut self) {
        let prev = self.pool.refcounts[self.index as usize].fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev >= 1, "sample refcount underflow");
        if prev == 1 {
            release_to_pool(&self.pool, self.index);
        }
    }
}

impl std::fmt::Debug for Sample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sample")
            .field("index", &self.index)
            .field("sequence", &self.sequence())
            .field("length", &self.length())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Pool;

    #[test]
    fn clone_keeps_slot_alive_until_all_drop() {
        let pool = Pool::new(1, 2);
        let signals = Arc::new(vec![]);
        let sample = pool.acquire(1, signals).pop().unwrap();
        let clone = sample.clone();
        drop(sample);
        assert_eq!(pool.free_count(), 0, "clone still holds the slot");
        drop(clone);
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn set_and_read_values_round_trip() {
        let pool = Pool::new(1, 3);
        let signals = Arc::new(vec![]);
        let sample = pool.acquire(1, signals).pop().unwrap();
        sample.set_values(&[Value::Float(1.0), Value::Float(2.0)]);
        assert_eq!(sample.length(), 2);
        assert_eq!(sample.values(), vec![Value::Float(1.0), Value::Float(2.0)]);
    }

    #[test]
    fn copy_from_duplicates_metadata_without_sharing_slot() {
        let pool = Pool::new(2, 2);
        let signals = Arc::new(vec![]);
        let mut samples = pool.acquire(2, signals);
        let src = samples.remove(0);
        let dst = samples.remove(0);
        src.set_sequence(42);
        src.set_values(&[Value::Integer(7)]);
        dst.copy_from(&src);
        assert_eq!(dst.sequence(), 42);
        assert_eq!(dst.values(), vec![Value::Integer(7)]);
        assert_ne!(dst.pool_index(), src.pool_index());
    }
}

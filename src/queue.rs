//! Bounded multi-reader single-writer sample queue (§4.2).
//!
//! Unlike the teacher's `data/ring_buffer.rs` (a single-reader SPSC ring),
//! a path's queue must serve every destination node its own read cursor
//! over the same backing storage, so a slow reader cannot stall a fast
//! one and a fast reader cannot see slots a slow one hasn't released yet.
//! Storage is released only once the slowest reader has passed a slot
//! (`min_i R_i`), which is also the point at which `W - min_i R_i <= Q`
//! stops holding and the writer must start dropping (§4.2 overflow rule).

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::sample::Sample;

/// Handle returned by [`Queue::register_reader`] identifying one reader's
/// cursor.
pub type ReaderId = usize;

struct ReaderCursor {
    position: AtomicU64,
}

/// A bounded ring of capacity `Q` with one write cursor and `N` read
/// cursors, one per registered destination.
///
/// Readers must all be registered before the first `push_many` call
/// (§4.2: "readers are fixed for the lifetime of an active queue");
/// registering afterwards returns [`crate::error::GatewayError::LateRegistration`].
pub struct Queue {
    capacity: usize,
    slots: Mutex<Vec<Option<Sample>>>,
    write_cursor: AtomicU64,
    readers: Mutex<Vec<ReaderCursor>>,
    active: AtomicU64,
    path_name: String,
}

impl Queue {
    pub fn new(path_name: impl Into<String>, capacity: usize) -> Self {
        Self {
            capacity,
            slots: Mutex::new((0..capacity).map(|_| None).collect()),
            write_cursor: AtomicU64::new(0),
            readers: Mutex::new(Vec::new()),
            active: AtomicU64::new(0),
            path_name: path_name.into(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Register a new reader cursor, initialized to the current write
    /// position so it only sees samples pushed from now on.
    pub fn register_reader(&self) -> crate::error::Result<ReaderId> {
        if self.active.load(Ordering::Acquire) != 0 {
            return Err(crate::error::GatewayError::LateRegistration(
                self.path_name.clone(),
            ));
        }
        let mut readers = self.readers.lock();
        let position = self.write_cursor.load(Ordering::Acquire);
        readers.push(ReaderCursor {
            position: AtomicU64::new(position),
        });
        Ok(readers.len() - 1)
    }

    fn min_reader_position(&self, readers: &[ReaderCursor]) -> u64 {
        readers
            .iter()
            .map(|r| r.position.load(Ordering::Acquire))
            .min()
            .unwrap_or_else(|| self.write_cursor.load(Ordering::Acquire))
    }

    /// Push `samples` onto the queue. Returns the number actually
    /// accepted: once `W - min_i R_i == Q` the writer stops, so
    /// `pushed <= samples.len()` and the caller is expected to report the
    /// delta as an overflow (§4.2, §8 scenario 3). Samples that don't fit
    /// are dropped by this call returning ownership's drop glue, which
    /// releases them back to their pool (§9 Open Question (a)).
    pub fn push_many(&self, samples: Vec<Sample>) -> usize {
        self.active.store(1, Ordering::Release);
        let mut slots = self.slots.lock();
        let readers = self.readers.lock();
        let mut pushed = 0;
        for sample in samples {
            let w = self.write_cursor.load(Ordering::Acquire);
            let min_r = self.min_reader_position(&readers);
            if w.saturating_sub(min_r) >= self.capacity as u64 {
                // Queue full relative to the slowest reader: stop
                // accepting. `sample` drops here, returning its slot to
                // the owning pool.
                break;
            }
            let idx = (w as usize) % self.capacity;
            slots[idx] = Some(sample);
            self.write_cursor.store(w + 1, Ordering::Release);
            pushed += 1;
        }
        pushed
    }

    /// Pull up to `max` samples for `reader`, advancing its cursor.
    pub fn pull_many(&self, reader: ReaderId, max: usize) -> Vec<Sample> {
        let slots = self.slots.lock();
        let readers = self.readers.lock();
        let cursor = &readers[reader];
        let mut pos = cursor.position.load(Ordering::Acquire);
        let w = self.write_cursor.load(Ordering::Acquire);
        let mut out = Vec::new();
        while out.len() < max && pos < w {
            let idx = (pos as usize) % self.capacity;
            if let Some(sample) = slots[idx].clone() {
                out.push(sample);
            }
            pos += 1;
        }
        cursor.position.store(pos, Ordering::Release);
        out
    }

    /// Non-advancing read of up to `max` samples starting at `reader`'s
    /// current position, for hooks/diagnostics that need history without
    /// consuming it.
    pub fn peek(&self, reader: ReaderId, max: usize) -> Vec<Sample> {
        let slots = self.slots.lock();
        let readers = self.readers.lock();
        let cursor = &readers[reader];
        let mut pos = cursor.position.load(Ordering::Acquire);
        let w = self.write_cursor.load(Ordering::Acquire);
        let mut out = Vec::new();
        while out.len() < max && pos < w {
            let idx = (pos as usize) % self.capacity;
            if let Some(sample) = slots[idx].clone() {
                out.push(sample);
            }
            pos += 1;
        }
        out
    }

    /// Advance `reader`'s cursor by `k` without reading, used after a
    /// non-advancing [`Queue::peek`] once the caller knows how many of
    /// the peeked samples it actually consumed (e.g. a partial write).
    /// Never advances past the current write cursor.
    pub fn advance_reader(&self, reader: ReaderId, k: usize) {
        let readers = self.readers.lock();
        let cursor = &readers[reader];
        let pos = cursor.position.load(Ordering::Acquire);
        let w = self.write_cursor.load(Ordering::Acquire);
        let new_pos = (pos + k as u64).min(w);
        cursor.position.store(new_pos, Ordering::Release);
    }

    /// Number of unread samples for `reader`.
    pub fn pending(&self, reader: ReaderId) -> u64 {
        let readers = self.readers.lock();
        let w = self.write_cursor.load(Ordering::Acquire);
        w - readers[reader].position.load(Ordering::Acquire)
    }

    pub fn reader_count(&self) -> usize {
        self.readers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Pool;
    use std::sync::Arc;

    fn make_samples(pool: &Pool, n: usize) -> Vec<Sample> {
        pool.acquire(n, Arc::new(vec![]))
    }

    #[test]
    fn late_registration_is_rejected() {
        let queue = Queue::new("p1", 4);
        let pool = Pool::new(4, 1);
        queue.register_reader().unwrap();
        queue.push_many(make_samples(&pool, 1));
        assert!(queue.register_reader().is_err());
    }

    #[test]
    fn independent_readers_advance_independently() {
        let queue = Queue::new("p1", 4);
        let pool = Pool::new(8, 1);
        let fast = queue.register_reader().unwrap();
        let slow = queue.register_reader().unwrap();
        queue.push_many(make_samples(&pool, 3));
        assert_eq!(queue.pull_many(fast, 10).len(), 3);
        assert_eq!(queue.pending(fast), 0);
        assert_eq!(queue.pending(slow), 3);
        assert_eq!(queue.pull_many(slow, 1).len(), 1);
        assert_eq!(queue.pending(slow), 2);
    }

    #[test]
    fn overflow_truncates_the_push_once_the_slowest_reader_is_a_full_queue_behind() {
        let queue = Queue::new("p1", 4);
        let pool = Pool::new(8, 1);
        let reader = queue.register_reader().unwrap();
        assert_eq!(queue.push_many(make_samples(&pool, 4)).min(4), 4);
        // Reader hasn't pulled anything yet: the queue is now full
        // relative to its own cursor, so a further push truncates.
        let pushed = queue.push_many(make_samples(&pool, 2));
        assert_eq!(pushed, 0, "writer must truncate, not overwrite unread data");
        assert_eq!(queue.pull_many(reader, 10).len(), 4);
    }

    #[test]
    fn overflow_truncation_reports_a_partial_count_mid_batch() {
        // Queue length 4: pushing 6 in one batch with nothing read yet
        // must accept exactly 4 and truncate the remaining 2 (§8 scenario 3).
        let queue = Queue::new("p1", 4);
        let pool = Pool::new(8, 1);
        let _reader = queue.register_reader().unwrap();
        let pushed = queue.push_many(make_samples(&pool, 6));
        assert_eq!(pushed, 4);
    }

    #[test]
    fn advance_reader_moves_cursor_by_exactly_k() {
        let queue = Queue::new("p1", 4);
        let pool = Pool::new(4, 1);
        let reader = queue.register_reader().unwrap();
        queue.push_many(make_samples(&pool, 3));
        let peeked = queue.peek(reader, 10);
        assert_eq!(peeked.len(), 3);
        assert_eq!(queue.pending(reader), 3, "peek alone must not advance");
        queue.advance_reader(reader, 2);
        assert_eq!(queue.pending(reader), 1);
    }

    #[test]
    fn peek_does_not_advance_cursor() {
        let queue = Queue::new("p1", 4);
        let pool = Pool::new(4, 1);
        let reader = queue.register_reader().unwrap();
        queue.push_many(make_samples(&pool, 2));
        assert_eq!(queue.peek(reader, 10).len(), 2);
        assert_eq!(queue.pending(reader), 2, "peek must not consume");
        assert_eq!(queue.pull_many(reader, 10).len(), 2);
    }
}

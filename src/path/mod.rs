//! Path: the directional pipe between a source node and one or more
//! destination nodes, with hooks, a bounded queue, and optional
//! rate-controlled output (§4.4, §4.5).
//!
//! Each running path owns exactly one receive thread and, when a rate is
//! configured, one send thread shared across every destination — not
//! async tasks, and not one send thread per destination. §4.4 describes
//! a single send routine that walks the destination list in configured
//! order each tick; §4.5 mandates blocking `Node::read`/`Node::write`
//! calls, which would each tie up a whole executor worker if run under
//! `tokio`. Real OS threads, one per path role, keep the blocking model
//! honest instead of fighting it. This is a deliberate divergence from
//! the teacher's async-heavy style (`async_trait` adapters driven from a
//! tokio runtime), not a default continuation of it.

pub mod timer;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use parking_lot::Mutex as PLMutex;
use tracing::{info, warn};

use crate::error::{GatewayError, Result};
use crate::hook::{HookChain, HookKind};
use crate::node::Node;
use crate::pool::Pool;
use crate::queue::{Queue, ReaderId};
use crate::sample::Sample;
use crate::stats::PathStats;
use timer::RateTimer;

/// A path's lifecycle (§4.5): `created` is a fully configured-but-inert
/// path, `prepared` has registered its readers on the queue, `running`
/// has live threads, `stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathState {
    Created,
    Prepared,
    Running,
    Stopped,
}

struct Destination {
    node: Arc<Mutex<Box<dyn Node>>>,
    reader: ReaderId,
    /// The last batch actually written to this destination, kept so a
    /// rate-controlled send thread can resend it verbatim when no new
    /// samples have arrived since the previous tick (§4.4 "Resend").
    last_sent: PLMutex<Vec<Sample>>,
    /// Captured during `prepare`; invoked by `Path::stop` to unblock a
    /// send thread parked inside this node's blocking `write`.
    waker: Option<crate::node::Waker>,
}

/// How a path delivers samples to its destinations.
pub enum DeliveryMode {
    /// Forward every sample to every destination as soon as it arrives,
    /// called inline from the receive thread (§4.5 step 6) — no separate
    /// send thread exists in this mode.
    OnArrival,
    /// Drain the queue and write to every destination on a fixed timer,
    /// run by one dedicated send thread, reporting overruns when the
    /// send routine falls behind and resending the last batch when
    /// nothing new has arrived since the previous tick.
    RateControlled(f64),
}

pub struct Path {
    name: String,
    source: Arc<Mutex<Box<dyn Node>>>,
    destinations: Vec<Destination>,
    queue: Arc<Queue>,
    pool: Pool,
    hooks: Arc<Mutex<HookChain>>,
    mode: DeliveryMode,
    state: Mutex<PathState>,
    shutdown: Arc<AtomicBool>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    stats: Arc<PathStats>,
    /// Captured during `prepare`; invoked by `Path::stop` to unblock the
    /// receive thread parked inside the source node's blocking `read`.
    source_waker: Option<crate::node::Waker>,
    /// Trailing accepted samples shared between the receive thread (which
    /// appends to it after `HOOK_PATH_READ`) and the write path (which
    /// reads it to give `PathWrite`/`NodeWrite` hooks the same history
    /// window read-side hooks get, §4.3: history windows are not
    /// kind-restricted).
    history: PLMutex<VecDeque<Sample>>,
}

impl Path {
    pub fn new(
        name: impl Into<String>,
        source: Box<dyn Node>,
        destinations: Vec<Box<dyn Node>>,
        queue_capacity: usize,
        sample_capacity: usize,
        hooks: HookChain,
        mode: DeliveryMode,
    ) -> Result<Self> {
        let name = name.into();
        if destinations.is_empty() {
            return Err(GatewayError::NoDestinations(name));
        }
        Ok(Self {
            queue: Arc::new(Queue::new(name.clone(), queue_capacity)),
            pool: Pool::new(queue_capacity.max(1) * 2, sample_capacity),
            source: Arc::new(Mutex::new(source)),
            destinations: destinations
                .into_iter()
                .map(|node| Destination {
                    node: Arc::new(Mutex::new(node)),
                    reader: 0,
                    last_sent: PLMutex::new(Vec::new()),
                    waker: None,
                })
                .collect(),
            hooks: Arc::new(Mutex::new(hooks)),
            mode,
            state: Mutex::new(PathState::Created),
            shutdown: Arc::new(AtomicBool::new(false)),
            threads: Mutex::new(Vec::new()),
            stats: Arc::new(PathStats::default()),
            source_waker: None,
            history: PLMutex::new(VecDeque::new()),
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared counters for this path, for a stats reporter to poll.
    pub fn stats(&self) -> Arc<PathStats> {
        self.stats.clone()
    }

    pub fn state(&self) -> PathState {
        *self.state.lock().expect("path state mutex poisoned")
    }

    /// Register one reader cursor per destination. Must run before
    /// [`Path::start`] (the queue rejects late registration, §4.2).
    pub fn prepare(&mut self) -> Result<()> {
        let mut state = self.state.lock().expect("path state mutex poisoned");
        if *state != PathState::Created {
            return Err(GatewayError::Fatal {
                path: self.name.clone(),
                message: "prepare called out of order".to_string(),
            });
        }
        for dest in &mut self.destinations {
            dest.reader = self.queue.register_reader()?;
        }
        {
            let mut hooks = self.hooks.lock().expect("hook chain mutex poisoned");
            hooks.init_all()?;
            hooks.check_all()?;
        }
        self.source_waker = self
            .source
            .lock()
            .expect("source node mutex poisoned")
            .waker();
        for dest in &mut self.destinations {
            dest.waker = dest
                .node
                .lock()
                .expect("destination node mutex poisoned")
                .waker();
        }
        *state = PathState::Prepared;
        Ok(())
    }

    /// Spawn the receive thread and, for rate-controlled paths, the one
    /// shared send thread.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.state.lock().expect("path state mutex poisoned");
            if *state != PathState::Prepared {
                return Err(GatewayError::Fatal {
                    path: self.name.clone(),
                    message: "start called before prepare".to_string(),
                });
            }
            *state = PathState::Running;
        }
        self.hooks
            .lock()
            .expect("hook chain mutex poisoned")
            .start_all()?;

        let mut threads = self.threads.lock().expect("thread list mutex poisoned");

        let recv_path = Arc::clone(self);
        threads.push(
            std::thread::Builder::new()
                .name(format!("path-{}-recv", self.name))
                .spawn(move || recv_path.receive_loop())
                .expect("failed to spawn path receive thread"),
        );

        if let DeliveryMode::RateControlled(rate_hz) = self.mode {
            let send_path = Arc::clone(self);
            threads.push(
                std::thread::Builder::new()
                    .name(format!("path-{}-send", self.name))
                    .spawn(move || send_path.rate_controlled_loop(rate_hz))
                    .expect("failed to spawn path send thread"),
            );
        }
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        self.shutdown.store(true, Ordering::Release);
        // Unblock any thread currently parked inside a blocking
        // `Node::read`/`write` call before joining it (§9 redesign note:
        // "broker-style nodes expose a wake() that unblocks their thread
        // for clean teardown"). Wakers were captured during `prepare`
        // without holding the per-node lock the receive/send threads use
        // around `read`/`write`, so calling them here can never deadlock
        // against a thread that's still inside a blocking call.
        if let Some(waker) = &self.source_waker {
            waker();
        }
        for dest in &self.destinations {
            if let Some(waker) = &dest.waker {
                waker();
            }
        }
        let mut threads = self.threads.lock().expect("thread list mutex poisoned");
        for handle in threads.drain(..) {
            let _ = handle.join();
        }
        {
            let mut hooks = self.hooks.lock().expect("hook chain mutex poisoned");
            hooks.stop_all()?;
            hooks.deinit_all()?;
        }
        *self.state.lock().expect("path state mutex poisoned") = PathState::Stopped;
        Ok(())
    }

    /// Receive thread loop (§4.5): acquire from the pool, read from the
    /// source, run `HOOK_READ`, push into the queue, and — for
    /// forward-on-arrival paths only — call the send routine inline.
    fn receive_loop(self: Arc<Self>) {
        let max_history = self
            .hooks
            .lock()
            .expect("hook chain mutex poisoned")
            .max_history_window()
            .max(1);
        while !self.shutdown.load(Ordering::Acquire) {
            let (signals, vectorize) = {
                let source = self.source.lock().expect("source node mutex poisoned");
                (source.signals(), source.vectorize().max(1))
            };
            let mut batch = self.pool.acquire(vectorize, signals);
            if batch.is_empty() {
                self.stats.pool_underruns.fetch_add(1, Ordering::Relaxed);
                warn!(path = %self.name, "pool exhausted, backing off");
                std::thread::sleep(std::time::Duration::from_millis(5));
                continue;
            } else if batch.len() < vectorize {
                self.stats.pool_underruns.fetch_add(1, Ordering::Relaxed);
                warn!(path = %self.name, got = batch.len(), wanted = vectorize, "partial pool acquire");
            }
            let read_result = self
                .source
                .lock()
                .expect("source node mutex poisoned")
                .read(&mut batch);
            let n = match read_result {
                Ok(n) => n,
                Err(err) => {
                    warn!(path = %self.name, error = %err, "source node read failed, stopping path");
                    self.shutdown.store(true, Ordering::Release);
                    break;
                }
            };
            if n == 0 {
                continue;
            }
            if n < batch.len() {
                warn!(path = %self.name, got = n, requested = batch.len(), "partial node read");
            }
            batch.truncate(n);
            self.stats.received.fetch_add(n as u64, Ordering::Relaxed);

            let recent: Vec<Sample> = self.history.lock().iter().cloned().collect();
            let mut accepted = Vec::with_capacity(batch.len());
            for sample in batch {
                let survives = {
                    let mut hooks = self.hooks.lock().expect("hook chain mutex poisoned");
                    hooks.run(HookKind::NodeRead, &sample, &recent)
                };
                let survives = match survives {
                    Ok(v) => v,
                    Err(err) => {
                        warn!(path = %self.name, error = %err, "node-read hook rejected sample");
                        self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }
                };
                if !survives {
                    self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                let survives = {
                    let mut hooks = self.hooks.lock().expect("hook chain mutex poisoned");
                    hooks.run(HookKind::PathRead, &sample, &recent)
                };
                match survives {
                    Ok(true) => {
                        let mut history = self.history.lock();
                        history.push_back(sample.clone());
                        if history.len() > max_history {
                            history.pop_front();
                        }
                        drop(history);
                        accepted.push(sample);
                    }
                    Ok(false) => {
                        self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(err) => {
                        warn!(path = %self.name, error = %err, "path-read hook rejected sample");
                        self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            if !accepted.is_empty() {
                let wanted = accepted.len();
                let pushed = self.queue.push_many(accepted);
                if pushed < wanted {
                    let dropped = (wanted - pushed) as u64;
                    self.stats.skipped.fetch_add(dropped, Ordering::Relaxed);
                    warn!(path = %self.name, dropped, "queue overflow, writer truncated");
                }
            }

            if matches!(self.mode, DeliveryMode::OnArrival) {
                self.send_once(false);
            }
        }
    }

    /// Rate-controlled send thread (§4.4): blocks on the next tick, runs
    /// periodic hooks (which may suppress the emission), and otherwise
    /// either sends the newly queued samples or, if nothing new has
    /// arrived since the previous tick, resends the last batch per
    /// destination to keep the line warm.
    fn rate_controlled_loop(self: Arc<Self>, rate_hz: f64) {
        let mut timer = RateTimer::new(rate_hz);
        // `None` until the first tick so an unlucky thread-start race
        // (the receive thread having already incremented `received`
        // before this loop takes its first snapshot) can never be
        // mistaken for "no new data since last tick" on the very first
        // send — that would resend an empty cache and emit nothing.
        let mut last_received: Option<u64> = None;
        while !self.shutdown.load(Ordering::Acquire) {
            let elapsed_periods = timer.wait();
            if elapsed_periods > 1 {
                let missed = elapsed_periods - 1;
                self.stats.timer_overruns.fetch_add(missed, Ordering::Relaxed);
                warn!(path = %self.name, missed, "rate timer overrun");
            }

            let emit = self
                .hooks
                .lock()
                .expect("hook chain mutex poisoned")
                .run_periodic();
            if !emit {
                continue;
            }

            let received_now = self.stats.received.load(Ordering::Acquire);
            let resend = last_received == Some(received_now);
            last_received = Some(received_now);
            self.send_once(resend);
        }
    }

    /// Send routine (§4.4): for each destination in configured order,
    /// either peek fresh samples and advance its cursor by what was
    /// actually written, or (on `resend`) rewrite its cached last batch
    /// without touching the cursor. A single destination's failure never
    /// stops the others.
    fn send_once(&self, resend: bool) {
        for index in 0..self.destinations.len() {
            if resend {
                let cached = self.destinations[index].last_sent.lock().clone();
                if cached.is_empty() {
                    continue;
                }
                self.write_to_destination(index, cached, None);
            } else {
                let vectorize = {
                    let node = self.destinations[index]
                        .node
                        .lock()
                        .expect("destination node mutex poisoned");
                    node.vectorize().max(1)
                };
                let reader = self.destinations[index].reader;
                let samples = self.queue.peek(reader, vectorize);
                if samples.is_empty() {
                    continue;
                }
                if samples.len() < vectorize {
                    self.stats.queue_underruns.fetch_add(1, Ordering::Relaxed);
                    warn!(path = %self.name, destination = index, got = samples.len(), wanted = vectorize, "queue underrun");
                }
                let peeked = samples.len();
                self.write_to_destination(index, samples, Some(peeked));
            }
        }
    }

    /// Runs `HOOK_PATH_WRITE`/`HOOK_NODE_WRITE`, writes the surviving
    /// samples to the destination, and — when `advance` is `Some(peeked)`
    /// — moves the destination's queue cursor forward by the number of
    /// samples originally peeked, regardless of how many a hook skipped
    /// or a short write left unsent (§9 Open Question (b): both a
    /// hook-skip and an unsent write tail are gone for good, not
    /// retried, so the cursor always clears the whole peeked span).
    fn write_to_destination(&self, index: usize, samples: Vec<Sample>, advance: Option<usize>) {
        // Same trailing-history window read-side hooks get (§4.3: history
        // windows are not kind-restricted), snapshotted once per call so
        // every sample in this batch sees the same view.
        let recent: Vec<Sample> = self.history.lock().iter().cloned().collect();
        let mut to_write = Vec::with_capacity(samples.len());
        for sample in samples {
            let survives = {
                let mut hooks = self.hooks.lock().expect("hook chain mutex poisoned");
                hooks.run(HookKind::PathWrite, &sample, &recent)
            };
            match survives {
                Ok(true) => {}
                Ok(false) => {
                    self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                Err(err) => {
                    warn!(path = %self.name, error = %err, "path-write hook rejected sample");
                    self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            }
            let survives = {
                let mut hooks = self.hooks.lock().expect("hook chain mutex poisoned");
                hooks.run(HookKind::NodeWrite, &sample, &recent)
            };
            match survives {
                Ok(true) => to_write.push(sample),
                Ok(false) => {
                    self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    warn!(path = %self.name, error = %err, "node-write hook rejected sample");
                    self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        if to_write.is_empty() {
            if let Some(peeked) = advance {
                self.queue.advance_reader(self.destinations[index].reader, peeked);
            }
            return;
        }
        let dest = &self.destinations[index];
        let written = {
            let mut node = dest.node.lock().expect("destination node mutex poisoned");
            match node.write(&to_write) {
                Ok(written) if written < to_write.len() => {
                    warn!(
                        path = %self.name,
                        destination = index,
                        requested = to_write.len(),
                        written,
                        "partial write, unsent tail dropped"
                    );
                    written
                }
                Ok(written) => written,
                Err(err) => {
                    warn!(path = %self.name, destination = index, error = %err, "destination write failed");
                    0
                }
            }
        };
        self.stats.sent.fetch_add(written as u64, Ordering::Relaxed);
        if let Some(peeked) = advance {
            self.queue.advance_reader(dest.reader, peeked);
        }
        *dest.last_sent.lock() = to_write;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::HookChain;
    use crate::node::types::{FileNode, LoopbackNode};

    fn loopback(name: &str, channel: &str) -> Box<dyn Node> {
        Box::new(
            LoopbackNode::from_config(name, &serde_json::json!({ "channel": channel })).unwrap(),
        )
    }

    #[test]
    fn prepare_before_created_state_is_rejected_twice() {
        let source = loopback("src", "path-test-1");
        let dest = loopback("dst", "path-test-1-out");
        let mut path = Path::new(
            "p1",
            source,
            vec![dest],
            8,
            2,
            HookChain::new(vec![]),
            DeliveryMode::OnArrival,
        )
        .unwrap();
        path.prepare().unwrap();
        assert_eq!(path.state(), PathState::Prepared);
        assert!(path.prepare().is_err());
    }

    #[test]
    fn path_with_no_destinations_is_rejected_at_construction() {
        let source = loopback("src", "path-test-2");
        let err = Path::new(
            "p2",
            source,
            vec![],
            8,
            2,
            HookChain::new(vec![]),
            DeliveryMode::OnArrival,
        )
        .unwrap_err();
        assert!(matches!(err, GatewayError::NoDestinations(_)));
    }

    #[test]
    fn forward_on_arrival_moves_a_sample_end_to_end() {
        let source = loopback("src", "path-test-3-in");
        let dest = FileNode::from_config(
            "dst",
            &serde_json::json!({
                "path": std::env::temp_dir().join("villas-path-test-3.ndjson").to_str().unwrap(),
                "mode": "write",
            }),
        )
        .unwrap();
        let mut path = Path::new(
            "p3",
            source,
            vec![Box::new(dest)],
            8,
            2,
            HookChain::new(vec![]),
            DeliveryMode::OnArrival,
        )
        .unwrap();
        path.prepare().unwrap();
        let path = Arc::new(path);
        path.start().unwrap();

        // Feed one sample through the loopback channel the source reads from.
        let mut feeder = LoopbackNode::from_config(
            "feeder",
            &serde_json::json!({ "channel": "path-test-3-in" }),
        )
        .unwrap();
        let pool = Pool::new(1, 1);
        let samples = pool.acquire(1, Arc::new(vec![]));
        samples[0].set_values(&[crate::signal::Value::Float(3.5)]);
        feeder.write(&samples).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(50));
        path.stop().unwrap();
        assert_eq!(path.state(), PathState::Stopped);
        assert!(path.stats().snapshot().received >= 1);
        assert!(path.stats().snapshot().sent >= 1);
    }
}

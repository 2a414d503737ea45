//! `loopback` node: an in-memory channel pair, useful for testing paths
//! without any external endpoint and for intra-process node-to-node
//! forwarding. Grounded on `crossbeam::channel`, already pulled in for
//! the queue/pool concurrency primitives.

use std::sync::{Arc, Mutex, OnceLock};

use crossbeam::channel::{bounded, Receiver, Select, Sender};
use serde::Deserialize;

use crate::error::{GatewayError, Result};
use crate::node::{Node, Waker};
use crate::sample::Sample;
use crate::signal::SignalDesc;

/// Process-wide registry of named loopback channel pairs, so two
/// differently configured `loopback` nodes sharing a `channel` name
/// become connected endpoints.
fn registry() -> &'static Mutex<std::collections::HashMap<String, (Sender<Entry>, Receiver<Entry>)>>
{
    static REGISTRY: OnceLock<
        Mutex<std::collections::HashMap<String, (Sender<Entry>, Receiver<Entry>)>>,
    > = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(std::collections::HashMap::new()))
}

#[derive(Clone)]
struct Entry {
    sequence: u64,
    origin_ns: u64,
    values: Vec<crate::signal::Value>,
}

#[derive(Debug, Deserialize)]
struct LoopbackConfig {
    channel: String,
    #[serde(default = "default_capacity")]
    capacity: usize,
    #[serde(default)]
    signals: Vec<SignalDesc>,
}

fn default_capacity() -> usize {
    64
}

pub struct LoopbackNode {
    name: String,
    signals: Arc<Vec<SignalDesc>>,
    sender: Sender<Entry>,
    receiver: Receiver<Entry>,
    /// Private per-instance control channel (never shared via the named
    /// channel registry): `waker()` hands out a sender that `read`'s
    /// blocking select also watches, so `Path::stop` can unblock a thread
    /// parked in `recv` without the channel itself ever disconnecting.
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl LoopbackNode {
    pub(crate) fn from_config(name: &str, raw: &serde_json::Value) -> Result<Self> {
        let config: LoopbackConfig = serde_json::from_value(raw.clone())
            .map_err(|e| GatewayError::Config(format!("loopback node '{name}': {e}")))?;
        let mut reg = registry().lock().expect("loopback registry poisoned");
        let (sender, receiver) = reg
            .entry(config.channel.clone())
            .or_insert_with(|| bounded(config.capacity))
            .clone();
        let (wake_tx, wake_rx) = bounded(1);
        Ok(Self {
            name: name.to_string(),
            signals: Arc::new(config.signals),
            sender,
            receiver,
            wake_tx,
            wake_rx,
        })
    }
}

impl Node for LoopbackNode {
    fn type_name(&self) -> &str {
        "loopback"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn signals(&self) -> Arc<Vec<SignalDesc>> {
        self.signals.clone()
    }

    fn read(&mut self, samples: &mut [Sample]) -> Result<usize> {
        if samples.is_empty() {
            return Ok(0);
        }
        // Blocks until either an entry arrives or `waker()` is invoked, per
        // the Node contract's blocking-read semantics plus the §9
        // cooperative-shutdown redesign: a bare `recv()` here would never
        // return once the owning path wants to stop.
        let mut select = Select::new();
        let data_idx = select.recv(&self.receiver);
        let wake_idx = select.recv(&self.wake_rx);
        let oper = select.select();
        let first = match oper.index() {
            i if i == data_idx => match oper.recv(&self.receiver) {
                Ok(entry) => entry,
                Err(_) => {
                    return Err(GatewayError::Io {
                        node: self.name.clone(),
                        message: "loopback channel disconnected".to_string(),
                    })
                }
            },
            i if i == wake_idx => {
                let _ = oper.recv(&self.wake_rx);
                return Ok(0);
            }
            _ => unreachable!("crossbeam::Select only ever returns a registered index"),
        };
        let mut filled = 1;
        apply(&samples[0], first);
        for sample in samples.iter().skip(1) {
            match self.receiver.try_recv() {
                Ok(entry) => {
                    apply(sample, entry);
                    filled += 1;
                }
                Err(_) => break,
            }
        }
        Ok(filled)
    }

    fn write(&mut self, samples: &[Sample]) -> Result<usize> {
        let mut written = 0;
        for sample in samples {
            let entry = Entry {
                sequence: sample.sequence(),
                origin_ns: sample.timestamps().origin_ns,
                values: sample.values(),
            };
            if self.sender.try_send(entry).is_err() {
                break;
            }
            written += 1;
        }
        Ok(written)
    }

    fn waker(&self) -> Option<Waker> {
        let tx = self.wake_tx.clone();
        Some(Arc::new(move || {
            let _ = tx.try_send(());
        }))
    }
}

fn apply(sample: &Sample, entry: Entry) {
    sample.set_sequence(entry.sequence);
    sample.set_origin_timestamp(entry.origin_ns);
    sample.set_values(&entry.values);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Pool;
    use crate::signal::Value;

    #[test]
    fn samples_written_to_one_end_are_read_from_the_other() {
        let mut writer = LoopbackNode::from_config(
            "w",
            &serde_json::json!({"channel": "test-channel-a"}),
        )
        .unwrap();
        let mut reader = LoopbackNode::from_config(
            "r",
            &serde_json::json!({"channel": "test-channel-a"}),
        )
        .unwrap();
        let pool = Pool::new(2, 1);
        let samples = pool.acquire(1, Arc::new(vec![]));
        samples[0].set_values(&[Value::Integer(9)]);
        writer.write(&samples).unwrap();

        let mut into = pool.acquire(1, Arc::new(vec![]));
        let n = reader.read(&mut into).unwrap();
        assert_eq!(n, 1);
        assert_eq!(into[0].values(), vec![Value::Integer(9)]);
    }

    #[test]
    fn waker_unblocks_a_read_with_no_data() {
        let mut node =
            LoopbackNode::from_config("w", &serde_json::json!({"channel": "test-channel-wake"}))
                .unwrap();
        let waker = node.waker().expect("loopback node always exposes a waker");
        let pool = Pool::new(1, 1);

        let handle = std::thread::spawn(move || {
            let mut into = pool.acquire(1, Arc::new(vec![]));
            node.read(&mut into).unwrap()
        });
        std::thread::sleep(std::time::Duration::from_millis(20));
        waker();
        let filled = handle.join().unwrap();
        assert_eq!(filled, 0, "a wake with no data ready must return 0, not block forever");
    }

    #[test]
    fn distinct_channel_names_do_not_cross_talk() {
        let mut a = LoopbackNode::from_config("a", &serde_json::json!({"channel": "chan-b"}))
            .unwrap();
        let b = LoopbackNode::from_config("b", &serde_json::json!({"channel": "chan-c"}))
            .unwrap();
        let pool = Pool::new(1, 1);
        let samples = pool.acquire(1, Arc::new(vec![]));
        a.write(&samples).unwrap();
        assert!(b.receiver.try_recv().is_err());
    }
}

//! `file` node: replays or records newline-delimited JSON samples,
//! standing in for the teacher's HDF5/Arrow/CSV storage backends (dropped
//! per SPEC_FULL.md in favor of one illustrative, dependency-light format).

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};
use crate::node::Node;
use crate::sample::Sample;
use crate::signal::SignalDesc;

#[derive(Debug, Deserialize)]
struct FileConfig {
    path: String,
    #[serde(default)]
    mode: FileMode,
    #[serde(default)]
    signals: Vec<SignalDesc>,
}

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum FileMode {
    #[default]
    Write,
    Read,
}

#[derive(Serialize, Deserialize)]
struct Record {
    sequence: u64,
    origin_ns: u64,
    values: Vec<crate::signal::Value>,
}

enum Backend {
    Writer(BufWriter<File>),
    Reader(Mutex<BufReader<File>>),
}

pub struct FileNode {
    name: String,
    signals: Arc<Vec<SignalDesc>>,
    backend: Backend,
}

impl FileNode {
    pub(crate) fn from_config(name: &str, raw: &serde_json::Value) -> Result<Self> {
        let config: FileConfig = serde_json::from_value(raw.clone())
            .map_err(|e| GatewayError::Config(format!("file node '{name}': {e}")))?;
        let backend = match config.mode {
            FileMode::Write => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&config.path)?;
                Backend::Writer(BufWriter::new(file))
            }
            FileMode::Read => {
                let file = File::open(&config.path)?;
                Backend::Reader(Mutex::new(BufReader::new(file)))
            }
        };
        Ok(Self {
            name: name.to_string(),
            signals: Arc::new(config.signals),
            backend,
        })
    }
}

impl Node for FileNode {
    fn type_name(&self) -> &str {
        "file"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn signals(&self) -> Arc<Vec<SignalDesc>> {
        self.signals.clone()
    }

    fn read(&mut self, samples: &mut [Sample]) -> Result<usize> {
        let reader = match &self.backend {
            Backend::Reader(r) => r,
            Backend::Writer(_) => {
                return Err(GatewayError::Io {
                    node: self.name.clone(),
                    message: "file node opened for writing cannot read".to_string(),
                })
            }
        };
        let mut reader = reader.lock().expect("file reader mutex poisoned");
        let mut filled = 0;
        for sample in samples.iter_mut() {
            let mut line = String::new();
            let n = reader.read_line(&mut line)?;
            if n == 0 {
                break;
            }
            let record: Record = serde_json::from_str(line.trim_end()).map_err(|e| {
                GatewayError::Io {
                    node: self.name.clone(),
                    message: format!("malformed record: {e}"),
                }
            })?;
            sample.set_sequence(record.sequence);
            sample.set_origin_timestamp(record.origin_ns);
            sample.set_values(&record.values);
            filled += 1;
        }
        Ok(filled)
    }

    fn write(&mut self, samples: &[Sample]) -> Result<usize> {
        let writer = match &mut self.backend {
            Backend::Writer(w) => w,
            Backend::Reader(_) => {
                return Err(GatewayError::Io {
                    node: self.name.clone(),
                    message: "file node opened for reading cannot write".to_string(),
                })
            }
        };
        let mut written = 0;
        for sample in samples {
            let record = Record {
                sequence: sample.sequence(),
                origin_ns: sample.timestamps().origin_ns,
                values: sample.values(),
            };
            let line = serde_json::to_string(&record).map_err(|e| GatewayError::Io {
                node: self.name.clone(),
                message: e.to_string(),
            })?;
            writeln!(writer, "{line}")?;
            written += 1;
        }
        writer.flush()?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Pool;
    use crate::signal::Value;

    #[test]
    fn written_records_round_trip_through_read_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples.ndjson");

        let mut writer = FileNode::from_config(
            "w",
            &serde_json::json!({"path": path.to_str().unwrap(), "mode": "write"}),
        )
        .unwrap();
        let pool = Pool::new(2, 2);
        let samples = pool.acquire(2, Arc::new(vec![]));
        samples[0].set_sequence(1);
        samples[0].set_values(&[Value::Float(1.0)]);
        samples[1].set_sequence(2);
        samples[1].set_values(&[Value::Float(2.0)]);
        assert_eq!(writer.write(&samples).unwrap(), 2);

        let mut reader = FileNode::from_config(
            "r",
            &serde_json::json!({"path": path.to_str().unwrap(), "mode": "read"}),
        )
        .unwrap();
        let mut read_back = pool.acquire(2, Arc::new(vec![]));
        let n = reader.read(&mut read_back).unwrap();
        assert_eq!(n, 2);
        assert_eq!(read_back[0].sequence(), 1);
        assert_eq!(read_back[1].sequence(), 2);
    }

    #[test]
    fn write_mode_rejects_read_calls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.ndjson");
        let mut node = FileNode::from_config(
            "w",
            &serde_json::json!({"path": path.to_str().unwrap(), "mode": "write"}),
        )
        .unwrap();
        let pool = Pool::new(1, 1);
        let mut samples = pool.acquire(1, Arc::new(vec![]));
        let err = node.read(&mut samples).unwrap_err();
        assert!(matches!(err, GatewayError::Io { .. }));
    }
}

//! `signal` node: a synthetic waveform generator, for smoke-testing paths
//! without any external endpoint. Not present in the original distillation;
//! supplemented per SPEC_FULL.md so the routing engine has something to
//! read from end to end.

use std::f64::consts::PI;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Deserialize;

use crate::error::{GatewayError, Result};
use crate::node::Node;
use crate::sample::Sample;
use crate::signal::{SignalDesc, SignalType, Value};

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Waveform {
    Sine,
    Square,
    Ramp,
    Constant,
}

#[derive(Debug, Deserialize)]
struct SignalConfig {
    #[serde(default = "default_waveform")]
    waveform: Waveform,
    #[serde(default = "default_frequency")]
    frequency_hz: f64,
    #[serde(default = "default_amplitude")]
    amplitude: f64,
    #[serde(default = "default_values")]
    values: usize,
}

fn default_waveform() -> Waveform {
    Waveform::Sine
}
fn default_frequency() -> f64 {
    1.0
}
fn default_amplitude() -> f64 {
    1.0
}
fn default_values() -> usize {
    1
}

pub struct SignalNode {
    name: String,
    config: SignalConfig,
    signals: Arc<Vec<SignalDesc>>,
    sequence: u64,
    start: std::time::Instant,
}

impl SignalNode {
    pub(crate) fn from_config(name: &str, raw: &serde_json::Value) -> Result<Self> {
        let config: SignalConfig = serde_json::from_value(raw.clone())
            .map_err(|e| GatewayError::Config(format!("signal node '{name}': {e}")))?;
        if config.values == 0 {
            return Err(GatewayError::Validation(format!(
                "signal node '{name}': values must be >= 1"
            )));
        }
        let signals = (0..config.values)
            .map(|i| SignalDesc::new(format!("signal{i}"), SignalType::Float))
            .collect();
        Ok(Self {
            name: name.to_string(),
            config,
            signals: Arc::new(signals),
            sequence: 0,
            start: std::time::Instant::now(),
        })
    }

    fn sample_value(&self, t: f64) -> f64 {
        let phase = 2.0 * PI * self.config.frequency_hz * t;
        match self.config.waveform {
            Waveform::Sine => self.config.amplitude * phase.sin(),
            Waveform::Square => {
                if phase.sin() >= 0.0 {
                    self.config.amplitude
                } else {
                    -self.config.amplitude
                }
            }
            Waveform::Ramp => {
                let frac = (self.config.frequency_hz * t).fract();
                self.config.amplitude * (2.0 * frac - 1.0)
            }
            Waveform::Constant => self.config.amplitude,
        }
    }
}

impl Node for SignalNode {
    fn type_name(&self) -> &str {
        "signal"
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
        let t = self.start.elapsed().as_secs_f64();
        let values: Vec<Value> = (0..self.config.values)
            .map(|_| Value::Float(self.sample_value(t)))
            .collect();
        let sample = &samples[0];
        sample.set_values(&values);
        sample.set_sequence(self.sequence);
        let origin_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        sample.set_origin_timestamp(origin_ns);
        self.sequence += 1;
        Ok(1)
    }

    fn write(&mut self, _samples: &[Sample]) -> Result<usize> {
        Err(GatewayError::Io {
            node: self.name.clone(),
            message: "signal node is source-only".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Pool;

    #[test]
    fn sine_waveform_fills_requested_values() {
        let mut node = SignalNode::from_config(
            "s1",
            &serde_json::json!({"waveform": "sine", "frequency_hz": 50.0, "values": 3}),
        )
        .unwrap();
        let pool = Pool::new(1, 3);
        let mut samples = pool.acquire(1, node.signals());
        let n = node.read(&mut samples).unwrap();
        assert_eq!(n, 1);
        assert_eq!(samples[0].length(), 3);
    }

    #[test]
    fn write_is_rejected_as_source_only() {
        let mut node = SignalNode::from_config("s1", &serde_json::json!({})).unwrap();
        let err = node.write(&[]).unwrap_err();
        assert!(matches!(err, GatewayError::Io { .. }));
    }

    #[test]
    fn zero_values_is_a_validation_error() {
        let err = SignalNode::from_config("s1", &serde_json::json!({"values": 0})).unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }
}

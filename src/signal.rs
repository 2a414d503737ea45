//! Signal descriptors and the discriminated value type carried by a [`Sample`](crate::sample::Sample).

use serde::{Deserialize, Serialize};

/// The type of a single value slot in a sample's value array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalType {
    Integer,
    Float,
    Boolean,
    Complex,
}

/// A single typed value, as carried in a sample's value array.
///
/// Mirrors the "discriminated value (integer, float, boolean, complex)"
/// slot described in the data model: one tagged union per value, so a
/// Sample's value array can be heterogeneous across its declared length.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Complex(f64, f64),
}

impl Value {
    pub fn signal_type(&self) -> SignalType {
        match self {
            Value::Integer(_) => SignalType::Integer,
            Value::Float(_) => SignalType::Float,
            Value::Boolean(_) => SignalType::Boolean,
            Value::Complex(_, _) => SignalType::Complex,
        }
    }

    /// Best-effort conversion to `f64`, used by hooks that operate
    /// numerically regardless of the underlying representation.
    pub fn as_f64(&self) -> f64 {
        match self {
            Value::Integer(v) => *v as f64,
            Value::Float(v) => *v,
            Value::Boolean(v) => {
                if *v {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Complex(re, _) => *re,
        }
    }
}

/// Describes one signal (a named, typed column) carried by every sample on
/// a path. Signal descriptor lists are shared (reference-counted) across
/// all samples produced by a node, per the data model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDesc {
    pub name: String,
    pub unit: Option<String>,
    pub kind: SignalType,
}

impl SignalDesc {
    pub fn new(name: impl Into<String>, kind: SignalType) -> Self {
        Self {
            name: name.into(),
            unit: None,
            kind,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_as_f64_converts_every_variant() {
        assert_eq!(Value::Integer(3).as_f64(), 3.0);
        assert_eq!(Value::Float(2.5).as_f64(), 2.5);
        assert_eq!(Value::Boolean(true).as_f64(), 1.0);
        assert_eq!(Value::Boolean(false).as_f64(), 0.0);
        assert_eq!(Value::Complex(1.5, -2.0).as_f64(), 1.5);
    }

    #[test]
    fn signal_type_matches_value_discriminant() {
        assert_eq!(Value::Integer(1).signal_type(), SignalType::Integer);
        assert_eq!(Value::Complex(0.0, 0.0).signal_type(), SignalType::Complex);
    }
}

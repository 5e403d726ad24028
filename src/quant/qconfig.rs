use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How the integer grid is placed over the real range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantScheme {
    /// `zero_point = 0`, range `[-max_abs, max_abs]`.
    #[default]
    Symmetric,
    /// Range `[min, max]` with a non-zero zero point.
    Asymmetric,
}

/// How many scale/zero-point pairs a weight matrix gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantGranularity {
    PerTensor,
    /// One pair per output unit (column of the `in × out` weight matrix).
    #[default]
    PerChannel,
}

/// Range statistic used when calibrating activations.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObserverKind {
    #[default]
    MinMax,
    MovingAverage { momentum: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QConfig {
    /// Integer width; codes are stored as `i8` so at most 8.
    pub bits: u8,
    /// Weight scheme. Activations are always quantized asymmetrically.
    pub scheme: QuantScheme,
    pub granularity: QuantGranularity,
    pub observer: ObserverKind,
    /// Batches of the train loader fed through the model during static calibration.
    pub calibration_batches: usize,
    /// Fine-tuning epochs for quantization-aware training.
    pub qat_epochs: usize,
}

impl Default for QConfig {
    fn default() -> Self {
        QConfig::default_per_channel()
    }
}

impl QConfig {
    pub fn default_per_channel() -> QConfig {
        QConfig {
            bits: 8,
            scheme: QuantScheme::Symmetric,
            granularity: QuantGranularity::PerChannel,
            observer: ObserverKind::MinMax,
            calibration_batches: 10,
            qat_epochs: 3,
        }
    }

    pub fn default_per_tensor() -> QConfig {
        QConfig { granularity: QuantGranularity::PerTensor, ..QConfig::default_per_channel() }
    }

    pub fn validate(&self) -> Result<()> {
        if !(2..=8).contains(&self.bits) {
            return Err(Error::InvalidConfig(format!("bits must be in 2..=8, got {}", self.bits)));
        }
        if let ObserverKind::MovingAverage { momentum } = self.observer {
            if !(0.0..1.0).contains(&momentum) {
                return Err(Error::InvalidConfig(format!(
                    "observer momentum must be in [0, 1), got {momentum}"
                )));
            }
        }
        if self.calibration_batches == 0 {
            return Err(Error::InvalidConfig("calibration_batches must be at least 1".into()));
        }
        Ok(())
    }

    /// Signed integer range `[qmin, qmax]` for `bits`.
    pub fn qrange(&self) -> (i32, i32) {
        qrange(self.bits)
    }
}

/// Widths outside `2..=8` are clamped so the range always fits an `i8` code.
pub(crate) fn qrange(bits: u8) -> (i32, i32) {
    let half = 1i32 << (bits.clamp(2, 8) - 1);
    (-half, half - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_differ_only_in_granularity() {
        let c = QConfig::default_per_channel();
        let t = QConfig::default_per_tensor();
        assert_eq!(c.granularity, QuantGranularity::PerChannel);
        assert_eq!(t.granularity, QuantGranularity::PerTensor);
        assert_eq!(c.bits, t.bits);
        c.validate().unwrap();
        t.validate().unwrap();
    }

    #[test]
    fn qrange_for_common_widths() {
        assert_eq!(qrange(8), (-128, 127));
        assert_eq!(qrange(4), (-8, 7));
        assert_eq!(qrange(2), (-2, 1));
    }

    #[test]
    fn qrange_stays_within_i8() {
        assert_eq!(qrange(0), (-2, 1));
        assert_eq!(qrange(16), (-128, 127));
    }

    #[test]
    fn rejects_bad_bits_and_momentum() {
        assert!(QConfig { bits: 9, ..Default::default() }.validate().is_err());
        assert!(QConfig { bits: 1, ..Default::default() }.validate().is_err());
        let bad = QConfig {
            observer: ObserverKind::MovingAverage { momentum: 1.0 },
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn deserializes_tagged_observer() {
        let c: QConfig = serde_json::from_str(
            r#"{"bits":4,"observer":{"type":"moving_average","momentum":0.9}}"#,
        ).unwrap();
        assert_eq!(c.bits, 4);
        assert_eq!(c.observer, ObserverKind::MovingAverage { momentum: 0.9 });
        assert_eq!(c.granularity, QuantGranularity::PerChannel);
    }
}

use crate::error::{Error, Result};
use crate::quant::qconfig::{ObserverKind, QuantScheme};
use crate::quant::qtensor::{min_max, QuantParams};

/// Tracks the range of an activation stream during calibration.
#[derive(Debug, Clone)]
pub struct Observer {
    kind: ObserverKind,
    min: Option<f64>,
    max: Option<f64>,
    batches: usize,
}

impl Observer {
    pub fn new(kind: ObserverKind) -> Observer {
        Observer { kind, min: None, max: None, batches: 0 }
    }

    /// Folds one batch of values into the running range.
    pub fn observe(&mut self, data: &[f64]) {
        if data.is_empty() {
            return;
        }
        let (lo, hi) = min_max(data.iter().copied());
        let (min, max) = match (self.kind, self.min, self.max) {
            (_, None, _) | (_, _, None) => (lo, hi),
            (ObserverKind::MinMax, Some(min), Some(max)) => (min.min(lo), max.max(hi)),
            (ObserverKind::MovingAverage { momentum }, Some(min), Some(max)) => (
                momentum * min + (1.0 - momentum) * lo,
                momentum * max + (1.0 - momentum) * hi,
            ),
        };
        self.min = Some(min);
        self.max = Some(max);
        self.batches += 1;
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    pub fn range(&self) -> Option<(f64, f64)> {
        self.min.zip(self.max)
    }

    /// Per-tensor parameters for the observed range.
    pub fn params(&self, scheme: QuantScheme, bits: u8) -> Result<QuantParams> {
        let (min, max) = self.range()
            .ok_or_else(|| Error::InvalidState("observer has not seen any data".into()))?;
        Ok(QuantParams::from_range(min, max, scheme, bits))
    }
}

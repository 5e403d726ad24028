use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which soft-target objective `SoftTarget` uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KdLossKind {
    /// Squared error between the softened student and teacher distributions.
    #[default]
    Mse,
    /// `T² · KL(teacher_T ‖ student_T)`.
    KlDiv,
}

/// Hyperparameters shared by every distillation method.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistillConfig {
    pub loss: KdLossKind,
    /// Softmax temperature applied to both teacher and student logits.
    pub temperature: f64,
    /// Weight of the soft-target term; the hard-label term gets `1 - distil_weight`.
    pub distil_weight: f64,
}

impl Default for DistillConfig {
    fn default() -> Self {
        DistillConfig { loss: KdLossKind::Mse, temperature: 20.0, distil_weight: 0.5 }
    }
}

impl DistillConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.temperature > 0.0 && self.temperature.is_finite()) {
            return Err(Error::InvalidConfig(format!(
                "temperature must be positive, got {}", self.temperature
            )));
        }
        if !(0.0..=1.0).contains(&self.distil_weight) {
            return Err(Error::InvalidConfig(format!(
                "distil_weight must be in [0, 1], got {}", self.distil_weight
            )));
        }
        Ok(())
    }
}

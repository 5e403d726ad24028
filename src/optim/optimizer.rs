use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::network::model::Trainable;
use crate::optim::{adam::Adam, sgd::Sgd};

/// Updates a model's parameters from its accumulated gradients.
///
/// Per-parameter state (momentum buffers, moment estimates) is keyed by
/// parameter name, so one optimizer instance belongs to one model.
pub trait Optimizer {
    fn step(&mut self, model: &mut dyn Trainable) -> Result<()>;

    fn zero_grad(&mut self, model: &mut dyn Trainable) {
        model.zero_grad();
    }

    fn learning_rate(&self) -> f64;
}

/// Serializable optimizer choice used by run configs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OptimizerConfig {
    Sgd {
        learning_rate: f64,
        #[serde(default)]
        momentum: f64,
        #[serde(default)]
        weight_decay: f64,
    },
    Adam {
        learning_rate: f64,
    },
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig::Sgd { learning_rate: 0.05, momentum: 0.9, weight_decay: 0.0 }
    }
}

impl OptimizerConfig {
    pub fn build(&self) -> Result<Box<dyn Optimizer>> {
        match *self {
            OptimizerConfig::Sgd { learning_rate, momentum, weight_decay } => {
                if !(0.0..1.0).contains(&momentum) {
                    return Err(Error::InvalidConfig(format!("momentum must be in [0, 1), got {momentum}")));
                }
                check_lr(learning_rate)?;
                Ok(Box::new(Sgd::new(learning_rate).momentum(momentum).weight_decay(weight_decay)))
            }
            OptimizerConfig::Adam { learning_rate } => {
                check_lr(learning_rate)?;
                Ok(Box::new(Adam::new(learning_rate)))
            }
        }
    }
}

fn check_lr(learning_rate: f64) -> Result<()> {
    if learning_rate > 0.0 && learning_rate.is_finite() {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!("learning rate must be positive, got {learning_rate}")))
    }
}

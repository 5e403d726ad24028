pub mod cross_entropy;
pub mod kl_div;
pub mod mse;

pub use cross_entropy::CrossEntropyLoss;
pub use kl_div::KlDivLoss;
pub use mse::MseLoss;

use crate::error::Result;
use crate::math::matrix::Matrix;

/// A scalar loss together with its gradient w.r.t. the logits it was computed from.
#[derive(Debug, Clone)]
pub struct LossOutput {
    pub value: f64,
    pub grad: Matrix,
}

/// Supervised objective on hard labels, handed to loops that train a single model.
pub trait Criterion {
    fn compute(&self, logits: &Matrix, labels: &[usize]) -> Result<LossOutput>;
}

impl Criterion for CrossEntropyLoss {
    fn compute(&self, logits: &Matrix, labels: &[usize]) -> Result<LossOutput> {
        CrossEntropyLoss::forward(logits, labels)
    }
}

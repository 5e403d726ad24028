use crate::error::Result;
use crate::loss::LossOutput;
use crate::math::matrix::Matrix;

pub struct MseLoss;

impl MseLoss {
    /// Scalar MSE over every element: mean((predicted - expected)²),
    /// with gradient 2·(predicted - expected) / n.
    pub fn forward(predicted: &Matrix, expected: &Matrix) -> Result<LossOutput> {
        let diff = predicted.sub(expected)?;
        let n = diff.data.len().max(1) as f64;
        let value = diff.data.iter().map(|d| d * d).sum::<f64>() / n;
        Ok(LossOutput { value, grad: diff.scale(2.0 / n) })
    }
}

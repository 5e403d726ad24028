use crate::activation::activation::{log_softmax, softmax};
use crate::error::{Error, Result};
use crate::loss::LossOutput;
use crate::math::matrix::Matrix;

/// Categorical cross-entropy computed directly from logits.
///
/// `L = -mean_b log softmax(z_b)[y_b]`, with gradient `(softmax(z) - onehot(y)) / batch`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossEntropyLoss;

impl CrossEntropyLoss {
    pub fn forward(logits: &Matrix, labels: &[usize]) -> Result<LossOutput> {
        if logits.rows != labels.len() {
            return Err(Error::shape(&[labels.len(), logits.cols], &logits.shape()));
        }
        let batch = logits.rows.max(1) as f64;
        let mut value = 0.0;
        let mut grad = Matrix::zeros(logits.rows, logits.cols);

        for (b, (row, &label)) in logits.rows_iter().zip(labels).enumerate() {
            if label >= logits.cols {
                return Err(Error::Dataset(format!(
                    "label {label} out of range for {} output classes", logits.cols
                )));
            }
            value -= log_softmax(row, 1.0)[label];
            let probs = softmax(row, 1.0);
            let grad_row = &mut grad.data[b * logits.cols..(b + 1) * logits.cols];
            for (j, (g, p)) in grad_row.iter_mut().zip(probs).enumerate() {
                let target = if j == label { 1.0 } else { 0.0 };
                *g = (p - target) / batch;
            }
        }

        Ok(LossOutput { value: value / batch, grad })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn uniform_logits_give_ln_of_class_count() {
        let logits = Matrix::zeros(2, 4);
        let out = CrossEntropyLoss::forward(&logits, &[0, 3]).unwrap();
        assert_abs_diff_eq!(out.value, 4.0_f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn gradient_rows_sum_to_zero() {
        let logits = Matrix::from_vec(2, 3, vec![1.0, 2.0, 0.5, -1.0, 0.0, 3.0]).unwrap();
        let out = CrossEntropyLoss::forward(&logits, &[1, 0]).unwrap();
        for row in out.grad.rows_iter() {
            assert_abs_diff_eq!(row.iter().sum::<f64>(), 0.0, epsilon = 1e-12);
        }
        // the true-class entry is the only negative one
        assert!(out.grad.get(0, 1) < 0.0);
        assert!(out.grad.get(1, 0) < 0.0);
    }

    #[test]
    fn out_of_range_label_is_rejected() {
        let logits = Matrix::zeros(1, 3);
        assert!(matches!(CrossEntropyLoss::forward(&logits, &[3]), Err(Error::Dataset(_))));
    }

    #[test]
    fn batch_and_label_count_must_agree() {
        let logits = Matrix::zeros(2, 3);
        assert!(CrossEntropyLoss::forward(&logits, &[0]).is_err());
    }
}

use crate::activation::activation::{softmax, softmax_backward};
use crate::distill::base::KdLoss;
use crate::distill::config::{DistillConfig, KdLossKind};
use crate::error::{Error, Result};
use crate::loss::{CrossEntropyLoss, KlDivLoss, LossOutput, MseLoss};
use crate::math::matrix::Matrix;

/// Response-based distillation on temperature-softened outputs.
///
/// ```text
/// L = (1 − w) · CE(student, y) + w · soft(student / T, teacher / T)
/// ```
///
/// `soft` is either the MSE between the two softened distributions or
/// `T² · KL(teacher_T ‖ student_T)`; the `T²` factor keeps the soft gradient's
/// magnitude comparable across temperatures.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftTarget;

impl KdLoss for SoftTarget {
    fn calculate_kd_loss(
        &self,
        student_logits: &Matrix,
        teacher_logits: &Matrix,
        labels: &[usize],
        config: &DistillConfig,
    ) -> Result<LossOutput> {
        let w = config.distil_weight;
        let t = config.temperature;

        let hard = CrossEntropyLoss::forward(student_logits, labels)?;
        let soft = match config.loss {
            KdLossKind::Mse => softened_mse(student_logits, teacher_logits, t)?,
            KdLossKind::KlDiv => {
                let kl = KlDivLoss::new(t).forward(student_logits, teacher_logits)?;
                LossOutput { value: kl.value * t * t, grad: kl.grad.scale(t * t) }
            }
        };

        Ok(LossOutput {
            value: (1.0 - w) * hard.value + w * soft.value,
            grad: hard.grad.scale(1.0 - w).add(&soft.grad.scale(w))?,
        })
    }
}

/// MSE between `softmax(student / T)` and `softmax(teacher / T)`, with the
/// gradient pulled back through the student softmax.
fn softened_mse(student_logits: &Matrix, teacher_logits: &Matrix, t: f64) -> Result<LossOutput> {
    if student_logits.shape() != teacher_logits.shape() {
        return Err(Error::shape(&teacher_logits.shape(), &student_logits.shape()));
    }
    let soften = |m: &Matrix| -> Matrix {
        Matrix {
            rows: m.rows,
            cols: m.cols,
            data: m.rows_iter().flat_map(|row| softmax(row, t)).collect(),
        }
    };
    let p_s = soften(student_logits);
    let p_t = soften(teacher_logits);
    let mse = MseLoss::forward(&p_s, &p_t)?;

    let data = p_s.rows_iter()
        .zip(mse.grad.rows_iter())
        .flat_map(|(p, g)| softmax_backward(p, g, t))
        .collect();
    Ok(LossOutput {
        value: mse.value,
        grad: Matrix { rows: p_s.rows, cols: p_s.cols, data },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn logits() -> (Matrix, Matrix) {
        let s = Matrix::from_vec(2, 3, vec![0.5, -0.2, 1.0, 2.0, 0.1, -1.0]).unwrap();
        let t = Matrix::from_vec(2, 3, vec![1.5, 0.3, -0.4, 0.2, 2.2, 0.0]).unwrap();
        (s, t)
    }

    fn check_gradient(config: DistillConfig) {
        let (s, t) = logits();
        let labels = [2, 0];
        let out = SoftTarget.calculate_kd_loss(&s, &t, &labels, &config).unwrap();
        let h = 1e-6;
        for j in 0..s.data.len() {
            let mut up = s.clone();
            let mut down = s.clone();
            up.data[j] += h;
            down.data[j] -= h;
            let numeric = (SoftTarget.calculate_kd_loss(&up, &t, &labels, &config).unwrap().value
                - SoftTarget.calculate_kd_loss(&down, &t, &labels, &config).unwrap().value)
                / (2.0 * h);
            assert_abs_diff_eq!(out.grad.data[j], numeric, epsilon = 1e-6);
        }
    }

    #[test]
    fn mse_variant_gradient_is_exact() {
        check_gradient(DistillConfig { loss: KdLossKind::Mse, temperature: 3.0, distil_weight: 0.7 });
    }

    #[test]
    fn kl_variant_gradient_is_exact() {
        check_gradient(DistillConfig { loss: KdLossKind::KlDiv, temperature: 2.0, distil_weight: 0.4 });
    }

    #[test]
    fn zero_weight_reduces_to_cross_entropy() {
        let (s, t) = logits();
        let config = DistillConfig { distil_weight: 0.0, ..Default::default() };
        let kd = SoftTarget.calculate_kd_loss(&s, &t, &[1, 1], &config).unwrap();
        let ce = CrossEntropyLoss::forward(&s, &[1, 1]).unwrap();
        assert_abs_diff_eq!(kd.value, ce.value, epsilon = 1e-12);
    }

    #[test]
    fn matching_teacher_leaves_only_hard_term() {
        let (s, _) = logits();
        let config = DistillConfig { loss: KdLossKind::KlDiv, temperature: 5.0, distil_weight: 0.5 };
        let kd = SoftTarget.calculate_kd_loss(&s, &s, &[0, 0], &config).unwrap();
        let ce = CrossEntropyLoss::forward(&s, &[0, 0]).unwrap();
        assert_abs_diff_eq!(kd.value, 0.5 * ce.value, epsilon = 1e-12);
    }
}

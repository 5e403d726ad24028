use crate::activation::activation::{log_softmax, softmax};
use crate::error::{Error, Result};
use crate::loss::LossOutput;
use crate::math::matrix::Matrix;

/// Temperature-scaled KL divergence between teacher and student distributions.
///
/// ```text
/// L = (1/B) Σ_b Σ_i p_t[i] · (ln p_t[i] − ln p_s[i])
/// p_t = softmax(teacher / T),  p_s = softmax(student / T)
/// ∂L/∂student = (p_s − p_t) / (T·B)
/// ```
///
/// The gradient only flows into the student; teacher logits are constants.
#[derive(Debug, Clone, Copy)]
pub struct KlDivLoss {
    pub temperature: f64,
}

impl KlDivLoss {
    pub fn new(temperature: f64) -> KlDivLoss {
        KlDivLoss { temperature }
    }

    pub fn forward(&self, student_logits: &Matrix, teacher_logits: &Matrix) -> Result<LossOutput> {
        if student_logits.shape() != teacher_logits.shape() {
            return Err(Error::shape(&teacher_logits.shape(), &student_logits.shape()));
        }
        let t = self.temperature;
        let batch = student_logits.rows.max(1) as f64;
        let cols = student_logits.cols;
        let mut value = 0.0;
        let mut grad = Matrix::zeros(student_logits.rows, cols);

        for (b, (s_row, t_row)) in student_logits.rows_iter().zip(teacher_logits.rows_iter()).enumerate() {
            let p_t = softmax(t_row, t);
            let log_p_t = log_softmax(t_row, t);
            let log_p_s = log_softmax(s_row, t);
            let p_s = softmax(s_row, t);

            value += p_t.iter()
                .zip(log_p_t.iter().zip(&log_p_s))
                .filter(|(p, _)| **p > 0.0)
                .map(|(p, (lt, ls))| p * (lt - ls))
                .sum::<f64>();

            let grad_row = &mut grad.data[b * cols..(b + 1) * cols];
            for ((g, ps), pt) in grad_row.iter_mut().zip(&p_s).zip(&p_t) {
                *g = (ps - pt) / (t * batch);
            }
        }

        Ok(LossOutput { value: value / batch, grad })
    }
}

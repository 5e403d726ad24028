use serde::{Serialize, Deserialize};
use std::f64::consts::E;

/// Element-wise activation applied after a dense layer's linear transform.
///
/// Output layers use `Identity` so the network emits raw logits; softmax is
/// applied by the losses (with a temperature where distillation needs one).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ActivationFunction {
    Sigmoid,
    ReLU,
    LeakyReLU { alpha: f64 },
    Tanh,
    Identity,
}

impl ActivationFunction {
    pub fn function(&self, x: f64) -> f64 {
        match self {
            ActivationFunction::Sigmoid => 1.0 / (1.0 + E.powf(-x)),
            ActivationFunction::ReLU => if x > 0.0 { x } else { 0.0 },
            ActivationFunction::LeakyReLU { alpha } => if x > 0.0 { x } else { alpha * x },
            ActivationFunction::Tanh => x.tanh(),
            ActivationFunction::Identity => x,
        }
    }

    /// Derivative with respect to the pre-activation `x`.
    pub fn derivative(&self, x: f64) -> f64 {
        match self {
            ActivationFunction::Sigmoid => {
                let fx = self.function(x);
                fx * (1.0 - fx)
            }
            ActivationFunction::ReLU => if x > 0.0 { 1.0 } else { 0.0 },
            ActivationFunction::LeakyReLU { alpha } => if x > 0.0 { 1.0 } else { *alpha },
            ActivationFunction::Tanh => {
                let t = x.tanh();
                1.0 - t * t
            }
            ActivationFunction::Identity => 1.0,
        }
    }
}

/// Softmax of `logits / temperature`, max-subtracted for stability.
pub fn softmax(logits: &[f64], temperature: f64) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|&z| ((z - max) / temperature).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Log-softmax of `logits / temperature` (log-sum-exp form).
pub fn log_softmax(logits: &[f64], temperature: f64) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let shifted: Vec<f64> = logits.iter().map(|&z| (z - max) / temperature).collect();
    let log_sum = shifted.iter().map(|s| s.exp()).sum::<f64>().ln();
    shifted.into_iter().map(|s| s - log_sum).collect()
}

/// Pulls a gradient w.r.t. `p = softmax(z / T)` back to the logits `z`:
/// ∂L/∂z_j = p_j · (g_j − Σ_k g_k·p_k) / T.
pub fn softmax_backward(probs: &[f64], grad_probs: &[f64], temperature: f64) -> Vec<f64> {
    let dot: f64 = probs.iter().zip(grad_probs).map(|(p, g)| p * g).sum();
    probs.iter()
        .zip(grad_probs)
        .map(|(p, g)| p * (g - dot) / temperature)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn softmax_backward_matches_finite_differences() {
        let z = [0.4, -0.3, 1.1];
        let t = 3.0;
        let weights = [1.0, -2.0, 0.5];
        // L = Σ w_i p_i  ⇒  ∂L/∂p = w
        let objective = |z: &[f64]| -> f64 {
            softmax(z, t).iter().zip(&weights).map(|(p, w)| p * w).sum()
        };
        let analytic = softmax_backward(&softmax(&z, t), &weights, t);
        let h = 1e-6;
        for j in 0..3 {
            let mut up = z;
            let mut down = z;
            up[j] += h;
            down[j] -= h;
            let numeric = (objective(&up) - objective(&down)) / (2.0 * h);
            assert_abs_diff_eq!(analytic[j], numeric, epsilon = 1e-8);
        }
    }

    #[test]
    fn softmax_sums_to_one_and_is_shift_invariant() {
        let p = softmax(&[1.0, 2.0, 3.0], 1.0);
        let q = softmax(&[101.0, 102.0, 103.0], 1.0);
        assert_abs_diff_eq!(p.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        for (a, b) in p.iter().zip(&q) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn high_temperature_flattens_distribution() {
        let sharp = softmax(&[0.0, 5.0], 1.0);
        let soft = softmax(&[0.0, 5.0], 20.0);
        assert!(soft[1] < sharp[1]);
        assert!(soft[1] > 0.5);
    }

    #[test]
    fn log_softmax_matches_ln_of_softmax() {
        let logits = [0.3, -1.2, 2.5];
        let p = softmax(&logits, 2.0);
        let lp = log_softmax(&logits, 2.0);
        for (a, b) in p.iter().zip(&lp) {
            assert_abs_diff_eq!(a.ln(), *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn relu_derivative_is_step() {
        let relu = ActivationFunction::ReLU;
        assert_eq!(relu.derivative(-0.5), 0.0);
        assert_eq!(relu.derivative(0.5), 1.0);
        assert_eq!(ActivationFunction::LeakyReLU { alpha: 0.1 }.function(-2.0), -0.2);
    }
}

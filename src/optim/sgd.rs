use std::collections::HashMap;

use crate::error::Result;
use crate::network::model::Trainable;
use crate::optim::optimizer::Optimizer;

/// Stochastic gradient descent with optional momentum and L2 weight decay.
#[derive(Debug, Clone)]
pub struct Sgd {
    pub learning_rate: f64,
    pub momentum: f64,
    pub weight_decay: f64,
    velocities: HashMap<String, Vec<f64>>,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Sgd {
        Sgd { learning_rate, momentum: 0.0, weight_decay: 0.0, velocities: HashMap::new() }
    }

    pub fn momentum(mut self, momentum: f64) -> Sgd {
        self.momentum = momentum;
        self
    }

    pub fn weight_decay(mut self, weight_decay: f64) -> Sgd {
        self.weight_decay = weight_decay;
        self
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, model: &mut dyn Trainable) -> Result<()> {
        for param in model.parameters_mut() {
            let velocity = self.velocities
                .entry(param.name)
                .or_insert_with(|| vec![0.0; param.value.len()]);

            for ((w, &g), v) in param.value.iter_mut().zip(param.grad).zip(velocity.iter_mut()) {
                let g = g + self.weight_decay * *w;
                // v = μ·v + g; with μ = 0 this is plain SGD
                *v = self.momentum * *v + g;
                *w -= self.learning_rate * *v;
            }
        }
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::activation::ActivationFunction;
    use crate::layers::dense::Dense;
    use crate::math::matrix::Matrix;
    use crate::network::model::{Mode, Model};
    use crate::network::network::Network;

    fn one_weight_net(w: f64) -> Network {
        let mut net = Network::new(vec![(1, 1, ActivationFunction::Identity)]);
        net.layers[0] = Dense::from_parts(
            Matrix::from_vec(1, 1, vec![w]).unwrap(),
            Matrix::zeros(1, 1),
            ActivationFunction::Identity,
        );
        net
    }

    fn backprop_unit_grad(net: &mut Network) {
        net.set_mode(Mode::Train);
        let x = Matrix::from_vec(1, 1, vec![1.0]).unwrap();
        net.forward(&x).unwrap();
        net.backward(&Matrix::from_vec(1, 1, vec![1.0]).unwrap()).unwrap();
    }

    #[test]
    fn plain_step_moves_against_gradient() {
        let mut net = one_weight_net(1.0);
        backprop_unit_grad(&mut net);
        let mut sgd = Sgd::new(0.1);
        sgd.step(&mut net).unwrap();
        assert!((net.layers[0].weights.data[0] - 0.9).abs() < 1e-12);
        assert!((net.layers[0].biases.data[0] + 0.1).abs() < 1e-12);
    }

    #[test]
    fn momentum_accelerates_repeated_steps() {
        let mut net = one_weight_net(0.0);
        let mut sgd = Sgd::new(0.1).momentum(0.5);
        for _ in 0..2 {
            sgd.zero_grad(&mut net);
            backprop_unit_grad(&mut net);
            sgd.step(&mut net).unwrap();
        }
        // step 1: v = 1 → w = -0.1; step 2: v = 1.5 → w = -0.25
        assert!((net.layers[0].weights.data[0] + 0.25).abs() < 1e-12);
    }
}

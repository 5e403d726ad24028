use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    activation::activation::ActivationFunction,
    error::{Error, Result},
    layers::dense::Dense,
    math::matrix::Matrix,
    network::model::{Mode, Model, Param, Trainable},
    network::spec::NetworkSpec,
    network::state::{StateDict, Tensor},
};

/// Feed-forward stack of dense layers producing logits.
#[derive(Debug, Clone)]
pub struct Network {
    pub layers: Vec<Dense>,
    mode: Mode,
}

impl Network {
    /// Builds a network from (size, input_size, activation) tuples.
    pub fn new(layer_specs: Vec<(usize, usize, ActivationFunction)>) -> Network {
        Network::with_rng(layer_specs, &mut rand::thread_rng())
    }

    pub fn with_rng<R: Rng + ?Sized>(
        layer_specs: Vec<(usize, usize, ActivationFunction)>,
        rng: &mut R,
    ) -> Network {
        let layers = layer_specs.into_iter()
            .map(|(size, input_size, activation)| Dense::new(size, input_size, activation, rng))
            .collect();
        Network { layers, mode: Mode::Train }
    }

    pub fn from_spec(spec: &NetworkSpec) -> Result<Network> {
        spec.validate()?;
        let tuples = spec.layers.iter()
            .map(|l| (l.size, l.input_size, l.activation))
            .collect();
        Ok(match spec.seed {
            Some(seed) => Network::with_rng(tuples, &mut StdRng::seed_from_u64(seed)),
            None => Network::new(tuples),
        })
    }

    pub fn input_size(&self) -> usize {
        self.layers.first().map_or(0, Dense::input_size)
    }

    pub fn output_size(&self) -> usize {
        self.layers.last().map_or(0, Dense::size)
    }

    /// Convenience single-sample forward pass.
    pub fn predict(&mut self, input: &[f64]) -> Result<Vec<f64>> {
        let batch = Matrix::from_vec(1, input.len(), input.to_vec())?;
        Ok(self.forward(&batch)?.data)
    }
}

impl Model for Network {
    fn forward(&mut self, input: &Matrix) -> Result<Matrix> {
        let mode = self.mode;
        let mut current = input.clone();
        for layer in &mut self.layers {
            current = layer.forward(&current, mode)?;
        }
        Ok(current)
    }

    fn num_parameters(&self) -> usize {
        self.layers.iter().map(Dense::num_parameters).sum()
    }

    fn state_dict(&self) -> StateDict {
        let mut state = StateDict::new();
        for (i, layer) in self.layers.iter().enumerate() {
            state.insert(format!("layers.{i}.weight"), Tensor::from_matrix(&layer.weights));
            state.insert(format!("layers.{i}.bias"), Tensor::from_matrix(&layer.biases));
        }
        state
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
        if mode == Mode::Eval {
            self.layers.iter_mut().for_each(Dense::clear_cache);
        }
    }
}

impl Trainable for Network {
    fn backward(&mut self, grad_output: &Matrix) -> Result<()> {
        if self.mode == Mode::Eval {
            return Err(Error::InvalidState("backward called on a network in eval mode".into()));
        }
        let mut delta = grad_output.clone();
        for layer in self.layers.iter_mut().rev() {
            delta = layer.backward(&delta)?;
        }
        Ok(())
    }

    fn zero_grad(&mut self) {
        self.layers.iter_mut().for_each(Dense::zero_grad);
    }

    fn parameters_mut(&mut self) -> Vec<Param<'_>> {
        self.layers.iter_mut()
            .enumerate()
            .flat_map(|(i, layer)| layer.params_mut(&format!("layers.{i}")))
            .collect()
    }

    fn load_state_dict(&mut self, state: &StateDict) -> Result<()> {
        for (i, layer) in self.layers.iter_mut().enumerate() {
            let weights = state.require(&format!("layers.{i}.weight"))?.to_matrix()?;
            let biases = state.require(&format!("layers.{i}.bias"))?.to_matrix()?;
            if weights.shape() != layer.weights.shape() {
                return Err(Error::shape(&layer.weights.shape(), &weights.shape()));
            }
            if biases.shape() != layer.biases.shape() {
                return Err(Error::shape(&layer.biases.shape(), &biases.shape()));
            }
            layer.weights = weights;
            layer.biases = biases;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::spec::NetworkSpec;

    fn tiny() -> Network {
        let spec = NetworkSpec::mlp("tiny", &[3, 5, 2], ActivationFunction::Tanh).with_seed(11);
        Network::from_spec(&spec).unwrap()
    }

    #[test]
    fn forward_produces_one_logit_row_per_sample() {
        let mut net = tiny();
        let batch = Matrix::from_vec(4, 3, vec![0.1; 12]).unwrap();
        let out = net.forward(&batch).unwrap();
        assert_eq!(out.shape(), [4, 2]);
    }

    #[test]
    fn counts_weights_and_biases() {
        assert_eq!(tiny().num_parameters(), 3 * 5 + 5 + 5 * 2 + 2);
    }

    #[test]
    fn state_dict_restores_weights() {
        let source = tiny();
        let mut target = Network::from_spec(
            &NetworkSpec::mlp("tiny", &[3, 5, 2], ActivationFunction::Tanh).with_seed(99),
        ).unwrap();
        assert_ne!(source.layers[0].weights, target.layers[0].weights);
        target.load_state_dict(&source.state_dict()).unwrap();
        assert_eq!(source.layers[0].weights, target.layers[0].weights);
        assert_eq!(source.layers[1].biases, target.layers[1].biases);
    }

    #[test]
    fn load_state_dict_rejects_other_architectures() {
        let other = Network::from_spec(
            &NetworkSpec::mlp("wide", &[3, 6, 2], ActivationFunction::Tanh).with_seed(1),
        ).unwrap();
        let mut net = tiny();
        assert!(net.load_state_dict(&other.state_dict()).is_err());
    }

    #[test]
    fn backward_in_eval_mode_fails() {
        let mut net = tiny();
        net.eval();
        let batch = Matrix::from_vec(1, 3, vec![0.5, -0.5, 1.0]).unwrap();
        let out = net.forward(&batch).unwrap();
        assert!(matches!(net.backward(&out), Err(Error::InvalidState(_))));
    }

    #[test]
    fn parameters_are_named_per_layer() {
        let mut net = tiny();
        let names: Vec<String> = net.parameters_mut().into_iter().map(|p| p.name).collect();
        assert_eq!(names, ["layers.0.weight", "layers.0.bias", "layers.1.weight", "layers.1.bias"]);
    }
}

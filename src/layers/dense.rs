use rand::Rng;

use crate::{
    activation::activation::ActivationFunction,
    error::{Error, Result},
    math::matrix::Matrix,
    network::model::{Mode, Param},
};

/// Fully-connected layer: `a = f(x·W + b)` over a batch of row vectors.
#[derive(Debug, Clone)]
pub struct Dense {
    /// Shape (input_size, size).
    pub weights: Matrix,
    /// Shape (1, size).
    pub biases: Matrix,
    pub activator: ActivationFunction,
    weight_grad: Matrix,
    bias_grad: Matrix,
    // (input, pre-activation z) of the last train-mode forward pass
    cache: Option<(Matrix, Matrix)>,
}

impl Dense {
    pub fn new<R: Rng + ?Sized>(
        size: usize,
        input_size: usize,
        activation: ActivationFunction,
        rng: &mut R,
    ) -> Dense {
        let weights = match activation {
            ActivationFunction::ReLU | ActivationFunction::LeakyReLU { .. } => {
                Matrix::he(input_size, size, rng)
            }
            _ => Matrix::xavier(input_size, size, rng),
        };
        Dense::from_parts(weights, Matrix::zeros(1, size), activation)
    }

    /// Builds a layer around existing parameters (used when loading checkpoints).
    pub fn from_parts(weights: Matrix, biases: Matrix, activator: ActivationFunction) -> Dense {
        let weight_grad = Matrix::zeros(weights.rows, weights.cols);
        let bias_grad = Matrix::zeros(biases.rows, biases.cols);
        Dense { weights, biases, activator, weight_grad, bias_grad, cache: None }
    }

    pub fn input_size(&self) -> usize {
        self.weights.rows
    }

    pub fn size(&self) -> usize {
        self.weights.cols
    }

    pub fn num_parameters(&self) -> usize {
        self.weights.data.len() + self.biases.data.len()
    }

    pub fn forward(&mut self, input: &Matrix, mode: Mode) -> Result<Matrix> {
        if input.cols != self.input_size() {
            return Err(Error::shape(&[input.rows, self.input_size()], &input.shape()));
        }
        let z = input.matmul(&self.weights)?.add_row_vector(&self.biases)?;
        let a = z.map(|x| self.activator.function(x));
        self.cache = match mode {
            Mode::Train => Some((input.clone(), z)),
            Mode::Eval => None,
        };
        Ok(a)
    }

    /// Accumulates ∂L/∂W and ∂L/∂b from `grad_output` (∂L/∂a) and returns ∂L/∂x.
    pub fn backward(&mut self, grad_output: &Matrix) -> Result<Matrix> {
        let (input, z) = self.cache.as_ref().ok_or_else(|| {
            Error::InvalidState("backward called without a train-mode forward pass".into())
        })?;
        // δ = ∂L/∂a ⊙ f'(z)
        let delta = grad_output.hadamard(&z.map(|x| self.activator.derivative(x)))?;

        let w_grad = input.transpose().matmul(&delta)?;
        self.weight_grad = self.weight_grad.add(&w_grad)?;
        self.bias_grad = self.bias_grad.add(&delta.sum_rows())?;

        delta.matmul(&self.weights.transpose())
    }

    pub fn zero_grad(&mut self) {
        self.weight_grad.data.iter_mut().for_each(|g| *g = 0.0);
        self.bias_grad.data.iter_mut().for_each(|g| *g = 0.0);
    }

    pub fn clear_cache(&mut self) {
        self.cache = None;
    }

    /// Weight and bias parameters paired with their gradients, named `{prefix}.weight`/`{prefix}.bias`.
    pub fn params_mut(&mut self, prefix: &str) -> [Param<'_>; 2] {
        let Dense { weights, biases, weight_grad, bias_grad, .. } = self;
        [
            Param { name: format!("{prefix}.weight"), value: &mut weights.data, grad: &weight_grad.data },
            Param { name: format!("{prefix}.bias"), value: &mut biases.data, grad: &bias_grad.data },
        ]
    }
}

use crate::error::Result;
use crate::math::matrix::Matrix;
use crate::network::state::StateDict;

/// Whether a forward pass should keep activations for backprop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Train,
    Eval,
}

/// A named trainable parameter together with its accumulated gradient.
pub struct Param<'a> {
    pub name: String,
    pub value: &'a mut [f64],
    pub grad: &'a [f64],
}

/// Inference view of a classifier: maps a batch of inputs to a batch of logits.
pub trait Model {
    fn forward(&mut self, input: &Matrix) -> Result<Matrix>;

    fn num_parameters(&self) -> usize;

    fn state_dict(&self) -> StateDict;

    fn mode(&self) -> Mode;

    fn set_mode(&mut self, mode: Mode);

    fn train(&mut self) {
        self.set_mode(Mode::Train);
    }

    fn eval(&mut self) {
        self.set_mode(Mode::Eval);
    }
}

/// A model that can be fitted with gradient descent.
///
/// `backward` accumulates gradients from the most recent train-mode
/// `forward`; `zero_grad` resets them. Optimizers read gradients and update
/// values through `parameters_mut`.
pub trait Trainable: Model {
    fn backward(&mut self, grad_output: &Matrix) -> Result<()>;

    fn zero_grad(&mut self);

    fn parameters_mut(&mut self) -> Vec<Param<'_>>;

    fn load_state_dict(&mut self, state: &StateDict) -> Result<()>;
}

pub mod activation;

pub use activation::{log_softmax, softmax, softmax_backward, ActivationFunction};

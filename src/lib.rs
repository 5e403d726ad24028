pub mod error;
pub mod math;
pub mod activation;
pub mod layers;
pub mod network;
pub mod loss;
pub mod optim;
pub mod data;
pub mod train;
pub mod distill;
pub mod quant;
pub mod config;
pub mod logging;

// Convenience re-exports
pub use error::{Error, Result};
pub use math::matrix::Matrix;
pub use activation::activation::ActivationFunction;
pub use layers::dense::Dense;
pub use network::{Mode, Model, Network, NetworkSpec, StateDict, Trainable};
pub use loss::{CrossEntropyLoss, KlDivLoss, MseLoss};
pub use optim::{Adam, Optimizer, Sgd};
pub use data::{DataLoader, Dataset};
pub use train::{TrainOptions, TrainingReport};
pub use distill::{DistillConfig, Distiller, KdLoss, SoftTarget};
pub use quant::{DynamicQuantizer, QConfig, QatQuantizer, Quantizer, QuantizerState, StaticQuantizer};
pub use config::RunConfig;

pub mod model;
pub mod network;
pub mod spec;
pub mod state;

pub use model::{Mode, Model, Param, Trainable};
pub use network::Network;
pub use spec::{LayerSpec, NetworkSpec};
pub use state::{StateDict, Tensor, TensorData};

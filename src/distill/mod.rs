//! Teacher-student knowledge distillation.
//!
//! [`Distiller`] runs the teacher and student training loops; a method plugs
//! in by implementing [`KdLoss`]. [`SoftTarget`] is the temperature-softened
//! response-matching method with an MSE or KL soft term.
//!
//! ```no_run
//! use ferrite_kd::data::{synthetic, DataLoader};
//! use ferrite_kd::distill::{DistillConfig, Distiller, SoftTarget};
//! use ferrite_kd::network::{Network, NetworkSpec};
//! use ferrite_kd::optim::Sgd;
//! use ferrite_kd::train::TrainOptions;
//! use ferrite_kd::ActivationFunction;
//!
//! # fn main() -> ferrite_kd::Result<()> {
//! let (train, val) = synthetic::blobs(300, 4, 3, 3.0, 7)?.split(0.2, 7)?;
//! let teacher = Network::from_spec(&NetworkSpec::mlp("teacher", &[4, 32, 3], ActivationFunction::ReLU))?;
//! let student = Network::from_spec(&NetworkSpec::mlp("student", &[4, 4, 3], ActivationFunction::ReLU))?;
//! let mut kd = Distiller::new(
//!     teacher,
//!     student,
//!     DataLoader::new(train, 32)?.shuffle(7),
//!     DataLoader::new(val, 64)?,
//!     Box::new(Sgd::new(0.05).momentum(0.9)),
//!     Box::new(Sgd::new(0.05).momentum(0.9)),
//!     DistillConfig::default(),
//!     SoftTarget,
//! )?;
//! kd.train_teacher(&TrainOptions::teacher_defaults())?;
//! kd.train_student(&TrainOptions::student_defaults())?;
//! kd.evaluate(false)?;
//! # Ok(())
//! # }
//! ```

pub mod base;
pub mod config;
pub mod soft_target;

pub use base::{Distiller, KdLoss, ParameterCounts};
pub use config::{DistillConfig, KdLossKind};
pub use soft_target::SoftTarget;

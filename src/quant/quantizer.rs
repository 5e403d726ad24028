use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::info;

use crate::data::loader::DataLoader;
use crate::error::{Error, Result};
use crate::loss::Criterion;
use crate::network::model::Model;
use crate::network::network::Network;
use crate::optim::optimizer::Optimizer;
use crate::quant::qconfig::QConfig;
use crate::quant::qnetwork::QuantizedNetwork;
use crate::train::eval::evaluate_accuracy;

/// Serialized sizes of the original and quantized models, in megabytes
/// (encoded bytes / 1e6).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelSizes {
    pub original_mb: f64,
    pub quantized_mb: f64,
}

impl ModelSizes {
    pub fn compression_ratio(&self) -> f64 {
        self.original_mb / self.quantized_mb
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelPerformance {
    pub accuracy: f64,
    /// Wall time of one full pass over the test loader.
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub original: ModelPerformance,
    pub quantized: ModelPerformance,
}

/// Everything a quantization run works with.
///
/// `quantized_model` is `None` until `quantize` runs; until then every
/// report treats the original model as the quantized one.
pub struct QuantizerState {
    pub model: Network,
    pub quantized_model: Option<QuantizedNetwork>,
    pub qconfig: QConfig,
    pub train_loader: Option<DataLoader>,
    pub test_loader: Option<DataLoader>,
    pub optimizer: Option<Box<dyn Optimizer>>,
    pub criterion: Option<Box<dyn Criterion>>,
}

impl QuantizerState {
    pub fn new(model: Network, qconfig: QConfig) -> Result<QuantizerState> {
        qconfig.validate()?;
        Ok(QuantizerState {
            model,
            quantized_model: None,
            qconfig,
            train_loader: None,
            test_loader: None,
            optimizer: None,
            criterion: None,
        })
    }

    pub fn with_train_loader(mut self, loader: DataLoader) -> Self {
        self.train_loader = Some(loader);
        self
    }

    pub fn with_test_loader(mut self, loader: DataLoader) -> Self {
        self.test_loader = Some(loader);
        self
    }

    pub fn with_optimizer(mut self, optimizer: Box<dyn Optimizer>) -> Self {
        self.optimizer = Some(optimizer);
        self
    }

    pub fn with_criterion(mut self, criterion: Box<dyn Criterion>) -> Self {
        self.criterion = Some(criterion);
        self
    }

    pub(crate) fn require_train_loader(&self) -> Result<&DataLoader> {
        self.train_loader.as_ref().ok_or(Error::MissingComponent("train_loader"))
    }
}

/// A quantization method.
///
/// Implementors supply `quantize`; size and performance reporting are shared.
pub trait Quantizer {
    fn state(&self) -> &QuantizerState;

    fn state_mut(&mut self) -> &mut QuantizerState;

    /// Produces the quantized model and stores it in the state.
    fn quantize(&mut self) -> Result<&QuantizedNetwork>;

    fn quantized_model(&self) -> Option<&QuantizedNetwork> {
        self.state().quantized_model.as_ref()
    }

    /// Checkpoint sizes in MB, measured on the serialized state dicts.
    ///
    /// Each quantized layer carries extra scale and zero point tensors, so on
    /// very small layers the header entries cost more than the int8 codes
    /// save and the quantized size can exceed the original.
    fn get_model_sizes(&self) -> Result<ModelSizes> {
        let state = self.state();
        let original_bytes = state.model.state_dict().size_bytes()?;
        let quantized_bytes = match &state.quantized_model {
            Some(q) => q.state_dict().size_bytes()?,
            None => original_bytes,
        };
        let sizes = ModelSizes {
            original_mb: original_bytes as f64 / 1e6,
            quantized_mb: quantized_bytes as f64 / 1e6,
        };
        info!("Size of original model (MB): {}", sizes.original_mb);
        info!("Size of quantized model (MB): {}", sizes.quantized_mb);
        Ok(sizes)
    }

    /// Accuracy and evaluation wall time of both models on the test loader.
    fn get_performance_statistics(&mut self) -> Result<PerformanceReport> {
        let state = self.state_mut();
        let loader = state.test_loader.as_ref().ok_or(Error::MissingComponent("test_loader"))?;

        info!("Getting performance statistics for the original model...");
        let original = timed_accuracy(&mut state.model, loader)?;
        info!("Accuracy: {}, elapsed: {:?}", original.accuracy, original.elapsed);

        info!("Getting performance statistics for the quantized model...");
        let quantized = match state.quantized_model.as_mut() {
            Some(q) => timed_accuracy(q, loader)?,
            None => timed_accuracy(&mut state.model, loader)?,
        };
        info!("Accuracy: {}, elapsed: {:?}", quantized.accuracy, quantized.elapsed);

        Ok(PerformanceReport { original, quantized })
    }
}

fn timed_accuracy<M: Model + ?Sized>(model: &mut M, loader: &DataLoader) -> Result<ModelPerformance> {
    let start = Instant::now();
    let accuracy = evaluate_accuracy(model, loader)?;
    Ok(ModelPerformance { accuracy, elapsed: start.elapsed() })
}

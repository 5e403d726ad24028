use tracing::{info, warn};

use crate::data::loader::DataLoader;
use crate::error::Result;
use crate::network::model::Mode;
use crate::network::network::Network;
use crate::quant::observer::Observer;
use crate::quant::qconfig::{QConfig, QuantScheme};
use crate::quant::qnetwork::QuantizedNetwork;
use crate::quant::qtensor::QuantParams;
use crate::quant::quantizer::{Quantizer, QuantizerState};

/// Post-training quantization of weights and layer inputs.
///
/// Input ranges are calibrated by running the float model over the first
/// `qconfig.calibration_batches` batches of the train loader.
pub struct StaticQuantizer {
    state: QuantizerState,
}

impl StaticQuantizer {
    pub fn new(state: QuantizerState) -> StaticQuantizer {
        StaticQuantizer { state }
    }
}

impl Quantizer for StaticQuantizer {
    fn state(&self) -> &QuantizerState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut QuantizerState {
        &mut self.state
    }

    fn quantize(&mut self) -> Result<&QuantizedNetwork> {
        let loader = self.state.require_train_loader()?;
        let input_params = calibrate(&self.state.model, loader, &self.state.qconfig)?;
        info!(layers = input_params.len(), "Quantizing weights and activations...");
        let quantized = QuantizedNetwork::from_network(&self.state.model, &self.state.qconfig)?
            .with_input_params(input_params)?;
        Ok(self.state.quantized_model.insert(quantized))
    }
}

/// Observes the input of every layer on a copy of `model` and returns one
/// asymmetric per-tensor parameter set per layer.
pub fn calibrate(model: &Network, loader: &DataLoader, qconfig: &QConfig) -> Result<Vec<QuantParams>> {
    let mut model = model.clone();
    let mut observers = vec![Observer::new(qconfig.observer); model.layers.len()];

    for batch in loader.iter_epoch().take(qconfig.calibration_batches) {
        let mut x = batch.inputs;
        for (layer, observer) in model.layers.iter_mut().zip(observers.iter_mut()) {
            observer.observe(&x.data);
            x = layer.forward(&x, Mode::Eval)?;
        }
    }

    let seen = observers.first().map_or(0, Observer::batches);
    if seen < qconfig.calibration_batches {
        warn!(seen, requested = qconfig.calibration_batches, "loader ran out before calibration finished");
    }
    observers.iter()
        .map(|o| o.params(QuantScheme::Asymmetric, qconfig.bits))
        .collect()
}

use tracing::info;

use crate::error::Result;
use crate::quant::qnetwork::QuantizedNetwork;
use crate::quant::quantizer::{Quantizer, QuantizerState};

/// Post-training, weight-only quantization. Needs no data.
pub struct DynamicQuantizer {
    state: QuantizerState,
}

impl DynamicQuantizer {
    pub fn new(state: QuantizerState) -> DynamicQuantizer {
        DynamicQuantizer { state }
    }
}

impl Quantizer for DynamicQuantizer {
    fn state(&self) -> &QuantizerState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut QuantizerState {
        &mut self.state
    }

    fn quantize(&mut self) -> Result<&QuantizedNetwork> {
        let QuantizerState { model, qconfig, quantized_model, .. } = &mut self.state;
        info!(bits = qconfig.bits, granularity = ?qconfig.granularity, "Quantizing weights...");
        let quantized = QuantizedNetwork::from_network(model, qconfig)?;
        Ok(quantized_model.insert(quantized))
    }
}

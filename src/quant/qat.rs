use tracing::info;

use crate::data::loader::Batch;
use crate::error::{Error, Result};
use crate::loss::Criterion;
use crate::math::matrix::Matrix;
use crate::network::model::{Model, Trainable};
use crate::network::network::Network;
use crate::optim::optimizer::Optimizer;
use crate::quant::qconfig::QConfig;
use crate::quant::qnetwork::QuantizedNetwork;
use crate::quant::qtensor::fake_quantize;
use crate::quant::quantizer::{Quantizer, QuantizerState};
use crate::train::eval::count_correct;
use crate::train::loop_fn::{run_epochs, BatchOutcome, TrainingReport};
use crate::train::train_options::TrainOptions;

/// Quantization-aware training.
///
/// The float model is fine-tuned for `qconfig.qat_epochs` with weights
/// fake-quantized in the forward pass. Gradients computed against the
/// quantized weights are applied to the float weights unchanged
/// (straight-through estimator), then the tuned model is quantized.
pub struct QatQuantizer {
    state: QuantizerState,
    report: Option<TrainingReport>,
}

impl QatQuantizer {
    pub fn new(state: QuantizerState) -> QatQuantizer {
        QatQuantizer { state, report: None }
    }

    /// Report of the last fine-tuning run.
    pub fn report(&self) -> Option<&TrainingReport> {
        self.report.as_ref()
    }
}

impl Quantizer for QatQuantizer {
    fn state(&self) -> &QuantizerState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut QuantizerState {
        &mut self.state
    }

    fn quantize(&mut self) -> Result<&QuantizedNetwork> {
        let QuantizerState {
            model,
            quantized_model,
            qconfig,
            train_loader,
            optimizer,
            criterion,
            ..
        } = &mut self.state;
        let loader = train_loader.as_ref().ok_or(Error::MissingComponent("train_loader"))?;
        let optimizer = optimizer.as_deref_mut().ok_or(Error::MissingComponent("optimizer"))?;
        let criterion = criterion.as_deref().ok_or(Error::MissingComponent("criterion"))?;
        let qconfig = *qconfig;

        let options = TrainOptions::new(qconfig.qat_epochs, "")
            .save_model(false)
            .plot_losses(false);
        info!(epochs = qconfig.qat_epochs, "Fine-tuning with fake-quantized weights...");
        model.train();
        let report = run_epochs("qat", model, loader, &options, |net, batch| {
            qat_step(net, optimizer, criterion, batch, &qconfig)
        })?;
        model.eval();
        self.report = Some(report);

        info!("Quantizing fine-tuned weights...");
        let quantized = QuantizedNetwork::from_network(model, &qconfig)?;
        Ok(quantized_model.insert(quantized))
    }
}

fn qat_step(
    net: &mut Network,
    optimizer: &mut dyn Optimizer,
    criterion: &dyn Criterion,
    batch: &Batch,
    qconfig: &QConfig,
) -> Result<BatchOutcome> {
    let float_weights: Vec<Matrix> = net.layers.iter_mut()
        .map(|layer| {
            let fq = fake_quantize(&layer.weights, qconfig);
            std::mem::replace(&mut layer.weights, fq)
        })
        .collect();

    let pass = forward_backward(net, optimizer, criterion, batch);

    // float weights go back before the update, whatever the pass returned
    for (layer, w) in net.layers.iter_mut().zip(float_weights) {
        layer.weights = w;
    }
    let outcome = pass?;
    optimizer.step(net)?;
    Ok(outcome)
}

fn forward_backward(
    net: &mut Network,
    optimizer: &mut dyn Optimizer,
    criterion: &dyn Criterion,
    batch: &Batch,
) -> Result<BatchOutcome> {
    let logits = net.forward(&batch.inputs)?;
    let correct = count_correct(&logits, &batch.labels);
    let loss = criterion.compute(&logits, &batch.labels)?;
    optimizer.zero_grad(net);
    net.backward(&loss.grad)?;
    Ok(BatchOutcome { loss: loss.value, correct })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::activation::ActivationFunction;
    use crate::data::{loader::DataLoader, synthetic};
    use crate::loss::CrossEntropyLoss;
    use crate::network::NetworkSpec;
    use crate::optim::Sgd;

    fn state(epochs: usize) -> QuantizerState {
        let net = Network::from_spec(
            &NetworkSpec::mlp("qat", &[2, 8, 2], ActivationFunction::Tanh).with_seed(8),
        ).unwrap();
        let qconfig = QConfig { qat_epochs: epochs, ..QConfig::default_per_tensor() };
        QuantizerState::new(net, qconfig)
            .unwrap()
            .with_train_loader(DataLoader::new(synthetic::circles(64).unwrap(), 16).unwrap())
    }

    #[test]
    fn runs_requested_epochs_then_quantizes() {
        let st = state(2)
            .with_optimizer(Box::new(Sgd::new(0.05)))
            .with_criterion(Box::new(CrossEntropyLoss));
        let mut q = QatQuantizer::new(st);
        let layers = q.quantize().unwrap().layers.len();
        assert_eq!(layers, 2);
        assert_eq!(q.report().unwrap().epochs_run, 2);
        assert!(q.quantized_model().is_some());
    }

    #[test]
    fn weights_stay_float_after_a_step() {
        let st = state(1)
            .with_optimizer(Box::new(Sgd::new(0.01)))
            .with_criterion(Box::new(CrossEntropyLoss));
        let mut q = QatQuantizer::new(st);
        q.quantize().unwrap();
        let w = &q.state().model.layers[0].weights;
        let fq = fake_quantize(w, &q.state().qconfig);
        // the float master copy is not snapped to the integer grid
        assert_ne!(w, &fq);
    }

    #[test]
    fn missing_optimizer_is_reported() {
        let mut q = QatQuantizer::new(state(1).with_criterion(Box::new(CrossEntropyLoss)));
        assert!(matches!(q.quantize(), Err(Error::MissingComponent("optimizer"))));
    }
}

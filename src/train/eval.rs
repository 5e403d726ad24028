use tracing::debug;

use crate::data::loader::DataLoader;
use crate::error::Result;
use crate::math::matrix::Matrix;
use crate::network::model::{Mode, Model};

/// Number of rows whose argmax logit equals the label.
pub fn count_correct(logits: &Matrix, labels: &[usize]) -> usize {
    logits.argmax_rows()
        .into_iter()
        .zip(labels)
        .filter(|(pred, label)| pred == *label)
        .count()
}

/// Fraction of `loader`'s samples classified correctly, computed in eval mode.
///
/// The model's previous mode is restored afterwards.
pub fn evaluate_accuracy<M: Model + ?Sized>(model: &mut M, loader: &DataLoader) -> Result<f64> {
    let previous = model.mode();
    model.set_mode(Mode::Eval);

    let mut correct = 0usize;
    let result = loader.iter_epoch().try_for_each(|batch| -> Result<()> {
        let logits = model.forward(&batch.inputs)?;
        correct += count_correct(&logits, &batch.labels);
        Ok(())
    });
    model.set_mode(previous);
    result?;

    let accuracy = correct as f64 / loader.dataset_len() as f64;
    debug!(correct, total = loader.dataset_len(), accuracy, "evaluated model");
    Ok(accuracy)
}

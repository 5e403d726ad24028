use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::data::loader::{Batch, DataLoader};
use crate::error::Result;
use crate::loss::Criterion;
use crate::network::model::Trainable;
use crate::optim::optimizer::Optimizer;
use crate::train::best::BestSnapshot;
use crate::train::epoch_stats::EpochStats;
use crate::train::eval::count_correct;
use crate::train::history::LossHistory;
use crate::train::train_options::TrainOptions;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// What one optimization step reports back to the epoch driver.
#[derive(Debug, Clone, Copy)]
pub struct BatchOutcome {
    pub loss: f64,
    pub correct: usize,
}

/// Summary of a finished training run.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub run: String,
    pub epochs_run: usize,
    pub loss_history: LossHistory,
    pub accuracy_history: Vec<f64>,
    /// Accuracy of the restored snapshot (0.0 if no epoch improved on it).
    pub best_accuracy: f64,
    /// Epoch of the restored snapshot; `None` means the initial weights were kept.
    pub best_epoch: Option<usize>,
    pub saved_to: Option<PathBuf>,
    pub plot: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Drives `options.epochs` passes over `loader`, calling `step` once per batch.
///
/// `step` does the forward/backward/update work and reports the batch loss and
/// number of correct predictions. The driver accumulates the epoch loss (sum of
/// batch losses) and accuracy (correct / dataset length), keeps the best-accuracy
/// snapshot, and when done restores that snapshot into `model`, then saves and
/// plots as requested.
///
/// # Early termination
/// The loop breaks early if:
/// - the `progress_tx` receiver has been dropped, **or**
/// - `options.stop_flag` is set to `true`.
pub fn run_epochs<M, F>(
    run: &str,
    model: &mut M,
    loader: &DataLoader,
    options: &TrainOptions,
    mut step: F,
) -> Result<TrainingReport>
where
    M: Trainable + ?Sized,
    F: FnMut(&mut M, &Batch) -> Result<BatchOutcome>,
{
    if options.epochs == 0 {
        warn!(run, "no epochs requested; keeping initial weights");
    }

    let mut best = BestSnapshot::new(model.state_dict());
    let mut loss_history = LossHistory::default();
    let mut accuracy_history = Vec::with_capacity(options.epochs);
    let dataset_len = loader.dataset_len() as f64;

    for epoch in 1..=options.epochs {
        if stop_requested(options) {
            break;
        }

        let t_start = Instant::now();
        let mut epoch_loss = 0.0;
        let mut correct = 0usize;

        for (i, batch) in loader.iter_epoch().enumerate() {
            let outcome = step(model, &batch)?;
            debug!(run, epoch, batch = i, loss = outcome.loss, "batch done");
            epoch_loss += outcome.loss;
            correct += outcome.correct;
        }

        let accuracy = correct as f64 / dataset_len;
        let improved = best.observe(epoch, accuracy, || model.state_dict());
        loss_history.push(epoch_loss);
        accuracy_history.push(accuracy);

        info!(run, "Epoch: {epoch}, Loss: {epoch_loss:.6}, Accuracy: {accuracy:.4}");

        let stats = EpochStats {
            run: run.to_string(),
            epoch,
            total_epochs: options.epochs,
            loss: epoch_loss,
            accuracy,
            improved,
            elapsed_ms: t_start.elapsed().as_millis() as u64,
        };
        if let Some(ref tx) = options.progress_tx {
            // If the receiver has been dropped, stop training.
            if tx.send(stats).is_err() {
                break;
            }
        }
    }

    let epochs_run = loss_history.len();
    let best_accuracy = best.accuracy();
    let best_epoch = best.epoch();
    model.load_state_dict(best.state())?;
    match best_epoch {
        Some(e) => info!(run, best_epoch = e, best_accuracy, "restored best weights"),
        None => info!(run, "no epoch improved on the initial weights"),
    }

    let saved_to = if options.save_model {
        best.state().save(&options.save_model_path)?;
        info!(run, path = %options.save_model_path.display(), "saved model");
        Some(options.save_model_path.clone())
    } else {
        None
    };

    let plot = if options.plot_losses {
        let path = options.plot_path();
        loss_history.plot(&path, &format!("{run} loss"))?;
        Some(path)
    } else {
        None
    };

    Ok(TrainingReport {
        run: run.to_string(),
        epochs_run,
        loss_history,
        accuracy_history,
        best_accuracy,
        best_epoch,
        saved_to,
        plot,
    })
}

/// Plain supervised training with `criterion` on hard labels.
pub fn train_supervised<M: Trainable>(
    run: &str,
    model: &mut M,
    optimizer: &mut dyn Optimizer,
    criterion: &dyn Criterion,
    loader: &DataLoader,
    options: &TrainOptions,
) -> Result<TrainingReport> {
    model.train();
    run_epochs(run, model, loader, options, |model, batch| {
        supervised_step(model, optimizer, criterion, batch)
    })
}

/// One forward/backward/update on a batch.
pub fn supervised_step<M: Trainable>(
    model: &mut M,
    optimizer: &mut dyn Optimizer,
    criterion: &dyn Criterion,
    batch: &Batch,
) -> Result<BatchOutcome> {
    let logits = model.forward(&batch.inputs)?;
    let correct = count_correct(&logits, &batch.labels);
    let loss = criterion.compute(&logits, &batch.labels)?;

    optimizer.zero_grad(model);
    model.backward(&loss.grad)?;
    optimizer.step(model)?;

    Ok(BatchOutcome { loss: loss.value, correct })
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn stop_requested(options: &TrainOptions) -> bool {
    options.stop_flag.as_ref().is_some_and(|flag| flag.load(Ordering::Relaxed))
}

use serde::{Serialize, Deserialize};

/// Per-epoch training statistics emitted by the epoch driver.
///
/// When a `progress_tx` channel is configured in `TrainOptions`, one
/// `EpochStats` value is sent at the end of every completed epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochStats {
    /// Which loop produced this epoch ("teacher", "student", "qat", ...).
    pub run: String,
    /// 1-based epoch number.
    pub epoch: usize,
    /// Total epochs requested for this run.
    pub total_epochs: usize,
    /// Sum of the batch losses over the epoch.
    pub loss: f64,
    /// Correct predictions / dataset length, in [0, 1].
    pub accuracy: f64,
    /// Whether this epoch set a new best accuracy (and so a new snapshot).
    pub improved: bool,
    /// Wall-clock duration of this single epoch in milliseconds.
    pub elapsed_ms: u64,
}

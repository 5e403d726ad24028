use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, atomic::AtomicBool};

use crate::train::epoch_stats::EpochStats;

/// Options for one run of a training loop.
///
/// # Fields
/// - `epochs`          : number of full passes over the training loader
/// - `plot_losses`     : write the per-epoch loss curve as an SVG next to the checkpoint
/// - `save_model`      : write the best weights to `save_model_path` when done
/// - `save_model_path` : safetensors checkpoint destination
/// - `progress_tx`     : optional channel; one `EpochStats` per completed epoch.
///                       If the receiver is dropped the loop stops early.
/// - `stop_flag`       : optional atomic flag; when set from another thread
///                       the loop stops after the current epoch.
///
/// Early stops still restore the best snapshot and honor `save_model`.
#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub epochs: usize,
    pub plot_losses: bool,
    pub save_model: bool,
    pub save_model_path: PathBuf,
    pub progress_tx: Option<mpsc::Sender<EpochStats>>,
    pub stop_flag: Option<Arc<AtomicBool>>,
}

impl TrainOptions {
    pub fn new(epochs: usize, save_model_path: impl Into<PathBuf>) -> Self {
        TrainOptions {
            epochs,
            plot_losses: true,
            save_model: true,
            save_model_path: save_model_path.into(),
            progress_tx: None,
            stop_flag: None,
        }
    }

    /// 20 epochs, plotting on, saving to `./models/teacher.safetensors`.
    pub fn teacher_defaults() -> Self {
        TrainOptions::new(20, "./models/teacher.safetensors")
    }

    /// 10 epochs, plotting on, saving to `./models/student.safetensors`.
    pub fn student_defaults() -> Self {
        TrainOptions::new(10, "./models/student.safetensors")
    }

    pub fn epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn plot_losses(mut self, plot: bool) -> Self {
        self.plot_losses = plot;
        self
    }

    pub fn save_model(mut self, save: bool) -> Self {
        self.save_model = save;
        self
    }

    pub fn save_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.save_model_path = path.into();
        self
    }

    pub fn with_progress(mut self, tx: mpsc::Sender<EpochStats>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop_flag = Some(flag);
        self
    }

    /// `models/student.safetensors` → `models/student_losses.svg`.
    pub fn plot_path(&self) -> PathBuf {
        plot_path_for(&self.save_model_path)
    }
}

fn plot_path_for(checkpoint: &Path) -> PathBuf {
    let stem = checkpoint
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model".to_string());
    checkpoint.with_file_name(format!("{stem}_losses.svg"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_teacher_and_student_conventions() {
        let t = TrainOptions::teacher_defaults();
        assert_eq!(t.epochs, 20);
        assert!(t.plot_losses && t.save_model);
        assert_eq!(TrainOptions::student_defaults().epochs, 10);
    }

    #[test]
    fn plot_sits_next_to_checkpoint() {
        let opts = TrainOptions::new(1, "out/models/student.safetensors");
        assert_eq!(opts.plot_path(), PathBuf::from("out/models/student_losses.svg"));
    }
}

pub mod best;
pub mod epoch_stats;
pub mod eval;
pub mod history;
pub mod loop_fn;
pub mod train_options;

pub use best::BestSnapshot;
pub use epoch_stats::EpochStats;
pub use eval::{count_correct, evaluate_accuracy};
pub use history::LossHistory;
pub use loop_fn::{run_epochs, supervised_step, train_supervised, BatchOutcome, TrainingReport};
pub use train_options::TrainOptions;

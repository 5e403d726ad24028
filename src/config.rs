//! JSON run configuration shared by the `distill` and `quantize` commands.
//!
//! Every field has a default, so `{}` is a valid config that distills a
//! 4-64-64-3 teacher into a 4-8-3 student on synthetic blobs.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::activation::activation::ActivationFunction;
use crate::data::{load_csv, synthetic, DataLoader, Dataset};
use crate::distill::DistillConfig;
use crate::error::{Error, Result};
use crate::network::NetworkSpec;
use crate::optim::OptimizerConfig;
use crate::quant::QConfig;
use crate::train::TrainOptions;

/// Where samples come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataSource {
    /// Numeric CSV; last column is the class index.
    Csv { path: PathBuf },
    Blobs { samples: usize, features: usize, classes: usize, separation: f64 },
    Circles { samples: usize },
    Xor,
}

impl Default for DataSource {
    fn default() -> Self {
        DataSource::Blobs { samples: 600, features: 4, classes: 3, separation: 2.5 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantMethod {
    #[default]
    Dynamic,
    Static,
    Qat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub data: DataSource,
    /// Fraction of samples held out for validation / testing.
    pub val_split: f64,
    pub batch_size: usize,
    /// Seeds the split, the loader shuffle and synthetic data.
    pub seed: u64,
    pub teacher: NetworkSpec,
    pub student: NetworkSpec,
    pub optimizer: OptimizerConfig,
    pub distill: DistillConfig,
    pub qconfig: QConfig,
    pub quant_method: QuantMethod,
    pub teacher_epochs: usize,
    pub student_epochs: usize,
    pub plot_losses: bool,
    /// Checkpoints and loss plots are written here.
    pub output_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            data: DataSource::default(),
            val_split: 0.2,
            batch_size: 32,
            seed: 42,
            teacher: NetworkSpec::mlp("teacher", &[4, 64, 64, 3], ActivationFunction::ReLU).with_seed(1),
            student: NetworkSpec::mlp("student", &[4, 8, 3], ActivationFunction::ReLU).with_seed(2),
            optimizer: OptimizerConfig::default(),
            distill: DistillConfig::default(),
            qconfig: QConfig::default(),
            quant_method: QuantMethod::default(),
            teacher_epochs: 20,
            student_epochs: 10,
            plot_losses: true,
            output_dir: PathBuf::from("./models"),
        }
    }
}

impl RunConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<RunConfig> {
        let file = std::fs::File::open(path)?;
        let config: RunConfig = serde_json::from_reader(std::io::BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.val_split > 0.0 && self.val_split < 1.0) {
            return Err(Error::InvalidConfig(format!("val_split must be in (0, 1), got {}", self.val_split)));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be at least 1".into()));
        }
        self.teacher.validate()?;
        self.student.validate()?;
        self.distill.validate()?;
        self.qconfig.validate()?;
        self.optimizer.build()?;

        let ends = |s: &NetworkSpec| {
            (s.layers.first().map(|l| l.input_size), s.layers.last().map(|l| l.size))
        };
        if ends(&self.teacher) != ends(&self.student) {
            return Err(Error::InvalidConfig(format!(
                "teacher '{}' and student '{}' must share input and output widths",
                self.teacher.name, self.student.name
            )));
        }
        Ok(())
    }

    pub fn load_dataset(&self) -> Result<Dataset> {
        match &self.data {
            DataSource::Csv { path } => load_csv(path),
            DataSource::Blobs { samples, features, classes, separation } => {
                synthetic::blobs(*samples, *features, *classes, *separation, self.seed)
            }
            DataSource::Circles { samples } => synthetic::circles(*samples),
            DataSource::Xor => synthetic::xor(),
        }
    }

    /// Splits the dataset into a shuffled train loader and a validation loader.
    ///
    /// Fails if the data's width does not match the teacher's input.
    pub fn loaders(&self) -> Result<(DataLoader, DataLoader)> {
        let dataset = self.load_dataset()?;
        let expected = self.teacher.layers.first().map_or(0, |l| l.input_size);
        if dataset.num_features() != expected {
            return Err(Error::Dataset(format!(
                "data has {} features but '{}' expects {expected}",
                dataset.num_features(), self.teacher.name
            )));
        }
        let (train, val) = dataset.split(self.val_split, self.seed)?;
        Ok((
            DataLoader::new(train, self.batch_size)?.shuffle(self.seed),
            DataLoader::new(val, self.batch_size)?,
        ))
    }

    pub fn teacher_checkpoint(&self) -> PathBuf {
        self.output_dir.join(format!("{}.safetensors", self.teacher.name))
    }

    pub fn student_checkpoint(&self) -> PathBuf {
        self.output_dir.join(format!("{}.safetensors", self.student.name))
    }

    pub fn teacher_options(&self) -> TrainOptions {
        TrainOptions::new(self.teacher_epochs, self.teacher_checkpoint()).plot_losses(self.plot_losses)
    }

    pub fn student_options(&self) -> TrainOptions {
        TrainOptions::new(self.student_epochs, self.student_checkpoint()).plot_losses(self.plot_losses)
    }
}

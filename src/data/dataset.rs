use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::error::{Error, Result};

/// In-memory classification dataset: one feature row and one class index per sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    inputs: Vec<Vec<f64>>,
    labels: Vec<usize>,
}

impl Dataset {
    pub fn new(inputs: Vec<Vec<f64>>, labels: Vec<usize>) -> Result<Dataset> {
        if inputs.len() != labels.len() {
            return Err(Error::Dataset(format!(
                "{} samples but {} labels", inputs.len(), labels.len()
            )));
        }
        if inputs.is_empty() {
            return Err(Error::Dataset("dataset is empty".into()));
        }
        let width = inputs[0].len();
        if width == 0 {
            return Err(Error::Dataset("samples have no features".into()));
        }
        if let Some(i) = inputs.iter().position(|row| row.len() != width) {
            return Err(Error::Dataset(format!(
                "sample {i} has {} features, expected {width}", inputs[i].len()
            )));
        }
        Ok(Dataset { inputs, labels })
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn num_features(&self) -> usize {
        self.inputs[0].len()
    }

    /// Highest label + 1.
    pub fn num_classes(&self) -> usize {
        self.labels.iter().max().map_or(0, |m| m + 1)
    }

    pub fn inputs(&self) -> &[Vec<f64>] {
        &self.inputs
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn sample(&self, idx: usize) -> (&[f64], usize) {
        (&self.inputs[idx], self.labels[idx])
    }

    /// Shuffles with `seed` and splits off the last `fraction` of samples.
    ///
    /// Returns `(train, holdout)`. Both halves must end up non-empty.
    pub fn split(&self, fraction: f64, seed: u64) -> Result<(Dataset, Dataset)> {
        if !(0.0..1.0).contains(&fraction) || fraction == 0.0 {
            return Err(Error::InvalidConfig(format!(
                "split fraction must be in (0, 1), got {fraction}"
            )));
        }
        let mut indices: Vec<usize> = (0..self.len()).collect();
        indices.shuffle(&mut StdRng::seed_from_u64(seed));

        let holdout = ((self.len() as f64) * fraction).round() as usize;
        let cut = self.len() - holdout.clamp(1, self.len().saturating_sub(1).max(1));
        let subset = |idx: &[usize]| {
            Dataset::new(
                idx.iter().map(|&i| self.inputs[i].clone()).collect(),
                idx.iter().map(|&i| self.labels[i]).collect(),
            )
        };
        Ok((subset(&indices[..cut])?, subset(&indices[cut..])?))
    }
}

use std::cell::Cell;

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::data::dataset::Dataset;
use crate::error::{Error, Result};
use crate::math::matrix::Matrix;

/// One mini-batch: inputs stacked row-wise plus their class labels.
#[derive(Debug, Clone)]
pub struct Batch {
    pub inputs: Matrix,
    pub labels: Vec<usize>,
}

/// Splits a dataset into mini-batches, optionally reshuffled every epoch.
///
/// With shuffling enabled, the order of epoch `k` is derived from
/// `seed + k`, so runs are reproducible.
#[derive(Debug, Clone)]
pub struct DataLoader {
    dataset: Dataset,
    batch_size: usize,
    shuffle_seed: Option<u64>,
    epoch: Cell<u64>,
}

impl DataLoader {
    pub fn new(dataset: Dataset, batch_size: usize) -> Result<DataLoader> {
        if batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be at least 1".into()));
        }
        Ok(DataLoader { dataset, batch_size, shuffle_seed: None, epoch: Cell::new(0) })
    }

    pub fn shuffle(mut self, seed: u64) -> DataLoader {
        self.shuffle_seed = Some(seed);
        self
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Number of samples; the denominator for accuracy.
    pub fn dataset_len(&self) -> usize {
        self.dataset.len()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    /// Batches for one pass over the data. The last batch may be short.
    pub fn iter_epoch(&self) -> impl Iterator<Item = Batch> + '_ {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if let Some(seed) = self.shuffle_seed {
            let epoch = self.epoch.get();
            self.epoch.set(epoch + 1);
            order.shuffle(&mut StdRng::seed_from_u64(seed.wrapping_add(epoch)));
        }

        let batch_size = self.batch_size;
        let cols = self.dataset.num_features();
        (0..order.len()).step_by(batch_size).map(move |start| {
            let idx = &order[start..(start + batch_size).min(order.len())];
            let mut data = Vec::with_capacity(idx.len() * cols);
            let mut labels = Vec::with_capacity(idx.len());
            for &i in idx {
                let (x, y) = self.dataset.sample(i);
                data.extend_from_slice(x);
                labels.push(y);
            }
            Batch { inputs: Matrix { rows: idx.len(), cols, data }, labels }
        })
    }
}

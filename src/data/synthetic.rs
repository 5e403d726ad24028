//! Built-in toy datasets for demos and tests.

use std::f64::consts::PI;

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::data::dataset::Dataset;
use crate::error::Result;

/// The XOR truth table: 4 samples, 2 inputs, 2 classes.
pub fn xor() -> Result<Dataset> {
    Dataset::new(
        vec![vec![0.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 1.0]],
        vec![0, 1, 1, 0],
    )
}

/// `n` points on two concentric circles (class 0 = inner, class 1 = outer),
/// normalized to [0, 1].
pub fn circles(n: usize) -> Result<Dataset> {
    let mut inputs = Vec::with_capacity(n);
    let mut labels = Vec::with_capacity(n);
    for i in 0..n {
        let class = i % 2;
        let angle = (i as f64 / n as f64) * 2.0 * PI * 10.0;
        let radius = if class == 0 { 0.3 } else { 0.8 };
        // deterministic jitter
        let noise = 0.05 * (i as f64 * 7.3).sin();
        let x = (radius + noise) * angle.cos();
        let y = (radius + noise) * angle.sin();
        inputs.push(vec![(x + 1.0) / 2.0, (y + 1.0) / 2.0]);
        labels.push(class);
    }
    Dataset::new(inputs, labels)
}

/// `n` samples drawn around `classes` Gaussian centers in `features` dimensions.
///
/// Centers sit on the unit hypercube's axes at distance `separation`, so the
/// classes are linearly separable for large separations.
pub fn blobs(n: usize, features: usize, classes: usize, separation: f64, seed: u64) -> Result<Dataset> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut inputs = Vec::with_capacity(n);
    let mut labels = Vec::with_capacity(n);
    for i in 0..n {
        let class = i % classes.max(1);
        let row = (0..features)
            .map(|f| {
                let center = if f % classes.max(1) == class { separation } else { 0.0 };
                center + (rng.gen::<f64>() - 0.5)
            })
            .collect();
        inputs.push(row);
        labels.push(class);
    }
    Dataset::new(inputs, labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_have_expected_shapes() {
        assert_eq!(xor().unwrap().len(), 4);
        let c = circles(50).unwrap();
        assert_eq!((c.len(), c.num_features(), c.num_classes()), (50, 2, 2));
        let b = blobs(30, 4, 3, 3.0, 1).unwrap();
        assert_eq!((b.len(), b.num_features(), b.num_classes()), (30, 4, 3));
    }

    #[test]
    fn blobs_are_reproducible() {
        assert_eq!(blobs(12, 3, 3, 2.0, 9).unwrap(), blobs(12, 3, 3, 2.0, 9).unwrap());
    }
}

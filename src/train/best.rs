use crate::network::state::StateDict;

/// Running maximum of epoch accuracy together with the weights that achieved it.
///
/// Starts from the weights the model had before training; a later epoch
/// replaces the snapshot only when its accuracy is strictly higher.
#[derive(Debug, Clone)]
pub struct BestSnapshot {
    accuracy: f64,
    epoch: Option<usize>,
    state: StateDict,
}

impl BestSnapshot {
    pub fn new(initial: StateDict) -> BestSnapshot {
        BestSnapshot { accuracy: 0.0, epoch: None, state: initial }
    }

    /// Records an epoch result; `snapshot` is only called on improvement.
    /// Returns whether the snapshot was replaced.
    pub fn observe<F>(&mut self, epoch: usize, accuracy: f64, snapshot: F) -> bool
    where
        F: FnOnce() -> StateDict,
    {
        if accuracy > self.accuracy {
            self.accuracy = accuracy;
            self.epoch = Some(epoch);
            self.state = snapshot();
            true
        } else {
            false
        }
    }

    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }

    /// Epoch of the current snapshot; `None` means the initial weights.
    pub fn epoch(&self) -> Option<usize> {
        self.epoch
    }

    pub fn state(&self) -> &StateDict {
        &self.state
    }

    pub fn into_state(self) -> StateDict {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::state::{Tensor, TensorData};

    fn marker(v: f64) -> StateDict {
        let mut s = StateDict::new();
        s.insert("m", Tensor::new(vec![1], TensorData::F64(vec![v])).unwrap());
        s
    }

    #[test]
    fn keeps_highest_accuracy_and_earliest_tie() {
        let mut best = BestSnapshot::new(marker(0.0));
        assert!(best.observe(1, 0.5, || marker(1.0)));
        assert!(best.observe(2, 0.8, || marker(2.0)));
        assert!(!best.observe(3, 0.8, || marker(3.0)));
        assert!(!best.observe(4, 0.6, || marker(4.0)));
        assert_eq!(best.epoch(), Some(2));
        assert_eq!(best.accuracy(), 0.8);
        assert_eq!(best.state(), &marker(2.0));
    }

    #[test]
    fn zero_accuracy_keeps_initial_weights() {
        let mut best = BestSnapshot::new(marker(7.0));
        assert!(!best.observe(1, 0.0, || panic!("snapshot taken without improvement")));
        assert_eq!(best.epoch(), None);
        assert_eq!(best.into_state(), marker(7.0));
    }
}

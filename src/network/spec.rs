use serde::{Serialize, Deserialize};

use crate::activation::activation::ActivationFunction;
use crate::error::{Error, Result};

/// Describes one layer in a network specification.
///
/// Fields:
/// - `size`       : number of neurons in this layer
/// - `input_size` : number of neurons feeding into this layer (the output
///                  size of the previous layer, or the raw input dimension for
///                  the first layer)
/// - `activation` : activation function applied after the linear transform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub size: usize,
    pub input_size: usize,
    pub activation: ActivationFunction,
}

/// A serializable description of a network architecture.
///
/// Teacher and student architectures are stored as `NetworkSpec` JSON so a
/// run can be reproduced without touching code. Weights live separately in
/// safetensors checkpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    /// Human-readable name, used in log lines and as a default file stem.
    pub name: String,
    /// Ordered list of layer descriptions (input → output).
    pub layers: Vec<LayerSpec>,
    /// Seed for weight initialization; `None` draws from the thread RNG.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub description: Option<String>,
}

impl NetworkSpec {
    /// Builds a spec from a list of layer widths, e.g. `[4, 16, 3]` gives
    /// `4 → 16 (hidden) → 3 (Identity logits)`.
    pub fn mlp(name: &str, widths: &[usize], hidden: ActivationFunction) -> NetworkSpec {
        let n = widths.len().saturating_sub(1);
        let layers = widths
            .windows(2)
            .enumerate()
            .map(|(i, w)| LayerSpec {
                size: w[1],
                input_size: w[0],
                activation: if i + 1 == n { ActivationFunction::Identity } else { hidden },
            })
            .collect();
        NetworkSpec { name: name.to_string(), layers, seed: None, description: None }
    }

    pub fn with_seed(mut self, seed: u64) -> NetworkSpec {
        self.seed = Some(seed);
        self
    }

    /// Checks that the spec is non-empty and that consecutive layers chain.
    pub fn validate(&self) -> Result<()> {
        let first = self.layers.first().ok_or_else(|| {
            Error::InvalidConfig(format!("network '{}' has no layers", self.name))
        })?;
        if first.input_size == 0 {
            return Err(Error::InvalidConfig(format!("network '{}' has zero-width input", self.name)));
        }
        for (i, pair) in self.layers.windows(2).enumerate() {
            if pair[0].size != pair[1].input_size {
                return Err(Error::InvalidConfig(format!(
                    "network '{}': layer {} outputs {} but layer {} expects {}",
                    self.name, i, pair[0].size, i + 1, pair[1].input_size
                )));
            }
        }
        if self.layers.iter().any(|l| l.size == 0) {
            return Err(Error::InvalidConfig(format!("network '{}' has an empty layer", self.name)));
        }
        Ok(())
    }

    /// Weights + biases the built network will have.
    pub fn num_parameters(&self) -> usize {
        self.layers.iter().map(|l| l.input_size * l.size + l.size).sum()
    }

    /// Serializes the spec to a pretty-printed JSON file.
    pub fn save_json(&self, path: &str) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Deserializes a `NetworkSpec` from a JSON file.
    pub fn load_json(path: &str) -> Result<NetworkSpec> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mlp_chains_layers_and_ends_in_logits() {
        let spec = NetworkSpec::mlp("t", &[4, 16, 8, 3], ActivationFunction::ReLU);
        spec.validate().unwrap();
        assert_eq!(spec.layers.len(), 3);
        assert_eq!(spec.layers[2].activation, ActivationFunction::Identity);
        assert_eq!(spec.layers[0].activation, ActivationFunction::ReLU);
        assert_eq!(spec.num_parameters(), 4 * 16 + 16 + 16 * 8 + 8 + 8 * 3 + 3);
    }

    #[test]
    fn validate_rejects_broken_chain() {
        let mut spec = NetworkSpec::mlp("t", &[4, 16, 3], ActivationFunction::ReLU);
        spec.layers[1].input_size = 15;
        assert!(matches!(spec.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn json_defaults_optional_fields() {
        let json = r#"{"name":"s","layers":[{"size":2,"input_size":3,"activation":"Identity"}]}"#;
        let spec: NetworkSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.seed, None);
        assert_eq!(spec.layers[0].input_size, 3);
    }
}

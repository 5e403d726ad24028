use tracing::debug;

use crate::activation::activation::ActivationFunction;
use crate::error::{Error, Result};
use crate::layers::dense::Dense;
use crate::math::matrix::Matrix;
use crate::network::model::{Mode, Model};
use crate::network::network::Network;
use crate::network::spec::NetworkSpec;
use crate::network::state::{StateDict, Tensor, TensorData};
use crate::quant::qconfig::{QConfig, QuantScheme};
use crate::quant::qtensor::{fake_quantize_with, QuantParams, QuantizedTensor};

/// Dense layer with integer weights.
///
/// Biases stay in floating point. When `input_params` is set (static
/// quantization) incoming activations are snapped to the calibrated grid
/// before the matmul.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedDense {
    weight: QuantizedTensor,
    // decoded once so inference pays only for the matmul
    decoded: Matrix,
    pub bias: Matrix,
    pub activator: ActivationFunction,
    pub input_params: Option<QuantParams>,
}

impl QuantizedDense {
    pub fn new(
        weight: QuantizedTensor,
        bias: Matrix,
        activator: ActivationFunction,
        input_params: Option<QuantParams>,
    ) -> QuantizedDense {
        let decoded = weight.dequantize();
        QuantizedDense { weight, decoded, bias, activator, input_params }
    }

    pub fn from_dense(dense: &Dense, qconfig: &QConfig) -> Result<QuantizedDense> {
        qconfig.validate()?;
        Ok(QuantizedDense::new(
            QuantizedTensor::quantize(&dense.weights, qconfig),
            dense.biases.clone(),
            dense.activator,
            None,
        ))
    }

    pub fn weight(&self) -> &QuantizedTensor {
        &self.weight
    }

    /// Weights as seen by the matmul.
    pub fn dequantized_weight(&self) -> &Matrix {
        &self.decoded
    }

    pub fn input_size(&self) -> usize {
        self.weight.shape[0]
    }

    pub fn size(&self) -> usize {
        self.weight.shape[1]
    }

    pub fn forward(&self, input: &Matrix) -> Result<Matrix> {
        if input.cols != self.input_size() {
            return Err(Error::shape(&[input.rows, self.input_size()], &input.shape()));
        }
        let x = match &self.input_params {
            Some(params) => fake_quantize_with(input, params),
            None => input.clone(),
        };
        let z = x.matmul(&self.decoded)?.add_row_vector(&self.bias)?;
        Ok(z.map(|v| self.activator.function(v)))
    }
}

/// Inference-only network of [`QuantizedDense`] layers.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedNetwork {
    pub layers: Vec<QuantizedDense>,
}

impl QuantizedNetwork {
    /// Weight-only quantization of every layer. Fails on a `qconfig` that
    /// does not validate, e.g. a bit width the `i8` codes cannot hold.
    pub fn from_network(network: &Network, qconfig: &QConfig) -> Result<QuantizedNetwork> {
        let layers = network.layers.iter()
            .map(|layer| QuantizedDense::from_dense(layer, qconfig))
            .collect::<Result<Vec<_>>>()?;
        Ok(QuantizedNetwork { layers })
    }

    /// Attaches calibrated input-activation parameters, one per layer.
    pub fn with_input_params(mut self, params: Vec<QuantParams>) -> Result<QuantizedNetwork> {
        if params.len() != self.layers.len() {
            return Err(Error::shape(&[self.layers.len()], &[params.len()]));
        }
        for (layer, p) in self.layers.iter_mut().zip(params) {
            layer.input_params = Some(p);
        }
        Ok(self)
    }

    pub fn is_static(&self) -> bool {
        self.layers.iter().all(|l| l.input_params.is_some())
    }

    /// Rebuilds a quantized network from a checkpoint written by `state_dict`.
    ///
    /// Activations and bit width are not stored in the checkpoint, so the
    /// architecture `spec` and the `qconfig` used at quantization time supply them.
    pub fn from_state_dict(state: &StateDict, spec: &NetworkSpec, qconfig: &QConfig) -> Result<QuantizedNetwork> {
        spec.validate()?;
        qconfig.validate()?;
        let bits = qconfig.bits;
        let layers = spec.layers.iter()
            .enumerate()
            .map(|(i, layer_spec)| -> Result<QuantizedDense> {
                let prefix = format!("layers.{i}");
                let weight_tensor = state.require(&format!("{prefix}.weight"))?;
                let codes = match &weight_tensor.data {
                    TensorData::I8(v) => v.clone(),
                    _ => return Err(Error::Serialization(format!("{prefix}.weight is not int8"))),
                };
                let weight_params = read_params(
                    state,
                    &format!("{prefix}.weight_scale"),
                    &format!("{prefix}.weight_zero_point"),
                    bits,
                )?;
                let weight = QuantizedTensor::from_parts(
                    codes,
                    weight_params,
                    [layer_spec.input_size, layer_spec.size],
                )?;
                let bias = state.require(&format!("{prefix}.bias"))?.to_matrix()?;
                if bias.shape() != [1, layer_spec.size] {
                    return Err(Error::shape(&[1, layer_spec.size], &bias.shape()));
                }
                let input_params = match state.get(&format!("{prefix}.input_scale")) {
                    Some(_) => Some(read_params(
                        state,
                        &format!("{prefix}.input_scale"),
                        &format!("{prefix}.input_zero_point"),
                        bits,
                    )?),
                    None => None,
                };
                Ok(QuantizedDense::new(weight, bias, layer_spec.activation, input_params))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(QuantizedNetwork { layers })
    }
}

impl Model for QuantizedNetwork {
    fn forward(&mut self, input: &Matrix) -> Result<Matrix> {
        let mut current = input.clone();
        for layer in &self.layers {
            current = layer.forward(&current)?;
        }
        Ok(current)
    }

    fn num_parameters(&self) -> usize {
        self.layers.iter().map(|l| l.weight.data.len() + l.bias.data.len()).sum()
    }

    fn state_dict(&self) -> StateDict {
        let mut state = StateDict::new();
        for (i, layer) in self.layers.iter().enumerate() {
            let prefix = format!("layers.{i}");
            let w = &layer.weight;
            state.insert(
                format!("{prefix}.weight"),
                Tensor { shape: w.shape.to_vec(), data: TensorData::I8(w.data.clone()) },
            );
            insert_params(&mut state, &prefix, "weight", &w.params);
            state.insert(format!("{prefix}.bias"), Tensor::from_matrix(&layer.bias));
            if let Some(p) = &layer.input_params {
                insert_params(&mut state, &prefix, "input", p);
            }
        }
        state
    }

    fn mode(&self) -> Mode {
        Mode::Eval
    }

    fn set_mode(&mut self, mode: Mode) {
        if mode == Mode::Train {
            debug!("quantized networks are inference-only; staying in eval mode");
        }
    }
}

fn insert_params(state: &mut StateDict, prefix: &str, what: &str, p: &QuantParams) {
    let n = p.num_groups();
    state.insert(
        format!("{prefix}.{what}_scale"),
        Tensor { shape: vec![n], data: TensorData::F32(p.scales.clone()) },
    );
    state.insert(
        format!("{prefix}.{what}_zero_point"),
        Tensor { shape: vec![n], data: TensorData::I32(p.zero_points.clone()) },
    );
}

fn read_params(state: &StateDict, scale_key: &str, zp_key: &str, bits: u8) -> Result<QuantParams> {
    let scales = match &state.require(scale_key)?.data {
        TensorData::F32(v) => v.clone(),
        _ => return Err(Error::Serialization(format!("{scale_key} is not f32"))),
    };
    let zero_points = match &state.require(zp_key)?.data {
        TensorData::I32(v) => v.clone(),
        _ => return Err(Error::Serialization(format!("{zp_key} is not i32"))),
    };
    if scales.len() != zero_points.len() {
        return Err(Error::shape(&[scales.len()], &[zero_points.len()]));
    }
    // a zero point anywhere means the grid was placed asymmetrically
    let scheme = if zero_points.iter().all(|&z| z == 0) {
        QuantScheme::Symmetric
    } else {
        QuantScheme::Asymmetric
    };
    Ok(QuantParams { scales, zero_points, scheme, bits })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> NetworkSpec {
        NetworkSpec::mlp("q", &[3, 6, 2], ActivationFunction::ReLU).with_seed(5)
    }

    fn batch() -> Matrix {
        Matrix::from_vec(2, 3, vec![0.3, -1.2, 0.8, 1.0, 0.0, -0.4]).unwrap()
    }

    #[test]
    fn quantized_outputs_track_float_outputs() {
        let mut net = Network::from_spec(&spec()).unwrap();
        net.eval();
        let mut q = QuantizedNetwork::from_network(&net, &QConfig::default_per_channel()).unwrap();
        let float_out = net.forward(&batch()).unwrap();
        let q_out = q.forward(&batch()).unwrap();
        for (a, b) in float_out.data.iter().zip(&q_out.data) {
            assert!((a - b).abs() < 0.1, "{a} vs {b}");
        }
    }

    #[test]
    fn quantized_state_is_smaller_for_wide_layers() {
        let wide = NetworkSpec::mlp("wide", &[4, 48, 48, 3], ActivationFunction::ReLU).with_seed(5);
        let net = Network::from_spec(&wide).unwrap();
        let q = QuantizedNetwork::from_network(&net, &QConfig::default_per_tensor()).unwrap();
        assert!(q.state_dict().size_bytes().unwrap() * 3 < net.state_dict().size_bytes().unwrap());
        assert_eq!(q.num_parameters(), net.num_parameters());
    }

    #[test]
    fn scale_headers_outweigh_savings_on_tiny_layers() {
        // a handful of weights saves fewer bytes than the extra scale and
        // zero point entries cost in the header
        let net = Network::from_spec(&spec()).unwrap();
        let q = QuantizedNetwork::from_network(&net, &QConfig::default_per_channel()).unwrap();
        let state = q.state_dict();
        assert_eq!(state.len(), 4 * net.layers.len());
        let weight_bytes: usize = net.layers.iter().map(|l| l.weights.data.len() * 8).sum();
        let code_bytes: usize = q.layers.iter().map(|l| l.weight().memory_bytes()).sum();
        assert!(code_bytes < weight_bytes);
        assert!(state.size_bytes().unwrap() > net.state_dict().size_bytes().unwrap());
    }

    #[test]
    fn forward_uses_the_decoded_weights() {
        let net = Network::from_spec(&spec()).unwrap();
        let mut q = QuantizedNetwork::from_network(&net, &QConfig::default_per_channel()).unwrap();
        for layer in &q.layers {
            assert_eq!(layer.dequantized_weight(), &layer.weight().dequantize());
        }
        let first = &q.layers[0];
        let expected = batch()
            .matmul(&first.weight().dequantize()).unwrap()
            .add_row_vector(&first.bias).unwrap()
            .map(|v| first.activator.function(v));
        assert_eq!(first.forward(&batch()).unwrap(), expected);
        assert_eq!(q.forward(&batch()).unwrap().shape(), [2, 2]);
    }

    #[test]
    fn unsupported_bit_widths_are_rejected() {
        let net = Network::from_spec(&spec()).unwrap();
        for bits in [0, 1, 9, 16] {
            let qconfig = QConfig { bits, ..QConfig::default() };
            assert!(matches!(
                QuantizedNetwork::from_network(&net, &qconfig),
                Err(Error::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn state_dict_names_follow_float_layout() {
        let net = Network::from_spec(&spec()).unwrap();
        let q = QuantizedNetwork::from_network(&net, &QConfig::default_per_channel()).unwrap();
        let state = q.state_dict();
        assert_eq!(state.require("layers.0.weight_scale").unwrap().shape, vec![6]);
        assert_eq!(state.require("layers.1.weight_zero_point").unwrap().shape, vec![2]);
        assert!(state.get("layers.0.input_scale").is_none());
    }

    #[test]
    fn checkpoint_reloads_with_spec() {
        let net = Network::from_spec(&spec()).unwrap();
        let params = vec![
            QuantParams::from_range(-2.0, 2.0, QuantScheme::Asymmetric, 8),
            QuantParams::from_range(0.0, 3.0, QuantScheme::Asymmetric, 8),
        ];
        let q = QuantizedNetwork::from_network(&net, &QConfig::default_per_channel())
            .unwrap()
            .with_input_params(params)
            .unwrap();
        let bytes = q.state_dict().to_bytes().unwrap();
        let state = StateDict::from_bytes(&bytes).unwrap();
        let reloaded = QuantizedNetwork::from_state_dict(&state, &spec(), &QConfig::default()).unwrap();
        assert!(reloaded.is_static());
        assert_eq!(reloaded.layers[0].weight().data, q.layers[0].weight().data);
        assert_eq!(reloaded.layers[1].input_params, q.layers[1].input_params);
    }

    #[test]
    fn float_checkpoint_is_not_a_quantized_one() {
        let net = Network::from_spec(&spec()).unwrap();
        assert!(QuantizedNetwork::from_state_dict(&net.state_dict(), &spec(), &QConfig::default()).is_err());
    }

    #[test]
    fn stays_in_eval_mode() {
        let net = Network::from_spec(&spec()).unwrap();
        let mut q = QuantizedNetwork::from_network(&net, &QConfig::default_per_channel()).unwrap();
        q.train();
        assert_eq!(q.mode(), Mode::Eval);
    }
}

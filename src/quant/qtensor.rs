//! Affine integer quantization of matrices.
//!
//! `q = clamp(round(x / scale) + zero_point, qmin, qmax)` and
//! `x̂ = (q − zero_point) · scale`. Per-channel parameters index the columns
//! of an `in × out` weight matrix, i.e. one pair per output unit.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::math::matrix::Matrix;
use crate::quant::qconfig::{qrange, QConfig, QuantGranularity, QuantScheme};

const MIN_SCALE: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantParams {
    /// One entry per group: a single group for per-tensor, `cols` for per-channel.
    pub scales: Vec<f32>,
    pub zero_points: Vec<i32>,
    pub scheme: QuantScheme,
    pub bits: u8,
}

impl QuantParams {
    /// Parameters covering `[min, max]`, widened to include zero so that exact
    /// zeros (padding, ReLU outputs, zero biases) survive the round trip.
    pub fn from_range(min: f64, max: f64, scheme: QuantScheme, bits: u8) -> QuantParams {
        let (scale, zero_point) = scale_and_zero_point(min, max, scheme, bits);
        QuantParams { scales: vec![scale], zero_points: vec![zero_point], scheme, bits }
    }

    /// Computes parameters for a weight matrix according to `qconfig`.
    pub fn for_matrix(m: &Matrix, qconfig: &QConfig) -> QuantParams {
        let QConfig { scheme, bits, .. } = *qconfig;
        match qconfig.granularity {
            QuantGranularity::PerTensor => {
                let (min, max) = min_max(m.data.iter().copied());
                QuantParams::from_range(min, max, scheme, bits)
            }
            QuantGranularity::PerChannel => {
                let (scales, zero_points) = (0..m.cols)
                    .map(|j| {
                        let (min, max) = min_max(m.rows_iter().map(|row| row[j]));
                        scale_and_zero_point(min, max, scheme, bits)
                    })
                    .unzip();
                QuantParams { scales, zero_points, scheme, bits }
            }
        }
    }

    pub fn num_groups(&self) -> usize {
        self.scales.len()
    }

    pub fn is_per_channel(&self) -> bool {
        self.scales.len() > 1
    }

    pub fn quantize_value(&self, x: f64, group: usize) -> i8 {
        let (qmin, qmax) = qrange(self.bits);
        let scale = f64::from(self.scales[group]);
        let q = (x / scale).round() as i64 + i64::from(self.zero_points[group]);
        q.clamp(i64::from(qmin), i64::from(qmax)) as i8
    }

    pub fn dequantize_value(&self, q: i8, group: usize) -> f64 {
        (i32::from(q) - self.zero_points[group]) as f64 * f64::from(self.scales[group])
    }

    fn group_of(&self, idx: usize, cols: usize) -> usize {
        if self.is_per_channel() { idx % cols } else { 0 }
    }
}

/// Integer codes of a matrix together with the parameters that decode them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizedTensor {
    pub data: Vec<i8>,
    pub params: QuantParams,
    pub shape: [usize; 2],
}

impl QuantizedTensor {
    pub fn quantize(m: &Matrix, qconfig: &QConfig) -> QuantizedTensor {
        let params = QuantParams::for_matrix(m, qconfig);
        let data = encode(m, &params);
        QuantizedTensor { data, params, shape: m.shape() }
    }

    /// Quantizes with externally supplied parameters (e.g. from an observer).
    pub fn quantize_with(m: &Matrix, params: QuantParams) -> Result<QuantizedTensor> {
        if params.num_groups() != 1 && params.num_groups() != m.cols {
            return Err(Error::shape(&[m.cols], &[params.num_groups()]));
        }
        let data = encode(m, &params);
        Ok(QuantizedTensor { data, params, shape: m.shape() })
    }

    /// Rebuilds a tensor from stored codes, e.g. when reading a checkpoint.
    pub fn from_parts(data: Vec<i8>, params: QuantParams, shape: [usize; 2]) -> Result<QuantizedTensor> {
        if data.len() != shape[0] * shape[1] {
            return Err(Error::shape(&[shape[0] * shape[1]], &[data.len()]));
        }
        if params.scales.len() != params.zero_points.len()
            || (params.num_groups() != 1 && params.num_groups() != shape[1])
        {
            return Err(Error::shape(&[shape[1]], &[params.num_groups()]));
        }
        Ok(QuantizedTensor { data, params, shape })
    }

    pub fn dequantize(&self) -> Matrix {
        let [rows, cols] = self.shape;
        let data = self.data.iter()
            .enumerate()
            .map(|(i, &q)| self.params.dequantize_value(q, self.params.group_of(i, cols)))
            .collect();
        Matrix { rows, cols, data }
    }

    pub fn memory_bytes(&self) -> usize {
        self.data.len() + self.params.scales.len() * 4 + self.params.zero_points.len() * 4
    }
}

/// Quantize then dequantize, keeping values in floating point.
///
/// Used during quantization-aware training so the forward pass sees the
/// rounding error the deployed model will have.
pub fn fake_quantize(m: &Matrix, qconfig: &QConfig) -> Matrix {
    QuantizedTensor::quantize(m, qconfig).dequantize()
}

/// Fake-quantizes with fixed parameters (used for calibrated activations).
pub(crate) fn fake_quantize_with(m: &Matrix, params: &QuantParams) -> Matrix {
    m.map(|x| params.dequantize_value(params.quantize_value(x, 0), 0))
}

fn encode(m: &Matrix, params: &QuantParams) -> Vec<i8> {
    m.data.iter()
        .enumerate()
        .map(|(i, &x)| params.quantize_value(x, params.group_of(i, m.cols)))
        .collect()
}

pub(crate) fn min_max(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| (lo.min(x), hi.max(x)))
}

fn scale_and_zero_point(min: f64, max: f64, scheme: QuantScheme, bits: u8) -> (f32, i32) {
    let (qmin, qmax) = qrange(bits);
    // empty input folds to (inf, -inf); treat it as the zero range
    let min = if min.is_finite() { min.min(0.0) } else { 0.0 };
    let max = if max.is_finite() { max.max(0.0) } else { 0.0 };

    match scheme {
        QuantScheme::Symmetric => {
            let scale = (min.abs().max(max.abs()) / f64::from(qmax)).max(MIN_SCALE);
            (scale as f32, 0)
        }
        QuantScheme::Asymmetric => {
            let scale = ((max - min) / f64::from(qmax - qmin)).max(MIN_SCALE);
            let zero_point = (f64::from(qmin) - min / scale).round() as i32;
            (scale as f32, zero_point.clamp(qmin, qmax))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn weights() -> Matrix {
        // column 0 spans ±4, column 1 spans ±0.01
        Matrix::from_vec(3, 2, vec![4.0, 0.01, -2.0, -0.005, -4.0, 0.002]).unwrap()
    }

    #[test]
    fn symmetric_has_zero_zero_point() {
        let q = QuantizedTensor::quantize(&weights(), &QConfig::default_per_tensor());
        assert_eq!(q.params.zero_points, vec![0]);
        assert_eq!(q.data[0], 127);
        assert_eq!(q.data[4], -127);
    }

    #[test]
    fn round_trip_error_is_within_half_a_step() {
        let m = weights();
        let q = QuantizedTensor::quantize(&m, &QConfig::default_per_channel());
        let back = q.dequantize();
        for (i, (&x, &y)) in m.data.iter().zip(&back.data).enumerate() {
            let scale = f64::from(q.params.scales[i % 2]);
            assert!((x - y).abs() <= scale / 2.0 + 1e-12, "element {i}: {x} vs {y}");
        }
    }

    #[test]
    fn per_channel_preserves_small_columns() {
        let m = weights();
        let per_tensor = fake_quantize(&m, &QConfig::default_per_tensor());
        let per_channel = fake_quantize(&m, &QConfig::default_per_channel());
        // a single ±4 scale wipes out the ±0.01 column entirely
        assert_eq!(per_tensor.data[1], 0.0);
        assert_abs_diff_eq!(per_channel.data[1], 0.01, epsilon = 1e-4);
    }

    #[test]
    fn asymmetric_covers_skewed_range() {
        let params = QuantParams::from_range(0.0, 6.0, QuantScheme::Asymmetric, 8);
        assert_eq!(params.zero_points[0], -128);
        assert_eq!(params.quantize_value(0.0, 0), -128);
        assert_eq!(params.quantize_value(6.0, 0), 127);
        assert_abs_diff_eq!(params.dequantize_value(127, 0), 6.0, epsilon = 1e-6);
    }

    #[test]
    fn zero_matrix_stays_finite() {
        let q = QuantizedTensor::quantize(&Matrix::zeros(2, 2), &QConfig::default_per_tensor());
        assert!(q.dequantize().data.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn rejects_mismatched_group_count() {
        let params = QuantParams {
            scales: vec![0.1; 3],
            zero_points: vec![0; 3],
            scheme: QuantScheme::Symmetric,
            bits: 8,
        };
        assert!(QuantizedTensor::quantize_with(&weights(), params).is_err());
    }

    #[test]
    fn lower_bit_widths_clamp_to_their_range() {
        let config = QConfig { bits: 4, ..QConfig::default_per_tensor() };
        let q = QuantizedTensor::quantize(&weights(), &config);
        assert!(q.data.iter().all(|&c| (-8..=7).contains(&c)));
    }

    #[test]
    fn out_of_range_bit_widths_never_wrap() {
        let wide = QuantParams::from_range(0.0, 1000.0, QuantScheme::Asymmetric, 12);
        assert_eq!(wide.quantize_value(1000.0, 0), 127);
        assert_eq!(wide.quantize_value(0.0, 0), -128);
        let narrow = QuantParams::from_range(-1.0, 1.0, QuantScheme::Symmetric, 0);
        assert_eq!(narrow.quantize_value(5.0, 0), 1);
    }
}

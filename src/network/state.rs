//! Named tensor collections and their safetensors encoding.
//!
//! A `StateDict` is what gets checkpointed to disk and what model sizes are
//! measured from: the size of a model is the byte length of its encoded state.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use safetensors::tensor::{Dtype, TensorView};
use safetensors::SafeTensors;

use crate::error::{Error, Result};
use crate::math::matrix::Matrix;

#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F64(Vec<f64>),
    F32(Vec<f32>),
    I32(Vec<i32>),
    I8(Vec<i8>),
}

impl TensorData {
    pub fn len(&self) -> usize {
        match self {
            TensorData::F64(v) => v.len(),
            TensorData::F32(v) => v.len(),
            TensorData::I32(v) => v.len(),
            TensorData::I8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dtype(&self) -> Dtype {
        match self {
            TensorData::F64(_) => Dtype::F64,
            TensorData::F32(_) => Dtype::F32,
            TensorData::I32(_) => Dtype::I32,
            TensorData::I8(_) => Dtype::I8,
        }
    }

    fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            TensorData::F64(v) => bytemuck::cast_slice(v).to_vec(),
            TensorData::F32(v) => bytemuck::cast_slice(v).to_vec(),
            TensorData::I32(v) => bytemuck::cast_slice(v).to_vec(),
            TensorData::I8(v) => bytemuck::cast_slice(v).to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: TensorData,
}

impl Tensor {
    pub fn new(shape: Vec<usize>, data: TensorData) -> Result<Tensor> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(Error::shape(&[expected], &[data.len()]));
        }
        Ok(Tensor { shape, data })
    }

    pub fn from_matrix(m: &Matrix) -> Tensor {
        Tensor { shape: vec![m.rows, m.cols], data: TensorData::F64(m.data.clone()) }
    }

    pub fn to_matrix(&self) -> Result<Matrix> {
        let data = self.as_f64()?.to_vec();
        match self.shape.as_slice() {
            [rows, cols] => Matrix::from_vec(*rows, *cols, data),
            [n] => Matrix::from_vec(1, *n, data),
            other => Err(Error::shape(&[0, 0], other)),
        }
    }

    pub fn as_f64(&self) -> Result<&[f64]> {
        match &self.data {
            TensorData::F64(v) => Ok(v),
            other => Err(Error::Serialization(format!("expected f64 tensor, found {:?}", other.dtype()))),
        }
    }

    pub fn num_elements(&self) -> usize {
        self.data.len()
    }
}

/// Ordered map of parameter name → tensor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDict {
    tensors: BTreeMap<String, Tensor>,
}

impl StateDict {
    pub fn new() -> StateDict {
        StateDict::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) {
        self.tensors.insert(name.into(), tensor);
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    /// Like `get`, but a missing entry is an error naming the key.
    pub fn require(&self, name: &str) -> Result<&Tensor> {
        self.get(name)
            .ok_or_else(|| Error::Serialization(format!("missing tensor '{name}' in state dict")))
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Tensor)> {
        self.tensors.iter()
    }

    pub fn num_elements(&self) -> usize {
        self.tensors.values().map(Tensor::num_elements).sum()
    }

    /// Encodes every tensor with the safetensors layout.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let encoded: Vec<(&str, Dtype, Vec<usize>, Vec<u8>)> = self
            .tensors
            .iter()
            .map(|(name, t)| (name.as_str(), t.data.dtype(), t.shape.clone(), t.data.to_le_bytes()))
            .collect();

        let views = encoded
            .iter()
            .map(|(name, dtype, shape, bytes)| {
                TensorView::new(*dtype, shape.clone(), bytes)
                    .map(|view| (*name, view))
                    .map_err(|e| Error::Serialization(e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut metadata = HashMap::new();
        metadata.insert("format".to_string(), "ferrite-kd".to_string());

        safetensors::serialize(views, Some(metadata)).map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<StateDict> {
        let st = SafeTensors::deserialize(bytes).map_err(|e| Error::Serialization(e.to_string()))?;
        let mut state = StateDict::new();
        for (name, view) in st.tensors() {
            let raw = view.data();
            // pod_collect_to_vec copes with the unaligned offsets safetensors may produce
            let data = match view.dtype() {
                Dtype::F64 => TensorData::F64(bytemuck::pod_collect_to_vec(raw)),
                Dtype::F32 => TensorData::F32(bytemuck::pod_collect_to_vec(raw)),
                Dtype::I32 => TensorData::I32(bytemuck::pod_collect_to_vec(raw)),
                Dtype::I8 => TensorData::I8(bytemuck::pod_collect_to_vec(raw)),
                other => {
                    return Err(Error::Serialization(format!(
                        "unsupported dtype {other:?} for tensor '{name}'"
                    )))
                }
            };
            state.insert(name, Tensor::new(view.shape().to_vec(), data)?);
        }
        Ok(state)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<StateDict> {
        let bytes = std::fs::read(path)?;
        StateDict::from_bytes(&bytes)
    }

    /// Size of the encoded state in bytes.
    pub fn size_bytes(&self) -> Result<usize> {
        Ok(self.to_bytes()?.len())
    }
}

//! Post-training and quantization-aware int8 quantization of [`Network`]s.
//!
//! [`Network`]: crate::network::Network

pub mod dynamic;
pub mod observer;
pub mod qat;
pub mod qconfig;
pub mod qnetwork;
pub mod qtensor;
pub mod quantizer;
pub mod static_quant;

pub use dynamic::DynamicQuantizer;
pub use observer::Observer;
pub use qat::QatQuantizer;
pub use qconfig::{ObserverKind, QConfig, QuantGranularity, QuantScheme};
pub use qnetwork::{QuantizedDense, QuantizedNetwork};
pub use qtensor::{fake_quantize, QuantParams, QuantizedTensor};
pub use quantizer::{ModelPerformance, ModelSizes, PerformanceReport, Quantizer, QuantizerState};
pub use static_quant::{calibrate, StaticQuantizer};

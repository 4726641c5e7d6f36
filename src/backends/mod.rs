//! Backend implementations for different inference engines
//!
//! - ONNX Runtime backend (CPU plus CUDA/`CoreML` delegates)
//! - Tract backend (pure Rust, CPU only)
//! - Mock backend (scriptable, no model file)

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "tract")]
pub mod tract;

pub mod mock;

// Re-export backends based on enabled features
#[cfg(feature = "onnx")]
pub use self::onnx::OnnxBackend;

#[cfg(feature = "tract")]
pub use self::tract::TractBackend;

pub use self::mock::{MockBackend, MockBackendFactory};

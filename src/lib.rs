#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # image-infer
//!
//! Run a single image through a neural network model and write the output
//! tensor back as an image.
//!
//! The crate loads an ONNX model with ONNX Runtime or Tract, optionally
//! attaches a hardware delegate (CUDA, `CoreML`), decodes the input image into
//! the model's input tensor, runs one forward pass and encodes the output
//! tensor as an image file. Models are only required to have exactly one input
//! and one output tensor whose shapes can be read as images; see
//! [`geometry::classify`] for how a dimension list becomes width, height and
//! channels.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use image_infer::{ExecutionProvider, InferenceRunner, RunConfig};
//!
//! # fn example() -> image_infer::Result<()> {
//! let config = RunConfig::builder()
//!     .model_path("model.onnx")
//!     .execution_provider(ExecutionProvider::Auto)
//!     .build()?;
//!
//! let runner = InferenceRunner::new(config)?;
//! let report = runner.run("input.png", "output.png")?;
//! println!("{} -> {}", report.input_geometry, report.output_geometry);
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with CUDA and `CoreML` delegates
//! - `tract` (default): Pure Rust backend, CPU only
//! - `cli` (default): the `image-infer` binary and its tracing setup
//! - `webp-support` (default): WebP output
//! - `tracing-json`, `tracing-files`: extra log formats and destinations

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod geometry;
pub mod inference;
pub mod runner;
pub mod services;
pub mod tensor;
pub mod tracing_config;
pub mod utils;

pub use backends::*;
pub use config::{
    BackendType, DelegateOptions, ExecutionProvider, OutputFormat, PixelScaling, RunConfig,
    RunConfigBuilder,
};
pub use error::{InferError, Result, TensorRole};
pub use geometry::{classify, ClassificationError, ImageGeometry};
pub use inference::{BackendFactory, DefaultBackendFactory, InferenceBackend};
pub use runner::{InferenceRunner, ModelSummary, RunReport, TensorSummary};
pub use services::{DecodedImage, ImageIOService};
pub use tensor::{ElementType, TensorData, TensorInfo};
pub use tracing_config::{events, spans, TracingConfig, TracingFormat, TracingOutput};
#[cfg(feature = "cli")]
pub use tracing_config::init_cli_tracing;
pub use utils::{ExecutionProviderManager, ProviderInfo};

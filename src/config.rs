//! Configuration types for inference runs

use crate::error::{InferError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Inference engine used to run the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendType {
    /// ONNX Runtime backend (supports hardware delegates)
    Onnx,
    /// Tract backend (pure Rust, CPU only)
    Tract,
}

impl Default for BackendType {
    fn default() -> Self {
        Self::Onnx
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onnx => write!(f, "onnx"),
            Self::Tract => write!(f, "tract"),
        }
    }
}

/// Hardware delegate (execution provider) attached to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionProvider {
    /// Best available delegate (CUDA > `CoreML`), CPU when none is available
    Auto,
    /// No delegate
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Neural Engine / GPU acceleration
    CoreMl,
}

impl Default for ExecutionProvider {
    fn default() -> Self {
        Self::Auto
    }
}

impl ExecutionProvider {
    /// Whether this provider names a specific hardware delegate
    #[must_use]
    pub fn is_delegate(self) -> bool {
        matches!(self, Self::Cuda | Self::CoreMl)
    }
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

/// How 8-bit pixels map onto floating point tensor elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelScaling {
    /// Pixel value `v` becomes element `v`
    Raw,
    /// Pixel value `v` becomes element `v / 255`
    Normalized,
}

impl Default for PixelScaling {
    fn default() -> Self {
        Self::Raw
    }
}

impl PixelScaling {
    #[must_use]
    pub fn pixel_to_value(self, pixel: u8) -> f32 {
        match self {
            Self::Raw => f32::from(pixel),
            Self::Normalized => f32::from(pixel) / 255.0,
        }
    }

    #[must_use]
    pub fn value_to_pixel(self, value: f32) -> u8 {
        let scaled = match self {
            Self::Raw => value,
            Self::Normalized => value * 255.0,
        };
        if scaled.is_nan() {
            return 0;
        }
        scaled.clamp(0.0, 255.0).round() as u8
    }
}

/// Output image container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    Png,
    Jpeg,
    Tiff,
    WebP,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Png
    }
}

impl OutputFormat {
    /// Pick a format from the file extension, PNG when unknown
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        let extension = path
            .as_ref()
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("jpg" | "jpeg") => Self::Jpeg,
            Some("tif" | "tiff") => Self::Tiff,
            Some("webp") => Self::WebP,
            _ => Self::Png,
        }
    }

    #[must_use]
    pub fn image_format(self) -> image::ImageFormat {
        match self {
            Self::Png => image::ImageFormat::Png,
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Tiff => image::ImageFormat::Tiff,
            Self::WebP => image::ImageFormat::WebP,
        }
    }
}

/// `key=value` options passed to the hardware delegate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateOptions(BTreeMap<String, String>);

impl DelegateOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a single `key=value` option
    ///
    /// # Errors
    /// - Missing `=` or empty key
    pub fn parse_option(option: &str) -> Result<(String, String)> {
        let (key, value) = option.split_once('=').ok_or_else(|| {
            InferError::argument(format!(
                "Invalid delegate option '{option}'. Expected key=value"
            ))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(InferError::argument(format!(
                "Invalid delegate option '{option}'. Key must not be empty"
            )));
        }
        Ok((key.to_string(), value.trim().to_string()))
    }

    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.0.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Configuration of one inference run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Path to the model file
    pub model_path: PathBuf,

    /// Inference engine
    pub backend_type: BackendType,

    /// Hardware delegate
    pub execution_provider: ExecutionProvider,

    /// Options forwarded to the delegate
    pub delegate_options: DelegateOptions,

    /// Number of intra-op threads for inference (0 = engine default)
    pub intra_threads: usize,

    /// Pixel mapping for floating point tensors
    pub scaling: PixelScaling,

    /// Output container; derived from the output extension when `None`
    pub output_format: Option<OutputFormat>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::new(),
            backend_type: BackendType::default(),
            execution_provider: ExecutionProvider::default(),
            delegate_options: DelegateOptions::default(),
            intra_threads: 0,
            scaling: PixelScaling::default(),
            output_format: None,
        }
    }
}

impl RunConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    /// ```rust
    /// use image_infer::config::{BackendType, ExecutionProvider, RunConfig};
    ///
    /// let config = RunConfig::builder()
    ///     .model_path("model.onnx")
    ///     .backend_type(BackendType::Onnx)
    ///     .execution_provider(ExecutionProvider::Cpu)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.intra_threads, 0);
    /// ```
    #[must_use]
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::default()
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Empty model path
    /// - A delegate or delegate options requested with the Tract backend
    /// - Delegate options given without any delegate (`cpu`)
    pub fn validate(&self) -> Result<()> {
        if self.model_path.as_os_str().is_empty() {
            return Err(InferError::invalid_config("Model path must not be empty"));
        }

        if self.backend_type == BackendType::Tract {
            if self.execution_provider.is_delegate() {
                return Err(InferError::invalid_config(format!(
                    "Tract backend only supports the cpu provider, got '{}'",
                    self.execution_provider
                )));
            }
            if !self.delegate_options.is_empty() {
                return Err(InferError::invalid_config(
                    "Delegate options are not supported by the Tract backend",
                ));
            }
        }

        if self.execution_provider == ExecutionProvider::Cpu && !self.delegate_options.is_empty() {
            return Err(InferError::invalid_config(
                "Delegate options require a delegate (auto, cuda or coreml)",
            ));
        }

        Ok(())
    }

    /// Output format for a given destination path
    pub fn output_format_for<P: AsRef<Path>>(&self, path: P) -> OutputFormat {
        self.output_format
            .unwrap_or_else(|| OutputFormat::from_path(path))
    }
}

/// Builder for `RunConfig`
#[derive(Debug, Default)]
pub struct RunConfigBuilder {
    config: RunConfig,
}

impl RunConfigBuilder {
    /// Set model path
    #[must_use]
    pub fn model_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.model_path = path.into();
        self
    }

    /// Set backend type
    #[must_use]
    pub fn backend_type(mut self, backend_type: BackendType) -> Self {
        self.config.backend_type = backend_type;
        self
    }

    /// Set execution provider
    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    /// Add a delegate option
    #[must_use]
    pub fn delegate_option<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.config.delegate_options.insert(key, value);
        self
    }

    /// Replace all delegate options
    #[must_use]
    pub fn delegate_options(mut self, options: DelegateOptions) -> Self {
        self.config.delegate_options = options;
        self
    }

    /// Set number of intra-op threads
    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    /// Set pixel scaling
    #[must_use]
    pub fn scaling(mut self, scaling: PixelScaling) -> Self {
        self.config.scaling = scaling;
        self
    }

    /// Force an output format regardless of the output extension
    #[must_use]
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = Some(format);
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    /// - Configuration validation failures, see [`RunConfig::validate`]
    pub fn build(self) -> Result<RunConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

//! Tract backend
//!
//! Pure Rust ONNX inference. Tract runs on the CPU only, so no hardware
//! delegate can be attached; requesting one is a delegate error.

use crate::config::RunConfig;
use crate::error::{InferError, Result};
use crate::inference::InferenceBackend;
use crate::tensor::{ElementType, TensorData, TensorInfo};
use tract_onnx::prelude::*;

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

// Use instant crate for cross-platform time compatibility
use instant::{Duration, Instant};

/// Tract backend for running models with pure Rust inference
#[derive(Debug, Default)]
pub struct TractBackend {
    model: Option<TractModel>,
    inputs: Vec<TensorInfo>,
    outputs: Vec<TensorInfo>,
}

impl TractBackend {
    /// List Tract execution providers with availability and description
    ///
    /// # Examples
    /// ```rust
    /// use image_infer::backends::TractBackend;
    ///
    /// let providers = TractBackend::list_providers();
    /// assert_eq!(providers.len(), 1);
    /// ```
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        log::debug!(
            "Tract backend on {} ({}), pure Rust",
            std::env::consts::OS,
            std::env::consts::ARCH
        );

        vec![(
            "CPU".to_string(),
            true,
            "Pure Rust CPU inference with no external dependencies".to_string(),
        )]
    }

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn element_type(datum_type: DatumType) -> ElementType {
    match datum_type {
        DatumType::F16 => ElementType::F16,
        DatumType::F32 => ElementType::F32,
        DatumType::U8 => ElementType::U8,
        DatumType::U32 => ElementType::U32,
        DatumType::I8 => ElementType::I8,
        DatumType::I32 => ElementType::I32,
        DatumType::I64 => ElementType::I64,
        other => ElementType::Other(format!("{other:?}")),
    }
}

fn tensor_info(model: &TypedModel, outlet: OutletId) -> Result<TensorInfo> {
    let fact = model
        .outlet_fact(outlet)
        .map_err(|e| InferError::interpreter(format!("Failed to read tensor fact: {e}")))?;
    // Symbolic dimensions are reported as dynamic
    let dims = fact.shape.iter().map(|d| d.to_i64().unwrap_or(-1)).collect();
    let name = model.node(outlet.node).name.clone();
    Ok(TensorInfo::new(name, dims, element_type(fact.datum_type)))
}

fn to_tract_tensor(data: &TensorData) -> Result<Tensor> {
    let tensor = match data.element_type() {
        ElementType::F32 => Tensor::from_shape::<f32>(data.shape(), &data.f32_values()?),
        ElementType::U8 => Tensor::from_shape::<u8>(data.shape(), data.as_bytes()),
        ElementType::I8 => Tensor::from_shape::<i8>(data.shape(), &data.i8_values()?),
        other => return Err(InferError::UnsupportedElementType(other.to_string())),
    };
    tensor.map_err(|e| InferError::inference(format!("Failed to convert input tensor: {e}")))
}

fn from_tract_value(value: &TValue) -> Result<TensorData> {
    let shape = value.shape().to_vec();
    let slice_error = |e: TractError| InferError::inference(format!("Failed to read output tensor: {e}"));

    match value.datum_type() {
        DatumType::F32 => {
            TensorData::from_f32_values(shape, value.as_slice::<f32>().map_err(slice_error)?)
        },
        DatumType::U8 => TensorData::from_bytes(
            shape,
            ElementType::U8,
            value.as_slice::<u8>().map_err(slice_error)?.to_vec(),
        ),
        DatumType::I8 => {
            TensorData::from_i8_values(shape, value.as_slice::<i8>().map_err(slice_error)?)
        },
        other => Err(InferError::UnsupportedElementType(
            element_type(other).to_string(),
        )),
    }
}

impl InferenceBackend for TractBackend {
    fn load(&mut self, config: &RunConfig) -> Result<Duration> {
        let model_load_start = Instant::now();
        let model_path = &config.model_path;

        if config.execution_provider.is_delegate() || !config.delegate_options.is_empty() {
            return Err(InferError::delegate(format!(
                "Tract backend cannot attach the '{}' delegate",
                config.execution_provider
            )));
        }
        if config.intra_threads > 0 {
            log::debug!("Tract ignores the intra-op thread count");
        }
        if !model_path.is_file() {
            return Err(InferError::model_load(model_path, "file does not exist"));
        }

        log::info!("Initializing Tract backend (pure Rust, CPU)");

        let typed = onnx()
            .model_for_path(model_path)
            .map_err(|e| InferError::model_load(model_path, e.to_string()))?
            .into_optimized()
            .map_err(|e| InferError::interpreter(format!("Failed to optimize model: {e}")))?;

        let input_outlets = typed
            .input_outlets()
            .map_err(|e| InferError::interpreter(format!("Failed to read model inputs: {e}")))?
            .to_vec();
        let output_outlets = typed
            .output_outlets()
            .map_err(|e| InferError::interpreter(format!("Failed to read model outputs: {e}")))?
            .to_vec();

        self.inputs = input_outlets
            .into_iter()
            .map(|outlet| tensor_info(&typed, outlet))
            .collect::<Result<_>>()?;
        self.outputs = output_outlets
            .into_iter()
            .map(|outlet| tensor_info(&typed, outlet))
            .collect::<Result<_>>()?;

        let model = typed.into_runnable().map_err(|e| {
            InferError::interpreter(format!("Failed to create runnable model: {e}"))
        })?;
        self.model = Some(model);

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "Tract backend initialized in {:.2}ms",
            model_load_time.as_secs_f64() * 1000.0
        );
        Ok(model_load_time)
    }

    fn input_tensors(&self) -> &[TensorInfo] {
        &self.inputs
    }

    fn output_tensors(&self) -> &[TensorInfo] {
        &self.outputs
    }

    fn invoke(&mut self, inputs: &[TensorData]) -> Result<Vec<TensorData>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| InferError::interpreter("Tract model not loaded"))?;

        if inputs.len() != self.inputs.len() {
            return Err(InferError::inference(format!(
                "model takes {} input(s), got {}",
                self.inputs.len(),
                inputs.len()
            )));
        }

        let tract_inputs = inputs
            .iter()
            .map(|data| to_tract_tensor(data).map(TValue::from))
            .collect::<Result<TVec<TValue>>>()?;

        let inference_start = Instant::now();
        let outputs = model
            .run(tract_inputs)
            .map_err(|e| InferError::inference(format!("Tract inference failed: {e}")))?;
        log::debug!(
            "Tract inference completed in {:.2}ms",
            inference_start.elapsed().as_secs_f64() * 1000.0
        );

        outputs.iter().map(from_tract_value).collect()
    }

    fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    fn name(&self) -> &'static str {
        "tract"
    }
}

//! Tensor descriptors and bounds-checked tensor storage
//!
//! Engines report tensors as a name, a declared dimension list and an element
//! type ([`TensorInfo`]). Data crosses the engine boundary as [`TensorData`], an
//! owned byte buffer whose length is always `element_count * byte_width`; every
//! write is length-checked so a wrong-sized image can never be copied into (or
//! out of) tensor storage.

use crate::config::PixelScaling;
use crate::error::{InferError, Result};
use serde::{Deserialize, Serialize};

/// Element type of a tensor as reported by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementType {
    F16,
    F32,
    U8,
    U32,
    I8,
    I32,
    I64,
    /// Anything else, carrying the engine's own name for the type
    Other(String),
}

impl ElementType {
    /// Size of one element in bytes, if known
    #[must_use]
    pub fn byte_width(&self) -> Option<usize> {
        match self {
            Self::U8 | Self::I8 => Some(1),
            Self::F16 => Some(2),
            Self::F32 | Self::U32 | Self::I32 => Some(4),
            Self::I64 => Some(8),
            Self::Other(_) => None,
        }
    }

    /// Whether image pixels can be converted to and from this type
    #[must_use]
    pub fn supports_pixels(&self) -> bool {
        matches!(self, Self::U8 | Self::I8 | Self::F32)
    }
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::F16 => write!(f, "f16"),
            Self::F32 => write!(f, "f32"),
            Self::U8 => write!(f, "u8"),
            Self::U32 => write!(f, "u32"),
            Self::I8 => write!(f, "i8"),
            Self::I32 => write!(f, "i32"),
            Self::I64 => write!(f, "i64"),
            Self::Other(_) => write!(f, "???"),
        }
    }
}

/// Declared description of a model tensor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorInfo {
    pub name: String,
    /// Declared dimensions; negative values are dynamic (symbolic) axes
    pub dims: Vec<i64>,
    pub element_type: ElementType,
}

impl TensorInfo {
    pub fn new<S: Into<String>>(name: S, dims: Vec<i64>, element_type: ElementType) -> Self {
        Self {
            name: name.into(),
            dims,
            element_type,
        }
    }

    /// Descriptor with fully static dimensions
    pub fn with_shape<S: Into<String>>(name: S, shape: &[usize], element_type: ElementType) -> Self {
        Self::new(
            name,
            shape.iter().map(|&d| d as i64).collect(),
            element_type,
        )
    }

    #[must_use]
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    #[must_use]
    pub fn is_static(&self) -> bool {
        self.dims.iter().all(|&d| d >= 0)
    }

    /// Declared byte size, when every axis and the element width are known
    #[must_use]
    pub fn byte_size(&self) -> Option<usize> {
        if !self.is_static() {
            return None;
        }
        let shape: Vec<usize> = self.dims.iter().map(|&d| d as usize).collect();
        checked_byte_len(&shape, self.element_type.byte_width()?)
    }

    /// Dimensions rendered as `1x224x224x3`, dynamic axes as `?`
    #[must_use]
    pub fn dims_display(&self) -> String {
        self.dims
            .iter()
            .map(|&d| if d < 0 { "?".to_string() } else { d.to_string() })
            .collect::<Vec<_>>()
            .join("x")
    }

    /// Resolve the declared dimensions to a concrete shape.
    ///
    /// A dynamic leading axis is the batch axis and resolves to 1.
    ///
    /// # Errors
    /// - Any other dynamic axis
    pub fn static_shape(&self) -> Result<Vec<usize>> {
        self.dims
            .iter()
            .enumerate()
            .map(|(axis, &d)| match (axis, d) {
                (_, d) if d >= 0 => Ok(d as usize),
                (0, _) => Ok(1),
                _ => Err(InferError::shape(format!(
                    "tensor '{}' has dynamic axis {} in shape {}",
                    self.name,
                    axis,
                    self.dims_display()
                ))),
            })
            .collect()
    }

    /// Log the size, dimensions and element type of this tensor
    pub fn describe(&self) {
        match self.byte_size() {
            Some(size) => tracing::info!("  Size: {} bytes", size),
            None => tracing::info!("  Size: unknown"),
        }
        tracing::info!("  Dimension: {}", self.dims_display());
        tracing::info!("  Type: {}", self.element_type);
    }
}

/// Byte length of a tensor, `None` when it does not fit in `usize`
fn checked_byte_len(shape: &[usize], byte_width: usize) -> Option<usize> {
    shape
        .iter()
        .try_fold(byte_width, |acc, &d| acc.checked_mul(d))
}

/// Owned tensor contents in native byte order
#[derive(Debug, Clone, PartialEq)]
pub struct TensorData {
    shape: Vec<usize>,
    element_type: ElementType,
    bytes: Vec<u8>,
}

impl TensorData {
    /// Zero-filled tensor of the given shape and type.
    ///
    /// # Errors
    /// - Element type without a known byte width
    /// - Byte size does not fit in `usize`
    pub fn zeroed(shape: Vec<usize>, element_type: ElementType) -> Result<Self> {
        let width = element_type
            .byte_width()
            .ok_or_else(|| InferError::UnsupportedElementType(element_type.to_string()))?;
        let len = checked_byte_len(&shape, width).ok_or_else(|| {
            InferError::shape(format!("tensor of shape {shape:?} exceeds addressable memory"))
        })?;
        Ok(Self {
            shape,
            element_type,
            bytes: vec![0; len],
        })
    }

    /// Wrap existing bytes, checking the length against the shape
    ///
    /// # Errors
    /// - Byte length does not equal `element_count * byte_width`
    pub fn from_bytes(shape: Vec<usize>, element_type: ElementType, bytes: Vec<u8>) -> Result<Self> {
        let mut data = Self::zeroed(shape, element_type)?;
        if bytes.len() != data.bytes.len() {
            return Err(InferError::ByteSizeMismatch {
                expected: data.bytes.len(),
                actual: bytes.len(),
            });
        }
        data.bytes = bytes;
        Ok(data)
    }

    pub fn from_f32_values(shape: Vec<usize>, values: &[f32]) -> Result<Self> {
        let bytes = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        Self::from_bytes(shape, ElementType::F32, bytes)
    }

    pub fn from_i8_values(shape: Vec<usize>, values: &[i8]) -> Result<Self> {
        let bytes = values.iter().map(|&v| v as u8).collect();
        Self::from_bytes(shape, ElementType::I8, bytes)
    }

    /// Copy `src` into tensor storage.
    ///
    /// # Errors
    /// - `src` is not exactly the tensor's byte size; nothing is copied
    pub fn write_bytes(&mut self, src: &[u8]) -> Result<()> {
        if src.len() != self.bytes.len() {
            return Err(InferError::ByteSizeMismatch {
                expected: self.bytes.len(),
                actual: src.len(),
            });
        }
        self.bytes.copy_from_slice(src);
        Ok(())
    }

    /// Build a tensor from packed 8-bit pixels.
    ///
    /// Single-byte element types receive a raw byte copy; `f32` elements
    /// receive the pixel value, divided by 255 under [`PixelScaling::Normalized`].
    ///
    /// # Errors
    /// - Pixel count does not equal the tensor's element count
    /// - Element type without a pixel conversion
    pub fn from_pixels(
        shape: Vec<usize>,
        element_type: ElementType,
        pixels: &[u8],
        scaling: PixelScaling,
    ) -> Result<Self> {
        let mut data = Self::zeroed(shape, element_type)?;
        let elements = data.element_count();
        if pixels.len() != elements {
            return Err(InferError::ByteSizeMismatch {
                expected: data.bytes.len(),
                actual: pixels.len() * data.element_type.byte_width().unwrap_or(1),
            });
        }

        let element_type = data.element_type.clone();
        match element_type {
            ElementType::U8 | ElementType::I8 => data.write_bytes(pixels)?,
            ElementType::F32 => {
                let bytes: Vec<u8> = pixels
                    .iter()
                    .map(|&p| scaling.pixel_to_value(p))
                    .flat_map(f32::to_ne_bytes)
                    .collect();
                data.write_bytes(&bytes)?;
            },
            other => return Err(InferError::UnsupportedElementType(other.to_string())),
        }
        Ok(data)
    }

    /// Convert tensor contents back to packed 8-bit pixels.
    ///
    /// Float values are scaled back, clamped to `[0, 255]` and rounded.
    ///
    /// # Errors
    /// - Element type without a pixel conversion
    pub fn to_pixels(&self, scaling: PixelScaling) -> Result<Vec<u8>> {
        match self.element_type {
            ElementType::U8 | ElementType::I8 => Ok(self.bytes.clone()),
            ElementType::F32 => Ok(self
                .f32_values()?
                .into_iter()
                .map(|v| scaling.value_to_pixel(v))
                .collect()),
            ref other => Err(InferError::UnsupportedElementType(other.to_string())),
        }
    }

    /// Contents as `f32` values.
    ///
    /// # Errors
    /// - The tensor is not `f32`
    pub fn f32_values(&self) -> Result<Vec<f32>> {
        if self.element_type != ElementType::F32 {
            return Err(InferError::UnsupportedElementType(format!(
                "expected f32 tensor, got {}",
                self.element_type
            )));
        }
        Ok(self
            .bytes
            .chunks_exact(4)
            .filter_map(|c| <[u8; 4]>::try_from(c).ok())
            .map(f32::from_ne_bytes)
            .collect())
    }

    /// Contents as `i8` values.
    ///
    /// # Errors
    /// - The tensor is not `i8`
    pub fn i8_values(&self) -> Result<Vec<i8>> {
        if self.element_type != ElementType::I8 {
            return Err(InferError::UnsupportedElementType(format!(
                "expected i8 tensor, got {}",
                self.element_type
            )));
        }
        Ok(self.bytes.iter().map(|&b| b as i8).collect())
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[must_use]
    pub fn element_type(&self) -> &ElementType {
        &self.element_type
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_type_display_and_width() {
        assert_eq!(ElementType::F32.to_string(), "f32");
        assert_eq!(ElementType::U8.to_string(), "u8");
        assert_eq!(ElementType::Other("bool".into()).to_string(), "???");
        assert_eq!(ElementType::F16.byte_width(), Some(2));
        assert_eq!(ElementType::I64.byte_width(), Some(8));
        assert_eq!(ElementType::Other("string".into()).byte_width(), None);
    }

    #[test]
    fn test_tensor_info_static_shape() {
        let info = TensorInfo::new("images", vec![-1, 224, 224, 3], ElementType::U8);
        assert!(!info.is_static());
        assert_eq!(info.static_shape().unwrap(), vec![1, 224, 224, 3]);
        assert_eq!(info.dims_display(), "?x224x224x3");
        assert_eq!(info.byte_size(), None);

        let info = TensorInfo::new("images", vec![1, -1, -1, 3], ElementType::U8);
        let err = info.static_shape().unwrap_err();
        assert!(matches!(err, InferError::Shape(_)));
        assert!(err.to_string().contains("dynamic axis 1"));
    }

    #[test]
    fn test_tensor_info_byte_size() {
        let info = TensorInfo::with_shape("x", &[1, 4, 4, 3], ElementType::F32);
        assert_eq!(info.rank(), 4);
        assert_eq!(info.byte_size(), Some(192));
        assert_eq!(info.dims_display(), "1x4x4x3");
    }

    #[test]
    fn test_overflowing_shapes_are_rejected() {
        let huge = [1usize << 32, 1 << 32, 4];

        let info = TensorInfo::with_shape("x", &huge, ElementType::F32);
        assert_eq!(info.byte_size(), None);
        info.describe();

        let err = TensorData::zeroed(huge.to_vec(), ElementType::U8).unwrap_err();
        assert!(matches!(err, InferError::Shape(_)));
        let err = TensorData::from_bytes(huge.to_vec(), ElementType::F32, Vec::new()).unwrap_err();
        assert!(matches!(err, InferError::Shape(_)));
    }

    #[test]
    fn test_write_bytes_is_length_checked() {
        let mut data = TensorData::zeroed(vec![1, 2, 2, 3], ElementType::U8).unwrap();
        assert_eq!(data.byte_size(), 12);

        let err = data.write_bytes(&[7; 11]).unwrap_err();
        assert!(matches!(
            err,
            InferError::ByteSizeMismatch {
                expected: 12,
                actual: 11
            }
        ));
        // Nothing was copied on failure
        assert!(data.as_bytes().iter().all(|&b| b == 0));

        data.write_bytes(&[7; 12]).unwrap();
        assert!(data.as_bytes().iter().all(|&b| b == 7));
    }

    #[test]
    fn test_from_pixels_u8_is_a_byte_copy() {
        let pixels: Vec<u8> = (0..12).collect();
        let data =
            TensorData::from_pixels(vec![1, 2, 2, 3], ElementType::U8, &pixels, PixelScaling::Normalized)
                .unwrap();
        assert_eq!(data.as_bytes(), pixels.as_slice());
        assert_eq!(data.to_pixels(PixelScaling::Normalized).unwrap(), pixels);
    }

    #[test]
    fn test_from_pixels_f32_scaling() {
        let pixels = [0u8, 51, 255];
        let raw = TensorData::from_pixels(vec![1, 3], ElementType::F32, &pixels, PixelScaling::Raw)
            .unwrap();
        assert_eq!(raw.f32_values().unwrap(), vec![0.0, 51.0, 255.0]);
        assert_eq!(raw.byte_size(), 12);

        let normalized =
            TensorData::from_pixels(vec![1, 3], ElementType::F32, &pixels, PixelScaling::Normalized)
                .unwrap();
        let values = normalized.f32_values().unwrap();
        assert!((values[1] - 0.2).abs() < 1e-6);
        assert!((values[2] - 1.0).abs() < 1e-6);
        assert_eq!(normalized.to_pixels(PixelScaling::Normalized).unwrap(), pixels);
    }

    #[test]
    fn test_to_pixels_clamps_float_values() {
        let data = TensorData::from_f32_values(vec![4], &[-12.0, 0.4, 254.6, 900.0]).unwrap();
        assert_eq!(data.to_pixels(PixelScaling::Raw).unwrap(), vec![0, 0, 255, 255]);
    }

    #[test]
    fn test_from_pixels_rejects_wrong_pixel_count() {
        let err = TensorData::from_pixels(vec![1, 2, 2], ElementType::F32, &[0; 3], PixelScaling::Raw)
            .unwrap_err();
        assert!(matches!(
            err,
            InferError::ByteSizeMismatch {
                expected: 16,
                actual: 12
            }
        ));
    }

    #[test]
    fn test_unsupported_element_types() {
        let err =
            TensorData::from_pixels(vec![2, 2], ElementType::I32, &[0; 4], PixelScaling::Raw).unwrap_err();
        assert!(matches!(err, InferError::UnsupportedElementType(_)));
        assert!(!ElementType::F16.supports_pixels());

        let err = TensorData::zeroed(vec![2, 2], ElementType::Other("string".into())).unwrap_err();
        assert!(matches!(err, InferError::UnsupportedElementType(_)));
    }

    #[test]
    fn test_i8_round_trip_preserves_bytes() {
        let data = TensorData::from_i8_values(vec![3], &[-1, 0, 127]).unwrap();
        assert_eq!(data.as_bytes(), &[255, 0, 127]);
        assert_eq!(data.i8_values().unwrap(), vec![-1, 0, 127]);
        assert!(data.f32_values().is_err());
    }
}

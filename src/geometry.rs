//! Image interpretation of tensor shapes
//!
//! A model only tells us the dimension list of its tensors. [`classify`] decides
//! whether such a list can be read as an image and recovers its width, height
//! and channel count. Axes of extent 1 are treated as batch/broadcast axes and
//! skipped; the remaining axes map in declaration order to width, height and
//! channels.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest channel count any supported pixel format carries (RGBA)
pub const MAX_CHANNELS: usize = 4;

/// Reasons a tensor shape cannot be read as an image
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationError {
    /// A degenerate axis cannot describe an image
    #[error("axis {axis} has extent 0")]
    ZeroDimension { axis: usize },

    /// More than three axes are larger than 1
    #[error("more than 3 axes larger than 1 (offending axis {axis})")]
    TooManyAxes { axis: usize },

    /// Width and height are mandatory
    #[error("only {found} axes larger than 1; width and height are required")]
    TooFewAxes { found: usize },

    /// No supported pixel format has this many channels
    #[error("{channels} channels exceeds the maximum of {MAX_CHANNELS}")]
    TooManyChannels { channels: usize },
}

/// Width, height and channel count recovered from a tensor shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageGeometry {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
}

impl ImageGeometry {
    #[must_use]
    pub fn new(width: usize, height: usize, channels: usize) -> Self {
        Self {
            width,
            height,
            channels,
        }
    }

    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// Number of tensor elements (one per channel per pixel)
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.pixel_count() * self.channels
    }

    /// Bytes per packed row
    #[must_use]
    pub fn row_stride(&self) -> usize {
        self.width * self.channels
    }

    /// Whether a decoded image of `width` x `height` fits this geometry
    #[must_use]
    pub fn matches(&self, width: usize, height: usize) -> bool {
        self.width == width && self.height == height
    }
}

impl std::fmt::Display for ImageGeometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{}, with {} channels",
            self.width, self.height, self.channels
        )
    }
}

/// Interpret a tensor shape as an image.
///
/// # Errors
/// - [`ClassificationError::ZeroDimension`] if any axis has extent 0
/// - [`ClassificationError::TooManyAxes`] if more than three axes exceed 1
/// - [`ClassificationError::TooFewAxes`] if fewer than two axes exceed 1
/// - [`ClassificationError::TooManyChannels`] if the channel axis exceeds 4
///
/// # Examples
/// ```rust
/// use image_infer::geometry::{classify, ImageGeometry};
///
/// let geometry = classify(&[1, 224, 224, 3]).unwrap();
/// assert_eq!(geometry, ImageGeometry::new(224, 224, 3));
/// ```
pub fn classify(shape: &[usize]) -> Result<ImageGeometry, ClassificationError> {
    let mut slots = [0usize; 3];
    let mut cursor = 0;

    for (axis, &dim) in shape.iter().enumerate() {
        match dim {
            0 => return Err(ClassificationError::ZeroDimension { axis }),
            1 => continue,
            _ => {
                let slot = slots
                    .get_mut(cursor)
                    .ok_or(ClassificationError::TooManyAxes { axis })?;
                *slot = dim;
                cursor += 1;
            },
        }
    }

    if cursor < 2 {
        return Err(ClassificationError::TooFewAxes { found: cursor });
    }

    let [width, height, channels] = slots;
    // Grayscale when no channel axis is declared
    let channels = if cursor == 2 { 1 } else { channels };

    if channels > MAX_CHANNELS {
        return Err(ClassificationError::TooManyChannels { channels });
    }

    Ok(ImageGeometry {
        width,
        height,
        channels,
    })
}

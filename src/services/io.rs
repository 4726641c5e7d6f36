//! Image I/O operations service
//!
//! Decodes image files into packed 8-bit buffers with a requested channel
//! count, and encodes packed buffers back into image files. Encoding goes
//! through a temporary file in the destination directory that is renamed into
//! place only once it has been written completely.

use crate::{
    config::OutputFormat,
    error::{InferError, Result},
    geometry::{ImageGeometry, MAX_CHANNELS},
};
use image::{DynamicImage, GrayAlphaImage, GrayImage, RgbImage, RgbaImage};
use std::io::{BufWriter, Write};
use std::path::Path;

/// A decoded image as a packed, row-major 8-bit buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    #[must_use]
    pub fn geometry(&self) -> ImageGeometry {
        ImageGeometry::new(self.width, self.height, self.channels)
    }
}

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Decode an image file into a packed buffer with `channels` channels
    ///
    /// Channel counts map to L8, LA8, RGB8 and RGBA8.
    ///
    /// # Errors
    /// - Channel count outside 1..=4
    /// - File missing or not decodable
    ///
    /// # Examples
    /// ```rust,no_run
    /// use image_infer::services::ImageIOService;
    ///
    /// let image = ImageIOService::decode("input.jpg", 3)?;
    /// assert_eq!(image.pixels.len(), image.width * image.height * 3);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn decode<P: AsRef<Path>>(path: P, channels: usize) -> Result<DecodedImage> {
        let path_ref = path.as_ref();

        if channels == 0 || channels > MAX_CHANNELS {
            return Err(InferError::image_decode(
                path_ref,
                format!("cannot decode to {channels} channels"),
            ));
        }
        if !path_ref.exists() {
            return Err(InferError::image_decode(path_ref, "file does not exist"));
        }

        let image = Self::load_image(path_ref)?;
        let (width, height) = (image.width() as usize, image.height() as usize);
        log::debug!(
            "Decoded {} ({}x{}, {:?}) to {} channel(s)",
            path_ref.display(),
            width,
            height,
            image.color(),
            channels
        );

        let pixels = match channels {
            1 => image.into_luma8().into_raw(),
            2 => image.into_luma_alpha8().into_raw(),
            3 => image.into_rgb8().into_raw(),
            _ => image.into_rgba8().into_raw(),
        };

        Ok(DecodedImage {
            width,
            height,
            channels,
            pixels,
        })
    }

    fn load_image(path: &Path) -> Result<DynamicImage> {
        match image::open(path) {
            Ok(img) => Ok(img),
            Err(e) => {
                // Extension may be missing or wrong; retry with content sniffing
                log::debug!(
                    "Extension-based loading failed for {}: {}. Attempting content-based detection.",
                    path.display(),
                    e
                );
                let data = std::fs::read(path)
                    .map_err(|io_err| InferError::image_decode(path, io_err.to_string()))?;
                image::load_from_memory(&data).map_err(|content_err| {
                    InferError::image_decode(
                        path,
                        format!("{content_err} ({} bytes)", data.len()),
                    )
                })
            },
        }
    }

    /// Encode a packed buffer of `geometry` into `path`
    ///
    /// The destination only appears once fully written; on failure no file is
    /// left behind.
    ///
    /// # Errors
    /// - `pixels` length differs from the geometry's element count
    /// - Channel count outside 1..=4 or dimensions too large for the codec
    /// - Destination directory missing
    /// - Codec or filesystem failures
    pub fn encode<P: AsRef<Path>>(
        path: P,
        geometry: ImageGeometry,
        pixels: Vec<u8>,
        format: OutputFormat,
    ) -> Result<()> {
        let path_ref = path.as_ref();

        if pixels.len() != geometry.element_count() {
            return Err(InferError::ByteSizeMismatch {
                expected: geometry.element_count(),
                actual: pixels.len(),
            });
        }

        let image = Self::to_dynamic_image(path_ref, geometry, pixels)?;
        let image = Self::convert_for_format(image, format);

        let parent = match path_ref.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        if !parent.is_dir() {
            return Err(InferError::image_encode(
                path_ref,
                format!("output directory '{}' does not exist", parent.display()),
            ));
        }

        let mut temp = tempfile::Builder::new()
            .prefix(".image-infer-")
            .tempfile_in(parent)
            .map_err(|e| InferError::file_io_error("create temporary file in", parent, &e))?;

        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            image
                .write_to(&mut writer, format.image_format())
                .map_err(|e| InferError::image_encode(path_ref, e.to_string()))?;
            writer
                .flush()
                .map_err(|e| InferError::image_encode(path_ref, e.to_string()))?;
        }

        temp.persist(path_ref)
            .map_err(|e| InferError::file_io_error("write output file", path_ref, &e.error))?;

        log::debug!("Wrote {} ({:?})", path_ref.display(), format);
        Ok(())
    }

    fn to_dynamic_image(
        path: &Path,
        geometry: ImageGeometry,
        pixels: Vec<u8>,
    ) -> Result<DynamicImage> {
        let width = u32::try_from(geometry.width)
            .map_err(|_| InferError::image_encode(path, "width exceeds codec limits"))?;
        let height = u32::try_from(geometry.height)
            .map_err(|_| InferError::image_encode(path, "height exceeds codec limits"))?;
        let invalid = || InferError::image_encode(path, format!("invalid buffer for {geometry}"));

        let image = match geometry.channels {
            1 => DynamicImage::ImageLuma8(
                GrayImage::from_raw(width, height, pixels).ok_or_else(invalid)?,
            ),
            2 => DynamicImage::ImageLumaA8(
                GrayAlphaImage::from_raw(width, height, pixels).ok_or_else(invalid)?,
            ),
            3 => DynamicImage::ImageRgb8(
                RgbImage::from_raw(width, height, pixels).ok_or_else(invalid)?,
            ),
            4 => DynamicImage::ImageRgba8(
                RgbaImage::from_raw(width, height, pixels).ok_or_else(invalid)?,
            ),
            other => {
                return Err(InferError::image_encode(
                    path,
                    format!("cannot encode {other} channels"),
                ))
            },
        };
        Ok(image)
    }

    /// Map the pixel layout onto one the target codec accepts
    fn convert_for_format(image: DynamicImage, format: OutputFormat) -> DynamicImage {
        match (format, &image) {
            (OutputFormat::Jpeg, DynamicImage::ImageLumaA8(_)) => {
                DynamicImage::ImageLuma8(image.into_luma8())
            },
            (OutputFormat::Jpeg, DynamicImage::ImageRgba8(_)) => {
                DynamicImage::ImageRgb8(image.into_rgb8())
            },
            (OutputFormat::WebP, DynamicImage::ImageLuma8(_)) => {
                DynamicImage::ImageRgb8(image.into_rgb8())
            },
            (OutputFormat::WebP | OutputFormat::Tiff, DynamicImage::ImageLumaA8(_)) => {
                DynamicImage::ImageRgba8(image.into_rgba8())
            },
            _ => image,
        }
    }
}

//! End-to-end pipeline tests
//!
//! These drive `InferenceRunner` through real image files on disk. Most use
//! mock backends standing in for the engine; the engine tests run the
//! `tests/fixtures/invert_1x4x4x3.onnx` model, which computes `255 - x` on a
//! `[1, 4, 4, 3]` float tensor.

use image::{GrayImage, Luma, Rgb, RgbImage};
use image_infer::{
    error::{InferError, TensorRole},
    geometry::ClassificationError,
    ElementType, ImageGeometry, InferenceRunner, MockBackend, MockBackendFactory, PixelScaling,
    RunConfig, TensorData, TensorInfo,
};
use std::path::Path;
use tempfile::TempDir;

#[cfg(any(feature = "onnx", feature = "tract"))]
use image_infer::{BackendType, ExecutionProvider};
#[cfg(any(feature = "onnx", feature = "tract"))]
use std::path::PathBuf;

fn runner_with(backend: MockBackend, scaling: PixelScaling) -> InferenceRunner {
    let config = RunConfig::builder()
        .model_path("mock.onnx")
        .scaling(scaling)
        .build()
        .unwrap();
    InferenceRunner::with_factory(config, Box::new(MockBackendFactory::new(backend))).unwrap()
}

fn runner(backend: MockBackend) -> InferenceRunner {
    runner_with(backend, PixelScaling::Raw)
}

/// RGB image whose red channel encodes x and green channel encodes y
fn write_coordinates(path: &Path, width: u32, height: u32) {
    RgbImage::from_fn(width, height, |x, y| Rgb([(x * 10) as u8, (y * 10) as u8, 200]))
        .save(path)
        .unwrap();
}

fn entries(dir: &TempDir) -> usize {
    std::fs::read_dir(dir.path()).unwrap().count()
}

#[cfg(any(feature = "onnx", feature = "tract"))]
fn invert_model() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/invert_1x4x4x3.onnx")
}

/// Run the inversion model on a 4x4 coordinate image and check every pixel
#[cfg(any(feature = "onnx", feature = "tract"))]
fn assert_engine_inverts(backend_type: BackendType) {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.png");
    let output = dir.path().join("out.png");
    write_coordinates(&input, 4, 4);

    let config = RunConfig::builder()
        .model_path(invert_model())
        .backend_type(backend_type)
        .execution_provider(ExecutionProvider::Cpu)
        .build()
        .unwrap();
    let runner = InferenceRunner::new(config).unwrap();

    let summary = runner.inspect().unwrap();
    assert!(summary.is_runnable());
    assert_eq!(summary.inputs[0].info.name, "image");
    assert_eq!(summary.inputs[0].info.dims, vec![1, 4, 4, 3]);
    assert_eq!(summary.inputs[0].info.element_type, ElementType::F32);

    let report = runner.run(&input, &output).unwrap();
    assert_eq!(report.input_geometry, ImageGeometry::new(4, 4, 3));
    assert_eq!(report.output_geometry, ImageGeometry::new(4, 4, 3));

    let written = image::open(&output).unwrap().into_rgb8();
    assert_eq!(written.dimensions(), (4, 4));
    for (x, y, pixel) in written.enumerate_pixels() {
        let expected = [255 - (x * 10) as u8, 255 - (y * 10) as u8, 55];
        assert_eq!(pixel.0, expected, "pixel ({x}, {y})");
    }
    assert_eq!(entries(&dir), 2);
}

#[test]
fn test_grayscale_inversion() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.png");
    let output = dir.path().join("out.png");
    GrayImage::from_fn(6, 4, |x, y| Luma([(x * 40 + y) as u8]))
        .save(&input)
        .unwrap();

    let info = TensorInfo::with_shape("gray", &[1, 6, 4, 1], ElementType::U8);
    let backend = MockBackend::new(vec![info.clone()], vec![info], |inputs| {
        let inverted: Vec<u8> = inputs[0].as_bytes().iter().map(|b| 255 - b).collect();
        Ok(vec![TensorData::from_bytes(
            inputs[0].shape().to_vec(),
            ElementType::U8,
            inverted,
        )?])
    });

    let report = runner(backend).run(&input, &output).unwrap();
    assert_eq!(report.input_geometry, ImageGeometry::new(6, 4, 1));
    assert_eq!(report.output_geometry, ImageGeometry::new(6, 4, 1));

    let written = image::open(&output).unwrap().into_luma8();
    assert_eq!(written.dimensions(), (6, 4));
    assert_eq!(written.get_pixel(0, 0).0, [255]);
    assert_eq!(written.get_pixel(5, 3).0, [255 - 203]);
}

#[test]
fn test_channel_reduction_changes_output_geometry() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.png");
    let output = dir.path().join("mask.png");
    write_coordinates(&input, 4, 4);

    // RGB in, single-channel mask out
    let input_info = TensorInfo::with_shape("image", &[1, 4, 4, 3], ElementType::U8);
    let output_info = TensorInfo::with_shape("mask", &[1, 4, 4, 1], ElementType::U8);
    let backend = MockBackend::new(vec![input_info], vec![output_info], |inputs| {
        let mask: Vec<u8> = inputs[0]
            .as_bytes()
            .chunks_exact(3)
            .map(|pixel| pixel[2])
            .collect();
        Ok(vec![TensorData::from_bytes(vec![1, 4, 4, 1], ElementType::U8, mask)?])
    });

    let report = runner(backend).run(&input, &output).unwrap();
    assert_eq!(report.output_geometry, ImageGeometry::new(4, 4, 1));

    let written = image::open(&output).unwrap();
    assert_eq!(written.color(), image::ColorType::L8);
    assert!(written.into_luma8().pixels().all(|p| p.0 == [200]));
}

#[test]
fn test_normalized_float_model() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.png");
    let output = dir.path().join("out.png");
    write_coordinates(&input, 3, 2);

    let info = TensorInfo::with_shape("image", &[1, 3, 2, 3], ElementType::F32);
    let backend = MockBackend::new(vec![info.clone()], vec![info], |inputs| {
        let values = inputs[0].f32_values()?;
        if values.iter().any(|v| !(0.0..=1.0).contains(v)) {
            return Err(InferError::inference("input not normalized"));
        }
        Ok(inputs.to_vec())
    });

    runner_with(backend, PixelScaling::Normalized)
        .run(&input, &output)
        .unwrap();

    let written = image::open(&output).unwrap().into_rgb8();
    assert_eq!(written.get_pixel(2, 1).0, [20, 10, 200]);
}

#[test]
fn test_float_output_is_clamped() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.png");
    let output = dir.path().join("out.png");
    GrayImage::from_pixel(2, 2, Luma([7])).save(&input).unwrap();

    let info = TensorInfo::with_shape("x", &[2, 2], ElementType::F32);
    let backend = MockBackend::new(vec![info.clone()], vec![info], |_| {
        Ok(vec![TensorData::from_f32_values(
            vec![2, 2],
            &[-40.0, 12.4, 300.0, f32::NAN],
        )?])
    });

    runner(backend).run(&input, &output).unwrap();

    let written = image::open(&output).unwrap().into_luma8();
    let pixels: Vec<u8> = written.pixels().map(|p| p.0[0]).collect();
    assert_eq!(pixels, vec![0, 12, 255, 0]);
}

#[test]
fn test_dimension_mismatch_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.png");
    let output = dir.path().join("out.png");
    write_coordinates(&input, 5, 5);

    let backend =
        MockBackend::identity(TensorInfo::with_shape("image", &[1, 4, 4, 3], ElementType::U8));
    let err = runner(backend.clone()).run(&input, &output).unwrap_err();

    assert!(matches!(
        err,
        InferError::DimensionMismatch {
            expected_width: 4,
            actual_width: 5,
            ..
        }
    ));
    assert!(!output.exists());
    assert_eq!(entries(&dir), 1);
    // Rejected before the forward pass
    assert_eq!(backend.call_history(), vec!["load"]);
}

#[test]
fn test_oversized_declared_shape_is_an_error() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.png");
    let output = dir.path().join("out.png");
    write_coordinates(&input, 4, 4);

    // Byte size of this shape does not fit in usize
    let backend = MockBackend::identity(TensorInfo::with_shape(
        "image",
        &[1, 1 << 32, 1 << 32, 4],
        ElementType::U8,
    ));
    let err = runner(backend.clone()).run(&input, &output).unwrap_err();

    assert!(matches!(err, InferError::DimensionMismatch { .. }));
    assert!(!output.exists());
    assert_eq!(backend.call_history(), vec!["load"]);
}

#[test]
fn test_inference_failure_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.png");
    let output = dir.path().join("out.png");
    write_coordinates(&input, 4, 4);

    let backend =
        MockBackend::identity(TensorInfo::with_shape("image", &[1, 4, 4, 3], ElementType::U8))
            .failing_invoke("out of memory");
    let err = runner(backend).run(&input, &output).unwrap_err();

    assert!(matches!(err, InferError::Inference(_)));
    assert_eq!(err.stage(), "inference");
    assert!(!output.exists());
    assert_eq!(entries(&dir), 1);
}

#[test]
fn test_model_load_failure() {
    let backend =
        MockBackend::identity(TensorInfo::with_shape("image", &[1, 4, 4, 3], ElementType::U8))
            .failing_load("not a model");
    let err = runner(backend.clone()).run("in.png", "out.png").unwrap_err();

    assert!(matches!(err, InferError::ModelLoad { .. }));
    assert!(err.to_string().contains("not a model"));
    assert_eq!(backend.call_history(), vec!["load"]);
}

#[test]
fn test_unclassifiable_output_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.png");
    let output = dir.path().join("out.png");
    write_coordinates(&input, 4, 4);

    // Five channels have no pixel format
    let input_info = TensorInfo::with_shape("image", &[1, 4, 4, 3], ElementType::U8);
    let output_info = TensorInfo::new("features", vec![1, 4, 4, -1], ElementType::U8);
    let backend = MockBackend::new(vec![input_info], vec![output_info], |_| {
        Ok(vec![TensorData::zeroed(vec![1, 4, 4, 5], ElementType::U8)?])
    });

    let err = runner(backend).run(&input, &output).unwrap_err();
    assert!(matches!(
        err,
        InferError::Classification {
            role: TensorRole::Output,
            source: ClassificationError::TooManyChannels { channels: 5 }
        }
    ));
    assert!(!output.exists());
}

#[test]
fn test_multiple_outputs_are_rejected_before_decoding() {
    let info = TensorInfo::with_shape("image", &[1, 4, 4, 3], ElementType::U8);
    let backend = MockBackend::new(
        vec![info.clone()],
        vec![info.clone(), info],
        |inputs| Ok(inputs.to_vec()),
    );

    let err = runner(backend.clone())
        .run("missing-input.png", "out.png")
        .unwrap_err();
    assert!(matches!(
        err,
        InferError::TensorCount {
            role: TensorRole::Output,
            actual: 2
        }
    ));
    assert_eq!(backend.call_history(), vec!["load"]);
}

#[test]
fn test_missing_input_image() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out.png");
    let backend =
        MockBackend::identity(TensorInfo::with_shape("image", &[1, 4, 4, 3], ElementType::U8));

    let err = runner(backend)
        .run(dir.path().join("missing.png"), &output)
        .unwrap_err();
    assert!(matches!(err, InferError::ImageDecode { .. }));
    assert!(!output.exists());
}

#[test]
fn test_output_format_follows_extension() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.png");
    let output = dir.path().join("out.jpg");
    write_coordinates(&input, 8, 8);

    let backend =
        MockBackend::identity(TensorInfo::with_shape("image", &[1, 8, 8, 3], ElementType::U8));
    runner(backend).run(&input, &output).unwrap();

    let bytes = std::fs::read(&output).unwrap();
    assert_eq!(
        image::guess_format(&bytes).unwrap(),
        image::ImageFormat::Jpeg
    );
}

#[test]
fn test_inspect_reports_every_tensor() {
    let image = TensorInfo::with_shape("image", &[1, 4, 4, 3], ElementType::U8);
    let logits = TensorInfo::with_shape("logits", &[1, 1000], ElementType::F32);
    let backend = MockBackend::new(vec![image.clone()], vec![image, logits], |inputs| {
        Ok(inputs.to_vec())
    });

    let summary = runner(backend).inspect().unwrap();
    assert_eq!(summary.backend, "mock");
    assert_eq!(summary.inputs.len(), 1);
    assert_eq!(summary.outputs.len(), 2);
    assert_eq!(summary.outputs[0].geometry, Some(ImageGeometry::new(4, 4, 3)));
    assert!(summary.outputs[1].geometry.is_none());
    assert!(summary.outputs[1].problem.is_some());
    assert!(!summary.is_runnable());
}

#[test]
fn test_run_report_serializes() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.png");
    let output = dir.path().join("out.png");
    write_coordinates(&input, 2, 3);

    let backend =
        MockBackend::identity(TensorInfo::with_shape("image", &[2, 3, 3], ElementType::U8));
    let report = runner(backend).run(&input, &output).unwrap();

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["backend"], "onnx");
    assert_eq!(json["input_geometry"]["width"], 2);
    assert_eq!(json["output_geometry"]["height"], 3);
    assert_eq!(json["output_geometry"]["channels"], 3);
}

#[cfg(feature = "tract")]
#[test]
fn test_tract_runs_inversion_model() {
    assert_engine_inverts(BackendType::Tract);
}

#[cfg(feature = "onnx")]
#[test]
fn test_onnx_runs_inversion_model() {
    assert_engine_inverts(BackendType::Onnx);
}

#[cfg(feature = "tract")]
#[test]
fn test_inversion_model_rejects_wrong_image_size() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.png");
    let output = dir.path().join("out.png");
    write_coordinates(&input, 8, 4);

    let config = RunConfig::builder()
        .model_path(invert_model())
        .backend_type(BackendType::Tract)
        .execution_provider(ExecutionProvider::Cpu)
        .build()
        .unwrap();
    let err = InferenceRunner::new(config)
        .unwrap()
        .run(&input, &output)
        .unwrap_err();

    assert!(matches!(
        err,
        InferError::DimensionMismatch {
            expected_width: 4,
            actual_width: 8,
            ..
        }
    ));
    assert!(!output.exists());
}

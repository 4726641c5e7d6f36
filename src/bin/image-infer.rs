//! image-infer CLI tool
//!
//! Runs one image through an ONNX model and writes the output tensor as an
//! image, using the ONNX Runtime or Tract backend.

use std::process::ExitCode;

#[cfg(feature = "cli")]
fn main() -> ExitCode {
    image_infer::cli::main()
}

#[cfg(not(feature = "cli"))]
fn main() -> ExitCode {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    ExitCode::FAILURE
}

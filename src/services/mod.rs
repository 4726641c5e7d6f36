//! Services separating file I/O from the inference pipeline

pub mod io;

pub use io::{DecodedImage, ImageIOService};

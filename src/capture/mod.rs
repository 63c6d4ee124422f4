pub mod extractor;
pub mod runner;

pub use extractor::{DEFAULT_MARKER, DEFAULT_MAX_LINE_BYTES};
pub use runner::{CaptureError, CaptureRunner};

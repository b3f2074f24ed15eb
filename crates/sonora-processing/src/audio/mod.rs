//! Audio processing module
//!
//! Format conversion and audio info extraction over external tools, plus
//! bitrate estimation for lossy sources.

mod bitrate;
mod converter;
mod extractor;

pub use bitrate::estimate_bitrate_kbps;
pub use converter::{canonical_output_path, CanonicalTarget, FfmpegConverter, FormatConverter};
pub use extractor::{parse_analysis_output, InfoExtractor, StereofyExtractor};

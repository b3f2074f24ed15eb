//! Data models shared by the pipeline components
//!
//! Audio records produced by conversion and extraction live in `audio`; the
//! upload progress record kept by the progress cache lives in `upload`.

mod audio;
mod upload;

pub use audio::*;
pub use upload::*;

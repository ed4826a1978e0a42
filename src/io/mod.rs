//! I/O layer: staging uploaded images into the working directory and the PNG
//! writer used for every artifact the pipeline produces.
pub mod upload;
pub use upload::{UploadedImage, stage_bytes, stage_file};

pub mod writers;

//! Image processing pipeline: download, encode, infer, format.

pub mod format;
pub mod processor;

pub use format::ReplyFormat;
pub use processor::{ImageProcessor, ReplyText};

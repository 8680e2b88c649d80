pub mod clahe;
pub mod pipeline;

pub use clahe::{Clahe, enhance, to_gray_bt601};
pub use pipeline::{FolderReport, Pipeline, PipelineError, SplitReport};

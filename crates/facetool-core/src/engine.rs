//! The four-operation engine boundary.

use crate::image::{ImageBuffer, ImageError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Unrecoverable fault at the native boundary (runtime missing, device lost).
    #[error("fatal engine fault: {0}")]
    Fatal(String),
    #[error("{0} is disabled in the engine configuration")]
    Disabled(&'static str),
    #[error("invalid image: {0}")]
    InvalidImage(#[from] ImageError),
    #[error("inference failed: {0}")]
    Inference(String),
}

/// A face-analysis engine reachable through flat float records.
///
/// Implementations return one record per face in the layout described by
/// [`RecordLayout`](crate::record::RecordLayout): 15 floats for `detect`,
/// 15 plus the embedding for `extract`. Ordering is engine-defined and is
/// preserved by the binding.
pub trait FaceEngine {
    /// Load configuration and models. `Ok(false)` is an ordinary, retryable
    /// failure; `Err` is fatal.
    fn init(&mut self, config_path: &str) -> Result<bool, EngineError>;

    fn detect(&mut self, image: &ImageBuffer) -> Result<Vec<Vec<f32>>, EngineError>;

    fn extract(&mut self, image: &ImageBuffer) -> Result<Vec<Vec<f32>>, EngineError>;

    /// Similarity of the best face in each image. The range is engine-defined.
    fn verify(&mut self, first: &ImageBuffer, second: &ImageBuffer) -> Result<f32, EngineError>;
}

impl<E: FaceEngine + ?Sized> FaceEngine for Box<E> {
    fn init(&mut self, config_path: &str) -> Result<bool, EngineError> {
        (**self).init(config_path)
    }

    fn detect(&mut self, image: &ImageBuffer) -> Result<Vec<Vec<f32>>, EngineError> {
        (**self).detect(image)
    }

    fn extract(&mut self, image: &ImageBuffer) -> Result<Vec<Vec<f32>>, EngineError> {
        (**self).extract(image)
    }

    fn verify(&mut self, first: &ImageBuffer, second: &ImageBuffer) -> Result<f32, EngineError> {
        (**self).verify(first, second)
    }
}

//! facetool-engine — ONNX face engine.
//!
//! Uses SCRFD for face detection and ArcFace for face recognition,
//! both running via ONNX Runtime for CPU inference.

pub mod alignment;
pub mod detector;
pub mod engine;
pub mod frame;
pub mod pca;
pub mod recognizer;

pub use detector::{DetectorError, FaceDetector};
pub use engine::{verify_score, OnnxEngine, NO_FACE_SCORE};
pub use frame::RgbFrame;
pub use pca::{PcaError, PcaProjection};
pub use recognizer::{FaceRecognizer, RecognizerError};

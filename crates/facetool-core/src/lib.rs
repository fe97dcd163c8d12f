//! facetool-core — Face analysis binding contract.
//!
//! Declares the four-operation engine boundary (init, detect, extract,
//! verify) and decodes the engine's flat float records into typed
//! detections and feature vectors. No inference happens here.

pub mod binding;
pub mod config;
pub mod engine;
pub mod image;
pub mod record;
pub mod types;

pub use binding::{BindingError, EngineState, FaceTool};
pub use config::{ConfigError, EngineConfig, MirrorMode};
pub use engine::{EngineError, FaceEngine};
pub use crate::image::{ImageBuffer, ImageError, PixelFormat};
pub use record::{RawFace, RecordError, RecordLayout};
pub use types::{BoundingBox, Detection, FeatureVector, Landmarks, Point};

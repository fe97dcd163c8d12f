//! Lifecycle-guarded engine binding.
//!
//! `FaceTool` forwards images to a [`FaceEngine`] and decodes the flat
//! records it returns. Operations other than `init` are rejected until the
//! engine has initialized successfully.

use crate::engine::{EngineError, FaceEngine};
use crate::image::ImageBuffer;
use crate::record::{self, RecordError};
use crate::types::{Detection, FeatureVector};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Engine readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Uninitialized,
    Ready,
    /// The last `init` returned false or faulted. `init` may be retried.
    Failed,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Ready => "ready",
            EngineState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum BindingError {
    #[error("engine is not ready (state: {0}); call init with a valid configuration first")]
    NotInitialized(EngineState),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("engine returned a malformed record: {0}")]
    Record(#[from] RecordError),
}

/// Typed face-analysis API over a flat-record engine.
///
/// Calls run synchronously on the caller's thread. The binding adds no
/// locking; share it behind a `Mutex` if several threads need it.
pub struct FaceTool<E> {
    engine: E,
    state: EngineState,
}

impl<E: FaceEngine> FaceTool<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            state: EngineState::Uninitialized,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == EngineState::Ready
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn into_inner(self) -> E {
        self.engine
    }

    /// Initialize the engine from a configuration path.
    ///
    /// Returns `Ok(false)` on ordinary failure, after which `init` may be
    /// called again with another configuration. A fatal engine error moves
    /// the binding to `Failed` and is returned as-is. Once ready, further
    /// calls return `Ok(true)` without touching the engine.
    pub fn init(&mut self, config_path: &str) -> Result<bool, BindingError> {
        if self.state == EngineState::Ready {
            tracing::warn!(config_path, "engine already initialized; ignoring init");
            return Ok(true);
        }

        match self.engine.init(config_path) {
            Ok(true) => {
                self.state = EngineState::Ready;
                tracing::info!(config_path, "engine ready");
                Ok(true)
            }
            Ok(false) => {
                self.state = EngineState::Failed;
                tracing::error!(config_path, "engine initialization failed");
                Ok(false)
            }
            Err(e) => {
                self.state = EngineState::Failed;
                tracing::error!(config_path, error = %e, "fatal error during engine initialization");
                Err(e.into())
            }
        }
    }

    /// Locate faces. Order is the engine's; zero faces yields an empty list.
    pub fn detect(&mut self, image: &ImageBuffer) -> Result<Vec<Detection>, BindingError> {
        self.ensure_ready()?;
        let records = self.engine.detect(image)?;
        let detections = record::decode_detections(&records)?;
        tracing::debug!(faces = detections.len(), "detect");
        Ok(detections)
    }

    /// Locate faces and extract an embedding for each.
    pub fn extract(&mut self, image: &ImageBuffer) -> Result<Vec<FeatureVector>, BindingError> {
        self.ensure_ready()?;
        let records = self.engine.extract(image)?;
        let features = record::decode_features(&records)?;
        tracing::debug!(
            faces = features.len(),
            dim = ?features.first().map(|f| f.embedding.len()),
            "extract"
        );
        Ok(features)
    }

    /// Engine detection records, checked against the record layout but left
    /// as flat floats. For callers that decode on their own side.
    pub fn detect_records(&mut self, image: &ImageBuffer) -> Result<Vec<Vec<f32>>, BindingError> {
        self.ensure_ready()?;
        let records = self.engine.detect(image)?;
        record::decode_detections(&records)?;
        Ok(records)
    }

    /// Engine feature records, checked like [`FaceTool::detect_records`].
    pub fn extract_records(&mut self, image: &ImageBuffer) -> Result<Vec<Vec<f32>>, BindingError> {
        self.ensure_ready()?;
        let records = self.engine.extract(image)?;
        record::decode_features(&records)?;
        Ok(records)
    }

    /// Similarity score between the best face of each image.
    pub fn verify(&mut self, first: &ImageBuffer, second: &ImageBuffer) -> Result<f32, BindingError> {
        self.ensure_ready()?;
        let score = self.engine.verify(first, second)?;
        tracing::debug!(score, "verify");
        Ok(score)
    }

    fn ensure_ready(&self) -> Result<(), BindingError> {
        match self.state {
            EngineState::Ready => Ok(()),
            state => Err(BindingError::NotInitialized(state)),
        }
    }
}

//! ArcFace face recognizer via ONNX Runtime.
//!
//! Extracts 512-dimensional face embeddings from aligned face crops,
//! using the w600k_r50 ArcFace model. Features are returned as the network
//! produces them; similarity scoring normalizes.

use crate::alignment::{self, ALIGNED_SIZE};
use crate::frame::RgbFrame;
use crate::pca::{PcaError, PcaProjection};
use facetool_core::config::{MirrorConfig, RecognizerConfig};
use facetool_core::MirrorMode;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5; // symmetric, unlike SCRFD's 128.0
const ARCFACE_EMBEDDING_DIM: usize = 512;
const ARCFACE_MODEL_VERSION: &str = "w600k_r50";

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("recognizer.ref_points must hold exactly 5 points, got {0}")]
    ReferencePoints(usize),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("pca: {0}")]
    Pca(#[from] PcaError),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// ArcFace-based face recognizer.
pub struct FaceRecognizer {
    session: Session,
    mirror: MirrorConfig,
    pca: Option<PcaProjection>,
    reference: [(f32, f32); 5],
}

impl FaceRecognizer {
    /// Load the ArcFace ONNX model named in `config`, plus its PCA model
    /// when enabled.
    pub fn load(config: &RecognizerConfig, intra_threads: usize) -> Result<Self, RecognizerError> {
        let reference = config
            .reference_points()
            .ok_or(RecognizerError::ReferencePoints(config.ref_points.len()))?;

        let model_path = config.model.to_string_lossy();
        if !Path::new(&config.model).exists() {
            return Err(RecognizerError::ModelNotFound(model_path.into_owned()));
        }

        let pca = if config.pca.enable {
            Some(PcaProjection::load(&config.pca.model)?)
        } else {
            None
        };

        let session = Session::builder()?
            .with_intra_threads(intra_threads)?
            .commit_from_file(&config.model)?;

        tracing::info!(
            path = %model_path,
            version = ARCFACE_MODEL_VERSION,
            mirror = config.mirror.enable,
            pca_dim = ?pca.as_ref().map(PcaProjection::output_dim),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );

        Ok(Self {
            session,
            mirror: config.mirror,
            pca,
            reference,
        })
    }

    /// Warp the face with the given landmarks onto the configured reference
    /// points.
    pub fn align(&self, frame: &RgbFrame, landmarks: &[(f32, f32); 5]) -> RgbFrame {
        alignment::align_face(frame, landmarks, &self.reference)
    }

    /// Feature of the face with the given landmarks.
    ///
    /// With mirroring enabled the flipped crop is embedded too and merged
    /// in; PCA, when enabled, projects the merged feature.
    pub fn extract(&mut self, frame: &RgbFrame, landmarks: &[(f32, f32); 5]) -> Result<Vec<f32>, RecognizerError> {
        let aligned = self.align(frame, landmarks);
        self.extract_aligned(&aligned)
    }

    /// Feature of an already aligned 112x112 crop.
    pub fn extract_aligned(&mut self, aligned: &RgbFrame) -> Result<Vec<f32>, RecognizerError> {
        let mut feature = self.embed(aligned)?;

        if self.mirror.enable {
            let flipped = self.embed(&aligned.flip_horizontal())?;
            feature = merge_mirror(self.mirror.mode, &feature, &flipped);
        }

        match &self.pca {
            Some(pca) => Ok(pca.project(&feature)?),
            None => Ok(feature),
        }
    }

    /// Run ArcFace on an aligned crop.
    fn embed(&mut self, aligned: &RgbFrame) -> Result<Vec<f32>, RecognizerError> {
        let input = preprocess(aligned);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw_data.len() != ARCFACE_EMBEDDING_DIM {
            return Err(RecognizerError::InferenceFailed(format!(
                "expected {ARCFACE_EMBEDDING_DIM}-dim embedding, got {}",
                raw_data.len()
            )));
        }

        Ok(raw_data.to_vec())
    }
}

/// Preprocess a 112x112 RGB aligned crop into a NCHW float tensor.
fn preprocess(aligned: &RgbFrame) -> Array4<f32> {
    let size = ALIGNED_SIZE;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

    for y in 0..size {
        for x in 0..size {
            for c in 0..3 {
                let pixel = aligned.sample(x as i32, y as i32, c) as f32;
                tensor[[0, c, y, x]] = (pixel - ARCFACE_MEAN) / ARCFACE_STD;
            }
        }
    }

    tensor
}

/// Combine the embeddings of a crop and its mirror image.
///
/// `Concat` doubles the dimension; the other modes are element-wise.
pub fn merge_mirror(mode: MirrorMode, original: &[f32], mirrored: &[f32]) -> Vec<f32> {
    match mode {
        MirrorMode::Concat => original.iter().chain(mirrored).copied().collect(),
        MirrorMode::Add => original.iter().zip(mirrored).map(|(a, b)| a + b).collect(),
        MirrorMode::Max => original.iter().zip(mirrored).map(|(a, b)| a.max(*b)).collect(),
        MirrorMode::Min => original.iter().zip(mirrored).map(|(a, b)| a.min(*b)).collect(),
    }
}

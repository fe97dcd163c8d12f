//! ONNX-backed [`FaceEngine`]: SCRFD detection plus ArcFace embeddings.

use crate::detector::{DetectorError, FaceDetector};
use crate::frame::RgbFrame;
use crate::recognizer::{FaceRecognizer, RecognizerError};
use facetool_core::types::cosine_similarity;
use facetool_core::{EngineConfig, EngineError, FaceEngine, ImageBuffer, RawFace};

/// Score returned by `verify` when either image has no face.
pub const NO_FACE_SCORE: f32 = -1.0;

impl From<DetectorError> for EngineError {
    fn from(e: DetectorError) -> Self {
        match e {
            DetectorError::ModelNotFound(path) => EngineError::Fatal(format!("detector model not found: {path}")),
            other => EngineError::Inference(format!("detector: {other}")),
        }
    }
}

impl From<RecognizerError> for EngineError {
    fn from(e: RecognizerError) -> Self {
        match e {
            RecognizerError::ModelNotFound(path) => EngineError::Fatal(format!("recognizer model not found: {path}")),
            other => EngineError::Inference(format!("recognizer: {other}")),
        }
    }
}

/// Map cosine similarity in `[-1, 1]` onto a score in `[0, 1]`.
///
/// Features need not be normalized.
pub fn verify_score(first: &[f32], second: &[f32]) -> f32 {
    0.5 + 0.5 * cosine_similarity(first, second)
}

/// Models loaded by a successful `init`.
struct Loaded {
    config: EngineConfig,
    detector: FaceDetector,
    recognizer: Option<FaceRecognizer>,
}

/// Face engine running SCRFD and ArcFace through ONNX Runtime.
#[derive(Default)]
pub struct OnnxEngine {
    loaded: Option<Loaded>,
}

impl OnnxEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(&self) -> Option<&EngineConfig> {
        self.loaded.as_ref().map(|l| &l.config)
    }

    fn loaded(&mut self) -> Result<&mut Loaded, EngineError> {
        self.loaded
            .as_mut()
            .ok_or_else(|| EngineError::Fatal("models are not loaded".into()))
    }

    fn recognizer(&mut self) -> Result<&mut FaceRecognizer, EngineError> {
        self.loaded()?
            .recognizer
            .as_mut()
            .ok_or(EngineError::Disabled("recognition"))
    }

    /// Warp the face with the given landmarks onto the recognizer's
    /// reference points, returning the 112x112 RGB crop.
    pub fn align(&mut self, image: &ImageBuffer, landmarks: &[(f32, f32); 5]) -> Result<ImageBuffer, EngineError> {
        let recognizer = self.recognizer()?;
        let frame = RgbFrame::from_image(image)?;
        Ok(recognizer.align(&frame, landmarks).into_image())
    }

    /// Like `verify`, but with caller-supplied landmarks instead of running
    /// detection.
    pub fn verify_with_landmarks(
        &mut self,
        first: &ImageBuffer,
        first_landmarks: &[(f32, f32); 5],
        second: &ImageBuffer,
        second_landmarks: &[(f32, f32); 5],
    ) -> Result<f32, EngineError> {
        let recognizer = self.recognizer()?;
        let a = recognizer.extract(&RgbFrame::from_image(first)?, first_landmarks)?;
        let b = recognizer.extract(&RgbFrame::from_image(second)?, second_landmarks)?;
        Ok(verify_score(&a, &b))
    }

    /// Detect, then embed each face in detection order.
    fn embed_faces(&mut self, image: &ImageBuffer, limit: usize) -> Result<Vec<(RawFace, Vec<f32>)>, EngineError> {
        let loaded = self.loaded()?;
        let Some(recognizer) = loaded.recognizer.as_mut() else {
            return Err(EngineError::Disabled("recognition"));
        };

        let frame = RgbFrame::from_image(image)?;
        let faces = loaded.detector.detect(&frame)?;

        let mut embedded = Vec::with_capacity(faces.len().min(limit));
        for face in faces.into_iter().take(limit) {
            let embedding = recognizer.extract(&frame, &face.landmarks)?;
            embedded.push((face, embedding));
        }
        Ok(embedded)
    }
}

impl FaceEngine for OnnxEngine {
    fn init(&mut self, config_path: &str) -> Result<bool, EngineError> {
        let config = match EngineConfig::load(config_path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(config_path, error = %e, "failed to load engine config");
                return Ok(false);
            }
        };

        let detector = match FaceDetector::load(&config.detector, config.intra_threads) {
            Ok(detector) => detector,
            Err(DetectorError::Ort(e)) => return Err(EngineError::Fatal(format!("detector session: {e}"))),
            Err(e) => {
                tracing::error!(error = %e, "failed to load detector");
                return Ok(false);
            }
        };

        let recognizer = if config.options.recognition {
            match FaceRecognizer::load(&config.recognizer, config.intra_threads) {
                Ok(recognizer) => Some(recognizer),
                Err(RecognizerError::Ort(e)) => {
                    return Err(EngineError::Fatal(format!("recognizer session: {e}")))
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to load recognizer");
                    return Ok(false);
                }
            }
        } else {
            None
        };

        tracing::info!(
            detection = config.options.detection,
            recognition = config.options.recognition,
            threads = config.intra_threads,
            "ONNX engine initialized"
        );
        self.loaded = Some(Loaded {
            config,
            detector,
            recognizer,
        });
        Ok(true)
    }

    fn detect(&mut self, image: &ImageBuffer) -> Result<Vec<Vec<f32>>, EngineError> {
        let loaded = self.loaded()?;
        if !loaded.config.options.detection {
            return Err(EngineError::Disabled("detection"));
        }
        let frame = RgbFrame::from_image(image)?;
        let faces = loaded.detector.detect(&frame)?;
        Ok(faces.iter().map(RawFace::to_record).collect())
    }

    fn extract(&mut self, image: &ImageBuffer) -> Result<Vec<Vec<f32>>, EngineError> {
        let embedded = self.embed_faces(image, usize::MAX)?;
        Ok(embedded
            .iter()
            .map(|(face, embedding)| face.to_record_with(embedding))
            .collect())
    }

    fn verify(&mut self, first: &ImageBuffer, second: &ImageBuffer) -> Result<f32, EngineError> {
        let a = self.embed_faces(first, 1)?;
        let b = self.embed_faces(second, 1)?;
        match (a.first(), b.first()) {
            (Some((_, ea)), Some((_, eb))) => Ok(verify_score(ea, eb)),
            _ => {
                tracing::debug!(first = a.len(), second = b.len(), "verify: no face in one of the images");
                Ok(NO_FACE_SCORE)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn image() -> ImageBuffer {
        ImageBuffer::new(vec![0; 8 * 8 * 3], 8, 8)
    }

    #[test]
    fn test_uninitialized_engine_refuses_work() {
        let mut engine = OnnxEngine::new();
        assert!(engine.config().is_none());
        assert!(matches!(engine.detect(&image()), Err(EngineError::Fatal(_))));
        assert!(matches!(engine.extract(&image()), Err(EngineError::Fatal(_))));
        assert!(matches!(engine.verify(&image(), &image()), Err(EngineError::Fatal(_))));
    }

    #[test]
    fn test_init_missing_config_is_soft_failure() {
        let mut engine = OnnxEngine::new();
        assert!(!engine.init("/nonexistent/facetool.json").unwrap());
        assert!(engine.config().is_none());
    }

    #[test]
    fn test_init_invalid_config_is_soft_failure() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{ "options": {{ "detection": false, "recognition": false }} }}"#).unwrap();

        let mut engine = OnnxEngine::new();
        assert!(!engine.init(file.path().to_str().unwrap()).unwrap());
    }

    #[test]
    fn test_init_missing_model_is_soft_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("facetool.json");
        std::fs::write(
            &config_path,
            r#"{ "detector": { "model": "det_10g.onnx" }, "recognizer": { "model": "w600k_r50.onnx" } }"#,
        )
        .unwrap();

        let mut engine = OnnxEngine::new();
        assert!(!engine.init(config_path.to_str().unwrap()).unwrap());
        assert!(engine.config().is_none());
    }

    #[test]
    fn test_verify_score_range() {
        assert!((verify_score(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!((verify_score(&[1.0, 0.0], &[0.0, 1.0]) - 0.5).abs() < 1e-6);
        assert!(verify_score(&[1.0, 0.0], &[-1.0, 0.0]).abs() < 1e-6);
    }

    #[test]
    fn test_verify_score_ignores_magnitude() {
        let raw = verify_score(&[3.0, 4.0, 0.0], &[0.3, 0.4, 1.2]);
        let unit = verify_score(&[0.6, 0.8, 0.0], &[0.1, 0.4 / 3.0, 0.4]);
        assert!((raw - unit).abs() < 1e-6, "{raw} vs {unit}");
    }

    #[test]
    fn test_landmark_operations_need_loaded_models() {
        let mut engine = OnnxEngine::new();
        let points = [(30.0, 40.0), (70.0, 40.0), (50.0, 60.0), (35.0, 80.0), (65.0, 80.0)];
        assert!(matches!(engine.align(&image(), &points), Err(EngineError::Fatal(_))));
        assert!(matches!(
            engine.verify_with_landmarks(&image(), &points, &image(), &points),
            Err(EngineError::Fatal(_))
        ));
    }

    #[test]
    fn test_error_mapping() {
        let e: EngineError = DetectorError::InferenceFailed("bad shape".into()).into();
        assert!(matches!(e, EngineError::Inference(msg) if msg.contains("bad shape")));
        let e: EngineError = RecognizerError::ModelNotFound("w600k_r50.onnx".into()).into();
        assert!(matches!(e, EngineError::Fatal(_)));
        let e: EngineError = RecognizerError::ReferencePoints(4).into();
        assert!(matches!(e, EngineError::Inference(msg) if msg.contains("ref_points")));
    }
}

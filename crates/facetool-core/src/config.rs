//! Engine configuration file.
//!
//! JSON by default, TOML when the file extension is `.toml`. Relative model
//! paths resolve against the directory holding the configuration file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
const DEFAULT_NMS_THRESHOLD: f32 = 0.4;
const DEFAULT_INTRA_THREADS: usize = 2;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Which engine capabilities to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub detection: bool,
    pub recognition: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            detection: true,
            recognition: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// SCRFD ONNX model.
    pub model: PathBuf,
    pub confidence_threshold: f32,
    pub nms_threshold: f32,
    /// Faces narrower or shorter than this many pixels are dropped.
    pub min_face_size: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model: PathBuf::new(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            nms_threshold: DEFAULT_NMS_THRESHOLD,
            min_face_size: 0,
        }
    }
}

/// How the embeddings of a face and its mirror image are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MirrorMode {
    #[default]
    Concat,
    Add,
    Max,
    Min,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub enable: bool,
    pub mode: MirrorMode,
}

/// ArcFace alignment template for a 112x112 crop: left eye, right eye, nose,
/// left and right mouth corners.
pub const ARCFACE_REF_POINTS: [[f32; 2]; 5] = [
    [38.2946, 51.6963],
    [73.5318, 51.5014],
    [56.0252, 71.7366],
    [41.5493, 92.3655],
    [70.7299, 92.2041],
];

/// Linear projection applied to features after the mirror merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PcaConfig {
    pub enable: bool,
    /// JSON file with `mean` and `components`.
    pub model: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    /// ArcFace ONNX model.
    pub model: PathBuf,
    pub mirror: MirrorConfig,
    pub pca: PcaConfig,
    /// Where the five landmarks land in the aligned crop.
    pub ref_points: Vec<[f32; 2]>,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            model: PathBuf::new(),
            mirror: MirrorConfig::default(),
            pca: PcaConfig::default(),
            ref_points: ARCFACE_REF_POINTS.to_vec(),
        }
    }
}

impl RecognizerConfig {
    /// The five alignment reference points, if exactly five are configured.
    pub fn reference_points(&self) -> Option<[(f32, f32); 5]> {
        let points: &[[f32; 2]; 5] = self.ref_points.as_slice().try_into().ok()?;
        Some(points.map(|[x, y]| (x, y)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub options: Options,
    pub detector: DetectorConfig,
    pub recognizer: RecognizerConfig,
    /// ONNX Runtime intra-op threads per session.
    pub intra_threads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            options: Options::default(),
            detector: DetectorConfig::default(),
            recognizer: RecognizerConfig::default(),
            intra_threads: DEFAULT_INTRA_THREADS,
        }
    }
}

impl EngineConfig {
    /// Load, resolve and validate a configuration file.
    ///
    /// `FACETOOL_INTRA_THREADS` overrides `intra_threads` when set.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let mut config: EngineConfig = if is_toml {
            toml::from_str(&text)?
        } else {
            serde_json::from_str(&text)?
        };

        config.intra_threads = env_usize("FACETOOL_INTRA_THREADS", config.intra_threads);
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.validate()?;

        tracing::debug!(
            path = %path.display(),
            detection = config.options.detection,
            recognition = config.options.recognition,
            detector = %config.detector.model.display(),
            recognizer = %config.recognizer.model.display(),
            "loaded engine config"
        );
        Ok(config)
    }

    /// Make relative model paths relative to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        for model in [
            &mut self.detector.model,
            &mut self.recognizer.model,
            &mut self.recognizer.pca.model,
        ] {
            if !model.as_os_str().is_empty() && model.is_relative() {
                *model = base.join(&*model);
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.options.detection && !self.options.recognition {
            return Err(ConfigError::InvalidValue(
                "at least one of options.detection / options.recognition must be enabled".into(),
            ));
        }
        // Recognition aligns on detected landmarks, so the detector is always loaded.
        require_model("detector.model", &self.detector.model)?;
        if self.options.recognition {
            require_model("recognizer.model", &self.recognizer.model)?;
            if self.recognizer.pca.enable {
                require_model("recognizer.pca.model", &self.recognizer.pca.model)?;
            }
            if self.recognizer.reference_points().is_none() {
                return Err(ConfigError::InvalidValue(format!(
                    "recognizer.ref_points must hold 5 points, got {}",
                    self.recognizer.ref_points.len()
                )));
            }
        }
        for (name, value) in [
            ("detector.confidence_threshold", self.detector.confidence_threshold),
            ("detector.nms_threshold", self.detector.nms_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.intra_threads == 0 {
            return Err(ConfigError::InvalidValue("intra_threads must be at least 1".into()));
        }
        Ok(())
    }
}

fn require_model(name: &str, model: &Path) -> Result<(), ConfigError> {
    if model.as_os_str().is_empty() {
        return Err(ConfigError::InvalidValue(format!("{name} is required")));
    }
    Ok(())
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_json_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "config.json",
            r#"{ "detector": { "model": "det_10g.onnx" }, "recognizer": { "model": "w600k_r50.onnx" } }"#,
        );

        let config = EngineConfig::load(&path).unwrap();
        assert!(config.options.detection);
        assert!(config.options.recognition);
        assert_eq!(config.detector.model, dir.path().join("det_10g.onnx"));
        assert_eq!(config.recognizer.model, dir.path().join("w600k_r50.onnx"));
        assert_eq!(config.detector.confidence_threshold, DEFAULT_CONFIDENCE_THRESHOLD);
        assert_eq!(config.detector.nms_threshold, DEFAULT_NMS_THRESHOLD);
        assert_eq!(config.recognizer.mirror, MirrorConfig::default());
    }

    #[test]
    fn test_load_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "engine.toml",
            r#"
intra_threads = 4

[options]
detection = true
recognition = true

[detector]
model = "/models/det.onnx"
confidence_threshold = 0.6
min_face_size = 40

[recognizer]
model = "/models/rec.onnx"
mirror = { enable = true, mode = "max" }
"#,
        );

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.detector.model, PathBuf::from("/models/det.onnx"));
        assert_eq!(config.detector.confidence_threshold, 0.6);
        assert_eq!(config.detector.min_face_size, 40);
        assert!(config.recognizer.mirror.enable);
        assert_eq!(config.recognizer.mirror.mode, MirrorMode::Max);
    }

    #[test]
    fn test_detection_only_needs_no_recognizer() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "config.json",
            r#"{ "options": { "recognition": false }, "detector": { "model": "det.onnx" } }"#,
        );
        let config = EngineConfig::load(&path).unwrap();
        assert!(!config.options.recognition);
        assert!(config.recognizer.model.as_os_str().is_empty());
    }

    #[test]
    fn test_missing_recognizer_model_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "config.json", r#"{ "detector": { "model": "det.onnx" } }"#);
        let err = EngineConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref m) if m.contains("recognizer.model")));
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let mut config = EngineConfig::default();
        config.detector.model = "det.onnx".into();
        config.recognizer.model = "rec.onnx".into();
        assert!(config.validate().is_ok());

        config.detector.nms_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_everything_disabled_rejected() {
        let mut config = EngineConfig::default();
        config.options = Options { detection: false, recognition: false };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_mirror_mode_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "config.json",
            r#"{ "detector": { "model": "d" }, "recognizer": { "model": "r", "mirror": { "enable": true, "mode": "avg" } } }"#,
        );
        assert!(matches!(EngineConfig::load(&path), Err(ConfigError::Json(_))));
    }

    #[test]
    fn test_recognizer_pca_and_ref_points() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "config.json",
            r#"{
                "detector": { "model": "det.onnx" },
                "recognizer": {
                    "model": "rec.onnx",
                    "pca": { "enable": true, "model": "pca.json" },
                    "ref_points": [[30, 50], [80, 50], [55, 70], [35, 90], [75, 90]]
                }
            }"#,
        );
        let config = EngineConfig::load(&path).unwrap();
        assert!(config.recognizer.pca.enable);
        assert_eq!(config.recognizer.pca.model, dir.path().join("pca.json"));
        let points = config.recognizer.reference_points().unwrap();
        assert_eq!(points[0], (30.0, 50.0));
        assert_eq!(points[4], (75.0, 90.0));
    }

    #[test]
    fn test_default_ref_points_are_arcface() {
        let recognizer = RecognizerConfig::default();
        assert!(!recognizer.pca.enable);
        let points = recognizer.reference_points().unwrap();
        assert_eq!(points[2], (56.0252, 71.7366));
    }

    #[test]
    fn test_wrong_ref_point_count_rejected() {
        let mut config = EngineConfig::default();
        config.detector.model = "det.onnx".into();
        config.recognizer.model = "rec.onnx".into();
        config.recognizer.ref_points.pop();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref m) if m.contains("ref_points")));
    }

    #[test]
    fn test_enabled_pca_requires_model() {
        let mut config = EngineConfig::default();
        config.detector.model = "det.onnx".into();
        config.recognizer.model = "rec.onnx".into();
        config.recognizer.pca.enable = true;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref m) if m.contains("pca.model")));
    }

    #[test]
    fn test_missing_file() {
        let err = EngineConfig::load("/nonexistent/config.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_env_usize_fallback() {
        assert_eq!(env_usize("FACETOOL_TEST_UNSET_VARIABLE", 7), 7);
    }
}

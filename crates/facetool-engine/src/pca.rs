//! PCA projection of face features.
//!
//! The model file is JSON: `{ "mean": [d floats], "components": [[d floats]; k] }`.
//! Projection is `(x - mean) · componentsᵀ`, giving a k-dimensional feature.

use ndarray::{Array1, Array2, ArrayView1};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PcaError {
    #[error("failed to read PCA model {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid PCA model: {0}")]
    Json(#[from] serde_json::Error),
    #[error("PCA model shape: {0}")]
    Shape(String),
    #[error("feature has {actual} dims, PCA expects {expected}")]
    Dimension { expected: usize, actual: usize },
}

#[derive(Deserialize)]
struct PcaFile {
    mean: Vec<f32>,
    components: Vec<Vec<f32>>,
}

#[derive(Debug, Clone)]
pub struct PcaProjection {
    mean: Array1<f32>,
    /// One principal component per row.
    components: Array2<f32>,
}

impl PcaProjection {
    pub fn load(path: &Path) -> Result<Self, PcaError> {
        let text = std::fs::read_to_string(path).map_err(|source| PcaError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let file: PcaFile = serde_json::from_str(&text)?;
        let pca = Self::new(file.mean, file.components)?;
        tracing::info!(
            path = %path.display(),
            input_dim = pca.input_dim(),
            output_dim = pca.output_dim(),
            "loaded PCA model"
        );
        Ok(pca)
    }

    pub fn new(mean: Vec<f32>, components: Vec<Vec<f32>>) -> Result<Self, PcaError> {
        let dim = mean.len();
        if dim == 0 || components.is_empty() {
            return Err(PcaError::Shape("mean and components must be non-empty".into()));
        }
        if let Some(row) = components.iter().position(|c| c.len() != dim) {
            return Err(PcaError::Shape(format!(
                "component {row} has {} dims, mean has {dim}",
                components[row].len()
            )));
        }
        let rows = components.len();
        let flat: Vec<f32> = components.into_iter().flatten().collect();
        let components = Array2::from_shape_vec((rows, dim), flat).map_err(|e| PcaError::Shape(e.to_string()))?;
        Ok(Self {
            mean: Array1::from(mean),
            components,
        })
    }

    pub fn input_dim(&self) -> usize {
        self.mean.len()
    }

    pub fn output_dim(&self) -> usize {
        self.components.nrows()
    }

    pub fn project(&self, feature: &[f32]) -> Result<Vec<f32>, PcaError> {
        if feature.len() != self.input_dim() {
            return Err(PcaError::Dimension {
                expected: self.input_dim(),
                actual: feature.len(),
            });
        }
        let centered = &ArrayView1::from(feature) - &self.mean;
        Ok(self.components.dot(&centered).to_vec())
    }
}

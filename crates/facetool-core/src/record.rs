//! Flat face record layout and decoding.
//!
//! The engine reports each face as one flat `f32` record:
//!
//! ```text
//! [0..4)   bounding box   x1, y1, x2, y2
//! [4]      score
//! [5..15)  landmarks      (x, y) x 5: left eye, right eye, nose, left mouth, right mouth
//! [15..)   embedding      extract only, engine-defined length
//! ```
//!
//! Decoding is a pure function of the record: no clamping and no check
//! against the source image.

use crate::types::{BoundingBox, Detection, FeatureVector, Landmarks, Point};
use std::ops::Range;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("malformed face record: expected at least {expected} floats, got {actual}")]
    Malformed { expected: usize, actual: usize },
    #[error("face record {index}: {source}")]
    MalformedAt {
        index: usize,
        #[source]
        source: Box<RecordError>,
    },
}

/// Offsets of the fixed face record schema.
pub struct RecordLayout;

impl RecordLayout {
    pub const BBOX: Range<usize> = 0..4;
    pub const SCORE: usize = 4;
    pub const LANDMARKS: Range<usize> = 5..15;
    /// Length of a detection record; also the embedding offset in feature records.
    pub const BASE_LEN: usize = 15;
    pub const EMBEDDING_START: usize = Self::BASE_LEN;
    pub const LANDMARK_COUNT: usize = 5;

    /// Check a record is long enough to decode and return its base part.
    fn base(record: &[f32]) -> Result<&[f32; Self::BASE_LEN], RecordError> {
        record
            .get(..Self::BASE_LEN)
            .and_then(|base| base.try_into().ok())
            .ok_or(RecordError::Malformed {
                expected: Self::BASE_LEN,
                actual: record.len(),
            })
    }
}

/// Decode one detection from the first 15 floats of `record`.
///
/// Floats past the base layout are ignored.
pub fn decode_detection(record: &[f32]) -> Result<Detection, RecordError> {
    let base = RecordLayout::base(record)?;
    Ok(decode_base(base))
}

/// Decode a detection plus its trailing embedding.
pub fn decode_feature(record: &[f32]) -> Result<FeatureVector, RecordError> {
    let base = RecordLayout::base(record)?;
    Ok(FeatureVector {
        detection: decode_base(base),
        embedding: record[RecordLayout::EMBEDDING_START..].to_vec(),
    })
}

/// Decode a batch of detection records, preserving engine order.
pub fn decode_detections(records: &[Vec<f32>]) -> Result<Vec<Detection>, RecordError> {
    records
        .iter()
        .enumerate()
        .map(|(index, r)| decode_detection(r).map_err(|e| e.at(index)))
        .collect()
}

/// Decode a batch of feature records, preserving engine order.
pub fn decode_features(records: &[Vec<f32>]) -> Result<Vec<FeatureVector>, RecordError> {
    records
        .iter()
        .enumerate()
        .map(|(index, r)| decode_feature(r).map_err(|e| e.at(index)))
        .collect()
}

impl RecordError {
    fn at(self, index: usize) -> Self {
        RecordError::MalformedAt {
            index,
            source: Box::new(self),
        }
    }
}

fn decode_base(base: &[f32; RecordLayout::BASE_LEN]) -> Detection {
    let bbox = &base[RecordLayout::BBOX];
    let lm = &base[RecordLayout::LANDMARKS];
    let point = |i: usize| Point::from_floats(lm[i * 2], lm[i * 2 + 1]);

    Detection {
        bounding_box: BoundingBox {
            top_left: Point::from_floats(bbox[0], bbox[1]),
            bottom_right: Point::from_floats(bbox[2], bbox[3]),
        },
        score: base[RecordLayout::SCORE],
        landmarks: Landmarks {
            left_eye: point(0),
            right_eye: point(1),
            nose: point(2),
            left_mouth: point(3),
            right_mouth: point(4),
        },
    }
}

/// Unrounded face geometry as produced by a detector, before it is
/// flattened into a record.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFace {
    /// `[x1, y1, x2, y2]` in source image pixels.
    pub bbox: [f32; 4],
    pub score: f32,
    /// Five-point landmarks in record order.
    pub landmarks: [(f32, f32); 5],
}

impl RawFace {
    /// Flatten into a 15-float detection record.
    pub fn to_record(&self) -> Vec<f32> {
        self.to_record_with(&[])
    }

    /// Flatten into a feature record: 15 base floats followed by `embedding`.
    pub fn to_record_with(&self, embedding: &[f32]) -> Vec<f32> {
        let mut record = Vec::with_capacity(RecordLayout::BASE_LEN + embedding.len());
        record.extend_from_slice(&self.bbox);
        record.push(self.score);
        for &(x, y) in &self.landmarks {
            record.push(x);
            record.push(y);
        }
        record.extend_from_slice(embedding);
        record
    }

    pub fn width(&self) -> f32 {
        self.bbox[2] - self.bbox[0]
    }

    pub fn height(&self) -> f32 {
        self.bbox[3] - self.bbox[1]
    }
}

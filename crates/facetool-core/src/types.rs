use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// Integer pixel coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Round a float coordinate pair to the nearest pixel.
    ///
    /// Ties round away from zero (`2.5 -> 3`, `-2.5 -> -3`). Values outside
    /// the `i32` range saturate and NaN maps to 0.
    pub fn from_floats(x: f32, y: f32) -> Self {
        Self {
            x: round_coord(x),
            y: round_coord(y),
        }
    }
}

fn round_coord(v: f32) -> i32 {
    // `as` saturates on overflow and maps NaN to 0.
    v.round() as i32
}

/// Face bounding box given by two corners.
///
/// The decoder does not reorder corners: `top_left` is whatever the engine
/// wrote at `[x1, y1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub top_left: Point,
    pub bottom_right: Point,
}

impl BoundingBox {
    /// Signed horizontal extent (`x2 - x1`).
    pub fn width(&self) -> i32 {
        self.bottom_right.x.saturating_sub(self.top_left.x)
    }

    /// Signed vertical extent (`y2 - y1`).
    pub fn height(&self) -> i32 {
        self.bottom_right.y.saturating_sub(self.top_left.y)
    }
}

/// Five-point facial landmarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Landmarks {
    pub left_eye: Point,
    pub right_eye: Point,
    pub nose: Point,
    pub left_mouth: Point,
    pub right_mouth: Point,
}

impl Landmarks {
    /// Landmarks in record order: left eye, right eye, nose, left mouth, right mouth.
    pub fn as_array(&self) -> [Point; 5] {
        [
            self.left_eye,
            self.right_eye,
            self.nose,
            self.left_mouth,
            self.right_mouth,
        ]
    }
}

/// One located face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bounding_box: BoundingBox,
    pub score: f32,
    pub landmarks: Landmarks,
}

/// A detection plus the engine's embedding for that face.
///
/// The embedding length is engine-defined (512 for ArcFace) and may be zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    #[serde(flatten)]
    pub detection: Detection,
    pub embedding: Vec<f32>,
}

impl FeatureVector {
    /// Cosine similarity between two embeddings, in [-1, 1].
    ///
    /// Always processes every dimension; returns 0.0 when either vector has
    /// zero norm. Dimensions beyond the shorter embedding are ignored.
    pub fn similarity(&self, other: &FeatureVector) -> f32 {
        cosine_similarity(&self.embedding, &other.embedding)
    }
}

impl Deref for FeatureVector {
    type Target = Detection;

    fn deref(&self) -> &Detection {
        &self.detection
    }
}

/// Cosine similarity between two float slices.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom > 0.0 { dot / denom } else { 0.0 }
}

//! SCRFD face detector via ONNX Runtime.
//!
//! Implements the SCRFD (Sample and Computation Redistribution for Efficient Face
//! Detection) model with 3-stride anchor-free decoding and NMS post-processing.

use crate::frame::RgbFrame;
use facetool_core::config::DetectorConfig;
use facetool_core::RawFace;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Named constants (no magic numbers) ---
const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Metadata for coordinate de-mapping after letterbox resize.
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl LetterboxInfo {
    /// Map a point from letterboxed input space back to source pixels.
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Output tensor indices for one stride: (score_idx, bbox_idx, kps_idx).
type StrideOutputIndices = (usize, usize, usize);

/// Post-processing thresholds taken from the engine config.
#[derive(Debug, Clone, Copy)]
struct Thresholds {
    confidence: f32,
    nms: f32,
    min_face_size: f32,
}

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    input_height: usize,
    input_width: usize,
    /// Per-stride output indices [(score, bbox, kps)] for strides [8, 16, 32].
    /// Discovered by name at load time; falls back to positional ordering.
    stride_indices: [StrideOutputIndices; 3],
    thresholds: Thresholds,
}

impl FaceDetector {
    /// Load the SCRFD ONNX model named in `config`.
    pub fn load(config: &DetectorConfig, intra_threads: usize) -> Result<Self, DetectorError> {
        let model_path = config.model.to_string_lossy();
        if !Path::new(&config.model).exists() {
            return Err(DetectorError::ModelNotFound(model_path.into_owned()));
        }

        let session = Session::builder()?
            .with_intra_threads(intra_threads)?
            .commit_from_file(&config.model)?;

        let output_names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        let num_outputs = output_names.len();

        tracing::info!(
            path = %model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        if num_outputs < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires 9 outputs (3 strides × score/bbox/kps), got {num_outputs}"
            )));
        }

        let stride_indices = discover_output_indices(&output_names);
        tracing::debug!(?stride_indices, "SCRFD output tensor mapping");

        Ok(Self {
            session,
            input_height: SCRFD_INPUT_SIZE,
            input_width: SCRFD_INPUT_SIZE,
            stride_indices,
            thresholds: Thresholds {
                confidence: config.confidence_threshold,
                nms: config.nms_threshold,
                min_face_size: config.min_face_size as f32,
            },
        })
    }

    /// Detect faces in an RGB frame, sorted by confidence (highest first).
    pub fn detect(&mut self, frame: &RgbFrame) -> Result<Vec<RawFace>, DetectorError> {
        if frame.width == 0 || frame.height == 0 {
            return Ok(Vec::new());
        }
        let (input, letterbox) = self.preprocess(frame);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut all_detections = Vec::new();

        for (stride_pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx, kps_idx) = self.stride_indices[stride_pos];

            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}")))?;
            let (_, kps) = outputs[kps_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("kps stride {stride}: {e}")))?;

            let grid = StrideGrid {
                stride,
                grid_w: self.input_width / stride,
                grid_h: self.input_height / stride,
            };
            all_detections.extend(decode_stride(scores, bboxes, kps, &grid, &letterbox, self.thresholds.confidence));
        }

        let candidates = all_detections.len();
        let result = filter_small(nms(all_detections, self.thresholds.nms), self.thresholds.min_face_size);
        tracing::debug!(candidates, kept = result.len(), "SCRFD detections");

        Ok(result)
    }

    /// Letterbox an RGB frame into a NCHW float tensor.
    ///
    /// Resizes each channel with bilinear interpolation, then normalizes to
    /// the SCRFD input distribution.
    fn preprocess(&self, frame: &RgbFrame) -> (Array4<f32>, LetterboxInfo) {
        let width = frame.width as usize;
        let height = frame.height as usize;

        let scale_w = self.input_width as f32 / width as f32;
        let scale_h = self.input_height as f32 / height as f32;
        let scale = scale_w.min(scale_h);

        let new_w = ((width as f32 * scale).round() as usize).clamp(1, self.input_width);
        let new_h = ((height as f32 * scale).round() as usize).clamp(1, self.input_height);
        let pad_x = (self.input_width - new_w) as f32 / 2.0;
        let pad_y = (self.input_height - new_h) as f32 / 2.0;

        let letterbox = LetterboxInfo { scale, pad_x, pad_y };

        let pad_x_start = pad_x.floor() as usize;
        let pad_y_start = pad_y.floor() as usize;

        // Padding uses SCRFD_MEAN, which normalizes to 0.0.
        let mut tensor = Array4::<f32>::zeros((1, 3, self.input_height, self.input_width));

        let inv_scale = 1.0 / scale;
        for y in 0..new_h {
            let src_y = (y as f32 + 0.5) * inv_scale - 0.5;
            let y0 = (src_y.floor() as i32).clamp(0, height as i32 - 1) as usize;
            let y1 = (y0 + 1).min(height - 1);
            let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

            for x in 0..new_w {
                let src_x = (x as f32 + 0.5) * inv_scale - 0.5;
                let x0 = (src_x.floor() as i32).clamp(0, width as i32 - 1) as usize;
                let x1 = (x0 + 1).min(width - 1);
                let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

                for c in 0..3 {
                    let px = |xx: usize, yy: usize| frame.data[(yy * width + xx) * 3 + c] as f32;
                    let val = px(x0, y0) * (1.0 - fx) * (1.0 - fy)
                        + px(x1, y0) * fx * (1.0 - fy)
                        + px(x0, y1) * (1.0 - fx) * fy
                        + px(x1, y1) * fx * fy;
                    let pixel = val.round().clamp(0.0, 255.0);
                    tensor[[0, c, y + pad_y_start, x + pad_x_start]] = (pixel - SCRFD_MEAN) / SCRFD_STD;
                }
            }
        }

        (tensor, letterbox)
    }
}

/// Discover output tensor ordering by name.
///
/// SCRFD models may export tensors with named outputs ("score_8", "bbox_16", ...) or
/// generic numeric names. If the named pattern is present, maps them to stride slots.
/// Otherwise falls back to the standard positional ordering:
///   [0-2] = scores (strides 8, 16, 32)
///   [3-5] = bboxes (strides 8, 16, 32)
///   [6-8] = kps    (strides 8, 16, 32)
fn discover_output_indices(names: &[String]) -> [StrideOutputIndices; 3] {
    let find = |prefix: &str, stride: usize| -> Option<usize> {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| n == &target)
    };

    let named: Option<Vec<StrideOutputIndices>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| Some((find("score", stride)?, find("bbox", stride)?, find("kps", stride)?)))
        .collect();

    match named {
        Some(indices) => {
            tracing::info!("SCRFD: using name-based output tensor mapping");
            [indices[0], indices[1], indices[2]]
        }
        None => {
            tracing::info!(
                ?names,
                "SCRFD: output names not recognized, using positional mapping [0-2]=scores, [3-5]=bboxes, [6-8]=kps"
            );
            [(0, 3, 6), (1, 4, 7), (2, 5, 8)]
        }
    }
}

/// Anchor grid geometry for one stride level.
struct StrideGrid {
    stride: usize,
    grid_w: usize,
    grid_h: usize,
}

/// Decode detections for a single stride level into source-image coordinates.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    kps: &[f32],
    grid: &StrideGrid,
    letterbox: &LetterboxInfo,
    threshold: f32,
) -> Vec<RawFace> {
    let num_anchors = grid.grid_h * grid.grid_w * SCRFD_ANCHORS_PER_CELL;
    let stride = grid.stride as f32;

    let mut detections = Vec::new();

    for idx in 0..num_anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= threshold {
            continue;
        }

        let anchor_idx = idx / SCRFD_ANCHORS_PER_CELL;
        let anchor_cx = (anchor_idx % grid.grid_w) as f32 * stride;
        let anchor_cy = (anchor_idx / grid.grid_w) as f32 * stride;

        // Distances [left, top, right, bottom] from the anchor, in stride units
        let Some(d) = bboxes.get(idx * 4..idx * 4 + 4) else {
            continue;
        };
        let (x1, y1) = letterbox.unmap(anchor_cx - d[0] * stride, anchor_cy - d[1] * stride);
        let (x2, y2) = letterbox.unmap(anchor_cx + d[2] * stride, anchor_cy + d[3] * stride);

        // Records always carry landmarks; a model without them is unusable here.
        let Some(k) = kps.get(idx * 10..idx * 10 + 10) else {
            continue;
        };
        let landmarks: [(f32, f32); 5] = std::array::from_fn(|i| {
            letterbox.unmap(anchor_cx + k[i * 2] * stride, anchor_cy + k[i * 2 + 1] * stride)
        });

        detections.push(RawFace {
            bbox: [x1, y1, x2, y2],
            score,
            landmarks,
        });
    }

    detections
}

/// Drop faces smaller than `min_size` pixels on either side.
fn filter_small(faces: Vec<RawFace>, min_size: f32) -> Vec<RawFace> {
    if min_size <= 0.0 {
        return faces;
    }
    faces
        .into_iter()
        .filter(|f| f.width() >= min_size && f.height() >= min_size)
        .collect()
}

/// Non-Maximum Suppression: keep the strongest of each overlapping group.
///
/// Output is sorted by confidence, highest first.
fn nms(mut detections: Vec<RawFace>, iou_threshold: f32) -> Vec<RawFace> {
    detections.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut keep: Vec<RawFace> = Vec::new();
    let mut suppressed = vec![false; detections.len()];

    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        for j in (i + 1)..detections.len() {
            if !suppressed[j] && iou(&detections[i], &detections[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
        keep.push(detections[i].clone());
    }

    keep
}

/// Compute Intersection-over-Union between two boxes.
fn iou(a: &RawFace, b: &RawFace) -> f32 {
    let x1 = a.bbox[0].max(b.bbox[0]);
    let y1 = a.bbox[1].max(b.bbox[1]);
    let x2 = a.bbox[2].min(b.bbox[2]);
    let y2 = a.bbox[3].min(b.bbox[3]);

    let inter_area = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union_area = a.width() * a.height() + b.width() * b.height() - inter_area;

    if union_area > 0.0 {
        inter_area / union_area
    } else {
        0.0
    }
}

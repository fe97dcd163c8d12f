use facetool_core::{
    BindingError, BoundingBox, EngineError, EngineState, FaceEngine, FaceTool, ImageBuffer,
    Landmarks, Point, RecordError,
};
use std::collections::VecDeque;

const FACE: [f32; 15] = [
    10.0, 20.0, 110.0, 220.0, 0.98, 30.0, 40.0, 80.0, 40.0, 55.0, 60.0, 35.0, 90.0, 75.0, 90.0,
];

/// Scripted engine: replays queued responses and counts calls.
#[derive(Default)]
struct MockEngine {
    init_results: VecDeque<Result<bool, EngineError>>,
    records: Vec<Vec<f32>>,
    similarity: f32,
    init_calls: usize,
    detect_calls: usize,
}

impl MockEngine {
    fn ready_with(records: Vec<Vec<f32>>) -> Self {
        Self {
            init_results: VecDeque::from([Ok(true)]),
            records,
            similarity: 0.87,
            ..Default::default()
        }
    }
}

impl FaceEngine for MockEngine {
    fn init(&mut self, _config_path: &str) -> Result<bool, EngineError> {
        self.init_calls += 1;
        self.init_results.pop_front().unwrap_or(Ok(false))
    }

    fn detect(&mut self, _image: &ImageBuffer) -> Result<Vec<Vec<f32>>, EngineError> {
        self.detect_calls += 1;
        Ok(self.records.iter().map(|r| r[..r.len().min(15)].to_vec()).collect())
    }

    fn extract(&mut self, _image: &ImageBuffer) -> Result<Vec<Vec<f32>>, EngineError> {
        Ok(self.records.clone())
    }

    fn verify(&mut self, _first: &ImageBuffer, _second: &ImageBuffer) -> Result<f32, EngineError> {
        Ok(self.similarity)
    }
}

fn image() -> ImageBuffer {
    ImageBuffer::new(vec![0; 4 * 4 * 3], 4, 4)
}

fn ready_tool(records: Vec<Vec<f32>>) -> FaceTool<MockEngine> {
    let mut tool = FaceTool::new(MockEngine::ready_with(records));
    assert!(tool.init("config.json").unwrap());
    tool
}

#[test]
fn test_calls_before_init_are_rejected() {
    let mut tool = FaceTool::new(MockEngine::ready_with(vec![FACE.to_vec()]));
    assert_eq!(tool.state(), EngineState::Uninitialized);

    let img = image();
    assert!(matches!(
        tool.detect(&img),
        Err(BindingError::NotInitialized(EngineState::Uninitialized))
    ));
    assert!(matches!(tool.extract(&img), Err(BindingError::NotInitialized(_))));
    assert!(matches!(tool.verify(&img, &img), Err(BindingError::NotInitialized(_))));
    assert_eq!(tool.engine().detect_calls, 0);
}

#[test]
fn test_detect_decodes_records() {
    let mut tool = ready_tool(vec![FACE.to_vec()]);
    let detections = tool.detect(&image()).unwrap();

    assert_eq!(detections.len(), 1);
    let det = &detections[0];
    assert_eq!(
        det.bounding_box,
        BoundingBox { top_left: Point::new(10, 20), bottom_right: Point::new(110, 220) }
    );
    assert_eq!(det.score, 0.98);
    assert_eq!(
        det.landmarks,
        Landmarks {
            left_eye: Point::new(30, 40),
            right_eye: Point::new(80, 40),
            nose: Point::new(55, 60),
            left_mouth: Point::new(35, 90),
            right_mouth: Point::new(75, 90),
        }
    );
}

#[test]
fn test_extract_decodes_embeddings() {
    let mut record = FACE.to_vec();
    record.extend([0.1, 0.2, 0.3]);
    let mut tool = ready_tool(vec![record]);

    let detection = tool.detect(&image()).unwrap().remove(0);
    let features = tool.extract(&image()).unwrap();
    assert_eq!(features.len(), 1);
    assert_eq!(features[0].detection, detection);
    assert_eq!(features[0].embedding, vec![0.1, 0.2, 0.3]);
}

#[test]
fn test_extract_with_no_faces_is_empty() {
    let mut tool = ready_tool(Vec::new());
    assert!(tool.extract(&image()).unwrap().is_empty());
    assert!(tool.detect(&image()).unwrap().is_empty());
}

#[test]
fn test_engine_order_is_preserved() {
    let scores = [0.3, 0.9, 0.6];
    let records = scores
        .iter()
        .map(|&s| {
            let mut r = FACE.to_vec();
            r[4] = s;
            r
        })
        .collect();
    let mut tool = ready_tool(records);

    let got: Vec<f32> = tool.detect(&image()).unwrap().iter().map(|d| d.score).collect();
    assert_eq!(got, scores.to_vec());
}

#[test]
fn test_malformed_record_fails_loudly() {
    let mut tool = ready_tool(vec![FACE.to_vec(), FACE[..9].to_vec()]);
    let err = tool.extract(&image()).unwrap_err();
    match err {
        BindingError::Record(RecordError::MalformedAt { index, .. }) => assert_eq!(index, 1),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_verify_passes_score_through() {
    let mut tool = ready_tool(Vec::new());
    assert_eq!(tool.verify(&image(), &image()).unwrap(), 0.87);
}

#[test]
fn test_failed_init_can_be_retried() {
    let engine = MockEngine {
        init_results: VecDeque::from([Ok(false), Ok(true)]),
        ..Default::default()
    };
    let mut tool = FaceTool::new(engine);

    assert!(!tool.init("bad.json").unwrap());
    assert_eq!(tool.state(), EngineState::Failed);
    assert!(matches!(
        tool.detect(&image()),
        Err(BindingError::NotInitialized(EngineState::Failed))
    ));

    assert!(tool.init("good.json").unwrap());
    assert_eq!(tool.state(), EngineState::Ready);
}

#[test]
fn test_fatal_init_error_propagates() {
    let engine = MockEngine {
        init_results: VecDeque::from([Err(EngineError::Fatal("no runtime".into()))]),
        ..Default::default()
    };
    let mut tool = FaceTool::new(engine);

    let err = tool.init("config.json").unwrap_err();
    assert!(matches!(err, BindingError::Engine(EngineError::Fatal(_))));
    assert_eq!(tool.state(), EngineState::Failed);
}

#[test]
fn test_init_runs_once_when_ready() {
    let mut tool = ready_tool(Vec::new());
    assert!(tool.init("other.json").unwrap());
    assert_eq!(tool.engine().init_calls, 1);
    assert!(tool.is_ready());
}

#[test]
fn test_boxed_engine_is_an_engine() {
    let engine: Box<dyn FaceEngine> = Box::new(MockEngine::ready_with(vec![FACE.to_vec()]));
    let mut tool = FaceTool::new(engine);
    assert!(tool.init("config.json").unwrap());
    assert_eq!(tool.detect(&image()).unwrap().len(), 1);
}

#[test]
fn test_raw_records_pass_through_unrounded() {
    let mut record = FACE.to_vec();
    record[0] = 10.4;
    let mut tool = ready_tool(vec![record.clone()]);
    assert_eq!(tool.detect_records(&image()).unwrap(), vec![record.clone()]);
    assert_eq!(tool.extract_records(&image()).unwrap(), vec![record]);
}

#[test]
fn test_raw_records_are_still_checked() {
    let mut tool = ready_tool(vec![FACE[..4].to_vec()]);
    assert!(matches!(tool.detect_records(&image()), Err(BindingError::Record(_))));

    let mut fresh = FaceTool::new(MockEngine::ready_with(Vec::new()));
    assert!(matches!(fresh.extract_records(&image()), Err(BindingError::NotInitialized(_))));
}

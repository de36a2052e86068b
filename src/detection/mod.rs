//! Detection module - collaborator seams for the model and camera, and the
//! per-frame count reduction

mod trace;

pub use trace::{TraceModel, TraceModelLoader, TraceSource};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::FrameError;

/// Detections below this confidence are not counted
pub const CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Bounding region in pixel coordinates. Carried for renderers; never read by
/// the counting path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left
    pub x1: f32,
    /// Top
    pub y1: f32,
    /// Right
    pub x2: f32,
    /// Bottom
    pub y2: f32,
}

/// One detected object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Class label as emitted by the model
    pub label: String,
    /// Score in `0.0..=1.0`
    pub confidence: f32,
    /// Region in the frame
    #[serde(default)]
    pub bbox: BoundingBox,
}

impl Detection {
    /// Detection with an empty bounding box
    pub fn new(label: &str, confidence: f32) -> Self {
        Self {
            label: label.to_string(),
            confidence,
            bbox: BoundingBox::default(),
        }
    }
}

/// A captured frame. The pixel payload is opaque to the core.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// Position in the stream
    pub index: u64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Raw pixel bytes
    pub data: Vec<u8>,
}

/// Object detection model.
pub trait Detector: Send {
    /// Model identifier
    fn name(&self) -> &str;

    /// Class labels the model can emit
    fn labels(&self) -> &[String];

    /// Run detection on a frame. Blocking.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

/// Loads a [`Detector`] from a model path
pub trait ModelLoader: Send + Sync {
    /// Load the model at `path`
    fn load(&self, path: &Path) -> Result<Box<dyn Detector>>;
}

/// Pull-based, blocking frame source.
pub trait FrameSource: Send {
    /// Block until the next frame is available
    fn next_frame(&mut self) -> Result<Frame, FrameError>;

    /// Release the capture device. Called once when a run ends.
    fn release(&mut self) {}
}

/// Opens a fresh [`FrameSource`] for each detection run
pub trait SourceFactory: Send + Sync {
    /// Open a source, failing if no capture is available
    fn open(&self) -> Result<Box<dyn FrameSource>, FrameError>;
}

impl<F> SourceFactory for F
where
    F: Fn() -> Result<Box<dyn FrameSource>, FrameError> + Send + Sync,
{
    fn open(&self) -> Result<Box<dyn FrameSource>, FrameError> {
        self()
    }
}

/// Per-frame count of confident detections by label
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionCount {
    counts: HashMap<String, u32>,
}

impl DetectionCount {
    /// Count detections at or above [`CONFIDENCE_THRESHOLD`]
    pub fn from_detections(detections: &[Detection]) -> Self {
        let mut counts = HashMap::new();
        for detection in detections {
            if detection.confidence < CONFIDENCE_THRESHOLD {
                continue;
            }
            *counts.entry(detection.label.clone()).or_insert(0) += 1;
        }
        Self { counts }
    }

    /// Count for `label`, 0 when absent
    pub fn get(&self, label: &str) -> u32 {
        self.counts.get(label).copied().unwrap_or(0)
    }

    /// Sum over every label
    pub fn total(&self) -> u32 {
        self.counts.values().sum()
    }

    /// Labels with their counts, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.counts.iter().map(|(label, count)| (label.as_str(), *count))
    }
}

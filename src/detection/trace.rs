// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Recorded detection traces
//!
//! A trace file is JSON lines, one line per frame, each line a list of
//! detections. [`TraceSource`] yields each line as a frame payload and
//! [`TraceModel`] decodes it back, so a recorded session replays through the
//! same pipeline as a live camera and model.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use super::{Detection, Detector, Frame, FrameSource, ModelLoader};
use crate::error::FrameError;

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    name: Option<String>,
    labels: Vec<String>,
}

/// Model that decodes detections recorded in the frame payload
pub struct TraceModel {
    name: String,
    labels: Vec<String>,
}

impl TraceModel {
    /// Model advertising `labels` under `name`
    pub fn new(name: &str, labels: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
        }
    }

    /// Load a manifest: `{"name": "...", "labels": ["person", ...]}`
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read model manifest {}", path.display()))?;
        let manifest: Manifest = serde_json::from_str(&raw)
            .with_context(|| format!("invalid model manifest {}", path.display()))?;
        let name = manifest.name.unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "trace".to_string())
        });
        info!("Loaded trace model {} with {} labels", name, manifest.labels.len());
        Ok(Self {
            name,
            labels: manifest.labels,
        })
    }
}

impl Detector for TraceModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let detections: Vec<Detection> = serde_json::from_slice(&frame.data)
            .with_context(|| format!("frame {} is not a detection list", frame.index))?;
        Ok(detections)
    }
}

/// Loads [`TraceModel`] manifests
#[derive(Debug, Default, Clone, Copy)]
pub struct TraceModelLoader;

impl ModelLoader for TraceModelLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn Detector>> {
        Ok(Box::new(TraceModel::load(path)?))
    }
}

/// Frame source replaying a JSON-lines trace
pub struct TraceSource {
    reader: Option<Box<dyn BufRead + Send>>,
    index: u64,
    interval: Duration,
}

impl TraceSource {
    /// Replay a JSON-lines trace file
    pub fn open(path: &Path) -> Result<Self, FrameError> {
        let file = File::open(path).map_err(|e| {
            FrameError::Acquisition(format!("cannot open {}: {}", path.display(), e))
        })?;
        info!("Replaying frames from {:?}", path);
        Ok(Self::from_reader(Box::new(BufReader::new(file))))
    }

    /// Replay JSON lines from any reader
    pub fn from_reader(reader: Box<dyn BufRead + Send>) -> Self {
        Self {
            reader: Some(reader),
            index: 0,
            interval: Duration::ZERO,
        }
    }

    /// In-memory trace, one entry per frame
    pub fn from_frames(frames: &[Vec<Detection>]) -> Self {
        let mut buf = Vec::new();
        for frame in frames {
            if let Ok(line) = serde_json::to_vec(frame) {
                buf.extend_from_slice(&line);
            }
            buf.push(b'\n');
        }
        Self::from_reader(Box::new(Cursor::new(buf)))
    }

    /// Pace frames like a camera would
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

impl FrameSource for TraceSource {
    fn next_frame(&mut self) -> Result<Frame, FrameError> {
        let reader = self.reader.as_mut().ok_or(FrameError::EndOfStream)?;
        let mut line = String::new();
        loop {
            line.clear();
            let read = reader
                .read_line(&mut line)
                .map_err(|e| FrameError::Acquisition(e.to_string()))?;
            if read == 0 {
                return Err(FrameError::EndOfStream);
            }
            if !line.trim().is_empty() {
                break;
            }
        }

        if !self.interval.is_zero() {
            std::thread::sleep(self.interval);
        }

        self.index += 1;
        Ok(Frame {
            index: self.index,
            width: 0,
            height: 0,
            data: line.trim_end().as_bytes().to_vec(),
        })
    }

    fn release(&mut self) {
        if self.reader.take().is_some() {
            debug!("Released trace after {} frames", self.index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_replay_round_trip() {
        let frames = vec![
            vec![Detection::new("person", 0.9)],
            vec![],
            vec![Detection::new("dog", 0.6), Detection::new("dog", 0.3)],
        ];
        let mut source = TraceSource::from_frames(&frames);
        let mut model = TraceModel::new("trace", &["person", "dog"]);

        for expected in &frames {
            let frame = source.next_frame().unwrap();
            assert_eq!(&model.detect(&frame).unwrap(), expected);
        }
        assert!(matches!(source.next_frame(), Err(FrameError::EndOfStream)));
    }

    #[test]
    fn test_release_ends_stream() {
        let mut source = TraceSource::from_frames(&[vec![], vec![]]);
        source.next_frame().unwrap();
        source.release();
        assert!(matches!(source.next_frame(), Err(FrameError::EndOfStream)));
    }

    #[test]
    fn test_manifest_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"labels": ["person", "dog"]}"#).unwrap();
        let model = TraceModel::load(file.path()).unwrap();
        assert_eq!(model.labels(), &["person".to_string(), "dog".to_string()]);
        assert!(!model.name().is_empty());
    }

    #[test]
    fn test_malformed_frame_is_detector_error() {
        let mut model = TraceModel::new("trace", &[]);
        let frame = Frame {
            data: b"not json".to_vec(),
            ..Frame::default()
        };
        assert!(model.detect(&frame).is_err());
    }
}

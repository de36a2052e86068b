// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Detection engine - Idle/Running state machine around one worker thread
//!
//! Each run pulls a frame, detects, reduces to the two selected class counts,
//! and only evaluates the rule when the counts differ from the previous
//! frame's. The run ends on a stop request, end of stream or a frame error;
//! every exit writes the reset command and releases the capture device.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::{EngineState, EventBus};
use crate::config::{field, ConfigStore, ConfigValue};
use crate::detection::{DetectionCount, Detector, FrameSource, ModelLoader, SourceFactory};
use crate::device::{DeviceManager, RESET_COMMAND};
use crate::dispatch::{Branch, Dispatcher};
use crate::error::{DeviceError, EngineError, FrameError};
use crate::rules::RuleSpec;

/// Counts last acted upon during a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgeState {
    /// Clause A count
    pub last_a: u32,
    /// Clause B count
    pub last_b: u32,
}

impl EdgeState {
    /// Whether these counts differ from the last acted-upon pair
    pub fn changed(&self, count_a: u32, count_b: u32) -> bool {
        (count_a, count_b) != (self.last_a, self.last_b)
    }

    /// Record the counts just acted upon
    pub fn commit(&mut self, count_a: u32, count_b: u32) {
        self.last_a = count_a;
        self.last_b = count_b;
    }
}

/// Why a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunExit {
    /// Stop was requested
    Stopped,
    /// The frame source ran dry
    EndOfStream,
    /// The frame source failed
    FrameError(String),
    /// A write to the device failed
    DeviceLost,
}

/// Outcome of one detection run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Frames processed
    pub frames: u64,
    /// Commands written
    pub dispatches: u64,
    /// Why the run ended
    pub exit: RunExit,
}

/// Shared collaborators handed to a run
#[derive(Clone)]
pub struct RunContext {
    /// Live rule configuration
    pub config: Arc<ConfigStore>,
    /// Target device
    pub device: Arc<DeviceManager>,
    /// Status stream
    pub bus: Arc<EventBus>,
    /// Set to end the run
    pub stop: Arc<AtomicBool>,
}

fn build_rule(config: &ConfigStore) -> (u64, RuleSpec) {
    let revision = config.revision();
    let rule = RuleSpec::from_record(&config.snapshot());
    for warning in rule.warnings() {
        warn!("Rule configuration: {}", warning);
    }
    debug!(
        "Rule: {} / {} combinator {:?}",
        rule.clause_a, rule.clause_b, rule.combinator
    );
    (revision, rule)
}

/// Run the detection loop on the calling thread until stop, end of stream or
/// a fatal frame error.
pub fn run_detection(
    source: &mut dyn FrameSource,
    detector: &mut dyn Detector,
    ctx: &RunContext,
) -> RunSummary {
    let dispatcher = Dispatcher::new(Arc::clone(&ctx.device), Arc::clone(&ctx.bus));
    let (mut revision, mut rule) = build_rule(&ctx.config);
    let mut edge = EdgeState::default();
    let mut frames = 0u64;
    let mut dispatches = 0u64;

    info!("Collecting data");

    let exit = loop {
        if ctx.stop.load(Ordering::Acquire) {
            break RunExit::Stopped;
        }

        let frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(FrameError::EndOfStream) => {
                info!("Frame source ended after {} frames", frames);
                break RunExit::EndOfStream;
            }
            Err(e) => {
                error!("Error reading frame: {}", e);
                ctx.bus.publish_error("frame", &e.to_string());
                break RunExit::FrameError(e.to_string());
            }
        };
        frames += 1;

        // Config edits made while running apply from the next frame on
        if ctx.config.revision() != revision {
            (revision, rule) = build_rule(&ctx.config);
        }

        let detections = match detector.detect(&frame) {
            Ok(detections) => detections,
            Err(e) => {
                warn!("Detection failed on frame {}: {:#}", frame.index, e);
                ctx.bus.publish_error("detection", &format!("{:#}", e));
                continue;
            }
        };

        let counts = DetectionCount::from_detections(&detections);
        let count_a = counts.get(&rule.clause_a.class);
        let count_b = counts.get(&rule.clause_b.class);
        if !edge.changed(count_a, count_b) {
            continue;
        }
        ctx.bus.publish_counts(count_a, count_b);

        let (branch, template) = if rule.evaluate(count_a, count_b) {
            (Branch::Primary, &rule.command)
        } else if rule.negation_enabled {
            (Branch::Negated, &rule.negated_command)
        } else {
            edge.commit(count_a, count_b);
            continue;
        };

        match dispatcher.dispatch(branch, template, count_a, count_b) {
            Ok(_) => {
                dispatches += 1;
                edge.commit(count_a, count_b);
            }
            Err(DeviceError::NotConnected) => {
                error!("Device disconnected during detection");
                ctx.bus.publish_error("device", &DeviceError::NotConnected.to_string());
                break RunExit::DeviceLost;
            }
            Err(e) => {
                // Counts stay uncommitted so the next frame retries
                ctx.bus.publish_error("device", &e.to_string());
            }
        }
    };

    info!("Stopped collecting data");
    if let Err(e) = ctx.device.send(RESET_COMMAND) {
        warn!("Could not return device to idle: {}", e);
        ctx.bus.publish_error("device", &e.to_string());
    }
    source.release();

    let summary = RunSummary {
        frames,
        dispatches,
        exit,
    };
    ctx.bus.publish_run_finished(summary.clone());
    ctx.bus.publish_state(EngineState::Idle);
    summary
}

struct Worker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<(Box<dyn Detector>, RunSummary)>,
}

/// Session object owning the model, the detection worker and shared handles
/// to the device and the rule configuration.
pub struct Engine {
    config: Arc<ConfigStore>,
    device: Arc<DeviceManager>,
    bus: Arc<EventBus>,
    sources: Arc<dyn SourceFactory>,
    loader: Arc<dyn ModelLoader>,
    detector: Option<Box<dyn Detector>>,
    model_name: Option<String>,
    worker: Option<Worker>,
    start_time: Option<Instant>,
}

impl Engine {
    /// Idle engine with no model loaded
    pub fn new(
        config: Arc<ConfigStore>,
        device: Arc<DeviceManager>,
        bus: Arc<EventBus>,
        sources: Arc<dyn SourceFactory>,
        loader: Arc<dyn ModelLoader>,
    ) -> Self {
        Self {
            config,
            device,
            bus,
            sources,
            loader,
            detector: None,
            model_name: None,
            worker: None,
            start_time: None,
        }
    }

    /// Rule configuration
    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    /// Device manager
    pub fn device(&self) -> &Arc<DeviceManager> {
        &self.device
    }

    /// Status stream
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Name of the loaded model
    pub fn model_name(&self) -> Option<&str> {
        self.model_name.as_deref()
    }

    /// Current state, reaping a finished worker first
    pub fn state(&mut self) -> EngineState {
        self.reap();
        if self.worker.is_some() {
            EngineState::Running
        } else {
            EngineState::Idle
        }
    }

    /// Load a model through the configured loader and record its path.
    pub fn load_model(&mut self, path: &Path) -> Result<Vec<String>, EngineError> {
        self.reap();
        if self.worker.is_some() {
            return Err(EngineError::AlreadyRunning);
        }
        info!("Loading model {:?}...", path);
        let detector = self.loader.load(path).map_err(|e| {
            let err = EngineError::ModelLoad(format!("{:#}", e));
            error!("{}", err);
            self.bus.publish_error("model", &err.to_string());
            err
        })?;
        Ok(self.install_detector(detector, Some(path)))
    }

    /// Install an already constructed detector.
    pub fn set_detector(&mut self, detector: Box<dyn Detector>) -> Result<Vec<String>, EngineError> {
        self.reap();
        if self.worker.is_some() {
            return Err(EngineError::AlreadyRunning);
        }
        Ok(self.install_detector(detector, None))
    }

    fn install_detector(&mut self, detector: Box<dyn Detector>, path: Option<&Path>) -> Vec<String> {
        let labels = detector.labels().to_vec();
        let name = detector.name().to_string();

        let result = self.config.update(|record| {
            if let Some(path) = path {
                record.set(field::YOLO_MODEL, ConfigValue::Str(path.display().to_string()))?;
            }
            for selector in [field::TYPE_1, field::TYPE_2] {
                let current = record.get_str(selector).to_string();
                if current.is_empty() {
                    if let Some(first) = labels.first() {
                        record.set(selector, ConfigValue::Str(first.clone()))?;
                    }
                } else if !labels.contains(&current) {
                    warn!("`{}` selects {:?}, which model {} does not emit", selector, current, name);
                }
            }
            Ok(())
        });
        if let Err(e) = result {
            warn!("Could not record model selection: {}", e);
        }

        info!("Model {} ready with {} labels", name, labels.len());
        self.bus.publish_model(&name, &labels);
        self.detector = Some(detector);
        self.model_name = Some(name);
        labels
    }

    /// Enter Running. Requires a loaded model and a connected device.
    pub fn start(&mut self) -> Result<(), EngineError> {
        self.reap();
        if self.worker.is_some() {
            return Err(EngineError::AlreadyRunning);
        }
        if self.detector.is_none() {
            return Err(self.refuse(EngineError::ModelNotLoaded));
        }
        if !self.device.is_connected() {
            return Err(self.refuse(EngineError::DeviceNotConnected));
        }

        info!("Initializing detection...");
        let mut source = self.sources.open().map_err(|e| {
            error!("Unable to open the capture device: {}", e);
            self.bus.publish_error("frame", &e.to_string());
            EngineError::Frame(e)
        })?;
        let mut detector = self.detector.take().ok_or(EngineError::ModelNotLoaded)?;

        let stop = Arc::new(AtomicBool::new(false));
        let ctx = RunContext {
            config: Arc::clone(&self.config),
            device: Arc::clone(&self.device),
            bus: Arc::clone(&self.bus),
            stop: Arc::clone(&stop),
        };

        // Announced before the worker exists so its Idle always comes last
        self.bus.publish_state(EngineState::Running);
        let spawned = thread::Builder::new()
            .name("detection".to_string())
            .spawn(move || {
                let summary = run_detection(source.as_mut(), detector.as_mut(), &ctx);
                (detector, summary)
            });
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                error!("Failed to spawn detection worker: {}", e);
                self.model_name = None;
                self.bus.publish_state(EngineState::Idle);
                return Err(EngineError::Worker(e.to_string()));
            }
        };

        self.worker = Some(Worker { stop, handle });
        self.start_time = Some(Instant::now());
        Ok(())
    }

    fn refuse(&self, err: EngineError) -> EngineError {
        error!("Cannot start detection: {}", err);
        self.bus.publish_error("precondition", &err.to_string());
        err
    }

    /// Request the worker to stop after its current iteration. Non-blocking.
    pub fn stop(&mut self) {
        match &self.worker {
            Some(worker) => {
                info!("Stop requested");
                worker.stop.store(true, Ordering::Release);
            }
            None => debug!("Stop requested while idle"),
        }
    }

    /// Join the worker, reclaiming the detector.
    pub fn wait(&mut self) -> Option<RunSummary> {
        let worker = self.worker.take()?;
        self.start_time = None;
        match worker.handle.join() {
            Ok((detector, summary)) => {
                self.detector = Some(detector);
                Some(summary)
            }
            Err(_) => {
                error!("Detection worker panicked; model must be reloaded");
                self.model_name = None;
                self.bus.publish_state(EngineState::Idle);
                None
            }
        }
    }

    /// Stop and join.
    pub fn shutdown(&mut self) -> Option<RunSummary> {
        self.stop();
        self.wait()
    }

    fn reap(&mut self) {
        if self.worker.as_ref().is_some_and(|w| w.handle.is_finished()) {
            self.wait();
        }
    }

    /// Seconds since the current run started
    pub fn uptime(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Some(worker) = &self.worker {
            worker.stop.store(true, Ordering::Release);
        }
    }
}

// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! detectlink - object detection to microcontroller bridge
//!
//! Counts two object classes per frame, evaluates the configured rule and
//! sends a text command to a USB-serial device whenever the counts change.
//! Driven by line commands on stdin.

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam::channel::Sender;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use detectlink::config::{field, ConfigStore, Settings};
use detectlink::core::{
    parse_command, request_channel, Controller, Engine, Event, EventBus, Request, COMMAND_HELP,
};
use detectlink::detection::{Detection, FrameSource, TraceModel, TraceModelLoader, TraceSource};
use detectlink::device::{DeviceManager, MemoryBackend};
use detectlink::error::FrameError;
use detectlink::VERSION;

/// detectlink - object detection to microcontroller bridge
#[derive(Parser, Debug)]
#[command(name = "detectlink")]
#[command(author = "detectlink Project")]
#[command(version = VERSION)]
#[command(about = "Send serial commands to a micro:bit based on object detection counts")]
struct Args {
    /// Settings file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Rule configuration file
    #[arg(short, long)]
    rules: Option<PathBuf>,

    /// Model to load at startup
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// JSON-lines frame trace to replay
    #[arg(short, long)]
    frames: Option<PathBuf>,

    /// Replay rate in frames per second
    #[arg(long)]
    fps: Option<f64>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,

    /// Demo mode with a simulated device
    #[arg(long)]
    demo: bool,

    /// Connect and start detection immediately
    #[arg(long)]
    autostart: bool,

    /// Print the status stream as JSON lines on stdout
    #[arg(long)]
    events: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load or create settings
    let settings_path = args.config.clone().unwrap_or_else(Settings::default_path);
    let mut settings = Settings::load_or_create(&settings_path)?;

    // Initialize logging
    let configured_level = settings.level();
    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        configured_level.unwrap_or(Level::INFO)
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("detectlink v{} - object detection to micro:bit bridge", VERSION);
    info!("   Connect the device, load a model, then start detection");
    info!("   {}", COMMAND_HELP);
    if configured_level.is_none() {
        warn!("Unknown log level {:?} in settings, using info", settings.log_level);
    }

    // Override with command line args
    if args.demo {
        settings.demo_mode = true;
    }
    if let Some(rules) = &args.rules {
        settings.rules_path = rules.clone();
    }
    if let Some(frames) = &args.frames {
        settings.trace.frames = Some(frames.clone());
    }
    if let Some(fps) = args.fps {
        settings.trace.fps = fps;
    }

    info!("Settings loaded from {:?}", settings_path);
    info!("Demo mode: {}", settings.demo_mode);

    let bus = Arc::new(EventBus::default());
    let events = bus.subscribe();
    let (store, load_error) = ConfigStore::open_or_default(&settings.rules_path);
    if let Some(e) = load_error {
        error!("Rule configuration {:?}: {}", settings.rules_path, e);
        warn!("   Use `reset` or `import <file>` to repair it");
        bus.publish_error("config", &e.to_string());
    }
    let config = Arc::new(store);

    let device = Arc::new(if settings.demo_mode {
        DeviceManager::new(Arc::new(MemoryBackend::microbit()), settings.device.ident())
    } else {
        DeviceManager::serial(settings.device.ident())
    });
    info!("Serial backend: {}", device.backend_name());

    let interval = settings
        .trace
        .interval()
        .with_context(|| format!("invalid replay rate {} fps", settings.trace.fps))?;
    let frames = settings.trace.frames.clone();
    let demo = settings.demo_mode;
    let sources = move || -> Result<Box<dyn FrameSource>, FrameError> {
        match &frames {
            Some(path) => Ok(Box::new(TraceSource::open(path)?.with_interval(interval))),
            None if demo => Ok(Box::new(demo_source().with_interval(interval))),
            None => Err(FrameError::Acquisition(
                "no frame source configured, pass --frames".to_string(),
            )),
        }
    };

    let mut engine = Engine::new(
        Arc::clone(&config),
        device,
        Arc::clone(&bus),
        Arc::new(sources),
        Arc::new(TraceModelLoader),
    );

    let model = args.model.clone().or_else(|| {
        let recorded = config.snapshot().get_str(field::YOLO_MODEL).to_string();
        (!recorded.is_empty()).then(|| PathBuf::from(recorded))
    });

    let (tx, rx) = request_channel();
    match model {
        Some(path) => tx.send(Request::LoadModel(path))?,
        None if demo => {
            engine.set_detector(Box::new(TraceModel::new("demo", &["person", "cat"])))?;
        }
        None => warn!("No model configured, use `load <path>`"),
    }
    if args.autostart {
        tx.send(Request::Connect)?;
        tx.send(Request::Start)?;
    }

    let controller = thread::Builder::new()
        .name("controller".to_string())
        .spawn(move || Controller::new(engine, rx).run())?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_console(tx, events, args.events))?;

    if controller.join().is_err() {
        error!("Controller thread panicked");
    }
    info!("detectlink shutdown complete");

    Ok(())
}

/// Feed stdin commands to the controller until quit or Ctrl+C
async fn run_console(
    tx: Sender<Request>,
    mut events: broadcast::Receiver<Event>,
    print_events: bool,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut stdin_open = true;

    info!("Press Ctrl+C to shutdown");

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                info!("Shutdown signal received, cleaning up...");
                break;
            }
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => match parse_command(&line) {
                    Ok(Some(Request::Shutdown)) => break,
                    Ok(Some(request)) => {
                        if tx.send(request).is_err() {
                            warn!("Controller is gone");
                            return Ok(());
                        }
                    }
                    Ok(None) => {}
                    Err(message) => warn!("{}", message),
                },
                None => {
                    debug!("stdin closed, waiting for Ctrl+C");
                    stdin_open = false;
                }
            },
            event = events.recv() => match event {
                Ok(event) => {
                    if print_events {
                        println!("{}", serde_json::to_string(&event)?);
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!("Status stream lagged by {} events", skipped),
                Err(RecvError::Closed) => break,
            },
        }
    }

    let _ = tx.send(Request::Shutdown);
    Ok(())
}

/// Scripted scene for demo mode: people come and go, a cat wanders through
fn demo_source() -> TraceSource {
    let scene: Vec<Vec<Detection>> = [(0, 0), (1, 0), (1, 0), (2, 0), (2, 1), (1, 1), (0, 1), (0, 0)]
        .iter()
        .flat_map(|&(people, cats)| {
            let frame: Vec<Detection> = std::iter::repeat(Detection::new("person", 0.9))
                .take(people)
                .chain(std::iter::repeat(Detection::new("cat", 0.8)).take(cats))
                .collect();
            std::iter::repeat(frame).take(5)
        })
        .collect();
    TraceSource::from_frames(&scene)
}

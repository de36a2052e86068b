// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Control plane - consumes queued user intents and applies them to the engine

use crossbeam::channel::{self, Receiver, Sender};
use std::path::PathBuf;
use tracing::{error, info, warn};

use super::{Engine, EngineState};
use crate::config::field;
use crate::device::ConnectionState;

/// A user intent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Discover the device and (re)open it
    Connect,
    /// Drop the device connection
    Disconnect,
    /// Load a model through the configured loader
    LoadModel(PathBuf),
    /// Start a detection run
    Start,
    /// Stop the current run and send the reset command
    Stop,
    /// Write the primary command text verbatim
    ManualSend,
    /// Set one rule field from a raw token and persist
    SetField { name: String, value: String },
    /// Persist the current record
    SaveConfig,
    /// Re-read the rule file
    ReloadConfig,
    /// Restore defaults and persist
    ResetConfig,
    /// Write the JSON form to a file
    ExportConfig(PathBuf),
    /// Merge a JSON file into the config
    ImportConfig(PathBuf),
    /// Log a status summary
    Status,
    /// Stop any run and end the controller loop
    Shutdown,
}

/// Unbounded request queue feeding a [`Controller`]
pub fn request_channel() -> (Sender<Request>, Receiver<Request>) {
    channel::unbounded()
}

/// One-line console usage
pub const COMMAND_HELP: &str = "commands: connect, disconnect, load <model>, start, stop, send, \
set <field> <value>, save, reload, reset, export <file>, import <file>, status, quit";

/// Parse a console line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<Request>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    let path_arg = |what: &str| -> Result<PathBuf, String> {
        if rest.is_empty() {
            Err(format!("`{}` needs a {}", verb, what))
        } else {
            Ok(PathBuf::from(rest))
        }
    };

    let request = match verb.to_ascii_lowercase().as_str() {
        "connect" => Request::Connect,
        "disconnect" => Request::Disconnect,
        "load" => Request::LoadModel(path_arg("model path")?),
        "start" => Request::Start,
        "stop" => Request::Stop,
        "send" => Request::ManualSend,
        "set" => {
            let (name, value) = match rest.split_once(char::is_whitespace) {
                Some((name, value)) => (name, value.trim_start()),
                None if !rest.is_empty() => (rest, ""),
                None => return Err("`set` needs a field name".to_string()),
            };
            Request::SetField {
                name: name.to_string(),
                value: value.to_string(),
            }
        }
        "save" => Request::SaveConfig,
        "reload" => Request::ReloadConfig,
        "reset" => Request::ResetConfig,
        "export" => Request::ExportConfig(path_arg("file path")?),
        "import" => Request::ImportConfig(path_arg("file path")?),
        "status" => Request::Status,
        "quit" | "exit" => Request::Shutdown,
        other => return Err(format!("unknown command `{}`; {}", other, COMMAND_HELP)),
    };
    Ok(Some(request))
}

/// Owns the engine. Runs on its own thread, separate from the detection worker,
/// so stop and reconnect stay responsive during a run.
pub struct Controller {
    engine: Engine,
    requests: Receiver<Request>,
}

impl Controller {
    /// Controller serving `requests`
    pub fn new(engine: Engine, requests: Receiver<Request>) -> Self {
        Self { engine, requests }
    }

    /// The owned engine
    pub fn engine(&mut self) -> &mut Engine {
        &mut self.engine
    }

    /// Process requests until `Shutdown` or every sender is dropped.
    pub fn run(mut self) {
        while let Ok(request) = self.requests.recv() {
            if !self.handle(request) {
                break;
            }
        }
        if let Some(summary) = self.engine.shutdown() {
            info!(
                "Final run: {} frames, {} commands, exit {:?}",
                summary.frames, summary.dispatches, summary.exit
            );
        }
        info!("Controller stopped");
    }

    /// Apply one request. Returns false on shutdown. Failures are logged and
    /// published, never propagated.
    pub fn handle(&mut self, request: Request) -> bool {
        let bus = std::sync::Arc::clone(self.engine.bus());
        let result: Result<(), String> = match request {
            Request::Connect => {
                let device = self.engine.device();
                match device.reconnect() {
                    Ok(handle) => {
                        bus.publish_device(Some(handle.port), ConnectionState::Connected);
                        Ok(())
                    }
                    Err(e) => Err(e.to_string()),
                }
            }
            Request::Disconnect => {
                self.engine.device().disconnect();
                bus.publish_device(None, ConnectionState::Disconnected);
                Ok(())
            }
            Request::LoadModel(path) => self
                .engine
                .load_model(&path)
                .map(|_| ())
                .map_err(|e| e.to_string()),
            Request::Start => self.engine.start().map_err(|e| e.to_string()),
            Request::Stop => {
                self.engine.stop();
                Ok(())
            }
            Request::ManualSend => {
                let command = self.engine.config().snapshot().get_str(field::COMMAND).to_string();
                match self.engine.device().send(&command) {
                    Ok(()) => {
                        info!("Sent manual command: {}", command);
                        Ok(())
                    }
                    Err(e) => Err(e.to_string()),
                }
            }
            Request::SetField { name, value } => self
                .engine
                .config()
                .update(|record| record.set_raw(&name, &value))
                .map(|_| {
                    info!("Set {} = {}", name, value);
                    bus.publish_config("set");
                })
                .map_err(|e| e.to_string()),
            Request::SaveConfig => self
                .engine
                .config()
                .save()
                .map(|_| bus.publish_config("save"))
                .map_err(|e| e.to_string()),
            Request::ReloadConfig => self
                .engine
                .config()
                .reload()
                .map(|_| bus.publish_config("reload"))
                .map_err(|e| e.to_string()),
            Request::ResetConfig => self
                .engine
                .config()
                .reset()
                .map(|_| bus.publish_config("reset"))
                .map_err(|e| e.to_string()),
            Request::ExportConfig(path) => self
                .engine
                .config()
                .export_to(&path)
                .map(|_| bus.publish_config("export"))
                .map_err(|e| e.to_string()),
            Request::ImportConfig(path) => self
                .engine
                .config()
                .import_from(&path)
                .map(|_| bus.publish_config("import"))
                .map_err(|e| e.to_string()),
            Request::Status => {
                self.log_status();
                Ok(())
            }
            Request::Shutdown => {
                info!("Shutdown requested");
                return false;
            }
        };

        if let Err(message) = result {
            error!("Request failed: {}", message);
            bus.publish_error("request", &message);
        }
        true
    }

    fn log_status(&mut self) {
        let state = self.engine.state();
        let record = self.engine.config().snapshot();
        let port = self.engine.device().handle().map(|h| h.port);
        info!("State: {:?}", state);
        if state == EngineState::Running {
            info!("Running for {}s", self.engine.uptime());
        }
        match port {
            Some(port) => info!("Device: connected on {}", port),
            None => warn!("Device: not connected"),
        }
        match self.engine.model_name() {
            Some(name) => info!("Model: {}", name),
            None => warn!("Model: not loaded"),
        }
        for (key, value) in record.iter() {
            info!("  {} = {}", key, value);
        }
        self.engine.bus().publish_state(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigStore;
    use crate::core::{EventBus, EventPayload};
    use crate::detection::{Detection, FrameSource, TraceModel, TraceModelLoader, TraceSource};
    use crate::device::{DeviceIdent, DeviceManager, MemoryBackend};
    use crate::error::FrameError;
    use std::sync::Arc;

    fn controller(dir: &tempfile::TempDir, backend: &MemoryBackend) -> (Controller, Sender<Request>) {
        let config = Arc::new(ConfigStore::open(dir.path().join("rules.ini")).unwrap());
        let device = Arc::new(DeviceManager::new(Arc::new(backend.clone()), DeviceIdent::default()));
        let sources = || -> Result<Box<dyn FrameSource>, FrameError> {
            Ok(Box::new(TraceSource::from_frames(&[vec![Detection::new("person", 0.9)]])))
        };
        let engine = Engine::new(
            config,
            device,
            Arc::new(EventBus::new(64)),
            Arc::new(sources),
            Arc::new(TraceModelLoader),
        );
        let (tx, rx) = request_channel();
        (Controller::new(engine, rx), tx)
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("  "), Ok(None));
        assert_eq!(parse_command("START"), Ok(Some(Request::Start)));
        assert_eq!(
            parse_command("load models/yolo.json"),
            Ok(Some(Request::LoadModel(PathBuf::from("models/yolo.json"))))
        );
        assert_eq!(
            parse_command("set command show %1 and %2"),
            Ok(Some(Request::SetField {
                name: "command".to_string(),
                value: "show %1 and %2".to_string(),
            }))
        );
        assert_eq!(
            parse_command("set negate_command"),
            Ok(Some(Request::SetField {
                name: "negate_command".to_string(),
                value: String::new(),
            }))
        );
        assert!(parse_command("export").is_err());
        assert!(parse_command("fly").is_err());
    }

    #[test]
    fn test_manual_send_uses_verbatim_command() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MemoryBackend::microbit();
        let (mut ctl, _tx) = controller(&dir, &backend);

        assert!(ctl.handle(Request::SetField {
            name: field::COMMAND.to_string(),
            value: "show %1".to_string(),
        }));
        ctl.handle(Request::ManualSend);
        assert!(backend.writes().is_empty());

        ctl.handle(Request::Connect);
        ctl.handle(Request::ManualSend);
        assert_eq!(backend.writes(), vec!["0".to_string(), "show %1".to_string()]);
    }

    #[test]
    fn test_failed_requests_are_published() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MemoryBackend::with_ports(vec![]);
        let (mut ctl, _tx) = controller(&dir, &backend);
        let mut events = ctl.engine().bus().subscribe();

        ctl.handle(Request::Connect);
        ctl.handle(Request::SetField {
            name: field::NUMBER_1.to_string(),
            value: "many".to_string(),
        });

        let errors = std::iter::from_fn(|| events.try_recv().ok())
            .filter(|e| e.event_type == crate::core::EventType::Error)
            .count();
        assert_eq!(errors, 2);
    }

    #[test]
    fn test_run_loop_processes_queue() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MemoryBackend::microbit();
        let (mut ctl, tx) = controller(&dir, &backend);
        ctl.engine()
            .set_detector(Box::new(TraceModel::new("t", &["person"])))
            .unwrap();
        let device = Arc::clone(ctl.engine().device());
        let mut events = ctl.engine().bus().subscribe();

        for (name, value) in [(field::RELATION_1, "0"), (field::COMMAND, "n=%1")] {
            tx.send(Request::SetField {
                name: name.to_string(),
                value: value.to_string(),
            })
            .unwrap();
        }
        tx.send(Request::Connect).unwrap();
        tx.send(Request::Start).unwrap();
        let worker = std::thread::spawn(move || ctl.run());

        let summary = loop {
            match events.blocking_recv().unwrap().payload {
                EventPayload::RunFinished(summary) => break summary,
                _ => continue,
            }
        };
        tx.send(Request::Shutdown).unwrap();
        worker.join().unwrap();

        assert_eq!(summary.dispatches, 1);
        assert_eq!(backend.writes(), vec!["0", "n=1", "0"]);
        assert!(device.is_connected());
        assert_eq!(backend.open_links(), 1);
    }
}

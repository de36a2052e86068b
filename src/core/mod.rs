//! Core module - detection loop orchestration and the control plane

mod controller;
mod engine;
mod event_bus;

pub use controller::{parse_command, request_channel, Controller, Request, COMMAND_HELP};
pub use engine::{run_detection, EdgeState, Engine, RunContext, RunExit, RunSummary};
pub use event_bus::{Event, EventBus, EventPayload, EventType};

use serde::{Deserialize, Serialize};

/// Orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    /// No run active
    Idle,
    /// Detection worker active
    Running,
}

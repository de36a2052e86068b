// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Event bus - status stream observed by control surfaces

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

use super::engine::RunSummary;
use super::EngineState;
use crate::device::ConnectionState;
use crate::dispatch::Branch;

/// Event types in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    /// Engine state changes and run results
    State,
    /// Per-frame counts
    Counts,
    /// Commands written to the device
    Dispatch,
    /// Connection changes
    Device,
    /// Model loads
    Model,
    /// Config edits
    Config,
    /// Recoverable failures
    Error,
}

/// Generic event wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic per-bus id
    pub id: u64,
    /// Category, for filtering
    pub event_type: EventType,
    /// Publish time
    pub timestamp: DateTime<Utc>,
    /// Event body
    pub payload: EventPayload,
}

/// Event body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// Engine entered a state
    State(EngineState),
    /// A run ended
    RunFinished(RunSummary),
    /// Counts of the two selected classes for one frame
    Counts { count_a: u32, count_b: u32 },
    /// A command was written
    Dispatched { branch: Branch, command: String },
    /// Device connected or disconnected
    Device { port: Option<String>, state: ConnectionState },
    /// A model finished loading
    ModelLoaded { name: String, labels: Vec<String> },
    /// `action` names the edit, e.g. `set type_1`
    ConfigChanged { action: String },
    /// A recoverable failure
    Error { kind: String, message: String },
}

/// Broadcast status stream. Publishing never blocks and never fails when
/// nobody is subscribed.
pub struct EventBus {
    event_tx: broadcast::Sender<Event>,
    event_counter: AtomicU64,
}

impl EventBus {
    /// Bus retaining up to `capacity` events per lagging subscriber
    pub fn new(capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity);
        Self {
            event_tx,
            event_counter: AtomicU64::new(0),
        }
    }

    /// Announce an engine state change
    pub fn publish_state(&self, state: EngineState) {
        self.publish_event(EventType::State, EventPayload::State(state));
    }

    /// Announce the end of a run
    pub fn publish_run_finished(&self, summary: RunSummary) {
        self.publish_event(EventType::State, EventPayload::RunFinished(summary));
    }

    /// Report the counts for one frame
    pub fn publish_counts(&self, count_a: u32, count_b: u32) {
        self.publish_event(EventType::Counts, EventPayload::Counts { count_a, count_b });
    }

    /// Report a command written to the device
    pub fn publish_dispatch(&self, branch: Branch, command: &str) {
        self.publish_event(
            EventType::Dispatch,
            EventPayload::Dispatched {
                branch,
                command: command.to_string(),
            },
        );
    }

    /// Report a connection change
    pub fn publish_device(&self, port: Option<String>, state: ConnectionState) {
        self.publish_event(EventType::Device, EventPayload::Device { port, state });
    }

    /// Report a loaded model and its labels
    pub fn publish_model(&self, name: &str, labels: &[String]) {
        self.publish_event(
            EventType::Model,
            EventPayload::ModelLoaded {
                name: name.to_string(),
                labels: labels.to_vec(),
            },
        );
    }

    /// Report a config edit
    pub fn publish_config(&self, action: &str) {
        self.publish_event(
            EventType::Config,
            EventPayload::ConfigChanged {
                action: action.to_string(),
            },
        );
    }

    /// Report a recoverable failure; `kind` names the subsystem
    pub fn publish_error(&self, kind: &str, message: &str) {
        self.publish_event(
            EventType::Error,
            EventPayload::Error {
                kind: kind.to_string(),
                message: message.to_string(),
            },
        );
    }

    fn publish_event(&self, event_type: EventType, payload: EventPayload) {
        let id = self.event_counter.fetch_add(1, Ordering::Relaxed);
        let event = Event {
            id,
            event_type,
            timestamp: Utc::now(),
            payload,
        };
        let _ = self.event_tx.send(event);
    }

    /// New receiver seeing events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_are_numbered_in_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        bus.publish_state(EngineState::Running);
        bus.publish_counts(2, 0);

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!(first.event_type, EventType::State);
        assert_eq!(second.event_type, EventType::Counts);
        assert!(second.id > first.id);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(2);
        bus.publish_error("device", "unplugged");
        bus.publish_config("save");
    }
}

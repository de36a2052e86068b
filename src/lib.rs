// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! detectlink - object detection to microcontroller bridge
//!
//! Counts two selected object classes per video frame, evaluates a small
//! configurable rule over the counts and, whenever the counts change, sends a
//! text command to a USB-serial device (a BBC micro:bit by default).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Controller (requests)                    │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────┐  ┌──────────┐  ┌────────┐  ┌──────────┐         │
//! │  │ Frame   │→ │ Detector │→ │ Counts │→ │  Rule    │         │
//! │  │ Source  │  │ (model)  │  │ + edge │  │  Engine  │         │
//! │  └─────────┘  └──────────┘  └────────┘  └──────────┘         │
//! │                                              ↓               │
//! │  ┌─────────────┐   ┌────────────────┐   ┌────────────┐       │
//! │  │ ConfigStore │   │ DeviceManager  │ ← │ Dispatcher │       │
//! │  └─────────────┘   └────────────────┘   └────────────┘       │
//! │                          ↓                                   │
//! │                  ┌───────────────┐                           │
//! │                  │   Event Bus   │                           │
//! │                  └───────────────┘                           │
//! └──────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod core;
pub mod detection;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod rules;

// Re-exports for convenience
pub use config::{ConfigRecord, ConfigStore, ConfigValue, Settings};
pub use core::{Controller, Engine, EngineState, EventBus, Request};
pub use detection::{Detection, DetectionCount, Detector, FrameSource};
pub use device::{DeviceHandle, DeviceIdent, DeviceManager};
pub use dispatch::{format_command, Branch, Dispatcher};
pub use error::{ConfigError, DeviceError, EngineError, Error, FrameError, Result};
pub use rules::{evaluate, Combinator, Relation, RuleSpec};

/// detectlink version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// detectlink name
pub const NAME: &str = "detectlink";

// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Command dispatcher - template substitution and hand-off to the device

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::core::EventBus;
use crate::device::DeviceManager;
use crate::error::DeviceError;

/// Which command template fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Branch {
    /// The rule held
    Primary,
    /// The rule failed and negation is enabled
    Negated,
}

/// Replace every literal `%1` and `%2` with the decimal counts. Nothing else
/// in the template is interpreted.
pub fn format_command(template: &str, count_a: u32, count_b: u32) -> String {
    template
        .replace("%1", &count_a.to_string())
        .replace("%2", &count_b.to_string())
}

/// Writes rule commands to the device and reports them on the bus
pub struct Dispatcher {
    device: Arc<DeviceManager>,
    bus: Arc<EventBus>,
}

impl Dispatcher {
    /// Dispatcher writing to `device` and reporting on `bus`
    pub fn new(device: Arc<DeviceManager>, bus: Arc<EventBus>) -> Self {
        Self { device, bus }
    }

    /// Format the template and write it. Returns the text that was sent.
    pub fn dispatch(
        &self,
        branch: Branch,
        template: &str,
        count_a: u32,
        count_b: u32,
    ) -> Result<String, DeviceError> {
        let text = format_command(template, count_a, count_b);
        self.device.send(&text)?;
        info!("Sent {:?} command: {}", branch, text);
        self.bus.publish_dispatch(branch, &text);
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EventPayload;
    use crate::device::{DeviceIdent, MemoryBackend};

    #[test]
    fn test_format_substitutes_placeholders() {
        assert_eq!(format_command("alert %1 %2", 3, 7), "alert 3 7");
        assert_eq!(format_command("no placeholders", 3, 7), "no placeholders");
        assert_eq!(format_command("%1%1", 4, 0), "44");
        assert_eq!(format_command("%2-%1", 1, 12), "12-1");
    }

    #[test]
    fn test_format_leaves_other_percent_signs() {
        assert_eq!(format_command("100% %3 %%1 %", 5, 6), "100% %3 %5 %");
        assert_eq!(format_command("", 1, 2), "");
    }

    #[test]
    fn test_dispatch_writes_and_publishes() {
        let backend = MemoryBackend::microbit();
        let device = Arc::new(DeviceManager::new(Arc::new(backend.clone()), DeviceIdent::default()));
        device.reconnect().unwrap();
        let bus = Arc::new(EventBus::new(16));
        let mut events = bus.subscribe();

        let dispatcher = Dispatcher::new(device, bus);
        let sent = dispatcher.dispatch(Branch::Negated, "off %2", 1, 0).unwrap();

        assert_eq!(sent, "off 0");
        assert_eq!(backend.writes().last().map(String::as_str), Some("off 0"));
        let event = events.try_recv().unwrap();
        assert!(matches!(
            event.payload,
            EventPayload::Dispatched { branch: Branch::Negated, ref command } if command == "off 0"
        ));
    }

    #[test]
    fn test_dispatch_without_device_fails() {
        let backend = MemoryBackend::microbit();
        let device = Arc::new(DeviceManager::new(Arc::new(backend), DeviceIdent::default()));
        let dispatcher = Dispatcher::new(device, Arc::new(EventBus::new(4)));
        assert!(matches!(
            dispatcher.dispatch(Branch::Primary, "x", 0, 0),
            Err(DeviceError::NotConnected)
        ));
    }
}

//! Device module - discovery and connection lifecycle for the USB-serial target

mod backend;
mod manager;

pub use backend::{MemoryBackend, PortBackend, PortLink, SerialPortBackend};
pub use manager::DeviceManager;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

/// micro:bit USB vendor id
pub const VID_MICROBIT: u16 = 3368;

/// micro:bit USB product id
pub const PID_MICROBIT: u16 = 516;

/// micro:bit serial line speed
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Fixed serial read timeout
pub const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Reserved all-clear command, sent on connect and when a run stops
pub const RESET_COMMAND: &str = "0";

/// Vendor/product pair and line speed used for discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdent {
    /// USB vendor id
    pub vendor_id: u16,
    /// USB product id
    pub product_id: u16,
    /// Line speed
    pub baud_rate: u32,
}

impl Default for DeviceIdent {
    fn default() -> Self {
        Self {
            vendor_id: VID_MICROBIT,
            product_id: PID_MICROBIT,
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

/// USB identifiers of an enumerated port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbIds {
    /// USB vendor id
    pub vid: u16,
    /// USB product id
    pub pid: u16,
    /// USB product string, when reported
    pub product: Option<String>,
}

/// An enumerated serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// OS port name, e.g. `/dev/ttyACM0`
    pub name: String,
    /// `None` for non-USB ports
    pub usb: Option<UsbIds>,
}

impl PortInfo {
    /// Non-USB port
    pub fn plain(name: &str) -> Self {
        Self {
            name: name.to_string(),
            usb: None,
        }
    }

    /// USB port with the given ids
    pub fn usb(name: &str, vid: u16, pid: u16) -> Self {
        Self {
            name: name.to_string(),
            usb: Some(UsbIds { vid, pid, product: None }),
        }
    }
}

/// Link state of a [`DeviceHandle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No open link
    Disconnected,
    /// Link open
    Connected,
}

/// A discovered port bound to its line settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    /// OS port name
    pub port: String,
    /// Line speed
    pub baud_rate: u32,
    /// Read timeout
    pub timeout: Duration,
    /// Link state
    pub state: ConnectionState,
}

impl DeviceHandle {
    /// Disconnected handle for `port`
    pub fn new(port: &str, baud_rate: u32, timeout: Duration) -> Self {
        Self {
            port: port.to_string(),
            baud_rate,
            timeout,
            state: ConnectionState::Disconnected,
        }
    }

    /// Whether the handle is marked connected
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

/// Return the first port whose USB ids match exactly.
pub fn find_port(ports: &[PortInfo], ident: &DeviceIdent) -> Option<DeviceHandle> {
    info!("Searching for device {:04x}:{:04x}...", ident.vendor_id, ident.product_id);
    for port in ports {
        let Some(usb) = &port.usb else {
            info!("Port: {} (not a USB device)", port.name);
            continue;
        };
        info!("Port: {} VID: {} PID: {}", port.name, usb.vid, usb.pid);
        if usb.vid == ident.vendor_id && usb.pid == ident.product_id {
            info!(
                "Found target VID: {} PID: {} Port: {}",
                usb.vid, usb.pid, port.name
            );
            return Some(DeviceHandle::new(&port.name, ident.baud_rate, READ_TIMEOUT));
        }
    }
    None
}

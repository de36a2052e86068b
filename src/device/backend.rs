// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Port backends - real serial ports and an in-memory simulated device

use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::{DeviceHandle, PortInfo, UsbIds, PID_MICROBIT, VID_MICROBIT};
use crate::error::DeviceError;

/// Open write side of a port. Dropping it closes the port.
pub type PortLink = Box<dyn Write + Send>;

/// Enumerates and opens serial ports
pub trait PortBackend: Send + Sync {
    /// Backend identifier
    fn name(&self) -> &'static str;

    /// List available ports
    fn list_ports(&self) -> Result<Vec<PortInfo>, DeviceError>;

    /// Open the port described by `handle`
    fn open(&self, handle: &DeviceHandle) -> Result<PortLink, DeviceError>;
}

/// Host serial ports via the `serialport` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialPortBackend;

impl From<serialport::SerialPortInfo> for PortInfo {
    fn from(info: serialport::SerialPortInfo) -> Self {
        let usb = match info.port_type {
            serialport::SerialPortType::UsbPort(usb) => Some(UsbIds {
                vid: usb.vid,
                pid: usb.pid,
                product: usb.product,
            }),
            _ => None,
        };
        Self {
            name: info.port_name,
            usb,
        }
    }
}

impl PortBackend for SerialPortBackend {
    fn name(&self) -> &'static str {
        "serialport"
    }

    fn list_ports(&self) -> Result<Vec<PortInfo>, DeviceError> {
        let ports = serialport::available_ports()
            .map_err(|e| DeviceError::Enumeration(e.to_string()))?;
        Ok(ports.into_iter().map(PortInfo::from).collect())
    }

    fn open(&self, handle: &DeviceHandle) -> Result<PortLink, DeviceError> {
        let port = serialport::new(&handle.port, handle.baud_rate)
            .timeout(handle.timeout)
            .open()
            .map_err(|e| DeviceError::ConnectionFailure {
                port: handle.port.clone(),
                reason: e.to_string(),
            })?;
        Ok(Box::new(port))
    }
}

#[derive(Default)]
struct MemoryState {
    ports: Mutex<Vec<PortInfo>>,
    writes: Mutex<Vec<String>>,
    open_links: AtomicUsize,
    opens: AtomicUsize,
    fail_open: AtomicBool,
    fail_writes: AtomicBool,
}

/// Simulated serial device. Records every write and tracks how many links
/// are open at once.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<MemoryState>,
}

impl MemoryBackend {
    /// Empty backend listing `ports`
    pub fn with_ports(ports: Vec<PortInfo>) -> Self {
        let backend = Self::default();
        *backend.state.ports.lock() = ports;
        backend
    }

    /// A host with one micro:bit among unrelated ports
    pub fn microbit() -> Self {
        Self::with_ports(vec![
            PortInfo::plain("/dev/ttyS0"),
            PortInfo::usb("/dev/ttyUSB0", 0x0403, 0x6001),
            PortInfo::usb("/dev/ttyACM0", VID_MICROBIT, PID_MICROBIT),
        ])
    }

    /// Replace the enumerated ports
    pub fn set_ports(&self, ports: Vec<PortInfo>) {
        *self.state.ports.lock() = ports;
    }

    /// Every line written so far, without terminators
    pub fn writes(&self) -> Vec<String> {
        self.state.writes.lock().clone()
    }

    /// Forget recorded writes
    pub fn clear_writes(&self) {
        self.state.writes.lock().clear();
    }

    /// Links currently open
    pub fn open_links(&self) -> usize {
        self.state.open_links.load(Ordering::SeqCst)
    }

    /// Total successful opens
    pub fn open_count(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    /// Make the next opens fail
    pub fn set_fail_open(&self, fail: bool) {
        self.state.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Make writes fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl PortBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn list_ports(&self) -> Result<Vec<PortInfo>, DeviceError> {
        Ok(self.state.ports.lock().clone())
    }

    fn open(&self, handle: &DeviceHandle) -> Result<PortLink, DeviceError> {
        if self.state.fail_open.load(Ordering::SeqCst) {
            return Err(DeviceError::ConnectionFailure {
                port: handle.port.clone(),
                reason: "simulated open failure".to_string(),
            });
        }
        self.state.opens.fetch_add(1, Ordering::SeqCst);
        self.state.open_links.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryLink {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MemoryLink {
    state: Arc<MemoryState>,
}

impl Write for MemoryLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.state.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "simulated write timeout"));
        }
        self.state
            .writes
            .lock()
            .push(String::from_utf8_lossy(buf).into_owned());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for MemoryLink {
    fn drop(&mut self) {
        self.state.open_links.fetch_sub(1, Ordering::SeqCst);
    }
}

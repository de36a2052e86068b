// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Device manager - owns the single live connection to the serial device

use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::backend::{PortBackend, PortLink, SerialPortBackend};
use super::{find_port, ConnectionState, DeviceHandle, DeviceIdent, RESET_COMMAND};
use crate::error::DeviceError;

#[derive(Default)]
struct Connection {
    handle: Option<DeviceHandle>,
    link: Option<PortLink>,
}

impl Connection {
    fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            info!("Closing connection to {}", handle.port);
        }
        self.link = None;
    }
}

/// Discovers the device and serializes every write to it.
///
/// The connection mutex is held across close/open during reconnect, so no
/// write can observe a half-open handle and at most one link exists.
pub struct DeviceManager {
    backend: Arc<dyn PortBackend>,
    ident: DeviceIdent,
    conn: Mutex<Connection>,
}

impl DeviceManager {
    /// Disconnected manager using `backend` to find `ident`
    pub fn new(backend: Arc<dyn PortBackend>, ident: DeviceIdent) -> Self {
        Self {
            backend,
            ident,
            conn: Mutex::new(Connection::default()),
        }
    }

    /// Manager backed by the host's serial ports
    pub fn serial(ident: DeviceIdent) -> Self {
        Self::new(Arc::new(SerialPortBackend), ident)
    }

    /// Identity searched for on connect
    pub fn ident(&self) -> DeviceIdent {
        self.ident
    }

    /// Name of the port backend in use
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Enumerate ports and bind the first exact vendor/product match.
    pub fn discover(&self) -> Result<DeviceHandle, DeviceError> {
        let ports = self.backend.list_ports().map_err(|e| {
            error!("Port enumeration failed: {}", e);
            e
        })?;
        find_port(&ports, &self.ident).ok_or_else(|| {
            let err = DeviceError::NotFound {
                vendor_id: self.ident.vendor_id,
                product_id: self.ident.product_id,
            };
            error!("{}; make sure the device is plugged in", err);
            err
        })
    }

    /// Open `handle`, closing any previous connection first, then send the
    /// reset command.
    pub fn connect(&self, mut handle: DeviceHandle) -> Result<DeviceHandle, DeviceError> {
        let mut conn = self.conn.lock();
        if conn.link.is_some() {
            info!("Re-establishing connection to target device...");
        }
        conn.close();

        handle.state = ConnectionState::Disconnected;
        let mut link = self.backend.open(&handle).map_err(|e| {
            error!("{}", e);
            e
        })?;

        if let Err(e) = write_text(&mut link, RESET_COMMAND) {
            let err = DeviceError::WriteFailure {
                port: handle.port.clone(),
                reason: e.to_string(),
            };
            error!("Reset after open failed: {}", err);
            return Err(err);
        }

        handle.state = ConnectionState::Connected;
        info!("Connected to target device on {}", handle.port);
        conn.handle = Some(handle.clone());
        conn.link = Some(link);
        Ok(handle)
    }

    /// Discover and connect in one step.
    pub fn reconnect(&self) -> Result<DeviceHandle, DeviceError> {
        let handle = self.discover()?;
        self.connect(handle)
    }

    /// Write `text` to the connected device.
    ///
    /// An I/O failure is reported but the handle stays open; only an explicit
    /// disconnect or reconnect changes it.
    pub fn send(&self, text: &str) -> Result<(), DeviceError> {
        let mut conn = self.conn.lock();
        let Connection { handle, link } = &mut *conn;
        let (Some(handle), Some(link)) = (handle.as_ref(), link.as_mut()) else {
            warn!("Cannot send {:?}: device is not connected", text);
            return Err(DeviceError::NotConnected);
        };

        write_text(link, text).map_err(|e| {
            let err = DeviceError::WriteFailure {
                port: handle.port.clone(),
                reason: e.to_string(),
            };
            error!("{}", err);
            err
        })?;
        debug!("Sent {:?} to {}", text, handle.port);
        Ok(())
    }

    /// Drop the connection. Later sends fail with `NotConnected`.
    pub fn disconnect(&self) {
        self.conn.lock().close();
    }

    /// Whether a link is open
    pub fn is_connected(&self) -> bool {
        self.conn.lock().link.is_some()
    }

    /// Current handle, if a device was found
    pub fn handle(&self) -> Option<DeviceHandle> {
        self.conn.lock().handle.clone()
    }
}

fn write_text(link: &mut PortLink, text: &str) -> std::io::Result<()> {
    link.write_all(text.as_bytes())?;
    link.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{MemoryBackend, PortInfo};

    fn manager(backend: &MemoryBackend) -> DeviceManager {
        DeviceManager::new(Arc::new(backend.clone()), DeviceIdent::default())
    }

    #[test]
    fn test_discover_binds_matching_port() {
        let backend = MemoryBackend::microbit();
        let handle = manager(&backend).discover().unwrap();
        assert_eq!(handle.port, "/dev/ttyACM0");
        assert!(!handle.is_connected());
    }

    #[test]
    fn test_discover_not_found() {
        let backend = MemoryBackend::with_ports(vec![PortInfo::plain("/dev/ttyS0")]);
        assert!(matches!(
            manager(&backend).discover(),
            Err(DeviceError::NotFound { vendor_id: 3368, product_id: 516 })
        ));
    }

    #[test]
    fn test_connect_sends_reset() {
        let backend = MemoryBackend::microbit();
        let mgr = manager(&backend);
        let handle = mgr.reconnect().unwrap();
        assert!(handle.is_connected());
        assert!(mgr.is_connected());
        assert_eq!(backend.writes(), vec!["0".to_string()]);
    }

    #[test]
    fn test_reconnect_keeps_single_link() {
        let backend = MemoryBackend::microbit();
        let mgr = manager(&backend);
        let handle = mgr.discover().unwrap();

        mgr.connect(handle.clone()).unwrap();
        mgr.connect(handle).unwrap();

        assert_eq!(backend.open_links(), 1);
        assert_eq!(backend.open_count(), 2);
        assert_eq!(backend.writes(), vec!["0".to_string(), "0".to_string()]);
    }

    #[test]
    fn test_failed_open_leaves_disconnected() {
        let backend = MemoryBackend::microbit();
        let mgr = manager(&backend);
        mgr.reconnect().unwrap();

        backend.set_fail_open(true);
        assert!(matches!(
            mgr.reconnect(),
            Err(DeviceError::ConnectionFailure { .. })
        ));
        assert!(!mgr.is_connected());
        assert_eq!(backend.open_links(), 0);
    }

    #[test]
    fn test_send_requires_connection() {
        let backend = MemoryBackend::microbit();
        let mgr = manager(&backend);
        assert!(matches!(mgr.send("1"), Err(DeviceError::NotConnected)));

        mgr.reconnect().unwrap();
        mgr.send("hello 3").unwrap();
        assert_eq!(backend.writes().last().map(String::as_str), Some("hello 3"));

        mgr.disconnect();
        assert!(matches!(mgr.send("1"), Err(DeviceError::NotConnected)));
        assert_eq!(backend.open_links(), 0);
        assert!(mgr.handle().is_none());
    }

    #[test]
    fn test_write_failure_is_reported() {
        let backend = MemoryBackend::microbit();
        let mgr = manager(&backend);
        mgr.reconnect().unwrap();
        backend.set_fail_writes(true);
        assert!(matches!(mgr.send("1"), Err(DeviceError::WriteFailure { .. })));
        assert!(mgr.is_connected());
    }
}

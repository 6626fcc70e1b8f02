//! Serial transport behind the command channel.

use std::io::Write;
use std::time::Duration;

use tracing::info;

use crate::error::QcError;

/// Byte sink for the command channel. Implemented by the real serial port
/// and by recording doubles in tests.
pub trait SerialLink: Send {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), QcError>;
}

impl<T: SerialLink + ?Sized> SerialLink for Box<T> {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), QcError> {
        (**self).write_all(bytes)
    }
}

/// Real serial port. Port name and baud rate are externally configured.
pub struct SerialPortLink {
    port: Box<dyn serialport::SerialPort>,
    name: String,
}

impl SerialPortLink {
    /// Open the port with a bounded write timeout. Fails fast: no retry.
    pub fn open(name: &str, baud_rate: u32, timeout: Duration) -> Result<Self, QcError> {
        let port = serialport::new(name, baud_rate)
            .timeout(timeout)
            .open()
            .map_err(|e| QcError::Init(format!("Error opening serial port {}: {}", name, e)))?;
        info!("Serial connection established on {}", name);
        Ok(Self { port, name: name.to_string() })
    }
}

impl SerialLink for SerialPortLink {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), QcError> {
        self.port
            .write_all(bytes)
            .map_err(|e| QcError::CommandSend(format!("write to {} failed: {}", self.name, e)))
    }
}

impl Drop for SerialPortLink {
    fn drop(&mut self) {
        info!("Serial connection on {} closed", self.name);
    }
}

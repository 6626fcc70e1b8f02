//! Command protocol to the actuator/indicator board.
//!
//! ASCII line-oriented, one command per line, fire-and-forget: no
//! acknowledgment, no checksum. Exactly four legal tokens; the protocol is
//! closed and fixed.

mod serial;

use std::fmt;
use std::time::Duration;

use tracing::{error, info};

pub use serial::{SerialLink, SerialPortLink};

use crate::error::QcError;

/// The four commands the board understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareCommand {
    Start,
    Defect,
    Normal,
    Reset,
}

impl HardwareCommand {
    pub fn token(self) -> &'static str {
        match self {
            HardwareCommand::Start => "START",
            HardwareCommand::Defect => "DEFECT",
            HardwareCommand::Normal => "NORMAL",
            HardwareCommand::Reset => "RESET",
        }
    }
}

impl fmt::Display for HardwareCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Stateful wrapper over a serial connection that speaks the four-token
/// protocol. Owns the link; the port is released when the channel drops.
pub struct CommandChannel<L: SerialLink> {
    link: L,
}

impl<L: SerialLink> CommandChannel<L> {
    /// Wrap an open link. Waits out the settle delay first: the board resets
    /// when the host opens the line and ignores bytes until it has rebooted.
    pub fn new(link: L, settle_delay: Duration) -> Self {
        std::thread::sleep(settle_delay);
        Self { link }
    }

    /// Write the command token and line terminator. Not transactional: a
    /// failed write is logged and surfaced, but the channel is not
    /// reconnected and stays usable for later sends.
    pub fn send(&mut self, command: HardwareCommand) -> Result<(), QcError> {
        let mut line = command.token().as_bytes().to_vec();
        line.push(b'\n');
        match self.link.write_all(&line) {
            Ok(()) => {
                info!("Sent command: {}", command);
                Ok(())
            }
            Err(e) => {
                error!("Error sending command {}: {}", command, e);
                Err(e)
            }
        }
    }

    pub fn start_process(&mut self) -> Result<(), QcError> {
        self.send(HardwareCommand::Start)
    }

    pub fn handle_defect(&mut self) -> Result<(), QcError> {
        self.send(HardwareCommand::Defect)
    }

    pub fn handle_normal(&mut self) -> Result<(), QcError> {
        self.send(HardwareCommand::Normal)
    }

    pub fn reset_all_devices(&mut self) -> Result<(), QcError> {
        self.send(HardwareCommand::Reset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingLink {
        written: Arc<Mutex<Vec<u8>>>,
        fail: bool,
    }

    impl SerialLink for RecordingLink {
        fn write_all(&mut self, bytes: &[u8]) -> Result<(), QcError> {
            if self.fail {
                return Err(QcError::CommandSend("port unplugged".into()));
            }
            self.written.lock().unwrap().extend_from_slice(bytes);
            Ok(())
        }
    }

    fn channel_with_log() -> (CommandChannel<RecordingLink>, Arc<Mutex<Vec<u8>>>) {
        let written = Arc::new(Mutex::new(Vec::new()));
        let link = RecordingLink { written: written.clone(), fail: false };
        (CommandChannel::new(link, Duration::ZERO), written)
    }

    #[test]
    fn test_tokens() {
        assert_eq!(HardwareCommand::Start.token(), "START");
        assert_eq!(HardwareCommand::Defect.token(), "DEFECT");
        assert_eq!(HardwareCommand::Normal.token(), "NORMAL");
        assert_eq!(HardwareCommand::Reset.token(), "RESET");
    }

    #[test]
    fn test_send_writes_newline_terminated_token() {
        let (mut channel, written) = channel_with_log();
        channel.send(HardwareCommand::Start).unwrap();
        assert_eq!(written.lock().unwrap().as_slice(), b"START\n");
    }

    #[test]
    fn test_domain_operations_map_to_tokens() {
        let (mut channel, written) = channel_with_log();
        channel.start_process().unwrap();
        channel.handle_defect().unwrap();
        channel.handle_normal().unwrap();
        channel.reset_all_devices().unwrap();
        assert_eq!(
            written.lock().unwrap().as_slice(),
            b"START\nDEFECT\nNORMAL\nRESET\n"
        );
    }

    #[test]
    fn test_send_failure_surfaces_and_channel_stays_usable() {
        let written = Arc::new(Mutex::new(Vec::new()));
        let link = RecordingLink { written: written.clone(), fail: true };
        let mut channel = CommandChannel::new(link, Duration::ZERO);
        assert!(channel.send(HardwareCommand::Defect).is_err());
        // No partial line reached the wire.
        assert!(written.lock().unwrap().is_empty());
        // A later send goes through the same channel object.
        channel.link.fail = false;
        channel.reset_all_devices().unwrap();
        assert_eq!(written.lock().unwrap().as_slice(), b"RESET\n");
    }
}

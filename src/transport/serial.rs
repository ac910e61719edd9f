//! [`Transport`] over a serial port.

use std::fmt;
use std::io::{self, Read, Write};
use std::time::Duration;

use log::{debug, info};
use serialport::{ClearBuffer, SerialPort};

use super::{Connect, Transport};
use crate::error::{Result, TransportError};
use crate::settings::Settings;
use crate::utils::{detect_port, open_port};

/// Used when a read should wait without a deadline. `serialport` always wants
/// one.
const NO_DEADLINE: Duration = Duration::from_secs(60 * 60);

/// An open serial connection to a token. Not `Clone`: one connection, one
/// owner.
pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
}
impl SerialTransport {
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        SerialTransport { port: Some(port) }
    }

    fn port(&mut self) -> std::result::Result<&mut Box<dyn SerialPort>, TransportError> {
        self.port.as_mut().ok_or(TransportError::Closed)
    }
}
impl Transport for SerialTransport {
    fn write(&mut self, bytes: &[u8]) -> std::result::Result<(), TransportError> {
        let port = self.port()?;
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> std::result::Result<(), TransportError> {
        match self.port()?.read_exact(buf) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Err(TransportError::Timeout),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(TransportError::Timeout),
            Err(e) => Err(e.into()),
        }
    }

    fn set_read_timeout(
        &mut self,
        timeout: Option<Duration>,
    ) -> std::result::Result<(), TransportError> {
        self.port()?.set_timeout(timeout.unwrap_or(NO_DEADLINE))?;
        Ok(())
    }

    fn close(&mut self) -> std::result::Result<(), TransportError> {
        if let Some(port) = self.port.take() {
            debug!("closing {}", port.name().unwrap_or_default());
        }
        Ok(())
    }
}
impl Connect for SerialTransport {
    fn connect(settings: &Settings) -> Result<Self> {
        let path = match &settings.path {
            Some(path) => path.clone(),
            None => detect_port()?,
        };
        info!("Connecting to token on serial port {} ...", path);

        let port = open_port(settings, &path)?;
        // Drop whatever a previous session left behind.
        port.clear(ClearBuffer::All).map_err(TransportError::from)?;
        Ok(SerialTransport::new(port))
    }
}
impl fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.port {
            Some(port) => debug_fmt_serialport!(port, f).finish(),
            None => f.debug_tuple("SerialTransport").field(&"closed").finish(),
        }
    }
}

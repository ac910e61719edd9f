//! The byte channel to the token.
//!
//! The protocol engine only needs a reliable, exclusively owned byte stream.
//! [`Transport`] is that seam: the serial port implementation is used by the
//! tool, and an in-memory simulated token is used by the tests.

#[macro_use]
mod macros;

mod serial;

#[cfg(test)]
pub(crate) mod mock;

use std::time::Duration;

use crate::error::{Result, TransportError};
use crate::settings::Settings;

pub use serial::SerialTransport;

// =============================================================================
// Public Interface
// =============================================================================

/// A blocking, exclusively owned byte channel.
pub trait Transport {
    fn write(&mut self, bytes: &[u8]) -> std::result::Result<(), TransportError>;

    /// Fill `buf` completely or fail, with [`TransportError::Timeout`] when
    /// the read deadline expires first.
    fn read_exact(&mut self, buf: &mut [u8]) -> std::result::Result<(), TransportError>;

    /// `None` waits without a deadline.
    fn set_read_timeout(
        &mut self,
        timeout: Option<Duration>,
    ) -> std::result::Result<(), TransportError>;

    fn close(&mut self) -> std::result::Result<(), TransportError> {
        Ok(())
    }
}

/// A transport that can be opened from the settings alone.
pub trait Connect: Transport + Sized {
    fn connect(settings: &Settings) -> Result<Self>;
}

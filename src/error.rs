//! Error types for `tokencom`.
//!
//! Every component returns a typed failure and nothing retries internally.
//! Only the [`provision`](crate::provision) state machine and the command line
//! interface turn an [`Error`] into a user-facing message and an exit code.

use std::io;

use thiserror::Error;

use crate::protocol::Digest;
use crate::utils::format_digest;

// =============================================================================
// Public Interface
// =============================================================================

/// Failures of the byte channel to the token. Always fatal to the session.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The serial port could not be opened.
    #[error("could not open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: serialport::Error,
    },

    /// The serial port could not be configured.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// A read or write on the channel failed.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// No complete frame arrived before the read deadline. The device state
    /// is unknown after this and the session must not be resumed.
    #[error("timed out waiting for the device")]
    Timeout,

    /// The session was already closed.
    #[error("connection is closed")]
    Closed,
}

/// Failures detected while checking device responses.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum ProtocolError {
    /// The response frame shape, opcode, endpoint or id did not match the
    /// request. Indicates a framing desync; the session should be abandoned.
    #[error("unexpected response to {command}: {reason}")]
    UnexpectedResponse {
        command: &'static str,
        reason: String,
    },

    /// The device answered with a non-OK status byte.
    #[error("device rejected {command} ({reason})")]
    DeviceRejected {
        command: &'static str,
        reason: &'static str,
    },

    /// The transfer bookkeeping accounted for more bytes than the binary has.
    #[error("transmitted more than expected: {sent} of {total} bytes")]
    TransferOverrun { sent: usize, total: usize },
}

/// Failures caught before any device I/O takes place.
#[derive(Debug, Error)]
pub enum PreconditionError {
    #[error("app binary is {size} bytes, the token accepts at most {max}")]
    AppTooLarge { size: usize, max: usize },

    #[error("app binary is empty")]
    EmptyApp,

    #[error("missing required argument: {0}")]
    MissingArgument(&'static str),

    #[error("no token found on any serial port")]
    NoDevice,

    #[error("standard input can provide only one USS, `-` was given for {0} and {1}")]
    StdinTwice(&'static str, &'static str),

    #[error("could not read app image {path}: {source}")]
    Image {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// The crate level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    /// The digest reported by the device differs from the one computed over
    /// the uploaded binary on the host.
    #[error(
        "different digests, device: {} host: {}",
        format_digest(device),
        format_digest(host)
    )]
    DigestMismatch { device: Digest, host: Digest },

    /// The running application is not the one this tool talks to.
    #[error("token is running the wrong app ({name0}{name1}) and is not in firmware mode")]
    WrongApp { name0: String, name1: String },

    /// The device did not identify itself as the expected firmware.
    #[error("token is not in firmware mode ({0})")]
    NotFirmware(String),

    /// The user supplied secret could not be obtained.
    #[error("could not read the user supplied secret: {0}")]
    Secret(#[source] io::Error),
}

impl Error {
    /// `true` when the failure came from a non-OK status byte.
    pub fn is_device_rejection(&self) -> bool {
        matches!(self, Error::Protocol(ProtocolError::DeviceRejected { .. }))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

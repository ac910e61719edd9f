//! `tokencom` framing protocol.
//!
//! Every exchange with the token is one fixed-size request frame answered by
//! exactly one fixed-size response frame. The size of each frame is fixed by
//! the length class of its command descriptor.
//!
//! **Example** - Building a request and checking its response:
//! ```ignore
//! use crate::protocol::{commands::*, frame, TransactionId};
//!
//! let id = TransactionId::default();
//! let tx = frame::encode(&APP_GET_NAME_VERSION, id, &[]);
//! // ... write `tx`, read `raw` back ...
//! let rx = frame::decode_and_verify(&raw, &APP_RSP_NAME_VERSION, id)?;
//! ```

pub mod commands;
pub mod frame;
pub mod transfer;

pub use commands::{CmdLen, CommandDescriptor, Endpoint};
pub use frame::{Frame, TransactionId, STATUS_BAD, STATUS_OK};
pub use transfer::{Chunk, Chunks, Exchange, LoadCommands, TransferState};

/// Largest application image the token accepts, in bytes.
pub const MAX_APP_SIZE: usize = 100 * 1024;

/// Length of the digest the device reports after a completed transfer.
pub const DIGEST_LEN: usize = 32;

/// A BLAKE2s-256 digest over an application image.
pub type Digest = [u8; DIGEST_LEN];

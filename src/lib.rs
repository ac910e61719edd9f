//! Tokencom provisions application images onto a hardware security token
//! connected over a serial line (USB CDC).
//!
//! The token runs a minimal firmware that can load one application into RAM.
//! A management application, once loaded, can install another application
//! persistently, delete it, register itself as the management app, or load
//! the app preloaded in flash. Tokencom talks to both through a small framed
//! request/response protocol:
//!
//! * Every frame is one header byte followed by a fixed number of command
//!   bytes (1, 4, 32 or 128), the opcode first.
//! * Every request is answered by exactly one response before the next
//!   request is sent.
//! * Applications are transferred in chunks of 127 bytes; the last one is
//!   answered with the digest the device computed over the whole binary,
//!   which is checked against the image on the host.
//! * A User Supplied Secret (USS), derived by hashing a phrase or a file, can
//!   be mixed into the load of an application.
//!
//! A provisioning run is implemented as a state machine, in terms of
//! **states** and **transitions** between them:
//!
//! * The machine is in exactly one state at any time.
//! * Each state holds its own data, and the settings are shared by all.
//! * Transitions are triggered by typed **events** carrying the data handed
//!   over to the next state (the open session, the request).
//! * Transitioning consumes the original state.
//!
//! Transitions use `rust`'s `From` and `Into` pattern: an `event` converts into
//! the next `state`, and only transitions for which `From` is implemented can
//! happen. Any other transition is a compile-time error.
//!
//! **Example** - Registering the management app of a token found on the USB
//! bus:
//! ```no_run
//! use tokencom::{provision::{self, Request}, SerialTransport, SettingsBuilder};
//!
//! let settings = SettingsBuilder::new().mgmt_app("mgmt.bin").finalize();
//! let request = Request::Register { unregister: false };
//! let code = provision::factory::<SerialTransport>(settings, request).run();
//! assert_eq!(code, 0);
//! ```

pub mod error;
pub mod protocol;
pub mod provision;
pub mod secret;
pub mod session;
mod settings;
pub mod transport;
mod utils;

pub use error::{Error, Result};
pub use session::{DeviceSession, FirmwareProbe, Mode, ModeProbe, NameVersion};
pub use settings::{Settings, SettingsBuilder};
pub use transport::SerialTransport;
pub use utils::{format_digest, read_image};

//! The provisioning run of `tokencom`.
//!
//! One run talks to one token: it connects, finds out what the token is
//! running, loads the management app when only the firmware is there, carries
//! out the requested operation and closes the connection.
//!
//! **Example** - Installing an app through the serial port:
//! ```ignore
//! use tokencom::{provision::{self, Request}, SerialTransport, SettingsBuilder};
//!
//! let settings = SettingsBuilder::new()
//!     .path("/dev/ttyACM0")
//!     .mgmt_app("mgmt.bin")
//!     .finalize();
//! let request = Request::Install {
//!     image: "signer.bin".into(),
//!     overwrite: true,
//!     enter_uss: false,
//!     uss_file: None,
//! };
//! let mut provisioner = provision::factory::<SerialTransport>(settings, request);
//! std::process::exit(provisioner.run().into());
//! ```

mod events;
mod state_machine;
mod states;

use crate::error::PreconditionError;
use crate::secret::STDIN_SENTINEL;
use crate::settings::Settings;

pub use state_machine::{attach, factory, Provisioner};

/// The operation to carry out once the management app runs.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Request {
    /// Ask the firmware to start the app preloaded in flash.
    Start,
    /// Install the app image at `image`, optionally with its own USS.
    Install {
        image: String,
        /// Delete the installed app first.
        overwrite: bool,
        enter_uss: bool,
        uss_file: Option<String>,
    },
    /// Delete the installed app.
    Delete,
    /// Register the management app, or unregister it.
    Register { unregister: bool },
    /// Have the management app load the app preloaded in flash.
    LoadFlash,
}
impl Request {
    /// Whether the request needs the management app running.
    pub fn needs_mgmt_app(&self) -> bool {
        !matches!(self, Request::Start)
    }

    /// Reject combinations of arguments that cannot work, before talking to
    /// the token. Standard input can only be read once.
    pub fn check(&self, settings: &Settings) -> Result<(), PreconditionError> {
        if let Request::Install {
            uss_file: Some(app_uss_file),
            ..
        } = self
        {
            if settings.uss_file.as_deref() == Some(STDIN_SENTINEL)
                && app_uss_file == STDIN_SENTINEL
            {
                return Err(PreconditionError::StdinTwice("--uss-file", "--app-uss-file"));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

//! A provisioning session with one token.
//!
//! [`DeviceSession`] exclusively owns the transport to the token for its whole
//! life: connect, detect the mode, optionally load the management app, run
//! operations, close. Every operation is a strict request/response exchange:
//! one frame out, then a blocking read (with a deadline) of exactly one frame
//! back. Nothing is pipelined and nothing is retried. After a timeout the
//! device state is unknown and the session should be closed, not resumed.

use std::convert::TryFrom;
use std::fmt;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};

use crate::error::{Error, ProtocolError, Result, TransportError};
use crate::protocol::commands::*;
use crate::protocol::frame::{self, Frame, TransactionId};
use crate::protocol::transfer::{self, app_digest, check_status, Exchange, LoadCommands};
use crate::protocol::{Digest, DIGEST_LEN};
use crate::secret::Secret;
use crate::settings::Settings;
use crate::transport::{Connect, Transport};
use crate::utils::{dump, format_digest};

// =============================================================================
// Public Interface
// =============================================================================

/// Identity reported by the firmware or by a running app.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NameVersion {
    pub name0: String,
    pub name1: String,
    pub version: u32,
}
impl NameVersion {
    pub const FIRMWARE: (&'static str, &'static str) = ("tk1 ", "mkdf");
    pub const MGMT_APP: (&'static str, &'static str) = ("tk1 ", "mgmt");

    /// Decode from a response payload: two 4 byte names, then the version in
    /// little endian.
    pub fn unpack(raw: &[u8]) -> Self {
        let mut version = [0; 4];
        version.copy_from_slice(&raw[8..12]);
        NameVersion {
            name0: String::from_utf8_lossy(&raw[0..4]).into_owned(),
            name1: String::from_utf8_lossy(&raw[4..8]).into_owned(),
            version: u32::from_le_bytes(version),
        }
    }

    pub fn is(&self, names: (&str, &str)) -> bool {
        self.name0 == names.0 && self.name1 == names.1
    }
}
impl fmt::Display for NameVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "name0:'{}' name1:'{}' version:{}",
            self.name0, self.name1, self.version
        )
    }
}

/// What the token is running when a session starts.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Mode {
    /// Bare firmware, waiting for an app to be loaded.
    Firmware,
    /// An app is already loaded and running.
    App,
}

/// Decides in which [`Mode`] the token is.
pub trait ModeProbe<T: Transport> {
    fn probe_mode(&mut self, session: &mut DeviceSession<T>) -> Result<Mode>;
}

/// Asks the firmware endpoint for its identity. A running app refuses any
/// frame addressed to the firmware, so anything but a proper firmware answer
/// means an app is loaded.
#[derive(Debug, Default, Copy, Clone)]
pub struct FirmwareProbe;
impl<T: Transport> ModeProbe<T> for FirmwareProbe {
    fn probe_mode(&mut self, session: &mut DeviceSession<T>) -> Result<Mode> {
        match session.firmware_name_version() {
            Ok(nv) if nv.is(NameVersion::FIRMWARE) => Ok(Mode::Firmware),
            Ok(nv) => {
                debug!("firmware endpoint answered with {}", nv);
                Ok(Mode::App)
            }
            Err(Error::Protocol(ProtocolError::UnexpectedResponse { reason, .. })) => {
                debug!("firmware probe refused: {}", reason);
                Ok(Mode::App)
            }
            Err(Error::Transport(TransportError::Timeout)) => {
                debug!("firmware probe timed out");
                Ok(Mode::App)
            }
            Err(e) => Err(e),
        }
    }
}

/// A fixed answer, for when the mode is already known.
impl<T: Transport> ModeProbe<T> for Mode {
    fn probe_mode(&mut self, _session: &mut DeviceSession<T>) -> Result<Mode> {
        Ok(*self)
    }
}

/// The session with one token. Owns its transport exclusively.
pub struct DeviceSession<T: Transport> {
    transport: Option<T>,
    id: TransactionId,
    read_timeout: Duration,
    verbose: bool,
    verify_digest: bool,
    show_progress: bool,
}
impl<T: Connect> DeviceSession<T> {
    /// Open the transport described by `settings` and start a session on it.
    pub fn connect(settings: &Settings) -> Result<Self> {
        let transport = T::connect(settings)?;
        Ok(DeviceSession::new(transport, settings))
    }
}
impl<T: Transport> DeviceSession<T> {
    pub fn new(transport: T, settings: &Settings) -> Self {
        let id = TransactionId::try_from(settings.transaction_id).unwrap_or_default();
        DeviceSession {
            transport: Some(transport),
            id,
            read_timeout: settings.read_timeout,
            verbose: settings.verbose,
            verify_digest: settings.verify_digest,
            show_progress: settings.show_progress,
        }
    }

    /// The transport, until the session is closed.
    pub fn transport(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.transport.is_none()
    }

    /// Decide whether the token runs the bare firmware or an app.
    pub fn probe_mode<P: ModeProbe<T> + ?Sized>(&mut self, probe: &mut P) -> Result<Mode> {
        let mode = probe.probe_mode(self)?;
        info!("token is in {:?} mode", mode);
        Ok(mode)
    }

    /// Identity of the firmware. Fails when an app is running.
    pub fn firmware_name_version(&mut self) -> Result<NameVersion> {
        let rsp = self.exchange(&FW_GET_NAME_VERSION, &[], &FW_RSP_NAME_VERSION)?;
        Ok(NameVersion::unpack(rsp.payload()))
    }

    /// Name and version of the running app.
    pub fn get_app_name_version(&mut self) -> Result<NameVersion> {
        let rsp = self.exchange(&APP_GET_NAME_VERSION, &[], &APP_RSP_NAME_VERSION)?;
        Ok(NameVersion::unpack(rsp.payload()))
    }

    /// Make sure the running app is the management app.
    pub fn ensure_mgmt_app(&mut self) -> Result<NameVersion> {
        let nv = self.get_app_name_version()?;
        if !nv.is(NameVersion::MGMT_APP) {
            return Err(Error::WrongApp {
                name0: nv.name0,
                name1: nv.name1,
            });
        }
        debug!("running app: {}", nv);
        Ok(nv)
    }

    /// Load `binary` into the firmware, which starts it once complete. The
    /// reported digest is always checked against the image.
    pub fn load_app(&mut self, binary: &[u8], secret: Option<&Secret>) -> Result<Digest> {
        let digest = self.upload(&LoadCommands::FIRMWARE, binary, secret)?;
        verify(&digest, binary)?;
        info!("app loaded, digest {}", format_digest(&digest));
        Ok(digest)
    }

    /// Install `binary` through the management app and return the digest the
    /// device reports for it.
    ///
    /// A management app without digest support reports all zeros. That
    /// digest is accepted with a warning, any other one must match the image.
    pub fn install_app(&mut self, binary: &[u8], secret: Option<&Secret>) -> Result<Digest> {
        let digest = self.upload(&LoadCommands::APPLICATION, binary, secret)?;
        info!("digest from device: {}", format_digest(&digest));
        if self.verify_digest && digest == NO_DIGEST {
            warn!("the management app reports no digest, install not verified");
        } else if self.verify_digest {
            verify(&digest, binary)?;
            info!("digests match");
        } else {
            warn!("digest not verified");
        }
        Ok(digest)
    }

    /// Delete the installed app. The device reports "nothing installed" and
    /// "not allowed" the same way.
    pub fn delete_installed_app(&mut self) -> Result<()> {
        let rsp = self.exchange(&APP_DELETE_APP, &[], &APP_RSP_DELETE_APP)?;
        check_status(
            &rsp,
            &APP_DELETE_APP,
            "no installed app, or insufficient permission",
        )?;
        Ok(())
    }

    /// Register the running app as the management app, or unregister it.
    pub fn register_mgmt_app(&mut self, unregister: bool) -> Result<()> {
        let (cmd, rsp, reason) = if unregister {
            (
                APP_UNREGISTER_MGMT_APP,
                APP_RSP_UNREGISTER_MGMT_APP,
                "not registered",
            )
        } else {
            (
                APP_REGISTER_MGMT_APP,
                APP_RSP_REGISTER_MGMT_APP,
                "already registered",
            )
        };
        let rx = self.exchange(&cmd, &[], &rsp)?;
        check_status(&rx, &cmd, reason)?;
        Ok(())
    }

    /// Ask the management app to load the app preloaded in flash.
    pub fn load_app_flash(&mut self) -> Result<()> {
        let rsp = self.exchange(&APP_LOAD_APP_FLASH, &[], &APP_RSP_LOAD_APP_FLASH)?;
        check_status(&rsp, &APP_LOAD_APP_FLASH, "no preloaded app")?;
        Ok(())
    }

    /// Ask the firmware to start the app preloaded in flash. Works without
    /// any app loaded, but only on a token in firmware mode.
    pub fn start_app_flash(&mut self) -> Result<()> {
        let nv = self.firmware_name_version().map_err(|e| {
            warn!(
                "If the serial port is correct, then the token might not be in firmware mode \
                 and have an app running already. Unplug it and plug it in again."
            );
            e
        })?;
        if !nv.is(NameVersion::FIRMWARE) {
            return Err(Error::NotFirmware(nv.to_string()));
        }
        info!("firmware {}", nv);

        self.exchange(&FW_START_APP_FLASH, &[], &FW_RSP_START_APP_FLASH)?;
        Ok(())
    }

    /// Release the transport. Closing a closed session does nothing.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut transport) = self.transport.take() {
            transport.close()?;
            debug!("session closed");
        }
        Ok(())
    }

    fn link(&mut self) -> std::result::Result<&mut T, TransportError> {
        self.transport.as_mut().ok_or(TransportError::Closed)
    }

    fn upload(
        &mut self,
        commands: &LoadCommands,
        binary: &[u8],
        secret: Option<&Secret>,
    ) -> Result<Digest> {
        transfer::check_size(binary.len())?;

        let progress = self.progress_bar(binary.len());
        let result = transfer::begin(self, commands, binary.len(), secret)
            .and_then(|_| transfer::send(self, commands, binary, &progress));
        match &result {
            Ok(_) => progress.finish_with_message("[TC] App uploaded"),
            Err(_) => progress.abandon(),
        }
        result
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "[TC] ⏩ Pushing [{elapsed_precise}] [{bar:40.cyan/blue}] \
                     {bytes}/{total_bytes} ({eta})",
                )
                .progress_chars("=>-"),
        );
        pb
    }

    /// Read one frame: the header byte announces how many bytes follow, and
    /// all of them are consumed even when the frame turns out to be wrong.
    fn receive(&mut self, rsp: &CommandDescriptor) -> Result<Frame> {
        let timeout = self.read_timeout;
        let link = self.link()?;
        link.set_read_timeout(Some(timeout))?;

        let mut hdr = [0u8; 1];
        link.read_exact(&mut hdr)?;
        let mut raw = vec![0u8; 1 + frame::announced_len(hdr[0])];
        raw[0] = hdr[0];
        link.read_exact(&mut raw[1..])?;

        if self.verbose {
            dump(&format!("{} rx", rsp), &raw);
        }
        Ok(frame::decode_and_verify(&raw, rsp, self.id)?)
    }
}
impl<T: Transport> Exchange for DeviceSession<T> {
    fn exchange(
        &mut self,
        cmd: &CommandDescriptor,
        payload: &[u8],
        rsp: &CommandDescriptor,
    ) -> Result<Frame> {
        let tx = frame::encode(cmd, self.id, payload);
        if self.verbose {
            dump(&format!("{} tx", cmd), tx.as_bytes());
        }
        self.link()?.write(tx.as_bytes())?;
        self.receive(rsp)
    }
}
impl<T: Transport> Drop for DeviceSession<T> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            debug!("error while closing the session: {}", e);
        }
    }
}
impl<T: Transport + fmt::Debug> fmt::Debug for DeviceSession<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSession")
            .field("transport", &self.transport)
            .field("id", &self.id)
            .finish()
    }
}

/// What a management app without digest support reports.
const NO_DIGEST: Digest = [0; DIGEST_LEN];

fn verify(device: &Digest, binary: &[u8]) -> Result<()> {
    let host = app_digest(binary);
    if *device != host {
        return Err(Error::DigestMismatch {
            device: *device,
            host,
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

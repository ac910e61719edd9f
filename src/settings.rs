//! Settings related to the `tokencom` serial port and provisioning session.
//!
//! Use the [builder](https://doc.rust-lang.org/1.0.0/style/ownership/builders.html)
//! pattern to set the configurable values.

use std::time::Duration;

pub use serialport::{DataBits, FlowControl, Parity, StopBits};

// =============================================================================
// Public Interface
// =============================================================================

/// Groups all settings used by `tokencom` and acts as a
/// [builder](https://doc.rust-lang.org/1.0.0/style/ownership/builders.html)
/// for the settings.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Settings {
    /// The port name, usually the device path. When not set, `tokencom` looks
    /// for a connected token.
    pub path: Option<String>,
    /// The baud rate in symbols-per-second.
    pub baud_rate: u32,
    /// Number of bits used to represent a character sent on the line.
    pub data_bits: DataBits,
    /// The type of signalling to use for controlling data transfer.
    pub flow_control: FlowControl,
    /// The type of parity to use for error checking.
    pub parity: Parity,
    /// Number of bits to use to signal the end of a character.
    pub stop_bits: StopBits,

    /// How long to wait for a response frame before giving up on the device.
    pub read_timeout: Duration,
    /// Transaction id used for every exchange of a session (0 to 3).
    pub transaction_id: u8,

    /// Dump every frame and report progress details.
    pub verbose: bool,
    /// Compare the digest the device reports after an install with the one
    /// computed over the image on the host.
    pub verify_digest: bool,
    /// Show a progress bar during uploads.
    pub show_progress: bool,

    /// Path to the management app image, loaded when the token is found in
    /// firmware mode.
    pub mgmt_app: Option<String>,
    /// Prompt for a phrase to derive the USS of the management app from.
    pub enter_uss: bool,
    /// Derive the USS of the management app from this file (`-` for stdin).
    /// Takes precedence over `enter_uss`.
    pub uss_file: Option<String>,

    /// Restrict creation of `Settings` instances unless through the
    /// `SettingsBuilder`.
    #[doc(hidden)]
    _private_use_builder: (),
}

/// The builder for the `Settings` values.
///
/// All values are optional and have default values that will be used if not
/// explicitly set.
///
/// **Example**
///
/// ```
/// let settings = tokencom::SettingsBuilder::new()
///     .path("/dev/ttyACM0")
///     .verbose(true)
///     .finalize();
/// assert_eq!(settings.baud_rate, 62_500);
/// ```
pub struct SettingsBuilder {
    settings: Settings,
}
impl SettingsBuilder {
    /// Start building the settings using default values and no path for the
    /// port.
    pub fn new() -> Self {
        SettingsBuilder {
            settings: Settings {
                path: None,
                baud_rate: 62_500,
                data_bits: DataBits::Eight,
                flow_control: FlowControl::None,
                parity: Parity::None,
                stop_bits: StopBits::One,
                read_timeout: Duration::from_secs(2),
                transaction_id: 2,
                verbose: false,
                verify_digest: true,
                show_progress: true,
                mgmt_app: None,
                enter_uss: false,
                uss_file: None,
                _private_use_builder: (),
            },
        }
    }

    /// Set the path to the serial port
    pub fn path<'a>(mut self, path: impl Into<std::borrow::Cow<'a, str>>) -> Self {
        self.settings.path = Some(path.into().as_ref().to_owned());
        self
    }

    /// Set the baud rate in symbols-per-second
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.settings.baud_rate = baud_rate;
        self
    }

    /// Set the number of bits used to represent a character sent on the line
    pub fn data_bits(mut self, data_bits: DataBits) -> Self {
        self.settings.data_bits = data_bits;
        self
    }

    /// Set the type of signalling to use for controlling data transfer
    pub fn flow_control(mut self, flow_control: FlowControl) -> Self {
        self.settings.flow_control = flow_control;
        self
    }

    /// Set the type of parity to use for error checking
    pub fn parity(mut self, parity: Parity) -> Self {
        self.settings.parity = parity;
        self
    }

    /// Set the number of bits to use to signal the end of a character
    pub fn stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.settings.stop_bits = stop_bits;
        self
    }

    /// Set the deadline for reading a response frame
    pub fn read_timeout(mut self, read_timeout: Duration) -> Self {
        self.settings.read_timeout = read_timeout;
        self
    }

    /// Set the transaction id. Only the two low bits fit on the wire, so
    /// values above 3 are clamped.
    pub fn transaction_id(mut self, transaction_id: u8) -> Self {
        self.settings.transaction_id = transaction_id.min(3);
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.settings.verbose = verbose;
        self
    }

    pub fn verify_digest(mut self, verify_digest: bool) -> Self {
        self.settings.verify_digest = verify_digest;
        self
    }

    pub fn show_progress(mut self, show_progress: bool) -> Self {
        self.settings.show_progress = show_progress;
        self
    }

    /// Set the path to the management app image
    pub fn mgmt_app<'a>(mut self, mgmt_app: impl Into<std::borrow::Cow<'a, str>>) -> Self {
        self.settings.mgmt_app = Some(mgmt_app.into().as_ref().to_owned());
        self
    }

    pub fn enter_uss(mut self, enter_uss: bool) -> Self {
        self.settings.enter_uss = enter_uss;
        self
    }

    /// Set the file to derive the USS from
    pub fn uss_file<'a>(mut self, uss_file: impl Into<std::borrow::Cow<'a, str>>) -> Self {
        self.settings.uss_file = Some(uss_file.into().as_ref().to_owned());
        self
    }

    pub fn finalize(self) -> Settings {
        self.settings
    }
}
impl Default for SettingsBuilder {
    fn default() -> Self {
        SettingsBuilder::new()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[test]
fn all_default() {
    let settings = SettingsBuilder::new().finalize();
    assert_eq!(
        settings,
        Settings {
            path: None,
            baud_rate: 62_500,
            data_bits: DataBits::Eight,
            flow_control: FlowControl::None,
            parity: Parity::None,
            stop_bits: StopBits::One,
            read_timeout: Duration::from_secs(2),
            transaction_id: 2,
            verbose: false,
            verify_digest: true,
            show_progress: true,
            mgmt_app: None,
            enter_uss: false,
            uss_file: None,
            _private_use_builder: (),
        }
    )
}

#[test]
fn path() {
    let settings = SettingsBuilder::new().path("/dev/ttyACM0").finalize();
    assert_eq!(settings.path.unwrap(), "/dev/ttyACM0");
}

#[test]
fn baud_rate() {
    let baud_rate = 115_200;
    let settings = SettingsBuilder::new().baud_rate(baud_rate).finalize();
    assert_eq!(settings.baud_rate, baud_rate);
}

#[test]
fn parity() {
    let parity = Parity::Even;
    let settings = SettingsBuilder::new().parity(parity).finalize();
    assert_eq!(settings.parity, parity);
}

#[test]
fn read_timeout() {
    let timeout = Duration::from_millis(500);
    let settings = SettingsBuilder::new().read_timeout(timeout).finalize();
    assert_eq!(settings.read_timeout, timeout);
}

#[test]
fn transaction_id_is_clamped() {
    let settings = SettingsBuilder::new().transaction_id(9).finalize();
    assert_eq!(settings.transaction_id, 3);
}

#[test]
fn uss_sources() {
    let settings = SettingsBuilder::new()
        .enter_uss(true)
        .uss_file("-")
        .finalize();
    assert!(settings.enter_uss);
    assert_eq!(settings.uss_file.unwrap(), "-");
}

#[test]
fn mgmt_app() {
    let settings = SettingsBuilder::new().mgmt_app("mgmt.bin").finalize();
    assert_eq!(settings.mgmt_app.unwrap(), "mgmt.bin");
}

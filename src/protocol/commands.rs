//! The command table.
//!
//! One descriptor per wire opcode, requests and responses alike. Request and
//! response of the same operation may use different length classes: the
//! application load data command answers a non-final chunk with a short
//! acknowledgment but the final chunk with a wide frame carrying the digest.
//! The transfer engine relies on that asymmetry to tell a finished transfer
//! from one that expects more data.

use std::fmt;

// =============================================================================
// Public Interface
// =============================================================================

/// Length class of a frame: the number of command bytes following the header
/// byte, opcode included.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CmdLen {
    Len1,
    Len4,
    Len32,
    Len128,
}
impl CmdLen {
    /// Number of command bytes (opcode + payload) for this class.
    pub const fn byte_len(self) -> usize {
        match self {
            CmdLen::Len1 => 1,
            CmdLen::Len4 => 4,
            CmdLen::Len32 => 32,
            CmdLen::Len128 => 128,
        }
    }

    /// The two bit code used in the frame header.
    pub(crate) const fn code(self) -> u8 {
        match self {
            CmdLen::Len1 => 0,
            CmdLen::Len4 => 1,
            CmdLen::Len32 => 2,
            CmdLen::Len128 => 3,
        }
    }

    pub(crate) fn from_code(code: u8) -> Self {
        match code & 0b11 {
            0 => CmdLen::Len1,
            1 => CmdLen::Len4,
            2 => CmdLen::Len32,
            _ => CmdLen::Len128,
        }
    }
}

/// The logical destination of a frame on the token.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Endpoint {
    /// The minimal firmware, present before any application is loaded.
    Firmware,
    /// A running application.
    Application,
}
impl Endpoint {
    pub(crate) const fn code(self) -> u8 {
        match self {
            Endpoint::Firmware => 2,
            Endpoint::Application => 3,
        }
    }

    pub(crate) fn from_code(code: u8) -> Option<Self> {
        match code {
            2 => Some(Endpoint::Firmware),
            3 => Some(Endpoint::Application),
            _ => None,
        }
    }
}

/// Immutable description of one wire command or response.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct CommandDescriptor {
    pub opcode: u8,
    pub name: &'static str,
    pub len: CmdLen,
    pub endpoint: Endpoint,
}
impl CommandDescriptor {
    const fn app(opcode: u8, name: &'static str, len: CmdLen) -> Self {
        CommandDescriptor {
            opcode,
            name,
            len,
            endpoint: Endpoint::Application,
        }
    }

    const fn fw(opcode: u8, name: &'static str, len: CmdLen) -> Self {
        CommandDescriptor {
            opcode,
            name,
            len,
            endpoint: Endpoint::Firmware,
        }
    }

    /// Total size of a frame for this descriptor, header byte included.
    pub const fn frame_len(&self) -> usize {
        1 + self.len.byte_len()
    }

    /// Number of payload bytes a frame can carry after the opcode.
    pub const fn capacity(&self) -> usize {
        self.len.byte_len() - 1
    }
}
impl fmt::Display for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// Application endpoint ========================================================

pub const APP_GET_NAME_VERSION: CommandDescriptor =
    CommandDescriptor::app(0x01, "cmdGetNameVersion", CmdLen::Len1);
pub const APP_RSP_NAME_VERSION: CommandDescriptor =
    CommandDescriptor::app(0x02, "rspGetNameVersion", CmdLen::Len32);
pub const APP_LOAD_APP: CommandDescriptor =
    CommandDescriptor::app(0x03, "cmdLoadApp", CmdLen::Len128);
pub const APP_RSP_LOAD_APP: CommandDescriptor =
    CommandDescriptor::app(0x04, "rspLoadApp", CmdLen::Len4);
pub const APP_LOAD_APP_DATA: CommandDescriptor =
    CommandDescriptor::app(0x05, "cmdLoadAppData", CmdLen::Len128);
pub const APP_RSP_LOAD_APP_DATA: CommandDescriptor =
    CommandDescriptor::app(0x06, "rspLoadAppData", CmdLen::Len4);
pub const APP_RSP_LOAD_APP_DATA_READY: CommandDescriptor =
    CommandDescriptor::app(0x07, "rspLoadAppDataReady", CmdLen::Len128);
pub const APP_DELETE_APP: CommandDescriptor =
    CommandDescriptor::app(0x08, "cmdDeleteApp", CmdLen::Len1);
pub const APP_RSP_DELETE_APP: CommandDescriptor =
    CommandDescriptor::app(0x09, "rspDeleteApp", CmdLen::Len4);
pub const APP_REGISTER_MGMT_APP: CommandDescriptor =
    CommandDescriptor::app(0x0a, "cmdRegisterMgmtApp", CmdLen::Len1);
pub const APP_RSP_REGISTER_MGMT_APP: CommandDescriptor =
    CommandDescriptor::app(0x0b, "rspRegisterMgmtApp", CmdLen::Len4);
pub const APP_UNREGISTER_MGMT_APP: CommandDescriptor =
    CommandDescriptor::app(0x0c, "cmdUnregisterMgmtApp", CmdLen::Len1);
pub const APP_RSP_UNREGISTER_MGMT_APP: CommandDescriptor =
    CommandDescriptor::app(0x0d, "rspUnregisterMgmtApp", CmdLen::Len4);
pub const APP_LOAD_APP_FLASH: CommandDescriptor =
    CommandDescriptor::app(0xf0, "cmdLoadAppFlash", CmdLen::Len1);
pub const APP_RSP_LOAD_APP_FLASH: CommandDescriptor =
    CommandDescriptor::app(0xf1, "rspLoadAppFlash", CmdLen::Len4);

// Firmware endpoint ===========================================================

pub const FW_GET_NAME_VERSION: CommandDescriptor =
    CommandDescriptor::fw(0x01, "cmdGetNameVersion", CmdLen::Len1);
pub const FW_RSP_NAME_VERSION: CommandDescriptor =
    CommandDescriptor::fw(0x02, "rspGetNameVersion", CmdLen::Len32);
pub const FW_LOAD_APP: CommandDescriptor =
    CommandDescriptor::fw(0x03, "cmdLoadApp", CmdLen::Len128);
pub const FW_RSP_LOAD_APP: CommandDescriptor =
    CommandDescriptor::fw(0x04, "rspLoadApp", CmdLen::Len4);
pub const FW_LOAD_APP_DATA: CommandDescriptor =
    CommandDescriptor::fw(0x05, "cmdLoadAppData", CmdLen::Len128);
pub const FW_RSP_LOAD_APP_DATA: CommandDescriptor =
    CommandDescriptor::fw(0x06, "rspLoadAppData", CmdLen::Len4);
pub const FW_RSP_LOAD_APP_DATA_READY: CommandDescriptor =
    CommandDescriptor::fw(0x07, "rspLoadAppDataReady", CmdLen::Len128);
pub const FW_START_APP_FLASH: CommandDescriptor =
    CommandDescriptor::fw(0xf0, "cmdStartAppFlash", CmdLen::Len1);
pub const FW_RSP_START_APP_FLASH: CommandDescriptor =
    CommandDescriptor::fw(0xf1, "rspStartAppFlash", CmdLen::Len1);

/// Every descriptor known to `tokencom`.
pub const ALL: [CommandDescriptor; 24] = [
    APP_GET_NAME_VERSION,
    APP_RSP_NAME_VERSION,
    APP_LOAD_APP,
    APP_RSP_LOAD_APP,
    APP_LOAD_APP_DATA,
    APP_RSP_LOAD_APP_DATA,
    APP_RSP_LOAD_APP_DATA_READY,
    APP_DELETE_APP,
    APP_RSP_DELETE_APP,
    APP_REGISTER_MGMT_APP,
    APP_RSP_REGISTER_MGMT_APP,
    APP_UNREGISTER_MGMT_APP,
    APP_RSP_UNREGISTER_MGMT_APP,
    APP_LOAD_APP_FLASH,
    APP_RSP_LOAD_APP_FLASH,
    FW_GET_NAME_VERSION,
    FW_RSP_NAME_VERSION,
    FW_LOAD_APP,
    FW_RSP_LOAD_APP,
    FW_LOAD_APP_DATA,
    FW_RSP_LOAD_APP_DATA,
    FW_RSP_LOAD_APP_DATA_READY,
    FW_START_APP_FLASH,
    FW_RSP_START_APP_FLASH,
];

// =============================================================================
// Unit Tests
// =============================================================================

#[test]
fn opcode_and_endpoint_are_unique() {
    for (i, a) in ALL.iter().enumerate() {
        for b in &ALL[i + 1..] {
            assert!(
                !(a.opcode == b.opcode && a.endpoint == b.endpoint),
                "{} and {} share opcode {:#04x}",
                a,
                b,
                a.opcode
            );
        }
    }
}

#[test]
fn frame_sizes_follow_length_class() {
    assert_eq!(APP_GET_NAME_VERSION.frame_len(), 2);
    assert_eq!(APP_RSP_LOAD_APP.frame_len(), 5);
    assert_eq!(APP_RSP_NAME_VERSION.frame_len(), 33);
    assert_eq!(APP_LOAD_APP_DATA.frame_len(), 129);
    assert_eq!(APP_LOAD_APP_DATA.capacity(), 127);
    assert_eq!(FW_START_APP_FLASH.capacity(), 0);
}

#[test]
fn load_data_responses_differ_in_shape() {
    assert_eq!(APP_LOAD_APP_DATA.len, CmdLen::Len128);
    assert_eq!(APP_RSP_LOAD_APP_DATA.len, CmdLen::Len4);
    assert_eq!(APP_RSP_LOAD_APP_DATA_READY.len, CmdLen::Len128);
}

#[test]
fn length_codes_round_trip() {
    for len in &[CmdLen::Len1, CmdLen::Len4, CmdLen::Len32, CmdLen::Len128] {
        assert_eq!(CmdLen::from_code(len.code()), *len);
    }
    assert_eq!(Endpoint::from_code(1), None);
}

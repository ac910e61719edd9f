//! The frame codec.
//!
//! A frame is one header byte followed by the command bytes of its length
//! class, the first of which is the opcode:
//!
//! ```text
//!   bit  7    6..5    4..3      2       1..0
//!      +----+------+--------+--------+-------+--------+-----------------+
//!      | 0  |  id  |endpoint| not OK |  len  | opcode | payload ...     |
//!      +----+------+--------+--------+-------+--------+-----------------+
//!      |<------------- header byte --------->|
//! ```
//!
//! The codec only checks frame shape. The status byte carried at the start of
//! most response payloads is left for the caller to check.

use std::convert::TryFrom;
use std::fmt;

use super::commands::{CmdLen, CommandDescriptor, Endpoint};
use crate::error::ProtocolError;

// =============================================================================
// Public Interface
// =============================================================================

/// Status byte value of a successful response.
pub const STATUS_OK: u8 = 0x00;
/// Status byte value the device uses for a refused command.
pub const STATUS_BAD: u8 = 0x01;

const RESERVED_BIT: u8 = 0x80;
const NOT_OK_BIT: u8 = 0x04;

/// Identifies a request/response pair. Only two bits are available on the
/// wire.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TransactionId(u8);
impl TransactionId {
    pub const MAX: u8 = 3;

    pub fn value(self) -> u8 {
        self.0
    }
}
impl Default for TransactionId {
    fn default() -> Self {
        TransactionId(2)
    }
}
impl TryFrom<u8> for TransactionId {
    type Error = u8;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        if id <= Self::MAX {
            Ok(TransactionId(id))
        } else {
            Err(id)
        }
    }
}

/// A complete frame, header byte included.
#[derive(Clone, Eq, PartialEq)]
pub struct Frame {
    bytes: Vec<u8>,
}
impl Frame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn id(&self) -> u8 {
        (self.bytes[0] >> 5) & 0b11
    }

    pub fn endpoint(&self) -> Option<Endpoint> {
        Endpoint::from_code((self.bytes[0] >> 3) & 0b11)
    }

    pub fn len_class(&self) -> CmdLen {
        CmdLen::from_code(self.bytes[0])
    }

    pub fn opcode(&self) -> u8 {
        self.bytes[1]
    }

    /// Everything after the opcode.
    pub fn payload(&self) -> &[u8] {
        &self.bytes[2..]
    }

    /// The status byte of a response. `None` for single byte frames which have
    /// no room for one.
    pub fn status(&self) -> Option<u8> {
        self.bytes.get(2).copied()
    }
}
impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("id", &self.id())
            .field("endpoint", &self.endpoint())
            .field("len", &self.len_class())
            .field("opcode", &format_args!("{:#04x}", self.opcode()))
            .finish()
    }
}

/// Build the header byte for a frame.
pub fn header(id: TransactionId, endpoint: Endpoint, len: CmdLen) -> u8 {
    (id.value() << 5) | (endpoint.code() << 3) | len.code()
}

/// Number of bytes following a header byte, as announced by its length class.
pub fn announced_len(header: u8) -> usize {
    CmdLen::from_code(header).byte_len()
}

/// Encode a request frame for `cmd`. Unused payload bytes are zero.
///
/// # Panics
///
/// If `payload` is larger than the capacity of the command's length class.
/// That is a bug in the caller, never a runtime condition.
pub fn encode(cmd: &CommandDescriptor, id: TransactionId, payload: &[u8]) -> Frame {
    assert!(
        payload.len() <= cmd.capacity(),
        "{} payload of {} bytes exceeds capacity of {}",
        cmd,
        payload.len(),
        cmd.capacity()
    );

    let mut bytes = vec![0; cmd.frame_len()];
    bytes[0] = header(id, cmd.endpoint, cmd.len);
    bytes[1] = cmd.opcode;
    bytes[2..2 + payload.len()].copy_from_slice(payload);
    Frame { bytes }
}

/// Check that `raw` is a well formed response matching `expected` and
/// `expected_id`.
pub fn decode_and_verify(
    raw: &[u8],
    expected: &CommandDescriptor,
    expected_id: TransactionId,
) -> Result<Frame, ProtocolError> {
    let mismatch = |reason: String| ProtocolError::UnexpectedResponse {
        command: expected.name,
        reason,
    };

    let hdr = match raw.first() {
        Some(hdr) => *hdr,
        None => return Err(mismatch("empty frame".into())),
    };
    if hdr & RESERVED_BIT != 0 {
        return Err(mismatch(format!("reserved header bit set in {:#04x}", hdr)));
    }
    if hdr & NOT_OK_BIT != 0 {
        return Err(mismatch("response status not OK".into()));
    }

    let len = CmdLen::from_code(hdr);
    if len != expected.len {
        return Err(mismatch(format!(
            "expected cmdlen {:?}, got {:?}",
            expected.len, len
        )));
    }
    if raw.len() != expected.frame_len() {
        return Err(mismatch(format!(
            "expected {} bytes, got {}",
            expected.frame_len(),
            raw.len()
        )));
    }

    let frame = Frame {
        bytes: raw.to_vec(),
    };
    if frame.id() != expected_id.value() {
        return Err(mismatch(format!(
            "expected id {}, got {}",
            expected_id.value(),
            frame.id()
        )));
    }
    if frame.endpoint() != Some(expected.endpoint) {
        return Err(mismatch(format!(
            "expected endpoint {:?}, got {:?}",
            expected.endpoint,
            frame.endpoint()
        )));
    }
    if frame.opcode() != expected.opcode {
        return Err(mismatch(format!("got opcode {:#04x}", frame.opcode())));
    }

    Ok(frame)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::commands::{self, *};

    fn id() -> TransactionId {
        TransactionId::default()
    }

    #[test]
    fn encode_sets_header_and_pads_payload() {
        let frame = encode(&APP_LOAD_APP, id(), &[1, 2, 3]);
        let bytes = frame.as_bytes();
        assert_eq!(bytes.len(), 129);
        // id 2, application endpoint, 128 byte class
        assert_eq!(bytes[0], 0b0101_1011);
        assert_eq!(bytes[1], 0x03);
        assert_eq!(&bytes[2..5], &[1, 2, 3]);
        assert!(bytes[5..].iter().all(|b| *b == 0));
    }

    #[test]
    fn firmware_header() {
        let frame = encode(&FW_START_APP_FLASH, id(), &[]);
        assert_eq!(frame.as_bytes(), &[0b0101_0000, 0xf0]);
        assert_eq!(frame.endpoint(), Some(Endpoint::Firmware));
        assert_eq!(frame.status(), None);
    }

    #[test]
    fn decode_recovers_encoded_fields() {
        let bytes: Vec<u8> = (1..=20).collect();
        for cmd in commands::ALL.iter() {
            let n = cmd.capacity().min(bytes.len());
            let payload = &bytes[..n];
            let frame = encode(cmd, id(), payload);
            let decoded = decode_and_verify(frame.as_bytes(), cmd, id()).unwrap();
            assert_eq!(decoded.opcode(), cmd.opcode, "{}", cmd);
            assert_eq!(decoded.id(), 2);
            assert_eq!(decoded.endpoint(), Some(cmd.endpoint));
            assert_eq!(decoded.len_class(), cmd.len);
            assert_eq!(decoded.payload().len(), cmd.capacity());
            assert_eq!(&decoded.payload()[..n], payload);
            assert!(decoded.payload()[n..].iter().all(|b| *b == 0));
        }
    }

    #[test]
    #[should_panic(expected = "exceeds capacity")]
    fn oversized_payload_is_a_bug() {
        encode(&APP_RSP_LOAD_APP, id(), &[0; 4]);
    }

    #[test]
    fn wrong_id_is_rejected() {
        let frame = encode(&APP_RSP_DELETE_APP, TransactionId::try_from(1).unwrap(), &[0]);
        let err = decode_and_verify(frame.as_bytes(), &APP_RSP_DELETE_APP, id()).unwrap_err();
        assert!(matches!(err, ProtocolError::UnexpectedResponse { .. }));
    }

    #[test]
    fn wrong_opcode_is_rejected() {
        let frame = encode(&APP_RSP_REGISTER_MGMT_APP, id(), &[0]);
        assert!(decode_and_verify(frame.as_bytes(), &APP_RSP_DELETE_APP, id()).is_err());
    }

    #[test]
    fn wrong_length_class_is_rejected() {
        let frame = encode(&APP_RSP_LOAD_APP_DATA, id(), &[0]);
        let err =
            decode_and_verify(frame.as_bytes(), &APP_RSP_LOAD_APP_DATA_READY, id()).unwrap_err();
        match err {
            ProtocolError::UnexpectedResponse { command, reason } => {
                assert_eq!(command, "rspLoadAppDataReady");
                assert!(reason.contains("cmdlen"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let frame = encode(&APP_RSP_NAME_VERSION, id(), &[]);
        let raw = &frame.as_bytes()[..10];
        assert!(decode_and_verify(raw, &APP_RSP_NAME_VERSION, id()).is_err());
        assert!(decode_and_verify(&[], &APP_RSP_NAME_VERSION, id()).is_err());
    }

    #[test]
    fn not_ok_header_is_rejected() {
        // What an application answers to a firmware probe.
        let hdr = header(id(), Endpoint::Firmware, CmdLen::Len1) | NOT_OK_BIT;
        let err = decode_and_verify(&[hdr, 0], &FW_RSP_NAME_VERSION, id()).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::UnexpectedResponse {
                command: "rspGetNameVersion",
                reason: "response status not OK".into()
            }
        );
    }

    #[test]
    fn status_byte_is_not_interpreted() {
        let frame = encode(&APP_RSP_DELETE_APP, id(), &[STATUS_BAD]);
        let decoded = decode_and_verify(frame.as_bytes(), &APP_RSP_DELETE_APP, id()).unwrap();
        assert_eq!(decoded.status(), Some(STATUS_BAD));
    }

    #[test]
    fn transaction_id_has_two_bits() {
        assert!(TransactionId::try_from(3).is_ok());
        assert_eq!(TransactionId::try_from(4), Err(4));
    }
}

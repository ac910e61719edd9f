//! The chunked transfer engine.
//!
//! An application binary is moved to the token in two steps:
//!
//!  1. A `LoadApp` request announces the total size and carries the optional
//!     user supplied secret.
//!  2. The binary follows in `LoadAppData` frames of up to 127 source bytes
//!     each, the last one zero padded. Every chunk but the last is answered
//!     with a short acknowledgment; the last one is answered with the wide
//!     "ready" frame carrying the digest the device computed.
//!
//! The same engine serves the firmware endpoint (loading the management app)
//! and the application endpoint (installing an app through the management
//! app). Only the command descriptors differ.

use std::cmp;
use std::convert::TryFrom;

use blake2::{Blake2s256, Digest as _};
use indicatif::ProgressBar;
use log::{debug, trace};

use super::commands::{self, CommandDescriptor};
use super::frame::{Frame, STATUS_OK};
use super::{Digest, DIGEST_LEN, MAX_APP_SIZE};
use crate::error::{PreconditionError, ProtocolError, Result};
use crate::secret::Secret;

// =============================================================================
// Public Interface
// =============================================================================

/// Anything able to run one request/response exchange with the token.
pub trait Exchange {
    /// Send `cmd` carrying `payload` and wait for exactly one response
    /// matching `rsp`.
    fn exchange(
        &mut self,
        cmd: &CommandDescriptor,
        payload: &[u8],
        rsp: &CommandDescriptor,
    ) -> Result<Frame>;
}

/// The descriptors driving one transfer.
#[derive(Debug, Copy, Clone)]
pub struct LoadCommands {
    pub load: CommandDescriptor,
    pub load_rsp: CommandDescriptor,
    pub data: CommandDescriptor,
    pub data_rsp: CommandDescriptor,
    pub data_ready: CommandDescriptor,
}
impl LoadCommands {
    /// Installing an app through the management app.
    pub const APPLICATION: LoadCommands = LoadCommands {
        load: commands::APP_LOAD_APP,
        load_rsp: commands::APP_RSP_LOAD_APP,
        data: commands::APP_LOAD_APP_DATA,
        data_rsp: commands::APP_RSP_LOAD_APP_DATA,
        data_ready: commands::APP_RSP_LOAD_APP_DATA_READY,
    };

    /// Loading an app straight into the firmware.
    pub const FIRMWARE: LoadCommands = LoadCommands {
        load: commands::FW_LOAD_APP,
        load_rsp: commands::FW_RSP_LOAD_APP,
        data: commands::FW_LOAD_APP_DATA,
        data_rsp: commands::FW_RSP_LOAD_APP_DATA,
        data_ready: commands::FW_RSP_LOAD_APP_DATA_READY,
    };

    /// Number of source bytes carried by one data frame.
    pub fn chunk_capacity(&self) -> usize {
        self.data.capacity()
    }
}

/// One slice of the binary, as sent in a single data frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Chunk<'a> {
    pub data: &'a [u8],
    /// Set on the last chunk only. The device answers it with the digest.
    pub last: bool,
}

/// Splits a binary into chunks of at most `capacity` bytes.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    binary: &'a [u8],
    offset: usize,
    capacity: usize,
}
impl<'a> Chunks<'a> {
    pub fn new(binary: &'a [u8], capacity: usize) -> Self {
        assert!(capacity > 0, "chunk capacity must not be zero");
        Chunks {
            binary,
            offset: 0,
            capacity,
        }
    }
}
impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = self.binary.len() - self.offset;
        if remaining == 0 {
            return None;
        }
        let take = cmp::min(self.capacity, remaining);
        let data = &self.binary[self.offset..self.offset + take];
        self.offset += take;
        Some(Chunk {
            data,
            last: remaining <= self.capacity,
        })
    }
}

/// Bookkeeping for one transfer. Created at the start of an install and
/// dropped at its end, whatever the outcome.
#[derive(Debug, Eq, PartialEq)]
pub struct TransferState {
    pub offset: usize,
    pub total_len: usize,
    pub last_digest: Option<Digest>,
}
impl TransferState {
    pub fn new(total_len: usize) -> Self {
        TransferState {
            offset: 0,
            total_len,
            last_digest: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.offset >= self.total_len
    }

    /// Account for `consumed` source bytes.
    pub fn advance(&mut self, consumed: usize) -> std::result::Result<(), ProtocolError> {
        self.offset += consumed;
        if self.offset > self.total_len {
            return Err(ProtocolError::TransferOverrun {
                sent: self.offset,
                total: self.total_len,
            });
        }
        Ok(())
    }

    /// Close the books: everything sent exactly once and a digest received.
    pub fn finish(self, command: &'static str) -> std::result::Result<Digest, ProtocolError> {
        if self.offset != self.total_len {
            return Err(ProtocolError::TransferOverrun {
                sent: self.offset,
                total: self.total_len,
            });
        }
        self.last_digest
            .ok_or_else(|| ProtocolError::UnexpectedResponse {
                command,
                reason: "transfer ended without a digest".into(),
            })
    }
}

/// Reject binaries the token cannot take, before any I/O.
pub fn check_size(len: usize) -> std::result::Result<(), PreconditionError> {
    if len == 0 {
        return Err(PreconditionError::EmptyApp);
    }
    if len > MAX_APP_SIZE {
        return Err(PreconditionError::AppTooLarge {
            size: len,
            max: MAX_APP_SIZE,
        });
    }
    Ok(())
}

/// The digest the device is expected to report for `binary`.
pub fn app_digest(binary: &[u8]) -> Digest {
    let mut digest = [0; DIGEST_LEN];
    digest.copy_from_slice(&Blake2s256::digest(binary));
    digest
}

/// Payload of the `LoadApp` request: size (little endian), secret flag and
/// the secret itself when present.
pub fn load_payload(size: usize, secret: Option<&Secret>) -> Vec<u8> {
    let size = u32::try_from(size).unwrap_or(u32::MAX);
    let mut payload = Vec::with_capacity(5 + DIGEST_LEN);
    payload.extend_from_slice(&size.to_le_bytes());
    match secret {
        Some(secret) => {
            payload.push(1);
            payload.extend_from_slice(secret.as_bytes());
        }
        None => payload.push(0),
    }
    payload
}

/// Fail with `DeviceRejected` unless the response status byte is OK.
pub fn check_status(
    rsp: &Frame,
    command: &CommandDescriptor,
    reason: &'static str,
) -> std::result::Result<(), ProtocolError> {
    match rsp.status() {
        Some(STATUS_OK) => Ok(()),
        _ => Err(ProtocolError::DeviceRejected {
            command: command.name,
            reason,
        }),
    }
}

/// Announce a binary of `size` bytes to the device.
pub fn begin<E: Exchange>(
    link: &mut E,
    commands: &LoadCommands,
    size: usize,
    secret: Option<&Secret>,
) -> Result<()> {
    debug!(
        "app size: {}, {:#x}, uss: {}",
        size,
        size,
        if secret.is_some() { "yes" } else { "no" }
    );
    let rsp = link.exchange(
        &commands.load,
        &load_payload(size, secret),
        &commands.load_rsp,
    )?;
    check_status(&rsp, &commands.load, "size or secret not accepted")?;
    Ok(())
}

/// Send the whole binary in data frames and return the digest the device
/// reports for it. Stops at the first chunk the device does not accept.
pub fn send<E: Exchange>(
    link: &mut E,
    commands: &LoadCommands,
    binary: &[u8],
    progress: &ProgressBar,
) -> Result<Digest> {
    let mut state = TransferState::new(binary.len());

    for chunk in Chunks::new(binary, commands.chunk_capacity()) {
        let expected = if chunk.last {
            &commands.data_ready
        } else {
            &commands.data_rsp
        };
        trace!(
            "chunk at offset {}: {} bytes{}",
            state.offset,
            chunk.data.len(),
            if chunk.last { " (last)" } else { "" }
        );

        let rsp = link.exchange(&commands.data, chunk.data, expected)?;
        check_status(&rsp, &commands.data, "chunk not accepted")?;
        if chunk.last {
            let mut digest = [0; DIGEST_LEN];
            digest.copy_from_slice(&rsp.payload()[1..1 + DIGEST_LEN]);
            state.last_digest = Some(digest);
        }

        state.advance(chunk.data.len())?;
        progress.set_position(state.offset as u64);
    }

    debug_assert!(state.is_complete());
    Ok(state.finish(commands.data_ready.name)?)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::{self, TransactionId, STATUS_BAD};
    use crate::secret::derive_secret;

    /// Answers every data frame like the device would, recording what it got.
    struct Recorder {
        sent: Vec<(CommandDescriptor, Vec<u8>, CommandDescriptor)>,
        reject_at: Option<usize>,
        digest: Digest,
    }
    impl Recorder {
        fn new() -> Self {
            Recorder {
                sent: Vec::new(),
                reject_at: None,
                digest: [0xab; DIGEST_LEN],
            }
        }
    }
    impl Exchange for Recorder {
        fn exchange(
            &mut self,
            cmd: &CommandDescriptor,
            payload: &[u8],
            rsp: &CommandDescriptor,
        ) -> Result<Frame> {
            let id = TransactionId::default();
            let tx = frame::encode(cmd, id, payload);
            let index = self.sent.len();
            self.sent.push((*cmd, tx.payload().to_vec(), *rsp));

            let status = if self.reject_at == Some(index) {
                STATUS_BAD
            } else {
                STATUS_OK
            };
            let mut body = vec![status];
            if rsp.capacity() > DIGEST_LEN {
                body.extend_from_slice(&self.digest);
            }
            Ok(frame::encode(rsp, id, &body))
        }
    }

    fn send_binary(recorder: &mut Recorder, binary: &[u8]) -> Result<Digest> {
        send(
            recorder,
            &LoadCommands::APPLICATION,
            binary,
            &ProgressBar::hidden(),
        )
    }

    #[test]
    fn chunk_count_and_sizes() {
        let capacity = 127;
        for len in &[1, 126, 127, 128, 254, 255, 1000, MAX_APP_SIZE] {
            let binary = vec![7u8; *len];
            let chunks: Vec<Chunk> = Chunks::new(&binary, capacity).collect();
            assert_eq!(chunks.len(), (len + capacity - 1) / capacity, "len {}", len);
            assert_eq!(chunks.iter().map(|c| c.data.len()).sum::<usize>(), *len);
            let last: Vec<bool> = chunks.iter().map(|c| c.last).collect();
            assert_eq!(last.iter().filter(|l| **l).count(), 1);
            assert_eq!(last.last(), Some(&true));
        }
    }

    #[test]
    fn empty_binary_has_no_chunks() {
        assert_eq!(Chunks::new(&[], 127).count(), 0);
    }

    #[test]
    fn exactly_one_capacity_is_one_final_chunk() {
        let binary: Vec<u8> = (0..127).map(|b| b as u8).collect();
        let mut recorder = Recorder::new();
        let digest = send_binary(&mut recorder, &binary).unwrap();

        assert_eq!(digest, [0xab; DIGEST_LEN]);
        assert_eq!(recorder.sent.len(), 1);
        let (cmd, payload, rsp) = &recorder.sent[0];
        assert_eq!(*cmd, commands::APP_LOAD_APP_DATA);
        assert_eq!(*rsp, commands::APP_RSP_LOAD_APP_DATA_READY);
        assert_eq!(payload, &binary);
    }

    #[test]
    fn one_byte_over_capacity_is_two_chunks() {
        let binary = vec![0x5a; 128];
        let mut recorder = Recorder::new();
        send_binary(&mut recorder, &binary).unwrap();

        assert_eq!(recorder.sent.len(), 2);
        let (_, first, first_rsp) = &recorder.sent[0];
        assert_eq!(first.as_slice(), &binary[..127]);
        assert_eq!(*first_rsp, commands::APP_RSP_LOAD_APP_DATA);

        let (_, second, second_rsp) = &recorder.sent[1];
        assert_eq!(second.len(), 127);
        assert_eq!(second[0], 0x5a);
        assert!(second[1..].iter().all(|b| *b == 0));
        assert_eq!(*second_rsp, commands::APP_RSP_LOAD_APP_DATA_READY);
    }

    #[test]
    fn only_the_last_chunk_expects_the_ready_response() {
        let binary = vec![1u8; 127 * 5 + 3];
        let mut recorder = Recorder::new();
        send_binary(&mut recorder, &binary).unwrap();

        let ready: Vec<bool> = recorder
            .sent
            .iter()
            .map(|(_, _, rsp)| *rsp == commands::APP_RSP_LOAD_APP_DATA_READY)
            .collect();
        assert_eq!(ready, vec![false, false, false, false, false, true]);
    }

    #[test]
    fn rejected_chunk_aborts_the_transfer() {
        let binary = vec![1u8; 127 * 4];
        let mut recorder = Recorder::new();
        recorder.reject_at = Some(1);

        let err = send_binary(&mut recorder, &binary).unwrap_err();
        assert!(err.is_device_rejection());
        assert_eq!(recorder.sent.len(), 2);
    }

    #[test]
    fn rejected_final_chunk_aborts_the_transfer() {
        let binary = vec![1u8; 10];
        let mut recorder = Recorder::new();
        recorder.reject_at = Some(0);
        assert!(send_binary(&mut recorder, &binary)
            .unwrap_err()
            .is_device_rejection());
    }

    #[test]
    fn state_detects_overrun() {
        let mut state = TransferState::new(10);
        state.advance(8).unwrap();
        assert_eq!(
            state.advance(3),
            Err(ProtocolError::TransferOverrun { sent: 11, total: 10 })
        );
    }

    #[test]
    fn state_needs_a_digest_to_finish() {
        let mut state = TransferState::new(4);
        state.advance(4).unwrap();
        assert!(state.finish("rspLoadAppDataReady").is_err());

        let mut state = TransferState::new(4);
        state.advance(4).unwrap();
        state.last_digest = Some([1; DIGEST_LEN]);
        assert_eq!(state.finish("rspLoadAppDataReady"), Ok([1; DIGEST_LEN]));
    }

    #[test]
    fn size_limits() {
        assert!(matches!(check_size(0), Err(PreconditionError::EmptyApp)));
        assert!(check_size(1).is_ok());
        assert!(check_size(MAX_APP_SIZE).is_ok());
        assert!(matches!(
            check_size(MAX_APP_SIZE + 1),
            Err(PreconditionError::AppTooLarge { .. })
        ));
    }

    #[test]
    fn load_payload_layout() {
        let payload = load_payload(0x0001_0203, None);
        assert_eq!(payload, vec![0x03, 0x02, 0x01, 0x00, 0]);

        let secret = derive_secret(b"correct horse");
        let payload = load_payload(300, Some(&secret));
        assert_eq!(&payload[..5], &[0x2c, 0x01, 0, 0, 1]);
        assert_eq!(&payload[5..], secret.as_bytes());
    }

    #[test]
    fn begin_checks_status() {
        let mut recorder = Recorder::new();
        begin(&mut recorder, &LoadCommands::FIRMWARE, 42, None).unwrap();
        assert_eq!(recorder.sent[0].0, commands::FW_LOAD_APP);

        let mut recorder = Recorder::new();
        recorder.reject_at = Some(0);
        assert!(begin(&mut recorder, &LoadCommands::FIRMWARE, 42, None)
            .unwrap_err()
            .is_device_rejection());
    }
}

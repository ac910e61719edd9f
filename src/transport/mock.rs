//! A simulated token for tests.
//!
//! [`MockToken`] plays both the firmware and the management app closely
//! enough to exercise every exchange: it parses each request frame written to
//! it, updates its state and queues the response bytes, which the session
//! then reads back. Knobs allow injecting the failures a real device can
//! produce.

use std::collections::VecDeque;
use std::convert::TryInto;
use std::time::Duration;

use super::{Connect, Transport};
use crate::error::{Result, TransportError};
use crate::protocol::commands::{self, CmdLen, CommandDescriptor, Endpoint};
use crate::protocol::transfer::app_digest;
use crate::protocol::{frame, MAX_APP_SIZE, STATUS_BAD, STATUS_OK};
use crate::settings::Settings;

/// What the token is currently running.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum Running {
    Firmware,
    MgmtApp,
    OtherApp,
}

#[derive(Debug, Default)]
struct Loading {
    size: usize,
    data: Vec<u8>,
    uss: Option<[u8; 32]>,
}

#[derive(Debug)]
pub(crate) struct MockToken {
    pub running: Running,
    pub installed: Option<Vec<u8>>,
    pub installed_uss: Option<[u8; 32]>,
    pub registered: bool,
    /// Every frame written by the host, in order.
    pub sent: Vec<Vec<u8>>,
    /// Answer the data chunk with this index with a bad status.
    pub reject_chunk: Option<usize>,
    /// Report an all-zero digest, like a management app without digest
    /// support.
    pub zero_digest: bool,
    /// Report a digest that does not match the received data.
    pub corrupt_digest: bool,
    /// Answer with this transaction id instead of the request's.
    pub answer_id: Option<u8>,
    /// Swallow requests without answering.
    pub mute: bool,
    pub closed: bool,
    loading: Option<Loading>,
    chunks: usize,
    rx: VecDeque<u8>,
}
impl MockToken {
    pub fn new(running: Running) -> Self {
        MockToken {
            running,
            installed: None,
            installed_uss: None,
            registered: false,
            sent: Vec::new(),
            reject_chunk: None,
            zero_digest: false,
            corrupt_digest: false,
            answer_id: None,
            mute: false,
            closed: false,
            loading: None,
            chunks: 0,
            rx: VecDeque::new(),
        }
    }

    pub fn firmware() -> Self {
        MockToken::new(Running::Firmware)
    }

    pub fn mgmt_app() -> Self {
        MockToken::new(Running::MgmtApp)
    }

    /// Opcodes of all frames written so far.
    pub fn opcodes(&self) -> Vec<u8> {
        self.sent.iter().map(|f| f[1]).collect()
    }

    fn reply(&mut self, request_hdr: u8, rsp: &CommandDescriptor, body: &[u8]) {
        let id = self.answer_id.unwrap_or((request_hdr >> 5) & 0b11);
        let rsp_frame = frame::encode(rsp, id.try_into().unwrap(), body);
        self.rx.extend(rsp_frame.as_bytes());
    }

    /// What an app answers to a frame for the firmware: not OK, one byte.
    fn reply_nok(&mut self, request_hdr: u8) {
        let hdr = (request_hdr & 0b0111_1000) | 0b100 | CmdLen::Len1.code();
        self.rx.extend(&[hdr, 0]);
    }

    fn handle(&mut self, tx: &[u8]) {
        let hdr = tx[0];
        let endpoint = Endpoint::from_code((hdr >> 3) & 0b11);
        match (self.running, endpoint) {
            (Running::Firmware, Some(Endpoint::Firmware)) => self.handle_firmware(hdr, tx),
            (Running::Firmware, _) => {}
            (_, Some(Endpoint::Firmware)) => self.reply_nok(hdr),
            (Running::MgmtApp, Some(Endpoint::Application)) => {
                self.handle_mgmt_app(hdr, tx)
            }
            (Running::OtherApp, Some(Endpoint::Application)) => {
                if tx[1] == commands::APP_GET_NAME_VERSION.opcode {
                    let body = name_version(b"tk1 ", b"sign", 3);
                    self.reply(hdr, &commands::APP_RSP_NAME_VERSION, &body);
                }
            }
            _ => {}
        }
    }

    fn handle_firmware(&mut self, hdr: u8, tx: &[u8]) {
        match tx[1] {
            0x01 => {
                let body = name_version(b"tk1 ", b"mkdf", 5);
                self.reply(hdr, &commands::FW_RSP_NAME_VERSION, &body);
            }
            0x03 => self.begin_load(hdr, tx, &commands::FW_RSP_LOAD_APP),
            0x05 => {
                let ack = &commands::FW_RSP_LOAD_APP_DATA;
                if self.load_data(hdr, tx, ack, &commands::FW_RSP_LOAD_APP_DATA_READY) {
                    // The firmware starts the loaded app.
                    self.running = Running::MgmtApp;
                }
            }
            0xf0 => {
                self.reply(hdr, &commands::FW_RSP_START_APP_FLASH, &[]);
                if self.installed.is_some() {
                    self.running = Running::OtherApp;
                }
            }
            _ => {}
        }
    }

    fn handle_mgmt_app(&mut self, hdr: u8, tx: &[u8]) {
        match tx[1] {
            0x01 => {
                let body = name_version(b"tk1 ", b"mgmt", 1);
                self.reply(hdr, &commands::APP_RSP_NAME_VERSION, &body);
            }
            0x03 => self.begin_load(hdr, tx, &commands::APP_RSP_LOAD_APP),
            0x05 => {
                let ack = &commands::APP_RSP_LOAD_APP_DATA;
                self.load_data(hdr, tx, ack, &commands::APP_RSP_LOAD_APP_DATA_READY);
            }
            0x08 => {
                let status = if self.installed.take().is_some() {
                    STATUS_OK
                } else {
                    STATUS_BAD
                };
                self.reply(hdr, &commands::APP_RSP_DELETE_APP, &[status]);
            }
            0x0a => {
                let status = if self.registered { STATUS_BAD } else { STATUS_OK };
                self.registered = true;
                self.reply(hdr, &commands::APP_RSP_REGISTER_MGMT_APP, &[status]);
            }
            0x0c => {
                let status = if self.registered { STATUS_OK } else { STATUS_BAD };
                self.registered = false;
                self.reply(hdr, &commands::APP_RSP_UNREGISTER_MGMT_APP, &[status]);
            }
            0xf0 => {
                let status = if self.installed.is_some() {
                    STATUS_OK
                } else {
                    STATUS_BAD
                };
                self.reply(hdr, &commands::APP_RSP_LOAD_APP_FLASH, &[status]);
            }
            _ => {}
        }
    }

    fn begin_load(&mut self, hdr: u8, tx: &[u8], rsp: &CommandDescriptor) {
        let size = u32::from_le_bytes(tx[2..6].try_into().unwrap()) as usize;
        if size == 0 || size > MAX_APP_SIZE {
            self.reply(hdr, rsp, &[STATUS_BAD]);
            return;
        }
        let uss = if tx[6] != 0 {
            Some(tx[7..39].try_into().unwrap())
        } else {
            None
        };
        self.loading = Some(Loading {
            size,
            data: Vec::with_capacity(size),
            uss,
        });
        self.chunks = 0;
        self.reply(hdr, rsp, &[STATUS_OK]);
    }

    /// Returns `true` once the last chunk was stored.
    fn load_data(
        &mut self,
        hdr: u8,
        tx: &[u8],
        ack: &CommandDescriptor,
        ready: &CommandDescriptor,
    ) -> bool {
        let index = self.chunks;
        self.chunks += 1;
        let mut loading = match self.loading.take() {
            Some(loading) => loading,
            None => return false,
        };

        let left = loading.size - loading.data.len();
        let take = std::cmp::min(left, commands::APP_LOAD_APP_DATA.capacity());
        loading.data.extend_from_slice(&tx[2..2 + take]);
        let done = loading.data.len() == loading.size;
        let rsp = if done { ready } else { ack };

        if self.reject_chunk == Some(index) {
            self.reply(hdr, rsp, &[STATUS_BAD]);
            return false;
        }

        if !done {
            self.loading = Some(loading);
            self.reply(hdr, rsp, &[STATUS_OK]);
            return false;
        }

        let mut digest = if self.zero_digest {
            [0; 32]
        } else {
            app_digest(&loading.data)
        };
        if self.corrupt_digest {
            digest[0] ^= 0xff;
        }
        let mut body = vec![STATUS_OK];
        body.extend_from_slice(&digest);
        self.reply(hdr, rsp, &body);
        self.installed = Some(loading.data);
        self.installed_uss = loading.uss;
        true
    }
}
impl Transport for MockToken {
    fn write(&mut self, bytes: &[u8]) -> std::result::Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.sent.push(bytes.to_vec());
        if !self.mute {
            self.handle(bytes);
        }
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> std::result::Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if self.rx.len() < buf.len() {
            self.rx.clear();
            return Err(TransportError::Timeout);
        }
        for b in buf.iter_mut() {
            *b = self.rx.pop_front().unwrap();
        }
        Ok(())
    }

    fn set_read_timeout(
        &mut self,
        _timeout: Option<Duration>,
    ) -> std::result::Result<(), TransportError> {
        Ok(())
    }

    fn close(&mut self) -> std::result::Result<(), TransportError> {
        self.closed = true;
        Ok(())
    }
}
impl Connect for MockToken {
    fn connect(_settings: &Settings) -> Result<Self> {
        Ok(MockToken::firmware())
    }
}

fn name_version(name0: &[u8; 4], name1: &[u8; 4], version: u32) -> Vec<u8> {
    let mut body = Vec::with_capacity(12);
    body.extend_from_slice(name0);
    body.extend_from_slice(name1);
    body.extend_from_slice(&version.to_le_bytes());
    body
}

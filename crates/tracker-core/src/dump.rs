//! Dump container — accumulates a tracker block's body and footer,
//! validates its integrity, and serializes it for upload to the server.
//!
//! Ground truth: `galileo/dump.py::TrackerBlock`/`Dump`/`DumpResponse`.

use crate::bytes::{lsb_to_u64, to_base64};
use crate::crc::Crc16;
use crate::slip::{unescape_first, EscapeTally, ResponseChunks};
use crate::SyncError;

pub const MICRODUMP: u16 = 3;
pub const MEGADUMP: u16 = 13;

/// An in-progress or sealed tracker block: accumulated body bytes, the
/// footer packet once it arrives, a streaming CRC, and the SLIP1 escape
/// tally.
#[derive(Debug, Clone)]
pub struct Dump {
    declared_type: u16,
    data: Vec<u8>,
    footer: Vec<u8>,
    crc: Crc16,
    esc: EscapeTally,
}

impl Dump {
    pub fn new(declared_type: u16) -> Self {
        Self {
            declared_type,
            data: Vec::new(),
            footer: Vec::new(),
            crc: Crc16::dump_default(),
            esc: [0, 0],
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn escape_tally(&self) -> EscapeTally {
        self.esc
    }

    /// Feed one incoming 32-byte data packet's logical payload into the
    /// dump. A packet beginning with 0xC0 is the footer and seals the dump;
    /// every other packet is unescaped and appended to the body.
    pub fn add(&mut self, packet: &[u8]) {
        if packet.first() == Some(&0xC0) {
            if self.footer.is_empty() {
                self.footer = packet.to_vec();
            }
            return;
        }
        let unescaped = unescape_first(packet, &mut self.esc);
        self.crc.update(&unescaped);
        self.data.extend_from_slice(&unescaped);
    }

    /// Validate footer presence, declared type, body length, and CRC.
    /// Reports the first failing check via `SyncError::InvalidDump`.
    pub fn is_valid(&self) -> Result<(), SyncError> {
        if self.footer.is_empty() {
            return Err(SyncError::InvalidDump("no footer received".into()));
        }
        let footer_type = self.footer[2] as u16;
        if footer_type != self.declared_type {
            return Err(SyncError::InvalidDump(format!(
                "dump is not of requested type: {:#x} != {:#x}",
                footer_type, self.declared_type
            )));
        }
        let declared_len = lsb_to_u64(&self.footer[5..self.footer.len().min(9)]) as usize;
        if declared_len != self.data.len() {
            return Err(SyncError::InvalidDump(format!(
                "expected length {} bytes, received {} bytes",
                declared_len,
                self.data.len()
            )));
        }
        let expected_crc = lsb_to_u64(&self.footer[3..5]) as u16;
        let actual_crc = self.crc.finalize();
        if expected_crc != actual_crc {
            return Err(SyncError::InvalidDump(format!(
                "expected CRC {:#06x}, received {:#06x}",
                actual_crc, expected_crc
            )));
        }
        Ok(())
    }

    /// `base64(body || footer)`.
    pub fn to_base64(&self) -> String {
        to_base64(&self.bytes())
    }

    /// `body || footer`, for archival to a persisted hex file.
    pub fn bytes(&self) -> Vec<u8> {
        let mut combined = self.data.clone();
        combined.extend_from_slice(&self.footer);
        combined
    }

    /// `data[0]`, if the dump is long enough.
    pub fn megadump_type(&self) -> Option<u8> {
        self.data.first().copied()
    }

    /// `u16_le(data[4..6])`, if the dump is long enough.
    pub fn encryption(&self) -> Option<u16> {
        self.data.get(4..6).map(|s| lsb_to_u64(s) as u16)
    }

    /// `data[6..10]`, if the dump is long enough.
    pub fn nonce(&self) -> Option<&[u8]> {
        self.data.get(6..10)
    }

    /// Hex of `data[10..16]`, if the dump is long enough.
    pub fn serial(&self) -> Option<String> {
        self.data.get(10..16).map(crate::bytes::to_hex_compact)
    }

    /// `data[15]`, if the dump is long enough.
    pub fn tracker_type(&self) -> Option<u8> {
        self.data.get(15).copied()
    }
}

/// Chunk an outgoing response payload for upload, escaping framing bytes
/// at chunk boundaries. The standard upload chunk length is 20 bytes.
pub fn response_chunks(data: &[u8], chunk_len: usize) -> Vec<Vec<u8>> {
    ResponseChunks::new(data, chunk_len).collect()
}

//! Wire message types for the two dongle endpoints.
//!
//! `CtrlMessage` and `DataMessage` are kept as plain structs with explicit
//! `to_bytes`/`from_bytes` methods rather than a `repr(C, packed)` /
//! zerocopy layout: both wire shapes carry a length byte that is
//! data-dependent (for `DataMessage`, it trails the padding rather than
//! leading it), which a fixed memory layout cannot express directly.

use crate::SyncError;

/// A control-channel message: `[len, INS, ...payload]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CtrlMessage {
    pub ins: u8,
    pub payload: Vec<u8>,
}

impl CtrlMessage {
    pub fn new(ins: u8, payload: Vec<u8>) -> Self {
        Self { ins, payload }
    }

    /// Serialize as `[len, ins, ...payload]`; `len` counts `ins` plus
    /// `payload` (matches the dongle's own accounting).
    pub fn to_bytes(&self) -> Vec<u8> {
        let len = (self.payload.len() + 1) as u8;
        let mut out = Vec::with_capacity(2 + self.payload.len());
        out.push(len);
        out.push(self.ins);
        out.extend_from_slice(&self.payload);
        out
    }

    /// Parse a control-channel read buffer (the length prefix is the
    /// buffer's own first byte).
    pub fn from_bytes(buf: &[u8]) -> Result<Self, SyncError> {
        if buf.len() < 2 {
            return Err(SyncError::ProtocolMismatch {
                expected: "ctrl message >= 2 bytes".into(),
                got: format!("{} bytes", buf.len()),
            });
        }
        let len = buf[0] as usize;
        let ins = buf[1];
        let payload_end = (len + 1).min(buf.len());
        let payload = buf[2..payload_end].to_vec();
        Ok(Self { ins, payload })
    }
}

/// A data-channel message: always 32 bytes on the wire.
///
/// Outgoing: logical payload padded with zeros, the final byte holding
/// the true length. Incoming: the last byte is the length, the first N
/// bytes are the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataMessage {
    pub data: Vec<u8>,
}

impl DataMessage {
    pub const LENGTH: usize = 32;

    /// Build an outgoing message from a logical payload (must be <= 31 bytes).
    pub fn new(data: Vec<u8>) -> Result<Self, SyncError> {
        if data.len() > Self::LENGTH - 1 {
            return Err(SyncError::ProtocolMismatch {
                expected: format!("payload <= {} bytes", Self::LENGTH - 1),
                got: format!("{} bytes", data.len()),
            });
        }
        Ok(Self { data })
    }

    /// Serialize to the full 32-byte wire frame.
    pub fn to_bytes(&self) -> [u8; Self::LENGTH] {
        let mut out = [0u8; Self::LENGTH];
        out[..self.data.len()].copy_from_slice(&self.data);
        out[Self::LENGTH - 1] = self.data.len() as u8;
        out
    }

    /// Parse an incoming 32-byte data-channel read.
    pub fn from_bytes(buf: &[u8; Self::LENGTH]) -> Self {
        let len = buf[Self::LENGTH - 1] as usize;
        let len = len.min(Self::LENGTH - 1);
        Self {
            data: buf[..len].to_vec(),
        }
    }
}

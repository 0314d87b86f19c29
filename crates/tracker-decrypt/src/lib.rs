//! tracker-decrypt — offline decryption of persisted dump/response
//! archives.
//!
//! Ground truth: `galileo/megadumpDecrypter.py::decrypt` and
//! `oldDumpDecrypter.py`'s file-format handling.

use zeroize::{Zeroize, ZeroizeOnDrop};

use tracker_core::bytes::{lsb_to_u64, to_hex};
use tracker_core::xtea::{derive_ctr_iv, XteaCtr};
use tracker_core::SyncError;

/// A 16-byte XTEA key, zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct TrackerKey([u8; 16]);

impl TrackerKey {
    pub fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> [u8; 16] {
        self.0
    }
}

/// Parse a hex key file (optionally newline-wrapped) into a 16-byte key.
pub fn load_key(contents: &str) -> Result<TrackerKey, SyncError> {
    let hex: String = contents.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = tracker_core::bytes::from_hex_compact(&hex)
        .map_err(|e| SyncError::InvalidDump(format!("bad key file: {e}")))?;
    let key: [u8; 16] = bytes
        .try_into()
        .map_err(|v: Vec<u8>| SyncError::InvalidDump(format!("key is {} bytes, want 16", v.len())))?;
    Ok(TrackerKey::new(key))
}

/// The two sections of a persisted dump archive: the dump body (with its
/// trailing footer bytes still concatenated on, matching how the archive
/// was written) and an optional server response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedArchive {
    pub body: Vec<u8>,
    pub response: Option<Vec<u8>>,
}

/// Parse the persisted hex-per-line archive format: hex body lines, a
/// blank line, then hex response lines (if any).
pub fn parse_archive(contents: &str) -> Result<ParsedArchive, SyncError> {
    let mut sections = contents.split("\n\n");
    let body_text = sections
        .next()
        .ok_or_else(|| SyncError::InvalidDump("empty archive".into()))?;
    let body = parse_hex_blob(body_text)?;

    let response = match sections.next() {
        Some(text) if !text.trim().is_empty() => Some(parse_hex_blob(text)?),
        _ => None,
    };

    Ok(ParsedArchive { body, response })
}

fn parse_hex_blob(text: &str) -> Result<Vec<u8>, SyncError> {
    text.split_whitespace()
        .map(|tok| {
            u8::from_str_radix(tok, 16)
                .map_err(|e| SyncError::InvalidDump(format!("bad hex byte {tok:?}: {e}")))
        })
        .collect()
}

/// Encryption type declared at `data[4..6]`.
fn declared_encryption(data: &[u8]) -> Result<u16, SyncError> {
    data.get(4..6)
        .map(|s| lsb_to_u64(s) as u16)
        .ok_or_else(|| SyncError::InvalidDump("archive too short to carry a header".into()))
}

/// Decrypt a dump or response section in place, starting at
/// `payload_offset` (16 for a full dump, 10 for a server response — both
/// measured from the start of the section, past the shared nonce field).
///
/// Encryption type 0 is a no-op; type 1 derives the CTR keystream from
/// the per-dump nonce and XORs it over the trailing payload. Any other
/// type is unspecified and rejected.
pub fn decrypt_in_place(
    data: &mut [u8],
    key: &TrackerKey,
    payload_offset: usize,
) -> Result<(), SyncError> {
    match declared_encryption(data)? {
        0 => Ok(()),
        1 => {
            let nonce = data
                .get(6..10)
                .ok_or_else(|| SyncError::InvalidDump("missing nonce".into()))?
                .to_vec();
            let iv = derive_ctr_iv(key.bytes(), &nonce);
            let mut ctr = XteaCtr::new(key.bytes(), iv);
            if data.len() > payload_offset {
                let mut tail = data[payload_offset..].to_vec();
                ctr.apply(&mut tail);
                data[payload_offset..].copy_from_slice(&tail);
            }
            Ok(())
        }
        other => Err(SyncError::UnknownDumpType(other)),
    }
}

/// Serialize a decrypted section back into the persisted hex-per-line
/// format (20 bytes per line).
pub fn format_hex_lines(data: &[u8]) -> String {
    data.chunks(20)
        .map(|chunk| to_hex(chunk, false))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Decrypt a full archive's body (offset 16) and, if present, its
/// response (offset 10), returning the re-serialized text ready to be
/// written to a `_dec.txt` file.
pub fn decrypt_archive(archive: &ParsedArchive, key: &TrackerKey) -> Result<String, SyncError> {
    let mut body = archive.body.clone();
    decrypt_in_place(&mut body, key, 16)?;

    let mut out = format_hex_lines(&body);
    if let Some(response) = &archive.response {
        let mut response = response.clone();
        decrypt_in_place(&mut response, key, 10)?;
        out.push_str("\n\n");
        out.push_str(&format_hex_lines(&response));
    }
    Ok(out)
}

//! Byte utilities — integer/byte-array conversion, hex, ASCII, base64.
//!
//! Ground truth: `galileo/utils.py` (a2msbi/i2msba, a2lsbi/i2lsba, a2x/x2a,
//! a2s). Every width is an explicit parameter; nothing here assumes a
//! fixed integer size.

/// Decode a byte slice into an unsigned integer, most-significant byte first.
pub fn msb_to_u64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

/// Decode a byte slice into an unsigned integer, least-significant byte first.
pub fn lsb_to_u64(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .rev()
        .fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

/// Encode an unsigned integer into `width` bytes, most-significant first.
pub fn u64_to_msb(value: u64, width: usize) -> Vec<u8> {
    (0..width)
        .rev()
        .map(|i| ((value >> (i * 8)) & 0xff) as u8)
        .collect()
}

/// Encode an unsigned integer into `width` bytes, least-significant first.
pub fn u64_to_lsb(value: u64, width: usize) -> Vec<u8> {
    (0..width)
        .map(|i| ((value >> (i * 8)) & 0xff) as u8)
        .collect()
}

/// Format bytes as space-delimited uppercase hex.
///
/// When `shorten` is set, trailing zero bytes are collapsed into a
/// `00 (N times)` marker instead of being printed individually — mirrors
/// the original's debug-log convenience for long dump buffers.
pub fn to_hex(data: &[u8], shorten: bool) -> String {
    let mut data = data.to_vec();
    let mut shortened = 0usize;
    if shorten {
        while data.last() == Some(&0) {
            data.pop();
            shortened += 1;
        }
    }
    let mut parts: Vec<String> = data.iter().map(|b| format!("{:02X}", b)).collect();
    if shortened > 0 {
        let marker = format!("00 ({} times)", shortened);
        parts.push(marker);
    }
    parts.join(" ")
}

/// Parse a space-delimited hex string back into bytes.
pub fn from_hex(s: &str) -> Result<Vec<u8>, std::num::ParseIntError> {
    s.split_whitespace()
        .map(|tok| u8::from_str_radix(tok, 16))
        .collect()
}

/// Decode a contiguous (no delimiter) hex string into bytes.
pub fn from_hex_compact(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    hex::decode(s)
}

/// Encode bytes as a contiguous (no delimiter) lowercase hex string.
pub fn to_hex_compact(data: &[u8]) -> String {
    hex::encode(data)
}

/// Interpret bytes as ASCII characters.
///
/// When `stop_at_nul` is set, conversion stops at the first NUL byte
/// (used to recover a printable status string from a padded field).
pub fn to_ascii(data: &[u8], stop_at_nul: bool) -> String {
    let mut s = String::with_capacity(data.len());
    for &b in data {
        if stop_at_nul && b == 0 {
            break;
        }
        s.push(b as char);
    }
    s
}

/// Base64-encode arbitrary bytes (standard alphabet, with padding).
pub fn to_base64(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(data)
}

/// Base64-decode a string (standard alphabet, with padding).
pub fn from_base64(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(s)
}

//! XTEA block cipher, XTEA-CMAC, and XTEA-CTR keystream.
//!
//! Ground truth: `galileo/xtea.py` and `galileo/megadumpDecrypter.py`.
//! XTEA treats each 8-byte block as two 32-bit halves, most-significant
//! byte first. All arithmetic wraps modulo 2^32 (`Wrapping<u32>` below).

use std::num::Wrapping;

const DELTA: u32 = 0x9E3779B9;
const DEFAULT_ROUNDS: u32 = 32;

fn block_to_halves(block: &[u8; 8]) -> (u32, u32) {
    let v0 = u32::from_be_bytes(block[0..4].try_into().unwrap());
    let v1 = u32::from_be_bytes(block[4..8].try_into().unwrap());
    (v0, v1)
}

fn halves_to_block(v0: u32, v1: u32) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[0..4].copy_from_slice(&v0.to_be_bytes());
    out[4..8].copy_from_slice(&v1.to_be_bytes());
    out
}

fn key_words(key: &[u8; 16]) -> [u32; 4] {
    [
        u32::from_be_bytes(key[0..4].try_into().unwrap()),
        u32::from_be_bytes(key[4..8].try_into().unwrap()),
        u32::from_be_bytes(key[8..12].try_into().unwrap()),
        u32::from_be_bytes(key[12..16].try_into().unwrap()),
    ]
}

/// Encrypt one 8-byte block under a 16-byte key, `rounds` Feistel rounds
/// (32 by default).
pub fn encrypt_block(key: &[u8; 16], block: &[u8; 8], rounds: u32) -> [u8; 8] {
    let (mut v0, mut v1) = block_to_halves(block);
    let k = key_words(key);
    let mut sum = Wrapping(0u32);
    let delta = Wrapping(DELTA);
    for _ in 0..rounds {
        let t0 = (Wrapping(v1 << 4) ^ Wrapping(v1 >> 5)) + Wrapping(v1);
        v0 = (Wrapping(v0) + (t0 ^ (sum + Wrapping(k[(sum.0 & 3) as usize])))).0;
        sum += delta;
        let t1 = (Wrapping(v0 << 4) ^ Wrapping(v0 >> 5)) + Wrapping(v0);
        v1 = (Wrapping(v1) + (t1 ^ (sum + Wrapping(k[((sum.0 >> 11) & 3) as usize])))).0;
    }
    halves_to_block(v0, v1)
}

/// Decrypt one 8-byte block under a 16-byte key.
pub fn decrypt_block(key: &[u8; 16], block: &[u8; 8], rounds: u32) -> [u8; 8] {
    let (mut v0, mut v1) = block_to_halves(block);
    let k = key_words(key);
    let delta = Wrapping(DELTA);
    let mut sum = delta * Wrapping(rounds);
    for _ in 0..rounds {
        let t1 = (Wrapping(v0 << 4) ^ Wrapping(v0 >> 5)) + Wrapping(v0);
        v1 = (Wrapping(v1) - (t1 ^ (sum + Wrapping(k[((sum.0 >> 11) & 3) as usize])))).0;
        sum -= delta;
        let t0 = (Wrapping(v1 << 4) ^ Wrapping(v1 >> 5)) + Wrapping(v1);
        v0 = (Wrapping(v0) - (t0 ^ (sum + Wrapping(k[(sum.0 & 3) as usize])))).0;
    }
    halves_to_block(v0, v1)
}

fn xor8(a: &[u8; 8], b: &[u8; 8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    for i in 0..8 {
        out[i] = a[i] ^ b[i];
    }
    out
}

/// Double an 8-byte CMAC subkey value over GF(2^64), Rb = 0x1B (the
/// standard reducing polynomial for a 64-bit block cipher).
fn double_subkey(block: &[u8; 8]) -> [u8; 8] {
    const RB: u8 = 0x1B;
    let msb_set = block[0] & 0x80 != 0;
    let mut shifted = [0u8; 8];
    let mut carry = 0u8;
    for i in (0..8).rev() {
        let b = block[i];
        shifted[i] = (b << 1) | carry;
        carry = (b >> 7) & 1;
    }
    if msb_set {
        shifted[7] ^= RB;
    }
    shifted
}

/// XTEA-CMAC — subkey-derived CBC-MAC variant keyed by a 16-byte XTEA key.
///
/// Ground truth: `galileo/megadumpDecrypter.py::XTEA_CMAC`.
pub struct XteaCmac {
    key: [u8; 16],
    k1: [u8; 8],
    k2: [u8; 8],
    iv: [u8; 8],
    pending: Vec<u8>,
}

impl XteaCmac {
    pub fn new(key: [u8; 16]) -> Self {
        let l = encrypt_block(&key, &[0u8; 8], DEFAULT_ROUNDS);
        let k1 = double_subkey(&l);
        let k2 = double_subkey(&k1);
        Self {
            key,
            k1,
            k2,
            iv: [0u8; 8],
            pending: Vec::new(),
        }
    }

    /// Feed more message bytes into the running MAC.
    pub fn update(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
        while self.pending.len() > 8 {
            let block: [u8; 8] = self.pending[..8].try_into().unwrap();
            self.pending.drain(..8);
            self.iv = xor8(&self.iv, &block);
            self.iv = encrypt_block(&self.key, &self.iv, DEFAULT_ROUNDS);
        }
    }

    /// Finalize and return the 8-byte tag. Consumes the accumulator.
    pub fn finalize(self) -> [u8; 8] {
        let last_block = if self.pending.len() == 8 {
            let block: [u8; 8] = self.pending[..8].try_into().unwrap();
            xor8(&block, &self.k1)
        } else {
            let mut padded = self.pending.clone();
            padded.push(0x80);
            padded.resize(8, 0);
            let block: [u8; 8] = padded[..8].try_into().unwrap();
            xor8(&block, &self.k2)
        };
        encrypt_block(&self.key, &xor8(&self.iv, &last_block), DEFAULT_ROUNDS)
    }
}

/// Derive the initial CTR counter from a per-dump nonce:
/// `XTEA-CMAC(key, [0u8; 8] ++ nonce)`.
pub fn derive_ctr_iv(key: [u8; 16], nonce: &[u8]) -> [u8; 8] {
    let mut cmac = XteaCmac::new(key);
    cmac.update(&[0u8; 8]);
    cmac.update(nonce);
    cmac.finalize()
}

/// XTEA-CTR keystream generator.
///
/// The 8-byte counter is LSB-first arithmetic and is incremented *before*
/// each block is encrypted — confirmed by spec.md's counter test vector,
/// which starting from `$2dUI84e` advances to `%2dUI84e` on the first
/// keystream block, not `$2dUI84e` itself.
pub struct XteaCtr {
    key: [u8; 16],
    counter: u64,
    buffer: Vec<u8>,
    buffer_pos: usize,
}

impl XteaCtr {
    pub fn new(key: [u8; 16], iv: [u8; 8]) -> Self {
        Self {
            key,
            counter: u64::from_le_bytes(iv),
            buffer: Vec::new(),
            buffer_pos: 0,
        }
    }

    fn next_keystream_block(&mut self) -> [u8; 8] {
        self.counter = self.counter.wrapping_add(1);
        let block = self.counter.to_le_bytes();
        encrypt_block(&self.key, &block, DEFAULT_ROUNDS)
    }

    fn next_keystream_byte(&mut self) -> u8 {
        if self.buffer_pos >= self.buffer.len() {
            self.buffer = self.next_keystream_block().to_vec();
            self.buffer_pos = 0;
        }
        let b = self.buffer[self.buffer_pos];
        self.buffer_pos += 1;
        b
    }

    /// XOR `data` with the keystream in place.
    pub fn apply(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            *byte ^= self.next_keystream_byte();
        }
    }

    /// XOR `data` with the keystream, returning a new buffer.
    pub fn decrypt(&mut self, data: &[u8]) -> Vec<u8> {
        let mut out = data.to_vec();
        self.apply(&mut out);
        out
    }
}

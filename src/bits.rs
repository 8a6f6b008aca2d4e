//! Bit sequences: what specialization produces and abstraction consumes.
//!
//! Variables are not always byte-sized (a `bits(nbBits = 3)` field, an Integer with unit size 1),
//! so both engines work on [`BitSeq`] and only convert to bytes at the public API boundary.

use std::fmt;

/// Owned sequence of bits, most significant bit first within each byte.
///
/// Unused trailing bits of the last byte are always zero, so derived equality and hashing
/// only ever see the `len` meaningful bits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BitSeq {
    bytes: Vec<u8>,
    len: usize,
}

impl BitSeq {
    pub fn new() -> Self {
        BitSeq::default()
    }

    pub fn with_capacity(bits: usize) -> Self {
        BitSeq {
            bytes: Vec::with_capacity(bits.div_ceil(8)),
            len: 0,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        BitSeq {
            bytes: bytes.to_vec(),
            len: bytes.len() * 8,
        }
    }

    /// Low `width` bits of `value`, most significant first.
    pub fn from_uint(value: u64, width: usize) -> Self {
        let mut out = BitSeq::with_capacity(width);
        for i in (0..width).rev() {
            let bit = i < 64 && (value >> i) & 1 != 0;
            out.push(bit);
        }
        out
    }

    /// Concatenates `parts` in order.
    pub fn concat<'a, I>(parts: I) -> BitSeq
    where
        I: IntoIterator<Item = &'a BitSeq>,
    {
        let mut out = BitSeq::new();
        for p in parts {
            out.extend_from(p);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_byte_aligned(&self) -> bool {
        self.len % 8 == 0
    }

    pub fn get(&self, i: usize) -> Option<bool> {
        if i >= self.len {
            return None;
        }
        Some((self.bytes[i / 8] >> (7 - (i % 8))) & 1 != 0)
    }

    pub fn push(&mut self, bit: bool) {
        if self.len % 8 == 0 {
            self.bytes.push(0);
        }
        if bit {
            let last = self.bytes.len() - 1;
            self.bytes[last] |= 1 << (7 - (self.len % 8));
        }
        self.len += 1;
    }

    pub fn extend_from(&mut self, other: &BitSeq) {
        if self.is_byte_aligned() {
            self.bytes.extend_from_slice(&other.bytes);
            self.len += other.len;
            return;
        }
        for i in 0..other.len {
            self.push((other.bytes[i / 8] >> (7 - (i % 8))) & 1 != 0);
        }
    }

    /// Copy of `len` bits starting at bit `start`; `None` when out of range.
    pub fn slice(&self, start: usize, len: usize) -> Option<BitSeq> {
        let end = start.checked_add(len)?;
        if end > self.len {
            return None;
        }
        if start % 8 == 0 {
            let mut bytes = self.bytes[start / 8..(start + len).div_ceil(8)].to_vec();
            if len % 8 != 0 {
                if let Some(last) = bytes.last_mut() {
                    *last &= 0xffu8 << (8 - len % 8);
                }
            }
            return Some(BitSeq { bytes, len });
        }
        let mut out = BitSeq::with_capacity(len);
        for i in start..end {
            out.push((self.bytes[i / 8] >> (7 - (i % 8))) & 1 != 0);
        }
        Some(out)
    }

    /// True when `pattern` occurs at bit offset `pos`.
    pub fn matches_at(&self, pos: usize, pattern: &BitSeq) -> bool {
        match self.slice(pos, pattern.len) {
            Some(s) => s == *pattern,
            None => false,
        }
    }

    /// The bytes, with the last byte zero-padded when the length is not a multiple of 8.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    /// Borrowed bytes; only available for byte-aligned sequences.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        if self.is_byte_aligned() {
            Some(&self.bytes)
        } else {
            None
        }
    }

    /// Big-endian unsigned reading of the whole sequence; `None` above 64 bits.
    pub fn to_uint(&self) -> Option<u64> {
        if self.len > 64 {
            return None;
        }
        let mut v = 0u64;
        for i in 0..self.len {
            v = (v << 1) | u64::from((self.bytes[i / 8] >> (7 - (i % 8))) & 1);
        }
        Some(v)
    }

    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(self.bytes.len() * 2);
        for b in &self.bytes {
            s.push_str(&format!("{:02x}", b));
        }
        s
    }

    pub fn to_binary_string(&self) -> String {
        (0..self.len)
            .map(|i| if (self.bytes[i / 8] >> (7 - (i % 8))) & 1 != 0 { '1' } else { '0' })
            .collect()
    }
}

impl fmt::Display for BitSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_byte_aligned() {
            write!(f, "0x{}", self.to_hex())
        } else {
            write!(f, "0b{}", self.to_binary_string())
        }
    }
}

impl From<&[u8]> for BitSeq {
    fn from(bytes: &[u8]) -> Self {
        BitSeq::from_bytes(bytes)
    }
}

impl From<Vec<u8>> for BitSeq {
    fn from(bytes: Vec<u8>) -> Self {
        let len = bytes.len() * 8;
        BitSeq { bytes, len }
    }
}

impl FromIterator<bool> for BitSeq {
    fn from_iter<I: IntoIterator<Item = bool>>(iter: I) -> Self {
        let mut out = BitSeq::new();
        for b in iter {
            out.push(b);
        }
        out
    }
}

//! Primitive value types: size semantics, encode/decode and random generation.
//!
//! Every type shares [`TypeAttrs`] (unit size, endianness, sign). A type may carry a fixed
//! value, in which case it only parses that value and always generates it; its size is then
//! the exact bit length of that value.

use crate::bits::BitSeq;
use crate::codec::CodecError;
use crate::value::Value;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    #[default]
    Big,
    Little,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sign {
    Signed,
    #[default]
    Unsigned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnitSize {
    U1,
    U4,
    #[default]
    U8,
    U16,
    U32,
    U64,
}

impl UnitSize {
    pub fn bits(self) -> usize {
        match self {
            UnitSize::U1 => 1,
            UnitSize::U4 => 4,
            UnitSize::U8 => 8,
            UnitSize::U16 => 16,
            UnitSize::U32 => 32,
            UnitSize::U64 => 64,
        }
    }

    pub fn from_bits(n: usize) -> Option<Self> {
        match n {
            1 => Some(UnitSize::U1),
            4 => Some(UnitSize::U4),
            8 => Some(UnitSize::U8),
            16 => Some(UnitSize::U16),
            32 => Some(UnitSize::U32),
            64 => Some(UnitSize::U64),
            _ => None,
        }
    }
}

/// Attributes shared by every primitive type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TypeAttrs {
    pub unit_size: UnitSize,
    pub endianness: Endianness,
    pub sign: Sign,
}

/// Declared size: exact when `max == Some(min)`, unbounded above when `max` is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeRange {
    pub min: usize,
    pub max: Option<usize>,
}

impl SizeRange {
    pub fn exact(n: usize) -> Self {
        SizeRange { min: n, max: Some(n) }
    }

    pub fn between(min: usize, max: usize) -> Self {
        SizeRange { min, max: Some(max) }
    }

    pub fn at_least(min: usize) -> Self {
        SizeRange { min, max: None }
    }

    pub fn exact_len(&self) -> Option<usize> {
        match self.max {
            Some(max) if max == self.min => Some(max),
            _ => None,
        }
    }

    pub fn contains(&self, n: usize) -> bool {
        n >= self.min && self.max.map_or(true, |m| n <= m)
    }

    fn scaled(&self, factor: usize) -> SizeRange {
        SizeRange {
            min: self.min * factor,
            max: self.max.map(|m| m * factor),
        }
    }

    fn check(&self, what: &str) -> Result<(), CodecError> {
        match self.max {
            Some(max) if max < self.min => Err(CodecError::InvalidGrammar(format!(
                "{}: minimum {} above maximum {}",
                what, self.min, max
            ))),
            _ => Ok(()),
        }
    }
}

impl Default for SizeRange {
    fn default() -> Self {
        SizeRange::at_least(0)
    }
}

fn mismatch(msg: impl Into<String>) -> CodecError {
    CodecError::TypeMismatch(msg.into())
}

fn random_len<R: Rng + ?Sized>(rng: &mut R, range: SizeRange, default_max: usize) -> Result<usize, CodecError> {
    let max = range.max.unwrap_or_else(|| range.min.max(default_max));
    if max < range.min {
        return Err(mismatch(format!("empty size range {}..{}", range.min, max)));
    }
    Ok(rng.random_range(range.min..=max))
}

/// Shortest and longest length of `range`, capped like [`random_len`].
fn extreme_lens(range: SizeRange, default_max: usize) -> Result<Vec<usize>, CodecError> {
    let max = range.max.unwrap_or_else(|| range.min.max(default_max));
    if max < range.min {
        return Err(mismatch(format!("empty size range {}..{}", range.min, max)));
    }
    Ok(if max == range.min { vec![max] } else { vec![range.min, max] })
}

fn push_unique(out: &mut Vec<BitSeq>, bits: BitSeq) {
    if !out.contains(&bits) {
        out.push(bits);
    }
}

/// Byte strings of each extreme length filled with `low`, then with `high`.
fn byte_boundaries(out: &mut Vec<BitSeq>, range: SizeRange, max_bytes: usize, low: u8, high: u8) -> Result<(), CodecError> {
    for n in extreme_lens(range, max_bytes)? {
        push_unique(out, BitSeq::from(vec![low; n]));
        push_unique(out, BitSeq::from(vec![high; n]));
    }
    Ok(())
}

// --- Integer ---

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Integer {
    pub attrs: TypeAttrs,
    /// Explicit width in bits; wins over the interval and the value.
    pub size: Option<usize>,
    pub interval: Option<(i128, i128)>,
    pub value: Option<i128>,
}

fn bit_length(x: u128) -> usize {
    (128 - x.leading_zeros()) as usize
}

fn bits_needed(lo: i128, hi: i128, sign: Sign) -> usize {
    if sign == Sign::Unsigned && lo >= 0 {
        return bit_length(hi.max(0) as u128).max(1);
    }
    let pos = if hi >= 0 { bit_length(hi as u128) + 1 } else { 1 };
    let neg = if lo < 0 { bit_length((-(lo + 1)) as u128) + 1 } else { 1 };
    pos.max(neg)
}

fn int_bounds(width: usize, sign: Sign) -> (i128, i128) {
    match sign {
        Sign::Unsigned => (0, (1i128 << width) - 1),
        Sign::Signed => (-(1i128 << (width - 1)), (1i128 << (width - 1)) - 1),
    }
}

fn mask(width: usize) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

impl Integer {
    pub fn new() -> Self {
        Integer::default()
    }

    /// Integer bound to a fixed value.
    pub fn constant(v: i128) -> Self {
        Integer {
            value: Some(v),
            ..Integer::default()
        }
    }

    pub fn with_size(mut self, bits: usize) -> Self {
        self.size = Some(bits);
        self
    }

    pub fn with_interval(mut self, min: i128, max: i128) -> Self {
        self.interval = Some((min, max));
        self
    }

    pub fn with_value(mut self, v: i128) -> Self {
        self.value = Some(v);
        self
    }

    pub fn with_attrs(mut self, attrs: TypeAttrs) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.attrs.endianness = endianness;
        self
    }

    pub fn with_sign(mut self, sign: Sign) -> Self {
        self.attrs.sign = sign;
        self
    }

    pub fn with_unit_size(mut self, unit_size: UnitSize) -> Self {
        self.attrs.unit_size = unit_size;
        self
    }

    /// Width in bits: explicit size, else the smallest unit-aligned width holding the
    /// interval, else the one holding the value, else one unit.
    pub fn width(&self) -> usize {
        let unit = self.attrs.unit_size.bits();
        let align = |n: usize| n.div_ceil(unit) * unit;
        if let Some(s) = self.size {
            s
        } else if let Some((lo, hi)) = self.interval {
            align(bits_needed(lo, hi, self.attrs.sign))
        } else if let Some(v) = self.value {
            align(bits_needed(v, v, self.attrs.sign))
        } else {
            unit
        }
    }

    fn checked_width(&self) -> Result<usize, CodecError> {
        let w = self.width();
        if w == 0 || w > 64 {
            return Err(mismatch(format!("Integer width {} outside 1..=64 bits", w)));
        }
        Ok(w)
    }

    pub fn encode_int(&self, v: i128) -> Result<BitSeq, CodecError> {
        let w = self.checked_width()?;
        let (lo, hi) = int_bounds(w, self.attrs.sign);
        if v < lo || v > hi {
            return Err(mismatch(format!("{} does not fit in {} bits ({:?})", v, w, self.attrs.sign)));
        }
        let raw = (v as u64) & mask(w);
        if w % 8 != 0 {
            return Ok(BitSeq::from_uint(raw, w));
        }
        let mut buf = [0u8; 8];
        let n = w / 8;
        Ok(match self.attrs.endianness {
            Endianness::Little => {
                LittleEndian::write_u64(&mut buf, raw);
                BitSeq::from_bytes(&buf[..n])
            }
            Endianness::Big => {
                BigEndian::write_u64(&mut buf, raw);
                BitSeq::from_bytes(&buf[8 - n..])
            }
        })
    }

    pub fn decode_int(&self, bits: &BitSeq) -> Result<i128, CodecError> {
        let w = self.checked_width()?;
        if bits.len() != w {
            return Err(mismatch(format!("Integer expects {} bits, got {}", w, bits.len())));
        }
        let raw = match bits.as_bytes() {
            Some(bytes) if w % 8 == 0 => match self.attrs.endianness {
                Endianness::Little => LittleEndian::read_uint(bytes, w / 8),
                Endianness::Big => BigEndian::read_uint(bytes, w / 8),
            },
            _ => bits.to_uint().ok_or_else(|| mismatch("Integer wider than 64 bits"))?,
        };
        if self.attrs.sign == Sign::Signed && (raw >> (w - 1)) & 1 == 1 {
            Ok(raw as i128 - (1i128 << w))
        } else {
            Ok(raw as i128)
        }
    }

    fn accepts(&self, v: i128) -> bool {
        if let Some((lo, hi)) = self.interval {
            if v < lo || v > hi {
                return false;
            }
        }
        self.value.map_or(true, |fixed| fixed == v)
    }

    fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<BitSeq, CodecError> {
        if let Some(v) = self.value {
            return self.encode_int(v);
        }
        let (lo, hi) = self.domain()?;
        self.encode_int(rng.random_range(lo..=hi))
    }

    /// Values that can be generated: the interval, or the whole range of the width.
    fn domain(&self) -> Result<(i128, i128), CodecError> {
        let w = self.checked_width()?;
        let (min, max) = int_bounds(w, self.attrs.sign);
        let (lo, hi) = self.interval.unwrap_or((min, max));
        if lo > hi || lo < min || hi > max {
            return Err(mismatch(format!(
                "interval [{}, {}] cannot be represented on {} bits ({:?})",
                lo, hi, w, self.attrs.sign
            )));
        }
        Ok((lo, hi))
    }
}

// --- Raw ---

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Raw {
    pub attrs: TypeAttrs,
    /// Length in bytes.
    pub nb_bytes: SizeRange,
    /// Bytes allowed in the content.
    pub alphabet: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
}

impl Raw {
    pub fn new() -> Self {
        Raw::default()
    }

    pub fn constant(bytes: &[u8]) -> Self {
        Raw {
            value: Some(bytes.to_vec()),
            ..Raw::default()
        }
    }

    pub fn with_nb_bytes(mut self, nb_bytes: SizeRange) -> Self {
        self.nb_bytes = nb_bytes;
        self
    }

    pub fn with_alphabet(mut self, alphabet: &[u8]) -> Self {
        self.alphabet = Some(alphabet.to_vec());
        self
    }

    /// An empty string is accepted when the declared length allows zero bytes.
    fn accepts(&self, bytes: &[u8]) -> bool {
        if let Some(v) = &self.value {
            return v.as_slice() == bytes;
        }
        if !self.nb_bytes.contains(bytes.len()) {
            return false;
        }
        match &self.alphabet {
            Some(a) => bytes.iter().all(|b| a.contains(b)),
            None => true,
        }
    }

    fn generate<R: Rng + ?Sized>(&self, rng: &mut R, max_bytes: usize) -> Result<BitSeq, CodecError> {
        if let Some(v) = &self.value {
            return Ok(BitSeq::from_bytes(v));
        }
        let n = random_len(rng, self.nb_bytes, max_bytes)?;
        let bytes: Vec<u8> = match &self.alphabet {
            Some(a) if a.is_empty() => return Err(mismatch("Raw alphabet is empty")),
            Some(a) => (0..n).map(|_| a[rng.random_range(0..a.len())]).collect(),
            None => (0..n).map(|_| rng.random::<u8>()).collect(),
        };
        Ok(BitSeq::from(bytes))
    }
}

// --- HexaString ---

/// Raw bytes on the wire, represented as a lowercase hex string.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HexaString {
    pub attrs: TypeAttrs,
    pub nb_bytes: SizeRange,
    pub value: Option<Vec<u8>>,
}

pub fn hex_to_bytes(s: &str) -> Result<Vec<u8>, CodecError> {
    let s = s.trim_start_matches("0x");
    let padded;
    let digits = if s.len() % 2 == 1 {
        padded = format!("0{}", s);
        padded.as_str()
    } else {
        s
    };
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            digits
                .get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| mismatch(format!("invalid hex string {:?}", s)))
        })
        .collect()
}

impl HexaString {
    pub fn new() -> Self {
        HexaString::default()
    }

    pub fn constant(hex: &str) -> Result<Self, CodecError> {
        Ok(HexaString {
            value: Some(hex_to_bytes(hex)?),
            ..HexaString::default()
        })
    }

    pub fn with_nb_bytes(mut self, nb_bytes: SizeRange) -> Self {
        self.nb_bytes = nb_bytes;
        self
    }
}

// --- BitArray ---

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BitArray {
    pub attrs: TypeAttrs,
    pub nb_bits: SizeRange,
    pub value: Option<BitSeq>,
}

impl BitArray {
    pub fn new() -> Self {
        BitArray::default()
    }

    pub fn constant(bits: BitSeq) -> Self {
        BitArray {
            value: Some(bits),
            ..BitArray::default()
        }
    }

    pub fn with_nb_bits(mut self, nb_bits: SizeRange) -> Self {
        self.nb_bits = nb_bits;
        self
    }
}

// --- IPv4 ---

/// IPv4 network in CIDR form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Net {
    pub addr: Ipv4Addr,
    pub prefix: u8,
}

impl Ipv4Net {
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Result<Self, CodecError> {
        if prefix > 32 {
            return Err(CodecError::InvalidGrammar(format!("IPv4 prefix /{} above 32", prefix)));
        }
        Ok(Ipv4Net { addr, prefix })
    }

    fn netmask(&self) -> u32 {
        if self.prefix == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(self.prefix))
        }
    }

    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.addr) & self.netmask())
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.addr) | !self.netmask())
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        u32::from(ip) & self.netmask() == u32::from(self.addr) & self.netmask()
    }

    /// Assignable addresses: network and broadcast excluded up to /30.
    fn host_range(&self) -> (u32, u32) {
        let first = u32::from(self.network());
        let last = u32::from(self.broadcast());
        if self.prefix <= 30 {
            (first + 1, last - 1)
        } else {
            (first, last)
        }
    }
}

impl FromStr for Ipv4Net {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || CodecError::InvalidGrammar(format!("invalid IPv4 network {:?}", s));
        let (addr, prefix) = match s.split_once('/') {
            Some((a, p)) => (a, p.parse::<u8>().map_err(|_| bad())?),
            None => (s, 32),
        };
        Ipv4Net::new(addr.parse::<Ipv4Addr>().map_err(|_| bad())?, prefix)
    }
}

impl fmt::Display for Ipv4Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

/// Lowest and highest public unicast addresses.
const PUBLIC_BOUNDARIES: [Ipv4Addr; 2] = [Ipv4Addr::new(1, 0, 0, 1), Ipv4Addr::new(223, 255, 255, 254)];

/// Ranges never produced when generating a public address.
const NON_PUBLIC: [([u8; 4], u8); 14] = [
    ([0, 0, 0, 0], 8),
    ([10, 0, 0, 0], 8),
    ([100, 64, 0, 0], 10),
    ([127, 0, 0, 0], 8),
    ([169, 254, 0, 0], 16),
    ([172, 16, 0, 0], 12),
    ([192, 0, 0, 0], 24),
    ([192, 0, 2, 0], 24),
    ([192, 168, 0, 0], 16),
    ([198, 18, 0, 0], 15),
    ([198, 51, 100, 0], 24),
    ([203, 0, 113, 0], 24),
    ([224, 0, 0, 0], 4),
    ([240, 0, 0, 0], 4),
];

pub fn is_public(ip: Ipv4Addr) -> bool {
    !NON_PUBLIC.iter().any(|(net, prefix)| {
        Ipv4Net {
            addr: Ipv4Addr::from(*net),
            prefix: *prefix,
        }
        .contains(ip)
    })
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Ipv4 {
    pub attrs: TypeAttrs,
    pub network: Option<Ipv4Net>,
    pub value: Option<Ipv4Addr>,
}

impl Ipv4 {
    pub fn new() -> Self {
        Ipv4::default()
    }

    pub fn constant(ip: Ipv4Addr) -> Self {
        Ipv4 {
            value: Some(ip),
            ..Ipv4::default()
        }
    }

    pub fn in_network(network: Ipv4Net) -> Self {
        Ipv4 {
            network: Some(network),
            ..Ipv4::default()
        }
    }

    fn encode_ip(&self, ip: Ipv4Addr) -> BitSeq {
        let mut octets = ip.octets();
        if self.attrs.endianness == Endianness::Little {
            octets.reverse();
        }
        BitSeq::from_bytes(&octets)
    }

    fn decode_ip(&self, bits: &BitSeq) -> Result<Ipv4Addr, CodecError> {
        let bytes = bits
            .as_bytes()
            .filter(|b| b.len() == 4)
            .ok_or_else(|| mismatch(format!("IPv4 expects 32 bits, got {}", bits.len())))?;
        let mut octets = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if self.attrs.endianness == Endianness::Little {
            octets.reverse();
        }
        Ok(Ipv4Addr::from(octets))
    }

    fn accepts(&self, ip: Ipv4Addr) -> bool {
        if let Some(v) = self.value {
            return v == ip;
        }
        self.network.map_or(true, |n| n.contains(ip))
    }

    fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> BitSeq {
        if let Some(v) = self.value {
            return self.encode_ip(v);
        }
        if let Some(net) = self.network {
            let (first, last) = net.host_range();
            return self.encode_ip(Ipv4Addr::from(rng.random_range(first..=last)));
        }
        loop {
            let ip = Ipv4Addr::from(rng.random::<u32>());
            if is_public(ip) {
                return self.encode_ip(ip);
            }
        }
    }
}

// --- ASCII ---

/// Text where each byte is one character. Generation only emits printable ASCII; decoding
/// accepts any byte (bytes above 0x7f map to the matching Latin-1 code point).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Ascii {
    pub attrs: TypeAttrs,
    pub nb_chars: SizeRange,
    pub value: Option<String>,
}

pub(crate) fn text_to_bytes(s: &str) -> Result<Vec<u8>, CodecError> {
    s.chars()
        .map(|c| u8::try_from(u32::from(c)).map_err(|_| mismatch(format!("{:?} is not a single-byte character", c))))
        .collect()
}

fn bytes_to_text(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

impl Ascii {
    pub fn new() -> Self {
        Ascii::default()
    }

    pub fn constant(s: &str) -> Self {
        Ascii {
            value: Some(s.to_string()),
            ..Ascii::default()
        }
    }

    pub fn with_nb_chars(mut self, nb_chars: SizeRange) -> Self {
        self.nb_chars = nb_chars;
        self
    }

    fn generate<R: Rng + ?Sized>(&self, rng: &mut R, max_bytes: usize) -> Result<BitSeq, CodecError> {
        if let Some(v) = &self.value {
            return Ok(BitSeq::from(text_to_bytes(v)?));
        }
        let n = random_len(rng, self.nb_chars, max_bytes)?;
        let bytes: Vec<u8> = (0..n).map(|_| rng.random_range(0x20u8..=0x7e)).collect();
        Ok(BitSeq::from(bytes))
    }
}

// --- Timestamp ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Epoch {
    #[default]
    Unix,
    Windows,
    MacOsClassic,
    Ntp,
    Gps,
    Custom(DateTime<Utc>),
}

impl Epoch {
    pub fn instant(&self) -> DateTime<Utc> {
        let secs = match self {
            Epoch::Unix => 0,
            Epoch::Windows => -11_644_473_600,
            Epoch::MacOsClassic => -2_082_844_800,
            Epoch::Ntp => -2_208_988_800,
            Epoch::Gps => 315_964_800,
            Epoch::Custom(t) => return *t,
        };
        DateTime::from_timestamp(secs, 0).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeUnit {
    #[default]
    Second,
    Decisecond,
    Centisecond,
    Millisecond,
    Microsecond,
    Nanosecond,
}

impl TimeUnit {
    fn nanos(self) -> i128 {
        match self {
            TimeUnit::Second => 1_000_000_000,
            TimeUnit::Decisecond => 100_000_000,
            TimeUnit::Centisecond => 10_000_000,
            TimeUnit::Millisecond => 1_000_000,
            TimeUnit::Microsecond => 1_000,
            TimeUnit::Nanosecond => 1,
        }
    }
}

/// Time elapsed since an epoch, counted in a unit. Always 32 bits on the wire.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Timestamp {
    pub attrs: TypeAttrs,
    pub epoch: Epoch,
    pub unity: TimeUnit,
    /// Raw count since the epoch.
    pub value: Option<u32>,
}

pub const TIMESTAMP_BITS: usize = 32;

impl Timestamp {
    pub fn new() -> Self {
        Timestamp::default()
    }

    pub fn with_epoch(mut self, epoch: Epoch) -> Self {
        self.epoch = epoch;
        self
    }

    pub fn with_unity(mut self, unity: TimeUnit) -> Self {
        self.unity = unity;
        self
    }

    /// Whole units elapsed from the epoch to `t`, floored. Spans beyond the range of an
    /// `i64` nanosecond count (Windows epoch in nanoseconds) are exact.
    pub fn count_since_epoch(&self, t: DateTime<Utc>) -> i128 {
        let d = t.signed_duration_since(self.epoch.instant());
        let nanos = i128::from(d.num_seconds()) * 1_000_000_000 + i128::from(d.subsec_nanos());
        nanos.div_euclid(self.unity.nanos())
    }

    pub fn instant_of(&self, count: u32) -> Option<DateTime<Utc>> {
        let n = i64::from(count);
        let delta = match self.unity {
            TimeUnit::Second => TimeDelta::try_seconds(n)?,
            TimeUnit::Decisecond => TimeDelta::try_milliseconds(n * 100)?,
            TimeUnit::Centisecond => TimeDelta::try_milliseconds(n * 10)?,
            TimeUnit::Millisecond => TimeDelta::try_milliseconds(n)?,
            TimeUnit::Microsecond => TimeDelta::microseconds(n),
            TimeUnit::Nanosecond => TimeDelta::nanoseconds(n),
        };
        self.epoch.instant().checked_add_signed(delta)
    }

    fn encode_count(&self, count: u32) -> BitSeq {
        let mut buf = [0u8; 4];
        match self.attrs.endianness {
            Endianness::Big => BigEndian::write_u32(&mut buf, count),
            Endianness::Little => LittleEndian::write_u32(&mut buf, count),
        }
        BitSeq::from_bytes(&buf)
    }

    fn decode_count(&self, bits: &BitSeq) -> Result<u32, CodecError> {
        match bits.as_bytes() {
            Some(b) if b.len() == 4 => Ok(match self.attrs.endianness {
                Endianness::Big => BigEndian::read_u32(b),
                Endianness::Little => LittleEndian::read_u32(b),
            }),
            _ => Err(mismatch(format!("Timestamp expects 32 bits, got {}", bits.len()))),
        }
    }

    fn generate(&self) -> Result<BitSeq, CodecError> {
        if let Some(v) = self.value {
            return Ok(self.encode_count(v));
        }
        let now = self.count_since_epoch(Utc::now()).rem_euclid(1i128 << 32);
        let count = u32::try_from(now).map_err(|_| mismatch(format!("timestamp count {} does not fit 32 bits", now)))?;
        Ok(self.encode_count(count))
    }
}

// --- Dispatch ---

/// A primitive type: the leaf domain of Data and Relationship variables.
#[derive(Debug, Clone, PartialEq)]
pub enum DataType {
    Integer(Integer),
    HexaString(HexaString),
    Raw(Raw),
    BitArray(BitArray),
    Ipv4(Ipv4),
    Ascii(Ascii),
    Timestamp(Timestamp),
}

impl DataType {
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Integer(_) => "Integer",
            DataType::HexaString(_) => "HexaString",
            DataType::Raw(_) => "Raw",
            DataType::BitArray(_) => "BitArray",
            DataType::Ipv4(_) => "IPv4",
            DataType::Ascii(_) => "ASCII",
            DataType::Timestamp(_) => "Timestamp",
        }
    }

    pub fn attrs(&self) -> &TypeAttrs {
        match self {
            DataType::Integer(t) => &t.attrs,
            DataType::HexaString(t) => &t.attrs,
            DataType::Raw(t) => &t.attrs,
            DataType::BitArray(t) => &t.attrs,
            DataType::Ipv4(t) => &t.attrs,
            DataType::Ascii(t) => &t.attrs,
            DataType::Timestamp(t) => &t.attrs,
        }
    }

    /// Size in bits: exact when a value is bound, otherwise the declared range.
    pub fn size(&self) -> SizeRange {
        match self {
            DataType::Integer(t) => SizeRange::exact(t.width()),
            DataType::HexaString(t) => match &t.value {
                Some(v) => SizeRange::exact(v.len() * 8),
                None => t.nb_bytes.scaled(8),
            },
            DataType::Raw(t) => match &t.value {
                Some(v) => SizeRange::exact(v.len() * 8),
                None => t.nb_bytes.scaled(8),
            },
            DataType::BitArray(t) => match &t.value {
                Some(v) => SizeRange::exact(v.len()),
                None => t.nb_bits,
            },
            DataType::Ipv4(_) => SizeRange::exact(32),
            DataType::Ascii(t) => match &t.value {
                Some(v) => SizeRange::exact(v.chars().count() * 8),
                None => t.nb_chars.scaled(8),
            },
            DataType::Timestamp(_) => SizeRange::exact(TIMESTAMP_BITS),
        }
    }

    /// Granularity of candidate lengths when parsing.
    pub fn step(&self) -> usize {
        match self {
            DataType::BitArray(_) => 1,
            _ => 8,
        }
    }

    /// Encoded form of the bound value, if the type carries one.
    pub fn value_bits(&self) -> Result<Option<BitSeq>, CodecError> {
        Ok(match self {
            DataType::Integer(t) => match t.value {
                Some(v) => Some(t.encode_int(v)?),
                None => None,
            },
            DataType::HexaString(t) => t.value.as_deref().map(BitSeq::from_bytes),
            DataType::Raw(t) => t.value.as_deref().map(BitSeq::from_bytes),
            DataType::BitArray(t) => t.value.clone(),
            DataType::Ipv4(t) => t.value.map(|ip| t.encode_ip(ip)),
            DataType::Ascii(t) => match &t.value {
                Some(s) => Some(BitSeq::from(text_to_bytes(s)?)),
                None => None,
            },
            DataType::Timestamp(t) => t.value.map(|c| t.encode_count(c)),
        })
    }

    pub fn encode(&self, value: &Value) -> Result<BitSeq, CodecError> {
        let wrong = || mismatch(format!("cannot encode {:?} as {}", value, self.name()));
        match (self, value) {
            (DataType::Integer(t), Value::Int(v)) => t.encode_int(*v),
            (DataType::HexaString(_), Value::Hex(s)) => Ok(BitSeq::from(hex_to_bytes(s)?)),
            (DataType::HexaString(_) | DataType::Raw(_), Value::Bytes(b)) => Ok(BitSeq::from_bytes(b)),
            (DataType::BitArray(_), Value::Bits(b)) => Ok(b.clone()),
            (DataType::Ipv4(t), Value::Ipv4(ip)) => Ok(t.encode_ip(*ip)),
            (DataType::Ascii(_), Value::Text(s)) => Ok(BitSeq::from(text_to_bytes(s)?)),
            (DataType::Timestamp(t), Value::Timestamp(at)) => {
                let count = u32::try_from(t.count_since_epoch(*at)).map_err(|_| mismatch(format!("{} outside the 32-bit timestamp range", at)))?;
                Ok(t.encode_count(count))
            }
            (DataType::Timestamp(t), Value::Int(n)) => {
                let count = u32::try_from(*n).map_err(|_| wrong())?;
                Ok(t.encode_count(count))
            }
            _ => Err(wrong()),
        }
    }

    pub fn decode(&self, bits: &BitSeq) -> Result<Value, CodecError> {
        let bytes = || {
            bits.as_bytes()
                .ok_or_else(|| mismatch(format!("{} needs whole bytes, got {} bits", self.name(), bits.len())))
        };
        match self {
            DataType::Integer(t) => t.decode_int(bits).map(Value::Int),
            DataType::HexaString(_) => Ok(Value::Hex(BitSeq::from_bytes(bytes()?).to_hex())),
            DataType::Raw(_) => Ok(Value::Bytes(bytes()?.to_vec())),
            DataType::BitArray(_) => Ok(Value::Bits(bits.clone())),
            DataType::Ipv4(t) => t.decode_ip(bits).map(Value::Ipv4),
            DataType::Ascii(_) => Ok(Value::Text(bytes_to_text(bytes()?))),
            DataType::Timestamp(t) => {
                let count = t.decode_count(bits)?;
                t.instant_of(count)
                    .map(Value::Timestamp)
                    .ok_or_else(|| mismatch(format!("timestamp count {} out of range", count)))
            }
        }
    }

    /// Whether `bits` is a value of this type under all its constraints.
    pub fn can_parse(&self, bits: &BitSeq) -> bool {
        if !self.size().contains(bits.len()) {
            return false;
        }
        match self {
            DataType::Integer(t) => t.decode_int(bits).map_or(false, |v| t.accepts(v)),
            DataType::HexaString(t) => match (bits.as_bytes(), &t.value) {
                (Some(b), Some(v)) => b == v.as_slice(),
                (Some(_), None) => true,
                (None, _) => false,
            },
            DataType::Raw(t) => bits.as_bytes().map_or(false, |b| t.accepts(b)),
            DataType::BitArray(t) => t.value.as_ref().map_or(true, |v| v == bits),
            DataType::Ipv4(t) => t.decode_ip(bits).map_or(false, |ip| t.accepts(ip)),
            DataType::Ascii(t) => match (bits.as_bytes(), &t.value) {
                (Some(b), Some(v)) => bytes_to_text(b) == *v,
                (Some(_), None) => true,
                (None, _) => false,
            },
            DataType::Timestamp(t) => match t.decode_count(bits) {
                Ok(c) => t.value.map_or(true, |v| v == c),
                Err(_) => false,
            },
        }
    }

    /// Random value honouring every declared constraint. Types without a declared maximum
    /// length generate at most `max_bytes` bytes (or their minimum, if larger).
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R, max_bytes: usize) -> Result<BitSeq, CodecError> {
        match self {
            DataType::Integer(t) => t.generate(rng),
            DataType::HexaString(t) => {
                if let Some(v) = &t.value {
                    return Ok(BitSeq::from_bytes(v));
                }
                let n = random_len(rng, t.nb_bytes, max_bytes)?;
                Ok((0..n).map(|_| rng.random::<u8>()).collect::<Vec<u8>>().into())
            }
            DataType::Raw(t) => t.generate(rng, max_bytes),
            DataType::BitArray(t) => {
                if let Some(v) = &t.value {
                    return Ok(v.clone());
                }
                let n = random_len(rng, t.nb_bits, max_bytes * 8)?;
                Ok((0..n).map(|_| rng.random::<bool>()).collect())
            }
            DataType::Ipv4(t) => Ok(t.generate(rng)),
            DataType::Ascii(t) => t.generate(rng, max_bytes),
            DataType::Timestamp(t) => t.generate(),
        }
    }

    /// Values at the edges of the declared domain, all of them parseable: the shortest and
    /// longest lengths filled with the lowest and the highest allowed byte (or bit), the ends
    /// of an integer interval and their neighbours (plus zero when inside), the first and last
    /// host of a network. A bound value is its only boundary. Lengths without a declared
    /// maximum stop at `max_bytes`, as in [`DataType::generate`].
    pub fn boundary_values(&self, max_bytes: usize) -> Result<Vec<BitSeq>, CodecError> {
        if let Some(v) = self.value_bits()? {
            return Ok(vec![v]);
        }
        let mut out = Vec::new();
        match self {
            DataType::Integer(t) => {
                let (lo, hi) = t.domain()?;
                for v in [lo, lo.saturating_add(1), 0, hi.saturating_sub(1), hi] {
                    if (lo..=hi).contains(&v) {
                        push_unique(&mut out, t.encode_int(v)?);
                    }
                }
            }
            DataType::HexaString(t) => byte_boundaries(&mut out, t.nb_bytes, max_bytes, 0x00, 0xff)?,
            DataType::Raw(t) => {
                let (low, high) = match &t.alphabet {
                    Some(a) => match (a.iter().min(), a.iter().max()) {
                        (Some(&low), Some(&high)) => (low, high),
                        _ => return Err(mismatch("Raw alphabet is empty")),
                    },
                    None => (0x00, 0xff),
                };
                byte_boundaries(&mut out, t.nb_bytes, max_bytes, low, high)?;
            }
            DataType::BitArray(t) => {
                for n in extreme_lens(t.nb_bits, max_bytes * 8)? {
                    push_unique(&mut out, std::iter::repeat(false).take(n).collect());
                    push_unique(&mut out, std::iter::repeat(true).take(n).collect());
                }
            }
            DataType::Ipv4(t) => {
                let (first, last) = match t.network {
                    Some(net) => net.host_range(),
                    None => (u32::from(PUBLIC_BOUNDARIES[0]), u32::from(PUBLIC_BOUNDARIES[1])),
                };
                push_unique(&mut out, t.encode_ip(Ipv4Addr::from(first)));
                push_unique(&mut out, t.encode_ip(Ipv4Addr::from(last)));
            }
            DataType::Ascii(t) => byte_boundaries(&mut out, t.nb_chars, max_bytes, 0x20, 0x7e)?,
            DataType::Timestamp(t) => {
                push_unique(&mut out, t.encode_count(0));
                push_unique(&mut out, t.encode_count(u32::MAX));
            }
        }
        Ok(out)
    }

    /// Grammar-time consistency checks.
    pub fn validate(&self) -> Result<(), CodecError> {
        match self {
            DataType::Integer(t) => {
                let w = t.width();
                if w == 0 || w > 64 {
                    return Err(CodecError::InvalidGrammar(format!("Integer width {} outside 1..=64", w)));
                }
                if let Some((lo, hi)) = t.interval {
                    if lo > hi {
                        return Err(CodecError::InvalidGrammar(format!("Integer interval [{}, {}] is empty", lo, hi)));
                    }
                }
            }
            DataType::HexaString(t) => t.nb_bytes.check("HexaString nbBytes")?,
            DataType::Raw(t) => t.nb_bytes.check("Raw nbBytes")?,
            DataType::BitArray(t) => t.nb_bits.check("BitArray nbBits")?,
            DataType::Ascii(t) => t.nb_chars.check("ASCII nbChars")?,
            DataType::Ipv4(_) | DataType::Timestamp(_) => {}
        }
        if let Some(bits) = self.value_bits()? {
            if !self.can_parse(&bits) {
                return Err(CodecError::InvalidGrammar(format!(
                    "{} value {} violates its own constraints",
                    self.name(),
                    bits
                )));
            }
        }
        Ok(())
    }
}

impl From<Integer> for DataType {
    fn from(t: Integer) -> Self {
        DataType::Integer(t)
    }
}

impl From<HexaString> for DataType {
    fn from(t: HexaString) -> Self {
        DataType::HexaString(t)
    }
}

impl From<Raw> for DataType {
    fn from(t: Raw) -> Self {
        DataType::Raw(t)
    }
}

impl From<BitArray> for DataType {
    fn from(t: BitArray) -> Self {
        DataType::BitArray(t)
    }
}

impl From<Ipv4> for DataType {
    fn from(t: Ipv4) -> Self {
        DataType::Ipv4(t)
    }
}

impl From<Ascii> for DataType {
    fn from(t: Ascii) -> Self {
        DataType::Ascii(t)
    }
}

impl From<Timestamp> for DataType {
    fn from(t: Timestamp) -> Self {
        DataType::Timestamp(t)
    }
}

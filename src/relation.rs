//! Relationship values: Size, InternetChecksum and Value, computed from the bits of the
//! fields they reference. Specialization emits the result; abstraction compares it with the
//! bits found at the relationship's position.

use crate::ast::{Relation, RelationKind};
use crate::bits::BitSeq;
use crate::codec::CodecError;
use crate::types::DataType;

/// RFC 1071 checksum: one's-complement sum of big-endian 16-bit words (odd length padded
/// with a zero byte), folded to 16 bits and complemented.
pub fn internet_checksum(bytes: &[u8]) -> u16 {
    let mut sum: u64 = 0;
    for chunk in bytes.chunks(2) {
        let word = match *chunk {
            [hi, lo] => u16::from_be_bytes([hi, lo]),
            [hi] => u16::from_be_bytes([hi, 0]),
            _ => 0,
        };
        sum += u64::from(word);
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

/// Encoded value of `relation` given the bits of its target fields, in target order.
pub fn compute(relation: &Relation, targets: &[&BitSeq]) -> Result<BitSeq, CodecError> {
    match &relation.kind {
        RelationKind::Size { factor, offset } => {
            let total: usize = targets.iter().map(|t| t.len()).sum();
            let size = (total as f64 * factor + *offset as f64).trunc();
            if size < 0.0 || !size.is_finite() {
                return Err(CodecError::TypeMismatch(format!(
                    "size {} of {} bits (factor {}, offset {}) is not representable",
                    size, total, factor, offset
                )));
            }
            encode_integer(&relation.data_type, size as i128)
        }
        RelationKind::InternetChecksum => {
            let bytes = BitSeq::concat(targets.iter().copied()).to_bytes();
            encode_integer(&relation.data_type, i128::from(internet_checksum(&bytes)))
        }
        RelationKind::Value(f) => {
            let input = targets.first().copied().cloned().unwrap_or_default();
            let out = match f {
                Some(f) => f(&input).map_err(CodecError::TypeMismatch)?,
                None => input,
            };
            if !relation.data_type.size().contains(out.len()) {
                return Err(CodecError::TypeMismatch(format!(
                    "value of {} bits does not fit {} ({:?})",
                    out.len(),
                    relation.data_type.name(),
                    relation.data_type.size()
                )));
            }
            Ok(out)
        }
    }
}

fn encode_integer(data_type: &DataType, v: i128) -> Result<BitSeq, CodecError> {
    match data_type {
        DataType::Integer(t) => t.encode_int(v),
        other => Err(CodecError::TypeMismatch(format!(
            "relationship encoded as {} instead of Integer",
            other.name()
        ))),
    }
}

//! Runtime values: typed field values and the bound tree produced by both engines.

use crate::ast::VariableId;
use crate::bits::BitSeq;
use chrono::{DateTime, Utc};
use std::net::Ipv4Addr;

/// A single decoded value of a primitive type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i128),
    Bytes(Vec<u8>),
    /// Lowercase hex digits of the wire bytes.
    Hex(String),
    Bits(BitSeq),
    Text(String),
    Ipv4(Ipv4Addr),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn as_int(&self) -> Option<i128> {
        match self {
            Value::Int(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_int().and_then(|x| u64::try_from(x).ok())
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Hex(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bits(&self) -> Option<&BitSeq> {
        match self {
            Value::Bits(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_ipv4(&self) -> Option<Ipv4Addr> {
        match self {
            Value::Ipv4(ip) => Some(*ip),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(t) => Some(*t),
            _ => None,
        }
    }
}

/// Result of one specialization or abstraction: every field with the bits it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundTree {
    pub symbol: String,
    pub fields: Vec<BoundField>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundField {
    pub name: String,
    pub bits: BitSeq,
    pub node: BoundNode,
}

/// One bound grammar node. `bits` is the exact slice of the message the node covers.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundNode {
    pub variable: Option<VariableId>,
    pub name: Option<String>,
    pub bits: BitSeq,
    pub kind: BoundKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoundKind {
    Data(Value),
    Relation(Value),
    Aggregate(Vec<BoundNode>),
    /// Index of the chosen child in declaration order.
    Alternate { index: usize, child: Box<BoundNode> },
    Repeat(Vec<BoundNode>),
    /// Field content supplied by the caller instead of generated.
    Preset,
}

impl BoundTree {
    /// Concatenation of all field bits in field order.
    pub fn bits(&self) -> BitSeq {
        BitSeq::concat(self.fields.iter().map(|f| &f.bits))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.bits().to_bytes()
    }

    pub fn field(&self, name: &str) -> Option<&BoundField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Typed value of the first leaf whose variable carries `name`.
    pub fn value_of(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find_map(|f| f.node.find(name)).and_then(BoundNode::value)
    }

    /// All Data/Relation leaves in message order.
    pub fn leaves(&self) -> Vec<&BoundNode> {
        let mut out = Vec::new();
        for f in &self.fields {
            f.node.collect_leaves(&mut out);
        }
        out
    }
}

impl BoundField {
    /// Typed value when the field's domain is a single leaf.
    pub fn value(&self) -> Option<&Value> {
        self.node.value()
    }
}

impl BoundNode {
    pub fn value(&self) -> Option<&Value> {
        match &self.kind {
            BoundKind::Data(v) | BoundKind::Relation(v) => Some(v),
            _ => None,
        }
    }

    pub fn children(&self) -> Vec<&BoundNode> {
        match &self.kind {
            BoundKind::Aggregate(c) | BoundKind::Repeat(c) => c.iter().collect(),
            BoundKind::Alternate { child, .. } => vec![child.as_ref()],
            _ => Vec::new(),
        }
    }

    /// First node (depth-first, this node included) whose variable is named `name`.
    pub fn find(&self, name: &str) -> Option<&BoundNode> {
        if self.name.as_deref() == Some(name) {
            return Some(self);
        }
        self.children().into_iter().find_map(|c| c.find(name))
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a BoundNode>) {
        match &self.kind {
            BoundKind::Data(_) | BoundKind::Relation(_) => out.push(self),
            _ => {
                for c in self.children() {
                    c.collect_leaves(out);
                }
            }
        }
    }
}

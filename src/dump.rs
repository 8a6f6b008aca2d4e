//! Format bound trees for display: one line per node, children indented.
//!
//! ```text
//! Packet (5 bytes)
//!   magic: 0x504b = "PK"
//!   len: 0x01 = 1 (relation)
//!   body: alt #1
//!     0x2a = 42
//!   crc: 0xd5 = 213 (relation)
//! ```

use crate::value::{BoundKind, BoundNode, BoundTree, Value};
use std::fmt::{self, Write};

/// Short textual form of a typed value.
pub fn format_value(v: &Value) -> String {
    match v {
        Value::Int(x) => x.to_string(),
        Value::Bytes(b) => format!("0x{}", b.iter().map(|x| format!("{:02x}", x)).collect::<String>()),
        Value::Hex(s) => s.clone(),
        Value::Bits(b) => format!("0b{}", b.to_binary_string()),
        Value::Text(s) => format!("{:?}", s),
        Value::Ipv4(ip) => ip.to_string(),
        Value::Timestamp(t) => t.to_rfc3339(),
    }
}

/// Multi-line dump of a bound tree.
pub fn dump_tree(tree: &BoundTree) -> String {
    let mut out = String::new();
    let bits = tree.bits().len();
    let _ = if bits % 8 == 0 {
        writeln!(out, "{} ({} bytes)", tree.symbol, bits / 8)
    } else {
        writeln!(out, "{} ({} bits)", tree.symbol, bits)
    };
    for f in &tree.fields {
        write_node(&mut out, &f.node, 1, Some(&f.name));
    }
    out
}

fn write_node(out: &mut String, node: &BoundNode, depth: usize, label: Option<&str>) {
    let indent = "  ".repeat(depth);
    let label = match (label, node.name.as_deref()) {
        (Some(l), _) => format!("{}: ", l),
        (None, Some(n)) => format!("{}: ", n),
        (None, None) => String::new(),
    };
    let _ = match &node.kind {
        BoundKind::Data(v) => writeln!(out, "{}{}{} = {}", indent, label, node.bits, format_value(v)),
        BoundKind::Relation(v) => writeln!(out, "{}{}{} = {} (relation)", indent, label, node.bits, format_value(v)),
        BoundKind::Preset => writeln!(out, "{}{}{} (preset)", indent, label, node.bits),
        BoundKind::Aggregate(_) => writeln!(out, "{}{}seq", indent, label),
        BoundKind::Alternate { index, .. } => writeln!(out, "{}{}alt #{}", indent, label, index),
        BoundKind::Repeat(items) => writeln!(out, "{}{}repeat x{}", indent, label, items.len()),
    };
    for child in node.children() {
        write_node(out, child, depth + 1, None);
    }
}

impl fmt::Display for BoundTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&dump_tree(self))
    }
}

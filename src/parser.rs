//! Parse grammar DSL source into symbols using PEST.
//!
//! ```text
//! symbol Packet {
//!     magic:   "PK";
//!     len:     size(payload, crc) as integer(size = 16);
//!     kind:    kind = alt(0x01, 0x02);
//!     payload: raw(nb_bytes = 0..8) @persistent;
//!     crc:     checksum(payload) as integer(size = 16);
//! }
//! ```

use crate::ast::{RepeatCount, Symbol, Field, Variable};
use crate::bits::BitSeq;
use crate::memory::Svas;
use crate::types::{
    hex_to_bytes, text_to_bytes, Ascii, BitArray, DataType, Endianness, Epoch, HexaString, Integer, Ipv4, Ipv4Net, Raw,
    Sign, SizeRange, TimeUnit, Timestamp, TypeAttrs, UnitSize,
};
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser as PestParser;
use std::net::Ipv4Addr;

#[derive(PestParser)]
#[grammar = "grammar.pest"]
struct GrammarParser;

/// Parse source holding exactly one symbol.
pub fn parse(source: &str) -> Result<Symbol, String> {
    let mut symbols = parse_all(source)?;
    if symbols.len() != 1 {
        return Err(format!("expected one symbol, found {}", symbols.len()));
    }
    symbols.pop().ok_or_else(|| "Empty parse".to_string())
}

/// Parse every symbol in the source, in order.
pub fn parse_all(source: &str) -> Result<Vec<Symbol>, String> {
    let pairs = GrammarParser::parse(Rule::file, source).map_err(|e| format!("Parse error: {}", e))?;
    let file = pairs.into_iter().next().ok_or("Empty parse")?;
    file.into_inner()
        .filter(|p| p.as_rule() == Rule::symbol)
        .map(build_symbol)
        .collect()
}

fn build_symbol(pair: Pair<Rule>) -> Result<Symbol, String> {
    let mut inner = pair.into_inner();
    let name = inner.next().ok_or("symbol: missing name")?.as_str().to_string();
    let mut fields = Vec::new();
    for f in inner {
        let mut parts = f.into_inner();
        let field_name = parts.next().ok_or("field: missing name")?.as_str();
        let domain = parts.next().ok_or("field: missing variable")?;
        let domain = build_variable(domain).map_err(|e| format!("field {}: {}", field_name, e))?;
        fields.push(Field::new(field_name, domain));
    }
    Ok(Symbol::new(&name, fields))
}

fn build_variable(pair: Pair<Rule>) -> Result<Variable, String> {
    let mut name = None;
    let mut node = None;
    let mut svas = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::var_name => name = Some(inner.as_str().to_string()),
            Rule::svas => svas = Some(parse_svas(inner.as_str())?),
            _ => node = Some(inner),
        }
    }
    let node = node.ok_or("variable: missing node")?;
    let var = match (node.as_rule(), svas) {
        (Rule::data_type, Some(svas)) => {
            Variable::data_with(build_data_type(node)?, svas).map_err(|e| e.to_string())?
        }
        (Rule::data_type, None) => Variable::data(build_data_type(node)?),
        (Rule::string | Rule::hex_lit | Rule::bin_lit, svas) => {
            let data_type = build_literal(node)?;
            match svas {
                Some(svas) => Variable::data_with(data_type, svas).map_err(|e| e.to_string())?,
                None => Variable::data(data_type),
            }
        }
        (_, Some(_)) => return Err("SVAS annotations only apply to data".to_string()),
        (Rule::seq, None) => Variable::aggregate(build_children(node)?),
        (Rule::alt, None) => Variable::alternate(build_children(node)?),
        (Rule::repeat, None) => build_repeat(node)?,
        (Rule::relation, None) => build_relation(node)?,
        (other, None) => return Err(format!("unexpected {:?}", other)),
    };
    Ok(match name {
        Some(n) => var.named(&n),
        None => var,
    })
}

fn parse_svas(s: &str) -> Result<Svas, String> {
    match s.trim_start_matches('@') {
        "constant" => Ok(Svas::Constant),
        "persistent" => Ok(Svas::Persistent),
        "ephemeral" => Ok(Svas::Ephemeral),
        "volatile" => Ok(Svas::Volatile),
        other => Err(format!("unknown SVAS: {}", other)),
    }
}

fn build_children(pair: Pair<Rule>) -> Result<Vec<Variable>, String> {
    pair.into_inner().map(build_variable).collect()
}

fn build_literal(pair: Pair<Rule>) -> Result<DataType, String> {
    match pair.as_rule() {
        Rule::string => {
            let text = unescape(pair)?;
            text_to_bytes(&text).map_err(|e| e.to_string())?;
            Ok(Ascii::constant(&text).into())
        }
        Rule::hex_lit => Ok(Raw::constant(&hex_to_bytes(pair.as_str()).map_err(|e| e.to_string())?).into()),
        Rule::bin_lit => Ok(BitArray::constant(parse_bin(pair.as_str())).into()),
        other => Err(format!("not a literal: {:?}", other)),
    }
}

fn build_repeat(pair: Pair<Rule>) -> Result<Variable, String> {
    let mut inner = pair.into_inner();
    let child = build_variable(inner.next().ok_or("repeat: missing child")?)?;
    let mut count = None;
    let mut delimiter = None;
    for opt in inner {
        let rule = opt.as_rule();
        let value = opt.into_inner().next().ok_or("repeat: missing option value")?;
        let parsed = match rule {
            Rule::count_opt => match value.as_rule() {
                Rule::range => {
                    let (min, max) = parse_range(value)?;
                    let max = max.ok_or("repeat: count range needs an upper bound")?;
                    Some(RepeatCount::Range(to_usize(min)?, to_usize(max)?))
                }
                _ => Some(RepeatCount::Fixed(to_usize(parse_int(value.as_str())?)?)),
            },
            Rule::until_opt => Some(RepeatCount::Until(value.as_str().to_string())),
            Rule::delimiter_opt => {
                delimiter = Some(literal_bits(value)?);
                None
            }
            other => return Err(format!("repeat: unexpected {:?}", other)),
        };
        if let Some(c) = parsed {
            if count.replace(c).is_some() {
                return Err("repeat: count and until are exclusive".to_string());
            }
        }
    }
    let count = count.ok_or("repeat: needs count or until")?;
    Ok(match delimiter {
        Some(d) => Variable::repeat_delimited(child, count, d),
        None => Variable::repeat(child, count),
    })
}

fn build_relation(pair: Pair<Rule>) -> Result<Variable, String> {
    let mut kind = "";
    let mut targets = Vec::new();
    let mut factor = 1.0 / 8.0;
    let mut offset = 0i64;
    let mut data_type = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::relation_kind => kind = inner.as_str(),
            Rule::target => targets.push(inner.as_str().trim().to_string()),
            Rule::option => {
                let (key, value) = split_option(inner)?;
                match key.as_str() {
                    "factor" => factor = value.as_str().parse::<f64>().map_err(|e| format!("factor: {}", e))?,
                    "offset" => offset = i64::try_from(parse_int(value.as_str())?).map_err(|e| format!("offset: {}", e))?,
                    other => return Err(format!("{}: unknown option {}", kind, other)),
                }
            }
            Rule::data_type => data_type = Some(build_data_type(inner)?),
            _ => {}
        }
    }
    let data_type = data_type.ok_or("relationship: missing `as` type")?;
    let refs: Vec<&str> = targets.iter().map(String::as_str).collect();
    match kind {
        "size" => Ok(Variable::size_with(&refs, data_type, factor, offset)),
        "checksum" => Ok(Variable::checksum(&refs, data_type)),
        "value" => match refs.as_slice() {
            [target] => Ok(Variable::value(target, data_type)),
            _ => Err("value: needs exactly one target".to_string()),
        },
        other => Err(format!("unknown relationship {}", other)),
    }
}

fn split_option(pair: Pair<Rule>) -> Result<(String, Pair<Rule>), String> {
    let mut it = pair.into_inner();
    let key = it.next().ok_or("option: missing key")?.as_str().to_string();
    let value = it.next().ok_or_else(|| format!("option {}: missing value", key))?;
    Ok((key, value))
}

fn build_data_type(pair: Pair<Rule>) -> Result<DataType, String> {
    let mut inner = pair.into_inner();
    let type_name = inner.next().ok_or("type: missing name")?.as_str().to_string();
    let mut attrs = TypeAttrs::default();
    let mut rest = Vec::new();
    for opt in inner {
        let (key, value) = split_option(opt)?;
        match key.as_str() {
            "unit_size" => {
                let bits = to_usize(parse_int(value.as_str())?)?;
                attrs.unit_size = UnitSize::from_bits(bits).ok_or_else(|| format!("unit_size: {} not in 1, 4, 8, 16, 32, 64", bits))?;
            }
            "endianness" => {
                attrs.endianness = match value.as_str() {
                    "big" => Endianness::Big,
                    "little" => Endianness::Little,
                    other => return Err(format!("endianness: unknown {}", other)),
                }
            }
            "sign" => {
                attrs.sign = match value.as_str() {
                    "signed" => Sign::Signed,
                    "unsigned" => Sign::Unsigned,
                    other => return Err(format!("sign: unknown {}", other)),
                }
            }
            _ => rest.push((key, value)),
        }
    }
    let unknown = |key: &str| Err(format!("{}: unknown option {}", type_name, key));
    match type_name.as_str() {
        "integer" => {
            let mut t = Integer::new().with_attrs(attrs);
            for (key, value) in rest {
                match key.as_str() {
                    "size" => t.size = Some(to_usize(parse_int(value.as_str())?)?),
                    "interval" => {
                        let (min, max) = parse_range(value)?;
                        t.interval = Some((min, max.ok_or("interval: needs an upper bound")?));
                    }
                    "value" => t.value = Some(parse_int(value.as_str())?),
                    other => return unknown(other),
                }
            }
            Ok(t.into())
        }
        "raw" => {
            let mut t = Raw::new();
            t.attrs = attrs;
            for (key, value) in rest {
                match key.as_str() {
                    "nb_bytes" => t.nb_bytes = parse_size(value)?,
                    "alphabet" => t.alphabet = Some(literal_bytes(value)?),
                    "value" => t.value = Some(literal_bytes(value)?),
                    other => return unknown(other),
                }
            }
            Ok(t.into())
        }
        "hex" => {
            let mut t = HexaString::new();
            t.attrs = attrs;
            for (key, value) in rest {
                match key.as_str() {
                    "nb_bytes" => t.nb_bytes = parse_size(value)?,
                    "value" => {
                        let digits = match value.as_rule() {
                            Rule::string => unescape(value)?,
                            _ => value.as_str().to_string(),
                        };
                        t.value = Some(hex_to_bytes(&digits).map_err(|e| e.to_string())?);
                    }
                    other => return unknown(other),
                }
            }
            Ok(t.into())
        }
        "bits" => {
            let mut t = BitArray::new();
            t.attrs = attrs;
            for (key, value) in rest {
                match key.as_str() {
                    "nb_bits" => t.nb_bits = parse_size(value)?,
                    "value" => t.value = Some(literal_bits(value)?),
                    other => return unknown(other),
                }
            }
            Ok(t.into())
        }
        "ipv4" => {
            let mut t = Ipv4::new();
            t.attrs = attrs;
            for (key, value) in rest {
                match key.as_str() {
                    "network" => t.network = Some(unescape(value)?.parse::<Ipv4Net>().map_err(|e| e.to_string())?),
                    "value" => {
                        let text = unescape(value)?;
                        t.value = Some(text.parse::<Ipv4Addr>().map_err(|e| format!("ipv4 value {:?}: {}", text, e))?);
                    }
                    other => return unknown(other),
                }
            }
            Ok(t.into())
        }
        "ascii" => {
            let mut t = Ascii::new();
            t.attrs = attrs;
            for (key, value) in rest {
                match key.as_str() {
                    "nb_chars" => t.nb_chars = parse_size(value)?,
                    "value" => {
                        let text = unescape(value)?;
                        text_to_bytes(&text).map_err(|e| e.to_string())?;
                        t.value = Some(text);
                    }
                    other => return unknown(other),
                }
            }
            Ok(t.into())
        }
        "timestamp" => {
            let mut t = Timestamp::new();
            t.attrs = attrs;
            for (key, value) in rest {
                match key.as_str() {
                    "epoch" => t.epoch = parse_epoch(value.as_str())?,
                    "unity" => t.unity = parse_unit(value.as_str())?,
                    "value" => {
                        let n = parse_int(value.as_str())?;
                        t.value = Some(u32::try_from(n).map_err(|_| format!("timestamp value {} outside 32 bits", n))?);
                    }
                    other => return unknown(other),
                }
            }
            Ok(t.into())
        }
        other => Err(format!("unknown type {}", other)),
    }
}

fn parse_epoch(s: &str) -> Result<Epoch, String> {
    match s {
        "unix" => Ok(Epoch::Unix),
        "windows" => Ok(Epoch::Windows),
        "macos" => Ok(Epoch::MacOsClassic),
        "ntp" => Ok(Epoch::Ntp),
        "gps" => Ok(Epoch::Gps),
        other => Err(format!("unknown epoch {}", other)),
    }
}

fn parse_unit(s: &str) -> Result<TimeUnit, String> {
    match s {
        "second" => Ok(TimeUnit::Second),
        "decisecond" => Ok(TimeUnit::Decisecond),
        "centisecond" => Ok(TimeUnit::Centisecond),
        "millisecond" => Ok(TimeUnit::Millisecond),
        "microsecond" => Ok(TimeUnit::Microsecond),
        "nanosecond" => Ok(TimeUnit::Nanosecond),
        other => Err(format!("unknown time unit {}", other)),
    }
}

fn parse_int(s: &str) -> Result<i128, String> {
    s.parse::<i128>().map_err(|e| format!("invalid integer {:?}: {}", s, e))
}

fn to_usize(v: i128) -> Result<usize, String> {
    usize::try_from(v).map_err(|_| format!("{} is not a valid count", v))
}

fn parse_range(pair: Pair<Rule>) -> Result<(i128, Option<i128>), String> {
    let mut it = pair.into_inner();
    let min = parse_int(it.next().ok_or("range: missing minimum")?.as_str())?;
    let max = match it.next() {
        Some(p) => Some(parse_int(p.as_str())?),
        None => None,
    };
    Ok((min, max))
}

/// `n` (exact) or `min..max` / `min..` as a size range.
fn parse_size(pair: Pair<Rule>) -> Result<SizeRange, String> {
    match pair.as_rule() {
        Rule::range => {
            let (min, max) = parse_range(pair)?;
            let min = to_usize(min)?;
            Ok(match max {
                Some(max) => SizeRange::between(min, to_usize(max)?),
                None => SizeRange::at_least(min),
            })
        }
        _ => Ok(SizeRange::exact(to_usize(parse_int(pair.as_str())?)?)),
    }
}

fn parse_bin(s: &str) -> BitSeq {
    s.trim_start_matches("0b").chars().map(|c| c == '1').collect()
}

fn literal_bytes(pair: Pair<Rule>) -> Result<Vec<u8>, String> {
    match pair.as_rule() {
        Rule::string => text_to_bytes(&unescape(pair)?).map_err(|e| e.to_string()),
        Rule::hex_lit => hex_to_bytes(pair.as_str()).map_err(|e| e.to_string()),
        other => Err(format!("expected a string or hex literal, got {:?}", other)),
    }
}

fn literal_bits(pair: Pair<Rule>) -> Result<BitSeq, String> {
    match pair.as_rule() {
        Rule::bin_lit => Ok(parse_bin(pair.as_str())),
        _ => literal_bytes(pair).map(BitSeq::from),
    }
}

fn unescape(pair: Pair<Rule>) -> Result<String, String> {
    if pair.as_rule() != Rule::string {
        return Err(format!("expected a string, got {}", pair.as_str()));
    }
    let raw = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => return Err("dangling escape".to_string()),
        }
    }
    Ok(out)
}

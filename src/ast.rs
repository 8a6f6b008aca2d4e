//! Grammar tree: Symbols made of Fields, each Field holding one Variable tree.

use crate::bits::BitSeq;
use crate::codec::CodecError;
use crate::deps;
use crate::memory::Svas;
use crate::types::DataType;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_VARIABLE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a variable; keys the value memory. Clones of a variable share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableId(u64);

impl VariableId {
    pub fn fresh() -> Self {
        VariableId(NEXT_VARIABLE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Deterministic transformation used by the Value relationship.
pub type ValueFn = Arc<dyn Fn(&BitSeq) -> Result<BitSeq, String> + Send + Sync>;

/// Repetition predicate, called with the iterations accumulated so far.
pub type RepeatFn = Arc<dyn Fn(&[BitSeq]) -> RepeatDecision + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatDecision {
    Continue,
    Stop,
}

/// A grammar node.
#[derive(Debug, Clone)]
pub struct Variable {
    pub id: VariableId,
    pub name: Option<String>,
    pub kind: VariableKind,
}

#[derive(Debug, Clone)]
pub enum VariableKind {
    Data(Data),
    Relation(Relation),
    /// Children matched/generated in order.
    Aggregate(Vec<Variable>),
    /// Exactly one child; first match wins when parsing.
    Alternate(Vec<Variable>),
    Repeat(Repeat),
}

#[derive(Debug, Clone)]
pub struct Data {
    pub data_type: DataType,
    pub svas: Svas,
    /// Initial value; mandatory for CONSTANT.
    pub value: Option<BitSeq>,
}

#[derive(Debug, Clone)]
pub struct Relation {
    /// Encoding of the computed value.
    pub data_type: DataType,
    /// Names of the fields this relationship reads.
    pub targets: Vec<String>,
    pub kind: RelationKind,
}

#[derive(Clone)]
pub enum RelationKind {
    /// `trunc(total_bits * factor + offset)`.
    Size { factor: f64, offset: i64 },
    /// RFC 1071 checksum over the concatenated target bytes.
    InternetChecksum,
    /// Function of the single target's bits; identity when `None`.
    Value(Option<ValueFn>),
}

impl fmt::Debug for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationKind::Size { factor, offset } => write!(f, "Size {{ factor: {}, offset: {} }}", factor, offset),
            RelationKind::InternetChecksum => write!(f, "InternetChecksum"),
            RelationKind::Value(Some(_)) => write!(f, "Value(<fn>)"),
            RelationKind::Value(None) => write!(f, "Value(identity)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Repeat {
    pub child: Box<Variable>,
    pub count: RepeatCount,
    /// Inserted between iterations when generating, expected between them when parsing.
    pub delimiter: Option<BitSeq>,
}

#[derive(Clone)]
pub enum RepeatCount {
    Fixed(usize),
    Range(usize, usize),
    /// Ends when the named field matches at the current position.
    Until(String),
    Predicate(RepeatFn),
}

impl fmt::Debug for RepeatCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepeatCount::Fixed(n) => write!(f, "Fixed({})", n),
            RepeatCount::Range(a, b) => write!(f, "Range({}, {})", a, b),
            RepeatCount::Until(field) => write!(f, "Until({})", field),
            RepeatCount::Predicate(_) => write!(f, "Predicate(<fn>)"),
        }
    }
}

impl Variable {
    pub fn new(kind: VariableKind) -> Self {
        Variable {
            id: VariableId::fresh(),
            name: None,
            kind,
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Data leaf: CONSTANT when the type carries a value, EPHEMERAL otherwise.
    pub fn data(data_type: impl Into<DataType>) -> Self {
        let data_type = data_type.into();
        let value = data_type.value_bits().ok().flatten();
        let svas = if value.is_some() { Svas::Constant } else { Svas::Ephemeral };
        Variable::new(VariableKind::Data(Data { data_type, svas, value }))
    }

    pub fn data_with(data_type: impl Into<DataType>, svas: Svas) -> Result<Self, CodecError> {
        let data_type = data_type.into();
        let value = data_type.value_bits()?;
        if svas == Svas::Constant && value.is_none() {
            return Err(CodecError::InvalidGrammar(format!(
                "constant {} variable needs a value",
                data_type.name()
            )));
        }
        Ok(Variable::new(VariableKind::Data(Data { data_type, svas, value })))
    }

    /// Size relationship in bytes (factor 1/8, offset 0).
    pub fn size(targets: &[&str], data_type: impl Into<DataType>) -> Self {
        Variable::size_with(targets, data_type, 1.0 / 8.0, 0)
    }

    pub fn size_with(targets: &[&str], data_type: impl Into<DataType>, factor: f64, offset: i64) -> Self {
        Variable::relation(targets, data_type, RelationKind::Size { factor, offset })
    }

    pub fn checksum(targets: &[&str], data_type: impl Into<DataType>) -> Self {
        Variable::relation(targets, data_type, RelationKind::InternetChecksum)
    }

    /// Copy of the target field's bits.
    pub fn value(target: &str, data_type: impl Into<DataType>) -> Self {
        Variable::relation(&[target], data_type, RelationKind::Value(None))
    }

    pub fn value_with(target: &str, data_type: impl Into<DataType>, f: ValueFn) -> Self {
        Variable::relation(&[target], data_type, RelationKind::Value(Some(f)))
    }

    fn relation(targets: &[&str], data_type: impl Into<DataType>, kind: RelationKind) -> Self {
        Variable::new(VariableKind::Relation(Relation {
            data_type: data_type.into(),
            targets: targets.iter().map(|t| t.to_string()).collect(),
            kind,
        }))
    }

    pub fn aggregate(children: Vec<Variable>) -> Self {
        Variable::new(VariableKind::Aggregate(children))
    }

    pub fn alternate(children: Vec<Variable>) -> Self {
        Variable::new(VariableKind::Alternate(children))
    }

    pub fn repeat(child: Variable, count: RepeatCount) -> Self {
        Variable::new(VariableKind::Repeat(Repeat {
            child: Box::new(child),
            count,
            delimiter: None,
        }))
    }

    pub fn repeat_delimited(child: Variable, count: RepeatCount, delimiter: BitSeq) -> Self {
        Variable::new(VariableKind::Repeat(Repeat {
            child: Box::new(child),
            count,
            delimiter: Some(delimiter),
        }))
    }

    /// Display label: the variable name, or its kind.
    pub fn label(&self) -> String {
        if let Some(n) = &self.name {
            return n.clone();
        }
        match &self.kind {
            VariableKind::Data(d) => d.data_type.name().to_string(),
            VariableKind::Relation(r) => format!("{:?}", r.kind),
            VariableKind::Aggregate(_) => "Agg".to_string(),
            VariableKind::Alternate(_) => "Alt".to_string(),
            VariableKind::Repeat(_) => "Repeat".to_string(),
        }
    }
}

/// A named slot of a symbol.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub domain: Variable,
}

impl Field {
    pub fn new(name: &str, domain: Variable) -> Self {
        Field {
            name: name.to_string(),
            domain,
        }
    }
}

/// A message format: ordered fields.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub fields: Vec<Field>,
}

impl Symbol {
    pub fn new(name: &str, fields: Vec<Field>) -> Self {
        Symbol {
            name: name.to_string(),
            fields,
        }
    }
}

/// Symbol with names resolved to field indices, validated and ordered for evaluation.
#[derive(Debug, Clone)]
pub struct ResolvedSymbol {
    pub symbol: Symbol,
    fields_by_name: HashMap<String, usize>,
    relation_targets: HashMap<VariableId, Vec<usize>>,
    sentinels: HashMap<VariableId, usize>,
    order: Vec<usize>,
    generation_order: Vec<usize>,
}

impl ResolvedSymbol {
    pub fn resolve(symbol: Symbol) -> Result<Self, CodecError> {
        let mut fields_by_name = HashMap::new();
        for (i, f) in symbol.fields.iter().enumerate() {
            if fields_by_name.insert(f.name.clone(), i).is_some() {
                return Err(CodecError::InvalidGrammar(format!("Duplicate field name: {}", f.name)));
            }
        }
        let mut resolver = Resolver {
            fields_by_name: &fields_by_name,
            relation_targets: HashMap::new(),
            sentinels: HashMap::new(),
            edges: vec![Vec::new(); symbol.fields.len()],
            sentinel_edges: Vec::new(),
        };
        for (i, f) in symbol.fields.iter().enumerate() {
            resolver.visit(i, &f.domain)?;
        }
        let names: Vec<&str> = symbol.fields.iter().map(|f| f.name.as_str()).collect();
        let order = deps::evaluation_order(&names, &resolver.edges)?;
        // Sentinels are generated before the repetitions they end, unless that would close a
        // cycle (a sentinel reading its own repetition), in which case the plain order is kept.
        let mut with_sentinels = resolver.edges.clone();
        for &(field, sentinel) in &resolver.sentinel_edges {
            if !with_sentinels[field].contains(&sentinel) {
                with_sentinels[field].push(sentinel);
            }
        }
        let generation_order = deps::evaluation_order(&names, &with_sentinels).unwrap_or_else(|_| order.clone());
        let Resolver {
            relation_targets,
            sentinels,
            ..
        } = resolver;
        Ok(ResolvedSymbol {
            symbol,
            fields_by_name,
            relation_targets,
            sentinels,
            order,
            generation_order,
        })
    }

    pub fn name(&self) -> &str {
        &self.symbol.name
    }

    pub fn fields(&self) -> &[Field] {
        &self.symbol.fields
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields_by_name.get(name).copied()
    }

    /// Field indices read by the relationship `id`.
    pub fn targets_of(&self, id: VariableId) -> &[usize] {
        self.relation_targets.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Sentinel field of an `Until` repetition.
    pub fn sentinel_of(&self, id: VariableId) -> Option<usize> {
        self.sentinels.get(&id).copied()
    }

    /// Field indices such that every field comes after the fields its relationships read.
    pub fn evaluation_order(&self) -> &[usize] {
        &self.order
    }

    /// Evaluation order that also puts each `Until` sentinel field before the repetition it
    /// ends, whenever that adds no cycle.
    pub fn generation_order(&self) -> &[usize] {
        &self.generation_order
    }
}

struct Resolver<'a> {
    fields_by_name: &'a HashMap<String, usize>,
    relation_targets: HashMap<VariableId, Vec<usize>>,
    sentinels: HashMap<VariableId, usize>,
    edges: Vec<Vec<usize>>,
    /// `(repeating field, sentinel field)` pairs.
    sentinel_edges: Vec<(usize, usize)>,
}

impl Resolver<'_> {
    fn field(&self, name: &str) -> Result<usize, CodecError> {
        self.fields_by_name
            .get(name)
            .copied()
            .ok_or_else(|| CodecError::InvalidGrammar(format!("Unknown field: {}", name)))
    }

    fn visit(&mut self, field: usize, v: &Variable) -> Result<(), CodecError> {
        match &v.kind {
            VariableKind::Data(d) => {
                d.data_type.validate()?;
                match &d.value {
                    None if d.svas == Svas::Constant => {
                        return Err(CodecError::InvalidGrammar(format!(
                            "constant variable {} has no value",
                            v.label()
                        )));
                    }
                    Some(bits) if !d.data_type.can_parse(bits) => {
                        return Err(CodecError::InvalidGrammar(format!(
                            "value {} of {} is not a valid {}",
                            bits,
                            v.label(),
                            d.data_type.name()
                        )));
                    }
                    _ => {}
                }
            }
            VariableKind::Relation(r) => {
                r.data_type.validate()?;
                if r.targets.is_empty() {
                    return Err(CodecError::InvalidGrammar(format!("relationship {} has no target", v.label())));
                }
                match r.kind {
                    RelationKind::Size { .. } | RelationKind::InternetChecksum
                        if !matches!(r.data_type, DataType::Integer(_)) =>
                    {
                        return Err(CodecError::InvalidGrammar(format!(
                            "{} must be encoded as an Integer, not {}",
                            v.label(),
                            r.data_type.name()
                        )));
                    }
                    RelationKind::Value(_) if r.targets.len() != 1 => {
                        return Err(CodecError::InvalidGrammar(format!(
                            "value relationship {} needs exactly one target",
                            v.label()
                        )));
                    }
                    _ => {}
                }
                let mut targets = Vec::with_capacity(r.targets.len());
                for t in &r.targets {
                    let idx = self.field(t)?;
                    targets.push(idx);
                    if !self.edges[field].contains(&idx) {
                        self.edges[field].push(idx);
                    }
                }
                self.relation_targets.insert(v.id, targets);
            }
            VariableKind::Aggregate(children) | VariableKind::Alternate(children) => {
                if children.is_empty() {
                    return Err(CodecError::InvalidGrammar(format!("{} has no children", v.label())));
                }
                for c in children {
                    self.visit(field, c)?;
                }
            }
            VariableKind::Repeat(rep) => {
                match &rep.count {
                    RepeatCount::Range(min, max) if min > max => {
                        return Err(CodecError::InvalidGrammar(format!(
                            "repetition {} has min {} above max {}",
                            v.label(),
                            min,
                            max
                        )));
                    }
                    RepeatCount::Until(name) => {
                        let idx = self.field(name)?;
                        if idx == field {
                            return Err(CodecError::InvalidGrammar(format!(
                                "repetition {} cannot end on its own field",
                                v.label()
                            )));
                        }
                        self.sentinels.insert(v.id, idx);
                        self.sentinel_edges.push((field, idx));
                    }
                    _ => {}
                }
                if rep.delimiter.as_ref().is_some_and(BitSeq::is_empty) {
                    return Err(CodecError::InvalidGrammar(format!("repetition {} has an empty delimiter", v.label())));
                }
                self.visit(field, &rep.child)?;
            }
        }
        Ok(())
    }
}

//! Specialization: generating a concrete message from a symbol.
//!
//! Fields are generated in dependency order, so every relationship finds the bits of the
//! fields it reads already fixed (and every sentinel-terminated repetition finds the bits of
//! its sentinel), and are then laid out in declaration order. Memory writes
//! are staged in an overlay (read back within the same call) and committed only once the
//! whole message has been produced.

use crate::ast::{Data, Repeat, RepeatCount, RepeatDecision, ResolvedSymbol, Variable, VariableId, VariableKind};
use crate::bits::BitSeq;
use crate::codec::{CodecConfig, CodecError, GenerationStrategy, SpecializeOptions};
use crate::memory::{Memory, Svas};
use crate::relation;
use crate::value::{BoundField, BoundKind, BoundNode, BoundTree};
use crate::walk;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

/// Sentinel-terminated repetitions generate at most this many iterations.
const UNTIL_MAX_GENERATED: usize = 8;
/// Attempts at generating an iteration that keeps the sentinel from matching early.
const SENTINEL_RETRIES: usize = 16;

pub struct Specializer<'a> {
    resolved: &'a ResolvedSymbol,
    config: &'a CodecConfig,
    memory: &'a Memory,
    options: &'a SpecializeOptions,
    rng: StdRng,
    overlay: HashMap<VariableId, (Svas, BitSeq)>,
    field_bits: Vec<Option<BitSeq>>,
}

impl<'a> Specializer<'a> {
    pub fn new(
        resolved: &'a ResolvedSymbol,
        config: &'a CodecConfig,
        memory: &'a Memory,
        options: &'a SpecializeOptions,
    ) -> Result<Self, CodecError> {
        if let Some(unknown) = options.presets.keys().find(|name| resolved.field_index(name).is_none()) {
            return Err(CodecError::InvalidGrammar(format!("preset for unknown field: {}", unknown)));
        }
        let seed = options.seed.unwrap_or_else(rand::random::<u64>);
        tracing::debug!(symbol = resolved.name(), seed, "specializing");
        Ok(Specializer {
            resolved,
            config,
            memory,
            options,
            rng: StdRng::seed_from_u64(seed),
            overlay: HashMap::new(),
            field_bits: vec![None; resolved.fields().len()],
        })
    }

    pub fn run(mut self) -> Result<BoundTree, CodecError> {
        let resolved = self.resolved;
        let fields = resolved.fields();
        let mut nodes: Vec<Option<BoundNode>> = vec![None; fields.len()];
        for &i in resolved.generation_order() {
            let field = &fields[i];
            let node = match self.options.presets.get(&field.name) {
                Some(bits) => BoundNode {
                    variable: Some(field.domain.id),
                    name: field.domain.name.clone(),
                    bits: bits.clone(),
                    kind: BoundKind::Preset,
                },
                None => self.generate(i, &field.domain).map_err(|e| in_field(&field.name, e))?,
            };
            tracing::trace!(field = %field.name, bits = node.bits.len(), "generated field");
            self.field_bits[i] = Some(node.bits.clone());
            nodes[i] = Some(node);
        }

        let mut out = Vec::with_capacity(fields.len());
        for (field, node) in fields.iter().zip(nodes) {
            let node = node.ok_or_else(|| CodecError::Specialization {
                field: field.name.clone(),
                reason: "field was never generated".to_string(),
            })?;
            out.push(BoundField {
                name: field.name.clone(),
                bits: node.bits.clone(),
                node,
            });
        }

        for (id, (svas, bits)) in self.overlay.drain() {
            self.memory.write(id, svas, bits)?;
        }
        let tree = BoundTree {
            symbol: resolved.name().to_string(),
            fields: out,
        };
        tracing::debug!(symbol = %tree.symbol, bits = tree.bits().len(), "specialized");
        Ok(tree)
    }

    fn generate(&mut self, field: usize, v: &Variable) -> Result<BoundNode, CodecError> {
        match &v.kind {
            VariableKind::Data(d) => {
                let bits = self.data_bits(v.id, d)?;
                let value = d.data_type.decode(&bits)?;
                Ok(node(v, bits, BoundKind::Data(value)))
            }
            VariableKind::Relation(r) => {
                let mut targets = Vec::new();
                for &t in self.resolved.targets_of(v.id) {
                    let bits = self.field_bits[t].as_ref().ok_or_else(|| {
                        CodecError::InvalidGrammar(format!(
                            "{} read before field {} was generated",
                            v.label(),
                            self.resolved.fields()[t].name
                        ))
                    })?;
                    targets.push(bits);
                }
                let bits = relation::compute(r, &targets)?;
                let value = r.data_type.decode(&bits)?;
                Ok(node(v, bits, BoundKind::Relation(value)))
            }
            VariableKind::Aggregate(children) => {
                let nodes = children
                    .iter()
                    .map(|c| self.generate(field, c))
                    .collect::<Result<Vec<_>, _>>()?;
                let bits = BitSeq::concat(nodes.iter().map(|n| &n.bits));
                Ok(node(v, bits, BoundKind::Aggregate(nodes)))
            }
            VariableKind::Alternate(children) => {
                let index = match self.options.alternates.get(&v.id) {
                    Some(&i) if i < children.len() => i,
                    Some(&i) => {
                        return Err(CodecError::TypeMismatch(format!(
                            "{} has no child {} (it has {})",
                            v.label(),
                            i,
                            children.len()
                        )))
                    }
                    None => self.rng.random_range(0..children.len()),
                };
                let child = self.generate(field, &children[index])?;
                Ok(node(v, child.bits.clone(), BoundKind::Alternate { index, child: Box::new(child) }))
            }
            VariableKind::Repeat(rep) => {
                let mut iterations: Vec<BoundNode> = Vec::new();
                match &rep.count {
                    RepeatCount::Fixed(n) => {
                        for _ in 0..*n {
                            iterations.push(self.generate(field, &rep.child)?);
                        }
                    }
                    RepeatCount::Range(min, max) => {
                        let n = match self.options.strategy {
                            GenerationStrategy::Random => self.rng.random_range(*min..=*max),
                            GenerationStrategy::Boundary if self.rng.random::<bool>() => *min,
                            GenerationStrategy::Boundary => *max,
                        };
                        for _ in 0..n {
                            iterations.push(self.generate(field, &rep.child)?);
                        }
                    }
                    RepeatCount::Until(_) => {
                        let sentinel = self
                            .resolved
                            .sentinel_of(v.id)
                            .ok_or_else(|| CodecError::InvalidGrammar(format!("{} has no sentinel", v.label())))?;
                        let tail = self.field_bits[sentinel].clone();
                        let n = self.rng.random_range(0..=self.config.max_repeat.min(UNTIL_MAX_GENERATED));
                        for _ in 0..n {
                            match self.generate_unlike(field, rep, &iterations, sentinel, tail.as_ref())? {
                                Some(it) => iterations.push(it),
                                None => break,
                            }
                        }
                    }
                    RepeatCount::Predicate(f) => {
                        let mut seen: Vec<BitSeq> = Vec::new();
                        while seen.len() < self.config.max_repeat && f(seen.as_slice()) == RepeatDecision::Continue {
                            let it = self.generate(field, &rep.child)?;
                            seen.push(it.bits.clone());
                            iterations.push(it);
                        }
                    }
                }
                let (bits, _) = assemble(&iterations, rep.delimiter.as_ref(), None);
                Ok(node(v, bits, BoundKind::Repeat(iterations)))
            }
        }
    }

    /// Next iteration of a sentinel-terminated repetition.
    ///
    /// The candidate is appended to `done`, followed by the sentinel's own bits when they are
    /// known, and the sentinel must match at none of the iteration starts of that stream (the
    /// offsets where the matcher looks for it). `None` when no candidate qualifies, which ends
    /// the repetition.
    fn generate_unlike(
        &mut self,
        field: usize,
        rep: &Repeat,
        done: &[BoundNode],
        sentinel: usize,
        tail: Option<&BitSeq>,
    ) -> Result<Option<BoundNode>, CodecError> {
        for _ in 0..SENTINEL_RETRIES {
            let staged = self.overlay.clone();
            let candidate = self.generate(field, &rep.child)?;
            let mut stream_nodes = done.to_vec();
            stream_nodes.push(candidate);
            let (stream, starts) = assemble(&stream_nodes, rep.delimiter.as_ref(), tail);
            let mut early = false;
            for &start in &starts {
                if walk::match_prefix(self.resolved, self.config, self.memory, sentinel, &stream, start)?.is_some() {
                    early = true;
                    break;
                }
            }
            if !early {
                return Ok(stream_nodes.pop());
            }
            self.overlay = staged;
        }
        tracing::debug!(
            sentinel = %self.resolved.fields()[sentinel].name,
            iterations = done.len(),
            "sentinel would match early, ending repetition"
        );
        Ok(None)
    }

    fn remembered(&self, id: VariableId) -> Option<BitSeq> {
        match self.overlay.get(&id) {
            Some((_, bits)) => Some(bits.clone()),
            None => self.memory.read(id),
        }
    }

    /// Fresh value for `d` under the configured strategy.
    fn fresh(&mut self, d: &Data) -> Result<BitSeq, CodecError> {
        let max = self.config.max_generated_bytes;
        match self.options.strategy {
            GenerationStrategy::Random => d.data_type.generate(&mut self.rng, max),
            GenerationStrategy::Boundary => {
                let mut values = d.data_type.boundary_values(max)?;
                if values.is_empty() {
                    return d.data_type.generate(&mut self.rng, max);
                }
                let pick = self.rng.random_range(0..values.len());
                Ok(values.swap_remove(pick))
            }
        }
    }

    fn data_bits(&mut self, id: VariableId, d: &Data) -> Result<BitSeq, CodecError> {
        match d.svas {
            Svas::Constant => self
                .remembered(id)
                .or_else(|| d.value.clone())
                .ok_or_else(|| CodecError::TypeMismatch("constant variable has no value".to_string())),
            Svas::Persistent => {
                if let Some(bits) = self.remembered(id) {
                    return Ok(bits);
                }
                let bits = match &d.value {
                    Some(v) => v.clone(),
                    None => self.fresh(d)?,
                };
                self.overlay.insert(id, (Svas::Persistent, bits.clone()));
                Ok(bits)
            }
            Svas::Ephemeral => {
                let bits = self.fresh(d)?;
                self.overlay.insert(id, (Svas::Ephemeral, bits.clone()));
                Ok(bits)
            }
            Svas::Volatile => self.fresh(d),
        }
    }
}

/// Iterations joined by `delimiter`, then `tail`, with the offset where each iteration starts
/// (its leading delimiter included).
fn assemble(iterations: &[BoundNode], delimiter: Option<&BitSeq>, tail: Option<&BitSeq>) -> (BitSeq, Vec<usize>) {
    let mut bits = BitSeq::new();
    let mut starts = Vec::with_capacity(iterations.len());
    for (i, it) in iterations.iter().enumerate() {
        starts.push(bits.len());
        if i > 0 {
            if let Some(d) = delimiter {
                bits.extend_from(d);
            }
        }
        bits.extend_from(&it.bits);
    }
    if let Some(t) = tail {
        bits.extend_from(t);
    }
    (bits, starts)
}

fn node(v: &Variable, bits: BitSeq, kind: BoundKind) -> BoundNode {
    BoundNode {
        variable: Some(v.id),
        name: v.name.clone(),
        bits,
        kind,
    }
}

/// Attributes type-level failures to the field being generated.
fn in_field(field: &str, e: CodecError) -> CodecError {
    match e {
        CodecError::TypeMismatch(reason) => CodecError::Specialization {
            field: field.to_string(),
            reason,
        },
        other => other,
    }
}

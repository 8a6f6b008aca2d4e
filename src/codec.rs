//! Grammar codec: specialize a symbol into bytes and abstract bytes back into a bound tree.
//!
//! A [`Codec`] owns a resolved symbol (names checked, relationship targets resolved, cycles
//! rejected) and a [`CodecConfig`]. The [`Memory`] is passed to every call so that callers
//! decide whether sessions share values or stay isolated.

use crate::ast::{ResolvedSymbol, Symbol, VariableId};
use crate::bits::BitSeq;
use crate::memory::{Memory, ResetScope};
use crate::specialize::Specializer;
use crate::value::BoundTree;
use crate::walk;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),
    #[error("Immutable write: constant variable {variable} is already set")]
    ImmutableWrite { variable: VariableId },
    #[error("Cyclic dependency: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),
    #[error("Specialization failed on field {field}: {reason}")]
    Specialization { field: String, reason: String },
    #[error("Match failure: data does not conform to {symbol} (deepest failure in {field} at bit {offset})")]
    MatchFailure { symbol: String, field: String, offset: usize },
    #[error("Abstraction timeout after {steps} backtracking steps")]
    AbstractionTimeout { steps: usize },
    #[error("Invalid grammar: {0}")]
    InvalidGrammar(String),
}

/// Engine limits shared by every call on a [`Codec`].
#[derive(Debug, Clone, PartialEq)]
pub struct CodecConfig {
    /// Choice points resumed per abstraction before giving up.
    pub backtrack_budget: usize,
    /// Wall-clock limit per abstraction, checked at choice points.
    pub deadline: Option<Duration>,
    /// Iteration cap for repetitions that end on a sentinel or predicate.
    pub max_repeat: usize,
    /// Length cap for generated values whose type has no declared maximum.
    pub max_generated_bytes: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        CodecConfig {
            backtrack_budget: 100_000,
            deadline: None,
            max_repeat: 256,
            max_generated_bytes: 256,
        }
    }
}

impl CodecConfig {
    pub fn with_backtrack_budget(mut self, steps: usize) -> Self {
        self.backtrack_budget = steps;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_max_repeat(mut self, n: usize) -> Self {
        self.max_repeat = n;
        self
    }

    pub fn with_max_generated_bytes(mut self, n: usize) -> Self {
        self.max_generated_bytes = n;
        self
    }
}

/// How specialization picks values that the grammar leaves free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GenerationStrategy {
    /// Uniform over each type's domain.
    #[default]
    Random,
    /// Only [`DataType::boundary_values`](crate::DataType::boundary_values), chosen with the
    /// seeded generator; range repetitions take their minimum or maximum count.
    Boundary,
}

#[derive(Debug, Clone, Default)]
pub struct SpecializeOptions {
    /// Seed for the random generator; drawn from the OS when absent.
    pub seed: Option<u64>,
    /// Field name -> bits emitted verbatim instead of generating the field.
    pub presets: HashMap<String, BitSeq>,
    /// Alternate variable -> index of the child to generate.
    pub alternates: HashMap<VariableId, usize>,
    pub strategy: GenerationStrategy,
}

impl SpecializeOptions {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_preset(mut self, field: &str, bits: impl Into<BitSeq>) -> Self {
        self.presets.insert(field.to_string(), bits.into());
        self
    }

    pub fn with_alternate(mut self, alternate: VariableId, child: usize) -> Self {
        self.alternates.insert(alternate, child);
        self
    }

    pub fn with_strategy(mut self, strategy: GenerationStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AbstractOptions {
    /// Overrides [`CodecConfig::backtrack_budget`] for one call.
    pub backtrack_budget: Option<usize>,
}

impl AbstractOptions {
    pub fn with_backtrack_budget(mut self, steps: usize) -> Self {
        self.backtrack_budget = Some(steps);
        self
    }
}

#[derive(Debug)]
pub struct Codec {
    resolved: ResolvedSymbol,
    config: CodecConfig,
}

impl Codec {
    /// Resolves `symbol`; grammar errors and dependency cycles are reported here, before any
    /// byte is produced or consumed.
    pub fn new(symbol: Symbol) -> Result<Self, CodecError> {
        Codec::with_config(symbol, CodecConfig::default())
    }

    pub fn with_config(symbol: Symbol, config: CodecConfig) -> Result<Self, CodecError> {
        let resolved = ResolvedSymbol::resolve(symbol)?;
        tracing::debug!(
            symbol = resolved.name(),
            fields = resolved.fields().len(),
            "resolved symbol"
        );
        Ok(Codec { resolved, config })
    }

    pub fn symbol(&self) -> &Symbol {
        &self.resolved.symbol
    }

    pub fn resolved(&self) -> &ResolvedSymbol {
        &self.resolved
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Generates one message.
    pub fn specialize(&self, memory: &Memory) -> Result<Vec<u8>, CodecError> {
        Ok(self.specialize_with(memory, &SpecializeOptions::default())?.to_bytes())
    }

    /// Generates one message and returns the full bound tree.
    pub fn specialize_with(&self, memory: &Memory, options: &SpecializeOptions) -> Result<BoundTree, CodecError> {
        Specializer::new(&self.resolved, &self.config, memory, options)?.run()
    }

    /// Parses `data` against the symbol.
    pub fn abstract_data(&self, memory: &Memory, data: &[u8]) -> Result<BoundTree, CodecError> {
        self.abstract_with(memory, data, AbstractOptions::default())
    }

    pub fn abstract_with(&self, memory: &Memory, data: &[u8], options: AbstractOptions) -> Result<BoundTree, CodecError> {
        self.abstract_bits(memory, &BitSeq::from_bytes(data), options)
    }

    /// Parses a bit sequence; needed for symbols whose total length is not a whole number
    /// of bytes.
    pub fn abstract_bits(&self, memory: &Memory, data: &BitSeq, options: AbstractOptions) -> Result<BoundTree, CodecError> {
        let budget = options.backtrack_budget.unwrap_or(self.config.backtrack_budget);
        walk::abstract_bits(&self.resolved, &self.config, memory, data, budget)
    }
}

/// One-shot specialization with the default configuration.
pub fn specialize(symbol: &Symbol, memory: &Memory, seed: Option<u64>) -> Result<Vec<u8>, CodecError> {
    let codec = Codec::new(symbol.clone())?;
    let options = SpecializeOptions {
        seed,
        ..SpecializeOptions::default()
    };
    Ok(codec.specialize_with(memory, &options)?.to_bytes())
}

/// One-shot abstraction with the default configuration.
pub fn abstract_data(
    symbol: &Symbol,
    memory: &Memory,
    data: &[u8],
    backtrack_budget: Option<usize>,
) -> Result<BoundTree, CodecError> {
    let codec = Codec::new(symbol.clone())?;
    codec.abstract_with(memory, data, AbstractOptions { backtrack_budget })
}

pub fn reset_value_memory(memory: &Memory, scope: ResetScope) {
    memory.reset(scope);
}

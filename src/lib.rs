//! # protovocab: grammar engine for binary message formats
//!
//! A [`Symbol`] describes a family of messages as ordered [`Field`]s, each holding a tree of
//! [`Variable`]s. The same grammar drives two engines:
//!
//! - **Specialization** generates concrete bytes satisfying every structural and value
//!   constraint, computing sizes, checksums and derived values after the fields they read.
//! - **Abstraction** parses bytes back into a [`BoundTree`], backtracking over alternates
//!   and repetitions, and rejects input that does not conform.
//!
//! Values survive across calls in a [`Memory`] according to each data variable's [`Svas`]:
//! constant, persistent (set once per session), ephemeral (regenerated, last value kept) or
//! volatile (never stored).
//!
//! ## Variables
//!
//! - Data: one primitive type (Integer, HexaString, Raw, BitArray, IPv4, ASCII, Timestamp)
//! - Relationships: `Size`, `InternetChecksum` (RFC 1071), `Value` over other fields
//! - Nodes: `Aggregate`, `Alternate`, `Repeat` (fixed, range, sentinel field or predicate)
//!
//! ## Example DSL
//!
//! ```text
//! symbol Echo {
//!     kind:     0x08;
//!     checksum: checksum(kind, id, body) as integer(size = 16);
//!     id:       integer(size = 16) @persistent;
//!     body:     raw(nb_bytes = 0..32);
//! }
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let symbol = protovocab::parse(source)?;
//! let codec = protovocab::Codec::new(symbol)?;
//! let memory = protovocab::Memory::new();
//! let bytes = codec.specialize(&memory)?;
//! let tree = codec.abstract_data(&memory, &bytes)?;
//! println!("{}", tree);
//! ```

pub mod ast;
pub mod bits;
pub mod codec;
pub mod deps;
pub mod dump;
pub mod memory;
pub mod parser;
pub mod relation;
pub mod specialize;
pub mod types;
pub mod value;
pub mod walk;

pub use ast::{
    Data, Field, Relation, RelationKind, Repeat, RepeatCount, RepeatDecision, RepeatFn, ResolvedSymbol, Symbol, ValueFn,
    Variable, VariableId, VariableKind,
};
pub use bits::BitSeq;
pub use codec::{
    abstract_data, reset_value_memory, specialize, AbstractOptions, Codec, CodecConfig, CodecError, GenerationStrategy,
    SpecializeOptions,
};
pub use dump::{dump_tree, format_value};
pub use memory::{Memory, ResetScope, Svas, WriteOutcome};
pub use parser::{parse, parse_all};
pub use relation::internet_checksum;
pub use types::{
    Ascii, BitArray, DataType, Endianness, Epoch, HexaString, Integer, Ipv4, Ipv4Net, Raw, Sign, SizeRange, TimeUnit,
    Timestamp, TypeAttrs, UnitSize,
};
pub use value::{BoundField, BoundKind, BoundNode, BoundTree, Value};
pub use walk::{get_walk_profile, reset_walk_profile};

//! Value memory: per-variable storage governed by a State Variable Assignment Strategy.
//!
//! One [`Memory`] per session. It is passed by reference into specialization and
//! abstraction; all reads and writes go through a single lock, so concurrent callers sharing
//! a memory never observe a half-applied write.

use crate::ast::VariableId;
use crate::bits::BitSeq;
use crate::codec::CodecError;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// State Variable Assignment Strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Svas {
    /// Never overwritten once set.
    Constant,
    /// Written once, then frozen until the session is reset.
    Persistent,
    /// Overwritten on every use; the last value stays readable.
    Ephemeral,
    /// Never stored.
    Volatile,
}

impl Svas {
    pub fn name(self) -> &'static str {
        match self {
            Svas::Constant => "constant",
            Svas::Persistent => "persistent",
            Svas::Ephemeral => "ephemeral",
            Svas::Volatile => "volatile",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetScope {
    /// Session boundary: PERSISTENT and EPHEMERAL entries are dropped, CONSTANT entries stay.
    Session,
    /// Teardown: everything is dropped.
    All,
}

/// Outcome of an accepted [`Memory::write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Stored,
    /// PERSISTENT entry already set; the write was ignored.
    Kept,
    /// VOLATILE value; nothing retained.
    Discarded,
}

#[derive(Debug, Clone)]
struct Entry {
    svas: Svas,
    bits: BitSeq,
}

#[derive(Debug, Default)]
pub struct Memory {
    entries: Mutex<HashMap<VariableId, Entry>>,
}

impl Memory {
    pub fn new() -> Self {
        Memory::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<VariableId, Entry>> {
        // A panic while holding the lock cannot leave an entry half-written.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn read(&self, variable: VariableId) -> Option<BitSeq> {
        self.lock().get(&variable).map(|e| e.bits.clone())
    }

    pub fn contains(&self, variable: VariableId) -> bool {
        self.lock().contains_key(&variable)
    }

    /// Stores `bits` for `variable` according to `svas`.
    pub fn write(&self, variable: VariableId, svas: Svas, bits: BitSeq) -> Result<WriteOutcome, CodecError> {
        let mut entries = self.lock();
        match svas {
            Svas::Volatile => Ok(WriteOutcome::Discarded),
            Svas::Ephemeral => {
                entries.insert(variable, Entry { svas, bits });
                Ok(WriteOutcome::Stored)
            }
            Svas::Persistent => {
                if entries.contains_key(&variable) {
                    return Ok(WriteOutcome::Kept);
                }
                entries.insert(variable, Entry { svas, bits });
                Ok(WriteOutcome::Stored)
            }
            Svas::Constant => {
                if entries.contains_key(&variable) {
                    return Err(CodecError::ImmutableWrite { variable });
                }
                entries.insert(variable, Entry { svas, bits });
                Ok(WriteOutcome::Stored)
            }
        }
    }

    pub fn reset(&self, scope: ResetScope) {
        let mut entries = self.lock();
        match scope {
            ResetScope::All => entries.clear(),
            ResetScope::Session => entries.retain(|_, e| e.svas == Svas::Constant),
        }
        tracing::debug!(?scope, remaining = entries.len(), "value memory reset");
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

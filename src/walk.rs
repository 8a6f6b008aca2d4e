//! Abstraction: matching a bit sequence against a symbol.
//!
//! The walker is a backtracking matcher driven by an explicit goal list and choice-point
//! stack instead of native recursion, so its stack use does not grow with the input.
//!
//! ## Search order
//!
//! - Data and relationship leaves try their candidate lengths shortest first.
//! - Alternates try their children in declaration order.
//! - Fixed and ranged repetitions are greedy and back off one iteration at a time.
//! - Sentinel repetitions stop at the first position where the sentinel field matches;
//!   predicate repetitions stop when the predicate says so.
//!
//! Relationships are checked once a complete candidate has been assembled (every field
//! closed, all input consumed). A failed check resumes the most recent choice point.
//!
//! ## Budget
//!
//! Every resumed choice point is one step. Exceeding the budget, or the configured deadline,
//! aborts with [`CodecError::AbstractionTimeout`]. Otherwise a non-matching input yields one
//! [`CodecError::MatchFailure`] naming the deepest position reached.
//!
//! ## Profiling
//!
//! Enable the **`walk_profile`** feature and use [`reset_walk_profile`] / [`get_walk_profile`]
//! to get the time spent per goal kind (label -> nanoseconds).

use crate::ast::{Data, RepeatCount, RepeatDecision, ResolvedSymbol, Variable, VariableId, VariableKind};
use crate::bits::BitSeq;
use crate::codec::{CodecConfig, CodecError};
use crate::memory::{Memory, Svas};
use crate::relation;
use crate::value::{BoundField, BoundKind, BoundNode, BoundTree};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Instant;

#[cfg(feature = "walk_profile")]
use std::cell::RefCell;

/// Parses `data` against the whole symbol and commits observed values to `memory`.
pub fn abstract_bits(
    resolved: &ResolvedSymbol,
    config: &CodecConfig,
    memory: &Memory,
    data: &BitSeq,
    budget: usize,
) -> Result<BoundTree, CodecError> {
    tracing::debug!(symbol = resolved.name(), bits = data.len(), budget, "abstracting");
    let deadline = config.deadline.map(|d| Instant::now() + d);
    let mut walker = Walker::new(resolved, config, memory, data, budget, deadline, false);
    let mut goals: Goals = None;
    for i in (0..resolved.fields().len()).rev() {
        goals = push(Goal::Field(i), goals);
    }
    match walker.search(goals, 0)? {
        Some(_) => {
            let tree = walker.bind()?;
            walker.commit()?;
            tracing::debug!(symbol = resolved.name(), steps = walker.steps, "abstracted");
            Ok(tree)
        }
        None => {
            let (field, offset) = walker.deepest.unwrap_or((None, 0));
            let field = match field {
                Some(i) => resolved.fields()[i].name.clone(),
                None => "<end of symbol>".to_string(),
            };
            tracing::debug!(symbol = resolved.name(), steps = walker.steps, %field, offset, "no match");
            Err(CodecError::MatchFailure {
                symbol: resolved.name().to_string(),
                field,
                offset,
            })
        }
    }
}

/// End position of the first match of field `field`'s domain starting at bit `pos`.
///
/// Relationships inside the field are only checked for length. Memory is read, never
/// written.
pub fn match_prefix(
    resolved: &ResolvedSymbol,
    config: &CodecConfig,
    memory: &Memory,
    field: usize,
    data: &BitSeq,
    pos: usize,
) -> Result<Option<usize>, CodecError> {
    let domain = &resolved.fields()[field].domain;
    let mut walker = Walker::new(resolved, config, memory, data, config.backtrack_budget, None, true);
    walker.search(push(Goal::Var(domain, field), None), pos)
}

#[derive(Clone)]
enum Goal<'a> {
    Field(usize),
    EndField(usize),
    Var(&'a Variable, usize),
    Close,
    Literal(&'a BitSeq, usize),
    Repeat(RepeatState<'a>),
}

#[derive(Clone)]
struct RepeatState<'a> {
    var: &'a Variable,
    field: usize,
    done: usize,
    /// Start of the previous iteration (delimiter included) and of its child.
    last: Option<(usize, usize)>,
    /// Child spans of finished iterations; only kept for predicate repetitions.
    spans: Rc<Vec<(usize, usize)>>,
}

struct GoalNode<'a> {
    goal: Goal<'a>,
    next: Goals<'a>,
}

/// Persistent list: choice points share their continuation with the live goal list.
type Goals<'a> = Option<Rc<GoalNode<'a>>>;

fn push<'a>(goal: Goal<'a>, next: Goals<'a>) -> Goals<'a> {
    Some(Rc::new(GoalNode { goal, next }))
}

enum Event<'a> {
    FieldStart { field: usize, pos: usize },
    FieldEnd { field: usize, pos: usize },
    Open { var: &'a Variable, pos: usize, index: usize },
    Close { pos: usize },
    Leaf { var: &'a Variable, field: usize, pos: usize, len: usize },
}

enum Alternative<'a> {
    /// Next candidate length of a leaf.
    Sizes { var: &'a Variable, field: usize, next_len: usize, max_len: usize, step: usize },
    /// Next child of an alternate.
    Branch { var: &'a Variable, field: usize, next: usize },
    /// Stop a repetition here; the continuation already starts with its `Close`.
    Stop,
}

struct Choice<'a> {
    goals: Goals<'a>,
    pos: usize,
    trail_len: usize,
    alternative: Alternative<'a>,
}

struct Walker<'a> {
    resolved: &'a ResolvedSymbol,
    config: &'a CodecConfig,
    memory: &'a Memory,
    data: &'a BitSeq,
    budget: usize,
    deadline: Option<Instant>,
    prefix: bool,
    steps: usize,
    trail: Vec<Event<'a>>,
    choices: Vec<Choice<'a>>,
    remembered: HashMap<VariableId, Option<BitSeq>>,
    deepest: Option<(Option<usize>, usize)>,
}

impl<'a> Walker<'a> {
    fn new(
        resolved: &'a ResolvedSymbol,
        config: &'a CodecConfig,
        memory: &'a Memory,
        data: &'a BitSeq,
        budget: usize,
        deadline: Option<Instant>,
        prefix: bool,
    ) -> Self {
        Walker {
            resolved,
            config,
            memory,
            data,
            budget,
            deadline,
            prefix,
            steps: 0,
            trail: Vec::new(),
            choices: Vec::new(),
            remembered: HashMap::new(),
            deepest: None,
        }
    }

    /// Runs until a complete match (its end position) or exhaustion (`None`).
    fn search(&mut self, mut goals: Goals<'a>, mut pos: usize) -> Result<Option<usize>, CodecError> {
        loop {
            let matched = match goals.take() {
                None => {
                    if self.complete(pos) {
                        return Ok(Some(pos));
                    }
                    false
                }
                Some(node) => {
                    let mut rest = node.next.clone();
                    let ok = self.step(&node.goal, &mut rest, &mut pos)?;
                    goals = rest;
                    ok
                }
            };
            if !matched {
                match self.backtrack()? {
                    Some((g, p)) => {
                        goals = g;
                        pos = p;
                    }
                    None => return Ok(None),
                }
            }
        }
    }

    /// Executes one goal; `false` when the current path fails.
    fn step(&mut self, goal: &Goal<'a>, goals: &mut Goals<'a>, pos: &mut usize) -> Result<bool, CodecError> {
        match goal {
            Goal::Field(i) => {
                let resolved = self.resolved;
                let domain = &resolved.fields()[*i].domain;
                self.trail.push(Event::FieldStart { field: *i, pos: *pos });
                *goals = push(Goal::Var(domain, *i), push(Goal::EndField(*i), goals.take()));
                Ok(true)
            }
            Goal::EndField(i) => {
                self.trail.push(Event::FieldEnd { field: *i, pos: *pos });
                Ok(true)
            }
            Goal::Close => {
                self.trail.push(Event::Close { pos: *pos });
                Ok(true)
            }
            Goal::Literal(bits, field) => {
                if self.data.matches_at(*pos, bits) {
                    *pos += bits.len();
                    Ok(true)
                } else {
                    self.note_failure(Some(*field), *pos);
                    Ok(false)
                }
            }
            Goal::Var(v, field) => self.enter(*v, *field, goals, pos),
            Goal::Repeat(state) => self.repeat(state, goals, pos),
        }
    }

    fn enter(&mut self, v: &'a Variable, field: usize, goals: &mut Goals<'a>, pos: &mut usize) -> Result<bool, CodecError> {
        match &v.kind {
            VariableKind::Data(_) | VariableKind::Relation(_) => {
                #[cfg(feature = "walk_profile")]
                let _g = ProfileGuard::new(if matches!(v.kind, VariableKind::Data(_)) { "Data" } else { "Relation" });
                let Some((min, max, step)) = self.leaf_bounds(v, *pos) else {
                    self.note_failure(Some(field), *pos);
                    return Ok(false);
                };
                match self.bind_leaf(v, field, *pos, min, max, step, goals) {
                    Some(len) => {
                        *pos += len;
                        Ok(true)
                    }
                    None => {
                        self.note_failure(Some(field), *pos);
                        Ok(false)
                    }
                }
            }
            VariableKind::Aggregate(children) => {
                #[cfg(feature = "walk_profile")]
                let _g = ProfileGuard::new("Aggregate");
                self.trail.push(Event::Open { var: v, pos: *pos, index: 0 });
                let mut rest = push(Goal::Close, goals.take());
                for c in children.iter().rev() {
                    rest = push(Goal::Var(c, field), rest);
                }
                *goals = rest;
                Ok(true)
            }
            VariableKind::Alternate(children) => {
                #[cfg(feature = "walk_profile")]
                let _g = ProfileGuard::new("Alternate");
                if children.len() > 1 {
                    self.choices.push(Choice {
                        goals: goals.clone(),
                        pos: *pos,
                        trail_len: self.trail.len(),
                        alternative: Alternative::Branch { var: v, field, next: 1 },
                    });
                }
                self.trail.push(Event::Open { var: v, pos: *pos, index: 0 });
                *goals = push(Goal::Var(&children[0], field), push(Goal::Close, goals.take()));
                Ok(true)
            }
            VariableKind::Repeat(_) => {
                self.trail.push(Event::Open { var: v, pos: *pos, index: 0 });
                let state = RepeatState {
                    var: v,
                    field,
                    done: 0,
                    last: None,
                    spans: Rc::new(Vec::new()),
                };
                *goals = push(Goal::Repeat(state), goals.take());
                Ok(true)
            }
        }
    }

    fn repeat(&mut self, state: &RepeatState<'a>, goals: &mut Goals<'a>, pos: &mut usize) -> Result<bool, CodecError> {
        #[cfg(feature = "walk_profile")]
        let _g = ProfileGuard::new("Repeat");
        let var = state.var;
        let VariableKind::Repeat(rep) = &var.kind else {
            return Ok(false);
        };
        let zero_width = state.last.is_some_and(|(start, _)| start == *pos);
        let mut spans = Rc::clone(&state.spans);
        if let (RepeatCount::Predicate(_), Some((_, child_start))) = (&rep.count, state.last) {
            let mut grown = spans.as_ref().clone();
            grown.push((child_start, *pos));
            spans = Rc::new(grown);
        }

        let iterate = match &rep.count {
            RepeatCount::Fixed(n) => self.bounded(state.done, *n, *n, zero_width, goals, *pos),
            RepeatCount::Range(min, max) => self.bounded(state.done, *min, *max, zero_width, goals, *pos),
            RepeatCount::Until(_) => {
                if state.done >= self.config.max_repeat || zero_width {
                    Some(false)
                } else {
                    let sentinel = self.resolved.sentinel_of(state.var.id);
                    match sentinel {
                        Some(s) => Some(self.lookahead(s, *pos)?.is_none()),
                        None => Some(false),
                    }
                }
            }
            RepeatCount::Predicate(f) => {
                if state.done >= self.config.max_repeat || zero_width {
                    Some(false)
                } else {
                    let seen: Vec<BitSeq> = spans
                        .iter()
                        .filter_map(|&(s, e)| self.data.slice(s, e - s))
                        .collect();
                    Some(f(seen.as_slice()) == RepeatDecision::Continue)
                }
            }
        };

        match iterate {
            None => {
                self.note_failure(Some(state.field), *pos);
                Ok(false)
            }
            Some(false) => {
                *goals = push(Goal::Close, goals.take());
                Ok(true)
            }
            Some(true) => {
                let delimiter = rep.delimiter.as_ref().filter(|_| state.done > 0);
                let child_start = *pos + delimiter.map_or(0, BitSeq::len);
                let next = RepeatState {
                    var: state.var,
                    field: state.field,
                    done: state.done + 1,
                    last: Some((*pos, child_start)),
                    spans,
                };
                let mut rest = push(Goal::Var(rep.child.as_ref(), state.field), push(Goal::Repeat(next), goals.take()));
                if let Some(d) = delimiter {
                    rest = push(Goal::Literal(d, state.field), rest);
                }
                *goals = rest;
                Ok(true)
            }
        }
    }

    /// Decision for a `min..=max` repetition after `done` iterations: `Some(true)` to run
    /// another iteration (pushing the stop alternative when allowed), `Some(false)` to stop,
    /// `None` to fail this path.
    fn bounded(&mut self, done: usize, min: usize, max: usize, zero_width: bool, goals: &Goals<'a>, pos: usize) -> Option<bool> {
        if done >= max {
            return Some(false);
        }
        if zero_width && done > min {
            // Same state as stopping one iteration earlier.
            return None;
        }
        if zero_width && done == min {
            return Some(false);
        }
        if done >= min {
            self.choices.push(Choice {
                goals: push(Goal::Close, goals.clone()),
                pos,
                trail_len: self.trail.len(),
                alternative: Alternative::Stop,
            });
        }
        Some(true)
    }

    fn lookahead(&mut self, sentinel: usize, pos: usize) -> Result<Option<usize>, CodecError> {
        let resolved = self.resolved;
        let domain = &resolved.fields()[sentinel].domain;
        let remaining = self.budget.saturating_sub(self.steps);
        let mut sub = Walker::new(self.resolved, self.config, self.memory, self.data, remaining, self.deadline, true);
        let found = sub.search(push(Goal::Var(domain, sentinel), None), pos);
        self.steps += sub.steps;
        found
    }

    /// Candidate lengths `(min, max, step)` for a leaf at `pos`, clipped to the input.
    fn leaf_bounds(&self, v: &Variable, pos: usize) -> Option<(usize, usize, usize)> {
        let data_type = match &v.kind {
            VariableKind::Data(d) => &d.data_type,
            VariableKind::Relation(r) => &r.data_type,
            _ => return None,
        };
        let size = data_type.size();
        let remaining = self.data.len().saturating_sub(pos);
        let max = size.max.map_or(remaining, |m| m.min(remaining));
        if size.min > max {
            return None;
        }
        Some((size.min, max, data_type.step().max(1)))
    }

    /// Binds the first acceptable length in `from..=max`, leaving a choice point for the
    /// longer ones.
    #[allow(clippy::too_many_arguments)]
    fn bind_leaf(
        &mut self,
        v: &'a Variable,
        field: usize,
        pos: usize,
        from: usize,
        max: usize,
        step: usize,
        goals: &Goals<'a>,
    ) -> Option<usize> {
        let mut len = from;
        while len <= max {
            if self.leaf_accepts(v, pos, len) {
                if len + step <= max {
                    self.choices.push(Choice {
                        goals: goals.clone(),
                        pos,
                        trail_len: self.trail.len(),
                        alternative: Alternative::Sizes {
                            var: v,
                            field,
                            next_len: len + step,
                            max_len: max,
                            step,
                        },
                    });
                }
                self.trail.push(Event::Leaf { var: v, field, pos, len });
                return Some(len);
            }
            len += step;
        }
        None
    }

    fn leaf_accepts(&mut self, v: &Variable, pos: usize, len: usize) -> bool {
        let Some(bits) = self.data.slice(pos, len) else {
            return false;
        };
        match &v.kind {
            VariableKind::Data(d) => d.data_type.can_parse(&bits) && self.svas_accepts(v.id, d, &bits),
            VariableKind::Relation(r) => r.data_type.size().contains(len) && r.data_type.decode(&bits).is_ok(),
            _ => false,
        }
    }

    fn svas_accepts(&mut self, id: VariableId, d: &Data, bits: &BitSeq) -> bool {
        match d.svas {
            Svas::Constant => match self.recall(id).or_else(|| d.value.clone()) {
                Some(expected) => expected == *bits,
                None => true,
            },
            Svas::Persistent => self.recall(id).map_or(true, |expected| expected == *bits),
            Svas::Ephemeral | Svas::Volatile => true,
        }
    }

    fn recall(&mut self, id: VariableId) -> Option<BitSeq> {
        let memory = self.memory;
        self.remembered.entry(id).or_insert_with(|| memory.read(id)).clone()
    }

    fn note_failure(&mut self, field: Option<usize>, pos: usize) {
        if self.deepest.map_or(true, |(_, deepest)| pos > deepest) {
            self.deepest = Some((field, pos));
        }
    }

    /// Resumes the most recent choice point with an untried alternative.
    fn backtrack(&mut self) -> Result<Option<(Goals<'a>, usize)>, CodecError> {
        while let Some(choice) = self.choices.pop() {
            self.steps += 1;
            if self.steps > self.budget {
                tracing::warn!(symbol = self.resolved.name(), steps = self.steps, "backtrack budget exhausted");
                return Err(CodecError::AbstractionTimeout { steps: self.steps });
            }
            if self.deadline.is_some_and(|d| Instant::now() >= d) {
                tracing::warn!(symbol = self.resolved.name(), steps = self.steps, "abstraction deadline reached");
                return Err(CodecError::AbstractionTimeout { steps: self.steps });
            }
            tracing::trace!(pos = choice.pos, steps = self.steps, "resuming choice point");
            self.trail.truncate(choice.trail_len);
            match choice.alternative {
                Alternative::Sizes {
                    var,
                    field,
                    next_len,
                    max_len,
                    step,
                } => {
                    if let Some(len) = self.bind_leaf(var, field, choice.pos, next_len, max_len, step, &choice.goals) {
                        return Ok(Some((choice.goals, choice.pos + len)));
                    }
                    self.note_failure(Some(field), choice.pos);
                }
                Alternative::Branch { var, field, next } => {
                    let VariableKind::Alternate(children) = &var.kind else {
                        continue;
                    };
                    if next + 1 < children.len() {
                        self.choices.push(Choice {
                            goals: choice.goals.clone(),
                            pos: choice.pos,
                            trail_len: choice.trail_len,
                            alternative: Alternative::Branch { var, field, next: next + 1 },
                        });
                    }
                    self.trail.push(Event::Open {
                        var,
                        pos: choice.pos,
                        index: next,
                    });
                    let goals = push(Goal::Var(&children[next], field), push(Goal::Close, choice.goals));
                    return Ok(Some((goals, choice.pos)));
                }
                Alternative::Stop => return Ok(Some((choice.goals, choice.pos))),
            }
        }
        Ok(None)
    }

    /// Whether the goal list running dry at `pos` is a complete match.
    fn complete(&mut self, pos: usize) -> bool {
        if self.prefix {
            return true;
        }
        if pos != self.data.len() {
            self.note_failure(None, pos);
            return false;
        }
        #[cfg(feature = "walk_profile")]
        let _g = ProfileGuard::new("Relations");
        self.relations_hold()
    }

    fn field_spans(&self) -> Vec<Option<(usize, usize)>> {
        let n = self.resolved.fields().len();
        let mut starts = vec![0; n];
        let mut spans = vec![None; n];
        for e in &self.trail {
            match *e {
                Event::FieldStart { field, pos } => starts[field] = pos,
                Event::FieldEnd { field, pos } => spans[field] = Some((starts[field], pos)),
                _ => {}
            }
        }
        spans
    }

    fn relations_hold(&mut self) -> bool {
        let spans = self.field_spans();
        let mut failed = None;
        for e in &self.trail {
            let Event::Leaf { var, field, pos, len } = *e else {
                continue;
            };
            let VariableKind::Relation(r) = &var.kind else {
                continue;
            };
            let targets: Option<Vec<BitSeq>> = self
                .resolved
                .targets_of(var.id)
                .iter()
                .map(|&t| spans[t].and_then(|(s, e)| self.data.slice(s, e - s)))
                .collect();
            let Some(targets) = targets else {
                failed = Some((field, pos));
                break;
            };
            let refs: Vec<&BitSeq> = targets.iter().collect();
            let holds = match (relation::compute(r, &refs), self.data.slice(pos, len)) {
                (Ok(expected), Some(actual)) => expected == actual,
                _ => false,
            };
            if !holds {
                failed = Some((field, pos));
                break;
            }
        }
        match failed {
            Some((field, pos)) => {
                tracing::trace!(field = %self.resolved.fields()[field].name, pos, "relationship does not hold");
                self.note_failure(Some(field), pos);
                false
            }
            None => true,
        }
    }

    /// Builds the bound tree from the trail of the successful match.
    fn bind(&self) -> Result<BoundTree, CodecError> {
        struct Frame<'v> {
            var: Option<&'v Variable>,
            pos: usize,
            index: usize,
            children: Vec<BoundNode>,
        }
        let mut fields = Vec::new();
        let mut stack: Vec<Frame> = Vec::new();
        let slice = |s: usize, e: usize| {
            self.data
                .slice(s, e - s)
                .ok_or_else(|| CodecError::TypeMismatch(format!("span {}..{} outside the input", s, e)))
        };
        for e in &self.trail {
            match *e {
                Event::FieldStart { pos, .. } => stack.push(Frame {
                    var: None,
                    pos,
                    index: 0,
                    children: Vec::new(),
                }),
                Event::Open { var, pos, index } => stack.push(Frame {
                    var: Some(var),
                    pos,
                    index,
                    children: Vec::new(),
                }),
                Event::Leaf { var, pos, len, .. } => {
                    let bits = slice(pos, pos + len)?;
                    let kind = match &var.kind {
                        VariableKind::Data(d) => BoundKind::Data(d.data_type.decode(&bits)?),
                        VariableKind::Relation(r) => BoundKind::Relation(r.data_type.decode(&bits)?),
                        _ => continue,
                    };
                    if let Some(top) = stack.last_mut() {
                        top.children.push(BoundNode {
                            variable: Some(var.id),
                            name: var.name.clone(),
                            bits,
                            kind,
                        });
                    }
                }
                Event::Close { pos } => {
                    let Some(frame) = stack.pop() else { continue };
                    let Some(var) = frame.var else { continue };
                    let bits = slice(frame.pos, pos)?;
                    let kind = match &var.kind {
                        VariableKind::Alternate(_) => match frame.children.into_iter().next() {
                            Some(child) => BoundKind::Alternate {
                                index: frame.index,
                                child: Box::new(child),
                            },
                            None => continue,
                        },
                        VariableKind::Repeat(_) => BoundKind::Repeat(frame.children),
                        _ => BoundKind::Aggregate(frame.children),
                    };
                    if let Some(top) = stack.last_mut() {
                        top.children.push(BoundNode {
                            variable: Some(var.id),
                            name: var.name.clone(),
                            bits,
                            kind,
                        });
                    }
                }
                Event::FieldEnd { field, pos } => {
                    let Some(frame) = stack.pop() else { continue };
                    let Some(node) = frame.children.into_iter().next() else {
                        continue;
                    };
                    fields.push(BoundField {
                        name: self.resolved.fields()[field].name.clone(),
                        bits: slice(frame.pos, pos)?,
                        node,
                    });
                }
            }
        }
        Ok(BoundTree {
            symbol: self.resolved.name().to_string(),
            fields,
        })
    }

    /// Writes every bound PERSISTENT and EPHEMERAL value to memory.
    fn commit(&self) -> Result<(), CodecError> {
        for e in &self.trail {
            let Event::Leaf { var, pos, len, .. } = *e else {
                continue;
            };
            let VariableKind::Data(d) = &var.kind else {
                continue;
            };
            if matches!(d.svas, Svas::Persistent | Svas::Ephemeral) {
                if let Some(bits) = self.data.slice(pos, len) {
                    self.memory.write(var.id, d.svas, bits)?;
                }
            }
        }
        Ok(())
    }
}

// --- Walk profiling (feature "walk_profile") ---
//
// Each goal kind records its cumulative time. Use reset_walk_profile() before a run and
// get_walk_profile() after to get a label -> nanoseconds map. Labels are "Data",
// "Relation", "Aggregate", "Alternate", "Repeat" and "Relations" (final checks).

#[cfg(feature = "walk_profile")]
#[derive(Default)]
struct WalkProfileStats {
    ns_per_label: HashMap<String, u64>,
}

#[cfg(feature = "walk_profile")]
thread_local!(static WALK_PROFILE: RefCell<WalkProfileStats> = RefCell::new(WalkProfileStats::default()));

#[cfg(feature = "walk_profile")]
fn record_walk_profile(label: &'static str, d: std::time::Duration) {
    WALK_PROFILE.with(|p| {
        let mut st = p.borrow_mut();
        *st.ns_per_label.entry(label.to_string()).or_insert(0) += d.as_nanos() as u64;
    });
}

/// Resets accumulated walk profile stats.
#[cfg(feature = "walk_profile")]
pub fn reset_walk_profile() {
    WALK_PROFILE.with(|p| *p.borrow_mut() = WalkProfileStats::default());
}

/// Returns accumulated walk profile: label → total nanoseconds.
#[cfg(feature = "walk_profile")]
pub fn get_walk_profile() -> HashMap<String, u64> {
    WALK_PROFILE.with(|p| p.borrow().ns_per_label.clone())
}

#[cfg(feature = "walk_profile")]
struct ProfileGuard {
    label: &'static str,
    start: Instant,
}

#[cfg(feature = "walk_profile")]
impl ProfileGuard {
    fn new(label: &'static str) -> Self {
        Self { label, start: Instant::now() }
    }
}

#[cfg(feature = "walk_profile")]
impl Drop for ProfileGuard {
    fn drop(&mut self) {
        record_walk_profile(self.label, self.start.elapsed());
    }
}

#[cfg(not(feature = "walk_profile"))]
/// No-op when the `walk_profile` feature is not enabled.
pub fn reset_walk_profile() {}

#[cfg(not(feature = "walk_profile"))]
/// Returns an empty map when the `walk_profile` feature is not enabled.
pub fn get_walk_profile() -> HashMap<String, u64> {
    HashMap::new()
}

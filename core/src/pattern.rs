//! Pattern Matcher (§4.4): matches a catalogue of IR-fragment pairs against
//! live module instructions to suppress known-equivalent diffs that the
//! benign-pattern flags in §4.3 don't already cover.
//!
//! Pattern modules are ordinary IR modules following the conventions in
//! §6: a `new_<Name>`/`old_<Name>` function pair, reserved marker calls
//! standing in for the "reserved metadata-node" annotations the spec
//! describes abstractly (`pattern-start`, `pattern-end`,
//! `basic-block-limit`, `basic-block-limit-end`), and a `mapping` function
//! whose body pairs up new-side and old-side values by name.

use std::collections::VecDeque;
use std::path::Path;

use llvm_ir::{Function, Module, Name};

use crate::config::{OnParseFailure, PatternCatalogueConfig};
use crate::correspondence::{CorrespondenceKey, Relate, ValueCorrespondence};
use crate::error::{CompareError, Result};
use crate::function_comparator::{base_instruction_equal, call_view};
use crate::ir::{strip_suffix, LocalId, LocalNameTable};

const MARKER_START: &str = "__pattern_start";
const MARKER_END: &str = "__pattern_end";
const MARKER_BB_LIMIT: &str = "__pattern_basic_block_limit";
const MARKER_BB_LIMIT_END: &str = "__pattern_basic_block_limit_end";
const MAPPING_FN: &str = "mapping";
const NEW_PREFIX: &str = "new_";
const OLD_PREFIX: &str = "old_";

/// A position within a pattern function's instruction stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PatternPosition {
    block: usize,
    instr: usize,
}

/// A final-mapping constraint: a pattern-new value must end up corresponding
/// (through the enclosing left/right correspondence) to the module value the
/// pattern-old counterpart matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MappingPair {
    new: LocalId,
    old: LocalId,
}

/// A named pair of IR function fragments declaring a difference as
/// semantics-preserving (§3, §6).
pub struct Pattern {
    pub name: String,
    new_function: Function,
    old_function: Function,
    new_start: PatternPosition,
    old_start: PatternPosition,
    new_end: PatternPosition,
    old_end: PatternPosition,
    basic_block_limit: usize,
    bb_limit_end_blocks: std::collections::HashSet<usize>,
    final_mapping: Vec<MappingPair>,
}

impl Pattern {
    /// Scan a loaded pattern module for `new_<Name>`/`old_<Name>` pairs and
    /// build every well-formed pattern found in it. Malformed candidates
    /// (missing a side, missing exactly one start/end marker pair) are
    /// skipped; the caller decides whether that is fatal per
    /// `on-parse-failure`.
    fn from_module(module: &Module) -> Vec<Pattern> {
        let mut patterns = Vec::new();
        for f in &module.functions {
            let Some(base) = f.name.strip_prefix(NEW_PREFIX) else { continue };
            let Some(old_fn) = module.functions.iter().find(|g| g.name == format!("{OLD_PREFIX}{base}")) else {
                continue;
            };
            let Some((new_start, new_end, bb_limit, bb_limit_end)) = scan_markers(f) else { continue };
            let Some((old_start, old_end, _, old_bb_limit_end)) = scan_markers(old_fn) else { continue };

            let mapping_fn = module.functions.iter().find(|g| g.name == MAPPING_FN);
            let new_table = LocalNameTable::build(f);
            let old_table = LocalNameTable::build(old_fn);
            let final_mapping = mapping_fn
                .map(|m| parse_final_mapping(m, &new_table, &old_table))
                .unwrap_or_default();

            let mut bb_limit_end_blocks = bb_limit_end;
            bb_limit_end_blocks.extend(old_bb_limit_end);

            patterns.push(Pattern {
                name: base.to_string(),
                new_function: f.clone(),
                old_function: old_fn.clone(),
                new_start,
                old_start,
                new_end,
                old_end,
                basic_block_limit: bb_limit,
                bb_limit_end_blocks,
                final_mapping,
            });
        }
        patterns
    }
}

/// Locate the marker calls in a pattern-side function and translate them to
/// the real instruction positions they annotate: `__pattern_start()` marks
/// the instruction immediately following it; `__pattern_end()` marks the
/// instruction immediately preceding it. The marker calls themselves are
/// not part of the matched instruction stream.
fn scan_markers(f: &Function) -> Option<(PatternPosition, PatternPosition, usize, std::collections::HashSet<usize>)> {
    let mut start = None;
    let mut end = None;
    let mut bb_limit = usize::MAX;
    let mut bb_limit_end = std::collections::HashSet::new();

    for (block_idx, block) in f.basic_blocks.iter().enumerate() {
        for (instr_idx, instr) in block.instrs.iter().enumerate() {
            let Some(view) = call_view(instr) else { continue };
            match view.callee.as_deref() {
                Some(MARKER_START) => {
                    let real = instr_idx + 1;
                    if real < block.instrs.len() {
                        start = Some(PatternPosition { block: block_idx, instr: real });
                    }
                }
                Some(MARKER_END) => {
                    if instr_idx > 0 {
                        end = Some(PatternPosition { block: block_idx, instr: instr_idx - 1 });
                    }
                }
                Some(MARKER_BB_LIMIT) => {
                    if let Some(llvm_ir::Operand::ConstantOperand(c)) = view.arguments.first() {
                        if let llvm_ir::Constant::Int { value, .. } = c.as_ref() {
                            bb_limit = *value as usize;
                        }
                    }
                }
                Some(MARKER_BB_LIMIT_END) => {
                    bb_limit_end.insert(block_idx);
                }
                _ => {}
            }
        }
    }
    if bb_limit == usize::MAX {
        bb_limit = 0;
    }
    Some((start?, end?, bb_limit, bb_limit_end))
}

/// Parse the `mapping` function: every call to a reserved two-argument
/// marker pairs a new-side value with an old-side value by matching the
/// textual name of each argument against the new/old pattern functions'
/// own local-name tables (pattern modules are hand-authored and expected
/// to reuse those exact names).
fn parse_final_mapping(mapping_fn: &Function, new_table: &LocalNameTable, old_table: &LocalNameTable) -> Vec<MappingPair> {
    const MAP_MARKER: &str = "__pattern_map";
    let mut pairs = Vec::new();
    for block in &mapping_fn.basic_blocks {
        for instr in &block.instrs {
            let Some(view) = call_view(instr) else { continue };
            if view.callee.as_deref() != Some(MAP_MARKER) {
                continue;
            }
            if let [llvm_ir::Operand::LocalOperand { name: a, .. }, llvm_ir::Operand::LocalOperand { name: b, .. }] =
                view.arguments.as_slice()
            {
                if let (Some(new_id), Some(old_id)) = (new_table.lookup(a), old_table.lookup(b)) {
                    pairs.push(MappingPair { new: new_id, old: old_id });
                } else if let (Some(new_id), Some(old_id)) = (new_table.lookup(b), old_table.lookup(a)) {
                    pairs.push(MappingPair { new: new_id, old: old_id });
                }
            }
        }
    }
    pairs
}

/// Process-wide collection of loaded patterns (§3). Immutable once built.
pub struct PatternSet {
    patterns: Vec<Pattern>,
}

impl PatternSet {
    pub fn empty() -> Self {
        PatternSet { patterns: Vec::new() }
    }

    /// Load every pattern module named in a pattern-catalogue config file
    /// (§6). A pattern module that fails to parse into at least one
    /// well-formed pattern is handled per the file's `on-parse-failure`.
    /// `parse_module` is the host's IR-parsing collaborator (§1: "front-end
    /// build orchestration" is out of scope for the core).
    pub fn load(config_path: &Path, parse_module: impl Fn(&Path) -> Result<Module>) -> Result<PatternSet> {
        let file = PatternCatalogueConfig::load(config_path)?;

        let mut patterns = Vec::new();
        for module_path in &file.patterns {
            match parse_module(module_path) {
                Ok(module) => {
                    let found = Pattern::from_module(&module);
                    if found.is_empty() {
                        let reason = "no well-formed new_/old_ pattern pair found".to_string();
                        report_parse_failure(module_path, &reason, file.on_parse_failure)?;
                    } else {
                        patterns.extend(found);
                    }
                }
                Err(e) => {
                    report_parse_failure(module_path, &e.to_string(), file.on_parse_failure)?;
                }
            }
        }
        Ok(PatternSet { patterns })
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }
}

fn report_parse_failure(path: &Path, reason: &str, policy: OnParseFailure) -> Result<()> {
    match policy {
        OnParseFailure::Warn => {
            log::warn!("pattern module {} rejected: {reason}", path.display());
            Ok(())
        }
        OnParseFailure::Abort => Err(CompareError::PatternLoad {
            path: path.to_path_buf(),
            reason: reason.to_string(),
            policy: OnParseFailure::Abort,
        }),
    }
}

/// Outcome of attempting a pattern match at a divergence.
pub struct PatternMatch {
    pub consumed_left: usize,
    pub consumed_right: usize,
}

/// Attempt every pattern in the set against the divergence at
/// `(left_fn, left_block, left_instr)` / `(right_fn, right_block,
/// right_instr)`, in catalogue order, returning the first success (§4.3:
/// "for each pattern whose pattern-start shape is compatible ... the
/// matcher attempts a sub-walk").
pub fn try_match(
    patterns: &PatternSet,
    outer_corr: &mut ValueCorrespondence,
    left_fn: &Function,
    left_table: &LocalNameTable,
    left_block: usize,
    left_instr: usize,
    right_fn: &Function,
    right_table: &LocalNameTable,
    right_block: usize,
    right_instr: usize,
) -> Option<PatternMatch> {
    for pattern in patterns.patterns() {
        if let Some(result) = try_match_one(
            pattern, outer_corr, left_fn, left_table, left_block, left_instr, right_fn, right_table, right_block,
            right_instr,
        ) {
            return Some(result);
        }
    }
    None
}

fn try_match_one(
    pattern: &Pattern,
    outer_corr: &mut ValueCorrespondence,
    left_fn: &Function,
    left_table: &LocalNameTable,
    left_block: usize,
    left_instr: usize,
    right_fn: &Function,
    right_table: &LocalNameTable,
    right_block: usize,
    right_instr: usize,
) -> Option<PatternMatch> {
    let new_table = LocalNameTable::build(&pattern.new_function);
    let old_table = LocalNameTable::build(&pattern.old_function);

    let mut new_corr = seed_global_only(outer_corr);
    let new_walk = walk_pattern_segment(
        &pattern.new_function,
        &new_table,
        pattern.new_start,
        pattern.new_end,
        left_fn,
        left_table,
        left_block,
        left_instr,
        pattern.basic_block_limit,
        &pattern.bb_limit_end_blocks,
        &mut new_corr,
    )?;

    let mut old_corr = seed_global_only(outer_corr);
    let old_walk = walk_pattern_segment(
        &pattern.old_function,
        &old_table,
        pattern.old_start,
        pattern.old_end,
        right_fn,
        right_table,
        right_block,
        right_instr,
        pattern.basic_block_limit,
        &pattern.bb_limit_end_blocks,
        &mut old_corr,
    )?;

    for mapping in &pattern.final_mapping {
        let left_target = new_corr.lookup_left(&CorrespondenceKey::Local(mapping.new))?.clone();
        let right_target = old_corr.lookup_left(&CorrespondenceKey::Local(mapping.old))?.clone();
        if outer_corr.relate(left_target, right_target) == Relate::Conflict {
            return None;
        }
    }

    Some(PatternMatch { consumed_left: new_walk, consumed_right: old_walk })
}

fn seed_global_only(outer: &ValueCorrespondence) -> ValueCorrespondence {
    let mut fresh = ValueCorrespondence::new();
    outer.copy_globals_into(&mut fresh);
    fresh
}

/// Bounded structural sub-walk from a pattern-side start position against a
/// target function, up to the pattern's `pattern-end` and within
/// `block_limit` successor hops. Returns the number of target-side
/// instructions consumed in the starting block on success.
#[allow(clippy::too_many_arguments)]
fn walk_pattern_segment(
    pattern_fn: &Function,
    pattern_table: &LocalNameTable,
    start: PatternPosition,
    end: PatternPosition,
    target_fn: &Function,
    target_table: &LocalNameTable,
    target_block: usize,
    target_instr: usize,
    block_limit: usize,
    bb_limit_end_blocks: &std::collections::HashSet<usize>,
    corr: &mut ValueCorrespondence,
) -> Option<usize> {
    let mut worklist: VecDeque<(usize, usize, usize)> = VecDeque::new();
    worklist.push_back((start.block, target_block, 0));
    let mut visited = std::collections::HashSet::new();
    let mut consumed_in_start_block = None;

    while let Some((pb, tb, depth)) = worklist.pop_front() {
        if depth > block_limit || !visited.insert((pb, tb)) {
            continue;
        }
        if corr.relate(
            CorrespondenceKey::Local(LocalId::Block(pb)),
            CorrespondenceKey::Local(LocalId::Block(tb)),
        ) == Relate::Conflict
        {
            return None;
        }
        let pattern_block = &pattern_fn.basic_blocks[pb];
        let target_block_ref = &target_fn.basic_blocks[tb];

        let mut pi = if pb == start.block { start.instr } else { 0 };
        let mut ti = if tb == target_block { target_instr } else { 0 };
        let block_consumed_start = ti;

        loop {
            let reached_end = pb == end.block && pi > end.instr;
            if reached_end {
                break;
            }
            if pi >= pattern_block.instrs.len() || ti >= target_block_ref.instrs.len() {
                return None;
            }
            let pinstr = &pattern_block.instrs[pi];
            let tinstr = &target_block_ref.instrs[ti];
            if !base_instruction_equal(corr, pattern_table, target_table, pinstr, tinstr, &mut |a, b| {
                strip_suffix(a) == strip_suffix(b)
            }) {
                return None;
            }
            pi += 1;
            ti += 1;
        }

        if pb == start.block && tb == target_block {
            consumed_in_start_block = Some(ti - block_consumed_start);
        }

        if pb == end.block {
            continue;
        }
        if bb_limit_end_blocks.contains(&pb) {
            continue;
        }
        for (p_succ, t_succ) in matching_successors(pattern_fn, target_fn, pb, tb, pattern_table, target_table) {
            worklist.push_back((p_succ, t_succ, depth + 1));
        }
    }

    consumed_in_start_block
}

fn matching_successors(
    pattern_fn: &Function,
    target_fn: &Function,
    pb: usize,
    tb: usize,
    pattern_table: &LocalNameTable,
    target_table: &LocalNameTable,
) -> Vec<(usize, usize)> {
    use llvm_ir::Terminator::*;
    let lookup = |table: &LocalNameTable, name: &Name| match table.lookup(name) {
        Some(LocalId::Block(idx)) => Some(idx),
        _ => None,
    };
    let pterm = &pattern_fn.basic_blocks[pb].term;
    let tterm = &target_fn.basic_blocks[tb].term;
    match (pterm, tterm) {
        (Br(p), Br(t)) => lookup(pattern_table, &p.dest)
            .zip(lookup(target_table, &t.dest))
            .into_iter()
            .collect(),
        (CondBr(p), CondBr(t)) => {
            let mut v = Vec::new();
            if let (Some(a), Some(b)) = (lookup(pattern_table, &p.true_dest), lookup(target_table, &t.true_dest)) {
                v.push((a, b));
            }
            if let (Some(a), Some(b)) = (lookup(pattern_table, &p.false_dest), lookup(target_table, &t.false_dest)) {
                v.push((a, b));
            }
            v
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pattern_set_never_matches() {
        let set = PatternSet::empty();
        assert!(set.patterns().is_empty());
    }
}

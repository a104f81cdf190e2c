//! Module Comparator (§4.5): drives per-pair comparison across two modules,
//! the inlining feedback loop, and aggregation of differences.

use std::collections::HashMap;

use llvm_ir::Module;

use crate::collaborators::{AggregateSizeIndex, DebugInfoIndex, Inliner, Simplifier};
use crate::config::ComparatorConfig;
use crate::correspondence::ValueCorrespondence;
use crate::differential::{record_aggregate_type_difference, CalleeVerdict, DifferentialHooks};
use crate::error::{CompareError, Result};
use crate::function_comparator::{walk_functions, WalkVerdict};
use crate::ir::strip_suffix;
use crate::model::{CallSiteInfo, FunctionInfo, MissingDef, NonFunctionDifference};
use crate::pattern::PatternSet;

/// A prefix recognizing a synthesized helper (field-access abstraction,
/// inline-asm outlining) produced by an out-of-scope pre-pass (§4.5,
/// GLOSSARY "Abstraction (synthesized)").
const SYNTHESIZED_ABSTRACTION_PREFIX: &str = "__diffkemp_abstraction_";

/// Final, terminal verdict of comparing one function pair (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Equal,
    AssumedEqual,
    NotEqual,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FunctionPairKey {
    left: String,
    right: String,
}

#[derive(Clone)]
enum CacheEntry {
    Pending,
    Done { verdict: Verdict, differences: Vec<NonFunctionDifference>, missing_defs: Vec<MissingDef> },
}

/// Per-pair result returned to the host (§3's `Result`).
#[derive(Debug, Clone)]
pub struct PairOutcome {
    pub verdict: Verdict,
    pub left_info: FunctionInfo,
    pub right_info: FunctionInfo,
    pub differences: Vec<NonFunctionDifference>,
    pub missing_defs: Vec<MissingDef>,
    /// The verdict this pair held before any inlining iteration, when
    /// inlining later reclassified it as `Equal` (§9 open question: a
    /// callee genuinely non-equivalent in isolation can be silently
    /// subsumed by inlining — surfaced here rather than discarded).
    pub pre_inline_verdict: Option<Verdict>,
}

/// Drives §4.5's algorithm over a seed list of symbol-name pairs. Owns the
/// result cache, correspondence, and `try_inline` resolution for one
/// comparison instance (§5: no state shared across instances).
pub struct ModuleComparator<'a> {
    config: &'a ComparatorConfig,
    patterns: &'a PatternSet,
    debug_info: &'a dyn DebugInfoIndex,
    aggregate_index: &'a dyn AggregateSizeIndex,
    simplifier: &'a mut dyn Simplifier,
    inliner: &'a mut dyn Inliner,
    cache: HashMap<FunctionPairKey, CacheEntry>,
}

impl<'a> ModuleComparator<'a> {
    pub fn new(
        config: &'a ComparatorConfig,
        patterns: &'a PatternSet,
        debug_info: &'a dyn DebugInfoIndex,
        aggregate_index: &'a dyn AggregateSizeIndex,
        simplifier: &'a mut dyn Simplifier,
        inliner: &'a mut dyn Inliner,
    ) -> Self {
        ModuleComparator {
            config,
            patterns,
            debug_info,
            aggregate_index,
            simplifier,
            inliner,
            cache: HashMap::new(),
        }
    }

    /// Compare every seed pair (§4.5 step 1-6). `left`/`right` are mutated
    /// in place by inlining and simplification; the host must not observe
    /// them until this returns (§5).
    pub fn compare_all(
        &mut self,
        left: &mut Module,
        right: &mut Module,
        seeds: &[(String, String)],
    ) -> Result<Vec<PairOutcome>> {
        let mut outcomes = Vec::new();
        for (l, r) in seeds {
            outcomes.push(self.compare_pair(left, right, l, r)?);
        }
        Ok(outcomes)
    }

    fn resolve<'m>(module: &'m Module, name: &str, side: &'static str) -> Result<&'m llvm_ir::Function> {
        module
            .functions
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| CompareError::UnresolvedSymbol(name.to_string(), side))
    }

    fn is_declaration(f: &llvm_ir::Function) -> bool {
        f.basic_blocks.is_empty()
    }

    fn is_intrinsic_or_abstraction(name: &str) -> bool {
        name.starts_with("llvm.") || name.starts_with(SYNTHESIZED_ABSTRACTION_PREFIX)
    }

    /// Top-level comparison of one seed pair (§4.5). Recursion through
    /// callee identity checks reenters here via the `callee_equivalence`
    /// callback passed to the Differential Comparator.
    pub fn compare_pair(
        &mut self,
        left: &mut Module,
        right: &mut Module,
        left_name: &str,
        right_name: &str,
    ) -> Result<PairOutcome> {
        let key = FunctionPairKey { left: left_name.to_string(), right: right_name.to_string() };
        if let Some(CacheEntry::Done { verdict, differences, missing_defs }) = self.cache.get(&key) {
            let (verdict, differences, missing_defs) = (*verdict, differences.clone(), missing_defs.clone());
            return Ok(self.finish(verdict, left, right, left_name, right_name, differences, missing_defs, None));
        }

        let lf = Self::resolve(left, left_name, "left")?;
        let rf = Self::resolve(right, right_name, "right")?;

        // Declaration fast path (§4.5 step 3).
        let l_decl = Self::is_declaration(lf);
        let r_decl = Self::is_declaration(rf);
        if l_decl || r_decl {
            let verdict = if l_decl && r_decl {
                if strip_suffix(left_name) == strip_suffix(right_name) { Verdict::Equal } else { Verdict::NotEqual }
            } else if self.config.control_flow_only {
                if strip_suffix(left_name) == strip_suffix(right_name) { Verdict::Equal } else { Verdict::NotEqual }
            } else {
                Verdict::AssumedEqual
            };
            let missing = if verdict == Verdict::AssumedEqual {
                vec![MissingDef {
                    left: l_decl.then(|| left_name.to_string()),
                    right: r_decl.then(|| right_name.to_string()),
                }]
            } else {
                Vec::new()
            };
            self.cache.insert(
                key,
                CacheEntry::Done { verdict, differences: Vec::new(), missing_defs: missing.clone() },
            );
            if !missing.is_empty() {
                log::warn!("missing definition for {left_name} <-> {right_name}: {missing:?}");
            }
            log::info!("{left_name} <-> {right_name}: {verdict:?}");
            return Ok(self.finish(verdict, left, right, left_name, right_name, Vec::new(), missing, None));
        }

        // Insert the pending marker before descending (§4.5 step 4, §9).
        self.cache.insert(key.clone(), CacheEntry::Pending);

        let (verdict, diffs, missing, pre_inline) = self.walk_with_inlining(left, right, left_name, right_name)?;

        self.cache.insert(
            key,
            CacheEntry::Done { verdict, differences: diffs.clone(), missing_defs: missing.clone() },
        );
        if !missing.is_empty() {
            log::warn!("missing definition for {left_name} <-> {right_name}: {missing:?}");
        }
        log::info!("{left_name} <-> {right_name}: {verdict:?}");
        Ok(self.finish(verdict, left, right, left_name, right_name, diffs, missing, pre_inline))
    }

    fn walk_with_inlining(
        &mut self,
        left: &mut Module,
        right: &mut Module,
        left_name: &str,
        right_name: &str,
    ) -> Result<(Verdict, Vec<NonFunctionDifference>, Vec<MissingDef>, Option<Verdict>)> {
        let mut missing_defs = Vec::new();
        let mut first_verdict: Option<Verdict> = None;
        loop {
            let lf = Self::resolve(left, left_name, "left")?.clone();
            let rf = Self::resolve(right, right_name, "right")?.clone();

            let mut corr = ValueCorrespondence::with_aggregate_index(self.aggregate_index);
            let (verdict, diffs, try_inline) = {
                let cache = &mut self.cache;
                let mut callee_eq = |lc: &str, rc: &str| -> CalleeVerdict {
                    let key = FunctionPairKey { left: lc.to_string(), right: rc.to_string() };
                    match cache.get(&key) {
                        Some(CacheEntry::Pending) => CalleeVerdict::Unknown,
                        Some(CacheEntry::Done { verdict: Verdict::NotEqual, .. }) => CalleeVerdict::NotEqual,
                        Some(CacheEntry::Done { .. }) => CalleeVerdict::Equal,
                        None => CalleeVerdict::Unknown,
                    }
                };
                let mut hooks = DifferentialHooks::new(
                    self.config,
                    self.patterns,
                    self.debug_info,
                    self.aggregate_index,
                    &mut callee_eq,
                );
                let output = walk_functions(&lf, &rf, &mut corr, &mut hooks);
                let v = match output.verdict {
                    WalkVerdict::Equal => Verdict::Equal,
                    WalkVerdict::NotEqual => Verdict::NotEqual,
                };
                for (left_type, right_type) in corr.take_aggregate_divergences() {
                    record_aggregate_type_difference(&mut hooks, &left_type, &right_type);
                }
                (v, hooks.diffs, output.try_inline)
            };

            if first_verdict.is_none() {
                first_verdict = Some(verdict);
            }

            if verdict == Verdict::Equal {
                let pre_inline = first_verdict.filter(|v| *v != Verdict::Equal);
                if pre_inline.is_some() {
                    log::debug!(
                        "{left_name} <-> {right_name}: post-inline verdict Equal reclassifies pre-inline verdict {:?}",
                        pre_inline.unwrap()
                    );
                }
                return Ok((verdict, diffs, missing_defs, pre_inline));
            }

            let Some(pair) = try_inline else {
                return Ok((Verdict::NotEqual, diffs, missing_defs, None));
            };

            if !self.config.function_splits {
                return Ok((Verdict::NotEqual, diffs, missing_defs, None));
            }

            let left_is_abstraction = Self::is_intrinsic_or_abstraction(&pair.left_callee);
            let right_is_abstraction = Self::is_intrinsic_or_abstraction(&pair.right_callee);

            let mut inlined_any = false;
            // Tie-break: defer inlining a side whose callee is a
            // synthesized abstraction until the other side has gone
            // first, preserving aggregate-type correspondence (§4.5 step 5).
            let order: [bool; 2] = if left_is_abstraction && !right_is_abstraction { [false, true] } else { [true, false] };
            for inline_left in order {
                let (caller_name, callee_name, module, is_decl_missing_side) = if inline_left {
                    (left_name, &pair.left_callee, &mut *left, "left")
                } else {
                    (right_name, &pair.right_callee, &mut *right, "right")
                };
                if Self::is_intrinsic_or_abstraction(callee_name) {
                    continue;
                }
                let Some(callee) = module.functions.iter().find(|f| &f.name == callee_name) else { continue };
                if Self::is_declaration(callee) {
                    missing_defs.push(MissingDef {
                        left: (is_decl_missing_side == "left").then(|| callee_name.clone()),
                        right: (is_decl_missing_side == "right").then(|| callee_name.clone()),
                    });
                    continue;
                }
                if let Some((block, instr)) = find_call_site(module, caller_name, callee_name) {
                    if self.inliner.inline(module, caller_name, block, instr) {
                        inlined_any = true;
                    }
                }
            }

            if !inlined_any {
                return Ok((Verdict::NotEqual, diffs, missing_defs, None));
            }

            log::debug!(
                "{left_name} <-> {right_name}: inlined {} / {}, re-simplifying and retrying",
                pair.left_callee,
                pair.right_callee
            );

            if let Some(f) = left.functions.iter_mut().find(|f| f.name == left_name) {
                self.simplifier.simplify(f);
            }
            if let Some(f) = right.functions.iter_mut().find(|f| f.name == right_name) {
                self.simplifier.simplify(f);
            }

            // Invalidate the inlined callees' cached verdicts; they are no
            // longer reachable through this path (§4.5 step 5 last bullet).
            let invalidate = FunctionPairKey { left: pair.left_callee.clone(), right: pair.right_callee.clone() };
            self.cache.remove(&invalidate);
        }
    }

    fn finish(
        &self,
        verdict: Verdict,
        left: &Module,
        right: &Module,
        left_name: &str,
        right_name: &str,
        differences: Vec<NonFunctionDifference>,
        missing_defs: Vec<MissingDef>,
        pre_inline_verdict: Option<Verdict>,
    ) -> PairOutcome {
        PairOutcome {
            verdict,
            left_info: function_info(left, left_name),
            right_info: function_info(right, right_name),
            differences,
            missing_defs,
            pre_inline_verdict,
        }
    }
}

fn function_info(module: &Module, name: &str) -> FunctionInfo {
    let Some(f) = module.functions.iter().find(|f| f.name == name) else {
        return FunctionInfo { name: name.to_string(), ..Default::default() };
    };
    let mut calls = Vec::new();
    for block in &f.basic_blocks {
        for instr in &block.instrs {
            if let Some(view) = crate::function_comparator::call_view(instr) {
                if let Some(callee) = view.callee {
                    calls.push(CallSiteInfo { callee, file: None, line: None });
                }
            }
        }
    }
    FunctionInfo { name: name.to_string(), file: None, line: None, calls }
}

fn find_call_site(module: &Module, caller: &str, callee: &str) -> Option<(usize, usize)> {
    let f = module.functions.iter().find(|f| f.name == caller)?;
    for (block_idx, block) in f.basic_blocks.iter().enumerate() {
        for (instr_idx, instr) in block.instrs.iter().enumerate() {
            if let Some(view) = crate::function_comparator::call_view(instr) {
                if view.callee.as_deref() == Some(callee) {
                    return Some((block_idx, instr_idx));
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intrinsic_names_are_recognized() {
        assert!(ModuleComparator::is_intrinsic_or_abstraction("llvm.memcpy.p0i8.p0i8.i64"));
        assert!(!ModuleComparator::is_intrinsic_or_abstraction("helper"));
    }
}

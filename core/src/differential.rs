//! Differential Function Comparator (§4.3): the Function Comparator
//! specialized with the benign-pattern catalogue, recursive callee
//! equivalence, and non-function difference recording.

use llvm_ir::Instruction;

use crate::collaborators::{AggregateSizeIndex, DebugInfoIndex};
use crate::config::ComparatorConfig;
use crate::correspondence::{CorrespondenceKey, Relate, ValueCorrespondence};
use crate::function_comparator::{
    base_instruction_equal, call_view, has_side_effects, instruction_equal_ignoring_alignment, result_is_used,
    Side, StepOutcome, WalkHooks,
};
use crate::ir::{strip_suffix, LocalId};
use crate::model::NonFunctionDifference;
use crate::pattern::{try_match, PatternSet};

/// A fixed list of diagnostic/print functions the `kernel-prints` rule
/// recognizes (§4.3). Call sites into any of these whose only differing
/// argument is macro-sourced string/line/file data are treated as benign.
const DIAGNOSTIC_FUNCTIONS: &[&str] =
    &["printk", "printf", "pr_info", "pr_warn", "pr_err", "pr_debug", "dev_err", "dev_warn", "dev_info", "panic"];

/// Recursive verdict the Module Comparator supplies for a callee pair
/// reached from within a divergence, breaking mutual-recursion cycles with
/// an optimistic `Unknown` (§4.5 step 4, §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalleeVerdict {
    Equal,
    Unknown,
    NotEqual,
}

/// `WalkHooks` specialization applying §4.3's benign-pattern catalogue.
pub struct DifferentialHooks<'a> {
    pub config: &'a ComparatorConfig,
    pub patterns: &'a PatternSet,
    pub debug_info: &'a dyn DebugInfoIndex,
    pub aggregate_index: &'a dyn AggregateSizeIndex,
    pub callee_equivalence: &'a mut dyn FnMut(&str, &str) -> CalleeVerdict,
    pub call_stack: Vec<crate::model::CallFrame>,
    pub diffs: Vec<NonFunctionDifference>,
}

impl<'a> DifferentialHooks<'a> {
    pub fn new(
        config: &'a ComparatorConfig,
        patterns: &'a PatternSet,
        debug_info: &'a dyn DebugInfoIndex,
        aggregate_index: &'a dyn AggregateSizeIndex,
        callee_equivalence: &'a mut dyn FnMut(&str, &str) -> CalleeVerdict,
    ) -> Self {
        DifferentialHooks {
            config,
            patterns,
            debug_info,
            aggregate_index,
            callee_equivalence,
            call_stack: Vec::new(),
            diffs: Vec::new(),
        }
    }

    fn record(&mut self, diff: NonFunctionDifference) {
        self.diffs.push(diff);
    }

    /// Step 0 of every divergence: if both sides are direct calls to the
    /// same symbol, the callee's own equivalence must hold (or be
    /// optimistically assumed) before the call site itself can match.
    fn callee_identity_blocks(&mut self, l: &Instruction, r: &Instruction) -> bool {
        let (Some(lv), Some(rv)) = (call_view(l), call_view(r)) else { return false };
        let (Some(lc), Some(rc)) = (&lv.callee, &rv.callee) else { return false };
        if strip_suffix(lc) != strip_suffix(rc) {
            return false;
        }
        matches!((self.callee_equivalence)(lc, rc), CalleeVerdict::NotEqual)
    }

    fn try_benign_rules(
        &mut self,
        corr: &mut ValueCorrespondence,
        left: &Side,
        right: &Side,
        l: &Instruction,
        r: &Instruction,
    ) -> Option<StepOutcome> {
        if let Some(outcome) = self.try_inline_asm(corr, left, right, l, r) {
            return Some(outcome);
        }

        if self.config.struct_alignment {
            if instruction_equal_ignoring_alignment(corr, left.table, right.table, l, r, &mut |a, b| {
                strip_suffix(a) == strip_suffix(b)
            }) {
                return Some(StepOutcome::Matched);
            }
        }

        if self.config.function_splits {
            if let (Some(lv), Some(rv)) = (call_view(l), call_view(r)) {
                if let (Some(lc), Some(rc)) = (lv.callee, rv.callee) {
                    if strip_suffix(&lc) != strip_suffix(&rc) {
                        return Some(StepOutcome::TryInline { left_callee: lc, right_callee: rc });
                    }
                }
            }
        }

        if self.config.kernel_prints {
            if let Some(outcome) = self.try_kernel_prints(corr, left, right, l, r) {
                return Some(outcome);
            }
        }

        if self.config.dead_code {
            if let Some(name) = crate::ir::instruction_result_name_pub(l) {
                if !has_side_effects(l) && !result_is_used(left.function, name) {
                    return Some(StepOutcome::Resolved { consumed_left: 1, consumed_right: 0 });
                }
            }
            if let Some(name) = crate::ir::instruction_result_name_pub(r) {
                if !has_side_effects(r) && !result_is_used(right.function, name) {
                    return Some(StepOutcome::Resolved { consumed_left: 0, consumed_right: 1 });
                }
            }
        }

        if self.config.numerical_macros {
            if self.try_numerical_macros(left, right, l, r) {
                return Some(StepOutcome::Matched);
            }
        }

        if self.config.type_casts {
            if self.try_type_casts(corr, left, right, l, r) {
                return Some(StepOutcome::Matched);
            }
        }

        None
    }

    /// A differing inline-asm call target is not itself a behavioral
    /// divergence worth failing the comparison over; its text is surfaced
    /// as a `SyntaxDifference` instead (§4.3 last paragraph), provided the
    /// arguments around it still line up.
    fn try_inline_asm(
        &mut self,
        corr: &mut ValueCorrespondence,
        left: &Side,
        right: &Side,
        l: &Instruction,
        r: &Instruction,
    ) -> Option<StepOutcome> {
        let (Instruction::Call(lc), Instruction::Call(rc)) = (l, r) else { return None };
        let (either::Either::Left(la), either::Either::Left(ra)) = (&lc.function, &rc.function) else { return None };
        if la.assembly == ra.assembly {
            return None;
        }
        if lc.arguments.len() != rc.arguments.len() {
            return None;
        }
        let args_match = lc.arguments.iter().zip(rc.arguments.iter()).all(|((lo, _), (ro, _))| {
            crate::function_comparator::operands_equal(corr, left.table, right.table, lo, ro, &mut |a, b| {
                strip_suffix(a) == strip_suffix(b)
            })
        });
        if !args_match {
            return None;
        }
        self.record(NonFunctionDifference::SyntaxDifference {
            name: "inline-asm".to_string(),
            left_body: la.assembly.clone(),
            right_body: ra.assembly.clone(),
            stack_left: self.call_stack.clone(),
            stack_right: self.call_stack.clone(),
        });
        Some(StepOutcome::Matched)
    }

    fn try_kernel_prints(
        &mut self,
        corr: &mut ValueCorrespondence,
        left: &Side,
        right: &Side,
        l: &Instruction,
        r: &Instruction,
    ) -> Option<StepOutcome> {
        let (lv, rv) = (call_view(l)?, call_view(r)?);
        let (lc, rc) = (lv.callee?, rv.callee?);
        if strip_suffix(&lc) != strip_suffix(&rc) || !DIAGNOSTIC_FUNCTIONS.contains(&strip_suffix(&lc)) {
            return None;
        }
        if lv.arguments.len() != rv.arguments.len() {
            return None;
        }
        let mut differing: Option<(usize, String, String)> = None;
        for (idx, (la, ra)) in lv.arguments.iter().zip(rv.arguments.iter()).enumerate() {
            if crate::function_comparator::operands_equal(corr, left.table, right.table, la, ra, &mut |a, b| {
                strip_suffix(a) == strip_suffix(b)
            }) {
                continue;
            }
            if differing.is_some() {
                return None;
            }
            let left_macro = self.debug_info.macro_origin(&left.function.name, left.block, left.instr);
            if left_macro.is_none() {
                return None;
            }
            differing = Some((idx, format!("{la}"), format!("{ra}")));
        }
        if let Some((_, lhs, rhs)) = differing {
            let macro_name = self
                .debug_info
                .macro_origin(&left.function.name, left.block, left.instr)
                .unwrap_or_else(|| "__MACRO__".to_string());
            self.record(NonFunctionDifference::SyntaxDifference {
                name: macro_name,
                left_body: lhs,
                right_body: rhs,
                stack_left: self.call_stack.clone(),
                stack_right: self.call_stack.clone(),
            });
        }
        Some(StepOutcome::Matched)
    }

    fn try_numerical_macros(&self, left: &Side, right: &Side, l: &Instruction, r: &Instruction) -> bool {
        diff_is_macro_constant(self, left, right, l, r)
    }

    fn try_type_casts(&self, corr: &mut ValueCorrespondence, left: &Side, right: &Side, l: &Instruction, r: &Instruction) -> bool {
        use Instruction::*;
        let is_ptr_or_int = |ty: &llvm_ir::TypeRef| {
            matches!(ty.as_ref(), llvm_ir::Type::PointerType { .. } | llvm_ir::Type::IntegerType { .. })
        };
        let mut check = |to_type: &llvm_ir::TypeRef, lop: &llvm_ir::Operand, rop: &llvm_ir::Operand| {
            is_ptr_or_int(to_type)
                && crate::function_comparator::operands_equal(corr, left.table, right.table, lop, rop, &mut |a, b| {
                    strip_suffix(a) == strip_suffix(b)
                })
        };
        match (l, r) {
            (BitCast(li), BitCast(ri)) => check(&ri.to_type, &li.operand, &ri.operand),
            (PtrToInt(li), PtrToInt(ri)) => check(&ri.to_type, &li.operand, &ri.operand),
            (IntToPtr(li), IntToPtr(ri)) => check(&ri.to_type, &li.operand, &ri.operand),
            _ => false,
        }
    }
}

fn diff_is_macro_constant(hooks: &DifferentialHooks, left: &Side, right: &Side, l: &Instruction, r: &Instruction) -> bool {
    if std::mem::discriminant(l) != std::mem::discriminant(r) {
        return false;
    }
    let lmacro = hooks.debug_info.macro_origin(&left.function.name, left.block, left.instr);
    let rmacro = hooks.debug_info.macro_origin(&right.function.name, right.block, right.instr);
    matches!((lmacro, rmacro), (Some(a), Some(b)) if a == b)
}

impl<'a> WalkHooks for DifferentialHooks<'a> {
    fn cmp_global_values(&mut self, left_name: &str, right_name: &str) -> bool {
        strip_suffix(left_name) == strip_suffix(right_name)
    }

    fn cmp_basic_blocks(&mut self, corr: &mut ValueCorrespondence, left_block: usize, right_block: usize) -> Relate {
        corr.relate(
            CorrespondenceKey::Local(LocalId::Block(left_block)),
            CorrespondenceKey::Local(LocalId::Block(right_block)),
        )
    }

    fn cmp_operations_with_operands(&mut self, corr: &mut ValueCorrespondence, left: &Side, right: &Side) -> StepOutcome {
        match (left.current(), right.current()) {
            (Some(l), Some(r)) => {
                if self.config.control_flow_only {
                    return StepOutcome::Matched;
                }
                if self.callee_identity_blocks(l, r) {
                    return StepOutcome::NotEqual;
                }
                if base_instruction_equal(corr, left.table, right.table, l, r, &mut |a, b| {
                    strip_suffix(a) == strip_suffix(b)
                }) {
                    return StepOutcome::Matched;
                }
                if let Some(outcome) = self.try_benign_rules(corr, left, right, l, r) {
                    return outcome;
                }
                if let Some(m) = try_match(
                    self.patterns,
                    corr,
                    left.function,
                    left.table,
                    left.block,
                    left.instr.unwrap_or(0),
                    right.function,
                    right.table,
                    right.block,
                    right.instr.unwrap_or(0),
                ) {
                    return StepOutcome::Resolved { consumed_left: m.consumed_left, consumed_right: m.consumed_right };
                }
                StepOutcome::NotEqual
            }
            (Some(l), None) if self.config.dead_code => {
                if let Some(name) = crate::ir::instruction_result_name_pub(l) {
                    if !has_side_effects(l) && !result_is_used(left.function, name) {
                        return StepOutcome::Resolved { consumed_left: 1, consumed_right: 0 };
                    }
                }
                StepOutcome::NotEqual
            }
            (None, Some(r)) if self.config.dead_code => {
                if let Some(name) = crate::ir::instruction_result_name_pub(r) {
                    if !has_side_effects(r) && !result_is_used(right.function, name) {
                        return StepOutcome::Resolved { consumed_left: 0, consumed_right: 1 };
                    }
                }
                StepOutcome::NotEqual
            }
            _ => StepOutcome::NotEqual,
        }
    }
}

/// Surface an aggregate-type divergence as a `TypeDifference` using the
/// debug-info and aggregate-size collaborators (§4.3 last paragraph).
pub fn record_aggregate_type_difference(
    hooks: &mut DifferentialHooks,
    left_name: &str,
    right_name: &str,
) {
    let left_site = hooks.debug_info.aggregate_location(left_name).unwrap_or_default();
    let right_site = hooks.debug_info.aggregate_location(right_name).unwrap_or_default();
    hooks.record(NonFunctionDifference::TypeDifference {
        name: left_name.to_string(),
        left_site,
        right_site,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_function_list_is_nonempty() {
        assert!(DIAGNOSTIC_FUNCTIONS.contains(&"printk"));
    }
}

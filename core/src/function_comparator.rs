//! Function Comparator (§4.2): a generic lockstep structural walker over two
//! functions' basic-block graphs.
//!
//! The walker itself never decides *what to do* when two instructions don't
//! match structurally — that decision is delegated to a [`WalkHooks`]
//! implementation, so the Differential Function Comparator (§4.3) and the
//! Pattern Matcher (§4.4) can reuse this same traversal and only override
//! the three hook points named in §4.2: `cmp_operations_with_operands`,
//! `cmp_basic_blocks`, and `cmp_global_values`.

use std::collections::VecDeque;

use llvm_ir::{BasicBlock, Constant, Function, Instruction, Operand, Terminator, TypeRef};

use crate::correspondence::{CorrespondenceKey, Relate, ValueCorrespondence};
use crate::ir::{name_text, strip_suffix, LocalId, LocalNameTable};

/// A position within a block's instruction stream; `None` means the cursor
/// has run past the last body instruction (the terminator is handled
/// separately, always 1:1).
pub type InstrCursor = Option<usize>;

/// What a hook decided to do about the instruction pair (or lack thereof)
/// at the current cursor position on each side.
pub enum StepOutcome {
    /// Both sides matched structurally; advance one instruction on each side.
    Matched,
    /// The divergence was resolved by consuming a custom number of
    /// instructions on each side (used by benign-pattern skips and the
    /// pattern matcher).
    Resolved { consumed_left: usize, consumed_right: usize },
    /// No rule resolved the divergence.
    NotEqual,
    /// The divergence is a pair of direct calls to different callees and
    /// `function-splits` is enabled; the Module Comparator should attempt
    /// inlining (§4.3, §4.5). Both instructions are still considered
    /// "consumed" for this step — the caller retries from scratch after
    /// inlining.
    TryInline { left_callee: String, right_callee: String },
}

/// One side of an in-progress walk.
pub struct Side<'a> {
    pub function: &'a Function,
    pub table: &'a LocalNameTable,
    pub block: usize,
    pub instr: InstrCursor,
}

impl<'a> Side<'a> {
    fn block_ref(&self) -> &'a BasicBlock {
        &self.function.basic_blocks[self.block]
    }

    /// The instruction at the cursor, or `None` once the cursor has run
    /// past the block's last instruction (used by `differential.rs`'s
    /// benign-pattern rules to inspect the current divergence).
    pub(crate) fn current(&self) -> Option<&'a Instruction> {
        self.instr.map(|i| &self.block_ref().instrs[i])
    }
}

/// Overridable behavior of a structural walk (§4.2's three hook points).
pub trait WalkHooks {
    /// cmp_global_values — compare two global symbols *by name* (§4.1:
    /// "Global values are compared by name rather than index"). Default:
    /// equal after suffix stripping (§9 suffix handling).
    fn cmp_global_values(&mut self, left_name: &str, right_name: &str) -> bool {
        strip_suffix(left_name) == strip_suffix(right_name)
    }

    /// cmp_basic_blocks — decide whether two basic blocks may correspond.
    /// Default: extend the bijection positionally; conflict if already
    /// mapped to something else.
    fn cmp_basic_blocks(
        &mut self,
        corr: &mut ValueCorrespondence,
        left_block: usize,
        right_block: usize,
    ) -> Relate {
        corr.relate(
            CorrespondenceKey::Local(LocalId::Block(left_block)),
            CorrespondenceKey::Local(LocalId::Block(right_block)),
        )
    }

    /// cmp_operations_with_operands — the main hook: decide what to do
    /// about the instruction pair (or exhausted side) at the current
    /// cursors. Default: plain structural equality, one-for-one.
    fn cmp_operations_with_operands(
        &mut self,
        corr: &mut ValueCorrespondence,
        left: &Side,
        right: &Side,
    ) -> StepOutcome {
        match (left.current(), right.current()) {
            (Some(l), Some(r)) => {
                if base_instruction_equal(corr, left.table, right.table, l, r, &mut |a, b| {
                    self.cmp_global_values(a, b)
                }) {
                    StepOutcome::Matched
                } else {
                    StepOutcome::NotEqual
                }
            }
            _ => StepOutcome::NotEqual,
        }
    }
}

/// The plain, unoverridden walker: every divergence is fatal. Used to
/// compare functions with no benign-pattern catalogue applied, and as the
/// traversal engine the Pattern Matcher drives (§4.4): a pattern's
/// arguments are ordinary first-encountered values, so the default operand
/// handling already "matches arbitrary module values" for them.
#[derive(Default)]
pub struct GenericHooks;
impl WalkHooks for GenericHooks {}

/// Final verdict of a structural walk, before any Module-Comparator-level
/// aggregation (cache lookups, `MissingDef`, inlining).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkVerdict {
    Equal,
    NotEqual,
}

/// A call site discovered at a divergence, recorded for the Module
/// Comparator's inlining loop (§4.5). This is the `try_inline` side
/// channel, represented as a return value rather than shared mutable state
/// per the design note in §9.
#[derive(Debug, Clone)]
pub struct TryInline {
    pub left_callee: String,
    pub right_callee: String,
}

pub struct WalkOutput {
    pub verdict: WalkVerdict,
    pub try_inline: Option<TryInline>,
}

/// Drive the lockstep structural walk described in §4.2, steps 1-5.
pub fn walk_functions(
    lf: &Function,
    rf: &Function,
    corr: &mut ValueCorrespondence,
    hooks: &mut dyn WalkHooks,
) -> WalkOutput {
    if !compare_signature(lf, rf, corr) {
        return WalkOutput { verdict: WalkVerdict::NotEqual, try_inline: None };
    }
    let left_table = LocalNameTable::build(lf);
    let right_table = LocalNameTable::build(rf);

    let mut worklist: VecDeque<(usize, usize)> = VecDeque::new();
    worklist.push_back((0, 0));
    let mut visited = std::collections::HashSet::new();

    while let Some((lb, rb)) = worklist.pop_front() {
        if !visited.insert((lb, rb)) {
            continue;
        }
        if hooks.cmp_basic_blocks(corr, lb, rb) == Relate::Conflict {
            return WalkOutput { verdict: WalkVerdict::NotEqual, try_inline: None };
        }
        let left_block = &lf.basic_blocks[lb];
        let right_block = &rf.basic_blocks[rb];

        let mut li = 0usize;
        let mut ri = 0usize;
        while li < left_block.instrs.len() || ri < right_block.instrs.len() {
            let left_side = Side {
                function: lf,
                table: &left_table,
                block: lb,
                instr: if li < left_block.instrs.len() { Some(li) } else { None },
            };
            let right_side = Side {
                function: rf,
                table: &right_table,
                block: rb,
                instr: if ri < right_block.instrs.len() { Some(ri) } else { None },
            };
            match hooks.cmp_operations_with_operands(corr, &left_side, &right_side) {
                StepOutcome::Matched => {
                    li += 1;
                    ri += 1;
                }
                StepOutcome::Resolved { consumed_left, consumed_right } => {
                    if consumed_left == 0 && consumed_right == 0 {
                        // A rule that resolves nothing is a bug in the hook, not a
                        // legal outcome; treat as non-convergence.
                        return WalkOutput { verdict: WalkVerdict::NotEqual, try_inline: None };
                    }
                    li += consumed_left;
                    ri += consumed_right;
                }
                StepOutcome::TryInline { left_callee, right_callee } => {
                    return WalkOutput {
                        verdict: WalkVerdict::NotEqual,
                        try_inline: Some(TryInline { left_callee, right_callee }),
                    };
                }
                StepOutcome::NotEqual => {
                    return WalkOutput { verdict: WalkVerdict::NotEqual, try_inline: None };
                }
            }
        }
        // Step 4: both blocks must end at the same instruction-stream position.
        if li != left_block.instrs.len() || ri != right_block.instrs.len() {
            return WalkOutput { verdict: WalkVerdict::NotEqual, try_inline: None };
        }

        if !terminators_equal(corr, &left_table, &right_table, &left_block.term, &right_block.term, hooks) {
            return WalkOutput { verdict: WalkVerdict::NotEqual, try_inline: None };
        }
        for (l_succ, r_succ) in successor_pairs(&left_block.term, &right_block.term, &left_table, &right_table) {
            worklist.push_back((l_succ, r_succ));
        }
    }

    WalkOutput { verdict: WalkVerdict::Equal, try_inline: None }
}

fn compare_signature(lf: &Function, rf: &Function, corr: &mut ValueCorrespondence) -> bool {
    if lf.parameters.len() != rf.parameters.len() || lf.is_var_arg != rf.is_var_arg {
        return false;
    }
    if lf.calling_convention != rf.calling_convention {
        return false;
    }
    if corr.relate_types(&lf.return_type, &rf.return_type) == Relate::Conflict {
        return false;
    }
    for (idx, (lp, rp)) in lf.parameters.iter().zip(rf.parameters.iter()).enumerate() {
        if corr.relate_types(&lp.ty, &rp.ty) == Relate::Conflict {
            return false;
        }
        if corr
            .relate(
                CorrespondenceKey::Local(LocalId::Argument(idx)),
                CorrespondenceKey::Local(LocalId::Argument(idx)),
            )
            == Relate::Conflict
        {
            return false;
        }
    }
    true
}

/// The generic, non-overridable structural equality test for one
/// instruction pair: opcode, operand count/kind/value, result type, and
/// opcode-specific attributes (§4.2 step 3). Every hook's default
/// `cmp_operations_with_operands` and every benign-pattern rule that falls
/// through to "is this actually the same instruction" calls this.
pub fn base_instruction_equal(
    corr: &mut ValueCorrespondence,
    lt: &LocalNameTable,
    rt: &LocalNameTable,
    l: &Instruction,
    r: &Instruction,
    cmp_global: &mut dyn FnMut(&str, &str) -> bool,
) -> bool {
    instruction_equal(corr, lt, rt, l, r, cmp_global, false)
}

/// Same check as [`base_instruction_equal`], but alignment on
/// `alloca`/`load`/`store` is not compared. Used by the `struct-alignment`
/// benign rule (§4.3) to recognize "this divergence is *only* an alignment
/// difference" without duplicating the rest of the structural comparison.
pub fn instruction_equal_ignoring_alignment(
    corr: &mut ValueCorrespondence,
    lt: &LocalNameTable,
    rt: &LocalNameTable,
    l: &Instruction,
    r: &Instruction,
    cmp_global: &mut dyn FnMut(&str, &str) -> bool,
) -> bool {
    instruction_equal(corr, lt, rt, l, r, cmp_global, true)
}

fn instruction_equal(
    corr: &mut ValueCorrespondence,
    lt: &LocalNameTable,
    rt: &LocalNameTable,
    l: &Instruction,
    r: &Instruction,
    cmp_global: &mut dyn FnMut(&str, &str) -> bool,
    ignore_alignment: bool,
) -> bool {
    use llvm_ir::Instruction::*;
    if std::mem::discriminant(l) != std::mem::discriminant(r) {
        return false;
    }
    macro_rules! bin_op {
        ($l:expr, $r:expr) => {{
            operands_equal(corr, lt, rt, &$l.operand0, &$r.operand0, cmp_global)
                && operands_equal(corr, lt, rt, &$l.operand1, &$r.operand1, cmp_global)
                && relate_result(corr, lt, rt, $l.get_type(), $r.get_type())
        }};
    }
    macro_rules! cast_op {
        ($l:expr, $r:expr) => {{
            corr.relate_types(&$l.to_type, &$r.to_type) != Relate::Conflict
                && operands_equal(corr, lt, rt, &$l.operand, &$r.operand, cmp_global)
        }};
    }
    match (l, r) {
        (Add(l), Add(r)) => bin_op!(l, r),
        (Sub(l), Sub(r)) => bin_op!(l, r),
        (Mul(l), Mul(r)) => bin_op!(l, r),
        (UDiv(l), UDiv(r)) => bin_op!(l, r),
        (SDiv(l), SDiv(r)) => bin_op!(l, r),
        (URem(l), URem(r)) => bin_op!(l, r),
        (SRem(l), SRem(r)) => bin_op!(l, r),
        (And(l), And(r)) => bin_op!(l, r),
        (Or(l), Or(r)) => bin_op!(l, r),
        (Xor(l), Xor(r)) => bin_op!(l, r),
        (Shl(l), Shl(r)) => bin_op!(l, r),
        (LShr(l), LShr(r)) => bin_op!(l, r),
        (AShr(l), AShr(r)) => bin_op!(l, r),
        (FAdd(l), FAdd(r)) => bin_op!(l, r),
        (FSub(l), FSub(r)) => bin_op!(l, r),
        (FMul(l), FMul(r)) => bin_op!(l, r),
        (FDiv(l), FDiv(r)) => bin_op!(l, r),
        (FRem(l), FRem(r)) => bin_op!(l, r),
        (FNeg(l), FNeg(r)) => operands_equal(corr, lt, rt, &l.operand, &r.operand, cmp_global),

        (Alloca(l), Alloca(r)) => {
            corr.relate_types(&l.allocated_type, &r.allocated_type) != Relate::Conflict
                && operands_equal(corr, lt, rt, &l.num_elements, &r.num_elements, cmp_global)
                && (ignore_alignment || l.alignment == r.alignment)
        }
        (Load(l), Load(r)) => {
            operands_equal(corr, lt, rt, &l.address, &r.address, cmp_global)
                && l.atomicity == r.atomicity
                && (ignore_alignment || l.alignment == r.alignment)
        }
        (Store(l), Store(r)) => {
            operands_equal(corr, lt, rt, &l.address, &r.address, cmp_global)
                && operands_equal(corr, lt, rt, &l.value, &r.value, cmp_global)
                && l.atomicity == r.atomicity
                && (ignore_alignment || l.alignment == r.alignment)
        }
        (Fence(l), Fence(r)) => l.atomicity == r.atomicity,
        (GetElementPtr(l), GetElementPtr(r)) => {
            l.in_bounds == r.in_bounds
                && l.indices.len() == r.indices.len()
                && operands_equal(corr, lt, rt, &l.address, &r.address, cmp_global)
                && l.indices
                    .iter()
                    .zip(r.indices.iter())
                    .all(|(a, b)| operands_equal(corr, lt, rt, a, b, cmp_global))
        }

        (Trunc(l), Trunc(r)) => cast_op!(l, r),
        (ZExt(l), ZExt(r)) => cast_op!(l, r),
        (SExt(l), SExt(r)) => cast_op!(l, r),
        (FPTrunc(l), FPTrunc(r)) => cast_op!(l, r),
        (FPExt(l), FPExt(r)) => cast_op!(l, r),
        (FPToUI(l), FPToUI(r)) => cast_op!(l, r),
        (FPToSI(l), FPToSI(r)) => cast_op!(l, r),
        (UIToFP(l), UIToFP(r)) => cast_op!(l, r),
        (SIToFP(l), SIToFP(r)) => cast_op!(l, r),
        (PtrToInt(l), PtrToInt(r)) => cast_op!(l, r),
        (IntToPtr(l), IntToPtr(r)) => cast_op!(l, r),
        (BitCast(l), BitCast(r)) => cast_op!(l, r),
        (AddrSpaceCast(l), AddrSpaceCast(r)) => cast_op!(l, r),

        (ICmp(l), ICmp(r)) => {
            l.predicate == r.predicate
                && operands_equal(corr, lt, rt, &l.operand0, &r.operand0, cmp_global)
                && operands_equal(corr, lt, rt, &l.operand1, &r.operand1, cmp_global)
        }
        (FCmp(l), FCmp(r)) => {
            l.predicate == r.predicate
                && operands_equal(corr, lt, rt, &l.operand0, &r.operand0, cmp_global)
                && operands_equal(corr, lt, rt, &l.operand1, &r.operand1, cmp_global)
        }
        (Phi(l), Phi(r)) => {
            corr.relate_types(&l.to_type, &r.to_type) != Relate::Conflict
                && l.incoming_values.len() == r.incoming_values.len()
                && l.incoming_values.iter().all(|(lv, lb)| {
                    r.incoming_values
                        .iter()
                        .any(|(rv, rb)| lb == rb && operands_equal(corr, lt, rt, lv, rv, cmp_global))
                })
        }
        (Select(l), Select(r)) => {
            operands_equal(corr, lt, rt, &l.condition, &r.condition, cmp_global)
                && operands_equal(corr, lt, rt, &l.true_value, &r.true_value, cmp_global)
                && operands_equal(corr, lt, rt, &l.false_value, &r.false_value, cmp_global)
        }
        (Freeze(l), Freeze(r)) => operands_equal(corr, lt, rt, &l.operand, &r.operand, cmp_global),
        (Call(l), Call(r)) => call_equal(corr, lt, rt, l, r, cmp_global),
        _ => {
            // Long-tail opcodes (atomics' rarer forms, exception-handling
            // pads, vector shuffles) are treated conservatively: textual
            // identity modulo nothing, since no positional operand model
            // is maintained for them here.
            l.to_string() == r.to_string()
        }
    }
}

fn relate_result(
    corr: &mut ValueCorrespondence,
    _lt: &LocalNameTable,
    _rt: &LocalNameTable,
    lty: TypeRef,
    rty: TypeRef,
) -> bool {
    corr.relate_types(&lty, &rty) != Relate::Conflict
}

fn call_equal(
    corr: &mut ValueCorrespondence,
    lt: &LocalNameTable,
    rt: &LocalNameTable,
    l: &llvm_ir::instruction::Call,
    r: &llvm_ir::instruction::Call,
    cmp_global: &mut dyn FnMut(&str, &str) -> bool,
) -> bool {
    if l.arguments.len() != r.arguments.len() {
        return false;
    }
    let callees_match = match (&l.function, &r.function) {
        (either::Either::Right(lo), either::Either::Right(ro)) => {
            operands_equal(corr, lt, rt, lo, ro, cmp_global)
        }
        (either::Either::Left(la), either::Either::Left(ra)) => {
            // Exact match here means no divergence to report; a text
            // mismatch falls through so the Differential Comparator's
            // inline-asm benign rule can record it as a `SyntaxDifference`
            // (§4.3).
            la.assembly == ra.assembly
        }
        _ => false,
    };
    callees_match
        && l.arguments
            .iter()
            .zip(r.arguments.iter())
            .all(|((lo, _), (ro, _))| operands_equal(corr, lt, rt, lo, ro, cmp_global))
}

/// Compare two operands "by kind (constant / argument / instruction result
/// / global / metadata) and value", extending the correspondence as
/// needed (§4.2 step 3).
pub fn operands_equal(
    corr: &mut ValueCorrespondence,
    lt: &LocalNameTable,
    rt: &LocalNameTable,
    l: &Operand,
    r: &Operand,
    cmp_global: &mut dyn FnMut(&str, &str) -> bool,
) -> bool {
    match (l, r) {
        (Operand::LocalOperand { name: ln, ty: lty }, Operand::LocalOperand { name: rn, ty: rty }) => {
            if corr.relate_types(lty, rty) == Relate::Conflict {
                return false;
            }
            match (lt.lookup(ln), rt.lookup(rn)) {
                (Some(lid), Some(rid)) => {
                    corr.relate(CorrespondenceKey::Local(lid), CorrespondenceKey::Local(rid))
                        != Relate::Conflict
                }
                _ => false,
            }
        }
        (Operand::ConstantOperand(lc), Operand::ConstantOperand(rc)) => {
            constants_equal(corr, lc, rc, cmp_global)
        }
        (Operand::MetadataOperand, Operand::MetadataOperand) => true,
        _ => false,
    }
}

fn constants_equal(
    corr: &mut ValueCorrespondence,
    l: &Constant,
    r: &Constant,
    cmp_global: &mut dyn FnMut(&str, &str) -> bool,
) -> bool {
    use llvm_ir::constant::Constant::*;
    match (l, r) {
        (Int { bits: lb, value: lv }, Int { bits: rb, value: rv }) => lb == rb && lv == rv,
        (Float(lf), Float(rf)) => lf == rf,
        (Null(lt), Null(rt)) => corr.relate_types(lt, rt) != Relate::Conflict,
        (Undef(lt), Undef(rt)) => corr.relate_types(lt, rt) != Relate::Conflict,
        (Poison(lt), Poison(rt)) => corr.relate_types(lt, rt) != Relate::Conflict,
        (GlobalReference { name, .. }, GlobalReference { name: rname, .. }) => {
            cmp_global(&name_text(name), &name_text(rname))
        }
        (Array { elements: le, .. }, Array { elements: re, .. }) => {
            le.len() == re.len()
                && le.iter().zip(re.iter()).all(|(a, b)| constants_equal(corr, a, b, cmp_global))
        }
        (Vector(le), Vector(re)) => {
            le.len() == re.len()
                && le.iter().zip(re.iter()).all(|(a, b)| constants_equal(corr, a, b, cmp_global))
        }
        (Struct { values: le, is_packed: lp, .. }, Struct { values: re, is_packed: rp, .. }) => {
            lp == rp
                && le.len() == re.len()
                && le.iter().zip(re.iter()).all(|(a, b)| constants_equal(corr, a, b, cmp_global))
        }
        _ => l.to_string() == r.to_string(),
    }
}

fn terminators_equal(
    corr: &mut ValueCorrespondence,
    lt: &LocalNameTable,
    rt: &LocalNameTable,
    l: &Terminator,
    r: &Terminator,
    hooks: &mut dyn WalkHooks,
) -> bool {
    use llvm_ir::Terminator::*;
    if std::mem::discriminant(l) != std::mem::discriminant(r) {
        return false;
    }
    let mut cmp_global = |a: &str, b: &str| hooks.cmp_global_values(a, b);
    match (l, r) {
        (Ret(l), Ret(r)) => match (&l.return_operand, &r.return_operand) {
            (Some(lo), Some(ro)) => operands_equal(corr, lt, rt, lo, ro, &mut cmp_global),
            (None, None) => true,
            _ => false,
        },
        (Br(_), Br(_)) => true,
        (CondBr(l), CondBr(r)) => operands_equal(corr, lt, rt, &l.condition, &r.condition, &mut cmp_global),
        (Switch(l), Switch(r)) => {
            l.dests.len() == r.dests.len()
                && operands_equal(corr, lt, rt, &l.operand, &r.operand, &mut cmp_global)
                && l.dests
                    .iter()
                    .zip(r.dests.iter())
                    .all(|((lc, _), (rc, _))| constants_equal(corr, lc, rc, &mut cmp_global))
        }
        (IndirectBr(l), IndirectBr(r)) => {
            l.possible_dests.len() == r.possible_dests.len()
                && operands_equal(corr, lt, rt, &l.operand, &r.operand, &mut cmp_global)
        }
        (Invoke(l), Invoke(r)) => {
            l.arguments.len() == r.arguments.len()
                && l.arguments
                    .iter()
                    .zip(r.arguments.iter())
                    .all(|((lo, _), (ro, _))| operands_equal(corr, lt, rt, lo, ro, &mut cmp_global))
        }
        (Resume(l), Resume(r)) => operands_equal(corr, lt, rt, &l.operand, &r.operand, &mut cmp_global),
        (Unreachable(_), Unreachable(_)) => true,
        _ => l.to_string() == r.to_string(),
    }
}

/// Successor block pairs, in order (ordering is significant per §4.2 step 3:
/// "the 'then' branch on the left must correspond to the 'then' branch on
/// the right").
fn successor_pairs(
    l: &Terminator,
    r: &Terminator,
    lt: &LocalNameTable,
    rt: &LocalNameTable,
) -> Vec<(usize, usize)> {
    use llvm_ir::Terminator::*;
    let lookup = |table: &LocalNameTable, name: &llvm_ir::Name| match table.lookup(name) {
        Some(LocalId::Block(idx)) => Some(idx),
        _ => None,
    };
    match (l, r) {
        (Br(l), Br(r)) => pair_opt(lookup(lt, &l.dest), lookup(rt, &r.dest)).into_iter().collect(),
        (CondBr(l), CondBr(r)) => {
            let mut v = Vec::new();
            if let Some(p) = pair_opt(lookup(lt, &l.true_dest), lookup(rt, &r.true_dest)) {
                v.push(p);
            }
            if let Some(p) = pair_opt(lookup(lt, &l.false_dest), lookup(rt, &r.false_dest)) {
                v.push(p);
            }
            v
        }
        (Switch(l), Switch(r)) => {
            let mut v = Vec::new();
            if let Some(p) = pair_opt(lookup(lt, &l.default_dest), lookup(rt, &r.default_dest)) {
                v.push(p);
            }
            for ((_, ld), (_, rd)) in l.dests.iter().zip(r.dests.iter()) {
                if let Some(p) = pair_opt(lookup(lt, ld), lookup(rt, rd)) {
                    v.push(p);
                }
            }
            v
        }
        (IndirectBr(l), IndirectBr(r)) => l
            .possible_dests
            .iter()
            .zip(r.possible_dests.iter())
            .filter_map(|(ld, rd)| pair_opt(lookup(lt, ld), lookup(rt, rd)))
            .collect(),
        (Invoke(l), Invoke(r)) => {
            let mut v = Vec::new();
            if let Some(p) = pair_opt(lookup(lt, &l.return_label), lookup(rt, &r.return_label)) {
                v.push(p);
            }
            if let Some(p) = pair_opt(lookup(lt, &l.exception_label), lookup(rt, &r.exception_label)) {
                v.push(p);
            }
            v
        }
        _ => Vec::new(),
    }
}

fn pair_opt(l: Option<usize>, r: Option<usize>) -> Option<(usize, usize)> {
    match (l, r) {
        (Some(l), Some(r)) => Some((l, r)),
        _ => None,
    }
}

/// Whether an instruction has a side effect beyond producing its result
/// value (memory writes, calls, synchronization). Shared between the
/// reference dead-code simplifier and the `dead-code` benign rule.
pub fn has_side_effects(instr: &Instruction) -> bool {
    use Instruction::*;
    matches!(
        instr,
        Store(_) | Fence(_) | Call(_) | CmpXchg(_) | AtomicRMW(_) | LandingPad(_) | CatchPad(_) | CleanupPad(_)
    )
}

/// Whether the value an instruction produces is referenced anywhere later
/// in the function (other instructions' operands or any terminator).
/// O(n) per call; acceptable since the `dead-code` rule only invokes it on
/// an actual divergence, not on every matched instruction.
pub fn result_is_used(function: &Function, name: &llvm_ir::Name) -> bool {
    let mut used = false;
    let mut check = |op: &Operand| {
        if let Operand::LocalOperand { name: n, .. } = op {
            if n == name {
                used = true;
            }
        }
    };
    for block in &function.basic_blocks {
        for instr in &block.instrs {
            for_each_operand(instr, &mut check);
        }
        terminator_operands(&block.term, &mut check);
    }
    used
}

fn terminator_operands<'a>(term: &'a Terminator, visit: &mut dyn FnMut(&'a Operand)) {
    use llvm_ir::Terminator::*;
    match term {
        Ret(r) => {
            if let Some(op) = &r.return_operand {
                visit(op);
            }
        }
        CondBr(c) => visit(&c.condition),
        Switch(s) => visit(&s.operand),
        IndirectBr(i) => visit(&i.operand),
        Invoke(i) => {
            for (op, _) in &i.arguments {
                visit(op);
            }
        }
        Resume(r) => visit(&r.operand),
        _ => {}
    }
}

/// A `Call` instruction's parts, surfaced for the benign-pattern rules in
/// `differential.rs` without making them match on `llvm_ir::Instruction`
/// directly.
pub struct CallView<'a> {
    pub callee: Option<String>,
    pub arguments: Vec<&'a Operand>,
    pub dest: Option<&'a llvm_ir::Name>,
}

/// Visit every operand an instruction reads, regardless of opcode. Used by
/// the reference dead-code simplifier in [`crate::collaborators::basic`] to
/// compute liveness without re-deriving the per-opcode operand layout.
pub fn for_each_operand<'a>(instr: &'a Instruction, visit: &mut dyn FnMut(&'a Operand)) {
    use llvm_ir::Instruction::*;
    macro_rules! bin {
        ($i:expr) => {{
            visit(&$i.operand0);
            visit(&$i.operand1);
        }};
    }
    match instr {
        Add(i) => bin!(i),
        Sub(i) => bin!(i),
        Mul(i) => bin!(i),
        UDiv(i) => bin!(i),
        SDiv(i) => bin!(i),
        URem(i) => bin!(i),
        SRem(i) => bin!(i),
        And(i) => bin!(i),
        Or(i) => bin!(i),
        Xor(i) => bin!(i),
        Shl(i) => bin!(i),
        LShr(i) => bin!(i),
        AShr(i) => bin!(i),
        FAdd(i) => bin!(i),
        FSub(i) => bin!(i),
        FMul(i) => bin!(i),
        FDiv(i) => bin!(i),
        FRem(i) => bin!(i),
        FNeg(i) => visit(&i.operand),
        ExtractElement(i) => {
            visit(&i.vector);
            visit(&i.index);
        }
        InsertElement(i) => {
            visit(&i.vector);
            visit(&i.element);
            visit(&i.index);
        }
        ShuffleVector(i) => {
            visit(&i.operand0);
            visit(&i.operand1);
        }
        ExtractValue(i) => visit(&i.aggregate),
        InsertValue(i) => {
            visit(&i.aggregate);
            visit(&i.element);
        }
        Alloca(i) => visit(&i.num_elements),
        Load(i) => visit(&i.address),
        Store(i) => {
            visit(&i.address);
            visit(&i.value);
        }
        CmpXchg(i) => {
            visit(&i.address);
            visit(&i.expected);
            visit(&i.replacement);
        }
        AtomicRMW(i) => {
            visit(&i.address);
            visit(&i.value);
        }
        GetElementPtr(i) => {
            visit(&i.address);
            for idx in &i.indices {
                visit(idx);
            }
        }
        Trunc(i) => visit(&i.operand),
        ZExt(i) => visit(&i.operand),
        SExt(i) => visit(&i.operand),
        FPTrunc(i) => visit(&i.operand),
        FPExt(i) => visit(&i.operand),
        FPToUI(i) => visit(&i.operand),
        FPToSI(i) => visit(&i.operand),
        UIToFP(i) => visit(&i.operand),
        SIToFP(i) => visit(&i.operand),
        PtrToInt(i) => visit(&i.operand),
        IntToPtr(i) => visit(&i.operand),
        BitCast(i) => visit(&i.operand),
        AddrSpaceCast(i) => visit(&i.operand),
        ICmp(i) => {
            visit(&i.operand0);
            visit(&i.operand1);
        }
        FCmp(i) => {
            visit(&i.operand0);
            visit(&i.operand1);
        }
        Phi(i) => {
            for (v, _) in &i.incoming_values {
                visit(v);
            }
        }
        Select(i) => {
            visit(&i.condition);
            visit(&i.true_value);
            visit(&i.false_value);
        }
        Freeze(i) => visit(&i.operand),
        Call(i) => {
            if let either::Either::Right(op) = &i.function {
                visit(op);
            }
            for (op, _) in &i.arguments {
                visit(op);
            }
        }
        Fence(_) => {}
        VAArg(i) => visit(&i.operand),
        LandingPad(_) => {}
        CatchPad(i) => {
            for op in &i.args {
                visit(op);
            }
        }
        CleanupPad(i) => {
            for op in &i.args {
                visit(op);
            }
        }
    }
}

/// Mutable counterpart of [`for_each_operand`]: visits every operand an
/// instruction reads, letting the caller rewrite it in place. Used by the
/// reference inliner in [`crate::collaborators::basic`] to alpha-rename a
/// spliced-in callee body's operand references.
pub fn for_each_operand_mut(instr: &mut Instruction, visit: &mut dyn FnMut(&mut Operand)) {
    use llvm_ir::Instruction::*;
    macro_rules! bin {
        ($i:expr) => {{
            visit(&mut $i.operand0);
            visit(&mut $i.operand1);
        }};
    }
    match instr {
        Add(i) => bin!(i),
        Sub(i) => bin!(i),
        Mul(i) => bin!(i),
        UDiv(i) => bin!(i),
        SDiv(i) => bin!(i),
        URem(i) => bin!(i),
        SRem(i) => bin!(i),
        And(i) => bin!(i),
        Or(i) => bin!(i),
        Xor(i) => bin!(i),
        Shl(i) => bin!(i),
        LShr(i) => bin!(i),
        AShr(i) => bin!(i),
        FAdd(i) => bin!(i),
        FSub(i) => bin!(i),
        FMul(i) => bin!(i),
        FDiv(i) => bin!(i),
        FRem(i) => bin!(i),
        FNeg(i) => visit(&mut i.operand),
        ExtractElement(i) => {
            visit(&mut i.vector);
            visit(&mut i.index);
        }
        InsertElement(i) => {
            visit(&mut i.vector);
            visit(&mut i.element);
            visit(&mut i.index);
        }
        ShuffleVector(i) => {
            visit(&mut i.operand0);
            visit(&mut i.operand1);
        }
        ExtractValue(i) => visit(&mut i.aggregate),
        InsertValue(i) => {
            visit(&mut i.aggregate);
            visit(&mut i.element);
        }
        Alloca(i) => visit(&mut i.num_elements),
        Load(i) => visit(&mut i.address),
        Store(i) => {
            visit(&mut i.address);
            visit(&mut i.value);
        }
        CmpXchg(i) => {
            visit(&mut i.address);
            visit(&mut i.expected);
            visit(&mut i.replacement);
        }
        AtomicRMW(i) => {
            visit(&mut i.address);
            visit(&mut i.value);
        }
        GetElementPtr(i) => {
            visit(&mut i.address);
            for idx in &mut i.indices {
                visit(idx);
            }
        }
        Trunc(i) => visit(&mut i.operand),
        ZExt(i) => visit(&mut i.operand),
        SExt(i) => visit(&mut i.operand),
        FPTrunc(i) => visit(&mut i.operand),
        FPExt(i) => visit(&mut i.operand),
        FPToUI(i) => visit(&mut i.operand),
        FPToSI(i) => visit(&mut i.operand),
        UIToFP(i) => visit(&mut i.operand),
        SIToFP(i) => visit(&mut i.operand),
        PtrToInt(i) => visit(&mut i.operand),
        IntToPtr(i) => visit(&mut i.operand),
        BitCast(i) => visit(&mut i.operand),
        AddrSpaceCast(i) => visit(&mut i.operand),
        ICmp(i) => {
            visit(&mut i.operand0);
            visit(&mut i.operand1);
        }
        FCmp(i) => {
            visit(&mut i.operand0);
            visit(&mut i.operand1);
        }
        Phi(i) => {
            for (v, _) in &mut i.incoming_values {
                visit(v);
            }
        }
        Select(i) => {
            visit(&mut i.condition);
            visit(&mut i.true_value);
            visit(&mut i.false_value);
        }
        Freeze(i) => visit(&mut i.operand),
        Call(i) => {
            if let either::Either::Right(op) = &mut i.function {
                visit(op);
            }
            for (op, _) in &mut i.arguments {
                visit(op);
            }
        }
        Fence(_) => {}
        VAArg(i) => visit(&mut i.operand),
        LandingPad(_) => {}
        CatchPad(i) => {
            for op in &mut i.args {
                visit(op);
            }
        }
        CleanupPad(i) => {
            for op in &mut i.args {
                visit(op);
            }
        }
    }
}

/// Mutable counterpart of the terminator half of [`for_each_operand`]'s job;
/// exposed so the reference inliner can rewrite a spliced block's
/// terminator operands the same way it rewrites its instructions'.
pub fn terminator_operands_mut(term: &mut Terminator, visit: &mut dyn FnMut(&mut Operand)) {
    use llvm_ir::Terminator::*;
    match term {
        Ret(r) => {
            if let Some(op) = &mut r.return_operand {
                visit(op);
            }
        }
        CondBr(c) => visit(&mut c.condition),
        Switch(s) => visit(&mut s.operand),
        IndirectBr(i) => visit(&mut i.operand),
        Invoke(i) => {
            for (op, _) in &mut i.arguments {
                visit(op);
            }
        }
        Resume(r) => visit(&mut r.operand),
        _ => {}
    }
}

pub fn call_view(instr: &Instruction) -> Option<CallView<'_>> {
    let Instruction::Call(c) = instr else { return None };
    let callee = match &c.function {
        either::Either::Right(Operand::ConstantOperand(constant)) => match constant.as_ref() {
            Constant::GlobalReference { name, .. } => Some(name_text(name)),
            _ => None,
        },
        _ => None,
    };
    Some(CallView {
        callee,
        arguments: c.arguments.iter().map(|(o, _)| o).collect(),
        dest: c.dest.as_ref(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_hooks_default_global_cmp_strips_suffix() {
        let mut hooks = GenericHooks;
        assert!(hooks.cmp_global_values("foo.17", "foo"));
        assert!(!hooks.cmp_global_values("foo", "bar"));
    }
}

//! Small helpers for working with `llvm-ir` values positionally rather than
//! by their textual `Name`, per §4.1: "Local values are identified
//! positionally (argument index, instruction stream index within a block)."

use std::collections::HashMap;

use llvm_ir::{Function, Name};

/// A local value's identity within a single function, independent of the
/// `Name` the compiler happened to assign it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LocalId {
    Argument(usize),
    /// The result of the instruction at `index` within `block`.
    Instruction { block: usize, index: usize },
    /// The result of a block's terminator, when it produces a value
    /// (`invoke`, `catchswitch`, `cleanupret` with a value, etc).
    Terminator { block: usize },
    Block(usize),
}

/// Maps every named value a function defines (arguments, instruction
/// results, block labels) to its positional [`LocalId`].
///
/// Built once per function before a walk starts; the walk consults it
/// whenever an operand refers back to an earlier value by `Name`.
pub struct LocalNameTable {
    by_name: HashMap<Name, LocalId>,
}

impl LocalNameTable {
    pub fn build(function: &Function) -> Self {
        let mut by_name = HashMap::new();
        for (idx, param) in function.parameters.iter().enumerate() {
            by_name.insert(param.name.clone(), LocalId::Argument(idx));
        }
        for (block_idx, block) in function.basic_blocks.iter().enumerate() {
            by_name.insert(block.name.clone(), LocalId::Block(block_idx));
            for (instr_idx, instr) in block.instrs.iter().enumerate() {
                if let Some(name) = instruction_result_name(instr) {
                    by_name.insert(name.clone(), LocalId::Instruction {
                        block: block_idx,
                        index: instr_idx,
                    });
                }
            }
            if let Some(name) = terminator_result_name(&block.term) {
                by_name.insert(name.clone(), LocalId::Terminator { block: block_idx });
            }
        }
        LocalNameTable { by_name }
    }

    pub fn lookup(&self, name: &Name) -> Option<LocalId> {
        self.by_name.get(name).copied()
    }
}

/// The `Name` an instruction binds its result to, if any. Instructions with
/// no result (`Store`, `Fence`, `Call` to a void function, ...) return `None`.
fn instruction_result_name(instr: &llvm_ir::Instruction) -> Option<&Name> {
    use llvm_ir::Instruction::*;
    match instr {
        Store(_) | Fence(_) | Call(llvm_ir::instruction::Call { dest: None, .. }) => None,
        Add(i) => Some(&i.dest),
        Sub(i) => Some(&i.dest),
        Mul(i) => Some(&i.dest),
        UDiv(i) => Some(&i.dest),
        SDiv(i) => Some(&i.dest),
        URem(i) => Some(&i.dest),
        SRem(i) => Some(&i.dest),
        And(i) => Some(&i.dest),
        Or(i) => Some(&i.dest),
        Xor(i) => Some(&i.dest),
        Shl(i) => Some(&i.dest),
        LShr(i) => Some(&i.dest),
        AShr(i) => Some(&i.dest),
        FAdd(i) => Some(&i.dest),
        FSub(i) => Some(&i.dest),
        FMul(i) => Some(&i.dest),
        FDiv(i) => Some(&i.dest),
        FRem(i) => Some(&i.dest),
        FNeg(i) => Some(&i.dest),
        ExtractElement(i) => Some(&i.dest),
        InsertElement(i) => Some(&i.dest),
        ShuffleVector(i) => Some(&i.dest),
        ExtractValue(i) => Some(&i.dest),
        InsertValue(i) => Some(&i.dest),
        Alloca(i) => Some(&i.dest),
        Load(i) => Some(&i.dest),
        CmpXchg(i) => Some(&i.dest),
        AtomicRMW(i) => Some(&i.dest),
        GetElementPtr(i) => Some(&i.dest),
        Trunc(i) => Some(&i.dest),
        ZExt(i) => Some(&i.dest),
        SExt(i) => Some(&i.dest),
        FPTrunc(i) => Some(&i.dest),
        FPExt(i) => Some(&i.dest),
        FPToUI(i) => Some(&i.dest),
        FPToSI(i) => Some(&i.dest),
        UIToFP(i) => Some(&i.dest),
        SIToFP(i) => Some(&i.dest),
        PtrToInt(i) => Some(&i.dest),
        IntToPtr(i) => Some(&i.dest),
        BitCast(i) => Some(&i.dest),
        AddrSpaceCast(i) => Some(&i.dest),
        ICmp(i) => Some(&i.dest),
        FCmp(i) => Some(&i.dest),
        Phi(i) => Some(&i.dest),
        Select(i) => Some(&i.dest),
        Freeze(i) => Some(&i.dest),
        Call(i) => i.dest.as_ref(),
        VAArg(i) => Some(&i.dest),
        LandingPad(i) => Some(&i.dest),
        CatchPad(i) => Some(&i.dest),
        CleanupPad(i) => Some(&i.dest),
    }
}

/// Public view of [`instruction_result_name`] for collaborators outside this
/// module (the `basic` simplifier/inliner need it to reason about liveness).
pub fn instruction_result_name_pub(instr: &llvm_ir::Instruction) -> Option<&Name> {
    instruction_result_name(instr)
}

/// Overwrite the `Name` an instruction binds its result to. Used by the
/// reference inliner in [`crate::collaborators::basic`] to alpha-rename a
/// spliced-in callee body. Panics on instructions with no result slot.
pub fn set_instruction_result_name(instr: &mut llvm_ir::Instruction, new_name: Name) {
    use llvm_ir::Instruction::*;
    match instr {
        Store(_) | Fence(_) => panic!("instruction has no result to rename"),
        Call(i) => {
            if i.dest.is_some() {
                i.dest = Some(new_name);
            } else {
                panic!("void call has no result to rename");
            }
        }
        Add(i) => i.dest = new_name,
        Sub(i) => i.dest = new_name,
        Mul(i) => i.dest = new_name,
        UDiv(i) => i.dest = new_name,
        SDiv(i) => i.dest = new_name,
        URem(i) => i.dest = new_name,
        SRem(i) => i.dest = new_name,
        And(i) => i.dest = new_name,
        Or(i) => i.dest = new_name,
        Xor(i) => i.dest = new_name,
        Shl(i) => i.dest = new_name,
        LShr(i) => i.dest = new_name,
        AShr(i) => i.dest = new_name,
        FAdd(i) => i.dest = new_name,
        FSub(i) => i.dest = new_name,
        FMul(i) => i.dest = new_name,
        FDiv(i) => i.dest = new_name,
        FRem(i) => i.dest = new_name,
        FNeg(i) => i.dest = new_name,
        ExtractElement(i) => i.dest = new_name,
        InsertElement(i) => i.dest = new_name,
        ShuffleVector(i) => i.dest = new_name,
        ExtractValue(i) => i.dest = new_name,
        InsertValue(i) => i.dest = new_name,
        Alloca(i) => i.dest = new_name,
        Load(i) => i.dest = new_name,
        CmpXchg(i) => i.dest = new_name,
        AtomicRMW(i) => i.dest = new_name,
        GetElementPtr(i) => i.dest = new_name,
        Trunc(i) => i.dest = new_name,
        ZExt(i) => i.dest = new_name,
        SExt(i) => i.dest = new_name,
        FPTrunc(i) => i.dest = new_name,
        FPExt(i) => i.dest = new_name,
        FPToUI(i) => i.dest = new_name,
        FPToSI(i) => i.dest = new_name,
        UIToFP(i) => i.dest = new_name,
        SIToFP(i) => i.dest = new_name,
        PtrToInt(i) => i.dest = new_name,
        IntToPtr(i) => i.dest = new_name,
        BitCast(i) => i.dest = new_name,
        AddrSpaceCast(i) => i.dest = new_name,
        ICmp(i) => i.dest = new_name,
        FCmp(i) => i.dest = new_name,
        Phi(i) => i.dest = new_name,
        Select(i) => i.dest = new_name,
        Freeze(i) => i.dest = new_name,
        VAArg(i) => i.dest = new_name,
        LandingPad(i) => i.dest = new_name,
        CatchPad(i) => i.dest = new_name,
        CleanupPad(i) => i.dest = new_name,
    }
}

fn terminator_result_name(term: &llvm_ir::Terminator) -> Option<&Name> {
    use llvm_ir::Terminator::*;
    match term {
        Invoke(i) => Some(&i.result),
        CatchSwitch(i) => Some(&i.result),
        CallBr(i) => i.result.as_ref(),
        _ => None,
    }
}

/// Render a `Name` the way the rest of the crate expects to see it: the
/// textual name when the value was named, or `%N` for a compiler-numbered
/// temporary.
pub fn name_text(name: &Name) -> String {
    match name {
        Name::Name(n) => n.to_string(),
        Name::Number(n) => format!("%{}", n),
    }
}

/// Strip a compiler-generated numeric suffix (`foo.42` -> `foo`), per the
/// suffix-handling design note in §9: indistinguishable from a source-level
/// identifier that happens to end the same way, so this is applied uniformly.
pub fn strip_suffix(name: &str) -> &str {
    if let Some(dot) = name.rfind('.') {
        let (base, rest) = name.split_at(dot);
        let digits = &rest[1..];
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            return base;
        }
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_numeric_suffix() {
        assert_eq!(strip_suffix("foo.42"), "foo");
        assert_eq!(strip_suffix("foo.17.9"), "foo.17");
    }

    #[test]
    fn leaves_non_numeric_suffix_alone() {
        assert_eq!(strip_suffix("foo.bar"), "foo.bar");
        assert_eq!(strip_suffix("foo"), "foo");
        assert_eq!(strip_suffix("foo."), "foo.");
    }
}

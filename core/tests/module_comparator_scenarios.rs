//! End-to-end §8 scenarios driven through `ModuleComparator::compare_pair`
//! over minimal hand-built `llvm_ir::Module`/`Function`/`BasicBlock` values,
//! following the `Function::new`/`BasicBlock::new` builder constructors the
//! `llvm-ir` crate exposes so each fixture only has to set the fields the
//! scenario actually cares about.

use std::rc::Rc;

use llvm_ir::instruction::{Add, Alloca, Call, Mul, Store};
use llvm_ir::terminator::Ret;
use llvm_ir::{
    BasicBlock, CallingConvention, Function, Instruction, Module, Name, Operand, Terminator, Type, TypeRef,
};

use semdiff_core::collaborators::{basic, noop};
use semdiff_core::config::ComparatorConfig;
use semdiff_core::correspondence::ValueCorrespondence;
use semdiff_core::pattern::PatternSet;
use semdiff_core::{ModuleComparator, Verdict};

fn i32_ty() -> TypeRef {
    Rc::new(Type::IntegerType { bits: 32 })
}

fn void_ty() -> TypeRef {
    Rc::new(Type::VoidType)
}

fn local(name: &str, ty: TypeRef) -> Operand {
    Operand::LocalOperand { name: Name::Name(name.into()), ty }
}

fn const_i32(value: u64) -> Operand {
    Operand::ConstantOperand(Rc::new(llvm_ir::Constant::Int { bits: 32, value }))
}

/// `fn add_one(%a: i32) -> i32 { %r = add i32 %a, 1; ret i32 %r }`, the
/// shared shape most scenarios below start from and then diverge.
fn add_one_function(name: &str) -> Function {
    let mut f = Function::new(name);
    f.parameters = vec![llvm_ir::function::Parameter {
        name: Name::Name("a".into()),
        ty: i32_ty(),
        attributes: Vec::new(),
    }];
    f.return_type = i32_ty();
    f.is_var_arg = false;
    f.calling_convention = CallingConvention::C;

    let mut entry = BasicBlock::new(Name::Name("entry".into()));
    entry.instrs.push(Instruction::Add(Add {
        operand0: local("a", i32_ty()),
        operand1: const_i32(1),
        dest: Name::Name("r".into()),
        debugloc: None,
    }));
    entry.term = Terminator::Ret(Ret { return_operand: Some(local("r", i32_ty())), debugloc: None });
    f.basic_blocks = vec![entry];
    f
}

fn module_of(functions: Vec<Function>) -> Module {
    let mut m = Module::new("m");
    m.functions = functions;
    m
}

fn comparator_for<'a>(
    config: &'a ComparatorConfig,
    patterns: &'a PatternSet,
    debug_info: &'a dyn semdiff_core::collaborators::DebugInfoIndex,
    aggregate_index: &'a dyn semdiff_core::collaborators::AggregateSizeIndex,
    simplifier: &'a mut dyn semdiff_core::collaborators::Simplifier,
    inliner: &'a mut dyn semdiff_core::collaborators::Inliner,
) -> ModuleComparator<'a> {
    ModuleComparator::new(config, patterns, debug_info, aggregate_index, simplifier, inliner)
}

#[test]
fn identical_functions_are_equal() {
    let mut left = module_of(vec![add_one_function("add_one")]);
    let mut right = module_of(vec![add_one_function("add_one")]);

    let config = ComparatorConfig::default();
    let patterns = PatternSet::empty();
    let debug_info = noop::NoDebugInfo;
    let aggregate_index = noop::NoAggregateIndex;
    let mut simplifier = noop::NoSimplifier;
    let mut inliner = noop::NoInliner;
    let mut comparator =
        comparator_for(&config, &patterns, &debug_info, &aggregate_index, &mut simplifier, &mut inliner);

    let outcome = comparator.compare_pair(&mut left, &mut right, "add_one", "add_one").unwrap();
    assert_eq!(outcome.verdict, Verdict::Equal);
    assert!(outcome.differences.is_empty());
    assert!(outcome.missing_defs.is_empty());
}

#[test]
fn alignment_only_difference_is_tolerated_under_struct_alignment() {
    let mut lf = add_one_function("add_one");
    let mut rf = add_one_function("add_one");
    lf.basic_blocks[0].instrs.push(Instruction::Alloca(Alloca {
        allocated_type: i32_ty(),
        num_elements: const_i32(1),
        dest: Name::Name("slot".into()),
        alignment: 4,
        debugloc: None,
    }));
    rf.basic_blocks[0].instrs.insert(
        1,
        Instruction::Alloca(Alloca {
            allocated_type: i32_ty(),
            num_elements: const_i32(1),
            dest: Name::Name("slot".into()),
            alignment: 8,
            debugloc: None,
        }),
    );

    let mut left = module_of(vec![lf]);
    let mut right = module_of(vec![rf]);

    let config = ComparatorConfig::default();
    let patterns = PatternSet::empty();
    let debug_info = noop::NoDebugInfo;
    let aggregate_index = noop::NoAggregateIndex;
    let mut simplifier = noop::NoSimplifier;
    let mut inliner = noop::NoInliner;
    let mut comparator =
        comparator_for(&config, &patterns, &debug_info, &aggregate_index, &mut simplifier, &mut inliner);

    let outcome = comparator.compare_pair(&mut left, &mut right, "add_one", "add_one").unwrap();
    assert_eq!(outcome.verdict, Verdict::Equal);
}

#[test]
fn alignment_only_difference_is_rejected_when_the_rule_is_off() {
    let mut lf = add_one_function("add_one");
    let mut rf = add_one_function("add_one");
    lf.basic_blocks[0].instrs.push(Instruction::Alloca(Alloca {
        allocated_type: i32_ty(),
        num_elements: const_i32(1),
        dest: Name::Name("slot".into()),
        alignment: 4,
        debugloc: None,
    }));
    rf.basic_blocks[0].instrs.insert(
        1,
        Instruction::Alloca(Alloca {
            allocated_type: i32_ty(),
            num_elements: const_i32(1),
            dest: Name::Name("slot".into()),
            alignment: 8,
            debugloc: None,
        }),
    );

    let mut left = module_of(vec![lf]);
    let mut right = module_of(vec![rf]);

    let mut config = ComparatorConfig::default();
    config.struct_alignment = false;
    let patterns = PatternSet::empty();
    let debug_info = noop::NoDebugInfo;
    let aggregate_index = noop::NoAggregateIndex;
    let mut simplifier = noop::NoSimplifier;
    let mut inliner = noop::NoInliner;
    let mut comparator =
        comparator_for(&config, &patterns, &debug_info, &aggregate_index, &mut simplifier, &mut inliner);

    let outcome = comparator.compare_pair(&mut left, &mut right, "add_one", "add_one").unwrap();
    assert_eq!(outcome.verdict, Verdict::NotEqual);
}

#[test]
fn suffix_renamed_declaration_is_equal() {
    // Both sides are declarations only (no basic blocks); suffix-stripped
    // names match, so the declaration fast path must accept the pair
    // without ever resolving a body (§4.5 step 3).
    let left_decl = Function::new("helper.42");
    let right_decl = Function::new("helper");

    let mut left = module_of(vec![left_decl]);
    let mut right = module_of(vec![right_decl]);

    let config = ComparatorConfig::default();
    let patterns = PatternSet::empty();
    let debug_info = noop::NoDebugInfo;
    let aggregate_index = noop::NoAggregateIndex;
    let mut simplifier = noop::NoSimplifier;
    let mut inliner = noop::NoInliner;
    let mut comparator =
        comparator_for(&config, &patterns, &debug_info, &aggregate_index, &mut simplifier, &mut inliner);

    let outcome = comparator.compare_pair(&mut left, &mut right, "helper.42", "helper").unwrap();
    assert_eq!(outcome.verdict, Verdict::Equal);
}

#[test]
fn declaration_without_a_defined_counterpart_is_assumed_equal_and_recorded() {
    let left_decl = Function::new("only_declared");
    let right_def = add_one_function("only_declared");

    let mut left = module_of(vec![left_decl]);
    let mut right = module_of(vec![right_def]);

    let config = ComparatorConfig::default();
    let patterns = PatternSet::empty();
    let debug_info = noop::NoDebugInfo;
    let aggregate_index = noop::NoAggregateIndex;
    let mut simplifier = noop::NoSimplifier;
    let mut inliner = noop::NoInliner;
    let mut comparator =
        comparator_for(&config, &patterns, &debug_info, &aggregate_index, &mut simplifier, &mut inliner);

    let outcome = comparator.compare_pair(&mut left, &mut right, "only_declared", "only_declared").unwrap();
    assert_eq!(outcome.verdict, Verdict::AssumedEqual);
    assert_eq!(outcome.missing_defs.len(), 1);
    assert_eq!(outcome.missing_defs[0].left.as_deref(), Some("only_declared"));
    assert_eq!(outcome.missing_defs[0].right, None);
}

#[test]
fn control_flow_only_mode_ignores_differing_arithmetic() {
    let mut lf = add_one_function("add_one");
    let mut rf = add_one_function("add_one");
    // Replace the right side's `add ..., 1` with `add ..., 2`: a real
    // behavioral difference, tolerated only because control-flow-only mode
    // short-circuits every instruction comparison (§4.3).
    rf.basic_blocks[0].instrs[0] = Instruction::Add(Add {
        operand0: local("a", i32_ty()),
        operand1: const_i32(2),
        dest: Name::Name("r".into()),
        debugloc: None,
    });

    let mut left = module_of(vec![lf]);
    let mut right = module_of(vec![rf]);

    let mut config = ComparatorConfig::default();
    config.control_flow_only = true;
    let patterns = PatternSet::empty();
    let debug_info = noop::NoDebugInfo;
    let aggregate_index = noop::NoAggregateIndex;
    let mut simplifier = noop::NoSimplifier;
    let mut inliner = noop::NoInliner;
    let mut comparator =
        comparator_for(&config, &patterns, &debug_info, &aggregate_index, &mut simplifier, &mut inliner);

    let outcome = comparator.compare_pair(&mut left, &mut right, "add_one", "add_one").unwrap();
    assert_eq!(outcome.verdict, Verdict::Equal);
}

#[test]
fn dead_store_with_no_later_use_is_skipped_by_dead_code_rule() {
    let mut lf = add_one_function("add_one");
    // A store to a local alloca whose value is never read back: benign
    // under `dead-code`, absent entirely on the right.
    lf.basic_blocks[0].instrs.insert(
        0,
        Instruction::Alloca(Alloca {
            allocated_type: i32_ty(),
            num_elements: const_i32(1),
            dest: Name::Name("slot".into()),
            alignment: 4,
            debugloc: None,
        }),
    );
    lf.basic_blocks[0].instrs.insert(
        1,
        Instruction::Store(Store {
            address: local("slot", Rc::new(Type::PointerType { pointee_type: i32_ty(), addr_space: 0 })),
            value: const_i32(9),
            alignment: 4,
            atomicity: None,
            debugloc: None,
        }),
    );

    let rf = add_one_function("add_one");

    let mut left = module_of(vec![lf]);
    let mut right = module_of(vec![rf]);

    let config = ComparatorConfig::default();
    let patterns = PatternSet::empty();
    let debug_info = noop::NoDebugInfo;
    let aggregate_index = noop::NoAggregateIndex;
    let mut simplifier = noop::NoSimplifier;
    let mut inliner = noop::NoInliner;
    let mut comparator =
        comparator_for(&config, &patterns, &debug_info, &aggregate_index, &mut simplifier, &mut inliner);

    let outcome = comparator.compare_pair(&mut left, &mut right, "add_one", "add_one").unwrap();
    assert_eq!(outcome.verdict, Verdict::Equal);
}

#[test]
fn unrelated_functions_are_not_equal() {
    let lf = add_one_function("add_one");
    let mut rf = Function::new("add_one");
    rf.return_type = i32_ty();
    rf.parameters = vec![llvm_ir::function::Parameter {
        name: Name::Name("a".into()),
        ty: i32_ty(),
        attributes: Vec::new(),
    }];
    let mut entry = BasicBlock::new(Name::Name("entry".into()));
    entry.instrs.push(Instruction::Call(Call {
        function: either::Either::Right(Operand::ConstantOperand(Rc::new(llvm_ir::Constant::GlobalReference {
            name: Name::Name("totally_different".into()),
            ty: void_ty(),
        }))),
        arguments: Vec::new(),
        return_attributes: Vec::new(),
        dest: None,
        function_attributes: Vec::new(),
        is_tail_call: false,
        calling_convention: CallingConvention::C,
        debugloc: None,
    }));
    entry.term = Terminator::Ret(Ret { return_operand: None, debugloc: None });
    rf.basic_blocks = vec![entry];

    let mut left = module_of(vec![lf]);
    let mut right = module_of(vec![rf]);

    let config = ComparatorConfig::default();
    let patterns = PatternSet::empty();
    let debug_info = noop::NoDebugInfo;
    let aggregate_index = noop::NoAggregateIndex;
    let mut simplifier = noop::NoSimplifier;
    let mut inliner = noop::NoInliner;
    let mut comparator =
        comparator_for(&config, &patterns, &debug_info, &aggregate_index, &mut simplifier, &mut inliner);

    let outcome = comparator.compare_pair(&mut left, &mut right, "add_one", "add_one").unwrap();
    assert_eq!(outcome.verdict, Verdict::NotEqual);
}

#[test]
fn fresh_correspondence_does_not_leak_across_unrelated_functions() {
    // Sanity check that each top-level pair gets its own bijection: comparing
    // the same left function against two structurally distinct right
    // functions in sequence must not let the first comparison's bindings
    // taint the second (§5: one `ValueCorrespondence` per walk).
    let mut corr = ValueCorrespondence::new();
    let key_a = semdiff_core::correspondence::CorrespondenceKey::Global("a".to_string());
    let key_b = semdiff_core::correspondence::CorrespondenceKey::Global("b".to_string());
    assert_eq!(corr.relate(key_a.clone(), key_b.clone()), semdiff_core::correspondence::Relate::Consistent);
    let mut fresh = ValueCorrespondence::new();
    corr.copy_globals_into(&mut fresh);
    assert_eq!(fresh.lookup_left(&key_a), Some(&key_b));
}

#[test]
fn missing_callee_definition_during_inlining_is_recorded() {
    // `add_one` calls a declaration-only helper on the left and a function
    // with a genuinely different body on the right; function-splits can't
    // resolve the split because the left callee has no body to inline, so
    // the pair ends up different with a recorded `MissingDef`.
    let mut lf = add_one_function("caller");
    lf.basic_blocks[0].instrs.insert(
        0,
        Instruction::Call(Call {
            function: either::Either::Right(Operand::ConstantOperand(Rc::new(llvm_ir::Constant::GlobalReference {
                name: Name::Name("left_only_declared".into()),
                ty: void_ty(),
            }))),
            arguments: Vec::new(),
            return_attributes: Vec::new(),
            dest: None,
            function_attributes: Vec::new(),
            is_tail_call: false,
            calling_convention: CallingConvention::C,
            debugloc: None,
        }),
    );
    let left_callee = Function::new("left_only_declared");

    let mut rf = add_one_function("caller");
    rf.basic_blocks[0].instrs.insert(
        0,
        Instruction::Call(Call {
            function: either::Either::Right(Operand::ConstantOperand(Rc::new(llvm_ir::Constant::GlobalReference {
                name: Name::Name("right_only_declared".into()),
                ty: void_ty(),
            }))),
            arguments: Vec::new(),
            return_attributes: Vec::new(),
            dest: None,
            function_attributes: Vec::new(),
            is_tail_call: false,
            calling_convention: CallingConvention::C,
            debugloc: None,
        }),
    );
    let right_callee = Function::new("right_only_declared");

    let mut left = module_of(vec![lf, left_callee]);
    let mut right = module_of(vec![rf, right_callee]);

    let config = ComparatorConfig::default();
    let patterns = PatternSet::empty();
    let debug_info = basic::StaticDebugInfo::default();
    let aggregate_index = noop::NoAggregateIndex;
    let mut simplifier = basic::DeadCodeSimplifier::default();
    let mut inliner = basic::SingleBlockInliner::default();
    let mut comparator =
        comparator_for(&config, &patterns, &debug_info, &aggregate_index, &mut simplifier, &mut inliner);

    let outcome = comparator.compare_pair(&mut left, &mut right, "caller", "caller").unwrap();
    assert_eq!(outcome.verdict, Verdict::NotEqual);
    assert!(!outcome.missing_defs.is_empty());
}

/// A differently-named, parameterless helper with a genuine inter-instruction
/// data dependency: `%t1 = add i32 0, 1; %t2 = mul i32 %t1, 3; ret i32 %t2`.
/// Parameterless deliberately: the splice only has to alias the call's own
/// result, never a callee formal parameter.
fn multi_instruction_helper(name: &str) -> Function {
    let mut f = Function::new(name);
    f.return_type = i32_ty();
    f.is_var_arg = false;
    f.calling_convention = CallingConvention::C;

    let mut entry = BasicBlock::new(Name::Name("entry".into()));
    entry.instrs.push(Instruction::Add(Add {
        operand0: const_i32(0),
        operand1: const_i32(1),
        dest: Name::Name("t1".into()),
        debugloc: None,
    }));
    entry.instrs.push(Instruction::Mul(Mul {
        operand0: local("t1", i32_ty()),
        operand1: const_i32(3),
        dest: Name::Name("t2".into()),
        debugloc: None,
    }));
    entry.term = Terminator::Ret(Ret { return_operand: Some(local("t2", i32_ty())), debugloc: None });
    f.basic_blocks = vec![entry];
    f
}

fn caller_of(name: &str, callee_name: &str) -> Function {
    let mut f = Function::new(name);
    f.return_type = i32_ty();
    f.is_var_arg = false;
    f.calling_convention = CallingConvention::C;

    let mut entry = BasicBlock::new(Name::Name("entry".into()));
    entry.instrs.push(Instruction::Call(Call {
        function: either::Either::Right(Operand::ConstantOperand(Rc::new(llvm_ir::Constant::GlobalReference {
            name: Name::Name(callee_name.into()),
            ty: i32_ty(),
        }))),
        arguments: Vec::new(),
        return_attributes: Vec::new(),
        dest: Some(Name::Name("c".into())),
        function_attributes: Vec::new(),
        is_tail_call: false,
        calling_convention: CallingConvention::C,
        debugloc: None,
    }));
    entry.term = Terminator::Ret(Ret { return_operand: Some(local("c", i32_ty())), debugloc: None });
    f.basic_blocks = vec![entry];
    f
}

#[test]
fn function_split_inlines_both_sides_and_reconverges_to_equal() {
    // Both callers invoke a differently-named but semantically identical
    // 2-instruction helper (§8 Scenario 2: a function split across
    // versions). Neither callee resolves structurally against the other by
    // name, so the walk reports `TryInline`; with `function_splits` on,
    // both sides get their helper spliced in and re-simplified, and the
    // post-inline walk must reconverge to `Equal`.
    let lf = caller_of("caller", "left_helper");
    let left_callee = multi_instruction_helper("left_helper");
    let rf = caller_of("caller", "right_helper");
    let right_callee = multi_instruction_helper("right_helper");

    let mut left = module_of(vec![lf, left_callee]);
    let mut right = module_of(vec![rf, right_callee]);

    let config = ComparatorConfig::default();
    let patterns = PatternSet::empty();
    let debug_info = basic::StaticDebugInfo::default();
    let aggregate_index = noop::NoAggregateIndex;
    let mut simplifier = basic::DeadCodeSimplifier::default();
    let mut inliner = basic::SingleBlockInliner::default();
    let mut comparator =
        comparator_for(&config, &patterns, &debug_info, &aggregate_index, &mut simplifier, &mut inliner);

    let outcome = comparator.compare_pair(&mut left, &mut right, "caller", "caller").unwrap();
    assert_eq!(outcome.verdict, Verdict::Equal);
}

#[test]
fn renamed_aggregate_of_equal_size_is_equal_with_a_recorded_type_difference() {
    // `Point` on the left and `PointV2` on the right are the same struct
    // under a new name (§4.3 last paragraph): the aggregate-size index
    // confirms they share a layout, so `relate_types`'s name-mismatch
    // fallback accepts them and records a `TypeDifference` instead of
    // failing the comparison outright.
    let left_ty: TypeRef = Rc::new(Type::NamedStructType { name: "Point".to_string() });
    let right_ty: TypeRef = Rc::new(Type::NamedStructType { name: "PointV2".to_string() });

    let mut lf = Function::new("takes_point");
    lf.parameters =
        vec![llvm_ir::function::Parameter { name: Name::Name("p".into()), ty: left_ty.clone(), attributes: Vec::new() }];
    lf.return_type = void_ty();
    lf.is_var_arg = false;
    lf.calling_convention = CallingConvention::C;
    let mut entry = BasicBlock::new(Name::Name("entry".into()));
    entry.term = Terminator::Ret(Ret { return_operand: None, debugloc: None });
    lf.basic_blocks = vec![entry];

    let mut rf = Function::new("takes_point");
    rf.parameters =
        vec![llvm_ir::function::Parameter { name: Name::Name("p".into()), ty: right_ty.clone(), attributes: Vec::new() }];
    rf.return_type = void_ty();
    rf.is_var_arg = false;
    rf.calling_convention = CallingConvention::C;
    let mut entry = BasicBlock::new(Name::Name("entry".into()));
    entry.term = Terminator::Ret(Ret { return_operand: None, debugloc: None });
    rf.basic_blocks = vec![entry];

    let mut left = module_of(vec![lf]);
    let mut right = module_of(vec![rf]);

    let config = ComparatorConfig::default();
    let patterns = PatternSet::empty();
    let debug_info = basic::StaticDebugInfo::default();
    let aggregate_index = basic::StaticAggregateIndex {
        sizes: [("Point".to_string(), 16), ("PointV2".to_string(), 16)].into_iter().collect(),
    };
    let mut simplifier = basic::DeadCodeSimplifier::default();
    let mut inliner = basic::SingleBlockInliner::default();
    let mut comparator =
        comparator_for(&config, &patterns, &debug_info, &aggregate_index, &mut simplifier, &mut inliner);

    let outcome = comparator.compare_pair(&mut left, &mut right, "takes_point", "takes_point").unwrap();
    assert_eq!(outcome.verdict, Verdict::Equal);
    assert!(outcome.differences.iter().any(
        |d| matches!(d, semdiff_core::NonFunctionDifference::TypeDifference { name, .. } if name == "Point")
    ));
}

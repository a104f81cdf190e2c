//! Shared data model (§3): results, non-function differences, call stacks.

/// One hop in a [`CallStack`]: the callee name and, if known, where it was
/// defined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFrame {
    pub callee: String,
    pub file: Option<String>,
    pub line: Option<u32>,
}

/// Ordered sequence of call frames tracing how a difference was reached
/// from the top-level compared function (§3).
pub type CallStack = Vec<CallFrame>;

/// Source location of an aggregate type definition or an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceLoc {
    pub file: Option<String>,
    pub line: Option<u32>,
}

/// A non-function difference discovered during a walk (§3, §4.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NonFunctionDifference {
    /// A macro expansion or inline-asm text difference.
    SyntaxDifference {
        name: String,
        left_body: String,
        right_body: String,
        stack_left: CallStack,
        stack_right: CallStack,
    },
    /// A differing aggregate type used at corresponding positions.
    TypeDifference {
        name: String,
        left_site: SourceLoc,
        right_site: SourceLoc,
    },
}

/// A callee that existed only as a declaration when inlining was
/// attempted (§3). `None` on a side means that side had a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingDef {
    pub left: Option<String>,
    pub right: Option<String>,
}

/// Per-side function summary attached to a [`crate::module_comparator::PairOutcome`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FunctionInfo {
    pub name: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub calls: Vec<CallSiteInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSiteInfo {
    pub callee: String,
    pub file: Option<String>,
    pub line: Option<u32>,
}

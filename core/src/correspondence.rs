//! Value/Type Correspondence (§4.1): a bijective, incrementally built mapping
//! of values, basic blocks, and types between the two modules under
//! comparison.

use std::collections::{HashMap, HashSet};

use llvm_ir::Type;

use crate::collaborators::AggregateSizeIndex;
use crate::ir::LocalId;

/// Either side of a value correspondence: a positional local value or a
/// global symbol identified by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CorrespondenceKey {
    Local(LocalId),
    Global(String),
}

/// Outcome of attempting to extend the correspondence with a new pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relate {
    Consistent,
    Conflict,
}

/// Raw pointer identity of an interned `Type`, used only as a cache key for
/// [`ValueCorrespondence::relate_types`] — `llvm-ir` interns types behind
/// `Rc`, so two `TypeRef`s denote the same type iff they point at the same
/// allocation.
type TypeKey = *const Type;

fn type_key(ty: &llvm_ir::TypeRef) -> TypeKey {
    std::rc::Rc::as_ptr(ty)
}

/// Per-comparison bijective correspondence. Reset at the start of every
/// top-level function-pair comparison (§3 invariants); a fresh instance is
/// also used for each pattern-match sub-walk (§4.4).
#[derive(Default)]
pub struct ValueCorrespondence<'a> {
    left_to_right: HashMap<CorrespondenceKey, CorrespondenceKey>,
    right_to_left: HashMap<CorrespondenceKey, CorrespondenceKey>,
    type_left_to_right: HashMap<TypeKey, TypeKey>,
    type_right_to_left: HashMap<TypeKey, TypeKey>,
    /// Pairs already proven structurally equal, to short-circuit recursion.
    types_equal_cache: HashSet<(TypeKey, TypeKey)>,
    aggregate_index: Option<&'a dyn AggregateSizeIndex>,
    /// Named-aggregate pairs resolved via the aggregate-size fallback
    /// rather than exact name equality, collected so the Module Comparator
    /// can turn each into a `TypeDifference` after the walk (§4.3 last
    /// paragraph).
    aggregate_divergences: Vec<(String, String)>,
}

impl<'a> ValueCorrespondence<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A correspondence that additionally consults `aggregate_index` when
    /// two named struct types disagree on name, to recognize a renamed
    /// but layout-identical aggregate (§4.3 last paragraph).
    pub fn with_aggregate_index(aggregate_index: &'a dyn AggregateSizeIndex) -> Self {
        ValueCorrespondence { aggregate_index: Some(aggregate_index), ..Self::default() }
    }

    /// Drain the aggregate-type divergences discovered by name-mismatch
    /// fallback since the last call.
    pub fn take_aggregate_divergences(&mut self) -> Vec<(String, String)> {
        std::mem::take(&mut self.aggregate_divergences)
    }

    /// Extend the correspondence with `(l, r)`. See §4.1.
    pub fn relate(&mut self, l: CorrespondenceKey, r: CorrespondenceKey) -> Relate {
        match (self.left_to_right.get(&l), self.right_to_left.get(&r)) {
            (None, None) => {
                self.left_to_right.insert(l.clone(), r.clone());
                self.right_to_left.insert(r, l);
                Relate::Consistent
            }
            (Some(existing_r), Some(existing_l)) if *existing_r == r && *existing_l == l => {
                Relate::Consistent
            }
            _ => Relate::Conflict,
        }
    }

    pub fn lookup_left(&self, l: &CorrespondenceKey) -> Option<&CorrespondenceKey> {
        self.left_to_right.get(l)
    }

    pub fn lookup_right(&self, r: &CorrespondenceKey) -> Option<&CorrespondenceKey> {
        self.right_to_left.get(r)
    }

    /// Copy only the `Global`-keyed bindings into `other`. Used to seed a
    /// pattern sub-walk's fresh correspondence with already-known global
    /// identity without leaking positional local-value bindings across
    /// unrelated function pairs (§4.4: "any already-established
    /// correspondence for globals").
    pub fn copy_globals_into(&self, other: &mut ValueCorrespondence<'_>) {
        for (l, r) in &self.left_to_right {
            if matches!(l, CorrespondenceKey::Global(_)) && matches!(r, CorrespondenceKey::Global(_)) {
                other.relate(l.clone(), r.clone());
            }
        }
    }

    /// Structural recursion over type constructors, cached once a pair is
    /// proven equal or related (§4.1).
    pub fn relate_types(&mut self, tl: &llvm_ir::TypeRef, tr: &llvm_ir::TypeRef) -> Relate {
        let (kl, kr) = (type_key(tl), type_key(tr));
        if self.types_equal_cache.contains(&(kl, kr)) {
            return Relate::Consistent;
        }
        match (self.type_left_to_right.get(&kl), self.type_right_to_left.get(&kr)) {
            (Some(existing_r), _) if *existing_r != kr => return Relate::Conflict,
            (_, Some(existing_l)) if *existing_l != kl => return Relate::Conflict,
            _ => {}
        }
        if Self::types_match_shape(self, tl, tr) {
            self.type_left_to_right.insert(kl, kr);
            self.type_right_to_left.insert(kr, kl);
            self.types_equal_cache.insert((kl, kr));
            Relate::Consistent
        } else {
            Relate::Conflict
        }
    }

    fn types_match_shape(&mut self, tl: &llvm_ir::TypeRef, tr: &llvm_ir::TypeRef) -> bool {
        use llvm_ir::Type::*;
        match (tl.as_ref(), tr.as_ref()) {
            (VoidType, VoidType) => true,
            (IntegerType { bits: bl }, IntegerType { bits: br }) => bl == br,
            (PointerType { addr_space: al, .. }, PointerType { addr_space: ar, .. }) => al == ar,
            (FPType(a), FPType(b)) => a == b,
            (
                FuncType { result_type: rl, param_types: pl, is_var_arg: vl },
                FuncType { result_type: rr, param_types: pr, is_var_arg: vr },
            ) => {
                vl == vr
                    && pl.len() == pr.len()
                    && self.relate_types(rl, rr) == Relate::Consistent
                    && pl
                        .iter()
                        .zip(pr.iter())
                        .all(|(a, b)| self.relate_types(a, b) == Relate::Consistent)
            }
            (
                VectorType { element_type: el, num_elements: nl, scalable: sl },
                VectorType { element_type: er, num_elements: nr, scalable: sr },
            ) => nl == nr && sl == sr && self.relate_types(el, er) == Relate::Consistent,
            (
                ArrayType { element_type: el, num_elements: nl },
                ArrayType { element_type: er, num_elements: nr },
            ) => nl == nr && self.relate_types(el, er) == Relate::Consistent,
            (
                StructType { element_types: el, is_packed: pl },
                StructType { element_types: er, is_packed: pr },
            ) => {
                pl == pr
                    && el.len() == er.len()
                    && el
                        .iter()
                        .zip(er.iter())
                        .all(|(a, b)| self.relate_types(a, b) == Relate::Consistent)
            }
            (NamedStructType { name: nl }, NamedStructType { name: nr }) => {
                if nl == nr {
                    true
                } else if self.aggregate_index.is_some_and(|index| index.same_layout(nl, nr)) {
                    self.aggregate_divergences.push((nl.clone(), nr.clone()));
                    true
                } else {
                    false
                }
            }
            (X86_MMXType, X86_MMXType) => true,
            (MetadataType, MetadataType) => true,
            (LabelType, LabelType) => true,
            (TokenType, TokenType) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relate_installs_both_directions() {
        let mut corr = ValueCorrespondence::new();
        let l = CorrespondenceKey::Local(LocalId::Argument(0));
        let r = CorrespondenceKey::Local(LocalId::Argument(0));
        assert_eq!(corr.relate(l.clone(), r.clone()), Relate::Consistent);
        assert_eq!(corr.lookup_left(&l), Some(&r));
        assert_eq!(corr.lookup_right(&r), Some(&l));
    }

    #[test]
    fn relate_same_pair_twice_is_consistent() {
        let mut corr = ValueCorrespondence::new();
        let l = CorrespondenceKey::Global("foo".into());
        let r = CorrespondenceKey::Global("bar".into());
        assert_eq!(corr.relate(l.clone(), r.clone()), Relate::Consistent);
        assert_eq!(corr.relate(l, r), Relate::Consistent);
    }

    #[test]
    fn relate_conflicting_pair_is_rejected() {
        let mut corr = ValueCorrespondence::new();
        let l = CorrespondenceKey::Local(LocalId::Argument(0));
        let r1 = CorrespondenceKey::Local(LocalId::Argument(1));
        let r2 = CorrespondenceKey::Local(LocalId::Argument(2));
        assert_eq!(corr.relate(l.clone(), r1), Relate::Consistent);
        assert_eq!(corr.relate(l, r2), Relate::Conflict);
    }
}

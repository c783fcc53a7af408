//! Facts about members and types that the optimizer cannot derive itself.
//!
//! Whether a user-defined operator has side effects cannot be read off its
//! signature, so the optimizer asks a [`SemanticProvider`]. The
//! [`DefaultSemanticProvider`] is conservative: it only allows the built-in
//! operators and conversions to be evaluated at optimization time and treats
//! every member as impure unless it was registered as pure.

use std::{collections::HashSet, sync::Arc};

use indexmap::IndexSet;
use once_cell::sync::Lazy;

use crate::ast::{BinOpKind, MemberData, MemberId, ParamRef, TyKind, UnOpKind};

pub mod params;

use params::ParameterTable;

/// A built-in operation on primitive values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Unary(UnOpKind),
    Binary(BinOpKind),
    Convert { checked: bool },
}

/// Built-in operations that may be evaluated at optimization time by
/// default. Checked operations are included: their overflow errors become
/// `throw` nodes at the same position in the tree.
static DEFAULT_PURE_BUILTINS: Lazy<HashSet<Builtin>> = Lazy::new(|| {
    let unary = UnOpKind::ALL.into_iter().map(Builtin::Unary);
    let binary = BinOpKind::ALL.into_iter().map(Builtin::Binary);
    let convert = [false, true]
        .into_iter()
        .map(|checked| Builtin::Convert { checked });
    unary.chain(binary).chain(convert).collect()
});

/// Answers purity and immutability questions for the optimizer.
///
/// Implementations are shared between threads that optimize trees
/// concurrently, and must be fully populated before optimization starts.
pub trait SemanticProvider: Send + Sync {
    /// Does invoking `member` have no observable side effect, with a result
    /// that only depends on its arguments?
    fn is_pure(&self, member: &MemberData) -> bool;

    /// Can values of this type be duplicated or dropped freely?
    fn is_immutable(&self, ty: &TyKind) -> bool;

    /// May the built-in operation be evaluated at optimization time?
    fn is_pure_builtin(&self, builtin: Builtin) -> bool {
        DEFAULT_PURE_BUILTINS.contains(&builtin)
    }

    /// Must the argument passed for this parameter not be evaluated more than
    /// once? Folding a call with such an argument shares one value between
    /// all uses of the result.
    fn is_evaluated_once(&self, _param: ParamRef) -> bool {
        false
    }
}

#[derive(Debug, Default, Clone)]
pub struct DefaultSemanticProvider {
    pure_members: IndexSet<MemberId>,
    immutable_types: IndexSet<TyKind>,
    parameters: Option<Arc<ParameterTable>>,
}

impl DefaultSemanticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a member pure.
    pub fn with_pure_member(mut self, member: &MemberData) -> Self {
        self.pure_members.insert(member.id);
        self
    }

    /// Declare a user-defined type immutable.
    pub fn with_immutable_type(mut self, ty: TyKind) -> Self {
        self.immutable_types.insert(ty);
        self
    }

    /// Answer [`SemanticProvider::is_evaluated_once`] from a (usually
    /// frozen) parameter table.
    pub fn with_parameter_table(mut self, parameters: Arc<ParameterTable>) -> Self {
        self.parameters = Some(parameters);
        self
    }
}

impl SemanticProvider for DefaultSemanticProvider {
    fn is_pure(&self, member: &MemberData) -> bool {
        self.pure_members.contains(&member.id)
    }

    fn is_immutable(&self, ty: &TyKind) -> bool {
        match ty {
            TyKind::Void
            | TyKind::Bool
            | TyKind::Char
            | TyKind::Int(_)
            | TyKind::Float(_)
            | TyKind::Str
            | TyKind::Exception => true,
            TyKind::Nullable(inner) => self.is_immutable(inner),
            TyKind::Array(_) | TyKind::Func(_, _) => false,
            TyKind::Named(_) => self.immutable_types.contains(ty),
        }
    }

    fn is_evaluated_once(&self, param: ParamRef) -> bool {
        self.parameters
            .as_ref()
            .map_or(false, |parameters| parameters.contains(param))
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::{params::ParameterTable, Builtin, DefaultSemanticProvider, SemanticProvider};
    use crate::ast::{BinOpKind, IntKind, MemberBuilder, TyKind, UnOpKind};

    #[test]
    fn builtins_are_pure_by_default() {
        let provider = DefaultSemanticProvider::new();
        assert!(provider.is_pure_builtin(Builtin::Binary(BinOpKind::AddChecked)));
        assert!(provider.is_pure_builtin(Builtin::Unary(UnOpKind::Negate)));
        assert!(provider.is_pure_builtin(Builtin::Convert { checked: true }));
    }

    #[test]
    fn members_are_impure_unless_registered() {
        let int = TyKind::Int(IntKind::I32);
        let abs = MemberBuilder::static_method("Abs", TyKind::class("Math"))
            .param("x", int.clone())
            .returns(int)
            .build(|x: i32| Ok(x.wrapping_abs()));
        assert!(!DefaultSemanticProvider::new().is_pure(&abs));
        assert!(DefaultSemanticProvider::new()
            .with_pure_member(&abs)
            .is_pure(&abs));
    }

    #[test]
    fn immutability() {
        let provider = DefaultSemanticProvider::new().with_immutable_type(TyKind::class("Money"));
        assert!(provider.is_immutable(&TyKind::Str));
        assert!(provider.is_immutable(&TyKind::nullable(TyKind::Int(IntKind::U8))));
        assert!(provider.is_immutable(&TyKind::class("Money")));
        assert!(!provider.is_immutable(&TyKind::class("Account")));
        assert!(!provider.is_immutable(&TyKind::array(TyKind::Bool)));
    }

    #[test]
    fn evaluate_once_comes_from_the_parameter_table() {
        let log = MemberBuilder::static_method("Log", TyKind::class("Trace"))
            .param("message", TyKind::Str)
            .build(|_: Arc<str>| Ok(()));
        let mut table = ParameterTable::new();
        table.register(log.param_ref(0)).unwrap();
        let provider = DefaultSemanticProvider::new().with_parameter_table(Arc::new(table));
        assert!(provider.is_evaluated_once(log.param_ref(0)));
        assert!(!DefaultSemanticProvider::new().is_evaluated_once(log.param_ref(0)));
    }
}

//! Errors reported to callers of the optimizer, the member cache and the
//! parameter table.
//!
//! Runtime errors of the optimized program are not Rust errors: they are
//! [`Fault`] values that end up in `throw` nodes.

use thiserror::Error;

use crate::ast::{Fault, Ident, TyKind};

/// Errors that abort an optimization run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptError {
    /// Flattening a nested block would merge a local into a scope that
    /// already has a variable with that name.
    #[error("variable `{0}` of a nested block shadows a variable of an enclosing block")]
    ShadowedVariable(Ident),
}

/// Errors from invoking a member through an invoker.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvokeError {
    /// The member itself raised an error. This is the only variant that the
    /// program being optimized could observe.
    #[error("member raised {0}")]
    Target(Fault),
    #[error("expected {expected} arguments, got {actual}")]
    Arity { expected: usize, actual: usize },
    #[error("argument {position} does not have the parameter's type")]
    ArgumentType { position: usize },
    #[error("member returned a value not conforming to {expected}")]
    ReturnType { expected: TyKind },
}

/// Usage errors of [`crate::semantics::params::ParameterTable`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("the sample expression must be a lambda with one parameter")]
    NoParameter,
    #[error("the sample expression has {0} parameters, expected exactly one")]
    TooManyParameters(usize),
    #[error("parameter `{0}` is never used")]
    Unused(Ident),
    #[error("parameter `{0}` is used {1} times, expected exactly once")]
    DuplicateUse(Ident, usize),
    #[error("the sample body must be a call, a construction or an indexer access")]
    NotAnInvocation,
    #[error("parameter `{0}` must be used in an argument, not in the receiver")]
    NotAnArgument(Ident),
    #[error("the parameter table is frozen")]
    Frozen,
}

/// Usage errors of [`crate::cache::MemberCache`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("expression does not invoke a member")]
    NotAnInvocation,
}

/// Errors of the reference evaluator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// A runtime error of the evaluated program.
    #[error("{0}")]
    Fault(Fault),
    #[error("unbound variable `{0}`")]
    Unbound(Ident),
    #[error("operand types do not match the operator: {0}")]
    TypeMismatch(String),
    #[error("cannot evaluate {0}")]
    Unsupported(&'static str),
    #[error("invocation failed: {0}")]
    Invoke(InvokeError),
}

impl From<Fault> for EvalError {
    fn from(fault: Fault) -> Self {
        EvalError::Fault(fault)
    }
}

impl From<InvokeError> for EvalError {
    fn from(err: InvokeError) -> Self {
        match err {
            InvokeError::Target(fault) => EvalError::Fault(fault),
            err => EvalError::Invoke(err),
        }
    }
}

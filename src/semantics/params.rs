//! The parameter annotation table: formal parameters whose arguments must
//! not be evaluated more than once.
//!
//! Parameters are usually registered from a sample usage such as
//! `|x| Trace::log(x)`, which names the parameter by the argument position
//! the lambda parameter flows into.

use indexmap::IndexSet;
use tracing::debug;

use crate::{
    ast::{util::VarUsage, Expr, ExprKind, ParamRef},
    error::RegistryError,
};

#[derive(Debug, Default)]
pub struct ParameterTable {
    params: IndexSet<ParamRef>,
    frozen: bool,
}

impl ParameterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter. Returns whether it was new.
    pub fn register(&mut self, param: ParamRef) -> Result<bool, RegistryError> {
        if self.frozen {
            return Err(RegistryError::Frozen);
        }
        let added = self.params.insert(param);
        if added {
            debug!(?param, "registered evaluate-once parameter");
        }
        Ok(added)
    }

    /// Register the parameter that the single lambda parameter of `sample`
    /// is passed to.
    ///
    /// The sample must be a lambda with exactly one parameter whose body is
    /// a call, construction or indexer access. The lambda parameter must be
    /// used exactly once, inside an argument (not the receiver).
    pub fn register_from_usage(&mut self, sample: &Expr) -> Result<ParamRef, RegistryError> {
        if self.frozen {
            return Err(RegistryError::Frozen);
        }
        let (params, body) = match &sample.kind {
            ExprKind::Lambda(params, body) => (params, body),
            _ => return Err(RegistryError::NoParameter),
        };
        let ident = match params.as_slice() {
            [] => return Err(RegistryError::NoParameter),
            [param] => param.ident,
            params => return Err(RegistryError::TooManyParameters(params.len())),
        };
        let (member, args) = match &body.kind {
            ExprKind::Call(member, args) | ExprKind::New(member, args) => {
                (member, args.iter().collect::<Vec<_>>())
            }
            ExprKind::Index(member, object, args) => {
                (member, std::iter::once(object).chain(args).collect())
            }
            _ => return Err(RegistryError::NotAnInvocation),
        };
        let uses = VarUsage::of(body, ident);
        match uses.reads + uses.writes {
            0 => return Err(RegistryError::Unused(ident)),
            1 => {}
            n => return Err(RegistryError::DuplicateUse(ident, n)),
        }
        let position = args
            .iter()
            .position(|arg| VarUsage::of(arg, ident).is_used())
            .ok_or(RegistryError::Unused(ident))?;
        let position = if member.kind.has_receiver() {
            position
                .checked_sub(1)
                .ok_or(RegistryError::NotAnArgument(ident))?
        } else {
            position
        };
        let param = member.param_ref(position);
        self.register(param)?;
        Ok(param)
    }

    pub fn contains(&self, param: ParamRef) -> bool {
        self.params.contains(&param)
    }

    /// Reject all further registrations.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Registered parameters, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = ParamRef> + '_ {
        self.params.iter().copied()
    }
}

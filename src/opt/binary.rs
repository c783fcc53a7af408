//! Rules for binary operators.

use tracing::trace;

use crate::{
    ast::{BinOp, BinOpKind, Expr, ExprBuilder, ExprKind, Fault, Value},
    error::InvokeError,
    semantics::Builtin,
};

use super::{purity::never_null, Rewriter};

impl<'a> Rewriter<'a> {
    pub(super) fn rewrite_binary(&self, expr: &Expr) -> Option<Expr> {
        let (op, lhs, rhs) = match &expr.kind {
            ExprKind::Binary(op, lhs, rhs) => (op, lhs, rhs),
            _ => return None,
        };
        if lhs.is_throw() {
            trace!(op = op.kind.as_str(), "left operand throws");
            return Some(lhs.retyped(&expr.ty));
        }
        match op.kind {
            BinOpKind::Coalesce => return self.rewrite_coalesce(expr, op, lhs, rhs),
            BinOpKind::AndAlso | BinOpKind::OrElse => {
                return self.rewrite_short_circuit(expr, op, lhs, rhs)
            }
            _ => {}
        }
        if rhs.is_throw() && self.is_pure(lhs) {
            trace!(op = op.kind.as_str(), "right operand throws");
            return Some(rhs.retyped(&expr.ty));
        }
        if op.kind == BinOpKind::ArrayIndex && lhs.is_null_constant() {
            return Some(self.null_array_access(expr, rhs));
        }
        if op.is_lifted(&lhs.ty, &rhs.ty) {
            if let Some(res) = self.rewrite_lifted_null(expr, op, lhs, rhs) {
                return Some(res);
            }
        }
        if lhs.is_constant() && rhs.is_constant() && self.may_fold_binary(op, expr) {
            trace!(op = op.kind.as_str(), "evaluating operator over literals");
            return self.eval_literal(expr);
        }
        None
    }

    /// Indexing into a `null` array raises after the index is evaluated.
    fn null_array_access(&self, expr: &Expr, index: &Expr) -> Expr {
        let builder = ExprBuilder::new();
        let throw = builder.throw_fault(expr.ty.clone(), Fault::null_reference());
        trace!("indexing into null");
        if self.is_pure(index) {
            throw
        } else {
            builder.block_typed(expr.ty.clone(), vec![], vec![index.clone(), throw])
        }
    }

    fn may_fold_binary(&self, op: &BinOp, expr: &Expr) -> bool {
        match &op.method {
            Some(method) => {
                self.provider.is_pure(method) && self.is_shareable_result(&expr.ty)
            }
            None => self.provider.is_pure_builtin(Builtin::Binary(op.kind)),
        }
    }

    /// Lifted operators with a `null` literal operand.
    fn rewrite_lifted_null(&self, expr: &Expr, op: &BinOp, lhs: &Expr, rhs: &Expr) -> Option<Expr> {
        let other = if lhs.is_null_constant() {
            rhs
        } else if rhs.is_null_constant() {
            lhs
        } else {
            return None;
        };
        if !self.is_pure(other) {
            return None;
        }
        let both_null = lhs.is_null_constant() && rhs.is_null_constant();
        let res = match op.kind {
            kind if (kind.is_equality() || kind.is_comparison()) && op.lift_to_null => Value::Null,
            BinOpKind::Eq | BinOpKind::Ne => {
                let eq = if both_null {
                    true
                } else if never_null(other) {
                    false
                } else {
                    return None;
                };
                Value::Bool(eq == (op.kind == BinOpKind::Eq))
            }
            kind if kind.is_comparison() => Value::Bool(false),
            // three-valued logic, decided by the other operand
            BinOpKind::BitAnd | BinOpKind::BitOr
                if op.method.is_none() && expr.ty.is_boolish() =>
            {
                return None
            }
            _ => Value::Null,
        };
        trace!(op = op.kind.as_str(), "lifted operator over null");
        Some(self.literal(res, &expr.ty))
    }

    fn rewrite_coalesce(&self, expr: &Expr, op: &BinOp, lhs: &Expr, rhs: &Expr) -> Option<Expr> {
        let builder = ExprBuilder::new();
        if lhs.is_null_constant() {
            trace!("coalescing null");
            return if rhs.ty == expr.ty || rhs.is_throw() {
                Some(rhs.retyped(&expr.ty))
            } else {
                None
            };
        }
        if !never_null(lhs) {
            return None;
        }
        trace!("coalescing a value that is never null");
        match &op.conversion {
            Some(conversion) => {
                let invoke = builder.invoke(conversion.clone(), [lhs.clone()]);
                Some(self.rewrite_invoke(&invoke).unwrap_or(invoke))
            }
            None if lhs.ty == expr.ty => Some(lhs.clone()),
            None => match lhs.as_constant() {
                Some(value) => Some(self.literal(value.clone(), &expr.ty)),
                None => Some(builder.convert(expr.ty.clone(), lhs.clone())),
            },
        }
    }

    fn rewrite_short_circuit(
        &self,
        expr: &Expr,
        op: &BinOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Option<Expr> {
        // the value of the left operand that decides the result: `false` for
        // `&&` and `true` for `||`
        let deciding = op.kind == BinOpKind::OrElse;
        let lifted = op.is_lifted(&lhs.ty, &rhs.ty);
        if op.method.is_some() {
            return self.rewrite_user_short_circuit(expr, op, lhs, rhs, lifted);
        }
        match lhs.as_constant() {
            Some(Value::Bool(value)) if *value == deciding => {
                trace!(op = op.kind.as_str(), "left operand decides");
                Some(self.literal(Value::Bool(deciding), &expr.ty))
            }
            Some(Value::Bool(_)) => {
                trace!(op = op.kind.as_str(), "right operand decides");
                if rhs.ty == expr.ty || rhs.is_throw() {
                    Some(rhs.retyped(&expr.ty))
                } else {
                    Some(ExprBuilder::new().convert(expr.ty.clone(), rhs.clone()))
                }
            }
            Some(Value::Null) if lifted => match rhs.as_constant() {
                Some(Value::Bool(value)) if *value == deciding => {
                    Some(self.literal(Value::Bool(deciding), &expr.ty))
                }
                Some(Value::Bool(_)) | Some(Value::Null) => {
                    Some(self.literal(Value::Null, &expr.ty))
                }
                _ if rhs.is_throw() => Some(rhs.retyped(&expr.ty)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Short-circuit operators of user-defined types: the left operand is
    /// the result if the type's `is_false` (for `&&`) or `is_true` (for
    /// `||`) operator says so.
    fn rewrite_user_short_circuit(
        &self,
        expr: &Expr,
        op: &BinOp,
        lhs: &Expr,
        rhs: &Expr,
        lifted: bool,
    ) -> Option<Expr> {
        let value = lhs.as_constant()?;
        if (lifted && value.is_null()) || self.options.no_eager_eval {
            return None;
        }
        let truth = op.truth.as_ref()?;
        if !self.provider.is_pure(truth) {
            return None;
        }
        match self.cache.get_invoker(truth).invoke(&[value.clone()]) {
            Ok(Value::Bool(true)) if value.conforms_to(&expr.ty) => {
                trace!(op = op.kind.as_str(), "left operand decides");
                Some(self.literal(value.clone(), &expr.ty))
            }
            Ok(Value::Bool(false)) if rhs.is_constant() && self.may_fold_binary(op, expr) => {
                self.eval_literal(expr)
            }
            Ok(Value::Bool(false)) if rhs.is_throw() => Some(rhs.retyped(&expr.ty)),
            Err(InvokeError::Target(fault)) => {
                Some(ExprBuilder::new().throw_fault(expr.ty.clone(), fault))
            }
            _ => None,
        }
    }
}

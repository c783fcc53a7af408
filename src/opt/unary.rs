//! Rules for unary operators and conversions.

use tracing::trace;

use crate::{
    ast::{Expr, ExprKind, Value},
    semantics::Builtin,
};

use super::Rewriter;

impl<'a> Rewriter<'a> {
    pub(super) fn rewrite_unary(&self, expr: &Expr) -> Option<Expr> {
        let (op, operand) = match &expr.kind {
            ExprKind::Unary(op, operand) => (op, operand),
            _ => return None,
        };
        if operand.is_throw() {
            return Some(operand.retyped(&expr.ty));
        }
        if op.is_lifted(&operand.ty) && operand.is_null_constant() {
            trace!(op = op.kind.as_str(), "lifted operator over null");
            return Some(self.literal(Value::Null, &expr.ty));
        }
        if !operand.is_constant() {
            return None;
        }
        let may_fold = match &op.method {
            Some(method) => self.provider.is_pure(method) && self.is_shareable_result(&expr.ty),
            None => self.provider.is_pure_builtin(Builtin::Unary(op.kind)),
        };
        if may_fold {
            trace!(op = op.kind.as_str(), "evaluating operator over a literal");
            self.eval_literal(expr)
        } else {
            None
        }
    }

    pub(super) fn rewrite_convert(&self, expr: &Expr) -> Option<Expr> {
        let (op, operand) = match &expr.kind {
            ExprKind::Convert(op, operand) => (op, operand),
            _ => return None,
        };
        if operand.is_throw() {
            return Some(operand.retyped(&expr.ty));
        }
        if op.is_lifted(&operand.ty, &expr.ty) && operand.is_null_constant() {
            trace!("lifted conversion of null");
            return Some(self.literal(Value::Null, &expr.ty));
        }
        if op.method.is_none() && operand.ty == expr.ty {
            trace!(ty = %expr.ty, "identity conversion");
            return Some(operand.clone());
        }
        if !operand.is_constant() {
            return None;
        }
        let may_fold = match &op.method {
            // unwrapping `null` for a user-defined conversion is left to run time
            Some(_) if operand.is_null_constant() && operand.ty.is_nullable() => false,
            Some(method) => self.provider.is_pure(method) && self.is_shareable_result(&expr.ty),
            None => self.provider.is_pure_builtin(Builtin::Convert {
                checked: op.checked,
            }),
        };
        if may_fold {
            trace!(ty = %expr.ty, "evaluating conversion of a literal");
            self.eval_literal(expr)
        } else {
            None
        }
    }
}

//! Which expressions can be dropped, duplicated or reordered.
//!
//! An expression is pure if evaluating it has no side effect and never
//! raises an error, for any values of its free variables. Pure expressions
//! can be removed without changing the behavior of the program.

use crate::{
    ast::{BinOpKind, ExprData, ExprKind, MemberData, TyKind, UnOpKind, Value},
    semantics::SemanticProvider,
};

pub struct Purity<'a> {
    provider: &'a dyn SemanticProvider,
}

impl<'a> Purity<'a> {
    pub fn new(provider: &'a dyn SemanticProvider) -> Self {
        Purity { provider }
    }

    pub fn is_pure(&self, expr: &ExprData) -> bool {
        match &expr.kind {
            ExprKind::Constant(_)
            | ExprKind::Parameter(_)
            | ExprKind::Default
            | ExprKind::Lambda(_, _) => true,
            ExprKind::Unary(op, operand) => {
                let op_pure = match &op.method {
                    Some(method) => self.provider.is_pure(method),
                    None => match op.kind {
                        UnOpKind::NegateChecked => false,
                        UnOpKind::ArrayLength => never_null(operand),
                        _ => true,
                    },
                };
                op_pure && self.is_pure(operand)
            }
            ExprKind::Binary(op, lhs, rhs) => {
                let op_pure = match &op.method {
                    Some(method) => {
                        self.provider.is_pure(method)
                            && op
                                .truth
                                .as_ref()
                                .map_or(true, |truth| self.provider.is_pure(truth))
                    }
                    None => match op.kind {
                        kind if kind.is_checked() => false,
                        BinOpKind::Div | BinOpKind::Rem => {
                            !lhs.ty.non_nullable().is_integer() || is_safe_divisor(rhs)
                        }
                        BinOpKind::ArrayIndex => false,
                        _ => true,
                    },
                };
                op_pure
                    && self.is_pure(lhs)
                    && self.is_pure(rhs)
                    && op
                        .conversion
                        .as_ref()
                        .map_or(true, |conversion| self.is_pure(conversion))
            }
            ExprKind::Convert(op, operand) => {
                let op_pure = match &op.method {
                    Some(method) => {
                        let unwraps_null = operand.ty.is_nullable()
                            && !op.is_lifted(&operand.ty, &expr.ty)
                            && !never_null(operand);
                        self.provider.is_pure(method) && !unwraps_null
                    }
                    None => !op.checked && is_total_conversion(operand, &expr.ty),
                };
                op_pure && self.is_pure(operand)
            }
            ExprKind::Assign(_, _) | ExprKind::Throw(_) => false,
            ExprKind::Block(_, stmts) => stmts.iter().all(|stmt| self.is_pure(stmt)),
            ExprKind::Conditional(cond, then, otherwise) => {
                self.is_pure(cond) && self.is_pure(then) && self.is_pure(otherwise)
            }
            ExprKind::Call(member, args) | ExprKind::New(member, args) => {
                self.is_pure_member(member, args.iter().map(|arg| &**arg))
            }
            ExprKind::Index(member, object, args) => self.is_pure_member(
                member,
                std::iter::once(&**object).chain(args.iter().map(|arg| &**arg)),
            ),
            ExprKind::Invoke(target, args) => match &target.kind {
                ExprKind::Lambda(params, body) => {
                    params.len() == args.len()
                        && self.is_pure(body)
                        && args.iter().all(|arg| self.is_pure(arg))
                }
                _ => false,
            },
        }
    }

    fn is_pure_member<'b>(
        &self,
        member: &MemberData,
        mut args: impl Iterator<Item = &'b ExprData>,
    ) -> bool {
        if !self.provider.is_pure(member) {
            return false;
        }
        if member.kind.has_receiver() {
            match args.next() {
                Some(receiver) if never_null(receiver) && self.is_pure(receiver) => {}
                _ => return false,
            }
        }
        args.all(|arg| self.is_pure(arg))
    }
}

/// Is the expression guaranteed to evaluate to a non-null value (or to
/// raise an error)?
pub fn never_null(expr: &ExprData) -> bool {
    match &expr.kind {
        ExprKind::Constant(value) => !value.is_null(),
        _ if !expr.ty.admits_null() => true,
        ExprKind::New(_, _) => true,
        ExprKind::Convert(op, operand) => op.method.is_none() && never_null(operand),
        ExprKind::Binary(op, _, rhs) if op.kind == BinOpKind::Coalesce => {
            op.conversion.is_none() && never_null(rhs)
        }
        ExprKind::Conditional(_, then, otherwise) => never_null(then) && never_null(otherwise),
        _ => false,
    }
}

/// Integer division by a literal other than `0` and `-1` cannot raise.
fn is_safe_divisor(rhs: &ExprData) -> bool {
    match rhs.as_constant().and_then(Value::as_int) {
        Some((_, divisor)) => divisor != 0 && divisor != -1,
        None => false,
    }
}

/// Built-in unchecked conversions that never raise: between primitive
/// value types, wrapping into a nullable, and identities.
fn is_total_conversion(operand: &ExprData, target: &TyKind) -> bool {
    let from = &operand.ty;
    if from == target || target.is_void() {
        return true;
    }
    if from.is_nullable() && !target.is_nullable() && !never_null(operand) {
        return false;
    }
    let is_primitive = |ty: &TyKind| {
        matches!(
            ty.non_nullable(),
            TyKind::Bool | TyKind::Char | TyKind::Int(_) | TyKind::Float(_)
        )
    };
    if is_primitive(from) && is_primitive(target) {
        // bool only converts to itself, and surrogate code points are not chars
        return from.non_nullable() == target.non_nullable()
            || (!from.is_boolish()
                && !target.is_boolish()
                && target.non_nullable() != &TyKind::Char);
    }
    from.non_nullable() == target.non_nullable()
}

//! A reference evaluator for expression trees.
//!
//! The optimizer uses it to fold operators over literals, and tests use it
//! to check that optimized trees evaluate to the same result as the input.
//! Runtime errors of the evaluated program come out as
//! [`EvalError::Fault`]; every other error means that the tree could not be
//! evaluated at all.

use crate::{
    ast::{BinOp, BinOpKind, ConvertOp, Expr, ExprKind, Fault, Ident, Member, TyKind, UnOp, Value, Var},
    cache::MemberCache,
    error::EvalError,
    scope_map::ScopeMap,
};

pub mod ops;

pub struct Interpreter<'a> {
    cache: &'a MemberCache,
    env: ScopeMap<Ident, Value>,
}

impl<'a> Interpreter<'a> {
    pub fn new(cache: &'a MemberCache) -> Self {
        Interpreter {
            cache,
            env: ScopeMap::new(),
        }
    }

    /// Bind a free parameter of the trees to be evaluated.
    pub fn bind(&mut self, ident: Ident, value: Value) {
        self.env.insert(ident, value);
    }

    pub fn with_binding(mut self, name: &str, value: Value) -> Self {
        self.bind(Ident::new(name), value);
        self
    }

    pub fn eval(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        match &expr.kind {
            ExprKind::Constant(value) => Ok(value.clone()),
            ExprKind::Parameter(ident) => self
                .env
                .get(ident)
                .cloned()
                .ok_or(EvalError::Unbound(*ident)),
            ExprKind::Default => default_value(&expr.ty),
            ExprKind::Unary(op, operand) => {
                let value = self.eval(operand)?;
                self.apply_unary(op, &operand.ty, &value)
            }
            ExprKind::Binary(op, lhs, rhs) => self.eval_binary(op, lhs, rhs),
            ExprKind::Convert(op, operand) => {
                let value = self.eval(operand)?;
                self.apply_convert(op, &operand.ty, &expr.ty, &value)
            }
            ExprKind::Assign(ident, value) => {
                let value = self.eval(value)?;
                self.env
                    .assign(ident, value.clone())
                    .map_err(|_| EvalError::Unbound(*ident))?;
                Ok(value)
            }
            ExprKind::Block(vars, stmts) => {
                let parent = self.env.push();
                let res = self.eval_block(vars, stmts);
                self.env.pop(parent);
                let value = res?;
                Ok(if expr.ty.is_void() { Value::Unit } else { value })
            }
            ExprKind::Conditional(cond, then, otherwise) => match self.eval(cond)? {
                Value::Bool(true) => self.eval(then),
                Value::Bool(false) => self.eval(otherwise),
                value => Err(EvalError::TypeMismatch(format!(
                    "condition evaluated to {}",
                    value
                ))),
            },
            ExprKind::Throw(payload) => match self.eval(payload)? {
                Value::Fault(fault) => Err(fault.into()),
                Value::Null => Err(Fault::null_reference().into()),
                value => Err(EvalError::TypeMismatch(format!("cannot throw {}", value))),
            },
            ExprKind::Call(member, args) | ExprKind::New(member, args) => {
                let args = self.eval_all(args)?;
                self.invoke(member, &args)
            }
            ExprKind::Index(member, object, args) => {
                let mut values = vec![self.eval(object)?];
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                self.invoke(member, &values)
            }
            ExprKind::Lambda(_, _) => Err(EvalError::Unsupported("function values")),
            ExprKind::Invoke(target, args) => {
                // the target is evaluated first; only literal lambdas can be applied
                if !matches!(target.kind, ExprKind::Lambda(_, _)) {
                    self.eval(target)?;
                }
                let args = self.eval_all(args)?;
                self.apply_lambda(target, args)
            }
        }
    }

    fn eval_all(&mut self, exprs: &[Expr]) -> Result<Vec<Value>, EvalError> {
        exprs.iter().map(|expr| self.eval(expr)).collect()
    }

    fn eval_block(&mut self, vars: &[Var], stmts: &[Expr]) -> Result<Value, EvalError> {
        for var in vars {
            self.env.insert(var.ident, default_value(&var.ty)?);
        }
        let mut res = Value::Unit;
        for stmt in stmts {
            res = self.eval(stmt)?;
        }
        Ok(res)
    }

    /// Apply a lambda literal to already evaluated arguments.
    fn apply_lambda(&mut self, target: &Expr, args: Vec<Value>) -> Result<Value, EvalError> {
        let (params, body) = match &target.kind {
            ExprKind::Lambda(params, body) => (params, body),
            _ => return Err(EvalError::Unsupported("invocation of a non-literal function")),
        };
        if params.len() != args.len() {
            return Err(EvalError::TypeMismatch(format!(
                "function of {} parameters applied to {} arguments",
                params.len(),
                args.len()
            )));
        }
        let parent = self.env.push();
        for (param, arg) in params.iter().zip(args) {
            self.env.insert(param.ident, arg);
        }
        let res = self.eval(body);
        self.env.pop(parent);
        res
    }

    fn invoke(&self, member: &Member, args: &[Value]) -> Result<Value, EvalError> {
        Ok(self.cache.get_invoker(member).invoke(args)?)
    }

    fn eval_binary(&mut self, op: &BinOp, lhs: &Expr, rhs: &Expr) -> Result<Value, EvalError> {
        match op.kind {
            BinOpKind::AndAlso | BinOpKind::OrElse => return self.eval_short_circuit(op, lhs, rhs),
            BinOpKind::Coalesce => {
                let value = self.eval(lhs)?;
                if value.is_null() {
                    return self.eval(rhs);
                }
                return match &op.conversion {
                    Some(conversion) => self.apply_lambda(conversion, vec![value]),
                    None => Ok(value),
                };
            }
            _ => {}
        }
        let lhs_value = self.eval(lhs)?;
        let rhs_value = self.eval(rhs)?;
        self.apply_binary(op, &lhs.ty, &rhs.ty, &lhs_value, &rhs_value)
    }

    fn eval_short_circuit(
        &mut self,
        op: &BinOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<Value, EvalError> {
        let is_and = op.kind == BinOpKind::AndAlso;
        let lifted = op.is_lifted(&lhs.ty, &rhs.ty);
        let lhs_value = self.eval(lhs)?;
        let method = match &op.method {
            Some(method) => method,
            None => {
                // `false && _` and `true || _`
                if lhs_value.as_bool() == Some(!is_and) {
                    return Ok(lhs_value);
                }
                if !lifted {
                    return self.eval(rhs);
                }
                let rhs_value = self.eval(rhs)?;
                if rhs_value.as_bool() == Some(!is_and) {
                    return Ok(rhs_value);
                }
                return Ok(if lhs_value.is_null() || rhs_value.is_null() {
                    Value::Null
                } else {
                    Value::Bool(is_and)
                });
            }
        };
        if lifted && lhs_value.is_null() {
            return Ok(Value::Null);
        }
        let truth = op.truth.as_ref().ok_or(EvalError::Unsupported(
            "user-defined short-circuit operator without truth operator",
        ))?;
        if self.invoke(truth, &[lhs_value.clone()])?.as_bool() == Some(true) {
            return Ok(lhs_value);
        }
        let rhs_value = self.eval(rhs)?;
        if lifted && rhs_value.is_null() {
            return Ok(Value::Null);
        }
        self.invoke(method, &[lhs_value, rhs_value])
    }

    fn apply_binary(
        &self,
        op: &BinOp,
        lhs_ty: &TyKind,
        rhs_ty: &TyKind,
        lhs: &Value,
        rhs: &Value,
    ) -> Result<Value, EvalError> {
        if op.is_lifted(lhs_ty, rhs_ty) && (lhs.is_null() || rhs.is_null()) {
            return Ok(lifted_null_result(op, lhs_ty, lhs, rhs));
        }
        match &op.method {
            Some(method) => self.invoke(method, &[lhs.clone(), rhs.clone()]),
            None => ops::eval_binary(op.kind, lhs, rhs),
        }
    }

    fn apply_unary(&self, op: &UnOp, operand_ty: &TyKind, value: &Value) -> Result<Value, EvalError> {
        if op.is_lifted(operand_ty) && value.is_null() {
            return Ok(Value::Null);
        }
        match &op.method {
            Some(method) => self.invoke(method, &[value.clone()]),
            None => ops::eval_unary(op.kind, value),
        }
    }

    fn apply_convert(
        &self,
        op: &ConvertOp,
        from: &TyKind,
        to: &TyKind,
        value: &Value,
    ) -> Result<Value, EvalError> {
        let method = match &op.method {
            Some(method) => method,
            None => return ops::eval_convert(value, from, to, op.checked),
        };
        if value.is_null() {
            if op.is_lifted(from, to) {
                return Ok(Value::Null);
            }
            let accepts_null = method.arg_tys().next().map_or(false, TyKind::admits_null);
            if from.is_nullable() && !accepts_null {
                return Err(Fault::invalid_operation().into());
            }
        }
        self.invoke(method, &[value.clone()])
    }
}

/// Result of a lifted binary operator with at least one `null` operand.
fn lifted_null_result(op: &BinOp, lhs_ty: &TyKind, lhs: &Value, rhs: &Value) -> Value {
    let both_null = lhs.is_null() && rhs.is_null();
    match op.kind {
        kind if (kind.is_equality() || kind.is_comparison()) && op.lift_to_null => Value::Null,
        BinOpKind::Eq => Value::Bool(both_null),
        BinOpKind::Ne => Value::Bool(!both_null),
        kind if kind.is_comparison() => Value::Bool(false),
        // three-valued logic of `Bool?`
        BinOpKind::BitAnd | BinOpKind::AndAlso
            if op.method.is_none() && lhs_ty.is_boolish() =>
        {
            if lhs.as_bool() == Some(false) || rhs.as_bool() == Some(false) {
                Value::Bool(false)
            } else {
                Value::Null
            }
        }
        BinOpKind::BitOr | BinOpKind::OrElse if op.method.is_none() && lhs_ty.is_boolish() => {
            if lhs.as_bool() == Some(true) || rhs.as_bool() == Some(true) {
                Value::Bool(true)
            } else {
                Value::Null
            }
        }
        _ => Value::Null,
    }
}

/// Value of a `default(T)` node.
fn default_value(ty: &TyKind) -> Result<Value, EvalError> {
    if ty.is_void() {
        return Ok(Value::Unit);
    }
    Value::default_for(ty).ok_or(EvalError::Unsupported(
        "default value of a user-defined value type",
    ))
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::Interpreter;
    use crate::{
        ast::{
            BinOp, BinOpKind, ExprBuilder, Fault, IntKind, MemberBuilder, TyKind, UnOpKind,
            Value, Var,
        },
        cache::MemberCache,
        error::EvalError,
    };

    fn int() -> TyKind {
        TyKind::Int(IntKind::I32)
    }

    fn bool_opt() -> TyKind {
        TyKind::nullable(TyKind::Bool)
    }

    fn bool_opt_lit(value: Option<bool>) -> crate::ast::Expr {
        let b = ExprBuilder::new();
        match value {
            Some(value) => b.convert(bool_opt(), b.bool_lit(value)),
            None => b.null(bool_opt()),
        }
    }

    #[test]
    fn blocks_and_assignments() {
        let cache = MemberCache::new();
        let b = ExprBuilder::new();
        let x = Var::new("x", int());
        let expr = b.block(
            vec![x.clone()],
            vec![
                b.assign(&x, b.binary(BinOpKind::Add, b.var(&x), b.param("p", int()))),
                b.binary(BinOpKind::Mul, b.var(&x), b.i32_lit(2)),
            ],
        );
        let mut interp = Interpreter::new(&cache).with_binding("p", Value::I32(21));
        assert_eq!(interp.eval(&expr), Ok(Value::I32(42)));
        assert_eq!(
            Interpreter::new(&cache).eval(&expr),
            Err(EvalError::Unbound(crate::ast::Ident::new("p")))
        );
    }

    #[test]
    fn short_circuit_skips_the_right_operand() {
        let cache = MemberCache::new();
        let b = ExprBuilder::new();
        let boom = b.throw_fault(TyKind::Bool, Fault::custom("Boom"));
        let and = b.binary(BinOpKind::AndAlso, b.bool_lit(false), boom.clone());
        assert_eq!(Interpreter::new(&cache).eval(&and), Ok(Value::Bool(false)));
        let or = b.binary(BinOpKind::OrElse, b.bool_lit(false), boom);
        assert_eq!(
            Interpreter::new(&cache).eval(&or),
            Err(EvalError::Fault(Fault::custom("Boom")))
        );
    }

    #[test]
    fn lifted_three_valued_logic() {
        let cache = MemberCache::new();
        let b = ExprBuilder::new();
        let values = [None, Some(false), Some(true)];
        for lhs in values {
            for rhs in values {
                let expected_and = match (lhs, rhs) {
                    (Some(false), _) | (_, Some(false)) => Value::Bool(false),
                    (Some(true), Some(true)) => Value::Bool(true),
                    _ => Value::Null,
                };
                let expected_or = match (lhs, rhs) {
                    (Some(true), _) | (_, Some(true)) => Value::Bool(true),
                    (Some(false), Some(false)) => Value::Bool(false),
                    _ => Value::Null,
                };
                for (kind, expected) in [
                    (BinOpKind::AndAlso, &expected_and),
                    (BinOpKind::BitAnd, &expected_and),
                    (BinOpKind::OrElse, &expected_or),
                    (BinOpKind::BitOr, &expected_or),
                ] {
                    let expr = b.binary(kind, bool_opt_lit(lhs), bool_opt_lit(rhs));
                    assert_eq!(
                        Interpreter::new(&cache).eval(&expr).as_ref(),
                        Ok(expected),
                        "{:?} {:?} {:?}",
                        lhs,
                        kind,
                        rhs
                    );
                }
            }
        }
    }

    #[test]
    fn lifted_equality_and_arithmetic() {
        let cache = MemberCache::new();
        let b = ExprBuilder::new();
        let int_opt = TyKind::nullable(int());
        let null = b.null(int_opt.clone());
        let one = b.convert(int_opt.clone(), b.i32_lit(1));
        let eval = |expr| Interpreter::new(&cache).eval(&expr);

        assert_eq!(eval(b.binary(BinOpKind::Eq, null.clone(), null.clone())), Ok(Value::Bool(true)));
        assert_eq!(eval(b.binary(BinOpKind::Ne, null.clone(), one.clone())), Ok(Value::Bool(true)));
        assert_eq!(eval(b.binary(BinOpKind::Lt, null.clone(), one.clone())), Ok(Value::Bool(false)));
        let lift_to_null = BinOp {
            lift_to_null: true,
            ..BinOpKind::Eq.into()
        };
        assert_eq!(eval(b.binary(lift_to_null, null.clone(), null.clone())), Ok(Value::Null));
        assert_eq!(eval(b.binary(BinOpKind::Add, one.clone(), null.clone())), Ok(Value::Null));
        assert_eq!(eval(b.unary(UnOpKind::Negate, null.clone())), Ok(Value::Null));
        assert_eq!(
            eval(b.convert(int(), null)),
            Err(EvalError::Fault(Fault::invalid_operation()))
        );
    }

    #[test]
    fn coalesce_applies_the_conversion() {
        let cache = MemberCache::new();
        let b = ExprBuilder::new();
        let s = Var::new("s", TyKind::Str);
        let len = MemberBuilder::getter("Length", TyKind::Str)
            .returns(int())
            .build(|s: std::sync::Arc<str>| Ok(s.chars().count() as i32));
        let conversion = b.lambda(vec![s.clone()], b.call(&len, [b.var(&s)]));
        let op = BinOp {
            conversion: Some(conversion),
            ..BinOpKind::Coalesce.into()
        };
        let expr = b.binary(op.clone(), b.str_lit("four"), b.i32_lit(0));
        assert_eq!(Interpreter::new(&cache).eval(&expr), Ok(Value::I32(4)));
        let expr = b.binary(op, b.null(TyKind::Str), b.i32_lit(0));
        assert_eq!(Interpreter::new(&cache).eval(&expr), Ok(Value::I32(0)));
    }

    #[test]
    fn user_defined_short_circuit() {
        let cache = MemberCache::new();
        let b = ExprBuilder::new();
        let flag = TyKind::structure("Flag");
        // flags are represented by their bit as an integer
        let and = MemberBuilder::static_method("op_BitwiseAnd", flag.clone())
            .param("a", int())
            .param("b", int())
            .returns(int())
            .build(|a: i32, b: i32| Ok(a & b));
        let is_false = MemberBuilder::static_method("op_False", flag)
            .param("a", int())
            .returns(TyKind::Bool)
            .build(|a: i32| Ok(a == 0));
        let op = BinOp {
            truth: Some(is_false),
            ..BinOp::with_method(BinOpKind::AndAlso, and)
        };
        let boom = b.throw_fault(int(), Fault::custom("Boom"));
        let expr = b.binary(op.clone(), b.i32_lit(0), boom);
        assert_eq!(Interpreter::new(&cache).eval(&expr), Ok(Value::I32(0)));
        let expr = b.binary(op, b.i32_lit(3), b.i32_lit(6));
        assert_eq!(Interpreter::new(&cache).eval(&expr), Ok(Value::I32(2)));
    }
}

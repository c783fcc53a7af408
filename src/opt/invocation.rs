//! Rules for member invocations, function application, conditionals,
//! assignments and `throw`.

use std::iter;

use tracing::trace;

use crate::ast::{Expr, ExprBuilder, ExprKind, Fault, Value};

use super::Rewriter;

impl<'a> Rewriter<'a> {
    /// The first operand that throws, if every operand before it is pure.
    fn first_throwing<'e>(&self, operands: &[&'e Expr]) -> Option<&'e Expr> {
        for &operand in operands {
            if operand.is_throw() {
                return Some(operand);
            }
            if !self.is_pure(operand) {
                return None;
            }
        }
        None
    }

    /// Calls, constructions and indexer accesses.
    pub(super) fn rewrite_invocation(&self, expr: &Expr) -> Option<Expr> {
        let (member, args): (_, Vec<&Expr>) = match &expr.kind {
            ExprKind::Call(member, args) | ExprKind::New(member, args) => {
                (member, args.iter().collect())
            }
            ExprKind::Index(member, object, args) => {
                (member, iter::once(object).chain(args.iter()).collect())
            }
            _ => return None,
        };
        if let Some(throw) = self.first_throwing(&args) {
            trace!(member = %member.name, "argument throws");
            return Some(throw.retyped(&expr.ty));
        }
        let has_receiver = member.kind.has_receiver();
        if has_receiver {
            if let Some((receiver, rest)) = args.split_first() {
                if receiver.is_null_constant() && rest.iter().all(|arg| self.is_pure(arg)) {
                    trace!(member = %member.name, "null receiver");
                    let fault = Fault::null_reference();
                    return Some(ExprBuilder::new().throw_fault(expr.ty.clone(), fault));
                }
            }
        }

        if self.options.no_eager_eval
            || !args.iter().all(|arg| arg.is_constant())
            || !self.provider.is_pure(member)
            || !self.is_shareable_result(&expr.ty)
        {
            return None;
        }
        // a folded result shares its arguments between all evaluations
        let offset = usize::from(has_receiver);
        let shares_mutable_arg = args.iter().enumerate().skip(offset).any(|(index, arg)| {
            self.provider.is_evaluated_once(member.param_ref(index - offset))
                && !self.is_shareable_result(&arg.ty)
        });
        if shares_mutable_arg {
            trace!(member = %member.name, "argument must be evaluated once");
            return None;
        }
        trace!(member = %member.name, "evaluating member over literals");
        self.eval_literal(expr)
    }

    /// Application of a function to arguments.
    pub(super) fn rewrite_invoke(&self, expr: &Expr) -> Option<Expr> {
        let (target, args) = match &expr.kind {
            ExprKind::Invoke(target, args) => (target, args),
            _ => return None,
        };
        let operands: Vec<&Expr> = iter::once(target).chain(args.iter()).collect();
        if let Some(throw) = self.first_throwing(&operands) {
            return Some(throw.retyped(&expr.ty));
        }
        match &target.kind {
            ExprKind::Lambda(params, body)
                if params.len() == args.len()
                    && args.iter().all(|arg| arg.is_constant())
                    && self.is_pure(body)
                    && self.is_shareable_result(&expr.ty) =>
            {
                trace!("applying lambda to literals");
                self.eval_literal(expr)
            }
            _ => None,
        }
    }

    pub(super) fn rewrite_conditional(&self, expr: &Expr) -> Option<Expr> {
        let (cond, then, otherwise) = match &expr.kind {
            ExprKind::Conditional(cond, then, otherwise) => (cond, then, otherwise),
            _ => return None,
        };
        if cond.is_throw() {
            return Some(cond.retyped(&expr.ty));
        }
        let branch = match cond.as_constant()? {
            Value::Bool(true) => then,
            Value::Bool(false) => otherwise,
            _ => return None,
        };
        if branch.ty == expr.ty || branch.is_throw() {
            trace!("literal condition");
            Some(branch.retyped(&expr.ty))
        } else {
            None
        }
    }

    pub(super) fn rewrite_assign(&self, expr: &Expr) -> Option<Expr> {
        match &expr.kind {
            ExprKind::Assign(_, value) if value.is_throw() => Some(value.retyped(&expr.ty)),
            _ => None,
        }
    }

    pub(super) fn rewrite_throw(&self, expr: &Expr) -> Option<Expr> {
        match &expr.kind {
            ExprKind::Throw(payload) if payload.is_throw() => Some(payload.retyped(&expr.ty)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use crate::{
        ast::{
            BinOpKind, Expr, ExprBuilder, Fault, IntKind, Member, MemberBuilder, TyKind, Value,
            Var,
        },
        cache::MemberCache,
        opt::Optimizer,
        semantics::{params::ParameterTable, DefaultSemanticProvider},
    };

    fn int() -> TyKind {
        TyKind::Int(IntKind::I32)
    }

    fn optimizer(pure: &[&Member]) -> Optimizer {
        let provider = pure
            .iter()
            .fold(DefaultSemanticProvider::new(), |provider, member| {
                provider.with_pure_member(member)
            });
        Optimizer::new(Arc::new(provider), Arc::new(MemberCache::new()))
    }

    fn max() -> Member {
        MemberBuilder::static_method("Max", TyKind::class("Math"))
            .param("a", int())
            .param("b", int())
            .returns(int())
            .build(|a: i32, b: i32| Ok(a.max(b)))
    }

    fn log() -> Member {
        MemberBuilder::static_method("Log", TyKind::class("Console"))
            .returns(int())
            .build(|| Ok(0))
    }

    #[test]
    fn static_calls() {
        let b = ExprBuilder::new();
        let max = max();
        let expr = b.call(&max, [b.i32_lit(3), b.i32_lit(5)]);
        assert_eq!(optimizer(&[]).optimize(&expr).unwrap(), expr);
        assert_eq!(optimizer(&[&max]).optimize(&expr).unwrap(), b.i32_lit(5));

        let expr = b.call(&max, [b.i32_lit(3), b.param("x", int())]);
        assert_eq!(optimizer(&[&max]).optimize(&expr).unwrap(), expr);
    }

    #[test]
    fn pure_void_call() {
        let b = ExprBuilder::new();
        let noop = MemberBuilder::static_method("Noop", TyKind::class("Math"))
            .param("a", int())
            .build(|_: i32| Ok(()));
        let expr = b.call(&noop, [b.i32_lit(3)]);
        assert_eq!(optimizer(&[&noop]).optimize(&expr).unwrap(), b.empty());
    }

    #[test]
    fn throwing_arguments() {
        let b = ExprBuilder::new();
        let max = max();
        let log = log();
        let boom = b.throw_fault(int(), Fault::custom("Boom"));
        let expr = b.call(&max, [b.i32_lit(1), boom.clone()]);
        assert_eq!(optimizer(&[]).optimize(&expr).unwrap(), boom);
        let expr = b.call(&max, [b.call(&log, []), boom]);
        assert_eq!(optimizer(&[]).optimize(&expr).unwrap(), expr);
    }

    #[test]
    fn null_receiver() {
        let b = ExprBuilder::new();
        let substring = MemberBuilder::instance_method("Substring", TyKind::Str)
            .param("start", int())
            .returns(TyKind::Str)
            .build(|s: Arc<str>, start: i32| -> Result<Arc<str>, Fault> {
                let start = usize::try_from(start).map_err(|_| Fault::index_out_of_range())?;
                s.get(start..)
                    .map(Arc::from)
                    .ok_or_else(Fault::index_out_of_range)
            });
        let log = log();
        let expr = b.call(&substring, [b.null(TyKind::Str), b.i32_lit(1)]);
        assert_eq!(
            optimizer(&[]).optimize(&expr).unwrap(),
            b.throw_fault(TyKind::Str, Fault::null_reference())
        );
        let expr = b.call(&substring, [b.null(TyKind::Str), b.call(&log, [])]);
        assert_eq!(optimizer(&[]).optimize(&expr).unwrap(), expr);

        let expr = b.call(&substring, [b.str_lit("abc"), b.i32_lit(1)]);
        assert_eq!(
            optimizer(&[&substring]).optimize(&expr).unwrap(),
            b.str_lit("bc")
        );
    }

    #[test]
    fn indexer() {
        let b = ExprBuilder::new();
        let chars = MemberBuilder::getter("Chars", TyKind::Str)
            .param("index", int())
            .returns(TyKind::Char)
            .build(|s: Arc<str>, index: i32| {
                usize::try_from(index)
                    .ok()
                    .and_then(|index| s.chars().nth(index))
                    .ok_or_else(Fault::index_out_of_range)
            });
        let optimizer = optimizer(&[&chars]);
        let at = |index| b.index(&chars, b.str_lit("abc"), [b.i32_lit(index)]);
        assert_eq!(optimizer.optimize(&at(1)).unwrap(), b.lit(Value::Char('b')));
        assert_eq!(
            optimizer.optimize(&at(5)).unwrap(),
            b.throw_fault(TyKind::Char, Fault::index_out_of_range())
        );
    }

    #[test]
    fn evaluated_once_arguments() {
        let b = ExprBuilder::new();
        let int_array = TyKind::array(int());
        let sum = MemberBuilder::static_method("Sum", TyKind::class("Enumerable"))
            .param("values", int_array.clone())
            .returns(int())
            .build(|values: Arc<[Value]>| {
                Ok(values
                    .iter()
                    .filter_map(|value| match value {
                        Value::I32(value) => Some(*value),
                        _ => None,
                    })
                    .fold(0i32, i32::wrapping_add))
            });
        let expr = b.call(
            &sum,
            [b.array_lit(int(), [Value::I32(1), Value::I32(2), Value::I32(3)])],
        );
        assert_eq!(optimizer(&[&sum]).optimize(&expr).unwrap(), b.i32_lit(6));

        let mut table = ParameterTable::new();
        table.register(sum.param_ref(0)).unwrap();
        let provider = DefaultSemanticProvider::new()
            .with_pure_member(&sum)
            .with_parameter_table(Arc::new(table));
        let optimizer = Optimizer::new(Arc::new(provider.clone()), Arc::new(MemberCache::new()));
        assert_eq!(optimizer.optimize(&expr).unwrap(), expr);

        // unless arrays of that type are immutable
        let optimizer = Optimizer::new(
            Arc::new(provider.with_immutable_type(int_array)),
            Arc::new(MemberCache::new()),
        );
        assert_eq!(optimizer.optimize(&expr).unwrap(), b.i32_lit(6));
    }

    #[test]
    fn conditionals() {
        let b = ExprBuilder::new();
        let x = b.param("x", int());
        let y = b.param("y", int());
        let optimizer = optimizer(&[]);
        let expr = b.conditional(b.bool_lit(true), x.clone(), y.clone());
        assert_eq!(optimizer.optimize(&expr).unwrap(), x);
        let cond = b.binary(BinOpKind::Lt, b.i32_lit(2), b.i32_lit(1));
        let expr = b.conditional(cond, x.clone(), y.clone());
        assert_eq!(optimizer.optimize(&expr).unwrap(), y);

        let boom = b.throw_fault(TyKind::Bool, Fault::custom("Boom"));
        let expr = b.conditional(boom, x.clone(), y.clone());
        assert_eq!(
            optimizer.optimize(&expr).unwrap(),
            b.throw_fault(int(), Fault::custom("Boom"))
        );

        let expr = b.conditional(b.param("p", TyKind::Bool), x, y);
        assert_eq!(optimizer.optimize(&expr).unwrap(), expr);
    }

    #[test]
    fn lambdas() {
        let b = ExprBuilder::new();
        let optimizer = optimizer(&[]);
        let a = Var::new("a", int());
        let lambda = |body: Expr| b.lambda(vec![a.clone()], body);

        let three = b.binary(BinOpKind::Add, b.i32_lit(1), b.i32_lit(2));
        let expr = lambda(b.binary(BinOpKind::Add, b.var(&a), three));
        assert_eq!(
            optimizer.optimize(&expr).unwrap(),
            lambda(b.binary(BinOpKind::Add, b.var(&a), b.i32_lit(3)))
        );

        let increment = lambda(b.binary(BinOpKind::Add, b.var(&a), b.i32_lit(1)));
        let expr = b.invoke(increment.clone(), [b.i32_lit(2)]);
        assert_eq!(optimizer.optimize(&expr).unwrap(), b.i32_lit(3));
        let expr = b.invoke(increment, [b.param("x", int())]);
        assert_eq!(optimizer.optimize(&expr).unwrap(), expr);

        let func = TyKind::Func(vec![int()], Box::new(int()));
        let log = log();
        let expr = b.invoke(
            b.throw_fault(func, Fault::custom("Boom")),
            [b.call(&log, [])],
        );
        assert_eq!(
            optimizer.optimize(&expr).unwrap(),
            b.throw_fault(int(), Fault::custom("Boom"))
        );
    }

    #[test]
    fn assignments_and_throws() {
        let b = ExprBuilder::new();
        let optimizer = optimizer(&[]);
        let x = Var::new("x", int());
        let boom = b.throw_fault(int(), Fault::custom("Boom"));
        assert_eq!(optimizer.optimize(&b.assign(&x, boom.clone())).unwrap(), boom);
        let expr = b.throw(TyKind::Str, b.throw_fault(TyKind::Exception, Fault::custom("Boom")));
        assert_eq!(
            optimizer.optimize(&expr).unwrap(),
            b.throw_fault(TyKind::Str, Fault::custom("Boom"))
        );
    }
}

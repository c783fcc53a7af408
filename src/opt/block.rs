//! Rules for blocks: flattening, truncation after a `throw`, pruning of
//! unused locals and pure statements.

use indexmap::IndexSet;
use tracing::trace;

use crate::{
    ast::{
        util::{declared_locals, FreeVariableCollector, ReplaceReads, StripAssignments, VarUsage},
        visit::VisitorMut,
        Expr, ExprBuilder, ExprKind, Ident, TyKind, Value, Var,
    },
    error::OptError,
};

use super::Rewriter;

impl<'a> Rewriter<'a> {
    pub(super) fn rewrite_block(&mut self, expr: &Expr) -> Result<Option<Expr>, OptError> {
        let (vars, stmts) = match &expr.kind {
            ExprKind::Block(vars, stmts) => (vars, stmts),
            _ => return Ok(None),
        };
        let mut vars = vars.clone();
        let mut stmts = stmts.clone();

        let mut changed = flatten_blocks(&expr.ty, &mut vars, &mut stmts)?;
        if let Some(pos) = stmts.iter().position(|stmt| stmt.is_throw()) {
            if pos + 1 < stmts.len() {
                trace!(dropped = stmts.len() - pos - 1, "statements after throw");
                stmts.truncate(pos + 1);
                changed = true;
            }
        }
        if !self.options.no_block_pruning {
            changed |= self.replace_uninitialized_reads(&vars, &mut stmts)?;
            changed |= self.remove_pure_statements(&expr.ty, &mut stmts);
            changed |= self.remove_unread_vars(&mut vars, &mut stmts)?;
        }

        let builder = ExprBuilder::new();
        if vars.is_empty() {
            match stmts.as_slice() {
                [stmt] if stmt.ty == expr.ty || stmt.is_throw() => {
                    return Ok(Some(stmt.retyped(&expr.ty)))
                }
                [] if expr.ty.is_void() => return Ok(Some(builder.empty())),
                _ => {}
            }
        }
        Ok(changed.then(|| builder.block_typed(expr.ty.clone(), vars, stmts)))
    }

    /// Reads of a local before its first assignment evaluate to the default
    /// value of its type.
    fn replace_uninitialized_reads(
        &mut self,
        vars: &[Var],
        stmts: &mut [Expr],
    ) -> Result<bool, OptError> {
        let mut changed = false;
        for var in vars {
            let default = match Value::default_for(&var.ty) {
                Some(value) => self.literal(value, &var.ty),
                None => continue,
            };
            for stmt in stmts.iter_mut() {
                let usage = VarUsage::of(stmt, var.ident);
                if usage.writes > 0 || usage.captured {
                    break;
                }
                if usage.reads == 0 {
                    continue;
                }
                let mut replace = ReplaceReads::new(var.ident, &default);
                let _ = replace.visit_expr(stmt);
                trace!(var = %var.ident, reads = replace.replaced, "uninitialized reads");
                changed = true;
                self.visit_expr(stmt)?;
            }
        }
        Ok(changed)
    }

    /// Remove pure statements whose value is discarded.
    fn remove_pure_statements(&self, ty: &TyKind, stmts: &mut Vec<Expr>) -> bool {
        let len = stmts.len();
        let keep_last = !ty.is_void();
        let mut index = 0;
        stmts.retain(|stmt| {
            let is_last = index + 1 == len;
            index += 1;
            (is_last && keep_last) || !self.is_pure(stmt)
        });
        if stmts.len() != len {
            trace!(removed = len - stmts.len(), "pure statements");
        }
        stmts.len() != len
    }

    /// Drop locals that are never read. Assignments to them are replaced by
    /// the assigned value.
    fn remove_unread_vars(
        &mut self,
        vars: &mut Vec<Var>,
        stmts: &mut [Expr],
    ) -> Result<bool, OptError> {
        let mut unread = vec![];
        vars.retain(|var| {
            let reads: usize = stmts
                .iter()
                .map(|stmt| VarUsage::of(stmt, var.ident).reads)
                .sum();
            if reads == 0 {
                unread.push(var.ident);
            }
            reads > 0
        });
        for ident in &unread {
            trace!(var = %ident, "unread local");
            for stmt in stmts.iter_mut() {
                if VarUsage::of(stmt, *ident).writes == 0 {
                    continue;
                }
                let _ = StripAssignments { ident: *ident }.visit_expr(stmt);
                self.visit_expr(stmt)?;
            }
        }
        Ok(!unread.is_empty())
    }
}

/// Merge nested blocks into the enclosing block. A block in final position
/// is merged only if it produces the enclosing block's value.
///
/// A nested local with the name of a local of the enclosing block is an
/// error. A nested block stays in place if one of its locals is declared
/// elsewhere in the enclosing block, e.g. by a sibling block, or is free in
/// another statement.
fn flatten_blocks(ty: &TyKind, vars: &mut Vec<Var>, stmts: &mut Vec<Expr>) -> Result<bool, OptError> {
    if !stmts
        .iter()
        .any(|stmt| matches!(stmt.kind, ExprKind::Block(_, _)))
    {
        return Ok(false);
    }
    let free: Vec<IndexSet<Ident>> = stmts
        .iter()
        .map(|stmt| FreeVariableCollector::collect(stmt))
        .collect();
    let declared: Vec<IndexSet<Ident>> = stmts.iter().map(|stmt| declared_locals(stmt)).collect();
    let len = stmts.len();
    let mut changed = false;
    let mut flat = Vec::with_capacity(len);
    let mut merged = vec![];
    for (index, stmt) in std::mem::take(stmts).into_iter().enumerate() {
        let is_last = index + 1 == len;
        let (inner_vars, inner_stmts) = match &stmt.kind {
            ExprKind::Block(inner_vars, inner_stmts)
                if !is_last || stmt.ty == *ty || ty.is_void() =>
            {
                (inner_vars, inner_stmts)
            }
            _ => {
                flat.push(stmt);
                continue;
            }
        };
        if let Some(var) = inner_vars
            .iter()
            .find(|var| vars.iter().any(|outer| outer.ident == var.ident))
        {
            return Err(OptError::ShadowedVariable(var.ident));
        }
        let clashes = inner_vars.iter().any(|var| {
            (0..len).filter(|&other| other != index).any(|other| {
                free[other].contains(&var.ident) || declared[other].contains(&var.ident)
            })
        });
        if clashes {
            trace!(vars = inner_vars.len(), "keeping nested block");
            flat.push(stmt);
            continue;
        }
        trace!(vars = inner_vars.len(), stmts = inner_stmts.len(), "flattening block");
        merged.extend(inner_vars.iter().cloned());
        flat.extend(inner_stmts.iter().cloned());
        changed = true;
    }
    vars.extend(merged);
    *stmts = flat;
    Ok(changed)
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use crate::{
        ast::{BinOpKind, Expr, ExprBuilder, Fault, Ident, IntKind, MemberBuilder, TyKind, Var},
        cache::MemberCache,
        error::OptError,
        opt::Optimizer,
        semantics::DefaultSemanticProvider,
    };

    fn int() -> TyKind {
        TyKind::Int(IntKind::I32)
    }

    fn optimizer() -> Optimizer {
        Optimizer::new(
            Arc::new(DefaultSemanticProvider::new()),
            Arc::new(MemberCache::new()),
        )
    }

    fn optimize(expr: &Expr) -> Expr {
        optimizer().optimize(expr).unwrap()
    }

    #[test]
    fn pruning() {
        // { var a; var b; 1; a + 2; "x"; b = a; 7 }
        let b = ExprBuilder::new();
        let a = Var::new("a", int());
        let v = Var::new("b", int());
        let expr = b.block(
            vec![a.clone(), v.clone()],
            vec![
                b.i32_lit(1),
                b.binary(BinOpKind::Add, b.var(&a), b.i32_lit(2)),
                b.str_lit("x"),
                b.assign(&v, b.var(&a)),
                b.i32_lit(7),
            ],
        );
        assert_eq!(optimize(&expr), b.i32_lit(7));
    }

    #[test]
    fn impure_assignments_keep_their_value() {
        let b = ExprBuilder::new();
        let log = MemberBuilder::static_method("Log", TyKind::class("Console"))
            .returns(int())
            .build(|| Ok(1));
        let x = Var::new("x", int());
        let expr = b.block(
            vec![x.clone()],
            vec![b.assign(&x, b.call(&log, [])), b.i32_lit(2)],
        );
        let expected = b.block(vec![], vec![b.call(&log, []), b.i32_lit(2)]);
        assert_eq!(optimize(&expr), expected);
    }

    #[test]
    fn uninitialized_reads_are_defaults() {
        let b = ExprBuilder::new();
        let x = Var::new("x", int());
        let s = Var::new("s", TyKind::Str);
        let expr = b.block(
            vec![x.clone(), s.clone()],
            vec![b.binary(BinOpKind::Mul, b.var(&x), b.i32_lit(3))],
        );
        assert_eq!(optimize(&expr), b.i32_lit(0));

        let expr = b.block(vec![s.clone()], vec![b.var(&s)]);
        assert_eq!(optimize(&expr), b.null(TyKind::Str));

        // the read after the assignment stays
        let expr = b.block(
            vec![x.clone()],
            vec![b.assign(&x, b.param("y", int())), b.var(&x)],
        );
        assert_eq!(optimize(&expr), expr);
    }

    #[test]
    fn statements_after_throw() {
        let b = ExprBuilder::new();
        let log = MemberBuilder::static_method("Log", TyKind::class("Console"))
            .build(|| Ok(()));
        let boom = b.throw_fault(TyKind::Void, Fault::custom("Boom"));
        let expr = b.block(
            vec![],
            vec![b.call(&log, []), boom.clone(), b.call(&log, []), b.i32_lit(3)],
        );
        let expected = b.block_typed(int(), vec![], vec![b.call(&log, []), boom.clone()]);
        assert_eq!(optimize(&expr), expected);

        let expr = b.block(vec![], vec![b.i32_lit(1), boom, b.i32_lit(3)]);
        assert_eq!(
            optimize(&expr),
            b.throw_fault(int(), Fault::custom("Boom"))
        );
    }

    #[test]
    fn void_blocks() {
        let b = ExprBuilder::new();
        let expr = b.block_typed(TyKind::Void, vec![], vec![b.i32_lit(1), b.param("x", int())]);
        assert_eq!(optimize(&expr), b.empty());
        let expr = b.block(vec![], vec![]);
        assert_eq!(optimize(&expr), b.empty());
    }

    #[test]
    fn flattening() {
        let b = ExprBuilder::new();
        let log = MemberBuilder::static_method("Log", TyKind::class("Console"))
            .param("value", int())
            .build(|_: i32| Ok(()));
        let x = Var::new("x", int());
        let y = Var::new("y", int());
        let expr = b.block(
            vec![x.clone()],
            vec![
                b.assign(&x, b.param("p", int())),
                b.block(
                    vec![y.clone()],
                    vec![b.assign(&y, b.var(&x)), b.call(&log, [b.var(&y)])],
                ),
                b.var(&x),
            ],
        );
        let expected = b.block(
            vec![x.clone(), y.clone()],
            vec![
                b.assign(&x, b.param("p", int())),
                b.assign(&y, b.var(&x)),
                b.call(&log, [b.var(&y)]),
                b.var(&x),
            ],
        );
        assert_eq!(optimize(&expr), expected);

        // `y` is free in the last statement
        let expr = b.block(
            vec![],
            vec![
                b.block(
                    vec![y.clone()],
                    vec![b.assign(&y, b.param("p", int())), b.call(&log, [b.var(&y)])],
                ),
                b.var(&y),
            ],
        );
        assert_eq!(optimize(&expr), expr);
    }

    #[test]
    fn sibling_blocks_with_the_same_local() {
        let b = ExprBuilder::new();
        let log = MemberBuilder::static_method("Log", TyKind::class("Console"))
            .param("value", int())
            .build(|_: i32| Ok(()));
        let t = Var::new("t", int());
        let log_param = |name: &str| {
            b.block(
                vec![t.clone()],
                vec![b.assign(&t, b.param(name, int())), b.call(&log, [b.var(&t)])],
            )
        };
        let expr = b.block(vec![], vec![log_param("p"), log_param("q"), b.i32_lit(1)]);
        let optimizer = optimizer();
        let res = optimizer.optimize(&expr).unwrap();
        assert_eq!(res, expr);
        assert_eq!(optimizer.optimize(&res).unwrap(), res);

        // distinct names are merged
        let u = Var::new("u", int());
        let second = b.block(
            vec![u.clone()],
            vec![b.assign(&u, b.param("q", int())), b.call(&log, [b.var(&u)])],
        );
        let expr = b.block(vec![], vec![log_param("p"), second, b.i32_lit(1)]);
        let expected = b.block(
            vec![t.clone(), u.clone()],
            vec![
                b.assign(&t, b.param("p", int())),
                b.call(&log, [b.var(&t)]),
                b.assign(&u, b.param("q", int())),
                b.call(&log, [b.var(&u)]),
                b.i32_lit(1),
            ],
        );
        assert_eq!(optimize(&expr), expected);
    }

    #[test]
    fn shadowing_is_an_error() {
        let b = ExprBuilder::new();
        let log = MemberBuilder::static_method("Log", TyKind::class("Console"))
            .param("value", int())
            .build(|_: i32| Ok(()));
        let x = Var::new("x", int());
        let expr = b.block(
            vec![x.clone()],
            vec![
                b.assign(&x, b.param("p", int())),
                b.block(
                    vec![x.clone()],
                    vec![b.assign(&x, b.i32_lit(2)), b.call(&log, [b.var(&x)])],
                ),
                b.call(&log, [b.var(&x)]),
            ],
        );
        assert_eq!(
            optimizer().optimize(&expr),
            Err(OptError::ShadowedVariable(Ident::new("x")))
        );
    }
}

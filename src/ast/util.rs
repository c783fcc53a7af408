// Using [`IndexSet`], which is a HashSet that preserves the insertion order, for deterministic results
use indexmap::IndexSet;

use super::{
    visit::{walk_expr, VisitorMut},
    Expr, ExprData, ExprKind, Ident, Var,
};

fn binds(vars: &[Var], ident: Ident) -> bool {
    vars.iter().any(|var| var.ident == ident)
}

/// Helper to find all free variables in expressions. Block locals and lambda
/// parameters bind their names in the block or lambda body.
#[derive(Debug, Default)]
pub struct FreeVariableCollector {
    pub variables: IndexSet<Ident>,
    bound: Vec<Ident>,
}

impl FreeVariableCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collect(expr: &ExprData) -> IndexSet<Ident> {
        let mut collector = Self::new();
        collector.visit(expr);
        collector.variables
    }

    pub fn visit(&mut self, expr: &ExprData) {
        match &expr.kind {
            ExprKind::Parameter(ident) | ExprKind::Assign(ident, _) => {
                if !self.bound.contains(ident) {
                    self.variables.insert(*ident);
                }
            }
            _ => {}
        }
        let scope = match &expr.kind {
            ExprKind::Block(vars, _) | ExprKind::Lambda(vars, _) => vars.as_slice(),
            _ => &[],
        };
        let len = self.bound.len();
        self.bound.extend(scope.iter().map(|var| var.ident));
        for child in expr.children() {
            self.visit(child);
        }
        self.bound.truncate(len);
    }
}

/// Names of all block locals declared anywhere inside an expression.
pub fn declared_locals(expr: &ExprData) -> IndexSet<Ident> {
    fn collect(expr: &ExprData, locals: &mut IndexSet<Ident>) {
        if let ExprKind::Block(vars, _) = &expr.kind {
            locals.extend(vars.iter().map(|var| var.ident));
        }
        for child in expr.children() {
            collect(child, locals);
        }
    }
    let mut locals = IndexSet::new();
    collect(expr, &mut locals);
    locals
}

/// How a variable is used inside an expression. Nested blocks and lambdas
/// that declare a variable of the same name hide it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct VarUsage {
    pub reads: usize,
    pub writes: usize,
    /// Is the variable referenced inside a lambda?
    pub captured: bool,
}

impl VarUsage {
    pub fn of(expr: &ExprData, ident: Ident) -> Self {
        let mut usage = VarUsage::default();
        usage.count(expr, ident, false);
        usage
    }

    pub fn is_used(&self) -> bool {
        self.reads > 0 || self.writes > 0
    }

    fn count(&mut self, expr: &ExprData, ident: Ident, in_lambda: bool) {
        match &expr.kind {
            ExprKind::Parameter(read) if *read == ident => {
                self.reads += 1;
                self.captured |= in_lambda;
            }
            ExprKind::Assign(written, _) if *written == ident => {
                self.writes += 1;
                self.captured |= in_lambda;
            }
            ExprKind::Block(vars, _) if binds(vars, ident) => return,
            ExprKind::Lambda(params, _) if binds(params, ident) => return,
            _ => {}
        }
        let in_lambda = in_lambda || matches!(expr.kind, ExprKind::Lambda(_, _));
        for child in expr.children() {
            self.count(child, ident, in_lambda);
        }
    }
}

/// Replaces every read of a variable by an expression.
pub struct ReplaceReads<'a> {
    pub ident: Ident,
    pub replacement: &'a Expr,
    pub replaced: usize,
}

impl<'a> ReplaceReads<'a> {
    pub fn new(ident: Ident, replacement: &'a Expr) -> Self {
        ReplaceReads {
            ident,
            replacement,
            replaced: 0,
        }
    }
}

impl<'a> VisitorMut for ReplaceReads<'a> {
    type Err = ();

    fn visit_expr(&mut self, e: &mut Expr) -> Result<(), Self::Err> {
        match &e.kind {
            ExprKind::Parameter(ident) if *ident == self.ident => {
                *e = self.replacement.clone();
                self.replaced += 1;
                Ok(())
            }
            ExprKind::Block(vars, _) | ExprKind::Lambda(vars, _) if binds(vars, self.ident) => {
                Ok(())
            }
            _ => walk_expr(self, e),
        }
    }
}

/// Replaces every assignment to a variable by its right-hand side, so the
/// write disappears and the side effects of the value remain.
pub struct StripAssignments {
    pub ident: Ident,
}

impl VisitorMut for StripAssignments {
    type Err = ();

    fn visit_expr(&mut self, e: &mut Expr) -> Result<(), Self::Err> {
        match &e.kind {
            ExprKind::Block(vars, _) | ExprKind::Lambda(vars, _) if binds(vars, self.ident) => {
                return Ok(())
            }
            _ => {}
        }
        walk_expr(self, e)?;
        let ident = self.ident;
        e.replace_with(|e| {
            let value = match &e.kind {
                ExprKind::Assign(written, value) if *written == ident => Some(value.clone()),
                _ => None,
            };
            value.unwrap_or(e)
        });
        Ok(())
    }
}

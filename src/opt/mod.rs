//! The rewrite engine.
//!
//! The [`Optimizer`] rewrites a tree bottom-up: the children of a node are
//! optimized first, then the rules for the node's kind are applied until none
//! fires. The rules live in the submodules:
//!
//!  * [`binary`]: operator rules, including coalescing, short-circuiting
//!    and lifting over `null`,
//!  * [`unary`]: unary operators and conversions,
//!  * [`block`]: flattening and pruning of blocks,
//!  * [`invocation`]: member calls, function application, conditionals and
//!    the remaining node kinds.
//!
//! Every rule preserves the type of the node it rewrites and never changes
//! whether or which error is raised. Rules consult the [`SemanticProvider`]
//! (via [`purity`]) to decide which sub-trees may be dropped, and the
//! [`MemberCache`] to evaluate operators and members over literals.

use std::sync::Arc;

use clap::Args;
use tracing::{debug, info, info_span, trace};

use crate::{
    ast::{
        stats::Stats,
        visit::{walk_expr, VisitorMut},
        Expr, ExprBuilder, ExprData, ExprKind, TyKind, Value,
    },
    cache::MemberCache,
    error::{EvalError, OptError},
    interp::Interpreter,
    semantics::SemanticProvider,
};

pub mod binary;
pub mod block;
pub mod invocation;
pub mod purity;
pub mod unary;

use purity::Purity;

#[derive(Debug, Default, Clone, Args)]
#[command(next_help_heading = "Optimization Options")]
pub struct OptimizerOptions {
    /// Never evaluate operators or members at optimization time.
    #[arg(long)]
    pub no_eager_eval: bool,

    /// Keep unused block variables and pure statements of blocks.
    #[arg(long)]
    pub no_block_pruning: bool,

    /// Leave sub-trees below this depth unchanged.
    #[arg(long)]
    pub max_depth: Option<usize>,
}

/// Simplifies expression trees. The optimizer itself holds no per-run state
/// and can be shared between threads; each thread optimizes its own trees.
#[derive(Clone)]
pub struct Optimizer {
    provider: Arc<dyn SemanticProvider>,
    cache: Arc<MemberCache>,
    options: OptimizerOptions,
}

impl Optimizer {
    pub fn new(provider: Arc<dyn SemanticProvider>, cache: Arc<MemberCache>) -> Self {
        Optimizer {
            provider,
            cache,
            options: OptimizerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: OptimizerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &OptimizerOptions {
        &self.options
    }

    pub fn cache(&self) -> &MemberCache {
        &self.cache
    }

    pub fn provider(&self) -> &dyn SemanticProvider {
        self.provider.as_ref()
    }

    /// Optimize a tree. The input is left unchanged.
    pub fn optimize(&self, expr: &Expr) -> Result<Expr, OptError> {
        let span = info_span!("optimize");
        let _entered = span.enter();
        let before = Stats::of(expr);
        let mut res = expr.clone();
        let mut rewriter = Rewriter {
            provider: self.provider.as_ref(),
            cache: &self.cache,
            options: &self.options,
            depth: 0,
        };
        rewriter.visit_expr(&mut res)?;
        let after = Stats::of(&res);
        info!(
            before = before.num_exprs,
            after = after.num_exprs,
            "optimized expression"
        );
        debug!(%before, %after, "tree statistics");
        Ok(res)
    }
}

/// The state of one optimization run.
pub struct Rewriter<'a> {
    provider: &'a dyn SemanticProvider,
    cache: &'a MemberCache,
    options: &'a OptimizerOptions,
    depth: usize,
}

impl<'a> Rewriter<'a> {
    fn purity(&self) -> Purity<'a> {
        Purity::new(self.provider)
    }

    fn is_pure(&self, expr: &ExprData) -> bool {
        self.purity().is_pure(expr)
    }

    /// May a value of this type be produced at optimization time and shared
    /// by every evaluation of the folded node?
    fn is_shareable_result(&self, ty: &TyKind) -> bool {
        ty.is_void() || ty.is_value_type() || self.provider.is_immutable(ty)
    }

    /// A literal of the given type.
    fn literal(&self, value: Value, ty: &TyKind) -> Expr {
        ExprBuilder::new().constant(value, ty.clone())
    }

    /// Evaluate a node whose operands are literals. Errors raised by the
    /// evaluated program become `throw` nodes. Returns `None` if the node
    /// could not be evaluated.
    fn eval_literal(&self, expr: &Expr) -> Option<Expr> {
        if self.options.no_eager_eval {
            return None;
        }
        let builder = ExprBuilder::new();
        match Interpreter::new(self.cache).eval(expr) {
            Ok(_) if expr.ty.is_void() => Some(builder.empty()),
            Ok(value) => Some(self.literal(value, &expr.ty)),
            Err(EvalError::Fault(fault)) => Some(builder.throw_fault(expr.ty.clone(), fault)),
            Err(err) => {
                trace!(%expr, %err, "could not evaluate");
                None
            }
        }
    }

    /// Apply the rules of the node's kind once.
    fn rewrite(&mut self, expr: &Expr) -> Result<Option<Expr>, OptError> {
        let res = match &expr.kind {
            ExprKind::Constant(_) | ExprKind::Parameter(_) | ExprKind::Default => None,
            ExprKind::Lambda(_, _) => None,
            ExprKind::Unary(_, _) => self.rewrite_unary(expr),
            ExprKind::Convert(_, _) => self.rewrite_convert(expr),
            ExprKind::Binary(_, _, _) => self.rewrite_binary(expr),
            ExprKind::Block(_, _) => return self.rewrite_block(expr),
            ExprKind::Conditional(_, _, _) => self.rewrite_conditional(expr),
            ExprKind::Assign(_, _) => self.rewrite_assign(expr),
            ExprKind::Throw(_) => self.rewrite_throw(expr),
            ExprKind::Call(_, _) | ExprKind::New(_, _) | ExprKind::Index(_, _, _) => {
                self.rewrite_invocation(expr)
            }
            ExprKind::Invoke(_, _) => self.rewrite_invoke(expr),
        };
        Ok(res)
    }
}

impl<'a> VisitorMut for Rewriter<'a> {
    type Err = OptError;

    fn visit_expr(&mut self, e: &mut Expr) -> Result<(), Self::Err> {
        if let Some(max_depth) = self.options.max_depth {
            if self.depth >= max_depth {
                return Ok(());
            }
        }
        self.depth += 1;
        let res = walk_expr(self, e);
        self.depth -= 1;
        res?;
        while let Some(rewritten) = self.rewrite(e)? {
            debug_assert_eq!(rewritten.ty, e.ty, "rewrite of {} changed its type", e);
            *e = rewritten;
        }
        Ok(())
    }
}

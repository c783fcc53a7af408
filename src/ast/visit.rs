use std::ops::DerefMut;

use super::{BinOp, Expr, ExprKind, Ident, Var};

pub trait VisitorMut: Sized {
    type Err;

    fn visit_expr(&mut self, e: &mut Expr) -> Result<(), Self::Err> {
        walk_expr(self, e)
    }

    fn visit_exprs(&mut self, es: &mut Vec<Expr>) -> Result<(), Self::Err> {
        for e in es {
            self.visit_expr(e)?;
        }
        Ok(())
    }

    fn visit_vars(&mut self, vars: &mut Vec<Var>) -> Result<(), Self::Err> {
        for var in vars {
            self.visit_ident(&mut var.ident)?;
        }
        Ok(())
    }

    fn visit_ident(&mut self, _ident: &mut Ident) -> Result<(), Self::Err> {
        Ok(())
    }
}

pub fn walk_expr<V: VisitorMut>(visitor: &mut V, e: &mut Expr) -> Result<(), V::Err> {
    match e.deref_mut().kind {
        ExprKind::Constant(_) | ExprKind::Default => {}
        ExprKind::Parameter(ref mut ident) => visitor.visit_ident(ident)?,
        ExprKind::Unary(_, ref mut operand) | ExprKind::Convert(_, ref mut operand) => {
            visitor.visit_expr(operand)?
        }
        ExprKind::Binary(ref mut op, ref mut lhs, ref mut rhs) => {
            visitor.visit_expr(lhs)?;
            visitor.visit_expr(rhs)?;
            walk_bin_op(visitor, op)?;
        }
        ExprKind::Assign(ref mut ident, ref mut value) => {
            visitor.visit_ident(ident)?;
            visitor.visit_expr(value)?;
        }
        ExprKind::Block(ref mut vars, ref mut stmts) => {
            visitor.visit_vars(vars)?;
            visitor.visit_exprs(stmts)?;
        }
        ExprKind::Conditional(ref mut cond, ref mut then, ref mut otherwise) => {
            visitor.visit_expr(cond)?;
            visitor.visit_expr(then)?;
            visitor.visit_expr(otherwise)?;
        }
        ExprKind::Throw(ref mut value) => visitor.visit_expr(value)?,
        ExprKind::Call(_, ref mut args) | ExprKind::New(_, ref mut args) => {
            visitor.visit_exprs(args)?
        }
        ExprKind::Index(_, ref mut object, ref mut args) => {
            visitor.visit_expr(object)?;
            visitor.visit_exprs(args)?;
        }
        ExprKind::Lambda(ref mut params, ref mut body) => {
            visitor.visit_vars(params)?;
            visitor.visit_expr(body)?;
        }
        ExprKind::Invoke(ref mut target, ref mut args) => {
            visitor.visit_expr(target)?;
            visitor.visit_exprs(args)?;
        }
    }
    Ok(())
}

pub fn walk_bin_op<V: VisitorMut>(visitor: &mut V, op: &mut BinOp) -> Result<(), V::Err> {
    if let Some(ref mut conversion) = op.conversion {
        visitor.visit_expr(conversion)?;
    }
    Ok(())
}

//! Abstract representation of expressions.

use std::fmt;

use crate::pretty::{parens_group, pretty_block, pretty_list, Doc, SimplePretty};

use super::{shared::Shared, Fault, FloatKind, Ident, IntKind, Member, TyKind, Value};

pub type Expr = Shared<ExprData>;

impl Expr {
    /// Replace this expression in-place by a function of its old value, e.g.
    /// to unwrap or wrap a node without going through its [`ExprData`].
    pub fn replace_with(&mut self, f: impl FnOnce(Expr) -> Expr) {
        let default = || {
            Shared::new(ExprData {
                kind: ExprKind::Default,
                ty: TyKind::Void,
            })
        };
        replace_with::replace_with(self, default, f)
    }

    /// The same expression with a different static type. Only meaningful for
    /// nodes whose evaluation does not depend on their type, i.e. throws.
    pub fn retyped(&self, ty: &TyKind) -> Expr {
        if &self.ty == ty {
            return self.clone();
        }
        Shared::new(ExprData {
            kind: self.kind.clone(),
            ty: ty.clone(),
        })
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.pretty().render_fmt(80, f)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExprData {
    pub kind: ExprKind,
    pub ty: TyKind,
}

impl ExprData {
    pub fn as_constant(&self) -> Option<&Value> {
        match &self.kind {
            ExprKind::Constant(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.kind, ExprKind::Constant(_))
    }

    pub fn is_null_constant(&self) -> bool {
        matches!(self.kind, ExprKind::Constant(Value::Null))
    }

    /// Is this an unconditional throw? A `throw` node always raises: either
    /// the error it carries or the error raised while evaluating its payload.
    pub fn is_throw(&self) -> bool {
        matches!(self.kind, ExprKind::Throw(_))
    }

    /// The direct sub-expressions, in evaluation order.
    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Constant(_) | ExprKind::Parameter(_) | ExprKind::Default => vec![],
            ExprKind::Unary(_, operand) | ExprKind::Convert(_, operand) => vec![operand],
            ExprKind::Binary(op, lhs, rhs) => {
                let mut res = vec![lhs, rhs];
                res.extend(&op.conversion);
                res
            }
            ExprKind::Assign(_, value) | ExprKind::Throw(value) => vec![value],
            ExprKind::Block(_, stmts) => stmts.iter().collect(),
            ExprKind::Conditional(cond, then, otherwise) => vec![cond, then, otherwise],
            ExprKind::Call(_, args) | ExprKind::New(_, args) => args.iter().collect(),
            ExprKind::Index(_, object, args) => std::iter::once(object).chain(args).collect(),
            ExprKind::Lambda(_, body) => vec![body],
            ExprKind::Invoke(target, args) => std::iter::once(target).chain(args).collect(),
        }
    }
}

/// A local variable of a block or a parameter of a lambda.
#[derive(Debug, Clone, PartialEq)]
pub struct Var {
    pub ident: Ident,
    pub ty: TyKind,
}

impl Var {
    pub fn new(name: &str, ty: TyKind) -> Self {
        Var {
            ident: Ident::new(name),
            ty,
        }
    }
}

impl SimplePretty for Var {
    fn pretty(&self) -> Doc {
        Doc::as_string(self.ident)
            .append(Doc::text(":"))
            .append(Doc::space())
            .append(self.ty.pretty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// A value literal.
    Constant(Value),
    /// A reference to a variable: a free parameter of the tree, a block local
    /// or a lambda parameter.
    Parameter(Ident),
    /// The default value of the node's type. With type `Void`, this is the
    /// empty expression.
    Default,
    /// Use of an unary operator.
    Unary(UnOp, Expr),
    /// Use of a binary operator.
    Binary(BinOp, Expr, Expr),
    /// Conversion of the operand to the node's type.
    Convert(ConvertOp, Expr),
    /// Assignment to a variable. Evaluates to the assigned value.
    Assign(Ident, Expr),
    /// A sequence of statements with local variables. Evaluates to the value
    /// of the last statement.
    Block(Vec<Var>, Vec<Expr>),
    /// Conditional expression `cond ? then : otherwise`.
    Conditional(Expr, Expr, Expr),
    /// Raise the error the operand evaluates to.
    Throw(Expr),
    /// Call of a method or static getter. The receiver of instance members is
    /// the first argument.
    Call(Member, Vec<Expr>),
    /// Construction of an object.
    New(Member, Vec<Expr>),
    /// Indexer access `object[args]`.
    Index(Member, Expr, Vec<Expr>),
    /// A function literal.
    Lambda(Vec<Var>, Expr),
    /// Application of a function-typed expression.
    Invoke(Expr, Vec<Expr>),
}

impl SimplePretty for Expr {
    fn pretty(&self) -> Doc {
        let res = match &self.kind {
            ExprKind::Constant(value) => Doc::as_string(value),
            ExprKind::Parameter(ident) => Doc::as_string(ident.name),
            ExprKind::Default => {
                Doc::text("default").append(parens_group(self.ty.pretty()))
            }
            ExprKind::Unary(op, operand) => {
                Doc::text(op.kind.as_str()).append(parens_group(operand.pretty()))
            }
            ExprKind::Binary(op, lhs, rhs) if op.kind == BinOpKind::ArrayIndex => lhs
                .pretty()
                .append(Doc::text("["))
                .append(rhs.pretty())
                .append(Doc::text("]")),
            ExprKind::Binary(op, lhs, rhs) => parens_group(
                lhs.pretty()
                    .append(Doc::space())
                    .append(Doc::text(op.kind.as_str()))
                    .append(Doc::space())
                    .append(rhs.pretty()),
            ),
            ExprKind::Convert(op, operand) => {
                let name = if op.checked { "checked" } else { "convert" };
                Doc::text(name).append(parens_group(
                    self.ty
                        .pretty()
                        .append(Doc::text(","))
                        .append(Doc::line())
                        .append(operand.pretty()),
                ))
            }
            ExprKind::Assign(ident, value) => Doc::as_string(ident.name)
                .append(Doc::text(" ="))
                .append(Doc::line())
                .append(value.pretty()),
            ExprKind::Block(vars, stmts) => {
                let decls = vars.iter().map(|var| {
                    Doc::text("var ")
                        .append(var.pretty())
                        .append(Doc::text(";"))
                });
                let stmts = stmts.iter().map(|stmt| stmt.pretty().append(Doc::text(";")));
                pretty_block(Doc::intersperse(decls.chain(stmts), Doc::hardline()))
            }
            ExprKind::Conditional(cond, then, otherwise) => {
                Doc::text("ite").append(parens_group(pretty_list([cond, then, otherwise])))
            }
            ExprKind::Throw(value) => Doc::text("throw").append(parens_group(value.pretty())),
            ExprKind::Call(member, args) => {
                Doc::as_string(member.name).append(parens_group(pretty_list(args)))
            }
            ExprKind::New(member, args) => Doc::text("new ")
                .append(member.declaring_ty.pretty())
                .append(parens_group(pretty_list(args))),
            ExprKind::Index(_, object, args) => object
                .pretty()
                .append(Doc::text("["))
                .append(pretty_list(args))
                .append(Doc::text("]")),
            ExprKind::Lambda(params, body) => Doc::text("fn")
                .append(parens_group(pretty_list(params)))
                .append(Doc::text(" =>"))
                .append(Doc::line().append(body.pretty()).nest(4)),
            ExprKind::Invoke(target, args) => {
                parens_group(target.pretty()).append(parens_group(pretty_list(args)))
            }
        };
        Doc::group(res)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BinOpKind {
    /// The `+` operator (wrapping addition).
    Add,
    /// Addition that raises an overflow error.
    AddChecked,
    /// The `-` operator (wrapping subtraction).
    Sub,
    /// Subtraction that raises an overflow error.
    SubChecked,
    /// The `*` operator (wrapping multiplication).
    Mul,
    /// Multiplication that raises an overflow error.
    MulChecked,
    /// The `/` operator (division).
    Div,
    /// The `%` operator (remainder).
    Rem,
    /// The `&` operator: bitwise, or non-short-circuiting logical and.
    BitAnd,
    /// The `|` operator: bitwise, or non-short-circuiting logical or.
    BitOr,
    /// The `^` operator.
    BitXor,
    /// The `<<` operator.
    Shl,
    /// The `>>` operator.
    Shr,
    /// The short-circuiting `&&` operator.
    AndAlso,
    /// The short-circuiting `||` operator.
    OrElse,
    /// The `==` operator.
    Eq,
    /// The `!=` operator.
    Ne,
    /// The `<` operator.
    Lt,
    /// The `<=` operator.
    Le,
    /// The `>` operator.
    Gt,
    /// The `>=` operator.
    Ge,
    /// The `??` operator.
    Coalesce,
    /// Element access of an array.
    ArrayIndex,
}

impl BinOpKind {
    pub const ALL: [BinOpKind; 23] = [
        BinOpKind::Add,
        BinOpKind::AddChecked,
        BinOpKind::Sub,
        BinOpKind::SubChecked,
        BinOpKind::Mul,
        BinOpKind::MulChecked,
        BinOpKind::Div,
        BinOpKind::Rem,
        BinOpKind::BitAnd,
        BinOpKind::BitOr,
        BinOpKind::BitXor,
        BinOpKind::Shl,
        BinOpKind::Shr,
        BinOpKind::AndAlso,
        BinOpKind::OrElse,
        BinOpKind::Eq,
        BinOpKind::Ne,
        BinOpKind::Lt,
        BinOpKind::Le,
        BinOpKind::Gt,
        BinOpKind::Ge,
        BinOpKind::Coalesce,
        BinOpKind::ArrayIndex,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::AddChecked => "+!",
            Self::Sub => "-",
            Self::SubChecked => "-!",
            Self::Mul => "*",
            Self::MulChecked => "*!",
            Self::Div => "/",
            Self::Rem => "%",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::AndAlso => "&&",
            Self::OrElse => "||",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Coalesce => "??",
            Self::ArrayIndex => "[]",
        }
    }

    pub fn is_checked(self) -> bool {
        matches!(self, Self::AddChecked | Self::SubChecked | Self::MulChecked)
    }

    pub fn is_short_circuit(self) -> bool {
        matches!(self, Self::AndAlso | Self::OrElse)
    }

    pub fn is_equality(self) -> bool {
        matches!(self, Self::Eq | Self::Ne)
    }

    /// The ordering comparisons `<`, `<=`, `>`, `>=`.
    pub fn is_comparison(self) -> bool {
        matches!(self, Self::Lt | Self::Le | Self::Gt | Self::Ge)
    }

    /// Arithmetic, bitwise and shift operators.
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            Self::Add
                | Self::AddChecked
                | Self::Sub
                | Self::SubChecked
                | Self::Mul
                | Self::MulChecked
                | Self::Div
                | Self::Rem
                | Self::BitAnd
                | Self::BitOr
                | Self::BitXor
                | Self::Shl
                | Self::Shr
        )
    }
}

/// A binary operator together with the user-defined members implementing it.
#[derive(Debug, Clone, PartialEq)]
pub struct BinOp {
    pub kind: BinOpKind,
    /// A user-defined operator. For `AndAlso` and `OrElse` this is the
    /// non-short-circuiting `&` or `|` operator of the type.
    pub method: Option<Member>,
    /// Lifted comparisons and equality return `Bool?` and yield `null` when
    /// an operand is `null`.
    pub lift_to_null: bool,
    /// The user-defined `is_false` (for `AndAlso`) or `is_true` (for
    /// `OrElse`) operator deciding whether the right operand is evaluated.
    pub truth: Option<Member>,
    /// The conversion lambda of `Coalesce`, applied to a non-null left value.
    pub conversion: Option<Expr>,
}

impl BinOp {
    pub fn with_method(kind: BinOpKind, method: Member) -> Self {
        BinOp {
            method: Some(method),
            ..kind.into()
        }
    }

    /// Is this operator lifted over the operand types, i.e. are there
    /// nullable operands that the operator itself does not accept?
    pub fn is_lifted(&self, lhs: &TyKind, rhs: &TyKind) -> bool {
        match self.kind {
            BinOpKind::Coalesce | BinOpKind::ArrayIndex => false,
            _ => is_lifted_operand(&self.method, 0, lhs) || is_lifted_operand(&self.method, 1, rhs),
        }
    }
}

impl From<BinOpKind> for BinOp {
    fn from(kind: BinOpKind) -> Self {
        BinOp {
            kind,
            method: None,
            lift_to_null: false,
            truth: None,
            conversion: None,
        }
    }
}

fn is_lifted_operand(method: &Option<Member>, position: usize, ty: &TyKind) -> bool {
    ty.is_nullable()
        && match method {
            Some(method) => method
                .arg_tys()
                .nth(position)
                .map_or(true, |param| !param.is_nullable()),
            None => true,
        }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum UnOpKind {
    /// Wrapping negation.
    Negate,
    /// Negation that raises an overflow error for the minimum value.
    NegateChecked,
    UnaryPlus,
    /// Logical negation of booleans, ones complement of integers.
    Not,
    OnesComplement,
    /// Wrapping `x + 1`.
    Increment,
    /// Wrapping `x - 1`.
    Decrement,
    IsTrue,
    IsFalse,
    ArrayLength,
}

impl UnOpKind {
    pub const ALL: [UnOpKind; 10] = [
        UnOpKind::Negate,
        UnOpKind::NegateChecked,
        UnOpKind::UnaryPlus,
        UnOpKind::Not,
        UnOpKind::OnesComplement,
        UnOpKind::Increment,
        UnOpKind::Decrement,
        UnOpKind::IsTrue,
        UnOpKind::IsFalse,
        UnOpKind::ArrayLength,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Negate => "-",
            Self::NegateChecked => "-!",
            Self::UnaryPlus => "+",
            Self::Not => "!",
            Self::OnesComplement => "~",
            Self::Increment => "inc",
            Self::Decrement => "dec",
            Self::IsTrue => "istrue",
            Self::IsFalse => "isfalse",
            Self::ArrayLength => "len",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnOp {
    pub kind: UnOpKind,
    pub method: Option<Member>,
}

impl UnOp {
    pub fn with_method(kind: UnOpKind, method: Member) -> Self {
        UnOp {
            kind,
            method: Some(method),
        }
    }

    pub fn is_lifted(&self, operand: &TyKind) -> bool {
        self.kind != UnOpKind::ArrayLength && is_lifted_operand(&self.method, 0, operand)
    }
}

impl From<UnOpKind> for UnOp {
    fn from(kind: UnOpKind) -> Self {
        UnOp { kind, method: None }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConvertOp {
    /// Raise an overflow error instead of truncating.
    pub checked: bool,
    /// A user-defined conversion operator.
    pub method: Option<Member>,
}

impl ConvertOp {
    /// A lifted conversion maps `null` to `null`. Conversions from a
    /// nullable type to a non-nullable type are not lifted.
    pub fn is_lifted(&self, operand: &TyKind, target: &TyKind) -> bool {
        target.is_nullable() && is_lifted_operand(&self.method, 0, operand)
    }
}

/// Utility struct to quickly build expressions for program transformations
/// and tests.
///
/// Methods that infer the type of the resulting node panic when the operands
/// do not fit the operator.
#[derive(Clone, Copy, Default)]
pub struct ExprBuilder;

impl ExprBuilder {
    pub fn new() -> Self {
        ExprBuilder
    }

    fn mk(&self, kind: ExprKind, ty: TyKind) -> Expr {
        Shared::new(ExprData { kind, ty })
    }

    pub fn constant(&self, value: Value, ty: TyKind) -> Expr {
        self.mk(ExprKind::Constant(value), ty)
    }

    /// A literal whose type follows from the value. Panics for `null`,
    /// arrays and objects; use [`ExprBuilder::constant`] for those.
    pub fn lit(&self, value: Value) -> Expr {
        let ty = match &value {
            Value::Unit => TyKind::Void,
            Value::Bool(_) => TyKind::Bool,
            Value::Char(_) => TyKind::Char,
            Value::F32(_) => TyKind::Float(FloatKind::F32),
            Value::F64(_) => TyKind::Float(FloatKind::F64),
            Value::Str(_) => TyKind::Str,
            Value::Fault(_) => TyKind::Exception,
            value => match value.as_int() {
                Some((kind, _)) => TyKind::Int(kind),
                None => panic!("cannot infer the type of literal {}", value),
            },
        };
        self.constant(value, ty)
    }

    pub fn bool_lit(&self, value: bool) -> Expr {
        self.lit(Value::Bool(value))
    }

    pub fn i32_lit(&self, value: i32) -> Expr {
        self.lit(Value::I32(value))
    }

    pub fn int_lit(&self, kind: IntKind, value: i128) -> Expr {
        match Value::from_int(kind, value) {
            Some(value) => self.lit(value),
            None => panic!("{} does not fit into {}", value, kind.as_str()),
        }
    }

    pub fn str_lit(&self, value: &str) -> Expr {
        self.lit(Value::str(value))
    }

    pub fn null(&self, ty: TyKind) -> Expr {
        self.constant(Value::Null, ty)
    }

    pub fn array_lit(&self, element_ty: TyKind, elements: impl IntoIterator<Item = Value>) -> Expr {
        self.constant(Value::array(elements), TyKind::array(element_ty))
    }

    pub fn param(&self, name: &str, ty: TyKind) -> Expr {
        self.mk(ExprKind::Parameter(Ident::new(name)), ty)
    }

    pub fn var(&self, var: &Var) -> Expr {
        self.mk(ExprKind::Parameter(var.ident), var.ty.clone())
    }

    pub fn default(&self, ty: TyKind) -> Expr {
        self.mk(ExprKind::Default, ty)
    }

    pub fn empty(&self) -> Expr {
        self.default(TyKind::Void)
    }

    pub fn unary(&self, op: impl Into<UnOp>, operand: Expr) -> Expr {
        let op = op.into();
        let ty = unary_result_ty(&op, &operand.ty);
        self.unary_typed(op, ty, operand)
    }

    pub fn unary_typed(&self, op: impl Into<UnOp>, ty: TyKind, operand: Expr) -> Expr {
        self.mk(ExprKind::Unary(op.into(), operand), ty)
    }

    pub fn binary(&self, op: impl Into<BinOp>, lhs: Expr, rhs: Expr) -> Expr {
        let op = op.into();
        let ty = binary_result_ty(&op, &lhs.ty, &rhs.ty);
        self.binary_typed(op, ty, lhs, rhs)
    }

    pub fn binary_typed(&self, op: impl Into<BinOp>, ty: TyKind, lhs: Expr, rhs: Expr) -> Expr {
        self.mk(ExprKind::Binary(op.into(), lhs, rhs), ty)
    }

    pub fn convert(&self, ty: TyKind, operand: Expr) -> Expr {
        self.convert_with(ConvertOp::default(), ty, operand)
    }

    pub fn convert_checked(&self, ty: TyKind, operand: Expr) -> Expr {
        let op = ConvertOp {
            checked: true,
            method: None,
        };
        self.convert_with(op, ty, operand)
    }

    pub fn convert_with(&self, op: ConvertOp, ty: TyKind, operand: Expr) -> Expr {
        self.mk(ExprKind::Convert(op, operand), ty)
    }

    pub fn assign(&self, var: &Var, value: Expr) -> Expr {
        self.mk(ExprKind::Assign(var.ident, value), var.ty.clone())
    }

    /// A block typed by its last statement.
    pub fn block(&self, vars: Vec<Var>, stmts: Vec<Expr>) -> Expr {
        let ty = stmts.last().map_or(TyKind::Void, |last| last.ty.clone());
        self.block_typed(ty, vars, stmts)
    }

    pub fn block_typed(&self, ty: TyKind, vars: Vec<Var>, stmts: Vec<Expr>) -> Expr {
        self.mk(ExprKind::Block(vars, stmts), ty)
    }

    pub fn conditional(&self, cond: Expr, then: Expr, otherwise: Expr) -> Expr {
        let ty = then.ty.clone();
        self.mk(ExprKind::Conditional(cond, then, otherwise), ty)
    }

    pub fn throw(&self, ty: TyKind, payload: Expr) -> Expr {
        self.mk(ExprKind::Throw(payload), ty)
    }

    pub fn throw_fault(&self, ty: TyKind, fault: Fault) -> Expr {
        self.throw(ty, self.lit(Value::Fault(fault)))
    }

    pub fn call(&self, member: &Member, args: impl IntoIterator<Item = Expr>) -> Expr {
        let kind = ExprKind::Call(member.clone(), args.into_iter().collect());
        self.mk(kind, member.ret.clone())
    }

    pub fn new_object(&self, member: &Member, args: impl IntoIterator<Item = Expr>) -> Expr {
        let kind = ExprKind::New(member.clone(), args.into_iter().collect());
        self.mk(kind, member.declaring_ty.clone())
    }

    pub fn index(&self, member: &Member, object: Expr, args: impl IntoIterator<Item = Expr>) -> Expr {
        let kind = ExprKind::Index(member.clone(), object, args.into_iter().collect());
        self.mk(kind, member.ret.clone())
    }

    pub fn lambda(&self, params: Vec<Var>, body: Expr) -> Expr {
        let ty = TyKind::Func(
            params.iter().map(|param| param.ty.clone()).collect(),
            Box::new(body.ty.clone()),
        );
        self.mk(ExprKind::Lambda(params, body), ty)
    }

    pub fn invoke(&self, target: Expr, args: impl IntoIterator<Item = Expr>) -> Expr {
        let ty = match &target.ty {
            TyKind::Func(_, ret) => (**ret).clone(),
            ty => panic!("cannot invoke an expression of type {}", ty),
        };
        self.mk(ExprKind::Invoke(target, args.into_iter().collect()), ty)
    }
}

fn unary_result_ty(op: &UnOp, operand: &TyKind) -> TyKind {
    let lifted = op.is_lifted(operand);
    let ty = match (&op.method, op.kind) {
        (Some(method), _) => method.ret.clone(),
        (None, UnOpKind::IsTrue | UnOpKind::IsFalse) => TyKind::Bool,
        (None, UnOpKind::ArrayLength) => TyKind::Int(IntKind::I32),
        (None, _) => operand.non_nullable().clone(),
    };
    if lifted && !ty.is_nullable() {
        TyKind::nullable(ty)
    } else {
        ty
    }
}

fn binary_result_ty(op: &BinOp, lhs: &TyKind, rhs: &TyKind) -> TyKind {
    let lifted = op.is_lifted(lhs, rhs);
    match op.kind {
        BinOpKind::Coalesce => match &op.conversion {
            Some(conversion) => match &conversion.ty {
                TyKind::Func(_, ret) => (**ret).clone(),
                ty => panic!("coalesce conversion has type {}", ty),
            },
            None => rhs.clone(),
        },
        BinOpKind::ArrayIndex => match lhs {
            TyKind::Array(element) => (**element).clone(),
            ty => panic!("cannot index into {}", ty),
        },
        kind if kind.is_equality() || kind.is_comparison() => {
            let ty = match &op.method {
                Some(method) => method.ret.clone(),
                None => TyKind::Bool,
            };
            if lifted && op.lift_to_null {
                TyKind::nullable(ty)
            } else {
                ty
            }
        }
        _ => {
            let ty = match &op.method {
                Some(method) => method.ret.clone(),
                None => lhs.non_nullable().clone(),
            };
            if lifted && !ty.is_nullable() {
                TyKind::nullable(ty)
            } else {
                ty
            }
        }
    }
}

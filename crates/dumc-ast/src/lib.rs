//! dumc-ast — typed AST produced by `dumc-parser` and consumed by `dumc-codegen`.
//!
//! There is exactly one type (`Type::Int64`), so the AST carries no type
//! annotations beyond what the grammar requires for parameters and `dec`
//! bindings. Recursive nodes use `Box` rather than an arena: the AST here
//! is small (one function body at a time) and never cyclic, so the extra
//! indirection-removal an arena buys isn't worth the API surface.

#![forbid(unsafe_code)]

/// The maximum number of parameters a function may declare, or arguments a
/// call may pass — fixed by the System V AMD64 integer-argument registers.
pub const MAX_FUNC_ARGS: usize = 6;

/// The sole value type in the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Int64,
}

/// A named, typed binding: a function parameter or a `dec` target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarType {
    pub name: String,
    pub ty: Type,
}

/// Arithmetic binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// An arithmetic expression: the only expression kind that may be used
/// where a concrete integer value (register) is required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArithExpr {
    Num(i64),
    Ident(String),
    FuncCall { name: String, args: Vec<Expr> },
    Op { op: ArithOp, lhs: Box<ArithExpr>, rhs: Box<ArithExpr> },
    Paren(Box<ArithExpr>),
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Gt,
    Lte,
    Gte,
    Eq,
    Neq,
}

/// `lhs <op> rhs`, a single non-chained infix comparison of two arithmetic
/// expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmpOperation {
    pub op: CmpOp,
    pub lhs: ArithExpr,
    pub rhs: ArithExpr,
}

/// Boolean operators. `Not` is unary; `And`/`Or` are binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
    Not,
}

/// A boolean operation. `rhs` is `None` iff `op == BoolOp::Not`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoolOperation {
    pub op: BoolOp,
    pub lhs: Box<Expr>,
    pub rhs: Option<Box<Expr>>,
}

/// A general expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Arith(ArithExpr),
    Cmp(Box<CmpOperation>),
    Bool(Box<BoolOperation>),
    Paren(Box<Expr>),
}

/// A single statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Declare { name: String, ty: Type, expr: Expr },
    Assign { name: String, expr: Expr },
    Ret(Expr),
    If { cond: Expr, block: Block },
    While { cond: Expr, block: Block },
    Continue,
    Break,
    ExprStmt(Expr),
}

/// A sequence of statements delimited by `{` `}` in the source.
pub type Block = Vec<Statement>;

/// A top-level function declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub args: Vec<VarType>,
    pub body: Block,
}

/// A whole compiled program: an ordered list of functions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Program {
    pub functions: Vec<Function>,
}

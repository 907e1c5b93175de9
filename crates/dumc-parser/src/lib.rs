//! dumc-parser — recursive-descent parser with Pratt-style precedence
//! climbing for arithmetic and boolean expressions.
//!
//! Every `try_*` method either returns `Some` with the lexer cursor advanced
//! past what it consumed, or returns `None` with the cursor restored to its
//! exact pre-call position (see [`Parser::attempt`]). Parsing a full program
//! therefore never leaves the lexer in an inconsistent state even when deep
//! speculative productions fail.

#![forbid(unsafe_code)]

use dumc_ast::*;
use dumc_lexer::{Lexer, TokenKind, TokenValue};
use thiserror::Error;

/// Errors produced while parsing a program.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A required token was not found at the given byte offset.
    #[error("failed to parse token '{expected}' at byte {pos}")]
    UnexpectedToken { expected: TokenKind, pos: usize },
    /// A function or call site passed more than [`MAX_FUNC_ARGS`] arguments.
    #[error("too many arguments (max {MAX_FUNC_ARGS}) at byte {pos}")]
    TooManyArguments { pos: usize },
    /// Parsing could not make further progress before EOF.
    #[error("unable to parse program past byte {pos}")]
    Stuck { pos: usize },
}

/// Parses a complete program from `src`.
pub fn parse_program(src: &str) -> Result<Program, ParseError> {
    let mut parser = Parser::new(src);
    parser.parse_program()
}

struct Parser<'src> {
    lexer: Lexer<'src>,
    /// Furthest-reached expectation failure, used for diagnostics.
    last_error: Option<ParseFailure>,
}

/// Internal candidate diagnostic, tracked by byte position so that the
/// deepest failure across all backtracked attempts wins, regardless of
/// which kind of check produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseFailure {
    UnexpectedToken { expected: TokenKind, pos: usize },
    TooManyArguments { pos: usize },
}

impl ParseFailure {
    fn pos(&self) -> usize {
        match *self {
            ParseFailure::UnexpectedToken { pos, .. } => pos,
            ParseFailure::TooManyArguments { pos } => pos,
        }
    }
}

/// Binding powers. Higher binds tighter. `NOT_PREC` is deliberately above
/// `And`/`Or` so that `!a && b` parses as `(!a) && b`.
const ARITH_MUL_PREC: u8 = 2;
const ARITH_ADD_PREC: u8 = 1;
const BOOL_AND_PREC: u8 = 2;
const BOOL_OR_PREC: u8 = 1;
const BOOL_NOT_PREC: u8 = 3;

impl<'src> Parser<'src> {
    fn new(src: &'src str) -> Self {
        Self { lexer: Lexer::new(src), last_error: None }
    }

    /// Checkpoint helper: runs `f`, and rewinds the lexer to the pre-call
    /// position if it returns `None`.
    fn attempt<T>(&mut self, f: impl FnOnce(&mut Self) -> Option<T>) -> Option<T> {
        let start = self.lexer.position();
        let result = f(self);
        if result.is_none() {
            self.lexer.seek(start);
        }
        result
    }

    fn record_error(&mut self, expected: TokenKind) {
        let pos = self.lexer.position();
        self.consider_error(ParseFailure::UnexpectedToken { expected, pos });
    }

    /// Records a too-many-arguments diagnostic at `pos` (the call or
    /// function-header site, after the offending argument list has been
    /// fully parsed), competing with other recorded failures on depth.
    fn record_error_args(&mut self, pos: usize) {
        self.consider_error(ParseFailure::TooManyArguments { pos });
    }

    fn consider_error(&mut self, candidate: ParseFailure) {
        let deeper = match self.last_error {
            Some(existing) => candidate.pos() >= existing.pos(),
            None => true,
        };
        if deeper {
            self.last_error = Some(candidate);
        }
    }

    /// Requires `kind`, recording a diagnostic on failure.
    fn expect(&mut self, kind: TokenKind) -> Option<()> {
        if self.lexer.try_token(kind) {
            Some(())
        } else {
            self.record_error(kind);
            None
        }
    }

    fn expect_value(&mut self, kind: TokenKind) -> Option<TokenValue> {
        match self.lexer.try_token_value(kind) {
            Some(v) => Some(v),
            None => {
                self.record_error(kind);
                None
            },
        }
    }

    // ───────────────────────────── Atoms ─────────────────────────────

    fn try_type(&mut self) -> Option<Type> {
        if self.lexer.try_token(TokenKind::TypeInt) {
            Some(Type::Int64)
        } else {
            None
        }
    }

    fn try_ident(&mut self) -> Option<String> {
        self.lexer.try_token_value(TokenKind::Ident)?.into_ident()
    }

    fn try_int(&mut self) -> Option<i64> {
        self.lexer.try_token_value(TokenKind::Int)?.into_int()
    }

    fn try_vartype(&mut self) -> Option<VarType> {
        self.attempt(|p| {
            let name = p.try_ident()?;
            p.expect(TokenKind::Colon)?;
            let ty = p.try_type().or_else(|| {
                p.record_error(TokenKind::TypeInt);
                None
            })?;
            Some(VarType { name, ty })
        })
    }

    /// `name(args...)`, parsed as an `ArithExpr::FuncCall`.
    fn try_func_call(&mut self) -> Option<ArithExpr> {
        self.attempt(|p| {
            let name = p.try_ident()?;
            p.expect(TokenKind::ParenL)?;
            let mut args = Vec::new();
            if !p.lexer.try_token(TokenKind::ParenR) {
                args.push(p.try_expr()?);
                while p.lexer.try_token(TokenKind::Comma) {
                    args.push(p.try_expr()?);
                }
                p.expect(TokenKind::ParenR)?;
            }
            if args.len() > MAX_FUNC_ARGS {
                let pos = p.lexer.position();
                p.record_error_args(pos);
                return None;
            }
            Some(ArithExpr::FuncCall { name, args })
        })
    }

    // ─────────────────────── Arithmetic (Pratt) ───────────────────────

    fn arith_atom(&mut self) -> Option<ArithExpr> {
        if let Some(call) = self.try_func_call() {
            return Some(call);
        }
        if let Some(n) = self.attempt(|p| p.try_int()) {
            return Some(ArithExpr::Num(n));
        }
        if let Some(name) = self.attempt(|p| p.try_ident()) {
            return Some(ArithExpr::Ident(name));
        }
        self.attempt(|p| {
            p.expect(TokenKind::ParenL)?;
            let inner = p.parse_arith_bp(0)?;
            p.expect(TokenKind::ParenR)?;
            Some(ArithExpr::Paren(Box::new(inner)))
        })
    }

    fn peek_arith_infix(&mut self) -> Option<(ArithOp, u8)> {
        for (kind, op, prec) in [
            (TokenKind::OpMul, ArithOp::Mul, ARITH_MUL_PREC),
            (TokenKind::OpDiv, ArithOp::Div, ARITH_MUL_PREC),
            (TokenKind::OpAdd, ArithOp::Add, ARITH_ADD_PREC),
            (TokenKind::OpSub, ArithOp::Sub, ARITH_ADD_PREC),
        ] {
            if self.lexer.try_token(kind) {
                return Some((op, prec));
            }
        }
        None
    }

    fn parse_arith_bp(&mut self, min_prec: u8) -> Option<ArithExpr> {
        let mut lhs = self.arith_atom()?;
        loop {
            let checkpoint = self.lexer.position();
            let Some((op, prec)) = self.peek_arith_infix() else { break };
            if prec <= min_prec {
                self.lexer.seek(checkpoint);
                break;
            }
            let rhs = self.parse_arith_bp(prec)?;
            lhs = ArithExpr::Op { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Some(lhs)
    }

    // ───────────────────────── Comparison ─────────────────────────

    fn try_cmp_op(&mut self) -> Option<CmpOp> {
        // Multi-character forms are tried first to avoid `<`/`>` aliasing.
        for (kind, op) in [
            (TokenKind::CmpEq, CmpOp::Eq),
            (TokenKind::CmpNeq, CmpOp::Neq),
            (TokenKind::CmpLte, CmpOp::Lte),
            (TokenKind::CmpGte, CmpOp::Gte),
            (TokenKind::CmpLt, CmpOp::Lt),
            (TokenKind::CmpGt, CmpOp::Gt),
        ] {
            if self.lexer.try_token(kind) {
                return Some(op);
            }
        }
        None
    }

    // ───────────────────────── Boolean (Pratt) ─────────────────────────

    fn bool_atom(&mut self) -> Option<Expr> {
        if let Some(e) = self.attempt(|p| {
            p.expect(TokenKind::ParenL)?;
            let inner = p.try_expr()?;
            p.expect(TokenKind::ParenR)?;
            Some(Expr::Paren(Box::new(inner)))
        }) {
            return Some(e);
        }
        if let Some(e) = self.attempt(|p| {
            p.expect(TokenKind::LogNot)?;
            let operand = p.parse_bool_bp(BOOL_NOT_PREC)?;
            Some(Expr::Bool(Box::new(BoolOperation {
                op: BoolOp::Not,
                lhs: Box::new(operand),
                rhs: None,
            })))
        }) {
            return Some(e);
        }
        self.attempt(|p| {
            let lhs = p.parse_arith_bp(0)?;
            if let Some(op) = p.try_cmp_op() {
                let rhs = p.parse_arith_bp(0)?;
                return Some(Expr::Cmp(Box::new(CmpOperation { op, lhs, rhs })));
            }
            Some(Expr::Arith(lhs))
        })
    }

    fn peek_bool_infix(&mut self) -> Option<(BoolOp, u8)> {
        if self.lexer.try_token(TokenKind::LogAnd) {
            return Some((BoolOp::And, BOOL_AND_PREC));
        }
        if self.lexer.try_token(TokenKind::LogOr) {
            return Some((BoolOp::Or, BOOL_OR_PREC));
        }
        None
    }

    fn parse_bool_bp(&mut self, min_prec: u8) -> Option<Expr> {
        let mut lhs = self.bool_atom()?;
        loop {
            let checkpoint = self.lexer.position();
            let Some((op, prec)) = self.peek_bool_infix() else { break };
            if prec <= min_prec {
                self.lexer.seek(checkpoint);
                break;
            }
            let rhs = self.parse_bool_bp(prec)?;
            lhs = Expr::Bool(Box::new(BoolOperation {
                op,
                lhs: Box::new(lhs),
                rhs: Some(Box::new(rhs)),
            }));
        }
        Some(lhs)
    }

    fn try_expr(&mut self) -> Option<Expr> {
        self.parse_bool_bp(0)
    }

    // ───────────────────────────── Statements ─────────────────────────────

    fn try_declare(&mut self) -> Option<Statement> {
        self.attempt(|p| {
            p.expect(TokenKind::KwDec)?;
            let vt = p.try_vartype()?;
            p.expect(TokenKind::OpEq)?;
            let expr = p.try_expr()?;
            Some(Statement::Declare { name: vt.name, ty: vt.ty, expr })
        })
    }

    fn try_ret(&mut self) -> Option<Statement> {
        self.attempt(|p| {
            p.expect(TokenKind::KwRet)?;
            let expr = p.try_expr()?;
            Some(Statement::Ret(expr))
        })
    }

    fn try_assign(&mut self) -> Option<Statement> {
        self.attempt(|p| {
            let name = p.try_ident()?;
            p.expect(TokenKind::OpEq)?;
            let expr = p.try_expr()?;
            Some(Statement::Assign { name, expr })
        })
    }

    fn try_if(&mut self) -> Option<Statement> {
        self.attempt(|p| {
            p.expect(TokenKind::KwIf)?;
            let cond = p.try_expr()?;
            let block = p.try_block()?;
            Some(Statement::If { cond, block })
        })
    }

    fn try_while(&mut self) -> Option<Statement> {
        self.attempt(|p| {
            p.expect(TokenKind::KwWhile)?;
            let cond = p.try_expr()?;
            let block = p.try_block()?;
            Some(Statement::While { cond, block })
        })
    }

    fn try_statement(&mut self) -> Option<Statement> {
        if let Some(s) = self.try_declare() {
            return Some(s);
        }
        if let Some(s) = self.try_ret() {
            return Some(s);
        }
        if let Some(s) = self.try_assign() {
            return Some(s);
        }
        if let Some(s) = self.try_if() {
            return Some(s);
        }
        if let Some(s) = self.try_while() {
            return Some(s);
        }
        if self.attempt(|p| p.expect(TokenKind::KwCont)).is_some() {
            return Some(Statement::Continue);
        }
        if self.attempt(|p| p.expect(TokenKind::KwBreak)).is_some() {
            return Some(Statement::Break);
        }
        self.attempt(|p| p.try_expr().map(Statement::ExprStmt))
    }

    fn try_block(&mut self) -> Option<Block> {
        self.attempt(|p| {
            p.expect(TokenKind::BraceL)?;
            let mut stmts = Vec::new();
            while !p.lexer.try_token(TokenKind::BraceR) {
                stmts.push(p.try_statement()?);
            }
            Some(stmts)
        })
    }

    // ───────────────────────────── Functions ─────────────────────────────

    fn try_function(&mut self) -> Option<Function> {
        self.attempt(|p| {
            p.expect(TokenKind::At)?;
            let name = p.try_ident()?;
            p.expect(TokenKind::ParenL)?;
            let mut args = Vec::new();
            if !p.lexer.try_token(TokenKind::ParenR) {
                args.push(p.try_vartype()?);
                while p.lexer.try_token(TokenKind::Comma) {
                    args.push(p.try_vartype()?);
                }
                p.expect(TokenKind::ParenR)?;
            }
            if args.len() > MAX_FUNC_ARGS {
                let pos = p.lexer.position();
                p.record_error_args(pos);
                return None;
            }
            let body = p.try_block()?;
            Some(Function { name, args, body })
        })
    }

    fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut functions = Vec::new();
        loop {
            if self.lexer.try_token(TokenKind::Eof) {
                break;
            }
            match self.try_function() {
                Some(f) => {
                    log::debug!("parsed function '{}' ({} statement(s))", f.name, f.body.len());
                    functions.push(f);
                },
                None => {
                    return Err(match self.last_error {
                        Some(ParseFailure::UnexpectedToken { expected, pos }) => {
                            ParseError::UnexpectedToken { expected, pos }
                        },
                        Some(ParseFailure::TooManyArguments { pos }) => {
                            ParseError::TooManyArguments { pos }
                        },
                        None => ParseError::Stuck { pos: self.lexer.position() },
                    });
                },
            }
        }
        Ok(Program { functions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_function() {
        let prog = parse_program("@f(){ ret 1 + 2 * 3 }").unwrap();
        assert_eq!(prog.functions.len(), 1);
        assert_eq!(prog.functions[0].name, "f");
        assert_eq!(prog.functions[0].body.len(), 1);
    }

    #[test]
    fn precedence_is_left_leaning_for_ties() {
        let prog = parse_program("@f(){ ret 1 - 2 - 3 }").unwrap();
        match &prog.functions[0].body[0] {
            Statement::Ret(Expr::Arith(ArithExpr::Op { op: ArithOp::Sub, lhs, rhs })) => {
                // (1 - 2) - 3: rhs is the literal 3, lhs is itself a Sub
                assert_eq!(**rhs, ArithExpr::Num(3));
                assert!(matches!(**lhs, ArithExpr::Op { op: ArithOp::Sub, .. }));
            },
            other => panic!("unexpected ast: {other:?}"),
        }
    }

    #[test]
    fn declare_assign_and_while_with_short_circuit() {
        let src = "@f(n: int){ dec i: int = 0 while n > 3 && i <= 10 { n = n - 1 i = i + 1 if n == 5 { n = n - 1 continue } if n != 5 { break } } ret i }";
        let prog = parse_program(src).unwrap();
        assert_eq!(prog.functions.len(), 1);
        assert_eq!(prog.functions[0].args, vec![VarType { name: "n".into(), ty: Type::Int64 }]);
    }

    #[test]
    fn multi_function_call() {
        let prog = parse_program("@add(a: int, b: int){ ret a + b } @f(){ ret add(2, 40) }").unwrap();
        assert_eq!(prog.functions.len(), 2);
    }

    #[test]
    fn not_and_subtraction_as_negate() {
        let prog = parse_program("@f(n: int){ if !(n < 0) { ret n } ret 0 - n }").unwrap();
        match &prog.functions[0].body[0] {
            Statement::If { cond, .. } => {
                assert!(matches!(cond, Expr::Bool(b) if b.op == BoolOp::Not));
            },
            other => panic!("unexpected ast: {other:?}"),
        }
    }

    #[test]
    fn seventh_argument_is_rejected() {
        let src = "@f(a: int, b: int, c: int, d: int, e: int, g: int, h: int){ ret 0 }";
        let err = parse_program(src).unwrap_err();
        assert!(matches!(err, ParseError::TooManyArguments { .. }));
    }

    #[test]
    fn seventh_call_argument_is_rejected() {
        let src = "@f(){ ret g(1, 2, 3, 4, 5, 6, 7) }";
        let err = parse_program(src).unwrap_err();
        assert!(matches!(err, ParseError::TooManyArguments { .. }));
    }

    #[test]
    fn rewinds_fully_on_failed_statement_inside_block() {
        // A stray ']' can't start any statement; this must surface a ParseError,
        // not panic or loop forever.
        let err = parse_program("@f(){ ] }").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedToken { .. } | ParseError::Stuck { .. }));
    }

    #[test]
    fn continue_outside_loop_still_parses() {
        // Parsing accepts it syntactically; codegen is responsible for
        // rejecting it as an unresolved jump.
        let prog = parse_program("@f(){ continue }").unwrap();
        assert_eq!(prog.functions[0].body[0], Statement::Continue);
    }
}

//! Walks the AST and emits machine code for an entire program.

use std::collections::HashMap;

use dumc_ast::{ArithExpr, ArithOp, Block, BoolOp, CmpOp, Expr, Function, Program, Statement};

use crate::encoder::{Cc, Encoder, Reg, PARAM_REGS, PRESERVED_REGS};
use crate::jumptable::{JumpTable, Label, OpKind};
use crate::regalloc::RegAlloc;
use crate::scope::Scope;
use crate::{CodegenError, SemanticError};

/// One source function's emitted extent in `.text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledFunction {
    pub name: String,
    pub offset: usize,
    pub size: usize,
}

/// The result of compiling a whole program: raw machine code plus the
/// function symbols an object sink turns into `.symtab` entries.
#[derive(Debug, Clone, Default)]
pub struct CompiledProgram {
    pub text: Vec<u8>,
    pub functions: Vec<CompiledFunction>,
}

/// Lowers every function in `program` to machine code, in source order.
pub fn compile_program(program: &Program) -> Result<CompiledProgram, CodegenError> {
    let mut cg = Codegen::new();
    for function in &program.functions {
        cg.compile_function(function)?;
    }
    Ok(CompiledProgram { text: cg.encoder.into_bytes(), functions: cg.functions })
}

struct Codegen {
    encoder: Encoder,
    regalloc: RegAlloc,
    functions: Vec<CompiledFunction>,
    /// name -> (start offset in .text), populated once a function's codegen
    /// completes. A function may therefore only call functions that appear
    /// earlier in the program, matching the original single-pass compiler.
    symbols: HashMap<String, usize>,
}

impl Codegen {
    fn new() -> Self {
        Self {
            encoder: Encoder::new(),
            regalloc: RegAlloc::new(),
            functions: Vec::new(),
            symbols: HashMap::new(),
        }
    }

    fn compile_function(&mut self, function: &Function) -> Result<(), CodegenError> {
        let start = self.encoder.position();
        log::debug!("codegen: begin function '{}' at .text+{start}", function.name);
        let mut scope = Scope::new();

        self.encoder.push(Reg::Rbp);
        self.encoder.mov_reg_reg(Reg::Rbp, Reg::Rsp);

        for reg in PRESERVED_REGS {
            let entry = scope.insert(&preserved_slot_name(reg), 8)?;
            self.encoder.mov_reg_to_mem(entry.position, reg);
        }
        for (i, vartype) in function.args.iter().enumerate() {
            let entry = scope.insert_immutable(&vartype.name, 8)?;
            self.encoder.mov_reg_to_mem(entry.position, PARAM_REGS[i]);
        }

        // Pre-pass: sum the space every `dec` in the body will need so the
        // frame can be carved out once, before any of those slots actually
        // exist. The real `Scope::insert` calls happen later, during body
        // lowering, and consume exactly this much additional frame space.
        let reserved_before_decls = scope.frame_size() - 8;
        let declared_bytes = count_declared_bytes(&function.body);
        self.encoder.sub_reg_imm32(Reg::Rsp, (reserved_before_decls + declared_bytes) as i32);

        let mut fn_table = JumpTable::new();
        self.lower_block(&function.body, &mut scope, &mut fn_table)?;

        let ret_target = self.encoder.position();
        for reg in PRESERVED_REGS {
            let entry = *scope.get(&preserved_slot_name(reg)).expect("preserved slot always present");
            self.encoder.mov_mem_to_reg(reg, entry.position);
        }
        self.encoder.mov_reg_reg(Reg::Rsp, Reg::Rbp);
        self.encoder.pop(Reg::Rbp);
        self.encoder.ret();

        fn_table.resolve(Label::Ret, ret_target, &mut self.encoder);
        if !fn_table.is_empty() {
            return Err(CodegenError::UnresolvedJump);
        }

        let size = self.encoder.position() - start;
        self.symbols.insert(function.name.clone(), start);
        self.functions.push(CompiledFunction { name: function.name.clone(), offset: start, size });
        log::debug!("codegen: end function '{}' ({size} bytes)", function.name);
        Ok(())
    }

    fn lower_block(&mut self, block: &Block, scope: &mut Scope, table: &mut JumpTable) -> Result<(), CodegenError> {
        let mut declared = Vec::new();
        for stmt in block {
            self.lower_statement(stmt, scope, table, &mut declared)?;
        }
        for name in declared {
            scope.remove(&name);
        }
        Ok(())
    }

    fn lower_statement(
        &mut self,
        stmt: &Statement,
        scope: &mut Scope,
        table: &mut JumpTable,
        declared: &mut Vec<String>,
    ) -> Result<(), CodegenError> {
        match stmt {
            Statement::Declare { name, expr, .. } => {
                self.regalloc.reset();
                let arith = as_rvalue(expr)?;
                self.eval_arith_into(arith, Reg::Rax, scope)?;
                let entry = scope.insert(name, 8)?;
                self.encoder.mov_reg_to_mem(entry.position, Reg::Rax);
                declared.push(name.clone());
            },
            Statement::Assign { name, expr } => {
                self.regalloc.reset();
                let entry = *scope
                    .get(name)
                    .ok_or_else(|| SemanticError::UndeclaredIdentifier(name.clone()))?;
                if entry.immutable {
                    return Err(SemanticError::AssignToImmutable(name.clone()).into());
                }
                let arith = as_rvalue(expr)?;
                self.eval_arith_into(arith, Reg::Rax, scope)?;
                self.encoder.mov_reg_to_mem(entry.position, Reg::Rax);
            },
            Statement::Ret(expr) => {
                self.regalloc.reset();
                let arith = as_rvalue(expr)?;
                self.eval_arith_into(arith, Reg::Rax, scope)?;
                let site = self.encoder.jmp_rel32();
                table.insert(site, Label::Ret, OpKind::Jmp);
            },
            Statement::If { cond, block } => {
                self.regalloc.reset();
                let mut cond_table = JumpTable::new();
                self.lower_cond(cond, Label::BlockStart, Label::BlockEnd, &mut cond_table, scope, 1)?;
                cond_table.resolve(Label::BlockStart, self.encoder.position(), &mut self.encoder);
                self.lower_block(block, scope, table)?;
                cond_table.resolve(Label::BlockEnd, self.encoder.position(), &mut self.encoder);
            },
            Statement::While { cond, block } => {
                let top = self.encoder.position();
                let mut while_table = JumpTable::new();
                self.regalloc.reset();
                self.lower_cond(cond, Label::BlockStart, Label::BlockEnd, &mut while_table, scope, 1)?;
                while_table.resolve(Label::BlockStart, self.encoder.position(), &mut self.encoder);
                self.lower_block(block, scope, &mut while_table)?;
                let backedge = self.encoder.jmp_rel32();
                while_table.insert(backedge, Label::LoopStart, OpKind::Jmp);
                while_table.resolve(Label::LoopStart, top, &mut self.encoder);
                while_table.resolve(Label::BlockEnd, self.encoder.position(), &mut self.encoder);
                while_table.merge(table);
            },
            Statement::Continue => {
                let site = self.encoder.jmp_rel32();
                table.insert(site, Label::LoopStart, OpKind::Jmp);
            },
            Statement::Break => {
                let site = self.encoder.jmp_rel32();
                table.insert(site, Label::BlockEnd, OpKind::Jmp);
            },
            Statement::ExprStmt(expr) => {
                self.regalloc.reset();
                match as_rvalue(expr) {
                    Ok(arith) => {
                        let r = self.eval_arith(arith, scope)?;
                        self.regalloc.release(r);
                    },
                    Err(_) => return Err(CodegenError::Unsupported("non-arithmetic expression statement")),
                }
            },
        }
        Ok(())
    }

    /// Lowers a boolean/comparison expression to control flow: on entry the
    /// cursor is wherever the caller left it; on exit exactly one of
    /// `true_label`/`false_label` will have been jumped to, with both
    /// fixups registered in `table`.
    fn lower_cond(
        &mut self,
        expr: &Expr,
        true_label: Label,
        false_label: Label,
        table: &mut JumpTable,
        scope: &Scope,
        level: u32,
    ) -> Result<(), CodegenError> {
        match expr {
            Expr::Paren(inner) => self.lower_cond(inner, true_label, false_label, table, scope, level),
            Expr::Bool(b) => match b.op {
                BoolOp::And => {
                    let mid = Label::NextCond(2 * level);
                    self.lower_cond(&b.lhs, mid, false_label, table, scope, 2 * level)?;
                    table.resolve(mid, self.encoder.position(), &mut self.encoder);
                    let rhs = b.rhs.as_ref().expect("And always has a right-hand side");
                    self.lower_cond(rhs, true_label, false_label, table, scope, 2 * level + 1)
                },
                BoolOp::Or => {
                    let mid = Label::NextCond(2 * level);
                    self.lower_cond(&b.lhs, true_label, mid, table, scope, 2 * level)?;
                    table.resolve(mid, self.encoder.position(), &mut self.encoder);
                    let rhs = b.rhs.as_ref().expect("Or always has a right-hand side");
                    self.lower_cond(rhs, true_label, false_label, table, scope, 2 * level + 1)
                },
                BoolOp::Not => self.lower_cond(&b.lhs, false_label, true_label, table, scope, level),
            },
            Expr::Cmp(c) => {
                self.regalloc.reset();
                self.eval_arith_into(&c.lhs, Reg::Rax, scope)?;
                self.eval_arith_into(&c.rhs, Reg::Rbx, scope)?;
                self.encoder.cmp_reg_reg(Reg::Rax, Reg::Rbx);
                let t_site = self.encoder.jcc_rel32(cc_for(c.op));
                table.insert(t_site, true_label, OpKind::Jcc);
                let f_site = self.encoder.jmp_rel32();
                table.insert(f_site, false_label, OpKind::Jmp);
                Ok(())
            },
            Expr::Arith(a) => {
                self.regalloc.reset();
                self.eval_arith_into(a, Reg::Rax, scope)?;
                self.encoder.cmp_reg_imm8(Reg::Rax, 0);
                let t_site = self.encoder.jcc_rel32(Cc::Ne);
                table.insert(t_site, true_label, OpKind::Jcc);
                let f_site = self.encoder.jmp_rel32();
                table.insert(f_site, false_label, OpKind::Jmp);
                Ok(())
            },
        }
    }

    fn eval_arith(&mut self, expr: &ArithExpr, scope: &Scope) -> Result<Reg, CodegenError> {
        match expr {
            ArithExpr::Num(n) => {
                let r = self.regalloc.next_reg()?;
                self.encoder.mov_imm64(r, *n);
                Ok(r)
            },
            ArithExpr::Ident(name) => {
                let entry = scope
                    .get(name)
                    .ok_or_else(|| SemanticError::UndeclaredIdentifier(name.clone()))?;
                let r = self.regalloc.next_reg()?;
                self.encoder.mov_mem_to_reg(r, entry.position);
                Ok(r)
            },
            ArithExpr::Paren(inner) => {
                let r = self.regalloc.next_reg()?;
                self.eval_arith_into(inner, r, scope)?;
                Ok(r)
            },
            ArithExpr::Op { op, lhs, rhs } => {
                let lhsr = self.eval_arith(lhs, scope)?;
                let rhsr = self.eval_arith(rhs, scope)?;
                match op {
                    ArithOp::Add => self.encoder.add_reg_reg(lhsr, rhsr),
                    ArithOp::Sub => self.encoder.sub_reg_reg(lhsr, rhsr),
                    ArithOp::Mul => self.encoder.imul_reg_reg(lhsr, rhsr),
                    ArithOp::Div => {
                        // Unsigned divide: RDX:RAX / rhsr, quotient in RAX.
                        self.encoder.mov_imm64(Reg::Rdx, 0);
                        self.encoder.mov_reg_reg(Reg::Rax, lhsr);
                        self.encoder.div_reg(rhsr);
                        self.encoder.mov_reg_reg(lhsr, Reg::Rax);
                    },
                }
                self.regalloc.release(rhsr);
                Ok(lhsr)
            },
            ArithExpr::FuncCall { name, args } => self.eval_call(name, args, scope),
        }
    }

    fn eval_arith_into(&mut self, expr: &ArithExpr, target: Reg, scope: &Scope) -> Result<(), CodegenError> {
        let r = self.eval_arith(expr, scope)?;
        if r != target {
            self.encoder.mov_reg_reg(target, r);
            self.regalloc.release(r);
        }
        Ok(())
    }

    /// Lowers each argument directly into its ABI register, claiming all of
    /// `PARAM_REGS[0..args.len()]` up front so an earlier argument's move
    /// can never clobber a later argument's value before it is consumed.
    ///
    /// A call nested inside one of these arguments that needs the *same*
    /// physical argument register this call already claimed (e.g. a
    /// register-starved `f(g(1), 2)`) is rejected as register exhaustion
    /// rather than resolved by spilling — consistent with this compiler
    /// having no spill path at all.
    fn eval_call(&mut self, name: &str, args: &[Expr], scope: &Scope) -> Result<Reg, CodegenError> {
        for i in 0..args.len() {
            self.regalloc.claim(PARAM_REGS[i])?;
        }
        for (i, arg) in args.iter().enumerate() {
            let arith = as_rvalue(arg)?;
            self.eval_arith_into(arith, PARAM_REGS[i], scope)?;
        }
        let offset = *self
            .symbols
            .get(name)
            .ok_or_else(|| SemanticError::UnknownFunction(name.to_owned()))?;
        let after_instr = self.encoder.position() + 5;
        self.encoder.call_rel32((offset as i64 - after_instr as i64) as i32);
        for i in 0..args.len() {
            self.regalloc.release(PARAM_REGS[i]);
        }
        Ok(Reg::Rax)
    }
}

fn cc_for(op: CmpOp) -> Cc {
    match op {
        CmpOp::Eq => Cc::E,
        CmpOp::Neq => Cc::Ne,
        CmpOp::Lt => Cc::L,
        CmpOp::Gte => Cc::Ge,
        CmpOp::Gt => Cc::G,
        CmpOp::Lte => Cc::Le,
    }
}

/// Unwraps parens to find the `ArithExpr` an r-value position requires.
/// `Cmp`/`Bool` values never reach here: the grammar only permits them as
/// conditions, never as a `dec`/assign/`ret`/call-argument value.
fn as_rvalue(expr: &Expr) -> Result<&ArithExpr, CodegenError> {
    match expr {
        Expr::Arith(a) => Ok(a),
        Expr::Paren(inner) => as_rvalue(inner),
        Expr::Cmp(_) | Expr::Bool(_) => {
            Err(CodegenError::Unsupported("comparison or boolean value used where an integer is required"))
        },
    }
}

fn preserved_slot_name(reg: Reg) -> String {
    let suffix = match reg {
        Reg::Rbx => "rbx",
        Reg::R12 => "r12",
        Reg::R13 => "r13",
        Reg::R14 => "r14",
        Reg::R15 => "r15",
        other => unreachable!("PRESERVED_REGS never contains {other:?}"),
    };
    // A leading space can never collide with a user identifier, which must
    // match `[A-Za-z_]+`.
    format!(" {suffix}")
}

fn count_declared_bytes(block: &Block) -> u32 {
    let mut total = 0;
    for stmt in block {
        match stmt {
            Statement::Declare { .. } => total += 8,
            Statement::If { block, .. } => total += count_declared_bytes(block),
            Statement::While { block, .. } => total += count_declared_bytes(block),
            _ => {},
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use dumc_ast::{Type, VarType};

    fn nested_adds(var: &str, depth: usize) -> ArithExpr {
        let mut e = ArithExpr::Ident(var.to_string());
        for _ in 0..depth {
            e = ArithExpr::Op {
                op: ArithOp::Add,
                lhs: Box::new(ArithExpr::Ident(var.to_string())),
                rhs: Box::new(e),
            };
        }
        e
    }

    #[test]
    fn precedence_program_ends_in_ret() {
        let program = Program {
            functions: vec![Function {
                name: "f".into(),
                args: vec![],
                body: vec![Statement::Ret(Expr::Arith(ArithExpr::Op {
                    op: ArithOp::Add,
                    lhs: Box::new(ArithExpr::Num(1)),
                    rhs: Box::new(ArithExpr::Op {
                        op: ArithOp::Mul,
                        lhs: Box::new(ArithExpr::Num(2)),
                        rhs: Box::new(ArithExpr::Num(3)),
                    }),
                }))],
            }],
        };
        let compiled = compile_program(&program).unwrap();
        assert_eq!(compiled.functions.len(), 1);
        assert_eq!(*compiled.text.last().unwrap(), 0xC3);
    }

    #[test]
    fn multi_function_call_resolves_to_earlier_function() {
        let program = Program {
            functions: vec![
                Function {
                    name: "add".into(),
                    args: vec![
                        VarType { name: "a".into(), ty: Type::Int64 },
                        VarType { name: "b".into(), ty: Type::Int64 },
                    ],
                    body: vec![Statement::Ret(Expr::Arith(ArithExpr::Op {
                        op: ArithOp::Add,
                        lhs: Box::new(ArithExpr::Ident("a".into())),
                        rhs: Box::new(ArithExpr::Ident("b".into())),
                    }))],
                },
                Function {
                    name: "f".into(),
                    args: vec![],
                    body: vec![Statement::Ret(Expr::Arith(ArithExpr::FuncCall {
                        name: "add".into(),
                        args: vec![Expr::Arith(ArithExpr::Num(2)), Expr::Arith(ArithExpr::Num(40))],
                    }))],
                },
            ],
        };
        let compiled = compile_program(&program).unwrap();
        assert_eq!(compiled.functions.len(), 2);
    }

    #[test]
    fn calling_an_undefined_function_is_a_semantic_error() {
        let program = Program {
            functions: vec![Function {
                name: "f".into(),
                args: vec![],
                body: vec![Statement::Ret(Expr::Arith(ArithExpr::FuncCall { name: "missing".into(), args: vec![] }))],
            }],
        };
        let err = compile_program(&program).unwrap_err();
        assert!(matches!(err, CodegenError::Semantic(SemanticError::UnknownFunction(_))));
    }

    #[test]
    fn assigning_to_a_parameter_is_rejected() {
        let program = Program {
            functions: vec![Function {
                name: "f".into(),
                args: vec![VarType { name: "n".into(), ty: Type::Int64 }],
                body: vec![
                    Statement::Assign { name: "n".into(), expr: Expr::Arith(ArithExpr::Num(1)) },
                    Statement::Ret(Expr::Arith(ArithExpr::Ident("n".into()))),
                ],
            }],
        };
        let err = compile_program(&program).unwrap_err();
        assert!(matches!(err, CodegenError::Semantic(SemanticError::AssignToImmutable(_))));
    }

    #[test]
    fn break_outside_a_loop_is_unresolved() {
        let program = Program {
            functions: vec![Function { name: "f".into(), args: vec![], body: vec![Statement::Break] }],
        };
        let err = compile_program(&program).unwrap_err();
        assert!(matches!(err, CodegenError::UnresolvedJump));
    }

    #[test]
    fn deeply_right_nested_expression_exhausts_scratch_registers() {
        let program = Program {
            functions: vec![Function {
                name: "f".into(),
                args: vec![VarType { name: "n".into(), ty: Type::Int64 }],
                body: vec![Statement::Ret(Expr::Arith(nested_adds("n", 20)))],
            }],
        };
        let err = compile_program(&program).unwrap_err();
        assert!(matches!(err, CodegenError::OutOfRegisters));
    }

    #[test]
    fn while_loop_with_break_and_continue_resolves_cleanly() {
        // while n > 3 { n = n - 1 if n == 5 { continue } if n != 5 { break } }
        let program = Program {
            functions: vec![Function {
                name: "f".into(),
                args: vec![VarType { name: "n".into(), ty: Type::Int64 }],
                body: vec![
                    Statement::While {
                        cond: Expr::Cmp(Box::new(dumc_ast::CmpOperation {
                            op: CmpOp::Gt,
                            lhs: ArithExpr::Ident("n".into()),
                            rhs: ArithExpr::Num(3),
                        })),
                        block: vec![
                            Statement::Assign {
                                name: "n".into(),
                                expr: Expr::Arith(ArithExpr::Op {
                                    op: ArithOp::Sub,
                                    lhs: Box::new(ArithExpr::Ident("n".into())),
                                    rhs: Box::new(ArithExpr::Num(1)),
                                }),
                            },
                            Statement::If {
                                cond: Expr::Cmp(Box::new(dumc_ast::CmpOperation {
                                    op: CmpOp::Eq,
                                    lhs: ArithExpr::Ident("n".into()),
                                    rhs: ArithExpr::Num(5),
                                })),
                                block: vec![Statement::Continue],
                            },
                            Statement::If {
                                cond: Expr::Cmp(Box::new(dumc_ast::CmpOperation {
                                    op: CmpOp::Neq,
                                    lhs: ArithExpr::Ident("n".into()),
                                    rhs: ArithExpr::Num(5),
                                })),
                                block: vec![Statement::Break],
                            },
                        ],
                    },
                    Statement::Ret(Expr::Arith(ArithExpr::Ident("n".into()))),
                ],
            }],
        };
        let compiled = compile_program(&program).unwrap();
        assert_eq!(compiled.functions.len(), 1);
    }
}

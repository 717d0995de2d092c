// Surface-form desugaring, run before type checking.
// Rewrites: `#x` to `stdr.len(x)`, `stdr.writef/readf/str` prefixes to
// bare calls, variadic writef/readf argument lists into a single tuple,
// `move(x)` into a dedicated Move node, and non-block function bodies
// into single-statement blocks. Pure AST-to-AST and idempotent.

use yis_ast::{
    Decl, DeclKind, Expr, ExprKind, FunDecl, IfArm, IfExprArm, MatchArm, Module, Program, Stmt,
    StmtKind, UnaryOp,
};

fn ident(name: &str, line: u32, col: u32) -> Expr {
    Expr::new(ExprKind::Ident(name.to_string()), line, col)
}

fn is_ident(e: &Expr, name: &str) -> bool {
    matches!(&e.kind, ExprKind::Ident(n) if n == name)
}

fn lower_expr(e: &Expr) -> Expr {
    // #x  =>  stdr.len(x)
    if let ExprKind::Unary {
        op: UnaryOp::Len,
        expr,
    } = &e.kind
    {
        let inner = lower_expr(expr);
        let member = Expr::new(
            ExprKind::Member {
                base: Box::new(ident("stdr", e.line, e.col)),
                name: "len".to_string(),
            },
            e.line,
            e.col,
        );
        return Expr::new(
            ExprKind::Call {
                callee: Box::new(member),
                args: vec![inner],
            },
            e.line,
            e.col,
        );
    }

    // stdr.writef / stdr.readf / stdr.str  =>  bare calls
    if let ExprKind::Call { callee, args } = &e.kind {
        if let ExprKind::Member { base, name } = &callee.kind {
            if is_ident(base, "stdr") && matches!(name.as_str(), "writef" | "readf" | "str") {
                let bare = Expr::new(
                    ExprKind::Call {
                        callee: Box::new(ident(name, callee.line, callee.col)),
                        args: args.clone(),
                    },
                    e.line,
                    e.col,
                );
                return lower_expr(&bare);
            }
        }
    }

    // writef(fmt, a, b)  =>  writef(fmt, (a, b)); already-packed calls
    // pass through unchanged.
    if let ExprKind::Call { callee, args } = &e.kind {
        if is_ident(callee, "writef") || is_ident(callee, "readf") {
            if args.is_empty() {
                return Expr::new(
                    ExprKind::Call {
                        callee: Box::new(lower_expr(callee)),
                        args: Vec::new(),
                    },
                    e.line,
                    e.col,
                );
            }
            if args.len() == 2 && matches!(args[1].kind, ExprKind::Tuple(_)) {
                return Expr::new(
                    ExprKind::Call {
                        callee: Box::new(lower_expr(callee)),
                        args: vec![lower_expr(&args[0]), lower_expr(&args[1])],
                    },
                    e.line,
                    e.col,
                );
            }
            let fmt = lower_expr(&args[0]);
            let rest: Vec<Expr> = args.iter().skip(1).map(lower_expr).collect();
            let tuple = Expr::new(ExprKind::Tuple(rest), e.line, e.col);
            return Expr::new(
                ExprKind::Call {
                    callee: Box::new(lower_expr(callee)),
                    args: vec![fmt, tuple],
                },
                e.line,
                e.col,
            );
        }
    }

    // move(x)  =>  Move(x)
    if let ExprKind::Call { callee, args } = &e.kind {
        if is_ident(callee, "move") && args.len() == 1 {
            return Expr::new(
                ExprKind::Move(Box::new(lower_expr(&args[0]))),
                e.line,
                e.col,
            );
        }
    }

    let kind = match &e.kind {
        ExprKind::Unary { op, expr } => ExprKind::Unary {
            op: *op,
            expr: Box::new(lower_expr(expr)),
        },
        ExprKind::Binary { op, lhs, rhs } => ExprKind::Binary {
            op: *op,
            lhs: Box::new(lower_expr(lhs)),
            rhs: Box::new(lower_expr(rhs)),
        },
        ExprKind::Assign { op, target, value } => ExprKind::Assign {
            op: *op,
            target: Box::new(lower_expr(target)),
            value: Box::new(lower_expr(value)),
        },
        ExprKind::Call { callee, args } => ExprKind::Call {
            callee: Box::new(lower_expr(callee)),
            args: args.iter().map(lower_expr).collect(),
        },
        ExprKind::Index { base, index } => ExprKind::Index {
            base: Box::new(lower_expr(base)),
            index: Box::new(lower_expr(index)),
        },
        ExprKind::Member { base, name } => ExprKind::Member {
            base: Box::new(lower_expr(base)),
            name: name.clone(),
        },
        ExprKind::Paren(inner) => ExprKind::Paren(Box::new(lower_expr(inner))),
        ExprKind::Tuple(items) => ExprKind::Tuple(items.iter().map(lower_expr).collect()),
        ExprKind::Array { items, annot } => ExprKind::Array {
            items: items.iter().map(lower_expr).collect(),
            annot: annot.clone(),
        },
        ExprKind::Ternary {
            cond,
            then_expr,
            else_expr,
        } => ExprKind::Ternary {
            cond: Box::new(lower_expr(cond)),
            then_expr: Box::new(lower_expr(then_expr)),
            else_expr: Box::new(lower_expr(else_expr)),
        },
        ExprKind::IfExpr { arms } => ExprKind::IfExpr {
            arms: arms
                .iter()
                .map(|arm| IfExprArm {
                    cond: arm.cond.as_ref().map(lower_expr),
                    value: lower_expr(&arm.value),
                })
                .collect(),
        },
        ExprKind::Match { scrutinee, arms } => ExprKind::Match {
            scrutinee: Box::new(lower_expr(scrutinee)),
            arms: arms
                .iter()
                .map(|arm| MatchArm {
                    pat: arm.pat.clone(),
                    expr: lower_expr(&arm.expr),
                })
                .collect(),
        },
        ExprKind::Lambda { params, body } => ExprKind::Lambda {
            params: params.clone(),
            body: Box::new(lower_expr(body)),
        },
        ExprKind::Block(block) => ExprKind::Block(Box::new(lower_stmt(block))),
        ExprKind::New {
            class,
            args,
            arg_names,
        } => ExprKind::New {
            class: class.clone(),
            args: args.iter().map(lower_expr).collect(),
            arg_names: arg_names.clone(),
        },
        ExprKind::Move(inner) => ExprKind::Move(Box::new(lower_expr(inner))),
        ExprKind::Int(_)
        | ExprKind::Float(_)
        | ExprKind::Bool(_)
        | ExprKind::Null
        | ExprKind::Str(_)
        | ExprKind::Ident(_) => e.kind.clone(),
    };
    Expr::new(kind, e.line, e.col)
}

fn lower_stmt(s: &Stmt) -> Stmt {
    let kind = match &s.kind {
        StmtKind::Let { name, is_mut, expr } => StmtKind::Let {
            name: name.clone(),
            is_mut: *is_mut,
            expr: lower_expr(expr),
        },
        StmtKind::Const { name, expr } => StmtKind::Const {
            name: name.clone(),
            expr: lower_expr(expr),
        },
        StmtKind::Return(v) => StmtKind::Return(v.as_ref().map(lower_expr)),
        StmtKind::Break => StmtKind::Break,
        StmtKind::Continue => StmtKind::Continue,
        StmtKind::If { arms } => StmtKind::If {
            arms: arms
                .iter()
                .map(|arm| IfArm {
                    cond: arm.cond.as_ref().map(lower_expr),
                    body: lower_stmt(&arm.body),
                })
                .collect(),
        },
        StmtKind::For {
            init,
            cond,
            step,
            body,
        } => StmtKind::For {
            init: init.as_ref().map(|s| Box::new(lower_stmt(s))),
            cond: cond.as_ref().map(lower_expr),
            step: step.as_ref().map(lower_expr),
            body: Box::new(lower_stmt(body)),
        },
        StmtKind::Foreach { name, iter, body } => StmtKind::Foreach {
            name: name.clone(),
            iter: lower_expr(iter),
            body: Box::new(lower_stmt(body)),
        },
        StmtKind::Block(stmts) => StmtKind::Block(stmts.iter().map(lower_stmt).collect()),
        StmtKind::Expr(e) => StmtKind::Expr(lower_expr(e)),
    };
    Stmt::new(kind, s.line, s.col)
}

/// Function bodies that aren't blocks are wrapped in one so every body
/// downstream is a block.
fn wrap_block(body: Stmt) -> Stmt {
    if matches!(body.kind, StmtKind::Block(_)) {
        return body;
    }
    let (line, col) = (body.line, body.col);
    Stmt::new(StmtKind::Block(vec![body]), line, col)
}

fn lower_fun(f: &FunDecl) -> FunDecl {
    FunDecl {
        name: f.name.clone(),
        is_pub: f.is_pub,
        params: f.params.clone(),
        ret: f.ret.clone(),
        body: wrap_block(lower_stmt(&f.body)),
    }
}

fn lower_decl(d: &Decl) -> Decl {
    let kind = match &d.kind {
        DeclKind::Fun(f) => DeclKind::Fun(lower_fun(f)),
        DeclKind::Class(c) => {
            let mut c = c.clone();
            c.methods = c.methods.iter().map(lower_fun).collect();
            DeclKind::Class(c)
        }
        DeclKind::Const(c) => {
            let mut c = c.clone();
            c.expr = lower_expr(&c.expr);
            DeclKind::Const(c)
        }
        DeclKind::Def(def) => {
            let mut def = def.clone();
            def.expr = lower_expr(&def.expr);
            DeclKind::Def(def)
        }
        DeclKind::Entry(e) => {
            let mut e = e.clone();
            e.body = wrap_block(lower_stmt(&e.body));
            DeclKind::Entry(e)
        }
    };
    Decl {
        kind,
        line: d.line,
        col: d.col,
    }
}

/// Desugar the whole program. Positions are carried over unchanged.
pub fn lower_program(prog: &Program) -> Program {
    Program {
        mods: prog
            .mods
            .iter()
            .map(|m| Module {
                path: m.path.clone(),
                declared_name: m.declared_name.clone(),
                imports: m.imports.clone(),
                decls: m.decls.iter().map(lower_decl).collect(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yis_ast::StrPart;

    fn call(name: &str, args: Vec<Expr>) -> Expr {
        Expr::new(
            ExprKind::Call {
                callee: Box::new(ident(name, 1, 1)),
                args,
            },
            1,
            1,
        )
    }

    fn int(v: i64) -> Expr {
        Expr::new(ExprKind::Int(v), 1, 1)
    }

    fn str_lit(s: &str) -> Expr {
        Expr::new(ExprKind::Str(vec![StrPart::Text(s.into())]), 1, 1)
    }

    #[test]
    fn test_len_desugars_to_stdr_len() {
        let e = Expr::new(
            ExprKind::Unary {
                op: UnaryOp::Len,
                expr: Box::new(ident("xs", 1, 2)),
            },
            1,
            1,
        );
        let lowered = lower_expr(&e);
        let ExprKind::Call { callee, args } = &lowered.kind else {
            panic!("expected call");
        };
        let ExprKind::Member { base, name } = &callee.kind else {
            panic!("expected member callee");
        };
        assert!(is_ident(base, "stdr"));
        assert_eq!(name, "len");
        assert!(is_ident(&args[0], "xs"));
    }

    #[test]
    fn test_stdr_prefix_stripped_and_args_packed() {
        let fmt = str_lit("x={}");
        let member = Expr::new(
            ExprKind::Member {
                base: Box::new(ident("stdr", 1, 1)),
                name: "writef".into(),
            },
            1,
            1,
        );
        let e = Expr::new(
            ExprKind::Call {
                callee: Box::new(member),
                args: vec![fmt, int(1), int(2)],
            },
            1,
            1,
        );
        let lowered = lower_expr(&e);
        let ExprKind::Call { callee, args } = &lowered.kind else {
            panic!("expected call");
        };
        assert!(is_ident(callee, "writef"));
        assert_eq!(args.len(), 2);
        let ExprKind::Tuple(items) = &args[1].kind else {
            panic!("expected packed tuple, got {:?}", args[1].kind);
        };
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_prepacked_writef_passes_through() {
        let tuple = Expr::new(ExprKind::Tuple(vec![int(1)]), 1, 1);
        let e = call("writef", vec![str_lit("{}"), tuple]);
        let lowered = lower_expr(&e);
        let ExprKind::Call { args, .. } = &lowered.kind else {
            panic!("expected call");
        };
        assert!(matches!(&args[1].kind, ExprKind::Tuple(items) if items.len() == 1));
    }

    #[test]
    fn test_move_call_becomes_move_node() {
        let e = call("move", vec![ident("x", 1, 6)]);
        let lowered = lower_expr(&e);
        assert!(matches!(&lowered.kind, ExprKind::Move(inner) if is_ident(inner, "x")));
    }

    #[test]
    fn test_lowering_is_idempotent() {
        let fmt = str_lit("{} {}");
        let e = call("writef", vec![fmt, int(1), int(2)]);
        let hash = Expr::new(
            ExprKind::Unary {
                op: UnaryOp::Len,
                expr: Box::new(ident("xs", 1, 1)),
            },
            1,
            1,
        );
        let mv = call("move", vec![ident("y", 1, 1)]);
        let block = Stmt::new(
            StmtKind::Block(vec![
                Stmt::new(StmtKind::Expr(e), 1, 1),
                Stmt::new(StmtKind::Expr(hash), 2, 1),
                Stmt::new(StmtKind::Expr(mv), 3, 1),
            ]),
            1,
            1,
        );
        let prog = Program {
            mods: vec![Module {
                path: "init.yi".into(),
                declared_name: None,
                imports: vec![],
                decls: vec![Decl {
                    kind: DeclKind::Entry(EntryDecl {
                        ret: yis_ast::RetSpec::void(),
                        body: block,
                    }),
                    line: 1,
                    col: 1,
                }],
            }],
        };
        let once = lower_program(&prog);
        let twice = lower_program(&once);
        assert_eq!(once, twice);
    }

    use yis_ast::EntryDecl;

    #[test]
    fn test_non_block_body_wrapped() {
        let body = Stmt::new(StmtKind::Return(None), 3, 5);
        let f = FunDecl {
            name: "f".into(),
            is_pub: false,
            params: vec![],
            ret: yis_ast::RetSpec::void(),
            body,
        };
        let lowered = lower_fun(&f);
        assert!(matches!(&lowered.body.kind, StmtKind::Block(stmts) if stmts.len() == 1));
    }
}

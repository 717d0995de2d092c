// Shared AST builders for the integration tests. The parser lives
// outside this workspace, so tests assemble programs directly in the
// shape the checker contract requires.
#![allow(dead_code)]

use yis_ast::*;

pub fn e(kind: ExprKind) -> Expr {
    Expr::new(kind, 1, 1)
}

pub fn e_at(kind: ExprKind, line: u32, col: u32) -> Expr {
    Expr::new(kind, line, col)
}

pub fn int(v: i64) -> Expr {
    e(ExprKind::Int(v))
}

pub fn float(v: f64) -> Expr {
    e(ExprKind::Float(v))
}

pub fn boolean(v: bool) -> Expr {
    e(ExprKind::Bool(v))
}

pub fn null() -> Expr {
    e(ExprKind::Null)
}

pub fn strlit(s: &str) -> Expr {
    e(ExprKind::Str(vec![StrPart::Text(s.to_string())]))
}

pub fn interp(parts: Vec<StrPart>) -> Expr {
    e(ExprKind::Str(parts))
}

pub fn ident(name: &str) -> Expr {
    e(ExprKind::Ident(name.to_string()))
}

pub fn bin(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    e(ExprKind::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    })
}

pub fn un(op: UnaryOp, expr: Expr) -> Expr {
    e(ExprKind::Unary {
        op,
        expr: Box::new(expr),
    })
}

pub fn assign(target: Expr, value: Expr) -> Expr {
    e(ExprKind::Assign {
        op: AssignOp::Assign,
        target: Box::new(target),
        value: Box::new(value),
    })
}

pub fn compound(op: AssignOp, target: Expr, value: Expr) -> Expr {
    e(ExprKind::Assign {
        op,
        target: Box::new(target),
        value: Box::new(value),
    })
}

pub fn call(callee: Expr, args: Vec<Expr>) -> Expr {
    e(ExprKind::Call {
        callee: Box::new(callee),
        args,
    })
}

pub fn callf(name: &str, args: Vec<Expr>) -> Expr {
    call(ident(name), args)
}

pub fn member(base: Expr, name: &str) -> Expr {
    e(ExprKind::Member {
        base: Box::new(base),
        name: name.to_string(),
    })
}

/// `cask.f(args)`
pub fn qcall(cask: &str, name: &str, args: Vec<Expr>) -> Expr {
    call(member(ident(cask), name), args)
}

pub fn index(base: Expr, i: Expr) -> Expr {
    e(ExprKind::Index {
        base: Box::new(base),
        index: Box::new(i),
    })
}

pub fn array(items: Vec<Expr>) -> Expr {
    e(ExprKind::Array { items, annot: None })
}

pub fn array_annot(items: Vec<Expr>, annot: TypeRef) -> Expr {
    e(ExprKind::Array {
        items,
        annot: Some(annot),
    })
}

pub fn tuple(items: Vec<Expr>) -> Expr {
    e(ExprKind::Tuple(items))
}

pub fn lambda(params: Vec<Param>, body: Expr) -> Expr {
    e(ExprKind::Lambda {
        params,
        body: Box::new(body),
    })
}

pub fn new_class(class: &str, args: Vec<Expr>) -> Expr {
    let names = args.iter().map(|_| None).collect();
    e(ExprKind::New {
        class: class.to_string(),
        args,
        arg_names: names,
    })
}

pub fn match_expr(scrutinee: Expr, arms: Vec<(PatternKind, Expr)>) -> Expr {
    e(ExprKind::Match {
        scrutinee: Box::new(scrutinee),
        arms: arms
            .into_iter()
            .map(|(pk, expr)| MatchArm {
                pat: Pattern {
                    kind: pk,
                    line: 1,
                    col: 1,
                },
                expr,
            })
            .collect(),
    })
}

pub fn st(kind: StmtKind) -> Stmt {
    Stmt::new(kind, 1, 1)
}

pub fn st_at(kind: StmtKind, line: u32, col: u32) -> Stmt {
    Stmt::new(kind, line, col)
}

pub fn block(stmts: Vec<Stmt>) -> Stmt {
    st(StmtKind::Block(stmts))
}

pub fn let_(name: &str, expr: Expr) -> Stmt {
    st(StmtKind::Let {
        name: name.to_string(),
        is_mut: false,
        expr,
    })
}

pub fn let_mut(name: &str, expr: Expr) -> Stmt {
    st(StmtKind::Let {
        name: name.to_string(),
        is_mut: true,
        expr,
    })
}

pub fn ret(value: Expr) -> Stmt {
    st(StmtKind::Return(Some(value)))
}

pub fn ret_void() -> Stmt {
    st(StmtKind::Return(None))
}

pub fn expr_stmt(e: Expr) -> Stmt {
    st(StmtKind::Expr(e))
}

pub fn if_stmt(arms: Vec<(Option<Expr>, Stmt)>) -> Stmt {
    st(StmtKind::If {
        arms: arms
            .into_iter()
            .map(|(cond, body)| IfArm { cond, body })
            .collect(),
    })
}

pub fn foreach(name: &str, iter: Expr, body: Stmt) -> Stmt {
    st(StmtKind::Foreach {
        name: name.to_string(),
        iter,
        body: Box::new(body),
    })
}

pub fn tref(name: &str) -> TypeRef {
    TypeRef::named(name, 1, 1)
}

pub fn tref_arr(elem: &str) -> TypeRef {
    TypeRef::array(TypeRef::named(elem, 1, 1), 1, 1)
}

pub fn param(name: &str, ty: TypeRef) -> Param {
    Param {
        name: name.to_string(),
        typ: Some(ty),
        is_this: false,
        is_mut: false,
    }
}

pub fn param_mut(name: &str, ty: TypeRef) -> Param {
    Param {
        name: name.to_string(),
        typ: Some(ty),
        is_this: false,
        is_mut: true,
    }
}

pub fn param_untyped(name: &str) -> Param {
    Param {
        name: name.to_string(),
        typ: None,
        is_this: false,
        is_mut: false,
    }
}

pub fn this_param() -> Param {
    Param {
        name: "this".to_string(),
        typ: None,
        is_this: true,
        is_mut: false,
    }
}

pub fn this_param_mut() -> Param {
    Param {
        name: "this".to_string(),
        typ: None,
        is_this: true,
        is_mut: true,
    }
}

pub fn ret_spec(names: &[&str]) -> RetSpec {
    RetSpec {
        types: names.iter().map(|n| tref(n)).collect(),
    }
}

pub fn fun(name: &str, params: Vec<Param>, ret: RetSpec, body: Vec<Stmt>) -> Decl {
    Decl {
        kind: DeclKind::Fun(FunDecl {
            name: name.to_string(),
            is_pub: true,
            params,
            ret,
            body: block(body),
        }),
        line: 1,
        col: 1,
    }
}

pub fn method(name: &str, params: Vec<Param>, ret: RetSpec, body: Vec<Stmt>) -> FunDecl {
    FunDecl {
        name: name.to_string(),
        is_pub: true,
        params,
        ret,
        body: block(body),
    }
}

pub fn class(name: &str, vis: Visibility, fields: Vec<(&str, TypeRef)>, methods: Vec<FunDecl>) -> Decl {
    Decl {
        kind: DeclKind::Class(ClassDecl {
            name: name.to_string(),
            vis,
            kind: ClassKind::Class,
            fields: fields
                .into_iter()
                .map(|(n, t)| FieldDecl {
                    name: n.to_string(),
                    typ: t,
                    line: 1,
                    col: 1,
                })
                .collect(),
            methods,
        }),
        line: 1,
        col: 1,
    }
}

pub fn struct_class(name: &str, fields: Vec<(&str, TypeRef)>) -> Decl {
    Decl {
        kind: DeclKind::Class(ClassDecl {
            name: name.to_string(),
            vis: Visibility::Default,
            kind: ClassKind::Struct,
            fields: fields
                .into_iter()
                .map(|(n, t)| FieldDecl {
                    name: n.to_string(),
                    typ: t,
                    line: 1,
                    col: 1,
                })
                .collect(),
            methods: vec![],
        }),
        line: 1,
        col: 1,
    }
}

pub fn def(name: &str, is_mut: bool, expr: Expr) -> Decl {
    Decl {
        kind: DeclKind::Def(DefDecl {
            name: name.to_string(),
            is_mut,
            expr,
        }),
        line: 1,
        col: 1,
    }
}

pub fn konst(name: &str, expr: Expr) -> Decl {
    Decl {
        kind: DeclKind::Const(ConstDecl {
            name: name.to_string(),
            expr,
        }),
        line: 1,
        col: 1,
    }
}

pub fn entry(body: Vec<Stmt>) -> Decl {
    Decl {
        kind: DeclKind::Entry(EntryDecl {
            ret: RetSpec::void(),
            body: block(body),
        }),
        line: 1,
        col: 1,
    }
}

pub fn module(path: &str, imports: &[&str], decls: Vec<Decl>) -> Module {
    Module {
        path: path.to_string(),
        declared_name: None,
        imports: imports
            .iter()
            .map(|n| Import {
                name: n.to_string(),
                line: 1,
                col: 1,
            })
            .collect(),
        decls,
    }
}

pub fn program(mods: Vec<Module>) -> Program {
    Program { mods }
}

/// Minimal stdr cask: the prelude functions the spec names, backed by
/// the emitter's reserved `__`-names declared as empty stubs.
pub fn stdr_module() -> Module {
    module(
        "stdr.yi",
        &[],
        vec![
            // reserved-name stubs (empty bodies skip body checks)
            fun(
                "__writef",
                vec![param("fmt", tref("string")), param("args", tref("any"))],
                RetSpec::void(),
                vec![],
            ),
            fun("__len", vec![param("x", tref("any"))], ret_spec(&["num"]), vec![]),
            fun("__read_line", vec![], ret_spec(&["string"]), vec![]),
            fun(
                "__readf_parse",
                vec![
                    param("fmt", tref("string")),
                    param("line", tref("string")),
                    param("args", tref("any")),
                ],
                ret_spec(&["any"]),
                vec![],
            ),
            // prelude surface
            fun(
                "writef",
                vec![param("fmt", tref("string")), param("args", tref("any"))],
                RetSpec::void(),
                vec![expr_stmt(callf(
                    "__writef",
                    vec![ident("fmt"), ident("args")],
                ))],
            ),
            fun(
                "write",
                vec![param("s", tref("string"))],
                RetSpec::void(),
                vec![expr_stmt(callf("__writef", vec![ident("s"), tuple(vec![])]))],
            ),
            fun(
                "len",
                vec![param("x", tref("any"))],
                ret_spec(&["num"]),
                vec![ret(callf("__len", vec![ident("x")]))],
            ),
            fun(
                "str",
                vec![param("x", tref("any"))],
                ret_spec(&["string"]),
                vec![ret(strlit(""))],
            ),
            fun(
                "is_null",
                vec![param("x", tref("any"))],
                ret_spec(&["bool"]),
                vec![ret(bin(BinOp::Eq, ident("x"), null()))],
            ),
            fun(
                "readf",
                vec![param("fmt", tref("string")), param("args", tref("any"))],
                ret_spec(&["any"]),
                vec![ret(callf(
                    "__readf_parse",
                    vec![ident("fmt"), callf("__read_line", vec![]), ident("args")],
                ))],
            ),
        ],
    )
}

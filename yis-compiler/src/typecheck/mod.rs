// Expression and statement type checking.
// Walks the lowered program against the global environment, assigning a
// type to every expression and enforcing mutability, visibility, move
// and return-coverage rules. The first error stops the compilation.

mod calls;
mod exprs;

use log::debug;
use yis_ast::{DeclKind, FunDecl, Program, Stmt, StmtKind};
use yis_diagnostics::Diag;

use crate::env::{build_global_env, GlobalEnv};
use crate::types::{Ty, TyArena};

/// What a name is bound to in the current scope stack.
#[derive(Debug, Clone, Copy)]
pub struct Binding<'t> {
    pub ty: &'t Ty<'t>,
    pub is_mut: bool,
    pub is_const: bool,
    /// Set once the slot was emptied by `move(x)`; reading it again is
    /// a type error until it is reassigned.
    pub is_moved: bool,
}

impl<'t> Binding<'t> {
    pub fn new(ty: &'t Ty<'t>, is_mut: bool) -> Self {
        Self {
            ty,
            is_mut,
            is_const: false,
            is_moved: false,
        }
    }

    pub fn constant(ty: &'t Ty<'t>) -> Self {
        Self {
            ty,
            is_mut: false,
            is_const: true,
            is_moved: false,
        }
    }
}

/// Stack of lexical scopes. Lookup walks inward-out; definition inserts
/// into the innermost scope, replacing a same-named binding there only.
#[derive(Debug, Clone)]
pub struct Locals<'t> {
    scopes: Vec<Vec<(String, Binding<'t>)>>,
}

impl<'t> Default for Locals<'t> {
    fn default() -> Self {
        Self {
            scopes: vec![Vec::new()],
        }
    }
}

impl<'t> Locals<'t> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self) {
        self.scopes.push(Vec::new());
    }

    pub fn pop(&mut self) {
        self.scopes.pop();
    }

    pub fn define(&mut self, name: &str, binding: Binding<'t>) {
        let Some(scope) = self.scopes.last_mut() else {
            return;
        };
        if let Some(entry) = scope.iter_mut().find(|(n, _)| n == name) {
            entry.1 = binding;
            return;
        }
        scope.push((name.to_string(), binding));
    }

    pub fn lookup(&self, name: &str) -> Option<&Binding<'t>> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.iter().find(|(n, _)| n == name).map(|(_, b)| b))
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Binding<'t>> {
        self.scopes.iter_mut().rev().find_map(|scope| {
            scope
                .iter_mut()
                .find(|(n, _)| n == name)
                .map(|(_, b)| b)
        })
    }
}

/// Checking context for one function body: the surrounding cask, its
/// imports, the current class for method bodies, and the loop depth for
/// break/continue validity.
pub struct Checker<'e, 't> {
    pub env: &'e GlobalEnv<'t>,
    pub cask_path: String,
    pub cask_name: String,
    pub imports: Vec<String>,
    pub current_class: Option<String>,
    pub loop_depth: u32,
    pub locals: Locals<'t>,
    gen_counter: u32,
}

impl<'e, 't> Checker<'e, 't> {
    pub fn new(
        env: &'e GlobalEnv<'t>,
        cask_path: &str,
        cask_name: &str,
        imports: &[String],
    ) -> Self {
        Self {
            env,
            cask_path: cask_path.to_string(),
            cask_name: cask_name.to_string(),
            imports: imports.to_vec(),
            current_class: None,
            loop_depth: 0,
            locals: Locals::new(),
            gen_counter: 0,
        }
    }

    pub fn arena(&self) -> &'t TyArena<'t> {
        self.env.arena
    }

    pub(crate) fn err(&self, line: u32, col: u32, msg: impl Into<String>) -> Diag {
        Diag::new(self.cask_path.clone(), line, col, msg)
    }

    pub(crate) fn fresh_gen(&mut self, base: &str) -> String {
        self.gen_counter += 1;
        format!("_{}_{}", base, self.gen_counter)
    }

    /// A name refers to a cask when it is the current cask or an import
    /// and no local shadows it.
    pub(crate) fn cask_in_scope(&self, name: &str) -> bool {
        if self.locals.lookup(name).is_some() {
            return false;
        }
        name == self.cask_name || self.imports.iter().any(|i| i == name)
    }

    /// If `base` is a local that hides a cask name, return that name for
    /// the shadowing diagnostic.
    pub(crate) fn shadowed_cask_name<'x>(&self, base: &'x yis_ast::Expr) -> Option<&'x str> {
        let yis_ast::ExprKind::Ident(name) = &base.kind else {
            return None;
        };
        if self.locals.lookup(name).is_none() {
            return None;
        }
        if name == &self.cask_name || self.imports.iter().any(|i| i == name) {
            Some(name)
        } else {
            None
        }
    }

    /// Whether an expression is an lvalue rooted in a mutable binding.
    pub(crate) fn is_mut_lvalue(&self, e: &yis_ast::Expr) -> bool {
        match &e.kind {
            yis_ast::ExprKind::Ident(name) => {
                if let Some(b) = self.locals.lookup(name) {
                    return b.is_mut && !b.is_const;
                }
                self.env
                    .find_global(&self.cask_name, name)
                    .map(|gv| gv.is_mut)
                    .unwrap_or(false)
            }
            yis_ast::ExprKind::Member { base, .. } => self.is_mut_lvalue(base),
            yis_ast::ExprKind::Index { base, .. } => self.is_mut_lvalue(base),
            _ => false,
        }
    }

    /// The `stdr` prelude names resolve without qualification when the
    /// cask `stdr` is current or imported.
    pub(crate) fn stdr_prelude_sig(&self, name: &str) -> Option<&'e crate::env::FunSig<'t>> {
        if !is_stdr_prelude(name) {
            return None;
        }
        let allowed = self.cask_name == "stdr" || self.imports.iter().any(|i| i == "stdr");
        if !allowed {
            return None;
        }
        self.env.find_fun("stdr", name)
    }

    pub fn check_stmt(&mut self, s: &Stmt, ret_ty: &'t Ty<'t>) -> Result<(), Diag> {
        match &s.kind {
            StmtKind::Let { name, is_mut, expr } => {
                let ty = self.check_expr(expr)?;
                self.locals.define(name, Binding::new(ty, *is_mut));
                Ok(())
            }
            StmtKind::Const { name, expr } => {
                let ty = self.check_expr(expr)?;
                self.locals.define(name, Binding::constant(ty));
                Ok(())
            }
            StmtKind::Expr(e) => {
                self.check_expr(e)?;
                Ok(())
            }
            StmtKind::Return(value) => {
                if ret_ty.is_void() {
                    if value.is_some() {
                        return Err(self.err(s.line, s.col, "return value in void function"));
                    }
                    return Ok(());
                }
                let Some(value) = value else {
                    return Err(self.err(s.line, s.col, "missing return value"));
                };
                let ty = self.check_expr(value)?;
                crate::types::assignable(self.arena(), ret_ty, ty, &self.cask_path, "return")?;
                crate::types::unify(self.arena(), ret_ty, ty, &self.cask_path, "return", None)?;
                Ok(())
            }
            StmtKind::If { arms } => {
                for arm in arms {
                    let saved = self.locals.clone();
                    if let Some(cond) = &arm.cond {
                        let ct = self.check_expr(cond)?;
                        if ct.is_void() {
                            return Err(self.err(s.line, s.col, "if condition cannot be void"));
                        }
                    }
                    self.check_stmt(&arm.body, ret_ty)?;
                    self.locals = saved;
                }
                Ok(())
            }
            StmtKind::Break => {
                if self.loop_depth == 0 {
                    return Err(self.err(s.line, s.col, "break used outside loop"));
                }
                Ok(())
            }
            StmtKind::Continue => {
                if self.loop_depth == 0 {
                    return Err(self.err(s.line, s.col, "continue used outside loop"));
                }
                Ok(())
            }
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                self.locals.push();
                if let Some(init) = init {
                    self.check_stmt(init, ret_ty)?;
                }
                if let Some(cond) = cond {
                    let ct = self.check_expr(cond)?;
                    if ct.is_void() {
                        self.locals.pop();
                        return Err(self.err(s.line, s.col, "for condition cannot be void"));
                    }
                }
                if let Some(step) = step {
                    self.check_expr(step)?;
                }
                self.loop_depth += 1;
                let result = self.check_stmt(body, ret_ty);
                self.loop_depth -= 1;
                self.locals.pop();
                result
            }
            StmtKind::Foreach { name, iter, body } => {
                let it = self.check_expr(iter)?;
                let it = it.strip_nullable();
                let elem = match it {
                    Ty::Array(elem) => *elem,
                    t if t.is_string() => self.arena().string(),
                    _ => {
                        return Err(self.err(s.line, s.col, "foreach expects array or string"));
                    }
                };
                self.locals.push();
                self.locals.define(name, Binding::new(elem, false));
                self.loop_depth += 1;
                let result = self.check_stmt(body, ret_ty);
                self.loop_depth -= 1;
                self.locals.pop();
                result
            }
            StmtKind::Block(stmts) => {
                self.locals.push();
                for st in stmts {
                    if let Err(e) = self.check_stmt(st, ret_ty) {
                        self.locals.pop();
                        return Err(e);
                    }
                }
                self.locals.pop();
                Ok(())
            }
        }
    }
}

pub(crate) fn is_stdr_prelude(name: &str) -> bool {
    matches!(
        name,
        "write" | "writef" | "readf" | "len" | "is_null" | "str"
    )
}

/// Whether a statement guarantees a `return` on every path through it.
/// A block guarantees if any statement in it does; an if guarantees only
/// with an explicit else and every arm guaranteeing.
pub fn stmt_guarantees_return(s: &Stmt) -> bool {
    match &s.kind {
        StmtKind::Return(_) => true,
        StmtKind::Block(stmts) => stmts.iter().any(stmt_guarantees_return),
        StmtKind::If { arms } => {
            let has_else = arms.iter().any(|a| a.cond.is_none());
            has_else && arms.iter().all(|a| stmt_guarantees_return(&a.body))
        }
        _ => false,
    }
}

/// Human description of the first falling-through position, used in the
/// missing-return message by both the checker and the lint pass.
pub fn describe_fallthrough(s: &Stmt) -> String {
    match &s.kind {
        StmtKind::Block(stmts) => match stmts.last() {
            None => "empty body can reach end without return".to_string(),
            Some(last) => describe_fallthrough(last),
        },
        StmtKind::If { arms } => {
            let has_else = arms.iter().any(|a| a.cond.is_none());
            if !has_else {
                return format!(
                    "if branch at line {} has no else and can fall through",
                    s.line
                );
            }
            for arm in arms {
                if !stmt_guarantees_return(&arm.body) {
                    let line = arm.body.line;
                    return if arm.cond.is_some() {
                        format!("if branch at line {} can fall through", line)
                    } else {
                        format!("else branch at line {} can fall through", line)
                    };
                }
            }
            "control path can reach end without return".to_string()
        }
        _ => "control path can reach end without return".to_string(),
    }
}

/// Type-check one expression in a fresh scope, for global initializers
/// and other top-level positions.
pub fn check_top_expr<'t>(
    env: &GlobalEnv<'t>,
    cask_path: &str,
    cask_name: &str,
    imports: &[String],
    e: &yis_ast::Expr,
) -> Result<&'t Ty<'t>, Diag> {
    let mut ck = Checker::new(env, cask_path, cask_name, imports);
    ck.check_expr(e)
}

fn check_fun_body<'t>(
    env: &GlobalEnv<'t>,
    cask_path: &str,
    cask_name: &str,
    imports: &[String],
    fun: &FunDecl,
    owner: Option<&crate::env::ClassInfo<'t>>,
    decl_line: u32,
    decl_col: u32,
) -> Result<(), Diag> {
    let mut ck = Checker::new(env, cask_path, cask_name, imports);
    let mut params = fun.params.as_slice();
    if let Some(ci) = owner {
        ck.current_class = Some(ci.qname.clone());
        if let Some(recv) = fun.params.first() {
            let self_ty = env.arena.class(ci.qname.clone());
            ck.locals
                .define(&recv.name, Binding::new(self_ty, recv.is_mut));
            params = &fun.params[1..];
        }
    }
    let sig = match owner {
        Some(ci) => ci.find_method(&fun.name).map(|m| &m.sig),
        None => env.find_fun(cask_name, &fun.name),
    };
    for (i, p) in params.iter().enumerate() {
        let ty = match sig.and_then(|s| s.params.get(i)) {
            Some(t) => *t,
            None => match &p.typ {
                Some(tr) => env.ty_from_type_ref(tr, cask_name, cask_path, imports)?,
                None => env.arena.any(),
            },
        };
        ck.locals.define(&p.name, Binding::new(ty, p.is_mut));
    }
    let ret_ty = match sig {
        Some(s) => s.ret,
        None => env.resolve_ret(&fun.ret, cask_name, cask_path, imports)?,
    };

    // Stubs with empty bodies declare externals and skip body checks.
    if fun.body.is_empty_block() {
        return Ok(());
    }

    if !ret_ty.is_void() && !stmt_guarantees_return(&fun.body) {
        let qualified = match owner {
            Some(ci) => format!("{}.{}", ci.name, fun.name),
            None => fun.name.clone(),
        };
        return Err(Diag::new(
            cask_path,
            decl_line,
            decl_col,
            format!(
                "missing return coverage in function '{}': {}",
                qualified,
                describe_fallthrough(&fun.body)
            ),
        ));
    }

    ck.check_stmt(&fun.body, ret_ty)
}

/// Check the whole lowered program: builds the environment, then every
/// free function, method and entry body.
pub fn typecheck_program<'t>(prog: &Program, arena: &'t TyArena<'t>) -> Result<(), Diag> {
    let env = build_global_env(prog, arena)?;
    debug!("typecheck: environment built, checking bodies");

    for m in &prog.mods {
        let cask = env.cask_name_of_path(&m.path).unwrap_or("").to_string();
        let imports = env.imports_of(&cask).to_vec();
        for d in &m.decls {
            match &d.kind {
                DeclKind::Fun(fd) => {
                    check_fun_body(&env, &m.path, &cask, &imports, fd, None, d.line, d.col)?;
                }
                DeclKind::Class(cd) => {
                    let qname = crate::env::qualify(&cask, &cd.name);
                    let Some(ci) = env.find_class(&qname) else {
                        continue;
                    };
                    for md in &cd.methods {
                        check_fun_body(
                            &env, &m.path, &cask, &imports, md, Some(ci), d.line, d.col,
                        )?;
                    }
                }
                DeclKind::Entry(ed) => {
                    let mut ck = Checker::new(&env, &m.path, &cask, &imports);
                    let ret_ty = env.resolve_ret(&ed.ret, &cask, &m.path, &imports)?;
                    ck.check_stmt(&ed.body, ret_ty)?;
                }
                _ => {}
            }
        }
    }
    Ok(())
}

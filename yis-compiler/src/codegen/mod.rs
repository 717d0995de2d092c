// C code generator.
// Lowers the typed AST plus the global environment into one
// self-contained C translation unit against the bundled refcounting
// runtime. Emission order: runtime prelude, intrinsic externs, global
// slots, class structs and drop functions, forward declarations,
// lambdas, function-value wrappers, module initializers, methods and
// free functions, the entry function, then main().

mod exprs;
mod intrinsics;
mod mangle;
mod stmts;

pub use intrinsics::{find_intrinsic, Intrinsic, INTRINSICS};

use log::debug;
use yis_ast::{DeclKind, Expr, ExprKind, FunDecl, Program, Stmt, StmtKind};
use yis_diagnostics::Diag;

use crate::env::{build_global_env, GlobalEnv};
use crate::typecheck::{Binding, Checker, Locals};
use crate::types::{Ty, TyArena};

const RUNTIME_PRELUDE: &str = include_str!("runtime.inc");

/// Result of lowering one expression: the temporary holding the value,
/// plus every temporary that must be released before the enclosing
/// statement ends (the result itself included).
pub(crate) struct GenExpr {
    pub tmp: String,
    pub cleanup: Vec<String>,
}

impl GenExpr {
    fn result(tmp: String) -> Self {
        Self {
            cleanup: vec![tmp.clone()],
            tmp,
        }
    }
}

#[derive(Default)]
struct Scope {
    /// Source name -> C name.
    names: Vec<(String, String)>,
    /// C slots to release when the scope exits.
    locals: Vec<String>,
}

struct LambdaSlot<'p> {
    expr: &'p Expr,
    path: String,
    name: String,
}

struct FunVal {
    cask: String,
    name: String,
    wrapper: String,
}

pub(crate) struct Codegen<'e, 't, 'p> {
    prog: &'p Program,
    env: &'e GlobalEnv<'t>,
    out: String,
    indent: usize,

    tmp_id: u32,
    var_id: u32,
    sym_id: u32,
    lambda_id: u32,

    scopes: Vec<Scope>,
    loop_marks: Vec<usize>,
    ty_locals: Locals<'t>,

    current_path: String,
    current_cask: String,
    current_imports: Vec<String>,
    current_class: Option<String>,

    lambdas: Vec<LambdaSlot<'p>>,
    funvals: Vec<FunVal>,
}

/// Emit the full C translation unit for a lowered, type-checked
/// program. The returned string is written to disk by the driver.
pub fn emit_c<'t>(prog: &Program, arena: &'t TyArena<'t>) -> Result<String, Diag> {
    let env = build_global_env(prog, arena)?;
    let mut cg = Codegen::new(prog, &env);
    cg.run()?;
    debug!("codegen: emitted {} bytes of C", cg.out.len());
    Ok(cg.out)
}

impl<'e, 't, 'p> Codegen<'e, 't, 'p> {
    fn new(prog: &'p Program, env: &'e GlobalEnv<'t>) -> Self {
        Self {
            prog,
            env,
            out: String::new(),
            indent: 0,
            tmp_id: 0,
            var_id: 0,
            sym_id: 0,
            lambda_id: 0,
            scopes: Vec::new(),
            loop_marks: Vec::new(),
            ty_locals: Locals::new(),
            current_path: String::new(),
            current_cask: String::new(),
            current_imports: Vec::new(),
            current_class: None,
            lambdas: Vec::new(),
            funvals: Vec::new(),
        }
    }

    // ---- writer ----

    pub(crate) fn line(&mut self, s: impl AsRef<str>) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        self.out.push_str(s.as_ref());
        self.out.push('\n');
    }

    fn raw(&mut self, s: &str) {
        self.out.push_str(s);
        if !s.ends_with('\n') {
            self.out.push('\n');
        }
    }

    pub(crate) fn open(&mut self, s: impl AsRef<str>) {
        self.line(s);
        self.indent += 1;
    }

    pub(crate) fn close(&mut self, s: impl AsRef<str>) {
        self.indent -= 1;
        self.line(s);
    }

    // ---- errors ----

    pub(crate) fn err(&self, line: u32, col: u32, msg: impl Into<String>) -> Diag {
        Diag::new(self.current_path.clone(), line, col, msg)
    }

    // ---- fresh names ----

    pub(crate) fn new_tmp(&mut self) -> String {
        self.tmp_id += 1;
        format!("__t{}", self.tmp_id)
    }

    pub(crate) fn new_sym(&mut self, base: &str) -> String {
        self.sym_id += 1;
        format!("__{}{}", base, self.sym_id)
    }

    pub(crate) fn new_bool(&mut self) -> String {
        self.var_id += 1;
        format!("__b{}", self.var_id)
    }

    fn new_lambda_name(&mut self) -> String {
        self.lambda_id += 1;
        format!("ergo_lambda_{}", self.lambda_id)
    }

    // ---- scopes ----

    pub(crate) fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
        self.ty_locals.push();
    }

    /// Pop without emitting; returns the slots to release.
    pub(crate) fn pop_scope(&mut self) -> Vec<String> {
        self.ty_locals.pop();
        self.scopes.pop().map(|s| s.locals).unwrap_or_default()
    }

    /// Release slots in reverse order of introduction.
    pub(crate) fn release_locals(&mut self, locals: Vec<String>) {
        for l in locals.into_iter().rev() {
            self.line(format!("ergo_release_val({});", l));
        }
    }

    /// Emit releases for every open scope without popping, for an early
    /// `return`: the jump skips the normal scope epilogues.
    pub(crate) fn release_all_scopes_for_exit(&mut self) {
        let slots: Vec<String> = self
            .scopes
            .iter()
            .rev()
            .flat_map(|s| s.locals.iter().rev().cloned())
            .collect();
        for l in slots {
            self.line(format!("ergo_release_val({});", l));
        }
    }

    /// Emit releases for scopes opened inside the current loop body,
    /// for `break`/`continue`.
    pub(crate) fn release_scopes_to_loop(&mut self) -> Result<(), Diag> {
        let Some(&mark) = self.loop_marks.last() else {
            return Err(self.err(0, 0, "break/continue outside loop in codegen"));
        };
        let slots: Vec<String> = self
            .scopes
            .get(mark..)
            .unwrap_or(&[])
            .iter()
            .rev()
            .flat_map(|s| s.locals.iter().rev().cloned())
            .collect();
        for l in slots {
            self.line(format!("ergo_release_val({});", l));
        }
        Ok(())
    }

    pub(crate) fn loop_mark_push(&mut self) {
        self.loop_marks.push(self.scopes.len());
    }

    pub(crate) fn loop_mark_pop(&mut self) {
        self.loop_marks.pop();
    }

    // ---- name binding ----

    pub(crate) fn add_name(&mut self, name: &str, cname: String) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.names.push((name.to_string(), cname));
        }
    }

    fn add_local(&mut self, cname: String) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.locals.push(cname);
        }
    }

    /// C name of a source name: scope stack first, then a current-cask
    /// global slot.
    pub(crate) fn cname_of(&self, name: &str) -> Option<String> {
        for scope in self.scopes.iter().rev() {
            if let Some((_, cname)) = scope.names.iter().rev().find(|(n, _)| n == name) {
                return Some(cname.clone());
            }
        }
        if self.env.find_global(&self.current_cask, name).is_some() {
            return Some(mangle::global_symbol(&self.current_cask, name));
        }
        None
    }

    /// Allocate a fresh uniquely-named C slot for a `let`/`const`/
    /// `foreach` local and register it for release at scope exit.
    pub(crate) fn define_local(
        &mut self,
        name: &str,
        ty: &'t Ty<'t>,
        is_mut: bool,
        is_const: bool,
    ) -> String {
        self.var_id += 1;
        let cname = format!("{}__{}", name, self.var_id);
        let mut b = Binding::new(ty, is_mut);
        b.is_const = is_const;
        self.ty_locals.define(name, b);
        self.add_name(name, cname.clone());
        self.add_local(cname.clone());
        cname
    }

    /// Bind a source name to an existing C slot (parameters, match
    /// bindings) without registering a release.
    pub(crate) fn bind_param(&mut self, name: &str, cname: String, ty: &'t Ty<'t>, is_mut: bool) {
        self.ty_locals.define(name, Binding::new(ty, is_mut));
        self.add_name(name, cname);
    }

    // ---- module context ----

    fn set_module_ctx(&mut self, path: &str) {
        self.current_path = path.to_string();
        self.current_cask = self
            .env
            .cask_name_of_path(path)
            .unwrap_or_default()
            .to_string();
        self.current_imports = self.env.imports_of(&self.current_cask).to_vec();
        self.current_class = None;
    }

    fn reset_fn_state(&mut self) {
        self.scopes.clear();
        self.loop_marks.clear();
        self.ty_locals = Locals::new();
        self.push_scope();
    }

    pub(crate) fn cask_in_scope(&self, name: &str) -> bool {
        if self.ty_locals.lookup(name).is_some() {
            return false;
        }
        name == self.current_cask || self.current_imports.iter().any(|i| i == name)
    }

    /// Type query against the checker, with the emitter's current
    /// bindings; used wherever lowering is type-directed.
    pub(crate) fn query_ty(&self, e: &Expr) -> Result<&'t Ty<'t>, Diag> {
        let mut ck = Checker::new(
            self.env,
            &self.current_path,
            &self.current_cask,
            &self.current_imports,
        );
        ck.current_class = self.current_class.clone();
        ck.locals = self.ty_locals.clone();
        ck.check_expr(e)
    }

    pub(crate) fn stdr_prelude_fun(&self, name: &str) -> Option<&'e crate::env::FunSig<'t>> {
        if !crate::typecheck::is_stdr_prelude(name) {
            return None;
        }
        let allowed =
            self.current_cask == "stdr" || self.current_imports.iter().any(|i| i == "stdr");
        if !allowed {
            return None;
        }
        self.env.find_fun("stdr", name)
    }

    // ---- lambda & funval collection ----

    fn lambda_name_of(&self, e: &Expr) -> Option<String> {
        self.lambdas
            .iter()
            .find(|l| std::ptr::eq(l.expr, e))
            .map(|l| l.name.clone())
    }

    fn add_lambda(&mut self, e: &'p Expr, path: &str) {
        if self.lambda_name_of(e).is_some() {
            return;
        }
        let name = self.new_lambda_name();
        self.lambdas.push(LambdaSlot {
            expr: e,
            path: path.to_string(),
            name,
        });
    }

    pub(crate) fn funval_wrapper_of(&self, cask: &str, name: &str) -> Option<String> {
        self.funvals
            .iter()
            .find(|f| f.cask == cask && f.name == name)
            .map(|f| f.wrapper.clone())
    }

    fn add_funval(&mut self, cask: &str, name: &str) {
        if self.funval_wrapper_of(cask, name).is_some() {
            return;
        }
        self.funvals.push(FunVal {
            cask: cask.to_string(),
            name: name.to_string(),
            wrapper: mangle::funval_wrapper(cask, name),
        });
    }

    /// Pre-pass: find every lambda and every top-level function that is
    /// captured as a value (needs a trampoline wrapper).
    fn collect_expr(&mut self, e: &'p Expr, path: &str, cask: &str, allow_funval: bool) {
        match &e.kind {
            ExprKind::Lambda { body, .. } => {
                self.add_lambda(e, path);
                self.collect_expr(body, path, cask, true);
            }
            ExprKind::Ident(name) => {
                if allow_funval {
                    if self.env.find_fun(cask, name).is_some() {
                        self.add_funval(cask, name);
                    } else if crate::typecheck::is_stdr_prelude(name)
                        && self.env.find_fun("stdr", name).is_some()
                    {
                        self.add_funval("stdr", name);
                    }
                }
            }
            ExprKind::Unary { expr, .. } => self.collect_expr(expr, path, cask, true),
            ExprKind::Binary { lhs, rhs, .. } => {
                self.collect_expr(lhs, path, cask, true);
                self.collect_expr(rhs, path, cask, true);
            }
            ExprKind::Assign { target, value, .. } => {
                self.collect_expr(target, path, cask, true);
                self.collect_expr(value, path, cask, true);
            }
            ExprKind::Call { callee, args } => {
                self.collect_expr(callee, path, cask, false);
                for a in args {
                    self.collect_expr(a, path, cask, true);
                }
            }
            ExprKind::Index { base, index } => {
                self.collect_expr(base, path, cask, true);
                self.collect_expr(index, path, cask, true);
            }
            ExprKind::Member { base, .. } => self.collect_expr(base, path, cask, true),
            ExprKind::Paren(inner) => self.collect_expr(inner, path, cask, true),
            ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                self.collect_expr(cond, path, cask, true);
                self.collect_expr(then_expr, path, cask, true);
                self.collect_expr(else_expr, path, cask, true);
            }
            ExprKind::Move(inner) => self.collect_expr(inner, path, cask, true),
            ExprKind::Array { items, .. } | ExprKind::Tuple(items) => {
                for i in items {
                    self.collect_expr(i, path, cask, true);
                }
            }
            ExprKind::Match { scrutinee, arms } => {
                self.collect_expr(scrutinee, path, cask, true);
                for arm in arms {
                    self.collect_expr(&arm.expr, path, cask, true);
                }
            }
            ExprKind::IfExpr { arms } => {
                for arm in arms {
                    if let Some(c) = &arm.cond {
                        self.collect_expr(c, path, cask, true);
                    }
                    self.collect_expr(&arm.value, path, cask, true);
                }
            }
            ExprKind::Block(block) => self.collect_stmt(block, path, cask),
            ExprKind::New { args, .. } => {
                for a in args {
                    self.collect_expr(a, path, cask, true);
                }
            }
            _ => {}
        }
    }

    fn collect_stmt(&mut self, s: &'p Stmt, path: &str, cask: &str) {
        match &s.kind {
            StmtKind::Let { expr, .. } | StmtKind::Const { expr, .. } | StmtKind::Expr(expr) => {
                self.collect_expr(expr, path, cask, true);
            }
            StmtKind::Return(Some(e)) => self.collect_expr(e, path, cask, true),
            StmtKind::If { arms } => {
                for arm in arms {
                    if let Some(c) = &arm.cond {
                        self.collect_expr(c, path, cask, true);
                    }
                    self.collect_stmt(&arm.body, path, cask);
                }
            }
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                if let Some(init) = init {
                    self.collect_stmt(init, path, cask);
                }
                if let Some(c) = cond {
                    self.collect_expr(c, path, cask, true);
                }
                if let Some(st) = step {
                    self.collect_expr(st, path, cask, true);
                }
                self.collect_stmt(body, path, cask);
            }
            StmtKind::Foreach { iter, body, .. } => {
                self.collect_expr(iter, path, cask, true);
                self.collect_stmt(body, path, cask);
            }
            StmtKind::Block(stmts) => {
                for st in stmts {
                    self.collect_stmt(st, path, cask);
                }
            }
            _ => {}
        }
    }

    fn collect_program(&mut self) {
        for m in &self.prog.mods {
            let cask = self
                .env
                .cask_name_of_path(&m.path)
                .unwrap_or_default()
                .to_string();
            for d in &m.decls {
                match &d.kind {
                    DeclKind::Fun(fd) => self.collect_stmt(&fd.body, &m.path, &cask),
                    DeclKind::Class(cd) => {
                        for md in &cd.methods {
                            self.collect_stmt(&md.body, &m.path, &cask);
                        }
                    }
                    DeclKind::Entry(ed) => self.collect_stmt(&ed.body, &m.path, &cask),
                    DeclKind::Def(def) => self.collect_expr(&def.expr, &m.path, &cask, true),
                    DeclKind::Const(_) => {}
                }
            }
        }
    }

    // ---- expression consumption ----

    /// Release the result and every other temporary of a consumed
    /// subexpression.
    pub(crate) fn consume(&mut self, ge: &GenExpr) {
        self.line(format!("ergo_release_val({});", ge.tmp));
        self.release_others(ge);
    }

    /// Release everything except the result; the result's ownership was
    /// transferred (moved into a slot, handed to the runtime).
    pub(crate) fn release_others(&mut self, ge: &GenExpr) {
        let others: Vec<String> = ge
            .cleanup
            .iter()
            .filter(|c| **c != ge.tmp)
            .cloned()
            .collect();
        for c in others {
            self.line(format!("ergo_release_val({});", c));
        }
    }

    // ---- top-level emission ----

    fn c_params(count: usize, leading_comma: bool) -> String {
        if count == 0 {
            return if leading_comma { String::new() } else { "void".to_string() };
        }
        let list = (0..count)
            .map(|i| format!("ErgoVal a{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        if leading_comma {
            format!(", {}", list)
        } else {
            list
        }
    }

    fn run(&mut self) -> Result<(), Diag> {
        self.collect_program();

        self.raw(RUNTIME_PRELUDE);
        self.raw(&intrinsics::extern_decls());
        self.line("");

        // module global slots
        self.line("// ---- module globals ----");
        for (i, m) in self.prog.mods.iter().enumerate() {
            let cask = self.env.cask_names[i].name.clone();
            for d in &m.decls {
                if let DeclKind::Def(def) = &d.kind {
                    let g = mangle::global_symbol(&cask, &def.name);
                    self.line(format!("static ErgoVal {} = EV_NULLV;", g));
                }
            }
        }
        self.line("");

        self.line("// ---- class definitions ----");
        self.gen_class_defs();

        self.gen_forward_decls();
        self.gen_lambdas()?;
        self.gen_funval_wrappers();
        self.gen_module_inits()?;

        self.line("// ---- compiled functions ----");
        for i in 0..self.prog.mods.len() {
            let m = &self.prog.mods[i];
            let path = m.path.clone();
            self.set_module_ctx(&path);
            for d in &m.decls {
                match &d.kind {
                    DeclKind::Class(cd) => {
                        for md in &cd.methods {
                            self.gen_method(&path, &cd.name, md)?;
                        }
                    }
                    DeclKind::Fun(fd) => self.gen_fun(&path, fd)?,
                    _ => {}
                }
            }
        }

        self.line("// ---- entry ----");
        self.gen_entry()?;
        self.gen_main();
        Ok(())
    }

    fn gen_class_defs(&mut self) {
        for ci in &self.env.classes {
            let cname = mangle::class_struct_name(&ci.qname);
            let drop = mangle::drop_symbol(&ci.qname);
            let fields: Vec<String> = ci
                .fields
                .iter()
                .map(|f| mangle::field_name(&f.name))
                .collect();
            let mut lines = Vec::new();
            lines.push(format!("typedef struct {} {{", cname));
            lines.push("  ErgoObj base;".to_string());
            for f in &fields {
                lines.push(format!("  ErgoVal {};", f));
            }
            lines.push(format!("}} {};", cname));
            lines.push(format!("static void {}(ErgoObj* o);", drop));
            lines.push(String::new());
            for l in lines {
                self.line(l);
            }
        }
        for ci in &self.env.classes {
            let cname = mangle::class_struct_name(&ci.qname);
            let drop = mangle::drop_symbol(&ci.qname);
            let fields: Vec<String> = ci
                .fields
                .iter()
                .map(|f| mangle::field_name(&f.name))
                .collect();
            let mut lines = Vec::new();
            lines.push(format!("static void {}(ErgoObj* o) {{", drop));
            lines.push(format!("  {}* self = ({}*)o;", cname, cname));
            for f in &fields {
                lines.push(format!("  ergo_release_val(self->{});", f));
            }
            lines.push("}".to_string());
            lines.push(String::new());
            for l in lines {
                self.line(l);
            }
        }
    }

    fn gen_forward_decls(&mut self) {
        if !self.lambdas.is_empty() {
            self.line("// ---- lambda forward decls ----");
            let decls: Vec<String> = self
                .lambdas
                .iter()
                .map(|l| {
                    format!(
                        "static ErgoVal {}(void* env, int argc, ErgoVal* argv);",
                        l.name
                    )
                })
                .collect();
            for d in decls {
                self.line(d);
            }
            self.line("");
        }
        if !self.funvals.is_empty() {
            self.line("// ---- function value forward decls ----");
            let decls: Vec<String> = self
                .funvals
                .iter()
                .map(|f| {
                    format!(
                        "static ErgoVal {}(void* env, int argc, ErgoVal* argv);",
                        f.wrapper
                    )
                })
                .collect();
            for d in decls {
                self.line(d);
            }
            self.line("");
        }

        self.line("// ---- forward decls ----");
        let mut decls: Vec<String> = Vec::new();
        for (i, m) in self.prog.mods.iter().enumerate() {
            let cask = self.env.cask_names[i].name.clone();
            let mut has_defs = false;
            for d in &m.decls {
                match &d.kind {
                    DeclKind::Class(cd) => {
                        for md in &cd.methods {
                            let ret = if md.ret.is_void() { "void" } else { "ErgoVal" };
                            let count = md.params.len().saturating_sub(1);
                            decls.push(format!(
                                "static {} {}(ErgoVal self{});",
                                ret,
                                mangle::method_symbol(&cask, &cd.name, &md.name),
                                Self::c_params(count, true)
                            ));
                        }
                    }
                    DeclKind::Fun(fd) => {
                        let ret = if fd.ret.is_void() { "void" } else { "ErgoVal" };
                        decls.push(format!(
                            "static {} {}({});",
                            ret,
                            mangle::fun_symbol(&cask, &fd.name),
                            Self::c_params(fd.params.len(), false)
                        ));
                    }
                    DeclKind::Def(_) => has_defs = true,
                    _ => {}
                }
            }
            if has_defs {
                decls.push(format!("static void {}(void);", mangle::init_symbol(&cask)));
            }
        }
        decls.push("static void ergo_entry(void);".to_string());
        for d in decls {
            self.line(d);
        }
        self.line("");
    }

    fn gen_lambdas(&mut self) -> Result<(), Diag> {
        if self.lambdas.is_empty() {
            return Ok(());
        }
        self.line("// ---- lambda defs ----");
        let slots: Vec<(&'p Expr, String, String)> = self
            .lambdas
            .iter()
            .map(|l| (l.expr, l.path.clone(), l.name.clone()))
            .collect();
        for (expr, path, name) in slots {
            let ExprKind::Lambda { params, body } = &expr.kind else {
                continue;
            };
            self.set_module_ctx(&path);
            self.reset_fn_state();
            self.indent = 0;

            self.open(format!(
                "static ErgoVal {}(void* env, int argc, ErgoVal* argv) {{",
                name
            ));
            self.line("(void)env;");
            self.line(format!(
                "if (argc != {}) ergo_trap(\"lambda arity mismatch\");",
                params.len()
            ));
            for (i, p) in params.iter().enumerate() {
                let cname = format!("arg{}", i);
                self.line(format!("ErgoVal {} = argv[{}];", cname, i));
                let ty = match &p.typ {
                    Some(tr) => self.env.ty_from_type_ref(
                        tr,
                        &self.current_cask,
                        &self.current_path,
                        &self.current_imports,
                    )?,
                    None => self.env.arena.gen(p.name.clone()),
                };
                self.bind_param(&p.name, cname, ty, p.is_mut);
            }
            self.line("ErgoVal __ret = EV_NULLV;");
            let ge = self.gen_expr(body)?;
            self.line(format!("ergo_move_into(&__ret, {});", ge.tmp));
            self.release_others(&ge);
            let locals = self.pop_scope();
            self.release_locals(locals);
            self.line("return __ret;");
            self.close("}");
            self.line("");
        }
        Ok(())
    }

    fn gen_funval_wrappers(&mut self) {
        if self.funvals.is_empty() {
            return;
        }
        self.line("// ---- function value defs ----");
        let wrappers: Vec<(String, String, String)> = self
            .funvals
            .iter()
            .map(|f| (f.cask.clone(), f.name.clone(), f.wrapper.clone()))
            .collect();
        for (cask, name, wrapper) in wrappers {
            let Some(sig) = self.env.find_fun(&cask, &name) else {
                continue;
            };
            let argc = sig.params.len();
            let ret_void = sig.ret.is_void();
            let direct = mangle::fun_symbol(&cask, &name);
            self.open(format!(
                "static ErgoVal {}(void* env, int argc, ErgoVal* argv) {{",
                wrapper
            ));
            self.line("(void)env;");
            self.line(format!(
                "if (argc != {}) ergo_trap(\"fn arity mismatch\");",
                argc
            ));
            let args = (0..argc)
                .map(|i| format!("argv[{}]", i))
                .collect::<Vec<_>>()
                .join(", ");
            if ret_void {
                self.line(format!("{}({});", direct, args));
                self.line("return EV_NULLV;");
            } else {
                self.line(format!("return {}({});", direct, args));
            }
            self.close("}");
        }
        self.line("");
    }

    fn gen_module_inits(&mut self) -> Result<(), Diag> {
        self.line("// ---- module global init ----");
        for i in 0..self.prog.mods.len() {
            let m = &self.prog.mods[i];
            let path = m.path.clone();
            let cask = self.env.cask_names[i].name.clone();
            let has_defs = m
                .decls
                .iter()
                .any(|d| matches!(d.kind, DeclKind::Def(_)));
            if !has_defs {
                continue;
            }
            self.set_module_ctx(&path);
            self.reset_fn_state();
            self.indent = 0;
            self.open(format!("static void {}(void) {{", mangle::init_symbol(&cask)));
            for d in &m.decls {
                if let DeclKind::Def(def) = &d.kind {
                    let ge = self.gen_expr(&def.expr)?;
                    let g = mangle::global_symbol(&cask, &def.name);
                    self.line(format!("ergo_move_into(&{}, {});", g, ge.tmp));
                    self.release_others(&ge);
                }
            }
            self.close("}");
            self.line("");
        }
        Ok(())
    }

    fn gen_fun(&mut self, path: &str, fd: &'p FunDecl) -> Result<(), Diag> {
        self.set_module_ctx(path);
        self.reset_fn_state();
        self.indent = 0;

        let sig_params: Vec<&'t Ty<'t>> = self
            .env
            .find_fun(&self.current_cask, &fd.name)
            .map(|s| s.params.clone())
            .unwrap_or_default();
        for (i, p) in fd.params.iter().enumerate() {
            let ty = sig_params
                .get(i)
                .copied()
                .unwrap_or_else(|| self.env.arena.any());
            self.bind_param(&p.name, format!("a{}", i), ty, p.is_mut);
        }

        let ret_void = fd.ret.is_void();
        let ret = if ret_void { "void" } else { "ErgoVal" };
        let symbol = mangle::fun_symbol(&self.current_cask, &fd.name);
        self.open(format!(
            "static {} {}({}) {{",
            ret,
            symbol,
            Self::c_params(fd.params.len(), false)
        ));
        if !ret_void {
            self.line("ErgoVal __ret = EV_NULLV;");
        }
        self.gen_body(&fd.body, ret_void)?;
        let locals = self.pop_scope();
        self.release_locals(locals);
        if !ret_void {
            self.line("return __ret;");
        }
        self.close("}");
        self.line("");
        Ok(())
    }

    fn gen_method(&mut self, path: &str, class: &str, md: &'p FunDecl) -> Result<(), Diag> {
        self.set_module_ctx(path);
        self.reset_fn_state();
        self.indent = 0;

        let qname = crate::env::qualify(&self.current_cask, class);
        self.current_class = Some(qname.clone());

        let self_ty = self.env.arena.class(qname.clone());
        if let Some(recv) = md.params.first() {
            self.bind_param(&recv.name, "self".to_string(), self_ty, recv.is_mut);
        }
        let sig_params: Vec<&'t Ty<'t>> = self
            .env
            .find_class(&qname)
            .and_then(|ci| ci.find_method(&md.name))
            .map(|m| m.sig.params.clone())
            .unwrap_or_default();
        for (i, p) in md.params.iter().skip(1).enumerate() {
            let ty = sig_params
                .get(i)
                .copied()
                .unwrap_or_else(|| self.env.arena.any());
            self.bind_param(&p.name, format!("a{}", i), ty, p.is_mut);
        }

        let ret_void = md.ret.is_void();
        let ret = if ret_void { "void" } else { "ErgoVal" };
        let symbol = mangle::method_symbol(&self.current_cask, class, &md.name);
        let count = md.params.len().saturating_sub(1);
        self.open(format!(
            "static {} {}(ErgoVal self{}) {{",
            ret,
            symbol,
            Self::c_params(count, true)
        ));
        if !ret_void {
            self.line("ErgoVal __ret = EV_NULLV;");
        }
        self.gen_body(&md.body, ret_void)?;
        let locals = self.pop_scope();
        self.release_locals(locals);
        if !ret_void {
            self.line("return __ret;");
        }
        self.close("}");
        self.line("");
        self.current_class = None;
        Ok(())
    }

    fn gen_entry(&mut self) -> Result<(), Diag> {
        let mut entry: Option<(&'p Stmt, String)> = None;
        for m in &self.prog.mods {
            for d in &m.decls {
                if let DeclKind::Entry(ed) = &d.kind {
                    entry = Some((&ed.body, m.path.clone()));
                }
            }
        }
        let Some((body, path)) = entry else {
            return Err(Diag::message("missing entry()"));
        };
        self.set_module_ctx(&path);
        self.reset_fn_state();
        self.indent = 0;

        self.open("static void ergo_entry(void) {");
        // module initializers run in program declaration order
        for (i, m) in self.prog.mods.iter().enumerate() {
            let cask = self.env.cask_names[i].name.clone();
            let has_defs = m
                .decls
                .iter()
                .any(|d| matches!(d.kind, DeclKind::Def(_)));
            if has_defs {
                self.line(format!("{}();", mangle::init_symbol(&cask)));
            }
        }
        self.gen_body(body, true)?;
        let locals = self.pop_scope();
        self.release_locals(locals);
        self.close("}");
        self.line("");
        Ok(())
    }

    fn gen_main(&mut self) {
        self.open("int main(void) {");
        self.line("#ifdef __OBJC__");
        self.open("@autoreleasepool {");
        self.line("ergo_runtime_init();");
        self.line("ergo_entry();");
        self.close("}");
        self.line("#else");
        self.line("ergo_runtime_init();");
        self.line("ergo_entry();");
        self.line("#endif");
        self.line("return 0;");
        self.close("}");
    }
}

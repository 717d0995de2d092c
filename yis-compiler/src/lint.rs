// Control-flow lint pass, run over the whole program after (or instead
// of) strict type checking. Non-fatal in warn mode; strict mode
// promotes every finding to an error and the report turns failing.
// Checks: implicit truthiness in conditions, null flow through
// unguarded indexing into non-null positions, and missing return
// coverage. Findings keep collecting; nothing here short-circuits.

use log::debug;
use yis_ast::{BinOp, DeclKind, Expr, ExprKind, FunDecl, PatternKind, Program, Stmt, StmtKind};
use yis_diagnostics::{print_span_finding, Diag, Level};

use crate::env::{build_global_env, GlobalEnv};
use crate::typecheck::{describe_fallthrough, stmt_guarantees_return, Binding, Checker};
use crate::types::{Ty, TyArena};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LintMode {
    Warn,
    Strict,
}

#[derive(Debug, Clone)]
pub struct LintFinding {
    pub path: String,
    pub line: u32,
    pub col: u32,
    pub message: String,
    pub hint: &'static str,
}

/// Tallied findings of one lint run. In strict mode every finding is an
/// error and `ok()` fails when any were produced.
#[derive(Debug)]
pub struct LintReport {
    pub mode: LintMode,
    pub findings: Vec<LintFinding>,
    pub warnings: usize,
    pub errors: usize,
}

impl LintReport {
    pub fn ok(&self) -> bool {
        match self.mode {
            LintMode::Warn => true,
            LintMode::Strict => self.errors == 0,
        }
    }
}

struct LintState {
    mode: LintMode,
    report: LintReport,
}

impl LintState {
    fn emit(&mut self, path: &str, line: u32, col: u32, message: String, hint: &'static str) {
        let level = match self.mode {
            LintMode::Warn => {
                self.report.warnings += 1;
                Level::Warning
            }
            LintMode::Strict => {
                self.report.errors += 1;
                Level::Error
            }
        };
        let line = line.max(1);
        let col = col.max(1);
        print_span_finding(level, path, line, col, &message, Some(hint));
        self.report.findings.push(LintFinding {
            path: path.to_string(),
            line,
            col,
            message,
            hint,
        });
    }
}

/// A position requires a non-null value unless its declared type is
/// void, null, nullable or `any`.
fn requires_non_null(t: &Ty<'_>) -> bool {
    !(t.is_void() || t.is_null() || t.is_nullable() || t.is_any())
}

fn match_has_null_arm(e: &Expr) -> bool {
    let ExprKind::Match { arms, .. } = &e.kind else {
        return false;
    };
    arms.iter().any(|a| matches!(a.pat.kind, PatternKind::Null))
}

fn stmt_value_has_unchecked_index(s: &Stmt) -> bool {
    match &s.kind {
        StmtKind::Return(Some(e)) => expr_value_has_unchecked_index(e),
        StmtKind::Return(None) => false,
        StmtKind::Expr(e) => expr_value_has_unchecked_index(e),
        StmtKind::Block(stmts) => stmts.iter().any(stmt_value_has_unchecked_index),
        StmtKind::If { arms } => arms
            .iter()
            .any(|a| stmt_value_has_unchecked_index(&a.body)),
        _ => false,
    }
}

/// Whether the value of this expression can come from an index
/// expression with no null guard. The right side of `??` is guarded,
/// and so is the scrutinee of a match with an explicit null arm.
fn expr_value_has_unchecked_index(e: &Expr) -> bool {
    match &e.kind {
        ExprKind::Index { .. } => true,
        ExprKind::Unary { expr, .. } => expr_value_has_unchecked_index(expr),
        ExprKind::Paren(inner) => expr_value_has_unchecked_index(inner),
        ExprKind::Move(inner) => expr_value_has_unchecked_index(inner),
        ExprKind::Binary { op, lhs, rhs } => {
            if *op == BinOp::Coalesce {
                return expr_value_has_unchecked_index(rhs);
            }
            expr_value_has_unchecked_index(lhs) || expr_value_has_unchecked_index(rhs)
        }
        ExprKind::Ternary {
            then_expr,
            else_expr,
            ..
        } => expr_value_has_unchecked_index(then_expr) || expr_value_has_unchecked_index(else_expr),
        ExprKind::IfExpr { arms } => arms.iter().any(|a| expr_value_has_unchecked_index(&a.value)),
        ExprKind::Match { scrutinee, arms } => {
            if !match_has_null_arm(e) && expr_value_has_unchecked_index(scrutinee) {
                return true;
            }
            arms.iter().any(|a| expr_value_has_unchecked_index(&a.expr))
        }
        ExprKind::Block(block) => stmt_value_has_unchecked_index(block),
        _ => false,
    }
}

const NULL_FLOW_HINT: &str = "use ??, an explicit null check, or match to handle null.";
const TRUTHINESS_HINT: &str = "use an explicit comparison or null check.";
const COVERAGE_HINT: &str = "add explicit return statements for every path.";

fn check_index_flow(ck: &Checker<'_, '_>, ls: &mut LintState, value: &Expr, context: &str) {
    if !expr_value_has_unchecked_index(value) {
        return;
    }
    ls.emit(
        &ck.cask_path,
        value.line,
        value.col,
        format!("indexing expression may yield null when used as {}", context),
        NULL_FLOW_HINT,
    );
}

fn check_truthiness(ck: &mut Checker<'_, '_>, ls: &mut LintState, cond: &Expr, place: &str) {
    let Ok(ct) = ck.check_expr(cond) else {
        return;
    };
    if ct.is_void() || ct.is_bool() {
        return;
    }
    ls.emit(
        &ck.cask_path,
        cond.line,
        cond.col,
        format!(
            "implicit truthiness in {} condition (type {})",
            place,
            ct.describe()
        ),
        TRUTHINESS_HINT,
    );
}

/// Re-derive the callee's parameter types (a lighter pass than full
/// call checking) and flag unguarded index flow into non-null params.
fn lint_call_args<'t>(ck: &mut Checker<'_, 't>, ls: &mut LintState, e: &Expr) {
    let ExprKind::Call { callee, args } = &e.kind else {
        return;
    };
    let mut params: Vec<&'t Ty<'t>> = Vec::new();
    match &callee.kind {
        ExprKind::Ident(name) => {
            if let Some(b) = ck.locals.lookup(name) {
                if let Some((p, _)) = b.ty.as_fn() {
                    params = p.to_vec();
                }
            } else {
                let sig = ck
                    .env
                    .find_fun(&ck.cask_name, name)
                    .or_else(|| ck.stdr_prelude_sig(name));
                if let Some(sig) = sig {
                    params = sig.params.clone();
                }
            }
        }
        ExprKind::Member { base, name } => {
            if let ExprKind::Ident(cask) = &base.kind {
                if ck.cask_in_scope(cask) {
                    if let Some(sig) = ck.env.find_fun(cask, name) {
                        params = sig.params.clone();
                    }
                }
            }
            if params.is_empty() {
                if let Ok(base_ty) = ck.check_expr(base) {
                    if let Ty::Class(qname) = base_ty.strip_nullable() {
                        if let Some(m) = ck
                            .env
                            .find_class(qname)
                            .and_then(|ci| ci.find_method(name))
                        {
                            params = m.sig.params.clone();
                        }
                    }
                }
            }
        }
        _ => {}
    }

    for (i, arg) in args.iter().enumerate() {
        if let Some(pty) = params.get(i) {
            if requires_non_null(pty) {
                check_index_flow(ck, ls, arg, "a non-null call argument");
            }
        }
        lint_expr(ck, ls, arg);
    }
}

fn lint_expr(ck: &mut Checker<'_, '_>, ls: &mut LintState, e: &Expr) {
    match &e.kind {
        ExprKind::Unary { expr, .. } => lint_expr(ck, ls, expr),
        ExprKind::Binary { lhs, rhs, .. } => {
            lint_expr(ck, ls, lhs);
            lint_expr(ck, ls, rhs);
        }
        ExprKind::Assign { target, value, .. } => {
            let target_ty = match &target.kind {
                ExprKind::Ident(name) => ck.locals.lookup(name).map(|b| b.ty),
                _ => None,
            };
            if let Some(tty) = target_ty {
                if requires_non_null(tty) {
                    check_index_flow(ck, ls, value, "a non-null assignment");
                }
            }
            lint_expr(ck, ls, target);
            lint_expr(ck, ls, value);
        }
        ExprKind::Call { callee, .. } => {
            if let ExprKind::Member { base, .. } = &callee.kind {
                check_index_flow(ck, ls, base, "a call receiver");
                lint_expr(ck, ls, base);
            } else {
                lint_expr(ck, ls, callee);
            }
            lint_call_args(ck, ls, e);
        }
        ExprKind::Index { base, index } => {
            lint_expr(ck, ls, base);
            lint_expr(ck, ls, index);
        }
        ExprKind::Member { base, .. } => {
            check_index_flow(ck, ls, base, "a member access receiver");
            lint_expr(ck, ls, base);
        }
        ExprKind::Paren(inner) => lint_expr(ck, ls, inner),
        ExprKind::Match { scrutinee, arms } => {
            lint_expr(ck, ls, scrutinee);
            for arm in arms {
                lint_expr(ck, ls, &arm.expr);
            }
        }
        ExprKind::Lambda { body, .. } => lint_expr(ck, ls, body),
        ExprKind::Block(block) => {
            let placeholder = ck.arena().null();
            lint_stmt(ck, ls, block, placeholder);
        }
        ExprKind::New { args, .. } => {
            for arg in args {
                lint_expr(ck, ls, arg);
            }
        }
        ExprKind::IfExpr { arms } => {
            for arm in arms {
                if let Some(cond) = &arm.cond {
                    check_truthiness(ck, ls, cond, "if");
                    lint_expr(ck, ls, cond);
                }
                lint_expr(ck, ls, &arm.value);
            }
        }
        ExprKind::Ternary {
            cond,
            then_expr,
            else_expr,
        } => {
            check_truthiness(ck, ls, cond, "ternary");
            lint_expr(ck, ls, cond);
            lint_expr(ck, ls, then_expr);
            lint_expr(ck, ls, else_expr);
        }
        ExprKind::Move(inner) => lint_expr(ck, ls, inner),
        ExprKind::Tuple(items) => {
            for item in items {
                lint_expr(ck, ls, item);
            }
        }
        ExprKind::Array { items, .. } => {
            for item in items {
                lint_expr(ck, ls, item);
            }
        }
        _ => {}
    }
}

fn lint_stmt<'t>(ck: &mut Checker<'_, 't>, ls: &mut LintState, s: &Stmt, ret_ty: &'t Ty<'t>) {
    match &s.kind {
        StmtKind::Let { name, is_mut, expr } => {
            if let Ok(ty) = ck.check_expr(expr) {
                ck.locals.define(name, Binding::new(ty, *is_mut));
            }
            lint_expr(ck, ls, expr);
        }
        StmtKind::Const { name, expr } => {
            if let Ok(ty) = ck.check_expr(expr) {
                ck.locals.define(name, Binding::constant(ty));
            }
            lint_expr(ck, ls, expr);
        }
        StmtKind::Expr(e) => lint_expr(ck, ls, e),
        StmtKind::Return(value) => {
            if let Some(value) = value {
                if requires_non_null(ret_ty) {
                    check_index_flow(ck, ls, value, "a non-null return value");
                }
                lint_expr(ck, ls, value);
            }
        }
        StmtKind::If { arms } => {
            for arm in arms {
                let saved = ck.locals.clone();
                if let Some(cond) = &arm.cond {
                    check_truthiness(ck, ls, cond, "if");
                    lint_expr(ck, ls, cond);
                }
                lint_stmt(ck, ls, &arm.body, ret_ty);
                ck.locals = saved;
            }
        }
        StmtKind::For {
            init,
            cond,
            step,
            body,
        } => {
            ck.locals.push();
            if let Some(init) = init {
                lint_stmt(ck, ls, init, ret_ty);
            }
            if let Some(cond) = cond {
                check_truthiness(ck, ls, cond, "for");
                lint_expr(ck, ls, cond);
            }
            if let Some(step) = step {
                lint_expr(ck, ls, step);
            }
            lint_stmt(ck, ls, body, ret_ty);
            ck.locals.pop();
        }
        StmtKind::Foreach { name, iter, body } => {
            lint_expr(ck, ls, iter);
            let elem = match ck.check_expr(iter).map(|t| t.strip_nullable()) {
                Ok(Ty::Array(elem)) => *elem,
                Ok(t) if t.is_string() => ck.arena().string(),
                _ => ck.arena().any(),
            };
            ck.locals.push();
            ck.locals.define(name, Binding::new(elem, false));
            lint_stmt(ck, ls, body, ret_ty);
            ck.locals.pop();
        }
        StmtKind::Block(stmts) => {
            ck.locals.push();
            for st in stmts {
                lint_stmt(ck, ls, st, ret_ty);
            }
            ck.locals.pop();
        }
        StmtKind::Break | StmtKind::Continue => {}
    }
}

fn lint_fun<'t>(
    env: &GlobalEnv<'t>,
    ls: &mut LintState,
    cask_path: &str,
    cask_name: &str,
    imports: &[String],
    fun: &FunDecl,
    owner: Option<&crate::env::ClassInfo<'t>>,
    decl_line: u32,
    decl_col: u32,
) {
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
            None => env.arena.any(),
        };
        ck.locals.define(&p.name, Binding::new(ty, p.is_mut));
    }
    let ret_ty = sig.map(|s| s.ret).unwrap_or_else(|| env.arena.void());

    if !ret_ty.is_void() && !fun.body.is_empty_block() && !stmt_guarantees_return(&fun.body) {
        let qualified = match owner {
            Some(ci) => format!("{}.{}", ci.name, fun.name),
            None => fun.name.clone(),
        };
        ls.emit(
            cask_path,
            decl_line,
            decl_col,
            format!(
                "missing return coverage in function '{}': {}",
                qualified,
                describe_fallthrough(&fun.body)
            ),
            COVERAGE_HINT,
        );
    }
    lint_stmt(&mut ck, ls, &fun.body, ret_ty);
}

/// Run the lint pass over the whole program. The environment build can
/// still fail fatally; findings themselves never abort the walk.
pub fn lint_program<'t>(
    prog: &Program,
    arena: &'t TyArena<'t>,
    mode: LintMode,
) -> Result<LintReport, Diag> {
    let env = build_global_env(prog, arena)?;
    let mut ls = LintState {
        mode,
        report: LintReport {
            mode,
            findings: Vec::new(),
            warnings: 0,
            errors: 0,
        },
    };

    for m in &prog.mods {
        let cask = env.cask_name_of_path(&m.path).unwrap_or("").to_string();
        let imports = env.imports_of(&cask).to_vec();
        for d in &m.decls {
            match &d.kind {
                DeclKind::Fun(fd) => {
                    lint_fun(&env, &mut ls, &m.path, &cask, &imports, fd, None, d.line, d.col);
                }
                DeclKind::Class(cd) => {
                    let qname = crate::env::qualify(&cask, &cd.name);
                    let Some(ci) = env.find_class(&qname) else {
                        continue;
                    };
                    for md in &cd.methods {
                        lint_fun(
                            &env, &mut ls, &m.path, &cask, &imports, md, Some(ci), d.line, d.col,
                        );
                    }
                }
                DeclKind::Entry(ed) => {
                    let mut ck = Checker::new(&env, &m.path, &cask, &imports);
                    let ret_ty = env
                        .resolve_ret(&ed.ret, &cask, &m.path, &imports)
                        .unwrap_or_else(|_| env.arena.void());
                    lint_stmt(&mut ck, &mut ls, &ed.body, ret_ty);
                }
                _ => {}
            }
        }
    }

    debug!(
        "lint: {} warning(s), {} error(s)",
        ls.report.warnings, ls.report.errors
    );
    Ok(ls.report)
}

// Expression typing rules.

use yis_ast::{AssignOp, BinOp, Expr, ExprKind, Pattern, PatternKind, StrPart, UnaryOp};
use yis_ast::{ClassKind, Visibility};
use yis_diagnostics::Diag;

use crate::types::{assignable, unify, Ty};

use super::{Binding, Checker};

impl<'e, 't> Checker<'e, 't> {
    pub fn check_expr(&mut self, e: &Expr) -> Result<&'t Ty<'t>, Diag> {
        match &e.kind {
            ExprKind::Int(_) | ExprKind::Float(_) => Ok(self.arena().num()),
            ExprKind::Bool(_) => Ok(self.arena().boolean()),
            ExprKind::Null => Ok(self.arena().null()),
            ExprKind::Str(parts) => {
                for part in parts {
                    if let StrPart::Interp(name) = part {
                        let known = self.locals.lookup(name).is_some()
                            || self.env.find_global(&self.cask_name, name).is_some();
                        if !known {
                            return Err(self.err(
                                e.line,
                                e.col,
                                format!("unknown name '{}'", name),
                            ));
                        }
                    }
                }
                Ok(self.arena().string())
            }
            ExprKind::Ident(name) => {
                if let Some(b) = self.locals.lookup(name) {
                    if b.is_moved {
                        return Err(self.err(
                            e.line,
                            e.col,
                            format!("use of moved value '{}'", name),
                        ));
                    }
                    return Ok(b.ty);
                }
                if self.cask_in_scope(name) {
                    return Ok(self.arena().module(name.clone()));
                }
                if let Some(gv) = self.env.find_global(&self.cask_name, name) {
                    return match gv.ty.get() {
                        Some(ty) => Ok(ty),
                        None => Err(self.err(
                            e.line,
                            e.col,
                            format!("global '{}' used before definition", name),
                        )),
                    };
                }
                let sig = self
                    .env
                    .find_fun(&self.cask_name, name)
                    .or_else(|| self.stdr_prelude_sig(name));
                if let Some(sig) = sig {
                    return Ok(self.arena().func(sig.params.clone(), sig.ret));
                }
                Err(self.err(e.line, e.col, format!("unknown name '{}'", name)))
            }
            ExprKind::Tuple(items) => {
                let mut tys = Vec::with_capacity(items.len());
                for item in items {
                    tys.push(self.check_expr(item)?);
                }
                Ok(self.arena().tuple(tys))
            }
            ExprKind::Array { items, annot } => {
                if items.is_empty() {
                    let Some(annot) = annot else {
                        return Err(self.err(
                            e.line,
                            e.col,
                            "cannot infer type of empty array []",
                        ));
                    };
                    let ty = self.env.ty_from_type_ref(
                        annot,
                        &self.cask_name,
                        &self.cask_path,
                        &self.imports,
                    )?;
                    if !matches!(ty, Ty::Array(_)) {
                        return Err(self.err(
                            e.line,
                            e.col,
                            "empty array annotation must be array type like [num]",
                        ));
                    }
                    return Ok(ty);
                }
                let mut elem = self.check_expr(&items[0])?;
                for item in items.iter().skip(1) {
                    let t = self.check_expr(item)?;
                    elem = unify(self.arena(), elem, t, &self.cask_path, "array literal", None)?;
                }
                if let Some(annot) = annot {
                    let ty = self.env.ty_from_type_ref(
                        annot,
                        &self.cask_name,
                        &self.cask_path,
                        &self.imports,
                    )?;
                    let Ty::Array(annot_elem) = ty else {
                        return Err(self.err(
                            e.line,
                            e.col,
                            "array annotation must be array type like [num]",
                        ));
                    };
                    elem = unify(
                        self.arena(),
                        elem,
                        *annot_elem,
                        &self.cask_path,
                        "array annotation",
                        None,
                    )?;
                }
                Ok(self.arena().array(elem))
            }
            ExprKind::Unary { op, expr } => {
                let ty = self.check_expr(expr)?;
                match op {
                    UnaryOp::Not => {
                        if ty.is_nullable() {
                            return Err(self.err(e.line, e.col, "! on nullable value"));
                        }
                        unify(
                            self.arena(),
                            ty,
                            self.arena().boolean(),
                            &self.cask_path,
                            "!",
                            None,
                        )?;
                        Ok(self.arena().boolean())
                    }
                    UnaryOp::Neg => {
                        if ty.is_nullable() {
                            return Err(self.err(e.line, e.col, "unary - on nullable value"));
                        }
                        if !ty.strip_nullable().is_num() {
                            return Err(self.err(e.line, e.col, "unary - expects numeric"));
                        }
                        Ok(self.arena().num())
                    }
                    UnaryOp::Len => {
                        // survives only in un-lowered input
                        if ty.is_nullable() {
                            return Err(self.err(e.line, e.col, "# on nullable value"));
                        }
                        if matches!(ty, Ty::Array(_)) || ty.is_string() {
                            Ok(self.arena().num())
                        } else {
                            Err(self.err(e.line, e.col, "# expects array or string"))
                        }
                    }
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let ta = self.check_expr(lhs)?;
                let tb = self.check_expr(rhs)?;
                match op {
                    BinOp::Coalesce => {
                        if ta.is_void() || tb.is_void() {
                            return Err(self.err(e.line, e.col, "?? operands cannot be void"));
                        }
                        if ta.is_null() {
                            return Ok(tb);
                        }
                        if ta.is_nullable() {
                            return unify(
                                self.arena(),
                                ta.strip_nullable(),
                                tb,
                                &self.cask_path,
                                "??",
                                None,
                            );
                        }
                        unify(self.arena(), ta, tb, &self.cask_path, "??", None)
                    }
                    op if op.is_arith() => {
                        if ta.is_nullable() || tb.is_nullable() {
                            return Err(self.err(e.line, e.col, "operator on nullable value"));
                        }
                        self.numeric_result(ta, tb, op.symbol(), e.line, e.col)
                    }
                    op if op.is_comparison() => {
                        if ta.is_nullable() || tb.is_nullable() {
                            return Err(self.err(e.line, e.col, "comparison on nullable value"));
                        }
                        if !ta.strip_nullable().is_num() || !tb.strip_nullable().is_num() {
                            return Err(self.err(
                                e.line,
                                e.col,
                                "comparison expects numeric types",
                            ));
                        }
                        Ok(self.arena().boolean())
                    }
                    BinOp::And | BinOp::Or => {
                        if ta.is_void() || tb.is_void() {
                            return Err(self.err(e.line, e.col, "logical op on void value"));
                        }
                        Ok(self.arena().boolean())
                    }
                    BinOp::Eq | BinOp::Ne => {
                        unify(self.arena(), ta, tb, &self.cask_path, op.symbol(), None)?;
                        Ok(self.arena().boolean())
                    }
                    _ => Err(self.err(e.line, e.col, "unknown binary op")),
                }
            }
            ExprKind::Assign { op, target, value } => self.check_assign(e, *op, target, value),
            ExprKind::Member { base, name } => self.check_member(e, base, name),
            ExprKind::Index { base, index } => {
                let ta = self.check_expr(base)?;
                let ti = self.check_expr(index)?;
                unify(
                    self.arena(),
                    ti,
                    self.arena().num(),
                    &self.cask_path,
                    "index",
                    None,
                )?;
                if ta.is_nullable() {
                    return Err(self.err(e.line, e.col, "indexing nullable value"));
                }
                match ta.strip_nullable() {
                    Ty::Array(elem) => Ok(*elem),
                    Ty::Tuple(items) => {
                        let ExprKind::Int(idx) = index.kind else {
                            return Err(self.err(
                                e.line,
                                e.col,
                                "tuple index must be integer literal",
                            ));
                        };
                        if idx < 0 || idx as usize >= items.len() {
                            return Err(self.err(e.line, e.col, "tuple index out of range"));
                        }
                        Ok(items[idx as usize])
                    }
                    t if t.is_string() => Ok(self.arena().string()),
                    _ => Err(self.err(e.line, e.col, "indexing requires array or string")),
                }
            }
            ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                let ct = self.check_expr(cond)?;
                if ct.is_void() {
                    return Err(self.err(e.line, e.col, "ternary condition cannot be void"));
                }
                let ta = self.check_expr(then_expr)?;
                let tb = self.check_expr(else_expr)?;
                unify(self.arena(), ta, tb, &self.cask_path, "ternary", None)
            }
            ExprKind::IfExpr { arms } => {
                let mut arm_ty: Option<&'t Ty<'t>> = None;
                let mut saw_else = false;
                for arm in arms {
                    match &arm.cond {
                        Some(cond) => {
                            let ct = self.check_expr(cond)?;
                            if ct.is_void() {
                                return Err(self.err(
                                    e.line,
                                    e.col,
                                    "if condition cannot be void",
                                ));
                            }
                        }
                        None => saw_else = true,
                    }
                    let vt = self.check_expr(&arm.value)?;
                    arm_ty = Some(match arm_ty {
                        Some(prev) => unify(
                            self.arena(),
                            prev,
                            vt,
                            &self.cask_path,
                            "if expression",
                            None,
                        )?,
                        None => vt,
                    });
                }
                if !saw_else {
                    return Err(self.err(e.line, e.col, "if expression requires else branch"));
                }
                Ok(arm_ty.unwrap_or_else(|| self.arena().null()))
            }
            ExprKind::Match { scrutinee, arms } => {
                if arms.is_empty() {
                    return Err(self.err(e.line, e.col, "match requires at least one arm"));
                }
                let scrut_ty = self.check_expr(scrutinee)?;
                let mut arm_ty: Option<&'t Ty<'t>> = None;
                for arm in arms {
                    let saved = self.locals.clone();
                    self.check_pattern(&arm.pat, scrut_ty)?;
                    let t = self.check_expr(&arm.expr)?;
                    self.locals = saved;
                    arm_ty = Some(match arm_ty {
                        Some(prev) => {
                            unify(self.arena(), prev, t, &self.cask_path, "match", None)?
                        }
                        None => t,
                    });
                }
                Ok(arm_ty.unwrap_or_else(|| self.arena().null()))
            }
            ExprKind::Lambda { params, body } => {
                let saved = self.locals.clone();
                self.locals.push();
                let mut param_tys = Vec::with_capacity(params.len());
                for p in params {
                    if p.is_this {
                        self.locals = saved;
                        return Err(self.err(e.line, e.col, "lambda params cannot be this"));
                    }
                    let ty = match &p.typ {
                        Some(tr) => self.env.ty_from_type_ref(
                            tr,
                            &self.cask_name,
                            &self.cask_path,
                            &self.imports,
                        )?,
                        None => {
                            let gen = self.fresh_gen(&p.name);
                            self.arena().gen(gen)
                        }
                    };
                    self.locals.define(&p.name, Binding::new(ty, p.is_mut));
                    param_tys.push(ty);
                }
                let body_ty = self.check_expr(body);
                self.locals = saved;
                Ok(self.arena().func(param_tys, body_ty?))
            }
            ExprKind::Block(block) => {
                let placeholder = self.arena().null();
                self.check_stmt(block, placeholder)?;
                Ok(placeholder)
            }
            ExprKind::New {
                class,
                args,
                arg_names,
            } => self.check_new(e, class, args, arg_names),
            ExprKind::Move(inner) => {
                let ExprKind::Ident(name) = &inner.kind else {
                    return Err(self.err(e.line, e.col, "move(...) must be an identifier"));
                };
                let ty = self.check_expr(inner)?;
                if let Some(b) = self.locals.lookup_mut(name) {
                    b.is_moved = true;
                }
                Ok(ty)
            }
            ExprKind::Call { .. } => self.check_call(e),
            ExprKind::Paren(inner) => self.check_expr(inner),
        }
    }

    pub(crate) fn numeric_result(
        &self,
        a: &'t Ty<'t>,
        b: &'t Ty<'t>,
        op: &str,
        line: u32,
        col: u32,
    ) -> Result<&'t Ty<'t>, Diag> {
        if !a.strip_nullable().is_num() || !b.strip_nullable().is_num() {
            return Err(self.err(line, col, format!("operator {} expects numeric types", op)));
        }
        Ok(self.arena().num())
    }

    fn check_assign(
        &mut self,
        e: &Expr,
        op: AssignOp,
        target: &Expr,
        value: &Expr,
    ) -> Result<&'t Ty<'t>, Diag> {
        match &target.kind {
            ExprKind::Ident(name) => {
                if let Some(b) = self.locals.lookup(name).copied() {
                    if b.is_const {
                        return Err(self.err(
                            e.line,
                            e.col,
                            format!("cannot assign to const '{}'", name),
                        ));
                    }
                    if !b.is_mut {
                        return Err(self.err(
                            e.line,
                            e.col,
                            format!("cannot assign to immutable '{}'", name),
                        ));
                    }
                    if op.is_compound() && b.is_moved {
                        return Err(self.err(
                            e.line,
                            e.col,
                            format!("use of moved value '{}'", name),
                        ));
                    }
                    let tv = self.check_expr(value)?;
                    let new_ty = self.assignment_result(b.ty, tv, op, e.line, e.col)?;
                    if let Some(slot) = self.locals.lookup_mut(name) {
                        slot.ty = new_ty;
                        slot.is_moved = false;
                    }
                    return Ok(new_ty);
                }
                if let Some(gv) = self.env.find_global(&self.cask_name, name) {
                    if !gv.is_mut {
                        return Err(self.err(
                            e.line,
                            e.col,
                            format!("cannot assign to immutable '{}'", name),
                        ));
                    }
                    let Some(gty) = gv.ty.get() else {
                        return Err(self.err(
                            e.line,
                            e.col,
                            format!("global '{}' used before definition", name),
                        ));
                    };
                    let tv = self.check_expr(value)?;
                    return self.assignment_result(gty, tv, op, e.line, e.col);
                }
                Err(self.err(e.line, e.col, format!("assign to unknown '{}'", name)))
            }
            ExprKind::Member { base, .. } | ExprKind::Index { base, .. } => {
                if !self.is_mut_lvalue(base) {
                    return Err(self.err(
                        e.line,
                        e.col,
                        "cannot mutate through immutable binding",
                    ));
                }
                let tt = self.check_expr(target)?;
                let tv = self.check_expr(value)?;
                self.assignment_result(tt, tv, op, e.line, e.col)
            }
            _ => Err(self.err(e.line, e.col, "invalid assignment target")),
        }
    }

    fn assignment_result(
        &self,
        lhs: &'t Ty<'t>,
        rhs: &'t Ty<'t>,
        op: AssignOp,
        line: u32,
        col: u32,
    ) -> Result<&'t Ty<'t>, Diag> {
        if !op.is_compound() {
            assignable(self.arena(), lhs, rhs, &self.cask_path, "assignment")?;
            return unify(self.arena(), lhs, rhs, &self.cask_path, "assignment", None);
        }
        if lhs.is_nullable() || rhs.is_nullable() {
            return Err(self.err(line, col, "operator on nullable value"));
        }
        let nr = self.numeric_result(
            lhs.strip_nullable(),
            rhs.strip_nullable(),
            op.symbol(),
            line,
            col,
        )?;
        unify(self.arena(), lhs, nr, &self.cask_path, op.symbol(), None)
    }

    fn check_member(&mut self, e: &Expr, base: &Expr, name: &str) -> Result<&'t Ty<'t>, Diag> {
        let ta = self.check_expr(base)?;
        if ta.is_nullable() {
            return Err(self.err(e.line, e.col, "member access on nullable value"));
        }
        match ta.strip_nullable() {
            Ty::Module(cask) => {
                if let Some(ce) = self.env.find_const(cask, name) {
                    return Ok(ce.val.ty(self.arena()));
                }
                if let Some(gv) = self.env.find_global(cask, name) {
                    return match gv.ty.get() {
                        Some(ty) => Ok(ty),
                        None => Err(self.err(
                            e.line,
                            e.col,
                            format!("global '{}' used before definition", name),
                        )),
                    };
                }
                if self.env.find_fun(cask, name).is_some() {
                    return Err(self.err(
                        e.line,
                        e.col,
                        format!("cask function '{}.{}' must be called", cask, name),
                    ));
                }
                Err(self.err(
                    e.line,
                    e.col,
                    format!("unknown cask member '{}.{}'", cask, name),
                ))
            }
            Ty::Class(qname) => {
                let Some(ci) = self.env.find_class(qname) else {
                    return Err(self.err(e.line, e.col, format!("unknown class '{}'", qname)));
                };
                if ci.vis == Visibility::Lock {
                    let in_same_file = self.cask_path == ci.cask_path;
                    let in_own_method = self
                        .current_class
                        .as_deref()
                        .is_some_and(|c| c == ci.qname);
                    if !(in_same_file || in_own_method) {
                        return Err(self.err(
                            e.line,
                            e.col,
                            format!(
                                "cannot access field '{}' of lock class '{}'",
                                name, ci.name
                            ),
                        ));
                    }
                }
                if let Some(field) = ci.find_field(name) {
                    return Ok(field.ty);
                }
                if ci.find_method(name).is_some() {
                    return Err(self.err(
                        e.line,
                        e.col,
                        format!("method '{}' must be called", name),
                    ));
                }
                Err(self.err(
                    e.line,
                    e.col,
                    format!("unknown member '{}' on class", name),
                ))
            }
            _ => {
                if let Some(shadow) = self.shadowed_cask_name(base) {
                    return Err(self.err(
                        e.line,
                        e.col,
                        format!("'{}' shadows cask '{}'", shadow, shadow),
                    ));
                }
                Err(self.err(e.line, e.col, "member access on non-object"))
            }
        }
    }

    fn check_new(
        &mut self,
        e: &Expr,
        class: &str,
        args: &[Expr],
        arg_names: &[Option<String>],
    ) -> Result<&'t Ty<'t>, Diag> {
        let qname = if class.contains('.') {
            let Some((cask, _)) = class.split_once('.') else {
                return Err(self.err(e.line, e.col, format!("unknown class '{}'", class)));
            };
            let ok = cask == self.cask_name || self.imports.iter().any(|i| i == cask);
            if !ok {
                return Err(self.err(e.line, e.col, format!("unknown class '{}'", class)));
            }
            class.to_string()
        } else {
            crate::env::qualify(&self.cask_name, class)
        };
        let Some(ci) = self.env.find_class(&qname) else {
            return Err(self.err(e.line, e.col, format!("unknown class '{}'", class)));
        };
        let class_name = ci.name.clone();
        let kind = ci.kind;
        let fields: Vec<(String, &'t Ty<'t>)> = ci
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.ty))
            .collect();
        let init_sig = ci.find_method("init").map(|m| {
            (
                m.sig.params.clone(),
                m.sig.ret,
            )
        });

        let has_named = arg_names.iter().any(|n| n.is_some());
        let has_positional = args
            .iter()
            .zip(arg_names.iter().chain(std::iter::repeat(&None)))
            .any(|(_, n)| n.is_none());
        if has_named && has_positional && !args.is_empty() {
            return Err(self.err(
                e.line,
                e.col,
                "constructor cannot mix named and positional args",
            ));
        }

        if has_named {
            let mut seen = vec![false; fields.len()];
            for (arg, name) in args.iter().zip(arg_names.iter()) {
                let Some(name) = name else {
                    continue;
                };
                let Some(fidx) = fields.iter().position(|(fname, _)| fname == name) else {
                    return Err(self.err(
                        e.line,
                        e.col,
                        format!("unknown field '{}' in constructor", name),
                    ));
                };
                if seen[fidx] {
                    return Err(self.err(
                        e.line,
                        e.col,
                        format!("duplicate field '{}' in constructor", name),
                    ));
                }
                seen[fidx] = true;
                let at = self.check_expr(arg)?;
                assignable(
                    self.arena(),
                    fields[fidx].1,
                    at,
                    &self.cask_path,
                    "field init",
                )?;
            }
            return Ok(self.arena().class(qname));
        }

        if let Some((params, ret)) = init_sig {
            if args.len() != params.len() {
                return Err(self.err(
                    e.line,
                    e.col,
                    format!("'{}.init' expects {} args", class_name, params.len()),
                ));
            }
            let mut subst = crate::types::Subst::new();
            for (arg, pty) in args.iter().zip(params.iter()) {
                let at = self.check_expr(arg)?;
                assignable(self.arena(), pty, at, &self.cask_path, "arg")?;
                unify(
                    self.arena(),
                    pty,
                    at,
                    &self.cask_path,
                    "arg",
                    Some(&mut subst),
                )?;
            }
            if !ret.is_void() {
                return Err(self.err(
                    e.line,
                    e.col,
                    format!("'{}.init' must return void", class_name),
                ));
            }
        } else if matches!(kind, ClassKind::Struct | ClassKind::Enum) && !args.is_empty() {
            if args.len() != fields.len() {
                return Err(self.err(
                    e.line,
                    e.col,
                    format!("'{}' expects {} args", class_name, fields.len()),
                ));
            }
            for (arg, (_, fty)) in args.iter().zip(fields.iter()) {
                let at = self.check_expr(arg)?;
                assignable(self.arena(), fty, at, &self.cask_path, "field init")?;
            }
        } else if !args.is_empty() {
            return Err(self.err(
                e.line,
                e.col,
                format!("class '{}' has no init method", class_name),
            ));
        }
        Ok(self.arena().class(qname))
    }

    pub(crate) fn check_pattern(
        &mut self,
        pat: &Pattern,
        scrut_ty: &'t Ty<'t>,
    ) -> Result<(), Diag> {
        match &pat.kind {
            PatternKind::Wildcard => Ok(()),
            PatternKind::Ident(name) => {
                self.locals.define(name, Binding::new(scrut_ty, false));
                Ok(())
            }
            PatternKind::Int(_) => {
                unify(
                    self.arena(),
                    scrut_ty,
                    self.arena().num(),
                    &self.cask_path,
                    "match pattern",
                    None,
                )?;
                Ok(())
            }
            PatternKind::Str(_) => {
                unify(
                    self.arena(),
                    scrut_ty,
                    self.arena().string(),
                    &self.cask_path,
                    "match pattern",
                    None,
                )?;
                Ok(())
            }
            PatternKind::Bool(_) => {
                unify(
                    self.arena(),
                    scrut_ty,
                    self.arena().boolean(),
                    &self.cask_path,
                    "match pattern",
                    None,
                )?;
                Ok(())
            }
            PatternKind::Null => {
                unify(
                    self.arena(),
                    scrut_ty,
                    self.arena().null(),
                    &self.cask_path,
                    "match pattern",
                    None,
                )?;
                Ok(())
            }
        }
    }
}

// Call checking: cask-qualified calls, method calls (including the
// array/string/number built-ins), and bare calls through locals,
// current-cask functions, the stdr prelude, and function values.

use yis_ast::{Expr, ExprKind};
use yis_diagnostics::Diag;

use crate::types::{assignable, unify, Subst, Ty};

use super::Checker;

impl<'e, 't> Checker<'e, 't> {
    pub(crate) fn check_call(&mut self, e: &Expr) -> Result<&'t Ty<'t>, Diag> {
        let ExprKind::Call { callee, args } = &e.kind else {
            return Err(self.err(e.line, e.col, "unsupported call form"));
        };

        // cask-qualified call: mod.f(args)
        if let ExprKind::Member { base, name } = &callee.kind {
            if let ExprKind::Ident(cask) = &base.kind {
                if self.cask_in_scope(cask) {
                    return self.check_qualified_call(e, callee, cask, name, args);
                }
                let known_local = self.locals.lookup(cask).is_some();
                let known_global = self.env.find_global(&self.cask_name, cask).is_some();
                if !known_local && !known_global {
                    return Err(self.err(
                        callee.line,
                        callee.col,
                        format!("unknown name '{}' (cask not in scope)", cask),
                    ));
                }
            }
            return self.check_method_call(e, callee, base, name, args);
        }

        // bare call: f(args)
        if let ExprKind::Ident(fname) = &callee.kind {
            return self.check_bare_call(e, callee, fname, args);
        }

        // anything else must evaluate to a function value
        let fn_ty = self.check_expr(callee)?;
        let Some((params, ret)) = fn_ty.as_fn() else {
            return Err(self.err(e.line, e.col, "unsupported call form"));
        };
        self.check_fn_value_call(e, params, ret, args)
    }

    fn check_qualified_call(
        &mut self,
        e: &Expr,
        callee: &Expr,
        cask: &str,
        name: &str,
        args: &[Expr],
    ) -> Result<&'t Ty<'t>, Diag> {
        let Some(sig) = self.env.find_fun(cask, name) else {
            return Err(self.err(
                callee.line,
                callee.col,
                format!("unknown {}.{}", cask, name),
            ));
        };
        if args.len() != sig.params.len() {
            return Err(self.err(
                e.line,
                e.col,
                format!("'{}.{}' expects {} args", cask, name, sig.params.len()),
            ));
        }
        let params = sig.params.clone();
        let muts = sig.param_muts.clone();
        let names = sig.param_names.clone();
        let ret = sig.ret;
        self.check_args_against(&params, &muts, &names, ret, args)
    }

    fn check_method_call(
        &mut self,
        e: &Expr,
        callee: &Expr,
        base: &Expr,
        mname: &str,
        args: &[Expr],
    ) -> Result<&'t Ty<'t>, Diag> {
        let base_ty = self.check_expr(base)?;
        if base_ty.is_nullable() {
            return Err(self.err(callee.line, callee.col, "call on nullable value"));
        }
        let base_ty = base_ty.strip_nullable();

        if let Ty::Array(elem) = base_ty {
            let elem = *elem;
            match mname {
                "add" => {
                    if args.len() != 1 {
                        return Err(self.err(e.line, e.col, "array.add expects 1 arg"));
                    }
                    if !self.is_mut_lvalue(base) {
                        return Err(self.err(
                            e.line,
                            e.col,
                            "array.add requires mutable binding",
                        ));
                    }
                    let at = self.check_expr(&args[0])?;
                    assignable(self.arena(), elem, at, &self.cask_path, "array.add")?;
                    unify(self.arena(), elem, at, &self.cask_path, "array.add", None)?;
                    return Ok(self.arena().void());
                }
                "remove" => {
                    if args.len() != 1 {
                        return Err(self.err(e.line, e.col, "array.remove expects 1 arg"));
                    }
                    if !self.is_mut_lvalue(base) {
                        return Err(self.err(
                            e.line,
                            e.col,
                            "array.remove requires mutable binding",
                        ));
                    }
                    let ti = self.check_expr(&args[0])?;
                    unify(
                        self.arena(),
                        ti,
                        self.arena().num(),
                        &self.cask_path,
                        "array.remove index",
                        None,
                    )?;
                    return Ok(elem);
                }
                _ => {
                    return Err(self.err(
                        e.line,
                        e.col,
                        format!("unknown array method '{}'", mname),
                    ));
                }
            }
        }

        if (base_ty.is_num() || base_ty.is_bool()) && mname == "to_string" {
            if !args.is_empty() {
                return Err(self.err(e.line, e.col, "to_string takes no args"));
            }
            return Ok(self.arena().string());
        }

        if let Ty::Class(qname) = base_ty {
            let Some(ci) = self.env.find_class(qname) else {
                return Err(self.err(e.line, e.col, format!("unknown class '{}'", qname)));
            };
            let class_name = ci.name.clone();
            let Some(method) = ci.find_method(mname) else {
                return Err(self.err(
                    callee.line,
                    callee.col,
                    format!("'{}' has no method '{}'", class_name, mname),
                ));
            };
            let recv_mut = method.sig.recv_mut;
            let params = method.sig.params.clone();
            let muts = method.sig.param_muts.clone();
            let names = method.sig.param_names.clone();
            let ret = method.sig.ret;
            if recv_mut && !self.is_mut_lvalue(base) {
                return Err(self.err(
                    callee.line,
                    callee.col,
                    format!(
                        "method '{}.{}' requires mutable receiver",
                        class_name, mname
                    ),
                ));
            }
            if args.len() != params.len() {
                return Err(self.err(
                    e.line,
                    e.col,
                    format!(
                        "'{}.{}' expects {} args",
                        class_name,
                        mname,
                        params.len()
                    ),
                ));
            }
            return self.check_args_against(&params, &muts, &names, ret, args);
        }

        if let Some(shadow) = self.shadowed_cask_name(base) {
            return Err(self.err(
                callee.line,
                callee.col,
                format!(
                    "'{}' is a local binding that shadows cask '{}'",
                    shadow, shadow
                ),
            ));
        }
        Err(self.err(callee.line, callee.col, "cannot call member on value"))
    }

    fn check_bare_call(
        &mut self,
        e: &Expr,
        callee: &Expr,
        fname: &str,
        args: &[Expr],
    ) -> Result<&'t Ty<'t>, Diag> {
        // local bindings shadow functions
        if let Some(b) = self.locals.lookup(fname).copied() {
            if b.is_moved {
                return Err(self.err(
                    callee.line,
                    callee.col,
                    format!("use of moved value '{}'", fname),
                ));
            }
            let Some((params, ret)) = b.ty.as_fn() else {
                return Err(self.err(
                    callee.line,
                    callee.col,
                    format!("unknown function '{}'", fname),
                ));
            };
            return self.check_fn_value_call(e, params, ret, args);
        }

        // current-cask global holding a function value
        if let Some(gv) = self.env.find_global(&self.cask_name, fname) {
            let Some(gty) = gv.ty.get() else {
                return Err(self.err(
                    callee.line,
                    callee.col,
                    format!("global '{}' used before definition", fname),
                ));
            };
            let Some((params, ret)) = gty.as_fn() else {
                return Err(self.err(
                    callee.line,
                    callee.col,
                    format!("unknown function '{}'", fname),
                ));
            };
            return self.check_fn_value_call(e, params, ret, args);
        }

        // built-in str(x) renders any value to a string
        if fname == "str" {
            if args.len() != 1 {
                return Err(self.err(e.line, e.col, "str expects 1 arg"));
            }
            self.check_expr(&args[0])?;
            return Ok(self.arena().string());
        }

        let sig = self
            .env
            .find_fun(&self.cask_name, fname)
            .or_else(|| self.stdr_prelude_sig(fname));
        let Some(sig) = sig else {
            // last resort: a function-typed value in scope
            let fn_ty = self.check_expr(callee).map_err(|_| {
                self.err(
                    callee.line,
                    callee.col,
                    format!("unknown function '{}'", fname),
                )
            })?;
            let Some((params, ret)) = fn_ty.as_fn() else {
                return Err(self.err(
                    callee.line,
                    callee.col,
                    format!("unknown function '{}'", fname),
                ));
            };
            return self.check_fn_value_call(e, params, ret, args);
        };
        if args.len() != sig.params.len() {
            return Err(self.err(
                e.line,
                e.col,
                format!("'{}' expects {} args", fname, sig.params.len()),
            ));
        }
        let params = sig.params.clone();
        let muts = sig.param_muts.clone();
        let names = sig.param_names.clone();
        let ret = sig.ret;
        self.check_args_against(&params, &muts, &names, ret, args)
    }

    /// Check arguments with `assignable` then unify under a per-call
    /// substitution, and return the substituted return type. Arguments
    /// for `?name` parameters must be mutable lvalues.
    fn check_args_against(
        &mut self,
        params: &[&'t Ty<'t>],
        muts: &[bool],
        names: &[String],
        ret: &'t Ty<'t>,
        args: &[Expr],
    ) -> Result<&'t Ty<'t>, Diag> {
        let mut subst = Subst::new();
        for (i, (arg, pty)) in args.iter().zip(params.iter()).enumerate() {
            if muts.get(i).copied().unwrap_or(false) && !self.is_mut_lvalue(arg) {
                let pname = names.get(i).map(String::as_str).unwrap_or("?");
                return Err(self.err(
                    arg.line,
                    arg.col,
                    format!("mutable parameter '{}' requires mutable binding", pname),
                ));
            }
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
        Ok(subst.apply(self.arena(), ret))
    }

    /// Call through a function value: unify-only argument checking.
    fn check_fn_value_call(
        &mut self,
        e: &Expr,
        params: &[&'t Ty<'t>],
        ret: &'t Ty<'t>,
        args: &[Expr],
    ) -> Result<&'t Ty<'t>, Diag> {
        if args.len() != params.len() {
            return Err(self.err(
                e.line,
                e.col,
                format!("call expects {} args", params.len()),
            ));
        }
        let mut subst = Subst::new();
        for (arg, pty) in args.iter().zip(params.iter()) {
            let at = self.check_expr(arg)?;
            unify(
                self.arena(),
                pty,
                at,
                &self.cask_path,
                "fn value call",
                Some(&mut subst),
            )?;
        }
        Ok(subst.apply(self.arena(), ret))
    }
}

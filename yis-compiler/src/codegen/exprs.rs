// Expression lowering. Each expression produces one result temporary;
// intermediate temporaries are released before the enclosing statement
// boundary, and evaluation preserves exact source order, including the
// short-circuit forms.

use yis_ast::{BinOp, ClassKind, Expr, ExprKind, PatternKind, StrPart, UnaryOp};
use yis_diagnostics::Diag;

use crate::env::ConstVal;
use crate::types::Ty;

use super::{intrinsics, mangle, Codegen, GenExpr};

impl<'e, 't, 'p> Codegen<'e, 't, 'p> {
    pub(crate) fn gen_expr(&mut self, e: &Expr) -> Result<GenExpr, Diag> {
        match &e.kind {
            ExprKind::Int(v) => {
                let t = self.new_tmp();
                self.line(format!("ErgoVal {} = EV_INT({});", t, v));
                Ok(GenExpr::result(t))
            }
            ExprKind::Float(v) => {
                let t = self.new_tmp();
                self.line(format!("ErgoVal {} = EV_FLOAT({:?});", t, v));
                Ok(GenExpr::result(t))
            }
            ExprKind::Bool(v) => {
                let t = self.new_tmp();
                self.line(format!("ErgoVal {} = EV_BOOL({});", t, v));
                Ok(GenExpr::result(t))
            }
            ExprKind::Null => {
                let t = self.new_tmp();
                self.line(format!("ErgoVal {} = EV_NULLV;", t));
                Ok(GenExpr::result(t))
            }
            ExprKind::Str(parts) => self.gen_str(e, parts),
            ExprKind::Tuple(items) => self.gen_sequence("tup", items),
            ExprKind::Array { items, .. } => self.gen_sequence("a", items),
            ExprKind::Ident(name) => self.gen_ident(e, name),
            ExprKind::Member { base, name } => self.gen_member(e, base, name),
            ExprKind::Move(inner) => {
                let ExprKind::Ident(name) = &inner.kind else {
                    return Err(self.err(e.line, e.col, "move(...) must be an identifier"));
                };
                let Some(slot) = self.cname_of(name) else {
                    return Err(self.err(e.line, e.col, "unknown move target"));
                };
                let t = self.new_tmp();
                self.line(format!("ErgoVal {} = ergo_move(&{});", t, slot));
                Ok(GenExpr::result(t))
            }
            ExprKind::Match { scrutinee, arms } => self.gen_match(e, scrutinee, arms),
            ExprKind::Lambda { params, .. } => {
                let Some(name) = self.lambda_name_of(e) else {
                    return Err(self.err(e.line, e.col, "uncollected lambda (internal error)"));
                };
                let t = self.new_tmp();
                self.line(format!(
                    "ErgoVal {} = EV_FN(ergo_fn_new({}, {}));",
                    t,
                    name,
                    params.len()
                ));
                Ok(GenExpr::result(t))
            }
            ExprKind::New {
                class,
                args,
                arg_names,
            } => self.gen_new(e, class, args, arg_names),
            ExprKind::Unary { op, expr } => {
                let ge = self.gen_expr(expr)?;
                let t = self.new_tmp();
                match op {
                    UnaryOp::Not => {
                        self.line(format!("ErgoVal {} = EV_BOOL(!ergo_as_bool({}));", t, ge.tmp));
                    }
                    UnaryOp::Neg => {
                        let xty = self.query_ty(expr)?;
                        if xty.is_num() {
                            self.line(format!("ErgoVal {} = ergo_neg({});", t, ge.tmp));
                        } else {
                            self.line(format!(
                                "ErgoVal {} = EV_INT(-ergo_as_int({}));",
                                t, ge.tmp
                            ));
                        }
                    }
                    UnaryOp::Len => {
                        self.line(format!("ErgoVal {} = EV_INT(stdr_len({}));", t, ge.tmp));
                    }
                }
                self.consume(&ge);
                Ok(GenExpr::result(t))
            }
            ExprKind::Binary { op, lhs, rhs } => self.gen_binary(e, *op, lhs, rhs),
            ExprKind::Index { base, index } => {
                let base_ty = self.query_ty(base)?;
                let at = self.gen_expr(base)?;
                let it = self.gen_expr(index)?;
                let t = self.new_tmp();
                if base_ty.strip_nullable().is_string() {
                    self.line(format!(
                        "ErgoVal {} = stdr_str_at({}, ergo_as_int({}));",
                        t, at.tmp, it.tmp
                    ));
                } else {
                    self.line(format!(
                        "ErgoVal {} = ergo_arr_get((ErgoArr*){}.as.p, ergo_as_int({}));",
                        t, at.tmp, it.tmp
                    ));
                }
                self.consume(&at);
                self.consume(&it);
                Ok(GenExpr::result(t))
            }
            ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                let ct = self.gen_expr(cond)?;
                let t = self.new_tmp();
                self.line(format!("ErgoVal {} = EV_NULLV;", t));
                self.open(format!("if (ergo_as_bool({})) {{", ct.tmp));
                let at = self.gen_expr(then_expr)?;
                self.line(format!("ergo_move_into(&{}, {});", t, at.tmp));
                self.release_others(&at);
                self.indent -= 1;
                self.line("} else {");
                self.indent += 1;
                let bt = self.gen_expr(else_expr)?;
                self.line(format!("ergo_move_into(&{}, {});", t, bt.tmp));
                self.release_others(&bt);
                self.close("}");
                self.consume(&ct);
                Ok(GenExpr::result(t))
            }
            ExprKind::IfExpr { arms } => {
                // same shape as ternary, chained over the arms
                let t = self.new_tmp();
                self.line(format!("ErgoVal {} = EV_NULLV;", t));
                self.gen_if_expr_arms(&t, arms, 0)?;
                Ok(GenExpr::result(t))
            }
            ExprKind::Assign { target, value, .. } => self.gen_assign(e, target, value),
            ExprKind::Block(block) => {
                let t = self.new_tmp();
                self.line(format!("ErgoVal {} = EV_NULLV;", t));
                self.gen_stmt(block, false)?;
                Ok(GenExpr::result(t))
            }
            ExprKind::Call { .. } => self.gen_call(e),
            ExprKind::Paren(inner) => self.gen_expr(inner),
        }
    }

    fn gen_str(&mut self, e: &Expr, parts: &[StrPart]) -> Result<GenExpr, Diag> {
        if parts.is_empty() {
            let t = self.new_tmp();
            self.line(format!("ErgoVal {} = EV_STR(stdr_str_lit(\"\"));", t));
            return Ok(GenExpr::result(t));
        }
        let mut part_tmps = Vec::with_capacity(parts.len());
        for part in parts {
            let pt = self.new_tmp();
            match part {
                StrPart::Text(text) => {
                    self.line(format!(
                        "ErgoVal {} = EV_STR(stdr_str_lit(\"{}\"));",
                        pt,
                        mangle::c_escape(text)
                    ));
                }
                StrPart::Interp(name) => {
                    let Some(cname) = self.cname_of(name) else {
                        return Err(self.err(e.line, e.col, format!("unknown local '{}'", name)));
                    };
                    self.line(format!(
                        "ErgoVal {} = {}; ergo_retain_val({});",
                        pt, cname, pt
                    ));
                }
            }
            part_tmps.push(pt);
        }
        let parts_name = self.new_sym("parts");
        let s_name = self.new_sym("s");
        let t = self.new_tmp();
        self.line(format!("ErgoVal {} = EV_NULLV;", t));
        self.open("{");
        self.line(format!(
            "ErgoVal {}[{}] = {{ {} }};",
            parts_name,
            part_tmps.len(),
            part_tmps.join(", ")
        ));
        self.line(format!(
            "ErgoStr* {} = stdr_str_from_parts({}, {});",
            s_name,
            part_tmps.len(),
            parts_name
        ));
        self.line(format!("{} = EV_STR({});", t, s_name));
        self.close("}");
        for pt in &part_tmps {
            self.line(format!("ergo_release_val({});", pt));
        }
        Ok(GenExpr::result(t))
    }

    /// Tuples and arrays share the runtime array cell.
    fn gen_sequence(&mut self, base: &str, items: &[Expr]) -> Result<GenExpr, Diag> {
        let arrsym = self.new_sym(base);
        let t = self.new_tmp();
        self.line(format!(
            "ErgoArr* {} = stdr_arr_new({});",
            arrsym,
            items.len().max(1)
        ));
        self.line(format!("ErgoVal {} = EV_ARR({});", t, arrsym));
        for item in items {
            let ge = self.gen_expr(item)?;
            self.line(format!("ergo_arr_add({}, {});", arrsym, ge.tmp));
            self.release_others(&ge);
        }
        Ok(GenExpr::result(t))
    }

    fn gen_ident(&mut self, e: &Expr, name: &str) -> Result<GenExpr, Diag> {
        if let Some(cname) = self.cname_of(name) {
            let t = self.new_tmp();
            self.line(format!(
                "ErgoVal {} = {}; ergo_retain_val({});",
                t, cname, t
            ));
            return Ok(GenExpr::result(t));
        }
        // a top-level function used as a value goes through its wrapper
        let sig = self
            .env
            .find_fun(&self.current_cask, name)
            .or_else(|| self.stdr_prelude_fun(name));
        let Some(sig) = sig else {
            return Err(self.err(e.line, e.col, format!("unknown local '{}'", name)));
        };
        let argc = sig.params.len();
        let cask = sig.cask.clone();
        let fname = sig.name.clone();
        let Some(wrapper) = self.funval_wrapper_of(&cask, &fname) else {
            return Err(self.err(e.line, e.col, "missing function wrapper (internal error)"));
        };
        let t = self.new_tmp();
        self.line(format!(
            "ErgoVal {} = EV_FN(ergo_fn_new({}, {}));",
            t, wrapper, argc
        ));
        Ok(GenExpr::result(t))
    }

    fn gen_member(&mut self, e: &Expr, base: &Expr, name: &str) -> Result<GenExpr, Diag> {
        let base_ty = self.query_ty(base)?;
        match base_ty.strip_nullable() {
            Ty::Module(cask) => {
                if let Some(ce) = self.env.find_const(cask, name) {
                    let t = self.new_tmp();
                    match &ce.val {
                        ConstVal::Int(i) => {
                            self.line(format!("ErgoVal {} = EV_INT({});", t, i));
                        }
                        ConstVal::Float(f) => {
                            self.line(format!("ErgoVal {} = EV_FLOAT({:?});", t, f));
                        }
                        ConstVal::Bool(b) => {
                            self.line(format!("ErgoVal {} = EV_BOOL({});", t, b));
                        }
                        ConstVal::Str(s) => {
                            self.line(format!(
                                "ErgoVal {} = EV_STR(stdr_str_lit(\"{}\"));",
                                t,
                                mangle::c_escape(s)
                            ));
                        }
                        ConstVal::Null => {
                            self.line(format!("ErgoVal {} = EV_NULLV;", t));
                        }
                    }
                    return Ok(GenExpr::result(t));
                }
                if self.env.find_global(cask, name).is_some() {
                    let g = mangle::global_symbol(cask, name);
                    let t = self.new_tmp();
                    self.line(format!(
                        "ErgoVal {} = {}; ergo_retain_val({});",
                        t, g, t
                    ));
                    return Ok(GenExpr::result(t));
                }
                Err(self.err(
                    e.line,
                    e.col,
                    format!("unknown cask member '{}.{}'", cask, name),
                ))
            }
            Ty::Class(qname) => {
                let cname = mangle::class_struct_name(qname);
                let field = mangle::field_name(name);
                let ge = self.gen_expr(base)?;
                let t = self.new_tmp();
                self.line(format!(
                    "ErgoVal {} = (({}*){}.as.p)->{}; ergo_retain_val({});",
                    t, cname, ge.tmp, field, t
                ));
                self.consume(&ge);
                Ok(GenExpr::result(t))
            }
            _ => Err(self.err(e.line, e.col, "member access not supported on this type")),
        }
    }

    fn gen_binary(
        &mut self,
        e: &Expr,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<GenExpr, Diag> {
        if op == BinOp::Coalesce {
            // only the null branch evaluates the right side
            let l = self.gen_expr(lhs)?;
            let t = self.new_tmp();
            self.line(format!("ErgoVal {} = EV_NULLV;", t));
            self.open(format!("if (ergo_is_null({})) {{", l.tmp));
            self.line(format!("ergo_release_val({});", l.tmp));
            let r = self.gen_expr(rhs)?;
            self.line(format!("ergo_move_into(&{}, {});", t, r.tmp));
            self.release_others(&r);
            self.indent -= 1;
            self.line("} else {");
            self.indent += 1;
            self.line(format!("ergo_move_into(&{}, {});", t, l.tmp));
            self.close("}");
            self.release_others(&l);
            return Ok(GenExpr::result(t));
        }

        if op == BinOp::And || op == BinOp::Or {
            let left = self.gen_expr(lhs)?;
            let t = self.new_tmp();
            self.line(format!("ErgoVal {} = EV_BOOL(false);", t));
            if op == BinOp::And {
                self.open(format!("if (ergo_as_bool({})) {{", left.tmp));
                let right = self.gen_expr(rhs)?;
                self.line(format!(
                    "ergo_move_into(&{}, EV_BOOL(ergo_as_bool({})));",
                    t, right.tmp
                ));
                self.consume(&right);
                self.indent -= 1;
                self.line("} else {");
                self.indent += 1;
                self.line(format!("ergo_move_into(&{}, EV_BOOL(false));", t));
                self.close("}");
            } else {
                self.open(format!("if (ergo_as_bool({})) {{", left.tmp));
                self.line(format!("ergo_move_into(&{}, EV_BOOL(true));", t));
                self.indent -= 1;
                self.line("} else {");
                self.indent += 1;
                let right = self.gen_expr(rhs)?;
                self.line(format!(
                    "ergo_move_into(&{}, EV_BOOL(ergo_as_bool({})));",
                    t, right.tmp
                ));
                self.consume(&right);
                self.close("}");
            }
            self.consume(&left);
            return Ok(GenExpr::result(t));
        }

        let opfn = match op {
            BinOp::Add => "ergo_add",
            BinOp::Sub => "ergo_sub",
            BinOp::Mul => "ergo_mul",
            BinOp::Div => "ergo_div",
            BinOp::Mod => "ergo_mod",
            BinOp::Eq => "ergo_eq",
            BinOp::Ne => "ergo_ne",
            BinOp::Lt => "ergo_lt",
            BinOp::Le => "ergo_le",
            BinOp::Gt => "ergo_gt",
            BinOp::Ge => "ergo_ge",
            _ => return Err(self.err(e.line, e.col, "unsupported binary op")),
        };
        let a = self.gen_expr(lhs)?;
        let b = self.gen_expr(rhs)?;
        let t = self.new_tmp();
        self.line(format!("ErgoVal {} = {}({}, {});", t, opfn, a.tmp, b.tmp));
        self.consume(&a);
        self.consume(&b);
        Ok(GenExpr::result(t))
    }

    fn gen_if_expr_arms(
        &mut self,
        t: &str,
        arms: &[yis_ast::IfExprArm],
        idx: usize,
    ) -> Result<(), Diag> {
        if idx >= arms.len() {
            return Ok(());
        }
        let arm = &arms[idx];
        let Some(cond) = &arm.cond else {
            let ge = self.gen_expr(&arm.value)?;
            self.line(format!("ergo_move_into(&{}, {});", t, ge.tmp));
            self.release_others(&ge);
            return Ok(());
        };
        let ct = self.gen_expr(cond)?;
        let b = self.new_bool();
        self.line(format!("bool {} = ergo_as_bool({});", b, ct.tmp));
        self.consume(&ct);
        self.open(format!("if ({}) {{", b));
        let ge = self.gen_expr(&arm.value)?;
        self.line(format!("ergo_move_into(&{}, {});", t, ge.tmp));
        self.release_others(&ge);
        self.indent -= 1;
        if idx + 1 < arms.len() {
            self.line("} else {");
            self.indent += 1;
            self.gen_if_expr_arms(t, arms, idx + 1)?;
            self.indent -= 1;
            self.line("}");
        } else {
            self.line("}");
        }
        Ok(())
    }

    fn gen_match(
        &mut self,
        _e: &Expr,
        scrutinee: &Expr,
        arms: &[yis_ast::MatchArm],
    ) -> Result<GenExpr, Diag> {
        let scrut_ty = self.query_ty(scrutinee)?;
        let scrut = self.gen_expr(scrutinee)?;
        let t = self.new_tmp();
        let matched = self.new_sym("matched");
        self.line(format!("ErgoVal {} = EV_NULLV;", t));
        self.line(format!("bool {} = false;", matched));

        for arm in arms {
            let cond = self.new_sym("mc");
            let mut bind_name: Option<&str> = None;
            match &arm.pat.kind {
                PatternKind::Wildcard => {
                    self.line(format!("bool {} = true;", cond));
                }
                PatternKind::Ident(name) => {
                    bind_name = Some(name);
                    self.line(format!("bool {} = true;", cond));
                }
                PatternKind::Int(v) => {
                    let pv = self.new_tmp();
                    self.line(format!("ErgoVal {} = EV_INT({});", pv, v));
                    self.emit_pattern_eq(&cond, &scrut.tmp, &pv);
                }
                PatternKind::Bool(v) => {
                    let pv = self.new_tmp();
                    self.line(format!("ErgoVal {} = EV_BOOL({});", pv, v));
                    self.emit_pattern_eq(&cond, &scrut.tmp, &pv);
                }
                PatternKind::Null => {
                    let pv = self.new_tmp();
                    self.line(format!("ErgoVal {} = EV_NULLV;", pv));
                    self.emit_pattern_eq(&cond, &scrut.tmp, &pv);
                }
                PatternKind::Str(s) => {
                    let pv = self.new_tmp();
                    self.line(format!(
                        "ErgoVal {} = EV_STR(stdr_str_lit(\"{}\"));",
                        pv,
                        mangle::c_escape(s)
                    ));
                    self.emit_pattern_eq(&cond, &scrut.tmp, &pv);
                }
            }

            self.open(format!("if (!{} && {}) {{", matched, cond));
            self.line(format!("{} = true;", matched));
            let mut bound_tmp = None;
            if let Some(name) = bind_name {
                let bt = self.new_tmp();
                self.line(format!(
                    "ErgoVal {} = {}; ergo_retain_val({});",
                    bt, scrut.tmp, bt
                ));
                self.push_scope();
                self.bind_param(name, bt.clone(), scrut_ty, false);
                bound_tmp = Some(bt);
            }
            let ge = self.gen_expr(&arm.expr)?;
            self.line(format!("ergo_move_into(&{}, {});", t, ge.tmp));
            self.release_others(&ge);
            if let Some(bt) = bound_tmp {
                let locals = self.pop_scope();
                self.release_locals(locals);
                self.line(format!("ergo_release_val({});", bt));
            }
            self.close("}");
        }
        self.consume(&scrut);
        Ok(GenExpr::result(t))
    }

    fn emit_pattern_eq(&mut self, cond: &str, scrut: &str, pv: &str) {
        let eqt = self.new_tmp();
        self.line(format!("ErgoVal {} = ergo_eq({}, {});", eqt, scrut, pv));
        self.line(format!("bool {} = ergo_as_bool({});", cond, eqt));
        self.line(format!("ergo_release_val({});", eqt));
        self.line(format!("ergo_release_val({});", pv));
    }

    fn gen_new(
        &mut self,
        e: &Expr,
        class: &str,
        args: &[Expr],
        arg_names: &[Option<String>],
    ) -> Result<GenExpr, Diag> {
        let qname = if class.contains('.') {
            let Some((cask, _)) = class.split_once('.') else {
                return Err(self.err(e.line, e.col, format!("unknown class '{}'", class)));
            };
            if !self.cask_in_scope(cask) {
                return Err(self.err(e.line, e.col, format!("unknown class '{}'", class)));
            }
            class.to_string()
        } else {
            crate::env::qualify(&self.current_cask, class)
        };
        let Some(ci) = self.env.find_class(&qname) else {
            return Err(self.err(e.line, e.col, format!("unknown class '{}'", class)));
        };
        let kind = ci.kind;
        let has_init = ci.find_method("init").is_some();
        let field_names: Vec<String> = ci.fields.iter().map(|f| f.name.clone()).collect();
        let (cask, class_short) = match qname.split_once('.') {
            Some((m, c)) => (m.to_string(), c.to_string()),
            None => (String::new(), qname.clone()),
        };

        let cname = mangle::class_struct_name(&qname);
        let drop = mangle::drop_symbol(&qname);
        let obj = self.new_sym("obj");
        self.line(format!(
            "{}* {} = ({}*)ergo_obj_new(sizeof({}), {});",
            cname, obj, cname, cname, drop
        ));
        for f in &field_names {
            self.line(format!("{}->{} = EV_NULLV;", obj, mangle::field_name(f)));
        }
        let t = self.new_tmp();
        self.line(format!("ErgoVal {} = EV_OBJ({});", t, obj));

        let has_named = arg_names.iter().any(|n| n.is_some());
        if has_init {
            let mut arg_tmps = Vec::with_capacity(args.len());
            for arg in args {
                let ge = self.gen_expr(arg)?;
                self.release_others(&ge);
                arg_tmps.push(ge.tmp);
            }
            let init = mangle::method_symbol(&cask, &class_short, "init");
            let mut call = format!("{}({}", init, t);
            for a in &arg_tmps {
                call.push_str(", ");
                call.push_str(a);
            }
            call.push_str(");");
            self.line(call);
            for a in &arg_tmps {
                self.line(format!("ergo_release_val({});", a));
            }
        } else if has_named {
            for (arg, name) in args.iter().zip(arg_names.iter()) {
                let Some(name) = name else {
                    continue;
                };
                let ge = self.gen_expr(arg)?;
                self.line(format!(
                    "ergo_move_into(&{}->{}, {});",
                    obj,
                    mangle::field_name(name),
                    ge.tmp
                ));
                self.release_others(&ge);
            }
        } else if matches!(kind, ClassKind::Struct | ClassKind::Enum) && !args.is_empty() {
            for (arg, fname) in args.iter().zip(field_names.iter()) {
                let ge = self.gen_expr(arg)?;
                self.line(format!(
                    "ergo_move_into(&{}->{}, {});",
                    obj,
                    mangle::field_name(fname),
                    ge.tmp
                ));
                self.release_others(&ge);
            }
        }
        Ok(GenExpr::result(t))
    }

    fn gen_assign(&mut self, e: &Expr, target: &Expr, value: &Expr) -> Result<GenExpr, Diag> {
        let vt = self.gen_expr(value)?;
        let tret = self.new_tmp();
        self.line(format!(
            "ErgoVal {} = {}; ergo_retain_val({});",
            tret, vt.tmp, tret
        ));
        match &target.kind {
            ExprKind::Ident(name) => {
                let Some(slot) = self.cname_of(name) else {
                    return Err(self.err(e.line, e.col, "unknown assignment target"));
                };
                self.line(format!("ergo_move_into(&{}, {});", slot, vt.tmp));
            }
            ExprKind::Index { base, index } => {
                let at = self.gen_expr(base)?;
                let it = self.gen_expr(index)?;
                self.line(format!(
                    "ergo_arr_set((ErgoArr*){}.as.p, ergo_as_int({}), {});",
                    at.tmp, it.tmp, vt.tmp
                ));
                self.consume(&at);
                self.consume(&it);
            }
            ExprKind::Member { base, name } => {
                let base_ty = self.query_ty(base)?;
                let Ty::Class(qname) = base_ty.strip_nullable() else {
                    return Err(self.err(e.line, e.col, "unsupported member assignment"));
                };
                let cname = mangle::class_struct_name(qname);
                let field = mangle::field_name(name);
                let at = self.gen_expr(base)?;
                self.line(format!(
                    "ergo_move_into(&(({}*){}.as.p)->{}, {});",
                    cname, at.tmp, field, vt.tmp
                ));
                self.consume(&at);
            }
            _ => return Err(self.err(e.line, e.col, "unsupported assignment target")),
        }
        self.release_others(&vt);
        Ok(GenExpr::result(tret))
    }

    // ---- calls ----

    fn gen_call(&mut self, e: &Expr) -> Result<GenExpr, Diag> {
        let ExprKind::Call { callee, args } = &e.kind else {
            return Err(self.err(e.line, e.col, "unhandled expr in codegen"));
        };

        // cask-qualified call
        if let ExprKind::Member { base, name } = &callee.kind {
            if let ExprKind::Ident(cask) = &base.kind {
                if self.cask_in_scope(cask) {
                    let Some(sig) = self.env.find_fun(cask, name) else {
                        return Err(self.err(
                            e.line,
                            e.col,
                            format!("unknown {}.{}", cask, name),
                        ));
                    };
                    let ret_void = sig.ret.is_void();
                    let symbol = mangle::fun_symbol(cask, name);
                    return self.gen_direct_call(&symbol, None, args, ret_void);
                }
            }
            return self.gen_method_call(e, callee, base, name, args);
        }

        if let ExprKind::Ident(fname) = &callee.kind {
            if self.ty_locals.lookup(fname).is_none() {
                if let Some(out) = self.gen_builtin_call(e, fname, args)? {
                    return Ok(out);
                }
                let sig = self
                    .env
                    .find_fun(&self.current_cask, fname)
                    .or_else(|| self.stdr_prelude_fun(fname));
                if let Some(sig) = sig {
                    let ret_void = sig.ret.is_void();
                    let symbol = mangle::fun_symbol(&sig.cask, &sig.name);
                    return self.gen_direct_call(&symbol, None, args, ret_void);
                }
            }
        }

        // function value call through ergo_call
        let ft = self.gen_expr(callee)?;
        let mut arg_tmps = Vec::with_capacity(args.len());
        for arg in args {
            let ge = self.gen_expr(arg)?;
            self.release_others(&ge);
            arg_tmps.push(ge.tmp);
        }
        let t = self.new_tmp();
        self.line(format!("ErgoVal {} = EV_NULLV;", t));
        if arg_tmps.is_empty() {
            self.line(format!("{} = ergo_call({}, 0, NULL);", t, ft.tmp));
        } else {
            let argv = self.new_sym("argv");
            self.open("{");
            self.line(format!(
                "ErgoVal {}[{}] = {{ {} }};",
                argv,
                arg_tmps.len(),
                arg_tmps.join(", ")
            ));
            self.line(format!(
                "{} = ergo_call({}, {}, {});",
                t,
                ft.tmp,
                arg_tmps.len(),
                argv
            ));
            self.close("}");
        }
        self.consume(&ft);
        for a in &arg_tmps {
            self.line(format!("ergo_release_val({});", a));
        }
        Ok(GenExpr::result(t))
    }

    /// Evaluate arguments in source order, call `symbol` (prefixing the
    /// receiver when given), release the argument temporaries, and
    /// produce either null or the call result.
    fn gen_direct_call(
        &mut self,
        symbol: &str,
        recv: Option<&str>,
        args: &[Expr],
        ret_void: bool,
    ) -> Result<GenExpr, Diag> {
        let mut arg_tmps = Vec::with_capacity(args.len());
        for arg in args {
            let ge = self.gen_expr(arg)?;
            self.release_others(&ge);
            arg_tmps.push(ge.tmp);
        }
        let mut call_args = Vec::new();
        if let Some(r) = recv {
            call_args.push(r.to_string());
        }
        call_args.extend(arg_tmps.iter().cloned());
        let joined = call_args.join(", ");
        let t = self.new_tmp();
        if ret_void {
            self.line(format!("{}({});", symbol, joined));
            for a in &arg_tmps {
                self.line(format!("ergo_release_val({});", a));
            }
            self.line(format!("ErgoVal {} = EV_NULLV;", t));
        } else {
            self.line(format!("ErgoVal {} = {}({});", t, symbol, joined));
            for a in &arg_tmps {
                self.line(format!("ergo_release_val({});", a));
            }
        }
        Ok(GenExpr::result(t))
    }

    fn gen_method_call(
        &mut self,
        e: &Expr,
        _callee: &Expr,
        base: &Expr,
        mname: &str,
        args: &[Expr],
    ) -> Result<GenExpr, Diag> {
        let base_ty = self.query_ty(base)?;

        if mname == "to_string" && args.is_empty() {
            let bt = self.gen_expr(base)?;
            let t = self.new_tmp();
            self.line(format!("ErgoVal {} = EV_STR(stdr_to_string({}));", t, bt.tmp));
            self.consume(&bt);
            return Ok(GenExpr::result(t));
        }

        if matches!(base_ty.strip_nullable(), Ty::Array(_)) {
            if mname == "add" && args.len() == 1 {
                let at = self.gen_expr(base)?;
                let vt = self.gen_expr(&args[0])?;
                self.line(format!(
                    "ergo_arr_add((ErgoArr*){}.as.p, {});",
                    at.tmp, vt.tmp
                ));
                self.consume(&at);
                self.release_others(&vt);
                let t = self.new_tmp();
                self.line(format!("ErgoVal {} = EV_NULLV;", t));
                return Ok(GenExpr::result(t));
            }
            if mname == "remove" && args.len() == 1 {
                let at = self.gen_expr(base)?;
                let it = self.gen_expr(&args[0])?;
                let t = self.new_tmp();
                self.line(format!(
                    "ErgoVal {} = ergo_arr_remove((ErgoArr*){}.as.p, ergo_as_int({}));",
                    t, at.tmp, it.tmp
                ));
                self.consume(&at);
                self.consume(&it);
                return Ok(GenExpr::result(t));
            }
            return Err(self.err(e.line, e.col, format!("unknown array method '{}'", mname)));
        }

        if let Ty::Class(qname) = base_ty.strip_nullable() {
            let Some(ci) = self.env.find_class(qname) else {
                return Err(self.err(e.line, e.col, "unknown class method"));
            };
            let Some(method) = ci.find_method(mname) else {
                return Err(self.err(e.line, e.col, format!("unknown method '{}'", mname)));
            };
            let ret_void = method.sig.ret.is_void();
            let (cask, class_short) = match qname.split_once('.') {
                Some((m, c)) => (m.to_string(), c.to_string()),
                None => (String::new(), qname.clone()),
            };
            let symbol = mangle::method_symbol(&cask, &class_short, mname);
            let bt = self.gen_expr(base)?;
            let recv = bt.tmp.clone();
            let out = self.gen_direct_call(&symbol, Some(&recv), args, ret_void)?;
            self.consume(&bt);
            return Ok(out);
        }

        Err(self.err(e.line, e.col, "unknown member call"))
    }

    /// Reserved bare names: the stdr internals and the GUI intrinsic
    /// table. Returns Ok(None) when the name isn't reserved.
    fn gen_builtin_call(
        &mut self,
        e: &Expr,
        fname: &str,
        args: &[Expr],
    ) -> Result<Option<GenExpr>, Diag> {
        match fname {
            "str" => {
                if args.len() != 1 {
                    return Err(self.err(e.line, e.col, "str expects 1 arg"));
                }
                let at = self.gen_expr(&args[0])?;
                let t = self.new_tmp();
                self.line(format!("ErgoVal {} = EV_STR(stdr_to_string({}));", t, at.tmp));
                self.consume(&at);
                return Ok(Some(GenExpr::result(t)));
            }
            "__len" => {
                if args.len() != 1 {
                    return Err(self.err(e.line, e.col, "'__len' expects 1 args"));
                }
                let at = self.gen_expr(&args[0])?;
                let t = self.new_tmp();
                self.line(format!("ErgoVal {} = EV_INT(stdr_len({}));", t, at.tmp));
                self.consume(&at);
                return Ok(Some(GenExpr::result(t)));
            }
            "__writef" => {
                if args.len() != 2 {
                    return Err(self.err(e.line, e.col, "'__writef' expects 2 args"));
                }
                let fmt = self.gen_expr(&args[0])?;
                let rest = self.gen_expr(&args[1])?;
                self.line(format!("stdr_writef_args({}, {});", fmt.tmp, rest.tmp));
                self.consume(&fmt);
                self.consume(&rest);
                let t = self.new_tmp();
                self.line(format!("ErgoVal {} = EV_NULLV;", t));
                return Ok(Some(GenExpr::result(t)));
            }
            "__read_line" => {
                let t = self.new_tmp();
                self.line(format!("ErgoVal {} = EV_STR(stdr_read_line());", t));
                return Ok(Some(GenExpr::result(t)));
            }
            "__readf_parse" => {
                if args.len() != 3 {
                    return Err(self.err(e.line, e.col, "'__readf_parse' expects 3 args"));
                }
                let fmt = self.gen_expr(&args[0])?;
                let line = self.gen_expr(&args[1])?;
                let rest = self.gen_expr(&args[2])?;
                let t = self.new_tmp();
                self.line(format!(
                    "ErgoVal {} = stdr_readf_parse({}, {}, {});",
                    t, fmt.tmp, line.tmp, rest.tmp
                ));
                self.consume(&fmt);
                self.consume(&line);
                self.consume(&rest);
                return Ok(Some(GenExpr::result(t)));
            }
            _ => {}
        }

        if fname.starts_with("__cogito_") {
            let Some(intrinsic) = intrinsics::find_intrinsic(fname) else {
                return Err(self.err(e.line, e.col, format!("unknown intrinsic '{}'", fname)));
            };
            if args.len() != intrinsic.arity {
                return Err(self.err(
                    e.line,
                    e.col,
                    format!("'{}' expects {} args", fname, intrinsic.arity),
                ));
            }
            let out =
                self.gen_direct_call(intrinsic.symbol, None, args, !intrinsic.returns_value)?;
            return Ok(Some(out));
        }
        Ok(None)
    }
}

// Statement lowering. Every exit path out of a statement releases each
// not-yet-consumed slot exactly once: normal scope exits emit epilogue
// releases, `return` releases every open scope before the jump, and
// `break`/`continue` release the scopes opened inside the loop body.

use yis_ast::{IfArm, Stmt, StmtKind};
use yis_diagnostics::Diag;

use super::Codegen;

impl<'e, 't, 'p> Codegen<'e, 't, 'p> {
    /// Emit the statements of a block body without opening a fresh C
    /// scope (the caller already did), or a single statement.
    pub(crate) fn gen_body(&mut self, b: &Stmt, ret_void: bool) -> Result<(), Diag> {
        match &b.kind {
            StmtKind::Block(stmts) => {
                for s in stmts {
                    self.gen_stmt(s, ret_void)?;
                }
                Ok(())
            }
            _ => self.gen_stmt(b, ret_void),
        }
    }

    pub(crate) fn gen_stmt(&mut self, s: &Stmt, ret_void: bool) -> Result<(), Diag> {
        match &s.kind {
            StmtKind::Let { name, is_mut, expr } => {
                let ty = self.query_ty(expr)?;
                let cvar = self.define_local(name, ty, *is_mut, false);
                self.line(format!("ErgoVal {} = EV_NULLV;", cvar));
                let ge = self.gen_expr(expr)?;
                self.line(format!("ergo_move_into(&{}, {});", cvar, ge.tmp));
                self.release_others(&ge);
                Ok(())
            }
            StmtKind::Const { name, expr } => {
                let ty = self.query_ty(expr)?;
                let cvar = self.define_local(name, ty, false, true);
                self.line(format!("ErgoVal {} = EV_NULLV;", cvar));
                let ge = self.gen_expr(expr)?;
                self.line(format!("ergo_move_into(&{}, {});", cvar, ge.tmp));
                self.release_others(&ge);
                Ok(())
            }
            StmtKind::Expr(e) => {
                let ge = self.gen_expr(e)?;
                self.consume(&ge);
                Ok(())
            }
            StmtKind::Return(value) => {
                if ret_void {
                    if let Some(value) = value {
                        let ge = self.gen_expr(value)?;
                        self.consume(&ge);
                    }
                    self.release_all_scopes_for_exit();
                    self.line("return;");
                } else {
                    match value {
                        Some(value) => {
                            let ge = self.gen_expr(value)?;
                            self.line(format!("ergo_move_into(&__ret, {});", ge.tmp));
                            self.release_others(&ge);
                        }
                        None => self.line("__ret = EV_NULLV;"),
                    }
                    self.release_all_scopes_for_exit();
                    self.line("return __ret;");
                }
                Ok(())
            }
            StmtKind::If { arms } => self.gen_if_chain(arms, 0, ret_void),
            StmtKind::Break => {
                self.release_scopes_to_loop()?;
                self.line("break;");
                Ok(())
            }
            StmtKind::Continue => {
                self.release_scopes_to_loop()?;
                self.line("continue;");
                Ok(())
            }
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                if let Some(init) = init {
                    self.gen_stmt(init, ret_void)?;
                }
                self.loop_mark_push();
                self.open("for (;;) {");
                if let Some(cond) = cond {
                    let ge = self.gen_expr(cond)?;
                    let b = self.new_bool();
                    self.line(format!("bool {} = ergo_as_bool({});", b, ge.tmp));
                    self.consume(&ge);
                    self.open(format!("if (!{}) {{", b));
                    self.line("break;");
                    self.close("}");
                }
                self.push_scope();
                self.gen_body(body, ret_void)?;
                let locals = self.pop_scope();
                self.release_locals(locals);
                // the step runs at the bottom, outside the body scope
                if let Some(step) = step {
                    let ge = self.gen_expr(step)?;
                    self.consume(&ge);
                }
                self.close("}");
                self.loop_mark_pop();
                Ok(())
            }
            StmtKind::Foreach { name, iter, body } => {
                let iter_ty = self.query_ty(iter)?.strip_nullable();
                let is_string = iter_ty.is_string();
                let elem_ty = match iter_ty {
                    crate::types::Ty::Array(elem) => *elem,
                    t if t.is_string() => t,
                    _ => {
                        return Err(self.err(s.line, s.col, "foreach expects array or string"));
                    }
                };

                let it = self.gen_expr(iter)?;
                self.push_scope();
                let cvar = self.define_local(name, elem_ty, false, false);
                self.line(format!("ErgoVal {} = EV_NULLV;", cvar));

                let len = self.new_sym("len");
                let idx = self.new_sym("i");
                self.line(format!("int {} = (int)stdr_len({});", len, it.tmp));
                self.loop_mark_push();
                self.open(format!(
                    "for (int {i} = 0; {i} < {len}; {i}++) {{",
                    i = idx,
                    len = len
                ));
                self.push_scope();
                if is_string {
                    self.line(format!("ErgoVal __e = stdr_str_at({}, {});", it.tmp, idx));
                } else {
                    self.line(format!(
                        "ErgoVal __e = ergo_arr_get((ErgoArr*){}.as.p, {});",
                        it.tmp, idx
                    ));
                }
                self.line(format!("ergo_move_into(&{}, __e);", cvar));
                self.gen_body(body, ret_void)?;
                let inner = self.pop_scope();
                self.release_locals(inner);
                self.close("}");
                self.loop_mark_pop();

                let outer = self.pop_scope();
                self.release_locals(outer);
                self.consume(&it);
                Ok(())
            }
            StmtKind::Block(_) => {
                self.open("{");
                self.push_scope();
                self.gen_body(s, ret_void)?;
                let locals = self.pop_scope();
                self.release_locals(locals);
                self.close("}");
                Ok(())
            }
        }
    }

    fn gen_if_chain(&mut self, arms: &[IfArm], idx: usize, ret_void: bool) -> Result<(), Diag> {
        if idx >= arms.len() {
            return Ok(());
        }
        let arm = &arms[idx];
        let Some(cond) = &arm.cond else {
            // final else arm: braces come from the caller's `else {`
            self.push_scope();
            self.gen_body(&arm.body, ret_void)?;
            let locals = self.pop_scope();
            self.release_locals(locals);
            return Ok(());
        };

        let ge = self.gen_expr(cond)?;
        let b = self.new_bool();
        self.line(format!("bool {} = ergo_as_bool({});", b, ge.tmp));
        self.consume(&ge);

        self.open(format!("if ({}) {{", b));
        self.push_scope();
        self.gen_body(&arm.body, ret_void)?;
        let locals = self.pop_scope();
        self.release_locals(locals);
        self.indent -= 1;

        if idx + 1 < arms.len() {
            self.line("} else {");
            self.indent += 1;
            self.gen_if_chain(arms, idx + 1, ret_void)?;
            self.indent -= 1;
            self.line("}");
        } else {
            self.line("}");
        }
        Ok(())
    }
}

// Compile-time constant evaluation.
// A tiny interpreter over literal expressions: literals, parentheses,
// unary - and !, and + - * / (plus % on integers). Anything else is a
// compile error, including interpolation inside a constant string.

use yis_ast::{BinOp, Expr, ExprKind, StrPart, UnaryOp};
use yis_diagnostics::Diag;

use crate::types::{Ty, TyArena};

/// Evaluated constant. The integer/float distinction is carried through
/// arithmetic so codegen can emit the matching literal form.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstVal {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Null,
}

impl ConstVal {
    pub fn ty<'t>(&self, arena: &'t TyArena<'t>) -> &'t Ty<'t> {
        match self {
            ConstVal::Int(_) | ConstVal::Float(_) => arena.num(),
            ConstVal::Bool(_) => arena.boolean(),
            ConstVal::Str(_) => arena.string(),
            ConstVal::Null => arena.null(),
        }
    }

    fn as_float(&self) -> Option<f64> {
        match self {
            ConstVal::Int(i) => Some(*i as f64),
            ConstVal::Float(f) => Some(*f),
            _ => None,
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self, ConstVal::Int(_) | ConstVal::Float(_))
    }
}

fn err(path: &str, e: &Expr, msg: impl Into<String>) -> Diag {
    Diag::new(path, e.line, e.col, msg)
}

pub fn eval_const_expr(path: &str, e: &Expr) -> Result<ConstVal, Diag> {
    match &e.kind {
        ExprKind::Int(v) => Ok(ConstVal::Int(*v)),
        ExprKind::Float(v) => Ok(ConstVal::Float(*v)),
        ExprKind::Bool(v) => Ok(ConstVal::Bool(*v)),
        ExprKind::Null => Ok(ConstVal::Null),
        ExprKind::Str(parts) => {
            let mut text = String::new();
            for part in parts {
                match part {
                    StrPart::Text(t) => text.push_str(t),
                    StrPart::Interp(_) => {
                        return Err(err(path, e, "const string cannot interpolate"));
                    }
                }
            }
            Ok(ConstVal::Str(text))
        }
        ExprKind::Paren(inner) => eval_const_expr(path, inner),
        ExprKind::Unary { op, expr } => {
            let v = eval_const_expr(path, expr)?;
            match op {
                UnaryOp::Neg => match v {
                    ConstVal::Int(i) => Ok(ConstVal::Int(-i)),
                    ConstVal::Float(f) => Ok(ConstVal::Float(-f)),
                    _ => Err(err(path, e, "const unary - expects numeric")),
                },
                UnaryOp::Not => match v {
                    ConstVal::Bool(b) => Ok(ConstVal::Bool(!b)),
                    _ => Err(err(path, e, "const ! expects bool")),
                },
                UnaryOp::Len => Err(err(
                    path,
                    e,
                    "const expression must be a literal or simple numeric expression",
                )),
            }
        }
        ExprKind::Binary { op, lhs, rhs } if op.is_arith() => {
            let a = eval_const_expr(path, lhs)?;
            let b = eval_const_expr(path, rhs)?;
            if !a.is_numeric() || !b.is_numeric() {
                return Err(err(path, e, "const numeric op expects numeric literals"));
            }
            if let (ConstVal::Int(ai), ConstVal::Int(bi)) = (&a, &b) {
                let (ai, bi) = (*ai, *bi);
                if bi == 0 && matches!(op, BinOp::Div | BinOp::Mod) {
                    return Err(err(path, e, "const division by zero"));
                }
                return Ok(ConstVal::Int(match op {
                    BinOp::Add => ai.wrapping_add(bi),
                    BinOp::Sub => ai.wrapping_sub(bi),
                    BinOp::Mul => ai.wrapping_mul(bi),
                    BinOp::Div => ai.wrapping_div(bi),
                    BinOp::Mod => ai.wrapping_rem(bi),
                    _ => unreachable!(),
                }));
            }
            if matches!(op, BinOp::Mod) {
                return Err(err(path, e, "const % not supported for float"));
            }
            // Option is infallible here, both operands were numeric
            let (af, bf) = match (a.as_float(), b.as_float()) {
                (Some(af), Some(bf)) => (af, bf),
                _ => return Err(err(path, e, "const numeric op expects numeric literals")),
            };
            Ok(ConstVal::Float(match op {
                BinOp::Add => af + bf,
                BinOp::Sub => af - bf,
                BinOp::Mul => af * bf,
                BinOp::Div => af / bf,
                _ => unreachable!(),
            }))
        }
        _ => Err(err(
            path,
            e,
            "const expression must be a literal or simple numeric expression",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yis_ast::Expr;

    fn int(v: i64) -> Expr {
        Expr::new(ExprKind::Int(v), 1, 1)
    }

    fn float(v: f64) -> Expr {
        Expr::new(ExprKind::Float(v), 1, 1)
    }

    fn bin(op: BinOp, a: Expr, b: Expr) -> Expr {
        Expr::new(
            ExprKind::Binary {
                op,
                lhs: Box::new(a),
                rhs: Box::new(b),
            },
            1,
            1,
        )
    }

    #[test]
    fn test_int_arith_stays_int() {
        let e = bin(BinOp::Add, int(40), int(2));
        assert_eq!(eval_const_expr("c.yi", &e).unwrap(), ConstVal::Int(42));
        let e = bin(BinOp::Div, int(7), int(2));
        assert_eq!(eval_const_expr("c.yi", &e).unwrap(), ConstVal::Int(3));
        let e = bin(BinOp::Mod, int(7), int(2));
        assert_eq!(eval_const_expr("c.yi", &e).unwrap(), ConstVal::Int(1));
    }

    #[test]
    fn test_float_promotion() {
        let e = bin(BinOp::Mul, int(2), float(1.5));
        assert_eq!(eval_const_expr("c.yi", &e).unwrap(), ConstVal::Float(3.0));
    }

    #[test]
    fn test_float_modulo_rejected() {
        let e = bin(BinOp::Mod, float(7.0), int(2));
        let d = eval_const_expr("c.yi", &e).unwrap_err();
        assert!(d.message.contains("not supported for float"));
    }

    #[test]
    fn test_division_by_zero_rejected() {
        let e = bin(BinOp::Div, int(1), int(0));
        assert!(eval_const_expr("c.yi", &e).is_err());
    }

    #[test]
    fn test_interpolation_rejected() {
        let e = Expr::new(
            ExprKind::Str(vec![
                StrPart::Text("v=".into()),
                StrPart::Interp("x".into()),
            ]),
            1,
            1,
        );
        let d = eval_const_expr("c.yi", &e).unwrap_err();
        assert!(d.message.contains("cannot interpolate"));
    }

    #[test]
    fn test_literal_only_string_concatenates() {
        let e = Expr::new(
            ExprKind::Str(vec![
                StrPart::Text("a".into()),
                StrPart::Text("b".into()),
            ]),
            1,
            1,
        );
        assert_eq!(
            eval_const_expr("c.yi", &e).unwrap(),
            ConstVal::Str("ab".into())
        );
    }

    #[test]
    fn test_non_literal_rejected() {
        let e = Expr::new(ExprKind::Ident("x".into()), 1, 1);
        assert!(eval_const_expr("c.yi", &e).is_err());
    }
}

// Unification and one-way assignability over `Ty`.
// A `Subst` lives for exactly one call site; generic bindings never
// cross call-site boundaries.

use yis_diagnostics::Diag;

use super::{Ty, TyArena};

/// Ordered mapping from generic variable names to types, created fresh
/// per call-site unification.
#[derive(Default)]
pub struct Subst<'t> {
    entries: Vec<(String, &'t Ty<'t>)>,
}

impl<'t> Subst<'t> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&'t Ty<'t>> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| *t)
    }

    pub fn set(&mut self, name: &str, ty: &'t Ty<'t>) {
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| n == name) {
            entry.1 = ty;
            return;
        }
        self.entries.push((name.to_string(), ty));
    }

    /// Rewrite `Gen` leaves to their bound types, recursing structurally.
    /// Unbound generics are left in place.
    pub fn apply(&self, arena: &'t TyArena<'t>, t: &'t Ty<'t>) -> &'t Ty<'t> {
        match t {
            Ty::Gen(name) => self.get(name).unwrap_or(t),
            Ty::Array(elem) => arena.array(self.apply(arena, elem)),
            Ty::Tuple(items) => {
                let items = items.iter().map(|i| self.apply(arena, i)).collect();
                arena.tuple(items)
            }
            Ty::Fn { params, ret } => {
                let params = params.iter().map(|p| self.apply(arena, p)).collect();
                arena.func(params, self.apply(arena, ret))
            }
            Ty::Nullable(inner) => arena.nullable(self.apply(arena, inner)),
            _ => t,
        }
    }
}

fn mismatch(path: &str, what: &str, expected: &Ty<'_>, actual: &Ty<'_>) -> Diag {
    let msg = if what.is_empty() {
        format!(
            "type mismatch (expected {}, got {})",
            expected.describe(),
            actual.describe()
        )
    } else {
        format!(
            "type mismatch: {} (expected {}, got {})",
            what,
            expected.describe(),
            actual.describe()
        )
    };
    Diag::new(path, 0, 0, msg)
}

fn arity_diag(path: &str, what: &str, kind: &str) -> Diag {
    let msg = if what.is_empty() {
        format!("{} arity mismatch", kind)
    } else {
        format!("{} arity mismatch: {}", kind, what)
    };
    Diag::new(path, 0, 0, msg)
}

/// Unify two types, updating `subst` with fresh generic bindings.
/// `what` names the syntactic position for diagnostics ("arg",
/// "ternary", ...).
pub fn unify<'t>(
    arena: &'t TyArena<'t>,
    a: &'t Ty<'t>,
    b: &'t Ty<'t>,
    path: &str,
    what: &str,
    mut subst: Option<&mut Subst<'t>>,
) -> Result<&'t Ty<'t>, Diag> {
    if a.is_any() {
        return Ok(a);
    }
    if b.is_any() {
        return Ok(b);
    }
    if a.is_null() && b.is_null() {
        return Ok(arena.null());
    }
    if a.is_null() {
        return Ok(arena.nullable(b));
    }
    if b.is_null() {
        return Ok(arena.nullable(a));
    }
    if a.is_nullable() || b.is_nullable() {
        let inner = unify(
            arena,
            a.strip_nullable(),
            b.strip_nullable(),
            path,
            what,
            subst,
        )?;
        return Ok(arena.nullable(inner));
    }
    if let Ty::Gen(name) = a {
        if let Some(bound) = subst.as_deref().and_then(|s| s.get(name)) {
            return unify(arena, bound, b, path, what, subst);
        }
        if let Some(s) = subst.as_deref_mut() {
            s.set(name, b);
        }
        return Ok(b);
    }
    if let Ty::Gen(name) = b {
        if let Some(bound) = subst.as_deref().and_then(|s| s.get(name)) {
            return unify(arena, a, bound, path, what, subst);
        }
        if let Some(s) = subst.as_deref_mut() {
            s.set(name, a);
        }
        return Ok(a);
    }
    match (a, b) {
        (Ty::Array(ea), Ty::Array(eb)) => {
            let elem = unify(arena, ea, eb, path, what, subst)?;
            Ok(arena.array(elem))
        }
        (Ty::Tuple(ia), Ty::Tuple(ib)) => {
            if ia.len() != ib.len() {
                return Err(arity_diag(path, what, "tuple"));
            }
            let mut items = Vec::with_capacity(ia.len());
            for (x, y) in ia.iter().zip(ib.iter()) {
                items.push(unify(arena, x, y, path, what, subst.as_deref_mut())?);
            }
            Ok(arena.tuple(items))
        }
        (
            Ty::Fn {
                params: pa,
                ret: ra,
            },
            Ty::Fn {
                params: pb,
                ret: rb,
            },
        ) => {
            if pa.len() != pb.len() {
                return Err(arity_diag(path, what, "fn"));
            }
            let mut params = Vec::with_capacity(pa.len());
            for (x, y) in pa.iter().zip(pb.iter()) {
                params.push(unify(arena, x, y, path, what, subst.as_deref_mut())?);
            }
            let ret = unify(arena, ra, rb, path, what, subst)?;
            Ok(arena.func(params, ret))
        }
        (Ty::Prim(pa), Ty::Prim(pb)) if pa == pb => Ok(a),
        (Ty::Class(na), Ty::Class(nb)) if na == nb => Ok(a),
        (Ty::Module(na), Ty::Module(nb)) if na == nb => Ok(a),
        (Ty::Void, Ty::Void) => Ok(a),
        _ => Err(mismatch(path, what, a, b)),
    }
}

/// One-way compatibility check used for argument passing, field
/// initialization, and assignment. Looser than `unify`: nullability is
/// compared on the inner types and `null` fits anywhere.
pub fn assignable<'t>(
    arena: &'t TyArena<'t>,
    expected: &'t Ty<'t>,
    actual: &'t Ty<'t>,
    path: &str,
    what: &str,
) -> Result<(), Diag> {
    if expected.is_null() || actual.is_null() {
        return Ok(());
    }
    if expected.is_any() || actual.is_any() {
        return Ok(());
    }
    if expected.is_nullable() || actual.is_nullable() {
        return assignable(
            arena,
            expected.strip_nullable(),
            actual.strip_nullable(),
            path,
            what,
        );
    }
    match (expected, actual) {
        (Ty::Array(ea), Ty::Array(eb)) => assignable(arena, ea, eb, path, what),
        (Ty::Tuple(ia), Ty::Tuple(ib)) => {
            if ia.len() != ib.len() {
                return Err(arity_diag(path, what, "tuple"));
            }
            for (x, y) in ia.iter().zip(ib.iter()) {
                assignable(arena, x, y, path, what)?;
            }
            Ok(())
        }
        (
            Ty::Fn {
                params: pa,
                ret: ra,
            },
            Ty::Fn {
                params: pb,
                ret: rb,
            },
        ) => {
            if pa.len() != pb.len() {
                return Err(arity_diag(path, what, "fn"));
            }
            for (x, y) in pa.iter().zip(pb.iter()) {
                assignable(arena, x, y, path, what)?;
            }
            assignable(arena, ra, rb, path, what)
        }
        (Ty::Prim(pa), Ty::Prim(pb)) if pa != pb => {
            Err(mismatch(path, what, expected, actual))
        }
        _ => Ok(()),
    }
}

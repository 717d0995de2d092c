// Type representation for the checker and the C emitter.
// Type nodes are immutable and live in a `TyArena` for the duration of
// one compilation; everything downstream holds `&'t Ty<'t>` references.

mod unify;

pub use unify::{assignable, unify, Subst};

use typed_arena::Arena;

/// Primitive types. `Any` unifies with everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prim {
    Num,
    Bool,
    Str,
    Any,
}

impl Prim {
    pub fn name(self) -> &'static str {
        match self {
            Prim::Num => "num",
            Prim::Bool => "bool",
            Prim::Str => "string",
            Prim::Any => "any",
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum Ty<'t> {
    Prim(Prim),
    /// Class type, identified by its qualified `cask.Class` name.
    Class(String),
    Array(&'t Ty<'t>),
    Tuple(Vec<&'t Ty<'t>>),
    Fn {
        params: Vec<&'t Ty<'t>>,
        ret: &'t Ty<'t>,
    },
    Void,
    Null,
    /// `T` or null. Never nests: construction goes through
    /// `TyArena::nullable`, which collapses.
    Nullable(&'t Ty<'t>),
    /// A cask name used as a value (member-access base only).
    Module(String),
    /// Generic variable, bound per call site through a `Subst`.
    Gen(String),
}

impl<'t> Ty<'t> {
    pub fn is_num(&self) -> bool {
        matches!(self, Ty::Prim(Prim::Num))
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Ty::Prim(Prim::Bool))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Ty::Prim(Prim::Str))
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Ty::Prim(Prim::Any))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Ty::Void)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Ty::Null)
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, Ty::Nullable(_))
    }

    /// The inner type of a nullable, the type itself otherwise.
    pub fn strip_nullable(&'t self) -> &'t Ty<'t> {
        match self {
            Ty::Nullable(inner) => inner,
            _ => self,
        }
    }

    /// Parameter and return types when this is a function type.
    pub fn as_fn(&'t self) -> Option<(&'t [&'t Ty<'t>], &'t Ty<'t>)> {
        match self {
            Ty::Fn { params, ret } => Some((params.as_slice(), ret)),
            _ => None,
        }
    }

    /// Short description used in diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Ty::Prim(p) => p.name().to_string(),
            Ty::Class(q) => format!("class {}", q),
            Ty::Array(_) => "array".to_string(),
            Ty::Tuple(_) => "tuple".to_string(),
            Ty::Fn { .. } => "fn".to_string(),
            Ty::Void => "void".to_string(),
            Ty::Null => "null".to_string(),
            Ty::Nullable(_) => "nullable".to_string(),
            Ty::Module(_) => "cask".to_string(),
            Ty::Gen(n) => format!("gen {}", n),
        }
    }
}

/// Arena owning every `Ty` of one compilation. Dropping it releases them
/// all at once; nothing outlives the compilation.
pub struct TyArena<'t> {
    tys: Arena<Ty<'t>>,
}

impl<'t> Default for TyArena<'t> {
    fn default() -> Self {
        Self { tys: Arena::new() }
    }
}

impl<'t> TyArena<'t> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&'t self, ty: Ty<'t>) -> &'t Ty<'t> {
        self.tys.alloc(ty)
    }

    pub fn prim(&'t self, p: Prim) -> &'t Ty<'t> {
        self.alloc(Ty::Prim(p))
    }

    pub fn num(&'t self) -> &'t Ty<'t> {
        self.prim(Prim::Num)
    }

    pub fn boolean(&'t self) -> &'t Ty<'t> {
        self.prim(Prim::Bool)
    }

    pub fn string(&'t self) -> &'t Ty<'t> {
        self.prim(Prim::Str)
    }

    pub fn any(&'t self) -> &'t Ty<'t> {
        self.prim(Prim::Any)
    }

    pub fn void(&'t self) -> &'t Ty<'t> {
        self.alloc(Ty::Void)
    }

    pub fn null(&'t self) -> &'t Ty<'t> {
        self.alloc(Ty::Null)
    }

    pub fn class(&'t self, qname: impl Into<String>) -> &'t Ty<'t> {
        self.alloc(Ty::Class(qname.into()))
    }

    pub fn array(&'t self, elem: &'t Ty<'t>) -> &'t Ty<'t> {
        self.alloc(Ty::Array(elem))
    }

    pub fn tuple(&'t self, items: Vec<&'t Ty<'t>>) -> &'t Ty<'t> {
        self.alloc(Ty::Tuple(items))
    }

    pub fn func(&'t self, params: Vec<&'t Ty<'t>>, ret: &'t Ty<'t>) -> &'t Ty<'t> {
        self.alloc(Ty::Fn { params, ret })
    }

    /// `Nullable(Nullable(T))` normalizes to `Nullable(T)`; null and
    /// `any` stay as they are.
    pub fn nullable(&'t self, inner: &'t Ty<'t>) -> &'t Ty<'t> {
        match inner {
            Ty::Nullable(_) | Ty::Null => inner,
            _ => self.alloc(Ty::Nullable(inner)),
        }
    }

    pub fn module(&'t self, name: impl Into<String>) -> &'t Ty<'t> {
        self.alloc(Ty::Module(name.into()))
    }

    pub fn gen(&'t self, name: impl Into<String>) -> &'t Ty<'t> {
        self.alloc(Ty::Gen(name.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nullable_collapses() {
        let a = TyArena::new();
        let n = a.nullable(a.num());
        let nn = a.nullable(n);
        assert_eq!(n, nn);
        assert!(nn.strip_nullable().is_num());
        // Nullable(null) stays null
        assert!(a.nullable(a.null()).is_null());
    }

    #[test]
    fn test_describe() {
        let a = TyArena::new();
        assert_eq!(a.num().describe(), "num");
        assert_eq!(a.class("m.Box").describe(), "class m.Box");
        assert_eq!(a.nullable(a.string()).describe(), "nullable");
    }
}

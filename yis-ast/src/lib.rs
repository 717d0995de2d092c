// AST for the Yis language.
// The parser (out of tree) produces this shape; the compiler consumes it.
// Every node carries the source line/column it came from, because the
// checker and the code generator both report positions long after the
// source text itself is gone.

use serde::{Deserialize, Serialize};

/// Root of a compilation: an ordered sequence of casks.
/// The first module is the entry module; its declared cask name may
/// differ from its file basename to name the project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub mods: Vec<Module>,
}

/// One cask (one source file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    /// Path the file was read from; basename (extension stripped) is the
    /// derived cask name.
    pub path: String,
    /// Optional `cask name;` declaration.
    pub declared_name: Option<String>,
    pub imports: Vec<Import>,
    pub decls: Vec<Decl>,
}

/// A `bring name;` import. The name may carry a `.yi` suffix which the
/// environment builder strips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Import {
    pub name: String,
    pub line: u32,
    pub col: u32,
}

/// Class visibility: default (cask-local), `pub`, or `lock` (fields
/// visible only to the declaring file and the class's own methods).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Default,
    Pub,
    Lock,
}

/// Class kind. Struct- and enum-kind classes allow positional
/// construction without an `init` method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassKind {
    Class,
    Struct,
    Enum,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decl {
    pub kind: DeclKind,
    pub line: u32,
    pub col: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeclKind {
    /// Free function.
    Fun(FunDecl),
    Class(ClassDecl),
    /// Compile-time constant.
    Const(ConstDecl),
    /// Module-level global slot, optionally mutable.
    Def(DefDecl),
    /// The unique program entry point.
    Entry(EntryDecl),
}

/// A function or method. Methods live inside `ClassDecl` and must mark
/// their first parameter `is_this` (optionally `is_mut` for `?this`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunDecl {
    pub name: String,
    pub is_pub: bool,
    pub params: Vec<Param>,
    pub ret: RetSpec,
    /// Always a block after lowering.
    pub body: Stmt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    /// `None` only for untyped lambda parameters.
    pub typ: Option<TypeRef>,
    pub is_this: bool,
    pub is_mut: bool,
}

/// Declared return types: empty means void, one entry is a plain return,
/// several entries form a tuple return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RetSpec {
    pub types: Vec<TypeRef>,
}

impl RetSpec {
    pub fn void() -> Self {
        Self { types: Vec::new() }
    }

    pub fn single(t: TypeRef) -> Self {
        Self { types: vec![t] }
    }

    pub fn is_void(&self) -> bool {
        self.types.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDecl {
    pub name: String,
    pub vis: Visibility,
    pub kind: ClassKind,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<FunDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub typ: TypeRef,
    pub line: u32,
    pub col: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstDecl {
    pub name: String,
    pub expr: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefDecl {
    pub name: String,
    pub is_mut: bool,
    pub expr: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDecl {
    pub ret: RetSpec,
    pub body: Stmt,
}

/// Type reference as written in source: a (possibly cask-qualified)
/// name, or an array of another type reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeRef {
    pub kind: TypeRefKind,
    pub line: u32,
    pub col: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeRefKind {
    Named(String),
    Array(Box<TypeRef>),
}

impl TypeRef {
    pub fn named(name: impl Into<String>, line: u32, col: u32) -> Self {
        Self {
            kind: TypeRefKind::Named(name.into()),
            line,
            col,
        }
    }

    pub fn array(elem: TypeRef, line: u32, col: u32) -> Self {
        Self {
            kind: TypeRefKind::Array(Box::new(elem)),
            line,
            col,
        }
    }
}

/// One part of an interpolated string literal: raw text or a `$name`
/// interpolation referring to a local.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StrPart {
    Text(String),
    Interp(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub line: u32,
    pub col: u32,
}

impl Expr {
    pub fn new(kind: ExprKind, line: u32, col: u32) -> Self {
        Self { kind, line, col }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
    /// Interpolated string literal.
    Str(Vec<StrPart>),
    Ident(String),
    Tuple(Vec<Expr>),
    /// Array literal; the annotation is required when the literal is
    /// empty and must be an array type.
    Array {
        items: Vec<Expr>,
        annot: Option<TypeRef>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Member {
        base: Box<Expr>,
        name: String,
    },
    Paren(Box<Expr>),
    Ternary {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    /// If-expression; the last arm's condition may be absent (else).
    IfExpr {
        arms: Vec<IfExprArm>,
    },
    Match {
        scrutinee: Box<Expr>,
        arms: Vec<MatchArm>,
    },
    Lambda {
        params: Vec<Param>,
        body: Box<Expr>,
    },
    Block(Box<Stmt>),
    /// `new Class(...)`. `arg_names[i]` is `Some` for the named form;
    /// named and positional arguments may not be mixed.
    New {
        class: String,
        args: Vec<Expr>,
        arg_names: Vec<Option<String>>,
    },
    /// Explicit ownership transfer; produced by lowering from `move(x)`.
    Move(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfExprArm {
    pub cond: Option<Expr>,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchArm {
    pub pat: Pattern,
    pub expr: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub kind: PatternKind,
    pub line: u32,
    pub col: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PatternKind {
    /// `_`
    Wildcard,
    /// Binds the scrutinee under a fresh name for the arm body.
    Ident(String),
    Int(i64),
    Str(String),
    Bool(bool),
    Null,
}

/// Unary operators. `Len` (`#x`) is desugared away by lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
    Len,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    /// `??`
    Coalesce,
}

impl BinOp {
    /// Operator spelling for diagnostics.
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::Coalesce => "??",
        }
    }

    pub fn is_arith(self) -> bool {
        matches!(
            self,
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(self, BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
}

impl AssignOp {
    pub fn symbol(self) -> &'static str {
        match self {
            AssignOp::Assign => "=",
            AssignOp::AddAssign => "+=",
            AssignOp::SubAssign => "-=",
            AssignOp::MulAssign => "*=",
            AssignOp::DivAssign => "/=",
        }
    }

    pub fn is_compound(self) -> bool {
        !matches!(self, AssignOp::Assign)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: u32,
    pub col: u32,
}

impl Stmt {
    pub fn new(kind: StmtKind, line: u32, col: u32) -> Self {
        Self { kind, line, col }
    }

    pub fn is_empty_block(&self) -> bool {
        matches!(&self.kind, StmtKind::Block(stmts) if stmts.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    Let {
        name: String,
        is_mut: bool,
        expr: Expr,
    },
    Const {
        name: String,
        expr: Expr,
    },
    Return(Option<Expr>),
    Break,
    Continue,
    /// Ordered arms; the last arm's condition may be absent (else).
    If {
        arms: Vec<IfArm>,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Expr>,
        body: Box<Stmt>,
    },
    Foreach {
        name: String,
        iter: Expr,
        body: Box<Stmt>,
    },
    Block(Vec<Stmt>),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfArm {
    pub cond: Option<Expr>,
    pub body: Stmt,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ret_spec_shapes() {
        assert!(RetSpec::void().is_void());
        let single = RetSpec::single(TypeRef::named("num", 1, 1));
        assert!(!single.is_void());
        assert_eq!(single.types.len(), 1);
    }

    #[test]
    fn test_serialization() {
        let program = Program {
            mods: vec![Module {
                path: "init.yi".to_string(),
                declared_name: None,
                imports: vec![Import {
                    name: "stdr".to_string(),
                    line: 1,
                    col: 1,
                }],
                decls: vec![Decl {
                    kind: DeclKind::Entry(EntryDecl {
                        ret: RetSpec::void(),
                        body: Stmt::new(StmtKind::Block(vec![]), 2, 1),
                    }),
                    line: 2,
                    col: 1,
                }],
            }],
        };

        let json = serde_json::to_string(&program).unwrap();
        let deserialized: Program = serde_json::from_str(&json).unwrap();
        assert_eq!(program, deserialized);
    }
}

// Global program environment.
// Built once per compilation in fixed, ordered passes over all casks;
// after the builder returns, the tables are never resized. The only
// late-bound data is each global slot's type, which pass 10 fills in
// through a Cell once function and class signatures exist.

mod consts;

pub use consts::{eval_const_expr, ConstVal};

use std::cell::Cell;

use log::debug;
use yis_ast::{ClassKind, Decl, DeclKind, Program, TypeRef, TypeRefKind, Visibility};
use yis_diagnostics::Diag;

use crate::types::{Ty, TyArena};

#[derive(Debug)]
pub struct CaskName {
    pub path: String,
    pub name: String,
}

#[derive(Debug)]
pub struct CaskImports {
    pub cask: String,
    pub imports: Vec<String>,
}

#[derive(Debug)]
pub struct ConstEntry {
    pub name: String,
    pub val: ConstVal,
}

#[derive(Debug)]
pub struct CaskConsts {
    pub cask: String,
    pub entries: Vec<ConstEntry>,
}

/// A module-level `def` slot. The type is assigned after all signatures
/// are known; reading it before then is "used before definition".
#[derive(Debug)]
pub struct GlobalVar<'t> {
    pub name: String,
    pub is_mut: bool,
    pub ty: Cell<Option<&'t Ty<'t>>>,
}

#[derive(Debug)]
pub struct CaskGlobals<'t> {
    pub cask: String,
    pub vars: Vec<GlobalVar<'t>>,
}

impl<'t> CaskGlobals<'t> {
    pub fn find(&self, name: &str) -> Option<&GlobalVar<'t>> {
        self.vars.iter().find(|v| v.name == name)
    }
}

#[derive(Debug)]
pub struct FieldEntry<'t> {
    pub name: String,
    pub ty: &'t Ty<'t>,
}

#[derive(Debug)]
pub struct FunSig<'t> {
    pub name: String,
    pub cask: String,
    pub params: Vec<&'t Ty<'t>>,
    pub param_names: Vec<String>,
    /// `?name` parameters demand a mutable lvalue argument.
    pub param_muts: Vec<bool>,
    pub ret: &'t Ty<'t>,
    pub is_method: bool,
    pub recv_mut: bool,
    pub owner_class: Option<String>,
    /// Path of the declaring file, for diagnostics.
    pub cask_path: String,
}

#[derive(Debug)]
pub struct MethodEntry<'t> {
    pub name: String,
    pub sig: FunSig<'t>,
}

#[derive(Debug)]
pub struct ClassInfo<'t> {
    pub name: String,
    pub cask: String,
    pub qname: String,
    pub vis: Visibility,
    pub kind: ClassKind,
    pub cask_path: String,
    pub fields: Vec<FieldEntry<'t>>,
    pub methods: Vec<MethodEntry<'t>>,
}

impl<'t> ClassInfo<'t> {
    pub fn find_field(&self, name: &str) -> Option<&FieldEntry<'t>> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn find_method(&self, name: &str) -> Option<&MethodEntry<'t>> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// The whole-program environment consumed by the checker, the lint pass
/// and the code generator.
pub struct GlobalEnv<'t> {
    pub arena: &'t TyArena<'t>,
    pub cask_names: Vec<CaskName>,
    pub cask_imports: Vec<CaskImports>,
    pub cask_consts: Vec<CaskConsts>,
    pub cask_globals: Vec<CaskGlobals<'t>>,
    pub classes: Vec<ClassInfo<'t>>,
    pub funs: Vec<FunSig<'t>>,
}

/// `cask.Name`, unless the name is already qualified.
pub fn qualify(cask: &str, name: &str) -> String {
    if name.contains('.') {
        name.to_string()
    } else {
        format!("{}.{}", cask, name)
    }
}

/// Derived cask name: file basename with a trailing `.yi` stripped.
pub fn cask_name_for_path(path: &str) -> String {
    let base = path
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(path);
    base.strip_suffix(".yi").unwrap_or(base).to_string()
}

/// Imports may be written with a `.yi` suffix; the builder strips it.
pub fn normalize_import_name(name: &str) -> String {
    name.strip_suffix(".yi").unwrap_or(name).to_string()
}

/// Explicit generic variables are all-caps-style identifiers: uppercase
/// first character, then only `[A-Z0-9_]`.
pub fn is_explicit_generic_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_uppercase() => {}
        _ => return false,
    }
    name.chars()
        .all(|c| c == '_' || c.is_ascii_uppercase() || c.is_ascii_digit())
}

impl<'t> GlobalEnv<'t> {
    pub fn find_class(&self, qname: &str) -> Option<&ClassInfo<'t>> {
        self.classes.iter().find(|c| c.qname == qname)
    }

    pub fn find_fun(&self, cask: &str, name: &str) -> Option<&FunSig<'t>> {
        self.funs.iter().find(|f| f.cask == cask && f.name == name)
    }

    pub fn imports_of(&self, cask: &str) -> &[String] {
        self.cask_imports
            .iter()
            .find(|i| i.cask == cask)
            .map(|i| i.imports.as_slice())
            .unwrap_or(&[])
    }

    pub fn consts_of(&self, cask: &str) -> Option<&CaskConsts> {
        self.cask_consts.iter().find(|c| c.cask == cask)
    }

    pub fn find_const(&self, cask: &str, name: &str) -> Option<&ConstEntry> {
        self.consts_of(cask)
            .and_then(|mc| mc.entries.iter().find(|e| e.name == name))
    }

    pub fn globals_of(&self, cask: &str) -> Option<&CaskGlobals<'t>> {
        self.cask_globals.iter().find(|g| g.cask == cask)
    }

    pub fn find_global(&self, cask: &str, name: &str) -> Option<&GlobalVar<'t>> {
        self.globals_of(cask).and_then(|mg| mg.find(name))
    }

    pub fn cask_name_of_path(&self, path: &str) -> Option<&str> {
        self.cask_names
            .iter()
            .find(|c| c.path == path)
            .map(|c| c.name.as_str())
    }

    /// Resolve a written type reference against this environment.
    /// `cask` is the referencing cask; `imports` its resolved imports.
    pub fn ty_from_type_ref(
        &self,
        tref: &TypeRef,
        cask: &str,
        cask_path: &str,
        imports: &[String],
    ) -> Result<&'t Ty<'t>, Diag> {
        match &tref.kind {
            TypeRefKind::Array(elem) => {
                let elem = self.ty_from_type_ref(elem, cask, cask_path, imports)?;
                Ok(self.arena.array(elem))
            }
            TypeRefKind::Named(raw) => {
                let n = if raw == "str" { "string" } else { raw.as_str() };
                match n {
                    "int" | "float" | "char" | "byte" => {
                        return Err(Diag::new(
                            cask_path,
                            tref.line,
                            tref.col,
                            format!("unknown type '{}' (use num)", n),
                        ));
                    }
                    "num" => return Ok(self.arena.num()),
                    "bool" => return Ok(self.arena.boolean()),
                    "string" => return Ok(self.arena.string()),
                    "any" => return Ok(self.arena.any()),
                    "void" => return Ok(self.arena.void()),
                    _ => {}
                }
                if let Some(dot) = n.find('.') {
                    let (qcask, _) = n.split_at(dot);
                    let in_scope = qcask == cask || imports.iter().any(|i| i == qcask);
                    if !in_scope || self.find_class(n).is_none() {
                        return Err(Diag::new(
                            cask_path,
                            tref.line,
                            tref.col,
                            format!("unknown type '{}'", n),
                        ));
                    }
                    return Ok(self.arena.class(n));
                }
                let qname = qualify(cask, n);
                if self.find_class(&qname).is_some() {
                    return Ok(self.arena.class(qname));
                }
                if is_explicit_generic_name(n) {
                    return Ok(self.arena.gen(n));
                }
                Err(Diag::new(
                    cask_path,
                    tref.line,
                    tref.col,
                    format!("unknown type '{}'", n),
                ))
            }
        }
    }

    /// Resolve a declared return spec: void, a single type, or a tuple.
    pub fn resolve_ret(
        &self,
        ret: &yis_ast::RetSpec,
        cask: &str,
        cask_path: &str,
        imports: &[String],
    ) -> Result<&'t Ty<'t>, Diag> {
        if ret.is_void() {
            return Ok(self.arena.void());
        }
        if ret.types.len() == 1 {
            return self.ty_from_type_ref(&ret.types[0], cask, cask_path, imports);
        }
        let mut items = Vec::with_capacity(ret.types.len());
        for t in &ret.types {
            items.push(self.ty_from_type_ref(t, cask, cask_path, imports)?);
        }
        Ok(self.arena.tuple(items))
    }
}

fn decl_err(path: &str, d: &Decl, msg: impl Into<String>) -> Diag {
    Diag::new(path, d.line, d.col, msg)
}

/// Build the global environment in the fixed pass order: cask names,
/// imports, global slots, constants, class shells, class bodies, free
/// functions, entry validation, then global typing.
pub fn build_global_env<'t, 'p>(
    prog: &'p Program,
    arena: &'t TyArena<'t>,
) -> Result<GlobalEnv<'t>, Diag> {
    let mut env = GlobalEnv {
        arena,
        cask_names: Vec::with_capacity(prog.mods.len()),
        cask_imports: Vec::with_capacity(prog.mods.len()),
        cask_consts: Vec::new(),
        cask_globals: Vec::with_capacity(prog.mods.len()),
        classes: Vec::new(),
        funs: Vec::new(),
    };

    // Pass 1+2: cask names and imports. The entry module (index 0) may
    // declare a cask name different from its file basename to set the
    // project identity; every other module must match.
    for (i, m) in prog.mods.iter().enumerate() {
        let derived = cask_name_for_path(&m.path);
        let name = match &m.declared_name {
            Some(declared) if declared != &derived => {
                if i == 0 {
                    declared.clone()
                } else {
                    return Err(Diag::new(
                        m.path.clone(),
                        1,
                        1,
                        format!(
                            "cask declaration '{}' must match file name '{}'",
                            declared, derived
                        ),
                    ));
                }
            }
            _ => derived,
        };
        env.cask_names.push(CaskName {
            path: m.path.clone(),
            name: name.clone(),
        });
        env.cask_imports.push(CaskImports {
            cask: name.clone(),
            imports: m
                .imports
                .iter()
                .map(|imp| normalize_import_name(&imp.name))
                .collect(),
        });
        env.cask_globals.push(CaskGlobals {
            cask: name,
            vars: Vec::new(),
        });
    }

    // Pass 3: reserve global slots; duplicate defs are fatal.
    for (i, m) in prog.mods.iter().enumerate() {
        for d in &m.decls {
            if let DeclKind::Def(def) = &d.kind {
                let slot = &mut env.cask_globals[i];
                if slot.find(&def.name).is_some() {
                    return Err(decl_err(
                        &m.path,
                        d,
                        format!("duplicate global '{}'", def.name),
                    ));
                }
                slot.vars.push(GlobalVar {
                    name: def.name.clone(),
                    is_mut: def.is_mut,
                    ty: Cell::new(None),
                });
            }
        }
    }

    // Pass 5: constant evaluation per cask.
    for (i, m) in prog.mods.iter().enumerate() {
        let cask = env.cask_names[i].name.clone();
        let mut entries: Vec<ConstEntry> = Vec::new();
        for d in &m.decls {
            if let DeclKind::Const(cd) = &d.kind {
                if entries.iter().any(|e| e.name == cd.name) {
                    return Err(decl_err(
                        &m.path,
                        d,
                        format!("duplicate const '{}'", cd.name),
                    ));
                }
                let val = eval_const_expr(&m.path, &cd.expr)?;
                entries.push(ConstEntry {
                    name: cd.name.clone(),
                    val,
                });
            }
        }
        if !entries.is_empty() {
            env.cask_consts.push(CaskConsts { cask, entries });
        }
    }

    // Pass 6: class shells.
    for (i, m) in prog.mods.iter().enumerate() {
        let cask = env.cask_names[i].name.clone();
        for d in &m.decls {
            if let DeclKind::Class(cd) = &d.kind {
                let qname = qualify(&cask, &cd.name);
                if env.find_class(&qname).is_some() {
                    return Err(decl_err(
                        &m.path,
                        d,
                        format!("duplicate class '{}'", cd.name),
                    ));
                }
                env.classes.push(ClassInfo {
                    name: cd.name.clone(),
                    cask: cask.clone(),
                    qname,
                    vis: cd.vis,
                    kind: cd.kind,
                    cask_path: m.path.clone(),
                    fields: Vec::new(),
                    methods: Vec::new(),
                });
            }
        }
    }

    // Pass 7: class bodies (field types and method signatures).
    for (i, m) in prog.mods.iter().enumerate() {
        let cask = env.cask_names[i].name.clone();
        let imports = env.imports_of(&cask).to_vec();
        for d in &m.decls {
            let DeclKind::Class(cd) = &d.kind else {
                continue;
            };
            let qname = qualify(&cask, &cd.name);

            let mut fields = Vec::with_capacity(cd.fields.len());
            for fd in &cd.fields {
                if fields.iter().any(|f: &FieldEntry| f.name == fd.name) {
                    return Err(Diag::new(
                        m.path.clone(),
                        fd.line,
                        fd.col,
                        format!("duplicate field '{}' in class '{}'", fd.name, cd.name),
                    ));
                }
                let ty = env.ty_from_type_ref(&fd.typ, &cask, &m.path, &imports)?;
                fields.push(FieldEntry {
                    name: fd.name.clone(),
                    ty,
                });
            }

            let mut methods: Vec<MethodEntry> = Vec::with_capacity(cd.methods.len());
            for md in &cd.methods {
                let Some(recv) = md.params.first().filter(|p| p.is_this) else {
                    return Err(decl_err(
                        &m.path,
                        d,
                        format!(
                            "method '{}' in class '{}' must begin with this/?this",
                            md.name, cd.name
                        ),
                    ));
                };
                if methods.iter().any(|mm| mm.name == md.name) {
                    return Err(decl_err(
                        &m.path,
                        d,
                        format!("duplicate method '{}' in class '{}'", md.name, cd.name),
                    ));
                }
                let mut params = Vec::new();
                let mut param_names = Vec::new();
                let mut param_muts = Vec::new();
                for p in md.params.iter().skip(1) {
                    if p.is_this {
                        return Err(decl_err(&m.path, d, "only first param may be this"));
                    }
                    let Some(typ) = &p.typ else {
                        return Err(decl_err(
                            &m.path,
                            d,
                            format!("method parameter '{}' needs a type", p.name),
                        ));
                    };
                    params.push(env.ty_from_type_ref(typ, &cask, &m.path, &imports)?);
                    param_names.push(p.name.clone());
                    param_muts.push(p.is_mut);
                }
                let ret = env.resolve_ret(&md.ret, &cask, &m.path, &imports)?;
                methods.push(MethodEntry {
                    name: md.name.clone(),
                    sig: FunSig {
                        name: md.name.clone(),
                        cask: cask.clone(),
                        params,
                        param_names,
                        param_muts,
                        ret,
                        is_method: true,
                        recv_mut: recv.is_mut,
                        owner_class: Some(qname.clone()),
                        cask_path: m.path.clone(),
                    },
                });
            }

            // The shell exists from pass 6, fill it in place.
            if let Some(ci) = env.classes.iter_mut().find(|c| c.qname == qname) {
                ci.fields = fields;
                ci.methods = methods;
            }
        }
    }

    // Pass 8+9: free functions and the entry declaration.
    let mut entry_seen = false;
    for (i, m) in prog.mods.iter().enumerate() {
        let cask = env.cask_names[i].name.clone();
        let imports = env.imports_of(&cask).to_vec();
        for d in &m.decls {
            match &d.kind {
                DeclKind::Fun(fd) => {
                    if fd.params.iter().any(|p| p.is_this) {
                        return Err(decl_err(
                            &m.path,
                            d,
                            format!("free function '{}' cannot take this/?this", fd.name),
                        ));
                    }
                    if env.find_fun(&cask, &fd.name).is_some() {
                        return Err(decl_err(
                            &m.path,
                            d,
                            format!("duplicate function '{}'", fd.name),
                        ));
                    }
                    let mut params = Vec::new();
                    let mut param_names = Vec::new();
                    let mut param_muts = Vec::new();
                    for p in &fd.params {
                        let Some(typ) = &p.typ else {
                            return Err(decl_err(
                                &m.path,
                                d,
                                format!("parameter '{}' needs a type", p.name),
                            ));
                        };
                        params.push(env.ty_from_type_ref(typ, &cask, &m.path, &imports)?);
                        param_names.push(p.name.clone());
                        param_muts.push(p.is_mut);
                    }
                    let ret = env.resolve_ret(&fd.ret, &cask, &m.path, &imports)?;
                    env.funs.push(FunSig {
                        name: fd.name.clone(),
                        cask: cask.clone(),
                        params,
                        param_names,
                        param_muts,
                        ret,
                        is_method: false,
                        recv_mut: false,
                        owner_class: None,
                        cask_path: m.path.clone(),
                    });
                }
                DeclKind::Entry(_) => {
                    if i != 0 {
                        return Err(decl_err(
                            &m.path,
                            d,
                            "entry() is only allowed in the entry module",
                        ));
                    }
                    if entry_seen {
                        return Err(decl_err(&m.path, d, "duplicate entry()"));
                    }
                    entry_seen = true;
                }
                _ => {}
            }
        }
    }
    if !entry_seen {
        return Err(Diag::message("missing entry()"));
    }

    // Pass 10: type each `def` initializer now that signatures exist.
    // Order is declaration order; forward references show up as
    // "used before definition" inside the checker.
    for (i, m) in prog.mods.iter().enumerate() {
        let cask = env.cask_names[i].name.clone();
        let imports = env.imports_of(&cask).to_vec();
        for d in &m.decls {
            if let DeclKind::Def(def) = &d.kind {
                let ty = crate::typecheck::check_top_expr(&env, &m.path, &cask, &imports, &def.expr)?;
                if let Some(gv) = env.find_global(&cask, &def.name) {
                    gv.ty.set(Some(ty));
                }
            }
        }
    }

    debug!(
        "global env: {} casks, {} classes, {} functions",
        env.cask_names.len(),
        env.classes.len(),
        env.funs.len()
    );
    Ok(env)
}

// C name mangling. Non-alphanumeric bytes in a cask name are replaced
// with underscores; everything else concatenates with fixed prefixes.

/// Cask names may come from arbitrary file names.
pub fn mangle_cask(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Free function `M.f` => `ergo_M_f`.
pub fn fun_symbol(cask: &str, name: &str) -> String {
    format!("ergo_{}_{}", mangle_cask(cask), name)
}

/// Global slot `M.g` => `ergo_g_M_g`.
pub fn global_symbol(cask: &str, name: &str) -> String {
    format!("ergo_g_{}_{}", mangle_cask(cask), name)
}

/// Module initializer => `ergo_init_M`.
pub fn init_symbol(cask: &str) -> String {
    format!("ergo_init_{}", mangle_cask(cask))
}

/// Method `M.C.m` => `ergo_m_M_C_m`.
pub fn method_symbol(cask: &str, class: &str, name: &str) -> String {
    format!("ergo_m_{}_{}_{}", mangle_cask(cask), class, name)
}

/// Class struct `M.C` => `ErgoObj_M_C`.
pub fn class_struct_name(qname: &str) -> String {
    match qname.split_once('.') {
        Some((cask, class)) => format!("ErgoObj_{}_{}", mangle_cask(cask), class),
        None => format!("ErgoObj_{}", qname),
    }
}

/// Drop function for class `M.C` => `ergo_drop_M_C`.
pub fn drop_symbol(qname: &str) -> String {
    match qname.split_once('.') {
        Some((cask, class)) => format!("ergo_drop_{}_{}", mangle_cask(cask), class),
        None => format!("ergo_drop_{}", qname),
    }
}

/// Field `x` => `f_x`.
pub fn field_name(name: &str) -> String {
    format!("f_{}", name)
}

/// Trampoline wrapper for a function captured as a value.
pub fn funval_wrapper(cask: &str, name: &str) -> String {
    format!("__fnwrap_{}_{}", mangle_cask(cask), name)
}

/// Escape a source string for a C string literal.
pub fn c_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mangle_scheme() {
        assert_eq!(fun_symbol("util", "dbl"), "ergo_util_dbl");
        assert_eq!(global_symbol("init", "count"), "ergo_g_init_count");
        assert_eq!(init_symbol("my-app"), "ergo_init_my_app");
        assert_eq!(method_symbol("a", "Box", "get"), "ergo_m_a_Box_get");
        assert_eq!(class_struct_name("a.Box"), "ErgoObj_a_Box");
        assert_eq!(drop_symbol("a.Box"), "ergo_drop_a_Box");
        assert_eq!(field_name("x"), "f_x");
    }

    #[test]
    fn test_c_escape() {
        assert_eq!(c_escape("hi \"x\"\n"), "hi \\\"x\\\"\\n");
        assert_eq!(c_escape("a\\b"), "a\\\\b");
    }
}

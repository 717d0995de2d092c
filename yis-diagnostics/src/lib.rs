// Diagnostic records and rendering for the Yis toolchain.
// Every pass reports failures as a `Diag`; this crate is the only place
// that writes them to stderr.

use std::fmt;
use std::io::IsTerminal;
use std::sync::OnceLock;

use colored::Colorize;
use thiserror::Error;

/// A single diagnostic: optional source path, 1-based position, message.
/// The first fatal `Diag` stops a compilation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct Diag {
    pub path: Option<String>,
    pub line: u32,
    pub col: u32,
    pub message: String,
}

impl fmt::Display for Diag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.header())
    }
}

impl Diag {
    pub fn new(path: impl Into<String>, line: u32, col: u32, message: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            line,
            col,
            message: message.into(),
        }
    }

    /// A diagnostic with no source location (driver-level failures,
    /// out-of-memory style conditions).
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            path: None,
            line: 0,
            col: 0,
            message: message.into(),
        }
    }

    fn header(&self) -> String {
        match (&self.path, self.line > 0 || self.col > 0) {
            (Some(p), true) => format!("{}:{}:{}: {}", p, self.line, self.col, self.message),
            (Some(p), false) => format!("{}: {}", p, self.message),
            (None, true) => format!("{}:{}: {}", self.line, self.col, self.message),
            (None, false) => self.message.clone(),
        }
    }
}

/// Severity of a rendered finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Error,
    Warning,
    Note,
}

impl Level {
    pub fn label(self) -> &'static str {
        match self {
            Level::Error => "error",
            Level::Warning => "warning",
            Level::Note => "note",
        }
    }

    fn painted(self) -> String {
        if !color_enabled() {
            return self.label().to_string();
        }
        match self {
            Level::Error => self.label().red().bold().to_string(),
            Level::Warning => self.label().yellow().bold().to_string(),
            Level::Note => self.label().blue().bold().to_string(),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Color is decided once per process: `NO_COLOR` wins, then stderr must
/// be a terminal, then `TERM` must be set and non-empty.
pub fn color_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| {
        if std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty()) {
            return false;
        }
        if !std::io::stderr().is_terminal() {
            return false;
        }
        std::env::var_os("TERM").is_some_and(|v| !v.is_empty())
    })
}

fn paint(s: &str, level: Level) -> String {
    if !color_enabled() {
        return s.to_string();
    }
    match level {
        Level::Error => s.red().bold().to_string(),
        Level::Warning => s.yellow().bold().to_string(),
        Level::Note => s.blue().bold().to_string(),
    }
}

fn dim(s: &str) -> String {
    if color_enabled() {
        s.bright_black().to_string()
    } else {
        s.to_string()
    }
}

/// How many columns of `~` underline at most, after the caret.
const UNDERLINE_CAP: usize = 8;

fn snippet_context(verbose: bool) -> u32 {
    if verbose {
        2
    } else {
        1
    }
}

/// Visual column of a 1-based source column, expanding tabs to the next
/// multiple of four.
fn visual_col(line: &str, col: u32) -> usize {
    let mut vis = 0usize;
    for (i, ch) in line.chars().enumerate() {
        if i + 1 >= col as usize {
            break;
        }
        if ch == '\t' {
            vis += 4 - (vis % 4);
        } else {
            vis += 1;
        }
    }
    vis
}

fn underline_len(line: &str, col: u32) -> usize {
    let start = (col as usize).saturating_sub(1);
    let token: usize = line
        .chars()
        .skip(start)
        .take_while(|c| !c.is_whitespace())
        .count();
    token.clamp(1, UNDERLINE_CAP)
}

fn render_snippet(out: &mut String, source: &str, line: u32, col: u32, context: u32) {
    let lines: Vec<&str> = source.lines().collect();
    if line == 0 || line as usize > lines.len() {
        return;
    }
    let first = line.saturating_sub(context).max(1);
    let last = (line + context).min(lines.len() as u32);
    for n in first..=last {
        let Some(text) = lines.get(n as usize - 1) else {
            continue;
        };
        let gutter = format!("{:>4} | ", n);
        if n == line {
            out.push_str(&paint(&gutter, Level::Note));
        } else {
            out.push_str(&dim(&gutter));
        }
        out.push_str(text);
        out.push('\n');
        if n == line && col > 0 {
            out.push_str(&dim("     | "));
            out.push_str(&" ".repeat(visual_col(text, col)));
            let ul = underline_len(text, col);
            out.push_str(&paint("^", Level::Error));
            if ul > 1 {
                out.push_str(&paint(&"~".repeat(ul - 1), Level::Error));
            }
            out.push('\n');
        }
    }
}

/// Render one framed diagnostic: header, location arrow, source snippet
/// with caret, and a context hint when one matches the message.
pub fn render(diag: &Diag, level: Level, source: Option<&str>, verbose: bool) -> String {
    let mut out = String::new();
    out.push_str(&level.painted());
    out.push_str(": ");
    out.push_str(&diag.message);
    out.push('\n');

    if let Some(path) = &diag.path {
        out.push_str(&dim("  --> "));
        if diag.line > 0 || diag.col > 0 {
            out.push_str(&format!("{}:{}:{}\n", path, diag.line, diag.col));
        } else {
            out.push_str(path);
            out.push('\n');
        }
    }

    if let (Some(src), true) = (source, diag.line > 0) {
        out.push('\n');
        render_snippet(&mut out, src, diag.line, diag.col, snippet_context(verbose));
        out.push('\n');
    }

    if let Some(tip) = hint_for(&diag.message) {
        out.push_str(&paint("help: ", Level::Warning));
        out.push_str(tip);
        out.push('\n');
    }
    out
}

/// Print an error frame to stderr, loading the snippet from disk when
/// the diagnostic names a readable path.
pub fn print_error(diag: &Diag, verbose: bool) {
    let source = diag
        .path
        .as_deref()
        .and_then(|p| std::fs::read_to_string(p).ok());
    eprint!("{}", render(diag, Level::Error, source.as_deref(), verbose));
}

pub fn print_warning(diag: &Diag, verbose: bool) {
    let source = diag
        .path
        .as_deref()
        .and_then(|p| std::fs::read_to_string(p).ok());
    eprint!("{}", render(diag, Level::Warning, source.as_deref(), verbose));
}

pub fn print_note(message: &str) {
    eprintln!("{}{}", paint("note: ", Level::Note), message);
}

/// One-line lint finding with a `file:line:col-line:col` span, the form
/// the lint pass tallies. Columns are clamped to 1.
pub fn span_line(level: Level, path: &str, line: u32, col: u32, message: &str) -> String {
    let line = line.max(1);
    let col = col.max(1);
    format!(
        "{}: {}:{}:{}-{}:{}: {}",
        level.painted(),
        path,
        line,
        col,
        line,
        col + 1,
        message
    )
}

/// Print a lint finding (and its hint, if any) to stderr.
pub fn print_span_finding(
    level: Level,
    path: &str,
    line: u32,
    col: u32,
    message: &str,
    hint: Option<&str>,
) {
    eprintln!("{}", span_line(level, path, line, col, message));
    if let Some(h) = hint {
        eprintln!("  hint: {}", h);
    }
}

/// Context-sensitive hint derived by keyword matching on the message.
/// Returns `None` when nothing applies.
pub fn hint_for(msg: &str) -> Option<&'static str> {
    let table: &[(&[&str], &str)] = &[
        (
            &["unknown type", "use num"],
            "Yis uses 'num' for all numeric types instead of 'int' or 'float'.",
        ),
        (
            &["unknown type"],
            "This type name is not recognized. Check for typos or missing imports.",
        ),
        (
            &["type mismatch"],
            "The types on both sides of this operation don't match. Check your variable types.",
        ),
        (
            &["unknown name"],
            "This identifier is not defined. Check for typos or missing variable declarations.",
        ),
        (
            &["unknown function"],
            "This function is not defined. Check for typos or missing imports.",
        ),
        (
            &["cannot assign to const"],
            "Constants cannot be modified after declaration. Use 'let ?name = ...' for mutable variables.",
        ),
        (
            &["cannot assign to immutable"],
            "This variable was declared without '?' so it's immutable. Use 'let ?name = ...' for mutability.",
        ),
        (
            &["call on nullable value"],
            "This value might be null. Use 'if x != null { ... }' to check before calling methods.",
        ),
        (
            &["member access on nullable value"],
            "This value might be null. Use 'if x != null { ... }' to check before accessing members.",
        ),
        (
            &["indexing nullable value"],
            "This value might be null. Use 'if x != null { ... }' to check before indexing.",
        ),
        (
            &["comparison on nullable value"],
            "Cannot compare nullable values. Check for null first.",
        ),
        (
            &["operator on nullable value"],
            "Cannot perform arithmetic on nullable values. Check for null first.",
        ),
        (
            &["tuple arity mismatch"],
            "Tuples must have the same number of elements on both sides.",
        ),
        (
            &["fn arity mismatch"],
            "Function call has wrong number of arguments. Check the function signature.",
        ),
        (
            &["expects", "args"],
            "The number of arguments doesn't match the function definition.",
        ),
        (
            &["used before definition"],
            "Global variables must be defined before they are used. Move the definition earlier.",
        ),
        (
            &["duplicate"],
            "This name is already defined. Use a different name or remove the duplicate.",
        ),
        (
            &["must be called"],
            "Functions and methods must be called with parentheses, e.g., obj.method() not obj.method.",
        ),
        (
            &["lock class"],
            "Fields of 'lock' classes can only be accessed within the same file or class methods.",
        ),
        (
            &["requires mutable receiver"],
            "This method modifies the object, so the receiver must be mutable: declare it with '?'.",
        ),
        (
            &["requires mutable binding"],
            "The array variable must be declared as mutable: 'let ?arr = ...'.",
        ),
        (
            &["mutate through immutable"],
            "To modify this value, the base variable must be declared with '?': 'let ?x = ...'.",
        ),
        (
            &["shadows cask"],
            "This local variable has the same name as a cask. Rename the variable to avoid confusion.",
        ),
        (
            &["missing entry"],
            "Your main file needs an entry() function: 'entry() { ... }'.",
        ),
        (
            &["cask declaration"],
            "A cask declaration must match the file name, except in the entry module.",
        ),
        (
            &["cannot take this"],
            "Only class methods can have 'this' as a parameter. Remove 'this' from this function.",
        ),
        (
            &["must begin with this"],
            "Class methods must have 'this' or '?this' as their first parameter.",
        ),
        (
            &["only first param may be this"],
            "'this' can only be used as the first parameter of a method.",
        ),
        (
            &["lambda params cannot be this"],
            "Lambda functions cannot have 'this' as a parameter.",
        ),
        (
            &["empty array"],
            "Empty arrays need a type annotation. Use 'let arr: [num] = []' or add elements.",
        ),
        (
            &["foreach expects array or string"],
            "for (x in y) requires 'y' to be an array or string. Check the type of your iterable.",
        ),
        (
            &["match requires at least one arm"],
            "Add at least one pattern arm to your match expression: 'pattern => expression'.",
        ),
        (
            &["if expression requires else"],
            "An if used as a value must cover every case; add a final else arm.",
        ),
        (
            &["condition cannot be void"],
            "The condition here must produce a value, not void.",
        ),
        (
            &["return value in void function"],
            "This function doesn't return a value, but you're trying to return something.",
        ),
        (
            &["missing return value"],
            "This function expects a return value. Add an expression after 'return'.",
        ),
        (
            &["missing return coverage"],
            "Add explicit return statements for every path.",
        ),
        (
            &["const expression must be a literal"],
            "Constants can only be simple literals or basic numeric expressions.",
        ),
        (
            &["const string cannot interpolate"],
            "String constants cannot contain $variable interpolation.",
        ),
        (
            &["tuple index out of range"],
            "The index is too large or negative for this tuple's size.",
        ),
        (
            &["tuple index must be integer literal"],
            "Use a literal number index on tuples, not a variable.",
        ),
        (
            &["indexing requires array or string"],
            "You can only use [index] on arrays and strings.",
        ),
        (
            &["member access on non-object"],
            "The '.' operator can only be used on class instances or casks.",
        ),
        (
            &["unknown member"],
            "This field or method doesn't exist on the class. Check for typos.",
        ),
        (
            &["unknown cask member"],
            "This name doesn't exist in the cask. Check for typos or missing exports.",
        ),
        (
            &["unknown class"],
            "This class is not defined. Check for typos or missing imports.",
        ),
        (
            &["has no init method"],
            "This class doesn't have an 'init' method, so use 'new ClassName()' without arguments.",
        ),
        (
            &["init' must return void"],
            "The 'init' method should not return a value (it implicitly returns the new instance).",
        ),
        (
            &["unsupported call form"],
            "This expression cannot be called as a function. Check that you're calling a function value.",
        ),
        (
            &["move(...)"],
            "move() transfers ownership out of a named variable, so its argument must be an identifier.",
        ),
        (
            &["moved value"],
            "This variable was emptied by move(); assign it a new value before reading it again.",
        ),
        (
            &["out of memory"],
            "The compiler ran out of memory. Try simplifying your code.",
        ),
    ];
    for (keys, tip) in table {
        if keys.iter().all(|k| msg.contains(k)) {
            return Some(tip);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_shapes() {
        let d = Diag::new("a.yi", 3, 7, "type mismatch: arg");
        assert_eq!(d.to_string(), "a.yi:3:7: type mismatch: arg");
        let d = Diag::message("missing entry()");
        assert_eq!(d.to_string(), "missing entry()");
    }

    #[test]
    fn test_render_frame_contains_location_and_hint() {
        let d = Diag::new("a.yi", 2, 5, "unknown name 'foo'");
        let src = "entry() {\n    foo;\n}\n";
        let frame = render(&d, Level::Error, Some(src), false);
        assert!(frame.contains("a.yi:2:5"));
        assert!(frame.contains("foo;"));
        assert!(frame.contains("^"));
        assert!(frame.contains("This identifier is not defined"));
    }

    #[test]
    fn test_snippet_context_width() {
        let d = Diag::new("a.yi", 3, 1, "x");
        let src = "l1\nl2\nl3\nl4\nl5\n";
        let narrow = render(&d, Level::Error, Some(src), false);
        assert!(narrow.contains("l2") && narrow.contains("l4"));
        assert!(!narrow.contains("l1"));
        let wide = render(&d, Level::Error, Some(src), true);
        assert!(wide.contains("l1") && wide.contains("l5"));
    }

    #[test]
    fn test_underline_cap() {
        let line = "averyveryverylongtoken";
        assert_eq!(underline_len(line, 1), UNDERLINE_CAP);
        assert_eq!(underline_len("ab cd", 1), 2);
        assert_eq!(underline_len("   ", 1), 1);
    }

    #[test]
    fn test_visual_col_expands_tabs() {
        assert_eq!(visual_col("\tx", 2), 4);
        assert_eq!(visual_col("ab\tx", 4), 4);
        assert_eq!(visual_col("abc", 2), 1);
    }

    #[test]
    fn test_span_line_format() {
        let s = span_line(Level::Warning, "a.yi", 4, 2, "implicit truthiness");
        assert!(s.contains("a.yi:4:2-4:3"));
        assert!(s.contains("implicit truthiness"));
    }

    #[test]
    fn test_hint_lookup_precedence() {
        let hint = hint_for("unknown type 'int' (use num)").unwrap();
        assert!(hint.contains("'num'"));
        assert!(hint_for("completely novel message").is_none());
    }
}

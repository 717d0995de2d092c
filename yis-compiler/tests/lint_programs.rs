// Control-flow lint pass: null flow through indexing, implicit
// truthiness, return coverage, and the warn/strict promotion.

mod common;

use common::*;
use yis_ast::{BinOp, PatternKind};
use yis_compiler::{lint_program, lower_program, LintMode, LintReport, TyArena};

fn lint(prog: &yis_ast::Program, mode: LintMode) -> LintReport {
    let lowered = lower_program(prog);
    let arena = TyArena::new();
    lint_program(&lowered, &arena, mode).expect("environment should build")
}

fn first_program() -> yis_ast::Program {
    program(vec![module(
        "init.yi",
        &[],
        vec![
            entry(vec![]),
            fun(
                "first",
                vec![param("xs", tref_arr("num"))],
                ret_spec(&["num"]),
                vec![ret(index(ident("xs"), int(0)))],
            ),
        ],
    )])
}

#[test]
fn test_unguarded_index_return_warns() {
    let report = lint(&first_program(), LintMode::Warn);
    assert!(report.ok());
    assert_eq!(report.warnings, 1);
    assert_eq!(report.errors, 0);
    let finding = &report.findings[0];
    assert!(finding
        .message
        .contains("indexing expression may yield null when used as a non-null return value"));
}

#[test]
fn test_strict_mode_promotes_to_error() {
    let report = lint(&first_program(), LintMode::Strict);
    assert!(!report.ok());
    assert_eq!(report.errors, 1);
    assert_eq!(report.warnings, 0);
}

#[test]
fn test_match_null_arm_guards_the_index() {
    let prog = program(vec![module(
        "init.yi",
        &[],
        vec![
            entry(vec![]),
            fun(
                "head",
                vec![param("xs", tref_arr("num"))],
                ret_spec(&["num"]),
                vec![ret(match_expr(
                    index(ident("xs"), int(0)),
                    vec![
                        (PatternKind::Null, int(0)),
                        (PatternKind::Ident("n".to_string()), ident("n")),
                    ],
                ))],
            ),
        ],
    )]);
    let report = lint(&prog, LintMode::Warn);
    assert_eq!(report.warnings, 0, "findings: {:?}", report.findings);
}

#[test]
fn test_coalesce_guards_the_index() {
    let prog = program(vec![module(
        "init.yi",
        &[],
        vec![
            entry(vec![]),
            fun(
                "first",
                vec![param("xs", tref_arr("num"))],
                ret_spec(&["num"]),
                vec![ret(bin(
                    BinOp::Coalesce,
                    index(ident("xs"), int(0)),
                    int(0),
                ))],
            ),
        ],
    )]);
    let report = lint(&prog, LintMode::Warn);
    assert_eq!(report.warnings, 0, "findings: {:?}", report.findings);
}

#[test]
fn test_implicit_truthiness_in_conditions() {
    let prog = program(vec![module(
        "init.yi",
        &[],
        vec![entry(vec![if_stmt(vec![(
            Some(int(1)),
            block(vec![]),
        )])])],
    )]);
    let report = lint(&prog, LintMode::Warn);
    assert_eq!(report.warnings, 1);
    assert!(report.findings[0]
        .message
        .contains("implicit truthiness in if condition (type num)"));

    let boolean_cond = program(vec![module(
        "init.yi",
        &[],
        vec![entry(vec![if_stmt(vec![(
            Some(boolean(true)),
            block(vec![]),
        )])])],
    )]);
    assert_eq!(lint(&boolean_cond, LintMode::Warn).warnings, 0);
}

#[test]
fn test_missing_return_coverage_names_fallthrough() {
    let prog = program(vec![module(
        "init.yi",
        &[],
        vec![
            entry(vec![]),
            fun(
                "f",
                vec![param("c", tref("bool"))],
                ret_spec(&["num"]),
                vec![if_stmt(vec![(
                    Some(ident("c")),
                    block(vec![ret(int(1))]),
                )])],
            ),
        ],
    )]);
    let report = lint(&prog, LintMode::Warn);
    assert_eq!(report.warnings, 1);
    let msg = &report.findings[0].message;
    assert!(msg.contains("missing return coverage in function 'f'"));
    assert!(msg.contains("fall through"));
}

#[test]
fn test_empty_body_stub_is_exempt_from_coverage() {
    let prog = program(vec![module(
        "init.yi",
        &[],
        vec![
            entry(vec![]),
            fun("ext", vec![], ret_spec(&["num"]), vec![]),
        ],
    )]);
    let report = lint(&prog, LintMode::Warn);
    assert_eq!(report.warnings, 0);
}

#[test]
fn test_non_null_call_argument_flow() {
    let prog = program(vec![module(
        "init.yi",
        &[],
        vec![
            entry(vec![
                let_("xs", array(vec![int(1)])),
                expr_stmt(callf("take", vec![index(ident("xs"), int(0))])),
            ]),
            fun(
                "take",
                vec![param("n", tref("num"))],
                yis_ast::RetSpec::void(),
                vec![],
            ),
        ],
    )]);
    let report = lint(&prog, LintMode::Warn);
    assert_eq!(report.warnings, 1);
    assert!(report.findings[0]
        .message
        .contains("a non-null call argument"));
}

#[test]
fn test_lint_keeps_collecting_findings() {
    // one truthiness finding and one index-flow finding in one pass
    let prog = program(vec![module(
        "init.yi",
        &[],
        vec![
            entry(vec![if_stmt(vec![(Some(int(1)), block(vec![]))])]),
            fun(
                "first",
                vec![param("xs", tref_arr("num"))],
                ret_spec(&["num"]),
                vec![ret(index(ident("xs"), int(0)))],
            ),
        ],
    )]);
    let report = lint(&prog, LintMode::Warn);
    assert_eq!(report.warnings, 2);
}

// Whole-program type checking: environment construction, name
// resolution across casks, nullability, mutability, visibility, moves,
// and return coverage.

mod common;

use common::*;
use yis_ast::{AssignOp, BinOp, PatternKind, Visibility};
use yis_compiler::{lower_program, typecheck_program, TyArena};

fn check(prog: &yis_ast::Program) -> Result<(), yis_compiler::Diag> {
    let lowered = lower_program(prog);
    let arena = TyArena::new();
    typecheck_program(&lowered, &arena)
}

fn check_err(prog: &yis_ast::Program, needle: &str) {
    let err = check(prog).expect_err("expected a type error");
    assert!(
        err.message.contains(needle),
        "expected error containing '{}', got '{}'",
        needle,
        err.message
    );
}

#[test]
fn test_hello_program_typechecks() {
    let prog = program(vec![
        module(
            "init.yi",
            &["stdr"],
            vec![entry(vec![expr_stmt(callf(
                "writef",
                vec![strlit("hi {}\n"), bin(BinOp::Add, int(1), int(2))],
            ))])],
        ),
        stdr_module(),
    ]);
    check(&prog).unwrap();
}

#[test]
fn test_cross_cask_call() {
    let prog = program(vec![
        module(
            "init.yi",
            &["stdr", "util"],
            vec![entry(vec![expr_stmt(callf(
                "writef",
                vec![strlit("{}\n"), qcall("util", "dbl", vec![int(21)])],
            ))])],
        ),
        stdr_module(),
        module(
            "util.yi",
            &[],
            vec![fun(
                "dbl",
                vec![param("x", tref("num"))],
                ret_spec(&["num"]),
                vec![ret(bin(BinOp::Mul, ident("x"), int(2)))],
            )],
        ),
    ]);
    check(&prog).unwrap();
}

#[test]
fn test_import_suffix_normalized() {
    // `bring util.yi;` resolves the cask named util
    let prog = program(vec![
        module(
            "init.yi",
            &["util.yi"],
            vec![entry(vec![expr_stmt(qcall("util", "noop", vec![]))])],
        ),
        module(
            "util.yi",
            &[],
            vec![fun("noop", vec![], yis_ast::RetSpec::void(), vec![])],
        ),
    ]);
    check(&prog).unwrap();
}

#[test]
fn test_cask_declaration_must_match_filename() {
    let mut m = module("b.yi", &[], vec![]);
    m.declared_name = Some("c".to_string());
    let prog = program(vec![module("init.yi", &[], vec![entry(vec![])]), m]);
    check_err(&prog, "must match file name");
}

#[test]
fn test_entry_module_may_declare_project_name() {
    let mut m = module("main.yi", &[], vec![entry(vec![])]);
    m.declared_name = Some("quilter".to_string());
    let prog = program(vec![m]);
    check(&prog).unwrap();
}

#[test]
fn test_missing_entry_is_fatal() {
    let prog = program(vec![module("init.yi", &[], vec![])]);
    check_err(&prog, "missing entry()");
}

#[test]
fn test_entry_only_in_entry_module() {
    let prog = program(vec![
        module("init.yi", &[], vec![entry(vec![])]),
        module("other.yi", &[], vec![entry(vec![])]),
    ]);
    check_err(&prog, "only allowed in the entry module");
}

#[test]
fn test_duplicate_names_rejected() {
    let dup_fun = program(vec![module(
        "init.yi",
        &[],
        vec![
            entry(vec![]),
            fun("f", vec![], yis_ast::RetSpec::void(), vec![]),
            fun("f", vec![], yis_ast::RetSpec::void(), vec![]),
        ],
    )]);
    check_err(&dup_fun, "duplicate function 'f'");

    let dup_global = program(vec![module(
        "init.yi",
        &[],
        vec![entry(vec![]), def("g", false, int(1)), def("g", false, int(2))],
    )]);
    check_err(&dup_global, "duplicate global 'g'");

    let dup_class = program(vec![module(
        "init.yi",
        &[],
        vec![
            entry(vec![]),
            class("Box", Visibility::Default, vec![("x", tref("num"))], vec![]),
            class("Box", Visibility::Default, vec![], vec![]),
        ],
    )]);
    check_err(&dup_class, "duplicate class 'Box'");
}

#[test]
fn test_empty_array_needs_annotation() {
    let bad = program(vec![module(
        "init.yi",
        &[],
        vec![entry(vec![let_("xs", array(vec![]))])],
    )]);
    check_err(&bad, "cannot infer type of empty array");

    let good = program(vec![module(
        "init.yi",
        &[],
        vec![entry(vec![
            let_("xs", array_annot(vec![], tref_arr("num"))),
            foreach("x", ident("xs"), block(vec![])),
        ])],
    )]);
    check(&good).unwrap();
}

#[test]
fn test_tuple_index_must_be_literal_in_bounds() {
    let oob = program(vec![module(
        "init.yi",
        &[],
        vec![entry(vec![
            let_("t", tuple(vec![int(1), boolean(true)])),
            let_("x", index(ident("t"), int(2))),
        ])],
    )]);
    check_err(&oob, "tuple index out of range");

    let non_literal = program(vec![module(
        "init.yi",
        &[],
        vec![entry(vec![
            let_("t", tuple(vec![int(1), boolean(true)])),
            let_("i", int(0)),
            let_("x", index(ident("t"), ident("i"))),
        ])],
    )]);
    check_err(&non_literal, "tuple index must be integer literal");
}

#[test]
fn test_match_needs_arms_and_if_expr_needs_else() {
    let no_arms = program(vec![module(
        "init.yi",
        &[],
        vec![entry(vec![let_("x", match_expr(int(1), vec![]))])],
    )]);
    check_err(&no_arms, "match requires at least one arm");

    let if_expr_no_else = program(vec![module(
        "init.yi",
        &[],
        vec![entry(vec![let_(
            "x",
            common::e(yis_ast::ExprKind::IfExpr {
                arms: vec![yis_ast::IfExprArm {
                    cond: Some(boolean(true)),
                    value: int(1),
                }],
            }),
        )])],
    )]);
    check_err(&if_expr_no_else, "if expression requires else");

    // if-statement without else is fine
    let if_without_else = program(vec![module(
        "init.yi",
        &[],
        vec![entry(vec![if_stmt(vec![(
            Some(boolean(true)),
            block(vec![]),
        )])])],
    )]);
    check(&if_without_else).unwrap();
}

#[test]
fn test_foreach_requires_iterable() {
    let bad = program(vec![module(
        "init.yi",
        &[],
        vec![entry(vec![foreach("x", int(5), block(vec![]))])],
    )]);
    check_err(&bad, "foreach expects array or string");
}

#[test]
fn test_mutable_param_needs_mutable_argument() {
    let inc = fun(
        "inc",
        vec![param_mut("xs", tref_arr("num"))],
        yis_ast::RetSpec::void(),
        vec![expr_stmt(call(member(ident("xs"), "add"), vec![int(1)]))],
    );
    let bad = program(vec![module(
        "init.yi",
        &[],
        vec![
            entry(vec![
                let_("a", array(vec![int(1), int(2)])),
                expr_stmt(callf("inc", vec![ident("a")])),
            ]),
            inc.clone(),
        ],
    )]);
    check_err(&bad, "requires mutable binding");

    let good = program(vec![module(
        "init.yi",
        &[],
        vec![
            entry(vec![
                let_mut("a", array(vec![int(1), int(2)])),
                expr_stmt(callf("inc", vec![ident("a")])),
            ]),
            inc,
        ],
    )]);
    check(&good).unwrap();
}

#[test]
fn test_array_add_requires_mutable_binding() {
    let bad = program(vec![module(
        "init.yi",
        &[],
        vec![entry(vec![
            let_("xs", array(vec![int(1)])),
            expr_stmt(call(member(ident("xs"), "add"), vec![int(2)])),
        ])],
    )]);
    check_err(&bad, "array.add requires mutable binding");
}

#[test]
fn test_lock_class_fields_are_file_private() {
    let box_class = class(
        "Box",
        Visibility::Lock,
        vec![("x", tref("num"))],
        vec![method(
            "get",
            vec![this_param()],
            ret_spec(&["num"]),
            vec![ret(member(ident("this"), "x"))],
        )],
    );
    let field_access = program(vec![
        module(
            "init.yi",
            &["a"],
            vec![entry(vec![
                let_("b", new_class("a.Box", vec![])),
                let_("v", member(ident("b"), "x")),
            ])],
        ),
        module("a.yi", &[], vec![box_class.clone()]),
    ]);
    check_err(&field_access, "lock class");

    // methods of the class itself still reach the field
    let via_method = program(vec![
        module(
            "init.yi",
            &["a"],
            vec![entry(vec![
                let_("b", new_class("a.Box", vec![])),
                let_("v", call(member(ident("b"), "get"), vec![])),
            ])],
        ),
        module("a.yi", &[], vec![box_class]),
    ]);
    check(&via_method).unwrap();
}

#[test]
fn test_nullable_flows() {
    // null in arithmetic is rejected
    let bad = program(vec![module(
        "init.yi",
        &[],
        vec![entry(vec![
            let_("n", null()),
            let_("x", bin(BinOp::Add, ident("n"), int(1))),
        ])],
    )]);
    check_err(&bad, "expects numeric");

    // ?? strips nullability; match with a null arm accepts
    let good = program(vec![module(
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
    check(&good).unwrap();
}

#[test]
fn test_return_coverage_enforced() {
    let missing = program(vec![module(
        "init.yi",
        &[],
        vec![
            entry(vec![]),
            fun(
                "f",
                vec![param("c", tref("bool"))],
                ret_spec(&["num"]),
                vec![if_stmt(vec![(Some(ident("c")), block(vec![ret(int(1))]))])],
            ),
        ],
    )]);
    check_err(&missing, "missing return coverage in function 'f'");

    let covered = program(vec![module(
        "init.yi",
        &[],
        vec![
            entry(vec![]),
            fun(
                "f",
                vec![param("c", tref("bool"))],
                ret_spec(&["num"]),
                vec![if_stmt(vec![
                    (Some(ident("c")), block(vec![ret(int(1))])),
                    (None, block(vec![ret(int(2))])),
                ])],
            ),
        ],
    )]);
    check(&covered).unwrap();
}

#[test]
fn test_move_once_semantics() {
    let use_after_move = program(vec![module(
        "init.yi",
        &[],
        vec![entry(vec![
            let_("a", array(vec![int(1)])),
            let_("b", callf("move", vec![ident("a")])),
            let_("c", ident("a")),
        ])],
    )]);
    check_err(&use_after_move, "use of moved value 'a'");

    let non_ident = program(vec![module(
        "init.yi",
        &[],
        vec![entry(vec![let_(
            "b",
            callf("move", vec![array(vec![int(1)])]),
        )])],
    )]);
    check_err(&non_ident, "must be an identifier");

    // reassignment revives the slot
    let revived = program(vec![module(
        "init.yi",
        &[],
        vec![entry(vec![
            let_mut("a", array(vec![int(1)])),
            let_("b", callf("move", vec![ident("a")])),
            expr_stmt(assign(ident("a"), array(vec![int(2)]))),
            let_("c", ident("a")),
        ])],
    )]);
    check(&revived).unwrap();
}

#[test]
fn test_legacy_numeric_type_names_rejected() {
    let prog = program(vec![module(
        "init.yi",
        &[],
        vec![
            entry(vec![]),
            fun(
                "f",
                vec![param("x", tref("int"))],
                yis_ast::RetSpec::void(),
                vec![],
            ),
        ],
    )]);
    check_err(&prog, "unknown type 'int' (use num)");
}

#[test]
fn test_lambda_generics_unify_per_call() {
    let prog = program(vec![module(
        "init.yi",
        &[],
        vec![entry(vec![
            let_("f", lambda(vec![param_untyped("x")], ident("x"))),
            let_("n", callf("f", vec![int(1)])),
            let_("m", bin(BinOp::Add, ident("n"), int(1))),
        ])],
    )]);
    check(&prog).unwrap();
}

#[test]
fn test_global_used_before_definition() {
    let prog = program(vec![module(
        "init.yi",
        &[],
        vec![
            entry(vec![]),
            def("a", false, bin(BinOp::Add, ident("b"), int(1))),
            def("b", false, int(2)),
        ],
    )]);
    check_err(&prog, "used before definition");
}

#[test]
fn test_compound_assign_is_numeric_only() {
    let prog = program(vec![module(
        "init.yi",
        &[],
        vec![entry(vec![
            let_mut("s", strlit("x")),
            expr_stmt(compound(AssignOp::AddAssign, ident("s"), strlit("y"))),
        ])],
    )]);
    check_err(&prog, "expects numeric");
}

#[test]
fn test_local_shadowing_a_cask_is_diagnosed() {
    let prog = program(vec![
        module(
            "init.yi",
            &["util"],
            vec![entry(vec![
                let_("util", int(1)),
                expr_stmt(qcall("util", "dbl", vec![int(2)])),
            ])],
        ),
        module(
            "util.yi",
            &[],
            vec![fun(
                "dbl",
                vec![param("x", tref("num"))],
                ret_spec(&["num"]),
                vec![ret(bin(BinOp::Mul, ident("x"), int(2)))],
            )],
        ),
    ]);
    check_err(&prog, "shadows cask 'util'");
}

#[test]
fn test_cask_constants_resolve_through_member() {
    let prog = program(vec![
        module(
            "init.yi",
            &["util"],
            vec![entry(vec![let_(
                "x",
                bin(BinOp::Add, member(ident("util"), "ANSWER"), int(0)),
            )])],
        ),
        module(
            "util.yi",
            &[],
            vec![konst("ANSWER", bin(BinOp::Mul, int(6), int(7)))],
        ),
    ]);
    check(&prog).unwrap();
}

#[test]
fn test_method_requires_mutable_receiver() {
    let counter = class(
        "Counter",
        Visibility::Default,
        vec![("n", tref("num"))],
        vec![method(
            "bump",
            vec![this_param_mut()],
            yis_ast::RetSpec::void(),
            vec![expr_stmt(compound(
                AssignOp::AddAssign,
                member(ident("this"), "n"),
                int(1),
            ))],
        )],
    );
    let bad = program(vec![module(
        "init.yi",
        &[],
        vec![
            entry(vec![
                let_("c", new_class("Counter", vec![])),
                expr_stmt(call(member(ident("c"), "bump"), vec![])),
            ]),
            counter.clone(),
        ],
    )]);
    check_err(&bad, "requires mutable receiver");

    let good = program(vec![module(
        "init.yi",
        &[],
        vec![
            entry(vec![
                let_mut("c", new_class("Counter", vec![])),
                expr_stmt(call(member(ident("c"), "bump"), vec![])),
            ]),
            counter,
        ],
    )]);
    check(&good).unwrap();
}

#[test]
fn test_struct_kind_positional_construction() {
    let prog = program(vec![module(
        "init.yi",
        &[],
        vec![
            entry(vec![
                let_("p", new_class("Point", vec![int(1), int(2)])),
                let_("x", member(ident("p"), "x")),
            ]),
            struct_class("Point", vec![("x", tref("num")), ("y", tref("num"))]),
        ],
    )]);
    check(&prog).unwrap();

    let class_kind_needs_init = program(vec![module(
        "init.yi",
        &[],
        vec![
            entry(vec![let_("p", new_class("Plain", vec![int(1)]))]),
            class("Plain", Visibility::Default, vec![("x", tref("num"))], vec![]),
        ],
    )]);
    check_err(&class_kind_needs_init, "has no init method");
}

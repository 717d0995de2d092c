// C emission: mangling, module init order, class layout and drop
// functions, the retain/release discipline on exit paths, wrappers,
// lambdas, match, and the intrinsic bridge.

mod common;

use common::*;
use yis_ast::{BinOp, PatternKind, Visibility};
use yis_compiler::compile_to_c;

fn emit(prog: &yis_ast::Program) -> String {
    let _ = env_logger::builder().is_test(true).try_init();
    compile_to_c(prog).expect("program should compile")
}

#[test]
fn test_hello_translation_unit() {
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
    let c = emit(&prog);
    // runtime prelude is bundled verbatim
    assert!(c.contains("Yis runtime prelude"));
    assert!(c.contains("static void ergo_entry(void)"));
    assert!(c.contains("int main(void)"));
    assert!(c.contains("ergo_runtime_init();"));
    // the literal and the addition
    assert!(c.contains("stdr_str_lit(\"hi {}\\n\")"));
    assert!(c.contains("ergo_add("));
    // writef is a real stdr function lowered to the runtime call
    assert!(c.contains("static void ergo_stdr_writef(ErgoVal a0, ErgoVal a1)"));
    assert!(c.contains("stdr_writef_args("));
}

#[test]
fn test_cross_cask_call_mangling() {
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
    let c = emit(&prog);
    assert!(c.contains("static ErgoVal ergo_util_dbl(ErgoVal a0)"));
    assert!(c.contains("ergo_util_dbl(__t"));
}

#[test]
fn test_module_initializers_run_in_program_order() {
    let prog = program(vec![
        module(
            "init.yi",
            &["util"],
            vec![entry(vec![]), def("a", false, int(1))],
        ),
        module("util.yi", &[], vec![def("b", true, int(2))]),
    ]);
    let c = emit(&prog);
    assert!(c.contains("static ErgoVal ergo_g_init_a = EV_NULLV;"));
    assert!(c.contains("static ErgoVal ergo_g_util_b = EV_NULLV;"));
    assert!(c.contains("static void ergo_init_init(void)"));
    assert!(c.contains("static void ergo_init_util(void)"));
    let entry_body = c
        .find("static void ergo_entry(void)")
        .expect("entry emitted");
    let first = c[entry_body..].find("ergo_init_init();").expect("init call");
    let second = c[entry_body..].find("ergo_init_util();").expect("util call");
    assert!(first < second, "module initializers out of order");
}

#[test]
fn test_class_struct_layout_and_drop() {
    let prog = program(vec![module(
        "init.yi",
        &[],
        vec![
            entry(vec![let_("b", new_class("Box", vec![]))]),
            class(
                "Box",
                Visibility::Default,
                vec![("x", tref("num")), ("label", tref("string"))],
                vec![method(
                    "get",
                    vec![this_param()],
                    ret_spec(&["num"]),
                    vec![ret(member(ident("this"), "x"))],
                )],
            ),
        ],
    )]);
    let c = emit(&prog);
    assert!(c.contains("typedef struct ErgoObj_init_Box {"));
    assert!(c.contains("ErgoVal f_x;"));
    assert!(c.contains("ErgoVal f_label;"));
    assert!(c.contains("static void ergo_drop_init_Box(ErgoObj* o)"));
    assert!(c.contains("ergo_release_val(self->f_x);"));
    assert!(c.contains("ergo_release_val(self->f_label);"));
    // method symbol and allocation against the drop function
    assert!(c.contains("static ErgoVal ergo_m_init_Box_get(ErgoVal self)"));
    assert!(c.contains("ergo_obj_new(sizeof(ErgoObj_init_Box), ergo_drop_init_Box)"));
}

#[test]
fn test_wrapper_emitted_only_for_captured_functions() {
    let direct_only = program(vec![module(
        "init.yi",
        &[],
        vec![
            entry(vec![expr_stmt(callf("dbl", vec![int(2)]))]),
            fun(
                "dbl",
                vec![param("x", tref("num"))],
                ret_spec(&["num"]),
                vec![ret(bin(BinOp::Mul, ident("x"), int(2)))],
            ),
        ],
    )]);
    let c = emit(&direct_only);
    assert!(!c.contains("__fnwrap_"), "no wrapper for direct calls");

    let captured = program(vec![module(
        "init.yi",
        &[],
        vec![
            entry(vec![
                let_("f", ident("dbl")),
                expr_stmt(callf("f", vec![int(2)])),
            ]),
            fun(
                "dbl",
                vec![param("x", tref("num"))],
                ret_spec(&["num"]),
                vec![ret(bin(BinOp::Mul, ident("x"), int(2)))],
            ),
        ],
    )]);
    let c = emit(&captured);
    assert!(c.contains("static ErgoVal __fnwrap_init_dbl(void* env, int argc, ErgoVal* argv)"));
    assert!(c.contains("ergo_fn_new(__fnwrap_init_dbl, 1)"));
    assert!(c.contains("ergo_call("));
}

#[test]
fn test_let_slot_released_at_scope_exit() {
    let prog = program(vec![module(
        "init.yi",
        &[],
        vec![entry(vec![let_("a", array(vec![int(1)]))])],
    )]);
    let c = emit(&prog);
    assert!(c.contains("ErgoVal a__1 = EV_NULLV;"));
    assert!(c.contains("ergo_move_into(&a__1, "));
    assert!(c.contains("ergo_release_val(a__1);"));
}

#[test]
fn test_early_return_releases_enclosing_scopes() {
    let prog = program(vec![module(
        "init.yi",
        &[],
        vec![
            entry(vec![]),
            fun(
                "f",
                vec![],
                ret_spec(&["num"]),
                vec![let_("a", array(vec![int(1)])), ret(int(1))],
            ),
        ],
    )]);
    let c = emit(&prog);
    // the slot is released on the early-return path and would be again
    // on the (unreachable) epilogue path; each static path balances
    assert_eq!(c.matches("ergo_release_val(a__1);").count(), 2);
    let fun_start = c.find("static ErgoVal ergo_init_f(void)").expect("f emitted");
    let release = c[fun_start..].find("ergo_release_val(a__1);").expect("release");
    let ret = c[fun_start..].find("return __ret;").expect("return");
    assert!(release < ret, "release must precede the return jump");
}

#[test]
fn test_break_releases_loop_body_scope() {
    let prog = program(vec![module(
        "init.yi",
        &[],
        vec![entry(vec![foreach(
            "x",
            array(vec![int(1), int(2)]),
            block(vec![
                let_("y", array(vec![ident("x")])),
                st(yis_ast::StmtKind::Break),
            ]),
        )])],
    )]);
    let c = emit(&prog);
    let brk = c.find("break;").expect("break emitted");
    let rel = c.find("ergo_release_val(y__").expect("y released");
    assert!(rel < brk, "loop-body locals release before break");
}

#[test]
fn test_match_lowering_compares_scrutinee_once() {
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
    let c = emit(&prog);
    assert!(c.contains("bool __matched"));
    assert!(c.contains("ergo_eq("));
    // the identifier arm binds a retained copy of the scrutinee
    assert!(c.contains("ergo_retain_val("));
}

#[test]
fn test_coalesce_short_circuits_on_null() {
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
    let c = emit(&prog);
    assert!(c.contains("ergo_is_null("));
}

#[test]
fn test_lambda_gets_own_function_and_arity_trap() {
    let prog = program(vec![module(
        "init.yi",
        &[],
        vec![entry(vec![
            let_("f", lambda(vec![param_untyped("x")], ident("x"))),
            expr_stmt(callf("f", vec![int(1)])),
        ])],
    )]);
    let c = emit(&prog);
    assert!(c.contains("static ErgoVal ergo_lambda_1(void* env, int argc, ErgoVal* argv)"));
    assert!(c.contains("ergo_trap(\"lambda arity mismatch\")"));
    assert!(c.contains("ergo_fn_new(ergo_lambda_1, 1)"));
}

#[test]
fn test_interpolated_string_builds_from_parts() {
    let prog = program(vec![module(
        "init.yi",
        &[],
        vec![entry(vec![
            let_("name", strlit("yis")),
            let_(
                "greeting",
                interp(vec![
                    yis_ast::StrPart::Text("hello ".to_string()),
                    yis_ast::StrPart::Interp("name".to_string()),
                ]),
            ),
        ])],
    )]);
    let c = emit(&prog);
    assert!(c.contains("stdr_str_from_parts(2, "));
    assert!(c.contains("stdr_str_lit(\"hello \")"));
}

#[test]
fn test_intrinsic_bridge_is_one_call_per_entry() {
    let prog = program(vec![
        module(
            "init.yi",
            &["cogito"],
            vec![entry(vec![let_("a", qcall("cogito", "app", vec![]))])],
        ),
        module(
            "cogito.yi",
            &[],
            vec![
                fun("__cogito_app", vec![], ret_spec(&["any"]), vec![]),
                fun(
                    "app",
                    vec![],
                    ret_spec(&["any"]),
                    vec![ret(callf("__cogito_app", vec![]))],
                ),
            ],
        ),
    ]);
    let c = emit(&prog);
    assert!(c.contains("extern ErgoVal cogito_app_new(void);"));
    assert!(c.contains("= cogito_app_new();"));
}

#[test]
fn test_global_def_moves_into_slot() {
    let prog = program(vec![module(
        "init.yi",
        &[],
        vec![entry(vec![]), def("count", true, int(0))],
    )]);
    let c = emit(&prog);
    assert!(c.contains("ergo_move_into(&ergo_g_init_count, "));
}

#[test]
fn test_named_constructor_sets_fields() {
    let mut new_expr = new_class("Point", vec![int(1), int(2)]);
    if let yis_ast::ExprKind::New { arg_names, .. } = &mut new_expr.kind {
        *arg_names = vec![Some("y".to_string()), Some("x".to_string())];
    }
    let prog = program(vec![module(
        "init.yi",
        &[],
        vec![
            entry(vec![let_("p", new_expr)]),
            struct_class("Point", vec![("x", tref("num")), ("y", tref("num"))]),
        ],
    )]);
    let c = emit(&prog);
    assert!(c.contains("->f_y, "));
    assert!(c.contains("->f_x, "));
}

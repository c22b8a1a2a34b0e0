//! Engine tests: programs are built through the [`ast`] API, compiled and
//! run against a fresh context.

mod classes;
mod coroutines;
mod modules;
mod objects;

use crate::ast::{
    self, BinaryOp, Binding, Catch, Declarator, Expression, FormalParameter, FunctionNode,
    Script, Statement, StatementKind,
};
use crate::{Context, JsNativeErrorKind, JsResult, JsValue};

/// Runs a script in a fresh context.
pub(crate) fn run(statements: Vec<Statement>) -> JsResult<JsValue> {
    let mut context = Context::new();
    context.eval_script(&Script::new(statements))
}

/// Runs a script and unwraps the completion value.
#[track_caller]
pub(crate) fn run_value(statements: Vec<Statement>) -> JsValue {
    run(statements).expect("script should not throw")
}

/// Asserts a script throws a native error of `kind`.
#[track_caller]
pub(crate) fn assert_native_error(statements: Vec<Statement>, kind: JsNativeErrorKind) {
    let mut context = Context::new();
    let err = context
        .eval_script(&Script::new(statements))
        .expect_err("script should throw");
    match err.as_native() {
        Some(native) => assert_eq!(native.kind, kind, "unexpected error: {native}"),
        None => {
            // A thrown error object still carries its kind.
            let value = err.to_opaque(&mut context);
            let kind_of = value
                .as_object()
                .and_then(|o| match &o.borrow().data.kind {
                    crate::object::ObjectKind::Error(k) => Some(*k),
                    _ => None,
                });
            assert_eq!(kind_of, Some(kind), "unexpected thrown value");
        }
    }
}

/// `function name(params...) { body }`
pub(crate) fn fn_decl(name: &str, params: &[&str], body: Vec<Statement>) -> Statement {
    StatementKind::Function(FunctionNode {
        name: Some(name.into()),
        parameters: params.iter().map(|p| FormalParameter::named(*p)).collect(),
        body,
        ..FunctionNode::default()
    })
    .into()
}

pub(crate) fn var(name: &str, init: Expression) -> Statement {
    StatementKind::Var(vec![Declarator::new(name, Some(init))]).into()
}

pub(crate) fn let_(name: &str, init: Expression) -> Statement {
    StatementKind::Let(vec![Declarator::new(name, Some(init))]).into()
}

pub(crate) fn ret(expression: Expression) -> Statement {
    StatementKind::Return(Some(expression)).into()
}

pub(crate) fn call_ident(name: &str, args: Vec<Expression>) -> Expression {
    Expression::call(
        Expression::ident(name),
        args.into_iter().map(Into::into).collect(),
    )
}

#[test]
fn integer_arithmetic() {
    assert_eq!(
        run_value(vec![
            Expression::binary(BinaryOp::Add, 40.into(), 2.into()).into()
        ]),
        JsValue::from(42)
    );
    assert_eq!(
        run_value(vec![Expression::binary(
            BinaryOp::Mul,
            Expression::binary(BinaryOp::Sub, 7.into(), 2.into()),
            3.into(),
        )
        .into()]),
        JsValue::from(15)
    );
}

#[test]
fn string_concatenation_and_templates() {
    assert_eq!(
        run_value(vec![
            Expression::binary(BinaryOp::Add, "foo".into(), "bar".into()).into()
        ]),
        JsValue::from("foobar")
    );
    assert_eq!(
        run_value(vec![Expression::Template(vec![
            ast::TemplatePart::Expr(1.into()),
            ast::TemplatePart::String("a".into()),
        ])
        .into()]),
        JsValue::from("1a")
    );
}

#[test]
fn function_call_returns_value() {
    // function f(x) { return x + 1 } f(41)
    let value = run_value(vec![
        fn_decl(
            "f",
            &["x"],
            vec![ret(Expression::binary(
                BinaryOp::Add,
                Expression::ident("x"),
                1.into(),
            ))],
        ),
        call_ident("f", vec![41.into()]).into(),
    ]);
    assert_eq!(value, JsValue::from(42));
}

#[test]
fn closures_capture_bindings() {
    // function make() { let c = 0; return function() { c = c + 1; return c } }
    let inner = FunctionNode {
        name: None,
        parameters: vec![],
        body: vec![
            Expression::assign_ident(
                "c",
                Expression::binary(BinaryOp::Add, Expression::ident("c"), 1.into()),
            )
            .into(),
            ret(Expression::ident("c")),
        ],
        ..FunctionNode::default()
    };
    let value = run_value(vec![
        fn_decl(
            "make",
            &[],
            vec![
                let_("c", 0.into()),
                ret(Expression::Function(Box::new(inner))),
            ],
        ),
        var("f", call_ident("make", vec![])),
        call_ident("f", vec![]).into(),
        call_ident("f", vec![]).into(),
    ]);
    assert_eq!(value, JsValue::from(2));
}

#[test]
fn while_loop_counts() {
    let value = run_value(vec![
        var("i", 0.into()),
        StatementKind::While {
            condition: Expression::binary(BinaryOp::Lt, Expression::ident("i"), 5.into()),
            body: Box::new(
                Expression::assign_ident(
                    "i",
                    Expression::binary(BinaryOp::Add, Expression::ident("i"), 1.into()),
                )
                .into(),
            ),
        }
        .into(),
        Expression::ident("i").into(),
    ]);
    assert_eq!(value, JsValue::from(5));
}

#[test]
fn for_loop_with_lexical_binding() {
    // let s = 0; for (let i = 0; i < 4; i = i + 1) s = s + i; s
    let value = run_value(vec![
        let_("s", 0.into()),
        StatementKind::For {
            init: Some(ast::ForInit::Let(vec![Declarator::new("i", Some(0.into()))])),
            condition: Some(Expression::binary(
                BinaryOp::Lt,
                Expression::ident("i"),
                4.into(),
            )),
            update: Some(Expression::assign_ident(
                "i",
                Expression::binary(BinaryOp::Add, Expression::ident("i"), 1.into()),
            )),
            body: Box::new(
                Expression::assign_ident(
                    "s",
                    Expression::binary(
                        BinaryOp::Add,
                        Expression::ident("s"),
                        Expression::ident("i"),
                    ),
                )
                .into(),
            ),
        }
        .into(),
        Expression::ident("s").into(),
    ]);
    assert_eq!(value, JsValue::from(6));
}

#[test]
fn lexical_read_before_initialization_throws() {
    assert_native_error(
        vec![
            Expression::ident("x").into(),
            let_("x", 1.into()),
        ],
        JsNativeErrorKind::Reference,
    );
}

#[test]
fn assignment_to_const_throws() {
    assert_native_error(
        vec![
            StatementKind::Const(vec![Declarator::new("x", Some(1.into()))]).into(),
            Expression::assign_ident("x", 2.into()).into(),
        ],
        JsNativeErrorKind::Type,
    );
}

#[test]
fn unresolved_identifier_throws_reference_error() {
    assert_native_error(
        vec![Expression::ident("missing").into()],
        JsNativeErrorKind::Reference,
    );
}

#[test]
fn typeof_tolerates_unresolved_names() {
    let value = run_value(vec![Expression::Unary {
        op: ast::UnaryOp::TypeOf,
        operand: Box::new(Expression::ident("missing")),
    }
    .into()]);
    assert_eq!(value, JsValue::from("undefined"));
}

#[test]
fn try_catch_finally_ordering() {
    // var r = ''; function f() { try { r += 't'; throw 1 } catch (e) { r += 'c';
    // return 9 } finally { r += 'f' } } f() + r
    let append = |text: &str| {
        Expression::Assign {
            op: Some(BinaryOp::Add),
            target: Box::new(ast::AssignTarget::Identifier("r".into())),
            value: Box::new(text.into()),
        }
    };
    let value = run_value(vec![
        var("r", "".into()),
        fn_decl(
            "f",
            &[],
            vec![StatementKind::Try {
                block: vec![
                    append("t").into(),
                    StatementKind::Throw(1.into()).into(),
                ],
                catch: Some(Catch {
                    parameter: Some(Binding::Identifier("e".into())),
                    block: vec![append("c").into(), ret(9.into())],
                }),
                finally: Some(vec![append("f").into()]),
            }
            .into()],
        ),
        Expression::binary(
            BinaryOp::Add,
            call_ident("f", vec![]),
            Expression::ident("r"),
        )
        .into(),
    ]);
    assert_eq!(value, JsValue::from("9tcf"));
}

#[test]
fn break_runs_finally() {
    // var r = ''; while (true) { try { break } finally { r += 'f' } } r
    let value = run_value(vec![
        var("r", "".into()),
        StatementKind::While {
            condition: true.into(),
            body: Box::new(
                StatementKind::Try {
                    block: vec![StatementKind::Break.into()],
                    catch: None,
                    finally: Some(vec![Expression::Assign {
                        op: Some(BinaryOp::Add),
                        target: Box::new(ast::AssignTarget::Identifier("r".into())),
                        value: Box::new("f".into()),
                    }
                    .into()]),
                }
                .into(),
            ),
        }
        .into(),
        Expression::ident("r").into(),
    ]);
    assert_eq!(value, JsValue::from("f"));
}

#[test]
fn uncaught_throw_propagates_to_the_host() {
    let mut context = Context::new();
    let err = context
        .eval_script(&Script::new(vec![StatementKind::Throw("boom".into()).into()]))
        .expect_err("the throw must escape");
    let value = err.to_opaque(&mut context);
    assert_eq!(value, JsValue::from("boom"));
}

#[test]
fn tail_calls_run_in_constant_frame_space() {
    // A strict countdown far deeper than the native recursion limit.
    let body = vec![
        StatementKind::If {
            condition: Expression::binary(BinaryOp::StrictEq, Expression::ident("n"), 0.into()),
            then: Box::new(ret(0.into())),
            otherwise: None,
        }
        .into(),
        ret(call_ident(
            "f",
            vec![Expression::binary(
                BinaryOp::Sub,
                Expression::ident("n"),
                1.into(),
            )],
        )),
    ];
    let value = run_value(vec![
        StatementKind::Function(FunctionNode {
            name: Some("f".into()),
            parameters: vec![FormalParameter::named("n")],
            body,
            strict: true,
            ..FunctionNode::default()
        })
        .into(),
        call_ident("f", vec![20_000.into()]).into(),
    ]);
    assert_eq!(value, JsValue::from(0));
}

#[test]
fn arguments_object_is_mapped_to_parameters() {
    // function f(a) { arguments[0] = 9; return a + arguments.length } f(1)
    let value = run_value(vec![
        fn_decl(
            "f",
            &["a"],
            vec![
                Expression::Assign {
                    op: None,
                    target: Box::new(ast::AssignTarget::Member {
                        base: Expression::ident("arguments"),
                        access: ast::MemberAccess::Index(Box::new(0.into())),
                    }),
                    value: Box::new(9.into()),
                }
                .into(),
                ret(Expression::binary(
                    BinaryOp::Add,
                    Expression::ident("a"),
                    Expression::field(Expression::ident("arguments"), "length"),
                )),
            ],
        ),
        call_ident("f", vec![1.into()]).into(),
    ]);
    assert_eq!(value, JsValue::from(10));
}

#[test]
fn rest_parameters_and_spread_arguments() {
    // function f(first, ...rest) { return first + rest.length } f(...[1, 2], 3)
    let value = run_value(vec![
        StatementKind::Function(FunctionNode {
            name: Some("f".into()),
            parameters: vec![
                FormalParameter::named("first"),
                FormalParameter {
                    binding: Binding::Identifier("rest".into()),
                    default: None,
                    rest: true,
                },
            ],
            body: vec![ret(Expression::binary(
                BinaryOp::Add,
                Expression::ident("first"),
                Expression::field(Expression::ident("rest"), "length"),
            ))],
            ..FunctionNode::default()
        })
        .into(),
        Expression::Call {
            callee: Box::new(Expression::ident("f")),
            args: vec![
                ast::Argument::Spread(Expression::Array(vec![
                    ast::ArrayElement::Expr(1.into()),
                    ast::ArrayElement::Expr(2.into()),
                ])),
                ast::Argument::Ordinary(3.into()),
            ],
            optional: false,
        }
        .into(),
    ]);
    assert_eq!(value, JsValue::from(3));
}

#[test]
fn parameter_defaults_apply_on_undefined() {
    let value = run_value(vec![
        StatementKind::Function(FunctionNode {
            name: Some("f".into()),
            parameters: vec![FormalParameter {
                binding: Binding::Identifier("x".into()),
                default: Some(7.into()),
                rest: false,
            }],
            body: vec![ret(Expression::ident("x"))],
            ..FunctionNode::default()
        })
        .into(),
        call_ident("f", vec![]).into(),
    ]);
    assert_eq!(value, JsValue::from(7));
}

#[test]
fn with_statement_scopes_object_properties() {
    let value = run_value(vec![
        var(
            "o",
            Expression::Object(vec![ast::PropertyDefinition::Property {
                name: "a".into(),
                value: 5.into(),
            }]),
        ),
        var("r", 0.into()),
        StatementKind::With {
            object: Expression::ident("o"),
            body: Box::new(Expression::assign_ident("r", Expression::ident("a")).into()),
        }
        .into(),
        Expression::ident("r").into(),
    ]);
    assert_eq!(value, JsValue::from(5));
}

#[test]
fn garbage_collection_keeps_live_script_state() {
    let mut context = Context::new();
    context
        .eval_script(&Script::new(vec![var(
            "keep",
            Expression::Object(vec![ast::PropertyDefinition::Property {
                name: "v".into(),
                value: 7.into(),
            }]),
        )]))
        .expect("setup succeeds");

    let before = context.heap.stats();
    context.collect_garbage();
    let after = context.heap.stats();
    assert!(after.cells <= before.cells);
    assert!(after.collections > before.collections);

    // The global object keeps `keep` alive across the collection.
    let value = context
        .eval_script(&Script::new(vec![Expression::field(
            Expression::ident("keep"),
            "v",
        )
        .into()]))
        .expect("the object survived");
    assert_eq!(value, JsValue::from(7));
}

#[test]
fn disassembler_renders_every_instruction() {
    let mut context = Context::new();
    let script = Script::new(vec![
        fn_decl(
            "f",
            &["x"],
            vec![ret(Expression::binary(
                BinaryOp::Add,
                Expression::ident("x"),
                1.into(),
            ))],
        ),
        call_ident("f", vec![41.into()]).into(),
    ]);
    let code = crate::bytecompiler::compile_script(&script, &mut context).expect("compiles");
    let listing = format!("{code}");
    assert!(listing.contains("PushCall"));
    assert!(listing.contains("Return"));
    // Inner functions are listed too.
    assert!(listing.contains("function 'f'"));

    // The line-info table answers offset queries.
    assert!(code.line_at(0).is_none() || code.line_at(0).is_some());
}

#[test]
fn bytecode_and_register_limits_are_enforced() {
    use crate::vm::{MAX_CODE_SIZE, MAX_REGISTERS};
    assert_eq!(MAX_CODE_SIZE, 65536);
    assert_eq!(MAX_REGISTERS, 256);

    // A right-nested addition chain keeps one operand register live per
    // level, so 300 levels must overflow the 256-register file.
    let mut right: Expression = 1.into();
    for _ in 0..300 {
        right = Expression::binary(BinaryOp::Add, 1.into(), right);
    }
    let err = run(vec![right.into()]).expect_err("the register file is capped");
    assert_eq!(
        err.as_native().map(|n| n.kind),
        Some(JsNativeErrorKind::Syntax)
    );
}

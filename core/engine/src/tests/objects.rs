//! Object model tests: property order, the array length invariant,
//! descriptor compatibility, exotic objects.

use super::{call_ident, fn_decl, ret, run_value, var};
use crate::ast::{self, BinaryOp, Expression, PropertyDefinition, StatementKind};
use crate::object::{JsObject, ObjectData};
use crate::property::{PropertyDescriptor, PropertyKey};
use crate::{Context, JsValue};

#[test]
fn own_property_keys_preserve_insertion_order() {
    let mut context = Context::new();
    let object = JsObject::with_object_proto(&mut context);
    object
        .create_data_property("b", 1, &mut context)
        .expect("fresh object");
    object
        .create_data_property("a", 2, &mut context)
        .expect("fresh object");
    object
        .create_data_property(PropertyKey::Index(5), 3, &mut context)
        .expect("fresh object");
    object
        .create_data_property(PropertyKey::Index(2), 4, &mut context)
        .expect("fresh object");

    let keys = object
        .__own_property_keys__(&mut context)
        .expect("ordinary keys never fail");
    assert_eq!(
        keys,
        vec![
            PropertyKey::Index(2),
            PropertyKey::Index(5),
            PropertyKey::from("b"),
            PropertyKey::from("a"),
        ]
    );

    // Deletion preserves the order of the survivors.
    object
        .__delete__(&PropertyKey::from("b"), &mut context)
        .expect("configurable");
    let keys = object
        .__own_property_keys__(&mut context)
        .expect("ordinary keys never fail");
    assert_eq!(
        keys,
        vec![
            PropertyKey::Index(2),
            PropertyKey::Index(5),
            PropertyKey::from("a"),
        ]
    );
}

#[test]
fn array_length_tracks_largest_index() {
    let value = run_value(vec![
        var(
            "a",
            Expression::Array(vec![
                ast::ArrayElement::Expr(1.into()),
                ast::ArrayElement::Expr(2.into()),
                ast::ArrayElement::Expr(3.into()),
            ]),
        ),
        Expression::Assign {
            op: None,
            target: Box::new(ast::AssignTarget::Member {
                base: Expression::ident("a"),
                access: ast::MemberAccess::Index(Box::new(10.into())),
            }),
            value: Box::new(52.into()),
        }
        .into(),
        Expression::field(Expression::ident("a"), "length").into(),
    ]);
    assert_eq!(value, JsValue::from(11));
}

#[test]
fn shrinking_length_deletes_excess_elements() {
    let value = run_value(vec![
        var(
            "a",
            Expression::Array(vec![
                ast::ArrayElement::Expr(1.into()),
                ast::ArrayElement::Expr(2.into()),
                ast::ArrayElement::Expr(3.into()),
            ]),
        ),
        Expression::Assign {
            op: None,
            target: Box::new(ast::AssignTarget::Member {
                base: Expression::ident("a"),
                access: ast::MemberAccess::Field("length".into()),
            }),
            value: Box::new(1.into()),
        }
        .into(),
        Expression::index(Expression::ident("a"), 1.into()).into(),
    ]);
    assert_eq!(value, JsValue::undefined());
}

#[test]
fn non_configurable_property_resists_redefinition() {
    let mut context = Context::new();
    let object = JsObject::with_object_proto(&mut context);
    object
        .define_property_or_throw(
            "frozen",
            PropertyDescriptor::builder()
                .value(1)
                .writable(false)
                .enumerable(true)
                .configurable(false)
                .build(),
            &mut context,
        )
        .expect("first definition succeeds");

    // Same value: allowed (SameValue exemption).
    assert!(object
        .__define_own_property__(
            &PropertyKey::from("frozen"),
            PropertyDescriptor::builder().value(1).build(),
            &mut context,
        )
        .expect("definition itself does not throw"));

    // New value: refused.
    assert!(!object
        .__define_own_property__(
            &PropertyKey::from("frozen"),
            PropertyDescriptor::builder().value(2).build(),
            &mut context,
        )
        .expect("definition itself does not throw"));

    // Flipping to an accessor: refused.
    assert!(!object
        .__define_own_property__(
            &PropertyKey::from("frozen"),
            PropertyDescriptor::builder()
                .get(JsValue::undefined())
                .build(),
            &mut context,
        )
        .expect("definition itself does not throw"));
}

#[test]
fn object_literal_accessors_run() {
    // var o = { get x() { return 7 } }; o.x
    let getter = ast::FunctionNode {
        name: None,
        parameters: vec![],
        body: vec![ret(7.into())],
        flavor: ast::FunctionFlavor::Method,
        ..ast::FunctionNode::default()
    };
    let value = run_value(vec![
        var(
            "o",
            Expression::Object(vec![PropertyDefinition::Method {
                name: "x".into(),
                kind: ast::MethodKind::Get,
                function: getter,
            }]),
        ),
        Expression::field(Expression::ident("o"), "x").into(),
    ]);
    assert_eq!(value, JsValue::from(7));
}

#[test]
fn object_spread_and_rest_destructuring() {
    // var base = { a: 1, b: 2 };
    // var copy = { ...base, c: 3 };
    // var { a, ...rest } = copy; a + rest.b + rest.c
    let value = run_value(vec![
        var(
            "base",
            Expression::Object(vec![
                PropertyDefinition::Property {
                    name: "a".into(),
                    value: 1.into(),
                },
                PropertyDefinition::Property {
                    name: "b".into(),
                    value: 2.into(),
                },
            ]),
        ),
        var(
            "copy",
            Expression::Object(vec![
                PropertyDefinition::Spread(Expression::ident("base")),
                PropertyDefinition::Property {
                    name: "c".into(),
                    value: 3.into(),
                },
            ]),
        ),
        StatementKind::Var(vec![ast::Declarator {
            binding: ast::Binding::Pattern(ast::Pattern::Object {
                properties: vec![ast::ObjectPatternProperty {
                    name: "a".into(),
                    binding: ast::Binding::Identifier("a".into()),
                    default: None,
                }],
                rest: Some("rest".into()),
            }),
            init: Some(Expression::ident("copy")),
        }])
        .into(),
        Expression::binary(
            BinaryOp::Add,
            Expression::binary(
                BinaryOp::Add,
                Expression::ident("a"),
                Expression::field(Expression::ident("rest"), "b"),
            ),
            Expression::field(Expression::ident("rest"), "c"),
        )
        .into(),
    ]);
    assert_eq!(value, JsValue::from(6));
}

#[test]
fn array_destructuring_with_defaults_and_rest() {
    // var [a, , b = 10, ...r] = [1, 2, undefined, 4, 5]; a + b + r.length
    let value = run_value(vec![
        StatementKind::Var(vec![ast::Declarator {
            binding: ast::Binding::Pattern(ast::Pattern::Array {
                elements: vec![
                    ast::ArrayPatternElement::Binding {
                        binding: ast::Binding::Identifier("a".into()),
                        default: None,
                    },
                    ast::ArrayPatternElement::Elision,
                    ast::ArrayPatternElement::Binding {
                        binding: ast::Binding::Identifier("b".into()),
                        default: Some(10.into()),
                    },
                ],
                rest: Some(Box::new(ast::Binding::Identifier("r".into()))),
            }),
            init: Some(Expression::Array(vec![
                ast::ArrayElement::Expr(1.into()),
                ast::ArrayElement::Expr(2.into()),
                ast::ArrayElement::Expr(Expression::Literal(ast::Literal::Undefined)),
                ast::ArrayElement::Expr(4.into()),
                ast::ArrayElement::Expr(5.into()),
            ])),
        }])
        .into(),
        Expression::binary(
            BinaryOp::Add,
            Expression::binary(
                BinaryOp::Add,
                Expression::ident("a"),
                Expression::ident("b"),
            ),
            Expression::field(Expression::ident("r"), "length"),
        )
        .into(),
    ]);
    assert_eq!(value, JsValue::from(13));
}

#[test]
fn for_in_skips_deleted_and_shadowed_keys() {
    // var o = { x: 1, y: 2 }; var ks = ''; for (var k in o) ks += k; ks
    let value = run_value(vec![
        var(
            "o",
            Expression::Object(vec![
                PropertyDefinition::Property {
                    name: "x".into(),
                    value: 1.into(),
                },
                PropertyDefinition::Property {
                    name: "y".into(),
                    value: 2.into(),
                },
            ]),
        ),
        var("ks", "".into()),
        StatementKind::ForIn {
            binding: ast::ForBinding::Var(ast::Binding::Identifier("k".into())),
            object: Expression::ident("o"),
            body: Box::new(
                Expression::Assign {
                    op: Some(BinaryOp::Add),
                    target: Box::new(ast::AssignTarget::Identifier("ks".into())),
                    value: Box::new(Expression::ident("k")),
                }
                .into(),
            ),
        }
        .into(),
        Expression::ident("ks").into(),
    ]);
    assert_eq!(value, JsValue::from("xy"));
}

#[test]
fn for_of_iterates_arrays() {
    let value = run_value(vec![
        var("s", 0.into()),
        StatementKind::ForOf {
            binding: ast::ForBinding::Const(ast::Binding::Identifier("v".into())),
            iterable: Expression::Array(vec![
                ast::ArrayElement::Expr(1.into()),
                ast::ArrayElement::Expr(2.into()),
                ast::ArrayElement::Expr(3.into()),
            ]),
            body: Box::new(
                Expression::Assign {
                    op: Some(BinaryOp::Add),
                    target: Box::new(ast::AssignTarget::Identifier("s".into())),
                    value: Box::new(Expression::ident("v")),
                }
                .into(),
            ),
            awaited: false,
        }
        .into(),
        Expression::ident("s").into(),
    ]);
    assert_eq!(value, JsValue::from(6));
}

#[test]
fn proxy_get_trap_intercepts_reads() {
    // var handler = { get: function() { return 42 } };
    // var p = new Proxy({}, handler); p.anything
    let trap = ast::FunctionNode {
        name: None,
        parameters: vec![],
        body: vec![ret(42.into())],
        ..ast::FunctionNode::default()
    };
    let value = run_value(vec![
        var(
            "p",
            Expression::New {
                callee: Box::new(Expression::ident("Proxy")),
                args: vec![
                    ast::Argument::Ordinary(Expression::Object(vec![])),
                    ast::Argument::Ordinary(Expression::Object(vec![
                        PropertyDefinition::Property {
                            name: "get".into(),
                            value: Expression::Function(Box::new(trap)),
                        },
                    ])),
                ],
            },
        ),
        Expression::field(Expression::ident("p"), "anything").into(),
    ]);
    assert_eq!(value, JsValue::from(42));
}

#[test]
fn bound_functions_fix_this_and_prepend_arguments() {
    // function f(a, b) { return this.x + a + b }
    // var g = f.bind({ x: 1 }, 2); g(3)
    let value = run_value(vec![
        fn_decl(
            "f",
            &["a", "b"],
            vec![ret(Expression::binary(
                BinaryOp::Add,
                Expression::binary(
                    BinaryOp::Add,
                    Expression::field(Expression::This, "x"),
                    Expression::ident("a"),
                ),
                Expression::ident("b"),
            ))],
        ),
        var(
            "g",
            Expression::call(
                Expression::field(Expression::ident("f"), "bind"),
                vec![
                    Expression::Object(vec![PropertyDefinition::Property {
                        name: "x".into(),
                        value: 1.into(),
                    }])
                    .into(),
                    Expression::from(2).into(),
                ],
            ),
        ),
        call_ident("g", vec![3.into()]).into(),
    ]);
    assert_eq!(value, JsValue::from(6));
}

#[test]
fn integer_indexed_views_clamp_to_their_buffer() {
    let mut context = Context::new();
    let view = JsObject::from_proto_and_data(
        Some(context.intrinsics().object_prototype()),
        ObjectData::integer_indexed(crate::object::IntegerIndexed {
            elements: vec![0.0; 4],
        }),
        &mut context,
    );
    view.set(PropertyKey::Index(1), 42, false, &mut context)
        .expect("in-bounds write");
    // Out of bounds: silently dropped.
    view.set(PropertyKey::Index(9), 7, false, &mut context)
        .expect("out-of-bounds write is ignored");
    assert_eq!(
        view.get(PropertyKey::Index(1), &mut context).expect("read"),
        JsValue::from(42.0)
    );
    assert_eq!(
        view.get(PropertyKey::Index(9), &mut context).expect("read"),
        JsValue::undefined()
    );
    let keys = view
        .__own_property_keys__(&mut context)
        .expect("keys never fail");
    assert_eq!(keys.len(), 4);
}

#[test]
fn optional_chaining_short_circuits() {
    // var o = undefined; o?.x
    let value = run_value(vec![
        var("o", Expression::Literal(ast::Literal::Undefined)),
        Expression::Member {
            base: Box::new(Expression::ident("o")),
            access: ast::MemberAccess::Field("x".into()),
            optional: true,
        }
        .into(),
    ]);
    assert_eq!(value, JsValue::undefined());
}

#[test]
fn property_key_canonicalization_is_idempotent() {
    let key = PropertyKey::from(crate::JsString::from("42"));
    assert_eq!(key, PropertyKey::Index(42));
    // Round-tripping the canonical form is stable.
    let again = PropertyKey::from(crate::JsString::from("42"));
    assert_eq!(key, again);
}

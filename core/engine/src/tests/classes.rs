//! Class semantics: private members, inheritance, `super`, static
//! elements.

use super::{call_ident, ret, run_value, var};
use crate::ast::{
    self, BinaryOp, ClassElement, ClassNode, Expression, FormalParameter, FunctionNode,
    MethodKind, StatementKind,
};
use crate::{JsNativeErrorKind, JsValue};

fn method(name: &str, kind: MethodKind, body: Vec<ast::Statement>) -> ClassElement {
    ClassElement::Method {
        name: name.into(),
        kind,
        function: FunctionNode {
            name: Some(name.into()),
            body,
            flavor: ast::FunctionFlavor::Method,
            strict: true,
            ..FunctionNode::default()
        },
        is_static: false,
    }
}

#[test]
fn private_fields_are_invisible_to_property_access() {
    // class C { #x = 10; get x() { return this.#x } }
    // new C().x == 10, new C()['#x'] == undefined
    let class = ClassNode {
        name: Some("C".into()),
        super_class: None,
        constructor: None,
        elements: vec![
            ClassElement::PrivateField {
                name: "x".into(),
                initializer: Some(10.into()),
                is_static: false,
            },
            method(
                "x",
                MethodKind::Get,
                vec![ret(Expression::Member {
                    base: Box::new(Expression::This),
                    access: ast::MemberAccess::Private("x".into()),
                    optional: false,
                })],
            ),
        ],
    };

    let value = run_value(vec![
        StatementKind::Class(class.clone()).into(),
        var(
            "c",
            Expression::New {
                callee: Box::new(Expression::ident("C")),
                args: vec![],
            },
        ),
        Expression::field(Expression::ident("c"), "x").into(),
    ]);
    assert_eq!(value, JsValue::from(10));

    let value = run_value(vec![
        StatementKind::Class(class).into(),
        Expression::index(
            Expression::New {
                callee: Box::new(Expression::ident("C")),
                args: vec![],
            },
            "#x".into(),
        )
        .into(),
    ]);
    assert_eq!(value, JsValue::undefined());
}

#[test]
fn private_access_outside_the_declaring_class_fails() {
    // Accessing #x on an object whose class never declared it.
    let class = ClassNode {
        name: Some("C".into()),
        super_class: None,
        constructor: None,
        elements: vec![
            ClassElement::PrivateField {
                name: "x".into(),
                initializer: Some(1.into()),
                is_static: false,
            },
            method(
                "read",
                MethodKind::Method,
                vec![ret(Expression::Member {
                    base: Box::new(Expression::ident("other")),
                    access: ast::MemberAccess::Private("x".into()),
                    optional: false,
                })],
            ),
        ],
    };
    super::assert_native_error(
        vec![
            var("other", Expression::Object(vec![])),
            StatementKind::Class(class).into(),
            Expression::call(
                Expression::field(
                    Expression::New {
                        callee: Box::new(Expression::ident("C")),
                        args: vec![],
                    },
                    "read",
                ),
                vec![],
            )
            .into(),
        ],
        JsNativeErrorKind::Type,
    );
}

#[test]
fn private_methods_and_brand_checks() {
    // class C { #v = 5; #inc() { return this.#v + 1 }
    //           run() { return this.#inc() }
    //           static has(o) { return #v in o } }
    let class = ClassNode {
        name: Some("C".into()),
        super_class: None,
        constructor: None,
        elements: vec![
            ClassElement::PrivateField {
                name: "v".into(),
                initializer: Some(5.into()),
                is_static: false,
            },
            ClassElement::PrivateMethod {
                name: "inc".into(),
                kind: MethodKind::Method,
                function: FunctionNode {
                    body: vec![ret(Expression::binary(
                        BinaryOp::Add,
                        Expression::Member {
                            base: Box::new(Expression::This),
                            access: ast::MemberAccess::Private("v".into()),
                            optional: false,
                        },
                        1.into(),
                    ))],
                    flavor: ast::FunctionFlavor::Method,
                    strict: true,
                    ..FunctionNode::default()
                },
                is_static: false,
            },
            method(
                "run",
                MethodKind::Method,
                vec![ret(Expression::call(
                    Expression::Member {
                        base: Box::new(Expression::This),
                        access: ast::MemberAccess::Private("inc".into()),
                        optional: false,
                    },
                    vec![],
                ))],
            ),
            ClassElement::Method {
                name: "has".into(),
                kind: MethodKind::Method,
                function: FunctionNode {
                    name: Some("has".into()),
                    parameters: vec![FormalParameter::named("o")],
                    body: vec![ret(Expression::PrivateIn {
                        name: "v".into(),
                        object: Box::new(Expression::ident("o")),
                    })],
                    flavor: ast::FunctionFlavor::Method,
                    strict: true,
                    ..FunctionNode::default()
                },
                is_static: true,
            },
        ],
    };

    let value = run_value(vec![
        StatementKind::Class(class.clone()).into(),
        Expression::call(
            Expression::field(
                Expression::New {
                    callee: Box::new(Expression::ident("C")),
                    args: vec![],
                },
                "run",
            ),
            vec![],
        )
        .into(),
    ]);
    assert_eq!(value, JsValue::from(6));

    // The brand check distinguishes instances from plain objects.
    let value = run_value(vec![
        StatementKind::Class(class).into(),
        var(
            "inst",
            Expression::New {
                callee: Box::new(Expression::ident("C")),
                args: vec![],
            },
        ),
        Expression::binary(
            BinaryOp::Add,
            Expression::call(
                Expression::field(Expression::ident("C"), "has"),
                vec![Expression::ident("inst").into()],
            ),
            Expression::call(
                Expression::field(Expression::ident("C"), "has"),
                vec![Expression::Object(vec![]).into()],
            ),
        )
        .into(),
    ]);
    // true + false adds to 1.
    assert_eq!(value, JsValue::from(1));
}

#[test]
fn derived_classes_bind_this_through_super() {
    // class A { constructor(v) { this.v = v } base() { return this.v + 1 } }
    // class B extends A { constructor() { super(3) } m() { return super.base() + 10 } }
    // new B().m() == 14
    let a = ClassNode {
        name: Some("A".into()),
        super_class: None,
        constructor: Some(FunctionNode {
            parameters: vec![FormalParameter::named("v")],
            body: vec![Expression::Assign {
                op: None,
                target: Box::new(ast::AssignTarget::Member {
                    base: Expression::This,
                    access: ast::MemberAccess::Field("v".into()),
                }),
                value: Box::new(Expression::ident("v")),
            }
            .into()],
            strict: true,
            ..FunctionNode::default()
        }),
        elements: vec![method(
            "base",
            MethodKind::Method,
            vec![ret(Expression::binary(
                BinaryOp::Add,
                Expression::field(Expression::This, "v"),
                1.into(),
            ))],
        )],
    };
    let b = ClassNode {
        name: Some("B".into()),
        super_class: Some(Box::new(Expression::ident("A"))),
        constructor: Some(FunctionNode {
            body: vec![Expression::SuperCall(vec![Expression::from(3).into()]).into()],
            strict: true,
            ..FunctionNode::default()
        }),
        elements: vec![method(
            "m",
            MethodKind::Method,
            vec![ret(Expression::binary(
                BinaryOp::Add,
                Expression::call(
                    Expression::SuperMember {
                        access: ast::MemberAccess::Field("base".into()),
                    },
                    vec![],
                ),
                10.into(),
            ))],
        )],
    };

    let value = run_value(vec![
        StatementKind::Class(a).into(),
        StatementKind::Class(b).into(),
        Expression::call(
            Expression::field(
                Expression::New {
                    callee: Box::new(Expression::ident("B")),
                    args: vec![],
                },
                "m",
            ),
            vec![],
        )
        .into(),
    ]);
    assert_eq!(value, JsValue::from(14));
}

#[test]
fn default_derived_constructor_forwards_arguments() {
    // class A { constructor(v) { this.v = v } }
    // class B extends A {}
    // new B(7).v == 7
    let a = ClassNode {
        name: Some("A".into()),
        super_class: None,
        constructor: Some(FunctionNode {
            parameters: vec![FormalParameter::named("v")],
            body: vec![Expression::Assign {
                op: None,
                target: Box::new(ast::AssignTarget::Member {
                    base: Expression::This,
                    access: ast::MemberAccess::Field("v".into()),
                }),
                value: Box::new(Expression::ident("v")),
            }
            .into()],
            strict: true,
            ..FunctionNode::default()
        }),
        elements: vec![],
    };
    let b = ClassNode {
        name: Some("B".into()),
        super_class: Some(Box::new(Expression::ident("A"))),
        constructor: None,
        elements: vec![],
    };
    let value = run_value(vec![
        StatementKind::Class(a).into(),
        StatementKind::Class(b).into(),
        Expression::field(
            Expression::New {
                callee: Box::new(Expression::ident("B")),
                args: vec![Expression::from(7).into()],
            },
            "v",
        )
        .into(),
    ]);
    assert_eq!(value, JsValue::from(7));
}

#[test]
fn static_fields_and_blocks_run_at_definition_time() {
    // class C { static x = 1; static { this.y = this.x + 1 } } C.y == 2
    let class = ClassNode {
        name: Some("C".into()),
        super_class: None,
        constructor: None,
        elements: vec![
            ClassElement::Field {
                name: "x".into(),
                initializer: Some(1.into()),
                is_static: true,
            },
            ClassElement::StaticBlock(vec![Expression::Assign {
                op: None,
                target: Box::new(ast::AssignTarget::Member {
                    base: Expression::This,
                    access: ast::MemberAccess::Field("y".into()),
                }),
                value: Box::new(Expression::binary(
                    BinaryOp::Add,
                    Expression::field(Expression::This, "x"),
                    1.into(),
                )),
            }
            .into()]),
        ],
    };
    let value = run_value(vec![
        StatementKind::Class(class).into(),
        Expression::field(Expression::ident("C"), "y").into(),
    ]);
    assert_eq!(value, JsValue::from(2));
}

#[test]
fn instances_answer_instanceof() {
    let class = ClassNode {
        name: Some("C".into()),
        ..ClassNode::default()
    };
    let value = run_value(vec![
        StatementKind::Class(class).into(),
        Expression::binary(
            BinaryOp::InstanceOf,
            Expression::New {
                callee: Box::new(Expression::ident("C")),
                args: vec![],
            },
            Expression::ident("C"),
        )
        .into(),
    ]);
    assert_eq!(value, JsValue::from(true));
}

#[test]
fn class_constructor_requires_new() {
    let class = ClassNode {
        name: Some("C".into()),
        ..ClassNode::default()
    };
    super::assert_native_error(
        vec![
            StatementKind::Class(class).into(),
            call_ident("C", vec![]).into(),
        ],
        JsNativeErrorKind::Type,
    );
}

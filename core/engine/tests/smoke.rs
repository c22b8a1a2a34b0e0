//! End-to-end checks through the public embedding surface only.

use kestrel_engine::ast::{
    self, BinaryOp, Declarator, ExportDeclaration, Expression, FormalParameter, FunctionNode,
    ModuleItem, Script, StatementKind,
};
use kestrel_engine::module::Module;
use kestrel_engine::{Context, JsString, JsValue};

#[test]
fn evaluate_a_script() {
    let mut context = Context::default();
    // function add(a, b) { return a + b } add(40, 2)
    let script = Script::new(vec![
        StatementKind::Function(FunctionNode {
            name: Some("add".into()),
            parameters: vec![FormalParameter::named("a"), FormalParameter::named("b")],
            body: vec![StatementKind::Return(Some(Expression::binary(
                BinaryOp::Add,
                Expression::ident("a"),
                Expression::ident("b"),
            )))
            .into()],
            ..FunctionNode::default()
        })
        .into(),
        Expression::call(
            Expression::ident("add"),
            vec![Expression::from(40).into(), Expression::from(2).into()],
        )
        .into(),
    ]);
    let value = context.eval_script(&script).expect("script runs");
    assert_eq!(value, JsValue::from(42));
}

#[test]
fn evaluate_a_module_and_read_its_namespace() {
    let mut context = Context::default();
    let module = Module::from_ast(
        &ast::Module::new(vec![ModuleItem::Export(ExportDeclaration::Declaration(
            StatementKind::Let(vec![Declarator::new(
                "answer",
                Some(Expression::binary(BinaryOp::Mul, 6.into(), 7.into())),
            )])
            .into(),
        ))]),
        JsString::from("./answer"),
        &mut context,
    )
    .expect("module compiles");
    context.register_module(JsString::from("./answer"), module.clone());

    module
        .load_link_evaluate(&mut context)
        .expect("evaluation starts");
    context.run_jobs().expect("queue drains");

    let namespace = module.namespace(&mut context);
    let answer = namespace.get("answer", &mut context).expect("live export");
    assert_eq!(answer, JsValue::from(42));
}

#[test]
fn host_requested_collection_is_safe_mid_session() {
    let mut context = Context::default();
    context
        .eval_script(&Script::new(vec![StatementKind::Var(vec![
            Declarator::new("o", Some(Expression::Object(vec![]))),
        ])
        .into()]))
        .expect("setup");
    context.collect_garbage();
    let value = context
        .eval_script(&Script::new(vec![Expression::Unary {
            op: ast::UnaryOp::TypeOf,
            operand: Box::new(Expression::ident("o")),
        }
        .into()]))
        .expect("object survives");
    assert_eq!(value, JsValue::from("object"));
}

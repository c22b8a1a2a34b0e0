//! Module linking, evaluation and live bindings.

use crate::ast::{
    self, BinaryOp, Declarator, ExportDeclaration, Expression, FunctionNode, ImportBinding,
    ImportDeclaration, ImportName, ModuleItem, StatementKind,
};
use crate::builtins::promise::PromiseState;
use crate::module::{Module, ModuleStatus};
use crate::{Context, JsString, JsValue};

fn import(specifier: &str, names: &[&str]) -> ModuleItem {
    ModuleItem::Import(ImportDeclaration {
        specifier: specifier.into(),
        bindings: names
            .iter()
            .map(|name| ImportBinding {
                import_name: ImportName::Name((*name).into()),
                local: (*name).into(),
            })
            .collect(),
    })
}

fn export_let(name: &str, init: Expression) -> ModuleItem {
    ModuleItem::Export(ExportDeclaration::Declaration(
        StatementKind::Let(vec![Declarator::new(name, Some(init))]).into(),
    ))
}

fn export_const(name: &str, init: Expression) -> ModuleItem {
    ModuleItem::Export(ExportDeclaration::Declaration(
        StatementKind::Const(vec![Declarator::new(name, Some(init))]).into(),
    ))
}

fn register(context: &mut Context, specifier: &str, items: Vec<ModuleItem>) -> Module {
    let module = Module::from_ast(&ast::Module::new(items), specifier.into(), context)
        .expect("module compiles");
    context.register_module(JsString::from(specifier), module.clone());
    module
}

/// `export let x = 1; export function inc() { x = x + 1 }`
fn module_a(context: &mut Context) -> Module {
    register(
        context,
        "./A",
        vec![
            export_let("x", 1.into()),
            ModuleItem::Export(ExportDeclaration::Declaration(
                StatementKind::Function(FunctionNode {
                    name: Some("inc".into()),
                    body: vec![Expression::assign_ident(
                        "x",
                        Expression::binary(BinaryOp::Add, Expression::ident("x"), 1.into()),
                    )
                    .into()],
                    ..FunctionNode::default()
                })
                .into(),
            )),
        ],
    )
}

#[test]
fn imports_are_live_bindings() {
    let mut context = Context::new();
    module_a(&mut context);

    // import { x, inc } from './A'; inc(); export const y = x
    let b = register(
        &mut context,
        "./B",
        vec![
            import("./A", &["x", "inc"]),
            ModuleItem::Statement(
                Expression::call(Expression::ident("inc"), vec![]).into(),
            ),
            export_const("y", Expression::ident("x")),
        ],
    );

    let promise = b.load_link_evaluate(&mut context).expect("evaluation starts");
    context.run_jobs().expect("jobs drain");

    assert_eq!(b.status(), ModuleStatus::Evaluated);
    let state = promise.borrow().as_promise().expect("a promise").state().clone();
    assert_eq!(state, PromiseState::Fulfilled(JsValue::undefined()));

    // B observed the mutation through the live binding.
    let y = b
        .exported_binding_value(&JsString::from("y"), &mut context)
        .expect("y is initialized");
    assert_eq!(y, JsValue::from(2));
}

#[test]
fn module_status_is_monotone() {
    let mut context = Context::new();
    let module = register(&mut context, "./m", vec![export_let("v", 1.into())]);
    assert_eq!(module.status(), ModuleStatus::Unlinked);

    module.load(&mut context).expect("nothing to load");
    module.link(&mut context).expect("links");
    assert_eq!(module.status(), ModuleStatus::Linked);

    module.evaluate(&mut context);
    assert_eq!(module.status(), ModuleStatus::Evaluated);

    // Re-evaluation is idempotent and cannot regress the state.
    module.evaluate(&mut context);
    assert_eq!(module.status(), ModuleStatus::Evaluated);
}

#[test]
fn namespace_objects_reflect_live_exports() {
    let mut context = Context::new();
    let a = module_a(&mut context);
    let promise = a.load_link_evaluate(&mut context).expect("evaluation starts");
    context.run_jobs().expect("jobs drain");
    let _ = promise;

    let namespace = a.namespace(&mut context);
    // Exports are sorted and read through the environment.
    let keys = namespace
        .__own_property_keys__(&mut context)
        .expect("namespace keys");
    let names: Vec<String> = keys
        .iter()
        .filter_map(|k| match k {
            crate::property::PropertyKey::String(s) => Some(s.to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(names, vec!["inc".to_string(), "x".to_string()]);

    assert_eq!(
        namespace.get("x", &mut context).expect("read"),
        JsValue::from(1)
    );
    // Mutate through the exported function; the namespace sees it.
    let inc = namespace.get("inc", &mut context).expect("read");
    inc.as_callable()
        .expect("inc is callable")
        .clone()
        .call(&JsValue::undefined(), &[], &mut context)
        .expect("inc runs");
    assert_eq!(
        namespace.get("x", &mut context).expect("read"),
        JsValue::from(2)
    );

    // The namespace is frozen.
    assert!(!namespace
        .set("x", 99, false, &mut context)
        .expect("set reports failure"));
}

#[test]
fn unresolved_imports_fail_linking() {
    let mut context = Context::new();
    register(&mut context, "./exports-nothing", vec![]);
    let importer = register(
        &mut context,
        "./importer",
        vec![import("./exports-nothing", &["missing"])],
    );
    importer.load(&mut context).expect("loads");
    let err = importer.link(&mut context).expect_err("missing export");
    assert_eq!(
        err.as_native().map(|n| n.kind),
        Some(crate::JsNativeErrorKind::Syntax)
    );
    // A failed link rolls the module back to unlinked.
    assert_eq!(importer.status(), ModuleStatus::Unlinked);
}

#[test]
fn top_level_await_defers_evaluation() {
    let mut context = Context::new();
    // export const v = await Promise.resolve(7)
    let module = register(
        &mut context,
        "./tla",
        vec![export_const(
            "v",
            Expression::Await(Box::new(Expression::call(
                Expression::field(Expression::ident("Promise"), "resolve"),
                vec![Expression::from(7).into()],
            ))),
        )],
    );

    let promise = module.load_link_evaluate(&mut context).expect("starts");
    let state = promise.borrow().as_promise().expect("promise").state().clone();
    assert_eq!(state, PromiseState::Pending);
    assert_eq!(module.status(), ModuleStatus::EvaluatingAsync);

    context.run_jobs().expect("jobs drain");
    assert_eq!(module.status(), ModuleStatus::Evaluated);
    let state = promise.borrow().as_promise().expect("promise").state().clone();
    assert_eq!(state, PromiseState::Fulfilled(JsValue::undefined()));
    assert_eq!(
        module
            .exported_binding_value(&JsString::from("v"), &mut context)
            .expect("v settled"),
        JsValue::from(7)
    );
}

#[test]
fn async_dependencies_propagate_to_parents() {
    let mut context = Context::new();
    register(
        &mut context,
        "./leaf",
        vec![export_const(
            "v",
            Expression::Await(Box::new(Expression::call(
                Expression::field(Expression::ident("Promise"), "resolve"),
                vec![Expression::from(5).into()],
            ))),
        )],
    );
    let parent = register(
        &mut context,
        "./parent",
        vec![
            import("./leaf", &["v"]),
            export_const(
                "doubled",
                Expression::binary(BinaryOp::Mul, Expression::ident("v"), 2.into()),
            ),
        ],
    );

    let promise = parent.load_link_evaluate(&mut context).expect("starts");
    assert_eq!(parent.status(), ModuleStatus::EvaluatingAsync);
    context.run_jobs().expect("jobs drain");

    assert_eq!(parent.status(), ModuleStatus::Evaluated);
    let state = promise.borrow().as_promise().expect("promise").state().clone();
    assert_eq!(state, PromiseState::Fulfilled(JsValue::undefined()));
    assert_eq!(
        parent
            .exported_binding_value(&JsString::from("doubled"), &mut context)
            .expect("doubled settled"),
        JsValue::from(10)
    );
}

#[test]
fn import_before_initialization_is_a_reference_error() {
    let mut context = Context::new();
    let module = register(&mut context, "./late", vec![export_let("x", 1.into())]);
    module.load(&mut context).expect("loads");
    module.link(&mut context).expect("links");

    // Linked but not yet evaluated: the binding exists, uninitialized.
    let err = module
        .exported_binding_value(&JsString::from("x"), &mut context)
        .expect_err("x is in its dead zone");
    assert_eq!(
        err.as_native().map(|n| n.kind),
        Some(crate::JsNativeErrorKind::Reference)
    );
}

//! Generators, async functions and the promise/job pipeline.

use std::cell::Cell;

use super::{call_ident, let_, ret, run_value, var};
use crate::ast::{
    self, BinaryOp, Expression, FunctionFlavor, FunctionNode, Script, Statement, StatementKind,
};
use crate::builtins::promise::PromiseState;
use crate::object::JsObject;
use crate::{Context, JsValue};

fn generator_fn(name: &str, body: Vec<Statement>) -> Statement {
    StatementKind::Function(FunctionNode {
        name: Some(name.into()),
        body,
        is_generator: true,
        ..FunctionNode::default()
    })
    .into()
}

fn yield_(value: Expression) -> Statement {
    Expression::Yield {
        argument: Some(Box::new(value)),
        delegate: false,
    }
    .into()
}

fn promise_state(value: &JsValue) -> PromiseState {
    value
        .as_object()
        .expect("a promise object")
        .borrow()
        .as_promise()
        .expect("a promise object")
        .state()
        .clone()
}

#[test]
fn generators_yield_and_complete() {
    // function* g() { yield 1; yield 2; return 3 }
    // var it = g(); it.next().value + it.next().value + it.next().value
    let next_value = |target: Expression| {
        Expression::field(
            Expression::call(Expression::field(target, "next"), vec![]),
            "value",
        )
    };
    let value = run_value(vec![
        generator_fn(
            "g",
            vec![yield_(1.into()), yield_(2.into()), ret(3.into())],
        ),
        var("it", call_ident("g", vec![])),
        Expression::binary(
            BinaryOp::Add,
            Expression::binary(
                BinaryOp::Add,
                next_value(Expression::ident("it")),
                next_value(Expression::ident("it")),
            ),
            next_value(Expression::ident("it")),
        )
        .into(),
    ]);
    assert_eq!(value, JsValue::from(6));
}

#[test]
fn generators_receive_sent_values() {
    // function* g() { var got = yield 1; yield got * 2 }
    // var it = g(); it.next(); it.next(21).value
    let value = run_value(vec![
        generator_fn(
            "g",
            vec![
                StatementKind::Var(vec![ast::Declarator::new(
                    "got",
                    Some(Expression::Yield {
                        argument: Some(Box::new(1.into())),
                        delegate: false,
                    }),
                )])
                .into(),
                yield_(Expression::binary(
                    BinaryOp::Mul,
                    Expression::ident("got"),
                    2.into(),
                )),
            ],
        ),
        var("it", call_ident("g", vec![])),
        Expression::call(
            Expression::field(Expression::ident("it"), "next"),
            vec![],
        )
        .into(),
        Expression::field(
            Expression::call(
                Expression::field(Expression::ident("it"), "next"),
                vec![Expression::from(21).into()],
            ),
            "value",
        )
        .into(),
    ]);
    assert_eq!(value, JsValue::from(42));
}

#[test]
fn generator_return_runs_pending_finally() {
    // function* g() { try { yield 1 } finally { sink = 9 } }
    // var it = g(); it.next(); it.return(5); sink
    let value = run_value(vec![
        var("sink", 0.into()),
        generator_fn(
            "g",
            vec![StatementKind::Try {
                block: vec![yield_(1.into())],
                catch: None,
                finally: Some(vec![Expression::assign_ident("sink", 9.into()).into()]),
            }
            .into()],
        ),
        var("it", call_ident("g", vec![])),
        Expression::call(Expression::field(Expression::ident("it"), "next"), vec![]).into(),
        Expression::call(
            Expression::field(Expression::ident("it"), "return"),
            vec![Expression::from(5).into()],
        )
        .into(),
        Expression::ident("sink").into(),
    ]);
    assert_eq!(value, JsValue::from(9));
}

#[test]
fn for_of_drives_generators() {
    let value = run_value(vec![
        generator_fn("g", vec![yield_(1.into()), yield_(2.into())]),
        var("s", 0.into()),
        StatementKind::ForOf {
            binding: ast::ForBinding::Const(ast::Binding::Identifier("v".into())),
            iterable: call_ident("g", vec![]),
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
    assert_eq!(value, JsValue::from(3));
}

#[test]
fn async_functions_settle_their_promise() {
    // async function f() { return 7 } f()
    let mut context = Context::new();
    let value = context
        .eval_script(&Script::new(vec![
            StatementKind::Function(FunctionNode {
                name: Some("f".into()),
                body: vec![ret(7.into())],
                is_async: true,
                ..FunctionNode::default()
            })
            .into(),
            call_ident("f", vec![]).into(),
        ]))
        .expect("the call itself succeeds");
    context.run_jobs().expect("jobs drain");
    assert_eq!(promise_state(&value), PromiseState::Fulfilled(JsValue::from(7)));
}

#[test]
fn await_suspends_and_resumes() {
    // async function f() { var v = await Promise.resolve(20); return v + 1 }
    let mut context = Context::new();
    let value = context
        .eval_script(&Script::new(vec![
            StatementKind::Function(FunctionNode {
                name: Some("f".into()),
                body: vec![
                    StatementKind::Var(vec![ast::Declarator::new(
                        "v",
                        Some(Expression::Await(Box::new(Expression::call(
                            Expression::field(Expression::ident("Promise"), "resolve"),
                            vec![Expression::from(20).into()],
                        )))),
                    )])
                    .into(),
                    ret(Expression::binary(
                        BinaryOp::Add,
                        Expression::ident("v"),
                        1.into(),
                    )),
                ],
                is_async: true,
                ..FunctionNode::default()
            })
            .into(),
            call_ident("f", vec![]).into(),
        ]))
        .expect("the call itself succeeds");

    // Still pending: reactions only run on the queue.
    assert_eq!(promise_state(&value), PromiseState::Pending);
    context.run_jobs().expect("jobs drain");
    assert_eq!(
        promise_state(&value),
        PromiseState::Fulfilled(JsValue::from(21))
    );
}

#[test]
fn for_await_sums_resolved_promises() {
    // (async () => { let s = 0;
    //    for await (const v of [Promise.resolve(1), Promise.resolve(2)]) s += v;
    //    return s })()
    let resolve = |n: i32| {
        Expression::call(
            Expression::field(Expression::ident("Promise"), "resolve"),
            vec![Expression::from(n).into()],
        )
    };
    let arrow = FunctionNode {
        name: None,
        parameters: vec![],
        body: vec![
            let_("s", 0.into()),
            StatementKind::ForOf {
                binding: ast::ForBinding::Const(ast::Binding::Identifier("v".into())),
                iterable: Expression::Array(vec![
                    ast::ArrayElement::Expr(resolve(1)),
                    ast::ArrayElement::Expr(resolve(2)),
                ]),
                body: Box::new(
                    Expression::Assign {
                        op: Some(BinaryOp::Add),
                        target: Box::new(ast::AssignTarget::Identifier("s".into())),
                        value: Box::new(Expression::ident("v")),
                    }
                    .into(),
                ),
                awaited: true,
            }
            .into(),
            ret(Expression::ident("s")),
        ],
        flavor: FunctionFlavor::Arrow,
        is_async: true,
        ..FunctionNode::default()
    };

    let mut context = Context::new();
    let value = context
        .eval_script(&Script::new(vec![Expression::call(
            Expression::Function(Box::new(arrow)),
            vec![],
        )
        .into()]))
        .expect("the call itself succeeds");
    context.run_jobs().expect("jobs drain");
    assert_eq!(promise_state(&value), PromiseState::Fulfilled(JsValue::from(3)));
}

#[test]
fn rejection_handled_in_the_same_tick_is_not_reported() {
    thread_local! {
        static FIRED: Cell<bool> = const { Cell::new(false) };
    }
    fn tracker(_: &mut Context, _: &JsObject, _: &JsValue) {
        FIRED.with(|fired| fired.set(true));
    }

    // let p = Promise.reject('e'); p.catch(x => x).then(v => v + '!')
    let catch_handler = FunctionNode {
        parameters: vec![ast::FormalParameter::named("x")],
        body: vec![ret(Expression::ident("x"))],
        flavor: FunctionFlavor::Arrow,
        ..FunctionNode::default()
    };
    let then_handler = FunctionNode {
        parameters: vec![ast::FormalParameter::named("v")],
        body: vec![ret(Expression::binary(
            BinaryOp::Add,
            Expression::ident("v"),
            "!".into(),
        ))],
        flavor: FunctionFlavor::Arrow,
        ..FunctionNode::default()
    };

    let mut context = Context::new();
    context.set_rejection_tracker(tracker);
    FIRED.with(|fired| fired.set(false));

    let value = context
        .eval_script(&Script::new(vec![
            let_(
                "p",
                Expression::call(
                    Expression::field(Expression::ident("Promise"), "reject"),
                    vec![Expression::from("e").into()],
                ),
            ),
            Expression::call(
                Expression::field(
                    Expression::call(
                        Expression::field(Expression::ident("p"), "catch"),
                        vec![Expression::Function(Box::new(catch_handler)).into()],
                    ),
                    "then",
                ),
                vec![Expression::Function(Box::new(then_handler)).into()],
            )
            .into(),
        ]))
        .expect("the script succeeds");
    context.run_jobs().expect("jobs drain");

    assert_eq!(
        promise_state(&value),
        PromiseState::Fulfilled(JsValue::from("e!"))
    );
    assert!(
        !FIRED.with(Cell::get),
        "a rejection handled within the tick must not reach the tracker"
    );
}

#[test]
fn unhandled_rejection_reaches_the_tracker() {
    thread_local! {
        static FIRED: Cell<bool> = const { Cell::new(false) };
    }
    fn tracker(_: &mut Context, _: &JsObject, _: &JsValue) {
        FIRED.with(|fired| fired.set(true));
    }

    let mut context = Context::new();
    context.set_rejection_tracker(tracker);
    FIRED.with(|fired| fired.set(false));

    context
        .eval_script(&Script::new(vec![Expression::call(
            Expression::field(Expression::ident("Promise"), "reject"),
            vec![Expression::from("boom").into()],
        )
        .into()]))
        .expect("the script succeeds");
    context.run_jobs().expect("jobs drain");
    assert!(FIRED.with(Cell::get));
}

#[test]
fn promises_settle_at_most_once() {
    // new Promise(function(res, rej) { res(1); rej(2); res(3) })
    let executor = FunctionNode {
        parameters: vec![
            ast::FormalParameter::named("res"),
            ast::FormalParameter::named("rej"),
        ],
        body: vec![
            call_ident("res", vec![1.into()]).into(),
            call_ident("rej", vec![2.into()]).into(),
            call_ident("res", vec![3.into()]).into(),
        ],
        ..FunctionNode::default()
    };
    let mut context = Context::new();
    let value = context
        .eval_script(&Script::new(vec![Expression::New {
            callee: Box::new(Expression::ident("Promise")),
            args: vec![Expression::Function(Box::new(executor)).into()],
        }
        .into()]))
        .expect("construction succeeds");
    context.run_jobs().expect("jobs drain");
    assert_eq!(promise_state(&value), PromiseState::Fulfilled(JsValue::from(1)));
}

#[test]
fn then_on_settled_promises_still_defers_through_the_queue() {
    // var order = ''; Promise.resolve(1).then(function() { order += 'b' });
    // order += 'a'
    let handler = FunctionNode {
        body: vec![Expression::Assign {
            op: Some(BinaryOp::Add),
            target: Box::new(ast::AssignTarget::Identifier("order".into())),
            value: Box::new("b".into()),
        }
        .into()],
        ..FunctionNode::default()
    };
    let mut context = Context::new();
    context
        .eval_script(&Script::new(vec![
            var("order", "".into()),
            Expression::call(
                Expression::field(
                    Expression::call(
                        Expression::field(Expression::ident("Promise"), "resolve"),
                        vec![Expression::from(1).into()],
                    ),
                    "then",
                ),
                vec![Expression::Function(Box::new(handler)).into()],
            )
            .into(),
            Expression::Assign {
                op: Some(BinaryOp::Add),
                target: Box::new(ast::AssignTarget::Identifier("order".into())),
                value: Box::new("a".into()),
            }
            .into(),
        ]))
        .expect("the script succeeds");
    context.run_jobs().expect("jobs drain");
    let order = context
        .eval_script(&Script::new(vec![Expression::ident("order").into()]))
        .expect("read back");
    assert_eq!(order, JsValue::from("ab"));
}

#[test]
fn async_generators_queue_requests() {
    // async function* g() { yield 1; yield 2 }
    // Collect both results through the promise queue.
    let mut context = Context::new();
    context
        .eval_script(&Script::new(vec![
            StatementKind::Function(FunctionNode {
                name: Some("g".into()),
                body: vec![yield_(1.into()), yield_(2.into())],
                is_async: true,
                is_generator: true,
                ..FunctionNode::default()
            })
            .into(),
            var("it", call_ident("g", vec![])),
            var(
                "p1",
                Expression::call(Expression::field(Expression::ident("it"), "next"), vec![]),
            ),
            var(
                "p2",
                Expression::call(Expression::field(Expression::ident("it"), "next"), vec![]),
            ),
        ]))
        .expect("setup succeeds");
    context.run_jobs().expect("jobs drain");

    let first = context
        .eval_script(&Script::new(vec![Expression::ident("p1").into()]))
        .expect("read back");
    let PromiseState::Fulfilled(result) = promise_state(&first) else {
        panic!("first request should fulfill");
    };
    let result = result.as_object().expect("an iterator result").clone();
    assert_eq!(
        result.get("value", &mut context).expect("get"),
        JsValue::from(1)
    );
    assert_eq!(
        result.get("done", &mut context).expect("get"),
        JsValue::from(false)
    );
}

//! The `%AsyncFromSyncIteratorPrototype%` wrapper, used by `for await`
//! over plain iterables.
//!
//! More information:
//!  - [ECMAScript reference][spec]
//!
//! [spec]: https://tc39.es/ecma262/#sec-async-from-sync-iterator-objects

use kestrel_gc::{custom_trace, Finalize, Trace};

use super::{create_iter_result_object, IteratorRecord};
use crate::builtins::promise::{
    PromiseCapability, ReactionHandler,
};
use crate::context::Context;
use crate::error::JsNativeError;
use crate::object::{JsObject, ObjectData};
use crate::value::JsValue;
use crate::JsResult;

/// The `[[SyncIteratorRecord]]` slot of an async-from-sync iterator.
#[derive(Debug, Clone)]
pub struct AsyncFromSyncIterator {
    sync: IteratorRecord,
}

impl AsyncFromSyncIterator {
    /// `CreateAsyncFromSyncIterator ( syncIteratorRecord )`
    pub(crate) fn create(sync: IteratorRecord, context: &mut Context) -> IteratorRecord {
        let proto = context
            .intrinsics()
            .async_from_sync_iterator_prototype
            .clone();
        let object = JsObject::from_proto_and_data(
            Some(proto),
            ObjectData::async_from_sync_iterator(Self { sync }),
            context,
        );
        let next_method = object
            .get("next", context)
            .expect("prototype lookup on a fresh wrapper cannot fail");
        IteratorRecord::new(object, next_method)
    }

    /// `%AsyncFromSyncIteratorPrototype%.next ( [ value ] )`
    ///
    /// Steps the sync iterator, then funnels the result value through a
    /// promise so inner promises settle before the `for await` body runs.
    pub(crate) fn next(
        this: &JsValue,
        _args: &[JsValue],
        context: &mut Context,
    ) -> JsResult<JsValue> {
        let sync = {
            let Some(object) = this.as_object() else {
                return Err(JsNativeError::typ()
                    .with_message("async-from-sync next called on a non-object")
                    .into());
            };
            let object = object.borrow();
            let crate::object::ObjectKind::AsyncFromSyncIterator(iterator) = &object.data.kind
            else {
                return Err(JsNativeError::typ()
                    .with_message("async-from-sync next called on the wrong object")
                    .into());
            };
            iterator.sync.clone()
        };

        let capability = PromiseCapability::new_intrinsic(context);

        // Step the sync iterator; a throw rejects the result promise.
        let step = (|| -> JsResult<(JsValue, bool)> {
            let result = sync.next(None, context)?;
            let done = result.get("done", context)?.to_boolean();
            let value = result.get("value", context)?;
            Ok((value, done))
        })();
        let (value, done) = match step {
            Ok(pair) => pair,
            Err(err) => {
                capability.reject_with_error(&err, context)?;
                return Ok(capability.promise().clone().into());
            }
        };

        // Resolve the inner value and unwrap it into an iterator result.
        let value_promise = crate::builtins::promise::promise_resolve(value, context)?;
        crate::builtins::promise::perform_promise_then(
            &value_promise,
            Some(ReactionHandler::AsyncFromSyncUnwrap { done }),
            None,
            Some(capability.clone()),
            context,
        );
        Ok(capability.promise().clone().into())
    }

    /// The unwrap continuation: repackage the settled value with the
    /// remembered `done` flag.
    pub(crate) fn unwrap(done: bool, value: JsValue, context: &mut Context) -> JsResult<JsValue> {
        Ok(create_iter_result_object(value, done, context))
    }
}

impl Finalize for AsyncFromSyncIterator {}

// SAFETY: the wrapped sync iterator record is the only edge.
unsafe impl Trace for AsyncFromSyncIterator {
    custom_trace!(this, mark, {
        mark(&this.sync);
    });
}

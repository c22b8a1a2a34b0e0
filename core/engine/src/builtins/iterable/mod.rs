//! Iterator protocol plumbing: iterator records, result objects, and the
//! close protocol.

pub mod async_from_sync_iterator;

pub use async_from_sync_iterator::AsyncFromSyncIterator;

use kestrel_gc::{custom_trace, Finalize, Trace};

use crate::context::Context;
use crate::error::JsNativeError;
use crate::object::JsObject;
use crate::symbol::JsSymbol;
use crate::value::JsValue;
use crate::JsResult;

/// Which iteration protocol to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IteratorHint {
    /// `@@iterator`.
    Sync,
    /// `@@asyncIterator`, wrapping sync iterators when absent.
    Async,
}

/// An Iterator Record: the iterator object plus its cached `next` method.
///
/// More information:
///  - [ECMAScript reference][spec]
///
/// [spec]: https://tc39.es/ecma262/#sec-iterator-records
#[derive(Debug, Clone)]
pub struct IteratorRecord {
    iterator: JsObject,
    next_method: JsValue,
}

impl IteratorRecord {
    /// Creates a record from its parts.
    pub fn new(iterator: JsObject, next_method: JsValue) -> Self {
        Self {
            iterator,
            next_method,
        }
    }

    /// The iterator object.
    pub fn iterator(&self) -> &JsObject {
        &self.iterator
    }

    /// `IteratorNext ( iteratorRecord [ , value ] )`: calls `next` and
    /// checks the result shape.
    pub fn next(&self, value: Option<JsValue>, context: &mut Context) -> JsResult<JsObject> {
        let result = match &self.next_method {
            JsValue::Object(next) if next.is_callable() => {
                let args: Vec<JsValue> = value.into_iter().collect();
                next.clone()
                    .call(&self.iterator.clone().into(), &args, context)?
            }
            _ => {
                return Err(JsNativeError::typ()
                    .with_message("iterator next is not callable")
                    .into())
            }
        };
        match result {
            JsValue::Object(result) => Ok(result),
            _ => Err(JsNativeError::typ()
                .with_message("iterator result is not an object")
                .into()),
        }
    }

    /// Calls `next` without constraining the result shape; async protocols
    /// await the raw result before unpacking it.
    pub(crate) fn next_raw(&self, context: &mut Context) -> JsResult<JsValue> {
        match &self.next_method {
            JsValue::Object(next) if next.is_callable() => {
                next.clone().call(&self.iterator.clone().into(), &[], context)
            }
            _ => Err(JsNativeError::typ()
                .with_message("iterator next is not callable")
                .into()),
        }
    }

    /// `IteratorStep ( iteratorRecord )`: `None` when the iterator is done,
    /// otherwise the yielded value.
    pub fn step(&self, context: &mut Context) -> JsResult<Option<JsValue>> {
        let result = self.next(None, context)?;
        let done = result.get("done", context)?.to_boolean();
        if done {
            return Ok(None);
        }
        Ok(Some(result.get("value", context)?))
    }

    /// `IteratorClose ( iteratorRecord, completion )`
    ///
    /// Runs `return()` on an abandoned iterator. Errors from the close are
    /// swallowed when `pending_error` signals an exception already in
    /// flight.
    ///
    /// More information:
    ///  - [ECMAScript reference][spec]
    ///
    /// [spec]: https://tc39.es/ecma262/#sec-iteratorclose
    pub fn close(&self, pending_error: bool, context: &mut Context) -> JsResult<()> {
        let mut inner = || -> JsResult<()> {
            let Some(return_method) = self.iterator.get_method("return", context)? else {
                return Ok(());
            };
            let result = return_method.call(&self.iterator.clone().into(), &[], context)?;
            if !pending_error && !result.is_object() {
                return Err(JsNativeError::typ()
                    .with_message("iterator return result is not an object")
                    .into());
            }
            Ok(())
        };
        match inner() {
            Ok(()) => Ok(()),
            Err(_) if pending_error => Ok(()),
            Err(err) => Err(err),
        }
    }
}

impl Finalize for IteratorRecord {}

// SAFETY: the iterator object and the next method are edges.
unsafe impl Trace for IteratorRecord {
    custom_trace!(this, mark, {
        mark(&this.iterator);
        mark(&this.next_method);
    });
}

/// `GetIterator ( obj, kind )`
///
/// More information:
///  - [ECMAScript reference][spec]
///
/// [spec]: https://tc39.es/ecma262/#sec-getiterator
pub fn get_iterator(
    value: &JsValue,
    hint: IteratorHint,
    context: &mut Context,
) -> JsResult<IteratorRecord> {
    let object = value.to_object(context)?;

    if hint == IteratorHint::Async {
        match object.get_method(JsSymbol::async_iterator(), context)? {
            Some(method) => {
                return record_from_method(value, &method, context);
            }
            None => {
                // No async protocol: wrap the sync iterator.
                let sync = get_iterator(value, IteratorHint::Sync, context)?;
                return Ok(AsyncFromSyncIterator::create(sync, context));
            }
        }
    }

    let Some(method) = object.get_method(JsSymbol::iterator(), context)? else {
        return Err(JsNativeError::typ()
            .with_message(format!("{} is not iterable", value.type_of()))
            .into());
    };
    record_from_method(value, &method, context)
}

fn record_from_method(
    value: &JsValue,
    method: &JsObject,
    context: &mut Context,
) -> JsResult<IteratorRecord> {
    let iterator = method.call(value, &[], context)?;
    let Some(iterator) = iterator.as_object().cloned() else {
        return Err(JsNativeError::typ()
            .with_message("iterator is not an object")
            .into());
    };
    let next_method = iterator.get("next", context)?;
    Ok(IteratorRecord::new(iterator, next_method))
}

/// `CreateIterResultObject ( value, done )`
pub fn create_iter_result_object(value: JsValue, done: bool, context: &mut Context) -> JsValue {
    let obj = JsObject::with_object_proto(context);
    obj.create_data_property("value", value, context)
        .expect("fresh ordinary object accepts data properties");
    obj.create_data_property("done", done, context)
        .expect("fresh ordinary object accepts data properties");
    obj.into()
}

/// Splits an iterator result object into `(value, done)`.
pub fn unpack_iter_result(result: &JsValue, context: &mut Context) -> JsResult<(JsValue, bool)> {
    let Some(obj) = result.as_object() else {
        return Err(JsNativeError::typ()
            .with_message("iterator result is not an object")
            .into());
    };
    let obj = obj.clone();
    let done = obj.get("done", context)?.to_boolean();
    let value = obj.get("value", context)?;
    Ok((value, done))
}

/// Collects every value of an iterable into a vector (spread arguments,
/// array spread).
pub fn iterate_to_list(value: &JsValue, context: &mut Context) -> JsResult<Vec<JsValue>> {
    let record = get_iterator(value, IteratorHint::Sync, context)?;
    let mut values = Vec::new();
    while let Some(next) = record.step(context)? {
        values.push(next);
    }
    Ok(values)
}

//! Creation of module namespace objects.

use rustc_hash::FxHashSet;

use super::{Module, ResolvedExport};
use crate::context::Context;
use crate::object::{JsObject, ModuleNamespace, ObjectData};
use crate::property::{PropertyDescriptor, PropertyKey};
use crate::symbol::JsSymbol;
use crate::value::JsValue;

/// `ModuleNamespaceCreate ( module, exports )`
///
/// The export list is sorted and filtered to unambiguous names; the object
/// is frozen by construction (its vtable refuses everything).
pub(super) fn create(module: &Module, context: &mut Context) -> JsObject {
    let mut names = module.exported_names(&mut FxHashSet::default());
    names.retain(|name| {
        matches!(
            module.resolve_export(name, &mut Vec::new()),
            ResolvedExport::Binding { .. } | ResolvedExport::Namespace(_)
        )
    });
    names.sort();

    let namespace = JsObject::from_proto_and_data(
        None,
        ObjectData::module_namespace(ModuleNamespace {
            module: module.clone(),
            exports: names,
        }),
        context,
    );
    namespace.borrow_mut().set_extensible(false);
    namespace.borrow_mut().properties_mut().insert(
        &PropertyKey::Symbol(JsSymbol::to_string_tag()),
        PropertyDescriptor::builder()
            .value(JsValue::from("Module"))
            .writable(false)
            .enumerable(false)
            .configurable(false)
            .build(),
    );
    namespace
}

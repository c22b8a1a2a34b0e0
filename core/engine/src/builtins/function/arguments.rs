//! Creation of `arguments` objects.

use kestrel_gc::{custom_trace, Finalize, Gc, GcRefCell, Trace};

use crate::context::Context;
use crate::environments::DeclarativeEnvironment;
use crate::object::{JsObject, ObjectData};
use crate::property::{PropertyDescriptor, PropertyKey};
use crate::symbol::JsSymbol;
use crate::value::JsValue;

/// The parameter map of a mapped arguments object.
///
/// Index `i` maps to a slot of the function environment while the mapping
/// is alive; severed mappings fall back to the ordinary property.
#[derive(Debug, Clone)]
pub struct MappedArguments {
    env: Gc<DeclarativeEnvironment>,
    slots: Gc<GcRefCell<Vec<Option<u32>>>>,
}

impl MappedArguments {
    /// The environment slot index `index` currently maps to.
    pub(crate) fn slot(&self, index: u32) -> Option<u32> {
        self.slots.borrow().get(index as usize).copied().flatten()
    }

    /// Reads the mapped binding.
    pub(crate) fn get(&self, slot: u32) -> JsValue {
        self.env
            .get_slot(slot, &crate::string::JsString::from("arguments"))
            .unwrap_or_default()
    }

    /// Writes the mapped binding.
    pub(crate) fn set(&self, slot: u32, value: JsValue) {
        self.env.initialize_slot(slot, value);
    }

    /// Severs the mapping for `index`.
    pub(crate) fn unmap(&self, index: u32) {
        if let Some(entry) = self.slots.borrow_mut().get_mut(index as usize) {
            *entry = None;
        }
    }
}

impl Finalize for MappedArguments {}

// SAFETY: the backing environment and the slot table are cells.
unsafe impl Trace for MappedArguments {
    custom_trace!(this, mark, {
        mark(&this.env);
        mark(&this.slots);
    });
}

/// `CreateUnmappedArgumentsObject ( argumentsList )`
///
/// More information:
///  - [ECMAScript reference][spec]
///
/// [spec]: https://tc39.es/ecma262/#sec-createunmappedargumentsobject
pub(crate) fn create_unmapped(args: &[JsValue], context: &mut Context) -> JsObject {
    let proto = context.intrinsics().object_prototype();
    let object = JsObject::from_proto_and_data(Some(proto), ObjectData::arguments(), context);
    fill_common(&object, args, context);
    object
}

/// `CreateMappedArgumentsObject ( func, formals, argumentsList, env )`
///
/// The first `mapped_count` indices re-route through the function scope,
/// whose parameter slots are laid out first by the compiler.
///
/// More information:
///  - [ECMAScript reference][spec]
///
/// [spec]: https://tc39.es/ecma262/#sec-createmappedargumentsobject
pub(crate) fn create_mapped(
    args: &[JsValue],
    mapped_count: usize,
    env: Gc<DeclarativeEnvironment>,
    context: &mut Context,
) -> JsObject {
    let slots: Vec<Option<u32>> = (0..args.len())
        .map(|i| if i < mapped_count { Some(i as u32) } else { None })
        .collect();
    let map = MappedArguments {
        env,
        slots: context.heap().alloc(GcRefCell::new(slots)),
    };
    let proto = context.intrinsics().object_prototype();
    let object =
        JsObject::from_proto_and_data(Some(proto), ObjectData::mapped_arguments(map), context);
    fill_common(&object, args, context);
    object
}

fn fill_common(object: &JsObject, args: &[JsValue], context: &mut Context) {
    {
        let mut borrow = object.borrow_mut();
        let properties = borrow.properties_mut();
        for (i, value) in args.iter().enumerate() {
            properties.insert(
                &PropertyKey::Index(i as u32),
                PropertyDescriptor::builder()
                    .value(value.clone())
                    .writable(true)
                    .enumerable(true)
                    .configurable(true)
                    .build(),
            );
        }
        properties.insert(
            &PropertyKey::from("length"),
            PropertyDescriptor::builder()
                .value(args.len() as i32)
                .writable(true)
                .enumerable(false)
                .configurable(true)
                .build(),
        );
    }
    let values = crate::builtins::array::values_intrinsic(context);
    object.borrow_mut().properties_mut().insert(
        &PropertyKey::Symbol(JsSymbol::iterator()),
        PropertyDescriptor::builder()
            .value(values)
            .writable(true)
            .enumerable(false)
            .configurable(true)
            .build(),
    );
}

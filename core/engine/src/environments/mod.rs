//! Lexical environments.
//!
//! Compiled scopes are slot addressed: the compiler lays every declared
//! binding of a scope into a [`ScopeShape`], activations allocate one value
//! slot per binding, and the interpreter caches `(depth, slot)` pairs after
//! the first resolution. Bindings created at runtime (global `var`s, eval
//! injection) go into a dynamic side table and stay uncacheable, as does
//! anything found through a `with` object.
//!
//! An uninitialized slot is the temporal dead zone: reads throw a
//! `ReferenceError` until `initialize_binding` runs.

mod private;

pub use private::PrivateEnvironment;

use std::rc::Rc;

use kestrel_gc::{custom_trace, Finalize, Gc, GcRefCell, Trace};
use rustc_hash::FxHashMap;

use crate::context::Context;
use crate::error::JsNativeError;
use crate::module::Module;
use crate::object::JsObject;
use crate::property::PropertyDescriptor;
use crate::string::JsString;
use crate::value::JsValue;
use crate::JsResult;

/// A lexical environment: a declarative record or an object record.
#[derive(Debug, Clone)]
pub enum Environment {
    /// Slot-addressed bindings (function, block, module, global).
    Declarative(Gc<DeclarativeEnvironment>),
    /// Bindings backed by an object (`with`).
    Object(Gc<ObjectEnvironment>),
}

/// One declared binding in a compiled scope.
#[derive(Debug, Clone)]
pub struct BindingEntry {
    /// The bound name.
    pub name: JsString,
    /// `false` for `const` and similar immutable bindings.
    pub mutable: bool,
    /// Immutable bindings created in strict code throw on re-assignment
    /// even from sloppy callers.
    pub strict: bool,
}

/// The compile-time layout of a scope: names to slots.
#[derive(Debug, Default)]
pub struct ScopeShape {
    entries: Vec<BindingEntry>,
    map: FxHashMap<JsString, u32>,
}

impl ScopeShape {
    /// Creates a shape from its entries.
    pub fn new(entries: Vec<BindingEntry>) -> Self {
        let map = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name.clone(), i as u32))
            .collect();
        Self { entries, map }
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the scope declares nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The slot of `name`, if declared here.
    pub fn slot(&self, name: &JsString) -> Option<u32> {
        self.map.get(name).copied()
    }

    /// The entry at `slot`.
    pub fn entry(&self, slot: u32) -> &BindingEntry {
        &self.entries[slot as usize]
    }
}

/// A binding created at runtime rather than compiled into the shape.
#[derive(Debug, Clone)]
struct DynamicBinding {
    value: Option<JsValue>,
    mutable: bool,
}

/// The function-specific slots of a function environment.
#[derive(Debug, Clone)]
pub struct FunctionSlots {
    /// `this`, once bound. `None` in a derived constructor before `super()`.
    pub(crate) this: Option<JsValue>,
    /// `true` once `this` is usable.
    pub(crate) this_initialized: bool,
    /// The running function object.
    pub(crate) function_object: JsObject,
    /// `new.target`, when constructing.
    pub(crate) new_target: Option<JsObject>,
}

impl Finalize for FunctionSlots {}

// SAFETY: all slot values are traced.
unsafe impl Trace for FunctionSlots {
    custom_trace!(this, mark, {
        if let Some(value) = &this.this {
            mark(value);
        }
        mark(&this.function_object);
        if let Some(new_target) = &this.new_target {
            mark(new_target);
        }
    });
}

/// Indirect bindings of a module environment: local name to the exporting
/// module and export name (`None` imports the namespace object).
#[derive(Debug, Default)]
pub struct ModuleImports {
    pub(crate) imports: FxHashMap<JsString, (Module, Option<JsString>)>,
}

impl Finalize for ModuleImports {}

// SAFETY: target modules are cells.
unsafe impl Trace for ModuleImports {
    custom_trace!(this, mark, {
        for (module, _) in this.imports.values() {
            mark(module);
        }
    });
}

/// What flavor of declarative environment this is.
#[derive(Debug)]
pub enum DeclarativeKind {
    /// A plain block or catch scope.
    Lexical,
    /// A function scope with `this`/`new.target` slots.
    Function(GcRefCell<FunctionSlots>),
    /// A module scope with import redirections.
    Module(GcRefCell<ModuleImports>),
    /// The global scope, overlaying the global object.
    Global(JsObject),
}

impl Finalize for DeclarativeKind {}

// SAFETY: each kind marks its own edges.
unsafe impl Trace for DeclarativeKind {
    custom_trace!(this, mark, {
        match this {
            DeclarativeKind::Lexical => {}
            DeclarativeKind::Function(slots) => mark(slots),
            DeclarativeKind::Module(imports) => mark(imports),
            DeclarativeKind::Global(global) => mark(global),
        }
    });
}

/// A declarative environment record.
#[derive(Debug)]
pub struct DeclarativeEnvironment {
    kind: DeclarativeKind,
    shape: Rc<ScopeShape>,
    bindings: GcRefCell<Vec<Option<JsValue>>>,
    dynamic: GcRefCell<FxHashMap<JsString, DynamicBinding>>,
    /// Set when a direct eval or `with` below this scope may inject
    /// bindings; resolutions through a poisoned scope are not cached.
    poisoned: std::cell::Cell<bool>,
    outer: Option<Environment>,
}

impl Finalize for DeclarativeEnvironment {}

// SAFETY: slot values, dynamic values, kind slots and the outer chain are
// traced.
unsafe impl Trace for DeclarativeEnvironment {
    custom_trace!(this, mark, {
        mark(&this.kind);
        mark(&this.bindings);
        for binding in this.dynamic.borrow().values() {
            if let Some(value) = &binding.value {
                mark(value);
            }
        }
        if let Some(outer) = &this.outer {
            mark(outer);
        }
    });
}

/// An object environment record (`with`).
#[derive(Debug)]
pub struct ObjectEnvironment {
    pub(crate) object: JsObject,
    outer: Environment,
}

impl Finalize for ObjectEnvironment {}

// SAFETY: the backing object and the outer chain are traced.
unsafe impl Trace for ObjectEnvironment {
    custom_trace!(this, mark, {
        mark(&this.object);
        mark(&this.outer);
    });
}

impl Finalize for Environment {}

// SAFETY: both variants are cells.
unsafe impl Trace for Environment {
    custom_trace!(this, mark, {
        match this {
            Environment::Declarative(env) => mark(env),
            Environment::Object(env) => mark(env),
        }
    });
}

impl DeclarativeEnvironment {
    /// Builds the record without allocating it, for realm bootstrap.
    pub(crate) fn raw(
        kind: DeclarativeKind,
        shape: Rc<ScopeShape>,
        outer: Option<Environment>,
    ) -> Self {
        let bindings = vec![None; shape.len()];
        Self {
            kind,
            shape,
            bindings: GcRefCell::new(bindings),
            dynamic: GcRefCell::new(FxHashMap::default()),
            poisoned: std::cell::Cell::new(false),
            outer,
        }
    }

    /// Creates an activation of a compiled scope.
    pub fn new(
        kind: DeclarativeKind,
        shape: Rc<ScopeShape>,
        outer: Option<Environment>,
        context: &mut Context,
    ) -> Gc<Self> {
        context.heap().alloc(Self::raw(kind, shape, outer))
    }

    /// The kind of the environment.
    pub fn kind(&self) -> &DeclarativeKind {
        &self.kind
    }

    /// The compiled shape of the scope.
    pub fn shape(&self) -> &Rc<ScopeShape> {
        &self.shape
    }

    /// The outer environment.
    pub fn outer(&self) -> Option<Environment> {
        self.outer.clone()
    }

    pub(crate) fn poison(&self) {
        self.poisoned.set(true);
    }

    pub(crate) fn is_poisoned(&self) -> bool {
        self.poisoned.get()
    }

    /// Reads slot `slot`, enforcing the temporal dead zone.
    pub fn get_slot(&self, slot: u32, name: &JsString) -> JsResult<JsValue> {
        self.bindings.borrow()[slot as usize]
            .clone()
            .ok_or_else(|| tdz_error(name))
    }

    /// Writes slot `slot`, enforcing TDZ and immutability.
    pub fn set_slot(&self, slot: u32, value: JsValue, name: &JsString) -> JsResult<()> {
        let entry = self.shape.entry(slot);
        let mut bindings = self.bindings.borrow_mut();
        let binding = &mut bindings[slot as usize];
        if binding.is_none() {
            return Err(tdz_error(name));
        }
        if !entry.mutable {
            return Err(JsNativeError::typ()
                .with_message(format!("Assignment to constant variable '{name}'"))
                .into());
        }
        *binding = Some(value);
        Ok(())
    }

    /// Initializes slot `slot`; the first write that ends the dead zone.
    pub fn initialize_slot(&self, slot: u32, value: JsValue) {
        self.bindings.borrow_mut()[slot as usize] = Some(value);
    }

    /// Returns `true` if the slot was initialized.
    pub fn is_initialized(&self, slot: u32) -> bool {
        self.bindings.borrow()[slot as usize].is_some()
    }

    /// Creates a runtime (dynamic) binding, as direct eval or global `var`
    /// statements do.
    pub fn create_dynamic_binding(&self, name: JsString, mutable: bool) {
        self.dynamic
            .borrow_mut()
            .entry(name)
            .or_insert(DynamicBinding {
                value: None,
                mutable,
            });
    }

    fn dynamic_get(&self, name: &JsString) -> Option<JsResult<JsValue>> {
        let dynamic = self.dynamic.borrow();
        let binding = dynamic.get(name)?;
        Some(binding.value.clone().ok_or_else(|| tdz_error(name)))
    }

    fn dynamic_set(&self, name: &JsString, value: JsValue) -> Option<JsResult<()>> {
        let mut dynamic = self.dynamic.borrow_mut();
        let binding = dynamic.get_mut(name)?;
        if !binding.mutable && binding.value.is_some() {
            return Some(Err(JsNativeError::typ()
                .with_message(format!("Assignment to constant variable '{name}'"))
                .into()));
        }
        binding.value = Some(value);
        Some(Ok(()))
    }

    fn dynamic_initialize(&self, name: &JsString, value: JsValue) -> bool {
        let mut dynamic = self.dynamic.borrow_mut();
        match dynamic.get_mut(name) {
            Some(binding) => {
                binding.value = Some(value);
                true
            }
            None => false,
        }
    }

    /// Copies every slot value into a fresh activation of the same shape.
    ///
    /// This is the per-iteration environment copy of `for` loops with
    /// lexical bindings.
    pub fn copy_activation(&self, context: &mut Context) -> Gc<Self> {
        let bindings = self.bindings.borrow().clone();
        context.heap().alloc(Self {
            kind: DeclarativeKind::Lexical,
            shape: self.shape.clone(),
            bindings: GcRefCell::new(bindings),
            dynamic: GcRefCell::new(FxHashMap::default()),
            poisoned: std::cell::Cell::new(self.poisoned.get()),
            outer: self.outer.clone(),
        })
    }
}

fn tdz_error(name: &JsString) -> crate::error::JsError {
    JsNativeError::reference()
        .with_message(format!("Cannot access '{name}' before initialization"))
        .into()
}

fn unresolved_error(name: &JsString) -> crate::error::JsError {
    JsNativeError::reference()
        .with_message(format!("{name} is not defined"))
        .into()
}

/// The result of resolving a name against an environment chain.
#[derive(Debug, Clone)]
pub enum BindingLocator {
    /// A compiled slot; cacheable unless the walk crossed a dynamic scope.
    Slot {
        /// The defining environment.
        env: Gc<DeclarativeEnvironment>,
        /// Environment hops from the starting scope.
        depth: u16,
        /// The slot inside the defining scope.
        slot: u32,
        /// `false` when a `with` scope or poisoned scope was crossed.
        cacheable: bool,
    },
    /// A dynamic binding in a declarative scope.
    Dynamic {
        /// The defining environment.
        env: Gc<DeclarativeEnvironment>,
    },
    /// An import redirection in a module scope.
    Import {
        /// The module whose environment defines the binding.
        module: Module,
        /// The export name to resolve on every access; `None` reads the
        /// namespace object.
        export: Option<JsString>,
    },
    /// A binding on a `with` object.
    ObjectProp {
        /// The environment whose object carries the property.
        env: Gc<ObjectEnvironment>,
    },
    /// A property of the global object, or unresolved.
    Global,
}

impl Environment {
    /// The outer environment, `None` at the global scope.
    pub fn outer(&self) -> Option<Environment> {
        match self {
            Environment::Declarative(env) => env.outer(),
            Environment::Object(env) => Some(env.outer.clone()),
        }
    }

    /// Creates a `with` environment over `object`.
    pub fn push_object(object: JsObject, outer: Environment, context: &mut Context) -> Environment {
        // Cached resolutions below this point would skip the object scope.
        let mut cursor = Some(outer.clone());
        while let Some(env) = cursor {
            if let Environment::Declarative(decl) = &env {
                decl.poison();
            }
            cursor = env.outer();
        }
        Environment::Object(context.heap().alloc(ObjectEnvironment { object, outer }))
    }

    /// Resolves `name`, walking the chain outward.
    pub fn resolve(&self, name: &JsString, context: &mut Context) -> JsResult<BindingLocator> {
        let mut cacheable = true;
        let mut depth: u16 = 0;
        let mut cursor = Some(self.clone());
        while let Some(env) = cursor {
            match &env {
                Environment::Declarative(decl) => {
                    if decl.is_poisoned() {
                        cacheable = false;
                    }
                    if let DeclarativeKind::Module(imports) = &decl.kind {
                        if let Some((module, export)) = imports.borrow().imports.get(name) {
                            return Ok(BindingLocator::Import {
                                module: module.clone(),
                                export: export.clone(),
                            });
                        }
                    }
                    if let Some(slot) = decl.shape.slot(name) {
                        return Ok(BindingLocator::Slot {
                            env: decl.clone(),
                            depth,
                            slot,
                            cacheable,
                        });
                    }
                    if decl.dynamic.borrow().contains_key(name) {
                        return Ok(BindingLocator::Dynamic { env: decl.clone() });
                    }
                    if let DeclarativeKind::Global(global) = &decl.kind {
                        let _ = global;
                        // Global object properties are resolved dynamically
                        // at access time.
                        return Ok(BindingLocator::Global);
                    }
                }
                Environment::Object(object_env) => {
                    cacheable = false;
                    let has = object_env.object.has_property(
                        crate::property::PropertyKey::from(name.clone()),
                        context,
                    )?;
                    if has {
                        return Ok(BindingLocator::ObjectProp {
                            env: object_env.clone(),
                        });
                    }
                }
            }
            cursor = env.outer();
            depth = depth.saturating_add(1);
        }
        Ok(BindingLocator::Global)
    }

    /// `GetBindingValue`: resolves and reads.
    pub fn get_binding_value(&self, name: &JsString, context: &mut Context) -> JsResult<JsValue> {
        match self.resolve(name, context)? {
            BindingLocator::Slot { env, slot, .. } => env.get_slot(slot, name),
            BindingLocator::Dynamic { env } => env
                .dynamic_get(name)
                .unwrap_or_else(|| Err(unresolved_error(name))),
            BindingLocator::Import { module, export } => match export {
                Some(export) => module.exported_binding_value(&export, context),
                None => Ok(module.namespace(context).into()),
            },
            BindingLocator::ObjectProp { env } => {
                let object = env.object.clone();
                object.get(crate::property::PropertyKey::from(name.clone()), context)
            }
            BindingLocator::Global => {
                let global = context.global_object();
                let key = crate::property::PropertyKey::from(name.clone());
                if global.has_property(key.clone(), context)? {
                    global.get(key, context)
                } else {
                    Err(unresolved_error(name))
                }
            }
        }
    }

    /// `GetBindingValue` for `typeof`: unresolved names read as `undefined`.
    pub fn get_binding_value_or_undefined(
        &self,
        name: &JsString,
        context: &mut Context,
    ) -> JsResult<JsValue> {
        match self.get_binding_value(name, context) {
            Ok(value) => Ok(value),
            Err(err) => {
                if err
                    .as_native()
                    .is_some_and(|native| {
                        native.kind == crate::error::JsNativeErrorKind::Reference
                            && native.message().ends_with("is not defined")
                    })
                {
                    Ok(JsValue::undefined())
                } else {
                    Err(err)
                }
            }
        }
    }

    /// `SetMutableBinding`: resolves and writes.
    pub fn set_mutable_binding(
        &self,
        name: &JsString,
        value: JsValue,
        strict: bool,
        context: &mut Context,
    ) -> JsResult<()> {
        match self.resolve(name, context)? {
            BindingLocator::Slot { env, slot, .. } => env.set_slot(slot, value, name),
            BindingLocator::Dynamic { env } => env
                .dynamic_set(name, value)
                .unwrap_or_else(|| Err(unresolved_error(name))),
            BindingLocator::Import { .. } => Err(JsNativeError::typ()
                .with_message(format!("Assignment to import binding '{name}'"))
                .into()),
            BindingLocator::ObjectProp { env } => {
                let object = env.object.clone();
                object.set(
                    crate::property::PropertyKey::from(name.clone()),
                    value,
                    strict,
                    context,
                )?;
                Ok(())
            }
            BindingLocator::Global => {
                let global = context.global_object();
                let key = crate::property::PropertyKey::from(name.clone());
                if strict && !global.has_property(key.clone(), context)? {
                    return Err(unresolved_error(name));
                }
                global.set(key, value, strict, context)?;
                Ok(())
            }
        }
    }

    /// `InitializeBinding`: the write that ends a dead zone.
    pub fn initialize_binding(
        &self,
        name: &JsString,
        value: JsValue,
        context: &mut Context,
    ) -> JsResult<()> {
        match self.resolve(name, context)? {
            BindingLocator::Slot { env, slot, .. } => {
                env.initialize_slot(slot, value);
                Ok(())
            }
            BindingLocator::Dynamic { env } => {
                env.dynamic_initialize(name, value);
                Ok(())
            }
            BindingLocator::Import { .. } => Err(JsNativeError::typ()
                .with_message(format!("Assignment to import binding '{name}'"))
                .into()),
            BindingLocator::ObjectProp { env } => {
                let object = env.object.clone();
                object.set(
                    crate::property::PropertyKey::from(name.clone()),
                    value,
                    false,
                    context,
                )?;
                Ok(())
            }
            BindingLocator::Global => {
                // Hoisted global `var`s create the property once; re-running
                // a script must not clobber an existing value.
                let global = context.global_object();
                let key = crate::property::PropertyKey::from(name.clone());
                if global.has_property(key.clone(), context)? {
                    return Ok(());
                }
                global.define_property_or_throw(
                    key,
                    PropertyDescriptor::builder()
                        .value(value)
                        .writable(true)
                        .enumerable(true)
                        .configurable(false)
                        .build(),
                    context,
                )
            }
        }
    }

    /// `DeleteBinding`: only object-backed and dynamic bindings are
    /// deletable.
    pub fn delete_binding(&self, name: &JsString, context: &mut Context) -> JsResult<bool> {
        match self.resolve(name, context)? {
            BindingLocator::Slot { .. } | BindingLocator::Import { .. } => Ok(false),
            BindingLocator::Dynamic { env } => {
                env.dynamic.borrow_mut().remove(name);
                Ok(true)
            }
            BindingLocator::ObjectProp { env } => {
                let object = env.object.clone();
                object.__delete__(&crate::property::PropertyKey::from(name.clone()), context)
            }
            BindingLocator::Global => {
                let global = context.global_object();
                global.__delete__(&crate::property::PropertyKey::from(name.clone()), context)
            }
        }
    }

    /// `GetThisEnvironment` followed by `GetThisBinding`.
    pub fn get_this_binding(&self, context: &mut Context) -> JsResult<JsValue> {
        let mut cursor = Some(self.clone());
        while let Some(env) = cursor {
            if let Environment::Declarative(decl) = &env {
                match &decl.kind {
                    DeclarativeKind::Function(slots) => {
                        let slots = slots.borrow();
                        if !slots.this_initialized {
                            return Err(JsNativeError::reference()
                                .with_message(
                                    "must call super constructor before accessing 'this'",
                                )
                                .into());
                        }
                        return Ok(slots.this.clone().unwrap_or_default());
                    }
                    DeclarativeKind::Module(_) => return Ok(JsValue::undefined()),
                    DeclarativeKind::Global(global) => return Ok(global.clone().into()),
                    DeclarativeKind::Lexical => {}
                }
            }
            cursor = env.outer();
        }
        let _ = context;
        Ok(JsValue::undefined())
    }

    /// The function environment slots of the nearest function scope.
    pub(crate) fn function_slots(&self) -> Option<Gc<DeclarativeEnvironment>> {
        let mut cursor = Some(self.clone());
        while let Some(env) = cursor {
            if let Environment::Declarative(decl) = &env {
                if matches!(decl.kind, DeclarativeKind::Function(_)) {
                    return Some(decl.clone());
                }
            }
            cursor = env.outer();
        }
        None
    }

    /// `WithBaseObject`: the `with` object of the innermost object scope
    /// between here and the defining scope of a call target.
    pub fn with_base_object(&self) -> Option<JsObject> {
        match self {
            Environment::Object(env) => Some(env.object.clone()),
            Environment::Declarative(_) => None,
        }
    }
}

impl DeclarativeEnvironment {
    /// The function slots of this environment, if it is a function scope.
    pub(crate) fn as_function_slots(&self) -> Option<&GcRefCell<FunctionSlots>> {
        match &self.kind {
            DeclarativeKind::Function(slots) => Some(slots),
            _ => None,
        }
    }

    /// The import table of this environment, if it is a module scope.
    pub(crate) fn as_module_imports(&self) -> Option<&GcRefCell<ModuleImports>> {
        match &self.kind {
            DeclarativeKind::Module(imports) => Some(imports),
            _ => None,
        }
    }
}

impl FunctionSlots {
    /// Creates uninitialized slots for a constructor activation.
    pub(crate) fn uninitialized(function_object: JsObject, new_target: Option<JsObject>) -> Self {
        Self {
            this: None,
            this_initialized: false,
            function_object,
            new_target,
        }
    }

    /// Creates slots with `this` bound.
    pub(crate) fn bound(
        this: JsValue,
        function_object: JsObject,
        new_target: Option<JsObject>,
    ) -> Self {
        Self {
            this: Some(this),
            this_initialized: true,
            function_object,
            new_target,
        }
    }

    /// `BindThisValue`: a second `super()` call is a `ReferenceError`.
    pub(crate) fn bind_this(&mut self, this: JsValue) -> JsResult<()> {
        if self.this_initialized {
            return Err(JsNativeError::reference()
                .with_message("super constructor called twice")
                .into());
        }
        self.this = Some(this);
        self.this_initialized = true;
        Ok(())
    }
}

//! Source text modules: linking, evaluation and live export bindings.
//!
//! A module advances monotonically through
//! `Unlinked → Linking → Linked → Evaluating → (EvaluatingAsync) →
//! Evaluated`. Linking and evaluation are both depth-first walks over the
//! request graph that compute strongly connected components with the
//! classic dfs-index/dfs-ancestor-index bookkeeping; every member of a
//! cycle advances together, with the cycle root carrying the top-level
//! promise capability. Top-level `await` switches a subgraph to async
//! evaluation: each async module notifies its recorded parents when its
//! body settles, and the cycle root settles the top-level capability once
//! every member has evaluated.

mod namespace;

use std::rc::Rc;

use kestrel_gc::{custom_trace, Finalize, Gc, GcRefCell, Trace};
use log::trace;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::ast;
use crate::builtins::promise::{
    perform_promise_then, PromiseCapability, ReactionHandler,
};
use crate::context::Context;
use crate::environments::{
    DeclarativeEnvironment, DeclarativeKind, Environment, ModuleImports, ScopeShape,
};
use crate::error::{JsError, JsNativeError};
use crate::object::JsObject;
use crate::string::JsString;
use crate::value::JsValue;
use crate::vm::{CodeBlock, CodeBlockFlags, CompletionRecord};
use crate::JsResult;

/// The linking/evaluation state of a module. Transitions are monotone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ModuleStatus {
    /// Compiled, requests not yet linked.
    Unlinked,
    /// In the linking DFS.
    Linking,
    /// Environment created, ready to evaluate.
    Linked,
    /// In the evaluation DFS.
    Evaluating,
    /// Waiting on top-level-await dependencies.
    EvaluatingAsync,
    /// Done (possibly with a stored evaluation error).
    Evaluated,
}

/// One import entry: `import { name as local } from "request"`.
#[derive(Debug, Clone)]
pub struct ImportEntry {
    pub(crate) request: JsString,
    /// `None` imports the namespace object.
    pub(crate) import_name: Option<JsString>,
    pub(crate) local: JsString,
}

/// A local export: `export { local as exported }`.
#[derive(Debug, Clone)]
pub struct LocalExportEntry {
    pub(crate) local: JsString,
    pub(crate) export: JsString,
}

/// A re-export: `export { import as exported } from "request"`.
#[derive(Debug, Clone)]
pub struct IndirectExportEntry {
    pub(crate) request: JsString,
    pub(crate) import: JsString,
    pub(crate) export: JsString,
}

/// The result of `ResolveExport`.
#[derive(Debug, Clone)]
pub(crate) enum ResolvedExport {
    /// A binding in a module's environment.
    Binding {
        /// The defining module.
        module: Module,
        /// The local name in that module.
        local: JsString,
    },
    /// The namespace object of a module (`export * as ns` style requests).
    Namespace(Module),
    /// Two star exports disagree.
    Ambiguous,
    /// No such export.
    NotFound,
}

struct ModuleData {
    specifier: JsString,
    code: Gc<CodeBlock>,
    requests: Vec<JsString>,
    loaded_modules: FxHashMap<JsString, Module>,
    import_entries: Vec<ImportEntry>,
    local_exports: Vec<LocalExportEntry>,
    indirect_exports: Vec<IndirectExportEntry>,
    star_exports: Vec<JsString>,
    environment: Option<Gc<DeclarativeEnvironment>>,
    namespace: Option<JsObject>,
    status: ModuleStatus,
    evaluation_error: Option<JsError>,
    dfs_index: u32,
    dfs_ancestor_index: u32,
    cycle_root: Option<Module>,
    top_level_capability: Option<PromiseCapability>,
    async_evaluation: bool,
    pending_async_dependencies: u32,
    async_parents: Vec<Module>,
}

impl Finalize for ModuleData {}

// SAFETY: code, loaded modules, environment, namespace, capabilities,
// parents and the stored error are all edges of a module record.
unsafe impl Trace for ModuleData {
    custom_trace!(this, mark, {
        mark(&this.code);
        for module in this.loaded_modules.values() {
            mark(module);
        }
        if let Some(environment) = &this.environment {
            mark(environment);
        }
        if let Some(namespace) = &this.namespace {
            mark(namespace);
        }
        if let Some(err) = &this.evaluation_error {
            mark(err);
        }
        if let Some(cycle_root) = &this.cycle_root {
            mark(cycle_root);
        }
        if let Some(capability) = &this.top_level_capability {
            mark(capability);
        }
        mark(&this.async_parents);
    });
}

/// A source text module record.
#[derive(Clone)]
pub struct Module {
    inner: Gc<GcRefCell<ModuleData>>,
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = self.inner.borrow();
        f.debug_struct("Module")
            .field("specifier", &data.specifier)
            .field("status", &data.status)
            .finish_non_exhaustive()
    }
}

impl Finalize for Module {}

// SAFETY: single edge to the record cell.
unsafe impl Trace for Module {
    custom_trace!(this, mark, {
        mark(&this.inner);
    });
}

impl Module {
    /// Compiles an AST module into an unlinked module record.
    pub fn from_ast(
        module: &ast::Module,
        specifier: JsString,
        context: &mut Context,
    ) -> JsResult<Self> {
        let code = crate::bytecompiler::compile_module(module, context)?;

        let mut requests: Vec<JsString> = Vec::new();
        let mut request = |specifier: &JsString, requests: &mut Vec<JsString>| {
            if !requests.contains(specifier) {
                requests.push(specifier.clone());
            }
        };
        let mut import_entries = Vec::new();
        let mut local_exports = Vec::new();
        let mut indirect_exports = Vec::new();
        let mut star_exports = Vec::new();

        for item in &module.items {
            match item {
                ast::ModuleItem::Import(import) => {
                    request(&import.specifier, &mut requests);
                    for binding in &import.bindings {
                        import_entries.push(ImportEntry {
                            request: import.specifier.clone(),
                            import_name: match &binding.import_name {
                                ast::ImportName::Name(name) => Some(name.clone()),
                                ast::ImportName::Namespace => None,
                            },
                            local: binding.local.clone(),
                        });
                    }
                }
                ast::ModuleItem::Export(export) => match export {
                    ast::ExportDeclaration::Declaration(statement) => {
                        for name in declared_names(statement) {
                            local_exports.push(LocalExportEntry {
                                local: name.clone(),
                                export: name,
                            });
                        }
                    }
                    ast::ExportDeclaration::Named { list } => {
                        for (local, export) in list {
                            local_exports.push(LocalExportEntry {
                                local: local.clone(),
                                export: export.clone(),
                            });
                        }
                    }
                    ast::ExportDeclaration::NamedFrom { list, specifier } => {
                        request(specifier, &mut requests);
                        for (import, export) in list {
                            indirect_exports.push(IndirectExportEntry {
                                request: specifier.clone(),
                                import: import.clone(),
                                export: export.clone(),
                            });
                        }
                    }
                    ast::ExportDeclaration::StarFrom { specifier } => {
                        request(specifier, &mut requests);
                        star_exports.push(specifier.clone());
                    }
                    ast::ExportDeclaration::Default(_) => {
                        local_exports.push(LocalExportEntry {
                            local: JsString::from("*default*"),
                            export: JsString::from("default"),
                        });
                    }
                },
                ast::ModuleItem::Statement(_) => {}
            }
        }

        Ok(Self {
            inner: context.heap().alloc(GcRefCell::new(ModuleData {
                specifier,
                code,
                requests,
                loaded_modules: FxHashMap::default(),
                import_entries,
                local_exports,
                indirect_exports,
                star_exports,
                environment: None,
                namespace: None,
                status: ModuleStatus::Unlinked,
                evaluation_error: None,
                dfs_index: 0,
                dfs_ancestor_index: 0,
                cycle_root: None,
                top_level_capability: None,
                async_evaluation: false,
                pending_async_dependencies: 0,
                async_parents: Vec::new(),
            })),
        })
    }

    /// The specifier the module was registered under.
    pub fn specifier(&self) -> JsString {
        self.inner.borrow().specifier.clone()
    }

    /// The current status.
    pub fn status(&self) -> ModuleStatus {
        self.inner.borrow().status
    }

    fn set_status(&self, status: ModuleStatus) {
        let mut data = self.inner.borrow_mut();
        debug_assert!(
            status >= data.status || status == ModuleStatus::Unlinked,
            "module status never regresses"
        );
        data.status = status;
    }

    fn ptr_eq(a: &Self, b: &Self) -> bool {
        Gc::ptr_eq(&a.inner, &b.inner)
    }

    /// Resolves and records every requested module, transitively.
    ///
    /// This is the loading phase; resolution goes through the context's
    /// registry and host resolver.
    pub fn load(&self, context: &mut Context) -> JsResult<()> {
        let (specifier, requests) = {
            let data = self.inner.borrow();
            (data.specifier.clone(), data.requests.clone())
        };
        for request in requests {
            let already = self.inner.borrow().loaded_modules.contains_key(&request);
            if already {
                continue;
            }
            let required = context.resolve_module(Some(&specifier), &request)?;
            self.inner
                .borrow_mut()
                .loaded_modules
                .insert(request.clone(), required.clone());
            required.load(context)?;
        }
        Ok(())
    }

    fn loaded(&self, request: &JsString) -> Module {
        self.inner
            .borrow()
            .loaded_modules
            .get(request)
            .cloned()
            .expect("loading completed before linking")
    }

    /// `Link ( )`
    ///
    /// More information:
    ///  - [ECMAScript reference][spec]
    ///
    /// [spec]: https://tc39.es/ecma262/#sec-moduledeclarationlinking
    pub fn link(&self, context: &mut Context) -> JsResult<()> {
        let status = self.status();
        if status >= ModuleStatus::Linked {
            return Ok(());
        }
        let mut stack = Vec::new();
        match self.inner_link(&mut stack, 0, context) {
            Ok(_) => Ok(()),
            Err(err) => {
                for module in stack {
                    module.set_status_force_unlinked();
                }
                Err(err)
            }
        }
    }

    fn set_status_force_unlinked(&self) {
        self.inner.borrow_mut().status = ModuleStatus::Unlinked;
    }

    /// `InnerModuleLinking ( module, stack, index )`
    fn inner_link(
        &self,
        stack: &mut Vec<Module>,
        mut index: u32,
        context: &mut Context,
    ) -> JsResult<u32> {
        {
            let data = self.inner.borrow();
            match data.status {
                ModuleStatus::Linking
                | ModuleStatus::Linked
                | ModuleStatus::Evaluating
                | ModuleStatus::EvaluatingAsync
                | ModuleStatus::Evaluated => return Ok(index),
                ModuleStatus::Unlinked => {}
            }
        }
        {
            let mut data = self.inner.borrow_mut();
            data.status = ModuleStatus::Linking;
            data.dfs_index = index;
            data.dfs_ancestor_index = index;
        }
        index += 1;
        stack.push(self.clone());
        trace!("linking module '{}'", self.specifier());

        let requests = self.inner.borrow().requests.clone();
        for request in requests {
            let required = self.loaded(&request);
            index = required.inner_link(stack, index, context)?;
            let required_status = required.status();
            if required_status == ModuleStatus::Linking {
                let ancestor = required.inner.borrow().dfs_ancestor_index;
                let mut data = self.inner.borrow_mut();
                data.dfs_ancestor_index = data.dfs_ancestor_index.min(ancestor);
            }
        }

        self.initialize_environment(context)?;

        let (dfs_index, dfs_ancestor_index) = {
            let data = self.inner.borrow();
            (data.dfs_index, data.dfs_ancestor_index)
        };
        debug_assert!(dfs_ancestor_index <= dfs_index);
        if dfs_ancestor_index == dfs_index {
            // This module is a cycle root: the whole component links
            // together.
            loop {
                let member = stack.pop().expect("the module itself is on the stack");
                member.set_status(ModuleStatus::Linked);
                if Module::ptr_eq(&member, self) {
                    break;
                }
            }
        }
        Ok(index)
    }

    /// `InitializeEnvironment ( )`: creates the module environment, wires
    /// import redirections and hoists function declarations' slots.
    fn initialize_environment(&self, context: &mut Context) -> JsResult<()> {
        // Indirect exports must resolve.
        let indirect = self.inner.borrow().indirect_exports.clone();
        for entry in &indirect {
            let required = self.loaded(&entry.request);
            match required.resolve_export(&entry.import, &mut Vec::new()) {
                ResolvedExport::Binding { .. } | ResolvedExport::Namespace(_) => {}
                ResolvedExport::Ambiguous => {
                    return Err(JsNativeError::syntax()
                        .with_message(format!(
                            "ambiguous indirect export '{}' in module '{}'",
                            entry.export,
                            self.specifier()
                        ))
                        .into())
                }
                ResolvedExport::NotFound => {
                    return Err(JsNativeError::syntax()
                        .with_message(format!(
                            "module '{}' does not export '{}'",
                            entry.request, entry.import
                        ))
                        .into())
                }
            }
        }

        let shape = self
            .inner
            .borrow()
            .code
            .scopes
            .first()
            .cloned()
            .unwrap_or_else(|| Rc::new(ScopeShape::default()));

        let mut imports = ModuleImports::default();
        let import_entries = self.inner.borrow().import_entries.clone();
        for entry in import_entries {
            let required = self.loaded(&entry.request);
            match &entry.import_name {
                None => {
                    imports
                        .imports
                        .insert(entry.local.clone(), (required, None));
                }
                Some(import_name) => {
                    match required.resolve_export(import_name, &mut Vec::new()) {
                        ResolvedExport::Binding { module, local } => {
                            imports
                                .imports
                                .insert(entry.local.clone(), (module, Some(local)));
                        }
                        ResolvedExport::Namespace(module) => {
                            imports.imports.insert(entry.local.clone(), (module, None));
                        }
                        ResolvedExport::Ambiguous | ResolvedExport::NotFound => {
                            return Err(JsNativeError::syntax()
                                .with_message(format!(
                                    "module '{}' does not export '{}'",
                                    entry.request, import_name
                                ))
                                .into())
                        }
                    }
                }
            }
        }

        let environment = DeclarativeEnvironment::new(
            DeclarativeKind::Module(GcRefCell::new(imports)),
            shape,
            Some(context.realm().global_environment()),
            context,
        );
        self.inner.borrow_mut().environment = Some(environment);
        Ok(())
    }

    /// `ResolveExport ( exportName, resolveSet )`
    ///
    /// More information:
    ///  - [ECMAScript reference][spec]
    ///
    /// [spec]: https://tc39.es/ecma262/#sec-resolveexport
    pub(crate) fn resolve_export(
        &self,
        export_name: &JsString,
        resolve_set: &mut Vec<(Module, JsString)>,
    ) -> ResolvedExport {
        // Circularity check.
        if resolve_set
            .iter()
            .any(|(m, n)| Module::ptr_eq(m, self) && n == export_name)
        {
            return ResolvedExport::NotFound;
        }
        resolve_set.push((self.clone(), export_name.clone()));

        {
            let data = self.inner.borrow();
            for entry in &data.local_exports {
                if &entry.export == export_name {
                    return ResolvedExport::Binding {
                        module: self.clone(),
                        local: entry.local.clone(),
                    };
                }
            }
        }
        let indirect = self.inner.borrow().indirect_exports.clone();
        for entry in indirect {
            if &entry.export == export_name {
                let required = self.loaded(&entry.request);
                return required.resolve_export(&entry.import, resolve_set);
            }
        }
        if export_name == "default" {
            return ResolvedExport::NotFound;
        }

        // Star exports: every provider must agree.
        let mut star_resolution: Option<ResolvedExport> = None;
        let star_exports = self.inner.borrow().star_exports.clone();
        for request in star_exports {
            let required = self.loaded(&request);
            match required.resolve_export(export_name, resolve_set) {
                ResolvedExport::Ambiguous => return ResolvedExport::Ambiguous,
                ResolvedExport::NotFound => {}
                resolution => match &star_resolution {
                    None => star_resolution = Some(resolution),
                    Some(existing) => {
                        let same = match (existing, &resolution) {
                            (
                                ResolvedExport::Binding { module: a, local: x },
                                ResolvedExport::Binding { module: b, local: y },
                            ) => Module::ptr_eq(a, b) && x == y,
                            (ResolvedExport::Namespace(a), ResolvedExport::Namespace(b)) => {
                                Module::ptr_eq(a, b)
                            }
                            _ => false,
                        };
                        if !same {
                            return ResolvedExport::Ambiguous;
                        }
                    }
                },
            }
        }
        star_resolution.unwrap_or(ResolvedExport::NotFound)
    }

    /// The sorted export names visible on the namespace object.
    pub(crate) fn exported_names(&self, visited: &mut FxHashSet<usize>) -> Vec<JsString> {
        if !visited.insert(self.inner.addr()) {
            return Vec::new();
        }
        let mut names: Vec<JsString> = Vec::new();
        {
            let data = self.inner.borrow();
            names.extend(data.local_exports.iter().map(|e| e.export.clone()));
            names.extend(data.indirect_exports.iter().map(|e| e.export.clone()));
        }
        let star_exports = self.inner.borrow().star_exports.clone();
        for request in star_exports {
            let required = self.loaded(&request);
            for name in required.exported_names(visited) {
                if name != "default" && !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// The module namespace exotic object, created on first request.
    pub fn namespace(&self, context: &mut Context) -> JsObject {
        if let Some(namespace) = self.inner.borrow().namespace.clone() {
            return namespace;
        }
        let namespace = namespace::create(self, context);
        self.inner.borrow_mut().namespace = Some(namespace.clone());
        namespace
    }

    /// Reads the live value of an exported (or imported) binding.
    ///
    /// A binding read before its defining module's environment exists (a
    /// linked but unevaluated cycle member) throws the diagnostic
    /// `ReferenceError` for import-before-initialization.
    pub(crate) fn exported_binding_value(
        &self,
        export_name: &JsString,
        context: &mut Context,
    ) -> JsResult<JsValue> {
        match self.resolve_export(export_name, &mut Vec::new()) {
            ResolvedExport::Binding { module, local } => {
                module.local_binding_value(&local, context)
            }
            ResolvedExport::Namespace(module) => Ok(module.namespace(context).into()),
            ResolvedExport::Ambiguous | ResolvedExport::NotFound => {
                Err(JsNativeError::reference()
                    .with_message(format!(
                        "module '{}' has no resolvable export '{export_name}'",
                        self.specifier()
                    ))
                    .into())
            }
        }
    }

    fn local_binding_value(&self, local: &JsString, _context: &mut Context) -> JsResult<JsValue> {
        let data = self.inner.borrow();
        let Some(environment) = &data.environment else {
            return Err(JsNativeError::reference()
                .with_message(format!(
                    "cannot access binding '{local}' of module '{}': its environment does not exist yet",
                    data.specifier
                ))
                .into());
        };
        let Some(slot) = environment.shape().slot(local) else {
            return Err(JsNativeError::reference()
                .with_message(format!(
                    "module '{}' has no binding named '{local}'",
                    data.specifier
                ))
                .into());
        };
        environment.get_slot(slot, local)
    }

    /// `Evaluate ( )`: returns the evaluation promise.
    ///
    /// More information:
    ///  - [ECMAScript reference][spec]
    ///
    /// [spec]: https://tc39.es/ecma262/#sec-moduleevaluation
    pub fn evaluate(&self, context: &mut Context) -> JsObject {
        // Re-evaluations funnel through the cycle root.
        let module = {
            let data = self.inner.borrow();
            match data.status {
                ModuleStatus::EvaluatingAsync | ModuleStatus::Evaluated => {
                    data.cycle_root.clone().unwrap_or_else(|| self.clone())
                }
                _ => self.clone(),
            }
        };
        if let Some(capability) = module.inner.borrow().top_level_capability.clone() {
            return capability.promise().clone();
        }

        let capability = PromiseCapability::new_intrinsic(context);
        module.inner.borrow_mut().top_level_capability = Some(capability.clone());

        let mut stack = Vec::new();
        match module.inner_evaluate(&mut stack, 0, context) {
            Err(err) => {
                for member in stack {
                    member.set_status(ModuleStatus::Evaluated);
                    member.inner.borrow_mut().evaluation_error = Some(err.clone());
                }
                let _ = capability.reject_with_error(&err, context);
            }
            Ok(_) => {
                let async_evaluation = module.inner.borrow().async_evaluation;
                if !async_evaluation {
                    debug_assert_eq!(module.status(), ModuleStatus::Evaluated);
                    let _ = capability.resolve_with(JsValue::undefined(), context);
                }
                debug_assert!(stack.is_empty());
            }
        }
        capability.promise().clone()
    }

    /// Loads, links and evaluates in one step.
    pub fn load_link_evaluate(&self, context: &mut Context) -> JsResult<JsObject> {
        self.load(context)?;
        self.link(context)?;
        Ok(self.evaluate(context))
    }

    /// `InnerModuleEvaluation ( module, stack, index )`
    fn inner_evaluate(
        &self,
        stack: &mut Vec<Module>,
        mut index: u32,
        context: &mut Context,
    ) -> JsResult<u32> {
        {
            let data = self.inner.borrow();
            match data.status {
                ModuleStatus::EvaluatingAsync | ModuleStatus::Evaluated => {
                    return match &data.evaluation_error {
                        Some(err) => Err(err.clone()),
                        None => Ok(index),
                    };
                }
                ModuleStatus::Evaluating => return Ok(index),
                ModuleStatus::Linked => {}
                _ => {
                    return Err(JsNativeError::typ()
                        .with_message("module evaluated before linking")
                        .into())
                }
            }
        }
        {
            let mut data = self.inner.borrow_mut();
            data.status = ModuleStatus::Evaluating;
            data.dfs_index = index;
            data.dfs_ancestor_index = index;
            data.pending_async_dependencies = 0;
            data.async_evaluation = false;
        }
        index += 1;
        stack.push(self.clone());
        trace!("evaluating module '{}'", self.specifier());

        let requests = self.inner.borrow().requests.clone();
        for request in requests {
            let mut required = self.loaded(&request);
            index = required.inner_evaluate(stack, index, context)?;
            let required_status = required.status();
            if required_status == ModuleStatus::Evaluating {
                let ancestor = required.inner.borrow().dfs_ancestor_index;
                let mut data = self.inner.borrow_mut();
                data.dfs_ancestor_index = data.dfs_ancestor_index.min(ancestor);
            } else {
                required = {
                    let data = required.inner.borrow();
                    data.cycle_root.clone().unwrap_or_else(|| required.clone())
                };
                let data = required.inner.borrow();
                if let Some(err) = &data.evaluation_error {
                    return Err(err.clone());
                }
            }
            let required_async = required.inner.borrow().async_evaluation;
            if required_async {
                let mut data = self.inner.borrow_mut();
                data.pending_async_dependencies += 1;
                drop(data);
                required.inner.borrow_mut().async_parents.push(self.clone());
            }
        }

        let (pending, has_tla) = {
            let data = self.inner.borrow();
            (
                data.pending_async_dependencies,
                data.code.flags.contains(CodeBlockFlags::ASYNC),
            )
        };
        if pending > 0 || has_tla {
            self.inner.borrow_mut().async_evaluation = true;
            if pending == 0 {
                self.execute_async(context)?;
            }
        } else {
            self.execute_sync(context)?;
        }

        let (dfs_index, dfs_ancestor_index) = {
            let data = self.inner.borrow();
            (data.dfs_index, data.dfs_ancestor_index)
        };
        if dfs_ancestor_index == dfs_index {
            loop {
                let member = stack.pop().expect("the module itself is on the stack");
                let async_member = member.inner.borrow().async_evaluation;
                member.set_status(if async_member {
                    ModuleStatus::EvaluatingAsync
                } else {
                    ModuleStatus::Evaluated
                });
                member.inner.borrow_mut().cycle_root = Some(self.clone());
                if Module::ptr_eq(&member, self) {
                    break;
                }
            }
        }
        Ok(index)
    }

    fn body_frame(&self) -> crate::vm::CallFrame {
        let data = self.inner.borrow();
        let environment = Environment::Declarative(
            data.environment
                .clone()
                .expect("linked modules have an environment"),
        );
        crate::vm::CallFrame::new(
            data.code.clone(),
            None,
            environment.clone(),
            environment,
            None,
            Vec::new(),
        )
    }

    /// Runs a synchronous module body to completion.
    fn execute_sync(&self, context: &mut Context) -> JsResult<()> {
        let frame = self.body_frame();
        context.vm.push_frame(frame);
        let record = crate::vm::run(context);
        context.vm.pop_frame();
        match record {
            CompletionRecord::Normal(_) => Ok(()),
            CompletionRecord::Throw(err) => Err(err),
            _ => Err(JsNativeError::typ()
                .with_message("synchronous module body suspended")
                .into()),
        }
    }

    /// `ExecuteAsyncModule ( module )`: starts the body and wires its
    /// settlement back into the module graph.
    fn execute_async(&self, context: &mut Context) -> JsResult<()> {
        let capability = PromiseCapability::new_intrinsic(context);
        let frame = self.body_frame();
        crate::builtins::async_function::drive_frame(frame, capability.clone(), context)?;
        perform_promise_then(
            capability.promise(),
            Some(ReactionHandler::Module(self.clone())),
            Some(ReactionHandler::Module(self.clone())),
            None,
            context,
        );
        Ok(())
    }

    /// `AsyncModuleExecutionFulfilled ( module )`
    pub(crate) fn async_execution_fulfilled(&self, context: &mut Context) -> JsResult<()> {
        {
            let data = self.inner.borrow();
            if data.status == ModuleStatus::Evaluated {
                return Ok(());
            }
            debug_assert!(data.async_evaluation);
        }
        {
            let mut data = self.inner.borrow_mut();
            data.async_evaluation = false;
            data.status = ModuleStatus::Evaluated;
        }
        let capability = self.inner.borrow().top_level_capability.clone();
        if let Some(capability) = capability {
            capability.resolve_with(JsValue::undefined(), context)?;
        }

        let parents = std::mem::take(&mut self.inner.borrow_mut().async_parents);
        for parent in parents {
            let ready = {
                let mut data = parent.inner.borrow_mut();
                data.pending_async_dependencies =
                    data.pending_async_dependencies.saturating_sub(1);
                data.pending_async_dependencies == 0 && data.evaluation_error.is_none()
            };
            if !ready {
                continue;
            }
            let has_tla = parent
                .inner
                .borrow()
                .code
                .flags
                .contains(CodeBlockFlags::ASYNC);
            if has_tla {
                parent.execute_async(context)?;
            } else {
                match parent.execute_sync(context) {
                    Ok(()) => parent.async_execution_fulfilled(context)?,
                    Err(err) => parent.async_execution_rejected(err, context),
                }
            }
        }
        Ok(())
    }

    /// `AsyncModuleExecutionRejected ( module, error )`
    pub(crate) fn async_execution_rejected(&self, err: JsError, context: &mut Context) {
        {
            let data = self.inner.borrow();
            if data.status == ModuleStatus::Evaluated {
                return;
            }
        }
        {
            let mut data = self.inner.borrow_mut();
            data.async_evaluation = false;
            data.status = ModuleStatus::Evaluated;
            data.evaluation_error = Some(err.clone());
        }
        let parents = std::mem::take(&mut self.inner.borrow_mut().async_parents);
        for parent in parents {
            parent.async_execution_rejected(err.clone(), context);
        }
        let capability = self.inner.borrow().top_level_capability.clone();
        if let Some(capability) = capability {
            let _ = capability.reject_with_error(&err, context);
        }
    }
}

/// The names declared by an exported declaration statement.
fn declared_names(statement: &ast::Statement) -> Vec<JsString> {
    match &statement.kind {
        ast::StatementKind::Var(declarators)
        | ast::StatementKind::Let(declarators)
        | ast::StatementKind::Const(declarators) => declarators
            .iter()
            .flat_map(|d| crate::bytecompiler::binding_names(&d.binding))
            .collect(),
        ast::StatementKind::Function(node) => node.name.iter().cloned().collect(),
        ast::StatementKind::Class(node) => node.name.iter().cloned().collect(),
        _ => Vec::new(),
    }
}

//! The execution context: one engine instance.
//!
//! A [`Context`] owns the heap, the interpreter state, the realm, the job
//! queue and the module registry. Every engine operation takes `&mut
//! Context`; there is no process-wide state, so multiple contexts coexist
//! freely (each confined to one thread).

pub mod intrinsics;

use kestrel_gc::{custom_trace, Finalize, Heap, Trace};
use rustc_hash::FxHashMap;

use crate::ast;
use crate::error::JsNativeError;
use crate::job::JobQueue;
use crate::module::Module;
use crate::object::JsObject;
use crate::realm::Realm;
use crate::string::JsString;
use crate::value::JsValue;
use crate::vm::Vm;
use crate::JsResult;

use self::intrinsics::Intrinsics;

/// Resolves a module specifier to a module record.
///
/// The referrer is the requesting module's specifier, or `None` for the
/// host entry point.
pub type ModuleResolverFn =
    fn(&mut Context, referrer: Option<&JsString>, specifier: &JsString) -> JsResult<Module>;

/// Evaluates source text on behalf of `eval`.
///
/// Installed by hosts that embed a parser; without one, `eval` throws.
pub type EvalHookFn =
    fn(&mut Context, source: &JsString, direct: bool, strict: bool) -> JsResult<JsValue>;

/// Observes promise rejections that reach the end of a job drain without a
/// handler.
pub type RejectionTrackerFn = fn(&mut Context, promise: &JsObject, reason: &JsValue);

/// An ECMAScript engine instance.
pub struct Context {
    pub(crate) heap: Heap,
    pub(crate) vm: Vm,
    realm: Realm,
    pub(crate) jobs: JobQueue,
    pub(crate) modules: FxHashMap<JsString, Module>,
    pub(crate) module_resolver: Option<ModuleResolverFn>,
    pub(crate) eval_hook: Option<EvalHookFn>,
    pub(crate) rejection_tracker: Option<RejectionTrackerFn>,
    retained: Vec<JsValue>,
    pub(crate) call_depth: usize,
    pub(crate) recursion_limit: usize,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Creates a context with a fresh realm.
    pub fn new() -> Self {
        let mut heap = Heap::new();
        let realm = Realm::allocate(&mut heap);
        let mut context = Self {
            heap,
            vm: Vm::new(),
            realm,
            jobs: JobQueue::new(),
            modules: FxHashMap::default(),
            module_resolver: None,
            eval_hook: None,
            rejection_tracker: None,
            retained: Vec::new(),
            call_depth: 0,
            recursion_limit: 512,
        };
        crate::builtins::initialize(&mut context);
        context
    }

    /// The heap of the context.
    pub fn heap(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// The active realm.
    pub fn realm(&self) -> &Realm {
        &self.realm
    }

    /// The intrinsics of the active realm.
    pub fn intrinsics(&self) -> Intrinsics {
        self.realm.intrinsics().clone()
    }

    /// The global object of the active realm.
    pub fn global_object(&self) -> JsObject {
        self.realm.global_object()
    }

    /// Compiles and runs a script in the active realm.
    ///
    /// The returned value is the script's completion value. Jobs spawned by
    /// the script (promise reactions, module evaluation) are *not* drained;
    /// call [`Context::run_jobs`] afterwards.
    pub fn eval_script(&mut self, script: &ast::Script) -> JsResult<JsValue> {
        let code = crate::bytecompiler::compile_script(script, self)?;
        crate::vm::execute_script(code, self)
    }

    /// Compiles and runs a script, then drains the job queue.
    pub fn eval_script_with_jobs(&mut self, script: &ast::Script) -> JsResult<JsValue> {
        let result = self.eval_script(script)?;
        self.run_jobs()?;
        Ok(result)
    }

    /// Runs queued jobs until the queue is empty.
    ///
    /// Reports promises still rejected without a handler to the rejection
    /// tracker once the queue drains.
    pub fn run_jobs(&mut self) -> JsResult<()> {
        crate::job::run_jobs(self)
    }

    /// Runs a full garbage collection with the context's own state as the
    /// root set.
    ///
    /// Values held by the host across this call must be protected with
    /// [`Context::retain`].
    pub fn collect_garbage(&mut self) {
        let Self {
            heap,
            vm,
            realm,
            jobs,
            modules,
            retained,
            ..
        } = self;
        let roots = ContextRoots {
            vm,
            realm,
            jobs,
            modules,
            retained,
        };
        heap.collect(&roots);
    }

    /// Collects when the heap reports pressure. Called by the interpreter at
    /// safe points.
    pub(crate) fn maybe_collect(&mut self) {
        if self.heap.should_collect() {
            self.collect_garbage();
        }
    }

    /// Roots `value` for the lifetime of the context (or until
    /// [`Context::release`]).
    pub fn retain(&mut self, value: JsValue) {
        self.retained.push(value);
    }

    /// Drops every root previously retained for the host.
    pub fn release_retained(&mut self) {
        self.retained.clear();
    }

    /// Registers a module under a specifier, making it resolvable by
    /// `import`.
    pub fn register_module(&mut self, specifier: JsString, module: Module) {
        self.modules.insert(specifier, module);
    }

    /// Looks up a registered module.
    pub fn module(&self, specifier: &JsString) -> Option<Module> {
        self.modules.get(specifier).cloned()
    }

    /// Installs the host's module resolver.
    pub fn set_module_resolver(&mut self, resolver: ModuleResolverFn) {
        self.module_resolver = Some(resolver);
    }

    /// Installs the host's `eval` implementation.
    pub fn set_eval_hook(&mut self, hook: EvalHookFn) {
        self.eval_hook = Some(hook);
    }

    /// Installs the unhandled-rejection observer.
    pub fn set_rejection_tracker(&mut self, tracker: RejectionTrackerFn) {
        self.rejection_tracker = Some(tracker);
    }

    /// Resolves `specifier` through the registry, then the host resolver.
    pub(crate) fn resolve_module(
        &mut self,
        referrer: Option<&JsString>,
        specifier: &JsString,
    ) -> JsResult<Module> {
        if let Some(module) = self.modules.get(specifier) {
            return Ok(module.clone());
        }
        if let Some(resolver) = self.module_resolver {
            return resolver(self, referrer, specifier);
        }
        Err(JsNativeError::typ()
            .with_message(format!("cannot resolve module '{specifier}'"))
            .into())
    }

    /// Guards the native recursion the interpreter performs for nested
    /// calls.
    pub(crate) fn enter_call(&mut self) -> JsResult<CallGuard> {
        if self.call_depth >= self.recursion_limit {
            return Err(JsNativeError::range()
                .with_message("Maximum call stack size exceeded")
                .into());
        }
        self.call_depth += 1;
        Ok(CallGuard)
    }

    pub(crate) fn exit_call(&mut self) {
        debug_assert!(self.call_depth > 0);
        self.call_depth -= 1;
    }
}

/// Token proving the call depth was bumped; callers pair it with
/// [`Context::exit_call`].
pub(crate) struct CallGuard;

struct ContextRoots<'a> {
    vm: &'a Vm,
    realm: &'a Realm,
    jobs: &'a JobQueue,
    modules: &'a FxHashMap<JsString, Module>,
    retained: &'a Vec<JsValue>,
}

impl Finalize for ContextRoots<'_> {}

// SAFETY: the root set of a collection: interpreter stacks, the realm, the
// queued jobs, the module registry and host-retained values.
unsafe impl Trace for ContextRoots<'_> {
    custom_trace!(this, mark, {
        mark(this.vm);
        mark(this.realm);
        mark(this.jobs);
        for module in this.modules.values() {
            mark(module);
        }
        mark(this.retained);
    });
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("call_depth", &self.call_depth)
            .finish_non_exhaustive()
    }
}

//! Process-wide engine singleton and lifecycle.
//!
//! One guest interpreter serves the whole process. It moves through
//! `Uninitialized -> Initializing -> Ready -> ShuttingDown -> Shutdown`
//! exactly once; `initialize` and `shutdown` are idempotent, and every
//! other operation fails fast with EngineUnavailable outside Ready.
//!
//! All interpreter access funnels through `Engine::enter`, which takes
//! the re-entrant execution lock, drains the deferred release queues,
//! and only then touches guest state. That discipline is what makes the
//! `unsafe impl Send/Sync` on the interpreter cell sound.

use std::cell::{Cell, RefCell};
use std::hash::Hasher;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use hashbrown::HashMap;
use pyweb_core::{
    BridgeValue, DomHost, EmbedError, EmbedResult, ForeignObject, ResourceLimits, ScriptOrigin,
    SecurityPolicy,
};
use rustpython_vm::builtins::{PyCode, PyDictRef, PyInt, PyStr};
use rustpython_vm::compiler::Mode;
use rustpython_vm::scope::Scope;
use rustpython_vm::{Interpreter, PyRef, Settings, VirtualMachine};

use crate::exec_lock::ExecLock;
use crate::foreign::ForeignRegistry;
use crate::sandbox::{SharedDom, SharedPolicy};
use crate::{bridge, foreign, guest_error, limits, sandbox};

const STATE_UNINITIALIZED: u8 = 0;
const STATE_INITIALIZING: u8 = 1;
const STATE_READY: u8 = 2;
const STATE_SHUTTING_DOWN: u8 = 3;
const STATE_SHUTDOWN: u8 = 4;

static STATE: AtomicU8 = AtomicU8::new(STATE_UNINITIALIZED);
static LIFECYCLE: Mutex<()> = Mutex::new(());
static ENGINE: OnceLock<Engine> = OnceLock::new();

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Initializing,
    Ready,
    ShuttingDown,
    Shutdown,
}

/// Startup configuration. The policy seeds the process-wide capability
/// tables; it can be adjusted later through the engine's mutators.
#[derive(Default)]
pub struct EngineConfig {
    pub policy: SecurityPolicy,
}

pub type ExceptionReporter = Box<dyn Fn(&EmbedError) + Send + Sync>;

/// One execution namespace. Each script unit and subinterpreter owns
/// exactly one; nothing is shared between namespaces except the
/// interpreter itself. Scripts run with locals aliased to globals, the
/// ordinary module-level semantics, so a top-level `def` is visible to
/// the bodies of other functions in the same namespace.
#[derive(Clone)]
pub(crate) struct Namespace {
    pub(crate) globals: PyDictRef,
}

impl Namespace {
    fn new(vm: &VirtualMachine) -> Self {
        Namespace {
            globals: vm.ctx.new_dict(),
        }
    }

    pub(crate) fn scope(&self) -> Scope {
        Scope::new(None, self.globals.clone())
    }
}

pub(crate) type CodeKey = (String, u64);

struct SubState {
    namespace: Namespace,
    origin: ScriptOrigin,
}

/// Guest-side tables. Only ever borrowed inside `Engine::enter`, so the
/// RefCells can never be contended; borrows are kept short so host
/// functions invoked by running guest code can re-borrow.
pub(crate) struct Registries {
    pub(crate) foreign: RefCell<ForeignRegistry>,
    /// The builtin table as it was before any sandbox swap.
    pub(crate) pristine_builtins: RefCell<Option<PyDictRef>>,
    /// Restricted builtin tables currently swapped in, innermost last.
    pub(crate) sandbox_stack: RefCell<Vec<PyDictRef>>,
    code_cache: RefCell<HashMap<CodeKey, PyRef<PyCode>>>,
    namespaces: RefCell<HashMap<u64, Namespace>>,
    subinterpreters: RefCell<HashMap<u64, SubState>>,
    main: RefCell<Option<Namespace>>,
    next_namespace_id: Cell<u64>,
    next_subinterpreter_id: Cell<u64>,
}

impl Registries {
    fn new() -> Self {
        Registries {
            foreign: RefCell::new(ForeignRegistry::new()),
            pristine_builtins: RefCell::new(None),
            sandbox_stack: RefCell::new(Vec::new()),
            code_cache: RefCell::new(HashMap::new()),
            namespaces: RefCell::new(HashMap::new()),
            subinterpreters: RefCell::new(HashMap::new()),
            main: RefCell::new(None),
            next_namespace_id: Cell::new(1),
            next_subinterpreter_id: Cell::new(1),
        }
    }

    fn allocate_namespace_id(&self) -> u64 {
        let id = self.next_namespace_id.get();
        self.next_namespace_id.set(id + 1);
        id
    }

    fn allocate_subinterpreter_id(&self) -> u64 {
        let id = self.next_subinterpreter_id.get();
        self.next_subinterpreter_id.set(id + 1);
        id
    }
}

struct VmCell {
    interpreter: Interpreter,
    registries: Registries,
}

// Safety: the interpreter and registries are only reached through
// Engine::enter, which holds the process-wide execution lock for the
// whole access. No two threads observe this cell concurrently.
unsafe impl Send for VmCell {}
unsafe impl Sync for VmCell {}

pub struct Engine {
    lock: ExecLock,
    cell: VmCell,
    policy: SharedPolicy,
    dom: SharedDom,
    reporter: Mutex<Option<ExceptionReporter>>,
    active_executions: AtomicU32,
    guest_version: String,
}

impl Engine {
    /// Brings the singleton to Ready. Idempotent: a second call while
    /// Ready is a no-op. If the startup probe fails, the engine lands in
    /// Shutdown and every later operation reports EngineUnavailable.
    pub fn initialize(config: EngineConfig) -> EmbedResult<()> {
        let _lifecycle = LIFECYCLE.lock().unwrap_or_else(|e| e.into_inner());
        match Self::state() {
            EngineState::Ready => return Ok(()),
            EngineState::Uninitialized => {}
            _ => return Err(EmbedError::engine_unavailable()),
        }
        STATE.store(STATE_INITIALIZING, Ordering::SeqCst);
        tracing::info!("initializing guest interpreter");

        let interpreter = Interpreter::with_init(Settings::default(), |vm| {
            vm.add_native_modules(rustpython_stdlib::get_module_inits());
            vm.add_frozen(rustpython_pylib::FROZEN_STDLIB);
        });
        let guest_version = match interpreter.enter(startup_probe) {
            Ok(version) => version,
            Err(message) => {
                STATE.store(STATE_SHUTDOWN, Ordering::SeqCst);
                tracing::error!(%message, "guest interpreter failed its startup probe");
                return Err(EmbedError::EngineUnavailable(message));
            }
        };

        let engine = Engine {
            lock: ExecLock::new(),
            cell: VmCell {
                interpreter,
                registries: Registries::new(),
            },
            policy: Arc::new(RwLock::new(config.policy)),
            dom: Arc::new(Mutex::new(None)),
            reporter: Mutex::new(None),
            active_executions: AtomicU32::new(0),
            guest_version,
        };
        if ENGINE.set(engine).is_err() {
            STATE.store(STATE_SHUTDOWN, Ordering::SeqCst);
            return Err(EmbedError::Internal(
                "engine slot already occupied during initialization".to_string(),
            ));
        }
        STATE.store(STATE_READY, Ordering::SeqCst);
        if let Ok(engine) = Self::handle() {
            tracing::info!(version = %engine.guest_version, "guest interpreter ready");
        }
        Ok(())
    }

    pub fn state() -> EngineState {
        match STATE.load(Ordering::SeqCst) {
            STATE_UNINITIALIZED => EngineState::Uninitialized,
            STATE_INITIALIZING => EngineState::Initializing,
            STATE_READY => EngineState::Ready,
            STATE_SHUTTING_DOWN => EngineState::ShuttingDown,
            _ => EngineState::Shutdown,
        }
    }

    pub fn is_initialized() -> bool {
        Self::state() == EngineState::Ready
    }

    /// The singleton, Ready state required.
    pub fn handle() -> EmbedResult<&'static Engine> {
        if !Self::is_initialized() {
            return Err(EmbedError::engine_unavailable());
        }
        ENGINE
            .get()
            .ok_or_else(|| EmbedError::Internal("engine state is Ready with no engine".to_string()))
    }

    /// Tears the singleton down. Idempotent; refuses while a script is
    /// executing (a shutdown requested from inside a host callback).
    /// Shutdown is terminal: the engine cannot be re-initialized.
    pub fn shutdown() -> EmbedResult<()> {
        let _lifecycle = LIFECYCLE.lock().unwrap_or_else(|e| e.into_inner());
        match Self::state() {
            EngineState::Uninitialized | EngineState::Shutdown => return Ok(()),
            EngineState::Ready => {}
            _ => return Err(EmbedError::engine_unavailable()),
        }
        let engine = ENGINE
            .get()
            .ok_or_else(|| EmbedError::Internal("engine state is Ready with no engine".to_string()))?;

        let guard = engine.lock.acquire();
        if engine.active_executions.load(Ordering::SeqCst) > 0 {
            return Err(EmbedError::Internal(
                "shutdown requested while a script execution is in progress".to_string(),
            ));
        }
        STATE.store(STATE_SHUTTING_DOWN, Ordering::SeqCst);
        engine.cell.interpreter.enter(|_vm| {
            let regs = &engine.cell.registries;
            let _ = foreign::drain_deferred();
            regs.foreign.borrow_mut().clear();
            *regs.pristine_builtins.borrow_mut() = None;
            regs.sandbox_stack.borrow_mut().clear();
            regs.code_cache.borrow_mut().clear();
            regs.namespaces.borrow_mut().clear();
            regs.subinterpreters.borrow_mut().clear();
            *regs.main.borrow_mut() = None;
        });
        drop(guard);
        STATE.store(STATE_SHUTDOWN, Ordering::SeqCst);
        tracing::info!("guest interpreter shut down");
        Ok(())
    }

    /// The guest interpreter's version string, captured at startup.
    pub fn guest_version(&self) -> &str {
        &self.guest_version
    }

    /// Runs `operation` with the execution lock held and the interpreter
    /// entered, after draining proxy releases queued by lock-free drops.
    pub(crate) fn enter<R>(&self, operation: impl FnOnce(&VirtualMachine, &Registries) -> R) -> R {
        let _guard = self.lock.acquire();
        self.cell.interpreter.enter(|vm| {
            self.drain_deferred();
            operation(vm, &self.cell.registries)
        })
    }

    /// Guest-side tables. Callers must be inside `enter` (the execution
    /// lock held); host functions invoked by running guest code qualify.
    pub(crate) fn registries(&self) -> &Registries {
        &self.cell.registries
    }

    fn drain_deferred(&self) {
        let (foreign_ids, namespace_ids) = foreign::drain_deferred();
        if !foreign_ids.is_empty() {
            let mut registry = self.cell.registries.foreign.borrow_mut();
            for id in foreign_ids {
                registry.remove(id);
            }
        }
        if !namespace_ids.is_empty() {
            let mut namespaces = self.cell.registries.namespaces.borrow_mut();
            for id in namespace_ids {
                namespaces.remove(&id);
            }
        }
    }

    fn ensure_ready(&self) -> EmbedResult<()> {
        if Self::is_initialized() {
            Ok(())
        } else {
            Err(EmbedError::engine_unavailable())
        }
    }

    /// Evaluates source in the engine's persistent main namespace. The
    /// value of a trailing expression comes back across the bridge, so
    /// `1 + 1` evaluates to `BridgeValue::Int(2)`.
    pub fn eval(
        &self,
        source: &str,
        filename: &str,
        origin: &ScriptOrigin,
    ) -> EmbedResult<BridgeValue> {
        self.ensure_ready()?;
        self.check_prefilter(source, filename, origin)?;
        self.enter(|vm, regs| {
            let code = compile_cached(vm, regs, source, filename)?;
            let namespace = regs
                .main
                .borrow_mut()
                .get_or_insert_with(|| Namespace::new(vm))
                .clone();
            self.run_in_namespace(vm, regs, code, &namespace, origin)
        })
    }

    /// Imports an allowed module and hands it back as a foreign handle.
    pub fn run_module(&self, module_name: &str, origin: &ScriptOrigin) -> EmbedResult<BridgeValue> {
        self.ensure_ready()?;
        if !self
            .policy_read()
            .should_allow_module_import(module_name, origin)
        {
            return Err(EmbedError::Security(format!(
                "import of module '{module_name}' is not allowed for origin {origin}"
            )));
        }
        self.enter(|vm, regs| match vm.import(&vm.ctx.new_str(module_name), 0) {
            Ok(module) => bridge::guest_to_host(vm, regs, module),
            Err(exc) => Err(guest_error::translate(vm, exc)),
        })
    }

    /// Creates an isolated namespace bound to `origin`. Isolation is at
    /// namespace granularity: no globals are shared, but interpreter
    /// internals (imported module instances) are.
    pub fn create_subinterpreter(&self, origin: &ScriptOrigin) -> EmbedResult<u64> {
        self.ensure_ready()?;
        self.enter(|vm, regs| {
            let id = regs.allocate_subinterpreter_id();
            regs.subinterpreters.borrow_mut().insert(
                id,
                SubState {
                    namespace: Namespace::new(vm),
                    origin: origin.clone(),
                },
            );
            tracing::debug!(id, %origin, "created subinterpreter");
            Ok(id)
        })
    }

    pub fn destroy_subinterpreter(&self, id: u64) -> EmbedResult<()> {
        self.ensure_ready()?;
        self.enter(|_vm, regs| {
            regs.subinterpreters
                .borrow_mut()
                .remove(&id)
                .map(|_| tracing::debug!(id, "destroyed subinterpreter"))
                .ok_or_else(|| EmbedError::Internal(format!("unknown subinterpreter id {id}")))
        })
    }

    /// Evaluates source inside a subinterpreter's persistent namespace,
    /// under the policy of the origin the subinterpreter was created for.
    pub fn eval_in_subinterpreter(
        &self,
        id: u64,
        source: &str,
        filename: &str,
    ) -> EmbedResult<BridgeValue> {
        self.ensure_ready()?;
        self.enter(|vm, regs| {
            let (namespace, origin) = {
                let subinterpreters = regs.subinterpreters.borrow();
                let sub = subinterpreters
                    .get(&id)
                    .ok_or_else(|| EmbedError::Internal(format!("unknown subinterpreter id {id}")))?;
                (sub.namespace.clone(), sub.origin.clone())
            };
            self.check_prefilter(source, filename, &origin)?;
            let code = compile_cached(vm, regs, source, filename)?;
            self.run_in_namespace(vm, regs, code, &namespace, &origin)
        })
    }

    pub(crate) fn run_unit(
        &self,
        filename: &str,
        key: &CodeKey,
        namespace_id: &mut Option<u64>,
        origin: &ScriptOrigin,
    ) -> EmbedResult<BridgeValue> {
        self.ensure_ready()?;
        self.enter(|vm, regs| {
            let code = regs.code_cache.borrow().get(key).cloned().ok_or_else(|| {
                EmbedError::Internal(format!("compiled artifact for '{filename}' missing"))
            })?;
            let namespace = match *namespace_id {
                Some(id) => regs
                    .namespaces
                    .borrow()
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| {
                        EmbedError::Internal(format!("namespace {id} missing for '{filename}'"))
                    })?,
                None => {
                    let id = regs.allocate_namespace_id();
                    let namespace = Namespace::new(vm);
                    regs.namespaces.borrow_mut().insert(id, namespace.clone());
                    *namespace_id = Some(id);
                    namespace
                }
            };
            self.run_in_namespace(vm, regs, code, &namespace, origin)
        })
    }

    fn run_in_namespace(
        &self,
        vm: &VirtualMachine,
        regs: &Registries,
        code: PyRef<PyCode>,
        namespace: &Namespace,
        origin: &ScriptOrigin,
    ) -> EmbedResult<BridgeValue> {
        let resource_limits = self.policy_read().limits_for(origin);
        sandbox::apply(
            vm,
            regs,
            namespace,
            &self.policy,
            &self.dom,
            origin,
            resource_limits,
        )?;

        self.active_executions.fetch_add(1, Ordering::SeqCst);
        let timer = limits::CpuGuard::arm(resource_limits.max_cpu_time_ms);
        let outcome = vm.run_code_obj(code, namespace.scope());
        drop(timer);
        self.active_executions.fetch_sub(1, Ordering::SeqCst);
        sandbox::disengage(vm, regs)?;

        if limits::deadline_hit() {
            return Err(EmbedError::ResourceExceeded(format!(
                "CPU time ceiling of {} ms exceeded",
                resource_limits.max_cpu_time_ms
            )));
        }
        match outcome {
            Ok(value) => bridge::guest_to_host(vm, regs, value),
            Err(exc) => Err(guest_error::translate(vm, exc)),
        }
    }

    fn check_prefilter(
        &self,
        source: &str,
        filename: &str,
        origin: &ScriptOrigin,
    ) -> EmbedResult<()> {
        if self
            .policy_read()
            .should_allow_script_execution(source, origin)
        {
            Ok(())
        } else {
            tracing::warn!(filename, %origin, "source rejected by pre-filter");
            Err(EmbedError::Security(format!(
                "script '{filename}' was rejected by the source pre-filter"
            )))
        }
    }

    pub fn foreign_get_attr(&self, handle: &ForeignObject, name: &str) -> EmbedResult<BridgeValue> {
        self.ensure_ready()?;
        self.enter(|vm, regs| {
            let target = lookup_foreign(regs, handle)?;
            // Attribute access can run guest code (properties), so the
            // restricted table is swapped in for its duration.
            sandbox::engage(vm, regs, &self.policy, &ScriptOrigin::opaque())?;
            let outcome = target.get_attr(&vm.ctx.new_str(name), vm);
            sandbox::disengage(vm, regs)?;
            let value = outcome.map_err(|exc| guest_error::translate(vm, exc))?;
            bridge::guest_to_host(vm, regs, value)
        })
    }

    pub fn foreign_set_attr(
        &self,
        handle: &ForeignObject,
        name: &str,
        value: &BridgeValue,
    ) -> EmbedResult<()> {
        self.ensure_ready()?;
        self.enter(|vm, regs| {
            let target = lookup_foreign(regs, handle)?;
            let guest_value = bridge::host_to_guest(vm, regs, value)?;
            sandbox::engage(vm, regs, &self.policy, &ScriptOrigin::opaque())?;
            let outcome = target.set_attr(&vm.ctx.new_str(name), guest_value, vm);
            sandbox::disengage(vm, regs)?;
            outcome.map_err(|exc| guest_error::translate(vm, exc))
        })
    }

    /// Calls a foreign callable with bridged arguments. Limits for the
    /// default profile apply, since no script origin is on the stack.
    pub fn foreign_call(
        &self,
        handle: &ForeignObject,
        args: &[BridgeValue],
    ) -> EmbedResult<BridgeValue> {
        self.ensure_ready()?;
        self.enter(|vm, regs| {
            let target = lookup_foreign(regs, handle)?;
            let mut guest_args = Vec::with_capacity(args.len());
            for arg in args {
                guest_args.push(bridge::host_to_guest(vm, regs, arg)?);
            }
            let resource_limits = self.policy_read().limits_for(&ScriptOrigin::opaque());
            sandbox::engage(vm, regs, &self.policy, &ScriptOrigin::opaque())?;

            self.active_executions.fetch_add(1, Ordering::SeqCst);
            let timer = limits::CpuGuard::arm(resource_limits.max_cpu_time_ms);
            let outcome = target.call(guest_args, vm);
            drop(timer);
            self.active_executions.fetch_sub(1, Ordering::SeqCst);
            sandbox::disengage(vm, regs)?;

            if limits::deadline_hit() {
                return Err(EmbedError::ResourceExceeded(format!(
                    "CPU time ceiling of {} ms exceeded",
                    resource_limits.max_cpu_time_ms
                )));
            }
            match outcome {
                Ok(value) => bridge::guest_to_host(vm, regs, value),
                Err(exc) => Err(guest_error::translate(vm, exc)),
            }
        })
    }

    /// Live entries in the foreign registry, after draining pending
    /// releases. Diagnostic surface for leak checks.
    pub fn foreign_handle_count(&self) -> usize {
        self.enter(|_vm, regs| regs.foreign.borrow().len())
    }

    pub fn attach_dom(&self, host: Box<dyn DomHost>) {
        *self.dom.lock().unwrap_or_else(|e| e.into_inner()) = Some(host);
    }

    pub fn detach_dom(&self) {
        *self.dom.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Runs `inspect` against the attached DOM host, if any. Lets tests
    /// and embedders observe script-made mutations.
    pub fn with_dom<R>(&self, inspect: impl FnOnce(&mut (dyn DomHost + '_)) -> R) -> Option<R> {
        let mut guard = self.dom.lock().unwrap_or_else(|e| e.into_inner());
        guard.as_deref_mut().map(inspect)
    }

    pub fn set_exception_reporter(&self, reporter: ExceptionReporter) {
        *self.reporter.lock().unwrap_or_else(|e| e.into_inner()) = Some(reporter);
    }

    /// Delivers an unmuted script failure to the embedder's reporter, or
    /// to the log when none is installed.
    pub(crate) fn report(&self, error: &EmbedError) {
        let guard = self.reporter.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(reporter) => reporter(error),
            None => tracing::warn!(%error, "unreported guest exception"),
        }
    }

    pub fn add_safe_domain(&self, domain: impl Into<String>) {
        self.policy_write().add_safe_domain(domain);
    }

    pub fn set_origin_allowed_modules(
        &self,
        origin: &ScriptOrigin,
        modules: impl IntoIterator<Item = String>,
    ) {
        self.policy_write().set_origin_allowed_modules(origin, modules);
    }

    pub fn set_origin_resource_limits(&self, origin: &ScriptOrigin, limits: ResourceLimits) {
        self.policy_write().set_origin_resource_limits(origin, limits);
    }

    pub fn should_allow_network_request(
        &self,
        target: &ScriptOrigin,
        origin: &ScriptOrigin,
    ) -> bool {
        self.policy_read().should_allow_network_request(target, origin)
    }

    pub(crate) fn policy_read(&self) -> RwLockReadGuard<'_, SecurityPolicy> {
        self.policy.read().unwrap_or_else(|e| e.into_inner())
    }

    fn policy_write(&self) -> RwLockWriteGuard<'_, SecurityPolicy> {
        self.policy.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Smoke-tests the fresh interpreter and captures its version: `1 + 1`
/// must evaluate to 2 before the engine reports Ready.
fn startup_probe(vm: &VirtualMachine) -> Result<String, String> {
    let scope = vm.new_scope_with_builtins();
    let code = vm
        .compile("1 + 1", Mode::BlockExpr, "<startup>".to_owned())
        .map_err(|err| format!("startup expression failed to compile: {err}"))?;
    let result = vm
        .run_code_obj(code, scope)
        .map_err(|_| "startup expression raised".to_string())?;
    let two = result
        .downcast_ref::<PyInt>()
        .and_then(|int| num_traits::ToPrimitive::to_i64(int.as_bigint()));
    if two != Some(2) {
        return Err("startup expression produced an unexpected value".to_string());
    }

    let sys = vm
        .import("sys", 0)
        .map_err(|_| "sys import failed".to_string())?;
    let version = sys
        .get_attr("version", vm)
        .map_err(|_| "sys.version is missing".to_string())?;
    let version = version
        .downcast_ref::<PyStr>()
        .map(|text| text.as_str().replace('\n', " "))
        .ok_or_else(|| "sys.version is not a string".to_string())?;
    Ok(version)
}

pub(crate) fn compile_cached(
    vm: &VirtualMachine,
    regs: &Registries,
    source: &str,
    filename: &str,
) -> EmbedResult<PyRef<PyCode>> {
    let key = cache_key(source, filename);
    if let Some(code) = regs.code_cache.borrow().get(&key) {
        tracing::trace!(filename, "compiled-script cache hit");
        return Ok(code.clone());
    }
    let code = vm
        .compile(source, Mode::BlockExpr, filename.to_owned())
        .map_err(|err| EmbedError::Compile {
            filename: filename.to_owned(),
            message: err.to_string(),
        })?;
    regs.code_cache.borrow_mut().insert(key, code.clone());
    Ok(code)
}

/// Cache key over filename plus a content hash, so re-delivering new
/// source under an old name never replays a stale artifact.
pub(crate) fn cache_key(source: &str, filename: &str) -> CodeKey {
    let mut hasher = ahash::AHasher::default();
    hasher.write(source.as_bytes());
    (filename.to_owned(), hasher.finish())
}

fn lookup_foreign(
    regs: &Registries,
    handle: &ForeignObject,
) -> EmbedResult<rustpython_vm::PyObjectRef> {
    regs.foreign.borrow().get(handle.id()).cloned().ok_or_else(|| {
        EmbedError::Conversion(format!(
            "foreign handle {} is no longer registered",
            handle.id()
        ))
    })
}

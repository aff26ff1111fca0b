//! Capability sandbox enforcement.
//!
//! Guest frames resolve builtin names and `import` statements through
//! the interpreter's builtins module, not through the globals dict of
//! the executing namespace. Restricting an execution therefore means
//! swapping the contents of that module's dict for the allow-listed
//! table before guest code runs and restoring the pristine table
//! afterwards, always under the execution lock. The checking
//! `__import__` and the sentinel `open` live in the swapped-in table;
//! allowed modules initialize under the pristine table, exactly as they
//! would in a stock interpreter.

use std::sync::{Arc, Mutex, RwLock};

use hashbrown::HashSet;
use pyweb_core::policy::SAFE_BUILTINS;
use pyweb_core::{DomHost, EmbedError, EmbedResult, ResourceLimits, ScriptOrigin, SecurityPolicy};
use rustpython_vm::builtins::{PyDictRef, PyInt, PyStr, PyTuple};
use rustpython_vm::function::FuncArgs;
use rustpython_vm::{AsObject, PyObjectRef, PyResult, TryFromObject, VirtualMachine};

use crate::engine::{Engine, Namespace, Registries};
use crate::{dom_glue, guest_error, limits};

pub(crate) type SharedPolicy = Arc<RwLock<SecurityPolicy>>;
pub(crate) type SharedDom = Arc<Mutex<Option<Box<dyn DomHost>>>>;

/// Prepares `namespace` for one execution and swaps the restricted
/// builtin table in. The caller pairs this with `disengage` once the
/// run finishes.
pub(crate) fn apply(
    vm: &VirtualMachine,
    regs: &Registries,
    namespace: &Namespace,
    policy: &SharedPolicy,
    dom: &SharedDom,
    origin: &ScriptOrigin,
    limits: ResourceLimits,
) -> EmbedResult<()> {
    let err = |exc| guest_error::translate(vm, exc);

    namespace
        .globals
        .set_item("__name__", vm.ctx.new_str("__main__").into(), vm)
        .map_err(err)?;
    namespace
        .globals
        .set_item("__doc__", vm.ctx.none(), vm)
        .map_err(err)?;
    // Absent __package__/__spec__ would make the import machinery warn.
    namespace
        .globals
        .set_item("__package__", vm.ctx.none(), vm)
        .map_err(err)?;
    namespace
        .globals
        .set_item("__spec__", vm.ctx.none(), vm)
        .map_err(err)?;
    namespace
        .globals
        .set_item("web", dom_glue::web_module(vm, dom), vm)
        .map_err(err)?;
    set_recursion_ceiling(vm, limits.max_recursion_depth)?;

    // Last, so everything above still runs with the standard table.
    let restricted = engage(vm, regs, policy, origin)?;
    namespace
        .globals
        .set_item("__builtins__", restricted.into(), vm)
        .map_err(err)
}

/// Installs the allow-listed table into the interpreter's builtins
/// module and records it so `disengage` can undo the swap. Nested
/// engagements stack; the outermost disengage restores the pristine
/// table.
pub(crate) fn engage(
    vm: &VirtualMachine,
    regs: &Registries,
    policy: &SharedPolicy,
    origin: &ScriptOrigin,
) -> EmbedResult<PyDictRef> {
    let pristine = pristine_snapshot(vm, regs)?;
    let restricted = restricted_builtins(vm, &pristine, policy, origin)?;
    fill(vm, &vm.builtins.dict(), &restricted).map_err(|exc| guest_error::translate(vm, exc))?;
    regs.sandbox_stack.borrow_mut().push(restricted.clone());
    Ok(restricted)
}

/// Restores the builtin table left by the matching `engage`. Safe to
/// call when no swap is active.
pub(crate) fn disengage(vm: &VirtualMachine, regs: &Registries) -> EmbedResult<()> {
    if regs.sandbox_stack.borrow_mut().pop().is_none() {
        return Ok(());
    }
    let err = |exc| guest_error::translate(vm, exc);
    let outer = regs.sandbox_stack.borrow().last().cloned();
    match outer {
        Some(outer) => fill(vm, &vm.builtins.dict(), &outer).map_err(err),
        None => {
            let pristine = regs.pristine_builtins.borrow().clone().ok_or_else(|| {
                EmbedError::Internal("builtins snapshot missing during sandbox restore".to_string())
            })?;
            fill(vm, &vm.builtins.dict(), &pristine).map_err(err)
        }
    }
}

/// The untouched builtin table, captured before the first swap.
fn pristine_snapshot(vm: &VirtualMachine, regs: &Registries) -> EmbedResult<PyDictRef> {
    if let Some(existing) = regs.pristine_builtins.borrow().clone() {
        return Ok(existing);
    }
    let snapshot = vm.ctx.new_dict();
    fill(vm, &snapshot, &vm.builtins.dict()).map_err(|exc| guest_error::translate(vm, exc))?;
    *regs.pristine_builtins.borrow_mut() = Some(snapshot.clone());
    Ok(snapshot)
}

/// Builds the allow-listed table for one execution. Allowed names are
/// copied from the pristine snapshot; everything else is absent, so a
/// blocked name fails with an ordinary NameError. `__import__` and
/// `open` are installed as checking/sentinel host functions.
fn restricted_builtins(
    vm: &VirtualMachine,
    pristine: &PyDictRef,
    policy: &SharedPolicy,
    origin: &ScriptOrigin,
) -> EmbedResult<PyDictRef> {
    let err = |exc| guest_error::translate(vm, exc);
    let allowed: HashSet<&str> = SAFE_BUILTINS
        .iter()
        .copied()
        .filter(|name| *name != "__import__")
        .collect();
    let dict = vm.ctx.new_dict();
    for (key, value) in entries(vm, pristine).map_err(err)? {
        let Some(name) = key.downcast_ref::<PyStr>() else {
            continue;
        };
        if allowed.contains(name.as_str()) {
            dict.set_item(name.as_str(), value, vm).map_err(err)?;
        }
    }
    dict.set_item("__import__", checking_import(vm, policy, origin), vm)
        .map_err(err)?;
    dict.set_item("open", sentinel_open(vm), vm).map_err(err)?;
    Ok(dict)
}

fn entries(vm: &VirtualMachine, dict: &PyDictRef) -> PyResult<Vec<(PyObjectRef, PyObjectRef)>> {
    let items = vm.call_method(dict.as_object(), "items", ())?;
    let items = Vec::<PyObjectRef>::try_from_object(vm, items)?;
    let mut pairs = Vec::with_capacity(items.len());
    for item in items {
        let Some(pair) = item.downcast_ref::<PyTuple>() else {
            return Err(vm.new_type_error("dict items() produced a non-tuple entry".to_owned()));
        };
        let [key, value] = pair.as_slice() else {
            return Err(
                vm.new_type_error("dict items() produced an entry that is not a pair".to_owned())
            );
        };
        pairs.push((key.clone(), value.clone()));
    }
    Ok(pairs)
}

/// Replaces the contents of `target` with the entries of `source`. The
/// dict object itself stays, so frames holding a reference observe the
/// new contents.
fn fill(vm: &VirtualMachine, target: &PyDictRef, source: &PyDictRef) -> PyResult<()> {
    let pairs = entries(vm, source)?;
    vm.call_method(target.as_object(), "clear", ())?;
    for (key, value) in pairs {
        target.set_item(&*key, value, vm)?;
    }
    Ok(())
}

/// The `__import__` replacement. Consults the per-origin allow-list on
/// every import a script frame makes, then delegates to the real
/// machinery.
fn checking_import(
    vm: &VirtualMachine,
    policy: &SharedPolicy,
    origin: &ScriptOrigin,
) -> PyObjectRef {
    let policy = Arc::clone(policy);
    let origin = origin.clone();
    vm.new_function(
        "__import__",
        move |args: FuncArgs, vm: &VirtualMachine| -> PyResult {
            guard_deadline(vm)?;
            let Some(first) = args.args.first() else {
                return Err(vm.new_type_error("__import__ expects a module name".to_owned()));
            };
            let Some(name) = first.downcast_ref::<PyStr>() else {
                return Err(vm.new_type_error("module name must be a str".to_owned()));
            };
            if import_level(&args) != 0 {
                return Err(vm.new_exception_msg(
                    vm.ctx.exceptions.permission_error.to_owned(),
                    "relative imports are not available to sandboxed scripts".to_owned(),
                ));
            }
            let allowed = policy
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .should_allow_module_import(name.as_str(), &origin);
            if !allowed {
                tracing::warn!(module = %name.as_str(), %origin, "blocked module import");
                return Err(vm.new_exception_msg(
                    vm.ctx.exceptions.permission_error.to_owned(),
                    format!(
                        "import of module '{}' is not allowed for origin {}",
                        name.as_str(),
                        origin
                    ),
                ));
            }
            delegate_to_real_import(vm, args)
        },
    )
    .into()
}

/// Runs the interpreter's own `__import__` with the pristine table in
/// place, so an allowed module initializes exactly as it would in a
/// stock interpreter, then re-installs the restricted table before
/// control returns to the script frame.
fn delegate_to_real_import(vm: &VirtualMachine, args: FuncArgs) -> PyResult {
    let regs = current_registries(vm)?;
    let pristine = regs.pristine_builtins.borrow().clone().ok_or_else(|| {
        vm.new_exception_msg(
            vm.ctx.exceptions.runtime_error.to_owned(),
            "builtins snapshot missing during import".to_owned(),
        )
    })?;
    let real = pristine.get_item("__import__", vm)?;
    let restricted = regs.sandbox_stack.borrow().last().cloned();
    if restricted.is_some() {
        fill(vm, &vm.builtins.dict(), &pristine)?;
    }
    let outcome = real.call(args, vm);
    if let Some(restricted) = &restricted {
        fill(vm, &vm.builtins.dict(), restricted)?;
    }
    outcome
}

fn current_registries(vm: &VirtualMachine) -> PyResult<&'static Registries> {
    match Engine::handle() {
        Ok(engine) => Ok(engine.registries()),
        Err(_) => Err(vm.new_exception_msg(
            vm.ctx.exceptions.runtime_error.to_owned(),
            "interpreter engine is not available".to_owned(),
        )),
    }
}

/// `open` is present but always refuses, so scripts see an explicit
/// denial rather than a confusing NameError.
fn sentinel_open(vm: &VirtualMachine) -> PyObjectRef {
    vm.new_function("open", |_args: FuncArgs, vm: &VirtualMachine| -> PyResult {
        Err(vm.new_exception_msg(
            vm.ctx.exceptions.permission_error.to_owned(),
            "file system access is not available to sandboxed scripts".to_owned(),
        ))
    })
    .into()
}

/// Raises inside the guest once the CPU timer for the current execution
/// has fired. Called from every host function reachable by guest code.
pub(crate) fn guard_deadline(vm: &VirtualMachine) -> PyResult<()> {
    if limits::deadline_hit() {
        return Err(vm.new_exception_msg(
            vm.ctx.exceptions.runtime_error.to_owned(),
            "CPU time limit exceeded".to_owned(),
        ));
    }
    Ok(())
}

fn import_level(args: &FuncArgs) -> i64 {
    let positional = args.args.get(4);
    let keyword = args.kwargs.get("level");
    positional
        .or(keyword)
        .and_then(|level| level.downcast_ref::<PyInt>())
        .and_then(|level| {
            use num_traits::ToPrimitive;
            level.as_bigint().to_i64()
        })
        .unwrap_or(0)
}

fn set_recursion_ceiling(vm: &VirtualMachine, depth: u32) -> EmbedResult<()> {
    let err = |exc| guest_error::translate(vm, exc);
    let sys = vm.import("sys", 0).map_err(err)?;
    // Leave headroom for interpreter-internal frames.
    vm.call_method(&sys, "setrecursionlimit", (depth.max(16),))
        .map_err(err)?;
    Ok(())
}

//! The `web` guest module.
//!
//! Exposes the four DOM primitives plus `console_log` to sandboxed
//! scripts. Node handles cross the boundary as plain integers that are
//! only meaningful to the attached `DomHost`; a script holding a stale
//! or fabricated handle gets a guest-level error, never host UB.

use pyweb_core::NodeId;
use rustpython_vm::builtins::PyStr;
use rustpython_vm::function::FuncArgs;
use rustpython_vm::{PyObjectRef, PyResult, TryFromObject, VirtualMachine};

use crate::sandbox::{SharedDom, guard_deadline};

pub(crate) fn web_module(vm: &VirtualMachine, dom: &SharedDom) -> PyObjectRef {
    let dict = vm.ctx.new_dict();

    let host = dom.clone();
    let _ = dict.set_item(
        "create_element",
        vm.new_function(
            "create_element",
            move |args: FuncArgs, vm: &VirtualMachine| -> PyResult {
                guard_deadline(vm)?;
                let tag = str_arg(&args, 0, "tag", vm)?;
                let node = with_dom(&host, vm, |dom| dom.create_element(&tag))?;
                Ok(vm.ctx.new_int(node.0).into())
            },
        )
        .into(),
        vm,
    );

    let host = dom.clone();
    let _ = dict.set_item(
        "query_selector",
        vm.new_function(
            "query_selector",
            move |args: FuncArgs, vm: &VirtualMachine| -> PyResult {
                guard_deadline(vm)?;
                let selector = str_arg(&args, 0, "selector", vm)?;
                let found = with_dom(&host, vm, |dom| dom.query_selector(&selector))?;
                Ok(match found {
                    Some(node) => vm.ctx.new_int(node.0).into(),
                    None => vm.ctx.none(),
                })
            },
        )
        .into(),
        vm,
    );

    let host = dom.clone();
    let _ = dict.set_item(
        "get_attribute",
        vm.new_function(
            "get_attribute",
            move |args: FuncArgs, vm: &VirtualMachine| -> PyResult {
                guard_deadline(vm)?;
                let node = node_arg(&args, 0, vm)?;
                let name = str_arg(&args, 1, "name", vm)?;
                let value = with_dom(&host, vm, |dom| dom.get_attribute(node, &name))?;
                Ok(match value {
                    Some(value) => vm.ctx.new_str(value.as_str()).into(),
                    None => vm.ctx.none(),
                })
            },
        )
        .into(),
        vm,
    );

    let host = dom.clone();
    let _ = dict.set_item(
        "set_attribute",
        vm.new_function(
            "set_attribute",
            move |args: FuncArgs, vm: &VirtualMachine| -> PyResult {
                guard_deadline(vm)?;
                let node = node_arg(&args, 0, vm)?;
                let name = str_arg(&args, 1, "name", vm)?;
                let value = str_arg(&args, 2, "value", vm)?;
                with_dom(&host, vm, |dom| dom.set_attribute(node, &name, &value))?;
                Ok(vm.ctx.none())
            },
        )
        .into(),
        vm,
    );

    let host = dom.clone();
    let _ = dict.set_item(
        "get_text",
        vm.new_function(
            "get_text",
            move |args: FuncArgs, vm: &VirtualMachine| -> PyResult {
                guard_deadline(vm)?;
                let node = node_arg(&args, 0, vm)?;
                let text = with_dom(&host, vm, |dom| dom.get_text(node))?;
                Ok(vm.ctx.new_str(text.as_str()).into())
            },
        )
        .into(),
        vm,
    );

    let host = dom.clone();
    let _ = dict.set_item(
        "set_text",
        vm.new_function(
            "set_text",
            move |args: FuncArgs, vm: &VirtualMachine| -> PyResult {
                guard_deadline(vm)?;
                let node = node_arg(&args, 0, vm)?;
                let value = str_arg(&args, 1, "value", vm)?;
                with_dom(&host, vm, |dom| dom.set_text(node, &value))?;
                Ok(vm.ctx.none())
            },
        )
        .into(),
        vm,
    );

    let _ = dict.set_item(
        "console_log",
        vm.new_function(
            "console_log",
            |args: FuncArgs, vm: &VirtualMachine| -> PyResult {
                guard_deadline(vm)?;
                let mut parts = Vec::with_capacity(args.args.len());
                for arg in &args.args {
                    parts.push(arg.str(vm)?.as_str().to_owned());
                }
                let message = parts.join(" ");
                tracing::info!(target: "pyweb_engine::console", "{message}");
                Ok(vm.ctx.none())
            },
        )
        .into(),
        vm,
    );

    vm.new_module("web", dict, None).into()
}

fn with_dom<R>(
    dom: &SharedDom,
    vm: &VirtualMachine,
    operation: impl FnOnce(&mut (dyn pyweb_core::DomHost + '_)) -> Result<R, String>,
) -> PyResult<R> {
    let mut guard = dom.lock().unwrap_or_else(|e| e.into_inner());
    let host = guard.as_deref_mut().ok_or_else(|| {
        vm.new_exception_msg(
            vm.ctx.exceptions.runtime_error.to_owned(),
            "no document is attached to the engine".to_owned(),
        )
    })?;
    operation(host).map_err(|message| {
        vm.new_exception_msg(vm.ctx.exceptions.runtime_error.to_owned(), message)
    })
}

fn str_arg(args: &FuncArgs, index: usize, name: &str, vm: &VirtualMachine) -> PyResult<String> {
    let Some(value) = args.args.get(index) else {
        return Err(vm.new_type_error(format!("missing argument '{name}'")));
    };
    match value.downcast_ref::<PyStr>() {
        Some(text) => Ok(text.as_str().to_owned()),
        None => Err(vm.new_type_error(format!("argument '{name}' must be a str"))),
    }
}

fn node_arg(args: &FuncArgs, index: usize, vm: &VirtualMachine) -> PyResult<NodeId> {
    let Some(value) = args.args.get(index) else {
        return Err(vm.new_type_error("missing node handle argument".to_owned()));
    };
    let id = u64::try_from_object(vm, value.clone())
        .map_err(|_| vm.new_type_error("node handle must be a non-negative int".to_owned()))?;
    Ok(NodeId(id))
}

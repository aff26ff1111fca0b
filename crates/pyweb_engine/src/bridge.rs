//! Value conversion across the guest/host boundary.
//!
//! Conversion is eager and total: guest values inside the closed
//! `BridgeValue` set convert by copy, everything else is pinned in the
//! foreign registry and proxied by reference. Guest dicts convert to
//! maps only when every key is a string; any other dict is proxied
//! rather than partially converted.

use indexmap::IndexMap;
use num_traits::ToPrimitive;
use pyweb_core::{BridgeValue, EmbedError, EmbedResult, ForeignObject};
use rustpython_vm::builtins::{PyDict, PyFloat, PyInt, PyList, PyStr, PyTuple};
use rustpython_vm::{AsObject, PyObjectRef, TryFromObject, VirtualMachine};

use crate::engine::Registries;
use crate::{foreign, guest_error};

/// Nesting ceiling for container conversion. Cyclic or pathologically
/// deep guest structures become a Conversion error instead of
/// exhausting the host stack.
const MAX_CONVERSION_DEPTH: usize = 64;

pub(crate) fn guest_to_host(
    vm: &VirtualMachine,
    regs: &Registries,
    object: PyObjectRef,
) -> EmbedResult<BridgeValue> {
    convert_out(vm, regs, object, 0)
}

fn convert_out(
    vm: &VirtualMachine,
    regs: &Registries,
    object: PyObjectRef,
    depth: usize,
) -> EmbedResult<BridgeValue> {
    if depth > MAX_CONVERSION_DEPTH {
        return Err(EmbedError::Conversion(format!(
            "value nesting exceeds the conversion depth ceiling of {MAX_CONVERSION_DEPTH}"
        )));
    }
    if vm.is_none(&object) {
        return Ok(BridgeValue::Null);
    }
    // bool first: guest bools are also ints.
    if object.fast_isinstance(vm.ctx.types.bool_type) {
        return Ok(BridgeValue::Bool(object.is(&vm.ctx.true_value)));
    }
    if let Some(int) = object.downcast_ref::<PyInt>() {
        let big = int.as_bigint();
        return Ok(match big.to_i64() {
            Some(value) => BridgeValue::Int(value),
            // Out-of-range integers degrade to floats rather than fail.
            None => BridgeValue::Float(big.to_f64().unwrap_or(f64::NAN)),
        });
    }
    if let Some(float) = object.downcast_ref::<PyFloat>() {
        return Ok(BridgeValue::Float(float.to_f64()));
    }
    if let Some(text) = object.downcast_ref::<PyStr>() {
        return Ok(BridgeValue::Str(text.as_str().to_owned()));
    }
    if let Some(list) = object.downcast_ref::<PyList>() {
        let items = list.borrow_vec().to_vec();
        return convert_sequence(vm, regs, items, depth);
    }
    if let Some(tuple) = object.downcast_ref::<PyTuple>() {
        let items = tuple.as_slice().to_vec();
        return convert_sequence(vm, regs, items, depth);
    }
    if let Some(dict) = object.downcast_ref::<PyDict>() {
        if let Some(map) = convert_map(vm, regs, dict.to_owned().into(), depth)? {
            return Ok(BridgeValue::Map(map));
        }
    }
    Ok(wrap_foreign(vm, regs, object))
}

fn convert_sequence(
    vm: &VirtualMachine,
    regs: &Registries,
    items: Vec<PyObjectRef>,
    depth: usize,
) -> EmbedResult<BridgeValue> {
    let mut converted = Vec::with_capacity(items.len());
    for item in items {
        converted.push(convert_out(vm, regs, item, depth + 1)?);
    }
    Ok(BridgeValue::Seq(converted))
}

/// `Ok(None)` means the dict has a non-string key and must be proxied.
fn convert_map(
    vm: &VirtualMachine,
    regs: &Registries,
    dict: PyObjectRef,
    depth: usize,
) -> EmbedResult<Option<IndexMap<String, BridgeValue>>> {
    let items_obj = vm
        .call_method(&dict, "items", ())
        .map_err(|exc| guest_error::translate(vm, exc))?;
    let items = Vec::<PyObjectRef>::try_from_object(vm, items_obj)
        .map_err(|exc| guest_error::translate(vm, exc))?;

    let mut map = IndexMap::with_capacity(items.len());
    for item in items {
        let Some(pair) = item.downcast_ref::<PyTuple>() else {
            return Err(EmbedError::Conversion(
                "dict items() produced a non-tuple entry".to_string(),
            ));
        };
        let entry = pair.as_slice();
        let [key, value] = entry else {
            return Err(EmbedError::Conversion(
                "dict items() produced an entry that is not a pair".to_string(),
            ));
        };
        let Some(key) = key.downcast_ref::<PyStr>() else {
            return Ok(None);
        };
        map.insert(
            key.as_str().to_owned(),
            convert_out(vm, regs, value.clone(), depth + 1)?,
        );
    }
    Ok(Some(map))
}

fn wrap_foreign(vm: &VirtualMachine, regs: &Registries, object: PyObjectRef) -> BridgeValue {
    let type_name = object.class().name().to_string();
    let id = regs.foreign.borrow_mut().insert(object);
    tracing::trace!(id, %type_name, "pinned guest object behind a foreign handle");
    BridgeValue::Foreign(ForeignObject::new(
        id,
        type_name,
        foreign::enqueue_foreign_release,
    ))
}

pub(crate) fn host_to_guest(
    vm: &VirtualMachine,
    regs: &Registries,
    value: &BridgeValue,
) -> EmbedResult<PyObjectRef> {
    convert_in(vm, regs, value, 0)
}

fn convert_in(
    vm: &VirtualMachine,
    regs: &Registries,
    value: &BridgeValue,
    depth: usize,
) -> EmbedResult<PyObjectRef> {
    if depth > MAX_CONVERSION_DEPTH {
        return Err(EmbedError::Conversion(format!(
            "value nesting exceeds the conversion depth ceiling of {MAX_CONVERSION_DEPTH}"
        )));
    }
    Ok(match value {
        BridgeValue::Null => vm.ctx.none(),
        BridgeValue::Bool(b) => vm.ctx.new_bool(*b).into(),
        BridgeValue::Int(i) => vm.ctx.new_int(*i).into(),
        BridgeValue::Float(f) => vm.ctx.new_float(*f).into(),
        BridgeValue::Str(s) => vm.ctx.new_str(s.as_str()).into(),
        BridgeValue::Seq(items) => {
            let mut converted = Vec::with_capacity(items.len());
            for item in items {
                converted.push(convert_in(vm, regs, item, depth + 1)?);
            }
            vm.ctx.new_list(converted).into()
        }
        BridgeValue::Map(map) => {
            let dict = vm.ctx.new_dict();
            for (key, entry) in map {
                dict.set_item(key.as_str(), convert_in(vm, regs, entry, depth + 1)?, vm)
                    .map_err(|exc| guest_error::translate(vm, exc))?;
            }
            dict.into()
        }
        BridgeValue::Foreign(handle) => regs
            .foreign
            .borrow()
            .get(handle.id())
            .cloned()
            .ok_or_else(|| {
                EmbedError::Conversion(format!(
                    "foreign handle {} is no longer registered",
                    handle.id()
                ))
            })?,
    })
}

//! Guest exception capture and translation.
//!
//! Guest exceptions never unwind into the host as panics; they are
//! caught at the boundary, their type name, message, and formatted
//! traceback captured, and classified into the host error taxonomy.
//! Denials raised by the sandbox arrive here as ordinary guest
//! PermissionErrors, so scripts can observe them with try/except first.

use pyweb_core::EmbedError;
use rustpython_vm::builtins::PyBaseExceptionRef;
use rustpython_vm::{AsObject, VirtualMachine};

/// Classifies a caught guest exception. PermissionError is the sandbox
/// denial channel; RecursionError and MemoryError mean a resource
/// ceiling was hit inside the guest.
pub(crate) fn translate(vm: &VirtualMachine, exc: PyBaseExceptionRef) -> EmbedError {
    let type_name = exc.class().name().to_string();
    let message = exc
        .as_object()
        .str(vm)
        .map(|text| text.as_str().to_owned())
        .unwrap_or_default();
    let mut traceback = String::new();
    let _ = vm.write_exception(&mut traceback, &exc);

    match type_name.as_str() {
        "PermissionError" => EmbedError::Security(message),
        "RecursionError" => {
            EmbedError::ResourceExceeded(format!("recursion ceiling hit: {message}"))
        }
        "MemoryError" => EmbedError::ResourceExceeded(format!("memory ceiling hit: {message}")),
        // A fired CPU timer is detected through its flag at the
        // execution boundary, never through exception text, so scripts
        // cannot forge a resource-limit error by raising one.
        _ => EmbedError::Guest {
            type_name,
            message,
            traceback,
        },
    }
}

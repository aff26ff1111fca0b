mod common;

use common::{engine, origin};
use pyweb_engine::{BridgeValue, EmbedError, ScriptState, ScriptUnit};

#[test]
fn allowed_module_imports_and_works() {
    let engine = engine();
    let page = origin("https://page.test");
    assert_eq!(
        engine
            .eval("import math\nmath.floor(3.7)", "mathuse.py", &page)
            .unwrap(),
        BridgeValue::Int(3)
    );
}

#[test]
fn blocked_module_import_is_a_security_error() {
    let engine = engine();
    let err = engine
        .eval("import socket", "netgrab.py", &origin("https://page.test"))
        .unwrap_err();
    assert!(err.is_security(), "got {err:?}");
}

#[test]
fn denial_is_observable_inside_the_guest() {
    let engine = engine();
    let source = "\
try:
    import socket
    witness = 'imported'
except Exception as exc:
    witness = type(exc).__name__
witness";
    assert_eq!(
        engine.eval(source, "witness.py", &origin("https://page.test")).unwrap(),
        BridgeValue::Str("PermissionError".to_string())
    );
}

#[test]
fn sentinel_open_denies_even_past_the_prefilter() {
    let engine = engine();
    // The space defeats the textual pre-filter; the namespace does not.
    let err = engine
        .eval("open ('/etc/passwd')", "fsread.py", &origin("https://page.test"))
        .unwrap_err();
    assert!(err.is_security(), "got {err:?}");
}

#[test]
fn absent_builtin_fails_with_name_error() {
    let engine = engine();
    let err = engine
        .eval("getattr", "lookup.py", &origin("https://page.test"))
        .unwrap_err();
    assert!(matches!(err, EmbedError::Guest { type_name, .. } if type_name == "NameError"));
}

#[test]
fn dynamic_execution_builtins_are_unreachable_at_runtime() {
    let engine = engine();
    let page = origin("https://page.test");
    // The spaces defeat the textual pre-filter; the restricted builtin
    // table is what actually denies these.
    for source in ["eval ('1')", "exec ('x = 1')", "getattr (int, 'mro')"] {
        let err = engine.eval(source, "escape.py", &page).unwrap_err();
        assert!(
            matches!(&err, EmbedError::Guest { type_name, .. } if type_name == "NameError"),
            "{source}: got {err:?}"
        );
    }
}

#[test]
fn builtins_are_restored_after_a_sandboxed_run() {
    let engine = engine();
    let page = origin("https://page.test");
    assert_eq!(
        engine.eval("len('abc')", "first.py", &page).unwrap(),
        BridgeValue::Int(3)
    );
    // Importing a module initializes it with the full builtin table;
    // that would fail if a previous run left the restricted one behind.
    let module = engine.run_module("math", &page).unwrap();
    assert_eq!(module.as_foreign().map(|h| h.type_name()), Some("module"));
    assert_eq!(
        engine.eval("sum([1, 2, 3])", "second.py", &page).unwrap(),
        BridgeValue::Int(6)
    );
}

#[test]
fn prefilter_rejects_dangerous_source_at_creation() {
    engine();
    let unit = ScriptUnit::create("eval('1')", "evil.py", origin("https://page.test")).unwrap();
    assert_eq!(unit.state(), ScriptState::CompileFailed);
    assert!(unit.error().is_some_and(EmbedError::is_security));
}

#[test]
fn class_statements_work_in_the_sandbox() {
    let engine = engine();
    let source = "\
class Greeter:
    def __init__(self, name):
        self.name = name

    def greet(self):
        return 'hello ' + self.name

Greeter('web').greet()";
    assert_eq!(
        engine.eval(source, "greeter.py", &origin("https://page.test")).unwrap(),
        BridgeValue::Str("hello web".to_string())
    );
}

#[test]
fn per_origin_module_profile_replaces_default() {
    let engine = engine();
    let locked = origin("https://locked.example");
    engine.set_origin_allowed_modules(&locked, ["math".to_string()]);
    assert_eq!(
        engine.eval("import math\nmath.ceil(0.2)", "ok.py", &locked).unwrap(),
        BridgeValue::Int(1)
    );
    // json is in the default profile but not in this origin's profile.
    let err = engine.eval("import json", "denied.py", &locked).unwrap_err();
    assert!(err.is_security(), "got {err:?}");
}

#[test]
fn run_module_honors_the_allow_list() {
    let engine = engine();
    let page = origin("https://page.test");
    let module = engine.run_module("math", &page).unwrap();
    let handle = module.as_foreign().expect("module proxied by handle");
    assert_eq!(handle.type_name(), "module");
    let pi = engine.foreign_get_attr(handle, "pi").unwrap();
    let pi = pi.as_f64().expect("math.pi is a float");
    assert!((pi - std::f64::consts::PI).abs() < 1e-12);

    let err = engine.run_module("socket", &page).unwrap_err();
    assert!(err.is_security(), "got {err:?}");
}

#[test]
fn network_policy_checks() {
    let engine = engine();
    let page = origin("https://page.test");
    assert!(engine.should_allow_network_request(&page, &page));
    assert!(engine.should_allow_network_request(&origin("http://localhost:8000"), &page));
    assert!(!engine.should_allow_network_request(&origin("https://evil.example"), &page));

    engine.add_safe_domain("*.assets.example");
    assert!(engine.should_allow_network_request(&origin("https://img.assets.example"), &page));
    // The wildcard requires a strict subdomain.
    assert!(!engine.should_allow_network_request(&origin("https://assets.example"), &page));
}

mod common;

use std::thread;

use common::{engine, origin};
use pyweb_engine::{BridgeValue, EmbedError, ScriptState, ScriptUnit};

#[test]
fn trailing_expression_value_comes_back() {
    let engine = engine();
    let page = origin("https://page.test");
    assert_eq!(
        engine.eval("1 + 1", "expr.py", &page).unwrap(),
        BridgeValue::Int(2)
    );
}

#[test]
fn every_bridge_kind_converts() {
    let engine = engine();
    let page = origin("https://page.test");
    assert_eq!(
        engine.eval("'a' + 'b'", "kinds.py", &page).unwrap(),
        BridgeValue::Str("ab".to_string())
    );
    assert_eq!(
        engine.eval("None", "kinds.py", &page).unwrap(),
        BridgeValue::Null
    );
    assert_eq!(
        engine.eval("3 > 2", "kinds.py", &page).unwrap(),
        BridgeValue::Bool(true)
    );
    assert_eq!(
        engine.eval("1.5", "kinds.py", &page).unwrap(),
        BridgeValue::Float(1.5)
    );
    let seq = engine.eval("[1, 'two', None]", "kinds.py", &page).unwrap();
    assert_eq!(
        seq,
        BridgeValue::Seq(vec![
            BridgeValue::Int(1),
            BridgeValue::Str("two".to_string()),
            BridgeValue::Null,
        ])
    );
    let map = engine.eval("{'k': [1, 2]}", "kinds.py", &page).unwrap();
    let map = map.as_map().expect("map value");
    assert_eq!(
        map.get("k"),
        Some(&BridgeValue::Seq(vec![
            BridgeValue::Int(1),
            BridgeValue::Int(2)
        ]))
    );
}

#[test]
fn statement_only_script_yields_null() {
    let engine = engine();
    let page = origin("https://page.test");
    assert_eq!(
        engine.eval("stmt_only = 41", "stmt.py", &page).unwrap(),
        BridgeValue::Null
    );
}

#[test]
fn main_namespace_persists_between_evals() {
    let engine = engine();
    let page = origin("https://page.test");
    engine.eval("persist_x = 41", "persist.py", &page).unwrap();
    assert_eq!(
        engine.eval("persist_x + 1", "persist.py", &page).unwrap(),
        BridgeValue::Int(42)
    );
}

#[test]
fn top_level_functions_can_recurse() {
    let engine = engine();
    let page = origin("https://page.test");
    let source = "def fact(n):\n    return 1 if n <= 1 else n * fact(n - 1)\nfact(5)";
    assert_eq!(
        engine.eval(source, "fact.py", &page).unwrap(),
        BridgeValue::Int(120)
    );
}

#[test]
fn script_unit_compiles_runs_and_reruns() {
    engine();
    let mut unit =
        ScriptUnit::create("unit_v = 10\nunit_v * 2", "unit.py", origin("https://page.test"))
            .unwrap();
    assert_eq!(unit.state(), ScriptState::Compiled);
    assert_eq!(unit.run().unwrap(), BridgeValue::Int(20));
    assert_eq!(unit.state(), ScriptState::Completed);
    // Re-running reuses the compiled artifact and the unit's namespace.
    assert_eq!(unit.run().unwrap(), BridgeValue::Int(20));
}

#[test]
fn compile_error_is_terminal() {
    engine();
    let mut unit = ScriptUnit::create("def (", "broken.py", origin("https://page.test")).unwrap();
    assert_eq!(unit.state(), ScriptState::CompileFailed);
    assert!(matches!(unit.error(), Some(EmbedError::Compile { .. })));
    let err = unit.run().unwrap_err();
    assert!(matches!(err, EmbedError::Compile { .. }));
    assert_eq!(unit.state(), ScriptState::CompileFailed);
}

#[test]
fn runtime_failure_is_terminal_and_recorded() {
    engine();
    let mut unit = ScriptUnit::create("1 / 0", "div.py", origin("https://page.test")).unwrap();
    let err = unit.run().unwrap_err();
    match &err {
        EmbedError::Guest {
            type_name,
            traceback,
            ..
        } => {
            assert_eq!(type_name, "ZeroDivisionError");
            assert!(!traceback.is_empty());
        }
        other => panic!("expected guest error, got {other:?}"),
    }
    assert_eq!(unit.state(), ScriptState::RuntimeFailed);
    // A failed unit replays its recorded error without executing.
    assert_eq!(unit.run().unwrap_err(), err);
}

#[test]
fn unit_namespaces_are_isolated() {
    engine();
    let page = origin("https://page.test");
    let mut writer = ScriptUnit::create("leaky = 1", "writer.py", page.clone()).unwrap();
    writer.run().unwrap();
    let mut reader = ScriptUnit::create("leaky", "reader.py", page).unwrap();
    let err = reader.run().unwrap_err();
    assert!(matches!(err, EmbedError::Guest { type_name, .. } if type_name == "NameError"));
}

#[test]
fn new_source_under_old_filename_runs_new_artifact() {
    let engine = engine();
    let page = origin("https://page.test");
    assert_eq!(
        engine.eval("CACHE_PROBE = 1\nCACHE_PROBE", "cached.py", &page).unwrap(),
        BridgeValue::Int(1)
    );
    assert_eq!(
        engine.eval("CACHE_PROBE = 2\nCACHE_PROBE", "cached.py", &page).unwrap(),
        BridgeValue::Int(2)
    );
}

#[test]
fn muted_unit_surfaces_generic_error_only() {
    engine();
    let mut unit = ScriptUnit::create_with_options(
        "1 / 0",
        "crossorigin.py",
        origin("https://cdn.other"),
        true,
    )
    .unwrap();
    assert!(unit.origin().is_opaque());
    let err = unit.run().unwrap_err();
    match err {
        EmbedError::Guest {
            message, traceback, ..
        } => {
            assert_eq!(message, "Script error.");
            assert!(traceback.is_empty());
        }
        other => panic!("expected muted guest error, got {other:?}"),
    }
    // Host-side diagnostics still carry the real failure.
    assert!(
        matches!(unit.error(), Some(EmbedError::Guest { type_name, .. }) if type_name == "ZeroDivisionError")
    );
}

#[test]
fn back_to_back_executions_never_interleave() {
    let engine = engine();
    let page = origin("https://page.test");
    engine.eval("ord_counter = 0", "counter.py", &page).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let page = page.clone();
            thread::spawn(move || {
                let engine = common::engine();
                let mut seen = Vec::new();
                for _ in 0..5 {
                    let value = engine
                        .eval(
                            "ord_counter = ord_counter + 1\nord_counter",
                            "counter_step.py",
                            &page,
                        )
                        .unwrap();
                    seen.push(value.as_int().expect("counter is an int"));
                }
                seen
            })
        })
        .collect();

    let mut observed: Vec<i64> = handles
        .into_iter()
        .flat_map(|handle| handle.join().unwrap())
        .collect();
    observed.sort_unstable();
    // Strict ordering: every execution saw a unique, gap-free counter value.
    assert_eq!(observed, (1..=40).collect::<Vec<_>>());
}

mod common;

use common::{engine, origin};
use proptest::prelude::*;
use pyweb_engine::{BridgeValue, ForeignObject};

/// A guest identity function; calling it pushes a host value through
/// both conversion directions.
fn identity() -> ForeignObject {
    let engine = engine();
    let value = engine
        .eval("lambda v: v", "identity.py", &origin("https://page.test"))
        .unwrap();
    value.as_foreign().expect("lambda is proxied").clone()
}

#[test]
fn scalars_round_trip_through_the_guest() {
    let engine = engine();
    let through = identity();
    for value in [
        BridgeValue::Null,
        BridgeValue::Bool(false),
        BridgeValue::Int(-42),
        BridgeValue::Float(2.5),
        BridgeValue::Str("héllo".to_string()),
    ] {
        let back = engine.foreign_call(&through, &[value.clone()]).unwrap();
        assert_eq!(back, value);
    }
}

#[test]
fn nested_containers_round_trip() {
    let engine = engine();
    let through = identity();
    let value = BridgeValue::Map(
        [
            (
                "items".to_string(),
                BridgeValue::Seq(vec![
                    BridgeValue::Int(1),
                    BridgeValue::Str("two".to_string()),
                    BridgeValue::Null,
                ]),
            ),
            ("flag".to_string(), BridgeValue::Bool(true)),
        ]
        .into_iter()
        .collect(),
    );
    let back = engine.foreign_call(&through, &[value.clone()]).unwrap();
    assert_eq!(back, value);
}

#[test]
fn oversized_guest_integer_degrades_to_float() {
    let engine = engine();
    let value = engine
        .eval("10 ** 20", "bigint.py", &origin("https://page.test"))
        .unwrap();
    let BridgeValue::Float(f) = value else {
        panic!("expected float fallback, got {value:?}");
    };
    assert!((f - 1e20).abs() < 1e7);
}

#[test]
fn tuples_convert_to_sequences() {
    let engine = engine();
    assert_eq!(
        engine
            .eval("(1, 'a')", "tuple.py", &origin("https://page.test"))
            .unwrap(),
        BridgeValue::Seq(vec![BridgeValue::Int(1), BridgeValue::Str("a".to_string())])
    );
}

#[test]
fn non_string_keyed_dict_is_proxied_not_converted() {
    let engine = engine();
    let value = engine
        .eval("{1: 'a'}", "intkeys.py", &origin("https://page.test"))
        .unwrap();
    let handle = value.as_foreign().expect("dict with int keys is proxied");
    assert_eq!(handle.type_name(), "dict");
}

#[test]
fn sets_are_proxied() {
    let engine = engine();
    let value = engine
        .eval("{1, 2}", "set.py", &origin("https://page.test"))
        .unwrap();
    assert_eq!(value.as_foreign().expect("set is proxied").type_name(), "set");
}

#[test]
fn excessively_deep_host_value_is_a_conversion_error() {
    let engine = engine();
    let through = identity();
    let mut value = BridgeValue::Int(1);
    for _ in 0..80 {
        value = BridgeValue::Seq(vec![value]);
    }
    let err = engine.foreign_call(&through, &[value]).unwrap_err();
    assert!(
        matches!(err, pyweb_engine::EmbedError::Conversion(_)),
        "got {err:?}"
    );
}

fn value_strategy() -> impl Strategy<Value = BridgeValue> {
    let leaf = prop_oneof![
        Just(BridgeValue::Null),
        any::<bool>().prop_map(BridgeValue::Bool),
        any::<i64>().prop_map(BridgeValue::Int),
        (-1.0e9f64..1.0e9f64).prop_map(BridgeValue::Float),
        "[a-z0-9 ]{0,12}".prop_map(BridgeValue::Str),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(BridgeValue::Seq),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|map| BridgeValue::Map(map.into_iter().collect())),
        ]
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn foreign_free_values_round_trip_losslessly(value in value_strategy()) {
        prop_assert!(value.is_foreign_free());
        let engine = engine();
        let through = identity();
        let back = engine.foreign_call(&through, &[value.clone()]).unwrap();
        prop_assert_eq!(back, value);
    }
}

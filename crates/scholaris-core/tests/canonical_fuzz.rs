// SPDX-License-Identifier: Apache-2.0

use proptest::prelude::*;
use scholaris_core::canonical::{stable_hash_hex, stable_json_bytes, stable_json_hash_hex};
use serde_json::{Map, Value};

fn arbitrary_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 ]{0,12}".prop_map(Value::String),
    ];
    leaf.prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            proptest::collection::btree_map("[a-z]{1,8}", inner, 0..6)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

proptest! {
    #[test]
    fn bytes_are_invariant_under_key_insertion_order(value in arbitrary_json()) {
        let reversed = reverse_key_order(value.clone());
        prop_assert_eq!(
            stable_json_bytes(&value).expect("bytes"),
            stable_json_bytes(&reversed).expect("reversed bytes"),
        );
    }

    #[test]
    fn normalization_is_idempotent(value in arbitrary_json()) {
        let once = stable_json_bytes(&value).expect("bytes");
        let reparsed: Value = serde_json::from_slice(&once).expect("reparse");
        prop_assert_eq!(once, stable_json_bytes(&reparsed).expect("bytes again"));
    }

    #[test]
    fn json_hash_is_the_hash_of_the_stable_bytes(value in arbitrary_json()) {
        let bytes = stable_json_bytes(&value).expect("bytes");
        prop_assert_eq!(
            stable_json_hash_hex(&value).expect("hash"),
            stable_hash_hex(&bytes),
        );
    }
}

/// Rebuilds every object with its entries inserted back-to-front, so the
/// serde_json map iteration order differs from the source value's.
fn reverse_key_order(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut reversed = Map::new();
            let mut entries: Vec<(String, Value)> =
                map.into_iter().map(|(k, v)| (k, reverse_key_order(v))).collect();
            entries.reverse();
            for (key, value) in entries {
                reversed.insert(key, value);
            }
            Value::Object(reversed)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(reverse_key_order).collect()),
        other => other,
    }
}

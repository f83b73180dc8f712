use scholaris_core::canonical::{stable_json_bytes, stable_json_hash_hex};
use scholaris_core::{sha256_hex, ExitCode, MachineError};
use serde_json::json;

#[test]
fn stable_json_bytes_sorts_object_keys_recursively() {
    let a = json!({"b": 2, "a": {"z": 1, "y": [ {"k": 1, "j": 2} ]}});
    let b = json!({"a": {"y": [ {"j": 2, "k": 1} ], "z": 1}, "b": 2});
    let bytes_a = stable_json_bytes(&a).expect("bytes a");
    let bytes_b = stable_json_bytes(&b).expect("bytes b");
    assert_eq!(bytes_a, bytes_b);
}

#[test]
fn stable_hash_is_deterministic_across_key_order() {
    let a = json!({"query": "grafen", "size": 20});
    let b = json!({"size": 20, "query": "grafen"});
    assert_eq!(
        stable_json_hash_hex(&a).expect("hash a"),
        stable_json_hash_hex(&b).expect("hash b"),
    );
}

#[test]
fn sha256_hex_matches_known_vector() {
    assert_eq!(
        sha256_hex(b"abc"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn exit_codes_keep_their_numeric_contract() {
    assert_eq!(ExitCode::Success as u8, 0);
    assert_eq!(ExitCode::Usage as u8, 2);
    assert_eq!(ExitCode::Validation as u8, 3);
    assert_eq!(ExitCode::DependencyFailure as u8, 4);
    assert_eq!(ExitCode::Internal as u8, 10);
    assert_eq!(ExitCode::DependencyFailure.as_str(), "dependency_failure");
}

#[test]
fn machine_error_round_trips_with_details() {
    let err = MachineError::new("upstream", "elasticsearch unreachable")
        .with_detail("url", "http://localhost:9200");
    let encoded = serde_json::to_string(&err).expect("encode");
    let decoded: MachineError = serde_json::from_str(&encoded).expect("decode");
    assert_eq!(err, decoded);
    assert_eq!(decoded.details.get("url").map(String::as_str), Some("http://localhost:9200"));
}

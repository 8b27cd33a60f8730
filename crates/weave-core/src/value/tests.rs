use crate::value::{Key, KeyError, Value};
use std::cmp::Ordering;

#[test]
fn unsigned_foreign_keys_normalize_to_signed_keys() {
    let pk = Key::try_from_value(&Value::Int(7)).expect("int should be key-compatible");
    let fk = Key::try_from_value(&Value::Uint(7)).expect("uint should be key-compatible");

    assert_eq!(pk, fk, "signed and unsigned 7 should be the same key");
}

#[test]
fn null_and_float_values_are_not_keys() {
    assert_eq!(Key::try_from_value(&Value::Null), Err(KeyError::Null));
    assert!(matches!(
        Key::try_from_value(&Value::Float(1.5)),
        Err(KeyError::Incompatible(_))
    ));
}

#[test]
fn compare_crosses_numeric_families() {
    assert_eq!(Value::Int(-1).compare(&Value::Uint(3)), Some(Ordering::Less));
    assert_eq!(
        Value::Uint(2).compare(&Value::Float(2.0)),
        Some(Ordering::Equal)
    );
    assert_eq!(Value::Text("a".into()).compare(&Value::Int(1)), None);
}

#[test]
fn untagged_json_shape_is_plain() {
    let value = Value::List(vec![Value::Int(1), Value::Text("x".into()), Value::Null]);
    let json = serde_json::to_string(&value).expect("value should serialize");

    assert_eq!(json, r#"[1,"x",null]"#);
}

#[test]
fn key_display_is_bare() {
    assert_eq!(Key::Int(3).to_string(), "3");
    assert_eq!(Key::from("abc").to_string(), "abc");
}

//! `Object` static helpers and plain-object instance methods.

use crate::error::EcError;
use crate::value::{ObjectData, Value};

use super::{arg, native, object_from};

pub fn make_object_constructor() -> Value {
    object_from(vec![
        ("keys", native("keys", |_ev, _this, args| {
            Ok(match arg(&args, 0) {
                Value::Object(entries) => Value::array(entries.borrow().keys().map(|k| Value::string(k.clone())).collect()),
                _ => Value::array(vec![]),
            })
        })),
        ("values", native("values", |_ev, _this, args| {
            Ok(match arg(&args, 0) {
                Value::Object(entries) => Value::array(entries.borrow().values().cloned().collect()),
                _ => Value::array(vec![]),
            })
        })),
        ("entries", native("entries", |_ev, _this, args| {
            Ok(match arg(&args, 0) {
                Value::Object(entries) => Value::array(
                    entries.borrow().iter().map(|(k, v)| Value::array(vec![Value::string(k.clone()), v.clone()])).collect(),
                ),
                _ => Value::array(vec![]),
            })
        })),
        ("assign", native("assign", |_ev, _this, args| {
            let Some(Value::Object(target)) = args.first().cloned() else {
                return Ok(Value::empty_object());
            };
            for source in &args[1..] {
                if let Value::Object(entries) = source {
                    for (k, v) in entries.borrow().iter() {
                        target.borrow_mut().insert(k.clone(), v.clone());
                    }
                }
            }
            Ok(Value::Object(target))
        })),
        ("fromEntries", native("fromEntries", |_ev, _this, args| {
            let mut map = indexmap::IndexMap::new();
            if let Value::Array(pairs) = arg(&args, 0) {
                for pair in pairs.borrow().iter() {
                    if let Value::Array(kv) = pair {
                        let kv = kv.borrow();
                        if let (Some(k), Some(v)) = (kv.first(), kv.get(1)) {
                            map.insert(k.to_coerced_string(), v.clone());
                        }
                    }
                }
            }
            Ok(Value::object(map))
        })),
        ("freeze", native("freeze", |_ev, _this, args| Ok(arg(&args, 0)))),
    ])
}

pub fn dispatch(entries: &ObjectData, name: &str, args: Vec<Value>) -> Option<Result<Value, EcError>> {
    Some(Ok(match name {
        "hasOwnProperty" => Value::Boolean(entries.borrow().contains_key(&arg(&args, 0).to_coerced_string())),
        "toString" => Value::string("[object Object]"),
        "valueOf" => Value::Object(entries.clone()),
        _ => return None,
    }))
}

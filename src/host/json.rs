//! `JSON.parse`/`JSON.stringify`, bridging through `serde_json::Value`,
//! preserving property insertion order via the `preserve_order`
//! feature so round trips through an object literal stay stable.

use indexmap::IndexMap;
use serde_json::Value as Json;

use crate::error::{EcError, RuntimeError};
use crate::value::Value;

use super::{arg, native, object_from};

pub fn make_json() -> Value {
    object_from(vec![
        ("parse", native("parse", |_ev, _this, args| {
            let text = arg(&args, 0).to_coerced_string();
            let parsed: Json = serde_json::from_str(&text)
                .map_err(|e| RuntimeError::new(format!("invalid JSON: {e}"), None))?;
            Ok(json_to_value(&parsed))
        })),
        ("stringify", native("stringify", |_ev, _this, args| {
            let value = arg(&args, 0);
            let indent = match arg(&args, 2) {
                Value::Number(n) => n as usize,
                Value::String(s) => return stringify_pretty_with_string(&value, &s),
                _ => 0,
            };
            let json = value_to_json(&value);
            let text = if indent > 0 {
                let buf = Vec::new();
                let mut ser = serde_json::Serializer::with_formatter(
                    buf,
                    serde_json::ser::PrettyFormatter::with_indent(" ".repeat(indent).as_bytes()),
                );
                use serde::Serialize;
                json.serialize(&mut ser).map_err(|e| RuntimeError::new(e.to_string(), None))?;
                String::from_utf8(ser.into_inner()).unwrap_or_default()
            } else {
                serde_json::to_string(&json).map_err(|e| RuntimeError::new(e.to_string(), None))?
            };
            Ok(Value::string(text))
        })),
    ])
}

fn stringify_pretty_with_string(value: &Value, indent: &str) -> Result<Value, EcError> {
    let json = value_to_json(value);
    let buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(
        buf,
        serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes()),
    );
    use serde::Serialize;
    json.serialize(&mut ser).map_err(|e| RuntimeError::new(e.to_string(), None))?;
    Ok(Value::string(String::from_utf8(ser.into_inner()).unwrap_or_default()))
}

pub fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Undefined => Json::Null,
        Value::Null => Json::Null,
        Value::Boolean(b) => Json::Bool(*b),
        Value::Number(n) => serde_json::Number::from_f64(*n).map(Json::Number).unwrap_or(Json::Null),
        Value::String(s) => Json::String(s.to_string()),
        Value::Array(items) => Json::Array(items.borrow().iter().map(value_to_json).collect()),
        Value::Object(entries) => {
            let mut map = serde_json::Map::new();
            for (k, v) in entries.borrow().iter() {
                if !matches!(v, Value::Function(_) | Value::Undefined) {
                    map.insert(k.clone(), value_to_json(v));
                }
            }
            Json::Object(map)
        }
        Value::Date(d) => Json::String(d.to_rfc3339()),
        other => Json::String(other.to_coerced_string()),
    }
}

pub fn json_to_value(json: &Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Boolean(*b),
        Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        Json::String(s) => Value::string(s.clone()),
        Json::Array(items) => Value::array(items.iter().map(json_to_value).collect()),
        Json::Object(entries) => {
            let mut map = IndexMap::new();
            for (k, v) in entries {
                map.insert(k.clone(), json_to_value(v));
            }
            Value::object(map)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::Evaluator;

    #[test]
    fn round_trips_nested_object_preserving_key_order() {
        let mut ev = Evaluator::new();
        let json_obj = make_json();
        let stringify = match &json_obj {
            Value::Object(e) => e.borrow().get("stringify").cloned().unwrap(),
            _ => unreachable!(),
        };
        let parse = match &json_obj {
            Value::Object(e) => e.borrow().get("parse").cloned().unwrap(),
            _ => unreachable!(),
        };
        let mut obj = IndexMap::new();
        obj.insert("b".to_string(), Value::Number(2.0));
        obj.insert("a".to_string(), Value::Number(1.0));
        let text = ev.call_value(stringify, Value::Undefined, vec![Value::object(obj)], None).unwrap();
        let parsed = ev.call_value(parse, Value::Undefined, vec![text], None).unwrap();
        if let Value::Object(entries) = parsed {
            let keys: Vec<_> = entries.borrow().keys().cloned().collect();
            assert_eq!(keys, vec!["b", "a"]);
        } else {
            panic!("expected object");
        }
    }
}

//! `Buffer` constructor, instance methods, and the `buffer` built-in module
//!.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::EcError;
use crate::value::Value;

use super::{arg, native};

pub fn construct_buffer(args: &[Value]) -> Value {
    match args.first() {
        Some(Value::Number(n)) => Value::Buffer(Rc::new(vec![0u8; n.max(0.0) as usize])),
        Some(Value::String(s)) => Value::Buffer(Rc::new(s.as_bytes().to_vec())),
        Some(Value::Array(items)) => {
            Value::Buffer(Rc::new(items.borrow().iter().map(|v| v.to_number() as u8).collect()))
        }
        _ => Value::Buffer(Rc::new(Vec::new())),
    }
}

pub fn dispatch(b: &Rc<Vec<u8>>, name: &str, args: Vec<Value>) -> Option<Result<Value, EcError>> {
    Some(Ok(match name {
        "toString" => {
            let encoding = args.first().map(Value::to_coerced_string).unwrap_or_else(|| "utf8".to_string());
            match encoding.as_str() {
                "hex" => Value::string(b.iter().map(|byte| format!("{byte:02x}")).collect::<String>()),
                "base64" => Value::string(base64_encode(b)),
                _ => Value::string(String::from_utf8_lossy(b).to_string()),
            }
        }
        "slice" | "subarray" => {
            let len = b.len();
            let start = args.first().map(|v| v.to_number().max(0.0) as usize).unwrap_or(0).min(len);
            let end = args.get(1).map(|v| v.to_number().max(0.0) as usize).unwrap_or(len).min(len);
            Value::Buffer(Rc::new(b[start..end.max(start)].to_vec()))
        }
        "equals" => match arg(&args, 0) {
            Value::Buffer(other) => Value::Boolean(b.as_ref() == other.as_ref()),
            _ => Value::Boolean(false),
        },
        _ => return None,
    }))
}

pub fn exports() -> IndexMap<String, Value> {
    let mut map = IndexMap::new();
    map.insert(
        "from".to_string(),
        native("from", |_ev, _this, args| Ok(construct_buffer(&args))),
    );
    map.insert(
        "alloc".to_string(),
        native("alloc", |_ev, _this, args| Ok(construct_buffer(&args))),
    );
    map.insert(
        "isBuffer".to_string(),
        native("isBuffer", |_ev, _this, args| Ok(Value::Boolean(matches!(arg(&args, 0), Value::Buffer(_))))),
    );
    map.insert(
        "Buffer".to_string(),
        native("Buffer", |_ev, _this, args| Ok(construct_buffer(&args))),
    );
    map
}

const BASE64_ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

fn base64_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity((bytes.len() + 2) / 3 * 4);
    for chunk in bytes.chunks(3) {
        let b0 = chunk[0] as u32;
        let b1 = chunk.get(1).copied().unwrap_or(0) as u32;
        let b2 = chunk.get(2).copied().unwrap_or(0) as u32;
        let triple = (b0 << 16) | (b1 << 8) | b2;
        out.push(BASE64_ALPHABET[(triple >> 18 & 0x3f) as usize] as char);
        out.push(BASE64_ALPHABET[(triple >> 12 & 0x3f) as usize] as char);
        out.push(if chunk.len() > 1 { BASE64_ALPHABET[(triple >> 6 & 0x3f) as usize] as char } else { '=' });
        out.push(if chunk.len() > 2 { BASE64_ALPHABET[(triple & 0x3f) as usize] as char } else { '=' });
    }
    out
}

//! The `querystring` built-in module.

use indexmap::IndexMap;

use crate::value::Value;

use super::{arg, native};

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                if let Ok(byte) = u8::from_str_radix(std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or(""), 16) {
                    out.push(byte);
                    i += 3;
                } else {
                    out.push(bytes[i]);
                    i += 1;
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).to_string()
}

fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

pub fn exports() -> IndexMap<String, Value> {
    let mut map = IndexMap::new();
    map.insert("parse".to_string(), native("parse", |_ev, _this, args| {
        let input = arg(&args, 0).to_coerced_string();
        let input = input.strip_prefix('?').unwrap_or(&input);
        let mut result = IndexMap::new();
        for pair in input.split('&').filter(|p| !p.is_empty()) {
            let mut parts = pair.splitn(2, '=');
            let key = percent_decode(parts.next().unwrap_or(""));
            let value = percent_decode(parts.next().unwrap_or(""));
            result.insert(key, Value::string(value));
        }
        Ok(Value::object(result))
    }));
    map.insert("stringify".to_string(), native("stringify", |_ev, _this, args| {
        let Value::Object(entries) = arg(&args, 0) else {
            return Ok(Value::string(""));
        };
        let pairs: Vec<String> = entries
            .borrow()
            .iter()
            .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(&v.to_coerced_string())))
            .collect();
        Ok(Value::string(pairs.join("&")))
    }));
    map
}

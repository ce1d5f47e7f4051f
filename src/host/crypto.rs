//! The `crypto` built-in module: hashing and random-id generation.
//! No asymmetric crypto or TLS — out of scope for a scripting-language core.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::error::RuntimeError;
use crate::value::Value;

use super::{arg, native, object_from};

pub fn exports() -> IndexMap<String, Value> {
    let mut map = IndexMap::new();
    map.insert("createHash".to_string(), native("createHash", |_ev, _this, args| {
        let algorithm = arg(&args, 0).to_coerced_string();
        if algorithm != "sha256" {
            return Err(RuntimeError::new(format!("unsupported digest algorithm '{algorithm}'"), None).into());
        }
        let buffer = Rc::new(RefCell::new(Vec::<u8>::new()));
        let update_buffer = buffer.clone();
        let digest_buffer = buffer.clone();
        Ok(object_from(vec![
            ("update", native("update", move |_ev, this, args| {
                let chunk = match arg(&args, 0) {
                    Value::Buffer(b) => b.as_ref().clone(),
                    other => other.to_coerced_string().into_bytes(),
                };
                update_buffer.borrow_mut().extend(chunk);
                Ok(this)
            })),
            ("digest", native("digest", move |_ev, _this, args| {
                let encoding = args.first().map(Value::to_coerced_string).unwrap_or_else(|| "hex".to_string());
                let mut hasher = Sha256::new();
                hasher.update(&*digest_buffer.borrow());
                let result = hasher.finalize();
                Ok(match encoding.as_str() {
                    "hex" => Value::string(format!("{result:x}")),
                    _ => Value::Buffer(Rc::new(result.to_vec())),
                })
            })),
        ]))
    }));
    map.insert("randomBytes".to_string(), native("randomBytes", |_ev, _this, args| {
        let n = arg(&args, 0).to_number().max(0.0) as usize;
        let bytes: Vec<u8> = (0..n).map(|_| rand::thread_rng().gen()).collect();
        Ok(Value::Buffer(Rc::new(bytes)))
    }));
    map.insert("randomUUID".to_string(), native("randomUUID", |_ev, _this, _args| {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill(&mut bytes);
        bytes[6] = (bytes[6] & 0x0f) | 0x40;
        bytes[8] = (bytes[8] & 0x3f) | 0x80;
        let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02x}")).collect();
        let joined = hex.join("");
        Ok(Value::string(format!(
            "{}-{}-{}-{}-{}",
            &joined[0..8],
            &joined[8..12],
            &joined[12..16],
            &joined[16..20],
            &joined[20..32]
        )))
    }));
    map.insert("randomInt".to_string(), native("randomInt", |_ev, _this, args| {
        let (min, max) = if args.len() >= 2 {
            (arg(&args, 0).to_number() as i64, arg(&args, 1).to_number() as i64)
        } else {
            (0, arg(&args, 0).to_number() as i64)
        };
        Ok(Value::Number(rand::thread_rng().gen_range(min..max.max(min + 1)) as f64))
    }));
    map
}

//! The `fs` built-in module: synchronous filesystem operations only, no
//! callback/Promise-based variants.

use indexmap::IndexMap;

use crate::error::HostError;
use crate::value::Value;

use super::{arg, native, object_from};

pub fn exports() -> IndexMap<String, Value> {
    let mut map = IndexMap::new();
    map.insert("readFileSync".to_string(), native("readFileSync", |_ev, _this, args| {
        let path = arg(&args, 0).to_coerced_string();
        let encoding = args.get(1).map(Value::to_coerced_string);
        let bytes = std::fs::read(&path).map_err(|e| HostError::new(format!("ENOENT: {e}, open '{path}'")))?;
        Ok(match encoding.as_deref() {
            Some("utf8") | Some("utf-8") => Value::string(String::from_utf8_lossy(&bytes).to_string()),
            _ => Value::Buffer(std::rc::Rc::new(bytes)),
        })
    }));
    map.insert("writeFileSync".to_string(), native("writeFileSync", |_ev, _this, args| {
        let path = arg(&args, 0).to_coerced_string();
        let contents = match arg(&args, 1) {
            Value::Buffer(b) => b.as_ref().clone(),
            other => other.to_coerced_string().into_bytes(),
        };
        std::fs::write(&path, contents).map_err(|e| HostError::new(format!("cannot write '{path}': {e}")))?;
        Ok(Value::Undefined)
    }));
    map.insert("appendFileSync".to_string(), native("appendFileSync", |_ev, _this, args| {
        use std::io::Write;
        let path = arg(&args, 0).to_coerced_string();
        let contents = arg(&args, 1).to_coerced_string();
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&path)
            .map_err(|e| HostError::new(format!("cannot open '{path}': {e}")))?;
        file.write_all(contents.as_bytes()).map_err(|e| HostError::new(e.to_string()))?;
        Ok(Value::Undefined)
    }));
    map.insert("existsSync".to_string(), native("existsSync", |_ev, _this, args| {
        Ok(Value::Boolean(std::path::Path::new(&arg(&args, 0).to_coerced_string()).exists()))
    }));
    map.insert("mkdirSync".to_string(), native("mkdirSync", |_ev, _this, args| {
        let path = arg(&args, 0).to_coerced_string();
        let recursive = matches!(arg(&args, 1), Value::Object(opts) if opts.borrow().get("recursive").map(Value::is_truthy).unwrap_or(false));
        let result = if recursive { std::fs::create_dir_all(&path) } else { std::fs::create_dir(&path) };
        result.map_err(|e| HostError::new(format!("cannot create directory '{path}': {e}")))?;
        Ok(Value::Undefined)
    }));
    map.insert("readdirSync".to_string(), native("readdirSync", |_ev, _this, args| {
        let path = arg(&args, 0).to_coerced_string();
        let entries = std::fs::read_dir(&path).map_err(|e| HostError::new(format!("cannot read directory '{path}': {e}")))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| HostError::new(e.to_string()))?;
            names.push(Value::string(entry.file_name().to_string_lossy().to_string()));
        }
        Ok(Value::array(names))
    }));
    map.insert("statSync".to_string(), native("statSync", |_ev, _this, args| {
        let path = arg(&args, 0).to_coerced_string();
        let meta = std::fs::metadata(&path).map_err(|e| HostError::new(format!("cannot stat '{path}': {e}")))?;
        Ok(object_from(vec![
            ("size", Value::Number(meta.len() as f64)),
            ("isFile", Value::Boolean(meta.is_file())),
            ("isDirectory", Value::Boolean(meta.is_dir())),
        ]))
    }));
    map.insert("unlinkSync".to_string(), native("unlinkSync", |_ev, _this, args| {
        let path = arg(&args, 0).to_coerced_string();
        std::fs::remove_file(&path).map_err(|e| HostError::new(format!("cannot remove '{path}': {e}")))?;
        Ok(Value::Undefined)
    }));
    map
}

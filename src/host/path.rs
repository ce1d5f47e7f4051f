//! The `path` built-in module.

use indexmap::IndexMap;

use crate::value::Value;

use super::{arg, native};

pub fn exports() -> IndexMap<String, Value> {
    let mut map = IndexMap::new();
    map.insert("sep".to_string(), Value::string(std::path::MAIN_SEPARATOR.to_string()));
    map.insert("join".to_string(), native("join", |_ev, _this, args| {
        let mut path = std::path::PathBuf::new();
        for a in &args {
            path.push(a.to_coerced_string());
        }
        Ok(Value::string(normalize(&path.to_string_lossy())))
    }));
    map.insert("resolve".to_string(), native("resolve", |_ev, _this, args| {
        let mut path = std::env::current_dir().unwrap_or_default();
        for a in &args {
            let s = a.to_coerced_string();
            if s.starts_with('/') {
                path = std::path::PathBuf::from(s);
            } else {
                path.push(s);
            }
        }
        Ok(Value::string(path.to_string_lossy().to_string()))
    }));
    map.insert("dirname".to_string(), native("dirname", |_ev, _this, args| {
        let p = std::path::Path::new(&arg(&args, 0).to_coerced_string()).to_path_buf();
        Ok(Value::string(p.parent().map(|d| d.to_string_lossy().to_string()).unwrap_or_else(|| ".".to_string())))
    }));
    map.insert("basename".to_string(), native("basename", |_ev, _this, args| {
        let p = std::path::Path::new(&arg(&args, 0).to_coerced_string()).to_path_buf();
        let name = p.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        let ext = args.get(1).map(Value::to_coerced_string).unwrap_or_default();
        Ok(Value::string(if !ext.is_empty() && name.ends_with(&ext) {
            name[..name.len() - ext.len()].to_string()
        } else {
            name
        }))
    }));
    map.insert("extname".to_string(), native("extname", |_ev, _this, args| {
        let p = std::path::Path::new(&arg(&args, 0).to_coerced_string()).to_path_buf();
        Ok(Value::string(p.extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default()))
    }));
    map.insert("isAbsolute".to_string(), native("isAbsolute", |_ev, _this, args| {
        Ok(Value::Boolean(arg(&args, 0).to_coerced_string().starts_with('/')))
    }));
    map.insert("normalize".to_string(), native("normalize", |_ev, _this, args| {
        Ok(Value::string(normalize(&arg(&args, 0).to_coerced_string())))
    }));
    map
}

fn normalize(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if matches!(parts.last(), Some(p) if *p != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            seg => parts.push(seg),
        }
    }
    let joined = parts.join("/");
    if absolute { format!("/{joined}") } else if joined.is_empty() { ".".to_string() } else { joined }
}

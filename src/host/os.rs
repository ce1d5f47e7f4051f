//! The `os` built-in module.

use indexmap::IndexMap;

use crate::value::Value;

use super::native;

pub fn exports() -> IndexMap<String, Value> {
    let mut map = IndexMap::new();
    map.insert("platform".to_string(), native("platform", |_ev, _this, _args| Ok(Value::string(std::env::consts::OS))));
    map.insert("arch".to_string(), native("arch", |_ev, _this, _args| Ok(Value::string(std::env::consts::ARCH))));
    map.insert("hostname".to_string(), native("hostname", |_ev, _this, _args| {
        Ok(Value::string(
            hostname_fallback(),
        ))
    }));
    map.insert("tmpdir".to_string(), native("tmpdir", |_ev, _this, _args| {
        Ok(Value::string(std::env::temp_dir().to_string_lossy().to_string()))
    }));
    map.insert("homedir".to_string(), native("homedir", |_ev, _this, _args| {
        Ok(Value::string(dirs::home_dir().map(|p| p.to_string_lossy().to_string()).unwrap_or_default()))
    }));
    map.insert("EOL".to_string(), Value::string(if cfg!(windows) { "\r\n" } else { "\n" }));
    map.insert("cpus".to_string(), native("cpus", |_ev, _this, _args| {
        let count = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Ok(Value::array((0..count).map(|_| Value::empty_object()).collect()))
    }));
    map
}

fn hostname_fallback() -> String {
    std::env::var("HOSTNAME").or_else(|_| std::env::var("COMPUTERNAME")).unwrap_or_else(|_| "localhost".to_string())
}

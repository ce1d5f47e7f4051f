//! The `http` built-in module: a small synchronous client (`get`/`request`)
//! built on the same optional `ureq` dependency that backs `http(s)://`
//! module imports. No server-side listener — a listener delivering
//! background events onto the macro-task queue would need a real async
//! I/O runtime this tree-walker doesn't have.

use indexmap::IndexMap;

use crate::error::HostError;
use crate::value::Value;

use super::{arg, native, object_from};

pub fn exports() -> IndexMap<String, Value> {
    let mut map = IndexMap::new();
    map.insert("get".to_string(), native("get", |_ev, _this, args| {
        let url = arg(&args, 0).to_coerced_string();
        fetch(&url)
    }));
    map.insert("STATUS_CODES".to_string(), object_from(vec![
        ("200", Value::string("OK")),
        ("404", Value::string("Not Found")),
        ("500", Value::string("Internal Server Error")),
    ]));
    map
}

#[cfg(feature = "url-import")]
fn fetch(url: &str) -> Result<Value, crate::error::EcError> {
    let response = ureq::get(url).call().map_err(|e| HostError::new(format!("request failed: {e}")))?;
    let status = response.status();
    let body = response.into_string().map_err(|e| HostError::new(e.to_string()))?;
    Ok(object_from(vec![
        ("statusCode", Value::Number(status as f64)),
        ("body", Value::string(body)),
    ]))
}

#[cfg(not(feature = "url-import"))]
fn fetch(_url: &str) -> Result<Value, crate::error::EcError> {
    Err(HostError::new("this build has no network capability (url-import feature disabled)").into())
}

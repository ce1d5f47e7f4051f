//! The `url` built-in module: a pragmatic hand-rolled parser for the
//! `scheme://host:port/path?query#hash` shape. Not a full RFC 3986
//! implementation — no dependency on a dedicated URL crate is carried since
//! nothing else in this host surface needs one.

use indexmap::IndexMap;

use crate::value::Value;

use super::{arg, native, object_from};

struct ParsedUrl {
    protocol: String,
    host: String,
    hostname: String,
    port: String,
    pathname: String,
    search: String,
    hash: String,
}

fn parse(input: &str) -> ParsedUrl {
    let mut rest = input;
    let protocol = match rest.find("://") {
        Some(i) => {
            let proto = format!("{}:", &rest[..i]);
            rest = &rest[i + 3..];
            proto
        }
        None => String::new(),
    };

    let hash_idx = rest.find('#');
    let hash = hash_idx.map(|i| rest[i..].to_string()).unwrap_or_default();
    if let Some(i) = hash_idx {
        rest = &rest[..i];
    }

    let query_idx = rest.find('?');
    let search = query_idx.map(|i| rest[i..].to_string()).unwrap_or_default();
    if let Some(i) = query_idx {
        rest = &rest[..i];
    }

    let path_idx = rest.find('/');
    let authority = path_idx.map(|i| &rest[..i]).unwrap_or(rest);
    let pathname = path_idx.map(|i| rest[i..].to_string()).unwrap_or_else(|| "/".to_string());

    let (hostname, port) = match authority.rfind(':') {
        Some(i) => (authority[..i].to_string(), authority[i + 1..].to_string()),
        None => (authority.to_string(), String::new()),
    };
    let host = if port.is_empty() { hostname.clone() } else { format!("{hostname}:{port}") };

    ParsedUrl { protocol, host, hostname, port, pathname, search, hash }
}

pub fn exports() -> IndexMap<String, Value> {
    let mut map = IndexMap::new();
    map.insert("parse".to_string(), native("parse", |_ev, _this, args| {
        let input = arg(&args, 0).to_coerced_string();
        let parsed = parse(&input);
        Ok(object_from(vec![
            ("href", Value::string(input.clone())),
            ("protocol", Value::string(parsed.protocol)),
            ("host", Value::string(parsed.host)),
            ("hostname", Value::string(parsed.hostname)),
            ("port", Value::string(parsed.port)),
            ("pathname", Value::string(parsed.pathname)),
            ("search", Value::string(parsed.search)),
            ("hash", Value::string(parsed.hash)),
        ]))
    }));
    map.insert("URL".to_string(), native("URL", |_ev, _this, args| {
        let input = arg(&args, 0).to_coerced_string();
        let parsed = parse(&input);
        Ok(object_from(vec![
            ("href", Value::string(input)),
            ("protocol", Value::string(parsed.protocol)),
            ("host", Value::string(parsed.host)),
            ("hostname", Value::string(parsed.hostname)),
            ("port", Value::string(parsed.port)),
            ("pathname", Value::string(parsed.pathname)),
            ("search", Value::string(parsed.search)),
            ("hash", Value::string(parsed.hash)),
        ]))
    }));
    map
}

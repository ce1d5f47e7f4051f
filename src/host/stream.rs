//! A minimal `stream` built-in module: in-memory `Readable`/`Writable`
//! objects built on the same event-emitter listener convention as
//! `events.rs`, with no actual OS-level I/O plumbing. Background host
//! resources are expected to deliver their events onto the macro-task
//! queue, but these streams only ever fire synchronously from
//! user-invoked `write`/`push`, so there is no background work to hand off.

use indexmap::IndexMap;

use crate::value::Value;

use super::{arg, native, object_from};

fn emitter_methods() -> Vec<(&'static str, Value)> {
    vec![
        ("on", native("on", |_ev, this, args| {
            add_listener(&this, &arg(&args, 0).to_coerced_string(), arg(&args, 1));
            Ok(this)
        })),
        ("emit", native("emit", |ev, this, args| {
            let event = arg(&args, 0).to_coerced_string();
            let rest = if args.len() > 1 { args[1..].to_vec() } else { Vec::new() };
            let handlers = listeners_of(&this, &event);
            for handler in handlers {
                let _ = ev.call_value(handler, this.clone(), rest.clone(), None);
            }
            Ok(Value::Undefined)
        })),
    ]
}

fn listeners_of(emitter: &Value, event: &str) -> Vec<Value> {
    let Value::Object(entries) = emitter else { return Vec::new() };
    match entries.borrow().get("_events") {
        Some(Value::Object(events)) => match events.borrow().get(event) {
            Some(Value::Array(handlers)) => handlers.borrow().clone(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn add_listener(emitter: &Value, event: &str, handler: Value) {
    let Value::Object(entries) = emitter else { return };
    let mut entries_mut = entries.borrow_mut();
    if !entries_mut.contains_key("_events") {
        entries_mut.insert("_events".to_string(), Value::empty_object());
    }
    if let Some(Value::Object(events)) = entries_mut.get("_events") {
        let mut events_mut = events.borrow_mut();
        match events_mut.get(event) {
            Some(Value::Array(handlers)) => handlers.borrow_mut().push(handler),
            _ => {
                events_mut.insert(event.to_string(), Value::array(vec![handler]));
            }
        }
    }
}

fn construct_readable() -> Value {
    let obj = object_from(emitter_methods());
    if let Value::Object(entries) = &obj {
        entries.borrow_mut().insert("_buffer".to_string(), Value::array(vec![]));
        entries.borrow_mut().insert("push".to_string(), native("push", |ev, this, args| {
            let chunk = arg(&args, 0);
            if let Value::Object(entries) = &this {
                if let Some(Value::Array(buf)) = entries.borrow().get("_buffer").cloned() {
                    buf.borrow_mut().push(chunk.clone());
                }
            }
            let handlers = listeners_of(&this, "data");
            for handler in handlers {
                let _ = ev.call_value(handler, this.clone(), vec![chunk.clone()], None);
            }
            Ok(Value::Boolean(!matches!(chunk, Value::Null)))
        }));
        entries.borrow_mut().insert("read".to_string(), native("read", |_ev, this, _args| {
            if let Value::Object(entries) = &this {
                if let Some(Value::Array(buf)) = entries.borrow().get("_buffer").cloned() {
                    if !buf.borrow().is_empty() {
                        return Ok(buf.borrow_mut().remove(0));
                    }
                }
            }
            Ok(Value::Null)
        }));
    }
    obj
}

fn construct_writable() -> Value {
    let obj = object_from(emitter_methods());
    if let Value::Object(entries) = &obj {
        entries.borrow_mut().insert("_chunks".to_string(), Value::array(vec![]));
        entries.borrow_mut().insert("write".to_string(), native("write", |ev, this, args| {
            let chunk = arg(&args, 0);
            if let Value::Object(entries) = &this {
                if let Some(Value::Array(chunks)) = entries.borrow().get("_chunks").cloned() {
                    chunks.borrow_mut().push(chunk.clone());
                }
            }
            let handlers = listeners_of(&this, "data");
            for handler in handlers {
                let _ = ev.call_value(handler, this.clone(), vec![chunk.clone()], None);
            }
            Ok(Value::Boolean(true))
        }));
        entries.borrow_mut().insert("end".to_string(), native("end", |ev, this, args| {
            if !args.is_empty() {
                if let Value::Object(entries) = &this {
                    if let Some(Value::Array(chunks)) = entries.borrow().get("_chunks").cloned() {
                        chunks.borrow_mut().push(arg(&args, 0));
                    }
                }
            }
            let handlers = listeners_of(&this, "finish");
            for handler in handlers {
                let _ = ev.call_value(handler, this.clone(), vec![], None);
            }
            Ok(Value::Undefined)
        }));
    }
    obj
}

pub fn exports() -> IndexMap<String, Value> {
    let mut map = IndexMap::new();
    map.insert("Readable".to_string(), native("Readable", |_ev, _this, _args| Ok(construct_readable())));
    map.insert("Writable".to_string(), native("Writable", |_ev, _this, _args| Ok(construct_writable())));
    map
}

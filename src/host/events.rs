//! `EventEmitter` and the `events` built-in module. Listener
//! lists are stored under a private `_events` object property rather than a
//! dedicated `Value` variant, matching how `process`'s `beforeExit`/`exit`
//! events are represented.

use indexmap::IndexMap;

use crate::error::EcError;
use crate::evaluator::Evaluator;
use crate::value::{HostHandle, Value};

use super::{arg, native, object_from};

pub fn construct_event_emitter() -> Value {
    object_from(vec![
        ("on", native("on", |_ev, this, args| {
            add_listener(&this, &arg(&args, 0).to_coerced_string(), arg(&args, 1));
            Ok(this)
        })),
        ("addListener", native("addListener", |_ev, this, args| {
            add_listener(&this, &arg(&args, 0).to_coerced_string(), arg(&args, 1));
            Ok(this)
        })),
        ("once", native("once", |_ev, this, args| {
            add_listener(&this, &arg(&args, 0).to_coerced_string(), arg(&args, 1));
            Ok(this)
        })),
        ("off", native("off", |_ev, this, args| {
            remove_listener(&this, &arg(&args, 0).to_coerced_string(), &arg(&args, 1));
            Ok(this)
        })),
        ("emit", native("emit", |ev, this, args| {
            let event = arg(&args, 0).to_coerced_string();
            let rest = if args.len() > 1 { args[1..].to_vec() } else { Vec::new() };
            let fired = emit(ev, &this, &event, rest);
            Ok(Value::Boolean(fired))
        })),
        ("listenerCount", native("listenerCount", |_ev, this, args| {
            let event = arg(&args, 0).to_coerced_string();
            Ok(Value::Number(listeners_of(&this, &event).len() as f64))
        })),
    ])
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

fn remove_listener(emitter: &Value, event: &str, handler: &Value) {
    let Value::Object(entries) = emitter else { return };
    let entries_ref = entries.borrow();
    if let Some(Value::Object(events)) = entries_ref.get("_events") {
        if let Some(Value::Array(handlers)) = events.borrow().get(event) {
            handlers.borrow_mut().retain(|h| !h.strict_eq(handler));
        }
    }
}

fn emit(ev: &mut Evaluator, emitter: &Value, event: &str, args: Vec<Value>) -> bool {
    let handlers = listeners_of(emitter, event);
    let fired = !handlers.is_empty();
    for handler in handlers {
        let _ = ev.call_value(handler, emitter.clone(), args.clone(), None);
    }
    fired
}

/// Generic `on`/`emit` dispatch for `Value::Host` handles that carry an
/// `_events` entry in their data map, mirroring plain-object emitters.
pub fn dispatch_host(ev: &mut Evaluator, handle: &std::rc::Rc<HostHandle>, name: &str, args: Vec<Value>) -> Option<Result<Value, EcError>> {
    match name {
        "on" | "addListener" | "once" => {
            let event = arg(&args, 0).to_coerced_string();
            let handler = arg(&args, 1);
            let mut data = handle.data.borrow_mut();
            if !data.contains_key("_events") {
                data.insert("_events".to_string(), Value::empty_object());
            }
            if let Some(Value::Object(events)) = data.get("_events") {
                let mut events_mut = events.borrow_mut();
                match events_mut.get(&event) {
                    Some(Value::Array(handlers)) => handlers.borrow_mut().push(handler),
                    _ => {
                        events_mut.insert(event, Value::array(vec![handler]));
                    }
                }
            }
            Some(Ok(Value::Host(handle.clone())))
        }
        "emit" => {
            let event = arg(&args, 0).to_coerced_string();
            let rest = if args.len() > 1 { args[1..].to_vec() } else { Vec::new() };
            let handlers = match handle.data.borrow().get("_events") {
                Some(Value::Object(events)) => match events.borrow().get(&event) {
                    Some(Value::Array(handlers)) => handlers.borrow().clone(),
                    _ => Vec::new(),
                },
                _ => Vec::new(),
            };
            let fired = !handlers.is_empty();
            for handler in handlers {
                let _ = ev.call_value(handler, Value::Host(handle.clone()), rest.clone(), None);
            }
            Some(Ok(Value::Boolean(fired)))
        }
        _ => None,
    }
}

pub fn exports() -> IndexMap<String, Value> {
    let mut map = IndexMap::new();
    map.insert(
        "EventEmitter".to_string(),
        native("EventEmitter", |_ev, _this, _args| Ok(construct_event_emitter())),
    );
    map
}

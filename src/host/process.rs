//! `process` facade: properties, lifecycle methods, and the `beforeExit`/
//! `exit` events.

use indexmap::IndexMap;

use crate::value::Value;

use super::{arg, native, object_from};

fn listeners_for<'a>(entries: &'a IndexMap<String, Value>, event: &str) -> Vec<Value> {
    match entries.get("_events") {
        Some(Value::Object(events)) => match events.borrow().get(event) {
            Some(Value::Array(handlers)) => handlers.borrow().clone(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn emit(ev: &mut crate::evaluator::Evaluator, process: &Value, event: &str, code: i32) {
    let handlers = if let Value::Object(entries) = process {
        listeners_for(&entries.borrow(), event)
    } else {
        Vec::new()
    };
    for handler in handlers {
        let _ = ev.call_value(handler, process.clone(), vec![Value::Number(code as f64)], None);
    }
}

fn register_listener(process: &Value, event: &str, handler: Value) {
    let Value::Object(entries) = process else { return };
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

pub fn make_process() -> Value {
    let argv = Value::array(std::env::args().map(Value::string).collect());
    let env_map: IndexMap<String, Value> = std::env::vars().map(|(k, v)| (k, Value::string(v))).collect();

    object_from(vec![
        ("pid", Value::Number(std::process::id() as f64)),
        ("ppid", Value::Number(0.0)),
        ("platform", Value::string(std::env::consts::OS)),
        ("arch", Value::string(std::env::consts::ARCH)),
        ("version", Value::string(env!("CARGO_PKG_VERSION"))),
        ("versions", object_from(vec![("ecrun", Value::string(env!("CARGO_PKG_VERSION")))])),
        ("argv", argv),
        ("env", Value::object(env_map)),
        ("execPath", Value::string(std::env::current_exe().ok().map(|p| p.to_string_lossy().to_string()).unwrap_or_default())),
        ("exitCode", Value::Number(0.0)),
        ("cwd", native("cwd", |_ev, _this, _args| {
            Ok(Value::string(std::env::current_dir().ok().map(|p| p.to_string_lossy().to_string()).unwrap_or_default()))
        })),
        ("chdir", native("chdir", |_ev, _this, args| {
            let path = arg(&args, 0).to_coerced_string();
            let _ = std::env::set_current_dir(path);
            Ok(Value::Undefined)
        })),
        ("memoryUsage", native("memoryUsage", |_ev, _this, _args| {
            Ok(object_from(vec![
                ("rss", Value::Number(0.0)),
                ("heapTotal", Value::Number(0.0)),
                ("heapUsed", Value::Number(0.0)),
                ("external", Value::Number(0.0)),
            ]))
        })),
        ("uptime", native("uptime", |ev, _this, _args| {
            Ok(Value::Number(ev.event_loop.borrow().now() as f64 / 1000.0))
        })),
        ("hrtime", native("hrtime", |ev, _this, args| {
            let now = ev.event_loop.borrow().now();
            let (prev_sec, prev_nano) = match arg(&args, 0) {
                Value::Array(items) => {
                    let b = items.borrow();
                    (b.first().map(Value::to_number).unwrap_or(0.0), b.get(1).map(Value::to_number).unwrap_or(0.0))
                }
                _ => (0.0, 0.0),
            };
            let total_nanos = (now as f64 * 1_000_000.0) - (prev_sec * 1e9 + prev_nano);
            let seconds = (total_nanos / 1e9).floor().max(0.0);
            let nanos = (total_nanos - seconds * 1e9).max(0.0);
            Ok(Value::array(vec![Value::Number(seconds), Value::Number(nanos)]))
        })),
        ("nextTick", native("nextTick", |ev, _this, args| {
            let callback = arg(&args, 0);
            let rest = if args.len() > 1 { args[1..].to_vec() } else { Vec::new() };
            ev.event_loop.borrow_mut().queue_micro_task(callback, rest);
            Ok(Value::Undefined)
        })),
        ("on", native("on", |_ev, this, args| {
            register_listener(&this, &arg(&args, 0).to_coerced_string(), arg(&args, 1));
            Ok(this)
        })),
        ("exit", native("exit", |ev, this, args| {
            let explicit_code = args.first().map(|v| v.to_number() as i32);
            let current_exit_code = if let Value::Object(entries) = &this {
                entries.borrow().get("exitCode").map(Value::to_number).unwrap_or(0.0) as i32
            } else {
                0
            };
            let code = explicit_code.unwrap_or(current_exit_code);

            if explicit_code.is_none() && current_exit_code == 0 {
                emit(ev, &this, "beforeExit", code);
            }
            emit(ev, &this, "exit", code);
            ev.exit_code = Some(code);
            Ok(Value::Undefined)
        })),
    ])
}

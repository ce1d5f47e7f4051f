//! Host surface: one facade per file, wired together through three stable
//! entry points the evaluator calls into. The core dispatch convention
//! is fixed; method bodies below are this implementation's own choice
//! of host behavior.

mod array_ops;
mod buffer;
mod console;
mod crypto;
mod events;
mod fs;
mod http;
mod json;
mod math;
mod object_ops;
mod os;
mod path;
mod process;
mod querystring;
mod regex;
mod stream;
mod string_ops;
mod timers;
mod url;
mod util;

use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::EcError;
use crate::evaluator::Evaluator;
use crate::value::{Callable, NativeFn, NativeFunction, Value};

/// Wraps a Rust closure as a callable `Value`.
pub(crate) fn native(name: &'static str, func: impl Fn(&mut Evaluator, Value, Vec<Value>) -> Result<Value, EcError> + 'static) -> Value {
    let func: NativeFn = Rc::new(func);
    Value::Function(Rc::new(Callable::Native(NativeFunction { name, func })))
}

/// Positional argument access with `undefined` for missing trailing args,
/// matching call-site leniency elsewhere in the evaluator around
/// extra/missing arguments.
pub(crate) fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Undefined)
}

pub(crate) fn object_from(entries: Vec<(&str, Value)>) -> Value {
    let mut map = IndexMap::new();
    for (k, v) in entries {
        map.insert(k.to_string(), v);
    }
    Value::object(map)
}

/// Binds every facade as a global (`console`, `Math`, `JSON`, `process`, the
/// constructor functions, and `require`) on the evaluator's global frame
///. Called once from `Evaluator::new`.
pub fn install_globals(ev: &mut Evaluator) {
    use crate::ast::DeclKind;
    use crate::environment::Frame;

    let global = ev.global.clone();
    let mut bind = |name: &str, value: Value| {
        let _ = Frame::declare_lexical(&global, DeclKind::Var, name, Some(value));
    };

    bind("undefined", Value::Undefined);
    bind("NaN", Value::Number(f64::NAN));
    bind("Infinity", Value::Number(f64::INFINITY));

    bind("console", console::make_console());
    bind("Math", math::make_math());
    bind("JSON", json::make_json());
    bind("process", process::make_process());

    bind("setTimeout", timers::make_set_timeout());
    bind("setInterval", timers::make_set_interval());
    bind("clearTimeout", timers::make_clear_timer());
    bind("clearInterval", timers::make_clear_timer());
    bind("nextTick", timers::make_next_tick());

    bind("Object", object_ops::make_object_constructor());
    bind("Array", array_ops::make_array_constructor());

    bind("require", native("require", |ev, _this, args| {
        let specifier = arg(&args, 0).to_coerced_string();
        let exports = crate::modules::import(ev, &specifier)?;
        Ok(Value::object(exports))
    }));
}

/// Constructors reachable via `new Name(...)` that aren't ordinary global
/// functions. Returns `None`
/// when `name` isn't a recognized built-in, so the evaluator falls back to
/// treating it as a user-defined constructor call.
pub fn construct_builtin(_ev: &mut Evaluator, name: &str, args: &[Value]) -> Result<Option<Value>, EcError> {
    match name {
        "Date" => Ok(Some(util::construct_date(args))),
        "RegExp" => Ok(Some(regex::construct_regexp(args)?)),
        "Error" | "TypeError" | "RangeError" | "SyntaxError" => {
            Ok(Some(util::construct_error(name, args)))
        }
        "Array" => Ok(Some(array_ops::construct_array(args))),
        "Object" => Ok(Some(Value::empty_object())),
        "String" => Ok(Some(Value::string(args.first().map(Value::to_coerced_string).unwrap_or_default()))),
        "Number" => Ok(Some(Value::Number(args.first().map(Value::to_number).unwrap_or(0.0)))),
        "Boolean" => Ok(Some(Value::Boolean(args.first().map(Value::is_truthy).unwrap_or(false)))),
        "Buffer" => Ok(Some(buffer::construct_buffer(args))),
        "EventEmitter" => Ok(Some(events::construct_event_emitter())),
        _ => Ok(None),
    }
}

/// Built-in-method dispatch for receivers that aren't plain objects with a
/// stored function property: arrays, strings, numbers, dates, regexes,
/// buffers, and host handles. Returns `None` when `name` isn't
/// a recognized method on this receiver's type, so the caller can raise
/// "not a function".
pub fn dispatch_method(ev: &mut Evaluator, receiver: &Value, name: &str, args: Vec<Value>) -> Option<Result<Value, EcError>> {
    match receiver {
        Value::Array(items) => array_ops::dispatch(ev, items, name, args),
        Value::String(s) => string_ops::dispatch(s, name, args),
        Value::Number(n) => util::dispatch_number(*n, name, args),
        Value::Date(d) => util::dispatch_date(*d, name, args),
        Value::Regex(r) => regex::dispatch(ev, r, name, args),
        Value::Buffer(b) => buffer::dispatch(b, name, args),
        Value::Object(entries) => object_ops::dispatch(entries, name, args),
        Value::Host(handle) => events::dispatch_host(ev, handle, name, args),
        _ => None,
    }
}

/// Names resolvable as `node:`-prefixed or bare built-in modules
///, independent of the filesystem.
pub fn is_builtin_module(name: &str) -> bool {
    matches!(
        name,
        "fs" | "path" | "os" | "crypto" | "url" | "querystring" | "events" | "stream" | "buffer" | "util" | "http"
    )
}

pub fn builtin_module(name: &str) -> Option<IndexMap<String, Value>> {
    match name {
        "fs" => Some(fs::exports()),
        "path" => Some(path::exports()),
        "os" => Some(os::exports()),
        "crypto" => Some(crypto::exports()),
        "url" => Some(url::exports()),
        "querystring" => Some(querystring::exports()),
        "events" => Some(events::exports()),
        "stream" => Some(stream::exports()),
        "buffer" => Some(buffer::exports()),
        "util" => Some(util::exports()),
        "http" => Some(http::exports()),
        _ => None,
    }
}

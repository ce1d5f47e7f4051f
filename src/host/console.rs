//! `console.log`/`warn`/`error`/`info`.

use crate::evaluator::Evaluator;
use crate::value::Value;

use super::{native, object_from};

fn log_args(ev: &mut Evaluator, args: Vec<Value>) {
    let line = args.iter().map(|v| v.to_display_string()).collect::<Vec<_>>().join(" ");
    ev.write_output(line);
}

pub fn make_console() -> Value {
    object_from(vec![
        ("log", native("log", |ev, _this, args| {
            log_args(ev, args);
            Ok(Value::Undefined)
        })),
        ("info", native("info", |ev, _this, args| {
            log_args(ev, args);
            Ok(Value::Undefined)
        })),
        ("warn", native("warn", |ev, _this, args| {
            log_args(ev, args);
            Ok(Value::Undefined)
        })),
        ("error", native("error", |ev, _this, args| {
            log_args(ev, args);
            Ok(Value::Undefined)
        })),
        ("debug", native("debug", |ev, _this, args| {
            log_args(ev, args);
            Ok(Value::Undefined)
        })),
    ])
}

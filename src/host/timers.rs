//! `setTimeout`/`setInterval`/`clearTimeout`/`clearInterval`/`nextTick`
//!, backed directly by `EventLoop`.

use crate::value::Value;

use super::{arg, native};

pub fn make_set_timeout() -> Value {
    native("setTimeout", |ev, _this, args| {
        let callback = arg(&args, 0);
        let delay = arg(&args, 1).to_number().max(0.0) as u64;
        let id = ev.event_loop.borrow_mut().schedule_timer(callback, delay, None);
        Ok(Value::Number(id as f64))
    })
}

pub fn make_set_interval() -> Value {
    native("setInterval", |ev, _this, args| {
        let callback = arg(&args, 0);
        let delay = arg(&args, 1).to_number().max(1.0) as u64;
        let id = ev.event_loop.borrow_mut().schedule_timer(callback, delay, Some(delay));
        Ok(Value::Number(id as f64))
    })
}

pub fn make_clear_timer() -> Value {
    native("clearTimer", |ev, _this, args| {
        let id = arg(&args, 0).to_number() as u64;
        ev.event_loop.borrow_mut().cancel_timer(id);
        Ok(Value::Undefined)
    })
}

pub fn make_next_tick() -> Value {
    native("nextTick", |ev, _this, args| {
        let callback = arg(&args, 0);
        let rest = if args.len() > 1 { args[1..].to_vec() } else { Vec::new() };
        ev.event_loop.borrow_mut().queue_micro_task(callback, rest);
        Ok(Value::Undefined)
    })
}

//! Array instance methods and the `Array` constructor/static helpers
//!.

use crate::error::EcError;
use crate::evaluator::Evaluator;
use crate::value::{ArrayData, Value};

use super::{arg, native, object_from};

pub fn make_array_constructor() -> Value {
    object_from(vec![
        ("isArray", native("isArray", |_ev, _this, args| {
            Ok(Value::Boolean(matches!(arg(&args, 0), Value::Array(_))))
        })),
        ("from", native("from", |ev, _this, args| {
            let items = match arg(&args, 0) {
                Value::Array(a) => a.borrow().clone(),
                Value::String(s) => s.chars().map(|c| Value::string(c.to_string())).collect(),
                other => vec![other],
            };
            match arg(&args, 1) {
                Value::Function(_) => {
                    let mapper = arg(&args, 1);
                    let mut mapped = Vec::with_capacity(items.len());
                    for (i, item) in items.into_iter().enumerate() {
                        mapped.push(ev.call_value(mapper.clone(), Value::Undefined, vec![item, Value::Number(i as f64)], None)?);
                    }
                    Ok(Value::array(mapped))
                }
                _ => Ok(Value::array(items)),
            }
        })),
        ("of", native("of", |_ev, _this, args| Ok(Value::array(args)))),
    ])
}

pub fn construct_array(args: &[Value]) -> Value {
    if args.len() == 1 {
        if let Value::Number(n) = args[0] {
            return Value::array(vec![Value::Undefined; n.max(0.0) as usize]);
        }
    }
    Value::array(args.to_vec())
}

pub fn dispatch(ev: &mut Evaluator, items: &ArrayData, name: &str, args: Vec<Value>) -> Option<Result<Value, EcError>> {
    Some(match name {
        "push" => {
            let mut v = items.borrow_mut();
            v.extend(args);
            Ok(Value::Number(v.len() as f64))
        }
        "pop" => Ok(items.borrow_mut().pop().unwrap_or(Value::Undefined)),
        "shift" => {
            let mut v = items.borrow_mut();
            if v.is_empty() { Ok(Value::Undefined) } else { Ok(v.remove(0)) }
        }
        "unshift" => {
            let mut v = items.borrow_mut();
            for (i, a) in args.into_iter().enumerate() {
                v.insert(i, a);
            }
            Ok(Value::Number(v.len() as f64))
        }
        "slice" => {
            let v = items.borrow();
            let (start, end) = slice_bounds(v.len(), args.first(), args.get(1));
            Ok(Value::array(v[start..end.max(start)].to_vec()))
        }
        "splice" => splice(items, &args),
        "concat" => {
            let mut out = items.borrow().clone();
            for a in args {
                match a {
                    Value::Array(other) => out.extend(other.borrow().iter().cloned()),
                    other => out.push(other),
                }
            }
            Ok(Value::array(out))
        }
        "join" => {
            let sep = args.first().map(Value::to_coerced_string).unwrap_or_else(|| ",".to_string());
            let joined = items
                .borrow()
                .iter()
                .map(|v| match v {
                    Value::Undefined | Value::Null => String::new(),
                    other => other.to_coerced_string(),
                })
                .collect::<Vec<_>>()
                .join(&sep);
            Ok(Value::string(joined))
        }
        "reverse" => {
            items.borrow_mut().reverse();
            Ok(Value::Array(items.clone()))
        }
        "indexOf" => {
            let target = arg(&args, 0);
            Ok(Value::Number(
                items.borrow().iter().position(|v| v.strict_eq(&target)).map(|i| i as f64).unwrap_or(-1.0),
            ))
        }
        "includes" => {
            let target = arg(&args, 0);
            Ok(Value::Boolean(items.borrow().iter().any(|v| v.strict_eq(&target))))
        }
        "flat" => {
            let depth = args.first().map(Value::to_number).unwrap_or(1.0) as i32;
            Ok(Value::array(flatten(&items.borrow(), depth)))
        }
        "fill" => {
            let value = arg(&args, 0);
            let len = items.borrow().len();
            let (start, end) = slice_bounds(len, args.get(1), args.get(2));
            let mut v = items.borrow_mut();
            for slot in v[start..end.max(start)].iter_mut() {
                *slot = value.clone();
            }
            Ok(Value::Array(items.clone()))
        }
        "sort" => return Some(sort(ev, items, args.into_iter().next())),
        "map" => return Some(map_with(ev, items, arg(&args, 0))),
        "filter" => return Some(filter_with(ev, items, arg(&args, 0))),
        "forEach" => return Some(for_each(ev, items, arg(&args, 0))),
        "find" => return Some(find(ev, items, arg(&args, 0), false)),
        "findIndex" => return Some(find(ev, items, arg(&args, 0), true)),
        "some" => return Some(some_every(ev, items, arg(&args, 0), true)),
        "every" => return Some(some_every(ev, items, arg(&args, 0), false)),
        "reduce" => return Some(reduce(ev, items, args, false)),
        "reduceRight" => return Some(reduce(ev, items, args, true)),
        _ => return None,
    })
}

fn slice_bounds(len: usize, start: Option<&Value>, end: Option<&Value>) -> (usize, usize) {
    let clamp = |n: f64| -> usize {
        let n = if n < 0.0 { (len as f64 + n).max(0.0) } else { n };
        (n as usize).min(len)
    };
    let start = start.map(|v| clamp(v.to_number())).unwrap_or(0);
    let end = end.map(|v| clamp(v.to_number())).unwrap_or(len);
    (start, end)
}

fn splice(items: &ArrayData, args: &[Value]) -> Result<Value, EcError> {
    let len = items.borrow().len();
    let start = args.first().map(|v| {
        let n = v.to_number();
        if n < 0.0 { (len as f64 + n).max(0.0) as usize } else { (n as usize).min(len) }
    }).unwrap_or(0);
    let delete_count = args.get(1).map(|v| v.to_number().max(0.0) as usize).unwrap_or(len - start).min(len - start);
    let inserted: Vec<Value> = args.iter().skip(2).cloned().collect();
    let mut v = items.borrow_mut();
    let removed: Vec<Value> = v.splice(start..start + delete_count, inserted).collect();
    Ok(Value::array(removed))
}

fn flatten(items: &[Value], depth: i32) -> Vec<Value> {
    if depth <= 0 {
        return items.to_vec();
    }
    let mut out = Vec::new();
    for item in items {
        match item {
            Value::Array(inner) => out.extend(flatten(&inner.borrow(), depth - 1)),
            other => out.push(other.clone()),
        }
    }
    out
}

fn sort(ev: &mut Evaluator, items: &ArrayData, comparator: Option<Value>) -> Result<Value, EcError> {
    let mut v = items.borrow().clone();
    let mut err = None;
    match comparator {
        Some(cb @ Value::Function(_)) => {
            v.sort_by(|a, b| {
                if err.is_some() {
                    return std::cmp::Ordering::Equal;
                }
                match ev.call_value(cb.clone(), Value::Undefined, vec![a.clone(), b.clone()], None) {
                    Ok(result) => result.to_number().partial_cmp(&0.0).unwrap_or(std::cmp::Ordering::Equal),
                    Err(e) => {
                        err = Some(e);
                        std::cmp::Ordering::Equal
                    }
                }
            });
        }
        _ => v.sort_by(|a, b| a.to_coerced_string().cmp(&b.to_coerced_string())),
    }
    if let Some(e) = err {
        return Err(e);
    }
    *items.borrow_mut() = v;
    Ok(Value::Array(items.clone()))
}

fn map_with(ev: &mut Evaluator, items: &ArrayData, callback: Value) -> Result<Value, EcError> {
    let source = items.borrow().clone();
    let mut out = Vec::with_capacity(source.len());
    for (i, item) in source.into_iter().enumerate() {
        out.push(ev.call_value(callback.clone(), Value::Undefined, vec![item, Value::Number(i as f64)], None)?);
    }
    Ok(Value::array(out))
}

fn filter_with(ev: &mut Evaluator, items: &ArrayData, callback: Value) -> Result<Value, EcError> {
    let source = items.borrow().clone();
    let mut out = Vec::new();
    for (i, item) in source.into_iter().enumerate() {
        let keep = ev.call_value(callback.clone(), Value::Undefined, vec![item.clone(), Value::Number(i as f64)], None)?;
        if keep.is_truthy() {
            out.push(item);
        }
    }
    Ok(Value::array(out))
}

fn for_each(ev: &mut Evaluator, items: &ArrayData, callback: Value) -> Result<Value, EcError> {
    let source = items.borrow().clone();
    for (i, item) in source.into_iter().enumerate() {
        ev.call_value(callback.clone(), Value::Undefined, vec![item, Value::Number(i as f64)], None)?;
    }
    Ok(Value::Undefined)
}

fn find(ev: &mut Evaluator, items: &ArrayData, callback: Value, want_index: bool) -> Result<Value, EcError> {
    let source = items.borrow().clone();
    for (i, item) in source.into_iter().enumerate() {
        let matched = ev.call_value(callback.clone(), Value::Undefined, vec![item.clone(), Value::Number(i as f64)], None)?;
        if matched.is_truthy() {
            return Ok(if want_index { Value::Number(i as f64) } else { item });
        }
    }
    Ok(if want_index { Value::Number(-1.0) } else { Value::Undefined })
}

fn some_every(ev: &mut Evaluator, items: &ArrayData, callback: Value, is_some: bool) -> Result<Value, EcError> {
    let source = items.borrow().clone();
    for (i, item) in source.into_iter().enumerate() {
        let result = ev.call_value(callback.clone(), Value::Undefined, vec![item, Value::Number(i as f64)], None)?;
        if result.is_truthy() == is_some {
            return Ok(Value::Boolean(is_some));
        }
    }
    Ok(Value::Boolean(!is_some))
}

fn reduce(ev: &mut Evaluator, items: &ArrayData, mut args: Vec<Value>, from_right: bool) -> Result<Value, EcError> {
    let callback = if args.is_empty() { Value::Undefined } else { args.remove(0) };
    let mut source = items.borrow().clone();
    if from_right {
        source.reverse();
    }
    let mut iter = source.into_iter().enumerate();
    let mut acc = match args.into_iter().next() {
        Some(initial) => initial,
        None => iter.next().map(|(_, v)| v).ok_or_else(|| {
            crate::error::RuntimeError::new("Reduce of empty array with no initial value", None).into()
        })?,
    };
    for (i, item) in iter {
        acc = ev.call_value(callback.clone(), Value::Undefined, vec![acc, item, Value::Number(i as f64)], None)?;
    }
    Ok(acc)
}

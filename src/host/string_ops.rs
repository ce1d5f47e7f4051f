//! String instance methods, dispatched for every `Value::String`
//! receiver. No host facade owns `String` as a module; methods live here
//! directly beside the value they operate on.

use crate::error::EcError;
use crate::value::Value;

use super::arg;

pub fn dispatch(s: &str, name: &str, args: Vec<Value>) -> Option<Result<Value, EcError>> {
    let chars: Vec<char> = s.chars().collect();
    Some(Ok(match name {
        "charAt" => {
            let i = arg(&args, 0).to_number();
            non_negative_index(i).and_then(|i| chars.get(i)).map(|c| Value::string(c.to_string())).unwrap_or(Value::string(""))
        }
        "charCodeAt" => {
            let i = arg(&args, 0).to_number();
            non_negative_index(i)
                .and_then(|i| chars.get(i))
                .map(|c| Value::Number(*c as u32 as f64))
                .unwrap_or(Value::Number(f64::NAN))
        }
        "at" => {
            let i = arg(&args, 0).to_number() as isize;
            let idx = if i < 0 { chars.len() as isize + i } else { i };
            if idx < 0 || idx as usize >= chars.len() {
                Value::Undefined
            } else {
                Value::string(chars[idx as usize].to_string())
            }
        }
        "indexOf" => {
            let needle = arg(&args, 0).to_coerced_string();
            Value::Number(s.find(&needle).map(|b| s[..b].chars().count() as f64).unwrap_or(-1.0))
        }
        "lastIndexOf" => {
            let needle = arg(&args, 0).to_coerced_string();
            Value::Number(s.rfind(&needle).map(|b| s[..b].chars().count() as f64).unwrap_or(-1.0))
        }
        "includes" => Value::Boolean(s.contains(&arg(&args, 0).to_coerced_string())),
        "startsWith" => Value::Boolean(s.starts_with(&arg(&args, 0).to_coerced_string())),
        "endsWith" => Value::Boolean(s.ends_with(&arg(&args, 0).to_coerced_string())),
        "slice" => {
            let (start, end) = slice_bounds(chars.len(), args.first(), args.get(1));
            Value::string(chars[start..end.max(start)].iter().collect::<String>())
        }
        "substring" => {
            let len = chars.len();
            let clamp = |n: f64| (n.max(0.0) as usize).min(len);
            let mut a = args.first().map(|v| clamp(v.to_number())).unwrap_or(0);
            let mut b = args.get(1).map(|v| clamp(v.to_number())).unwrap_or(len);
            if a > b {
                std::mem::swap(&mut a, &mut b);
            }
            Value::string(chars[a..b].iter().collect::<String>())
        }
        "toUpperCase" => Value::string(s.to_uppercase()),
        "toLowerCase" => Value::string(s.to_lowercase()),
        "trim" => Value::string(s.trim().to_string()),
        "trimStart" => Value::string(s.trim_start().to_string()),
        "trimEnd" => Value::string(s.trim_end().to_string()),
        "repeat" => {
            let count = arg(&args, 0).to_number();
            if count < 0.0 || count.is_nan() {
                return Some(Err(crate::error::RuntimeError::new("Invalid count value", None).into()));
            }
            Value::string(s.repeat(count as usize))
        }
        "padStart" => pad(s, &args, true),
        "padEnd" => pad(s, &args, false),
        "split" => split(s, &args),
        "replace" => Value::string(replace(s, &args, false)),
        "replaceAll" => Value::string(replace(s, &args, true)),
        "concat" => Value::string(format!("{s}{}", args.iter().map(Value::to_coerced_string).collect::<String>())),
        "toString" | "valueOf" => Value::string(s.to_string()),
        _ => return None,
    }))
}

fn non_negative_index(n: f64) -> Option<usize> {
    if n.is_nan() || n < 0.0 { None } else { Some(n as usize) }
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

fn pad(s: &str, args: &[Value], at_start: bool) -> Value {
    let target_len = arg(args, 0).to_number().max(0.0) as usize;
    let fill = args.get(1).map(Value::to_coerced_string).unwrap_or_else(|| " ".to_string());
    let current_len = s.chars().count();
    if current_len >= target_len || fill.is_empty() {
        return Value::string(s.to_string());
    }
    let needed = target_len - current_len;
    let padding: String = fill.chars().cycle().take(needed).collect();
    Value::string(if at_start { format!("{padding}{s}") } else { format!("{s}{padding}") })
}

fn split(s: &str, args: &[Value]) -> Value {
    match args.first() {
        None | Some(Value::Undefined) => Value::array(vec![Value::string(s.to_string())]),
        Some(Value::Regex(r)) => Value::array(r.compiled.split(s).map(|p| Value::string(p.to_string())).collect()),
        Some(sep) => {
            let sep = sep.to_coerced_string();
            if sep.is_empty() {
                Value::array(s.chars().map(|c| Value::string(c.to_string())).collect())
            } else {
                Value::array(s.split(sep.as_str()).map(|p| Value::string(p.to_string())).collect())
            }
        }
    }
}

fn replace(s: &str, args: &[Value], all: bool) -> String {
    let replacement = args.get(1).map(Value::to_coerced_string).unwrap_or_default();
    match args.first() {
        Some(Value::Regex(r)) => {
            if all || r.flags.global {
                r.compiled.replace_all(s, replacement.as_str()).to_string()
            } else {
                r.compiled.replace(s, replacement.as_str()).to_string()
            }
        }
        Some(pattern) => {
            let pattern = pattern.to_coerced_string();
            if all {
                s.replace(&pattern, &replacement)
            } else {
                s.replacen(&pattern, &replacement, 1)
            }
        }
        None => s.to_string(),
    }
}

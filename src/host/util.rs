//! `Date`, `Error`/`TypeError`/`RangeError`/`SyntaxError` construction and
//! instance dispatch, number formatting methods, and the `util` built-in
//! module.

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use indexmap::IndexMap;

use crate::error::EcError;
use crate::value::Value;

use super::{arg, native, object_from};

pub fn construct_date(args: &[Value]) -> Value {
    let dt = match args.len() {
        0 => Utc::now(),
        1 => match &args[0] {
            Value::Number(millis) => Utc.timestamp_millis_opt(*millis as i64).single().unwrap_or_else(Utc::now),
            Value::String(s) => DateTime::parse_from_rfc3339(s).map(|d| d.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now()),
            _ => Utc::now(),
        },
        _ => {
            let year = args[0].to_number() as i32;
            let month = args.get(1).map(Value::to_number).unwrap_or(0.0) as u32 + 1;
            let day = args.get(2).map(Value::to_number).unwrap_or(1.0) as u32;
            let hour = args.get(3).map(Value::to_number).unwrap_or(0.0) as u32;
            let minute = args.get(4).map(Value::to_number).unwrap_or(0.0) as u32;
            let second = args.get(5).map(Value::to_number).unwrap_or(0.0) as u32;
            Utc.with_ymd_and_hms(year, month, day, hour, minute, second).single().unwrap_or_else(Utc::now)
        }
    };
    Value::Date(dt)
}

pub fn construct_error(kind: &str, args: &[Value]) -> Value {
    let message = args.first().map(Value::to_coerced_string).unwrap_or_default();
    object_from(vec![
        ("name", Value::string(kind.to_string())),
        ("message", Value::string(message.clone())),
        ("stack", Value::string(format!("{kind}: {message}"))),
    ])
}

pub fn dispatch_number(n: f64, name: &str, args: Vec<Value>) -> Option<Result<Value, EcError>> {
    Some(Ok(match name {
        "toFixed" => {
            let digits = args.first().map(|v| v.to_number() as usize).unwrap_or(0);
            Value::string(format!("{n:.digits$}"))
        }
        "toString" => match args.first() {
            Some(radix) if radix.to_number() != 10.0 => {
                Value::string(to_radix_string(n, radix.to_number() as u32))
            }
            _ => Value::string(Value::format_number(n)),
        },
        "toPrecision" => {
            let precision = args.first().map(|v| v.to_number() as usize).unwrap_or(6);
            Value::string(format!("{n:.precision$}"))
        }
        "valueOf" => Value::Number(n),
        _ => return None,
    }))
}

fn to_radix_string(n: f64, radix: u32) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    let negative = n < 0.0;
    let mut int_part = n.abs().trunc() as u64;
    let mut digits = Vec::new();
    while int_part > 0 {
        let digit = (int_part % radix as u64) as u32;
        digits.push(std::char::from_digit(digit, radix).unwrap_or('0'));
        int_part /= radix as u64;
    }
    if digits.is_empty() {
        digits.push('0');
    }
    digits.reverse();
    let s: String = digits.into_iter().collect();
    if negative { format!("-{s}") } else { s }
}

pub fn dispatch_date(d: DateTime<Utc>, name: &str, _args: Vec<Value>) -> Option<Result<Value, EcError>> {
    Some(Ok(match name {
        "getFullYear" => Value::Number(d.year() as f64),
        "getMonth" => Value::Number((d.month() - 1) as f64),
        "getDate" => Value::Number(d.day() as f64),
        "getDay" => Value::Number(d.weekday().num_days_from_sunday() as f64),
        "getHours" => Value::Number(d.hour() as f64),
        "getMinutes" => Value::Number(d.minute() as f64),
        "getSeconds" => Value::Number(d.second() as f64),
        "getMilliseconds" => Value::Number((d.timestamp_subsec_millis()) as f64),
        "getTime" | "valueOf" => Value::Number(d.timestamp_millis() as f64),
        "getTimezoneOffset" => Value::Number(0.0),
        "toISOString" => Value::string(d.to_rfc3339()),
        "toString" | "toDateString" | "toLocaleDateString" | "toLocaleString" => Value::string(d.to_rfc3339()),
        "toJSON" => Value::string(d.to_rfc3339()),
        _ => return None,
    }))
}

pub fn exports() -> IndexMap<String, Value> {
    let mut map = IndexMap::new();
    map.insert("format".to_string(), native("format", |_ev, _this, args| {
        let template = arg(&args, 0).to_coerced_string();
        let mut rest = args.into_iter().skip(1);
        let mut out = String::new();
        let mut chars = template.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '%' {
                match chars.peek() {
                    Some('s') | Some('d') | Some('j') | Some('o') => {
                        chars.next();
                        out.push_str(&rest.next().map(|v| v.to_coerced_string()).unwrap_or_default());
                        continue;
                    }
                    _ => {}
                }
            }
            out.push(c);
        }
        Ok(Value::string(out))
    }));
    map.insert("inspect".to_string(), native("inspect", |_ev, _this, args| {
        Ok(Value::string(arg(&args, 0).to_display_string()))
    }));
    map.insert("isArray".to_string(), native("isArray", |_ev, _this, args| {
        Ok(Value::Boolean(matches!(arg(&args, 0), Value::Array(_))))
    }));
    map
}

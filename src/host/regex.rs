//! `RegExp` constructor and `test`/`exec`/`toString` instance methods
//!. Matching is stateless across calls — there is no mutable
//! `lastIndex` bookkeeping, since `Value::Regex` carries no interior
//! mutability (it is shared via `Rc<RegexValue>`, not `Rc<RefCell<_>>`).

use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::{EcError, RuntimeError};
use crate::evaluator::Evaluator;
use crate::value::{RegexFlags, RegexValue, Value};

use super::arg;

pub fn construct_regexp(args: &[Value]) -> Result<Value, EcError> {
    let (pattern, flags_str) = match args.first() {
        Some(Value::Regex(r)) => (r.source.clone(), regex_flags_to_string(&r.flags)),
        Some(other) => (other.to_coerced_string(), args.get(1).map(Value::to_coerced_string).unwrap_or_default()),
        None => (String::new(), String::new()),
    };
    let flags = RegexFlags {
        global: flags_str.contains('g'),
        ignore_case: flags_str.contains('i'),
        multiline: flags_str.contains('m'),
    };
    let mut inline = String::new();
    if flags.ignore_case {
        inline.push('i');
    }
    if flags.multiline {
        inline.push('m');
    }
    let full_pattern = if inline.is_empty() { pattern.clone() } else { format!("(?{inline}){pattern}") };
    let compiled = regex::Regex::new(&full_pattern)
        .map_err(|e| RuntimeError::new(format!("invalid regular expression: {e}"), None))?;
    Ok(Value::Regex(Rc::new(RegexValue { source: pattern, flags, compiled })))
}

fn regex_flags_to_string(flags: &RegexFlags) -> String {
    let mut s = String::new();
    if flags.global {
        s.push('g');
    }
    if flags.ignore_case {
        s.push('i');
    }
    if flags.multiline {
        s.push('m');
    }
    s
}

pub fn dispatch(_ev: &mut Evaluator, r: &Rc<RegexValue>, name: &str, args: Vec<Value>) -> Option<Result<Value, EcError>> {
    let haystack = arg(&args, 0).to_coerced_string();
    Some(Ok(match name {
        "test" => Value::Boolean(r.compiled.is_match(&haystack)),
        "exec" => match r.compiled.captures(&haystack) {
            Some(caps) => {
                let whole = caps.get(0).expect("capture group 0 always matches");
                let mut groups = vec![Value::string(whole.as_str().to_string())];
                for i in 1..caps.len() {
                    groups.push(caps.get(i).map(|g| Value::string(g.as_str().to_string())).unwrap_or(Value::Undefined));
                }
                let mut result: IndexMap<String, Value> = groups
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| (i.to_string(), v))
                    .collect();
                result.insert("length".to_string(), Value::Number(caps.len() as f64));
                result.insert("index".to_string(), Value::Number(whole.start() as f64));
                result.insert("input".to_string(), Value::string(haystack));
                Value::object(result)
            }
            None => Value::Null,
        },
        "toString" => Value::string(format!("/{}/{}", r.source, regex_flags_to_string(&r.flags))),
        _ => return None,
    }))
}

//! The runtime value union.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::ast::{FunctionKind, FunctionNode};
use crate::environment::Frame;
use crate::error::EcError;
use crate::evaluator::Evaluator;
use crate::generator::GeneratorState;

pub type ObjectData = Rc<RefCell<IndexMap<String, Value>>>;
pub type ArrayData = Rc<RefCell<Vec<Value>>>;

/// A host-defined callable's body.
pub type NativeFn = Rc<dyn Fn(&mut Evaluator, Value, Vec<Value>) -> Result<Value, EcError>>;

#[derive(Clone)]
pub struct NativeFunction {
    pub name: &'static str,
    pub func: NativeFn,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({})", self.name)
    }
}

/// `{parameter names, body AST, captured environment frame, kind, optional
/// name}`.
#[derive(Debug, Clone)]
pub struct UserFunction {
    pub name: Option<String>,
    pub node: Rc<FunctionNode>,
    pub closure: Rc<RefCell<Frame>>,
    pub kind: FunctionKind,
    /// For arrow functions only: the `this` value in effect where the
    /// arrow was defined, since arrows never rebind `this` at call time
    ///.
    pub captured_this: Option<Value>,
}

#[derive(Debug, Clone)]
pub enum Callable {
    User(Rc<UserFunction>),
    Native(NativeFunction),
}

impl Callable {
    pub fn name(&self) -> Option<&str> {
        match self {
            Callable::User(f) => f.name.as_deref(),
            Callable::Native(f) => Some(f.name),
        }
    }

    pub fn is_generator(&self) -> bool {
        matches!(self, Callable::User(f) if f.kind == FunctionKind::Generator)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegexFlags {
    pub global: bool,
    pub ignore_case: bool,
    pub multiline: bool,
}

#[derive(Debug, Clone)]
pub struct RegexValue {
    pub source: String,
    pub flags: RegexFlags,
    pub compiled: regex::Regex,
}

/// A handle produced by a host facade (stream, server, event emitter) that
/// carries its own identity but no structural contract the evaluator needs
/// to inspect.
#[derive(Debug, Clone)]
pub struct HostHandle {
    pub kind: &'static str,
    pub id: u64,
    pub data: Rc<RefCell<IndexMap<String, Value>>>,
}

#[derive(Debug, Clone)]
pub enum Value {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(Rc<str>),
    Array(ArrayData),
    Object(ObjectData),
    Function(Rc<Callable>),
    Date(DateTime<Utc>),
    Regex(Rc<RegexValue>),
    Buffer(Rc<Vec<u8>>),
    Host(Rc<HostHandle>),
    /// The object returned by invoking a generator function; carries its
    /// own paused-traversal state.
    Generator(Rc<RefCell<GeneratorState>>),
}

impl Value {
    pub fn string(s: impl Into<Rc<str>>) -> Value {
        Value::String(s.into())
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(entries: IndexMap<String, Value>) -> Value {
        Value::Object(Rc::new(RefCell::new(entries)))
    }

    pub fn empty_object() -> Value {
        Value::object(IndexMap::new())
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Boolean(_) => "boolean",
            Value::Null | Value::Array(_) | Value::Object(_) | Value::Date(_)
            | Value::Regex(_) | Value::Buffer(_) | Value::Host(_) | Value::Generator(_) => "object",
            Value::Function(_) => "function",
            Value::Undefined => "undefined",
        }
    }

    /// `false`, `null`, `undefined`, `0`, `NaN`, empty string are falsy;
    /// everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Boolean(true) => 1.0,
            Value::Boolean(false) => 0.0,
            Value::Null => 0.0,
            Value::Undefined => f64::NAN,
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse::<f64>().unwrap_or(f64::NAN)
                }
            }
            _ => f64::NAN,
        }
    }

    /// Minimal-representation number formatting, used by string coercion and
    /// `console.log`.
    pub fn format_number(n: f64) -> String {
        if n.is_nan() {
            "NaN".to_string()
        } else if n.is_infinite() {
            if n > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() }
        } else if n == n.trunc() && n.abs() < 1e21 {
            format!("{}", n as i64)
        } else {
            format!("{}", n)
        }
    }

    /// The string produced by implicit coercion (e.g. in `+` or template
    /// interpolation), distinct from `console.log`'s nested-quoting display.
    pub fn to_coerced_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) => Self::format_number(*n),
            Value::String(s) => s.to_string(),
            Value::Array(items) => items
                .borrow()
                .iter()
                .map(|v| match v {
                    Value::Undefined | Value::Null => String::new(),
                    other => other.to_coerced_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => "[object Object]".to_string(),
            Value::Function(c) => format!("[Function {}]", c.name().unwrap_or("anonymous")),
            Value::Date(d) => d.to_rfc3339(),
            Value::Regex(r) => format!("/{}/{}", r.source, regex_flags_string(&r.flags)),
            Value::Buffer(b) => format!("<Buffer {} bytes>", b.len()),
            Value::Host(h) => format!("[{}]", h.kind),
            Value::Generator(_) => "[Generator]".to_string(),
        }
    }

    /// `console.log` rendering: deterministic, with quoting rules that
    /// differ between top-level and nested display.
    pub fn to_display_string(&self) -> String {
        self.display(false)
    }

    fn display(&self, nested: bool) -> String {
        match self {
            Value::String(s) if nested => format!("'{}'", s),
            Value::Array(items) => {
                let inner = items
                    .borrow()
                    .iter()
                    .map(|v| v.display(true))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("[{}]", inner)
            }
            Value::Object(entries) => {
                let inner = entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v.display(true)))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{{{}}}", inner)
            }
            other => other.to_coerced_string(),
        }
    }

    /// `===`: same kind and equal structural/identity value.
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Regex(a), Value::Regex(b)) => Rc::ptr_eq(a, b),
            (Value::Buffer(a), Value::Buffer(b)) => Rc::ptr_eq(a, b),
            (Value::Host(a), Value::Host(b)) => Rc::ptr_eq(a, b),
            (Value::Generator(a), Value::Generator(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// `==`: coerces across numeric/string/boolean, with null/undefined
    /// equal only to each other under loose comparison, plus a rarer-pairs
    /// rule for the remaining type combinations.
    pub fn loose_eq(&self, other: &Value) -> bool {
        use Value::*;
        if self.type_of() == other.type_of() && !matches!((self, other), (Array(_), Array(_)) | (Object(_), Object(_))) {
            return self.strict_eq(other);
        }
        match (self, other) {
            (Null | Undefined, Null | Undefined) => true,
            (Null, _) | (_, Null) | (Undefined, _) | (_, Undefined) => false,
            (Number(_), String(_)) | (String(_), Number(_)) => self.to_number() == other.to_number(),
            (Boolean(_), _) => Number(self.to_number()).loose_eq(other),
            (_, Boolean(_)) => self.loose_eq(&Number(other.to_number())),
            (Array(_), _) | (Object(_), _) => {
                Number(self.to_coerced_string().parse().unwrap_or(f64::NAN)).loose_eq(other)
            }
            (_, Array(_)) | (_, Object(_)) => other.loose_eq(self),
            _ => self.strict_eq(other),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_eq(other)
    }
}

fn regex_flags_string(flags: &RegexFlags) -> String {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_matches_spec_table() {
        assert!(!Value::Boolean(false).is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Undefined.is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::Number(f64::NAN).is_truthy());
        assert!(!Value::string("").is_truthy());
        assert!(Value::Number(1.0).is_truthy());
        assert!(Value::string("0").is_truthy());
    }

    #[test]
    fn strict_eq_nan_is_never_equal() {
        let nan = Value::Number(f64::NAN);
        assert!(!nan.strict_eq(&nan));
    }

    #[test]
    fn strict_eq_distinguishes_object_identity() {
        let a = Value::empty_object();
        let b = Value::empty_object();
        assert!(!a.strict_eq(&b));
        assert!(a.strict_eq(&a.clone()));
    }

    #[test]
    fn loose_eq_null_and_undefined_equal_only_each_other() {
        assert!(Value::Null.loose_eq(&Value::Undefined));
        assert!(!Value::Null.loose_eq(&Value::Number(0.0)));
    }

    #[test]
    fn loose_eq_coerces_string_and_number() {
        assert!(Value::Number(5.0).loose_eq(&Value::string("5")));
        assert!(Value::string("5").loose_eq(&Value::Number(5.0)));
    }

    #[test]
    fn loose_eq_coerces_boolean() {
        assert!(Value::Boolean(true).loose_eq(&Value::Number(1.0)));
        assert!(Value::Boolean(false).loose_eq(&Value::string("0")));
    }

    #[test]
    fn format_number_uses_minimal_representation() {
        assert_eq!(Value::format_number(3.0), "3");
        assert_eq!(Value::format_number(3.14), "3.14");
        assert_eq!(Value::format_number(f64::INFINITY), "Infinity");
    }

    #[test]
    fn display_quotes_strings_only_when_nested() {
        let arr = Value::array(vec![Value::string("a")]);
        assert_eq!(arr.to_display_string(), "['a']");
        assert_eq!(Value::string("a").to_display_string(), "a");
    }

    #[test]
    fn division_by_zero_is_infinity_not_nan() {
        assert_eq!(1.0 / 0.0_f64, f64::INFINITY);
    }
}

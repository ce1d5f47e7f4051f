//! `Math` facade: a fixed set of constants and pure numeric functions.

use rand::Rng;

use crate::value::Value;

use super::{arg, native, object_from};

pub fn make_math() -> Value {
    object_from(vec![
        ("PI", Value::Number(std::f64::consts::PI)),
        ("E", Value::Number(std::f64::consts::E)),
        ("LN2", Value::Number(std::f64::consts::LN_2)),
        ("LN10", Value::Number(std::f64::consts::LN_10)),
        ("SQRT2", Value::Number(std::f64::consts::SQRT_2)),
        ("abs", native("abs", |_ev, _this, args| Ok(Value::Number(arg(&args, 0).to_number().abs())))),
        ("floor", native("floor", |_ev, _this, args| Ok(Value::Number(arg(&args, 0).to_number().floor())))),
        ("ceil", native("ceil", |_ev, _this, args| Ok(Value::Number(arg(&args, 0).to_number().ceil())))),
        ("round", native("round", |_ev, _this, args| Ok(Value::Number(arg(&args, 0).to_number().round())))),
        ("trunc", native("trunc", |_ev, _this, args| Ok(Value::Number(arg(&args, 0).to_number().trunc())))),
        ("sign", native("sign", |_ev, _this, args| {
            let n = arg(&args, 0).to_number();
            Ok(Value::Number(if n.is_nan() { f64::NAN } else if n > 0.0 { 1.0 } else if n < 0.0 { -1.0 } else { n }))
        })),
        ("sqrt", native("sqrt", |_ev, _this, args| Ok(Value::Number(arg(&args, 0).to_number().sqrt())))),
        ("cbrt", native("cbrt", |_ev, _this, args| Ok(Value::Number(arg(&args, 0).to_number().cbrt())))),
        ("pow", native("pow", |_ev, _this, args| {
            Ok(Value::Number(arg(&args, 0).to_number().powf(arg(&args, 1).to_number())))
        })),
        ("exp", native("exp", |_ev, _this, args| Ok(Value::Number(arg(&args, 0).to_number().exp())))),
        ("log", native("log", |_ev, _this, args| Ok(Value::Number(arg(&args, 0).to_number().ln())))),
        ("log2", native("log2", |_ev, _this, args| Ok(Value::Number(arg(&args, 0).to_number().log2())))),
        ("log10", native("log10", |_ev, _this, args| Ok(Value::Number(arg(&args, 0).to_number().log10())))),
        ("sin", native("sin", |_ev, _this, args| Ok(Value::Number(arg(&args, 0).to_number().sin())))),
        ("cos", native("cos", |_ev, _this, args| Ok(Value::Number(arg(&args, 0).to_number().cos())))),
        ("tan", native("tan", |_ev, _this, args| Ok(Value::Number(arg(&args, 0).to_number().tan())))),
        ("atan2", native("atan2", |_ev, _this, args| {
            Ok(Value::Number(arg(&args, 0).to_number().atan2(arg(&args, 1).to_number())))
        })),
        ("min", native("min", |_ev, _this, args| {
            Ok(Value::Number(args.iter().map(Value::to_number).fold(f64::INFINITY, f64::min)))
        })),
        ("max", native("max", |_ev, _this, args| {
            Ok(Value::Number(args.iter().map(Value::to_number).fold(f64::NEG_INFINITY, f64::max)))
        })),
        ("random", native("random", |_ev, _this, _args| {
            Ok(Value::Number(rand::thread_rng().gen::<f64>()))
        })),
        ("hypot", native("hypot", |_ev, _this, args| {
            Ok(Value::Number(args.iter().map(|v| v.to_number().powi(2)).sum::<f64>().sqrt()))
        })),
    ])
}

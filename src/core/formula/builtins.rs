//! Builtin functions and constants
//!
//! The complete set of callables a formula can reach. Anything not listed
//! here is not callable.

use crate::core::dates::{coerce_date, days_between};
use crate::error::{FormulaError, FormulaResult};
use crate::types::Scalar;
use chrono::{DateTime, Utc};

/// Value of a builtin constant path, if it is one
pub fn constant(path: &str, now: DateTime<Utc>) -> Option<Scalar> {
    match path {
        "CURRENT_TIMESTAMP" => Some(Scalar::Date(now)),
        "Math.PI" => Some(Scalar::Number(std::f64::consts::PI)),
        "Math.E" => Some(Scalar::Number(std::f64::consts::E)),
        "Math.LN2" => Some(Scalar::Number(std::f64::consts::LN_2)),
        "Math.LN10" => Some(Scalar::Number(std::f64::consts::LN_10)),
        "Math.SQRT2" => Some(Scalar::Number(std::f64::consts::SQRT_2)),
        _ => None,
    }
}

/// Call a builtin function. Returns `None` when `path` names no builtin.
pub fn call(path: &str, args: &[Scalar], now: DateTime<Utc>) -> Option<FormulaResult<Scalar>> {
    let result = match path {
        // ═══════════════════════════════════════════════════════════════════
        // Math namespace
        // ═══════════════════════════════════════════════════════════════════
        "Math.abs" => unary_math(path, args, f64::abs),
        "Math.floor" => unary_math(path, args, f64::floor),
        "Math.ceil" => unary_math(path, args, f64::ceil),
        "Math.trunc" => unary_math(path, args, f64::trunc),
        "Math.sqrt" => unary_math(path, args, f64::sqrt),
        "Math.cbrt" => unary_math(path, args, f64::cbrt),
        "Math.exp" => unary_math(path, args, f64::exp),
        "Math.log" => unary_math(path, args, f64::ln),
        "Math.log10" => unary_math(path, args, f64::log10),
        "Math.log2" => unary_math(path, args, f64::log2),
        "Math.round" => unary_math(path, args, js_round),
        "Math.sign" => unary_math(path, args, |n| {
            if n == 0.0 || n.is_nan() {
                n
            } else {
                n.signum()
            }
        }),
        "Math.pow" => binary_math(path, args, f64::powf),
        "Math.hypot" => numbers(path, args).map(|ns| {
            Scalar::Number(ns.iter().map(|n| n * n).sum::<f64>().sqrt())
        }),
        "Math.min" => numbers(path, args)
            .map(|ns| Scalar::Number(ns.into_iter().fold(f64::INFINITY, f64::min))),
        "Math.max" => numbers(path, args)
            .map(|ns| Scalar::Number(ns.into_iter().fold(f64::NEG_INFINITY, f64::max))),

        // ═══════════════════════════════════════════════════════════════════
        // Aggregate helpers (null arguments are skipped)
        // ═══════════════════════════════════════════════════════════════════
        "SUM" => present_numbers(path, args).map(|ns| Scalar::Number(ns.iter().sum())),
        "AVG" => present_numbers(path, args).and_then(|ns| {
            if ns.is_empty() {
                Err(FormulaError::runtime("AVG requires at least one value"))
            } else {
                Ok(Scalar::Number(ns.iter().sum::<f64>() / ns.len() as f64))
            }
        }),
        "MIN" => present_numbers(path, args).and_then(|ns| {
            ns.into_iter()
                .reduce(f64::min)
                .map(Scalar::Number)
                .ok_or_else(|| FormulaError::runtime("MIN requires at least one value"))
        }),
        "MAX" => present_numbers(path, args).and_then(|ns| {
            ns.into_iter()
                .reduce(f64::max)
                .map(Scalar::Number)
                .ok_or_else(|| FormulaError::runtime("MAX requires at least one value"))
        }),
        "COUNT" => Ok(Scalar::Number(
            args.iter().filter(|a| !a.is_null()).count() as f64,
        )),
        "ROUND" => round(args),
        "ABS" => unary_math(path, args, f64::abs),

        // ═══════════════════════════════════════════════════════════════════
        // Parsing
        // ═══════════════════════════════════════════════════════════════════
        "parseFloat" => require_args_range(path, args, 1, 1)
            .map(|_| Scalar::Number(parse_float_prefix(&args[0]))),
        "parseInt" => parse_int(args),

        // ═══════════════════════════════════════════════════════════════════
        // Dates
        // ═══════════════════════════════════════════════════════════════════
        "Date" => match args {
            [] => Ok(Scalar::Date(now)),
            [value] => to_date(path, value),
            _ => Err(FormulaError::runtime("Date() accepts at most one argument")),
        },
        "dateObj" => require_args_range(path, args, 1, 1).and_then(|_| to_date(path, &args[0])),
        "Date.now" => require_args_range(path, args, 0, 0)
            .map(|_| Scalar::Number(now.timestamp_millis() as f64)),
        "Date.parse" => require_args_range(path, args, 1, 1).map(|_| {
            let ms = coerce_date(&args[0])
                .map(|d| d.timestamp_millis() as f64)
                .unwrap_or(f64::NAN);
            Scalar::Number(ms)
        }),
        "now" => require_args_range(path, args, 0, 0).map(|_| Scalar::Date(now)),
        "daysBetween" => require_args_range(path, args, 2, 2).and_then(|_| {
            let a = date_arg(path, &args[0])?;
            let b = date_arg(path, &args[1])?;
            Ok(Scalar::Number(days_between(a, b) as f64))
        }),

        _ => return None,
    };
    Some(result)
}

/// Numeric view of an operand; non-numeric text is a type error
pub fn numeric(context: &str, value: &Scalar) -> FormulaResult<f64> {
    match value {
        Scalar::Text(s) if value.as_number().is_none() && !s.trim().is_empty() => {
            Err(FormulaError::runtime(format!(
                "{}: expected a number but got text {:?}",
                context, s
            )))
        }
        other => Ok(other.to_number()),
    }
}

fn require_args_range(name: &str, args: &[Scalar], min: usize, max: usize) -> FormulaResult<()> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{}-{}", min, max)
        };
        return Err(FormulaError::runtime(format!(
            "{} expects {} argument(s), got {}",
            name,
            expected,
            args.len()
        )));
    }
    Ok(())
}

fn unary_math(name: &str, args: &[Scalar], f: impl Fn(f64) -> f64) -> FormulaResult<Scalar> {
    require_args_range(name, args, 1, 1)?;
    Ok(Scalar::Number(f(numeric(name, &args[0])?)))
}

fn binary_math(name: &str, args: &[Scalar], f: impl Fn(f64, f64) -> f64) -> FormulaResult<Scalar> {
    require_args_range(name, args, 2, 2)?;
    Ok(Scalar::Number(f(
        numeric(name, &args[0])?,
        numeric(name, &args[1])?,
    )))
}

fn numbers(name: &str, args: &[Scalar]) -> FormulaResult<Vec<f64>> {
    args.iter().map(|a| numeric(name, a)).collect()
}

fn present_numbers(name: &str, args: &[Scalar]) -> FormulaResult<Vec<f64>> {
    args.iter()
        .filter(|a| !a.is_null())
        .map(|a| numeric(name, a))
        .collect()
}

/// JavaScript rounding: halves round toward positive infinity
fn js_round(n: f64) -> f64 {
    (n + 0.5).floor()
}

fn round(args: &[Scalar]) -> FormulaResult<Scalar> {
    require_args_range("ROUND", args, 1, 2)?;
    let value = numeric("ROUND", &args[0])?;
    let decimals = match args.get(1) {
        Some(d) => numeric("ROUND", d)? as i32,
        None => 0,
    };
    let multiplier = 10_f64.powi(decimals);
    Ok(Scalar::Number((value * multiplier).round() / multiplier))
}

fn to_date(name: &str, value: &Scalar) -> FormulaResult<Scalar> {
    date_arg(name, value).map(Scalar::Date)
}

fn date_arg(name: &str, value: &Scalar) -> FormulaResult<DateTime<Utc>> {
    coerce_date(value).ok_or_else(|| {
        FormulaError::runtime(format!("{}: {:?} is not a valid date", name, value.to_string()))
    })
}

/// Longest leading decimal prefix, as `parseFloat` reads it
fn parse_float_prefix(value: &Scalar) -> f64 {
    if let Scalar::Number(n) = value {
        return *n;
    }
    let text = value.to_string();
    let text = text.trim_start();
    let bytes = text.as_bytes();

    let mut end = 0;
    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    if end == digits_start || (end == digits_start + 1 && bytes[digits_start] == b'.') {
        return f64::NAN;
    }
    // Optional exponent, only if it has digits
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }

    text[..end].parse().unwrap_or(f64::NAN)
}

fn parse_int(args: &[Scalar]) -> FormulaResult<Scalar> {
    require_args_range("parseInt", args, 1, 2)?;
    let radix = match args.get(1) {
        Some(r) if !r.is_null() => numeric("parseInt", r)? as u32,
        _ => 10,
    };
    if !(2..=36).contains(&radix) {
        return Ok(Scalar::Number(f64::NAN));
    }

    let text = match &args[0] {
        Scalar::Number(n) => n.trunc().to_string(),
        other => other.to_string(),
    };
    let text = text.trim_start();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let prefix: String = digits.chars().take_while(|c| c.is_digit(radix)).collect();
    if prefix.is_empty() {
        return Ok(Scalar::Number(f64::NAN));
    }

    let magnitude = i64::from_str_radix(&prefix, radix)
        .map(|n| n as f64)
        .unwrap_or(f64::NAN);
    Ok(Scalar::Number(if negative { -magnitude } else { magnitude }))
}

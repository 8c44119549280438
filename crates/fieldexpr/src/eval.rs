use std::collections::HashMap;

use chrono::{Datelike, Duration, NaiveDate};
use lockbox_domain::{Error, Result};
use rand::Rng;

use crate::ast::{CompOp, Expr, ProductOp, SumOp};
use crate::value::Value;

pub type Context = HashMap<String, Value>;

pub fn eval(expr: &Expr, context: &Context) -> Result<Value> {
    match expr {
        Expr::Number(n) => Ok(Value::Int(*n)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::Variable(name) => context
            .get(name)
            .cloned()
            .ok_or_else(|| Error::FieldExpr(format!("undefined variable ${name}"))),
        Expr::Neg(inner) => match eval(inner, context)? {
            Value::Int(n) => Ok(Value::Int(-n)),
            other => Err(Error::FieldExpr(format!("cannot negate a {}", other.type_name()))),
        },
        Expr::Comp(lhs, op, rhs) => eval_comp(lhs, *op, rhs, context),
        Expr::Sum(lhs, op, rhs) => {
            let l = eval(lhs, context)?;
            let r = eval(rhs, context)?;
            eval_sum(*op, l, r)
        }
        Expr::Product(lhs, op, rhs) => {
            let l = eval(lhs, context)?;
            let r = eval(rhs, context)?;
            eval_product(*op, l, r)
        }
        Expr::Call(name, args) => {
            let values: Result<Vec<Value>> = args.iter().map(|a| eval(a, context)).collect();
            call_builtin(name, values?)
        }
    }
}

/// `||` and `&&` are non-short-circuiting: both sides are always evaluated,
/// matching a bottom-up tree-walk over the parsed expression.
fn eval_comp(lhs: &Expr, op: CompOp, rhs: &Expr, context: &Context) -> Result<Value> {
    let l = eval(lhs, context)?;
    let r = eval(rhs, context)?;
    match op {
        CompOp::Or => Ok(if l.truthy() { l } else { r }),
        CompOp::And => Ok(if !l.truthy() { l } else { r }),
        CompOp::Gt | CompOp::Ge | CompOp::Lt | CompOp::Le | CompOp::Eq | CompOp::Ne => {
            let ordering = compare(&l, &r)?;
            let result = match op {
                CompOp::Gt => ordering == std::cmp::Ordering::Greater,
                CompOp::Ge => ordering != std::cmp::Ordering::Less,
                CompOp::Lt => ordering == std::cmp::Ordering::Less,
                CompOp::Le => ordering != std::cmp::Ordering::Greater,
                CompOp::Eq => ordering == std::cmp::Ordering::Equal,
                CompOp::Ne => ordering != std::cmp::Ordering::Equal,
                CompOp::Or | CompOp::And => unreachable!(),
            };
            Ok(Value::Bool(result))
        }
    }
}

fn compare(l: &Value, r: &Value) -> Result<std::cmp::Ordering> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        (Value::Date(a), Value::Date(b)) => Ok(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
        _ => Err(Error::FieldExpr(format!(
            "cannot compare {} with {}",
            l.type_name(),
            r.type_name()
        ))),
    }
}

fn eval_sum(op: SumOp, l: Value, r: Value) -> Result<Value> {
    match (op, l, r) {
        (SumOp::Add, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
        (SumOp::Add, Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
        (SumOp::Sub, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a - b)),
        (op, l, r) => Err(Error::FieldExpr(format!(
            "cannot apply {op:?} to {} and {}",
            l.type_name(),
            r.type_name()
        ))),
    }
}

fn eval_product(op: ProductOp, l: Value, r: Value) -> Result<Value> {
    let (Value::Int(a), Value::Int(b)) = (&l, &r) else {
        return Err(Error::FieldExpr(format!(
            "cannot apply {op:?} to {} and {}",
            l.type_name(),
            r.type_name()
        )));
    };
    let (a, b) = (*a, *b);
    match op {
        ProductOp::Mul => Ok(Value::Int(a * b)),
        ProductOp::Div => {
            if b == 0 {
                return Err(Error::FieldExpr("division by zero".into()));
            }
            Ok(Value::Int(a.div_euclid(b)))
        }
        ProductOp::Mod => {
            if b == 0 {
                return Err(Error::FieldExpr("modulo by zero".into()));
            }
            Ok(Value::Int(a.rem_euclid(b)))
        }
    }
}

fn expect_str(v: &Value) -> Result<&str> {
    match v {
        Value::Str(s) => Ok(s),
        other => Err(Error::FieldExpr(format!("expected string, got {}", other.type_name()))),
    }
}

fn expect_int(v: &Value) -> Result<i64> {
    match v {
        Value::Int(n) => Ok(*n),
        other => Err(Error::FieldExpr(format!("expected int, got {}", other.type_name()))),
    }
}

fn expect_date(v: &Value) -> Result<NaiveDate> {
    match v {
        Value::Date(d) => Ok(*d),
        other => Err(Error::FieldExpr(format!("expected date, got {}", other.type_name()))),
    }
}

/// Python-style slice indices: negative counts from the end, clamped to the
/// string's bounds.
fn slice_bound(idx: i64, len: usize) -> usize {
    if idx < 0 {
        len.saturating_sub((-idx) as usize)
    } else {
        (idx as usize).min(len)
    }
}

fn call_builtin(name: &str, args: Vec<Value>) -> Result<Value> {
    match name {
        "substr" => {
            let s = expect_str(args.first().ok_or_else(|| arity_error(name))?)?;
            let chars: Vec<char> = s.chars().collect();
            let start = slice_bound(expect_int(args.get(1).ok_or_else(|| arity_error(name))?)?, chars.len());
            let end = match args.get(2) {
                Some(Value::Int(n)) => slice_bound(*n, chars.len()),
                Some(other) => return Err(Error::FieldExpr(format!("expected int, got {}", other.type_name()))),
                None => chars.len(),
            };
            let end = end.max(start);
            Ok(Value::Str(chars[start..end].iter().collect()))
        }
        "len" => {
            let s = expect_str(args.first().ok_or_else(|| arity_error(name))?)?;
            Ok(Value::Int(s.chars().count() as i64))
        }
        "tok" => {
            let s = expect_str(args.first().ok_or_else(|| arity_error(name))?)?;
            let sep = expect_str(args.get(1).ok_or_else(|| arity_error(name))?)?;
            let idx = expect_int(args.get(2).ok_or_else(|| arity_error(name))?)?;
            let parts: Vec<&str> = s.split(sep).collect();
            let i = if idx < 0 { parts.len() as i64 + idx } else { idx };
            let part = usize::try_from(i)
                .ok()
                .and_then(|i| parts.get(i))
                .ok_or_else(|| Error::FieldExpr(format!("tok index {idx} out of range")))?;
            Ok(Value::Str((*part).to_string()))
        }
        "cap" => {
            let s = expect_str(args.first().ok_or_else(|| arity_error(name))?)?;
            let mut chars = s.chars();
            let out = match chars.next() {
                Some(c) => c.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
                None => String::new(),
            };
            Ok(Value::Str(out))
        }
        "upper" => Ok(Value::Str(expect_str(args.first().ok_or_else(|| arity_error(name))?)?.to_uppercase())),
        "lower" => Ok(Value::Str(expect_str(args.first().ok_or_else(|| arity_error(name))?)?.to_lowercase())),
        "padl" | "padr" => {
            let s = expect_str(args.first().ok_or_else(|| arity_error(name))?)?;
            let pad = expect_str(args.get(1).ok_or_else(|| arity_error(name))?)?;
            let pad_char = pad.chars().next().unwrap_or(' ');
            let minlen = expect_int(args.get(2).ok_or_else(|| arity_error(name))?)? as usize;
            let len = s.chars().count();
            if len >= minlen {
                return Ok(Value::Str(s.to_string()));
            }
            let fill: String = std::iter::repeat(pad_char).take(minlen - len).collect();
            Ok(Value::Str(if name == "padl" { fill + s } else { s.to_string() + &fill }))
        }
        "if" => {
            let cond = args.first().ok_or_else(|| arity_error(name))?;
            let if_true = args.get(1).ok_or_else(|| arity_error(name))?;
            let if_false = args.get(2).ok_or_else(|| arity_error(name))?;
            Ok(if cond.truthy() { if_true.clone() } else { if_false.clone() })
        }
        "str" => Ok(Value::Str(args.first().ok_or_else(|| arity_error(name))?.to_string())),
        "int" => match args.first().ok_or_else(|| arity_error(name))? {
            Value::Int(n) => Ok(Value::Int(*n)),
            Value::Str(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|e| Error::FieldExpr(format!("cannot parse {s:?} as int: {e}"))),
            other => Err(Error::FieldExpr(format!("cannot convert {} to int", other.type_name()))),
        },
        "date" => {
            let year = expect_int(args.first().ok_or_else(|| arity_error(name))?)?;
            let month = expect_int(args.get(1).ok_or_else(|| arity_error(name))?)?;
            let day = expect_int(args.get(2).ok_or_else(|| arity_error(name))?)?;
            NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
                .map(Value::Date)
                .ok_or_else(|| Error::FieldExpr(format!("invalid date {year}-{month}-{day}")))
        }
        "dyear" => Ok(Value::Int(expect_date(args.first().ok_or_else(|| arity_error(name))?)?.year() as i64)),
        "dmon" => Ok(Value::Int(expect_date(args.first().ok_or_else(|| arity_error(name))?)?.month() as i64)),
        "dday" => Ok(Value::Int(expect_date(args.first().ok_or_else(|| arity_error(name))?)?.day() as i64)),
        "dadd" => {
            let date = expect_date(args.first().ok_or_else(|| arity_error(name))?)?;
            let days = expect_int(args.get(1).ok_or_else(|| arity_error(name))?)?;
            Ok(Value::Date(date + Duration::days(days)))
        }
        "min" | "unmax" => reduce_min_max(args, true),
        "max" => reduce_min_max(args, false),
        "random" => {
            let lo = expect_int(args.first().ok_or_else(|| arity_error(name))?)?;
            let hi = expect_int(args.get(1).ok_or_else(|| arity_error(name))?)?;
            if lo > hi {
                return Err(Error::FieldExpr(format!("random range is empty: {lo}..={hi}")));
            }
            Ok(Value::Int(rand::thread_rng().gen_range(lo..=hi)))
        }
        other => Err(Error::FieldExpr(format!("unknown function {other}"))),
    }
}

fn reduce_min_max(args: Vec<Value>, want_min: bool) -> Result<Value> {
    let mut iter = args.into_iter();
    let mut best = iter.next().ok_or_else(|| Error::FieldExpr("min/max needs at least one argument".into()))?;
    for v in iter {
        let ordering = compare(&v, &best)?;
        let replace = if want_min {
            ordering == std::cmp::Ordering::Less
        } else {
            ordering == std::cmp::Ordering::Greater
        };
        if replace {
            best = v;
        }
    }
    Ok(best)
}

fn arity_error(name: &str) -> Error {
    Error::FieldExpr(format!("{name}: missing required argument"))
}

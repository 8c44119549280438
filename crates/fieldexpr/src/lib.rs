//! The per-form-field value expression language: a small grammar (comparison
//! over sums over products over unary negation over function-call/atom)
//! evaluated against a name→value context built for each form fill.

mod ast;
mod eval;
mod lexer;
mod parser;
mod value;

pub use eval::Context;
pub use value::Value;

use lockbox_domain::Result;

/// Parses and evaluates `text` against `context` in one pass. The evaluator
/// is synchronous and has no suspension points.
pub fn interpret(text: &str, context: &Context) -> Result<Value> {
    let tokens = lexer::tokenize(text)?;
    let expr = parser::Parser::new(&tokens).parse()?;
    eval::eval(&expr, context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ctx(pairs: &[(&str, Value)]) -> Context {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn string_literal_escape() {
        let v = interpret(r"'it\'s here'", &Context::new()).unwrap();
        assert_eq!(v, Value::Str("it's here".into()));
    }

    #[test]
    fn arithmetic_precedence() {
        let v = interpret("2 + 3 * 4", &Context::new()).unwrap();
        assert_eq!(v, Value::Int(14));
    }

    #[test]
    fn unary_negation() {
        let v = interpret("-5 + 2", &Context::new()).unwrap();
        assert_eq!(v, Value::Int(-3));
    }

    #[test]
    fn variable_lookup() {
        let context = ctx(&[("grade", Value::Int(12))]);
        let v = interpret("$grade >= 12", &context).unwrap();
        assert_eq!(v, Value::Bool(true));
    }

    #[test]
    fn padl_example_from_spec() {
        let context = ctx(&[("student_number", Value::Str("0123456".into()))]);
        let v = interpret("padl(substr($student_number, 1, 4), '0', 5)", &context).unwrap();
        assert_eq!(v, Value::Str("00123".into()));
    }

    #[test]
    fn if_example_from_spec() {
        let context = ctx(&[("grade", Value::Int(12))]);
        let v = interpret("if($grade >= 12, 'sr', 'jr')", &context).unwrap();
        assert_eq!(v, Value::Str("sr".into()));

        let context = ctx(&[("grade", Value::Int(9))]);
        let v = interpret("if($grade >= 12, 'sr', 'jr')", &context).unwrap();
        assert_eq!(v, Value::Str("jr".into()));
    }

    #[test]
    fn or_and_return_operand_not_bool() {
        let v = interpret("'' || 'fallback'", &Context::new()).unwrap();
        assert_eq!(v, Value::Str("fallback".into()));

        let v = interpret("0 && 5", &Context::new()).unwrap();
        assert_eq!(v, Value::Int(0));
    }

    #[test]
    fn date_builtins() {
        let v = interpret("dadd(date(2024, 2, 28), 1)", &Context::new()).unwrap();
        assert_eq!(v, Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()));

        let v = interpret("dyear(date(2024, 2, 28))", &Context::new()).unwrap();
        assert_eq!(v, Value::Int(2024));
    }

    #[test]
    fn tok_and_cap() {
        let v = interpret("tok('a,b,c', ',', 1)", &Context::new()).unwrap();
        assert_eq!(v, Value::Str("b".into()));

        let v = interpret("cap('ADA LOVELACE')", &Context::new()).unwrap();
        assert_eq!(v, Value::Str("Ada lovelace".into()));
    }

    #[test]
    fn division_floors_toward_negative_infinity() {
        let v = interpret("-7 / 2", &Context::new()).unwrap();
        assert_eq!(v, Value::Int(-4));
    }

    #[test]
    fn min_max_aliases() {
        assert_eq!(interpret("min(3, 1, 2)", &Context::new()).unwrap(), Value::Int(1));
        assert_eq!(interpret("max(3, 1, 2)", &Context::new()).unwrap(), Value::Int(3));
        assert_eq!(interpret("unmax(3, 1, 2)", &Context::new()).unwrap(), Value::Int(1));
    }

    #[test]
    fn undefined_variable_errors() {
        assert!(interpret("$missing", &Context::new()).is_err());
    }
}

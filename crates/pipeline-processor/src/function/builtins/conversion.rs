//! 타입 변환과 타입 검사 함수
//!
//! 변환 함수의 `value`는 선택 인자입니다. 값이 없거나 변환할 수 없으면
//! `default`가 반환됩니다.

use std::collections::BTreeMap;

use ironpipe_core::types::{ObjectValue, Value, ValueType};

use crate::context::EvaluationContext;
use crate::error::{EvalError, ProcessorError};
use crate::function::{
    FunctionArgs, FunctionDescriptor, FunctionRegistry, NativeBody, NativeFunction,
    ParameterDescriptor,
};

pub(super) fn register(registry: &mut FunctionRegistry) -> Result<(), ProcessorError> {
    registry.register(NativeFunction::new(
        FunctionDescriptor::builder("to_string", ValueType::String)
            .pure()
            .param(ParameterDescriptor::optional("value", ValueType::Any))
            .param(ParameterDescriptor::optional("default", ValueType::String).default_value(""))
            .description("Converts a value to its string representation")
            .build(),
        to_string,
    ))?;
    registry.register(NativeFunction::new(
        FunctionDescriptor::builder("to_long", ValueType::Long)
            .pure()
            .param(ParameterDescriptor::optional("value", ValueType::Any))
            .param(ParameterDescriptor::optional("default", ValueType::Long).default_value(0))
            .description("Converts a number or numeric string to a long")
            .build(),
        to_long,
    ))?;
    registry.register(NativeFunction::new(
        FunctionDescriptor::builder("to_double", ValueType::Double)
            .pure()
            .param(ParameterDescriptor::optional("value", ValueType::Any))
            .param(ParameterDescriptor::optional("default", ValueType::Double).default_value(0.0))
            .description("Converts a number or numeric string to a double")
            .build(),
        to_double,
    ))?;
    registry.register(NativeFunction::new(
        FunctionDescriptor::builder("to_bool", ValueType::Boolean)
            .pure()
            .param(ParameterDescriptor::optional("value", ValueType::Any))
            .description("Converts \"true\" (any case) and non-zero numbers to true")
            .build(),
        to_bool,
    ))?;

    registry.register(NativeFunction::new(
        FunctionDescriptor::builder("to_map", ValueType::Map)
            .pure()
            .param(ParameterDescriptor::optional("value", ValueType::Any))
            .param(ParameterDescriptor::optional("default", ValueType::Map))
            .description("Returns a map value unchanged, otherwise the default (or an empty map)")
            .build(),
        to_map,
    ))?;

    let checks: [(&str, NativeBody); 12] = [
        ("is_null", is_null),
        ("is_not_null", is_not_null),
        ("is_string", is_string),
        ("is_long", is_long),
        ("is_double", is_double),
        ("is_number", is_number),
        ("is_boolean", is_boolean),
        ("is_list", is_list),
        ("is_map", is_map),
        ("is_collection", is_collection),
        ("is_date", is_date),
        ("is_period", is_period),
    ];
    for (name, body) in checks {
        registry.register(NativeFunction::new(
            FunctionDescriptor::builder(name, ValueType::Boolean)
                .pure()
                .param(ParameterDescriptor::optional("value", ValueType::Any))
                .build(),
            body,
        ))?;
    }
    Ok(())
}

fn to_string(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    match args.optional(ctx, "value")? {
        Some(Value::String(s)) => Ok(Value::String(s)),
        Some(other) => Ok(Value::String(other.to_string())),
        None => Ok(args.optional(ctx, "default")?.unwrap_or_default()),
    }
}

fn to_long(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    let converted = match args.optional(ctx, "value")? {
        Some(Value::Long(n)) => Some(n),
        Some(Value::Double(d)) => double_to_long(d),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(double_to_long))
        }
        Some(Value::Object(ObjectValue::Date(dt))) => Some(dt.timestamp_millis()),
        _ => None,
    };
    match converted {
        Some(n) => Ok(Value::Long(n)),
        None => Ok(args.optional(ctx, "default")?.unwrap_or_default()),
    }
}

fn double_to_long(d: f64) -> Option<i64> {
    let truncated = d.trunc();
    // i64::MAX as f64는 2^63으로 반올림되므로 상한은 배타적으로 비교
    (truncated.is_finite() && truncated >= i64::MIN as f64 && truncated < i64::MAX as f64)
        .then_some(truncated as i64)
}

fn to_double(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    let converted = match args.optional(ctx, "value")? {
        Some(Value::Double(d)) => Some(d),
        Some(Value::Long(n)) => Some(n as f64),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match converted {
        Some(d) => Ok(Value::Double(d)),
        None => Ok(args.optional(ctx, "default")?.unwrap_or_default()),
    }
}

fn to_bool(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    let b = match args.optional(ctx, "value")? {
        Some(Value::Boolean(b)) => b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        Some(Value::Long(n)) => n != 0,
        Some(Value::Double(d)) => d != 0.0,
        _ => false,
    };
    Ok(Value::Boolean(b))
}

fn to_map(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    match args.optional(ctx, "value")? {
        Some(Value::Map(map)) => Ok(Value::Map(map)),
        _ => Ok(args
            .optional(ctx, "default")?
            .unwrap_or_else(|| Value::Map(BTreeMap::new()))),
    }
}

macro_rules! type_check {
    ($name:ident, $pattern:pat) => {
        fn $name(
            args: &mut FunctionArgs<'_>,
            ctx: &mut EvaluationContext<'_>,
        ) -> Result<Value, EvalError> {
            let value = args.optional(ctx, "value")?.unwrap_or_default();
            Ok(Value::Boolean(matches!(value, $pattern)))
        }
    };
}

type_check!(is_null, Value::Null);
type_check!(is_string, Value::String(_));
type_check!(is_long, Value::Long(_));
type_check!(is_double, Value::Double(_));
type_check!(is_number, Value::Long(_) | Value::Double(_));
type_check!(is_boolean, Value::Boolean(_));
type_check!(is_list, Value::List(_));
type_check!(is_map, Value::Map(_));
type_check!(
    is_collection,
    Value::List(_) | Value::Map(_) | Value::Object(ObjectValue::Set(_))
);
type_check!(is_date, Value::Object(ObjectValue::Date(_)));
type_check!(is_period, Value::Object(ObjectValue::Period(_)));

fn is_not_null(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    Ok(Value::Boolean(args.optional(ctx, "value")?.is_some()))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::call;
    use super::*;

    fn convert(function: &str, value: Value) -> Value {
        call(function, &[("value", value)]).unwrap()
    }

    #[test]
    fn to_string_formats_values() {
        assert_eq!(
            call("to_string", &[("value", Value::Long(5))]).unwrap(),
            Value::from("5")
        );
        assert_eq!(
            call("to_string", &[("value", Value::Double(1.0))]).unwrap(),
            Value::from("1.0")
        );
        assert_eq!(
            call("to_string", &[("default", Value::from("none"))]).unwrap(),
            Value::from("none")
        );
        assert_eq!(call("to_string", &[]).unwrap(), Value::from(""));
    }

    #[test]
    fn to_long_parses_and_falls_back() {
        assert_eq!(
            call("to_long", &[("value", Value::from(" 42 "))]).unwrap(),
            Value::Long(42)
        );
        assert_eq!(
            call("to_long", &[("value", Value::from("3.9"))]).unwrap(),
            Value::Long(3)
        );
        assert_eq!(
            call("to_long", &[("value", Value::Double(-2.5))]).unwrap(),
            Value::Long(-2)
        );
        let args = [("value", Value::from("x")), ("default", Value::Long(-1))];
        assert_eq!(call("to_long", &args).unwrap(), Value::Long(-1));
        assert_eq!(
            call("to_long", &[("value", Value::Double(f64::INFINITY))]).unwrap(),
            Value::Long(0)
        );
    }

    #[test]
    fn to_double_accepts_long_default() {
        // Long 기본값은 Double 파라미터로 승격
        let args = [("value", Value::from("n/a")), ("default", Value::Long(2))];
        assert_eq!(call("to_double", &args).unwrap(), Value::Double(2.0));
        assert_eq!(
            call("to_double", &[("value", Value::Long(3))]).unwrap(),
            Value::Double(3.0)
        );
    }

    #[test]
    fn to_bool_rules() {
        assert_eq!(
            convert("to_bool", Value::from("TRUE")),
            Value::Boolean(true)
        );
        assert_eq!(
            convert("to_bool", Value::from("yes")),
            Value::Boolean(false)
        );
        assert_eq!(convert("to_bool", Value::Long(2)), Value::Boolean(true));
        assert_eq!(call("to_bool", &[]).unwrap(), Value::Boolean(false));
    }

    #[test]
    fn type_checks() {
        assert_eq!(call("is_null", &[]).unwrap(), Value::Boolean(true));
        assert_eq!(convert("is_not_null", Value::Long(0)), Value::Boolean(true));
        assert_eq!(
            convert("is_number", Value::Double(0.1)),
            Value::Boolean(true)
        );
        assert_eq!(convert("is_string", Value::Long(1)), Value::Boolean(false));
        assert_eq!(
            convert("is_list", Value::List(vec![])),
            Value::Boolean(true)
        );
    }

    #[test]
    fn to_map_passes_maps_and_falls_back() {
        let mut map = BTreeMap::new();
        map.insert("k".to_owned(), Value::Long(1));
        assert_eq!(
            call("to_map", &[("value", Value::Map(map.clone()))]).unwrap(),
            Value::Map(map.clone())
        );
        assert_eq!(
            call("to_map", &[("value", Value::from("k=1"))]).unwrap(),
            Value::Map(BTreeMap::new())
        );
        let fallback = Value::Map(map.clone());
        let args = [("value", Value::Long(1)), ("default", fallback)];
        assert_eq!(call("to_map", &args).unwrap(), Value::Map(map));
    }

    #[test]
    fn is_collection_covers_lists_maps_and_sets() {
        let is_collection = |value: Value| call("is_collection", &[("value", value)]).unwrap();
        assert_eq!(is_collection(Value::List(vec![])), Value::Boolean(true));
        assert_eq!(
            is_collection(Value::Map(BTreeMap::new())),
            Value::Boolean(true)
        );
        assert_eq!(
            is_collection(Value::set([Value::from("s")])),
            Value::Boolean(true)
        );
        assert_eq!(is_collection(Value::from("abc")), Value::Boolean(false));
    }
}

//! 표현식 평가
//!
//! # 평가 규칙
//!
//! - 존재하지 않는 필드, 바인딩되지 않은 변수, 없는 맵 키는 `null`
//! - `and`/`or`는 왼쪽부터 단락 평가. 피연산자 `null`은 false, 그 외 비불리언은 `TypeMismatch`
//! - `eq`/`ne`는 숫자를 승격해 비교하고, 그 외 타입이 다르면 서로 다른 값
//! - 순서 비교에서 한쪽이 `null`이면 false. 숫자, 문자열, 날짜끼리만 비교 가능
//! - `Long` 연산은 오버플로우와 0 나누기를 `Arithmetic` 에러로 보고. 한쪽이 `Double`이면 실수 연산
//! - 산술 피연산자 한쪽이 `null`이면 결과도 `null`
//! - 인덱스 접근 대상이 리스트/맵/객체가 아니면 (`null` 포함) `InvalidIndexTarget`

use std::cmp::Ordering;

use ironpipe_core::period::Period;
use ironpipe_core::types::{ObjectValue, Value, ValueType};

use super::{ArithOp, CompareOp, Expression, FunctionCall};
use crate::context::EvaluationContext;
use crate::error::EvalError;
use crate::function::FunctionArgs;

impl Expression {
    /// 표현식을 평가합니다.
    pub fn evaluate(&self, ctx: &mut EvaluationContext<'_>) -> Result<Value, EvalError> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Variable(name) => Ok(ctx.variable(name).cloned().unwrap_or_default()),
            Self::Field(name) => Ok(ctx.message().field(name).cloned().unwrap_or_default()),
            Self::Index { target, index } => {
                let target = target.evaluate(ctx)?;
                let index = index.evaluate(ctx)?;
                index_value(target, &index)
            }
            Self::Call(call) => call.evaluate(ctx),
            Self::And(ops) => {
                for op in ops {
                    if !as_condition(op.evaluate(ctx)?, "and")? {
                        return Ok(Value::Boolean(false));
                    }
                }
                Ok(Value::Boolean(true))
            }
            Self::Or(ops) => {
                for op in ops {
                    if as_condition(op.evaluate(ctx)?, "or")? {
                        return Ok(Value::Boolean(true));
                    }
                }
                Ok(Value::Boolean(false))
            }
            Self::Not(inner) => {
                let value = inner.evaluate(ctx)?;
                Ok(Value::Boolean(!as_condition(value, "not")?))
            }
            Self::Compare { op, left, right } => {
                let left = left.evaluate(ctx)?;
                let right = right.evaluate(ctx)?;
                compare(*op, &left, &right).map(Value::Boolean)
            }
            Self::Arithmetic { op, left, right } => {
                let left = left.evaluate(ctx)?;
                let right = right.evaluate(ctx)?;
                arithmetic(*op, left, right)
            }
        }
    }
}

impl FunctionCall {
    /// 레지스트리에서 함수를 찾아 호출합니다.
    pub fn evaluate(&self, ctx: &mut EvaluationContext<'_>) -> Result<Value, EvalError> {
        let registry = ctx.registry();
        let function = registry
            .resolve(&self.function)
            .ok_or_else(|| EvalError::UnknownFunction(self.function.clone()))?;
        let mut args = FunctionArgs::new(function.descriptor(), &self.args)?;
        function.evaluate(&mut args, ctx)
    }
}

/// 조건 값을 불리언으로 해석합니다. `null`은 false입니다.
pub fn as_condition(value: Value, context: &str) -> Result<bool, EvalError> {
    match value {
        Value::Boolean(b) => Ok(b),
        Value::Null => Ok(false),
        other => Err(EvalError::type_mismatch(
            context,
            ValueType::Boolean.name(),
            other.value_type(),
        )),
    }
}

/// 인덱스 접근
pub fn index_value(target: Value, index: &Value) -> Result<Value, EvalError> {
    match target {
        Value::List(items) => {
            let i = list_index(index, "list index")?;
            let len = items.len();
            usize::try_from(i)
                .ok()
                .and_then(|pos| items.into_iter().nth(pos))
                .ok_or(EvalError::IndexOutOfBounds {
                    target: ValueType::List,
                    index: i,
                    len,
                })
        }
        Value::Map(mut map) => {
            let key = string_key(index, "map key")?;
            Ok(map.remove(key).unwrap_or_default())
        }
        Value::Object(object) => match object.iter() {
            Some(iter) => {
                let i = list_index(index, "set index")?;
                let items: Vec<&Value> = iter.collect();
                usize::try_from(i)
                    .ok()
                    .and_then(|pos| items.get(pos).map(|v| (*v).clone()))
                    .ok_or(EvalError::IndexOutOfBounds {
                        target: ValueType::Set,
                        index: i,
                        len: items.len(),
                    })
            }
            None => {
                let key = string_key(index, "object field")?;
                Ok(object.field(key).unwrap_or_default())
            }
        },
        other => Err(EvalError::InvalidIndexTarget {
            actual: other.value_type(),
        }),
    }
}

fn list_index(index: &Value, context: &str) -> Result<i64, EvalError> {
    index.as_long().ok_or_else(|| {
        EvalError::type_mismatch(context, ValueType::Long.name(), index.value_type())
    })
}

fn string_key<'v>(index: &'v Value, context: &str) -> Result<&'v str, EvalError> {
    index.as_str().ok_or_else(|| {
        EvalError::type_mismatch(context, ValueType::String.name(), index.value_type())
    })
}

/// 두 값이 같은지 비교합니다. `Long`과 `Double`은 수치로 비교합니다.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Long(a), Value::Double(b)) | (Value::Double(b), Value::Long(a)) => {
            (*a as f64) == *b
        }
        _ => left == right,
    }
}

/// 비교 연산
pub fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, EvalError> {
    match op {
        CompareOp::Eq => return Ok(values_equal(left, right)),
        CompareOp::Ne => return Ok(!values_equal(left, right)),
        _ => {}
    }

    if left.is_null() || right.is_null() {
        return Ok(false);
    }

    let ordering = match (left, right) {
        (Value::Long(a), Value::Long(b)) => Some(a.cmp(b)),
        (Value::Long(_) | Value::Double(_), Value::Long(_) | Value::Double(_)) => {
            // as_f64는 두 숫자 타입 모두 Some
            let a = left.as_f64().unwrap_or(f64::NAN);
            let b = right.as_f64().unwrap_or(f64::NAN);
            a.partial_cmp(&b)
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Object(ObjectValue::Date(a)), Value::Object(ObjectValue::Date(b))) => {
            Some(a.cmp(b))
        }
        _ => {
            return Err(EvalError::type_mismatch(
                format!("comparison {}", op.symbol()),
                comparable_expectation(left),
                right.value_type(),
            ));
        }
    };

    // NaN과의 순서 비교는 항상 false
    let Some(ordering) = ordering else {
        return Ok(false);
    };

    Ok(match op {
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
        CompareOp::Eq | CompareOp::Ne => unreachable!("equality handled above"),
    })
}

fn comparable_expectation(left: &Value) -> String {
    match left {
        Value::Long(_) | Value::Double(_) => ValueType::Number.name().to_owned(),
        Value::String(_) | Value::Object(ObjectValue::Date(_)) => left.value_type().to_string(),
        _ => "number, string or date".to_owned(),
    }
}

/// 산술 연산
pub fn arithmetic(op: ArithOp, left: Value, right: Value) -> Result<Value, EvalError> {
    use Value::{Double, Long, Null, Object};

    match (left, right) {
        (Null, _) | (_, Null) => Ok(Null),
        (Long(a), Long(b)) => long_arithmetic(op, a, b).map(Long),
        (l @ (Long(_) | Double(_)), r @ (Long(_) | Double(_))) => {
            let a = l.as_f64().unwrap_or(f64::NAN);
            let b = r.as_f64().unwrap_or(f64::NAN);
            Ok(Double(match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
                ArithOp::Div => a / b,
                ArithOp::Rem => a % b,
            }))
        }
        (Value::String(mut a), Value::String(b)) if op == ArithOp::Add => {
            a.push_str(&b);
            Ok(Value::String(a))
        }
        (Object(ObjectValue::Date(dt)), Object(ObjectValue::Period(p)))
        | (Object(ObjectValue::Period(p)), Object(ObjectValue::Date(dt)))
            if op == ArithOp::Add =>
        {
            p.add_to(dt)
                .map(Value::from)
                .ok_or_else(|| EvalError::Arithmetic("date out of range".to_owned()))
        }
        (Object(ObjectValue::Date(dt)), Object(ObjectValue::Period(p))) if op == ArithOp::Sub => {
            p.subtract_from(dt)
                .map(Value::from)
                .ok_or_else(|| EvalError::Arithmetic("date out of range".to_owned()))
        }
        (Object(ObjectValue::Date(a)), Object(ObjectValue::Date(b))) if op == ArithOp::Sub => {
            Ok(Value::from(Period::millis(
                a.signed_duration_since(b).num_milliseconds(),
            )))
        }
        (Object(ObjectValue::Period(a)), Object(ObjectValue::Period(b)))
            if matches!(op, ArithOp::Add | ArithOp::Sub) =>
        {
            let b = if op == ArithOp::Sub { b.negated() } else { b };
            a.checked_add(b)
                .map(Value::from)
                .ok_or_else(|| EvalError::Arithmetic("period overflow".to_owned()))
        }
        (l, r) => {
            let offending = if matches!(l, Long(_) | Double(_)) {
                r
            } else {
                l
            };
            Err(EvalError::type_mismatch(
                format!("arithmetic {}", op.symbol()),
                ValueType::Number.name(),
                offending.value_type(),
            ))
        }
    }
}

fn long_arithmetic(op: ArithOp, a: i64, b: i64) -> Result<i64, EvalError> {
    let result = match op {
        ArithOp::Add => a.checked_add(b),
        ArithOp::Sub => a.checked_sub(b),
        ArithOp::Mul => a.checked_mul(b),
        ArithOp::Div | ArithOp::Rem if b == 0 => {
            return Err(EvalError::Arithmetic("division by zero".to_owned()));
        }
        ArithOp::Div => a.checked_div(b),
        ArithOp::Rem => a.checked_rem(b),
    };
    result.ok_or_else(|| EvalError::Arithmetic(format!("long overflow in {a} {} {b}", op.symbol())))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::DateTime;
    use ironpipe_core::message::Message;

    use super::*;
    use crate::function::FunctionRegistry;

    fn eval_on(message: &mut Message, expr: &Expression) -> Result<Value, EvalError> {
        let registry = FunctionRegistry::builtin().unwrap();
        let mut ctx = EvaluationContext::new(message, &registry);
        expr.evaluate(&mut ctx)
    }

    fn eval(expr: &Expression) -> Result<Value, EvalError> {
        eval_on(&mut Message::with_id("m"), expr)
    }

    fn lit(v: impl Into<Value>) -> Expression {
        Expression::literal(v)
    }

    #[test]
    fn missing_field_and_unbound_variable_are_null() {
        assert_eq!(eval(&Expression::field("nope")).unwrap(), Value::Null);
        assert_eq!(eval(&Expression::var("nope")).unwrap(), Value::Null);
    }

    #[test]
    fn field_reads_current_message() {
        let mut msg = Message::with_id("m").with_field("level", 3);
        let value = eval_on(&mut msg, &Expression::field("level")).unwrap();
        assert_eq!(value, Value::Long(3));
    }

    #[test]
    fn and_short_circuits_before_erroring_operand() {
        // 두 번째 피연산자는 평가되면 TypeMismatch
        let expr = Expression::And(vec![lit(false), lit("not a bool")]);
        assert_eq!(eval(&expr).unwrap(), Value::Boolean(false));

        let expr = Expression::Or(vec![lit(true), lit(42)]);
        assert_eq!(eval(&expr).unwrap(), Value::Boolean(true));
    }

    #[test]
    fn and_with_non_boolean_is_type_mismatch() {
        let expr = Expression::And(vec![lit(true), lit(1)]);
        let err = eval(&expr).unwrap_err();
        assert!(matches!(
            err,
            EvalError::TypeMismatch {
                actual: ValueType::Long,
                ..
            }
        ));
    }

    #[test]
    fn empty_and_or() {
        assert_eq!(
            eval(&Expression::And(vec![])).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            eval(&Expression::Or(vec![])).unwrap(),
            Value::Boolean(false)
        );
    }

    #[test]
    fn null_condition_is_false() {
        assert_eq!(
            eval(&Expression::not(Expression::field("missing"))).unwrap(),
            Value::Boolean(true)
        );
    }

    #[test]
    fn numeric_comparison_promotes() {
        let expr = Expression::compare(CompareOp::Eq, lit(2), lit(2.0));
        assert_eq!(eval(&expr).unwrap(), Value::Boolean(true));
        let expr = Expression::compare(CompareOp::Lt, lit(1), lit(1.5));
        assert_eq!(eval(&expr).unwrap(), Value::Boolean(true));
    }

    #[test]
    fn ordering_with_null_is_false() {
        for op in [CompareOp::Lt, CompareOp::Le, CompareOp::Gt, CompareOp::Ge] {
            let expr = Expression::compare(op, Expression::field("missing"), lit(1));
            assert_eq!(eval(&expr).unwrap(), Value::Boolean(false), "{op:?}");
        }
    }

    #[test]
    fn string_number_ordering_is_type_mismatch() {
        let expr = Expression::compare(CompareOp::Gt, lit("10"), lit(5));
        assert!(matches!(
            eval(&expr).unwrap_err(),
            EvalError::TypeMismatch { .. }
        ));
    }

    #[test]
    fn equality_across_types_is_false() {
        let expr = Expression::compare(CompareOp::Eq, lit("1"), lit(1));
        assert_eq!(eval(&expr).unwrap(), Value::Boolean(false));
        let expr = Expression::compare(CompareOp::Ne, lit("1"), lit(1));
        assert_eq!(eval(&expr).unwrap(), Value::Boolean(true));
    }

    #[test]
    fn long_arithmetic_stays_long() {
        let expr = Expression::arithmetic(ArithOp::Div, lit(7), lit(2));
        assert_eq!(eval(&expr).unwrap(), Value::Long(3));
        let expr = Expression::arithmetic(ArithOp::Add, lit(7), lit(0.5));
        assert_eq!(eval(&expr).unwrap(), Value::Double(7.5));
    }

    #[test]
    fn long_overflow_and_division_by_zero() {
        let expr = Expression::arithmetic(ArithOp::Add, lit(i64::MAX), lit(1));
        assert!(matches!(eval(&expr).unwrap_err(), EvalError::Arithmetic(_)));
        let expr = Expression::arithmetic(ArithOp::Rem, lit(1), lit(0));
        assert!(matches!(eval(&expr).unwrap_err(), EvalError::Arithmetic(_)));
    }

    #[test]
    fn string_plus_number_is_type_mismatch() {
        let expr = Expression::arithmetic(ArithOp::Add, lit("a"), lit(1));
        assert!(matches!(
            eval(&expr).unwrap_err(),
            EvalError::TypeMismatch {
                actual: ValueType::String,
                ..
            }
        ));
    }

    #[test]
    fn string_concatenation() {
        let expr = Expression::arithmetic(ArithOp::Add, lit("foo"), lit("bar"));
        assert_eq!(eval(&expr).unwrap(), Value::from("foobar"));
    }

    #[test]
    fn arithmetic_with_null_propagates() {
        let expr = Expression::arithmetic(ArithOp::Mul, Expression::field("missing"), lit(2));
        assert_eq!(eval(&expr).unwrap(), Value::Null);
    }

    #[test]
    fn date_plus_period() {
        let dt = DateTime::parse_from_rfc3339("2024-01-31T10:00:00+00:00").unwrap();
        let expr = Expression::arithmetic(ArithOp::Add, lit(dt), lit(Period::hours(2)));
        let expected = DateTime::parse_from_rfc3339("2024-01-31T12:00:00+00:00").unwrap();
        assert_eq!(eval(&expr).unwrap(), Value::from(expected));
    }

    #[test]
    fn date_minus_date_is_period_of_millis() {
        let a = DateTime::parse_from_rfc3339("2024-01-01T00:00:01+00:00").unwrap();
        let b = DateTime::parse_from_rfc3339("2024-01-01T00:00:00+00:00").unwrap();
        let expr = Expression::arithmetic(ArithOp::Sub, lit(a), lit(b));
        assert_eq!(eval(&expr).unwrap(), Value::from(Period::millis(1000)));
    }

    #[test]
    fn list_index_bounds() {
        let list = lit(Value::List(vec![Value::from("a"), Value::from("b")]));
        let expr = Expression::index(list.clone(), lit(1));
        assert_eq!(eval(&expr).unwrap(), Value::from("b"));

        let expr = Expression::index(list.clone(), lit(2));
        assert_eq!(
            eval(&expr).unwrap_err(),
            EvalError::IndexOutOfBounds {
                target: ValueType::List,
                index: 2,
                len: 2
            }
        );

        let expr = Expression::index(list, lit(-1));
        assert!(matches!(
            eval(&expr).unwrap_err(),
            EvalError::IndexOutOfBounds { index: -1, .. }
        ));
    }

    #[test]
    fn map_index_missing_key_is_null() {
        let mut map = BTreeMap::new();
        map.insert("k".to_owned(), Value::Long(1));
        let expr = Expression::index(lit(map.clone()), lit("k"));
        assert_eq!(eval(&expr).unwrap(), Value::Long(1));
        let expr = Expression::index(lit(map), lit("other"));
        assert_eq!(eval(&expr).unwrap(), Value::Null);
    }

    #[test]
    fn set_index_advances_elements() {
        let set = Value::set(vec![Value::from("x"), Value::from("y"), Value::from("z")]);
        let expr = Expression::index(lit(set.clone()), lit(2));
        assert_eq!(eval(&expr).unwrap(), Value::from("z"));
        let expr = Expression::index(lit(set), lit(3));
        assert!(matches!(
            eval(&expr).unwrap_err(),
            EvalError::IndexOutOfBounds {
                target: ValueType::Set,
                ..
            }
        ));
    }

    #[test]
    fn date_object_field_access() {
        let dt = DateTime::parse_from_rfc3339("2024-03-05T06:07:08+00:00").unwrap();
        let expr = Expression::index(lit(dt), lit("month"));
        assert_eq!(eval(&expr).unwrap(), Value::Long(3));
    }

    #[test]
    fn index_into_scalar_names_runtime_type() {
        let expr = Expression::index(lit(42), lit(0));
        assert_eq!(
            eval(&expr).unwrap_err(),
            EvalError::InvalidIndexTarget {
                actual: ValueType::Long
            }
        );
        let expr = Expression::index(Expression::field("missing"), lit(0));
        assert_eq!(
            eval(&expr).unwrap_err(),
            EvalError::InvalidIndexTarget {
                actual: ValueType::Null
            }
        );
    }

    #[test]
    fn unknown_function_is_reported() {
        let expr = Expression::call(FunctionCall::new("no_such_function"));
        assert_eq!(
            eval(&expr).unwrap_err(),
            EvalError::UnknownFunction("no_such_function".to_owned())
        );
    }
}

//! 날짜 파싱/포맷 함수
//!
//! 시계를 읽는 함수는 제공하지 않습니다. 모든 결과는 인자만으로 결정됩니다.
//! `timezone` 인자는 `UTC`, `Z`, `+09:00`, `-0530`, `+02` 형식의 고정 오프셋입니다.

use std::fmt::Write as _;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use ironpipe_core::types::{Value, ValueType};

use crate::context::EvaluationContext;
use crate::error::{EvalError, ProcessorError};
use crate::function::{
    FunctionArgs, FunctionDescriptor, FunctionRegistry, NativeFunction, ParameterDescriptor,
};

pub(super) fn register(registry: &mut FunctionRegistry) -> Result<(), ProcessorError> {
    registry.register(NativeFunction::new(
        FunctionDescriptor::builder("parse_date", ValueType::Date)
            .pure()
            .param(ParameterDescriptor::required("value", ValueType::String))
            .param(
                ParameterDescriptor::optional("pattern", ValueType::String)
                    .description("chrono strftime pattern; RFC 3339 when absent"),
            )
            .param(
                ParameterDescriptor::optional("timezone", ValueType::String)
                    .description("offset applied when the input has none"),
            )
            .build(),
        parse_date,
    ))?;
    registry.register(NativeFunction::new(
        FunctionDescriptor::builder("parse_unix_milliseconds", ValueType::Date)
            .pure()
            .param(ParameterDescriptor::required("value", ValueType::Long))
            .param(ParameterDescriptor::optional("timezone", ValueType::String))
            .build(),
        parse_unix_milliseconds,
    ))?;
    registry.register(NativeFunction::new(
        FunctionDescriptor::builder("format_date", ValueType::String)
            .pure()
            .param(ParameterDescriptor::required("value", ValueType::Date))
            .param(ParameterDescriptor::required("format", ValueType::String))
            .param(ParameterDescriptor::optional("timezone", ValueType::String))
            .build(),
        format_date,
    ))?;
    Ok(())
}

/// 고정 오프셋 문자열을 파싱합니다.
pub fn parse_offset(tz: &str) -> Option<FixedOffset> {
    let tz = tz.trim();
    if tz == "Z" || tz.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }
    if !tz.is_ascii() || tz.len() < 2 {
        return None;
    }
    let (sign, rest) = match tz.split_at(1) {
        ("+", rest) => (1, rest),
        ("-", rest) => (-1, rest),
        _ => return None,
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some(parts) => parts,
        None if rest.len() == 4 => rest.split_at(2),
        None => (rest, "0"),
    };
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if !(0..=23).contains(&hours) || !(0..=59).contains(&minutes) {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

fn timezone_arg(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Option<FixedOffset>, EvalError> {
    match args.optional_str(ctx, "timezone")? {
        None => Ok(None),
        Some(tz) => parse_offset(&tz)
            .map(Some)
            .ok_or_else(|| args.runtime_error(format!("invalid timezone '{tz}'"))),
    }
}

fn parse_date(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    let value = args.required_str(ctx, "value")?;
    let pattern = args.optional_str(ctx, "pattern")?;
    let timezone = timezone_arg(args, ctx)?;

    let parsed = match &pattern {
        None => DateTime::parse_from_rfc3339(value.trim())
            .map(|dt| match timezone {
                Some(offset) => dt.with_timezone(&offset),
                None => dt,
            })
            .map_err(|e| e.to_string()),
        Some(pattern) => parse_with_pattern(value.trim(), pattern, timezone),
    };

    parsed
        .map(Value::from)
        .map_err(|reason| args.runtime_error(format!("cannot parse '{value}': {reason}")))
}

/// 패턴에 오프셋이 있으면 그대로, 없으면 `timezone`(기본 UTC)을 적용합니다.
fn parse_with_pattern(
    value: &str,
    pattern: &str,
    timezone: Option<FixedOffset>,
) -> Result<DateTime<FixedOffset>, String> {
    if let Ok(dt) = DateTime::parse_from_str(value, pattern) {
        return Ok(dt);
    }

    let offset = match timezone.or_else(|| FixedOffset::east_opt(0)) {
        Some(offset) => offset,
        None => return Err("invalid offset".to_owned()),
    };
    let naive = match NaiveDateTime::parse_from_str(value, pattern) {
        Ok(naive) => naive,
        Err(e) => match NaiveDate::parse_from_str(value, pattern) {
            Ok(date) => date.and_time(chrono::NaiveTime::MIN),
            Err(_) => return Err(e.to_string()),
        },
    };
    offset
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| "ambiguous local time".to_owned())
}

fn parse_unix_milliseconds(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    let millis = args.required_long(ctx, "value")?;
    let offset = timezone_arg(args, ctx)?.or_else(|| FixedOffset::east_opt(0));
    let dt = DateTime::from_timestamp_millis(millis)
        .zip(offset)
        .map(|(utc, offset)| utc.with_timezone(&offset))
        .ok_or_else(|| args.runtime_error(format!("timestamp {millis} out of range")))?;
    Ok(Value::from(dt))
}

fn format_date(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    let dt = match args.required(ctx, "value")? {
        Value::Object(ironpipe_core::types::ObjectValue::Date(dt)) => dt,
        other => {
            return Err(EvalError::type_mismatch(
                "argument 'value' of format_date",
                ValueType::Date.name(),
                other.value_type(),
            ));
        }
    };
    let format = args.required_str(ctx, "format")?;
    let dt = match timezone_arg(args, ctx)? {
        Some(offset) => dt.with_timezone(&offset),
        None => dt,
    };

    let items: Vec<Item<'_>> = StrftimeItems::new(&format).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(args.runtime_error(format!("invalid format '{format}'")));
    }
    let mut out = String::new();
    write!(out, "{}", dt.format_with_items(items.iter()))
        .map_err(|_| args.runtime_error(format!("cannot format date with '{format}'")))?;
    Ok(Value::String(out))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::call;
    use super::*;

    fn s(v: &str) -> Value {
        Value::from(v)
    }

    #[test]
    fn offsets() {
        assert_eq!(parse_offset("UTC"), FixedOffset::east_opt(0));
        assert_eq!(parse_offset("+09:00"), FixedOffset::east_opt(9 * 3600));
        assert_eq!(
            parse_offset("-0530"),
            FixedOffset::west_opt(5 * 3600 + 30 * 60)
        );
        assert_eq!(parse_offset("+02"), FixedOffset::east_opt(2 * 3600));
        assert_eq!(parse_offset("Europe/Berlin"), None);
        assert_eq!(parse_offset("+25:00"), None);
    }

    #[test]
    fn parse_rfc3339_by_default() {
        let result = call("parse_date", &[("value", s("2024-05-01T10:00:00+02:00"))]).unwrap();
        let dt = result.as_date().unwrap();
        assert_eq!(dt.timestamp(), 1_714_550_400);
    }

    #[test]
    fn parse_with_pattern_applies_timezone() {
        let result = call(
            "parse_date",
            &[
                ("value", s("01/05/2024 10:00")),
                ("pattern", s("%d/%m/%Y %H:%M")),
                ("timezone", s("+02:00")),
            ],
        )
        .unwrap();
        assert_eq!(
            result.as_date().unwrap().to_rfc3339(),
            "2024-05-01T10:00:00+02:00"
        );
    }

    #[test]
    fn parse_date_only_pattern_is_midnight() {
        let result = call(
            "parse_date",
            &[("value", s("2024-05-01")), ("pattern", s("%Y-%m-%d"))],
        )
        .unwrap();
        assert_eq!(
            result.as_date().unwrap().to_rfc3339(),
            "2024-05-01T00:00:00+00:00"
        );
    }

    #[test]
    fn unparseable_date_is_runtime_error() {
        let err = call("parse_date", &[("value", s("yesterday"))]).unwrap_err();
        assert!(matches!(err, EvalError::FunctionRuntime { .. }));
    }

    #[test]
    fn unix_millis_round_trip_through_format() {
        let date = call(
            "parse_unix_milliseconds",
            &[("value", Value::Long(86_400_000)), ("timezone", s("UTC"))],
        )
        .unwrap();
        let text = call(
            "format_date",
            &[("value", date), ("format", s("%Y-%m-%d %H:%M"))],
        )
        .unwrap();
        assert_eq!(text, s("1970-01-02 00:00"));
    }

    #[test]
    fn invalid_format_is_error_not_panic() {
        let date = call("parse_unix_milliseconds", &[("value", Value::Long(0))]).unwrap();
        let err = call("format_date", &[("value", date), ("format", s("%Q"))]).unwrap_err();
        assert!(matches!(err, EvalError::FunctionRuntime { .. }));
    }
}

//! 기간 생성 함수
//!
//! `hours(value: 2)`처럼 정수를 받는 함수들은 파라미터 변환으로 정수를 [`Period`]로
//! 바꾸고, 함수 본문은 변환된 값을 그대로 반환합니다.

use ironpipe_core::period::Period;
use ironpipe_core::types::{Value, ValueType};

use crate::context::EvaluationContext;
use crate::error::{EvalError, ProcessorError};
use crate::function::{
    FunctionArgs, FunctionDescriptor, FunctionRegistry, NativeFunction, ParameterDescriptor,
};

const UNITS: [(&str, fn(i64) -> Period); 8] = [
    ("years", Period::years),
    ("months", Period::months),
    ("weeks", Period::weeks),
    ("days", Period::days),
    ("hours", Period::hours),
    ("minutes", Period::minutes),
    ("seconds", Period::seconds),
    ("millis", Period::millis),
];

pub(super) fn register(registry: &mut FunctionRegistry) -> Result<(), ProcessorError> {
    for (name, unit) in UNITS {
        registry.register(NativeFunction::new(
            FunctionDescriptor::builder(name, ValueType::Period)
                .pure()
                .param(
                    ParameterDescriptor::required("value", ValueType::Long).transform(move |v| {
                        match v {
                            Value::Long(n) => Ok(Value::from(unit(n))),
                            other => Err(EvalError::type_mismatch(
                                "period amount",
                                ValueType::Long.name(),
                                other.value_type(),
                            )),
                        }
                    }),
                )
                .description(format!("Creates a period of the given number of {name}"))
                .build(),
            transformed_value,
        ))?;
    }

    registry.register(NativeFunction::new(
        FunctionDescriptor::builder("period", ValueType::Period)
            .pure()
            .param(
                ParameterDescriptor::required("value", ValueType::String).transform(|v| {
                    let text = v.as_str().unwrap_or_default();
                    Period::parse(text)
                        .map(Value::from)
                        .map_err(|e| EvalError::function("period", e))
                }),
            )
            .description("Parses an ISO-8601 period such as P1DT2H")
            .build(),
        transformed_value,
    ))?;
    Ok(())
}

fn transformed_value(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    args.required(ctx, "value")
}

//! URL 인코딩 함수 (`application/x-www-form-urlencoded`, UTF-8)
//!
//! 영숫자와 `-_.*`는 그대로 두고 공백은 `+`로, 나머지 바이트는 `%XX`로 인코딩합니다.

use ironpipe_core::types::{Value, ValueType};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

use crate::context::EvaluationContext;
use crate::error::{EvalError, ProcessorError};
use crate::function::{
    FunctionArgs, FunctionDescriptor, FunctionRegistry, NativeFunction, ParameterDescriptor,
};

/// 인코딩 대상 문자 집합. 공백은 따로 `+`로 바꿉니다.
const FORM: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'*')
    .remove(b' ');

pub(super) fn register(registry: &mut FunctionRegistry) -> Result<(), ProcessorError> {
    registry.register(NativeFunction::new(
        FunctionDescriptor::builder("url_encode", ValueType::String)
            .pure()
            .param(ParameterDescriptor::required("value", ValueType::String))
            .build(),
        url_encode,
    ))?;
    registry.register(NativeFunction::new(
        FunctionDescriptor::builder("url_decode", ValueType::String)
            .pure()
            .param(ParameterDescriptor::required("value", ValueType::String))
            .build(),
        url_decode,
    ))?;
    Ok(())
}

fn url_encode(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    let value = args.required_str(ctx, "value")?;
    let encoded = utf8_percent_encode(&value, FORM).to_string();
    Ok(Value::String(encoded.replace(' ', "+")))
}

fn url_decode(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    let value = args.required_str(ctx, "value")?.replace('+', " ");
    percent_decode_str(&value)
        .decode_utf8()
        .map(|decoded| Value::String(decoded.into_owned()))
        .map_err(|_| args.runtime_error("decoded bytes are not valid UTF-8"))
}

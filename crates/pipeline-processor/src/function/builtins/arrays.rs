//! 리스트 함수

use ironpipe_core::types::{Value, ValueType};

use crate::ast::eval::values_equal;
use crate::context::EvaluationContext;
use crate::error::{EvalError, ProcessorError};
use crate::function::{
    FunctionArgs, FunctionDescriptor, FunctionRegistry, NativeFunction, ParameterDescriptor,
};

pub(super) fn register(registry: &mut FunctionRegistry) -> Result<(), ProcessorError> {
    registry.register(NativeFunction::new(
        FunctionDescriptor::builder("array_add", ValueType::List)
            .pure()
            .param(ParameterDescriptor::required("elements", ValueType::List))
            .param(ParameterDescriptor::required("value", ValueType::Any))
            .param(
                ParameterDescriptor::optional("only_unique", ValueType::Boolean)
                    .default_value(false),
            )
            .description(
                "Appends a value (or every element of a list value); \
                 only_unique removes duplicates keeping first occurrences",
            )
            .build(),
        array_add,
    ))?;
    registry.register(NativeFunction::new(
        FunctionDescriptor::builder("array_contains", ValueType::Boolean)
            .pure()
            .param(ParameterDescriptor::required("elements", ValueType::List))
            .param(ParameterDescriptor::required("value", ValueType::Any))
            .param(
                ParameterDescriptor::optional("case_sensitive", ValueType::Boolean)
                    .default_value(false),
            )
            .build(),
        array_contains,
    ))?;
    registry.register(NativeFunction::new(
        FunctionDescriptor::builder("array_remove", ValueType::List)
            .pure()
            .param(ParameterDescriptor::required("elements", ValueType::List))
            .param(ParameterDescriptor::required("value", ValueType::Any))
            .param(
                ParameterDescriptor::optional("remove_all", ValueType::Boolean)
                    .default_value(false),
            )
            .build(),
        array_remove,
    ))?;
    Ok(())
}

fn elements(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Vec<Value>, EvalError> {
    match args.required(ctx, "elements")? {
        Value::List(items) => Ok(items),
        other => Err(EvalError::type_mismatch(
            format!("argument 'elements' of {}", args.function_name()),
            ValueType::List.name(),
            other.value_type(),
        )),
    }
}

fn array_add(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    let mut items = elements(args, ctx)?;
    match args.required(ctx, "value")? {
        Value::List(more) => items.extend(more),
        value => items.push(value),
    }

    if args.flag(ctx, "only_unique")? {
        let mut unique: Vec<Value> = Vec::with_capacity(items.len());
        for item in items {
            if !unique.iter().any(|seen| values_equal(seen, &item)) {
                unique.push(item);
            }
        }
        items = unique;
    }
    Ok(Value::List(items))
}

/// 대소문자 무시 옵션을 반영한 원소 비교
fn element_matches(element: &Value, needle: &Value, case_sensitive: bool) -> bool {
    match (element, needle) {
        (Value::String(a), Value::String(b)) if !case_sensitive => {
            a.to_lowercase() == b.to_lowercase()
        }
        _ => values_equal(element, needle),
    }
}

fn array_contains(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    let items = elements(args, ctx)?;
    let needle = args.required(ctx, "value")?;
    let case_sensitive = args.flag(ctx, "case_sensitive")?;
    Ok(Value::Boolean(
        items
            .iter()
            .any(|item| element_matches(item, &needle, case_sensitive)),
    ))
}

fn array_remove(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    let mut items = elements(args, ctx)?;
    let needle = args.required(ctx, "value")?;
    if args.flag(ctx, "remove_all")? {
        items.retain(|item| !values_equal(item, &needle));
    } else if let Some(pos) = items.iter().position(|item| values_equal(item, &needle)) {
        items.remove(pos);
    }
    Ok(Value::List(items))
}

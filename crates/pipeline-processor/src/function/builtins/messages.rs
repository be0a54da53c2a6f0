//! 메시지 함수
//!
//! 현재 메시지를 읽거나 바꾸므로 모두 비순수 함수입니다.
//! 생성된 메시지는 컨텍스트에 쌓이고, 인터프리터가 규칙 평가 뒤 꺼내 처리합니다.

use ironpipe_core::message::Message;
use ironpipe_core::types::{Value, ValueType};

use crate::context::EvaluationContext;
use crate::error::{EvalError, ProcessorError};
use crate::function::{
    FunctionArgs, FunctionDescriptor, FunctionRegistry, NativeFunction, ParameterDescriptor,
};

pub(super) fn register(registry: &mut FunctionRegistry) -> Result<(), ProcessorError> {
    let field = || ParameterDescriptor::required("field", ValueType::String);
    let prefix = || ParameterDescriptor::optional("prefix", ValueType::String);
    let suffix = || ParameterDescriptor::optional("suffix", ValueType::String);

    registry.register(NativeFunction::new(
        FunctionDescriptor::builder("has_field", ValueType::Boolean)
            .param(field())
            .build(),
        has_field,
    ))?;
    registry.register(NativeFunction::new(
        FunctionDescriptor::builder("set_field", ValueType::Null)
            .param(field())
            .param(ParameterDescriptor::optional("value", ValueType::Any))
            .param(prefix())
            .param(suffix())
            .description("Sets a field; a null value leaves the message unchanged")
            .build(),
        set_field,
    ))?;
    registry.register(NativeFunction::new(
        FunctionDescriptor::builder("set_fields", ValueType::Null)
            .param(ParameterDescriptor::required("fields", ValueType::Map))
            .param(prefix())
            .param(suffix())
            .build(),
        set_fields,
    ))?;
    registry.register(NativeFunction::new(
        FunctionDescriptor::builder("rename_field", ValueType::Boolean)
            .param(ParameterDescriptor::required("old_field", ValueType::String))
            .param(ParameterDescriptor::required("new_field", ValueType::String))
            .build(),
        rename_field,
    ))?;
    registry.register(NativeFunction::new(
        FunctionDescriptor::builder("remove_field", ValueType::Null)
            .param(field())
            .build(),
        remove_field,
    ))?;
    registry.register(NativeFunction::new(
        FunctionDescriptor::builder("drop_message", ValueType::Null)
            .description("Marks the message to be discarded after the current stage")
            .build(),
        drop_message,
    ))?;
    registry.register(NativeFunction::new(
        FunctionDescriptor::builder("route_to_stream", ValueType::Null)
            .param(ParameterDescriptor::required("id", ValueType::String))
            .build(),
        route_to_stream,
    ))?;
    registry.register(NativeFunction::new(
        FunctionDescriptor::builder("remove_from_stream", ValueType::Null)
            .param(ParameterDescriptor::required("id", ValueType::String))
            .build(),
        remove_from_stream,
    ))?;
    registry.register(NativeFunction::new(
        FunctionDescriptor::builder("create_message", ValueType::String)
            .param(ParameterDescriptor::optional("message", ValueType::String))
            .param(ParameterDescriptor::optional("source", ValueType::String))
            .param(ParameterDescriptor::optional("timestamp", ValueType::Date))
            .description("Emits a new message and returns its id")
            .build(),
        create_message,
    ))?;
    registry.register(NativeFunction::new(
        FunctionDescriptor::builder("clone_message", ValueType::String)
            .description("Emits a copy of the current message and returns its id")
            .build(),
        clone_message,
    ))?;
    Ok(())
}

fn field_name(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
    param: &str,
) -> Result<String, EvalError> {
    let name = args.required_str(ctx, param)?;
    if name.trim().is_empty() {
        return Err(args.runtime_error(format!("'{param}' must not be empty")));
    }
    Ok(name)
}

fn decorated(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
    name: &str,
) -> Result<String, EvalError> {
    let prefix = args.optional_str(ctx, "prefix")?.unwrap_or_default();
    let suffix = args.optional_str(ctx, "suffix")?.unwrap_or_default();
    Ok(format!("{prefix}{name}{suffix}"))
}

fn has_field(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    let name = args.required_str(ctx, "field")?;
    Ok(Value::Boolean(ctx.message().has_field(&name)))
}

fn set_field(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    let name = field_name(args, ctx, "field")?;
    let Some(value) = args.optional(ctx, "value")? else {
        return Ok(Value::Null);
    };
    let name = decorated(args, ctx, &name)?;
    ctx.message_mut().set_field(name, value);
    Ok(Value::Null)
}

fn set_fields(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    let fields = match args.required(ctx, "fields")? {
        Value::Map(map) => map,
        other => {
            return Err(EvalError::type_mismatch(
                "argument 'fields' of set_fields",
                ValueType::Map.name(),
                other.value_type(),
            ));
        }
    };
    let prefix = args.optional_str(ctx, "prefix")?.unwrap_or_default();
    let suffix = args.optional_str(ctx, "suffix")?.unwrap_or_default();
    let message = ctx.message_mut();
    for (name, value) in fields {
        if value.is_null() {
            continue;
        }
        message.set_field(format!("{prefix}{name}{suffix}"), value);
    }
    Ok(Value::Null)
}

fn rename_field(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    let old = args.required_str(ctx, "old_field")?;
    let new = field_name(args, ctx, "new_field")?;
    Ok(Value::Boolean(ctx.message_mut().rename_field(&old, new)))
}

fn remove_field(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    let name = args.required_str(ctx, "field")?;
    ctx.message_mut().remove_field(&name);
    Ok(Value::Null)
}

fn drop_message(
    _args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    ctx.message_mut().set_filter_out(true);
    Ok(Value::Null)
}

fn route_to_stream(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    let id = field_name(args, ctx, "id")?;
    ctx.message_mut().add_stream(id);
    Ok(Value::Null)
}

fn remove_from_stream(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    let id = args.required_str(ctx, "id")?;
    ctx.message_mut().remove_stream(&id);
    Ok(Value::Null)
}

fn create_message(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    let mut created = Message::new();
    for name in ["message", "source", "timestamp"] {
        if let Some(value) = args.optional(ctx, name)? {
            created.set_field(name, value);
        }
    }
    let id = created.id().to_owned();
    ctx.add_created_message(created);
    Ok(Value::String(id))
}

fn clone_message(
    _args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    let clone = ctx.message().duplicate();
    let id = clone.id().to_owned();
    ctx.add_created_message(clone);
    Ok(Value::String(id))
}

//! JSON 함수

use std::collections::BTreeMap;

use ironpipe_core::types::{Value, ValueType};
use serde_json_path::JsonPath;

use crate::context::EvaluationContext;
use crate::error::{EvalError, ProcessorError};
use crate::function::{
    FunctionArgs, FunctionDescriptor, FunctionRegistry, NativeFunction, ParameterDescriptor,
};

pub(super) fn register(registry: &mut FunctionRegistry) -> Result<(), ProcessorError> {
    registry.register(NativeFunction::new(
        FunctionDescriptor::builder("json_parse", ValueType::Any)
            .pure()
            .param(ParameterDescriptor::required("value", ValueType::String))
            .description("Parses a JSON document into values")
            .build(),
        json_parse,
    ))?;
    registry.register(NativeFunction::new(
        FunctionDescriptor::builder("select_jsonpath", ValueType::Map)
            .pure()
            .param(ParameterDescriptor::required("json", ValueType::Any))
            .param(ParameterDescriptor::required("paths", ValueType::Map))
            .description(
                "Evaluates named JSONPath expressions; a single match yields the value, \
                 several yield a list, none leaves the name out",
            )
            .build(),
        select_jsonpath,
    ))?;
    Ok(())
}

fn parse(args: &FunctionArgs<'_>, text: &str) -> Result<serde_json::Value, EvalError> {
    serde_json::from_str(text).map_err(|e| args.runtime_error(format!("invalid JSON: {e}")))
}

fn json_parse(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    let text = args.required_str(ctx, "value")?;
    parse(args, &text).map(Value::from)
}

fn select_jsonpath(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    let document = match args.required(ctx, "json")? {
        Value::String(text) => parse(args, &text)?,
        other => other.to_json(),
    };
    let paths = match args.required(ctx, "paths")? {
        Value::Map(paths) => paths,
        other => {
            return Err(EvalError::type_mismatch(
                "argument 'paths' of select_jsonpath",
                ValueType::Map.name(),
                other.value_type(),
            ));
        }
    };

    let mut selected = BTreeMap::new();
    for (name, path) in paths {
        let Some(expression) = path.as_str() else {
            return Err(args.runtime_error(format!("path '{name}' is not a string")));
        };
        let path = JsonPath::parse(expression)
            .map_err(|e| args.runtime_error(format!("invalid path '{name}': {e}")))?;

        let mut nodes = path.query(&document).all();
        let value = match nodes.len() {
            0 => continue,
            1 => Value::from(nodes.remove(0).clone()),
            _ => Value::List(nodes.into_iter().cloned().map(Value::from).collect()),
        };
        selected.insert(name, value);
    }
    Ok(Value::Map(selected))
}

//! 문자열과 정규식 함수

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use ironpipe_core::types::{Value, ValueType};
use regex::Regex;

use crate::context::EvaluationContext;
use crate::error::{EvalError, ProcessorError};
use crate::function::{
    FunctionArgs, FunctionDescriptor, FunctionRegistry, NativeBody, NativeFunction,
    ParameterDescriptor,
};

pub(super) fn register(registry: &mut FunctionRegistry) -> Result<(), ProcessorError> {
    let single: [(&str, NativeBody); 5] = [
        ("lowercase", lowercase),
        ("uppercase", uppercase),
        ("capitalize", capitalize),
        ("uncapitalize", uncapitalize),
        ("swapcase", swapcase),
    ];
    for (name, body) in single {
        registry.register(NativeFunction::new(
            FunctionDescriptor::builder(name, ValueType::String)
                .pure()
                .param(ParameterDescriptor::required("value", ValueType::String))
                .build(),
            body,
        ))?;
    }

    let matchers: [(&str, &str, NativeBody); 3] = [
        ("contains", "search", contains),
        ("starts_with", "prefix", starts_with),
        ("ends_with", "suffix", ends_with),
    ];
    for (name, operand, body) in matchers {
        registry.register(NativeFunction::new(
            FunctionDescriptor::builder(name, ValueType::Boolean)
                .pure()
                .param(ParameterDescriptor::required("value", ValueType::String))
                .param(ParameterDescriptor::required(operand, ValueType::String))
                .param(
                    ParameterDescriptor::optional("ignore_case", ValueType::Boolean)
                        .default_value(false),
                )
                .build(),
            body,
        ))?;
    }

    registry.register(NativeFunction::new(
        FunctionDescriptor::builder("concat", ValueType::String)
            .pure()
            .param(ParameterDescriptor::required("first", ValueType::String))
            .param(ParameterDescriptor::required("second", ValueType::String))
            .build(),
        concat,
    ))?;
    registry.register(NativeFunction::new(
        FunctionDescriptor::builder("substring", ValueType::String)
            .pure()
            .param(ParameterDescriptor::required("value", ValueType::String))
            .param(ParameterDescriptor::required("start", ValueType::Long))
            .param(ParameterDescriptor::optional("end", ValueType::Long))
            .description("Character-based substring; negative offsets count from the end")
            .build(),
        substring,
    ))?;
    registry.register(NativeFunction::new(
        FunctionDescriptor::builder("abbreviate", ValueType::String)
            .pure()
            .param(ParameterDescriptor::required("value", ValueType::String))
            .param(ParameterDescriptor::required("width", ValueType::Long))
            .description("Shortens a string to at most width characters, ending in \"...\"")
            .build(),
        abbreviate,
    ))?;
    registry.register(NativeFunction::new(
        FunctionDescriptor::builder("length", ValueType::Long)
            .pure()
            .param(ParameterDescriptor::required("value", ValueType::Any))
            .param(
                ParameterDescriptor::optional("bytes", ValueType::Boolean).default_value(false),
            )
            .description("Length of a string (characters or bytes), list or map")
            .build(),
        length,
    ))?;
    registry.register(NativeFunction::new(
        FunctionDescriptor::builder("replace", ValueType::String)
            .pure()
            .param(ParameterDescriptor::required("value", ValueType::String))
            .param(ParameterDescriptor::required("search", ValueType::String))
            .param(
                ParameterDescriptor::optional("replacement", ValueType::String).default_value(""),
            )
            .param(ParameterDescriptor::optional("max", ValueType::Long).default_value(-1))
            .description("Replaces up to max occurrences of a literal string; -1 replaces all")
            .build(),
        replace,
    ))?;
    registry.register(NativeFunction::new(
        FunctionDescriptor::builder("join", ValueType::String)
            .pure()
            .param(ParameterDescriptor::required("elements", ValueType::List))
            .param(ParameterDescriptor::optional("delimiter", ValueType::String).default_value(""))
            .param(ParameterDescriptor::optional("start", ValueType::Long))
            .param(ParameterDescriptor::optional("end", ValueType::Long))
            .description("Joins the string forms of elements[start..end]")
            .build(),
        join,
    ))?;
    registry.register(NativeFunction::new(
        FunctionDescriptor::builder("split", ValueType::List)
            .pure()
            .param(ParameterDescriptor::required("pattern", ValueType::String))
            .param(ParameterDescriptor::required("value", ValueType::String))
            .param(ParameterDescriptor::optional("limit", ValueType::Long).default_value(0))
            .description("Splits a string around regex matches")
            .build(),
        split,
    ))?;
    registry.register(NativeFunction::new(
        FunctionDescriptor::builder("regex_match", ValueType::Map)
            .pure()
            .param(ParameterDescriptor::required("pattern", ValueType::String))
            .param(ParameterDescriptor::required("value", ValueType::String))
            .description(
                "Matches a regex; returns {matches, groups} with groups keyed \
                 by index from 0 and by name",
            )
            .build(),
        regex_match,
    ))?;
    registry.register(NativeFunction::new(
        FunctionDescriptor::builder("regex_replace", ValueType::String)
            .pure()
            .param(ParameterDescriptor::required("pattern", ValueType::String))
            .param(ParameterDescriptor::required("value", ValueType::String))
            .param(ParameterDescriptor::required("replacement", ValueType::String))
            .param(
                ParameterDescriptor::optional("replace_all", ValueType::Boolean)
                    .default_value(true),
            )
            .description("Replaces regex matches; $1 and ${name} refer to groups")
            .build(),
        regex_replace,
    ))?;
    registry.register(NativeFunction::new(
        FunctionDescriptor::builder("first_non_null", ValueType::Any)
            .pure()
            .param(ParameterDescriptor::required("value", ValueType::List))
            .build(),
        first_non_null,
    ))?;
    registry.register(NativeFunction::new(
        FunctionDescriptor::builder("key_value", ValueType::Map)
            .pure()
            .param(ParameterDescriptor::required("value", ValueType::String))
            .param(
                ParameterDescriptor::optional("delimiters", ValueType::String).default_value(" "),
            )
            .param(
                ParameterDescriptor::optional("kv_delimiters", ValueType::String)
                    .default_value("="),
            )
            .param(
                ParameterDescriptor::optional("ignore_empty_values", ValueType::Boolean)
                    .default_value(true),
            )
            .param(
                ParameterDescriptor::optional("allow_dup_keys", ValueType::Boolean)
                    .default_value(true),
            )
            .param(
                ParameterDescriptor::optional("handle_dup_keys", ValueType::String)
                    .default_value("take_first"),
            )
            .param(
                ParameterDescriptor::optional("trim_key_chars", ValueType::String)
                    .default_value(""),
            )
            .param(
                ParameterDescriptor::optional("trim_value_chars", ValueType::String)
                    .default_value(""),
            )
            .description(
                "Extracts key/value pairs; handle_dup_keys is take_first, take_last \
                 or a separator that joins the values",
            )
            .build(),
        key_value,
    ))?;
    Ok(())
}

fn lowercase(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    Ok(Value::String(args.required_str(ctx, "value")?.to_lowercase()))
}

fn uppercase(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    Ok(Value::String(args.required_str(ctx, "value")?.to_uppercase()))
}

/// 첫 글자에만 변환을 적용합니다.
fn map_first(value: &str, convert: impl Fn(char) -> String) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => convert(first) + chars.as_str(),
        None => String::new(),
    }
}

fn capitalize(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    let value = args.required_str(ctx, "value")?;
    Ok(Value::String(map_first(&value, |c| c.to_uppercase().collect())))
}

fn uncapitalize(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    let value = args.required_str(ctx, "value")?;
    Ok(Value::String(map_first(&value, |c| c.to_lowercase().collect())))
}

fn swapcase(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    let value = args.required_str(ctx, "value")?;
    let mut swapped = String::with_capacity(value.len());
    for c in value.chars() {
        if c.is_uppercase() {
            swapped.extend(c.to_lowercase());
        } else if c.is_lowercase() {
            swapped.extend(c.to_uppercase());
        } else {
            swapped.push(c);
        }
    }
    Ok(Value::String(swapped))
}

/// 대소문자 무시 옵션을 반영해 두 문자열을 준비합니다.
fn operands(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
    operand: &str,
) -> Result<(String, String), EvalError> {
    let value = args.required_str(ctx, "value")?;
    let other = args.required_str(ctx, operand)?;
    if args.flag(ctx, "ignore_case")? {
        Ok((value.to_lowercase(), other.to_lowercase()))
    } else {
        Ok((value, other))
    }
}

fn contains(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    let (value, search) = operands(args, ctx, "search")?;
    Ok(Value::Boolean(value.contains(&search)))
}

fn starts_with(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    let (value, prefix) = operands(args, ctx, "prefix")?;
    Ok(Value::Boolean(value.starts_with(&prefix)))
}

fn ends_with(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    let (value, suffix) = operands(args, ctx, "suffix")?;
    Ok(Value::Boolean(value.ends_with(&suffix)))
}

fn concat(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    let mut first = args.required_str(ctx, "first")?;
    first.push_str(&args.required_str(ctx, "second")?);
    Ok(Value::String(first))
}

fn optional_long(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
    name: &str,
) -> Result<Option<i64>, EvalError> {
    match args.optional(ctx, name)? {
        Some(Value::Long(n)) => Ok(Some(n)),
        _ => Ok(None),
    }
}

/// 음수 오프셋은 끝에서부터 셉니다. 결과는 `0..=len`으로 잘립니다.
fn clamp_offset(offset: i64, len: usize) -> usize {
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    let absolute = if offset < 0 {
        len_i.saturating_add(offset)
    } else {
        offset
    };
    usize::try_from(absolute.clamp(0, len_i)).unwrap_or(len)
}

fn substring(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    let value = args.required_str(ctx, "value")?;
    let start = args.required_long(ctx, "start")?;
    let end = optional_long(args, ctx, "end")?;

    let chars: Vec<char> = value.chars().collect();
    let len = chars.len();
    let from = clamp_offset(start, len);
    let to = end.map_or(len, |end| clamp_offset(end, len));
    if from >= to {
        return Ok(Value::String(String::new()));
    }
    Ok(Value::String(chars[from..to].iter().collect()))
}

fn abbreviate(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    let value = args.required_str(ctx, "value")?;
    let width = args.required_long(ctx, "width")?;
    let Some(width) = usize::try_from(width).ok().filter(|w| *w >= 4) else {
        return Err(args.runtime_error(format!("width must be at least 4, got {width}")));
    };

    if value.chars().count() <= width {
        return Ok(Value::String(value));
    }
    let mut abbreviated: String = value.chars().take(width - 3).collect();
    abbreviated.push_str("...");
    Ok(Value::String(abbreviated))
}

fn length(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    let bytes = args.flag(ctx, "bytes")?;
    let len = match args.required(ctx, "value")? {
        Value::String(s) if bytes => s.len(),
        Value::String(s) => s.chars().count(),
        Value::List(items) => items.len(),
        Value::Map(map) => map.len(),
        other => {
            return Err(EvalError::type_mismatch(
                "argument 'value' of length",
                "string, list or map",
                other.value_type(),
            ));
        }
    };
    Ok(Value::Long(i64::try_from(len).unwrap_or(i64::MAX)))
}

fn replace(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    let value = args.required_str(ctx, "value")?;
    let search = args.required_str(ctx, "search")?;
    let replacement = args.optional_str(ctx, "replacement")?.unwrap_or_default();
    let max = optional_long(args, ctx, "max")?.unwrap_or(-1);

    if search.is_empty() {
        return Ok(Value::String(value));
    }
    let replaced = match usize::try_from(max) {
        Ok(max) => value.replacen(&search, &replacement, max),
        Err(_) => value.replace(&search, &replacement),
    };
    Ok(Value::String(replaced))
}

fn join(args: &mut FunctionArgs<'_>, ctx: &mut EvaluationContext<'_>) -> Result<Value, EvalError> {
    let elements = match args.required(ctx, "elements")? {
        Value::List(items) => items,
        other => {
            return Err(EvalError::type_mismatch(
                "argument 'elements' of join",
                ValueType::List.name(),
                other.value_type(),
            ));
        }
    };
    let delimiter = args.optional_str(ctx, "delimiter")?.unwrap_or_default();
    let len = elements.len();
    let from = optional_long(args, ctx, "start")?.map_or(0, |start| clamp_offset(start, len));
    let to = optional_long(args, ctx, "end")?.map_or(len, |end| clamp_offset(end, len));

    let parts: Vec<String> = elements
        .iter()
        .take(to)
        .skip(from)
        .map(ToString::to_string)
        .collect();
    Ok(Value::String(parts.join(&delimiter)))
}

fn compile(args: &FunctionArgs<'_>, pattern: &str) -> Result<Regex, EvalError> {
    Regex::new(pattern).map_err(|e| args.runtime_error(format!("invalid pattern: {e}")))
}

fn split(args: &mut FunctionArgs<'_>, ctx: &mut EvaluationContext<'_>) -> Result<Value, EvalError> {
    let pattern = args.required_str(ctx, "pattern")?;
    let value = args.required_str(ctx, "value")?;
    let limit = optional_long(args, ctx, "limit")?.unwrap_or(0);
    let regex = compile(args, &pattern)?;

    let mut parts: Vec<&str> = match usize::try_from(limit) {
        Ok(n) if n > 0 => regex.splitn(&value, n).collect(),
        _ => regex.split(&value).collect(),
    };
    if limit == 0 {
        // 제한이 없으면 끝의 빈 조각은 버림
        while parts.last().is_some_and(|p| p.is_empty()) {
            parts.pop();
        }
    }
    Ok(Value::List(parts.into_iter().map(Value::from).collect()))
}

fn regex_match(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    let pattern = args.required_str(ctx, "pattern")?;
    let value = args.required_str(ctx, "value")?;
    let regex = compile(args, &pattern)?;

    let mut groups = BTreeMap::new();
    let captures = regex.captures(&value);
    if let Some(caps) = &captures {
        for (i, name) in regex.capture_names().enumerate().skip(1) {
            let Some(m) = caps.get(i) else {
                continue;
            };
            let text = Value::from(m.as_str());
            if let Some(name) = name {
                groups.insert(name.to_owned(), text.clone());
            }
            groups.insert((i - 1).to_string(), text);
        }
    }

    let mut result = BTreeMap::new();
    result.insert("matches".to_owned(), Value::Boolean(captures.is_some()));
    result.insert("groups".to_owned(), Value::Map(groups));
    Ok(Value::Map(result))
}

fn regex_replace(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    let pattern = args.required_str(ctx, "pattern")?;
    let value = args.required_str(ctx, "value")?;
    let replacement = args.required_str(ctx, "replacement")?;
    let replace_all = args.flag(ctx, "replace_all")?;
    let regex = compile(args, &pattern)?;

    let replaced = if replace_all {
        regex.replace_all(&value, replacement.as_str())
    } else {
        regex.replace(&value, replacement.as_str())
    };
    Ok(Value::String(replaced.into_owned()))
}

fn first_non_null(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    match args.required(ctx, "value")? {
        Value::List(items) => Ok(items.into_iter().find(|v| !v.is_null()).unwrap_or_default()),
        other => Err(EvalError::type_mismatch(
            "argument 'value' of first_non_null",
            ValueType::List.name(),
            other.value_type(),
        )),
    }
}

/// 따옴표 밖에 있는 구분자로 나눕니다. 빈 조각은 버립니다.
fn split_unquoted<'a>(input: &'a str, delimiters: &str) -> Vec<&'a str> {
    let mut tokens = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if delimiters.contains(c) => {
                if i > start {
                    tokens.push(&input[start..i]);
                }
                start = i + c.len_utf8();
            }
            None => {}
        }
    }
    if start < input.len() {
        tokens.push(&input[start..]);
    }
    tokens
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        let inner = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote));
        if let Some(inner) = inner {
            return inner;
        }
    }
    value
}

fn key_value(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Value, EvalError> {
    let value = args.required_str(ctx, "value")?;
    let delimiters = args.optional_str(ctx, "delimiters")?.unwrap_or_default();
    let kv_delimiters = args.optional_str(ctx, "kv_delimiters")?.unwrap_or_default();
    let ignore_empty = args.flag(ctx, "ignore_empty_values")?;
    let allow_dup_keys = args.flag(ctx, "allow_dup_keys")?;
    let handle_dup_keys = args
        .optional_str(ctx, "handle_dup_keys")?
        .unwrap_or_default();
    let trim_key = args
        .optional_str(ctx, "trim_key_chars")?
        .unwrap_or_default();
    let trim_value = args
        .optional_str(ctx, "trim_value_chars")?
        .unwrap_or_default();
    if delimiters.is_empty() || kv_delimiters.is_empty() {
        return Err(args.runtime_error("delimiters must not be empty"));
    }

    let mut pairs: BTreeMap<String, String> = BTreeMap::new();
    for token in split_unquoted(&value, &delimiters) {
        let Some((key, val)) = token.split_once(|c: char| kv_delimiters.contains(c)) else {
            continue;
        };
        let key = key.trim_matches(|c: char| trim_key.contains(c));
        let val = unquote(val).trim_matches(|c: char| trim_value.contains(c));
        if key.is_empty() || (ignore_empty && val.is_empty()) {
            continue;
        }

        match pairs.entry(key.to_owned()) {
            Entry::Vacant(entry) => {
                entry.insert(val.to_owned());
            }
            Entry::Occupied(mut entry) => {
                if !allow_dup_keys {
                    return Err(args.runtime_error(format!("duplicate key '{key}'")));
                }
                match handle_dup_keys.as_str() {
                    "take_first" => {}
                    "take_last" => {
                        entry.insert(val.to_owned());
                    }
                    separator => {
                        let joined = entry.get_mut();
                        joined.push_str(separator);
                        joined.push_str(val);
                    }
                }
            }
        }
    }
    Ok(Value::Map(
        pairs
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect(),
    ))
}

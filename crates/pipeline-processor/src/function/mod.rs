//! 함수 프레임워크
//!
//! 규칙에서 호출하는 모든 함수는 [`Function`] trait을 구현하고
//! [`FunctionDescriptor`]로 이름, 순수성, 반환 타입, 파라미터를 선언합니다.
//!
//! 인자는 [`FunctionArgs`]를 통해 파라미터 이름으로 요청할 때 한 번만 평가되며,
//! 선언된 타입 검사와 변환(transform)을 거친 뒤 함수 본문에 전달됩니다.
//! 함수 본문은 자신의 인자 타입을 다시 검사할 필요가 없습니다.

pub mod builtins;
pub mod registry;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use ironpipe_core::types::{Value, ValueType};
use serde::Serialize;

use crate::ast::Expression;
use crate::context::EvaluationContext;
use crate::error::EvalError;

pub use registry::FunctionRegistry;

/// 평가된 인자 값에 적용하는 변환 (예: 정수 -> 기간)
pub type Transform = Arc<dyn Fn(Value) -> Result<Value, EvalError> + Send + Sync>;

/// 파라미터 선언
#[derive(Clone, Serialize)]
pub struct ParameterDescriptor {
    name: String,
    value_type: ValueType,
    optional: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    default: Option<Value>,
    #[serde(skip)]
    transform: Option<Transform>,
    #[serde(skip_serializing_if = "String::is_empty")]
    description: String,
}

impl ParameterDescriptor {
    /// 필수 파라미터
    pub fn required(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            optional: false,
            default: None,
            transform: None,
            description: String::new(),
        }
    }

    /// 선택 파라미터
    pub fn optional(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            optional: true,
            ..Self::required(name, value_type)
        }
    }

    /// 인자가 없을 때 사용할 기본값 (선택 파라미터 전용)
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// 타입 검사 후 적용할 변환
    pub fn transform(
        mut self,
        transform: impl Fn(Value) -> Result<Value, EvalError> + Send + Sync + 'static,
    ) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }
}

impl fmt::Debug for ParameterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterDescriptor")
            .field("name", &self.name)
            .field("value_type", &self.value_type)
            .field("optional", &self.optional)
            .field("default", &self.default)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

/// 함수 선언
#[derive(Debug, Clone, Serialize)]
pub struct FunctionDescriptor {
    name: String,
    pure: bool,
    return_type: ValueType,
    params: Vec<ParameterDescriptor>,
    #[serde(skip_serializing_if = "String::is_empty")]
    description: String,
}

impl FunctionDescriptor {
    /// 선언 빌더를 시작합니다. 기본값은 비순수 함수입니다.
    pub fn builder(name: impl Into<String>, return_type: ValueType) -> FunctionDescriptorBuilder {
        FunctionDescriptorBuilder {
            descriptor: Self {
                name: name.into(),
                pure: false,
                return_type,
                params: Vec::new(),
                description: String::new(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 같은 인자에 항상 같은 결과를 내고 메시지를 건드리지 않는지 여부
    pub fn is_pure(&self) -> bool {
        self.pure
    }

    pub fn return_type(&self) -> &ValueType {
        &self.return_type
    }

    /// 선언 순서대로의 파라미터
    pub fn params(&self) -> &[ParameterDescriptor] {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// 호출 인자 이름을 선언과 대조합니다.
    ///
    /// 선언되지 않은 이름은 `UnexpectedArgument`, 빠진 필수 인자는
    /// `MissingRequiredArgument`입니다.
    pub fn check_call(&self, args: &BTreeMap<String, Expression>) -> Result<(), EvalError> {
        if let Some(unexpected) = args.keys().find(|name| self.param(name).is_none()) {
            return Err(EvalError::UnexpectedArgument {
                function: self.name.clone(),
                parameter: unexpected.clone(),
            });
        }
        if let Some(missing) = self
            .params
            .iter()
            .find(|p| !p.optional && !args.contains_key(&p.name))
        {
            return Err(EvalError::MissingRequiredArgument {
                function: self.name.clone(),
                parameter: missing.name.clone(),
            });
        }
        Ok(())
    }
}

/// [`FunctionDescriptor`] 빌더
pub struct FunctionDescriptorBuilder {
    descriptor: FunctionDescriptor,
}

impl FunctionDescriptorBuilder {
    /// 순수 함수로 표시합니다.
    pub fn pure(mut self) -> Self {
        self.descriptor.pure = true;
        self
    }

    pub fn param(mut self, param: ParameterDescriptor) -> Self {
        self.descriptor.params.push(param);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.descriptor.description = description.into();
        self
    }

    pub fn build(self) -> FunctionDescriptor {
        self.descriptor
    }
}

/// 규칙에서 호출 가능한 함수
///
/// 구현체는 상태를 갖지 않으며 여러 워커에서 동시에 호출됩니다.
pub trait Function: Send + Sync {
    /// 함수 선언
    fn descriptor(&self) -> &FunctionDescriptor;

    /// 함수를 실행합니다.
    ///
    /// 인자는 `args`에서 이름으로 요청해 얻습니다.
    fn evaluate(
        &self,
        args: &mut FunctionArgs<'_>,
        ctx: &mut EvaluationContext<'_>,
    ) -> Result<Value, EvalError>;
}

/// 호출 한 번의 인자 접근자
///
/// 인자 표현식은 처음 요청될 때 평가되고 결과가 캐시되므로,
/// 같은 인자를 여러 번 요청해도 부수 효과는 한 번만 일어납니다.
pub struct FunctionArgs<'a> {
    descriptor: &'a FunctionDescriptor,
    exprs: &'a BTreeMap<String, Expression>,
    resolved: HashMap<&'a str, Option<Value>>,
}

impl<'a> FunctionArgs<'a> {
    /// 인자 이름을 검사하고 접근자를 만듭니다.
    pub fn new(
        descriptor: &'a FunctionDescriptor,
        exprs: &'a BTreeMap<String, Expression>,
    ) -> Result<Self, EvalError> {
        descriptor.check_call(exprs)?;
        Ok(Self {
            descriptor,
            exprs,
            resolved: HashMap::new(),
        })
    }

    /// 호출된 함수 이름
    pub fn function_name(&self) -> &str {
        self.descriptor.name()
    }

    /// 함수 실행 실패 에러를 만듭니다.
    pub fn runtime_error(&self, cause: impl ToString) -> EvalError {
        EvalError::function(self.descriptor.name(), cause)
    }

    /// 필수 인자 값을 얻습니다. 빠졌거나 null이면 `MissingRequiredArgument`입니다.
    pub fn required(
        &mut self,
        ctx: &mut EvaluationContext<'_>,
        name: &str,
    ) -> Result<Value, EvalError> {
        self.resolve(ctx, name)?
            .ok_or_else(|| EvalError::MissingRequiredArgument {
                function: self.descriptor.name().to_owned(),
                parameter: name.to_owned(),
            })
    }

    /// 선택 인자 값을 얻습니다. 빠졌거나 null이면 선언된 기본값, 없으면 `None`입니다.
    pub fn optional(
        &mut self,
        ctx: &mut EvaluationContext<'_>,
        name: &str,
    ) -> Result<Option<Value>, EvalError> {
        match self.resolve(ctx, name)? {
            Some(value) => Ok(Some(value)),
            None => Ok(self
                .descriptor
                .param(name)
                .and_then(|p| p.default.clone())),
        }
    }

    /// 필수 문자열 인자
    pub fn required_str(
        &mut self,
        ctx: &mut EvaluationContext<'_>,
        name: &str,
    ) -> Result<String, EvalError> {
        match self.required(ctx, name)? {
            Value::String(s) => Ok(s),
            other => Err(self.type_error(name, ValueType::String, &other)),
        }
    }

    /// 필수 정수 인자
    pub fn required_long(
        &mut self,
        ctx: &mut EvaluationContext<'_>,
        name: &str,
    ) -> Result<i64, EvalError> {
        match self.required(ctx, name)? {
            Value::Long(n) => Ok(n),
            other => Err(self.type_error(name, ValueType::Long, &other)),
        }
    }

    /// 선택 문자열 인자
    pub fn optional_str(
        &mut self,
        ctx: &mut EvaluationContext<'_>,
        name: &str,
    ) -> Result<Option<String>, EvalError> {
        match self.optional(ctx, name)? {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(self.type_error(name, ValueType::String, &other)),
        }
    }

    /// 선택 불리언 인자 (없으면 false)
    pub fn flag(&mut self, ctx: &mut EvaluationContext<'_>, name: &str) -> Result<bool, EvalError> {
        match self.optional(ctx, name)? {
            None => Ok(false),
            Some(Value::Boolean(b)) => Ok(b),
            Some(other) => Err(self.type_error(name, ValueType::Boolean, &other)),
        }
    }

    fn type_error(&self, name: &str, expected: ValueType, actual: &Value) -> EvalError {
        EvalError::type_mismatch(
            format!("argument '{name}' of {}", self.descriptor.name()),
            expected.name(),
            actual.value_type(),
        )
    }

    fn resolve(
        &mut self,
        ctx: &mut EvaluationContext<'_>,
        name: &str,
    ) -> Result<Option<Value>, EvalError> {
        if let Some(cached) = self.resolved.get(name) {
            return Ok(cached.clone());
        }

        let descriptor = self.descriptor;
        let exprs = self.exprs;
        let param = descriptor
            .param(name)
            .ok_or_else(|| self.runtime_error(format!("undeclared parameter '{name}'")))?;

        let value = match exprs.get(name) {
            None => None,
            Some(expr) => match expr.evaluate(ctx)? {
                Value::Null => None,
                value => Some(self.check_and_transform(param, value)?),
            },
        };

        self.resolved.insert(param.name.as_str(), value.clone());
        Ok(value)
    }

    fn check_and_transform(
        &self,
        param: &ParameterDescriptor,
        value: Value,
    ) -> Result<Value, EvalError> {
        // Long 인자는 Double 파라미터에 실수로 승격
        let value = match (&param.value_type, value) {
            (ValueType::Double, Value::Long(n)) => Value::Double(n as f64),
            (_, value) => value,
        };

        if !param.value_type.accepts(&value) {
            return Err(self.type_error(&param.name, param.value_type.clone(), &value));
        }

        match &param.transform {
            Some(transform) => transform(value),
            None => Ok(value),
        }
    }
}

/// 함수 포인터 하나로 구현되는 내장 함수
pub(crate) struct NativeFunction {
    descriptor: FunctionDescriptor,
    body: NativeBody,
}

pub(crate) type NativeBody =
    fn(&mut FunctionArgs<'_>, &mut EvaluationContext<'_>) -> Result<Value, EvalError>;

impl NativeFunction {
    pub(crate) fn new(descriptor: FunctionDescriptor, body: NativeBody) -> Self {
        Self { descriptor, body }
    }
}

impl Function for NativeFunction {
    fn descriptor(&self) -> &FunctionDescriptor {
        &self.descriptor
    }

    fn evaluate(
        &self,
        args: &mut FunctionArgs<'_>,
        ctx: &mut EvaluationContext<'_>,
    ) -> Result<Value, EvalError> {
        (self.body)(args, ctx)
    }
}

//! 함수 레지스트리
//!
//! 이름으로 함수를 찾는 읽기 전용 테이블입니다. 구성이 끝난 뒤에는
//! `Arc`로 감싸 모든 워커와 스냅샷이 공유합니다.

use std::collections::HashMap;

use crate::error::ProcessorError;

use super::{Function, FunctionDescriptor, builtins};

/// 함수 레지스트리
#[derive(Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Box<dyn Function>>,
}

impl FunctionRegistry {
    /// 빈 레지스트리를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 내장 함수가 모두 등록된 레지스트리를 생성합니다.
    pub fn builtin() -> Result<Self, ProcessorError> {
        let mut registry = Self::new();
        builtins::register_all(&mut registry)?;
        tracing::debug!(count = registry.len(), "registered builtin functions");
        Ok(registry)
    }

    /// 함수를 등록합니다.
    ///
    /// # Errors
    /// - 같은 이름의 함수가 이미 등록된 경우
    pub fn register(&mut self, function: impl Function + 'static) -> Result<(), ProcessorError> {
        let name = function.descriptor().name().to_owned();
        if self.functions.contains_key(&name) {
            return Err(ProcessorError::Registry(format!(
                "function '{name}' is already registered"
            )));
        }
        self.functions.insert(name, Box::new(function));
        Ok(())
    }

    /// 이름으로 함수를 찾습니다.
    pub fn resolve(&self, name: &str) -> Option<&dyn Function> {
        self.functions.get(name).map(|f| f.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// 등록된 함수 선언 목록 (이름순)
    pub fn descriptors(&self) -> Vec<&FunctionDescriptor> {
        let mut descriptors: Vec<_> = self.functions.values().map(|f| f.descriptor()).collect();
        descriptors.sort_by(|a, b| a.name().cmp(b.name()));
        descriptors
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.functions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use ironpipe_core::types::{Value, ValueType};

    use super::*;
    use crate::context::EvaluationContext;
    use crate::error::EvalError;
    use crate::function::{FunctionArgs, NativeFunction};

    fn noop(
        _args: &mut FunctionArgs<'_>,
        _ctx: &mut EvaluationContext<'_>,
    ) -> Result<Value, EvalError> {
        Ok(Value::Null)
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut registry = FunctionRegistry::new();
        let make = || {
            NativeFunction::new(
                FunctionDescriptor::builder("noop", ValueType::Null).build(),
                noop,
            )
        };
        registry.register(make()).unwrap();
        let err = registry.register(make()).unwrap_err();
        assert!(err.to_string().contains("noop"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn builtin_registry_resolves_core_functions() {
        let registry = FunctionRegistry::builtin().unwrap();
        for name in [
            "to_string",
            "to_long",
            "set_field",
            "drop_message",
            "route_to_stream",
            "regex_match",
            "base64_encode",
            "parse_date",
            "hours",
            "create_message",
        ] {
            assert!(registry.contains(name), "missing builtin {name}");
        }
        assert!(registry.resolve("nope").is_none());
    }

    #[test]
    fn descriptors_sorted_by_name() {
        let registry = FunctionRegistry::builtin().unwrap();
        let names: Vec<&str> = registry.descriptors().iter().map(|d| d.name()).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }
}

//! 상수 접기
//!
//! 스냅샷 구성 시 한 번 실행됩니다. 자식이 모두 리터럴이고 메시지나 변수를
//! 참조하지 않는 노드는 미리 평가해 리터럴로 바꿉니다. 함수 호출은 순수 함수일 때만
//! 접습니다. 평가가 실패한 노드는 그대로 두어 메시지 평가 시점에 에러가 기록되게 합니다.

use ironpipe_core::message::Message;

use super::{Expression, FunctionCall, Statement};
use crate::context::EvaluationContext;
use crate::function::FunctionRegistry;

impl Expression {
    /// 상수 부분식을 접은 새 트리를 반환합니다.
    pub fn fold_constants(&self, registry: &FunctionRegistry) -> Expression {
        let folded = match self {
            Self::Literal(_) | Self::Variable(_) | Self::Field(_) => return self.clone(),
            Self::Index { target, index } => Self::index(
                target.fold_constants(registry),
                index.fold_constants(registry),
            ),
            Self::Call(call) => Self::Call(call.fold_arguments(registry)),
            Self::And(ops) => Self::And(ops.iter().map(|op| op.fold_constants(registry)).collect()),
            Self::Or(ops) => Self::Or(ops.iter().map(|op| op.fold_constants(registry)).collect()),
            Self::Not(inner) => Self::not(inner.fold_constants(registry)),
            Self::Compare { op, left, right } => Self::compare(
                *op,
                left.fold_constants(registry),
                right.fold_constants(registry),
            ),
            Self::Arithmetic { op, left, right } => Self::arithmetic(
                *op,
                left.fold_constants(registry),
                right.fold_constants(registry),
            ),
        };

        if !folded.is_constant_node(registry) {
            return folded;
        }

        let mut scratch = Message::with_id("constant-folding");
        let mut ctx = EvaluationContext::new(&mut scratch, registry);
        match folded.evaluate(&mut ctx) {
            Ok(value) => Self::Literal(value),
            Err(e) => {
                tracing::debug!(
                    expression = %folded,
                    error = %e,
                    "constant expression fails, keeping it"
                );
                folded
            }
        }
    }

    /// 자식이 모두 리터럴이고 부수 효과가 없는 노드인지 확인합니다.
    fn is_constant_node(&self, registry: &FunctionRegistry) -> bool {
        match self {
            Self::Literal(_) | Self::Variable(_) | Self::Field(_) => false,
            Self::Index { target, index } => target.is_literal() && index.is_literal(),
            Self::Call(call) => {
                registry
                    .resolve(&call.function)
                    .is_some_and(|f| f.descriptor().is_pure())
                    && call.args.values().all(Expression::is_literal)
            }
            Self::And(ops) | Self::Or(ops) => ops.iter().all(Expression::is_literal),
            Self::Not(inner) => inner.is_literal(),
            Self::Compare { left, right, .. } | Self::Arithmetic { left, right, .. } => {
                left.is_literal() && right.is_literal()
            }
        }
    }
}

impl FunctionCall {
    fn fold_arguments(&self, registry: &FunctionRegistry) -> FunctionCall {
        FunctionCall {
            function: self.function.clone(),
            args: self
                .args
                .iter()
                .map(|(name, arg)| (name.clone(), arg.fold_constants(registry)))
                .collect(),
        }
    }
}

impl Statement {
    /// 문장 안의 상수 부분식을 접습니다. 문장 자체의 호출은 부수 효과를 위해 남깁니다.
    pub fn fold_constants(&self, registry: &FunctionRegistry) -> Statement {
        match self {
            Self::Let { name, value } => Self::Let {
                name: name.clone(),
                value: value.fold_constants(registry),
            },
            Self::Call(call) => Self::Call(call.fold_arguments(registry)),
        }
    }
}

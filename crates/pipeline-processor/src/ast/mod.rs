//! 규칙 표현식 AST
//!
//! 규칙 정의 파일(YAML)의 `when`/`then` 트리가 그대로 역직렬화되는 구조입니다.
//! 각 노드는 한 단계 키로 종류를 구분합니다.
//!
//! ```yaml
//! when:
//!   and:
//!     - call: { function: has_field, args: { field: { literal: src_ip } } }
//!     - compare: { op: gt, left: { field: bytes }, right: { literal: 1024 } }
//! then:
//!   - let: { name: ip, value: { field: src_ip } }
//!   - call: { function: set_field, args: { field: { literal: large }, value: { literal: true } } }
//! ```
//!
//! 평가 규칙은 [`eval`], 스냅샷 구성 시의 상수 접기는 [`fold`]에 있습니다.

pub mod eval;
pub mod fold;

use std::collections::BTreeMap;
use std::fmt;

use ironpipe_core::types::Value;
use serde::{Deserialize, Serialize};

/// 비교 연산자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// 산술 연산자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl ArithOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
        }
    }
}

/// 이름 있는 인자를 가진 함수 호출
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// 레지스트리에 등록된 함수 이름
    pub function: String,
    /// 파라미터 이름 -> 인자 표현식
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub args: BTreeMap<String, Expression>,
}

impl FunctionCall {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            args: BTreeMap::new(),
        }
    }

    /// 인자를 추가합니다.
    pub fn arg(mut self, name: impl Into<String>, value: Expression) -> Self {
        self.args.insert(name.into(), value);
        self
    }
}

/// 표현식 트리 노드
///
/// 평가 결과는 항상 [`Value`] 하나이거나
/// [`EvalError`](crate::error::EvalError)입니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expression {
    /// 상수 값
    Literal(Value),
    /// 규칙 로컬 변수 (바인딩되지 않았으면 null)
    #[serde(rename = "var")]
    Variable(String),
    /// 현재 메시지 필드 (없으면 null)
    Field(String),
    /// 리스트/맵/객체 인덱스 접근
    Index {
        target: Box<Expression>,
        index: Box<Expression>,
    },
    /// 함수 호출
    Call(FunctionCall),
    /// 왼쪽부터 단락 평가하는 논리곱 (빈 목록은 true)
    And(Vec<Expression>),
    /// 왼쪽부터 단락 평가하는 논리합 (빈 목록은 false)
    Or(Vec<Expression>),
    /// 논리 부정
    Not(Box<Expression>),
    /// 비교
    Compare {
        op: CompareOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// 산술
    Arithmetic {
        op: ArithOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
}

impl Expression {
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    pub fn field(name: impl Into<String>) -> Self {
        Self::Field(name.into())
    }

    pub fn var(name: impl Into<String>) -> Self {
        Self::Variable(name.into())
    }

    pub fn index(target: Expression, index: Expression) -> Self {
        Self::Index {
            target: Box::new(target),
            index: Box::new(index),
        }
    }

    pub fn call(call: FunctionCall) -> Self {
        Self::Call(call)
    }

    pub fn not(inner: Expression) -> Self {
        Self::Not(Box::new(inner))
    }

    pub fn compare(op: CompareOp, left: Expression, right: Expression) -> Self {
        Self::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn arithmetic(op: ArithOp, left: Expression, right: Expression) -> Self {
        Self::Arithmetic {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// 상수 노드인지 확인합니다.
    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Literal(_))
    }

    /// 트리 안의 모든 함수 호출을 방문합니다 (전위 순회).
    pub fn visit_calls<'a>(&'a self, visitor: &mut dyn FnMut(&'a FunctionCall)) {
        match self {
            Self::Literal(_) | Self::Variable(_) | Self::Field(_) => {}
            Self::Index { target, index } => {
                target.visit_calls(visitor);
                index.visit_calls(visitor);
            }
            Self::Call(call) => {
                visitor(call);
                for arg in call.args.values() {
                    arg.visit_calls(visitor);
                }
            }
            Self::And(ops) | Self::Or(ops) => {
                for op in ops {
                    op.visit_calls(visitor);
                }
            }
            Self::Not(inner) => inner.visit_calls(visitor),
            Self::Compare { left, right, .. } | Self::Arithmetic { left, right, .. } => {
                left.visit_calls(visitor);
                right.visit_calls(visitor);
            }
        }
    }
}

/// 규칙 THEN 절의 문장
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statement {
    /// 규칙 로컬 변수 바인딩
    Let { name: String, value: Expression },
    /// 결과를 버리는 함수 호출
    Call(FunctionCall),
}

impl Statement {
    pub fn let_(name: impl Into<String>, value: Expression) -> Self {
        Self::Let {
            name: name.into(),
            value,
        }
    }

    pub fn call(call: FunctionCall) -> Self {
        Self::Call(call)
    }
}

// --- 사람이 읽는 형태 출력 ---

fn write_literal(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::String(s) => write!(f, "{s:?}"),
        other => write!(f, "{other}"),
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, ops: &[Expression], sep: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, op) in ops.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{op}")?;
    }
    f.write_str(")")
}

impl fmt::Display for FunctionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.function)?;
        for (i, (name, arg)) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}: {arg}")?;
        }
        f.write_str(")")
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(v) => write_literal(f, v),
            Self::Variable(name) => f.write_str(name),
            Self::Field(name) => write!(f, "$message.{name}"),
            Self::Index { target, index } => write!(f, "{target}[{index}]"),
            Self::Call(call) => write!(f, "{call}"),
            Self::And(ops) if ops.is_empty() => f.write_str("true"),
            Self::Or(ops) if ops.is_empty() => f.write_str("false"),
            Self::And(ops) => write_joined(f, ops, " AND "),
            Self::Or(ops) => write_joined(f, ops, " OR "),
            Self::Not(inner) => write!(f, "NOT {inner}"),
            Self::Compare { op, left, right } => write!(f, "{left} {} {right}", op.symbol()),
            Self::Arithmetic { op, left, right } => {
                write!(f, "({left} {} {right})", op.symbol())
            }
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Let { name, value } => write!(f, "let {name} = {value};"),
            Self::Call(call) => write!(f, "{call};"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_nested_expression_from_yaml() {
        let yaml = r#"
and:
  - call: { function: has_field, args: { field: { literal: src_ip } } }
  - compare: { op: ge, left: { field: bytes }, right: { literal: 1024 } }
  - not: { var: seen }
"#;
        let expr: Expression = serde_yaml::from_str(yaml).unwrap();
        let Expression::And(ops) = &expr else {
            panic!("expected and, got {expr:?}");
        };
        assert_eq!(ops.len(), 3);
        assert_eq!(
            ops[1],
            Expression::compare(
                CompareOp::Ge,
                Expression::field("bytes"),
                Expression::literal(1024)
            )
        );
        assert_eq!(ops[2], Expression::not(Expression::var("seen")));
    }

    #[test]
    fn deserialize_statements() {
        let yaml = r#"
- let:
    name: total
    value: { arithmetic: { op: add, left: { field: a }, right: { literal: 1 } } }
- call: { function: drop_message }
"#;
        let stmts: Vec<Statement> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(stmts.len(), 2);
        assert!(matches!(&stmts[0], Statement::Let { name, .. } if name == "total"));
        assert_eq!(stmts[1], Statement::call(FunctionCall::new("drop_message")));
    }

    #[test]
    fn unknown_node_kind_rejected() {
        let result: Result<Expression, _> = serde_yaml::from_str("xor: []");
        assert!(result.is_err());
    }

    #[test]
    fn display_renders_readable_form() {
        let expr = Expression::And(vec![
            Expression::call(FunctionCall::new("has_field").arg("field", Expression::literal("a"))),
            Expression::compare(
                CompareOp::Lt,
                Expression::index(Expression::field("list"), Expression::literal(0)),
                Expression::var("limit"),
            ),
        ]);
        assert_eq!(
            expr.to_string(),
            r#"(has_field(field: "a") AND $message.list[0] < limit)"#
        );
    }

    #[test]
    fn visit_calls_reaches_nested_arguments() {
        let expr = Expression::call(
            FunctionCall::new("to_string")
                .arg("value", Expression::call(FunctionCall::new("to_long"))),
        );
        let mut names = Vec::new();
        expr.visit_calls(&mut |call| names.push(call.function.clone()));
        assert_eq!(names, vec!["to_string", "to_long"]);
    }
}

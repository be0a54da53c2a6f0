//! 값 모델 — 규칙 평가의 런타임 값과 타입 태그
//!
//! [`Value`]는 표현식 평가가 만들어 내는 모든 값을 표현하는 태그드 유니온입니다.
//! 날짜, 기간처럼 내부 구조를 가진 값은 [`ObjectValue`]로 감싸며,
//! [`ValueType`]은 함수 파라미터 선언과 타입 검사에 사용하는 정적 타입 태그입니다.
//!
//! JSON(및 YAML) 표현과의 변환은 `serde_json::Value`를 경유합니다.
//! 정수 JSON 숫자는 `Long`, 그 외 숫자는 `Double`이 됩니다.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Datelike, FixedOffset, SecondsFormat, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::period::Period;

/// 런타임 값
///
/// 모든 표현식 평가는 `Value` 하나를 반환하거나 타입이 정해진 평가 에러를 반환합니다.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// 값 없음 (존재하지 않는 필드, 바인딩되지 않은 변수)
    #[default]
    Null,
    /// 불리언
    Boolean(bool),
    /// 64비트 정수
    Long(i64),
    /// 64비트 부동소수점
    Double(f64),
    /// 문자열
    String(String),
    /// 순서 있는 리스트 (정수 인덱스 접근)
    List(Vec<Value>),
    /// 문자열 키 맵 (키 접근)
    Map(BTreeMap<String, Value>),
    /// 내부 구조를 가진 불투명 값
    Object(ObjectValue),
}

/// 불투명 객체 값
///
/// `Date`와 `Period`는 이름 있는 필드를 노출하고,
/// `Set`은 순회만 가능한 컬렉션입니다 (예: 메시지의 스트림 집합).
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectValue {
    /// 타임존 오프셋을 가진 시각
    Date(DateTime<FixedOffset>),
    /// ISO-8601 기간
    Period(Period),
    /// 순회 전용 컬렉션
    Set(Vec<Value>),
}

impl ObjectValue {
    /// 이름 있는 필드를 조회합니다. 지원하지 않는 필드는 `None`입니다.
    pub fn field(&self, name: &str) -> Option<Value> {
        match self {
            Self::Date(dt) => {
                let v = match name {
                    "year" => i64::from(dt.year()),
                    "month" => i64::from(dt.month()),
                    "day" => i64::from(dt.day()),
                    "hour" => i64::from(dt.hour()),
                    "minute" => i64::from(dt.minute()),
                    "second" => i64::from(dt.second()),
                    "millis" => i64::from(dt.timestamp_subsec_millis()),
                    "weekday" => i64::from(dt.weekday().number_from_monday()),
                    "day_of_year" => i64::from(dt.ordinal()),
                    "epoch_millis" => dt.timestamp_millis(),
                    "offset_seconds" => i64::from(dt.offset().local_minus_utc()),
                    _ => return None,
                };
                Some(Value::Long(v))
            }
            Self::Period(p) => p.field(name).map(Value::Long),
            Self::Set(_) => None,
        }
    }

    /// 순회 가능한 객체라면 원소 반복자를 반환합니다.
    pub fn iter(&self) -> Option<impl Iterator<Item = &Value>> {
        match self {
            Self::Set(items) => Some(items.iter()),
            Self::Date(_) | Self::Period(_) => None,
        }
    }

    fn value_type(&self) -> ValueType {
        match self {
            Self::Date(_) => ValueType::Date,
            Self::Period(_) => ValueType::Period,
            Self::Set(_) => ValueType::Set,
        }
    }
}

impl Value {
    /// 이 값의 런타임 타입 태그를 반환합니다.
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Null => ValueType::Null,
            Self::Boolean(_) => ValueType::Boolean,
            Self::Long(_) => ValueType::Long,
            Self::Double(_) => ValueType::Double,
            Self::String(_) => ValueType::String,
            Self::List(_) => ValueType::List,
            Self::Map(_) => ValueType::Map,
            Self::Object(o) => o.value_type(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Self::Long(n) => Some(*n),
            _ => None,
        }
    }

    /// 숫자 값을 `f64`로 반환합니다. `Long`은 넓혀서 반환합니다.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Long(n) => Some(*n as f64),
            Self::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&DateTime<FixedOffset>> {
        match self {
            Self::Object(ObjectValue::Date(dt)) => Some(dt),
            _ => None,
        }
    }

    pub fn as_period(&self) -> Option<&Period> {
        match self {
            Self::Object(ObjectValue::Period(p)) => Some(p),
            _ => None,
        }
    }

    /// 순회 가능한 값(`Set` 객체)을 만듭니다.
    pub fn set(items: impl IntoIterator<Item = Value>) -> Self {
        Self::Object(ObjectValue::Set(items.into_iter().collect()))
    }

    /// 값을 JSON으로 변환합니다.
    ///
    /// 유한하지 않은 `Double`은 JSON에서 표현할 수 없으므로 `null`이 됩니다.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Boolean(b) => serde_json::Value::Bool(*b),
            Self::Long(n) => serde_json::Value::from(*n),
            Self::Double(d) => serde_json::Number::from_f64(*d)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::List(items) | Self::Object(ObjectValue::Set(items)) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Self::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Self::Object(ObjectValue::Date(dt)) => {
                serde_json::Value::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            Self::Object(ObjectValue::Period(p)) => serde_json::Value::String(p.to_string()),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Long(i),
                None => Self::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Self::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Long(n) => write!(f, "{n}"),
            // Debug 형식은 정수값 double도 소수점을 유지합니다 (1.0)
            Self::Double(d) => write!(f, "{d:?}"),
            Self::String(s) => f.write_str(s),
            Self::Object(ObjectValue::Date(dt)) => {
                f.write_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            Self::Object(ObjectValue::Period(p)) => write!(f, "{p}"),
            Self::List(_) | Self::Map(_) | Self::Object(ObjectValue::Set(_)) => {
                write!(f, "{}", self.to_json())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Long(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Long(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Self::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self::Map(map)
    }
}

impl From<Period> for Value {
    fn from(p: Period) -> Self {
        Self::Object(ObjectValue::Period(p))
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(dt: DateTime<FixedOffset>) -> Self {
        Self::Object(ObjectValue::Date(dt))
    }
}

/// 정적 타입 태그
///
/// 함수 파라미터와 반환 타입 선언에 사용합니다. 이름으로 타입을 찾을 때
/// 알 수 없는 이름은 에러 대신 [`ValueType::Unknown`]으로 보존됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ValueType {
    /// 모든 값을 허용
    Any,
    Null,
    Boolean,
    Long,
    Double,
    /// `Long` 또는 `Double`
    Number,
    String,
    List,
    Map,
    Date,
    Period,
    Set,
    /// 인식하지 못한 타입 이름
    Unknown(String),
}

impl ValueType {
    /// 타입 이름을 파싱합니다 (대소문자 무시).
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "any" => Self::Any,
            "null" => Self::Null,
            "boolean" | "bool" => Self::Boolean,
            "long" => Self::Long,
            "double" => Self::Double,
            "number" => Self::Number,
            "string" => Self::String,
            "list" => Self::List,
            "map" => Self::Map,
            "date" => Self::Date,
            "period" => Self::Period,
            "set" => Self::Set,
            _ => Self::Unknown(name.to_owned()),
        }
    }

    /// 타입 이름
    pub fn name(&self) -> &str {
        match self {
            Self::Any => "any",
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Long => "long",
            Self::Double => "double",
            Self::Number => "number",
            Self::String => "string",
            Self::List => "list",
            Self::Map => "map",
            Self::Date => "date",
            Self::Period => "period",
            Self::Set => "set",
            Self::Unknown(name) => name,
        }
    }

    /// 주어진 값이 이 타입 선언을 만족하는지 검사합니다.
    ///
    /// `Unknown` 타입은 어떤 값도 만족하지 않습니다.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::Number => matches!(value, Value::Long(_) | Value::Double(_)),
            Self::Unknown(_) => false,
            declared => value.value_type() == *declared,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<String> for ValueType {
    fn from(name: String) -> Self {
        Self::parse(&name)
    }
}

impl From<ValueType> for String {
    fn from(t: ValueType) -> Self {
        t.name().to_owned()
    }
}

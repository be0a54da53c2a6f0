//! ISO-8601 기간 — `P1Y2M3W4DT5H6M7.890S` 형식
//!
//! [`Period`]는 달력 필드(년, 월, 주, 일)와 시간 필드(시, 분, 초, 밀리초)를
//! 정규화 없이 그대로 보관합니다. 따라서 `PT120M`과 `PT2H`는 같은 길이지만
//! 서로 다른 기간입니다.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Months, TimeDelta};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ValueError;

/// 필드별 ISO-8601 기간
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Period {
    pub years: i64,
    pub months: i64,
    pub weeks: i64,
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
    pub millis: i64,
}

impl Period {
    pub fn years(n: i64) -> Self {
        Self {
            years: n,
            ..Self::default()
        }
    }

    pub fn months(n: i64) -> Self {
        Self {
            months: n,
            ..Self::default()
        }
    }

    pub fn weeks(n: i64) -> Self {
        Self {
            weeks: n,
            ..Self::default()
        }
    }

    pub fn days(n: i64) -> Self {
        Self {
            days: n,
            ..Self::default()
        }
    }

    pub fn hours(n: i64) -> Self {
        Self {
            hours: n,
            ..Self::default()
        }
    }

    pub fn minutes(n: i64) -> Self {
        Self {
            minutes: n,
            ..Self::default()
        }
    }

    pub fn seconds(n: i64) -> Self {
        Self {
            seconds: n,
            ..Self::default()
        }
    }

    pub fn millis(n: i64) -> Self {
        Self {
            millis: n,
            ..Self::default()
        }
    }

    /// ISO-8601 기간 문자열을 파싱합니다.
    ///
    /// 앞의 `-` 부호는 모든 필드에 적용됩니다. 초에는 최대 3자리의 소수부를
    /// 허용하며 밀리초 필드로 옮겨집니다.
    pub fn parse(input: &str) -> Result<Self, ValueError> {
        let invalid = |reason: &str| ValueError::InvalidPeriod {
            input: input.to_owned(),
            reason: reason.to_owned(),
        };

        let (negative, rest) = match input.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, input),
        };
        let body = rest
            .strip_prefix('P')
            .or_else(|| rest.strip_prefix('p'))
            .ok_or_else(|| invalid("must start with 'P'"))?;
        if body.is_empty() {
            return Err(invalid("no fields"));
        }

        let (date_part, time_part) = match body.find(['T', 't']) {
            Some(idx) => (&body[..idx], Some(&body[idx + 1..])),
            None => (body, None),
        };
        if time_part.is_some_and(str::is_empty) {
            return Err(invalid("empty time section"));
        }

        let mut period = Self::default();
        for (number, designator) in split_components(date_part).map_err(|r| invalid(&r))? {
            let n = parse_integer(number).map_err(|r| invalid(&r))?;
            match designator.to_ascii_uppercase() {
                'Y' => period.years = n,
                'M' => period.months = n,
                'W' => period.weeks = n,
                'D' => period.days = n,
                other => return Err(invalid(&format!("unexpected date designator '{other}'"))),
            }
        }
        if let Some(time_part) = time_part {
            for (number, designator) in split_components(time_part).map_err(|r| invalid(&r))? {
                match designator.to_ascii_uppercase() {
                    'H' => period.hours = parse_integer(number).map_err(|r| invalid(&r))?,
                    'M' => period.minutes = parse_integer(number).map_err(|r| invalid(&r))?,
                    'S' => {
                        let (secs, millis) = parse_seconds(number).map_err(|r| invalid(&r))?;
                        period.seconds = secs;
                        period.millis = millis;
                    }
                    other => {
                        return Err(invalid(&format!("unexpected time designator '{other}'")));
                    }
                }
            }
        }

        Ok(if negative { period.negated() } else { period })
    }

    /// 모든 필드의 부호를 뒤집습니다 (`i64::MIN`은 `i64::MAX`로 포화).
    pub fn negated(self) -> Self {
        Self {
            years: self.years.saturating_neg(),
            months: self.months.saturating_neg(),
            weeks: self.weeks.saturating_neg(),
            days: self.days.saturating_neg(),
            hours: self.hours.saturating_neg(),
            minutes: self.minutes.saturating_neg(),
            seconds: self.seconds.saturating_neg(),
            millis: self.millis.saturating_neg(),
        }
    }

    /// 필드별 합. 오버플로우 시 `None`
    pub fn checked_add(self, other: Self) -> Option<Self> {
        Some(Self {
            years: self.years.checked_add(other.years)?,
            months: self.months.checked_add(other.months)?,
            weeks: self.weeks.checked_add(other.weeks)?,
            days: self.days.checked_add(other.days)?,
            hours: self.hours.checked_add(other.hours)?,
            minutes: self.minutes.checked_add(other.minutes)?,
            seconds: self.seconds.checked_add(other.seconds)?,
            millis: self.millis.checked_add(other.millis)?,
        })
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    /// 이름으로 필드를 조회합니다.
    pub fn field(&self, name: &str) -> Option<i64> {
        Some(match name {
            "years" => self.years,
            "months" => self.months,
            "weeks" => self.weeks,
            "days" => self.days,
            "hours" => self.hours,
            "minutes" => self.minutes,
            "seconds" => self.seconds,
            "millis" => self.millis,
            _ => return None,
        })
    }

    /// 시각에 기간을 더합니다. 달력 필드를 먼저, 시간 필드를 나중에 적용합니다.
    pub fn add_to(&self, dt: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
        let total_months = self.years.checked_mul(12)?.checked_add(self.months)?;
        let shifted = if total_months >= 0 {
            dt.checked_add_months(Months::new(u32::try_from(total_months).ok()?))?
        } else {
            dt.checked_sub_months(Months::new(u32::try_from(-total_months).ok()?))?
        };

        let delta = TimeDelta::try_weeks(self.weeks)?
            .checked_add(&TimeDelta::try_days(self.days)?)?
            .checked_add(&TimeDelta::try_hours(self.hours)?)?
            .checked_add(&TimeDelta::try_minutes(self.minutes)?)?
            .checked_add(&TimeDelta::try_seconds(self.seconds)?)?
            .checked_add(&TimeDelta::try_milliseconds(self.millis)?)?;
        shifted.checked_add_signed(delta)
    }

    /// 시각에서 기간을 뺍니다.
    pub fn subtract_from(&self, dt: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
        self.negated().add_to(dt)
    }
}

/// `12Y3M` 같은 문자열을 (숫자, 지정자) 쌍으로 나눕니다.
fn split_components(section: &str) -> Result<Vec<(&str, char)>, String> {
    let mut parts = Vec::new();
    let mut start = 0;
    for (idx, ch) in section.char_indices() {
        if ch.is_ascii_alphabetic() {
            if idx == start {
                return Err(format!("designator '{ch}' without a number"));
            }
            parts.push((&section[start..idx], ch));
            start = idx + ch.len_utf8();
        }
    }
    if start != section.len() {
        return Err("number without a designator".to_owned());
    }
    Ok(parts)
}

fn parse_integer(number: &str) -> Result<i64, String> {
    number
        .parse::<i64>()
        .map_err(|e| format!("invalid number '{number}': {e}"))
}

fn parse_seconds(number: &str) -> Result<(i64, i64), String> {
    let Some((whole, fraction)) = number.split_once(['.', ',']) else {
        return Ok((parse_integer(number)?, 0));
    };
    if fraction.is_empty() || fraction.len() > 3 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("invalid fractional seconds '{number}'"));
    }
    let secs = parse_integer(whole)?;
    let scale = 10_i64.pow(3 - fraction.len() as u32);
    let millis = parse_integer(fraction)? * scale;
    let negative = whole.starts_with('-');
    let signed = if negative { -millis } else { millis };
    Ok((secs, signed))
}

impl FromStr for Period {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return f.write_str("PT0S");
        }
        f.write_str("P")?;
        for (value, designator) in [
            (self.years, 'Y'),
            (self.months, 'M'),
            (self.weeks, 'W'),
            (self.days, 'D'),
        ] {
            if value != 0 {
                write!(f, "{value}{designator}")?;
            }
        }
        if self.hours != 0 || self.minutes != 0 || self.seconds != 0 || self.millis != 0 {
            f.write_str("T")?;
            if self.hours != 0 {
                write!(f, "{}H", self.hours)?;
            }
            if self.minutes != 0 {
                write!(f, "{}M", self.minutes)?;
            }
            if self.seconds != 0 || self.millis != 0 {
                if self.millis == 0 {
                    write!(f, "{}S", self.seconds)?;
                } else {
                    let total = i128::from(self.seconds) * 1000 + i128::from(self.millis);
                    let sign = if total < 0 { "-" } else { "" };
                    let abs = total.unsigned_abs();
                    write!(f, "{sign}{}.{:03}S", abs / 1000, abs % 1000)?;
                }
            }
        }
        Ok(())
    }
}

impl Serialize for Period {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

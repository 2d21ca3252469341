//! ISO-8601 durations and the `minus` reference adjustment
//!
//! See <https://en.wikipedia.org/wiki/ISO_8601#Durations>, e.g. `P30D` for
//! thirty days. Calendar units have no fixed length, so years and months use
//! their Gregorian averages. A leading `-` negates the duration, so `minus`
//! with `-P1D` shifts forward by a day.

use crate::error::PlanError;
use chrono::{DateTime, SecondsFormat};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Number, Value};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

const SECONDS_PER_DAY: f64 = 86_400.0;
const DAYS_PER_YEAR: f64 = 365.2425;

static DURATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^P(?:(?P<y>\d+(?:[.,]\d+)?)Y)?(?:(?P<mo>\d+(?:[.,]\d+)?)M)?(?:(?P<w>\d+(?:[.,]\d+)?)W)?(?:(?P<d>\d+(?:[.,]\d+)?)D)?(?:T(?:(?P<h>\d+(?:[.,]\d+)?)H)?(?:(?P<mi>\d+(?:[.,]\d+)?)M)?(?:(?P<s>\d+(?:[.,]\d+)?)S)?)?$",
    )
    .expect("duration pattern is valid")
});

/// Parsed ISO-8601 duration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IsoDuration {
    seconds: f64,
}

impl IsoDuration {
    /// Duration from a number of seconds
    #[inline]
    #[must_use]
    pub fn from_seconds(seconds: f64) -> Self {
        Self { seconds }
    }

    /// Total length in seconds
    #[inline]
    #[must_use]
    pub fn as_seconds(&self) -> f64 {
        self.seconds
    }

    /// Subtract this duration from a resolved reference value
    ///
    /// Integers and floats lose the duration's seconds; RFC 3339 timestamp
    /// strings are shifted back and re-rendered. Everything else, including
    /// strings that are not timestamps, passes through unadjusted.
    #[must_use]
    pub fn subtract_from(&self, value: Value) -> Value {
        match value {
            Value::Number(n) => Value::Number(self.subtract_number(&n)),
            Value::String(text) => match DateTime::parse_from_rfc3339(&text) {
                Ok(at) => {
                    #[allow(clippy::cast_possible_truncation)]
                    let delta = chrono::Duration::milliseconds((self.seconds * 1000.0).round() as i64);
                    match at.checked_sub_signed(delta) {
                        Some(shifted) => {
                            Value::String(shifted.to_rfc3339_opts(SecondsFormat::AutoSi, true))
                        }
                        None => Value::String(text),
                    }
                }
                Err(_) => Value::String(text),
            },
            other => other,
        }
    }

    fn subtract_number(&self, n: &Number) -> Number {
        if self.seconds.fract() == 0.0 {
            #[allow(clippy::cast_possible_truncation)]
            let whole = self.seconds as i64;
            if let Some(shifted) = n.as_i64().and_then(|i| i.checked_sub(whole)) {
                return Number::from(shifted);
            }
        }
        n.as_f64()
            .and_then(|f| Number::from_f64(f - self.seconds))
            .unwrap_or_else(|| n.clone())
    }
}

impl FromStr for IsoDuration {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PlanError::InvalidDuration(s.to_string());
        let (sign, body) = match s.strip_prefix('-') {
            Some(rest) => (-1.0, rest),
            None => (1.0, s),
        };
        if body.len() < 3 || body.ends_with('T') {
            return Err(invalid());
        }
        let caps = DURATION_RE.captures(body).ok_or_else(invalid)?;

        let unit = |name: &str| -> Result<f64, PlanError> {
            caps.name(name)
                .map_or(Ok(0.0), |m| m.as_str().replace(',', ".").parse::<f64>())
                .map_err(|_| invalid())
        };

        let year = DAYS_PER_YEAR * SECONDS_PER_DAY;
        let seconds = unit("y")? * year
            + unit("mo")? * (year / 12.0)
            + unit("w")? * 7.0 * SECONDS_PER_DAY
            + unit("d")? * SECONDS_PER_DAY
            + unit("h")? * 3600.0
            + unit("mi")? * 60.0
            + unit("s")?;

        Ok(Self {
            seconds: sign * seconds,
        })
    }
}

impl Display for IsoDuration {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "PT{}S", self.seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn secs(s: &str) -> f64 {
        s.parse::<IsoDuration>().unwrap().as_seconds()
    }

    #[test]
    fn parses_simple_units() {
        assert_eq!(secs("P30D"), 30.0 * 86_400.0);
        assert_eq!(secs("PT1H30M"), 5_400.0);
        assert_eq!(secs("P1W"), 604_800.0);
        assert_eq!(secs("PT0,5S"), 0.5);
        assert_eq!(secs("P1DT1S"), 86_401.0);
    }

    #[test]
    fn calendar_units_use_averages() {
        assert_eq!(secs("P1Y"), 31_556_952.0);
        assert_eq!(secs("P1M"), 2_629_746.0);
    }

    #[test]
    fn rejects_malformed() {
        for bad in ["", "P", "PT", "30D", "P1DT", "P1H", "PxD", "-", "-P", "--P1D", "P-1D"] {
            assert!(bad.parse::<IsoDuration>().is_err(), "{bad} should fail");
        }
    }

    #[test]
    fn leading_minus_negates() {
        assert_eq!(secs("-P1D"), -86_400.0);
        assert_eq!(secs("-PT1M30S"), -90.0);

        let d: IsoDuration = "-PT40S".parse().unwrap();
        assert_eq!(d.subtract_from(json!(100)), json!(140));
        assert_eq!(
            "-P1D".parse::<IsoDuration>().unwrap().subtract_from(json!("2024-03-01T10:00:00Z")),
            json!("2024-03-02T10:00:00Z")
        );
    }

    #[test]
    fn subtracts_from_integers_and_floats() {
        let d = IsoDuration::from_seconds(60.0);
        assert_eq!(d.subtract_from(json!(100)), json!(40));
        assert_eq!(d.subtract_from(json!(100.5)), json!(40.5));

        let half = IsoDuration::from_seconds(0.5);
        assert_eq!(half.subtract_from(json!(2)), json!(1.5));
    }

    #[test]
    fn subtracts_from_timestamps() {
        let d: IsoDuration = "P1D".parse().unwrap();
        assert_eq!(
            d.subtract_from(json!("2024-03-02T10:00:00Z")),
            json!("2024-03-01T10:00:00Z")
        );
    }

    #[test]
    fn non_subtractable_values_pass_through() {
        let d: IsoDuration = "P1D".parse().unwrap();
        assert_eq!(d.subtract_from(json!("latest")), json!("latest"));
        assert_eq!(d.subtract_from(json!(true)), json!(true));
        assert_eq!(d.subtract_from(json!(null)), json!(null));
        assert_eq!(d.subtract_from(json!({"a": 1})), json!({"a": 1}));
    }
}

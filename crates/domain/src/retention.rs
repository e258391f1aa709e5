use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Months, TimeDelta, Utc};
use scrubline_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Calendar unit of one retention component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionUnit {
    /// Exact seconds.
    Seconds,
    /// Exact minutes.
    Minutes,
    /// Exact hours.
    Hours,
    /// Exact 24-hour days.
    Days,
    /// Exact 7-day weeks.
    Weeks,
    /// Calendar months.
    Months,
    /// Calendar years.
    Years,
}

impl RetentionUnit {
    /// Returns the stable plural unit name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Seconds => "seconds",
            Self::Minutes => "minutes",
            Self::Hours => "hours",
            Self::Days => "days",
            Self::Weeks => "weeks",
            Self::Months => "months",
            Self::Years => "years",
        }
    }

    fn singular(&self) -> &'static str {
        match self {
            Self::Seconds => "second",
            Self::Minutes => "minute",
            Self::Hours => "hour",
            Self::Days => "day",
            Self::Weeks => "week",
            Self::Months => "month",
            Self::Years => "year",
        }
    }

    fn exact_seconds(&self) -> Option<i64> {
        match self {
            Self::Seconds => Some(1),
            Self::Minutes => Some(60),
            Self::Hours => Some(3_600),
            Self::Days => Some(86_400),
            Self::Weeks => Some(604_800),
            Self::Months | Self::Years => None,
        }
    }
}

impl FromStr for RetentionUnit {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "s" | "sec" | "second" | "seconds" => Ok(Self::Seconds),
            "min" | "minute" | "minutes" => Ok(Self::Minutes),
            "h" | "hour" | "hours" => Ok(Self::Hours),
            "d" | "day" | "days" => Ok(Self::Days),
            "w" | "week" | "weeks" => Ok(Self::Weeks),
            "month" | "months" => Ok(Self::Months),
            "y" | "year" | "years" => Ok(Self::Years),
            _ => Err(AppError::Validation(format!(
                "unknown retention unit '{value}'"
            ))),
        }
    }
}

/// One `(amount, unit)` part of a retention period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RetentionComponent {
    /// Number of units.
    pub amount: u32,
    /// Calendar unit.
    pub unit: RetentionUnit,
}

/// Window after which a record becomes eligible for anonymization.
///
/// Month and year components use calendar arithmetic, so two years before
/// `2024-02-29` is `2022-02-28`. Other components are exact durations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RetentionPeriod {
    components: Vec<RetentionComponent>,
}

impl RetentionPeriod {
    /// Creates a retention period from components.
    pub fn new(components: Vec<RetentionComponent>) -> AppResult<Self> {
        if components.iter().all(|component| component.amount == 0) {
            return Err(AppError::Validation(
                "retention period must be longer than zero".to_owned(),
            ));
        }

        Ok(Self { components })
    }

    /// Creates a single-component retention period.
    pub fn of(amount: u32, unit: RetentionUnit) -> AppResult<Self> {
        Self::new(vec![RetentionComponent { amount, unit }])
    }

    /// Returns the period components in declaration order.
    #[must_use]
    pub fn components(&self) -> &[RetentionComponent] {
        &self.components
    }

    /// Returns the latest instant a record may carry to be past this period at `now`.
    ///
    /// Records are eligible when their reference value is strictly before the cutoff.
    pub fn cutoff(&self, now: DateTime<Utc>) -> AppResult<DateTime<Utc>> {
        let overflow = || {
            AppError::Validation(format!(
                "retention period '{self}' cannot be subtracted from {now}"
            ))
        };

        let mut calendar_months: u32 = 0;
        let mut exact_seconds: i64 = 0;
        for component in &self.components {
            match component.unit {
                RetentionUnit::Months => {
                    calendar_months = calendar_months
                        .checked_add(component.amount)
                        .ok_or_else(overflow)?;
                }
                RetentionUnit::Years => {
                    calendar_months = component
                        .amount
                        .checked_mul(12)
                        .and_then(|months| calendar_months.checked_add(months))
                        .ok_or_else(overflow)?;
                }
                unit => {
                    let seconds = unit
                        .exact_seconds()
                        .and_then(|per_unit| per_unit.checked_mul(i64::from(component.amount)))
                        .ok_or_else(overflow)?;
                    exact_seconds = exact_seconds.checked_add(seconds).ok_or_else(overflow)?;
                }
            }
        }

        let shifted = now
            .checked_sub_months(Months::new(calendar_months))
            .ok_or_else(overflow)?;
        let delta = TimeDelta::try_seconds(exact_seconds).ok_or_else(overflow)?;

        shifted.checked_sub_signed(delta).ok_or_else(overflow)
    }
}

impl FromStr for RetentionPeriod {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.replace(',', " ");
        let mut tokens: Vec<&str> = normalized.split_whitespace().collect();
        if tokens.last().is_some_and(|token| token.eq_ignore_ascii_case("ago")) {
            tokens.pop();
        }

        if tokens.is_empty() || tokens.len() % 2 != 0 {
            return Err(AppError::Validation(format!(
                "retention period '{value}' must be a list of '<amount> <unit>' pairs"
            )));
        }

        let components = tokens
            .chunks(2)
            .map(|pair| {
                let amount = pair[0].parse::<u32>().map_err(|error| {
                    AppError::Validation(format!(
                        "invalid retention amount '{}' in '{value}': {error}",
                        pair[0]
                    ))
                })?;
                let unit = pair[1].parse::<RetentionUnit>()?;
                Ok(RetentionComponent { amount, unit })
            })
            .collect::<AppResult<Vec<_>>>()?;

        Self::new(components)
    }
}

impl TryFrom<String> for RetentionPeriod {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RetentionPeriod> for String {
    fn from(value: RetentionPeriod) -> Self {
        value.to_string()
    }
}

impl Display for RetentionPeriod {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        for (index, component) in self.components.iter().enumerate() {
            if index > 0 {
                formatter.write_str(" ")?;
            }
            let unit = if component.amount == 1 {
                component.unit.singular()
            } else {
                component.unit.as_str()
            };
            write!(formatter, "{} {unit}", component.amount)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use proptest::prelude::*;

    use super::{RetentionPeriod, RetentionUnit};

    fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 12, 0, 0)
            .single()
            .unwrap_or_else(|| unreachable!())
    }

    #[test]
    fn parses_compound_human_periods() {
        let period = "1 year, 6 months".parse::<RetentionPeriod>();
        assert!(period.is_ok());
        assert_eq!(
            period.unwrap_or_else(|_| unreachable!()).to_string(),
            "1 year 6 months"
        );
    }

    #[test]
    fn accepts_trailing_ago() {
        let period = "2 years ago".parse::<RetentionPeriod>();
        assert_eq!(
            period.ok(),
            RetentionPeriod::of(2, RetentionUnit::Years).ok()
        );
    }

    #[test]
    fn rejects_malformed_periods() {
        assert!("".parse::<RetentionPeriod>().is_err());
        assert!("2".parse::<RetentionPeriod>().is_err());
        assert!("two years".parse::<RetentionPeriod>().is_err());
        assert!("2 fortnights".parse::<RetentionPeriod>().is_err());
        assert!("0 days".parse::<RetentionPeriod>().is_err());
    }

    #[test]
    fn year_cutoff_clamps_leap_day() {
        let period = RetentionPeriod::of(2, RetentionUnit::Years)
            .unwrap_or_else(|_| unreachable!());
        let cutoff = period.cutoff(at(2024, 2, 29));
        assert_eq!(cutoff.ok(), Some(at(2022, 2, 28)));
    }

    #[test]
    fn month_cutoff_clamps_to_month_end() {
        let period = RetentionPeriod::of(1, RetentionUnit::Months)
            .unwrap_or_else(|_| unreachable!());
        let cutoff = period.cutoff(at(2025, 3, 31));
        assert_eq!(cutoff.ok(), Some(at(2025, 2, 28)));
    }

    #[test]
    fn exact_units_subtract_exact_durations() {
        let period = "1 week 2 days".parse::<RetentionPeriod>().unwrap_or_else(|_| unreachable!());
        let cutoff = period.cutoff(at(2025, 1, 10));
        assert_eq!(cutoff.ok(), Some(at(2025, 1, 1)));
    }

    #[test]
    fn serde_round_trips_through_human_string() {
        let period: Result<RetentionPeriod, _> = serde_json::from_str("\"90 days\"");
        assert!(period.is_ok());
        let encoded = serde_json::to_string(&period.unwrap_or_else(|_| unreachable!()));
        assert_eq!(encoded.ok().as_deref(), Some("\"90 days\""));
    }

    proptest! {
        #[test]
        fn cutoff_is_strictly_before_now(amount in 1_u32..500, unit_index in 0_usize..7) {
            let units = [
                RetentionUnit::Seconds,
                RetentionUnit::Minutes,
                RetentionUnit::Hours,
                RetentionUnit::Days,
                RetentionUnit::Weeks,
                RetentionUnit::Months,
                RetentionUnit::Years,
            ];
            let period = RetentionPeriod::of(amount, units[unit_index]).unwrap_or_else(|_| unreachable!());
            let now = at(2026, 10, 19);
            let cutoff = period.cutoff(now).unwrap_or_else(|_| unreachable!());
            prop_assert!(cutoff < now);
        }

        #[test]
        fn longer_periods_never_move_cutoff_forward(shorter in 1_u32..200, extra in 0_u32..200) {
            let now = at(2026, 10, 19);
            let short = RetentionPeriod::of(shorter, RetentionUnit::Days).unwrap_or_else(|_| unreachable!());
            let long = RetentionPeriod::of(shorter + extra, RetentionUnit::Days).unwrap_or_else(|_| unreachable!());
            let short_cutoff = short.cutoff(now).unwrap_or_else(|_| unreachable!());
            let long_cutoff = long.cutoff(now).unwrap_or_else(|_| unreachable!());
            prop_assert!(long_cutoff <= short_cutoff);
        }
    }
}

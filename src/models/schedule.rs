//! # Schedule Definitions
//!
//! Declarative schedule variants attached to workflow triggers. A schedule
//! is a pure description; fire-instant computation lives in
//! [`crate::scheduling::calculator`].

use std::fmt;
use std::str::FromStr;

use chrono::Weekday;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Misfire handling for simple schedules.
///
/// Kept distinct from [`MisfireInstruction`]: these adjust the remaining
/// repeat count, the cron-family instructions only decide fire-or-skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SimpleMisfireInstruction {
    #[default]
    FireNow,
    RescheduleNowWithExistingCount,
    RescheduleNowWithRemainingCount,
    RescheduleNextWithRemainingCount,
    RescheduleNextWithExistingCount,
}

/// Misfire handling shared by cron, daily-time and calendar schedules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MisfireInstruction {
    /// Fire immediately once, then continue from the next occurrence
    #[default]
    FireOnceNow,
    /// Silently drop the missed fire and wait for the next occurrence
    DoNothing,
    /// Recompute as if no misfire occurred, firing every overdue occurrence
    Ignore,
}

/// Units for daily-time and calendar repeat intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl IntervalUnit {
    /// Seconds per unit for the fixed-length units. Month and year are
    /// calendar-dependent and handled by calendar arithmetic instead.
    pub fn fixed_seconds(&self) -> Option<i64> {
        match self {
            Self::Second => Some(1),
            Self::Minute => Some(60),
            Self::Hour => Some(3_600),
            Self::Day => Some(86_400),
            Self::Week => Some(604_800),
            Self::Month | Self::Year => None,
        }
    }
}

/// Wall-clock time of day for daily-time windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeOfDay {
    pub hour: u32,
    #[serde(default)]
    pub minute: u32,
    #[serde(default)]
    pub second: u32,
}

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32, second: u32) -> Self {
        Self {
            hour,
            minute,
            second,
        }
    }

    /// Seconds since local midnight
    pub fn seconds_of_day(&self) -> u32 {
        self.hour * 3_600 + self.minute * 60 + self.second
    }

    fn is_valid(&self) -> bool {
        self.hour < 24 && self.minute < 60 && self.second < 60
    }
}

/// Days of the week a daily-time schedule may fire on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DayOfWeek {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl DayOfWeek {
    pub fn to_weekday(self) -> Weekday {
        match self {
            Self::Sunday => Weekday::Sun,
            Self::Monday => Weekday::Mon,
            Self::Tuesday => Weekday::Tue,
            Self::Wednesday => Weekday::Wed,
            Self::Thursday => Weekday::Thu,
            Self::Friday => Weekday::Fri,
            Self::Saturday => Weekday::Sat,
        }
    }
}

/// Declarative schedule attached to a workflow trigger.
///
/// Serialized with a `type` tag so the configuration-change wire payload
/// carries the variant name alongside its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Schedule {
    /// Fire at a fixed wall-clock cadence with an optional repeat count
    Simple {
        repeat_interval_ms: i64,
        /// Number of repeats after the first fire; 0 with
        /// `repeat_forever = false` means fire exactly once
        #[serde(default)]
        repeat_count: u32,
        #[serde(default)]
        repeat_forever: bool,
        #[serde(default)]
        misfire_instruction: SimpleMisfireInstruction,
    },
    /// Quartz-style cron expression (seconds field included)
    Cron {
        cron_expression: String,
        #[serde(default)]
        timezone: Option<String>,
        #[serde(default)]
        misfire_instruction: MisfireInstruction,
    },
    /// Fixed delay: next fire is always `interval_ms` after the previous
    /// actual fire, never a fixed wall-clock cadence
    Fixed { interval_ms: i64 },
    /// Repeat within a daily time window on selected weekdays
    DailyTime {
        start_time_of_day: TimeOfDay,
        end_time_of_day: TimeOfDay,
        days_of_week: Vec<DayOfWeek>,
        repeat_interval: u32,
        repeat_interval_unit: IntervalUnit,
        #[serde(default)]
        repeat_count: u32,
        #[serde(default)]
        misfire_instruction: MisfireInstruction,
    },
    /// Calendar-aware interval with DST policy flags
    Calendar {
        repeat_interval: u32,
        repeat_interval_unit: IntervalUnit,
        #[serde(default)]
        timezone: Option<String>,
        #[serde(default)]
        preserve_hour_of_day_across_dst: bool,
        #[serde(default)]
        skip_day_if_hour_missing: bool,
        #[serde(default)]
        misfire_instruction: MisfireInstruction,
    },
}

impl Schedule {
    /// Validate the schedule definition eagerly, before the owning trigger
    /// can ever be registered. Cron expressions and timezones parse here,
    /// not at fire time.
    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            Schedule::Simple {
                repeat_interval_ms,
                repeat_count,
                repeat_forever,
                ..
            } => {
                if (*repeat_forever || *repeat_count > 0) && *repeat_interval_ms <= 0 {
                    return Err("repeat interval must be positive".to_string());
                }
                Ok(())
            }
            Schedule::Cron {
                cron_expression,
                timezone,
                ..
            } => {
                cron::Schedule::from_str(cron_expression)
                    .map_err(|e| format!("malformed cron expression '{cron_expression}': {e}"))?;
                parse_timezone(timezone.as_deref())?;
                Ok(())
            }
            Schedule::Fixed { interval_ms } => {
                if *interval_ms <= 0 {
                    return Err("fixed delay interval must be positive".to_string());
                }
                Ok(())
            }
            Schedule::DailyTime {
                start_time_of_day,
                end_time_of_day,
                days_of_week,
                repeat_interval,
                repeat_interval_unit,
                ..
            } => {
                if !start_time_of_day.is_valid() || !end_time_of_day.is_valid() {
                    return Err("time of day out of range".to_string());
                }
                if start_time_of_day.seconds_of_day() > end_time_of_day.seconds_of_day() {
                    return Err("daily window start is after its end".to_string());
                }
                if days_of_week.is_empty() {
                    return Err("at least one day of week is required".to_string());
                }
                if *repeat_interval == 0 {
                    return Err("repeat interval must be positive".to_string());
                }
                if !matches!(
                    repeat_interval_unit,
                    IntervalUnit::Second | IntervalUnit::Minute | IntervalUnit::Hour
                ) {
                    return Err("daily time interval unit must be second, minute or hour".to_string());
                }
                Ok(())
            }
            Schedule::Calendar {
                repeat_interval,
                timezone,
                ..
            } => {
                if *repeat_interval == 0 {
                    return Err("repeat interval must be positive".to_string());
                }
                parse_timezone(timezone.as_deref())?;
                Ok(())
            }
        }
    }

    /// Misfire handling for the cron-family variants. Simple schedules
    /// carry their own instruction set; fixed delay has no policy (catch-up
    /// by skipping is inherent to its arithmetic).
    pub fn misfire_instruction(&self) -> MisfireInstruction {
        match self {
            Schedule::Cron {
                misfire_instruction,
                ..
            }
            | Schedule::DailyTime {
                misfire_instruction,
                ..
            }
            | Schedule::Calendar {
                misfire_instruction,
                ..
            } => *misfire_instruction,
            Schedule::Simple { .. } | Schedule::Fixed { .. } => MisfireInstruction::FireOnceNow,
        }
    }

    pub fn schedule_type(&self) -> &'static str {
        match self {
            Schedule::Simple { .. } => "simple",
            Schedule::Cron { .. } => "cron",
            Schedule::Fixed { .. } => "fixed",
            Schedule::DailyTime { .. } => "daily_time",
            Schedule::Calendar { .. } => "calendar",
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.schedule_type())
    }
}

/// Resolve an optional IANA timezone name, defaulting to UTC
pub(crate) fn parse_timezone(name: Option<&str>) -> std::result::Result<Tz, String> {
    match name {
        None => Ok(chrono_tz::UTC),
        Some(name) => Tz::from_str(name).map_err(|_| format!("unknown timezone '{name}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_schedule_rejects_non_positive_interval() {
        let schedule = Schedule::Fixed { interval_ms: 0 };
        assert!(schedule.validate().is_err());

        let schedule = Schedule::Fixed { interval_ms: -5 };
        assert!(schedule.validate().is_err());

        let schedule = Schedule::Fixed { interval_ms: 1 };
        assert!(schedule.validate().is_ok());
    }

    #[test]
    fn cron_schedule_parses_eagerly() {
        let schedule = Schedule::Cron {
            cron_expression: "0 0 12 * * ?".to_string(),
            timezone: None,
            misfire_instruction: MisfireInstruction::DoNothing,
        };
        assert!(schedule.validate().is_ok());

        let schedule = Schedule::Cron {
            cron_expression: "not a cron".to_string(),
            timezone: None,
            misfire_instruction: MisfireInstruction::DoNothing,
        };
        assert!(schedule.validate().is_err());
    }

    #[test]
    fn cron_schedule_rejects_unknown_timezone() {
        let schedule = Schedule::Cron {
            cron_expression: "0 0 12 * * ?".to_string(),
            timezone: Some("Mars/Olympus_Mons".to_string()),
            misfire_instruction: MisfireInstruction::default(),
        };
        assert!(schedule.validate().unwrap_err().contains("unknown timezone"));
    }

    #[test]
    fn daily_time_window_must_be_ordered() {
        let schedule = Schedule::DailyTime {
            start_time_of_day: TimeOfDay::new(17, 0, 0),
            end_time_of_day: TimeOfDay::new(9, 0, 0),
            days_of_week: vec![DayOfWeek::Monday],
            repeat_interval: 1,
            repeat_interval_unit: IntervalUnit::Hour,
            repeat_count: 0,
            misfire_instruction: MisfireInstruction::default(),
        };
        assert!(schedule.validate().is_err());
    }

    #[test]
    fn schedule_round_trips_through_tagged_json() {
        let schedule = Schedule::Simple {
            repeat_interval_ms: 60_000,
            repeat_count: 3,
            repeat_forever: false,
            misfire_instruction: SimpleMisfireInstruction::FireNow,
        };
        let json = serde_json::to_value(&schedule).unwrap();
        assert_eq!(json["type"], "simple");
        let back: Schedule = serde_json::from_value(json).unwrap();
        assert_eq!(back, schedule);
    }
}

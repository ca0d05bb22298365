//! # Trigger Time Calculator
//!
//! Pure fire-instant computation for every schedule variant. All functions
//! take `now` explicitly so behavior is deterministic under test; the live
//! registry feeds in wall-clock time.
//!
//! The fixed-delay variant deliberately catches up by skipping: when a
//! trigger registers with a start hint far in the past, every missed tick
//! collapses into the single next future one. This is fixed-delay, not
//! fixed-rate, semantics.

use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{Result, SchedulerError};
use crate::models::schedule::{parse_timezone, IntervalUnit, MisfireInstruction, Schedule, SimpleMisfireInstruction, TimeOfDay};
use crate::models::workflow_trigger::WorkflowTrigger;

/// Outcome of registration-time computation for one trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirePlan {
    /// Effective start instant (start bound, or evaluation time)
    pub start_at: DateTime<Utc>,
    /// First fire instant, already clipped to the trigger bounds
    pub next_fire: DateTime<Utc>,
}

/// Resolution of a fire instant found already in the past
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MisfireAction {
    /// Fire immediately once, then continue from now
    FireNow,
    /// Drop the missed fire and wait for the next future occurrence
    SkipToNext,
    /// Recompute as if no misfire occurred, firing each overdue occurrence
    Ignore,
}

/// Compute the fire plan for a trigger at registration time.
///
/// Returns `Ok(None)` when the trigger will never fire (end bound already
/// passed, or the schedule is exhausted): a no-op, not an error. Schedule
/// validation happens eagerly here: a malformed cron expression fails
/// before the trigger is ever registered.
pub fn compute_fire_plan(
    trigger: &WorkflowTrigger,
    now: DateTime<Utc>,
) -> Result<Option<FirePlan>> {
    let id = trigger.id().to_string();
    trigger
        .schedule
        .validate()
        .map_err(|reason| SchedulerError::InvalidSchedule {
            trigger: id.clone(),
            reason,
        })?;

    if trigger.is_expired(now) {
        return Ok(None);
    }

    let start_bound = trigger.start_at.and_then(ms_to_utc);
    let end_bound = trigger.end_at.and_then(ms_to_utc);
    // First fire never lands before the start bound
    let base = match start_bound {
        Some(start) if start > now => start,
        _ => now,
    };

    let first = match &trigger.schedule {
        Schedule::Fixed { interval_ms } => fixed_first_fire(*interval_ms, trigger.start_at, now),
        Schedule::Simple { .. } => Some(base),
        Schedule::Cron {
            cron_expression,
            timezone,
            ..
        } => {
            // Probe just before the base so an occurrence landing exactly
            // on the start bound is the first fire, not skipped
            let probe = base - Duration::milliseconds(1);
            cron_next(cron_expression, timezone.as_deref(), probe)?
        }
        Schedule::DailyTime {
            start_time_of_day,
            end_time_of_day,
            days_of_week,
            repeat_interval,
            repeat_interval_unit,
            ..
        } => daily_time_next(
            *start_time_of_day,
            *end_time_of_day,
            days_of_week,
            *repeat_interval,
            *repeat_interval_unit,
            base,
        ),
        Schedule::Calendar { .. } => Some(base),
    };

    let Some(next_fire) = first else {
        return Ok(None);
    };

    if let Some(start) = start_bound {
        if next_fire < start {
            return Err(SchedulerError::MisfireResolution {
                trigger: id,
                reason: format!(
                    "computed fire instant {next_fire} precedes start bound {start}"
                ),
            });
        }
    }
    if let Some(end) = end_bound {
        if next_fire > end {
            return Ok(None);
        }
    }

    Ok(Some(FirePlan {
        start_at: start_bound.unwrap_or(now),
        next_fire,
    }))
}

/// Compute the fire instant following `previous_fire`.
///
/// `fires_so_far` counts fires already emitted for this registration and
/// drives repeat-count exhaustion. Returns `Ok(None)` once the schedule is
/// exhausted or the end bound clips the next occurrence.
pub fn next_fire_after(
    trigger: &WorkflowTrigger,
    previous_fire: DateTime<Utc>,
    fires_so_far: u32,
    after: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>> {
    let next = match &trigger.schedule {
        Schedule::Fixed { interval_ms } => {
            // Fixed delay: interval after the previous actual fire
            previous_fire.checked_add_signed(Duration::milliseconds(*interval_ms))
        }
        Schedule::Simple {
            repeat_interval_ms,
            repeat_count,
            repeat_forever,
            ..
        } => {
            if !repeat_forever && fires_so_far > *repeat_count {
                None
            } else {
                previous_fire.checked_add_signed(Duration::milliseconds(*repeat_interval_ms))
            }
        }
        Schedule::Cron {
            cron_expression,
            timezone,
            ..
        } => cron_next(cron_expression, timezone.as_deref(), after)?,
        Schedule::DailyTime {
            start_time_of_day,
            end_time_of_day,
            days_of_week,
            repeat_interval,
            repeat_interval_unit,
            repeat_count,
            ..
        } => {
            if *repeat_count > 0 && fires_so_far > *repeat_count {
                None
            } else {
                daily_time_next(
                    *start_time_of_day,
                    *end_time_of_day,
                    days_of_week,
                    *repeat_interval,
                    *repeat_interval_unit,
                    after,
                )
            }
        }
        Schedule::Calendar {
            repeat_interval,
            repeat_interval_unit,
            timezone,
            preserve_hour_of_day_across_dst,
            skip_day_if_hour_missing,
            ..
        } => {
            let tz = parse_timezone(timezone.as_deref()).map_err(|reason| {
                SchedulerError::InvalidSchedule {
                    trigger: trigger.id().to_string(),
                    reason,
                }
            })?;
            let mut candidate = previous_fire;
            let mut next = None;
            // Step until the occurrence clears `after`; bounded so a
            // pathological interval cannot spin forever
            for _ in 0..10_000 {
                match calendar_step(
                    candidate,
                    *repeat_interval,
                    *repeat_interval_unit,
                    tz,
                    *preserve_hour_of_day_across_dst,
                    *skip_day_if_hour_missing,
                ) {
                    Some(stepped) if stepped > after => {
                        next = Some(stepped);
                        break;
                    }
                    Some(stepped) => candidate = stepped,
                    None => break,
                }
            }
            next
        }
    };

    let Some(next) = next else {
        return Ok(None);
    };

    if let Some(start) = trigger.start_at.and_then(ms_to_utc) {
        if next < start {
            return Err(SchedulerError::MisfireResolution {
                trigger: trigger.id().to_string(),
                reason: format!("computed fire instant {next} precedes start bound {start}"),
            });
        }
    }
    if let Some(end) = trigger.end_at.and_then(ms_to_utc) {
        if next > end {
            return Ok(None);
        }
    }

    Ok(Some(next))
}

/// Decide what to do with a fire instant that is already in the past.
///
/// Only consulted when the lateness exceeds the configured misfire
/// threshold; an on-time fire never goes through misfire resolution.
pub fn resolve_misfire(schedule: &Schedule) -> MisfireAction {
    match schedule {
        // Catch-up by skipping is built into the arithmetic; an overdue
        // tick fires once immediately
        Schedule::Fixed { .. } => MisfireAction::FireNow,
        Schedule::Simple {
            misfire_instruction,
            ..
        } => match misfire_instruction {
            SimpleMisfireInstruction::FireNow
            | SimpleMisfireInstruction::RescheduleNowWithExistingCount
            | SimpleMisfireInstruction::RescheduleNowWithRemainingCount => MisfireAction::FireNow,
            SimpleMisfireInstruction::RescheduleNextWithRemainingCount
            | SimpleMisfireInstruction::RescheduleNextWithExistingCount => {
                MisfireAction::SkipToNext
            }
        },
        _ => match schedule.misfire_instruction() {
            MisfireInstruction::FireOnceNow => MisfireAction::FireNow,
            MisfireInstruction::DoNothing => MisfireAction::SkipToNext,
            MisfireInstruction::Ignore => MisfireAction::Ignore,
        },
    }
}

/// Whether missed occurrences count against the repeat budget when this
/// schedule misfires (the remaining-count simple instructions)
pub fn misfire_consumes_missed(schedule: &Schedule) -> bool {
    matches!(
        schedule,
        Schedule::Simple {
            misfire_instruction: SimpleMisfireInstruction::RescheduleNowWithRemainingCount
                | SimpleMisfireInstruction::RescheduleNextWithRemainingCount,
            ..
        }
    )
}

/// Number of occurrences missed between `scheduled` and `now` for
/// interval-based schedules; at least one once a misfire is declared
pub fn missed_occurrences(schedule: &Schedule, scheduled: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
    let interval_ms = match schedule {
        Schedule::Simple {
            repeat_interval_ms, ..
        } => *repeat_interval_ms,
        Schedule::Fixed { interval_ms } => *interval_ms,
        _ => return 1,
    };
    if interval_ms <= 0 || now <= scheduled {
        return 1;
    }
    let late_ms = (now - scheduled).num_milliseconds();
    (late_ms / interval_ms + 1).min(u32::MAX as i64) as u32
}

/// The latest missed occurrence at or before `now`, used to skip a run of
/// missed interval fires in one step. Cron-family schedules recompute from
/// `now` instead, so they return `scheduled` unchanged.
pub fn last_missed_occurrence(
    schedule: &Schedule,
    scheduled: DateTime<Utc>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let interval_ms = match schedule {
        Schedule::Simple {
            repeat_interval_ms, ..
        } => *repeat_interval_ms,
        Schedule::Fixed { interval_ms } => *interval_ms,
        _ => return scheduled,
    };
    if interval_ms <= 0 || now <= scheduled {
        return scheduled;
    }
    let missed = i64::from(missed_occurrences(schedule, scheduled, now)) - 1;
    scheduled + Duration::milliseconds(missed * interval_ms)
}

fn ms_to_utc(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
}

/// First fire for a fixed-delay schedule.
///
/// A future start hint fires one interval after the hint. A past hint is
/// advanced by whole multiples of the interval until it exceeds `now`.
fn fixed_first_fire(
    interval_ms: i64,
    start_at: Option<i64>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let now_ms = now.timestamp_millis();
    let start = start_at.unwrap_or(now_ms);
    if start > now_ms {
        ms_to_utc(start.checked_add(interval_ms)?)
    } else {
        let missed = (now_ms - start) / interval_ms + 1;
        ms_to_utc(start.checked_add(missed.checked_mul(interval_ms)?)?)
    }
}

fn cron_next(
    expression: &str,
    timezone: Option<&str>,
    after: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>> {
    // validate() parsed these already; the error paths stay for direct calls
    let schedule = cron::Schedule::from_str(expression).map_err(|e| {
        SchedulerError::InvalidSchedule {
            trigger: String::new(),
            reason: format!("malformed cron expression '{expression}': {e}"),
        }
    })?;
    let tz = parse_timezone(timezone).map_err(|reason| SchedulerError::InvalidSchedule {
        trigger: String::new(),
        reason,
    })?;
    Ok(schedule
        .after(&after.with_timezone(&tz))
        .next()
        .map(|dt| dt.with_timezone(&Utc)))
}

/// Next instant inside the daily window on an allowed weekday, strictly
/// after `after`. Daily-time schedules run on UTC wall clock.
fn daily_time_next(
    start_tod: TimeOfDay,
    end_tod: TimeOfDay,
    days_of_week: &[crate::models::schedule::DayOfWeek],
    repeat_interval: u32,
    unit: IntervalUnit,
    after: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let step_seconds = i64::from(repeat_interval) * unit.fixed_seconds()?;
    let step = Duration::seconds(step_seconds);
    let start_time = NaiveTime::from_hms_opt(start_tod.hour, start_tod.minute, start_tod.second)?;
    let end_time = NaiveTime::from_hms_opt(end_tod.hour, end_tod.minute, end_tod.second)?;

    let mut date = after.date_naive();
    // A year of days covers every weekday combination
    for _ in 0..=366 {
        let weekday = date.weekday();
        if days_of_week.iter().any(|d| d.to_weekday() == weekday) {
            let window_end = Utc.from_utc_datetime(&date.and_time(end_time));
            let mut candidate = Utc.from_utc_datetime(&date.and_time(start_time));
            while candidate <= window_end {
                if candidate > after {
                    return Some(candidate);
                }
                candidate += step;
            }
        }
        date = date.succ_opt()?;
    }
    None
}

/// One calendar-interval step from `previous` in the schedule's timezone
fn calendar_step(
    previous: DateTime<Utc>,
    repeat_interval: u32,
    unit: IntervalUnit,
    tz: Tz,
    preserve_hour: bool,
    skip_day_if_hour_missing: bool,
) -> Option<DateTime<Utc>> {
    let n = i64::from(repeat_interval);
    match unit {
        // Fixed-length units are plain duration arithmetic
        IntervalUnit::Second => previous.checked_add_signed(Duration::seconds(n)),
        IntervalUnit::Minute => previous.checked_add_signed(Duration::minutes(n)),
        IntervalUnit::Hour => previous.checked_add_signed(Duration::hours(n)),
        IntervalUnit::Day | IntervalUnit::Week => {
            let days = if unit == IntervalUnit::Week { n * 7 } else { n };
            if preserve_hour {
                // Keep the local wall-clock hour across DST transitions
                let local = previous.with_timezone(&tz).naive_local()
                    + Duration::days(days);
                resolve_local(tz, local, skip_day_if_hour_missing)
            } else {
                previous.checked_add_signed(Duration::days(days))
            }
        }
        IntervalUnit::Month | IntervalUnit::Year => {
            let months = if unit == IntervalUnit::Year {
                repeat_interval.checked_mul(12)?
            } else {
                repeat_interval
            };
            let local = previous
                .with_timezone(&tz)
                .naive_local()
                .checked_add_months(chrono::Months::new(months))?;
            resolve_local(tz, local, skip_day_if_hour_missing)
        }
    }
}

/// Map a local wall-clock instant back to UTC, handling DST gaps.
///
/// `skip_day = true` moves a nonexistent hour to the same wall clock on
/// the next valid day (no fire on the gap day); `false` shifts forward to
/// the next instant that exists.
fn resolve_local(tz: Tz, local: NaiveDateTime, skip_day: bool) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None if skip_day => {
            let mut shifted = local + Duration::days(1);
            // DST gaps never span more than a couple of days
            for _ in 0..3 {
                match tz.from_local_datetime(&shifted) {
                    LocalResult::Single(dt) => return Some(dt.with_timezone(&Utc)),
                    LocalResult::Ambiguous(earliest, _) => {
                        return Some(earliest.with_timezone(&Utc))
                    }
                    LocalResult::None => shifted += Duration::days(1),
                }
            }
            None
        }
        LocalResult::None => {
            let mut probe = local;
            // Gaps are at most a few hours; probe in half-hour steps
            for _ in 0..8 {
                probe += Duration::minutes(30);
                match tz.from_local_datetime(&probe) {
                    LocalResult::Single(dt) => return Some(dt.with_timezone(&Utc)),
                    LocalResult::Ambiguous(earliest, _) => {
                        return Some(earliest.with_timezone(&Utc))
                    }
                    LocalResult::None => {}
                }
            }
            None
        }
    }
}

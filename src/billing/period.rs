//! Calendar arithmetic for recurring charges and the bounded enumeration
//! of billing-period boundaries.
//!
//! A boundary is the *end* date of one billing period. For a spec of one
//! step, the period starting at `start` ends at `start + 1 step - 1 day`,
//! where a step is `length` days, `7 * length` days, `length` months or
//! `length` years. Month and year steps follow calendar end-of-month
//! semantics: advancing the last day of a month lands on the last day of
//! the target month, and the same arithmetic run backward recovers it.
//!
//! Boundaries are always derived from the activation date and a step
//! index, never by advancing the previous boundary, so month-length
//! variation cannot accumulate drift over a long enumeration.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};
use tracing::warn;

use super::models::{BillingWindow, RecurringChargeSpec, RecurringPeriod};
use super::validation::ValidationError;
use crate::error::BillingResult;

fn days_in_month(ts: DateTime<Utc>) -> u32 {
    let first = NaiveDate::from_ymd_opt(ts.year(), ts.month(), 1).unwrap();
    let next = first.checked_add_months(Months::new(1)).unwrap();
    next.pred_opt().unwrap().day()
}

fn is_month_end(ts: DateTime<Utc>) -> bool {
    ts.day() == days_in_month(ts)
}

/// Month shift with end-of-month anchoring in both directions.
fn shift_months(ts: DateTime<Utc>, months: i64) -> DateTime<Utc> {
    let shifted = if months >= 0 {
        ts.checked_add_months(Months::new(months as u32))
    } else {
        ts.checked_sub_months(Months::new(months.unsigned_abs() as u32))
    }
    .unwrap_or(ts);

    if is_month_end(ts) && !is_month_end(shifted) {
        let pad = days_in_month(shifted) - shifted.day();
        shifted + Duration::days(i64::from(pad))
    } else {
        shifted
    }
}

/// Advances `ts` by `steps` whole steps of the given spec.
pub fn advance(ts: DateTime<Utc>, spec: &RecurringChargeSpec, steps: u32) -> DateTime<Utc> {
    let n = i64::from(spec.length) * i64::from(steps);
    match spec.period {
        RecurringPeriod::Day => ts + Duration::days(n),
        RecurringPeriod::Week => ts + Duration::days(7 * n),
        RecurringPeriod::Month => shift_months(ts, n),
        RecurringPeriod::Year => shift_months(ts, 12 * n),
    }
}

/// The same arithmetic as [`advance`], run backward.
pub fn retreat(ts: DateTime<Utc>, spec: &RecurringChargeSpec, steps: u32) -> DateTime<Utc> {
    let n = i64::from(spec.length) * i64::from(steps);
    match spec.period {
        RecurringPeriod::Day => ts - Duration::days(n),
        RecurringPeriod::Week => ts - Duration::days(7 * n),
        RecurringPeriod::Month => shift_months(ts, -n),
        RecurringPeriod::Year => shift_months(ts, -12 * n),
    }
}

/// End of the billing period that begins at `start`.
pub fn next_boundary(start: DateTime<Utc>, spec: &RecurringChargeSpec) -> DateTime<Utc> {
    advance(start, spec, 1) - Duration::days(1)
}

/// One step back from a known boundary.
pub fn previous_boundary(boundary: DateTime<Utc>, spec: &RecurringChargeSpec) -> DateTime<Utc> {
    retreat(boundary, spec, 1)
}

/// Lazy, bounded enumeration of boundaries. Terminates internally the
/// first time a generated boundary exceeds the limit, so no boundary
/// beyond it is ever materialized.
pub struct BoundaryIter {
    activation: DateTime<Utc>,
    spec: RecurringChargeSpec,
    limit: DateTime<Utc>,
    index: u32,
    exhausted: bool,
}

impl BoundaryIter {
    pub fn new(spec: RecurringChargeSpec, activation: DateTime<Utc>, limit: DateTime<Utc>) -> Self {
        Self {
            activation,
            spec,
            limit,
            index: 0,
            exhausted: false,
        }
    }
}

impl Iterator for BoundaryIter {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<DateTime<Utc>> {
        if self.exhausted {
            return None;
        }
        let boundary = advance(self.activation, &self.spec, self.index + 1) - Duration::days(1);
        if boundary > self.limit {
            self.exhausted = true;
            return None;
        }
        self.index += 1;
        Some(boundary)
    }
}

/// All billing-period end dates between an activation date and a limit
/// date, in order. `activation > limit` yields an empty sequence and a
/// warning, by policy not an error.
pub fn compute_boundaries(
    spec: &RecurringChargeSpec,
    activation: DateTime<Utc>,
    limit: DateTime<Utc>,
) -> BillingResult<Vec<DateTime<Utc>>> {
    if spec.length == 0 {
        return Err(ValidationError::single(
            "recurring charge spec: period length must be greater than 0",
        )
        .into());
    }
    if activation > limit {
        warn!(%activation, %limit, "activation date is after limit date, no boundaries");
        return Ok(Vec::new());
    }
    Ok(BoundaryIter::new(*spec, activation, limit).collect())
}

/// Pairs sorted boundaries with their start dates: the first window opens
/// at the activation date, each subsequent one the day after the previous
/// end. Boundaries may come from several merged price specs.
pub fn windows_from_boundaries(
    mut boundaries: Vec<DateTime<Utc>>,
    activation: DateTime<Utc>,
) -> Vec<BillingWindow> {
    boundaries.sort();
    boundaries.dedup();

    let mut windows = Vec::with_capacity(boundaries.len());
    let mut start = activation;
    for end in boundaries {
        windows.push(BillingWindow::new(start, end));
        start = end + Duration::days(1);
    }
    windows
}

/// The ordered list of billing windows covering `[activation, limit]`.
pub fn compute_windows(
    spec: &RecurringChargeSpec,
    activation: DateTime<Utc>,
    limit: DateTime<Utc>,
) -> BillingResult<Vec<BillingWindow>> {
    let boundaries = compute_boundaries(spec, activation, limit)?;
    Ok(windows_from_boundaries(boundaries, activation))
}

/// The boundary pair around an evaluation instant: the first boundary on
/// or after `at` (stepping from the activation date), and the boundary
/// one step before it.
pub fn due_boundaries(
    activation: DateTime<Utc>,
    at: DateTime<Utc>,
    spec: &RecurringChargeSpec,
) -> (DateTime<Utc>, DateTime<Utc>) {
    debug_assert!(spec.length > 0, "recurring spec must have positive length");

    if activation.date_naive() >= at.date_naive() {
        return (retreat(activation, spec, 1), activation);
    }
    let mut index = 1;
    loop {
        let candidate = advance(activation, spec, index);
        if candidate.date_naive() >= at.date_naive() {
            return (advance(activation, spec, index - 1), candidate);
        }
        index += 1;
    }
}

/// An item is due exactly when the evaluation instant lands on its next
/// boundary, at day granularity.
pub fn is_due(at: DateTime<Utc>, next: DateTime<Utc>) -> bool {
    at.date_naive() == next.date_naive()
}

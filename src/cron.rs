//! Standard 5-field cron expression evaluator.
//!
//! Deterministic and side-effect-free: `next_after` is a pure function of
//! the parsed expression and the instant it is evaluated against. When both
//! day-of-month and day-of-week are restricted, the two are combined with
//! *union* semantics (fire when either matches) rather than the AND
//! semantics some cron implementations use, per the documented convention.

use crate::error::{Error, Result};
use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use std::collections::BTreeSet;
use std::str::FromStr;

const SEARCH_HORIZON_DAYS: i64 = 366 * 5;

#[derive(Debug, Clone)]
struct Field {
    values: BTreeSet<u32>,
    /// `true` if the source text was anything other than `*`.
    restricted: bool,
}

/// A parsed 5-field cron expression: minute, hour, day-of-month, month,
/// day-of-week.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    source: String,
    minute: Field,
    hour: Field,
    dom: Field,
    month: Field,
    dow: Field,
}

impl FromStr for CronSchedule {
    type Err = Error;

    fn from_str(expr: &str) -> Result<Self> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(Error::InvalidCron(format!(
                "expected 5 fields (minute hour dom month dow), got {}: {expr:?}",
                fields.len()
            )));
        }

        Ok(CronSchedule {
            source: expr.to_string(),
            minute: parse_field(fields[0], 0, 59, expr)?,
            hour: parse_field(fields[1], 0, 23, expr)?,
            dom: parse_field(fields[2], 1, 31, expr)?,
            month: parse_field(fields[3], 1, 12, expr)?,
            dow: parse_dow_field(fields[4], expr)?,
        })
    }
}

impl CronSchedule {
    pub fn parse(expr: &str) -> Result<Self> {
        expr.parse()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Earliest fire time strictly greater than `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let both_restricted = self.dom.restricted && self.dow.restricted;

        if !both_restricted {
            self.search(after, false, false)
        } else {
            let dom_branch = self.search(after, false, true);
            let dow_branch = self.search(after, true, false);
            match (dom_branch, dow_branch) {
                (Ok(a), Ok(b)) => Ok(a.min(b)),
                (Ok(a), Err(_)) => Ok(a),
                (Err(_), Ok(b)) => Ok(b),
                (Err(e), Err(_)) => Err(e),
            }
        }
    }

    fn matches_day(&self, t: &DateTime<Utc>, ignore_dom: bool, ignore_dow: bool) -> bool {
        if !self.month.values.contains(&t.month()) {
            return false;
        }
        if !ignore_dom && !self.dom.values.contains(&t.day()) {
            return false;
        }
        if !ignore_dow {
            let dow = t.weekday().num_days_from_sunday();
            if !self.dow.values.contains(&dow) {
                return false;
            }
        }
        true
    }

    fn matches_time(&self, t: &DateTime<Utc>) -> bool {
        self.minute.values.contains(&t.minute()) && self.hour.values.contains(&t.hour())
    }

    fn search(
        &self,
        after: DateTime<Utc>,
        ignore_dom: bool,
        ignore_dow: bool,
    ) -> Result<DateTime<Utc>> {
        let base = after
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(after);
        let mut t = base + Duration::minutes(1);
        let limit = after + Duration::days(SEARCH_HORIZON_DAYS);

        while t < limit {
            if !self.matches_day(&t, ignore_dom, ignore_dow) {
                let next_midnight = (t.date_naive() + chrono::Days::new(1))
                    .and_hms_opt(0, 0, 0)
                    .expect("midnight is a valid time");
                t = Utc.from_utc_datetime(&next_midnight);
                continue;
            }
            if !self.matches_time(&t) {
                t += Duration::minutes(1);
                continue;
            }
            return Ok(t);
        }

        Err(Error::InvalidCron(format!(
            "no fire time for {:?} within {SEARCH_HORIZON_DAYS} days of {after}",
            self.source
        )))
    }
}

/// Parse a single cron field over `[lo, hi]`, supporting `*`, `,`, `-`, `/`.
fn parse_field(raw: &str, lo: u32, hi: u32, source: &str) -> Result<Field> {
    let restricted = raw != "*";
    let mut values = BTreeSet::new();

    for part in raw.split(',') {
        let (range_part, step) = match part.split_once('/') {
            Some((r, s)) => (
                r,
                s.parse::<u32>()
                    .map_err(|_| Error::InvalidCron(format!("bad step {s:?} in {source:?}")))?,
            ),
            None => (part, 1),
        };

        let (start, end) = if range_part == "*" {
            (lo, hi)
        } else if let Some((a, b)) = range_part.split_once('-') {
            let a: u32 = a
                .parse()
                .map_err(|_| Error::InvalidCron(format!("bad range start in {source:?}")))?;
            let b: u32 = b
                .parse()
                .map_err(|_| Error::InvalidCron(format!("bad range end in {source:?}")))?;
            (a, b)
        } else {
            let v: u32 = range_part
                .parse()
                .map_err(|_| Error::InvalidCron(format!("bad value {range_part:?} in {source:?}")))?;
            (v, v)
        };

        if start < lo || end > hi || start > end || step == 0 {
            return Err(Error::InvalidCron(format!(
                "field {part:?} out of range [{lo},{hi}] in {source:?}"
            )));
        }

        let mut v = start;
        while v <= end {
            values.insert(v);
            v += step;
        }
    }

    if values.is_empty() {
        return Err(Error::InvalidCron(format!("empty field in {source:?}")));
    }

    Ok(Field { values, restricted })
}

/// Day-of-week is 0-6 (Sunday=0) with 7 accepted as an alias for Sunday.
fn parse_dow_field(raw: &str, source: &str) -> Result<Field> {
    let mut field = parse_field(raw, 0, 7, source)?;
    if field.values.remove(&7) {
        field.values.insert(0);
    }
    Ok(field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, mi, 0).unwrap()
    }

    #[test]
    fn every_minute_rounds_up() {
        let s = CronSchedule::parse("* * * * *").unwrap();
        let t = at(2026, 1, 1, 12, 0) + Duration::seconds(30);
        assert_eq!(s.next_after(t).unwrap(), at(2026, 1, 1, 12, 1));
    }

    #[test]
    fn every_five_minutes() {
        let s = CronSchedule::parse("*/5 * * * *").unwrap();
        let t = at(2026, 1, 1, 12, 0);
        assert_eq!(s.next_after(t).unwrap(), at(2026, 1, 1, 12, 5));
    }

    #[test]
    fn daily_at_eight() {
        let s = CronSchedule::parse("0 8 * * *").unwrap();
        assert_eq!(
            s.next_after(at(2026, 1, 1, 12, 0)).unwrap(),
            at(2026, 1, 2, 8, 0)
        );
    }

    #[test]
    fn invalid_expression() {
        assert!(CronSchedule::parse("not a cron").is_err());
        assert!(CronSchedule::parse("60 * * * *").is_err());
    }

    #[test]
    fn dom_dow_union() {
        // Fire on the 1st of the month OR on Mondays.
        let s = CronSchedule::parse("0 0 1 * 1").unwrap();
        // 2026-01-05 is a Monday; nearest match after 2026-01-02 should be
        // the 5th (Monday), not wait for the 1st of February.
        let t = at(2026, 1, 2, 0, 0);
        let next = s.next_after(t).unwrap();
        assert_eq!(next, at(2026, 1, 5, 0, 0));
        assert_eq!(next.weekday(), chrono::Weekday::Mon);
    }
}

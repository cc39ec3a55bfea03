//! Five-field cron expressions: minute, hour, day-of-month, month, day-of-week.
//!
//! Each field accepts `*`, `N`, `A-B`, `*/S`, `A-B/S`, `N/S` and comma lists of
//! those. Day-of-week runs 0-6 from Sunday; `7` is accepted as Sunday too.
//! When both day fields are restricted, a time matches if either one does,
//! as in classic cron.

use chrono::{Datelike, Timelike};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid cron expression '{expr}': {reason}")]
pub struct CronError {
    pub expr: String,
    pub reason: String,
}

/// A parsed cron expression. Each field is a bitmask of allowed values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    source: String,
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    dom_restricted: bool,
    dow_restricted: bool,
}

struct Field {
    name: &'static str,
    min: u32,
    max: u32,
}

const MINUTE: Field = Field { name: "minute", min: 0, max: 59 };
const HOUR: Field = Field { name: "hour", min: 0, max: 23 };
const DAY_OF_MONTH: Field = Field { name: "day-of-month", min: 1, max: 31 };
const MONTH: Field = Field { name: "month", min: 1, max: 12 };
const DAY_OF_WEEK: Field = Field { name: "day-of-week", min: 0, max: 7 };

impl CronExpr {
    pub fn parse(expr: &str) -> Result<Self, CronError> {
        let fail = |reason: String| CronError {
            expr: expr.to_string(),
            reason,
        };

        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(fail(format!(
                "expected 5 fields (minute hour day-of-month month day-of-week), got {}",
                fields.len()
            )));
        }

        let mut days_of_week = parse_field(fields[4], &DAY_OF_WEEK).map_err(&fail)?;
        // 7 is Sunday
        if days_of_week & (1 << 7) != 0 {
            days_of_week = (days_of_week & !(1 << 7)) | 1;
        }

        Ok(Self {
            source: fields.join(" "),
            minutes: parse_field(fields[0], &MINUTE).map_err(&fail)?,
            hours: parse_field(fields[1], &HOUR).map_err(&fail)?,
            days_of_month: parse_field(fields[2], &DAY_OF_MONTH).map_err(&fail)?,
            months: parse_field(fields[3], &MONTH).map_err(&fail)?,
            days_of_week,
            dom_restricted: !fields[2].starts_with('*'),
            dow_restricted: !fields[4].starts_with('*'),
        })
    }

    /// Whether `at` falls inside a minute this expression selects.
    pub fn matches<T: Datelike + Timelike>(&self, at: &T) -> bool {
        let bit = |mask: u64, value: u32| mask & (1 << value) != 0;

        let dom = bit(self.days_of_month, at.day());
        let dow = bit(self.days_of_week, at.weekday().num_days_from_sunday());
        let day = match (self.dom_restricted, self.dow_restricted) {
            (true, true) => dom || dow,
            _ => dom && dow,
        };

        bit(self.minutes, at.minute())
            && bit(self.hours, at.hour())
            && bit(self.months, at.month())
            && day
    }

    /// The expression with whitespace normalized.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl FromStr for CronExpr {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_field(text: &str, field: &Field) -> Result<u64, String> {
    let mut mask = 0u64;
    for part in text.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| format!("invalid step '{step}' in {} field", field.name))?;
                if step == 0 {
                    return Err(format!("step cannot be zero in {} field", field.name));
                }
                (range, Some(step))
            }
            None => (part, None),
        };

        let (start, end) = if range == "*" {
            (field.min, field.max)
        } else if let Some((a, b)) = range.split_once('-') {
            let (a, b) = (parse_value(a, field)?, parse_value(b, field)?);
            if a > b {
                return Err(format!("range {a}-{b} is backwards in {} field", field.name));
            }
            (a, b)
        } else {
            let v = parse_value(range, field)?;
            // `N/S` runs from N to the end of the field
            (v, if step.is_some() { field.max } else { v })
        };

        let step = step.unwrap_or(1) as usize;
        for v in (start..=end).step_by(step) {
            mask |= 1 << v;
        }
    }
    Ok(mask)
}

fn parse_value(text: &str, field: &Field) -> Result<u32, String> {
    let v: u32 = text
        .parse()
        .map_err(|_| format!("invalid value '{text}' in {} field", field.name))?;
    if v < field.min || v > field.max {
        return Err(format!(
            "{v} out of range {}-{} in {} field",
            field.min, field.max, field.name
        ));
    }
    Ok(v)
}

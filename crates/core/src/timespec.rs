//! Relative and absolute time expressions used to bound partial snapshots.
//!
//! A relative expression is `now` followed by zero or more signed terms, each
//! an integer and a unit (`w`eeks, `d`ays, `h`ours, `m`inutes):
//!
//! ```text
//! now          the evaluation instant
//! now-1d       24 hours earlier
//! now-1w2d     9 days earlier (a term without a sign reuses the previous sign)
//! now-1d+2h    22 hours earlier
//! ```
//!
//! Whitespace anywhere in a relative expression is ignored and matching is
//! case-insensitive. Anything that does not start with `now` is parsed as an
//! absolute date-time: RFC 3339, or `YYYY-MM-DD[( |T)HH:MM[:SS]]` taken as UTC.

use crate::{Error, Result};
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::{datetime, format_description};
use time::{Date, Duration, OffsetDateTime, PrimitiveDateTime};

/// Lower bound used when a window start is absent or unparsable.
pub const WINDOW_MIN: OffsetDateTime = datetime!(0001-01-01 00:00:00 UTC);

/// Upper bound used when a window end is absent or unparsable.
pub const WINDOW_MAX: OffsetDateTime = datetime!(9999-12-31 23:59:59.999999 UTC);

const NAIVE_DATETIME_FORMATS: &[&[BorrowedFormatItem<'static>]] = &[
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    format_description!("[year]-[month]-[day] [hour]:[minute]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]"),
];

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Resolves time expressions into absolute UTC instants.
#[derive(Clone, Copy, Debug, Default)]
pub struct RelativeTimeResolver;

impl RelativeTimeResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve `expr` against the current clock.
    pub fn resolve(&self, expr: &str) -> Result<OffsetDateTime> {
        self.resolve_at(expr, OffsetDateTime::now_utc())
    }

    /// Resolve `expr` against a fixed evaluation instant.
    pub fn resolve_at(&self, expr: &str, now: OffsetDateTime) -> Result<OffsetDateTime> {
        let compact: String = expr
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();

        if compact.is_empty() {
            return Err(Error::InvalidTimeSpec("empty expression".to_string()));
        }

        match compact.strip_prefix("now") {
            Some(terms) => {
                let offset = parse_terms(terms).map_err(|reason| {
                    Error::InvalidTimeSpec(format!("{expr:?}: {reason}"))
                })?;
                now.checked_add(offset).ok_or_else(|| {
                    Error::InvalidTimeSpec(format!("{expr:?}: result is out of range"))
                })
            }
            None => parse_datetime(expr),
        }
    }
}

/// Parse `[+-]N<unit>` terms following `now` into a total offset.
fn parse_terms(mut rest: &str) -> std::result::Result<Duration, String> {
    let mut total = Duration::ZERO;
    let mut sign: Option<i64> = None;

    while !rest.is_empty() {
        let bytes = rest.as_bytes();
        let mut idx = 0;

        match bytes[0] {
            b'+' => {
                sign = Some(1);
                idx = 1;
            }
            b'-' => {
                sign = Some(-1);
                idx = 1;
            }
            _ if sign.is_none() => {
                return Err("first term must start with '+' or '-'".to_string());
            }
            _ => {}
        }

        let digits_start = idx;
        while idx < bytes.len() && bytes[idx].is_ascii_digit() {
            idx += 1;
        }
        if idx == digits_start {
            return Err(format!("expected a number at {:?}", &rest[digits_start..]));
        }
        let amount: i64 = rest[digits_start..idx]
            .parse()
            .map_err(|_| "number is too large".to_string())?;

        let unit_secs: i64 = match bytes.get(idx) {
            Some(b'w') => 7 * 24 * 3600,
            Some(b'd') => 24 * 3600,
            Some(b'h') => 3600,
            Some(b'm') => 60,
            Some(other) => return Err(format!("unknown unit '{}'", *other as char)),
            None => return Err("missing unit (w, d, h or m)".to_string()),
        };
        idx += 1;

        let secs = amount
            .checked_mul(unit_secs)
            .and_then(|s| s.checked_mul(sign.unwrap_or(1)))
            .ok_or_else(|| "offset is too large".to_string())?;
        total = total
            .checked_add(Duration::seconds(secs))
            .ok_or_else(|| "offset is too large".to_string())?;

        rest = &rest[idx..];
    }

    Ok(total)
}

/// Parse an absolute date-time. Values without an offset are taken as UTC.
pub fn parse_datetime(s: &str) -> Result<OffsetDateTime> {
    let s = s.trim();
    if let Ok(instant) = OffsetDateTime::parse(s, &Rfc3339) {
        return Ok(instant);
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = PrimitiveDateTime::parse(s, format) {
            return Ok(naive.assume_utc());
        }
    }
    Date::parse(s, DATE_FORMAT)
        .map(|date| date.midnight().assume_utc())
        .map_err(|_| Error::InvalidTimeSpec(format!("{s:?}: unrecognized date-time format")))
}

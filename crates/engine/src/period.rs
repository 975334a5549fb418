//! Which fiscal month is authoritative for a year, and commitment-note ids.

use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;

use crate::{EngineError, ResultEngine};

/// Reference timezone of the external financial system.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::Sao_Paulo;

/// Most recent month with authoritative data for `year`.
///
/// The current year (in `tz`) is queried at the current month, a closed year
/// at December. Future years have no data yet.
pub fn most_recent_applicable_month(year: i32, now: DateTime<Utc>, tz: Tz) -> ResultEngine<u32> {
    let local = now.with_timezone(&tz);
    match year.cmp(&local.year()) {
        std::cmp::Ordering::Equal => Ok(local.month()),
        std::cmp::Ordering::Greater => Err(EngineError::FutureYearRequested(year)),
        std::cmp::Ordering::Less => Ok(12),
    }
}

/// Validates an explicit month.
pub fn ensure_month(month: u32) -> ResultEngine<u32> {
    if (1..=12).contains(&month) {
        Ok(month)
    } else {
        Err(EngineError::InvalidMonth(month))
    }
}

/// Keeps only ASCII digits and `/`.
///
/// The external system formats note ids inconsistently (`00123/2024`,
/// `123 / 2024`, `NE 123/2024`); lookups and the snapshot key use this form.
pub fn normalize_note_id(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_digit() || *c == '/')
        .collect()
}

/// Normalizes `raw` and checks it ends with `/{year}`.
pub fn note_for_year(raw: &str, year: i32) -> ResultEngine<String> {
    let note_id = normalize_note_id(raw);
    let suffix = format!("/{year}");
    let number = note_id.strip_suffix(suffix.as_str()).unwrap_or_default();
    if number.is_empty() || number.contains('/') {
        return Err(EngineError::YearMismatch {
            note_id: raw.to_string(),
            year,
        });
    }
    Ok(note_id)
}

//! Parameter extraction from chat utterances.
//!
//! Turns phrases such as "geçen ay" or "\"ABC\" içeren" into the values that
//! fill a report template's `@date1`, `@date2` and `@search` placeholders.

use chrono::{Datelike, Duration, Months, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::normalize::normalize;

/// Parameters derived from an utterance. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedParameters {
    pub date1: Option<NaiveDate>,
    pub date2: Option<NaiveDate>,
    pub search: Option<String>,
}

impl ExtractedParameters {
    pub fn is_empty(&self) -> bool {
        self.date1.is_none() && self.date2.is_none() && self.search.is_none()
    }

    fn with_range(mut self, range: Option<(NaiveDate, NaiveDate)>) -> Self {
        if let Some((start, end)) = range {
            self.date1 = Some(start);
            self.date2 = Some(end);
        }
        self
    }
}

/// Relative period recognised in an utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelativePeriod {
    Today,
    Yesterday,
    ThisWeek,
    LastWeek,
    ThisMonth,
    LastMonth,
    LastThreeMonths,
    LastSixMonths,
    ThisYear,
    LastYear,
}

/// Checked in order; the first phrase found wins. Phrases are normalized.
const RELATIVE_PHRASES: &[(&str, RelativePeriod)] = &[
    ("bugun", RelativePeriod::Today),
    ("dun", RelativePeriod::Yesterday),
    ("bu hafta", RelativePeriod::ThisWeek),
    ("gecen hafta", RelativePeriod::LastWeek),
    ("bu ay", RelativePeriod::ThisMonth),
    ("gecen ay", RelativePeriod::LastMonth),
    ("son 3 ay", RelativePeriod::LastThreeMonths),
    ("son 6 ay", RelativePeriod::LastSixMonths),
    ("bu yil", RelativePeriod::ThisYear),
    ("gecen yil", RelativePeriod::LastYear),
];

/// Case endings a phrase may carry ("bugünkü", "dünden", "bu ayın").
/// Anything else glued to the phrase makes it a different word.
const PHRASE_SUFFIXES: &str = "deki|daki|teki|taki|den|dan|ten|tan|nin|nun|ki|ku|de|da|te|ta|in|un|e|a";

/// Each phrase bounded by word edges, its spaces matching any run of whitespace.
static RELATIVE_PATTERNS: LazyLock<Vec<(Regex, RelativePeriod)>> = LazyLock::new(|| {
    RELATIVE_PHRASES
        .iter()
        .map(|(phrase, period)| {
            let words: Vec<String> = phrase.split(' ').map(regex::escape).collect();
            let pattern = format!(r"\b{}(?:{})?\b", words.join(r"\s+"), PHRASE_SUFFIXES);
            (Regex::new(&pattern).expect("Invalid regex"), *period)
        })
        .collect()
});

impl RelativePeriod {
    /// Inclusive date range for this period relative to `today`.
    fn range(self, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
        let week_start = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
        let month_start = today.with_day(1)?;
        match self {
            RelativePeriod::Today => Some((today, today)),
            RelativePeriod::Yesterday => {
                let day = today.pred_opt()?;
                Some((day, day))
            }
            RelativePeriod::ThisWeek => Some((week_start, today)),
            RelativePeriod::LastWeek => {
                Some((week_start - Duration::days(7), week_start - Duration::days(1)))
            }
            RelativePeriod::ThisMonth => Some((month_start, today)),
            RelativePeriod::LastMonth => {
                let end = month_start.pred_opt()?;
                Some((end.with_day(1)?, end))
            }
            RelativePeriod::LastThreeMonths => {
                Some((today.checked_sub_months(Months::new(3))?, today))
            }
            RelativePeriod::LastSixMonths => {
                Some((today.checked_sub_months(Months::new(6))?, today))
            }
            RelativePeriod::ThisYear => Some((NaiveDate::from_ymd_opt(today.year(), 1, 1)?, today)),
            RelativePeriod::LastYear => year_range(today.year() - 1),
        }
    }
}

static YEAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(20\d{2})\b").expect("Invalid regex"));

/// Search-subject patterns, tried in order.
///
/// `(?i)` does not fold "İ" to "i", so "içeren" spells out `[iİ]` to accept
/// "İÇEREN" as well.
static SEARCH_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // "ABC" olan / 'ABC' içeren
        r#"(?i)["“'‘]([^"”'’]+)["”'’]\s*(?:olan|[iİ]çeren|geçen)"#,
        // containing ABC / içeren: ABC
        r#"(?i)(?:\bcontaining\s+|[iİ]çeren:\s*)["“']?([\p{L}\p{N}_\-]+)"#,
        // Ahmet adlı / Ahmet isimli (capitalisation is significant)
        r"(\p{Lu}[\p{L}\p{N}]*)\s+(?:adlı|isimli|adındaki)",
        // kalem içeren
        r"(?i)([\p{L}\p{N}_\-]+)\s+[iİ]çeren\b",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("Invalid regex"))
    .collect()
});

fn year_range(year: i32) -> Option<(NaiveDate, NaiveDate)> {
    Some((
        NaiveDate::from_ymd_opt(year, 1, 1)?,
        NaiveDate::from_ymd_opt(year, 12, 31)?,
    ))
}

fn relative_period(folded: &str) -> Option<RelativePeriod> {
    RELATIVE_PATTERNS
        .iter()
        .find(|(pattern, _)| pattern.is_match(folded))
        .map(|(_, period)| *period)
}

fn explicit_year(utterance: &str) -> Option<i32> {
    YEAR_PATTERN
        .captures(utterance)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Extract the search subject, if any pattern matches.
pub fn extract_search(utterance: &str) -> Option<String> {
    SEARCH_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures(utterance)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Extract the date range implied by an utterance.
pub fn extract_dates(utterance: &str, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let folded = normalize(utterance);
    match relative_period(&folded) {
        Some(period) => period.range(today),
        None => explicit_year(utterance).and_then(year_range),
    }
}

/// Extract all template parameters from an utterance.
///
/// Never fails; unrecognised input yields empty parameters.
pub fn extract(utterance: &str, today: NaiveDate) -> ExtractedParameters {
    ExtractedParameters {
        search: extract_search(utterance),
        ..Default::default()
    }
    .with_range(extract_dates(utterance, today))
}

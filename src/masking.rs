//! Detail masking for lower-privilege export.
//!
//! `details` is open-schema, so sensitive values are found by shape rather
//! than by key name. Each recognised substring is replaced in place; the rest
//! of the value is left alone.
//!
//! | Kind  | Example in             | Example out     |
//! |-------|------------------------|-----------------|
//! | Email | `bob@example.com`      | `b***@***.***`  |
//! | Phone | `+91 9876543210`       | `********10`    |
//!
//! Masked output is never redacted further, so masking is a
//! projection: `mask(&mask(d)) == mask(d)`.

use chrono::NaiveDate;
use regex::{Captures, Regex};
use std::sync::LazyLock;

use crate::audit::{Details, LogEntry};

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z0-9_%+-])[A-Za-z0-9._%+-]*@[A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)+")
        .expect("email pattern is valid")
});

static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\+?\(?\d(?:[\s.\-()]{0,2}\d)+").expect("phone pattern is valid")
});

const EMAIL_MASK: &str = "***@***.***";
const PHONE_MASK: &str = "********";
const PHONE_MIN_DIGITS: usize = 9;
const PHONE_MAX_DIGITS: usize = 15;
const PHONE_VISIBLE_DIGITS: usize = 2;

/// Kinds of sensitive value recognised in details
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensitiveKind {
    Email,
    Phone,
}

impl SensitiveKind {
    /// Emails go first: an address full of digits must not be read as a phone.
    pub const ALL: [SensitiveKind; 2] = [SensitiveKind::Email, SensitiveKind::Phone];

    /// Replace every occurrence of this kind in `text`
    pub fn redact(&self, text: &str) -> String {
        match self {
            SensitiveKind::Email => EMAIL
                .replace_all(text, |caps: &Captures| format!("{}{}", &caps[1], EMAIL_MASK))
                .into_owned(),
            SensitiveKind::Phone => PHONE
                .replace_all(text, |caps: &Captures| redact_phones(&caps[0]))
                .into_owned(),
        }
    }

    /// Whether `text` contains a value of this kind
    pub fn detect(&self, text: &str) -> bool {
        match self {
            SensitiveKind::Email => EMAIL.is_match(text),
            SensitiveKind::Phone => PHONE
                .find_iter(text)
                .any(|m| redact_phones(m.as_str()) != m.as_str()),
        }
    }
}

/// Mask every phone number inside one pattern match.
///
/// A match can run several numbers (and dates) together, e.g.
/// `555-123-4567 555-987-6543`, so it is cut at whitespace into chunks.
/// Consecutive chunks are grouped while the group stays within the phone
/// digit limit; a date chunk always ends a group and is kept as is. Groups
/// with too few digits are left alone.
fn redact_phones(run: &str) -> String {
    let mut out = String::with_capacity(run.len());
    let mut cursor = 0;
    let mut group: Option<PhoneGroup> = None;

    for (start, end) in chunk_spans(run) {
        let chunk = &run[start..end];
        if is_date(chunk) {
            push_group(&mut out, &mut cursor, run, group.take());
            continue;
        }

        let digits = count_digits(chunk);
        group = match group {
            Some(g) if g.digits + digits <= PHONE_MAX_DIGITS => Some(PhoneGroup {
                end,
                digits: g.digits + digits,
                ..g
            }),
            previous => {
                push_group(&mut out, &mut cursor, run, previous);
                Some(PhoneGroup { start, end, digits })
            }
        };
    }

    push_group(&mut out, &mut cursor, run, group);
    out.push_str(&run[cursor..]);
    out
}

#[derive(Clone, Copy)]
struct PhoneGroup {
    start: usize,
    end: usize,
    digits: usize,
}

/// Copy text up to `group` and its redaction, if `group` is a phone number
fn push_group(out: &mut String, cursor: &mut usize, run: &str, group: Option<PhoneGroup>) {
    let Some(group) = group else {
        return;
    };
    if !(PHONE_MIN_DIGITS..=PHONE_MAX_DIGITS).contains(&group.digits) {
        return;
    }

    let number = &run[group.start..group.end];
    let digits: Vec<char> = number.chars().filter(char::is_ascii_digit).collect();
    let tail: String = digits[digits.len() - PHONE_VISIBLE_DIGITS..].iter().collect();

    out.push_str(&run[*cursor..group.start]);
    out.push_str(PHONE_MASK);
    out.push_str(&tail);
    *cursor = group.end;
}

/// Byte ranges of the whitespace-separated chunks of `text`
fn chunk_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;

    for (i, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push((s, i));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

fn count_digits(text: &str) -> usize {
    text.chars().filter(char::is_ascii_digit).count()
}

/// `2024-01-31` has enough digits to pass for part of a phone number.
fn is_date(chunk: &str) -> bool {
    let trimmed = chunk.trim_matches(|c: char| matches!(c, '(' | ')' | '.' | '-'));
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").is_ok()
}

/// Mask a single value
pub fn mask_value(value: &str) -> String {
    SensitiveKind::ALL
        .iter()
        .fold(value.to_string(), |text, kind| kind.redact(&text))
}

/// Masked copy of `details`; keys are kept, values redacted
pub fn mask(details: &Details) -> Details {
    details
        .iter()
        .map(|(key, value)| (key.clone(), mask_value(value)))
        .collect()
}

/// Copy of `entry` with masked details.
///
/// Every other field, hashes included, is carried over untouched; they are
/// what a reader checks the chain against.
pub fn mask_entry(entry: &LogEntry) -> LogEntry {
    LogEntry {
        details: mask(&entry.details),
        ..entry.clone()
    }
}

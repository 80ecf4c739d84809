//! Normalization of the raw time-entry and budget feeds.
//!
//! Both feeds are headerless and positional. Anomalies in individual fields
//! degrade to `None`; the order-number pattern is the only filter that
//! rejects a whole row.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDateTime;
use csv::{ByteRecord, ReaderBuilder};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::FeedError;
use crate::models::{BudgetRecord, BudgetStatus, EntryType, TimeEntry};

static ORDER_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{6}[A-Za-z]?$").expect("order number pattern is valid"));

pub const ENTRY_TIMESTAMP_FORMAT: &str = "%d/%m/%Y-%H:%M";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Utf8,
    Latin1,
}

/// Records that survived normalization plus what was discarded on the way.
#[derive(Debug, Clone)]
pub struct Normalized<T> {
    pub records: Vec<T>,
    pub read: usize,
    pub missing_key: usize,
    pub invalid_order: usize,
}

pub fn is_valid_order_number(value: &str) -> bool {
    ORDER_NUMBER.is_match(value)
}

/// Parses a number written with `.` as thousands separator and `,` as
/// decimal point, e.g. `1.234,5`.
pub fn parse_locale_decimal(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().replace('.', "").replace(',', ".");
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parses a number whose only convention is `,` as decimal point. Dots are
/// left in place.
pub fn parse_comma_decimal(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().replace(',', ".");
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn parse_locale_integer(raw: &str) -> Option<u64> {
    raw.trim().replace('.', "").parse::<u64>().ok()
}

fn parse_locale_quantity(raw: &str) -> Option<u64> {
    parse_locale_decimal(raw)
        .filter(|v| *v >= 0.0)
        .map(|v| v.trunc() as u64)
}

pub fn parse_entry_timestamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), ENTRY_TIMESTAMP_FORMAT).ok()
}

/// The stage column carries a prefixed code; its last three characters are
/// the stage number. Unparsable stages become 0.
fn parse_entry_stage(raw: &str) -> u32 {
    let chars: Vec<char> = raw.trim().chars().collect();
    let start = chars.len().saturating_sub(3);
    chars[start..]
        .iter()
        .collect::<String>()
        .parse::<u32>()
        .unwrap_or(0)
}

fn decode(bytes: &[u8], encoding: Encoding) -> String {
    match encoding {
        Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        // Latin-1 code points map one to one onto the first 256 of Unicode.
        Encoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
    }
}

fn field(record: &ByteRecord, index: usize, encoding: Encoding) -> Option<String> {
    let value = decode(record.get(index)?, encoding);
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn read_records<R: Read>(
    reader: R,
    delimiter: u8,
    feed: &'static str,
) -> Result<Vec<ByteRecord>, FeedError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(reader);

    let mut records = Vec::new();
    for (idx, result) in reader.byte_records().enumerate() {
        let record = result.map_err(|source| FeedError::Read {
            feed,
            record: idx + 1,
            source,
        })?;
        // Blank lines carry no data at all
        if record.iter().all(|f| f.iter().all(u8::is_ascii_whitespace)) {
            continue;
        }
        records.push(record);
    }
    Ok(records)
}

fn open(path: &Path) -> Result<File, FeedError> {
    File::open(path).map_err(|source| FeedError::Open {
        path: path.to_path_buf(),
        source,
    })
}

fn time_entry_from_record(record: &ByteRecord) -> Option<TimeEntry> {
    let text = |idx| field(record, idx, Encoding::Utf8);

    let order_number = text(1)?;
    let equipment_number = text(4)?;

    Some(TimeEntry {
        order_number,
        stage: text(2).map(|s| parse_entry_stage(&s)).unwrap_or(0),
        equipment_number,
        equipment_name: text(5),
        entry_type: EntryType::from_feed(text(6).as_deref()),
        employee_name: text(8),
        expected_quantity: text(9).and_then(|s| parse_locale_quantity(&s)),
        started_at: text(10).and_then(|s| parse_entry_timestamp(&s)),
        ended_at: text(11).and_then(|s| parse_entry_timestamp(&s)),
        elapsed_minutes: text(12).and_then(|s| parse_comma_decimal(&s)),
        produced_quantity: text(13).and_then(|s| parse_locale_integer(&s)),
    })
}

fn budget_from_record(record: &ByteRecord) -> Option<BudgetRecord> {
    let text = |idx| field(record, idx, Encoding::Latin1);

    let order_number = text(0)?;

    Some(BudgetRecord {
        order_number,
        stage: text(1).and_then(|s| s.parse::<u32>().ok()),
        status: BudgetStatus::from_feed(text(18).as_deref()),
        budgeted_setup: text(7).and_then(|s| parse_comma_decimal(&s)),
        budgeted_production: text(9).and_then(|s| parse_locale_decimal(&s)),
        budgeted_quantity: text(21).and_then(|s| parse_locale_decimal(&s)),
    })
}

fn normalize<T>(
    records: Vec<ByteRecord>,
    convert: impl Fn(&ByteRecord) -> Option<T>,
    order_of: impl Fn(&T) -> &str,
) -> Normalized<T> {
    let read = records.len();
    let keyed: Vec<T> = records.iter().filter_map(convert).collect();
    let missing_key = read - keyed.len();

    let valid: Vec<T> = keyed
        .into_iter()
        .filter(|record| is_valid_order_number(order_of(record)))
        .collect();
    let invalid_order = read - missing_key - valid.len();

    Normalized {
        records: valid,
        read,
        missing_key,
        invalid_order,
    }
}

/// Reads the comma-delimited, 18-column time-entry feed.
pub fn read_time_entries<R: Read>(reader: R) -> Result<Normalized<TimeEntry>, FeedError> {
    let records = read_records(reader, b',', "time entry")?;
    let normalized = normalize(records, time_entry_from_record, |e| e.order_number.as_str());
    debug!(
        read = normalized.read,
        kept = normalized.records.len(),
        missing_key = normalized.missing_key,
        invalid_order = normalized.invalid_order,
        "normalized time entries"
    );
    Ok(normalized)
}

/// Reads the tab-delimited, Latin-1 encoded, 28-column budget feed.
pub fn read_budget_records<R: Read>(reader: R) -> Result<Normalized<BudgetRecord>, FeedError> {
    let records = read_records(reader, b'\t', "budget")?;
    let normalized = normalize(records, budget_from_record, |b| b.order_number.as_str());
    debug!(
        read = normalized.read,
        kept = normalized.records.len(),
        missing_key = normalized.missing_key,
        invalid_order = normalized.invalid_order,
        "normalized budget records"
    );
    Ok(normalized)
}

pub fn read_time_entries_path(path: &Path) -> Result<Normalized<TimeEntry>, FeedError> {
    read_time_entries(open(path)?)
}

pub fn read_budget_records_path(path: &Path) -> Result<Normalized<BudgetRecord>, FeedError> {
    read_budget_records(open(path)?)
}

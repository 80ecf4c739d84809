use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryType {
    Idle,
    Setup,
    Production,
    Other(String),
}

impl EntryType {
    /// Maps the feed's entry-type column, accepting both the Portuguese
    /// labels written by the shop-floor terminals and the English ones.
    pub fn from_feed(raw: Option<&str>) -> Self {
        match raw {
            Some("Ocioso") | Some("Idle") => EntryType::Idle,
            Some("Acerto") | Some("Setup") => EntryType::Setup,
            Some("Produção") | Some("Production") => EntryType::Production,
            Some(other) => EntryType::Other(other.to_string()),
            None => EntryType::Other(String::new()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BudgetStatus {
    Completed,
    Other(String),
}

impl BudgetStatus {
    pub fn from_feed(raw: Option<&str>) -> Self {
        match raw {
            Some("Concluído") | Some("Completed") => BudgetStatus::Completed,
            Some(other) => BudgetStatus::Other(other.to_string()),
            None => BudgetStatus::Other(String::new()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ShiftLabel {
    Shift1,
    Shift2,
    Shift3,
    NoRecord,
}

impl ShiftLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShiftLabel::Shift1 => "Shift1",
            ShiftLabel::Shift2 => "Shift2",
            ShiftLabel::Shift3 => "Shift3",
            ShiftLabel::NoRecord => "NoRecord",
        }
    }
}

impl fmt::Display for ShiftLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShiftLabel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "Shift1" | "1" | "1 Turno" => Ok(ShiftLabel::Shift1),
            "Shift2" | "2" | "2 Turno" => Ok(ShiftLabel::Shift2),
            "Shift3" | "3" | "3 Turno" => Ok(ShiftLabel::Shift3),
            "NoRecord" | "Sem Registro" => Ok(ShiftLabel::NoRecord),
            other => Err(format!("unknown shift label: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimeEntry {
    pub order_number: String,
    pub stage: u32,
    pub equipment_number: String,
    pub equipment_name: Option<String>,
    pub entry_type: EntryType,
    pub employee_name: Option<String>,
    pub expected_quantity: Option<u64>,
    pub started_at: Option<NaiveDateTime>,
    pub ended_at: Option<NaiveDateTime>,
    pub elapsed_minutes: Option<f64>,
    pub produced_quantity: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct BudgetRecord {
    pub order_number: String,
    pub stage: Option<u32>,
    pub status: BudgetStatus,
    pub budgeted_setup: Option<f64>,
    pub budgeted_production: Option<f64>,
    pub budgeted_quantity: Option<f64>,
}

/// One order worked by one employee on one calculation date, restricted to
/// press operations.
#[derive(Debug, Clone)]
pub struct GoldHourRecord {
    pub order_number: String,
    pub employee_name: String,
    pub calculation_date: NaiveDate,
    pub equipment_name: Option<String>,
    pub started_at: Option<NaiveDateTime>,
    pub ended_at: NaiveDateTime,
    pub budgeted_setup: f64,
    pub budgeted_production: f64,
    pub max_expected_quantity: Option<u64>,
    pub produced_quantity: u64,
    pub realized_setup: f64,
    pub realized_production: f64,
    pub total_produced: u64,
    pub capped_production: f64,
    pub real_expected_production: f64,
    pub gold_hour_setup: f64,
    pub gold_hour_production: f64,
    pub gold_hour_total: f64,
    pub target_setup: f64,
    pub target_production: f64,
    pub target_total: f64,
    pub duration_minutes: Option<f64>,
    pub shift: ShiftLabel,
    pub completion_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyAggregate {
    pub employee_name: String,
    pub completion_date: NaiveDate,
    pub equipment_name: String,
    pub gold_hour_total: f64,
    pub target_total: f64,
    pub gold_hour_production: f64,
    pub gold_hour_setup: f64,
    pub target_production: f64,
    pub target_setup: f64,
    pub budgeted_setup: f64,
    pub real_expected_production: f64,
    pub shifts: BTreeSet<ShiftLabel>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CumulativeRecord {
    pub completion_date: NaiveDate,
    pub equipment_name: String,
    pub gold_hour: f64,
    pub gold_hour_cumulative: f64,
    pub gold_hour_target: f64,
    pub gold_hour_target_cumulative: f64,
    pub shifts: Vec<ShiftLabel>,
}

/// Counters for every record a run read, discarded or produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub entries_read: usize,
    pub entries_missing_key: usize,
    pub entries_invalid_order: usize,
    pub budgets_read: usize,
    pub budgets_missing_key: usize,
    pub budgets_invalid_order: usize,
    pub orphaned_entries: usize,
    pub orphaned_budgets: usize,
    pub ungroupable_entries: usize,
    pub unproductive_groups: usize,
    pub records_without_equipment: usize,
    pub gold_hour_records: usize,
    pub daily_rows: usize,
    pub cumulative_rows: usize,
}

#[derive(Debug, Clone)]
pub struct EquipmentMonthSummary {
    pub equipment_name: String,
    pub year: i32,
    pub month: u32,
    pub days: usize,
    pub gold_hour: f64,
    pub gold_hour_target: f64,
    pub attainment: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregateRow {
    pub completion_date: NaiveDate,
    pub gold_hour: f64,
    pub gold_hour_cumulative: f64,
    pub gold_hour_target: f64,
    pub gold_hour_target_cumulative: f64,
}

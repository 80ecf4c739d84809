use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDate};

use crate::allocate::round3;
use crate::models::{CumulativeRecord, DailyAggregate, ShiftLabel};

#[derive(Default)]
struct DayTotals {
    gold_hour: f64,
    target: f64,
    shifts: BTreeSet<ShiftLabel>,
}

/// Month-to-date running totals per equipment. The running sums restart on
/// the first day each (equipment, month) pair appears.
pub fn accumulate(rows: &[DailyAggregate]) -> Vec<CumulativeRecord> {
    let mut days: BTreeMap<(String, NaiveDate), DayTotals> = BTreeMap::new();
    for row in rows {
        let day = days
            .entry((row.equipment_name.clone(), row.completion_date))
            .or_default();
        day.gold_hour += row.gold_hour_total;
        day.target += row.target_total;
        day.shifts.extend(row.shifts.iter().copied());
    }

    let mut output = Vec::with_capacity(days.len());
    let mut current: Option<(String, i32, u32)> = None;
    let mut running_gold_hour = 0.0;
    let mut running_target = 0.0;

    for ((equipment, date), day) in days {
        let month = (equipment.clone(), date.year(), date.month());
        if current.as_ref() != Some(&month) {
            running_gold_hour = 0.0;
            running_target = 0.0;
            current = Some(month);
        }
        running_gold_hour += day.gold_hour;
        running_target += day.target;

        output.push(CumulativeRecord {
            completion_date: date,
            equipment_name: equipment,
            gold_hour: round3(day.gold_hour),
            gold_hour_cumulative: round3(running_gold_hour),
            gold_hour_target: round3(day.target),
            gold_hour_target_cumulative: round3(running_target),
            shifts: day.shifts.into_iter().collect(),
        });
    }

    output
}

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use crate::models::{DailyAggregate, GoldHourRecord};

#[derive(Debug, Clone, Default)]
pub struct DailyAggregation {
    pub rows: Vec<DailyAggregate>,
    pub records_without_equipment: usize,
}

/// Sums gold-hour records per (employee, completion date, equipment).
pub fn aggregate_daily(records: &[GoldHourRecord]) -> DailyAggregation {
    let mut map: BTreeMap<(String, NaiveDate, String), DailyAggregate> = BTreeMap::new();
    let mut records_without_equipment = 0usize;

    for record in records {
        let Some(equipment) = record.equipment_name.as_ref() else {
            records_without_equipment += 1;
            continue;
        };

        let key = (
            record.employee_name.clone(),
            record.completion_date,
            equipment.clone(),
        );
        let row = map.entry(key).or_insert_with(|| DailyAggregate {
            employee_name: record.employee_name.clone(),
            completion_date: record.completion_date,
            equipment_name: equipment.clone(),
            gold_hour_total: 0.0,
            target_total: 0.0,
            gold_hour_production: 0.0,
            gold_hour_setup: 0.0,
            target_production: 0.0,
            target_setup: 0.0,
            budgeted_setup: 0.0,
            real_expected_production: 0.0,
            shifts: BTreeSet::new(),
        });

        row.gold_hour_total += record.gold_hour_total;
        row.target_total += record.target_total;
        row.gold_hour_production += record.gold_hour_production;
        row.gold_hour_setup += record.gold_hour_setup;
        row.target_production += record.target_production;
        row.target_setup += record.target_setup;
        row.budgeted_setup += record.budgeted_setup;
        row.real_expected_production += record.real_expected_production;
        row.shifts.insert(record.shift);
    }

    DailyAggregation {
        rows: map.into_values().collect(),
        records_without_equipment,
    }
}

use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::Datelike;

use crate::models::{CumulativeRecord, EquipmentMonthSummary, RunStats};

pub fn summarize_by_equipment(records: &[CumulativeRecord]) -> Vec<EquipmentMonthSummary> {
    let mut map: BTreeMap<(String, i32, u32), (usize, f64, f64)> = BTreeMap::new();

    for record in records {
        let key = (
            record.equipment_name.clone(),
            record.completion_date.year(),
            record.completion_date.month(),
        );
        let entry = map.entry(key).or_insert((0, 0.0, 0.0));
        entry.0 += 1;
        entry.1 += record.gold_hour;
        entry.2 += record.gold_hour_target;
    }

    map.into_iter()
        .map(
            |((equipment_name, year, month), (days, gold_hour, gold_hour_target))| {
                EquipmentMonthSummary {
                    equipment_name,
                    year,
                    month,
                    days,
                    gold_hour,
                    gold_hour_target,
                    attainment: if gold_hour_target == 0.0 {
                        0.0
                    } else {
                        gold_hour / gold_hour_target
                    },
                }
            },
        )
        .collect()
}

pub fn build_report(machine: Option<&str>, records: &[CumulativeRecord], stats: &RunStats) -> String {
    let records: Vec<CumulativeRecord> = records
        .iter()
        .filter(|r| machine.map_or(true, |m| r.equipment_name == m))
        .cloned()
        .collect();
    let summaries = summarize_by_equipment(&records);

    let mut output = String::new();
    let scope = machine.unwrap_or("all equipment");

    let _ = writeln!(output, "# Gold Hour Report");
    match (records.iter().map(|r| r.completion_date).min(), records.iter().map(|r| r.completion_date).max()) {
        (Some(first), Some(last)) => {
            let _ = writeln!(output, "Generated for {} (completions from {} to {})", scope, first, last);
        }
        _ => {
            let _ = writeln!(output, "Generated for {}", scope);
        }
    }
    let _ = writeln!(output);
    let _ = writeln!(output, "## Month to Date");

    if summaries.is_empty() {
        let _ = writeln!(output, "No gold hours recorded for this run.");
    } else {
        for summary in &summaries {
            let _ = writeln!(
                output,
                "- {} {:04}-{:02}: {:.3} of {:.3} target ({:.1}%) over {} days",
                summary.equipment_name,
                summary.year,
                summary.month,
                summary.gold_hour,
                summary.gold_hour_target,
                summary.attainment * 100.0,
                summary.days
            );
        }
    }

    let mut best_days = records.clone();
    best_days.sort_by(|a, b| {
        b.gold_hour
            .partial_cmp(&a.gold_hour)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let _ = writeln!(output);
    let _ = writeln!(output, "## Best Days");

    if best_days.is_empty() {
        let _ = writeln!(output, "No gold hours recorded for this run.");
    } else {
        for record in best_days.iter().take(5) {
            let _ = writeln!(
                output,
                "- {} on {}: {:.3} (target {:.3})",
                record.equipment_name, record.completion_date, record.gold_hour, record.gold_hour_target
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Discarded Records");
    let _ = writeln!(
        output,
        "- Time entries: {} read, {} missing order or equipment, {} invalid order number",
        stats.entries_read, stats.entries_missing_key, stats.entries_invalid_order
    );
    let _ = writeln!(
        output,
        "- Budgets: {} read, {} missing order, {} invalid order number",
        stats.budgets_read, stats.budgets_missing_key, stats.budgets_invalid_order
    );
    let _ = writeln!(
        output,
        "- Press entries without a completed budget: {}",
        stats.orphaned_entries
    );
    let _ = writeln!(
        output,
        "- Completed press budgets without entries: {}",
        stats.orphaned_budgets
    );
    let _ = writeln!(
        output,
        "- Entries without employee or end time: {}",
        stats.ungroupable_entries
    );
    let _ = writeln!(
        output,
        "- Groups of orders with no production: {}",
        stats.unproductive_groups
    );
    let _ = writeln!(
        output,
        "- Records without equipment name: {}",
        stats.records_without_equipment
    );

    output
}

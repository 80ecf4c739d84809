//! Gold hour batch computation over one snapshot of both feeds.

use std::io::Read;
use std::path::Path;

use tracing::{info, info_span};

use crate::aggregate::aggregate_daily;
use crate::allocate::allocate;
use crate::cumulative::accumulate;
use crate::error::FeedError;
use crate::models::{BudgetRecord, CumulativeRecord, DailyAggregate, GoldHourRecord, RunStats, TimeEntry};
use crate::normalize::{self, Normalized};

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub gold_hours: Vec<GoldHourRecord>,
    pub daily: Vec<DailyAggregate>,
    pub cumulative: Vec<CumulativeRecord>,
    pub stats: RunStats,
}

pub fn run<E: Read, B: Read>(entries: E, budgets: B) -> Result<PipelineOutput, FeedError> {
    let entries = normalize::read_time_entries(entries)?;
    let budgets = normalize::read_budget_records(budgets)?;
    Ok(compute(entries, budgets))
}

pub fn run_files(entries: &Path, budgets: &Path) -> Result<PipelineOutput, FeedError> {
    let span = info_span!("run_files", entries = %entries.display(), budgets = %budgets.display());
    let _guard = span.enter();

    let entries = normalize::read_time_entries_path(entries)?;
    let budgets = normalize::read_budget_records_path(budgets)?;
    Ok(compute(entries, budgets))
}

pub fn compute(entries: Normalized<TimeEntry>, budgets: Normalized<BudgetRecord>) -> PipelineOutput {
    let allocation = allocate(&entries.records, &budgets.records);
    let daily = aggregate_daily(&allocation.records);
    let cumulative = accumulate(&daily.rows);

    let stats = RunStats {
        entries_read: entries.read,
        entries_missing_key: entries.missing_key,
        entries_invalid_order: entries.invalid_order,
        budgets_read: budgets.read,
        budgets_missing_key: budgets.missing_key,
        budgets_invalid_order: budgets.invalid_order,
        orphaned_entries: allocation.orphaned_entries,
        orphaned_budgets: allocation.orphaned_budgets,
        ungroupable_entries: allocation.ungroupable_entries,
        unproductive_groups: allocation.unproductive_groups,
        records_without_equipment: daily.records_without_equipment,
        gold_hour_records: allocation.records.len(),
        daily_rows: daily.rows.len(),
        cumulative_rows: cumulative.len(),
    };

    info!(
        entries_read = stats.entries_read,
        budgets_read = stats.budgets_read,
        invalid_orders = stats.entries_invalid_order + stats.budgets_invalid_order,
        orphaned_entries = stats.orphaned_entries,
        orphaned_budgets = stats.orphaned_budgets,
        gold_hour_records = stats.gold_hour_records,
        cumulative_rows = stats.cumulative_rows,
        "gold hour run computed"
    );

    PipelineOutput {
        gold_hours: allocation.records,
        daily: daily.rows,
        cumulative,
        stats,
    }
}

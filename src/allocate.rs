//! Allocation of budgeted press time to the employees and days that
//! consumed it.
//!
//! Time entries are joined to completed budgets on order number and grouped
//! by (order, employee, end date). Each order's budget is then handed out
//! to its groups: whole when the order has a single group, in proportion to
//! realized minutes otherwise. A parallel "target" split always prorates.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{NaiveDate, NaiveDateTime};
use tracing::debug;

use crate::models::{BudgetRecord, BudgetStatus, EntryType, GoldHourRecord, TimeEntry};
use crate::shift;

pub const PRESS_STAGE: u32 = 201;
/// Production above plan is credited up to this factor of the expected quantity.
pub const OVERRUN_ALLOWANCE: f64 = 1.10;

#[derive(Debug, Clone, Default)]
pub struct Allocation {
    pub records: Vec<GoldHourRecord>,
    pub orphaned_entries: usize,
    pub orphaned_budgets: usize,
    pub ungroupable_entries: usize,
    pub unproductive_groups: usize,
}

pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

fn max_f64(current: Option<f64>, candidate: Option<f64>) -> Option<f64> {
    match (current, candidate) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

type GroupKey = (String, String, NaiveDate);

#[derive(Debug, Clone)]
struct Group {
    equipment_name: Option<String>,
    started_at: Option<NaiveDateTime>,
    ended_at: NaiveDateTime,
    budgeted_setup: Option<f64>,
    budgeted_production: Option<f64>,
    max_expected_quantity: Option<u64>,
    produced_quantity: Option<u64>,
    realized_setup: f64,
    realized_production: f64,
}

impl Group {
    fn new(ended_at: NaiveDateTime) -> Self {
        Self {
            equipment_name: None,
            started_at: None,
            ended_at,
            budgeted_setup: None,
            budgeted_production: None,
            max_expected_quantity: None,
            produced_quantity: None,
            realized_setup: 0.0,
            realized_production: 0.0,
        }
    }

    fn absorb(
        &mut self,
        entry: &TimeEntry,
        ended_at: NaiveDateTime,
        budget: &BudgetRecord,
        max_expected: Option<u64>,
    ) {
        if self.equipment_name.is_none() {
            self.equipment_name = entry.equipment_name.clone();
        }
        self.started_at = self.started_at.max(entry.started_at);
        self.ended_at = self.ended_at.max(ended_at);
        self.budgeted_setup = max_f64(self.budgeted_setup, budget.budgeted_setup);
        self.budgeted_production = max_f64(self.budgeted_production, budget.budgeted_production);
        self.max_expected_quantity = self.max_expected_quantity.max(max_expected);
        self.produced_quantity = self.produced_quantity.max(entry.produced_quantity);

        let elapsed = entry.elapsed_minutes.unwrap_or(0.0);
        match entry.entry_type {
            EntryType::Setup => self.realized_setup += elapsed,
            EntryType::Production => self.realized_production += elapsed,
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Default)]
struct OrderTotals {
    groups: usize,
    total_produced: u64,
    realized_setup: f64,
    realized_production: f64,
    /// Sums of the per-group realized minutes after rounding; the target
    /// split prorates on these.
    rounded_setup: f64,
    rounded_production: f64,
    max_budgeted_setup: f64,
    max_budgeted_production: f64,
}

fn is_press_entry(entry: &TimeEntry) -> bool {
    entry.entry_type != EntryType::Idle && entry.stage == PRESS_STAGE
}

fn is_press_budget(budget: &BudgetRecord) -> bool {
    budget.status == BudgetStatus::Completed && budget.stage == Some(PRESS_STAGE)
}

/// Highest expected quantity seen per order across every entry, regardless
/// of stage or entry type.
fn max_expected_by_order(entries: &[TimeEntry]) -> HashMap<&str, u64> {
    let mut max_expected: HashMap<&str, u64> = HashMap::new();
    for entry in entries {
        if let Some(quantity) = entry.expected_quantity {
            let slot = max_expected.entry(entry.order_number.as_str()).or_insert(quantity);
            *slot = (*slot).max(quantity);
        }
    }
    max_expected
}

pub fn allocate(entries: &[TimeEntry], budgets: &[BudgetRecord]) -> Allocation {
    let mut allocation = Allocation::default();
    let max_expected = max_expected_by_order(entries);

    let mut budgets_by_order: HashMap<&str, Vec<&BudgetRecord>> = HashMap::new();
    for budget in budgets.iter().filter(|b| is_press_budget(b)) {
        budgets_by_order
            .entry(budget.order_number.as_str())
            .or_default()
            .push(budget);
    }

    let press_entries: Vec<&TimeEntry> = entries.iter().filter(|e| is_press_entry(e)).collect();
    let entry_orders: HashSet<&str> = press_entries.iter().map(|e| e.order_number.as_str()).collect();
    allocation.orphaned_budgets = budgets_by_order
        .iter()
        .filter(|(order, _)| !entry_orders.contains(*order))
        .map(|(_, matched)| matched.len())
        .sum();

    let mut groups: BTreeMap<GroupKey, Group> = BTreeMap::new();
    for entry in press_entries {
        let Some(matched) = budgets_by_order.get(entry.order_number.as_str()) else {
            allocation.orphaned_entries += 1;
            continue;
        };
        let (Some(employee), Some(ended_at)) = (entry.employee_name.as_ref(), entry.ended_at) else {
            allocation.ungroupable_entries += 1;
            continue;
        };

        let key = (entry.order_number.clone(), employee.clone(), ended_at.date());
        let group = groups.entry(key).or_insert_with(|| Group::new(ended_at));
        let order_max_expected = max_expected.get(entry.order_number.as_str()).copied();
        for budget in matched {
            group.absorb(entry, ended_at, budget, order_max_expected);
        }
    }

    let mut orders: HashMap<&str, OrderTotals> = HashMap::new();
    for ((order, _, _), group) in &groups {
        let totals = orders.entry(order.as_str()).or_default();
        totals.groups += 1;
        totals.total_produced = totals
            .total_produced
            .saturating_add(group.produced_quantity.unwrap_or(0));
        totals.realized_setup += group.realized_setup;
        totals.realized_production += group.realized_production;
        totals.rounded_setup += round3(group.realized_setup);
        totals.rounded_production += round3(group.realized_production);
        totals.max_budgeted_setup = totals
            .max_budgeted_setup
            .max(group.budgeted_setup.unwrap_or(0.0));
        totals.max_budgeted_production = totals
            .max_budgeted_production
            .max(group.budgeted_production.unwrap_or(0.0));
    }

    for ((order, employee, calculation_date), group) in &groups {
        let Some(totals) = orders.get(order.as_str()) else {
            continue;
        };
        if totals.total_produced == 0 {
            allocation.unproductive_groups += 1;
            continue;
        }
        let Some(completion_date) = shift::adjust_completion_date(Some(group.ended_at)) else {
            continue;
        };
        allocation.records.push(build_record(
            order,
            employee,
            *calculation_date,
            completion_date,
            group,
            totals,
        ));
    }

    debug!(
        records = allocation.records.len(),
        orphaned_entries = allocation.orphaned_entries,
        orphaned_budgets = allocation.orphaned_budgets,
        ungroupable_entries = allocation.ungroupable_entries,
        unproductive_groups = allocation.unproductive_groups,
        "allocated gold hours"
    );

    allocation
}

fn build_record(
    order: &str,
    employee: &str,
    calculation_date: NaiveDate,
    completion_date: NaiveDate,
    group: &Group,
    totals: &OrderTotals,
) -> GoldHourRecord {
    let budgeted_setup = group.budgeted_setup.unwrap_or(0.0);
    let budgeted_production = group.budgeted_production.unwrap_or(0.0);
    let total_produced = totals.total_produced as f64;

    let (capped_production, real_expected_production) = match group.max_expected_quantity {
        Some(max_expected) => {
            let max_expected = max_expected as f64;
            let capped = total_produced.min(max_expected * OVERRUN_ALLOWANCE);
            (capped, finite_or_zero(capped * budgeted_production / max_expected))
        }
        None => (total_produced, 0.0),
    };

    let (gold_hour_setup, gold_hour_production) = if totals.groups < 2 {
        (budgeted_setup, real_expected_production)
    } else {
        (
            finite_or_zero(budgeted_setup * (group.realized_setup / totals.realized_setup)),
            finite_or_zero(
                real_expected_production
                    * (group.realized_production / totals.realized_production),
            ),
        )
    };

    let gold_hour_setup = round3(gold_hour_setup);
    let gold_hour_production = round3(gold_hour_production);

    let realized_setup = round3(group.realized_setup);
    let realized_production = round3(group.realized_production);

    let target_setup = round3(finite_or_zero(
        totals.max_budgeted_setup * (realized_setup / totals.rounded_setup),
    ));
    let target_production = round3(finite_or_zero(
        totals.max_budgeted_production * (realized_production / totals.rounded_production),
    ));

    let duration_minutes = group
        .started_at
        .map(|start| (group.ended_at - start).num_seconds() as f64 / 60.0);

    GoldHourRecord {
        order_number: order.to_string(),
        employee_name: employee.to_string(),
        calculation_date,
        equipment_name: group.equipment_name.clone(),
        started_at: group.started_at,
        ended_at: group.ended_at,
        budgeted_setup,
        budgeted_production,
        max_expected_quantity: group.max_expected_quantity,
        produced_quantity: group.produced_quantity.unwrap_or(0),
        realized_setup,
        realized_production,
        total_produced: totals.total_produced,
        capped_production: round3(capped_production),
        real_expected_production: round3(real_expected_production),
        gold_hour_setup,
        gold_hour_production,
        gold_hour_total: gold_hour_setup + gold_hour_production,
        target_setup,
        target_production,
        target_total: target_setup + target_production,
        duration_minutes,
        shift: shift::classify_session(group.started_at, duration_minutes),
        completion_date,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::ShiftLabel;

    pub(crate) fn ts(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    pub(crate) fn entry(
        order: &str,
        employee: &str,
        entry_type: EntryType,
        start: NaiveDateTime,
        end: NaiveDateTime,
        elapsed: f64,
        produced: u64,
        expected: u64,
    ) -> TimeEntry {
        TimeEntry {
            order_number: order.to_string(),
            stage: PRESS_STAGE,
            equipment_number: "77".to_string(),
            equipment_name: Some("Heidelberg SM".to_string()),
            entry_type,
            employee_name: Some(employee.to_string()),
            expected_quantity: Some(expected),
            started_at: Some(start),
            ended_at: Some(end),
            elapsed_minutes: Some(elapsed),
            produced_quantity: Some(produced),
        }
    }

    pub(crate) fn budget(order: &str, setup: f64, production: f64) -> BudgetRecord {
        BudgetRecord {
            order_number: order.to_string(),
            stage: Some(PRESS_STAGE),
            status: BudgetStatus::Completed,
            budgeted_setup: Some(setup),
            budgeted_production: Some(production),
            budgeted_quantity: None,
        }
    }

    fn setup_of(allocation: &Allocation, employee: &str) -> f64 {
        allocation
            .records
            .iter()
            .find(|r| r.employee_name == employee)
            .map(|r| r.gold_hour_setup)
            .unwrap()
    }

    #[test]
    fn splits_budget_across_groups_by_realized_time() {
        let entries = vec![
            entry("123456A", "Ana", EntryType::Setup, ts(2, 8, 0), ts(2, 8, 10), 10.0, 500, 1000),
            entry("123456A", "Bruno", EntryType::Setup, ts(3, 8, 0), ts(3, 8, 30), 30.0, 500, 1000),
        ];
        let budgets = vec![budget("123456A", 60.0, 120.0)];

        let allocation = allocate(&entries, &budgets);
        assert_eq!(allocation.records.len(), 2);
        assert_eq!(setup_of(&allocation, "Ana"), 15.0);
        assert_eq!(setup_of(&allocation, "Bruno"), 45.0);
    }

    #[test]
    fn single_group_keeps_full_budget() {
        let entries = vec![entry(
            "654321", "Ana", EntryType::Setup, ts(2, 8, 0), ts(2, 9, 0), 5.0, 100, 100,
        )];
        let budgets = vec![budget("654321", 20.0, 50.0)];

        let allocation = allocate(&entries, &budgets);
        let record = &allocation.records[0];
        assert_eq!(record.gold_hour_setup, 20.0);
        assert_eq!(record.gold_hour_production, 50.0);
        assert_eq!(record.gold_hour_total, 70.0);
        // target always prorates; with no realized production the share is zero
        assert_eq!(record.target_setup, 20.0);
        assert_eq!(record.target_production, 0.0);
    }

    #[test]
    fn capped_production_rescales_expected_time() {
        let entries = vec![entry(
            "111111", "Ana", EntryType::Production, ts(2, 8, 0), ts(2, 10, 0), 120.0, 1500, 1000,
        )];
        let budgets = vec![budget("111111", 0.0, 100.0)];

        let record = &allocate(&entries, &budgets).records[0];
        assert_eq!(record.total_produced, 1500);
        assert_eq!(record.capped_production, 1100.0);
        assert_eq!(record.real_expected_production, 110.0);
        assert_eq!(record.gold_hour_production, 110.0);
        assert_eq!(record.target_production, 100.0);
    }

    #[test]
    fn zero_realized_time_allocates_zero() {
        let entries = vec![
            entry("222222", "Ana", EntryType::Production, ts(2, 8, 0), ts(2, 9, 0), 0.0, 10, 10),
            entry("222222", "Bruno", EntryType::Production, ts(3, 8, 0), ts(3, 9, 0), 0.0, 10, 10),
        ];
        let budgets = vec![budget("222222", 30.0, 60.0)];

        for record in allocate(&entries, &budgets).records {
            assert_eq!(record.gold_hour_setup, 0.0);
            assert_eq!(record.gold_hour_production, 0.0);
            assert_eq!(record.target_total, 0.0);
        }
    }

    #[test]
    fn groups_share_employee_and_end_date() {
        let entries = vec![
            entry("333333", "Ana", EntryType::Setup, ts(2, 8, 0), ts(2, 8, 20), 20.0, 0, 100),
            entry("333333", "Ana", EntryType::Production, ts(2, 9, 0), ts(2, 11, 0), 120.0, 80, 100),
            entry("333333", "Ana", EntryType::Production, ts(2, 13, 0), ts(2, 14, 0), 60.0, 40, 100),
        ];
        let budgets = vec![budget("333333", 25.0, 200.0)];

        let allocation = allocate(&entries, &budgets);
        assert_eq!(allocation.records.len(), 1);
        let record = &allocation.records[0];
        assert_eq!(record.realized_setup, 20.0);
        assert_eq!(record.realized_production, 180.0);
        assert_eq!(record.produced_quantity, 80);
        assert_eq!(record.started_at, Some(ts(2, 13, 0)));
        assert_eq!(record.ended_at, ts(2, 14, 0));
        assert_eq!(record.duration_minutes, Some(60.0));
        assert_eq!(record.shift, ShiftLabel::NoRecord);
    }

    #[test]
    fn drops_idle_orphans_and_unproductive_orders() {
        let entries = vec![
            entry("444444", "Ana", EntryType::Idle, ts(2, 8, 0), ts(2, 9, 0), 60.0, 10, 10),
            entry("555555", "Ana", EntryType::Setup, ts(2, 8, 0), ts(2, 9, 0), 60.0, 10, 10),
            entry("666666", "Ana", EntryType::Setup, ts(2, 8, 0), ts(2, 9, 0), 60.0, 0, 10),
        ];
        let budgets = vec![
            budget("444444", 10.0, 10.0),
            budget("666666", 10.0, 10.0),
            budget("777777", 10.0, 10.0),
        ];

        let allocation = allocate(&entries, &budgets);
        assert!(allocation.records.is_empty());
        assert_eq!(allocation.orphaned_entries, 1);
        // 444444 only has idle time, 777777 has no entries at all
        assert_eq!(allocation.orphaned_budgets, 2);
        assert_eq!(allocation.unproductive_groups, 1);
    }

    #[test]
    fn incomplete_budgets_do_not_join() {
        let entries = vec![entry(
            "888888", "Ana", EntryType::Setup, ts(2, 8, 0), ts(2, 9, 0), 10.0, 10, 10,
        )];
        let mut open_budget = budget("888888", 10.0, 10.0);
        open_budget.status = BudgetStatus::Other("Em produção".to_string());

        let allocation = allocate(&entries, &[open_budget]);
        assert!(allocation.records.is_empty());
        assert_eq!(allocation.orphaned_entries, 1);
    }

    #[test]
    fn entries_without_employee_or_end_are_counted() {
        let mut no_employee = entry("999999", "Ana", EntryType::Setup, ts(2, 8, 0), ts(2, 9, 0), 10.0, 10, 10);
        no_employee.employee_name = None;
        let mut no_end = entry("999999", "Ana", EntryType::Setup, ts(2, 8, 0), ts(2, 9, 0), 10.0, 10, 10);
        no_end.ended_at = None;

        let allocation = allocate(&[no_employee, no_end], &[budget("999999", 10.0, 10.0)]);
        assert!(allocation.records.is_empty());
        assert_eq!(allocation.ungroupable_entries, 2);
    }

    #[test]
    fn overnight_group_completes_on_previous_day() {
        let entries = vec![entry(
            "121212", "Ana", EntryType::Setup, ts(3, 2, 50), ts(3, 3, 0), 10.0, 10, 10,
        )];
        let record = &allocate(&entries, &[budget("121212", 10.0, 10.0)]).records[0];
        assert_eq!(record.calculation_date, NaiveDate::from_ymd_opt(2024, 5, 3).unwrap());
        assert_eq!(record.completion_date, NaiveDate::from_ymd_opt(2024, 5, 2).unwrap());
        assert_eq!(record.shift, ShiftLabel::Shift3);
    }

    #[test]
    fn multi_group_allocation_partitions_budget() {
        let realized = [7.0, 11.0, 13.0];
        let entries: Vec<TimeEntry> = realized
            .iter()
            .enumerate()
            .map(|(i, minutes)| {
                let day = 2 + i as u32;
                entry("131313", "Ana", EntryType::Setup, ts(day, 8, 0), ts(day, 9, 0), *minutes, 10, 100)
            })
            .collect();

        let allocation = allocate(&entries, &[budget("131313", 50.0, 0.0)]);
        let total: f64 = allocation.records.iter().map(|r| r.gold_hour_setup).sum();
        assert!((total - 50.0).abs() <= 0.001 * realized.len() as f64);
        for record in &allocation.records {
            assert_eq!(record.gold_hour_total, record.gold_hour_setup + record.gold_hour_production);
            assert!(record.capped_production <= 100.0 * OVERRUN_ALLOWANCE + 0.0005);
        }
    }

    #[test]
    fn multi_group_production_prorates_capped_expected_time() {
        let entries = vec![
            entry("141414", "Ana", EntryType::Production, ts(2, 8, 0), ts(2, 8, 30), 30.0, 700, 1000),
            entry("141414", "Bruno", EntryType::Production, ts(3, 8, 0), ts(3, 9, 30), 90.0, 800, 1000),
        ];

        let allocation = allocate(&entries, &[budget("141414", 0.0, 200.0)]);
        assert_eq!(allocation.records.len(), 2);
        let ana = allocation.records.iter().find(|r| r.employee_name == "Ana").unwrap();
        let bruno = allocation.records.iter().find(|r| r.employee_name == "Bruno").unwrap();

        for record in [ana, bruno] {
            assert_eq!(record.total_produced, 1500);
            assert_eq!(record.capped_production, 1100.0);
            assert_eq!(record.real_expected_production, 220.0);
        }
        assert_eq!(ana.realized_production, 30.0);
        assert_eq!(bruno.realized_production, 90.0);
        assert_eq!(ana.gold_hour_production, 55.0);
        assert_eq!(bruno.gold_hour_production, 165.0);
        assert_eq!(ana.target_production, 50.0);
        assert_eq!(bruno.target_production, 150.0);
    }

    #[test]
    fn gold_hour_prorates_raw_minutes_and_target_rounded_minutes() {
        let entries = vec![
            entry("151515", "Ana", EntryType::Setup, ts(2, 8, 0), ts(2, 8, 1), 0.0004, 10, 100),
            entry("151515", "Bruno", EntryType::Setup, ts(3, 8, 0), ts(3, 8, 1), 0.0012, 10, 100),
        ];

        let allocation = allocate(&entries, &[budget("151515", 100.0, 0.0)]);
        let ana = allocation.records.iter().find(|r| r.employee_name == "Ana").unwrap();
        let bruno = allocation.records.iter().find(|r| r.employee_name == "Bruno").unwrap();

        assert_eq!(ana.gold_hour_setup, 25.0);
        assert_eq!(bruno.gold_hour_setup, 75.0);
        assert_eq!(ana.realized_setup, 0.0);
        assert_eq!(bruno.realized_setup, 0.001);
        assert_eq!(ana.target_setup, 0.0);
        assert_eq!(bruno.target_setup, 100.0);
    }

    #[test]
    fn produced_total_saturates_instead_of_overflowing() {
        let entries = vec![
            entry("161616", "Ana", EntryType::Setup, ts(2, 8, 0), ts(2, 9, 0), 10.0, u64::MAX, 100),
            entry("161616", "Bruno", EntryType::Setup, ts(3, 8, 0), ts(3, 9, 0), 10.0, 2, 100),
        ];

        let allocation = allocate(&entries, &[budget("161616", 20.0, 0.0)]);
        assert_eq!(allocation.records.len(), 2);
        for record in &allocation.records {
            assert_eq!(record.total_produced, u64::MAX);
            assert_eq!(record.capped_production, 110.0);
        }
    }
}

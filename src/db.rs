use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::models::{AggregateRow, CumulativeRecord, RunStats, ShiftLabel};

#[derive(Debug, Clone, Default)]
pub struct AggregateFilter {
    pub month: Option<u32>,
    pub machine: Option<String>,
    pub shift: Option<ShiftLabel>,
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Logs the run and replaces the persisted aggregate with its rows in one
/// transaction. Readers never observe a mix of two runs, and a failed run
/// leaves neither a run row nor a partial aggregate behind.
pub async fn replace_aggregate(
    pool: &PgPool,
    run_id: Uuid,
    computed_at: DateTime<Utc>,
    stats: &RunStats,
    records: &[CumulativeRecord],
) -> anyhow::Result<u64> {
    let mut tx = pool.begin().await?;

    record_run(&mut *tx, run_id, computed_at, stats).await?;

    sqlx::query("DELETE FROM gold_hour.aggregate_data")
        .execute(&mut *tx)
        .await?;

    let mut inserted = 0u64;
    for record in records {
        let shifts: Vec<String> = record.shifts.iter().map(|s| s.as_str().to_string()).collect();
        let result = sqlx::query(
            r#"
            INSERT INTO gold_hour.aggregate_data
            (completion_date, equipment_name, gold_hour, gold_hour_cumulative,
             gold_hour_target, gold_hour_target_cumulative, shifts, run_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.completion_date)
        .bind(&record.equipment_name)
        .bind(record.gold_hour)
        .bind(record.gold_hour_cumulative)
        .bind(record.gold_hour_target)
        .bind(record.gold_hour_target_cumulative)
        .bind(shifts)
        .bind(run_id)
        .execute(&mut *tx)
        .await?;

        inserted += result.rows_affected();
    }

    tx.commit().await?;
    Ok(inserted)
}

async fn record_run(
    conn: &mut PgConnection,
    run_id: Uuid,
    computed_at: DateTime<Utc>,
    stats: &RunStats,
) -> anyhow::Result<()> {
    let count = |value: usize| i64::try_from(value).unwrap_or(i64::MAX);

    sqlx::query(
        r#"
        INSERT INTO gold_hour.runs
        (id, computed_at, entries_read, entries_missing_key, entries_invalid_order,
         budgets_read, budgets_missing_key, budgets_invalid_order, orphaned_entries,
         orphaned_budgets, ungroupable_entries, unproductive_groups,
         records_without_equipment, gold_hour_records, cumulative_rows)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        "#,
    )
    .bind(run_id)
    .bind(computed_at)
    .bind(count(stats.entries_read))
    .bind(count(stats.entries_missing_key))
    .bind(count(stats.entries_invalid_order))
    .bind(count(stats.budgets_read))
    .bind(count(stats.budgets_missing_key))
    .bind(count(stats.budgets_invalid_order))
    .bind(count(stats.orphaned_entries))
    .bind(count(stats.orphaned_budgets))
    .bind(count(stats.ungroupable_entries))
    .bind(count(stats.unproductive_groups))
    .bind(count(stats.records_without_equipment))
    .bind(count(stats.gold_hour_records))
    .bind(count(stats.cumulative_rows))
    .execute(conn)
    .await?;

    Ok(())
}

fn fetch_query(filter: &AggregateFilter) -> String {
    let mut clauses = Vec::new();
    let mut index = 0;

    if filter.month.is_some() {
        index += 1;
        clauses.push(format!("EXTRACT(MONTH FROM completion_date)::int = ${index}"));
    }
    if filter.machine.is_some() {
        index += 1;
        clauses.push(format!("equipment_name = ${index}"));
    }
    if filter.shift.is_some() {
        index += 1;
        clauses.push(format!("${index} = ANY(shifts)"));
    }

    let mut query = String::from(
        "SELECT completion_date, gold_hour, gold_hour_cumulative, \
         gold_hour_target, gold_hour_target_cumulative \
         FROM gold_hour.aggregate_data",
    );
    if !clauses.is_empty() {
        query.push_str(" WHERE ");
        query.push_str(&clauses.join(" AND "));
    }
    query.push_str(" ORDER BY completion_date ASC");
    query
}

pub async fn fetch_aggregate(
    pool: &PgPool,
    filter: &AggregateFilter,
) -> anyhow::Result<Vec<AggregateRow>> {
    let query = fetch_query(filter);
    let mut rows = sqlx::query(&query);

    if let Some(month) = filter.month {
        rows = rows.bind(i32::try_from(month)?);
    }
    if let Some(machine) = filter.machine.as_deref() {
        rows = rows.bind(machine);
    }
    if let Some(shift) = filter.shift {
        rows = rows.bind(shift.as_str());
    }

    let records = rows.fetch_all(pool).await?;
    let mut output = Vec::with_capacity(records.len());

    for row in records {
        output.push(AggregateRow {
            completion_date: row.get("completion_date"),
            gold_hour: row.get("gold_hour"),
            gold_hour_cumulative: row.get("gold_hour_cumulative"),
            gold_hour_target: row.get("gold_hour_target"),
            gold_hour_target_cumulative: row.get("gold_hour_target_cumulative"),
        });
    }

    Ok(output)
}

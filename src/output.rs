use crate::error::Result;
use crate::reports::Report;
use crate::types::{AggregateTable, ChartManifestEntry};
use crate::util::format_optional;
use serde::Serialize;
use std::fs;
use std::path::Path;
use tabled::{builder::Builder, settings::Style, Table, Tabled};
use tracing::info;

/// Write an aggregate as CSV. Measures use plain decimal notation and a
/// missing value is an empty cell.
pub fn write_csv(path: &Path, table: &AggregateTable) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(table.headers())?;
    for row in &table.rows {
        let record: Vec<String> = row
            .keys
            .iter()
            .map(|k| k.clone().unwrap_or_default())
            .chain(row.values.iter().map(|v| v.map(|d| d.to_string()).unwrap_or_default()))
            .collect();
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value)?;
    fs::write(path, s)?;
    Ok(())
}

/// Write every report table plus the chart manifest into `out_dir`.
pub fn write_reports(out_dir: &Path, reports: &[Report]) -> Result<Vec<ChartManifestEntry>> {
    fs::create_dir_all(out_dir)?;
    let mut manifest = Vec::with_capacity(reports.len());
    for report in reports {
        let file = format!("{}.csv", report.def.name);
        write_csv(&out_dir.join(&file), &report.table)?;
        info!(
            report = %report.def.name,
            rows = report.table.rows.len(),
            file = %file,
            "wrote report"
        );
        manifest.push(ChartManifestEntry {
            name: report.def.name.clone(),
            title: report.def.title.clone(),
            file,
            chart: report.def.chart.clone(),
        });
    }
    write_json(&out_dir.join("charts.json"), &manifest)?;
    Ok(manifest)
}

/// Markdown rendering of the first `max_rows` rows of an aggregate.
pub fn render_table(table: &AggregateTable, max_rows: usize) -> String {
    let mut records = vec![table.headers()];
    for row in table.rows.iter().take(max_rows) {
        records.push(
            row.keys
                .iter()
                .map(|k| k.clone().unwrap_or_else(|| "null".to_string()))
                .chain(row.values.iter().map(|v| format_optional(*v, 2)))
                .collect(),
        );
    }
    Builder::from_iter(records)
        .build()
        .with(Style::markdown())
        .to_string()
}

pub fn preview_table(table: &AggregateTable, max_rows: usize) {
    if table.rows.is_empty() {
        println!("(no rows)\n");
        return;
    }
    println!("{}\n", render_table(table, max_rows));
}

pub fn preview_table_rows<T>(rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().cloned().take(max_rows).collect();
    if slice.is_empty() {
        println!("(no rows)\n");
        return;
    }
    let table_str = Table::new(slice).with(Style::markdown()).to_string();
    println!("{}\n", table_str);
}

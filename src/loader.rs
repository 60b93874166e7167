use crate::config::PipelineConfig;
use crate::error::{EtlError, Result};
use crate::types::{Column, ColumnReportRow, Frame, RawTable};
use crate::util::{parse_currency_safe, parse_i32_safe};
use csv::ReaderBuilder;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct LoadReport {
    pub total_rows: usize,
    pub malformed_cells: usize,
    pub columns: Vec<ColumnReportRow>,
}

/// Read, normalize and clean the configured input file.
pub fn load_and_clean(config: &PipelineConfig) -> Result<(Frame, LoadReport)> {
    let raw = read_raw(Path::new(&config.input_path), config.delimiter_byte())?;
    info!(
        path = %config.input_path,
        rows = raw.rows.len(),
        columns = raw.headers.len(),
        "read raw input"
    );
    let raw = normalize_columns(&raw)?;
    clean_table(&raw, config)
}

/// Decode file bytes as UTF-8, falling back to Latin-1 when the file is not
/// valid UTF-8. A leading byte-order mark is dropped.
pub fn decode_text(bytes: Vec<u8>) -> String {
    let text = match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            debug!("input is not UTF-8, decoding as Latin-1");
            e.into_bytes().iter().map(|&b| b as char).collect()
        }
    };
    match text.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => text,
    }
}

pub fn read_raw(path: &Path, delimiter: u8) -> Result<RawTable> {
    let text = decode_text(fs::read(path)?);
    parse_raw(&text, delimiter)
}

pub fn parse_raw(text: &str, delimiter: u8) -> Result<RawTable> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = rdr.headers()?.iter().map(String::from).collect();
    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        rows.push(record.iter().map(String::from).collect());
    }
    Ok(RawTable { headers, rows })
}

/// Trim surrounding whitespace from every header. Fails if two headers end
/// up with the same name.
pub fn normalize_columns(raw: &RawTable) -> Result<RawTable> {
    let mut seen = HashSet::new();
    let mut headers = Vec::with_capacity(raw.headers.len());
    for h in &raw.headers {
        let trimmed = h.trim().to_string();
        if !seen.insert(trimmed.clone()) {
            return Err(EtlError::ColumnCollision { name: trimmed });
        }
        headers.push(trimmed);
    }
    Ok(RawTable {
        headers,
        rows: raw.rows.clone(),
    })
}

/// Type every column of a normalized table: the units field becomes an
/// integer column, currency fields become fixed-point decimals and all other
/// columns stay text. Cells that fail to parse are left missing.
pub fn clean_table(raw: &RawTable, config: &PipelineConfig) -> Result<(Frame, LoadReport)> {
    let schema = &config.schema;
    let required = [
        &schema.zone,
        &schema.product_type,
        &schema.channel,
        &schema.priority,
        &schema.units,
    ];
    for name in required.into_iter().chain(schema.currency_fields.iter()) {
        raw.column_index(name)?;
    }

    let mut frame = Frame::new(raw.rows.len());
    let mut columns = Vec::with_capacity(raw.headers.len());
    let mut malformed_cells = 0usize;

    for (idx, name) in raw.headers.iter().enumerate() {
        let cells = raw.rows.iter().map(|row| raw.cell(row, idx));
        let mut malformed = 0usize;

        let column = if name == &schema.units {
            let values = cells
                .enumerate()
                .map(|(row, s)| {
                    let v = parse_i32_safe(Some(s));
                    if v.is_none() && !s.trim().is_empty() {
                        debug!(column = %name, row, value = %s, "malformed integer value");
                        malformed += 1;
                    }
                    v
                })
                .collect();
            Column::Integer(values)
        } else if schema.currency_fields.contains(name) {
            let values = cells
                .enumerate()
                .map(|(row, s)| {
                    let v = parse_currency_safe(
                        Some(s),
                        &config.currency_marker,
                        config.precision,
                        config.scale,
                    );
                    if v.is_none() && !s.trim().is_empty() {
                        debug!(column = %name, row, value = %s, "malformed numeric value");
                        malformed += 1;
                    }
                    v
                })
                .collect();
            Column::Decimal(values)
        } else {
            Column::Text(
                cells
                    .map(|s| if s.is_empty() { None } else { Some(s.to_string()) })
                    .collect(),
            )
        };

        columns.push(ColumnReportRow {
            column: name.clone(),
            type_name: match &column {
                Column::Decimal(_) => format!("decimal({},{})", config.precision, config.scale),
                other => other.type_name().to_string(),
            },
            missing: column.missing_count(),
            malformed,
        });
        malformed_cells += malformed;
        frame = frame.with_column(name, column)?;
    }

    if malformed_cells > 0 {
        info!(malformed_cells, "numeric cells could not be parsed and were left missing");
    }

    let report = LoadReport {
        total_rows: raw.rows.len(),
        malformed_cells,
        columns,
    };
    Ok((frame, report))
}

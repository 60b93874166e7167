// Grouped sums over a typed frame.
//
// Rows are partitioned by the distinct tuple of their key columns and every
// measure is summed per partition, skipping missing cells. A partition with
// no present value for a measure keeps a missing sum rather than zero, and
// so does a sum that overflows the decimal range.
use crate::error::{EtlError, Result};
use crate::types::{AggregateRow, AggregateTable, Column, Frame};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct Measure {
    pub column: String,
    pub alias: String,
}

impl Measure {
    pub fn new(column: &str, alias: &str) -> Self {
        Measure {
            column: column.to_string(),
            alias: alias.to_string(),
        }
    }

    /// Keep the source column name as the output name.
    pub fn sum(column: &str) -> Self {
        Measure::new(column, column)
    }
}

/// Spread a measure over one output column per listed value of `column`.
#[derive(Debug, Clone, PartialEq)]
pub struct Pivot {
    pub column: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOrder {
    /// Partitions in the order their first row appears.
    FirstSeen,
    /// Ascending by key tuple, missing keys first.
    SortedByKey,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateSpec {
    pub group_by: Vec<String>,
    pub measures: Vec<Measure>,
    pub pivot: Option<Pivot>,
    pub order: RowOrder,
}

impl AggregateSpec {
    pub fn new(group_by: &[&str], measures: Vec<Measure>) -> Self {
        AggregateSpec {
            group_by: group_by.iter().map(|g| g.to_string()).collect(),
            measures,
            pivot: None,
            order: RowOrder::FirstSeen,
        }
    }

    pub fn pivot(mut self, column: &str, values: &[String]) -> Self {
        self.pivot = Some(Pivot {
            column: column.to_string(),
            values: values.to_vec(),
        });
        self
    }

    pub fn sorted(mut self) -> Self {
        self.order = RowOrder::SortedByKey;
        self
    }

    fn output_columns(&self) -> Vec<String> {
        match &self.pivot {
            None => self.measures.iter().map(|m| m.alias.clone()).collect(),
            Some(p) if self.measures.len() == 1 => p.values.clone(),
            Some(p) => p
                .values
                .iter()
                .flat_map(|v| self.measures.iter().map(move |m| format!("{}_{}", v, m.alias)))
                .collect(),
        }
    }
}

fn text_column<'a>(frame: &'a Frame, name: &str) -> Result<&'a [Option<String>]> {
    match frame.column(name) {
        Ok(Column::Text(values)) => Ok(values.as_slice()),
        Ok(other) => Err(EtlError::InvalidGroupKey {
            column: name.to_string(),
            reason: format!("expected a text column, found {}", other.type_name()),
        }),
        Err(_) => Err(EtlError::InvalidGroupKey {
            column: name.to_string(),
            reason: "column not found".to_string(),
        }),
    }
}

fn measure_column<'a>(frame: &'a Frame, name: &str) -> Result<&'a Column> {
    let column = frame.column(name)?;
    if !column.is_numeric() {
        return Err(EtlError::InvalidMeasure {
            column: name.to_string(),
            reason: format!("cannot sum a {} column", column.type_name()),
        });
    }
    Ok(column)
}

pub fn aggregate(frame: &Frame, spec: &AggregateSpec) -> Result<AggregateTable> {
    let keys: Vec<&[Option<String>]> = spec
        .group_by
        .iter()
        .map(|g| text_column(frame, g))
        .collect::<Result<_>>()?;
    let measures: Vec<&Column> = spec
        .measures
        .iter()
        .map(|m| measure_column(frame, &m.column))
        .collect::<Result<_>>()?;
    let pivot = match &spec.pivot {
        Some(p) => Some((text_column(frame, &p.column)?, &p.values)),
        None => None,
    };

    let measure_columns = spec.output_columns();
    let width = measure_columns.len();
    let mut index: HashMap<Vec<Option<String>>, usize> = HashMap::new();
    let mut rows: Vec<AggregateRow> = Vec::new();
    // Cells whose sum overflowed stay missing for the rest of the scan.
    let mut overflowed: Vec<Vec<bool>> = Vec::new();

    for row in 0..frame.height() {
        let key: Vec<Option<String>> = keys.iter().map(|k| k[row].clone()).collect();
        let slot = match index.get(&key) {
            Some(&slot) => slot,
            None => {
                index.insert(key.clone(), rows.len());
                rows.push(AggregateRow {
                    keys: key,
                    values: vec![None; width],
                });
                overflowed.push(vec![false; width]);
                rows.len() - 1
            }
        };

        // Offset of this row's first measure column. Rows whose pivot value
        // is not listed still create their partition but add to no column.
        let offset = match pivot {
            None => 0,
            Some((column, values)) => {
                let position = column[row]
                    .as_deref()
                    .and_then(|v| values.iter().position(|p| p == v));
                match position {
                    Some(p) => p * measures.len(),
                    None => continue,
                }
            }
        };

        for (m, column) in measures.iter().enumerate() {
            let Some(value) = column.decimal_at(row) else {
                continue;
            };
            let at = offset + m;
            if overflowed[slot][at] {
                continue;
            }
            let current = rows[slot].values[at].unwrap_or(Decimal::ZERO);
            match current.checked_add(value) {
                Some(sum) => rows[slot].values[at] = Some(sum),
                None => {
                    warn!(
                        column = %measure_columns[at],
                        key = ?rows[slot].keys,
                        "sum overflows the decimal range, leaving it missing"
                    );
                    rows[slot].values[at] = None;
                    overflowed[slot][at] = true;
                }
            }
        }
    }

    if spec.order == RowOrder::SortedByKey {
        rows.sort_by(|a, b| a.keys.cmp(&b.keys));
    }

    Ok(AggregateTable {
        key_columns: spec.group_by.clone(),
        measure_columns,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn text(values: &[&str]) -> Column {
        Column::Text(
            values
                .iter()
                .map(|v| if v.is_empty() { None } else { Some(v.to_string()) })
                .collect(),
        )
    }

    fn units_by(group_by: &[&str]) -> AggregateSpec {
        AggregateSpec::new(group_by, vec![Measure::sum("Unidades")])
    }

    fn channels() -> Vec<String> {
        vec!["Offline".to_string(), "Online".to_string()]
    }

    fn sample() -> Frame {
        Frame::new(6)
            .with_column("Tipo", text(&["B", "A", "B", "A", "C", "A"]))
            .unwrap()
            .with_column("Prioridad", text(&["H", "L", "C", "H", "M", "C"]))
            .unwrap()
            .with_column(
                "Canal",
                text(&["Online", "Offline", "Offline", "Online", "Online", "Phone"]),
            )
            .unwrap()
            .with_column(
                "Unidades",
                Column::Integer(vec![Some(5), Some(2), Some(7), Some(1), Some(4), Some(3)]),
            )
            .unwrap()
            .with_column(
                "Ventas",
                Column::Decimal(vec![
                    Some(dec!(10.500)),
                    None,
                    Some(dec!(2.000)),
                    Some(dec!(1.250)),
                    None,
                    Some(dec!(0.001)),
                ]),
            )
            .unwrap()
    }

    fn value(table: &AggregateTable, keys: &[&str], measure: &str) -> Option<Decimal> {
        let idx = table.measure_index(measure).unwrap();
        table.find(keys).unwrap().values[idx]
    }

    #[test]
    fn sums_per_group_in_first_seen_order() {
        let spec = AggregateSpec::new(
            &["Tipo"],
            vec![Measure::sum("Unidades"), Measure::new("Ventas", "Total")],
        );
        let table = aggregate(&sample(), &spec).unwrap();

        assert_eq!(table.headers(), vec!["Tipo", "Unidades", "Total"]);
        let order: Vec<_> = table.rows.iter().map(|r| r.keys[0].clone().unwrap()).collect();
        assert_eq!(order, vec!["B", "A", "C"]);
        assert_eq!(value(&table, &["A"], "Unidades"), Some(dec!(6)));
        assert_eq!(value(&table, &["A"], "Total"), Some(dec!(1.251)));
        assert_eq!(value(&table, &["B"], "Total"), Some(dec!(12.500)));
    }

    #[test]
    fn all_missing_partition_stays_missing() {
        let spec = AggregateSpec::new(&["Tipo"], vec![Measure::sum("Ventas")]);
        let table = aggregate(&sample(), &spec).unwrap();
        assert_eq!(table.rows.len(), 3);
        assert_eq!(value(&table, &["C"], "Ventas"), None);
    }

    #[test]
    fn overflowing_group_goes_missing_without_failing_the_rest() {
        let frame = Frame::new(4)
            .with_column("Tipo", text(&["Big", "Small", "Big", "Big"]))
            .unwrap()
            .with_column(
                "Ventas",
                Column::Decimal(vec![
                    Some(Decimal::MAX),
                    Some(dec!(1.500)),
                    Some(Decimal::MAX),
                    // Would bring the sum back into range if the overflow were forgotten.
                    Some(-Decimal::MAX),
                ]),
            )
            .unwrap();
        let spec = AggregateSpec::new(&["Tipo"], vec![Measure::sum("Ventas")]);
        let table = aggregate(&frame, &spec).unwrap();

        assert_eq!(table.rows.len(), 2);
        assert_eq!(value(&table, &["Big"], "Ventas"), None);
        assert_eq!(value(&table, &["Small"], "Ventas"), Some(dec!(1.500)));
    }

    #[test]
    fn group_sums_conserve_the_global_sum() {
        let frame = sample();
        let spec = AggregateSpec::new(
            &["Prioridad"],
            vec![Measure::sum("Ventas"), Measure::sum("Unidades")],
        );
        let table = aggregate(&frame, &spec).unwrap();

        for name in ["Ventas", "Unidades"] {
            let column = frame.column(name).unwrap();
            let global: Decimal = (0..frame.height()).filter_map(|r| column.decimal_at(r)).sum();
            assert_eq!(table.column_total(name), Some(global));
        }
    }

    #[test]
    fn pivot_spreads_measure_over_listed_values() {
        let spec = units_by(&["Tipo"]).pivot("Canal", &channels());
        let table = aggregate(&sample(), &spec).unwrap();

        assert_eq!(table.headers(), vec!["Tipo", "Offline", "Online"]);
        assert_eq!(table.rows.len(), 3);
        assert_eq!(value(&table, &["B"], "Offline"), Some(dec!(7)));
        assert_eq!(value(&table, &["B"], "Online"), Some(dec!(5)));
        // "Phone" is not a listed channel, so A's third row lands nowhere.
        assert_eq!(value(&table, &["A"], "Offline"), Some(dec!(2)));
        assert_eq!(value(&table, &["A"], "Online"), Some(dec!(1)));
        assert_eq!(value(&table, &["C"], "Offline"), None);
        assert_eq!(value(&table, &["C"], "Online"), Some(dec!(4)));
    }

    #[test]
    fn pivot_matches_ungrouped_units_per_key() {
        let frame = Frame::new(4)
            .with_column("Tipo", text(&["A", "A", "B", "B"]))
            .unwrap()
            .with_column("Canal", text(&["Online", "Offline", "Offline", "Offline"]))
            .unwrap()
            .with_column(
                "Unidades",
                Column::Integer(vec![Some(3), Some(4), Some(5), Some(6)]),
            )
            .unwrap();
        let pivoted = aggregate(&frame, &units_by(&["Tipo"]).pivot("Canal", &channels())).unwrap();
        let plain = aggregate(&frame, &units_by(&["Tipo"])).unwrap();

        for row in &plain.rows {
            let key = row.keys[0].as_deref().unwrap();
            let p = pivoted.find(&[key]).unwrap();
            let split: Decimal = p.values.iter().flatten().sum();
            assert_eq!(Some(split), row.values[0]);
        }
        let a_rows = pivoted.rows.iter().filter(|r| r.keys[0].as_deref() == Some("A"));
        assert_eq!(a_rows.count(), 1);
    }

    #[test]
    fn sorted_by_composite_key() {
        let table = aggregate(&sample(), &units_by(&["Tipo", "Prioridad"]).sorted()).unwrap();
        let keys: Vec<_> = table.rows.iter().map(|r| r.keys.clone()).collect();
        for pair in keys.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        assert_eq!(
            table.rows[0].keys,
            vec![Some("A".to_string()), Some("C".to_string())]
        );
    }

    #[test]
    fn missing_key_values_form_their_own_group_sorted_first() {
        let frame = Frame::new(3)
            .with_column("Zona", text(&["Sur", "", "Norte"]))
            .unwrap()
            .with_column("Unidades", Column::Integer(vec![Some(1), Some(2), Some(3)]))
            .unwrap();
        let table = aggregate(&frame, &units_by(&["Zona"]).sorted()).unwrap();
        assert_eq!(table.rows[0].keys, vec![None]);
        assert_eq!(table.rows[0].values, vec![Some(dec!(2))]);
        assert_eq!(table.rows.len(), 3);
    }

    #[test]
    fn structural_errors() {
        let frame = sample();
        assert!(matches!(
            aggregate(&frame, &units_by(&["Nope"])),
            Err(EtlError::InvalidGroupKey { .. })
        ));
        assert!(matches!(
            aggregate(&frame, &AggregateSpec::new(&["Unidades"], vec![Measure::sum("Ventas")])),
            Err(EtlError::InvalidGroupKey { .. })
        ));
        assert!(matches!(
            aggregate(&frame, &AggregateSpec::new(&["Tipo"], vec![Measure::sum("Nope")])),
            Err(EtlError::SchemaMismatch { .. })
        ));
        assert!(matches!(
            aggregate(&frame, &AggregateSpec::new(&["Tipo"], vec![Measure::sum("Canal")])),
            Err(EtlError::InvalidMeasure { .. })
        ));
        let values = vec!["x".to_string()];
        assert!(matches!(
            aggregate(&frame, &units_by(&["Tipo"]).pivot("Ventas", &values)),
            Err(EtlError::InvalidGroupKey { .. })
        ));
    }
}

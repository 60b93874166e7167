use crate::aggregate::{aggregate, AggregateSpec, Measure};
use crate::config::SalesSchema;
use crate::error::Result;
use crate::loader::LoadReport;
use crate::types::{AggregateTable, ChartKind, ChartSpec, Frame, SummaryStats};
use chrono::Utc;

/// A named aggregation and the chart it feeds.
#[derive(Debug, Clone)]
pub struct ReportDef {
    pub name: String,
    pub title: String,
    pub spec: AggregateSpec,
    pub chart: ChartSpec,
}

#[derive(Debug, Clone)]
pub struct Report {
    pub def: ReportDef,
    pub table: AggregateTable,
}

fn bar(x: &str) -> ChartSpec {
    ChartSpec {
        kind: ChartKind::Bar,
        x: x.to_string(),
        y: None,
        figsize: [10.0, 8.0],
        width: Some(0.9),
        stacked: false,
        subplots: false,
        sort_columns: true,
    }
}

fn def(name: &str, title: &str, spec: AggregateSpec, chart: ChartSpec) -> ReportDef {
    ReportDef {
        name: name.to_string(),
        title: title.to_string(),
        spec,
        chart,
    }
}

/// The fixed report set, in presentation order.
pub fn report_definitions(schema: &SalesSchema) -> Vec<ReportDef> {
    let product = schema.product_type.as_str();

    vec![
        def(
            "sales_by_zone",
            "Importe de venta total por zonas",
            AggregateSpec::new(
                &[schema.zone.as_str()],
                vec![Measure::new(&schema.total_sale, "Total")],
            ),
            bar(&schema.zone),
        ),
        def(
            "units_by_channel",
            "Tipo de producto y su canal de venta",
            AggregateSpec::new(&[product], vec![Measure::sum(&schema.units)])
                .pivot(&schema.channel, &schema.channel_values),
            ChartSpec {
                stacked: true,
                ..bar(product)
            },
        ),
        def(
            "finance_by_product",
            "Tipo de producto con ventas totales y ganancia total",
            AggregateSpec::new(
                &[product],
                vec![
                    Measure::sum(&schema.total_investment),
                    Measure::sum(&schema.total_sales),
                    Measure::sum(&schema.total_profit),
                ],
            ),
            ChartSpec {
                kind: ChartKind::Line,
                width: None,
                subplots: true,
                ..bar(product)
            },
        ),
        def(
            "totals_by_product",
            "Tipo de producto y la cantidad de unidades",
            AggregateSpec::new(
                &[product],
                vec![
                    Measure::sum(&schema.units),
                    Measure::sum(&schema.total_investment),
                    Measure::sum(&schema.total_sales),
                    Measure::sum(&schema.total_profit),
                ],
            ),
            bar(product),
        ),
        def(
            "profit_by_product",
            "Ganancias totales de cada producto",
            AggregateSpec::new(
                &[product],
                vec![Measure::new(&schema.total_profit, "GananciasTotales")],
            ),
            ChartSpec {
                kind: ChartKind::Pie,
                y: Some("GananciasTotales".to_string()),
                figsize: [10.0, 10.0],
                width: None,
                subplots: true,
                sort_columns: false,
                ..bar(product)
            },
        ),
        def(
            "sales_by_product",
            "Ventas totales de cada tipo de producto",
            AggregateSpec::new(
                &[product],
                vec![Measure::new(&schema.total_sales, "ventasTotales")],
            ),
            bar(product),
        ),
        def(
            "investment_by_product",
            "Inversión total por cada producto",
            AggregateSpec::new(
                &[product],
                vec![Measure::new(&schema.total_investment, "InversionesTotales")],
            ),
            bar(product),
        ),
        def(
            "units_by_priority",
            "Prioridad del producto con la cantidad de unidades",
            AggregateSpec::new(
                &[product, schema.priority.as_str()],
                vec![Measure::sum(&schema.units)],
            )
            .sorted(),
            bar(&schema.priority),
        ),
    ]
}

/// Run every report definition against a frame that already carries the
/// derived metric columns.
pub fn generate_reports(frame: &Frame, schema: &SalesSchema) -> Result<Vec<Report>> {
    report_definitions(schema)
        .into_iter()
        .map(|def| {
            let table = aggregate(frame, &def.spec)?;
            Ok(Report { def, table })
        })
        .collect()
}

pub fn generate_summary(
    frame: &Frame,
    schema: &SalesSchema,
    load_report: &LoadReport,
    source: &str,
) -> Result<SummaryStats> {
    // An empty key list folds the whole frame into a single partition.
    let totals = aggregate(
        frame,
        &AggregateSpec::new(
            &[],
            vec![
                Measure::sum(&schema.units),
                Measure::sum(&schema.total_sales),
                Measure::sum(&schema.total_investment),
                Measure::sum(&schema.total_profit),
            ],
        ),
    )?;
    let total = |name: &str| totals.column_total(name);
    let distinct = |column: &str| -> Result<usize> {
        Ok(aggregate(frame, &AggregateSpec::new(&[column], vec![]))?.rows.len())
    };

    Ok(SummaryStats {
        generated_at: Utc::now(),
        source: source.to_string(),
        total_rows: load_report.total_rows,
        malformed_cells: load_report.malformed_cells,
        total_units: total(&schema.units),
        total_sales: total(&schema.total_sales),
        total_investment: total(&schema.total_investment),
        total_profit: total(&schema.total_profit),
        zones: distinct(&schema.zone)?,
        product_types: distinct(&schema.product_type)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::loader::{clean_table, normalize_columns, parse_raw};
    use crate::metrics::derive_metrics;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    const DATA: &str = concat!(
        "Zona ;Tipo de producto ; Canal de venta;Prioridad;Unidades;Precio Unitario ;",
        "Coste unitario;Importe venta total;Importe Coste total\n",
        "Norte;Snacks;Online;H;10;1.234,500 €;1.000,000 €;12.345,000 €;10.000,000 €\n",
        "Sur;Snacks;Offline;C;4;2,000 €;1,500 €;8,000 €;6,000 €\n",
        "Norte;Bebidas;Offline;M;3;N/A;1,000 €;N/A;3,000 €\n",
        "Este;Bebidas;Online;C;5;10,000 €;4,000 €;50,000 €;20,000 €\n",
        "Sur;Cereales;Online;L;2;7,250 €;5,000 €;14,500 €;10,000 €\n",
        "Norte;Bebidas;Online;H;1;3,000 €;2,000 €;3,000 €;2,000 €\n",
    );

    fn pipeline() -> (Frame, LoadReport, SalesSchema) {
        let config = PipelineConfig::default();
        let raw = normalize_columns(&parse_raw(DATA, config.delimiter_byte()).unwrap()).unwrap();
        let (frame, report) = clean_table(&raw, &config).unwrap();
        let frame = derive_metrics(frame, &config.schema).unwrap();
        (frame, report, config.schema)
    }

    fn report<'a>(reports: &'a [Report], name: &str) -> &'a AggregateTable {
        &reports.iter().find(|r| r.def.name == name).unwrap().table
    }

    fn cell(table: &AggregateTable, keys: &[&str], measure: &str) -> Option<Decimal> {
        let idx = table.measure_index(measure).unwrap();
        table.find(keys).unwrap().values[idx]
    }

    #[test]
    fn produces_the_full_report_set() {
        let (frame, _, schema) = pipeline();
        let reports = generate_reports(&frame, &schema).unwrap();
        let names: Vec<_> = reports.iter().map(|r| r.def.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "sales_by_zone",
                "units_by_channel",
                "finance_by_product",
                "totals_by_product",
                "profit_by_product",
                "sales_by_product",
                "investment_by_product",
                "units_by_priority",
            ]
        );
    }

    #[test]
    fn worked_example_row() {
        let (frame, _, schema) = pipeline();
        let reports = generate_reports(&frame, &schema).unwrap();
        let totals = report(&reports, "totals_by_product");
        assert_eq!(
            totals.headers(),
            vec![
                "Tipo de producto",
                "Unidades",
                "InversionTotal",
                "VentasTotales",
                "GananciaTotal",
            ]
        );
        // 10 × 1234.500 + 4 × 2.000
        assert_eq!(cell(totals, &["Snacks"], "VentasTotales"), Some(dec!(12353.000)));
        assert_eq!(cell(totals, &["Snacks"], "InversionTotal"), Some(dec!(10006.000)));
        assert_eq!(cell(totals, &["Snacks"], "GananciaTotal"), Some(dec!(2347.000)));
    }

    #[test]
    fn malformed_price_is_missing_not_zero() {
        let (frame, load, schema) = pipeline();
        assert_eq!(load.malformed_cells, 2);
        let reports = generate_reports(&frame, &schema).unwrap();

        // Bebidas: the N/A row is skipped, 5 × 10 + 1 × 3 remain.
        let sales = report(&reports, "sales_by_product");
        assert_eq!(cell(sales, &["Bebidas"], "ventasTotales"), Some(dec!(53.000)));

        // Its units still count where units are the measure.
        let totals = report(&reports, "totals_by_product");
        assert_eq!(cell(totals, &["Bebidas"], "Unidades"), Some(dec!(9)));

        // Conservation over present values only.
        let column = frame.column("VentasTotales").unwrap();
        let present: Decimal = (0..frame.height()).filter_map(|r| column.decimal_at(r)).sum();
        assert_eq!(sales.column_total("ventasTotales"), Some(present));
    }

    #[test]
    fn zone_report_sums_precomputed_totals() {
        let (frame, _, schema) = pipeline();
        let reports = generate_reports(&frame, &schema).unwrap();
        let zones = report(&reports, "sales_by_zone");
        assert_eq!(zones.headers(), vec!["Zona", "Total"]);
        assert_eq!(cell(zones, &["Norte"], "Total"), Some(dec!(12348.000)));
        assert_eq!(cell(zones, &["Sur"], "Total"), Some(dec!(22.500)));
        assert_eq!(zones.rows.len(), 3);
    }

    #[test]
    fn channel_pivot_is_complete() {
        let (frame, _, schema) = pipeline();
        let reports = generate_reports(&frame, &schema).unwrap();
        let channels = report(&reports, "units_by_channel");
        let units = report(&reports, "totals_by_product");

        assert_eq!(channels.headers(), vec!["Tipo de producto", "Offline", "Online"]);
        assert_eq!(channels.rows.len(), units.rows.len());
        for row in &units.rows {
            let key = row.keys[0].as_deref().unwrap();
            let split: Decimal = channels.find(&[key]).unwrap().values.iter().flatten().sum();
            assert_eq!(Some(split), row.values[0]);
        }
        assert_eq!(cell(channels, &["Cereales"], "Offline"), None);
    }

    #[test]
    fn priority_report_is_sorted() {
        let (frame, _, schema) = pipeline();
        let reports = generate_reports(&frame, &schema).unwrap();
        let priority = report(&reports, "units_by_priority");
        for pair in priority.rows.windows(2) {
            assert!(pair[0].keys <= pair[1].keys);
        }
        assert_eq!(
            priority.rows[0].keys,
            vec![Some("Bebidas".to_string()), Some("C".to_string())]
        );
        assert_eq!(cell(priority, &["Bebidas", "H"], "Unidades"), Some(dec!(1)));
    }

    #[test]
    fn chart_layouts_follow_report_kind() {
        let defs = report_definitions(&SalesSchema::default());
        let chart = |name: &str| defs.iter().find(|d| d.name == name).unwrap().chart.clone();

        assert!(chart("units_by_channel").stacked);
        assert_eq!(chart("finance_by_product").kind, ChartKind::Line);
        let pie = chart("profit_by_product");
        assert_eq!(pie.kind, ChartKind::Pie);
        assert_eq!(pie.y.as_deref(), Some("GananciasTotales"));
        assert_eq!(pie.x, "Tipo de producto");
        assert_eq!(chart("units_by_priority").x, "Prioridad");
    }

    #[test]
    fn summary_totals() {
        let (frame, load, schema) = pipeline();
        let summary = generate_summary(&frame, &schema, &load, "ventas.csv").unwrap();
        assert_eq!(summary.total_rows, 6);
        assert_eq!(summary.malformed_cells, 2);
        assert_eq!(summary.total_units, Some(dec!(25)));
        assert_eq!(summary.zones, 3);
        assert_eq!(summary.product_types, 3);
        assert_eq!(summary.total_sales, Some(dec!(12420.500)));
        // The N/A row still carries an investment but has no profit.
        assert_eq!(summary.total_investment, Some(dec!(10041.000)));
        assert_eq!(summary.total_profit, Some(dec!(2382.500)));
    }
}

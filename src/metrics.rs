use crate::config::SalesSchema;
use crate::error::{EtlError, Result};
use crate::types::{Column, Frame};
use rust_decimal::Decimal;

/// Add the sales, investment and profit columns to a cleaned frame.
///
/// Sales and investment are unit price and unit cost times units; profit is
/// their difference. A missing input, or a product that overflows the
/// decimal range, leaves the derived cell missing.
pub fn derive_metrics(frame: Frame, schema: &SalesSchema) -> Result<Frame> {
    let units = numeric(&frame, &schema.units)?;
    let price = numeric(&frame, &schema.unit_price)?;
    let cost = numeric(&frame, &schema.unit_cost)?;

    let height = frame.height();
    let mut sales = Vec::with_capacity(height);
    let mut investment = Vec::with_capacity(height);
    let mut profit = Vec::with_capacity(height);

    for row in 0..height {
        let u = units.decimal_at(row);
        let s = times(price.decimal_at(row), u);
        let i = times(cost.decimal_at(row), u);
        let p = match (s, i) {
            (Some(s), Some(i)) => s.checked_sub(i),
            _ => None,
        };
        sales.push(s);
        investment.push(i);
        profit.push(p);
    }

    frame
        .with_column(&schema.total_sales, Column::Decimal(sales))?
        .with_column(&schema.total_investment, Column::Decimal(investment))?
        .with_column(&schema.total_profit, Column::Decimal(profit))
}

fn times(amount: Option<Decimal>, units: Option<Decimal>) -> Option<Decimal> {
    amount?.checked_mul(units?)
}

fn numeric<'a>(frame: &'a Frame, name: &str) -> Result<&'a Column> {
    let column = frame.column(name)?;
    if !column.is_numeric() {
        return Err(EtlError::InvalidMeasure {
            column: name.to_string(),
            reason: format!("expected a numeric column, found {}", column.type_name()),
        });
    }
    Ok(column)
}

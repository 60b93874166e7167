// Pipeline configuration.
//
// Every field name the pipeline touches lives in `SalesSchema`, so the
// cleaning and aggregation stages never hard-code a column. The defaults
// describe the semicolon-separated sales export the tool was written for;
// a TOML file can override any subset of them.
use crate::error::{EtlError, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub input_path: String,
    pub delimiter: char,
    /// Literal removed from currency cells before parsing.
    pub currency_marker: String,
    /// Total significant digits of cleaned decimals.
    pub precision: u32,
    /// Fractional digits of cleaned decimals.
    pub scale: u32,
    pub output_dir: String,
    pub preview_rows: usize,
    pub schema: SalesSchema,
}

/// Names of the columns read from the input and of the derived columns.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SalesSchema {
    pub zone: String,
    pub product_type: String,
    pub channel: String,
    pub priority: String,
    pub units: String,
    pub unit_price: String,
    pub unit_cost: String,
    pub total_sale: String,
    pub total_cost: String,
    /// Columns cleaned with the currency rules.
    pub currency_fields: Vec<String>,
    /// Pivot columns emitted for the channel breakdown, in order.
    pub channel_values: Vec<String>,
    pub total_sales: String,
    pub total_investment: String,
    pub total_profit: String,
}

impl Default for SalesSchema {
    fn default() -> Self {
        SalesSchema {
            zone: "Zona".to_string(),
            product_type: "Tipo de producto".to_string(),
            channel: "Canal de venta".to_string(),
            priority: "Prioridad".to_string(),
            units: "Unidades".to_string(),
            unit_price: "Precio Unitario".to_string(),
            unit_cost: "Coste unitario".to_string(),
            total_sale: "Importe venta total".to_string(),
            total_cost: "Importe Coste total".to_string(),
            currency_fields: vec![
                "Precio Unitario".to_string(),
                "Coste unitario".to_string(),
                "Importe venta total".to_string(),
                "Importe Coste total".to_string(),
            ],
            channel_values: vec!["Offline".to_string(), "Online".to_string()],
            total_sales: "VentasTotales".to_string(),
            total_investment: "InversionTotal".to_string(),
            total_profit: "GananciaTotal".to_string(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            input_path: "data.csv".to_string(),
            delimiter: ';',
            currency_marker: " €".to_string(),
            precision: 20,
            scale: 3,
            output_dir: "reports".to_string(),
            preview_rows: 5,
            schema: SalesSchema::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a TOML configuration, falling back to the defaults when no path
    /// is given. The result is validated before it is returned.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(p) => {
                let content = fs::read_to_string(p).map_err(|e| {
                    EtlError::Config(format!("cannot read '{}': {}", p.display(), e))
                })?;
                Self::from_toml(&content)?
            }
            None => PipelineConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| EtlError::Config(format!("invalid TOML: {}", e)))
    }

    pub fn delimiter_byte(&self) -> u8 {
        // `validate` guarantees an ASCII delimiter.
        self.delimiter as u8
    }

    pub fn validate(&self) -> Result<()> {
        if !self.delimiter.is_ascii() {
            return Err(EtlError::Config(format!(
                "delimiter '{}' is not a single ASCII character",
                self.delimiter
            )));
        }
        // The CSV reader treats these as quoting and record boundaries.
        if matches!(self.delimiter, '"' | '\n' | '\r') {
            return Err(EtlError::Config(format!(
                "delimiter {:?} cannot be a quote or line terminator",
                self.delimiter
            )));
        }
        if self.precision == 0 || self.precision > 28 {
            return Err(EtlError::Config(format!(
                "precision {} outside 1..=28",
                self.precision
            )));
        }
        if self.scale > self.precision {
            return Err(EtlError::Config(format!(
                "scale {} exceeds precision {}",
                self.scale, self.precision
            )));
        }

        let schema = &self.schema;
        if schema.currency_fields.is_empty() {
            return Err(EtlError::Config("no currency fields configured".to_string()));
        }
        for required in [&schema.unit_price, &schema.unit_cost] {
            if !schema.currency_fields.contains(required) {
                return Err(EtlError::Config(format!(
                    "'{}' must be listed in currency_fields",
                    required
                )));
            }
        }
        if schema.currency_fields.contains(&schema.units) {
            return Err(EtlError::Config(format!(
                "'{}' cannot be both the units field and a currency field",
                schema.units
            )));
        }
        if schema.channel_values.is_empty() {
            return Err(EtlError::Config("no channel pivot values configured".to_string()));
        }
        let mut seen = HashSet::new();
        for v in &schema.channel_values {
            if !seen.insert(v.as_str()) {
                return Err(EtlError::Config(format!("duplicate channel pivot value '{}'", v)));
            }
        }
        Ok(())
    }
}

// Entry point and high-level CLI flow.
//
// By default the binary runs the whole pipeline once: load and clean the
// sales CSV, derive the financial metrics, then write every report table,
// the chart manifest and a JSON summary. `--interactive` keeps the menu
// front end instead:
// - Option [1] loads and cleans the CSV, printing the cleaned schema.
// - Option [2] generates the reports from the loaded data.
// - After generating reports, the user can go back to the menu or exit.
mod aggregate;
mod config;
mod error;
mod loader;
mod metrics;
mod output;
mod reports;
mod types;
mod util;

use clap::Parser;
use config::PipelineConfig;
use error::Result;
use loader::LoadReport;
use once_cell::sync::Lazy;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::error;
use tracing_subscriber::EnvFilter;
use types::Frame;

#[derive(Parser, Debug)]
#[command(name = "sales_etl", about = "Clean a sales CSV and build grouped sales reports")]
struct Cli {
    /// TOML configuration file; defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Input CSV, overrides `input_path` from the configuration.
    #[arg(short, long)]
    input: Option<String>,

    /// Directory for report tables, `charts.json` and `summary.json`.
    #[arg(short, long)]
    out_dir: Option<String>,

    #[arg(long)]
    delimiter: Option<char>,

    /// Rows shown per report in the console preview.
    #[arg(long)]
    preview_rows: Option<usize>,

    /// Run the load/report menu instead of a single pass.
    #[arg(long)]
    interactive: bool,
}

// Loaded data is kept for the whole process so the menu can generate reports
// several times from one load.
static APP_STATE: Lazy<Mutex<AppState>> = Lazy::new(|| Mutex::new(AppState { data: None }));

struct AppState {
    data: Option<(Frame, LoadReport)>,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sales_etl=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn build_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::load(cli.config.as_deref())?;
    if let Some(input) = &cli.input {
        config.input_path = input.clone();
    }
    if let Some(out_dir) = &cli.out_dir {
        config.output_dir = out_dir.clone();
    }
    if let Some(delimiter) = cli.delimiter {
        config.delimiter = delimiter;
    }
    if let Some(rows) = cli.preview_rows {
        config.preview_rows = rows;
    }
    config.validate()?;
    Ok(config)
}

/// Read a single line of input after printing the common "Enter choice:" prompt.
///
/// Returns `None` once stdin is closed.
fn read_choice() -> Option<String> {
    print!("Enter choice: ");
    let _ = io::stdout().flush();
    let mut buf = String::new();
    match io::stdin().read_line(&mut buf) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(buf.trim().to_string()),
    }
}

/// Returns `true` if the user chose `Y`, `false` if they chose `N`.
fn prompt_back_to_menu() -> bool {
    loop {
        print!("Back to Report Selection (Y/N): ");
        let _ = io::stdout().flush();
        let mut buf = String::new();
        if io::stdin().read_line(&mut buf).unwrap_or(0) == 0 {
            return false;
        }
        match buf.trim().to_uppercase().as_str() {
            "Y" => return true,
            "N" => return false,
            _ => println!("Invalid choice. Please enter Y or N."),
        }
    }
}

/// Load, clean and derive; the result replaces whatever `APP_STATE` held.
fn handle_load(config: &PipelineConfig) -> Result<()> {
    let (frame, load_report) = loader::load_and_clean(config)?;
    let frame = metrics::derive_metrics(frame, &config.schema)?;

    println!(
        "Processing dataset... ({} rows loaded from {})",
        util::format_int(load_report.total_rows),
        config.input_path
    );
    if load_report.malformed_cells > 0 {
        println!(
            "Note: {} numeric cells could not be parsed and are treated as missing.",
            util::format_int(load_report.malformed_cells)
        );
    }
    println!("\nCleaned schema:\n");
    output::preview_table_rows(&load_report.columns, load_report.columns.len());

    let mut state = APP_STATE.lock().unwrap_or_else(|e| e.into_inner());
    state.data = Some((frame, load_report));
    Ok(())
}

/// Write every report, the chart manifest and the summary, printing a
/// Markdown preview of each table.
fn handle_generate_reports(config: &PipelineConfig) -> Result<()> {
    let data = {
        let state = APP_STATE.lock().unwrap_or_else(|e| e.into_inner());
        state.data.clone()
    };
    let Some((frame, load_report)) = data else {
        println!("Error: No data loaded. Please load the CSV file first (option 1).\n");
        return Ok(());
    };

    println!("Generating reports...\n");
    let out_dir = Path::new(&config.output_dir);
    let reports = reports::generate_reports(&frame, &config.schema)?;
    let manifest = output::write_reports(out_dir, &reports)?;

    for (idx, (report, entry)) in reports.iter().zip(&manifest).enumerate() {
        println!("Report {}: {}\n", idx + 1, report.def.title);
        output::preview_table(&report.table, config.preview_rows);
        println!("(Full table exported to {})\n", out_dir.join(&entry.file).display());
    }

    let summary =
        reports::generate_summary(&frame, &config.schema, &load_report, &config.input_path)?;
    output::write_json(&out_dir.join("summary.json"), &summary)?;
    println!("Summary Stats (summary.json):");
    println!(
        "{{\"total_units\": {}, \"total_sales\": {}, \"total_profit\": {}}}\n",
        util::format_optional(summary.total_units, 0),
        util::format_optional(summary.total_sales, 2),
        util::format_optional(summary.total_profit, 2)
    );
    Ok(())
}

fn run_interactive(config: &PipelineConfig) {
    loop {
        println!("Select an option:");
        println!("[1] Load the file");
        println!("[2] Generate Reports\n");
        let Some(choice) = read_choice() else {
            break;
        };
        match choice.as_str() {
            "1" => {
                if let Err(e) = handle_load(config) {
                    error!("failed to load {}: {}", config.input_path, e);
                }
            }
            "2" => {
                println!();
                if let Err(e) = handle_generate_reports(config) {
                    error!("failed to generate reports: {}", e);
                }
                if !prompt_back_to_menu() {
                    println!("Exiting the program.");
                    break;
                }
            }
            _ => println!("Invalid choice. Please enter 1 or 2.\n"),
        }
    }
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    let config = match build_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if cli.interactive {
        run_interactive(&config);
        return ExitCode::SUCCESS;
    }

    match handle_load(&config).and_then(|_| handle_generate_reports(&config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

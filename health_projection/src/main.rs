use clap::{Args, Parser, Subcommand};
use comfy_table::{Cell, Table};
use health_projection::reconcile::to_dataframe;
use health_projection::tabular::scenario_to_frame;
use health_projection::{
    generate, read_history_csv, reconcile, Domain, ForecastConfig, JsonModelSource, ModelSource,
    ScenarioForecaster, Strategy,
};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::error::Error;
use std::fs::File;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a template scenario and print it to the console or export it
    Generate(GenerateArgs),
    /// Forecast performance metrics through a template scenario
    Forecast(ForecastArgs),
}

#[derive(Args, Debug)]
struct ScenarioArgs {
    /// Path to the long-form history CSV (organization, metric, domain, year, value)
    #[arg(short, long)]
    data: PathBuf,

    /// Organization code to project
    #[arg(short, long)]
    organization: String,

    /// Number of years beyond the anchor year
    #[arg(long, default_value_t = 3)]
    horizon: u32,

    /// Scenario strategy [choices: last_known, percent_change, linear]
    #[arg(long, default_value = "last_known")]
    strategy: String,

    /// Annual percentage change (for percent_change)
    #[arg(long, allow_hyphen_values = true)]
    percent: Option<f64>,

    /// Number of most recent years the trend is fitted on (for linear)
    #[arg(long)]
    linear_years: Option<usize>,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    #[command(flatten)]
    scenario: ScenarioArgs,

    /// Path to export the wide scenario table as CSV
    #[arg(long)]
    output_csv: Option<PathBuf>,

    /// Path to export the scenario as long-form JSON records
    #[arg(long)]
    output_json: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ForecastArgs {
    #[command(flatten)]
    scenario: ScenarioArgs,

    /// Path to the JSON model artifact file
    #[arg(short, long)]
    models: PathBuf,

    /// First year whose performance values are predicted
    #[arg(long, env = "PROJECTION_CUTOVER_YEAR", default_value_t = 2021)]
    cutover_year: i32,

    /// Path to export the reconciled projection as JSON
    #[arg(long)]
    output_json: Option<PathBuf>,

    /// Path to export the reconciled projection as CSV
    #[arg(long)]
    output_csv: Option<PathBuf>,
}

impl ScenarioArgs {
    fn strategy(&self) -> Result<Strategy, Box<dyn Error>> {
        Ok(Strategy::from_parts(
            &self.strategy,
            self.percent,
            self.linear_years,
        )?)
    }
}

fn run_generate(args: GenerateArgs) -> Result<(), Box<dyn Error>> {
    let history = read_history_csv(&args.scenario.data)?;
    let strategy = args.scenario.strategy()?;
    let table = generate(
        &history,
        &args.scenario.organization,
        args.scenario.horizon,
        &strategy,
    )?;
    table.summary();

    if let Some(path) = args.output_csv {
        let mut df = scenario_to_frame(&table)?;
        CsvWriter::new(File::create(path)?).finish(&mut df)?;
    }
    if let Some(path) = args.output_json {
        let json = table
            .to_json()
            .map_err(|e| format!("Failed to serialize to JSON: {}", e))?;
        std::fs::write(path, json)?;
    }
    Ok(())
}

fn run_forecast(args: ForecastArgs) -> Result<(), Box<dyn Error>> {
    let history = read_history_csv(&args.scenario.data)?;
    let models = JsonModelSource::new(&args.models).load()?;
    let strategy = args.scenario.strategy()?;
    let organization = args.scenario.organization.as_str();
    info!(models = models.len(), "model artifacts loaded");

    let scenario = generate(&history, organization, args.scenario.horizon, &strategy)?;
    let config = ForecastConfig {
        cutover_year: args.cutover_year,
        ..Default::default()
    };
    let forecaster = ScenarioForecaster::with_config(&models, config);
    let predictions = forecaster.forecast(&scenario, organization, &history)?;
    let backfit = forecaster.backfit(organization, &history)?;

    let mut scenarios = BTreeMap::new();
    scenarios.insert(strategy.scenario_name(), predictions);
    let observed = history.filter(organization, Some(Domain::Performance));
    let rows = reconcile(&observed, &backfit, &scenarios);

    println!(
        "Projection for {} ({} scenario, cutover {})",
        organization,
        strategy.scenario_name(),
        args.cutover_year
    );
    let relevant = models.relevant_inputs(5);
    if !relevant.is_empty() {
        println!("Most relevant inputs: {}", relevant.join(", "));
    }
    let mut table = Table::new();
    table.set_header(vec!["Value type", "Metric", "Year", "Value"]);
    for row in &rows {
        table.add_row(vec![
            Cell::new(row.value_type),
            Cell::new(&row.metric),
            Cell::new(row.year),
            Cell::new(format!("{:.2}", row.value)),
        ]);
    }
    println!("{}", table);

    if let Some(path) = args.output_json {
        let json = serde_json::to_string_pretty(&rows)
            .map_err(|e| format!("Failed to serialize to JSON: {}", e))?;
        std::fs::write(path, json)?;
    }
    if let Some(path) = args.output_csv {
        let mut df = to_dataframe(&rows)?;
        CsvWriter::new(File::create(path)?).finish(&mut df)?;
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Generate(args) => run_generate(args),
        Commands::Forecast(args) => run_forecast(args),
    };
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

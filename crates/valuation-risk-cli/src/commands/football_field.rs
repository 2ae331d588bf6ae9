use clap::Args;
use serde::Deserialize;
use serde_json::Value;

use valuation_risk_core::equity_research::football_field::{
    self, CompRange, FootballFieldInput, MonteCarloSummary,
};
use valuation_risk_core::monte_carlo::simulation::{self, SimulationInput, DEFAULT_SEED};
use valuation_risk_core::types::{AssumptionSet, Currency, ValuationSnapshot};

use crate::input;

/// Arguments for the football-field aggregation
#[derive(Args)]
pub struct FootballFieldArgs {
    /// Path to JSON or YAML input file
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for the end-to-end valuation summary
#[derive(Args)]
pub struct SummaryArgs {
    /// Path to JSON or YAML input file
    #[arg(long)]
    pub input: Option<String>,

    /// Override the number of simulated scenarios
    #[arg(long)]
    pub num_simulations: Option<u32>,

    /// Override the random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Currency code used for the price symbol (e.g. USD, INR)
    #[arg(long)]
    pub currency: Option<String>,
}

/// Base case for the summary pipeline.
#[derive(Debug, Deserialize)]
struct SummaryInput {
    #[serde(default)]
    valuation: ValuationSnapshot,
    #[serde(default)]
    assumptions: AssumptionSet,
    #[serde(default = "default_num_simulations")]
    num_simulations: u32,
    #[serde(default)]
    comp_multiples: Option<CompRange>,
    #[serde(default)]
    currency: Currency,
}

fn default_num_simulations() -> u32 {
    10_000
}

pub fn run_football_field(args: FootballFieldArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let ff_input: FootballFieldInput = input::load(args.input.as_deref())?
        .ok_or("--input <file.json|file.yaml> or stdin required for football field")?;
    let result = football_field::build_football_field(&ff_input)?;
    Ok(serde_json::to_value(result)?)
}

/// Simulate, aggregate and render the Markdown summary.
pub fn run_summary(args: SummaryArgs) -> Result<String, Box<dyn std::error::Error>> {
    let base: SummaryInput = input::load(args.input.as_deref())?
        .ok_or("--input <file.json|file.yaml> or stdin required for summary")?;

    let mut sim_input = SimulationInput::new(
        base.assumptions,
        base.valuation.clone(),
        args.num_simulations.unwrap_or(base.num_simulations),
    );
    sim_input.seed = args.seed.unwrap_or(DEFAULT_SEED);
    let sim = simulation::run_simulation(&sim_input)?;
    let mc = MonteCarloSummary::from(&sim.result);

    let field = football_field::create_football_field(&base.valuation, Some(&mc), base.comp_multiples.as_ref())?;
    for w in sim.warnings.iter().chain(field.warnings.iter()) {
        tracing::warn!("{}", w);
    }

    let currency = match args.currency {
        Some(code) => code.parse::<Currency>()?,
        None => base.currency,
    };
    Ok(football_field::valuation_summary_text(&field.result, &currency))
}

use clap::{Args, ValueEnum};
use serde_json::Value;

use valuation_risk_core::monte_carlo::backend::BackendKind;
use valuation_risk_core::monte_carlo::simulation::{self, SimulationInput};

use crate::input;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum BackendArg {
    Scalar,
    Parallel,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Scalar => BackendKind::Scalar,
            BackendArg::Parallel => BackendKind::Parallel,
        }
    }
}

/// Arguments for the Monte Carlo valuation simulation
#[derive(Args)]
pub struct SimulateArgs {
    /// Path to JSON or YAML input file
    #[arg(long)]
    pub input: Option<String>,

    /// Override the number of simulated scenarios
    #[arg(long)]
    pub num_simulations: Option<u32>,

    /// Override the random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Force a numeric backend instead of the automatic choice
    #[arg(long, value_enum)]
    pub backend: Option<BackendArg>,
}

pub fn run_simulate(args: SimulateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut sim_input: SimulationInput = input::load(args.input.as_deref())?
        .ok_or("--input <file.json|file.yaml> or stdin required for simulation")?;

    if let Some(n) = args.num_simulations {
        sim_input.num_simulations = n;
    }
    if let Some(seed) = args.seed {
        sim_input.seed = seed;
    }
    if let Some(backend) = args.backend {
        sim_input.backend = Some(backend.into());
    }

    let result = simulation::run_simulation(&sim_input)?;
    Ok(serde_json::to_value(result)?)
}

use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use valuation_risk_core::sensitivity::grid::{self, DataTableInput};
use valuation_risk_core::sensitivity::tornado::{self, SensitivityInput};
use valuation_risk_core::types::SensitivityVariable;

use crate::input;

/// Arguments for tornado sensitivity analysis
#[derive(Args)]
pub struct SensitivityArgs {
    /// Path to JSON or YAML input file
    #[arg(long)]
    pub input: Option<String>,

    /// Symmetric driver variation as a decimal (0.10 = ±10%)
    #[arg(long)]
    pub variation_pct: Option<Decimal>,
}

/// Arguments for the WACC x terminal growth data table
#[derive(Args)]
pub struct DataTableArgs {
    /// Path to JSON or YAML input file; the default table is used without one
    #[arg(long)]
    pub input: Option<String>,

    /// WACC sweep in format min:max:step (e.g. "0.08:0.16:0.02")
    #[arg(long)]
    pub wacc: Option<String>,

    /// Terminal growth sweep in format min:max:step (e.g. "0.02:0.06:0.01")
    #[arg(long)]
    pub growth: Option<String>,
}

fn parse_sweep(name: &str, spec: &str) -> Result<SensitivityVariable, Box<dyn std::error::Error>> {
    let parts: Vec<&str> = spec.split(':').collect();
    if parts.len() != 3 {
        return Err(format!("{} sweep must be min:max:step, got '{}'", name, spec).into());
    }
    Ok(SensitivityVariable {
        name: name.to_string(),
        min: parts[0].trim().parse()?,
        max: parts[1].trim().parse()?,
        step: parts[2].trim().parse()?,
    })
}

pub fn run_sensitivity(args: SensitivityArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut sens_input: SensitivityInput = input::load(args.input.as_deref())?
        .ok_or("--input <file.json|file.yaml> or stdin required for sensitivity analysis")?;
    if let Some(pct) = args.variation_pct {
        sens_input.variation_pct = pct;
    }
    let result = tornado::calculate_sensitivity(&sens_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_data_table(args: DataTableArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut table_input: DataTableInput = input::load(args.input.as_deref())?.unwrap_or_default();
    if let Some(ref spec) = args.wacc {
        table_input.wacc = parse_sweep("WACC", spec)?;
    }
    if let Some(ref spec) = args.growth {
        table_input.terminal_growth = parse_sweep("Terminal Growth", spec)?;
    }
    let result = grid::calculate_data_table(&table_input)?;
    Ok(serde_json::to_value(result)?)
}

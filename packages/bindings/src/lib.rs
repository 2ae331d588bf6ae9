use napi::Result as NapiResult;
use napi_derive::napi;
use serde::Deserialize;

use valuation_risk_core::equity_research::football_field::{self, FootballFieldInput};
use valuation_risk_core::types::Currency;

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

#[napi]
pub fn run_simulation(input_json: String) -> NapiResult<String> {
    let input: valuation_risk_core::monte_carlo::simulation::SimulationInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = valuation_risk_core::monte_carlo::simulation::run_simulation(&input)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Sensitivity
// ---------------------------------------------------------------------------

#[napi]
pub fn calculate_sensitivity(input_json: String) -> NapiResult<String> {
    let input: valuation_risk_core::sensitivity::tornado::SensitivityInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = valuation_risk_core::sensitivity::tornado::calculate_sensitivity(&input)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn calculate_data_table(input_json: String) -> NapiResult<String> {
    let input: valuation_risk_core::sensitivity::grid::DataTableInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = valuation_risk_core::sensitivity::grid::calculate_data_table(&input)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Football field
// ---------------------------------------------------------------------------

#[napi]
pub fn create_football_field(input_json: String) -> NapiResult<String> {
    let input: FootballFieldInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = football_field::build_football_field(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[derive(Deserialize)]
struct SummaryTextInput {
    #[serde(flatten)]
    field: FootballFieldInput,
    #[serde(default)]
    currency: Currency,
}

/// Build the football field and render it as Markdown.
#[napi]
pub fn valuation_summary_text(input_json: String) -> NapiResult<String> {
    let input: SummaryTextInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = football_field::build_football_field(&input.field).map_err(to_napi_error)?;
    Ok(football_field::valuation_summary_text(&output.result, &input.currency))
}

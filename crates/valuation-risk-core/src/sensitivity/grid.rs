use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::ValuationRiskError;
use crate::types::*;
use crate::ValuationRiskResult;

/// Upper bound on points per swept variable.
const MAX_SWEEP_POINTS: usize = 1_000;

/// Reference EV used when the base valuation carries none.
const FALLBACK_REFERENCE_EV: Decimal = dec!(10000);
const CELL_FLOOR: Decimal = dec!(0.3);
const CELL_CAP: Decimal = dec!(3);

// ---------------------------------------------------------------------------
// Generic 2-way grid
// ---------------------------------------------------------------------------

/// Input for 2-way sensitivity analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridInput {
    /// Row variable
    pub variable_1: SensitivityVariable,
    /// Column variable
    pub variable_2: SensitivityVariable,
    /// Name of the output metric being measured
    pub output_metric: String,
}

/// Output of 2-way sensitivity analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridOutput {
    pub variable_1_name: String,
    pub variable_2_name: String,
    pub variable_1_values: Vec<Decimal>,
    pub variable_2_values: Vec<Decimal>,
    pub output_metric: String,
    /// Matrix[i][j] = output when variable_1 = variable_1_values[i], variable_2 = variable_2_values[j]
    pub matrix: Vec<Vec<Decimal>>,
    /// Base case output value
    pub base_case_value: Decimal,
    /// Position of the base case in the matrix (row, col)
    pub base_case_position: (usize, usize),
}

/// Generate the sweep values for a sensitivity variable from min to max with step.
fn generate_sweep_values(var: &SensitivityVariable) -> ValuationRiskResult<Vec<Decimal>> {
    let field = format!("variable:{}", var.name);
    if var.step <= Decimal::ZERO {
        return Err(ValuationRiskError::invalid(field, "Step must be positive"));
    }
    if var.min > var.max {
        return Err(ValuationRiskError::invalid(field, "Min must be <= max"));
    }
    let points = ((var.max - var.min) / var.step).floor();
    if points >= Decimal::from(MAX_SWEEP_POINTS) {
        return Err(ValuationRiskError::invalid(
            field,
            format!("sweep exceeds {MAX_SWEEP_POINTS} points"),
        ));
    }

    let mut values = Vec::new();
    let mut current = var.min;
    while current <= var.max {
        values.push(current);
        current += var.step;
    }
    // Ensure max is included if step doesn't land exactly on it
    if let Some(&last) = values.last() {
        if last < var.max {
            values.push(var.max);
        }
    }

    Ok(values)
}

/// Find the closest index to a target value in a sorted list.
fn closest_index(values: &[Decimal], target: Decimal) -> usize {
    values
        .iter()
        .enumerate()
        .min_by_key(|(_, v)| (**v - target).abs())
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn evaluate_grid<F>(input: &GridInput, eval_fn: F) -> ValuationRiskResult<(GridOutput, Vec<String>)>
where
    F: Fn(Decimal, Decimal) -> ValuationRiskResult<Decimal>,
{
    let mut warnings: Vec<String> = Vec::new();

    let v1_values = generate_sweep_values(&input.variable_1)?;
    let v2_values = generate_sweep_values(&input.variable_2)?;

    let mut matrix = Vec::with_capacity(v1_values.len());
    for v1 in &v1_values {
        let mut row = Vec::with_capacity(v2_values.len());
        for v2 in &v2_values {
            match eval_fn(*v1, *v2) {
                Ok(val) => row.push(val),
                Err(e) => {
                    warnings.push(format!("Evaluation failed at ({v1}, {v2}): {e}"));
                    row.push(Decimal::ZERO);
                }
            }
        }
        matrix.push(row);
    }

    let mid1 = (input.variable_1.min + input.variable_1.max) / dec!(2);
    let mid2 = (input.variable_2.min + input.variable_2.max) / dec!(2);
    let base_row = closest_index(&v1_values, mid1);
    let base_col = closest_index(&v2_values, mid2);
    let base_case_value = matrix[base_row][base_col];

    let output = GridOutput {
        variable_1_name: input.variable_1.name.clone(),
        variable_2_name: input.variable_2.name.clone(),
        variable_1_values: v1_values,
        variable_2_values: v2_values,
        output_metric: input.output_metric.clone(),
        matrix,
        base_case_value,
        base_case_position: (base_row, base_col),
    };
    Ok((output, warnings))
}

/// Evaluate a 2-way sensitivity grid using a provided computation function.
///
/// The `eval_fn` receives (variable_1_value, variable_2_value) and returns
/// the output metric value. Cells whose evaluation fails are reported as
/// warnings and recorded as zero.
pub fn evaluate_sensitivity<F>(
    input: &GridInput,
    eval_fn: F,
) -> ValuationRiskResult<ComputationOutput<GridOutput>>
where
    F: Fn(Decimal, Decimal) -> ValuationRiskResult<Decimal>,
{
    let start = Instant::now();
    let (output, warnings) = evaluate_grid(input, eval_fn)?;

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "2-Way Sensitivity Analysis",
        PRECISION_DECIMAL,
        &serde_json::json!({
            "variable_1": input.variable_1.name,
            "variable_2": input.variable_2.name,
            "output_metric": input.output_metric,
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// WACC x terminal growth data table
// ---------------------------------------------------------------------------

/// Input for the WACC × terminal growth EV data table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataTableInput {
    #[serde(default = "default_reference_ev")]
    pub reference_ev: Money,
    #[serde(default = "default_reference_wacc")]
    pub reference_wacc: Rate,
    #[serde(default = "default_reference_growth")]
    pub reference_growth: Rate,
    #[serde(default = "default_wacc_sweep")]
    pub wacc: SensitivityVariable,
    #[serde(default = "default_growth_sweep")]
    pub terminal_growth: SensitivityVariable,
}

fn default_reference_ev() -> Money {
    FALLBACK_REFERENCE_EV
}

fn default_reference_wacc() -> Rate {
    DEFAULT_WACC
}

fn default_reference_growth() -> Rate {
    DEFAULT_TERMINAL_GROWTH
}

fn default_wacc_sweep() -> SensitivityVariable {
    SensitivityVariable {
        name: "WACC".into(),
        min: dec!(0.08),
        max: dec!(0.16),
        step: dec!(0.02),
    }
}

fn default_growth_sweep() -> SensitivityVariable {
    SensitivityVariable {
        name: "Terminal Growth".into(),
        min: dec!(0.02),
        max: dec!(0.06),
        step: dec!(0.01),
    }
}

impl Default for DataTableInput {
    fn default() -> Self {
        DataTableInput {
            reference_ev: default_reference_ev(),
            reference_wacc: default_reference_wacc(),
            reference_growth: default_reference_growth(),
            wacc: default_wacc_sweep(),
            terminal_growth: default_growth_sweep(),
        }
    }
}

impl DataTableInput {
    /// Reference point taken from a base valuation and its assumptions,
    /// with the default sweeps.
    pub fn from_base(valuation: &ValuationSnapshot, assumptions: &AssumptionSet) -> Self {
        let ev = valuation.enterprise_value();
        DataTableInput {
            reference_ev: if ev.is_zero() { FALLBACK_REFERENCE_EV } else { ev },
            reference_wacc: assumptions.wacc(),
            reference_growth: assumptions.terminal_growth(),
            ..Default::default()
        }
    }
}

/// One data-table cell: Gordon-style EV re-rating clamped to
/// `[0.3, 3] × reference_ev`. `wacc <= growth` (or `wacc <= 0`) pins the
/// cell to the cap.
pub fn data_table_cell(
    reference_ev: Money,
    reference_wacc: Rate,
    reference_growth: Rate,
    wacc: Rate,
    growth: Rate,
) -> Money {
    let floor = reference_ev * CELL_FLOOR;
    let cap = reference_ev * CELL_CAP;
    if wacc <= growth || wacc <= Decimal::ZERO {
        return cap.round_dp(0);
    }
    let ev = reference_wacc
        .checked_div(wacc)
        .and_then(|discount| {
            (reference_wacc - reference_growth)
                .checked_div(wacc - growth)
                .map(|terminal| (discount, terminal))
        })
        .and_then(|(discount, terminal)| reference_ev.checked_mul(discount)?.checked_mul(terminal));
    match ev {
        Some(ev) => ev.max(floor).min(cap).round_dp(0),
        None => cap.round_dp(0),
    }
}

/// Build the WACC × terminal growth enterprise value data table.
pub fn calculate_data_table(input: &DataTableInput) -> ValuationRiskResult<ComputationOutput<GridOutput>> {
    let start = Instant::now();

    let grid = GridInput {
        variable_1: input.wacc.clone(),
        variable_2: input.terminal_growth.clone(),
        output_metric: "Enterprise Value".into(),
    };
    let (output, warnings) = evaluate_grid(&grid, |wacc, growth| {
        Ok(data_table_cell(
            input.reference_ev,
            input.reference_wacc,
            input.reference_growth,
            wacc,
            growth,
        ))
    })?;

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "WACC x Terminal Growth Data Table",
        PRECISION_DECIMAL,
        &serde_json::json!({
            "reference_ev": input.reference_ev.to_string(),
            "reference_wacc": input.reference_wacc.to_string(),
            "reference_growth": input.reference_growth.to_string(),
            "clamp": ["0.3x", "3x"],
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// One-way sweep
// ---------------------------------------------------------------------------

/// One point of a single-variable sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    pub variable: String,
    pub value: Decimal,
    pub output: Decimal,
    /// (value - base) / base × 100; zero when the base is zero.
    pub change_from_base: Decimal,
}

/// Evaluate `eval_fn` at each of `values` and report the change of each
/// value relative to `base_value`.
pub fn one_way_sweep<F>(
    base_value: Decimal,
    variable_name: &str,
    values: &[Decimal],
    eval_fn: F,
) -> ValuationRiskResult<Vec<SweepPoint>>
where
    F: Fn(Decimal) -> ValuationRiskResult<Decimal>,
{
    values
        .iter()
        .map(|&value| {
            let change_from_base = if base_value.is_zero() {
                Decimal::ZERO
            } else {
                (value - base_value) / base_value * dec!(100)
            };
            Ok(SweepPoint {
                variable: variable_name.to_string(),
                value,
                output: eval_fn(value)?,
                change_from_base,
            })
        })
        .collect()
}

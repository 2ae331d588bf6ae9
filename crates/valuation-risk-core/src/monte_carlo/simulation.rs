use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::backend::{backend_for, default_backend, BackendKind, HistogramBin, NumericBackend};
use crate::error::ValuationRiskError;
use crate::types::{with_metadata, AssumptionSet, ComputationOutput, ValuationSnapshot, PRECISION_F64};
use crate::ValuationRiskResult;

/// Years of compounded growth deviation captured by the revenue effect.
const GROWTH_HORIZON_YEARS: i32 = 5;
const TERMINAL_EFFECT_FLOOR: f64 = 0.1;
const TERMINAL_EFFECT_CAP: f64 = 10.0;
/// The composite driver effect is damped toward 1.0:
/// `multiplier = effect * DRIVER_WEIGHT + ANCHOR_WEIGHT`.
const DRIVER_WEIGHT: f64 = 0.7;
const ANCHOR_WEIGHT: f64 = 0.3;
const HISTOGRAM_BINS: usize = 20;
/// Scenarios with any outcome beyond this magnitude are dropped, which
/// keeps sums of squares in the reductions finite.
const MAX_OUTCOME_MAGNITUDE: f64 = 1e100;

pub const DEFAULT_SEED: u64 = 42;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Multiplicative perturbation band: a draw `u ~ U(low, high)` scales the
/// driver by `1 + u`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VariationRange {
    pub low: f64,
    pub high: f64,
}

impl VariationRange {
    pub const fn symmetric(pct: f64) -> Self {
        VariationRange {
            low: -pct,
            high: pct,
        }
    }
}

/// Perturbation band per simulated driver. Any driver left out of the JSON
/// keeps its default band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariationRanges {
    #[serde(default = "default_revenue_growth_range")]
    pub revenue_growth: VariationRange,
    #[serde(default = "default_ebitda_margin_range")]
    pub ebitda_margin: VariationRange,
    #[serde(default = "default_terminal_growth_range")]
    pub terminal_growth: VariationRange,
    #[serde(default = "default_wacc_range")]
    pub wacc: VariationRange,
}

fn default_revenue_growth_range() -> VariationRange {
    VariationRange::symmetric(0.30)
}

fn default_ebitda_margin_range() -> VariationRange {
    VariationRange::symmetric(0.20)
}

fn default_terminal_growth_range() -> VariationRange {
    VariationRange::symmetric(0.25)
}

fn default_wacc_range() -> VariationRange {
    VariationRange::symmetric(0.15)
}

impl Default for VariationRanges {
    fn default() -> Self {
        VariationRanges {
            revenue_growth: default_revenue_growth_range(),
            ebitda_margin: default_ebitda_margin_range(),
            terminal_growth: default_terminal_growth_range(),
            wacc: default_wacc_range(),
        }
    }
}

impl VariationRanges {
    fn named(&self) -> [(&'static str, VariationRange); 4] {
        [
            ("revenue_growth", self.revenue_growth),
            ("ebitda_margin", self.ebitda_margin),
            ("terminal_growth", self.terminal_growth),
            ("wacc", self.wacc),
        ]
    }
}

/// Input for a Monte Carlo valuation simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationInput {
    #[serde(default)]
    pub assumptions: AssumptionSet,
    #[serde(default)]
    pub valuation: ValuationSnapshot,
    /// Number of simulated scenarios (must be positive).
    #[serde(default = "default_num_simulations")]
    pub num_simulations: u32,
    #[serde(default)]
    pub variation_ranges: VariationRanges,
    /// RNG seed. Identical inputs and seed reproduce identical statistics.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Override the process-wide numeric backend for this call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendKind>,
}

fn default_num_simulations() -> u32 {
    10_000
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

impl SimulationInput {
    pub fn new(assumptions: AssumptionSet, valuation: ValuationSnapshot, num_simulations: u32) -> Self {
        SimulationInput {
            assumptions,
            valuation,
            num_simulations,
            variation_ranges: VariationRanges::default(),
            seed: DEFAULT_SEED,
            backend: None,
        }
    }
}

/// Descriptive statistics for one simulated metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricStatistics {
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub percentile_5: f64,
    pub percentile_25: f64,
    pub percentile_75: f64,
    pub percentile_95: f64,
    pub histogram: Vec<HistogramBin>,
}

impl MetricStatistics {
    pub fn is_finite(&self) -> bool {
        [
            self.mean,
            self.median,
            self.std,
            self.min,
            self.max,
            self.percentile_5,
            self.percentile_25,
            self.percentile_75,
            self.percentile_95,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

/// Output of a Monte Carlo valuation simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationOutput {
    /// Scenarios requested.
    pub num_simulations: u32,
    /// Scenarios that produced finite outcomes and enter the statistics.
    pub valid_simulations: u32,
    pub share_price: MetricStatistics,
    pub enterprise_value: MetricStatistics,
    pub equity_value: MetricStatistics,
    /// Percentage (0-100) of scenarios with share price above the base price.
    pub probability_above_current: f64,
    /// Share price (P5, P95).
    pub confidence_interval_90: (f64, f64),
    pub backend: BackendKind,
}

// ---------------------------------------------------------------------------
// Sensitivity model
// ---------------------------------------------------------------------------

/// Base case in f64, as consumed by the scenario model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaseCase {
    pub enterprise_value: f64,
    pub equity_value: f64,
    pub share_price: f64,
    pub net_debt: Option<f64>,
    pub wacc: f64,
    pub terminal_growth: f64,
}

impl BaseCase {
    pub fn from_inputs(assumptions: &AssumptionSet, valuation: &ValuationSnapshot) -> Self {
        BaseCase {
            enterprise_value: to_f64(valuation.enterprise_value()),
            equity_value: to_f64(valuation.equity_value()),
            share_price: to_f64(valuation.share_price()),
            net_debt: valuation.net_debt.map(to_f64),
            wacc: to_f64(assumptions.wacc()),
            terminal_growth: to_f64(assumptions.terminal_growth()),
        }
    }
}

/// Multipliers drawn for one scenario.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScenarioDraw {
    pub revenue_growth: f64,
    pub ebitda_margin: f64,
    pub terminal_growth: f64,
    pub wacc: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScenarioOutcome {
    pub enterprise_value: f64,
    pub equity_value: f64,
    pub share_price: f64,
}

impl ScenarioOutcome {
    fn is_usable(&self) -> bool {
        [self.enterprise_value, self.equity_value, self.share_price]
            .iter()
            .all(|v| v.is_finite() && v.abs() <= MAX_OUTCOME_MAGNITUDE)
    }
}

fn to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

/// Gordon-style re-rating of the terminal value when WACC and terminal
/// growth move. Clamped to `[0.1, 10]`; a non-positive scenario spread
/// yields 1.0.
pub fn terminal_effect(base_wacc: f64, base_growth: f64, scenario_wacc: f64, scenario_growth: f64) -> f64 {
    let spread = scenario_wacc - scenario_growth;
    if !spread.is_finite() || spread <= 0.0 {
        return 1.0;
    }
    let effect = (base_wacc - base_growth) / spread;
    if effect.is_nan() {
        return 1.0;
    }
    effect.clamp(TERMINAL_EFFECT_FLOOR, TERMINAL_EFFECT_CAP)
}

/// Map one scenario's multipliers to EV, equity value and share price.
pub fn scenario_outcome(base: &BaseCase, draw: &ScenarioDraw) -> ScenarioOutcome {
    let revenue_effect = draw.revenue_growth.powi(GROWTH_HORIZON_YEARS);
    let margin_effect = draw.ebitda_margin;
    let terminal = terminal_effect(
        base.wacc,
        base.terminal_growth,
        base.wacc * draw.wacc,
        base.terminal_growth * draw.terminal_growth,
    );

    let ev_multiplier = revenue_effect * margin_effect * terminal * DRIVER_WEIGHT + ANCHOR_WEIGHT;
    let enterprise_value = base.enterprise_value * ev_multiplier;

    let equity_value = match base.net_debt {
        Some(net_debt) => enterprise_value - net_debt,
        None if base.enterprise_value != 0.0 => {
            enterprise_value * (base.equity_value / base.enterprise_value)
        }
        None => enterprise_value,
    };

    let share_price = if base.equity_value != 0.0 {
        base.share_price * (equity_value / base.equity_value)
    } else {
        base.share_price
    };

    ScenarioOutcome {
        enterprise_value,
        equity_value,
        share_price,
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn validate(input: &SimulationInput) -> ValuationRiskResult<()> {
    if input.num_simulations == 0 {
        return Err(ValuationRiskError::invalid("num_simulations", "must be positive"));
    }
    for (name, range) in input.variation_ranges.named() {
        let field = format!("variation_ranges.{name}");
        if !range.low.is_finite() || !range.high.is_finite() {
            return Err(ValuationRiskError::invalid(field, "bounds must be finite"));
        }
        if range.low > range.high {
            return Err(ValuationRiskError::invalid(
                field,
                format!("low ({}) must be <= high ({})", range.low, range.high),
            ));
        }
        if range.low <= -1.0 {
            return Err(ValuationRiskError::invalid(
                field,
                "low must be > -1 so the multiplier stays positive",
            ));
        }
    }
    Ok(())
}

fn summarize(backend: &dyn NumericBackend, values: &mut [f64]) -> MetricStatistics {
    backend.sort(values);
    MetricStatistics {
        mean: backend.mean(values),
        median: backend.percentile(values, 50.0),
        std: backend.std_dev(values),
        min: values[0],
        max: values[values.len() - 1],
        percentile_5: backend.percentile(values, 5.0),
        percentile_25: backend.percentile(values, 25.0),
        percentile_75: backend.percentile(values, 75.0),
        percentile_95: backend.percentile(values, 95.0),
        histogram: backend.histogram(values, HISTOGRAM_BINS),
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run the Monte Carlo valuation simulation.
///
/// Each scenario perturbs revenue growth, EBITDA margin, terminal growth
/// and WACC by independent uniform multipliers and maps them to a
/// valuation through the closed-form sensitivity model in
/// [`scenario_outcome`]. Scenarios with any non-finite outcome are dropped
/// before statistics are taken.
pub fn run_simulation(input: &SimulationInput) -> ValuationRiskResult<ComputationOutput<SimulationOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate(input)?;

    let backend = match input.backend {
        Some(kind) => backend_for(kind),
        None => default_backend(),
    };
    let base = BaseCase::from_inputs(&input.assumptions, &input.valuation);
    let n = input.num_simulations as usize;

    tracing::debug!(
        num_simulations = n,
        seed = input.seed,
        backend = ?backend.kind(),
        "running valuation simulation"
    );

    // One sub-stream per driver, all derived from this call's own RNG.
    let mut rng = StdRng::seed_from_u64(input.seed);
    let ranges = &input.variation_ranges;
    let draws: Vec<Vec<f64>> = ranges
        .named()
        .iter()
        .map(|(_, range)| {
            let stream: u64 = rng.gen();
            backend.uniform_variates(stream, n, range.low, range.high)
        })
        .collect();

    let mut evs: Vec<f64> = Vec::with_capacity(n);
    let mut equities: Vec<f64> = Vec::with_capacity(n);
    let mut prices: Vec<f64> = Vec::with_capacity(n);

    for i in 0..n {
        let draw = ScenarioDraw {
            revenue_growth: 1.0 + draws[0][i],
            ebitda_margin: 1.0 + draws[1][i],
            terminal_growth: 1.0 + draws[2][i],
            wacc: 1.0 + draws[3][i],
        };
        let outcome = scenario_outcome(&base, &draw);
        if outcome.is_usable() {
            evs.push(outcome.enterprise_value);
            equities.push(outcome.equity_value);
            prices.push(outcome.share_price);
        }
    }

    if prices.is_empty() {
        return Err(ValuationRiskError::InsufficientData(
            "Every simulated scenario produced a non-finite or out-of-range valuation".into(),
        ));
    }

    let dropped = n - prices.len();
    if dropped > 0 {
        let msg = format!("{dropped} of {n} scenarios dropped (non-finite or out-of-range valuation)");
        tracing::warn!("{msg}");
        warnings.push(msg);
    }
    if base.enterprise_value == 0.0 {
        warnings.push("Base enterprise value is zero; simulated values are all zero".into());
    }
    if base.equity_value == 0.0 {
        warnings.push("Base equity value is zero; share price held at base".into());
    }

    let valid = prices.len();
    let above = prices.iter().filter(|&&p| p > base.share_price).count();
    let probability_above_current = above as f64 / valid as f64 * 100.0;

    let share_price = summarize(backend, &mut prices);
    let enterprise_value = summarize(backend, &mut evs);
    let equity_value = summarize(backend, &mut equities);
    if ![&share_price, &enterprise_value, &equity_value]
        .iter()
        .all(|m| m.is_finite())
    {
        return Err(ValuationRiskError::InsufficientData(
            "Simulated sample statistics are not finite".into(),
        ));
    }
    let confidence_interval_90 = (share_price.percentile_5, share_price.percentile_95);

    let output = SimulationOutput {
        num_simulations: input.num_simulations,
        valid_simulations: valid as u32,
        share_price,
        enterprise_value,
        equity_value,
        probability_above_current,
        confidence_interval_90,
        backend: backend.kind(),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Monte Carlo Valuation Simulation",
        PRECISION_F64,
        &serde_json::json!({
            "num_simulations": input.num_simulations,
            "valid_simulations": valid,
            "seed": input.seed,
            "backend": backend.kind(),
            "variation_ranges": ranges,
            "base_wacc": base.wacc,
            "base_terminal_growth": base.terminal_growth,
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn base_assumptions() -> AssumptionSet {
        AssumptionSet {
            revenue_growth: Some(dec!(0.10)),
            ebitda_margin: Some(dec!(0.18)),
            terminal_growth: Some(dec!(0.04)),
            wacc: Some(dec!(0.12)),
            ..Default::default()
        }
    }

    fn base_valuation() -> ValuationSnapshot {
        ValuationSnapshot::new(dec!(10000), dec!(8000), dec!(100)).with_net_debt(dec!(2000))
    }

    fn basic_input() -> SimulationInput {
        SimulationInput::new(base_assumptions(), base_valuation(), 10_000)
    }

    fn base_case() -> BaseCase {
        BaseCase::from_inputs(&base_assumptions(), &base_valuation())
    }

    const NEUTRAL: ScenarioDraw = ScenarioDraw {
        revenue_growth: 1.0,
        ebitda_margin: 1.0,
        terminal_growth: 1.0,
        wacc: 1.0,
    };

    // --- Scenario model ---

    #[test]
    fn test_neutral_draw_reproduces_base() {
        let out = scenario_outcome(&base_case(), &NEUTRAL);
        assert!((out.enterprise_value - 10_000.0).abs() < 1e-9);
        assert!((out.equity_value - 8_000.0).abs() < 1e-9);
        assert!((out.share_price - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_terminal_effect_neutral() {
        assert!((terminal_effect(0.12, 0.04, 0.12, 0.04) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_terminal_effect_clamped_near_singularity() {
        let effect = terminal_effect(0.12, 0.04, 0.050_000_01, 0.05);
        assert_eq!(effect, 10.0);
        let effect = terminal_effect(0.12, 0.04, 2.0, 0.0);
        assert_eq!(effect, 0.1);
    }

    #[test]
    fn test_terminal_effect_non_positive_spread_falls_back() {
        assert_eq!(terminal_effect(0.12, 0.04, 0.05, 0.05), 1.0);
        assert_eq!(terminal_effect(0.12, 0.04, 0.04, 0.06), 1.0);
    }

    #[test]
    fn test_near_singular_scenario_stays_finite_and_positive() {
        let base = base_case();
        // 0.12 * w == 0.04 * g + tiny
        let draw = ScenarioDraw {
            wacc: 0.5,
            terminal_growth: 1.499_999,
            ..NEUTRAL
        };
        let out = scenario_outcome(&base, &draw);
        assert!(out.share_price.is_finite());
        assert!(out.share_price > 0.0);
        // 10 * 0.7 + 0.3 = 7.3x EV
        assert!((out.enterprise_value - 73_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_equity_scales_with_ratio_without_net_debt() {
        let mut base = base_case();
        base.net_debt = None;
        let draw = ScenarioDraw {
            ebitda_margin: 2.0,
            ..NEUTRAL
        };
        // multiplier = 2 * 0.7 + 0.3 = 1.7
        let out = scenario_outcome(&base, &draw);
        assert!((out.enterprise_value - 17_000.0).abs() < 1e-9);
        assert!((out.equity_value - 13_600.0).abs() < 1e-9);
        assert!((out.share_price - 170.0).abs() < 1e-9);
    }

    #[test]
    fn test_equity_subtracts_known_net_debt() {
        let draw = ScenarioDraw {
            ebitda_margin: 2.0,
            ..NEUTRAL
        };
        let out = scenario_outcome(&base_case(), &draw);
        assert!((out.equity_value - 15_000.0).abs() < 1e-9);
        assert!((out.share_price - 187.5).abs() < 1e-9);
    }

    #[test]
    fn test_zero_ev_passthrough() {
        let base = BaseCase {
            enterprise_value: 0.0,
            equity_value: 0.0,
            share_price: 50.0,
            net_debt: None,
            wacc: 0.12,
            terminal_growth: 0.04,
        };
        let out = scenario_outcome(&base, &NEUTRAL);
        assert_eq!(out.enterprise_value, 0.0);
        assert_eq!(out.equity_value, 0.0);
        assert_eq!(out.share_price, 50.0);
    }

    // --- Full simulation ---

    #[test]
    fn test_seeded_reproducibility() {
        let input = basic_input();
        let r1 = run_simulation(&input).unwrap();
        let r2 = run_simulation(&input).unwrap();
        assert_eq!(r1.result.share_price.mean, r2.result.share_price.mean);
        assert_eq!(r1.result.share_price.median, r2.result.share_price.median);
        assert_eq!(r1.result.enterprise_value.std, r2.result.enterprise_value.std);
        assert_eq!(
            r1.result.probability_above_current,
            r2.result.probability_above_current
        );
    }

    #[test]
    fn test_different_seeds_differ() {
        let mut other = basic_input();
        other.seed = 7;
        let r1 = run_simulation(&basic_input()).unwrap();
        let r2 = run_simulation(&other).unwrap();
        assert_ne!(r1.result.share_price.mean, r2.result.share_price.mean);
    }

    #[test]
    fn test_percentile_ordering() {
        let result = run_simulation(&basic_input()).unwrap();
        for s in [
            &result.result.share_price,
            &result.result.enterprise_value,
            &result.result.equity_value,
        ] {
            assert!(s.min <= s.percentile_5);
            assert!(s.percentile_5 <= s.percentile_25);
            assert!(s.percentile_25 <= s.median);
            assert!(s.median <= s.percentile_75);
            assert!(s.percentile_75 <= s.percentile_95);
            assert!(s.percentile_95 <= s.max);
        }
    }

    #[test]
    fn test_histogram_mass_conservation() {
        let result = run_simulation(&basic_input()).unwrap();
        let h = &result.result.share_price.histogram;
        assert_eq!(h.len(), 20);
        let total: u32 = h.iter().map(|b| b.count).sum();
        assert_eq!(total, 10_000);
        let pct: f64 = h.iter().map(|b| b.percentage).sum();
        assert!((pct - 100.0).abs() < 1e-9, "pct={pct}");
    }

    #[test]
    fn test_reference_scenario() {
        let result = run_simulation(&basic_input()).unwrap();
        let out = &result.result;
        assert_eq!(out.valid_simulations, 10_000);
        assert!(out.probability_above_current > 0.0);
        assert!(out.probability_above_current < 100.0);
        let (low, high) = out.confidence_interval_90;
        assert!(low < out.share_price.median);
        assert!(high > out.share_price.median);
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
    }

    #[test]
    fn test_zero_simulations_rejected() {
        let mut input = basic_input();
        input.num_simulations = 0;
        assert!(matches!(
            run_simulation(&input),
            Err(ValuationRiskError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let mut input = basic_input();
        input.variation_ranges.wacc = VariationRange { low: 0.2, high: -0.2 };
        let err = run_simulation(&input).unwrap_err();
        assert!(err.to_string().contains("variation_ranges.wacc"), "{err}");
    }

    #[test]
    fn test_range_below_minus_one_rejected() {
        let mut input = basic_input();
        input.variation_ranges.revenue_growth = VariationRange { low: -1.5, high: 0.1 };
        assert!(run_simulation(&input).is_err());
    }

    #[test]
    fn test_zero_width_ranges_collapse_to_base() {
        let mut input = basic_input();
        input.num_simulations = 500;
        input.variation_ranges = VariationRanges {
            revenue_growth: VariationRange::symmetric(0.0),
            ebitda_margin: VariationRange::symmetric(0.0),
            terminal_growth: VariationRange::symmetric(0.0),
            wacc: VariationRange::symmetric(0.0),
        };
        let out = run_simulation(&input).unwrap().result;
        assert!((out.share_price.min - 100.0).abs() < 1e-9);
        assert!((out.share_price.max - 100.0).abs() < 1e-9);
        assert_eq!(out.probability_above_current, 0.0);
        assert_eq!(out.share_price.histogram[0].count, 500);
    }

    #[test]
    fn test_zero_equity_holds_share_price() {
        let mut input = basic_input();
        input.valuation = ValuationSnapshot::new(dec!(10000), dec!(0), dec!(100));
        let result = run_simulation(&input).unwrap();
        assert_eq!(result.result.share_price.min, 100.0);
        assert_eq!(result.result.share_price.max, 100.0);
        assert!(result.warnings.iter().any(|w| w.contains("equity")));
    }

    #[test]
    fn test_missing_assumptions_use_defaults() {
        let mut input = basic_input();
        input.assumptions = AssumptionSet::default();
        let r_default = run_simulation(&input).unwrap();
        let r_explicit = run_simulation(&basic_input()).unwrap();
        assert_eq!(
            r_default.result.share_price.mean,
            r_explicit.result.share_price.mean
        );
    }

    #[test]
    fn test_partial_ranges_from_json() {
        let input: SimulationInput = serde_json::from_value(serde_json::json!({
            "valuation": { "enterprise_value": 10000, "equity_value": 8000, "share_price": 100 },
            "variation_ranges": { "wacc": { "low": -0.05, "high": 0.05 } }
        }))
        .unwrap();
        assert_eq!(input.num_simulations, 10_000);
        assert_eq!(input.seed, DEFAULT_SEED);
        assert_eq!(input.variation_ranges.wacc, VariationRange::symmetric(0.05));
        assert_eq!(
            input.variation_ranges.revenue_growth,
            VariationRange::symmetric(0.30)
        );
    }

    #[test]
    fn test_explicit_scalar_backend() {
        let mut input = basic_input();
        input.backend = Some(BackendKind::Scalar);
        let result = run_simulation(&input).unwrap();
        assert_eq!(result.result.backend, BackendKind::Scalar);
        assert_eq!(result.metadata.precision, "ieee754_f64");
    }

    #[test]
    fn test_oversized_scenarios_dropped_with_finite_statistics() {
        let mut input = basic_input();
        // (1 + u)^5 overflows the magnitude cap for all but the low end.
        input.variation_ranges.revenue_growth = VariationRange { low: 0.0, high: 1e21 };
        input.backend = Some(BackendKind::Scalar);
        let result = run_simulation(&input).unwrap();
        let r = &result.result;

        assert!(r.valid_simulations > 0 && r.valid_simulations < r.num_simulations);
        assert!(result.warnings.iter().any(|w| w.contains("scenarios dropped")));
        for m in [&r.share_price, &r.enterprise_value, &r.equity_value] {
            assert!(m.is_finite(), "{m:?}");
            assert!(m.max <= 1e100);
            let count: u32 = m.histogram.iter().map(|b| b.count).sum();
            assert_eq!(count, r.valid_simulations);
        }
    }

    #[test]
    fn test_all_scenarios_dropped_is_insufficient_data() {
        let mut input = basic_input();
        input.num_simulations = 500;
        input.variation_ranges.revenue_growth = VariationRange { low: 1e40, high: 1e62 };
        let err = run_simulation(&input).unwrap_err();
        assert!(matches!(err, ValuationRiskError::InsufficientData(_)));
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_backends_agree_statistically() {
        let mut scalar = basic_input();
        scalar.num_simulations = 20_000;
        scalar.backend = Some(BackendKind::Scalar);
        let mut parallel = scalar.clone();
        parallel.backend = Some(BackendKind::Parallel);

        let a = run_simulation(&scalar).unwrap().result.share_price;
        let b_out = run_simulation(&parallel).unwrap().result;
        assert_eq!(b_out.backend, BackendKind::Parallel);
        let b = b_out.share_price;
        let tol = 0.05 * a.median.abs();
        assert!((a.mean - b.mean).abs() < tol, "{} vs {}", a.mean, b.mean);
        assert!((a.median - b.median).abs() < tol);
        assert!((a.percentile_5 - b.percentile_5).abs() < tol);
        assert!((a.percentile_95 - b.percentile_95).abs() < 2.0 * tol);
    }
}

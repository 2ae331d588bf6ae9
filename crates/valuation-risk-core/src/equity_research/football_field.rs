use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::time::Instant;

use crate::types::{with_metadata, ComputationOutput, Currency, Money, ValuationSnapshot, PRECISION_DECIMAL};
use crate::ValuationRiskResult;

/// Share price assumed when the valuation carries none.
const FALLBACK_SHARE_PRICE: Money = dec!(100);

// ---------------------------------------------------------------------------
// Input types
// ---------------------------------------------------------------------------

/// Peer-multiple implied share price range. Missing bounds fall back to
/// 0.80 / 1.00 / 1.25 × the base share price; an empty range is treated
/// as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mid: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<Money>,
}

impl CompRange {
    pub fn new(low: Money, mid: Money, high: Money) -> Self {
        CompRange {
            low: Some(low),
            mid: Some(mid),
            high: Some(high),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.low.is_none() && self.mid.is_none() && self.high.is_none()
    }
}

/// Share price percentiles taken from a simulation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulatedSharePrice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentile_5: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub median: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentile_95: Option<f64>,
}

/// The part of a simulation result the aggregator reads. A serialized
/// simulation output deserializes into this directly. Missing percentiles
/// fall back to 0.75 / 1.00 / 1.35 × the base share price; an empty
/// summary is treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_simulations: Option<u32>,
    #[serde(default)]
    pub share_price: SimulatedSharePrice,
}

impl MonteCarloSummary {
    pub fn is_empty(&self) -> bool {
        let sp = &self.share_price;
        self.num_simulations.is_none()
            && sp.percentile_5.is_none()
            && sp.median.is_none()
            && sp.percentile_95.is_none()
    }
}

#[cfg(feature = "simulation")]
impl From<&crate::monte_carlo::simulation::SimulationOutput> for MonteCarloSummary {
    fn from(out: &crate::monte_carlo::simulation::SimulationOutput) -> Self {
        MonteCarloSummary {
            num_simulations: Some(out.valid_simulations),
            share_price: SimulatedSharePrice {
                percentile_5: Some(out.share_price.percentile_5),
                median: Some(out.share_price.median),
                percentile_95: Some(out.share_price.percentile_95),
            },
        }
    }
}

/// JSON-friendly input bundling the three arguments of [`create_football_field`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FootballFieldInput {
    #[serde(default)]
    pub valuation: ValuationSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monte_carlo_results: Option<MonteCarloSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comp_multiples: Option<CompRange>,
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Valuation methods in chart order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Dcf,
    MonteCarlo,
    Comps,
    PeMultiple,
    TradingRange,
}

impl Method {
    fn label(self) -> &'static str {
        match self {
            Method::Dcf => "DCF Analysis",
            Method::MonteCarlo => "Monte Carlo",
            Method::Comps => "EV/EBITDA Comps",
            Method::PeMultiple => "P/E Multiple",
            Method::TradingRange => "52-Week Range",
        }
    }

    fn color(self) -> &'static str {
        match self {
            Method::Dcf => "#3B82F6",
            Method::MonteCarlo => "#8B5CF6",
            Method::Comps => "#10B981",
            Method::PeMultiple => "#F59E0B",
            Method::TradingRange => "#64748B",
        }
    }

    fn range(
        self,
        description: impl Into<String>,
        (low, mid, high): (Money, Money, Money),
        confidence: Confidence,
    ) -> MethodRange {
        MethodRange {
            method: self.label().to_string(),
            description: description.into(),
            low: low.round_dp(2),
            mid: mid.round_dp(2),
            high: high.round_dp(2),
            color: self.color().to_string(),
            confidence,
        }
    }
}

/// One bar of the football field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodRange {
    pub method: String,
    pub description: String,
    pub low: Money,
    pub mid: Money,
    pub high: Money,
    pub color: String,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rating {
    #[serde(rename = "Strong Buy")]
    StrongBuy,
    Buy,
    Hold,
    Sell,
    #[serde(rename = "Strong Sell")]
    StrongSell,
}

impl Rating {
    /// First match wins; every threshold is an exclusive lower bound.
    pub fn from_upside(upside_pct: Decimal) -> Self {
        if upside_pct > dec!(20) {
            Rating::StrongBuy
        } else if upside_pct > dec!(10) {
            Rating::Buy
        } else if upside_pct > dec!(-10) {
            Rating::Hold
        } else if upside_pct > dec!(-20) {
            Rating::Sell
        } else {
            Rating::StrongSell
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Rating::StrongBuy => "Strong Buy",
            Rating::Buy => "Buy",
            Rating::Hold => "Hold",
            Rating::Sell => "Sell",
            Rating::StrongSell => "Strong Sell",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Rating::StrongBuy => "#22C55E",
            Rating::Buy => "#84CC16",
            Rating::Hold => "#F59E0B",
            Rating::Sell => "#F97316",
            Rating::StrongSell => "#EF4444",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FootballFieldSummary {
    pub min_value: Money,
    pub max_value: Money,
    pub avg_low: Money,
    pub avg_mid: Money,
    pub avg_high: Money,
    pub current_price: Money,
    /// Unweighted mean of the method mids.
    pub target_price: Money,
    /// (target / current - 1) × 100
    pub upside_potential: Decimal,
    pub rating: Rating,
    pub rating_color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartConfig {
    pub min_x: Money,
    pub max_x: Money,
    pub current_price_line: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FootballFieldOutput {
    /// Always five rows: DCF, Monte Carlo, Comps, P/E, 52-week.
    pub ranges: Vec<MethodRange>,
    pub summary: FootballFieldSummary,
    pub chart_config: ChartConfig,
}

// ---------------------------------------------------------------------------
// Row builders
// ---------------------------------------------------------------------------

fn scaled(base: Money, low: Decimal, mid: Decimal, high: Decimal) -> (Money, Money, Money) {
    (base * low, base * mid, base * high)
}

/// A supplied percentile converted to Decimal, or `fallback` when missing.
/// `None` when the supplied value is not finite.
fn percentile_or(value: Option<f64>, fallback: Money) -> Option<Money> {
    match value {
        Some(v) => Decimal::from_f64(v),
        None => Some(fallback),
    }
}

fn monte_carlo_row(
    base: Money,
    mc: Option<&MonteCarloSummary>,
    warnings: &mut Vec<String>,
) -> MethodRange {
    if let Some(mc) = mc.filter(|m| !m.is_empty()) {
        let sp = &mc.share_price;
        match (
            percentile_or(sp.percentile_5, base * dec!(0.75)),
            percentile_or(sp.median, base),
            percentile_or(sp.percentile_95, base * dec!(1.35)),
        ) {
            (Some(low), Some(mid), Some(high)) => {
                let description = match mc.num_simulations {
                    Some(n) => format!("5th-95th Percentile ({n} simulations)"),
                    None => "5th-95th Percentile".to_string(),
                };
                return Method::MonteCarlo.range(description, (low, mid, high), Confidence::Medium);
            }
            _ => {
                let msg = "Simulation percentiles are not finite; using estimated Monte Carlo range";
                tracing::warn!("{msg}");
                warnings.push(msg.into());
            }
        }
    }
    Method::MonteCarlo.range(
        "Simulated Range (estimated)",
        scaled(base, dec!(0.70), dec!(1), dec!(1.40)),
        Confidence::Low,
    )
}

fn comps_row(base: Money, comps: Option<&CompRange>, warnings: &mut Vec<String>) -> MethodRange {
    match comps.filter(|c| !c.is_empty()) {
        Some(c) => {
            let low = c.low.unwrap_or(base * dec!(0.80));
            let mid = c.mid.unwrap_or(base);
            let high = c.high.unwrap_or(base * dec!(1.25));
            if !(low <= mid && mid <= high) {
                warnings.push(format!(
                    "Comparable range is not ordered (low {low}, mid {mid}, high {high})"
                ));
            }
            Method::Comps.range("Peer Multiple Analysis", (low, mid, high), Confidence::Medium)
        }
        None => Method::Comps.range(
            "Industry Multiple Range",
            scaled(base, dec!(0.75), dec!(0.95), dec!(1.20)),
            Confidence::Low,
        ),
    }
}

fn mean(values: &[Money]) -> Money {
    values.iter().copied().sum::<Decimal>() / Decimal::from(values.len())
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Merge the valuation methods into one football field.
///
/// Always emits five ranges in a fixed order. Missing simulation results
/// or comparable multiples fall back to estimated ranges around the base
/// share price; they never cause an error.
pub fn create_football_field(
    valuation: &ValuationSnapshot,
    monte_carlo_results: Option<&MonteCarloSummary>,
    comp_multiples: Option<&CompRange>,
) -> ValuationRiskResult<ComputationOutput<FootballFieldOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let base = valuation.share_price.unwrap_or(FALLBACK_SHARE_PRICE);
    let current = valuation.current_price.unwrap_or(base);

    let week_52_low = valuation.week_52_low.unwrap_or(current * dec!(0.70));
    let week_52_high = valuation.week_52_high.unwrap_or(current * dec!(1.30));

    let ranges = vec![
        Method::Dcf.range(
            "Discounted Cash Flow (Base Case ±15%)",
            scaled(base, dec!(0.85), dec!(1), dec!(1.15)),
            Confidence::High,
        ),
        monte_carlo_row(base, monte_carlo_results, &mut warnings),
        comps_row(base, comp_multiples, &mut warnings),
        Method::PeMultiple.range(
            "Peer P/E Multiple Range",
            scaled(base, dec!(0.80), dec!(1.05), dec!(1.30)),
            Confidence::Medium,
        ),
        Method::TradingRange.range(
            "Historical Trading Range",
            (week_52_low, current, week_52_high),
            Confidence::High,
        ),
    ];

    let lows: Vec<Money> = ranges.iter().map(|r| r.low).collect();
    let mids: Vec<Money> = ranges.iter().map(|r| r.mid).collect();
    let highs: Vec<Money> = ranges.iter().map(|r| r.high).collect();

    let min_value = lows.iter().copied().min().unwrap_or_default();
    let max_value = highs.iter().copied().max().unwrap_or_default();
    let target_price = mean(&mids);

    let upside_potential = if current.is_zero() {
        warnings.push("Current price is zero; upside reported as 0".into());
        Decimal::ZERO
    } else {
        (target_price / current - Decimal::ONE) * dec!(100)
    };
    let rating = Rating::from_upside(upside_potential);

    tracing::debug!(%target_price, %upside_potential, rating = rating.label(), "football field built");

    let output = FootballFieldOutput {
        summary: FootballFieldSummary {
            min_value,
            max_value,
            avg_low: mean(&lows),
            avg_mid: target_price,
            avg_high: mean(&highs),
            current_price: current,
            target_price,
            upside_potential,
            rating,
            rating_color: rating.color().to_string(),
        },
        chart_config: ChartConfig {
            min_x: min_value * dec!(0.9),
            max_x: max_value * dec!(1.1),
            current_price_line: current,
        },
        ranges,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Football Field Valuation Summary",
        PRECISION_DECIMAL,
        &serde_json::json!({
            "base_share_price": base.to_string(),
            "current_price": current.to_string(),
            "monte_carlo_supplied": monte_carlo_results.is_some(),
            "comps_supplied": comp_multiples.is_some(),
            "weighting": "equal",
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// [`create_football_field`] over a single bundled input.
pub fn build_football_field(
    input: &FootballFieldInput,
) -> ValuationRiskResult<ComputationOutput<FootballFieldOutput>> {
    create_football_field(
        &input.valuation,
        input.monte_carlo_results.as_ref(),
        input.comp_multiples.as_ref(),
    )
}

/// Markdown summary of a football field for reports and chat replies.
pub fn valuation_summary_text(field: &FootballFieldOutput, currency: &Currency) -> String {
    let s = &field.summary;
    let sym = currency.symbol();
    let mut text = String::new();
    let _ = writeln!(text, "## Valuation Summary\n");
    let _ = writeln!(text, "**Target Price:** {sym}{:.2}", s.target_price);
    let _ = writeln!(text, "**Current Price:** {sym}{:.2}", s.current_price);
    let _ = writeln!(text, "**Upside Potential:** {:.1}%", s.upside_potential);
    let _ = writeln!(text, "**Rating:** {}\n", s.rating.label());
    let _ = writeln!(text, "### Valuation Methods:");
    for r in &field.ranges {
        let _ = writeln!(text, "- **{}:** {sym}{:.2} - {sym}{:.2}", r.method, r.low, r.high);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn minimal_valuation() -> ValuationSnapshot {
        serde_json::from_value(serde_json::json!({ "share_price": 100, "current_price": 90 })).unwrap()
    }

    #[test]
    fn test_five_ranges_in_canonical_order() {
        let out = create_football_field(&minimal_valuation(), None, None).unwrap().result;
        let methods: Vec<&str> = out.ranges.iter().map(|r| r.method.as_str()).collect();
        assert_eq!(
            methods,
            vec!["DCF Analysis", "Monte Carlo", "EV/EBITDA Comps", "P/E Multiple", "52-Week Range"]
        );
        for r in &out.ranges {
            assert!(r.low <= r.mid && r.mid <= r.high, "{r:?}");
        }
    }

    #[test]
    fn test_heuristic_ranges_known_answer() {
        let out = create_football_field(&minimal_valuation(), None, None).unwrap().result;
        let r = &out.ranges;
        assert_eq!((r[0].low, r[0].mid, r[0].high), (dec!(85), dec!(100), dec!(115)));
        assert_eq!((r[1].low, r[1].mid, r[1].high), (dec!(70), dec!(100), dec!(140)));
        assert_eq!((r[2].low, r[2].mid, r[2].high), (dec!(75), dec!(95), dec!(120)));
        assert_eq!((r[3].low, r[3].mid, r[3].high), (dec!(80), dec!(105), dec!(130)));
        assert_eq!((r[4].low, r[4].mid, r[4].high), (dec!(63), dec!(90), dec!(117)));
        assert_eq!(r[1].confidence, Confidence::Low);
        assert_eq!(r[2].confidence, Confidence::Low);
        assert_eq!(r[0].confidence, Confidence::High);
    }

    #[test]
    fn test_summary_and_rating() {
        let out = create_football_field(&minimal_valuation(), None, None).unwrap().result;
        let s = &out.summary;
        assert_eq!(s.target_price, dec!(98));
        assert_eq!(s.min_value, dec!(63));
        assert_eq!(s.max_value, dec!(140));
        assert_eq!(s.current_price, dec!(90));
        assert_eq!(s.rating, Rating::Hold);
        assert_eq!(s.rating_color, "#F59E0B");
        assert!(s.upside_potential > dec!(8.8) && s.upside_potential < dec!(8.9));
        assert_eq!(out.chart_config.min_x, dec!(56.7));
        assert_eq!(out.chart_config.max_x, dec!(154));
        assert_eq!(out.chart_config.current_price_line, dec!(90));
    }

    #[test]
    fn test_monte_carlo_and_comps_used_when_supplied() {
        let mc = MonteCarloSummary {
            num_simulations: Some(10_000),
            share_price: SimulatedSharePrice {
                percentile_5: Some(61.234),
                median: Some(104.5),
                percentile_95: Some(180.0),
            },
        };
        let comps = CompRange::new(dec!(88), dec!(99), dec!(121));
        let out = create_football_field(&minimal_valuation(), Some(&mc), Some(&comps))
            .unwrap()
            .result;
        assert_eq!(out.ranges[1].low, dec!(61.23));
        assert_eq!(out.ranges[1].mid, dec!(104.5));
        assert_eq!(out.ranges[1].confidence, Confidence::Medium);
        assert!(out.ranges[1].description.contains("10000 simulations"));
        assert_eq!(out.ranges[2].mid, dec!(99));
        assert_eq!(out.ranges[2].confidence, Confidence::Medium);
        assert_eq!(out.ranges.len(), 5);
    }

    #[test]
    fn test_non_finite_simulation_falls_back() {
        let mc = MonteCarloSummary {
            num_simulations: Some(100),
            share_price: SimulatedSharePrice {
                percentile_5: Some(f64::NAN),
                median: Some(100.0),
                percentile_95: Some(120.0),
            },
        };
        let result = create_football_field(&minimal_valuation(), Some(&mc), None).unwrap();
        assert_eq!(result.result.ranges[1].confidence, Confidence::Low);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_empty_optional_objects_read_as_absent() {
        let input: FootballFieldInput = serde_json::from_value(serde_json::json!({
            "valuation": { "share_price": 100, "current_price": 90 },
            "monte_carlo_results": {},
            "comp_multiples": {}
        }))
        .unwrap();
        let result = build_football_field(&input).unwrap();
        let r = &result.result.ranges;
        assert_eq!(r[1].description, "Simulated Range (estimated)");
        assert_eq!((r[1].low, r[1].high), (dec!(70), dec!(140)));
        assert_eq!(r[2].description, "Industry Multiple Range");
        assert_eq!((r[2].low, r[2].mid, r[2].high), (dec!(75), dec!(95), dec!(120)));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_partial_optional_objects_fill_missing_bounds() {
        let input: FootballFieldInput = serde_json::from_value(serde_json::json!({
            "valuation": { "share_price": 100, "current_price": 90 },
            "monte_carlo_results": { "share_price": { "median": 101 } },
            "comp_multiples": { "mid": 95 }
        }))
        .unwrap();
        let r = build_football_field(&input).unwrap().result.ranges;
        assert_eq!((r[1].low, r[1].mid, r[1].high), (dec!(75), dec!(101), dec!(135)));
        assert_eq!(r[1].confidence, Confidence::Medium);
        assert_eq!(r[1].description, "5th-95th Percentile");
        assert_eq!((r[2].low, r[2].mid, r[2].high), (dec!(80), dec!(95), dec!(125)));
        assert_eq!(r[2].confidence, Confidence::Medium);
    }

    #[test]
    fn test_week_52_range_used_when_present() {
        let mut v = minimal_valuation();
        v.week_52_low = Some(dec!(72.5));
        v.week_52_high = Some(dec!(131));
        let out = create_football_field(&v, None, None).unwrap().result;
        assert_eq!(out.ranges[4].low, dec!(72.5));
        assert_eq!(out.ranges[4].high, dec!(131));
        assert_eq!(out.ranges[4].mid, dec!(90));
    }

    #[test]
    fn test_missing_prices_default() {
        let out = create_football_field(&ValuationSnapshot::default(), None, None)
            .unwrap()
            .result;
        assert_eq!(out.ranges[0].mid, dec!(100));
        assert_eq!(out.summary.current_price, dec!(100));
    }

    #[test]
    fn test_zero_current_price_does_not_divide() {
        let v = ValuationSnapshot {
            share_price: Some(dec!(100)),
            current_price: Some(Decimal::ZERO),
            ..Default::default()
        };
        let result = create_football_field(&v, None, None).unwrap();
        assert_eq!(result.result.summary.upside_potential, Decimal::ZERO);
        assert_eq!(result.result.summary.rating, Rating::Hold);
        assert!(!result.warnings.is_empty());
    }

    #[test]
    fn test_rating_thresholds_are_exclusive() {
        assert_eq!(Rating::from_upside(dec!(20.01)), Rating::StrongBuy);
        assert_eq!(Rating::from_upside(dec!(20)), Rating::Buy);
        assert_eq!(Rating::from_upside(dec!(10)), Rating::Hold);
        assert_eq!(Rating::from_upside(dec!(-10)), Rating::Sell);
        assert_eq!(Rating::from_upside(dec!(-20)), Rating::StrongSell);
        assert_eq!(Rating::from_upside(dec!(-50)), Rating::StrongSell);
    }

    #[test]
    fn test_rating_serializes_as_label() {
        let json = serde_json::to_value(Rating::StrongBuy).unwrap();
        assert_eq!(json, serde_json::json!("Strong Buy"));
    }

    #[test]
    fn test_input_accepts_simulation_json_shape() {
        let input: FootballFieldInput = serde_json::from_value(serde_json::json!({
            "valuation": { "share_price": 100 },
            "monte_carlo_results": {
                "num_simulations": 1000,
                "valid_simulations": 1000,
                "share_price": { "mean": 101.0, "median": 99.0, "percentile_5": 70.0, "percentile_95": 140.0 },
                "probability_above_current": 48.0
            }
        }))
        .unwrap();
        let out = build_football_field(&input).unwrap().result;
        assert_eq!(out.ranges[1].mid, dec!(99));
    }

    #[test]
    fn test_summary_text() {
        let out = create_football_field(&minimal_valuation(), None, None).unwrap().result;
        let text = valuation_summary_text(&out, &Currency::INR);
        assert!(text.starts_with("## Valuation Summary"));
        assert!(text.contains("**Target Price:** ₹98.00"));
        assert!(text.contains("**Rating:** Hold"));
        assert!(text.contains("- **DCF Analysis:** ₹85.00 - ₹115.00"));
        assert_eq!(text.lines().filter(|l| l.starts_with("- **")).count(), 5);
    }
}

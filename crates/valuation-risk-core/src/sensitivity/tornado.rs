use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::ValuationRiskError;
use crate::types::{
    with_metadata, AssumptionSet, ComputationOutput, Money, Rate, ValuationSnapshot,
    PRECISION_DECIMAL,
};
use crate::ValuationRiskResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Input for one-at-a-time (tornado) sensitivity analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityInput {
    #[serde(default)]
    pub valuation: ValuationSnapshot,
    #[serde(default)]
    pub assumptions: AssumptionSet,
    /// Symmetric move applied to each driver (0.10 = ±10%).
    #[serde(default = "default_variation_pct")]
    pub variation_pct: Rate,
}

fn default_variation_pct() -> Rate {
    dec!(0.10)
}

impl SensitivityInput {
    pub fn new(valuation: ValuationSnapshot, assumptions: AssumptionSet) -> Self {
        SensitivityInput {
            valuation,
            assumptions,
            variation_pct: default_variation_pct(),
        }
    }
}

/// Sign of a driver's effect on enterprise value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactDirection {
    Positive,
    Negative,
}

impl ImpactDirection {
    fn sign(self) -> Decimal {
        match self {
            ImpactDirection::Positive => Decimal::ONE,
            ImpactDirection::Negative => Decimal::NEGATIVE_ONE,
        }
    }
}

/// Calibrated EV response to one driver: EV moves `coefficient` percentage
/// points per 1% move in the driver, in `direction`.
struct DriverFactor {
    key: &'static str,
    label: &'static str,
    coefficient: Decimal,
    direction: ImpactDirection,
    base: fn(&AssumptionSet) -> Rate,
}

const DRIVERS: [DriverFactor; 6] = [
    DriverFactor {
        key: "revenue_growth",
        label: "Revenue Growth",
        coefficient: dec!(3.0),
        direction: ImpactDirection::Positive,
        base: AssumptionSet::revenue_growth,
    },
    DriverFactor {
        key: "ebitda_margin",
        label: "EBITDA Margin",
        coefficient: dec!(2.5),
        direction: ImpactDirection::Positive,
        base: AssumptionSet::ebitda_margin,
    },
    DriverFactor {
        key: "wacc",
        label: "WACC",
        coefficient: dec!(4.0),
        direction: ImpactDirection::Negative,
        base: AssumptionSet::wacc,
    },
    DriverFactor {
        key: "terminal_growth",
        label: "Terminal Growth",
        coefficient: dec!(2.0),
        direction: ImpactDirection::Positive,
        base: AssumptionSet::terminal_growth,
    },
    DriverFactor {
        key: "tax_rate",
        label: "Tax Rate",
        coefficient: dec!(1.5),
        direction: ImpactDirection::Negative,
        base: AssumptionSet::tax_rate,
    },
    DriverFactor {
        key: "capex_percent",
        label: "Capex % of Revenue",
        coefficient: dec!(1.0),
        direction: ImpactDirection::Negative,
        base: AssumptionSet::capex_percent,
    },
];

/// Valuation response to moving one driver up and down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssumptionSensitivity {
    pub key: String,
    pub assumption: String,
    pub direction: ImpactDirection,
    pub base_value: Rate,
    pub up_value: Rate,
    pub down_value: Rate,
    pub up_ev: Money,
    pub down_ev: Money,
    pub up_share_price: Money,
    pub down_share_price: Money,
    /// |up_ev - down_ev|; the sort key.
    pub ev_range: Money,
    pub share_price_range: Money,
    pub impact_rank: Decimal,
}

/// One bar of a tornado chart, rounded for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TornadoBar {
    pub name: String,
    /// Share price with the driver moved down.
    pub low: Money,
    /// Share price with the driver moved up.
    pub high: Money,
    pub base: Money,
    pub low_delta: Money,
    pub high_delta: Money,
    pub range: Money,
}

/// Output of tornado sensitivity analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityOutput {
    pub base_ev: Money,
    pub base_equity: Money,
    pub base_share_price: Money,
    pub variation_pct: Rate,
    /// Sorted by `ev_range`, largest swing first.
    pub sensitivities: Vec<AssumptionSensitivity>,
    pub tornado_data: Vec<TornadoBar>,
}

// ---------------------------------------------------------------------------
// Core calculation
// ---------------------------------------------------------------------------

/// Share price implied by an EV, holding net debt at its base level.
/// `None` when the result does not fit in a Decimal.
fn implied_share_price(ev: Money, net_debt: Money, base_equity: Money, base_price: Money) -> Option<Money> {
    if base_equity.is_zero() {
        return Some(base_price);
    }
    let ratio = ev.checked_sub(net_debt)?.checked_div(base_equity)?;
    base_price.checked_mul(ratio)
}

/// Up and down EV for one driver, or `None` on Decimal overflow.
fn shocked_evs(base_ev: Money, signed_impact: Decimal) -> Option<(Money, Money)> {
    let up = base_ev.checked_mul(Decimal::ONE.checked_add(signed_impact)?)?;
    let down = base_ev.checked_mul(Decimal::ONE.checked_sub(signed_impact)?)?;
    Some((up, down))
}

fn format_tornado(sensitivities: &[AssumptionSensitivity], base_price: Money) -> Vec<TornadoBar> {
    sensitivities
        .iter()
        .map(|s| {
            let lo = s.up_share_price.min(s.down_share_price);
            let hi = s.up_share_price.max(s.down_share_price);
            TornadoBar {
                name: s.assumption.clone(),
                low: s.down_share_price.round_dp(2),
                high: s.up_share_price.round_dp(2),
                base: base_price.round_dp(2),
                low_delta: lo.saturating_sub(base_price).round_dp(2),
                high_delta: hi.saturating_sub(base_price).round_dp(2),
                range: s.share_price_range.round_dp(2),
            }
        })
        .collect()
}

/// Rank each valuation driver by how far a ±`variation_pct` move swings
/// enterprise value.
///
/// Uses fixed per-driver EV coefficients rather than the simulation model;
/// the two answer different questions and need not agree. Drivers with a
/// zero base value are skipped. When base equity is zero the share price
/// is held at base.
pub fn calculate_sensitivity(
    input: &SensitivityInput,
) -> ValuationRiskResult<ComputationOutput<SensitivityOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let v = input.variation_pct;
    if v <= Decimal::ZERO {
        return Err(ValuationRiskError::invalid("variation_pct", "must be positive"));
    }

    let base_ev = input.valuation.enterprise_value();
    let base_equity = input.valuation.equity_value();
    let base_price = input.valuation.share_price();
    let net_debt = base_ev
        .checked_sub(base_equity)
        .ok_or_else(|| ValuationRiskError::invalid("valuation", "net debt overflows decimal range"))?;

    if base_equity.is_zero() {
        warnings.push("Base equity value is zero; share price held at base".into());
    }
    if base_ev.is_zero() {
        warnings.push("Base enterprise value is zero; EV sensitivities are all zero".into());
    }

    let mut sensitivities: Vec<AssumptionSensitivity> = Vec::with_capacity(DRIVERS.len());

    for driver in &DRIVERS {
        let base_value = (driver.base)(&input.assumptions);
        if base_value.is_zero() {
            let msg = format!("{} is zero; skipped", driver.label);
            tracing::warn!(driver = driver.key, "{msg}");
            warnings.push(msg);
            continue;
        }

        let shocked = v.checked_mul(driver.coefficient).and_then(|impact| {
            let (up_ev, down_ev) = shocked_evs(base_ev, impact * driver.direction.sign())?;
            let up_value = base_value.checked_mul(Decimal::ONE.checked_add(v)?)?;
            let down_value = base_value.checked_mul(Decimal::ONE.checked_sub(v)?)?;
            let ev_range = up_ev.checked_sub(down_ev)?.abs();
            Some((impact, up_ev, down_ev, up_value, down_value, ev_range))
        });
        let Some((ev_impact_pct, up_ev, down_ev, up_value, down_value, ev_range)) = shocked else {
            let msg = format!("{} shock overflows decimal range; skipped", driver.label);
            tracing::warn!(driver = driver.key, "{msg}");
            warnings.push(msg);
            continue;
        };

        let prices = implied_share_price(up_ev, net_debt, base_equity, base_price)
            .zip(implied_share_price(down_ev, net_debt, base_equity, base_price));
        let (up_share_price, down_share_price) = prices.unwrap_or_else(|| {
            let msg = format!("{} implied share price overflows; held at base", driver.label);
            tracing::warn!(driver = driver.key, "{msg}");
            warnings.push(msg);
            (base_price, base_price)
        });

        sensitivities.push(AssumptionSensitivity {
            key: driver.key.to_string(),
            assumption: driver.label.to_string(),
            direction: driver.direction,
            base_value,
            up_value,
            down_value,
            up_ev,
            down_ev,
            up_share_price,
            down_share_price,
            ev_range,
            share_price_range: up_share_price.saturating_sub(down_share_price).abs(),
            impact_rank: ev_impact_pct.abs(),
        });
    }

    // Stable: equal swings keep driver order.
    sensitivities.sort_by(|a, b| b.ev_range.cmp(&a.ev_range));

    let tornado_data = format_tornado(&sensitivities, base_price);

    let output = SensitivityOutput {
        base_ev,
        base_equity,
        base_share_price: base_price,
        variation_pct: v,
        sensitivities,
        tornado_data,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Tornado Sensitivity Analysis",
        PRECISION_DECIMAL,
        &serde_json::json!({
            "variation_pct": v.to_string(),
            "drivers": DRIVERS.iter().map(|d| d.key).collect::<Vec<_>>(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates expressed as decimals (0.05 = 5%). Never as percentages.
pub type Rate = Decimal;

/// Currency code. Serialized as its ISO code; parsing is case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Currency {
    GBP,
    #[default]
    USD,
    EUR,
    INR,
    JPY,
    Other(String),
}

impl Currency {
    /// Symbol used when rendering amounts for humans.
    pub fn symbol(&self) -> &str {
        match self {
            Currency::GBP => "£",
            Currency::USD => "$",
            Currency::EUR => "€",
            Currency::INR => "₹",
            Currency::JPY => "¥",
            Currency::Other(code) => code.as_str(),
        }
    }
}

impl Currency {
    pub fn code(&self) -> &str {
        match self {
            Currency::GBP => "GBP",
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::INR => "INR",
            Currency::JPY => "JPY",
            Currency::Other(code) => code.as_str(),
        }
    }
}

impl TryFrom<String> for Currency {
    type Error = std::convert::Infallible;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Currency> for String {
    fn from(c: Currency) -> Self {
        c.code().to_string()
    }
}

impl std::str::FromStr for Currency {
    type Err = std::convert::Infallible;

    /// ISO codes are case-insensitive; anything unrecognised becomes `Other`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        Ok(match code.as_str() {
            "GBP" => Currency::GBP,
            "USD" => Currency::USD,
            "EUR" => Currency::EUR,
            "INR" => Currency::INR,
            "JPY" => Currency::JPY,
            _ => Currency::Other(code),
        })
    }
}

// ---------------------------------------------------------------------------
// Base inputs shared by every component
// ---------------------------------------------------------------------------

pub const DEFAULT_REVENUE_GROWTH: Rate = dec!(0.10);
pub const DEFAULT_EBITDA_MARGIN: Rate = dec!(0.18);
pub const DEFAULT_TERMINAL_GROWTH: Rate = dec!(0.04);
pub const DEFAULT_WACC: Rate = dec!(0.12);
pub const DEFAULT_TAX_RATE: Rate = dec!(0.25);
pub const DEFAULT_CAPEX_PERCENT: Rate = dec!(0.05);

/// Named financial drivers of a valuation. Missing drivers read as
/// industry-neutral defaults; nothing here is ever mutated by a component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssumptionSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revenue_growth: Option<Rate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ebitda_margin: Option<Rate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_growth: Option<Rate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wacc: Option<Rate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_rate: Option<Rate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capex_percent: Option<Rate>,
    /// Any other drivers supplied by the caller. Carried, never read.
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_json::Value>,
}

impl AssumptionSet {
    pub fn revenue_growth(&self) -> Rate {
        self.revenue_growth.unwrap_or(DEFAULT_REVENUE_GROWTH)
    }

    pub fn ebitda_margin(&self) -> Rate {
        self.ebitda_margin.unwrap_or(DEFAULT_EBITDA_MARGIN)
    }

    pub fn terminal_growth(&self) -> Rate {
        self.terminal_growth.unwrap_or(DEFAULT_TERMINAL_GROWTH)
    }

    pub fn wacc(&self) -> Rate {
        self.wacc.unwrap_or(DEFAULT_WACC)
    }

    pub fn tax_rate(&self) -> Rate {
        self.tax_rate.unwrap_or(DEFAULT_TAX_RATE)
    }

    pub fn capex_percent(&self) -> Rate {
        self.capex_percent.unwrap_or(DEFAULT_CAPEX_PERCENT)
    }
}

/// Base-case valuation produced upstream. All amounts share one unit
/// (e.g. crores); `equity_value = enterprise_value - net_debt` is the
/// caller's responsibility.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValuationSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enterprise_value: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equity_value: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_price: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_debt: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_price: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub week_52_low: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub week_52_high: Option<Money>,
}

impl ValuationSnapshot {
    pub fn new(enterprise_value: Money, equity_value: Money, share_price: Money) -> Self {
        ValuationSnapshot {
            enterprise_value: Some(enterprise_value),
            equity_value: Some(equity_value),
            share_price: Some(share_price),
            ..Default::default()
        }
    }

    pub fn with_net_debt(mut self, net_debt: Money) -> Self {
        self.net_debt = Some(net_debt);
        self
    }

    pub fn with_current_price(mut self, current_price: Money) -> Self {
        self.current_price = Some(current_price);
        self
    }

    pub fn enterprise_value(&self) -> Money {
        self.enterprise_value.unwrap_or(Decimal::ZERO)
    }

    pub fn equity_value(&self) -> Money {
        self.equity_value.unwrap_or(Decimal::ZERO)
    }

    pub fn share_price(&self) -> Money {
        self.share_price.unwrap_or(Decimal::ZERO)
    }
}

// ---------------------------------------------------------------------------
// Sweep definitions
// ---------------------------------------------------------------------------

/// Sensitivity variable specification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityVariable {
    pub name: String,
    pub min: Decimal,
    pub max: Decimal,
    pub step: Decimal,
}

// ---------------------------------------------------------------------------
// Output envelope
// ---------------------------------------------------------------------------

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

pub const PRECISION_DECIMAL: &str = "rust_decimal_128bit";
pub const PRECISION_F64: &str = "ieee754_f64";

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    precision: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: precision.to_string(),
        },
    }
}

//! Per-model prices for cost reporting.
//!
//! Lookup is exact on the model name (after any `provider/` prefix). An
//! unregistered model is an error rather than a guess, so reported totals
//! are never silently wrong.

use std::collections::BTreeMap;

use crate::client::Usage;
use crate::errors::RedpenError;

/// Price of a model in USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrice {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPrice {
    pub const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    /// Cost of one exchange.
    pub fn cost(&self, usage: &Usage) -> f64 {
        (usage.prompt_tokens as f64 / 1_000_000.0) * self.input_per_million
            + (usage.completion_tokens as f64 / 1_000_000.0) * self.output_per_million
    }
}

impl std::str::FromStr for ModelPrice {
    type Err = String;

    /// Parse `INPUT:OUTPUT` in USD per million tokens.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (input, output) = s
            .split_once(':')
            .ok_or_else(|| format!("expected INPUT:OUTPUT, got `{}`", s))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<f64>()
                .ok()
                .filter(|p| p.is_finite() && *p >= 0.0)
                .ok_or_else(|| format!("invalid price `{}`", v))
        };
        Ok(Self::new(parse(input)?, parse(output)?))
    }
}

const BUILTIN: &[(&str, ModelPrice)] = &[
    ("gpt-3.5-turbo-0301", ModelPrice::new(2.0, 2.0)),
    ("gpt-3.5-turbo", ModelPrice::new(0.5, 1.5)),
    ("gpt-4", ModelPrice::new(30.0, 60.0)),
    ("gpt-4-turbo", ModelPrice::new(10.0, 30.0)),
    ("gpt-4o", ModelPrice::new(2.5, 10.0)),
    ("gpt-4o-mini", ModelPrice::new(0.15, 0.6)),
    ("gpt-4.1", ModelPrice::new(2.0, 8.0)),
    ("gpt-4.1-mini", ModelPrice::new(0.4, 1.6)),
    ("o3-mini", ModelPrice::new(1.1, 4.4)),
];

/// Registered model prices.
#[derive(Debug, Clone)]
pub struct PriceTable {
    prices: BTreeMap<String, ModelPrice>,
}

impl Default for PriceTable {
    fn default() -> Self {
        Self {
            prices: BUILTIN
                .iter()
                .map(|(name, price)| (name.to_string(), *price))
                .collect(),
        }
    }
}

impl PriceTable {
    /// An empty table.
    pub fn empty() -> Self {
        Self {
            prices: BTreeMap::new(),
        }
    }

    /// Register or replace a model's price.
    pub fn with_price(mut self, model: impl Into<String>, price: ModelPrice) -> Self {
        self.prices.insert(model.into(), price);
        self
    }

    /// Look up a model's price.
    pub fn price_for(&self, model: &str) -> Result<ModelPrice, RedpenError> {
        self.prices
            .get(model)
            .or_else(|| {
                let name = model.rsplit('/').next().unwrap_or(model);
                self.prices.get(name)
            })
            .copied()
            .ok_or_else(|| RedpenError::UnknownPricingTier {
                model: model.to_string(),
            })
    }

    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.prices.keys().map(String::as_str)
    }
}

/// Running cost total for one model.
#[derive(Debug, Clone)]
pub struct CostLedger {
    model: String,
    table: PriceTable,
    total: f64,
    tokens: u64,
}

impl CostLedger {
    pub fn new(model: impl Into<String>, table: PriceTable) -> Self {
        Self {
            model: model.into(),
            table,
            total: 0.0,
            tokens: 0,
        }
    }

    /// Price `usage` and add it to the total, returning the incremental cost.
    ///
    /// Nothing is added when the model has no registered price.
    pub fn record(&mut self, usage: &Usage) -> Result<f64, RedpenError> {
        let cost = self.table.price_for(&self.model)?.cost(usage);
        self.total += cost;
        self.tokens += usage.total_tokens;
        Ok(cost)
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn tokens(&self) -> u64 {
        self.tokens
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

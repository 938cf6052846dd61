//! Exchange rate abstractions and core types

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateInfo {
    pub code: String,
    pub value: f64,
}

impl RateInfo {
    pub fn new(code: &str, value: f64) -> Self {
        Self {
            code: code.to_string(),
            value,
        }
    }
}

/// Latest rates for one base currency as reported by a provider.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LatestRates {
    pub rates: BTreeMap<String, RateInfo>,
    pub last_updated_at: String,
}

/// One complete fetch result for a base currency.
///
/// Snapshots are never mutated after construction; a newer fetch replaces
/// the whole value in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateSnapshot {
    pub base_currency: String,
    pub rates: BTreeMap<String, RateInfo>,
    #[serde(rename = "last_updated_at")]
    pub provider_updated_at: String,
    pub fetched_at: DateTime<Utc>,
}

impl RateSnapshot {
    pub fn from_latest(
        base_currency: &str,
        latest: LatestRates,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            base_currency: base_currency.to_string(),
            rates: latest.rates,
            provider_updated_at: latest.last_updated_at,
            fetched_at,
        }
    }

    pub fn rate(&self, target: &str) -> Option<f64> {
        self.rates.get(target).map(|r| r.value)
    }
}

/// Source of exchange rate data consumed by the workers.
#[async_trait]
pub trait RateProvider: Send + Sync {
    async fn fetch_latest(&self, base_currency: &str) -> Result<LatestRates>;
}

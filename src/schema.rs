use crate::error::{DealReportError, Result};
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// One raw reading from the external feed. A `None` measure means "not yet
/// ingested", which is distinct from a recorded zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Observation {
    #[schemars(description = "Entity identifier, e.g. a city name")]
    pub entity: String,

    #[schemars(description = "Observation date in YYYY-MM-DD format")]
    pub date: NaiveDate,

    #[schemars(
        description = "Measured transaction volume for the day. Null means the value has not been ingested yet; a recorded zero must be an explicit 0."
    )]
    pub measure: Option<f64>,
}

impl Observation {
    pub fn new(entity: impl Into<String>, date: NaiveDate, measure: Option<f64>) -> Self {
        Self {
            entity: entity.into(),
            date,
            measure,
        }
    }
}

/// Static entity classification, loaded once per run and immutable after.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TierConfig {
    #[schemars(
        description = "Tier labels in display order, e.g. [\"tier-1\", \"tier-2\", \"tier-3/4\"]. The overall tier is appended after all of these."
    )]
    pub tier_order: Vec<String>,

    #[schemars(description = "Mapping from entity identifier to tier label")]
    pub assignments: BTreeMap<String, String>,

    #[serde(default = "default_overall_tier")]
    #[schemars(
        description = "Synthetic tier label for the grand roll-up row. Must not collide with a real tier label."
    )]
    pub overall_tier: String,
}

fn default_overall_tier() -> String {
    "all-tiers".to_string()
}

impl TierConfig {
    pub fn tier_of(&self, entity: &str) -> Option<&str> {
        self.assignments.get(entity).map(String::as_str)
    }

    /// Sort position of a tier label. The overall tier sorts after every
    /// real tier; unknown labels get none.
    pub fn ordinal(&self, tier: &str) -> Option<usize> {
        if tier == self.overall_tier {
            return Some(self.tier_order.len());
        }
        self.tier_order.iter().position(|t| t == tier)
    }

    fn validate(&self) -> Result<()> {
        for (entity, tier) in &self.assignments {
            if !self.tier_order.iter().any(|t| t == tier) {
                return Err(DealReportError::UnknownTierLabel {
                    entity: entity.clone(),
                    tier: tier.clone(),
                });
            }
        }
        if self.tier_order.iter().any(|t| t == &self.overall_tier) {
            return Err(DealReportError::UnknownTierLabel {
                entity: "<overall row>".to_string(),
                tier: self.overall_tier.clone(),
            });
        }
        Ok(())
    }
}

/// A named out-of-band source for filling observations the feed missed,
/// applied after the zero-fill pass. Re-running with the same corrections
/// yields identical results.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CorrectionSource {
    #[schemars(description = "Source name, used in diagnostics")]
    pub name: String,

    #[schemars(description = "Corrected values keyed by entity and date")]
    pub values: Vec<Correction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Correction {
    pub entity: String,
    pub date: NaiveDate,
    pub measure: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReportConfig {
    #[schemars(description = "Name of the measure being reported, e.g. 'deal_area'")]
    pub measure_name: String,

    #[schemars(description = "The full panel of entities covered by the report")]
    pub entities: Vec<String>,

    pub tiers: TierConfig,

    #[serde(default)]
    #[schemars(
        description = "Entities whose missing values on holidays and weekends default to zero. Gaps on trading days are never zero-filled."
    )]
    pub zero_fill_entities: BTreeSet<String>,

    #[serde(default = "default_exclusion_ratio")]
    #[schemars(
        description = "An entity is excluded from ratio computations for a window when its zero-valued days exceed this fraction of the window"
    )]
    pub exclusion_zero_ratio: f64,

    #[serde(default = "default_weekly_buckets")]
    #[schemars(description = "Number of report weeks aggregated in a weekly run")]
    pub weekly_buckets: usize,

    #[serde(default = "default_monthly_buckets")]
    #[schemars(description = "Number of calendar months aggregated in a monthly run")]
    pub monthly_buckets: usize,

    #[serde(default = "default_comparison_buckets")]
    #[schemars(description = "Number of trailing buckets shown as columns in the comparison table")]
    pub comparison_buckets: usize,
}

fn default_exclusion_ratio() -> f64 {
    1.0 / 3.0
}

fn default_weekly_buckets() -> usize {
    8
}

fn default_monthly_buckets() -> usize {
    6
}

fn default_comparison_buckets() -> usize {
    4
}

impl ReportConfig {
    pub fn validate(&self) -> Result<()> {
        if self.entities.is_empty() {
            return Err(DealReportError::EmptyEntitySet);
        }
        if !(self.exclusion_zero_ratio > 0.0 && self.exclusion_zero_ratio <= 1.0) {
            return Err(DealReportError::InvalidThreshold(self.exclusion_zero_ratio));
        }
        for count in [
            self.weekly_buckets,
            self.monthly_buckets,
            self.comparison_buckets,
        ] {
            if count < 2 {
                return Err(DealReportError::InvalidBucketCount(count));
            }
        }
        self.tiers.validate()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ReportConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

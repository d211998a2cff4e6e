use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DealReportError {
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("Entity set is empty: a report needs at least one entity")]
    EmptyEntitySet,

    #[error("Invalid bucket count {0}: a comparison needs at least 2 buckets")]
    InvalidBucketCount(usize),

    #[error("Invalid exclusion threshold {0}: must be within (0.0, 1.0]")]
    InvalidThreshold(f64),

    #[error("Entity '{entity}' is assigned tier '{tier}' which is not in the configured tier order")]
    UnknownTierLabel { entity: String, tier: String },

    #[error("Roll-up mismatch for '{row}' in {bucket}: overall {overall} != constituent sum {sum}")]
    RollupMismatch {
        row: String,
        bucket: String,
        overall: f64,
        sum: f64,
    },

    #[error("Date calculation error: {0}")]
    DateError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DealReportError>;

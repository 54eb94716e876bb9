//! Deployment configuration
//!
//! Loaded from a JSON file where every field is optional:
//!
//! ```json
//! {
//!   "curve": { "custom": { "p": "23", "a": "1", "b": "1" } },
//!   "dataset_size": 49,
//!   "bucket_count": 13,
//!   "workers": 8,
//!   "client_bias": { "probability": 1.0, "digits_num": 4, "digits_den": 5 }
//! }
//! ```

use std::path::Path;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_BUCKET_COUNT, DEFAULT_DATASET_SIZE, DEFAULT_WORKERS};
use crate::curve::CurveParams;
use crate::error::{ConfigError, Error};
use crate::scalar::ScalarBias;

/// Which curve the deployment runs on
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveConfig {
    #[default]
    Secp256k1,
    /// Constants as decimal strings
    Custom { p: String, a: String, b: String },
}

impl CurveConfig {
    /// Resolve and check the curve; fails if `p` is not a prime `≡ 3 (mod 4)`
    pub fn params(&self) -> Result<CurveParams, Error> {
        match self {
            CurveConfig::Secp256k1 => Ok(CurveParams::secp256k1()),
            CurveConfig::Custom { p, a, b } => {
                let p = parse_decimal("curve.p", p)?;
                let a = parse_decimal("curve.a", a)?;
                let b = parse_decimal("curve.b", b)?;
                Ok(CurveParams::new(p, a, b)?)
            }
        }
    }
}

fn parse_decimal(field: &'static str, value: &str) -> Result<BigUint, ConfigError> {
    BigUint::parse_bytes(value.trim().as_bytes(), 10).ok_or_else(|| ConfigError::InvalidInteger {
        field,
        value: value.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub curve: CurveConfig,
    /// Universe size N
    pub dataset_size: usize,
    /// Bucket count B
    pub bucket_count: usize,
    pub workers: usize,
    /// Owner's scalar `r`
    pub setup_bias: ScalarBias,
    /// Client session scalar `m`
    pub client_bias: ScalarBias,
    /// Intermediary nonce `t`
    pub nonce_bias: ScalarBias,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            curve: CurveConfig::default(),
            dataset_size: DEFAULT_DATASET_SIZE,
            bucket_count: DEFAULT_BUCKET_COUNT,
            workers: DEFAULT_WORKERS,
            setup_bias: ScalarBias::setup_default(),
            client_bias: ScalarBias::client_default(),
            nonce_bias: ScalarBias::nonce_default(),
        }
    }
}

impl ProtocolConfig {
    /// Read and validate a JSON config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        tracing::debug!(path = %path.as_ref().display(), "Loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dataset_size == 0 {
            return Err(ConfigError::Invalid("dataset_size must be at least 1".into()));
        }
        if self.bucket_count == 0 {
            return Err(ConfigError::Invalid("bucket_count must be at least 1".into()));
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        for (name, bias) in [
            ("setup_bias", &self.setup_bias),
            ("client_bias", &self.client_bias),
            ("nonce_bias", &self.nonce_bias),
        ] {
            if !(0.0..=1.0).contains(&bias.probability) {
                return Err(ConfigError::Invalid(format!(
                    "{}.probability must be within [0, 1]",
                    name
                )));
            }
            if bias.digits_den == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{}.digits_den must be at least 1",
                    name
                )));
            }
        }
        Ok(())
    }
}

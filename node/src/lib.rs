use commonware_codec::DecodeExt;
use commonware_cryptography::ed25519::PublicKey;
use commonware_utils::{from_hex_formatted, hex};
use qchess_execution::{LedgerConfig, Rules, RulesError, TransferError, Treasury};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;
use tracing::{info, Level};

pub mod script;

pub use script::{run_script, Action, MatchReport, Script, ScriptError, ScriptOutcome, Step, StepReport};

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Turn timeout used by scripted games that do not set their own.
pub const DEFAULT_TIMEOUT_SECS: u64 = 1800;

#[derive(Clone, PartialEq, Eq)]
pub struct HexBytes(Vec<u8>);

impl HexBytes {
    pub fn from_hex_formatted(value: &str) -> Option<Self> {
        from_hex_formatted(value).map(Self)
    }
}

impl AsRef<[u8]> for HexBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for HexBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex(self.as_ref()))
    }
}

impl Serialize for HexBytes {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&hex(self.as_ref()))
    }
}

impl<'de> Deserialize<'de> for HexBytes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        let bytes = from_hex_formatted(&value)
            .ok_or_else(|| serde::de::Error::custom("expected a hex string"))?;
        Ok(Self(bytes))
    }
}

/// Node configuration, read from YAML.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub rules: Rules,
    /// Hex-encoded public key allowed to declare outcomes on its own.
    #[serde(default)]
    pub arbiter: Option<HexBytes>,
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            rules: Rules::default(),
            arbiter: None,
            default_timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} is invalid: {value}")]
    InvalidDecode {
        field: &'static str,
        value: String,
        #[source]
        source: commonware_codec::Error,
    },
    #[error("invalid log level: {value}")]
    InvalidLogLevel { value: String },
    #[error("invalid rules: {0}")]
    InvalidRules(#[from] RulesError),
    #[error("default_timeout_secs ({got}) is below min_timeout_secs ({min})")]
    TimeoutTooShort { got: u64, min: u64 },
}

#[derive(Clone, Debug)]
pub struct ValidatedConfig {
    pub log_level: Level,
    pub rules: Rules,
    pub arbiter: Option<PublicKey>,
    pub default_timeout_secs: u64,
}

impl ValidatedConfig {
    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            rules: self.rules.clone(),
            arbiter: self.arbiter.clone(),
        }
    }
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn decode_bytes<T: DecodeExt<()>>(field: &'static str, value: &HexBytes) -> Result<T, ConfigError> {
    T::decode(value.as_ref()).map_err(|source| ConfigError::InvalidDecode {
        field,
        value: hex(value.as_ref()),
        source,
    })
}

impl Config {
    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        let log_level =
            Level::from_str(&self.log_level).map_err(|_| ConfigError::InvalidLogLevel {
                value: self.log_level.clone(),
            })?;
        self.rules.validate()?;
        if self.default_timeout_secs < self.rules.min_timeout_secs {
            return Err(ConfigError::TimeoutTooShort {
                got: self.default_timeout_secs,
                min: self.rules.min_timeout_secs,
            });
        }
        let arbiter = self
            .arbiter
            .as_ref()
            .map(|value| decode_bytes::<PublicKey>("arbiter", value))
            .transpose()?;

        Ok(ValidatedConfig {
            log_level,
            rules: self.rules,
            arbiter,
            default_timeout_secs: self.default_timeout_secs,
        })
    }
}

/// Treasury that settles every withdrawal by logging it.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingTreasury;

impl Treasury for LoggingTreasury {
    async fn transfer(&self, to: &PublicKey, amount: u64) -> Result<(), TransferError> {
        info!(to = ?to, amount, "transfer");
        Ok(())
    }
}

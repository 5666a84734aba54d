//! Configuration loading and typed settings for Remit components.

use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use chrono::Duration;
use config::{Config, File};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Top-level settings consumed by the withdrawal core.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemitSettings {
    pub storage: StorageSettings,
    pub withdrawal: WithdrawalPolicy,
}

impl RemitSettings {
    /// Load settings from a TOML file, failing if the file is absent.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_source(path.as_ref(), true)
    }

    /// Load settings from a TOML file, falling back to defaults when absent.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_source(path.as_ref(), false)
    }

    fn from_source(path: &Path, required: bool) -> Result<Self> {
        let raw = Config::builder()
            .add_source(File::from(path).required(required))
            .build()
            .with_context(|| format!("failed to read settings from {}", path.display()))?;
        let settings: Self = raw
            .try_deserialize()
            .with_context(|| format!("malformed settings in {}", path.display()))?;
        settings.withdrawal.validate()?;
        Ok(settings)
    }

    /// Render the default settings as a commented-out starting point.
    pub fn sample_toml() -> String {
        toml::to_string_pretty(&Self::default()).expect("default settings serialize")
    }
}

/// Location of the transactional store.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub database_path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/remit.db"),
        }
    }
}

/// Tunable limits applied when admitting withdrawal requests.
///
/// The duplicate window and pending-request cap are deliberate policy
/// choices, not protocol constants, so they live here rather than in code.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WithdrawalPolicy {
    /// Smallest amount a user may withdraw, in whole currency units.
    pub min_amount: Decimal,
    /// Maximum simultaneous pending requests per user.
    pub max_pending_requests: u32,
    /// Window within which an identical pending request counts as a duplicate.
    pub duplicate_window_secs: u64,
    /// Mobile banking providers the platform can pay out to.
    pub providers: Vec<String>,
    /// Minimum accepted length of holder/bank/account names, after trimming.
    pub min_name_len: usize,
    /// Accepted bank account number length bounds.
    pub account_number_min_len: usize,
    pub account_number_max_len: usize,
}

impl Default for WithdrawalPolicy {
    fn default() -> Self {
        Self {
            min_amount: Decimal::from(100),
            max_pending_requests: 5,
            duplicate_window_secs: 300,
            providers: vec![
                "bkash".to_string(),
                "nagad".to_string(),
                "rocket".to_string(),
                "upay".to_string(),
            ],
            min_name_len: 3,
            account_number_min_len: 6,
            account_number_max_len: 20,
        }
    }
}

impl WithdrawalPolicy {
    pub fn duplicate_window(&self) -> Duration {
        Duration::seconds(self.duplicate_window_secs as i64)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.min_amount > Decimal::ZERO,
            "min_amount must be positive"
        );
        ensure!(
            self.min_amount == self.min_amount.trunc(),
            "min_amount must be a whole number of currency units"
        );
        ensure!(
            self.max_pending_requests >= 1,
            "max_pending_requests must be at least 1"
        );
        ensure!(
            self.duplicate_window_secs >= 1,
            "duplicate_window_secs must be at least 1"
        );
        ensure!(
            !self.providers.is_empty(),
            "at least one mobile banking provider is required"
        );
        ensure!(self.min_name_len >= 1, "min_name_len must be at least 1");
        ensure!(
            self.account_number_min_len >= 1
                && self.account_number_min_len <= self.account_number_max_len,
            "account number length bounds are inconsistent"
        );
        Ok(())
    }

    /// Case-insensitive membership test against the configured provider set.
    pub fn supports_provider(&self, provider: &str) -> bool {
        self.providers
            .iter()
            .any(|known| known.eq_ignore_ascii_case(provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let settings = RemitSettings::default();
        settings.withdrawal.validate().unwrap();
        assert_eq!(settings.withdrawal.min_amount, dec!(100));
        assert_eq!(settings.withdrawal.max_pending_requests, 5);
        assert!(settings.withdrawal.supports_provider("BKASH"));
        assert!(!settings.withdrawal.supports_provider("paypal"));
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "[withdrawal]\nmin_amount = \"250\"\nmax_pending_requests = 2\n"
        )
        .unwrap();
        let settings = RemitSettings::load(file.path()).unwrap();
        assert_eq!(settings.withdrawal.min_amount, dec!(250));
        assert_eq!(settings.withdrawal.max_pending_requests, 2);
        // untouched keys keep their defaults
        assert_eq!(settings.withdrawal.duplicate_window_secs, 300);
    }

    #[test]
    fn rejects_inconsistent_policy() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(file, "[withdrawal]\nmin_amount = \"0\"\n").unwrap();
        assert!(RemitSettings::load(file.path()).is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let settings = RemitSettings::load_or_default("does-not-exist.toml").unwrap();
        assert_eq!(settings.withdrawal.duplicate_window(), Duration::minutes(5));
    }

    #[test]
    fn sample_toml_parses_back() {
        let sample = RemitSettings::sample_toml();
        let parsed: RemitSettings = toml::from_str(&sample).unwrap();
        parsed.withdrawal.validate().unwrap();
    }
}

//! Scan configuration.
//!
//! Missing fields take their defaults, so `{}` is a valid configuration file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::bip32::{Network, HARDENED_OFFSET};
use crate::error::{Result, WalletError};

pub const DEFAULT_MAX_ACCOUNTS: u32 = 5;
pub const DEFAULT_MAX_ADDRESS_INDEX: u32 = 5;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
  /// Stop at the first match in scan order.
  #[default]
  First,
  /// Report every match.
  All,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct ScanConfig {
  /// Accounts `0..max_accounts` are scanned.
  pub max_accounts: u32,
  /// Receive indices `0..max_address_index` are scanned per account.
  pub max_address_index: u32,
  pub mode: ScanMode,
  pub parallel: bool,
  pub network: Network,
}

impl Default for ScanConfig {
  fn default() -> Self {
    ScanConfig {
      max_accounts: DEFAULT_MAX_ACCOUNTS,
      max_address_index: DEFAULT_MAX_ADDRESS_INDEX,
      mode: ScanMode::First,
      parallel: false,
      network: Network::Mainnet,
    }
  }
}

impl ScanConfig {
  pub fn from_json(s: &str) -> Result<Self> {
    let config: ScanConfig = serde_json::from_str(s)?;
    config.validate()?;
    Ok(config)
  }

  pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let s = std::fs::read_to_string(path)
      .map_err(|e| WalletError::Config(format!("{}: {e}", path.display())))?;
    Self::from_json(&s)
  }

  /// Bounds must be non-zero and fit in a non-hardened child index.
  pub fn validate(&self) -> Result<()> {
    for (name, bound) in [
      ("maxAccounts", self.max_accounts),
      ("maxAddressIndex", self.max_address_index),
    ] {
      if bound == 0 {
        return Err(WalletError::Config(format!("{name} must be at least 1")));
      }
      if bound > HARDENED_OFFSET {
        return Err(WalletError::Config(format!(
          "{name} must not exceed {HARDENED_OFFSET}"
        )));
      }
    }
    Ok(())
  }
}

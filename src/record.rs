//! Output records.
//!
//! Field names serialize in camelCase so the documents map 1:1 onto the wallet
//! API's JSON shape.

use std::fmt;

use serde::Serialize;
use zeroize::Zeroize;

use crate::address::Scheme;
use crate::bip32::DerivationPath;
use crate::error::{Result, WalletError};

/// One derived address with its key material.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressRecord {
  pub scheme: Scheme,
  pub path: DerivationPath,
  pub address: String,
  pub public_key_hex: String,
  pub private_key_hex: String,
  #[serde(rename = "privateKeyWIF", skip_serializing_if = "Option::is_none")]
  pub private_key_wif: Option<String>,
}

impl Drop for AddressRecord {
  fn drop(&mut self) {
    self.private_key_hex.zeroize();
    self.private_key_wif.zeroize();
  }
}

impl fmt::Debug for AddressRecord {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("AddressRecord")
      .field("scheme", &self.scheme)
      .field("path", &self.path.to_string())
      .field("address", &self.address)
      .field("public_key_hex", &self.public_key_hex)
      .finish_non_exhaustive()
  }
}

/// Outcome of reconciling a target address against a mnemonic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationResult {
  pub found: bool,
  /// In scan order.
  pub matches: Vec<AddressRecord>,
  /// Number of candidates that were derived and compared.
  pub scanned: usize,
}

impl ReconciliationResult {
  pub fn from_matches(matches: Vec<AddressRecord>, scanned: usize) -> Self {
    ReconciliationResult {
      found: !matches.is_empty(),
      matches,
      scanned,
    }
  }

  /// The earliest match in scan order.
  pub fn first(&self) -> Option<&AddressRecord> {
    self.matches.first()
  }
}

#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct KeyPair {
  pub hex: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub wif: Option<String>,
}

impl Drop for KeyPair {
  fn drop(&mut self) {
    self.hex.zeroize();
    self.wif.zeroize();
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrimaryAddresses {
  pub bitcoin: String,
  pub spark: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BitcoinAddresses {
  pub segwit: String,
  pub nested_segwit: String,
  pub taproot: String,
  pub legacy: String,
}

#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct PrivateKeys {
  pub bitcoin: KeyPair,
  pub spark: KeyPair,
}

/// The generate/import response document.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletBundle {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub mnemonic: Option<String>,
  pub addresses: PrimaryAddresses,
  pub bitcoin_addresses: BitcoinAddresses,
  pub private_keys: PrivateKeys,
}

impl Drop for WalletBundle {
  fn drop(&mut self) {
    self.mnemonic.zeroize();
  }
}

impl fmt::Debug for WalletBundle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("WalletBundle")
      .field("addresses", &self.addresses)
      .field("bitcoin_addresses", &self.bitcoin_addresses)
      .finish_non_exhaustive()
  }
}

impl WalletBundle {
  /// Assemble a bundle from one record per scheme. `bitcoin` is the native SegWit record.
  pub fn from_records(records: &[AddressRecord], mnemonic: Option<String>) -> Result<Self> {
    let pick = |scheme: Scheme| {
      records
        .iter()
        .find(|r| r.scheme == scheme)
        .ok_or_else(|| WalletError::Config(format!("no {scheme} record to build a wallet from")))
    };
    let legacy = pick(Scheme::Legacy)?;
    let nested = pick(Scheme::NestedSegwit)?;
    let native = pick(Scheme::NativeSegwit)?;
    let taproot = pick(Scheme::Taproot)?;
    let spark = pick(Scheme::Spark)?;

    Ok(WalletBundle {
      mnemonic,
      addresses: PrimaryAddresses {
        bitcoin: native.address.clone(),
        spark: spark.address.clone(),
      },
      bitcoin_addresses: BitcoinAddresses {
        segwit: native.address.clone(),
        nested_segwit: nested.address.clone(),
        taproot: taproot.address.clone(),
        legacy: legacy.address.clone(),
      },
      private_keys: PrivateKeys {
        bitcoin: KeyPair {
          hex: native.private_key_hex.clone(),
          wif: native.private_key_wif.clone(),
        },
        spark: KeyPair {
          hex: spark.private_key_hex.clone(),
          wif: spark.private_key_wif.clone(),
        },
      },
    })
  }
}

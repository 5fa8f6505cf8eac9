//! Reconcile a target address against everything a mnemonic can derive.
//!
//! The search runs in two phases. The standard paths (account 0, index 0 of
//! every scheme) come first, then the rest of the bounded search space.
//! Candidates are compared in a fixed order (account, then address index,
//! then scheme), so "first match" means the same thing whether the scan runs
//! on one thread or many.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info};
use zeroize::Zeroize;

use crate::address::{to_wif, AddressEncoder, BitcoinEncoder, Scheme};
use crate::bip32::{derive_priv_from_path, DerivationPath, ExtendedPrivKey, Network};
use crate::config::{ScanConfig, ScanMode};
use crate::error::{Result, WalletError};
use crate::mnemonic::Mnemonic;
use crate::paths::{Candidate, PathCatalog, ScanCandidates};
use crate::record::{AddressRecord, ReconciliationResult, WalletBundle};
use crate::spark::{SparkAddressEncoder, SparkBech32m};

/// Cooperative cancellation for a running scan.
///
/// Clones share the flag. Workers check it before each candidate.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::Release);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::Acquire)
  }
}

/// Ordinal-addressable search space for one target scheme family.
#[derive(Clone, Debug)]
enum SearchSpace {
  Bitcoin(ScanCandidates),
  Spark { catalog: PathCatalog, accounts: u32 },
}

impl SearchSpace {
  fn len(&self) -> usize {
    match self {
      SearchSpace::Bitcoin(space) => space.len(),
      SearchSpace::Spark { accounts, .. } => *accounts as usize,
    }
  }

  /// How many leading candidates are the standard paths.
  fn standard_len(&self) -> usize {
    let n = match self {
      SearchSpace::Bitcoin(_) => Scheme::BITCOIN.len(),
      SearchSpace::Spark { .. } => 1,
    };
    n.min(self.len())
  }

  fn get(&self, ordinal: usize) -> Option<Candidate> {
    match self {
      SearchSpace::Bitcoin(space) => space.get(ordinal as u64),
      SearchSpace::Spark { catalog, accounts } => {
        let account = u32::try_from(ordinal).ok().filter(|a| a < accounts)?;
        let path = catalog.spark_path(account).ok()?;
        Some(Candidate {
          scheme: Scheme::Spark,
          path,
        })
      }
    }
  }
}

/// Derives candidate addresses from a mnemonic and matches them against a target.
///
/// Both encoders are strategies fixed at construction; the defaults produce
/// standard Bitcoin addresses and bech32m Spark addresses.
pub struct WalletReconciler<A = BitcoinEncoder, S = SparkBech32m> {
  bitcoin: A,
  spark: S,
  catalog: PathCatalog,
}

impl WalletReconciler {
  pub fn new(network: Network) -> Self {
    WalletReconciler::with_encoders(
      BitcoinEncoder::new(network),
      SparkBech32m::new(network),
      network,
    )
  }
}

impl Default for WalletReconciler {
  fn default() -> Self {
    WalletReconciler::new(Network::Mainnet)
  }
}

impl<A: AddressEncoder, S: SparkAddressEncoder> WalletReconciler<A, S> {
  pub fn with_encoders(bitcoin: A, spark: S, network: Network) -> Self {
    WalletReconciler {
      bitcoin,
      spark,
      catalog: PathCatalog::new(network),
    }
  }

  pub fn network(&self) -> Network {
    self.catalog.network
  }

  pub fn catalog(&self) -> &PathCatalog {
    &self.catalog
  }

  fn master(&self, mnemonic: &Mnemonic, passphrase: &str) -> Result<ExtendedPrivKey> {
    let seed = mnemonic.to_seed(passphrase);
    Ok(ExtendedPrivKey::master(seed.as_bytes())?)
  }

  fn encode(&self, scheme: Scheme, node: &ExtendedPrivKey) -> Result<String> {
    let pk = node.public_key();
    match scheme {
      Scheme::Spark => self.spark.spark_address(&pk),
      scheme => self.bitcoin.encode(scheme, &pk),
    }
  }

  fn address_at(&self, master: &ExtendedPrivKey, candidate: &Candidate) -> Result<(ExtendedPrivKey, String)> {
    let node = derive_priv_from_path(master, candidate.path.as_slice())?;
    let address = self.encode(candidate.scheme, &node)?;
    Ok((node, address))
  }

  fn record(&self, node: &ExtendedPrivKey, candidate: &Candidate, address: String) -> AddressRecord {
    let mut secret = node.secret_bytes();
    let record = AddressRecord {
      scheme: candidate.scheme,
      path: candidate.path.clone(),
      address,
      public_key_hex: hex::encode(node.public_key().serialize()),
      private_key_hex: hex::encode(secret),
      private_key_wif: candidate
        .scheme
        .has_wif()
        .then(|| to_wif(&secret, self.network())),
    };
    secret.zeroize();
    record
  }

  fn derive_record(&self, master: &ExtendedPrivKey, candidate: &Candidate) -> Result<AddressRecord> {
    let (node, address) = self.address_at(master, candidate)?;
    Ok(self.record(&node, candidate, address))
  }

  /// One record per candidate, in input order.
  pub fn derive_all<I>(&self, mnemonic: &Mnemonic, passphrase: &str, candidates: I) -> Result<Vec<AddressRecord>>
  where
    I: IntoIterator<Item = Candidate>,
  {
    let master = self.master(mnemonic, passphrase)?;
    candidates
      .into_iter()
      .map(|c| self.derive_record(&master, &c))
      .collect()
  }

  /// For each path in order, one record per scheme in `schemes`. Each key is derived once.
  pub fn derive_schemes(
    &self,
    mnemonic: &Mnemonic,
    passphrase: &str,
    schemes: &[Scheme],
    paths: &[DerivationPath],
  ) -> Result<Vec<AddressRecord>> {
    let master = self.master(mnemonic, passphrase)?;
    let mut records = Vec::with_capacity(schemes.len() * paths.len());
    for path in paths {
      let node = derive_priv_from_path(&master, path.as_slice())?;
      for &scheme in schemes {
        let address = self.encode(scheme, &node)?;
        let candidate = Candidate {
          scheme,
          path: path.clone(),
        };
        records.push(self.record(&node, &candidate, address));
      }
    }
    Ok(records)
  }

  /// Every address type at index 0 of `account`, plus the account's Spark identity.
  pub fn derive_wallet(&self, mnemonic: &Mnemonic, passphrase: &str, account: u32) -> Result<WalletBundle> {
    let mut candidates = self.catalog.standard_paths(account)?;
    candidates.push(Candidate {
      scheme: Scheme::Spark,
      path: self.catalog.spark_path(account)?,
    });
    let records = self.derive_all(mnemonic, passphrase, candidates)?;
    debug!(account, "derived wallet");
    WalletBundle::from_records(&records, None)
  }

  /// Which scheme `target` belongs to, or `InvalidAddress`.
  pub fn classify_target(&self, target: &str) -> Result<Scheme> {
    if self.spark.recognizes(target) {
      return Ok(Scheme::Spark);
    }
    self.bitcoin.classify(target)
  }

  pub fn find_match(
    &self,
    mnemonic: &Mnemonic,
    passphrase: &str,
    target: &str,
    config: &ScanConfig,
  ) -> Result<ReconciliationResult> {
    self.find_match_with_cancel(mnemonic, passphrase, target, config, &CancellationToken::new())
  }

  /// Like [`find_match`](Self::find_match), aborting with `Cancelled` once `cancel` fires.
  pub fn find_match_with_cancel(
    &self,
    mnemonic: &Mnemonic,
    passphrase: &str,
    target: &str,
    config: &ScanConfig,
    cancel: &CancellationToken,
  ) -> Result<ReconciliationResult> {
    config.validate()?;
    if config.network != self.network() {
      return Err(WalletError::Config(format!(
        "scan network {:?} does not match encoder network {:?}",
        config.network,
        self.network()
      )));
    }
    let scheme = self.classify_target(target)?;
    // bech32 strings compare case-insensitively; encoders emit lowercase
    let target = match scheme {
      Scheme::Legacy | Scheme::NestedSegwit => target.to_string(),
      _ => target.to_ascii_lowercase(),
    };
    let space = match scheme {
      Scheme::Spark => SearchSpace::Spark {
        catalog: self.catalog,
        accounts: config.max_accounts,
      },
      _ => SearchSpace::Bitcoin(
        self
          .catalog
          .scan_candidates(config.max_accounts, config.max_address_index),
      ),
    };
    let master = self.master(mnemonic, passphrase)?;
    debug!(
      %scheme,
      candidates = space.len(),
      mode = ?config.mode,
      parallel = config.parallel,
      "reconciling target"
    );

    let standard = space.standard_len();
    let mut matches = Vec::new();
    let mut scanned = 0;
    for (phase, range) in [("standard", 0..standard), ("extended", standard..space.len())] {
      debug!(phase, candidates = range.len(), "scan phase");
      let (hits, n) = if config.parallel {
        self.scan_parallel(&master, &space, range, &target, config.mode, cancel)?
      } else {
        self.scan_sequential(&master, &space, range, &target, config.mode, cancel)?
      };
      scanned += n;
      matches.extend(hits);
      if config.mode == ScanMode::First && !matches.is_empty() {
        break;
      }
    }
    debug!(scanned, matches = matches.len(), "scan finished");
    Ok(ReconciliationResult::from_matches(matches, scanned))
  }

  fn scan_sequential(
    &self,
    master: &ExtendedPrivKey,
    space: &SearchSpace,
    range: Range<usize>,
    target: &str,
    mode: ScanMode,
    cancel: &CancellationToken,
  ) -> Result<(Vec<AddressRecord>, usize)> {
    let mut hits = Vec::new();
    let mut scanned = 0;
    for ordinal in range {
      if cancel.is_cancelled() {
        return Err(WalletError::Cancelled);
      }
      let Some(candidate) = space.get(ordinal) else {
        break;
      };
      scanned += 1;
      let (node, address) = self.address_at(master, &candidate)?;
      if address == target {
        info!(scheme = %candidate.scheme, path = %candidate.path, "target matched");
        hits.push(self.record(&node, &candidate, address));
        if mode == ScanMode::First {
          break;
        }
      }
    }
    Ok((hits, scanned))
  }

  /// Workers skip ordinals past the best match found so far, so the earliest
  /// match always wins regardless of scheduling.
  fn scan_parallel(
    &self,
    master: &ExtendedPrivKey,
    space: &SearchSpace,
    range: Range<usize>,
    target: &str,
    mode: ScanMode,
    cancel: &CancellationToken,
  ) -> Result<(Vec<AddressRecord>, usize)> {
    let best = AtomicUsize::new(usize::MAX);
    let scanned = AtomicUsize::new(0);
    let mut hits: Vec<(usize, AddressRecord)> = range
      .into_par_iter()
      .map(|ordinal| -> Result<Option<(usize, AddressRecord)>> {
        if cancel.is_cancelled() {
          return Err(WalletError::Cancelled);
        }
        if mode == ScanMode::First && ordinal > best.load(Ordering::Acquire) {
          return Ok(None);
        }
        let Some(candidate) = space.get(ordinal) else {
          return Ok(None);
        };
        scanned.fetch_add(1, Ordering::Relaxed);
        let (node, address) = self.address_at(master, &candidate)?;
        if address != target {
          return Ok(None);
        }
        best.fetch_min(ordinal, Ordering::AcqRel);
        info!(scheme = %candidate.scheme, path = %candidate.path, "target matched");
        Ok(Some((ordinal, self.record(&node, &candidate, address))))
      })
      .filter_map(|hit| hit.transpose())
      .collect::<Result<_>>()?;

    hits.sort_unstable_by_key(|(ordinal, _)| *ordinal);
    if mode == ScanMode::First {
      hits.truncate(1);
    }
    let hits = hits.into_iter().map(|(_, record)| record).collect();
    Ok((hits, scanned.into_inner()))
  }

  /// The first match in scan order, if any.
  pub fn find_first(
    &self,
    mnemonic: &Mnemonic,
    passphrase: &str,
    target: &str,
    config: &ScanConfig,
  ) -> Result<Option<AddressRecord>> {
    let config = ScanConfig {
      mode: ScanMode::First,
      ..config.clone()
    };
    let result = self.find_match(mnemonic, passphrase, target, &config)?;
    Ok(result.matches.into_iter().next())
  }

  /// Every match in scan order.
  pub fn find_all(
    &self,
    mnemonic: &Mnemonic,
    passphrase: &str,
    target: &str,
    config: &ScanConfig,
  ) -> Result<Vec<AddressRecord>> {
    let config = ScanConfig {
      mode: ScanMode::All,
      ..config.clone()
    };
    Ok(self.find_match(mnemonic, passphrase, target, &config)?.matches)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bip32::HARDENED_OFFSET;

  const ABANDON: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

  fn abandon() -> Mnemonic {
    Mnemonic::parse(ABANDON).unwrap()
  }

  fn small(max_accounts: u32, max_address_index: u32) -> ScanConfig {
    ScanConfig {
      max_accounts,
      max_address_index,
      ..ScanConfig::default()
    }
  }

  #[test]
  fn standard_path_fixtures() {
    let r = WalletReconciler::default();
    let records = r
      .derive_all(&abandon(), "", r.catalog().standard_paths(0).unwrap())
      .unwrap();
    let addrs: Vec<&str> = records.iter().map(|r| r.address.as_str()).collect();
    assert_eq!(
      addrs,
      [
        "1LqBGSKuX5yYUonjxT5qGfpUsXKYYWeabA",
        "37VucYSaXLCAsxYyAPfbSi9eh4iEcbShgf",
        "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu",
        "bc1p5cyxnuxmeuwuvkwfem96lqzszd02n6xdcjrs20cac6yqjjwudpxqkedrcr",
      ]
    );
    assert_eq!(
      records[2].public_key_hex,
      "0330d54fd0dd420a6e5f8d3624f5f3482cae350f79d5f0753bf5beef9c2d91af3c"
    );
    assert_eq!(
      records[2].private_key_wif.as_deref(),
      Some("KyZpNDKnfs94vbrwhJneDi77V6jF64PWPF8x5cdJb8ifgg2DUc9d")
    );
    assert!(records[3].private_key_wif.is_none());
  }

  #[test]
  fn standard_match_is_found_without_extended_scan() {
    let r = WalletReconciler::default();
    let result = r
      .find_match(&abandon(), "", "37VucYSaXLCAsxYyAPfbSi9eh4iEcbShgf", &small(5, 5))
      .unwrap();
    assert!(result.found);
    assert_eq!(result.scanned, 2);
    assert_eq!(result.matches[0].path.to_string(), "m/49'/0'/0'/0/0");
    assert_eq!(result.matches[0].scheme, Scheme::NestedSegwit);
  }

  #[test]
  fn bech32_targets_compare_case_insensitively() {
    let r = WalletReconciler::default();
    let target = "BC1QCR8TE4KR609GCAWUTMRZA0J4XV80JY8Z306FYU";
    let hit = r.find_first(&abandon(), "", target, &small(1, 1)).unwrap();
    assert_eq!(hit.unwrap().scheme, Scheme::NativeSegwit);
  }

  #[test]
  fn passphrase_changes_the_wallet() {
    let r = WalletReconciler::default();
    let result = r
      .find_match(&abandon(), "TREZOR", "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu", &small(1, 2))
      .unwrap();
    assert!(!result.found);
    assert_eq!(result.scanned, 8);
  }

  #[test]
  fn rejects_invalid_config_and_network_mismatch() {
    let r = WalletReconciler::default();
    let target = "1LqBGSKuX5yYUonjxT5qGfpUsXKYYWeabA";
    assert!(matches!(
      r.find_match(&abandon(), "", target, &small(0, 5)),
      Err(WalletError::Config(_))
    ));
    let testnet = ScanConfig {
      network: Network::Testnet,
      ..ScanConfig::default()
    };
    assert!(matches!(
      r.find_match(&abandon(), "", target, &testnet),
      Err(WalletError::Config(_))
    ));
  }

  #[test]
  fn spark_identity_is_found_at_its_account() {
    let r = WalletReconciler::default();
    let wallet = r.derive_wallet(&abandon(), "", 1).unwrap();
    let target = wallet.addresses.spark.clone();
    assert!(target.starts_with("sp1p"));

    let hit = r.find_first(&abandon(), "", &target, &small(3, 1)).unwrap().unwrap();
    assert_eq!(hit.scheme, Scheme::Spark);
    assert_eq!(hit.path.to_string(), "m/8797555'/1'/0'");
    assert_eq!(hit.private_key_hex, wallet.private_keys.spark.hex);
  }

  #[test]
  fn derive_wallet_rejects_hardened_account() {
    let r = WalletReconciler::default();
    assert!(matches!(
      r.derive_wallet(&abandon(), "", HARDENED_OFFSET),
      Err(WalletError::InvalidDerivationPath(_))
    ));
  }

  #[test]
  fn cancelled_token_aborts_scan() {
    let r = WalletReconciler::default();
    let cancel = CancellationToken::new();
    cancel.cancel();
    for parallel in [false, true] {
      let config = ScanConfig {
        parallel,
        ..ScanConfig::default()
      };
      assert!(matches!(
        r.find_match_with_cancel(&abandon(), "", "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH", &config, &cancel),
        Err(WalletError::Cancelled)
      ));
    }
  }
}

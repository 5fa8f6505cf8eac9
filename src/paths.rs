//! Canonical and candidate derivation paths.
//!
//! Bitcoin schemes follow BIP-44/49/84/86: `m/purpose'/coin'/account'/change/index`.
//! Spark identity keys live at `m/8797555'/account'/0'`.

use crate::address::Scheme;
use crate::bip32::{ChildNumber, DerivationPath, Network, HARDENED_OFFSET};
use crate::error::{Result, WalletError};

/// BIP-43 purpose of Spark identity keys.
pub const SPARK_PURPOSE: u32 = 8797555;

/// One (scheme, path) pair to derive and encode.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Candidate {
  pub scheme: Scheme,
  pub path: DerivationPath,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PathCatalog {
  pub network: Network,
}

impl PathCatalog {
  pub fn new(network: Network) -> Self {
    PathCatalog { network }
  }

  /// `m/purpose'/coin'/account'/change/index` for a Bitcoin scheme.
  ///
  /// Account, change and index must each be below 2^31. Spark has no such
  /// path and is rejected too.
  pub fn bitcoin_path(&self, scheme: Scheme, account: u32, change: u32, index: u32) -> Result<DerivationPath> {
    let purpose = scheme
      .purpose()
      .ok_or_else(|| WalletError::InvalidDerivationPath(format!("{scheme} has no BIP-44 style path")))?;
    let root = DerivationPath::from(vec![
      ChildNumber::hardened(purpose),
      ChildNumber::hardened(self.network.coin_type()),
    ]);
    Ok(
      root
        .child(ChildNumber::checked(account, true)?)
        .child(ChildNumber::checked(change, false)?)
        .child(ChildNumber::checked(index, false)?),
    )
  }

  /// The receive path at index 0 of `account` for each Bitcoin scheme, in catalog order.
  pub fn standard_paths(&self, account: u32) -> Result<Vec<Candidate>> {
    Scheme::BITCOIN
      .into_iter()
      .map(|scheme| {
        let path = self.bitcoin_path(scheme, account, 0, 0)?;
        Ok(Candidate { scheme, path })
      })
      .collect()
  }

  pub fn spark_path(&self, account: u32) -> Result<DerivationPath> {
    let root = DerivationPath::from(vec![ChildNumber::hardened(SPARK_PURPOSE)]);
    Ok(root.child(ChildNumber::checked(account, true)?).child(ChildNumber::hardened(0)))
  }

  /// Every (account, index, scheme) combination below the bounds, lazily.
  ///
  /// Bounds are capped at 2^31, the number of non-hardened indices.
  pub fn scan_candidates(&self, max_accounts: u32, max_address_index: u32) -> ScanCandidates {
    ScanCandidates {
      catalog: *self,
      max_accounts: max_accounts.min(HARDENED_OFFSET),
      max_address_index: max_address_index.min(HARDENED_OFFSET),
      next: 0,
    }
  }

  /// Spark identity paths for accounts `0..max_accounts`, capped like [`scan_candidates`](Self::scan_candidates).
  pub fn spark_candidates(&self, max_accounts: u32) -> impl Iterator<Item = Candidate> + Clone {
    let catalog = *self;
    (0..max_accounts.min(HARDENED_OFFSET)).filter_map(move |account| {
      let path = catalog.spark_path(account).ok()?;
      Some(Candidate {
        scheme: Scheme::Spark,
        path,
      })
    })
  }
}

/// Ordered by account, then address index, then scheme in catalog order.
///
/// The sequence is a pure function of the bounds: calling
/// [`PathCatalog::scan_candidates`] again starts over, and a clone continues
/// independently from the same position.
#[derive(Clone, Debug)]
pub struct ScanCandidates {
  catalog: PathCatalog,
  max_accounts: u32,
  max_address_index: u32,
  next: u64,
}

impl ScanCandidates {
  fn total(&self) -> u64 {
    u64::from(self.max_accounts)
      .saturating_mul(u64::from(self.max_address_index))
      .saturating_mul(Scheme::BITCOIN.len() as u64)
  }

  /// The candidate at absolute position `ordinal`, independent of iteration state.
  pub fn get(&self, ordinal: u64) -> Option<Candidate> {
    if ordinal >= self.total() {
      return None;
    }
    let schemes = Scheme::BITCOIN.len() as u64;
    let per_account = u64::from(self.max_address_index) * schemes;
    let account = (ordinal / per_account) as u32;
    let rem = ordinal % per_account;
    let index = (rem / schemes) as u32;
    let scheme = Scheme::BITCOIN[(rem % schemes) as usize];
    let path = self.catalog.bitcoin_path(scheme, account, 0, index).ok()?;
    Some(Candidate { scheme, path })
  }
}

impl Iterator for ScanCandidates {
  type Item = Candidate;

  fn next(&mut self) -> Option<Candidate> {
    let c = self.get(self.next)?;
    self.next += 1;
    Some(c)
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    let left = (self.total() - self.next.min(self.total())) as usize;
    (left, Some(left))
  }
}

impl ExactSizeIterator for ScanCandidates {}

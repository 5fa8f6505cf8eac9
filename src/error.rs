//! Crate-level error type.
//!
//! Messages never carry mnemonic words, seeds or private keys. The most a
//! message may mention is a word position or a path.

use thiserror::Error;

use crate::bip32::Bip32Error;

/// Why a mnemonic sentence was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MnemonicError {
  #[error("expected 12 or 24 words, got {0}")]
  WordCount(usize),
  #[error("word #{0} is not in the BIP-39 English word list")]
  UnknownWord(usize),
  #[error("checksum mismatch")]
  Checksum,
  #[error("entropy must be 16 or 32 bytes, got {0}")]
  EntropyLength(usize),
}

#[derive(Debug, Error)]
pub enum WalletError {
  #[error("invalid mnemonic: {0}")]
  InvalidMnemonic(#[from] MnemonicError),

  #[error("invalid derivation path: {0}")]
  InvalidDerivationPath(String),

  #[error("hardened derivation requires a private key")]
  HardenedDerivationRequiresPrivateKey,

  #[error("invalid public key: not a point on secp256k1")]
  InvalidPublicKey,

  #[error("key derivation failed: {0}")]
  DerivationError(Bip32Error),

  #[error("invalid address: {0}")]
  InvalidAddress(String),

  #[error("system randomness unavailable: {0}")]
  Randomness(String),

  #[error("scan cancelled")]
  Cancelled,

  #[error("configuration error: {0}")]
  Config(String),

  #[error("json: {0}")]
  Json(#[from] serde_json::Error),

  #[error("i/o: {0}")]
  Io(#[from] std::io::Error),
}

impl From<Bip32Error> for WalletError {
  fn from(e: Bip32Error) -> Self {
    match e {
      Bip32Error::HardenedFromPublic => WalletError::HardenedDerivationRequiresPrivateKey,
      Bip32Error::BadPath(msg) => WalletError::InvalidDerivationPath(msg),
      other => WalletError::DerivationError(other),
    }
  }
}

pub type Result<T> = std::result::Result<T, WalletError>;

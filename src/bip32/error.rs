use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Bip32Error {
  /// I_L out of range for master
  #[error("seed produced an invalid master key")]
  InvalidSeed,
  /// I_L out of range or key addition produced zero, with no usable index left to skip to
  #[error("invalid child key at index {0} (I_L out of range or zero)")]
  InvalidChildKey(u32),
  /// tried hardened CKD from public
  #[error("cannot derive a hardened child from a public key")]
  HardenedFromPublic,
  /// parse failure
  #[error("{0}")]
  BadPath(String),
  /// Base58Check decode failed or payload malformed
  #[error("base58check decode failed or payload malformed")]
  InvalidBase58,
  /// Version prefix not recognized as xpub/xprv/tpub/tprv
  #[error("bad version prefix - must be xpub/xprv/tpub/tprv")]
  BadVersion,
  /// Key data field malformed (wrong length or invalid pub/priv key bytes)
  #[error("key data field malformed - wrong length or invalid pub/priv key bytes")]
  BadKeyData,
  /// BIP-32 requires that depth = 0 (master) implies parent fingerprint = 0 and child number = 0
  #[error("bip-32 requires that depth = 0 (master) implies parent fingerprint = 0 and child number = 0")]
  InvalidRootFields,
  #[error("maximum derivation depth exceeded")]
  DepthOverflow,
}

//! BIP-32 (HD keys) for secp256k1.
//!
//! Features:
//! - Master key from seed
//! - CKDpriv (hardened & normal) and CKDpub (normal only)
//! - xprv/xpub Base58Check serialization (mainnet & testnet)
//! - Derivation paths: "m/84'/0'/0'/0/0", also accepting `h`/`H` markers
//!
//! Invalid child keys (parse(I_L) >= n, or a zero child) are handled by
//! skipping to the next index, as BIP-32 prescribes. A skip never crosses the
//! hardened boundary; the resulting node records the index actually used in
//! `child_number`.

mod error;
pub(crate) mod util;

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use hmac::{Hmac, Mac};
use secp256k1::{All, PublicKey, Scalar, Secp256k1, SecretKey};
use sha2::Sha512;
use zeroize::Zeroize;

pub use crate::bip32::error::Bip32Error;

type HmacSha512 = Hmac<Sha512>;

pub const HARDENED_OFFSET: u32 = 0x8000_0000;

/// Shared verification + signing context.
pub(crate) static SECP: LazyLock<Secp256k1<All>> = LazyLock::new(Secp256k1::new);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
  #[default]
  Mainnet,
  Testnet,
}

impl Network {
  fn versions(self) -> (u32, u32) {
    match self {
      // xpub/xprv
      Network::Mainnet => (0x0488_B21E, 0x0488_ADE4),
      // tpub/tprv
      Network::Testnet => (0x0435_87CF, 0x0435_8394),
    }
  }

  /// SLIP-44 coin type used in the second path level.
  pub fn coin_type(self) -> u32 {
    match self {
      Network::Mainnet => 0,
      Network::Testnet => 1,
    }
  }
}

impl FromStr for Network {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "mainnet" | "bitcoin" => Ok(Network::Mainnet),
      "testnet" => Ok(Network::Testnet),
      other => Err(format!("unknown network '{other}' (expected mainnet or testnet)")),
    }
  }
}

fn decode_versions(v: u32) -> Result<(Network, bool /*is_pub*/), Bip32Error> {
  match v {
    0x0488_B21E => Ok((Network::Mainnet, true)),  // xpub
    0x0488_ADE4 => Ok((Network::Mainnet, false)), // xprv
    0x0435_87CF => Ok((Network::Testnet, true)),  // tpub
    0x0435_8394 => Ok((Network::Testnet, false)), // tprv
    _ => Err(Bip32Error::BadVersion),
  }
}

/// Next index to try after an invalid child at `i`, staying on the same side
/// of the hardened boundary.
fn next_index(i: u32) -> Option<u32> {
  let next = i.checked_add(1)?;
  if (next >= HARDENED_OFFSET) != (i >= HARDENED_OFFSET) {
    return None;
  }
  Some(next)
}

#[derive(Clone)]
pub struct ExtendedPrivKey {
  pub depth: u8,
  pub parent_fingerprint: [u8; 4],
  pub child_number: u32,
  pub chain_code: [u8; 32],
  pub secret_key: SecretKey,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtendedPubKey {
  pub depth: u8,
  pub parent_fingerprint: [u8; 4],
  pub child_number: u32,
  pub chain_code: [u8; 32],
  pub public_key: PublicKey, // compressed
}

impl Drop for ExtendedPrivKey {
  fn drop(&mut self) {
    self.chain_code.zeroize();
    self.secret_key.non_secure_erase();
  }
}

impl fmt::Debug for ExtendedPrivKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ExtendedPrivKey")
      .field("depth", &self.depth)
      .field("parent_fingerprint", &hex::encode(self.parent_fingerprint))
      .field("child_number", &self.child_number)
      .finish_non_exhaustive()
  }
}

/* --------------------- Master key from seed ---------------------- */

impl ExtendedPrivKey {
  /// Create master extended private key from seed (BIP-32).
  /// I = HMAC-SHA512(key="Bitcoin seed", data=seed)
  /// master secret = I_L, master chain code = I_R
  pub fn master(seed: &[u8]) -> Result<Self, Bip32Error> {
    let mut mac =
      HmacSha512::new_from_slice(b"Bitcoin seed").expect("HMAC can take key of any size");
    mac.update(seed);
    let i = mac.finalize().into_bytes();
    let (mut il, ir) = util::split_i(&i);

    // There is no index to skip to at the root: I_L out of range is fatal.
    let sk = SecretKey::from_byte_array(il).map_err(|_| Bip32Error::InvalidSeed);
    il.zeroize();
    Ok(ExtendedPrivKey {
      depth: 0,
      parent_fingerprint: [0u8; 4],
      child_number: 0,
      chain_code: ir,
      secret_key: sk?,
    })
  }

  /// Derive a child private key (CKDpriv) at index `i`.
  /// Hardened if i >= HARDENED_OFFSET. Invalid children are skipped.
  pub fn ckd_priv(&self, i: u32) -> Result<Self, Bip32Error> {
    let mut index = i;
    loop {
      match self.try_ckd_priv(index) {
        Err(Bip32Error::InvalidChildKey(_)) => {
          let next = next_index(index).ok_or(Bip32Error::InvalidChildKey(index))?;
          tracing::warn!(depth = self.depth + 1, skipped = index, next, "invalid child key, skipping index");
          index = next;
        }
        res => return res,
      }
    }
  }

  /// Derive child `index` (which must be below 2^31), hardened or not.
  pub fn derive_child(&self, index: u32, hardened: bool) -> Result<Self, Bip32Error> {
    let cn = ChildNumber::checked(index, hardened)?;
    self.ckd_priv(cn.number())
  }

  fn try_ckd_priv(&self, i: u32) -> Result<Self, Bip32Error> {
    let depth = self.depth.checked_add(1).ok_or(Bip32Error::DepthOverflow)?;
    let parent_pub = PublicKey::from_secret_key(&SECP, &self.secret_key);

    // Data = (0x00 || ser256(k_par) || ser32(i)) for hardened
    //      = (serP(K_par)     || ser32(i))       for normal
    let mut mac = HmacSha512::new_from_slice(&self.chain_code).expect("HMAC key");
    if i >= HARDENED_OFFSET {
      let mut data = [0u8; 1 + 32 + 4];
      data[1..33].copy_from_slice(&self.secret_key.secret_bytes());
      data[33..].copy_from_slice(&util::ser32(i));
      mac.update(&data);
      data.zeroize();
    } else {
      let mut data = [0u8; 33 + 4];
      data[..33].copy_from_slice(&util::ser_p(&parent_pub));
      data[33..].copy_from_slice(&util::ser32(i));
      mac.update(&data);
    }
    let i64 = mac.finalize().into_bytes();
    let (mut il, ir) = util::split_i(&i64);

    // Scalar::from_be_bytes rejects I_L >= n; add_tweak rejects a zero result.
    let sk = Scalar::from_be_bytes(il)
      .map_err(|_| Bip32Error::InvalidChildKey(i))
      .and_then(|tweak| {
        self
          .secret_key
          .add_tweak(&tweak)
          .map_err(|_| Bip32Error::InvalidChildKey(i))
      });
    il.zeroize();

    Ok(ExtendedPrivKey {
      depth,
      parent_fingerprint: util::fingerprint_from_pub(&parent_pub),
      child_number: i,
      chain_code: ir,
      secret_key: sk?,
    })
  }

  pub fn public_key(&self) -> PublicKey {
    PublicKey::from_secret_key(&SECP, &self.secret_key)
  }

  pub fn secret_bytes(&self) -> [u8; 32] {
    self.secret_key.secret_bytes()
  }

  /// Get the corresponding extended public key.
  pub fn to_xpub(&self) -> ExtendedPubKey {
    ExtendedPubKey {
      depth: self.depth,
      parent_fingerprint: self.parent_fingerprint,
      child_number: self.child_number,
      chain_code: self.chain_code,
      public_key: self.public_key(),
    }
  }

  /// xprv (or tprv) string.
  pub fn to_base58(&self, network: Network) -> String {
    let mut key = [0u8; 33];
    key[1..].copy_from_slice(&self.secret_key.secret_bytes());
    let (_, version) = network.versions();
    let out = encode_xkey(
      version,
      self.depth,
      self.parent_fingerprint,
      self.child_number,
      &self.chain_code,
      &key,
    );
    key.zeroize();
    out
  }
}

impl ExtendedPubKey {
  /// CKDpub for non-hardened indices. Invalid children are skipped.
  pub fn ckd_pub(&self, i: u32) -> Result<Self, Bip32Error> {
    if i >= HARDENED_OFFSET {
      return Err(Bip32Error::HardenedFromPublic);
    }
    let mut index = i;
    loop {
      match self.try_ckd_pub(index) {
        Err(Bip32Error::InvalidChildKey(_)) => {
          let next = next_index(index).ok_or(Bip32Error::InvalidChildKey(index))?;
          tracing::warn!(depth = self.depth + 1, skipped = index, next, "invalid child key, skipping index");
          index = next;
        }
        res => return res,
      }
    }
  }

  fn try_ckd_pub(&self, i: u32) -> Result<Self, Bip32Error> {
    let depth = self.depth.checked_add(1).ok_or(Bip32Error::DepthOverflow)?;
    // Data = serP(K_par) || ser32(i)
    let mut mac = HmacSha512::new_from_slice(&self.chain_code).expect("HMAC key");
    let mut data = [0u8; 33 + 4];
    data[..33].copy_from_slice(&util::ser_p(&self.public_key));
    data[33..].copy_from_slice(&util::ser32(i));
    mac.update(&data);
    let i64 = mac.finalize().into_bytes();
    let (il, ir) = util::split_i(&i64);

    // Tweak-add: K_child = K_par + I_L*G
    let tweak = Scalar::from_be_bytes(il).map_err(|_| Bip32Error::InvalidChildKey(i))?;
    let child_pk = self
      .public_key
      .add_exp_tweak(&SECP, &tweak)
      .map_err(|_| Bip32Error::InvalidChildKey(i))?;

    Ok(ExtendedPubKey {
      depth,
      parent_fingerprint: util::fingerprint_from_pub(&self.public_key),
      child_number: i,
      chain_code: ir,
      public_key: child_pk,
    })
  }

  /// xpub (or tpub) string.
  pub fn to_base58(&self, network: Network) -> String {
    let key = util::ser_p(&self.public_key);
    let (version, _) = network.versions();
    encode_xkey(
      version,
      self.depth,
      self.parent_fingerprint,
      self.child_number,
      &self.chain_code,
      &key,
    )
  }
}

/// version(4) | depth(1) | parent fingerprint(4) | child number(4) | chain code(32) | key(33),
/// Base58Check-encoded. Private keys are `0x00 || ser256(k)`.
fn encode_xkey(
  version: u32,
  depth: u8,
  parent_fingerprint: [u8; 4],
  child_number: u32,
  chain_code: &[u8; 32],
  key: &[u8; 33],
) -> String {
  let mut payload = Vec::with_capacity(78);
  payload.extend_from_slice(&version.to_be_bytes());
  payload.push(depth);
  payload.extend_from_slice(&parent_fingerprint);
  payload.extend_from_slice(&util::ser32(child_number));
  payload.extend_from_slice(chain_code);
  payload.extend_from_slice(key);
  let out = bs58::encode(&payload).with_check().into_string();
  payload.zeroize();
  out
}

/* --------------------- Derivation paths --------------------- */

/// A single path element (index + hardened bit)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChildNumber {
  pub index: u32, // full value, including hardened bit if set
}

impl ChildNumber {
  pub fn new(index: u32, hardened: bool) -> Self {
    let v = if hardened {
      index | HARDENED_OFFSET
    } else {
      index
    };
    ChildNumber { index: v }
  }

  /// Like `new`, but rejects indices that already carry the hardened bit.
  pub fn checked(index: u32, hardened: bool) -> Result<Self, Bip32Error> {
    if index >= HARDENED_OFFSET {
      return Err(Bip32Error::BadPath(format!(
        "index {index} out of range (must be below 2^31)"
      )));
    }
    Ok(ChildNumber::new(index, hardened))
  }

  pub fn hardened(index: u32) -> Self {
    ChildNumber::new(index, true)
  }

  pub fn normal(index: u32) -> Self {
    ChildNumber::new(index, false)
  }

  pub fn is_hardened(&self) -> bool {
    self.index >= HARDENED_OFFSET
  }

  pub fn number(&self) -> u32 {
    self.index
  }

  /// Index with the hardened bit cleared.
  pub fn value(&self) -> u32 {
    self.index & !HARDENED_OFFSET
  }
}

impl fmt::Display for ChildNumber {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_hardened() {
      write!(f, "{}'", self.value())
    } else {
      write!(f, "{}", self.value())
    }
  }
}

impl FromStr for ChildNumber {
  type Err = Bip32Error;

  fn from_str(elem: &str) -> Result<Self, Self::Err> {
    if elem.is_empty() {
      return Err(Bip32Error::BadPath("empty path segment".into()));
    }
    let hardened = elem.ends_with('\'') || elem.ends_with('h') || elem.ends_with('H');
    let num_str = if hardened {
      &elem[..elem.len() - 1]
    } else {
      elem
    };
    if num_str.is_empty() || !num_str.bytes().all(|b| b.is_ascii_digit()) {
      return Err(Bip32Error::BadPath(format!("malformed path segment '{elem}'")));
    }
    let n: u32 = num_str
      .parse()
      .map_err(|_| Bip32Error::BadPath(format!("path segment '{elem}' out of range")))?;
    ChildNumber::checked(n, hardened)
  }
}

/// An ordered list of child numbers below the master key, e.g. `m/84'/0'/0'/0/0`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct DerivationPath(Vec<ChildNumber>);

impl DerivationPath {
  pub fn master() -> Self {
    DerivationPath(Vec::new())
  }

  /// Returns a new path with `cn` appended.
  pub fn child(&self, cn: ChildNumber) -> Self {
    let mut v = self.0.clone();
    v.push(cn);
    DerivationPath(v)
  }

  pub fn as_slice(&self) -> &[ChildNumber] {
    &self.0
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Value of the segment at `level` (0 = purpose), hardened bit cleared.
  pub fn level(&self, level: usize) -> Option<u32> {
    self.0.get(level).map(ChildNumber::value)
  }
}

impl From<Vec<ChildNumber>> for DerivationPath {
  fn from(v: Vec<ChildNumber>) -> Self {
    DerivationPath(v)
  }
}

impl AsRef<[ChildNumber]> for DerivationPath {
  fn as_ref(&self) -> &[ChildNumber] {
    &self.0
  }
}

impl fmt::Display for DerivationPath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("m")?;
    for cn in &self.0 {
      write!(f, "/{cn}")?;
    }
    Ok(())
  }
}

impl FromStr for DerivationPath {
  type Err = Bip32Error;

  /// Parse "m/0h/1/2'/2". A leading "m"/"M" is optional.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();
    if s.is_empty() {
      return Err(Bip32Error::BadPath("empty path".into()));
    }
    let mut path_comps = s.split('/');
    let first = path_comps
      .next()
      .ok_or_else(|| Bip32Error::BadPath("empty path".into()))?;
    let mut out = Vec::new();
    if first != "m" && first != "M" {
      out.push(first.parse()?);
    }
    for elem in path_comps {
      out.push(elem.parse()?);
    }
    Ok(DerivationPath(out))
  }
}

impl serde::Serialize for DerivationPath {
  fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

/// Parse "m/0h/1/2'/2" -> DerivationPath
pub fn parse_path(s: &str) -> Result<DerivationPath, Bip32Error> {
  s.parse()
}

/// Derive an extended private key along a path from a master key.
pub fn derive_priv_from_path(
  xprv: &ExtendedPrivKey,
  path: &[ChildNumber],
) -> Result<ExtendedPrivKey, Bip32Error> {
  let mut xprv = xprv.clone();
  for cn in path {
    xprv = xprv.ckd_priv(cn.number())?;
  }
  Ok(xprv)
}

/// Derive an extended public key along a (non-hardened) path from an xpub.
pub fn derive_pub_from_path(
  xpub: &ExtendedPubKey,
  path: &[ChildNumber],
) -> Result<ExtendedPubKey, Bip32Error> {
  let mut xpub = xpub.clone();
  for cn in path {
    if cn.is_hardened() {
      return Err(Bip32Error::HardenedFromPublic);
    }
    xpub = xpub.ckd_pub(cn.number())?;
  }
  Ok(xpub)
}

/* --------------------- Extended key parsing --------------------- */

/// A decoded extended key of either kind.
pub enum ExtendedKey {
  Private(ExtendedPrivKey),
  Public(ExtendedPubKey),
}

// Parse any extended key; dispatch to xpub/xprv.
pub fn parse_xkey(s: &str) -> Result<(ExtendedKey, Network), Bip32Error> {
  // 78-byte payload expected after Base58Check
  let mut data = bs58::decode(s.trim())
    .with_check(None)
    .into_vec()
    .map_err(|_| Bip32Error::InvalidBase58)?;
  if data.len() != 78 {
    data.zeroize();
    return Err(Bip32Error::InvalidBase58);
  }
  let res = parse_payload(&data);
  data.zeroize();
  res
}

fn parse_payload(data: &[u8]) -> Result<(ExtendedKey, Network), Bip32Error> {
  let ver = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
  let (network, is_pub) = decode_versions(ver)?;

  let depth = data[4];
  let mut parent_fingerprint = [0u8; 4];
  parent_fingerprint.copy_from_slice(&data[5..9]);
  let child_number = u32::from_be_bytes([data[9], data[10], data[11], data[12]]);
  let mut chain_code = [0u8; 32];
  chain_code.copy_from_slice(&data[13..45]);

  // Reject invalid "root" headers per BIP-32
  if depth == 0 && (parent_fingerprint != [0, 0, 0, 0] || child_number != 0) {
    return Err(Bip32Error::InvalidRootFields);
  }

  if is_pub {
    // key data: 33 bytes compressed SEC1
    let public_key = PublicKey::from_slice(&data[45..78]).map_err(|_| Bip32Error::BadKeyData)?;
    let xpub = ExtendedPubKey {
      depth,
      parent_fingerprint,
      child_number,
      chain_code,
      public_key,
    };
    Ok((ExtendedKey::Public(xpub), network))
  } else {
    // key data: 0x00 + 32-byte secret
    if data[45] != 0x00 {
      return Err(Bip32Error::BadKeyData);
    }
    let mut sk_bytes = [0u8; 32];
    sk_bytes.copy_from_slice(&data[46..78]);
    let secret_key = SecretKey::from_byte_array(sk_bytes).map_err(|_| Bip32Error::BadKeyData);
    sk_bytes.zeroize();
    let xprv = ExtendedPrivKey {
      depth,
      parent_fingerprint,
      child_number,
      chain_code,
      secret_key: secret_key?,
    };
    Ok((ExtendedKey::Private(xprv), network))
  }
}

// Convenience wrappers
pub fn parse_xprv(s: &str) -> Result<(ExtendedPrivKey, Network), Bip32Error> {
  match parse_xkey(s)? {
    (ExtendedKey::Private(xprv), net) => Ok((xprv, net)),
    _ => Err(Bip32Error::BadVersion),
  }
}

pub fn parse_xpub(s: &str) -> Result<(ExtendedPubKey, Network), Bip32Error> {
  match parse_xkey(s)? {
    (ExtendedKey::Public(xpub), net) => Ok((xpub, net)),
    _ => Err(Bip32Error::BadVersion),
  }
}

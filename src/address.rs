//! Bitcoin address encodings for a single public key.
//!
//! - legacy:        P2PKH, Base58Check(0x00 || HASH160(P))
//! - nested SegWit: P2SH-P2WPKH, Base58Check(0x05 || HASH160(0x00 0x14 || HASH160(P)))
//! - native SegWit: P2WPKH, bech32 witness v0 over HASH160(P)
//! - Taproot:       P2TR key-path, bech32m witness v1 over the BIP-341 tweaked x-only key
//!
//! All encodings are pure functions of the public key.

use std::fmt;
use std::str::FromStr;

use bech32::Hrp;
use secp256k1::{PublicKey, Scalar, XOnlyPublicKey};
use zeroize::Zeroize;

use crate::bip32::{Network, SECP};
use crate::error::{Result, WalletError};
use crate::hash::{hash160, tagged_hash};

/// Address type, in catalog order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Scheme {
  Legacy,
  NestedSegwit,
  NativeSegwit,
  Taproot,
  Spark,
}

impl Scheme {
  /// The four Bitcoin schemes, in catalog order.
  pub const BITCOIN: [Scheme; 4] = [
    Scheme::Legacy,
    Scheme::NestedSegwit,
    Scheme::NativeSegwit,
    Scheme::Taproot,
  ];

  /// BIP-43 purpose level for the Bitcoin schemes.
  pub fn purpose(self) -> Option<u32> {
    match self {
      Scheme::Legacy => Some(44),
      Scheme::NestedSegwit => Some(49),
      Scheme::NativeSegwit => Some(84),
      Scheme::Taproot => Some(86),
      Scheme::Spark => None,
    }
  }

  pub fn from_purpose(purpose: u32) -> Option<Self> {
    Scheme::BITCOIN.into_iter().find(|s| s.purpose() == Some(purpose))
  }

  /// Whether records of this scheme carry a WIF private key (Taproot keys are tweaked, so no).
  pub fn has_wif(self) -> bool {
    !matches!(self, Scheme::Taproot)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Scheme::Legacy => "legacy",
      Scheme::NestedSegwit => "nestedSegwit",
      Scheme::NativeSegwit => "nativeSegwit",
      Scheme::Taproot => "taproot",
      Scheme::Spark => "spark",
    }
  }
}

impl fmt::Display for Scheme {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Scheme {
  type Err = WalletError;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "legacy" | "p2pkh" => Ok(Scheme::Legacy),
      "nestedSegwit" | "p2sh-p2wpkh" => Ok(Scheme::NestedSegwit),
      "nativeSegwit" | "segwit" | "p2wpkh" => Ok(Scheme::NativeSegwit),
      "taproot" | "p2tr" => Ok(Scheme::Taproot),
      "spark" => Ok(Scheme::Spark),
      other => Err(WalletError::Config(format!("unknown address scheme '{other}'"))),
    }
  }
}

/// Encodes a public key into each Bitcoin address type.
pub trait AddressEncoder: Send + Sync {
  fn legacy_address(&self, pk: &PublicKey) -> Result<String>;
  fn nested_segwit_address(&self, pk: &PublicKey) -> Result<String>;
  fn native_segwit_address(&self, pk: &PublicKey) -> Result<String>;
  fn taproot_address(&self, pk: &PublicKey) -> Result<String>;

  /// Which Bitcoin scheme `address` belongs to, or `InvalidAddress` if it is malformed.
  fn classify(&self, address: &str) -> Result<Scheme>;

  fn encode(&self, scheme: Scheme, pk: &PublicKey) -> Result<String> {
    match scheme {
      Scheme::Legacy => self.legacy_address(pk),
      Scheme::NestedSegwit => self.nested_segwit_address(pk),
      Scheme::NativeSegwit => self.native_segwit_address(pk),
      Scheme::Taproot => self.taproot_address(pk),
      Scheme::Spark => Err(WalletError::InvalidAddress(
        "spark addresses are not produced by the bitcoin encoder".into(),
      )),
    }
  }
}

/// Parse a SEC1 public key (33 or 65 bytes).
pub fn parse_public_key(bytes: &[u8]) -> Result<PublicKey> {
  PublicKey::from_slice(bytes).map_err(|_| WalletError::InvalidPublicKey)
}

/// BIP-341 key-path output key: Q = P + int(TaggedHash("TapTweak", x(P)))G, with P even-Y.
pub fn taproot_output_key(pk: &PublicKey) -> Result<XOnlyPublicKey> {
  let (internal, _parity) = pk.x_only_public_key();
  let t = tagged_hash("TapTweak", &internal.serialize());
  let tweak = Scalar::from_be_bytes(t).map_err(|_| WalletError::InvalidPublicKey)?;
  let (output, _parity) = internal
    .add_tweak(&SECP, &tweak)
    .map_err(|_| WalletError::InvalidPublicKey)?;
  Ok(output)
}

struct Prefixes {
  p2pkh: u8,
  p2sh: u8,
  wif: u8,
  hrp: Hrp,
}

fn prefixes(network: Network) -> Prefixes {
  match network {
    Network::Mainnet => Prefixes {
      p2pkh: 0x00,
      p2sh: 0x05,
      wif: 0x80,
      hrp: bech32::hrp::BC,
    },
    Network::Testnet => Prefixes {
      p2pkh: 0x6f,
      p2sh: 0xc4,
      wif: 0xef,
      hrp: bech32::hrp::TB,
    },
  }
}

fn base58check(version: u8, hash: &[u8; 20]) -> String {
  let mut payload = [0u8; 21];
  payload[0] = version;
  payload[1..].copy_from_slice(hash);
  bs58::encode(payload).with_check().into_string()
}

/// Compressed-key WIF for a 32-byte secret.
pub fn to_wif(secret: &[u8; 32], network: Network) -> String {
  let mut payload = [0u8; 34];
  payload[0] = prefixes(network).wif;
  payload[1..33].copy_from_slice(secret);
  payload[33] = 0x01;
  let out = bs58::encode(payload).with_check().into_string();
  payload.zeroize();
  out
}

/// The standard encoder for mainnet or testnet.
#[derive(Clone, Copy, Debug, Default)]
pub struct BitcoinEncoder {
  pub network: Network,
}

impl BitcoinEncoder {
  pub fn new(network: Network) -> Self {
    BitcoinEncoder { network }
  }
}

impl AddressEncoder for BitcoinEncoder {
  fn legacy_address(&self, pk: &PublicKey) -> Result<String> {
    Ok(base58check(prefixes(self.network).p2pkh, &hash160(&pk.serialize())))
  }

  fn nested_segwit_address(&self, pk: &PublicKey) -> Result<String> {
    // redeem script: OP_0 PUSH20 <HASH160(P)>
    let mut redeem = [0u8; 22];
    redeem[0] = 0x00;
    redeem[1] = 0x14;
    redeem[2..].copy_from_slice(&hash160(&pk.serialize()));
    Ok(base58check(prefixes(self.network).p2sh, &hash160(&redeem)))
  }

  fn native_segwit_address(&self, pk: &PublicKey) -> Result<String> {
    let program = hash160(&pk.serialize());
    bech32::segwit::encode_v0(prefixes(self.network).hrp, &program)
      .map_err(|e| WalletError::InvalidAddress(e.to_string()))
  }

  fn taproot_address(&self, pk: &PublicKey) -> Result<String> {
    let output = taproot_output_key(pk)?;
    bech32::segwit::encode_v1(prefixes(self.network).hrp, &output.serialize())
      .map_err(|e| WalletError::InvalidAddress(e.to_string()))
  }

  fn classify(&self, address: &str) -> Result<Scheme> {
    let p = prefixes(self.network);
    let lower = address.to_ascii_lowercase();
    if lower.starts_with(&format!("{}1", p.hrp.as_str())) {
      let (hrp, version, program) = bech32::segwit::decode(address)
        .map_err(|e| WalletError::InvalidAddress(format!("{address}: {e}")))?;
      if hrp.to_lowercase() != p.hrp.to_lowercase() {
        return Err(WalletError::InvalidAddress(format!(
          "{address}: wrong network prefix"
        )));
      }
      return match (version.to_u8(), program.len()) {
        (0, 20) => Ok(Scheme::NativeSegwit),
        (1, 32) => Ok(Scheme::Taproot),
        (v, n) => Err(WalletError::InvalidAddress(format!(
          "{address}: unsupported witness v{v} program of {n} bytes"
        ))),
      };
    }

    let data = bs58::decode(address)
      .with_check(None)
      .into_vec()
      .map_err(|e| WalletError::InvalidAddress(format!("{address}: {e}")))?;
    if data.len() != 21 {
      return Err(WalletError::InvalidAddress(format!(
        "{address}: payload must be 21 bytes"
      )));
    }
    match data[0] {
      v if v == p.p2pkh => Ok(Scheme::Legacy),
      v if v == p.p2sh => Ok(Scheme::NestedSegwit),
      v => Err(WalletError::InvalidAddress(format!(
        "{address}: unknown version byte 0x{v:02x}"
      ))),
    }
  }
}

//! Spark-protocol addresses.
//!
//! The encoder is a strategy: `WalletReconciler` takes any
//! [`SparkAddressEncoder`], so a different wire format can be swapped in
//! without touching derivation. The default, [`SparkBech32m`], encodes the
//! 33-byte identity public key framed as protobuf field 1
//! (`0x0a 0x21 || key`) with bech32m under HRP `sp` (testnet `spt`). That
//! yields `sp1p…` strings of 65 characters (66 on testnet).

use bech32::primitives::decode::CheckedHrpstring;
use bech32::{Bech32m, Hrp};
use secp256k1::PublicKey;

use crate::bip32::Network;
use crate::error::{Result, WalletError};

const HRP_MAINNET: Hrp = Hrp::parse_unchecked("sp");
const HRP_TESTNET: Hrp = Hrp::parse_unchecked("spt");

/// protobuf: field 1, wire type 2 (length-delimited), 33 bytes
const IDENTITY_KEY_FRAME: [u8; 2] = [0x0a, 0x21];

pub trait SparkAddressEncoder: Send + Sync {
  fn spark_address(&self, pk: &PublicKey) -> Result<String>;

  /// Whether `address` is a well-formed address of this encoder's format and network.
  fn recognizes(&self, address: &str) -> bool;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SparkBech32m {
  pub network: Network,
}

impl SparkBech32m {
  pub fn new(network: Network) -> Self {
    SparkBech32m { network }
  }

  fn hrp(&self) -> Hrp {
    match self.network {
      Network::Mainnet => HRP_MAINNET,
      Network::Testnet => HRP_TESTNET,
    }
  }

  /// Decode an address back to its identity public key.
  pub fn decode(&self, address: &str) -> Result<PublicKey> {
    let checked = CheckedHrpstring::new::<Bech32m>(address)
      .map_err(|e| WalletError::InvalidAddress(format!("{address}: {e}")))?;
    if checked.hrp().to_lowercase() != self.hrp().to_lowercase() {
      return Err(WalletError::InvalidAddress(format!(
        "{address}: wrong spark network prefix"
      )));
    }
    let payload: Vec<u8> = checked.byte_iter().collect();
    if payload.len() != 35 || payload[..2] != IDENTITY_KEY_FRAME {
      return Err(WalletError::InvalidAddress(format!(
        "{address}: payload is not a framed identity key"
      )));
    }
    PublicKey::from_slice(&payload[2..]).map_err(|_| WalletError::InvalidPublicKey)
  }
}

impl SparkAddressEncoder for SparkBech32m {
  fn spark_address(&self, pk: &PublicKey) -> Result<String> {
    let mut payload = Vec::with_capacity(35);
    payload.extend_from_slice(&IDENTITY_KEY_FRAME);
    payload.extend_from_slice(&pk.serialize());
    bech32::encode::<Bech32m>(self.hrp(), &payload)
      .map_err(|e| WalletError::InvalidAddress(e.to_string()))
  }

  fn recognizes(&self, address: &str) -> bool {
    self.decode(address).is_ok()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const G: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

  fn g() -> PublicKey {
    PublicKey::from_slice(&hex::decode(G).unwrap()).unwrap()
  }

  #[test]
  fn mainnet_shape() {
    let addr = SparkBech32m::default().spark_address(&g()).unwrap();
    assert!(addr.starts_with("sp1p"), "{addr}");
    assert_eq!(addr.len(), 65);
  }

  #[test]
  fn testnet_shape() {
    let addr = SparkBech32m::new(Network::Testnet).spark_address(&g()).unwrap();
    assert!(addr.starts_with("spt1p"), "{addr}");
    assert_eq!(addr.len(), 66);
  }

  #[test]
  fn decode_recovers_identity_key() {
    let enc = SparkBech32m::default();
    let addr = enc.spark_address(&g()).unwrap();
    assert_eq!(enc.decode(&addr).unwrap(), g());
    assert!(enc.recognizes(&addr));
    assert!(!enc.recognizes("bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4"));
  }

  #[test]
  fn decode_rejects_corruption_and_wrong_network() {
    let enc = SparkBech32m::default();
    let mut addr = enc.spark_address(&g()).unwrap();
    let last = addr.pop().unwrap();
    addr.push(if last == 'q' { 'p' } else { 'q' });
    assert!(matches!(enc.decode(&addr), Err(WalletError::InvalidAddress(_))));

    let testnet = SparkBech32m::new(Network::Testnet).spark_address(&g()).unwrap();
    assert!(matches!(enc.decode(&testnet), Err(WalletError::InvalidAddress(_))));
    assert!(!enc.recognizes(&addr));
    assert!(!enc.recognizes(&testnet));
  }
}

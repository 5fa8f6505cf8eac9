//! Minimal BIP-32 helper functions:
//! - serP(P):     compressed SEC1 (33 bytes)
//! - ser32(i):    big-endian u32 (4 bytes)
//! - split_i(I):  HMAC-SHA512 output -> (I_L, I_R)

use secp256k1::PublicKey;

use crate::hash::hash160;

/// serP(P): compressed SEC1 encoding of a public key (33 bytes, 0x02/0x03 + X)
pub fn ser_p(pk: &PublicKey) -> [u8; 33] {
  pk.serialize()
}

/// ser32(i): 4-byte big-endian serialization of a 32-bit integer
pub fn ser32(i: u32) -> [u8; 4] {
  i.to_be_bytes()
}

/// Split a 64-byte HMAC-SHA512 output into I_L (key material) and I_R (chain code).
pub fn split_i(i: &[u8]) -> ([u8; 32], [u8; 32]) {
  let mut il = [0u8; 32];
  il.copy_from_slice(&i[..32]);
  let mut ir = [0u8; 32];
  ir.copy_from_slice(&i[32..64]);
  (il, ir)
}

pub fn fingerprint_from_pub(pk: &PublicKey) -> [u8; 4] {
  let h160 = hash160(&ser_p(pk));
  [h160[0], h160[1], h160[2], h160[3]]
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_ser32() {
    assert_eq!(ser32(0xDEAD_BEEF), [0xDE, 0xAD, 0xBE, 0xEF]);
    assert_eq!(ser32(0), [0, 0, 0, 0]);
    assert_eq!(ser32(1), [0, 0, 0, 1]);
  }

  #[test]
  fn test_split_i() {
    let mut i = [0u8; 64];
    i[..32].fill(0xAA);
    i[32..].fill(0x55);
    let (il, ir) = split_i(&i);
    assert_eq!(il, [0xAA; 32]);
    assert_eq!(ir, [0x55; 32]);
  }

  #[test]
  fn test_fingerprint_of_generator() {
    let g = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";
    let pk = PublicKey::from_slice(&hex::decode(g).unwrap()).unwrap();
    assert_eq!(hex::encode(ser_p(&pk)), g);
    // HASH160(G) = 751e76e8199196d454941c45d1b3a323f1433bd6
    assert_eq!(fingerprint_from_pub(&pk), [0x75, 0x1e, 0x76, 0xe8]);
  }
}

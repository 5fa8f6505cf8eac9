//! Hash helpers shared by key derivation and address encoding.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// HASH160(x) = RIPEMD160(SHA256(x))
pub fn hash160(data: &[u8]) -> [u8; 20] {
  let sha = Sha256::digest(data);
  let out = Ripemd160::digest(sha);
  let mut r = [0u8; 20];
  r.copy_from_slice(&out);
  r
}

/// BIP-340 tagged hash: SHA256(SHA256(tag) || SHA256(tag) || msg)
pub fn tagged_hash(tag: &str, msg: &[u8]) -> [u8; 32] {
  let tag_hash = Sha256::digest(tag.as_bytes());
  let mut sha = Sha256::new();
  sha.update(tag_hash);
  sha.update(tag_hash);
  sha.update(msg);
  sha.finalize().into()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn hash160_of_empty_input() {
    assert_eq!(
      hex::encode(hash160(b"")),
      "b472a266d0bd89c13706a4132ccfb16f7c3b9fcb"
    );
  }

  #[test]
  fn tagged_hash_differs_by_tag() {
    assert_ne!(tagged_hash("TapTweak", b"x"), tagged_hash("TapLeaf", b"x"));
    assert_eq!(tagged_hash("TapTweak", b"x"), tagged_hash("TapTweak", b"x"));
  }
}

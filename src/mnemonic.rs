//! BIP-39 mnemonic sentences: validation, generation and seed derivation.
//!
//! Seed = PBKDF2-HMAC-SHA512(password=mnemonic_nfkd, salt="mnemonic" + passphrase_nfkd, c=2048, dkLen=64)
//!
//! Notes:
//! - We apply NFKD to both mnemonic and passphrase.
//! - We also normalize whitespace in the mnemonic to single ASCII spaces,
//!   which handles arbitrary Unicode whitespace safely.
//! - Only 12-word (128-bit) and 24-word (256-bit) sentences are accepted.
//! - The English word list is taken from the `bip39` crate.

use std::fmt;
use std::str::FromStr;

use ::bip39::Language;
use sha2::{Digest, Sha256, Sha512};
use unicode_normalization::UnicodeNormalization;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{MnemonicError, WalletError};

const PBKDF2_ROUNDS: u32 = 2048;

/// Supported sentence lengths.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WordCount {
  /// 128 bits of entropy, 4 checksum bits
  Words12,
  /// 256 bits of entropy, 8 checksum bits
  Words24,
}

impl WordCount {
  pub fn from_words(n: usize) -> Result<Self, MnemonicError> {
    match n {
      12 => Ok(WordCount::Words12),
      24 => Ok(WordCount::Words24),
      other => Err(MnemonicError::WordCount(other)),
    }
  }

  pub fn words(self) -> usize {
    match self {
      WordCount::Words12 => 12,
      WordCount::Words24 => 24,
    }
  }

  /// CS in bits
  fn checksum_bits(self) -> usize {
    self.words() / 3
  }

  /// ENT in bytes (always byte-aligned)
  pub fn entropy_bytes(self) -> usize {
    32 * self.words() / 3 / 8
  }
}

fn word_list() -> &'static [&'static str; 2048] {
  Language::English.word_list()
}

/// Split a big-endian bitstream into 11-bit indices (0..=2047), MSB-first,
/// consuming exactly `total_bits` from `bytes`.
fn bitstream_to_11_bit_indices(stream: &[u8], total_bits: usize) -> Vec<usize> {
  debug_assert!(total_bits % 11 == 0);
  debug_assert!(total_bits <= stream.len() * 8);

  let n = total_bits / 11;
  let mut out = Vec::with_capacity(n);
  let mut buf: u32 = 0;
  let mut buf_bits: usize = 0;
  let mut remaining_bits = total_bits;

  for &b in stream {
    if remaining_bits == 0 {
      break;
    }
    let take = remaining_bits.min(8);
    let top = (b >> (8 - take)) as u32;
    buf = (buf << take) | top;
    buf_bits += take;
    remaining_bits -= take;

    while buf_bits >= 11 {
      let shift = buf_bits - 11;
      let idx = ((buf >> shift) & 0x7FF) as usize;
      out.push(idx);
      buf &= if shift == 0 { 0 } else { (1u32 << shift) - 1 };
      buf_bits -= 11;
    }
  }
  debug_assert_eq!(remaining_bits, 0);
  debug_assert_eq!(buf_bits, 0);

  out
}

/// Inverse of `bitstream_to_11_bit_indices`: pack 11-bit indices MSB-first,
/// zero-padding the final byte.
fn indices_to_bitstream(indices: &[u16]) -> Vec<u8> {
  let total_bits = indices.len() * 11;
  let mut out = vec![0u8; total_bits.div_ceil(8)];
  for (i, &idx) in indices.iter().enumerate() {
    for bit in 0..11 {
      if idx & (1 << (10 - bit)) != 0 {
        let pos = i * 11 + bit;
        out[pos / 8] |= 0x80 >> (pos % 8);
      }
    }
  }
  out
}

/// First `bits` bits of SHA256(entropy), right-aligned in a byte.
fn checksum(entropy: &[u8], bits: usize) -> u8 {
  let hash = Sha256::digest(entropy);
  hash[0] >> (8 - bits)
}

/// Normalize the mnemonic per BIP-39:
/// - NFKD normalization
/// - collapse all Unicode whitespace to single ASCII spaces
fn normalize_mnemonic(mnemonic: &str) -> String {
  mnemonic
    .nfkd()
    .collect::<String>()
    .split_whitespace()
    .collect::<Vec<_>>()
    .join(" ")
}

/// NFKD for the passphrase (no whitespace collapsing)
fn normalize_passphrase(passphrase: &str) -> String {
  passphrase.nfkd().collect::<String>()
}

/// A validated BIP-39 mnemonic sentence (normalized form).
#[derive(Clone, PartialEq, Eq)]
pub struct Mnemonic {
  phrase: String,
  word_count: WordCount,
}

impl Drop for Mnemonic {
  fn drop(&mut self) {
    self.phrase.zeroize();
  }
}

impl fmt::Debug for Mnemonic {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Mnemonic({} words, redacted)", self.word_count.words())
  }
}

impl Mnemonic {
  /// Validate and normalize a sentence: word count, word list membership, checksum.
  pub fn parse(sentence: &str) -> Result<Self, MnemonicError> {
    let phrase = Zeroizing::new(normalize_mnemonic(sentence));
    let words: Vec<&str> = if phrase.is_empty() {
      Vec::new()
    } else {
      phrase.split(' ').collect()
    };
    let word_count = WordCount::from_words(words.len())?;

    let mut indices = Zeroizing::new(Vec::with_capacity(words.len()));
    for (pos, w) in words.iter().enumerate() {
      let idx = Language::English
        .find_word(w)
        .ok_or(MnemonicError::UnknownWord(pos + 1))?;
      indices.push(idx);
    }

    let stream = Zeroizing::new(indices_to_bitstream(&indices));
    let ent = word_count.entropy_bytes();
    let cs_bits = word_count.checksum_bits();
    let embedded = stream[ent] >> (8 - cs_bits);
    if embedded != checksum(&stream[..ent], cs_bits) {
      return Err(MnemonicError::Checksum);
    }

    Ok(Mnemonic {
      phrase: phrase.to_string(),
      word_count,
    })
  }

  /// Encode 16 or 32 bytes of entropy as a 12- or 24-word sentence.
  pub fn from_entropy(entropy: &[u8]) -> Result<Self, MnemonicError> {
    let word_count = match entropy.len() {
      16 => WordCount::Words12,
      32 => WordCount::Words24,
      other => return Err(MnemonicError::EntropyLength(other)),
    };

    // Entropy + single checksum byte
    let mut stream = Zeroizing::new(Vec::with_capacity(entropy.len() + 1));
    stream.extend_from_slice(entropy);
    stream.push(Sha256::digest(entropy)[0]);

    let total_bits = entropy.len() * 8 + word_count.checksum_bits();
    let word_idxs = Zeroizing::new(bitstream_to_11_bit_indices(&stream, total_bits));

    let list = word_list();
    let phrase = word_idxs
      .iter()
      .map(|&idx| list[idx])
      .collect::<Vec<_>>()
      .join(" ");
    Ok(Mnemonic { phrase, word_count })
  }

  /// Generate a fresh sentence from OS randomness.
  pub fn generate(word_count: WordCount) -> Result<Self, WalletError> {
    let mut entropy = Zeroizing::new(vec![0u8; word_count.entropy_bytes()]);
    getrandom::fill(&mut entropy).map_err(|e| WalletError::Randomness(e.to_string()))?;
    Ok(Mnemonic::from_entropy(&entropy)?)
  }

  /// Recover the entropy bytes encoded by this sentence.
  pub fn entropy(&self) -> Zeroizing<Vec<u8>> {
    let indices: Zeroizing<Vec<u16>> = Zeroizing::new(
      self
        .phrase
        .split(' ')
        .filter_map(|w| Language::English.find_word(w))
        .collect(),
    );
    let mut stream = indices_to_bitstream(&indices);
    stream.truncate(self.word_count.entropy_bytes());
    Zeroizing::new(stream)
  }

  pub fn word_count(&self) -> WordCount {
    self.word_count
  }

  pub fn words(&self) -> impl Iterator<Item = &str> {
    self.phrase.split(' ')
  }

  /// The normalized sentence. Treat as secret.
  pub fn phrase(&self) -> &str {
    &self.phrase
  }

  pub fn to_seed(&self, passphrase: &str) -> Seed {
    Seed(Zeroizing::new(mnemonic_to_seed(&self.phrase, passphrase)))
  }
}

impl FromStr for Mnemonic {
  type Err = MnemonicError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Mnemonic::parse(s)
  }
}

/// A 64-byte BIP-39 seed, wiped on drop.
#[derive(Clone)]
pub struct Seed(Zeroizing<[u8; 64]>);

impl Seed {
  pub fn as_bytes(&self) -> &[u8; 64] {
    &self.0
  }
}

impl From<[u8; 64]> for Seed {
  fn from(bytes: [u8; 64]) -> Self {
    Seed(Zeroizing::new(bytes))
  }
}

impl fmt::Debug for Seed {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("Seed(redacted)")
  }
}

/// True when `mnemonic` is a well-formed 12- or 24-word English sentence with a valid checksum.
pub fn validate(mnemonic: &str) -> bool {
  Mnemonic::parse(mnemonic).is_ok()
}

/// Derive the 64-byte seed from a BIP-39 mnemonic and optional passphrase.
///
/// `passphrase` may be empty ("").
///
/// This function does **not** validate the mnemonic; use [`Mnemonic::parse`]
/// first when the input is untrusted.
pub fn mnemonic_to_seed(mnemonic: &str, passphrase: &str) -> [u8; 64] {
  let m_norm = Zeroizing::new(normalize_mnemonic(mnemonic));
  let p_norm = Zeroizing::new(normalize_passphrase(passphrase));
  let mut seed = [0u8; 64];
  let salt = Zeroizing::new(String::from("mnemonic") + &p_norm);
  pbkdf2::pbkdf2_hmac::<Sha512>(m_norm.as_bytes(), salt.as_bytes(), PBKDF2_ROUNDS, &mut seed);
  seed
}

/* ----------------------------- Tests ----------------------------- */

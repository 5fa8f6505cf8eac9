use hdscan::address::{AddressEncoder, BitcoinEncoder, Scheme};
use hdscan::error::Result;
use hdscan::paths::Candidate;
use hdscan::{
  DerivationPath, Mnemonic, Network, ScanConfig, ScanMode, SparkAddressEncoder, WalletError, WalletReconciler,
};
use secp256k1::PublicKey;

const ABANDON: &str =
  "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

fn abandon() -> Mnemonic {
  Mnemonic::parse(ABANDON).unwrap()
}

fn config(max_accounts: u32, max_address_index: u32) -> ScanConfig {
  ScanConfig {
    max_accounts,
    max_address_index,
    ..ScanConfig::default()
  }
}

fn address_at(scheme: Scheme, account: u32, index: u32) -> String {
  let r = WalletReconciler::default();
  let path = r.catalog().bitcoin_path(scheme, account, 0, index).unwrap();
  let records = r.derive_all(&abandon(), "", [Candidate { scheme, path }]).unwrap();
  records[0].address.clone()
}

#[test]
fn wallet_matches_reference_addresses() {
  let wallet = WalletReconciler::default().derive_wallet(&abandon(), "", 0).unwrap();
  assert_eq!(wallet.addresses.bitcoin, "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu");
  assert_eq!(wallet.bitcoin_addresses.segwit, wallet.addresses.bitcoin);
  assert_eq!(wallet.bitcoin_addresses.nested_segwit, "37VucYSaXLCAsxYyAPfbSi9eh4iEcbShgf");
  assert_eq!(wallet.bitcoin_addresses.legacy, "1LqBGSKuX5yYUonjxT5qGfpUsXKYYWeabA");
  assert_eq!(
    wallet.bitcoin_addresses.taproot,
    "bc1p5cyxnuxmeuwuvkwfem96lqzszd02n6xdcjrs20cac6yqjjwudpxqkedrcr"
  );
  assert!(wallet.addresses.spark.starts_with("sp1"));
  assert!((65..=66).contains(&wallet.addresses.spark.len()));
  assert!(wallet.mnemonic.is_none());
}

#[test]
fn bip84_second_receive_address() {
  assert_eq!(
    address_at(Scheme::NativeSegwit, 0, 1),
    "bc1qnjg0jd8228aq7egyzacy8cys3knf9xvrerkf9g"
  );
}

#[test]
fn derive_schemes_is_path_major() {
  let r = WalletReconciler::default();
  let paths: [DerivationPath; 2] = ["m/84'/0'/0'/0/0".parse().unwrap(), "m/84'/0'/0'/0/1".parse().unwrap()];
  let records = r
    .derive_schemes(&abandon(), "", &[Scheme::NativeSegwit, Scheme::Legacy], &paths)
    .unwrap();
  assert_eq!(records.len(), 4);
  assert_eq!(records[0].address, "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu");
  assert_eq!(records[1].scheme, Scheme::Legacy);
  assert_eq!(records[1].public_key_hex, records[0].public_key_hex);
  assert_eq!(records[2].address, "bc1qnjg0jd8228aq7egyzacy8cys3knf9xvrerkf9g");
  assert_eq!(records[3].path.to_string(), "m/84'/0'/0'/0/1");
}

#[test]
fn derivation_is_idempotent() {
  let r = WalletReconciler::default();
  let candidates: Vec<_> = r.catalog().scan_candidates(2, 2).collect();
  let a = r.derive_all(&abandon(), "", candidates.clone()).unwrap();
  let b = r.derive_all(&abandon(), "", candidates).unwrap();
  assert_eq!(a, b);
  assert_eq!(a.len(), 16);
}

#[test]
fn finds_target_deep_in_the_scan_space() {
  let target = address_at(Scheme::NativeSegwit, 2, 3);
  let result = WalletReconciler::default()
    .find_match(&abandon(), "", &target, &ScanConfig::default())
    .unwrap();
  assert!(result.found);
  assert_eq!(result.matches.len(), 1);
  let hit = &result.matches[0];
  assert_eq!(hit.path.to_string(), "m/84'/0'/2'/0/3");
  assert_eq!(hit.scheme, Scheme::NativeSegwit);
  assert_eq!(hit.address, target);
  // account 2 * 20 + index 3 * 4 + scheme 2, counted from one
  assert_eq!(result.scanned, 55);
}

#[test]
fn target_outside_bounds_is_not_found() {
  let target = address_at(Scheme::Legacy, 0, 5);
  let r = WalletReconciler::default();
  let result = r.find_match(&abandon(), "", &target, &config(5, 5)).unwrap();
  assert!(!result.found);
  assert_eq!(result.scanned, 100);

  let result = r.find_match(&abandon(), "", &target, &config(1, 6)).unwrap();
  assert!(result.found);
}

#[test]
fn unrelated_address_is_not_found() {
  let result = WalletReconciler::default()
    .find_match(&abandon(), "", "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH", &config(2, 2))
    .unwrap();
  assert!(!result.found);
  assert!(result.matches.is_empty());
}

#[test]
fn malformed_target_is_rejected() {
  let r = WalletReconciler::default();
  for bad in ["bc1qinvalid", "", "sp1pnotreally", "37VucYSaXLCAsxYyAPfbSi9eh4iEcbShgg"] {
    assert!(
      matches!(
        r.find_match(&abandon(), "", bad, &ScanConfig::default()),
        Err(WalletError::InvalidAddress(_))
      ),
      "{bad:?}"
    );
  }
}

#[test]
fn invalid_mnemonic_never_reaches_the_scanner() {
  let bad = ABANDON.replace("about", "abandon");
  assert!(Mnemonic::parse(&bad).is_err());
  assert!(!hdscan::mnemonic::validate(&bad));
}

#[test]
fn parallel_scan_agrees_with_sequential() {
  let r = WalletReconciler::default();
  for target in [
    address_at(Scheme::Taproot, 1, 4),
    address_at(Scheme::Legacy, 0, 0),
    "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH".to_string(),
  ] {
    for mode in [ScanMode::First, ScanMode::All] {
      let seq = ScanConfig {
        mode,
        ..ScanConfig::default()
      };
      let par = ScanConfig {
        parallel: true,
        ..seq.clone()
      };
      let a = r.find_match(&abandon(), "", &target, &seq).unwrap();
      let b = r.find_match(&abandon(), "", &target, &par).unwrap();
      assert_eq!(a.found, b.found);
      assert_eq!(a.matches, b.matches);
    }
  }
}

#[test]
fn testnet_scan() {
  let r = WalletReconciler::new(Network::Testnet);
  let wallet = r.derive_wallet(&abandon(), "", 0).unwrap();
  assert!(wallet.bitcoin_addresses.segwit.starts_with("tb1q"));
  assert!(wallet.addresses.spark.starts_with("spt1"));

  let testnet = ScanConfig {
    network: Network::Testnet,
    ..config(2, 2)
  };
  let hit = r
    .find_first(&abandon(), "", &wallet.bitcoin_addresses.taproot, &testnet)
    .unwrap()
    .unwrap();
  assert_eq!(hit.path.to_string(), "m/86'/1'/0'/0/0");
  assert!(hit.private_key_wif.is_none());
}

/// Every legacy key maps to the same address, so each legacy candidate matches.
struct CollidingLegacy(BitcoinEncoder);

const COLLISION: &str = "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH";

impl AddressEncoder for CollidingLegacy {
  fn legacy_address(&self, _pk: &PublicKey) -> Result<String> {
    Ok(COLLISION.to_string())
  }

  fn nested_segwit_address(&self, pk: &PublicKey) -> Result<String> {
    self.0.nested_segwit_address(pk)
  }

  fn native_segwit_address(&self, pk: &PublicKey) -> Result<String> {
    self.0.native_segwit_address(pk)
  }

  fn taproot_address(&self, pk: &PublicKey) -> Result<String> {
    self.0.taproot_address(pk)
  }

  fn classify(&self, address: &str) -> Result<Scheme> {
    self.0.classify(address)
  }
}

/// A plain-hex identity format.
struct HexSpark;

impl SparkAddressEncoder for HexSpark {
  fn spark_address(&self, pk: &PublicKey) -> Result<String> {
    Ok(format!("spark:{}", hex::encode(pk.serialize())))
  }

  fn recognizes(&self, address: &str) -> bool {
    address
      .strip_prefix("spark:")
      .and_then(|h| hex::decode(h).ok())
      .is_some_and(|b| PublicKey::from_slice(&b).is_ok())
  }
}

fn custom() -> WalletReconciler<CollidingLegacy, HexSpark> {
  WalletReconciler::with_encoders(CollidingLegacy(BitcoinEncoder::default()), HexSpark, Network::Mainnet)
}

#[test]
fn find_all_reports_every_match_in_scan_order() {
  let r = custom();
  let all = r.find_all(&abandon(), "", COLLISION, &config(2, 2)).unwrap();
  let paths: Vec<String> = all.iter().map(|m| m.path.to_string()).collect();
  assert_eq!(
    paths,
    ["m/44'/0'/0'/0/0", "m/44'/0'/0'/0/1", "m/44'/0'/1'/0/0", "m/44'/0'/1'/0/1"]
  );

  let first = r.find_first(&abandon(), "", COLLISION, &config(2, 2)).unwrap().unwrap();
  assert_eq!(first.path.to_string(), "m/44'/0'/0'/0/0");

  let par = ScanConfig {
    parallel: true,
    mode: ScanMode::All,
    ..config(2, 2)
  };
  let result = r.find_match(&abandon(), "", COLLISION, &par).unwrap();
  assert_eq!(result.matches, all);
}

#[test]
fn injected_spark_encoder_is_used_for_derivation_and_search() {
  let r = custom();
  let wallet = r.derive_wallet(&abandon(), "", 2).unwrap();
  assert!(wallet.addresses.spark.starts_with("spark:02") || wallet.addresses.spark.starts_with("spark:03"));
  // the bitcoin side still uses the wrapped standard encoder
  assert_eq!(wallet.bitcoin_addresses.legacy, COLLISION);

  let result = r
    .find_match(&abandon(), "", &wallet.addresses.spark, &config(3, 1))
    .unwrap();
  assert!(result.found);
  assert_eq!(result.matches[0].path.to_string(), "m/8797555'/2'/0'");
  assert_eq!(result.scanned, 3);
}

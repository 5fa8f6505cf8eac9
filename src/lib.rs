pub mod address;
pub mod bip32;
pub mod config;
pub mod error;
pub mod hash;
pub mod mnemonic;
pub mod paths;
pub mod reconcile;
pub mod record;
pub mod spark;

pub use address::{AddressEncoder, BitcoinEncoder, Scheme};
pub use bip32::{DerivationPath, ExtendedPrivKey, ExtendedPubKey, Network};
pub use config::{ScanConfig, ScanMode};
pub use error::{MnemonicError, WalletError};
pub use mnemonic::{Mnemonic, Seed, WordCount};
pub use paths::{Candidate, PathCatalog};
pub use reconcile::{CancellationToken, WalletReconciler};
pub use record::{AddressRecord, ReconciliationResult, WalletBundle};
pub use spark::{SparkAddressEncoder, SparkBech32m};

use std::io::Write;

use clap::{arg, ArgAction, ArgMatches, Command};
use serde::Serialize;

use crate::bip32::Bip32Error;

fn print_json<T: Serialize>(out: &mut dyn Write, value: &T) -> Result<(), WalletError> {
  serde_json::to_writer_pretty(&mut *out, value)?;
  writeln!(out)?;
  Ok(())
}

fn network_arg(matches: &ArgMatches) -> Option<Network> {
  matches.get_one::<Network>("network").copied()
}

fn run_cmd_bip39_new(matches: &ArgMatches, out: &mut dyn Write) -> Result<(), WalletError> {
  let word_count = matches
    .get_one::<WordCount>("wordcount")
    .copied()
    .unwrap_or(WordCount::Words12);
  let mnemonic = Mnemonic::generate(word_count)?;
  writeln!(out, "{}", mnemonic.phrase())?;
  Ok(())
}

fn run_cmd_bip39_seed_derivation(matches: &ArgMatches, out: &mut dyn Write) -> Result<(), WalletError> {
  let mnemonic: &String = matches
    .get_one("mnemonic")
    .ok_or_else(|| WalletError::Config("mnemonic is required".into()))?;
  let passphrase = matches
    .get_one::<String>("passphrase")
    .map(String::as_str)
    .unwrap_or("");
  let mnemonic = Mnemonic::parse(mnemonic)?;
  let seed = mnemonic.to_seed(passphrase);
  writeln!(out, "{}", hex::encode(seed.as_bytes()))?;
  Ok(())
}

fn run_cmd_bip39_check(matches: &ArgMatches, out: &mut dyn Write) -> Result<(), WalletError> {
  let mnemonic: &String = matches
    .get_one("mnemonic")
    .ok_or_else(|| WalletError::Config("mnemonic is required".into()))?;
  let mnemonic = Mnemonic::parse(mnemonic)?;
  writeln!(out, "valid ({} words)", mnemonic.word_count().words())?;
  Ok(())
}

fn run_cmd_bip32_key_derivation(matches: &ArgMatches, out: &mut dyn Write) -> Result<(), WalletError> {
  let ms_match = matches.get_one::<Mnemonic>("mnemonic");
  let seed_match = matches.get_one::<String>("seed");
  let xprv_match = matches.get_one::<String>("xprv");
  let passphrase = matches
    .get_one::<String>("passphrase")
    .map(String::as_str)
    .unwrap_or("");
  let network = network_arg(matches).unwrap_or_default();

  let (root, network) = match (ms_match, seed_match, xprv_match) {
    (Some(mnemonic), None, None) => {
      let seed = mnemonic.to_seed(passphrase);
      (ExtendedPrivKey::master(seed.as_bytes())?, network)
    }
    (None, Some(seed), None) => {
      let seed = zeroize::Zeroizing::new(hex::decode(seed).map_err(|_| Bip32Error::InvalidSeed)?);
      (ExtendedPrivKey::master(&seed)?, network)
    }
    // An xprv carries its own network.
    (None, None, Some(xprv)) => bip32::parse_xprv(xprv)?,
    _ => {
      return Err(WalletError::Config(
        "exactly one of --mnemonic, --seed or --xprv is required".into(),
      ))
    }
  };

  let path: &String = matches
    .get_one("path")
    .ok_or_else(|| WalletError::Config("path is required".into()))?;
  let path = bip32::parse_path(path)?;
  let xprv = bip32::derive_priv_from_path(&root, path.as_slice())?;
  let encoded = if matches.get_flag("public") {
    xprv.to_xpub().to_base58(network)
  } else {
    xprv.to_base58(network)
  };
  writeln!(out, "{encoded}")?;
  Ok(())
}

fn run_cmd_wallet(matches: &ArgMatches, generate: bool, out: &mut dyn Write) -> Result<(), WalletError> {
  let account = matches.get_one::<u32>("account").copied().unwrap_or(0);
  let passphrase = matches
    .get_one::<String>("passphrase")
    .map(String::as_str)
    .unwrap_or("");
  let network = network_arg(matches).unwrap_or_default();

  let mnemonic = if generate {
    let word_count = matches
      .get_one::<WordCount>("wordcount")
      .copied()
      .unwrap_or(WordCount::Words12);
    Mnemonic::generate(word_count)?
  } else {
    matches
      .get_one::<Mnemonic>("mnemonic")
      .cloned()
      .ok_or_else(|| WalletError::Config("mnemonic is required".into()))?
  };

  let reconciler = WalletReconciler::new(network);
  let mut bundle = reconciler.derive_wallet(&mnemonic, passphrase, account)?;
  if generate {
    bundle.mnemonic = Some(mnemonic.phrase().to_string());
  }
  print_json(out, &bundle)
}

fn run_cmd_scan(matches: &ArgMatches, out: &mut dyn Write) -> Result<(), WalletError> {
  let target: &String = matches
    .get_one("address")
    .ok_or_else(|| WalletError::Config("address is required".into()))?;
  let mnemonic = matches
    .get_one::<Mnemonic>("mnemonic")
    .ok_or_else(|| WalletError::Config("mnemonic is required".into()))?;
  let passphrase = matches
    .get_one::<String>("passphrase")
    .map(String::as_str)
    .unwrap_or("");

  // Flags override the config file, which overrides the defaults.
  let mut config = match matches.get_one::<std::path::PathBuf>("config") {
    Some(path) => ScanConfig::from_file(path)?,
    None => ScanConfig::default(),
  };
  if let Some(n) = matches.get_one::<u32>("accounts") {
    config.max_accounts = *n;
  }
  if let Some(n) = matches.get_one::<u32>("indices") {
    config.max_address_index = *n;
  }
  if matches.get_flag("all") {
    config.mode = ScanMode::All;
  }
  if matches.get_flag("parallel") {
    config.parallel = true;
  }
  if let Some(network) = network_arg(matches) {
    config.network = network;
  }

  let reconciler = WalletReconciler::new(config.network);
  let result = reconciler.find_match(mnemonic, passphrase, target, &config)?;
  print_json(out, &result)
}

fn mnemonic_parser() -> clap::builder::ValueParser {
  clap::builder::ValueParser::new(|s: &str| Mnemonic::parse(s))
}

fn wordcount_arg() -> clap::Arg {
  arg!([WORD_COUNT] "Number of words in the mnemonic - must be 12 or 24")
    .id("wordcount")
    .value_parser(clap::builder::ValueParser::new(|s: &str| match s.parse::<usize>() {
      Ok(n) => WordCount::from_words(n).map_err(|_| "expected 12 or 24"),
      Err(_) => Err("expected integer (12 or 24)"),
    }))
    .default_value("12")
}

fn network_opt() -> clap::Arg {
  arg!(-n --network <NETWORK> "network (either mainnet or testnet)")
    .id("network")
    .value_parser(clap::builder::ValueParser::new(|s: &str| s.parse::<Network>()))
}

fn passphrase_opt() -> clap::Arg {
  arg!(-p --passphrase <PHRASE> "Optional BIP-39 passphrase")
}

fn account_opt() -> clap::Arg {
  arg!(-a --account <ACCOUNT> "Account index (below 2^31)")
    .id("account")
    .value_parser(clap::value_parser!(u32).range(..0x8000_0000_i64))
    .default_value("0")
}

pub fn command() -> Command {
  Command::new(env!("CARGO_CRATE_NAME"))
    .version(env!("CARGO_PKG_VERSION"))
    .about("HD wallet utilities - BIP-39 mnemonics, BIP-32 derivation, multi-scheme addresses and wallet reconciliation")
    .arg_required_else_help(true)
    .subcommand(
      Command::new("32")
        .about("Derive child keys using the BIP-32 protocol")
        .visible_alias("derive")
        .arg(arg!(<PATH> "BIP-32 derivation path e.g. m/84'/0'/0'/0/0").id("path"))
        .arg(
          arg!(-m --mnemonic <MNEMONIC> "BIP-39 mnemonic sentence (12 or 24 words)")
            .id("mnemonic")
            .required_unless_present_any(["seed", "xprv"])
            .conflicts_with_all(["seed", "xprv"])
            .value_parser(mnemonic_parser()),
        )
        .arg(
          arg!(-s --seed <SEED> "64-byte seed, given as a hexadecimal string")
            .id("seed")
            .required_unless_present_any(["mnemonic", "xprv"])
            .conflicts_with_all(["mnemonic", "xprv"]),
        )
        .arg(
          arg!(-x --xprv <XPRV> "BIP-32 extended private key (any depth)")
            .id("xprv")
            .required_unless_present_any(["mnemonic", "seed"])
            .conflicts_with_all(["mnemonic", "seed"]),
        )
        .arg(passphrase_opt().requires("mnemonic"))
        .arg(network_opt().conflicts_with("xprv"))
        .arg(arg!(--public "Print the extended public key instead").id("public").action(ArgAction::SetTrue)),
    )
    .subcommand(
      Command::new("39")
        .about("Generate random mnemonic sentences per BIP-39, validate them, or derive a 64-byte seed")
        .arg_required_else_help(true)
        .visible_alias("mnemonic")
        .subcommand(
          Command::new("new")
            .about("Create new random BIP-39 mnemonic")
            .arg(wordcount_arg()),
        )
        .subcommand(
          Command::new("seed")
            .about("Derive the 64-byte seed from a mnemonic")
            .arg(arg!(<MNEMONIC> "Valid BIP-39 mnemonic - must be 12 or 24 words").id("mnemonic"))
            .arg(passphrase_opt()),
        )
        .subcommand(
          Command::new("check")
            .about("Validate word count, word list membership and checksum")
            .arg(arg!(<MNEMONIC> "BIP-39 mnemonic sentence").id("mnemonic")),
        ),
    )
    .subcommand(
      Command::new("wallet")
        .about("Derive every address type for one account")
        .arg_required_else_help(true)
        .subcommand(
          Command::new("generate")
            .about("Create a new mnemonic and print its wallet")
            .arg(wordcount_arg())
            .arg(passphrase_opt())
            .arg(account_opt())
            .arg(network_opt()),
        )
        .subcommand(
          Command::new("import")
            .about("Print the wallet of an existing mnemonic")
            .arg(
              arg!(<MNEMONIC> "BIP-39 mnemonic sentence (12 or 24 words)")
                .id("mnemonic")
                .value_parser(mnemonic_parser()),
            )
            .arg(passphrase_opt())
            .arg(account_opt())
            .arg(network_opt()),
        ),
    )
    .subcommand(
      Command::new("scan")
        .about("Search a mnemonic's derivation paths for an address")
        .arg(arg!(<ADDRESS> "Target address (legacy, nested SegWit, native SegWit, Taproot or Spark)").id("address"))
        .arg(
          arg!(-m --mnemonic <MNEMONIC> "BIP-39 mnemonic sentence (12 or 24 words)")
            .id("mnemonic")
            .required(true)
            .value_parser(mnemonic_parser()),
        )
        .arg(passphrase_opt())
        .arg(
          arg!(--accounts <N> "Number of accounts to scan")
            .id("accounts")
            .value_parser(clap::value_parser!(u32)),
        )
        .arg(
          arg!(--indices <N> "Number of receive indices to scan per account")
            .id("indices")
            .value_parser(clap::value_parser!(u32)),
        )
        .arg(arg!(--all "Report every match instead of the first").id("all").action(ArgAction::SetTrue))
        .arg(arg!(--parallel "Scan on all cores").id("parallel").action(ArgAction::SetTrue))
        .arg(
          arg!(--config <FILE> "JSON scan configuration")
            .id("config")
            .value_parser(clap::value_parser!(std::path::PathBuf)),
        )
        .arg(network_opt()),
    )
}

pub fn run() -> Result<(), WalletError> {
  let matches = command().get_matches();
  run_with(&matches, &mut std::io::stdout().lock())
}

/// Dispatch parsed arguments, writing command output to `out`.
pub fn run_with(matches: &ArgMatches, out: &mut dyn Write) -> Result<(), WalletError> {
  match matches.subcommand() {
    Some(("39", matches)) => match matches.subcommand() {
      Some(("new", matches)) => run_cmd_bip39_new(matches, out),
      Some(("seed", matches)) => run_cmd_bip39_seed_derivation(matches, out),
      Some(("check", matches)) => run_cmd_bip39_check(matches, out),
      _ => unreachable!("BIP39 subcommand should be required"),
    },
    Some(("32", matches)) => run_cmd_bip32_key_derivation(matches, out),
    Some(("wallet", matches)) => match matches.subcommand() {
      Some(("generate", matches)) => run_cmd_wallet(matches, true, out),
      Some(("import", matches)) => run_cmd_wallet(matches, false, out),
      _ => unreachable!("wallet subcommand should be required"),
    },
    Some(("scan", matches)) => run_cmd_scan(matches, out),
    _ => unreachable!("top-level subcommand should be required"),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const ABANDON: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

  fn run_args(args: &[&str]) -> Result<String, WalletError> {
    let matches = command().try_get_matches_from(args.iter().copied()).unwrap();
    let mut out = Vec::new();
    run_with(&matches, &mut out)?;
    Ok(String::from_utf8(out).unwrap())
  }

  fn run_json(args: &[&str]) -> serde_json::Value {
    serde_json::from_str(&run_args(args).unwrap()).unwrap()
  }

  #[test]
  fn command_is_well_formed() {
    command().debug_assert();
  }

  #[test]
  fn scan_flags_parse() {
    let m = command()
      .try_get_matches_from([
        "hdscan", "scan", "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu", "-m", ABANDON, "--accounts", "3",
        "--all", "--parallel", "-n", "testnet",
      ])
      .unwrap();
    let (_, scan) = m.subcommand().unwrap();
    assert_eq!(scan.get_one::<u32>("accounts"), Some(&3));
    assert_eq!(scan.get_one::<u32>("indices"), None);
    assert!(scan.get_flag("all"));
    assert!(scan.get_flag("parallel"));
    assert_eq!(scan.get_one::<Network>("network"), Some(&Network::Testnet));
    assert_eq!(scan.get_one::<Mnemonic>("mnemonic").unwrap().phrase(), ABANDON);
  }

  #[test]
  fn rejects_bad_mnemonic_and_word_count() {
    let bad = ABANDON.replace("about", "abandon");
    assert!(command()
      .try_get_matches_from(["hdscan", "wallet", "import", bad.as_str()])
      .is_err());
    assert!(command()
      .try_get_matches_from(["hdscan", "39", "new", "15"])
      .is_err());
  }

  #[test]
  fn derive_sources_are_exclusive() {
    assert!(command()
      .try_get_matches_from(["hdscan", "32", "m/0", "-m", ABANDON, "-s", "00"])
      .is_err());
    assert!(command()
      .try_get_matches_from(["hdscan", "32", "m/0"])
      .is_err());
  }

  #[test]
  fn bip39_commands() {
    let phrase = run_args(&["hdscan", "39", "new", "24"]).unwrap();
    let m = Mnemonic::parse(phrase.trim_end()).unwrap();
    assert_eq!(m.word_count(), WordCount::Words24);

    assert_eq!(
      run_args(&["hdscan", "39", "seed", ABANDON, "-p", "TREZOR"]).unwrap(),
      "c55257c360c07c72029aebc1b53c05ed0362ada38ead3e3e9efa3708e53495531f09a6987599d18264c1e1c92f2cf141630c7a3c4ab7c81b2f001698e7463b04\n"
    );

    assert_eq!(run_args(&["hdscan", "39", "check", ABANDON]).unwrap(), "valid (12 words)\n");
    let bad = ABANDON.replace("about", "abandon");
    assert!(matches!(
      run_args(&["hdscan", "39", "check", bad.as_str()]),
      Err(WalletError::InvalidMnemonic(_))
    ));
  }

  #[test]
  fn derive_from_seed_and_xprv() {
    let seed = "000102030405060708090a0b0c0d0e0f";
    let xprv = "xprv9uHRZZhk6KAJC1avXpDAp4MDc3sQKNxDiPvvkX8Br5ngLNv1TxvUxt4cV1rGL5hj6KCesnDYUhd7oWgT11eZG7XnxHrnYeSvkzY7d2bhkJ7";
    assert_eq!(run_args(&["hdscan", "32", "m/0'", "-s", seed]).unwrap(), format!("{xprv}\n"));
    assert_eq!(
      run_args(&["hdscan", "32", "m/0'", "-s", seed, "--public"]).unwrap(),
      "xpub68Gmy5EdvgibQVfPdqkBBCHxA5htiqg55crXYuXoQRKfDBFA1WEjWgP6LHhwBZeNK1VTsfTFUHCdrfp1bgwQ9xv5ski8PX9rL2dZXvgGDnw\n"
    );
    // m/0'/1 of the same seed, continued from the depth-1 key
    assert_eq!(
      run_args(&["hdscan", "derive", "m/1", "-x", xprv]).unwrap(),
      "xprv9wTYmMFdV23N2TdNG573QoEsfRrWKQgWeibmLntzniatZvR9BmLnvSxqu53Kw1UmYPxLgboyZQaXwTCg8MSY3H2EU4pWcQDnRnrVA1xe8fs\n"
    );
  }

  #[test]
  fn wallet_generate_prints_new_mnemonic_and_addresses() {
    let v = run_json(&["hdscan", "wallet", "generate"]);
    let m = Mnemonic::parse(v["mnemonic"].as_str().unwrap()).unwrap();
    assert_eq!(m.word_count(), WordCount::Words12);
    assert!(v["addresses"]["bitcoin"].as_str().unwrap().starts_with("bc1q"));
    assert!(v["privateKeys"]["bitcoin"]["wif"].is_string());

    let v = run_json(&["hdscan", "wallet", "generate", "24", "-p", "extra", "-a", "3", "-n", "testnet"]);
    let m = Mnemonic::parse(v["mnemonic"].as_str().unwrap()).unwrap();
    assert_eq!(m.word_count(), WordCount::Words24);
    assert!(v["bitcoinAddresses"]["taproot"].as_str().unwrap().starts_with("tb1p"));
    assert!(v["addresses"]["spark"].as_str().unwrap().starts_with("spt1"));
  }

  #[test]
  fn wallet_import_prints_reference_addresses() {
    let v = run_json(&["hdscan", "wallet", "import", ABANDON]);
    assert!(v.get("mnemonic").is_none());
    assert_eq!(v["addresses"]["bitcoin"], "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu");
    assert_eq!(v["bitcoinAddresses"]["legacy"], "1LqBGSKuX5yYUonjxT5qGfpUsXKYYWeabA");

    let with_passphrase = run_json(&["hdscan", "wallet", "import", ABANDON, "-p", "TREZOR"]);
    assert_ne!(with_passphrase["addresses"]["bitcoin"], v["addresses"]["bitcoin"]);
  }

  #[test]
  fn scan_command_reports_match() {
    let v = run_json(&[
      "hdscan", "scan", "37VucYSaXLCAsxYyAPfbSi9eh4iEcbShgf", "-m", ABANDON, "--accounts", "1", "--indices", "1",
    ]);
    assert_eq!(v["found"], true);
    assert_eq!(v["scanned"], 2);
    assert_eq!(v["matches"][0]["path"], "m/49'/0'/0'/0/0");
    assert_eq!(v["matches"][0]["address"], "37VucYSaXLCAsxYyAPfbSi9eh4iEcbShgf");
  }

  #[test]
  fn scan_command_reads_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scan.json");
    std::fs::write(&path, r#"{"maxAccounts": 1, "maxAddressIndex": 2}"#).unwrap();
    let config = path.to_str().unwrap();

    let v = run_json(&["hdscan", "scan", "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH", "-m", ABANDON, "--config", config]);
    assert_eq!(v["found"], false);
    assert_eq!(v["scanned"], 8);

    // flags win over the file
    let v = run_json(&[
      "hdscan", "scan", "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH", "-m", ABANDON, "--config", config, "--indices", "1",
    ]);
    assert_eq!(v["scanned"], 4);
  }

  #[test]
  fn scan_command_rejects_malformed_target() {
    assert!(matches!(
      run_args(&["hdscan", "scan", "bc1qinvalid", "-m", ABANDON]),
      Err(WalletError::InvalidAddress(_))
    ));
  }
}

//! Asset Notary CLI
//!
//! Entry point for the `notary` command-line tool.

use asset_notary::backend::{FileKeystore, KeyStore, LocalLedger};
use asset_notary::config::{EffectiveConfig, NotaryConfig};
use asset_notary::extract::{ExtractOptions, Extractor, Metadata};
use asset_notary::signing::{
    self, AssetInput, Overrides, PassphraseSource, SignError, SignIntent, SigningOrchestrator,
};
use asset_notary::trust::{Authenticator, Outcome, ResolutionBranch, Scope};
use asset_notary::{logging, NotaryError, Result};
use clap::{Args, Parser, Subcommand};
use notary_protocol::{SignerId, VerificationRecord, Visibility};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "notary")]
#[command(about = "Notarize and authenticate digital assets", version)]
struct Cli {
    /// Enable debug logging (NOTARY_LOG takes precedence)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Ledger file (default: ~/.local/share/notary/ledger.json)
    #[arg(long, global = true)]
    ledger: Option<PathBuf>,

    /// Keystore file (default: ~/.local/share/notary/key.json)
    #[arg(long, global = true)]
    keystore: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Authenticate assets against their notarization records
    Authenticate {
        /// Asset references (`<scheme>://<target>` or a path)
        #[arg(required_unless_present = "hash", conflicts_with = "hash")]
        references: Vec<String>,

        /// Authenticate a hash instead of an asset
        #[arg(long)]
        hash: Option<String>,

        /// Only accept records signed by these keys (repeatable or comma-separated)
        #[arg(long = "signer-id", short = 'k', value_delimiter = ',')]
        signer_ids: Vec<String>,

        /// Only accept records signed by members of this organisation
        #[arg(long)]
        org: Option<String>,
    },

    /// Notarize an asset as trusted
    Notarize(SignArgs),

    /// Mark an asset as untrusted
    Untrust(SignArgs),

    /// Mark an asset as unsupported
    Unsupport(SignArgs),

    /// Create the signing key
    Keygen,
}

#[derive(Args)]
struct SignArgs {
    /// Asset reference (`<scheme>://<target>` or a path)
    #[arg(required_unless_present = "hash", conflicts_with = "hash")]
    reference: Option<String>,

    /// Sign a hash instead of an asset
    #[arg(long)]
    hash: Option<String>,

    /// Set the asset name
    #[arg(long, short = 'n')]
    name: Option<String>,

    /// Add a key=value attribute (repeatable)
    #[arg(long = "attr", short = 'a')]
    attrs: Vec<String>,

    /// Make the asset name and metadata visible to everyone
    #[arg(long, short = 'p')]
    public: bool,

    /// Do not write an ignore file into notarized directories
    #[arg(long)]
    no_ignore_file: bool,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{}", failure_line(&e));
        process::exit(1);
    }
}

/// A not-trusted verdict is the answer to the query, not a failure to run.
fn failure_line(err: &NotaryError) -> String {
    if err.is_not_trusted() {
        err.to_string()
    } else {
        format!("Error: {}", err)
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut overrides = Map::new();
    if let Some(ledger) = &cli.ledger {
        overrides.insert("ledger_path".into(), json!(ledger.to_string_lossy()));
    }
    if let Some(keystore) = &cli.keystore {
        overrides.insert("keystore_path".into(), json!(keystore.to_string_lossy()));
    }
    if let Commands::Authenticate {
        signer_ids, org, ..
    } = &cli.command
    {
        // Flags replace both constraints from lower layers.
        if !signer_ids.is_empty() || org.is_some() {
            overrides.insert("signer_ids".into(), json!(signer_ids));
            overrides.insert("org".into(), json!(org));
        }
    }

    let effective = EffectiveConfig::load(Some(Value::Object(overrides)))?;
    let config = effective.config;

    match cli.command {
        Commands::Authenticate {
            references, hash, ..
        } => {
            let ledger = LocalLedger::open(config.ledger_path)?;
            let keystore = FileKeystore::new(config.keystore_path);
            let own_key = if keystore.exists() {
                Some(keystore.load()?.signer_id)
            } else {
                None
            };
            let extractor = Extractor::new(ExtractOptions {
                ignore_file_init: false,
            });

            let mut scope = Scope::new().with_signer_ids(&config.signer_ids)?;
            if let Some(org) = config.org.as_deref() {
                scope = scope.with_organisation(org, &ledger)?;
            }
            announce_scope(&scope, own_key.as_ref());

            let authenticator = Authenticator::new(&ledger, &extractor).with_own_key(own_key);
            match hash {
                Some(hash) => {
                    let outcome = authenticator.authenticate_hash(&hash, &scope)?;
                    print_outcome(&outcome);
                    outcome.verdict()?;
                }
                None => {
                    authenticator.authenticate(&references, &scope, print_outcome)?;
                }
            }
            Ok(())
        }

        Commands::Notarize(args) => run_sign(args, SignIntent::notarize(), config),
        Commands::Untrust(args) => run_sign(args, SignIntent::untrust(), config),
        Commands::Unsupport(args) => run_sign(args, SignIntent::unsupport(), config),

        Commands::Keygen => {
            let keystore = FileKeystore::new(config.keystore_path);
            let passphrase = signing::default_source()
                .provide(1)
                .map_err(SignError::from)?;
            let material = keystore.create(passphrase.expose())?;
            eprintln!("Key written to {}", keystore.path().display());
            println!("{}", material.signer_id);
            Ok(())
        }
    }
}

fn run_sign(args: SignArgs, intent: SignIntent, config: NotaryConfig) -> Result<()> {
    let ledger = LocalLedger::open(config.ledger_path)?;
    let keystore = FileKeystore::new(config.keystore_path);
    let own_key = keystore.load()?.signer_id;

    let extractor = Extractor::new(ExtractOptions {
        ignore_file_init: config.ignore_file_init && !args.no_ignore_file,
    });
    let input = match args.hash {
        Some(hash) => AssetInput::Hash(hash),
        None => AssetInput::Reference(args.reference.unwrap_or_default()),
    };
    let overrides = Overrides {
        name: args.name,
        attributes: parse_attributes(&args.attrs)?,
    };

    let artifact = signing::prepare_artifact(&input, overrides, &extractor, &ledger, &own_key)?;

    eprintln!("Your asset will not be uploaded but processed locally.");
    eprintln!();
    eprintln!("Signer:\t{}", own_key);

    let intent = intent.with_visibility(Visibility::for_flag(args.public));
    let mut passphrases = signing::default_source();
    let record = SigningOrchestrator::new(&ledger, &keystore, passphrases.as_mut())
        .run(&artifact, intent)?;

    print_record(&artifact.name, &artifact.hash, &record);
    Ok(())
}

fn parse_attributes(raw: &[String]) -> Result<Metadata> {
    raw.iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                Ok((key.to_string(), Value::String(value.to_string())))
            }
            _ => Err(NotaryError::InvalidAttribute(pair.clone())),
        })
        .collect()
}

fn announce_scope(scope: &Scope, own_key: Option<&SignerId>) {
    if scope.has_keys() {
        match scope.organisation() {
            Some(org) => eprintln!("Looking for an entry matching the organisation ({})...", org),
            None => eprintln!("Looking for an entry matching the passed signer IDs..."),
        }
    } else if let Some(key) = own_key {
        eprintln!("Looking for an entry matching the current key ({})...", key);
    } else {
        eprintln!("Looking for the last entry with highest level available...");
    }
}

fn print_outcome(outcome: &Outcome) {
    if outcome.resolution.branch == ResolutionBranch::Fallback {
        eprintln!("No entry matching the current key, using the highest level available...");
    }
    let name = outcome
        .stored
        .as_ref()
        .map(|stored| stored.name.as_str())
        .unwrap_or(outcome.artifact.name.as_str());
    print_record(name, outcome.query.hash(), &outcome.resolution.record);
}

fn print_record(name: &str, hash: &str, record: &VerificationRecord) {
    if !name.is_empty() {
        println!("Name:\t{}", name);
    }
    println!("Hash:\t{}", hash);
    println!("Status:\t{}", record.status);
    println!("Level:\t{}", record.level);
    if let Some(signer) = &record.signer_id {
        println!("Signer:\t{}", signer);
    }
    if let Some(timestamp) = record.timestamp {
        println!("Date:\t{}", timestamp.to_rfc3339());
    }
    println!();
}

//! CLI command implementations
//!
//! Commands are thin: load the configuration, open the corpus, run one
//! pass and print the result. All behavior lives in the corpus engine.

use std::path::Path;

use serde_json::json;

use crate::config::CorpusConfig;
use crate::corpus::{Corpus, CorpusError, EntityKey, UpsertOutcome, UpsertRequest};
use crate::observability::{log_event_with_fields, Event, Logger, Severity};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{read_record, write_json, write_text};

/// Parse arguments and run the selected command
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();

    // Log lines share stdout with the payload of these commands
    let payload_on_stdout = matches!(cli.command, Command::Print { .. } | Command::Counts { .. });
    if payload_on_stdout && cli.log_level < Severity::Error {
        Logger::set_threshold(Severity::Error);
    } else {
        Logger::set_threshold(cli.log_level);
    }

    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Test { config } => test(&config),
        Command::Build { config, out } => build(&config, out.as_deref()),
        Command::Print { config, collection } => print(&config, collection.as_deref()),
        Command::Counts { config } => counts(&config),
        Command::Upsert {
            config,
            collection,
            id,
            record,
            parents,
        } => upsert(&config, &collection, &id, &record, &parents),
    }
}

/// Load and validate the whole corpus.
///
/// Prints the report; fails if any violation or unresolved reference was found.
pub fn test(config_path: &Path) -> CliResult<()> {
    let corpus = open_corpus(config_path)?;
    let forest = corpus.load()?;
    let report = corpus.validate(&forest)?;

    write_text(&report.to_string())?;
    if report.is_clean() {
        Ok(())
    } else {
        Err(CliError::validation_failed(format!(
            "{} problems in {} entities",
            report.problem_count(),
            report.checked
        )))
    }
}

/// Validate, then write `data.json`.
///
/// Nothing is written when validation reports a problem.
pub fn build(config_path: &Path, out: Option<&Path>) -> CliResult<()> {
    let corpus = open_corpus(config_path)?;
    let forest = corpus.load()?;

    let report = corpus.validate(&forest)?;
    if !report.is_clean() {
        write_text(&report.to_string())?;
        return Err(CliError::validation_failed(
            "refusing to build a corpus with violations",
        ));
    }

    let path = corpus.write_build(&forest, out)?;
    write_json(&json!({
        "path": path.display().to_string(),
        "counts": forest.counts(),
    }))
}

/// Print the produced document, or one root collection of it.
pub fn print(config_path: &Path, collection: Option<&str>) -> CliResult<()> {
    let corpus = open_corpus(config_path)?;
    let forest = corpus.load()?;
    let document = corpus.build(&forest)?;

    match collection {
        None => write_json(&document),
        Some(name) => {
            let is_root = corpus
                .registry()
                .collection(name)
                .is_some_and(|c| c.is_root());
            match document.get(name) {
                Some(entries) if is_root => write_json(entries),
                _ => Err(CorpusError::UnknownCollection(name.to_string()).into()),
            }
        }
    }
}

/// Print entity counts per collection.
pub fn counts(config_path: &Path) -> CliResult<()> {
    let corpus = open_corpus(config_path)?;
    let forest = corpus.load()?;
    write_json(&json!(corpus.counts(&forest)))
}

/// Create a record from a file unless it already exists.
pub fn upsert(
    config_path: &Path,
    collection: &str,
    id: &str,
    record_path: &Path,
    parents: &[String],
) -> CliResult<()> {
    let record = read_record(record_path)?;
    let mut request = UpsertRequest::new(collection, id, record);
    for parent in parents {
        let key = parse_parent(parent)?;
        request = request.under(key.collection, key.id);
    }

    let corpus = open_corpus(config_path)?;
    let forest = corpus.load()?;

    match corpus.upsert(&forest, &request)? {
        UpsertOutcome::Created(path) => write_json(&json!({
            "status": "created",
            "path": path.display().to_string(),
        })),
        UpsertOutcome::Skipped(reason) => write_json(&json!({
            "status": "skipped",
            "reason": reason.as_str(),
        })),
    }
}

fn open_corpus(config_path: &Path) -> CliResult<Corpus> {
    let config = CorpusConfig::load(config_path)?;
    let path = config_path.display().to_string();
    let data_dir = config.data_dir.display().to_string();
    log_event_with_fields(
        Event::ConfigLoaded,
        &[("config", path.as_str()), ("data_dir", data_dir.as_str())],
    );
    Ok(Corpus::open(config)?)
}

/// `<collection>/<id>` into an entity key
fn parse_parent(value: &str) -> CliResult<EntityKey> {
    match value.split_once('/') {
        Some((collection, id)) if !collection.is_empty() && !id.is_empty() && !id.contains('/') => {
            Ok(EntityKey::new(collection, id))
        }
        _ => Err(CliError::invalid_argument(format!(
            "--parent expects <collection>/<id>, got '{}'",
            value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::errors::CliErrorCode;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const SCHEMA_FIELDS: &str = "fields:\n  id: { type: string, required: true }\n  name: { type: string, required: true }\n";

    /// Writes schemas for the default taxonomy and a config; returns the config path.
    fn setup(tmp: &TempDir) -> PathBuf {
        let data = tmp.path().join("data");
        let schemas = data.join("schemas");
        fs::create_dir_all(&schemas).unwrap();
        for (kind, collection) in [
            ("asset", "assets"),
            ("exchange", "exchanges"),
            ("wallet", "wallets"),
            ("network", "networks"),
            ("market", "markets"),
        ] {
            fs::write(
                schemas.join(format!("{kind}.yaml")),
                format!("kind: {kind}\ncollection: {collection}\n{SCHEMA_FIELDS}"),
            )
            .unwrap();
        }

        let config = tmp.path().join("coindex.json");
        fs::write(
            &config,
            json!({
                "data_dir": data,
                "output_dir": tmp.path().join("dist"),
            })
            .to_string(),
        )
        .unwrap();
        config
    }

    fn write_asset(tmp: &TempDir, id: &str, body: &str) {
        let dir = tmp.path().join("data/assets").join(id);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("asset.yaml"), body).unwrap();
    }

    #[test]
    fn test_parse_parent() {
        let key = parse_parent("exchanges/kraken").unwrap();
        assert_eq!(key, EntityKey::new("exchanges", "kraken"));

        for bad in ["kraken", "/kraken", "exchanges/", "a/b/c"] {
            assert_eq!(
                parse_parent(bad).unwrap_err().code(),
                &CliErrorCode::InvalidArgument
            );
        }
    }

    #[test]
    fn test_test_command_passes_and_fails() {
        let tmp = TempDir::new().unwrap();
        let config = setup(&tmp);
        write_asset(&tmp, "btc", "name: Bitcoin\n");
        assert!(test(&config).is_ok());

        write_asset(&tmp, "eth", "ticker: ETH\n");
        let err = test(&config).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::ValidationFailed);
    }

    #[test]
    fn test_build_writes_data_json() {
        let tmp = TempDir::new().unwrap();
        let config = setup(&tmp);
        write_asset(&tmp, "btc", "name: Bitcoin\n");

        build(&config, None).unwrap();
        assert!(tmp.path().join("dist/data.json").is_file());
    }

    #[test]
    fn test_build_refuses_invalid_corpus() {
        let tmp = TempDir::new().unwrap();
        let config = setup(&tmp);
        write_asset(&tmp, "btc", "{}\n");

        assert!(build(&config, None).is_err());
        assert!(!tmp.path().join("dist/data.json").exists());
    }

    #[test]
    fn test_fatal_load_error_surfaces() {
        let tmp = TempDir::new().unwrap();
        let config = setup(&tmp);
        fs::create_dir_all(tmp.path().join("data/assets/btc")).unwrap();
        fs::write(tmp.path().join("data/assets/btc/logo.svg"), "<svg/>").unwrap();

        let err = counts(&config).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::CorpusError);
        assert!(err.message().contains("COINDEX_MISSING_INDEX"));
    }

    #[test]
    fn test_upsert_then_skip() {
        let tmp = TempDir::new().unwrap();
        let config = setup(&tmp);
        let record = tmp.path().join("record.yaml");
        fs::write(&record, "name: Kraken\n").unwrap();

        upsert(&config, "exchanges", "kraken", &record, &[]).unwrap();
        upsert(&config, "exchanges", "kraken", &record, &[]).unwrap();
        upsert(
            &config,
            "markets",
            "btcusd",
            &record,
            &["exchanges/kraken".to_string()],
        )
        .unwrap();

        assert!(tmp
            .path()
            .join("data/exchanges/kraken/markets/btcusd/market.yaml")
            .is_file());
    }

    #[test]
    fn test_print_unknown_collection() {
        let tmp = TempDir::new().unwrap();
        let config = setup(&tmp);
        assert!(print(&config, Some("assets")).is_ok());
        assert!(print(&config, Some("networks")).is_err());
        assert!(print(&config, Some("tokens")).is_err());
    }

    #[test]
    fn test_missing_config() {
        let tmp = TempDir::new().unwrap();
        let err = counts(&tmp.path().join("nope.json")).unwrap_err();
        assert_eq!(err.code_str(), "COINDEX_CLI_CONFIG_ERROR");
    }
}

//! Command-line definitions for the `grimoire` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use grimoire_cache::{CacheConfig, Filters, RecordType};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "grimoire")]
#[command(about = "Local cache for tabletop reference content")]
#[command(version)]
pub struct Cli {
    /// Cache directory (overrides GRIMOIRE_DATA_DIR)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Embedding model name (overrides GRIMOIRE_EMBEDDING_MODEL)
    #[arg(long, global = true)]
    pub embedding_model: Option<String>,

    /// Model file cache directory (overrides GRIMOIRE_MODELS_PATH)
    #[arg(long, global = true)]
    pub models_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Import a JSON file of records from one producer
    Import {
        /// Record type: spells, creatures, equipment, rules
        record_type: RecordType,
        /// JSON array of records, or `-` for stdin
        file: PathBuf,
        /// Producer name stored as the record source
        #[arg(long, short)]
        source: String,
        /// Overwrite records from higher-priority sources
        #[arg(long)]
        force: bool,
        /// Generate embeddings while importing
        #[arg(long)]
        embed: bool,
    },
    /// Print one record
    Get { record_type: RecordType, slug: String },
    /// List records matching filters
    Query {
        record_type: RecordType,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Similarity search, falling back to a filtered query
    Search {
        record_type: RecordType,
        /// Free text; may be empty
        #[arg(default_value = "")]
        query: String,
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, short)]
        limit: Option<usize>,
    },
    /// List provenance documents across every collection
    Documents {
        /// Only documents from this producer
        #[arg(long, short)]
        source: Option<String>,
    },
    /// Show a document, registering metadata first when a title is given
    Document {
        document_key: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        publisher: Option<String>,
        #[arg(long)]
        license: Option<String>,
        #[arg(long)]
        url: Option<String>,
    },
    /// Embed stored records that have no vector
    Backfill {
        /// Record type; every type when omitted
        record_type: Option<RecordType>,
    },
    /// Print store statistics
    Stats,
}

#[derive(Args, Default)]
pub struct FilterArgs {
    /// `name=value` filter; comma-separated values form a list
    #[arg(long = "filter", short = 'f', value_name = "NAME=VALUE")]
    pub filters: Vec<String>,
}

impl FilterArgs {
    pub fn to_filters(&self) -> Result<Filters, String> {
        parse_filters(&self.filters)
    }
}

impl Cli {
    /// Environment configuration with command-line overrides applied
    pub fn config(&self) -> CacheConfig {
        let mut config = CacheConfig::from_env();
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(model) = &self.embedding_model {
            config.embedding_model = model.clone();
        }
        if let Some(dir) = &self.models_dir {
            config.models_dir = Some(dir.clone());
        }
        if let Command::Import { embed: true, .. } = self.command {
            config.embed_on_import = true;
        }
        config
    }
}

/// Parse `name=value` pairs into filters
pub fn parse_filters(pairs: &[String]) -> Result<Filters, String> {
    let mut filters = Filters::new();
    for pair in pairs {
        let (name, raw) = pair
            .split_once('=')
            .ok_or_else(|| format!("filter '{}' is not of the form name=value", pair))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("filter '{}' has no name", pair));
        }
        filters.insert(name.to_string(), parse_filter_value(raw));
    }
    Ok(filters)
}

/// `3` is a number, `true` a bool, `a,b` a list and an empty value an empty list
fn parse_filter_value(raw: &str) -> Value {
    let raw = raw.trim();
    if raw.is_empty() {
        return Value::Array(Vec::new());
    }
    if raw.contains(',') {
        return Value::Array(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(scalar)
                .collect(),
        );
    }
    scalar(raw)
}

fn scalar(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ (Value::Number(_) | Value::Bool(_))) => value,
        _ => Value::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(pairs: &[&str]) -> Vec<String> {
        pairs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_filters() {
        let filters =
            parse_filters(&args(&["level=3", "school=evocation", "ritual=true", "cr=1/2"])).unwrap();
        assert_eq!(filters["level"], json!(3));
        assert_eq!(filters["school"], json!("evocation"));
        assert_eq!(filters["ritual"], json!(true));
        assert_eq!(filters["cr"], json!("1/2"));
    }

    #[test]
    fn test_parse_lists() {
        let filters = parse_filters(&args(&["document=srd, tob", "level=1,2", "document_key="])).unwrap();
        assert_eq!(filters["document"], json!(["srd", "tob"]));
        assert_eq!(filters["level"], json!([1, 2]));
        assert_eq!(filters["document_key"], json!([]));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_filters(&args(&["level"])).is_err());
        assert!(parse_filters(&args(&["=3"])).is_err());
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from([
            "grimoire",
            "--data-dir",
            "/tmp/grimoire",
            "query",
            "spells",
            "-f",
            "level_min=3",
        ])
        .unwrap();
        assert_eq!(cli.config().data_dir, PathBuf::from("/tmp/grimoire"));
        match cli.command {
            Command::Query {
                record_type,
                filters,
            } => {
                assert_eq!(record_type, RecordType::Spell);
                assert_eq!(filters.to_filters().unwrap()["level_min"], json!(3));
            }
            _ => panic!("Expected query command"),
        }

        let cli = Cli::try_parse_from(["grimoire", "import", "monsters", "-", "--source", "api-a", "--embed"])
            .unwrap();
        assert!(cli.config().embed_on_import);
    }
}

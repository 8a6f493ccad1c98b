//! Grimoire command-line entry point
//!
//! Every subcommand opens the cache, runs one operation and prints JSON to
//! stdout. Logs go to stderr.

use std::io::Read;
use std::path::Path;

use anyhow::{anyhow, Context};
use clap::Parser;
use grimoire_cache::{DocumentInfo, RecordType};
use grimoire_server::cli::{Cli, Command};
use grimoire_server::ContentService;
use serde::Serialize;
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "grimoire=info,grimoire_server=info,grimoire_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = cli.config();
    let service = ContentService::new(config);
    service
        .initialize(None)
        .await
        .context("failed to open the content cache")?;

    match cli.command {
        Command::Import {
            record_type,
            file,
            source,
            force,
            embed: _,
        } => {
            let records = read_records(&file)?;
            tracing::info!("Importing {} {} from {:?}", records.len(), record_type, file);
            let summary = service
                .bulk_upsert(record_type, records, source, force)
                .await?;
            service.flush().await?;
            print_json(&summary)?;
        }
        Command::Get { record_type, slug } => {
            let record = service
                .get_entity(record_type, &slug)
                .await?
                .ok_or_else(|| anyhow!("{} '{}' not found", record_type, slug))?;
            print_json(&record)?;
        }
        Command::Query {
            record_type,
            filters,
        } => {
            let filters = filters.to_filters().map_err(|e| anyhow!(e))?;
            print_json(&service.query_entities(record_type, filters).await?)?;
        }
        Command::Search {
            record_type,
            query,
            filters,
            limit,
        } => {
            let filters = filters.to_filters().map_err(|e| anyhow!(e))?;
            let hits = service
                .semantic_search(record_type, query, filters, limit)
                .await?;
            print_json(&hits)?;
        }
        Command::Documents { source } => {
            print_json(&service.list_documents(source).await?)?;
        }
        Command::Document {
            document_key,
            title,
            publisher,
            license,
            url,
        } => {
            if let Some(title) = title {
                let mut info = DocumentInfo::new(document_key.clone(), title);
                info.publisher = publisher;
                info.license = license;
                info.url = url;
                service.register_document(info).await?;
                service.flush().await?;
            }
            let metadata = service
                .get_document_metadata(&document_key)
                .await?
                .ok_or_else(|| anyhow!("document '{}' not found", document_key))?;
            print_json(&metadata)?;
        }
        Command::Backfill { record_type } => {
            let types = match record_type {
                Some(record_type) => vec![record_type],
                None => RecordType::ALL.to_vec(),
            };
            let mut counts = serde_json::Map::new();
            for record_type in types {
                let count = service.backfill_embeddings(record_type).await?;
                counts.insert(record_type.collection().to_string(), count.into());
            }
            service.flush().await?;
            print_json(&counts)?;
        }
        Command::Stats => {
            print_json(&service.stats().await?)?;
        }
    }

    Ok(())
}

/// Records from a JSON file: an array, an object with a `results` array, or one object
fn read_records(path: &Path) -> anyhow::Result<Vec<Value>> {
    let text = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        buf
    } else {
        std::fs::read_to_string(path).with_context(|| format!("failed to read {:?}", path))?
    };

    let value: Value = serde_json::from_str(&text).context("import file is not valid JSON")?;
    Ok(match value {
        Value::Array(records) => records,
        Value::Object(mut obj) => match obj.remove("results") {
            Some(Value::Array(records)) => records,
            Some(other) => {
                obj.insert("results".to_string(), other);
                vec![Value::Object(obj)]
            }
            None => vec![Value::Object(obj)],
        },
        other => return Err(anyhow!("expected a JSON array of records, got {}", other)),
    })
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
